//! Completion proof required to move a work package to `done`.

use serde::{Deserialize, Serialize};

/// Structured evidence attached to a `done` transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneEvidence {
    pub review: ReviewApproval,
    #[serde(default)]
    pub repos: Vec<RepoEvidence>,
    #[serde(default)]
    pub verification: Vec<VerificationResult>,
}

/// Who approved the work and where the review lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewApproval {
    pub reviewer: String,
    pub verdict: String,
    pub reference: String,
}

/// A repository state the completed work landed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEvidence {
    pub repo: String,
    pub branch: String,
    pub commit: String,
}

/// One verification command and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub command: String,
    pub result: String,
    pub summary: String,
}

/// The first required evidence field that was missing or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("done evidence is missing required field `{field}`")]
pub struct EvidenceError {
    pub field: &'static str,
}

impl DoneEvidence {
    /// Build evidence from the three required review fields.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError`] naming the first empty field, checked in the
    /// order `review.reviewer`, `review.verdict`, `review.reference`.
    pub fn new(
        reviewer: impl Into<String>,
        verdict: impl Into<String>,
        reference: impl Into<String>,
    ) -> Result<Self, EvidenceError> {
        let evidence = Self {
            review: ReviewApproval {
                reviewer: reviewer.into(),
                verdict: verdict.into(),
                reference: reference.into(),
            },
            repos: Vec::new(),
            verification: Vec::new(),
        };
        evidence.validate()?;
        Ok(evidence)
    }

    #[must_use]
    pub fn with_repo(
        mut self,
        repo: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        self.repos.push(RepoEvidence {
            repo: repo.into(),
            branch: branch.into(),
            commit: commit.into(),
        });
        self
    }

    #[must_use]
    pub fn with_verification(
        mut self,
        command: impl Into<String>,
        result: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        self.verification.push(VerificationResult {
            command: command.into(),
            result: result.into(),
            summary: summary.into(),
        });
        self
    }

    /// Re-check well-formedness. Evidence read from JSON bypasses [`Self::new`].
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError`] naming the first empty required field.
    pub fn validate(&self) -> Result<(), EvidenceError> {
        let required = [
            ("review.reviewer", &self.review.reviewer),
            ("review.verdict", &self.review.verdict),
            ("review.reference", &self.review.reference),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(EvidenceError { field });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_complete_review() {
        let evidence = DoneEvidence::new("r1", "approved", "PR#1").expect("valid");
        assert_eq!(evidence.review.reviewer, "r1");
        assert!(evidence.repos.is_empty());
        assert!(evidence.verification.is_empty());
    }

    #[test]
    fn new_names_the_first_missing_field() {
        assert_eq!(
            DoneEvidence::new("", "", "").unwrap_err().field,
            "review.reviewer"
        );
        assert_eq!(
            DoneEvidence::new("r1", " ", "PR#1").unwrap_err().field,
            "review.verdict"
        );
        let err = DoneEvidence::new("r1", "approved", "").unwrap_err();
        assert_eq!(err.field, "review.reference");
        assert!(err.to_string().contains("review.reference"));
    }

    #[test]
    fn optional_sections_default_to_empty_when_absent() {
        let json = r#"{"review":{"reviewer":"r1","verdict":"approved","reference":"PR#1"}}"#;
        let evidence: DoneEvidence = serde_json::from_str(json).expect("deserialize");
        assert!(evidence.repos.is_empty());
        assert!(evidence.verification.is_empty());
        assert!(evidence.validate().is_ok());
    }

    #[test]
    fn deserialized_evidence_is_revalidated() {
        let json = r#"{"review":{"reviewer":"","verdict":"approved","reference":"PR#1"}}"#;
        let evidence: DoneEvidence = serde_json::from_str(json).expect("deserialize");
        assert_eq!(evidence.validate().unwrap_err().field, "review.reviewer");
    }

    #[test]
    fn builders_append_repo_and_verification() {
        let evidence = DoneEvidence::new("r1", "approved", "PR#1")
            .expect("valid")
            .with_repo("core", "feat/wp01", "abc123")
            .with_verification("cargo test", "pass", "212 passed");
        assert_eq!(evidence.repos[0].commit, "abc123");
        assert_eq!(evidence.verification[0].result, "pass");
    }
}
