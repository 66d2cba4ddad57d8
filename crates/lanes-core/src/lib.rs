//! lanes-core library.
//!
//! Event-sourced lane state machine for work packages shared across
//! parallel git worktrees.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at module boundaries, each mapping to
//!   an [`error::ErrorCode`]; `anyhow::Result` for config and best-effort glue.
//! - **Logging**: `tracing` macros with structured fields (`wp_id`,
//!   `event_id`, `effect`, `error`).

pub mod config;
pub mod doctor;
pub mod emit;
pub mod error;
pub mod event;
pub mod guard;
pub mod lane;
pub mod lock;
pub mod reducer;
pub mod rollback;
pub mod sink;
pub mod store;
pub mod view;

pub use emit::{EmitError, EmitRequest, Emitter};
pub use event::Event;
pub use lane::Lane;
