//! Domain model for projects, tasks and blocking dependencies.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Own attribute validation shared by repositories and services.
//!
//! # Invariants
//! - Every project and task is identified by a stable, non-nil UUID.
//! - Every task belongs to exactly one `Scope` (owner + project).
//! - Names are non-blank and bounded; descriptions are bounded.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod dependency;
pub mod project;
pub mod task;

/// Maximum accepted length (in chars) for project and task names.
pub const MAX_NAME_CHARS: usize = 100;
/// Maximum accepted length (in chars) for project and task descriptions.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Attribute validation failures for domain records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifier must not be the nil UUID.
    NilId { field: &'static str },
    /// Name is empty after trim.
    BlankName { field: &'static str },
    /// Text exceeds its maximum length.
    TooLong {
        field: &'static str,
        max_chars: usize,
        actual_chars: usize,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId { field } => write!(f, "{field} must not be nil"),
            Self::BlankName { field } => write!(f, "{field} must not be blank"),
            Self::TooLong {
                field,
                max_chars,
                actual_chars,
            } => write!(
                f,
                "{field} must be at most {max_chars} characters, got {actual_chars}"
            ),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn validate_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::BlankName { field });
    }
    validate_length(field, value, MAX_NAME_CHARS)
}

pub(crate) fn validate_length(
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> Result<(), ValidationError> {
    let actual_chars = value.chars().count();
    if actual_chars > max_chars {
        return Err(ValidationError::TooLong {
            field,
            max_chars,
            actual_chars,
        });
    }
    Ok(())
}

pub(crate) fn validate_id(field: &'static str, id: uuid::Uuid) -> Result<(), ValidationError> {
    if id.is_nil() {
        return Err(ValidationError::NilId { field });
    }
    Ok(())
}

/// Current wall clock in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// Next `updated_at` for a record last stamped at `previous`; never moves backwards.
pub(crate) fn next_update_stamp(previous: i64) -> i64 {
    now_epoch_ms().max(previous)
}
