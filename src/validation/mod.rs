//! Schema-driven response validation
//!
//! Field values are collected per logical field, then checked against the
//! constraints the schema author attached to that field. A form is only
//! valid when every validated field is; all fields are checked in one pass
//! so that every error can be shown at once.

pub mod config;
pub mod constraints;
pub mod engine;
pub mod messages;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::{extract, FieldConfig, ValidationConfig};
pub use constraints::{Constraint, ConstraintKind};
pub use engine::{FormValidation, MessageDisplay, ValidationEngine};
pub use messages::Messages;

/// Error types for validation configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown constraint: {0}")]
    UnknownConstraint(String),

    #[error("Invalid parameter for constraint '{constraint}': {reason}")]
    InvalidParameter { constraint: String, reason: String },

    #[error("Field with validation has no id")]
    MissingFieldId,

    #[error("Malformed validation configuration: {0}")]
    Malformed(String),
}

/// The collected state of one field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Raw values of every contributing control, in document order
    Values(Vec<String>),

    /// The field was deliberately excluded from validation
    Skipped,
}

impl FieldValue {
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FieldValue::Skipped)
    }

    pub fn as_values(&self) -> Option<&[String]> {
        match self {
            FieldValue::Values(values) => Some(values),
            FieldValue::Skipped => None,
        }
    }
}

/// Field id -> collected state, for every field of a form
pub type FieldValues = IndexMap<String, FieldValue>;

/// Field id -> validated values; this is what gets queued and transmitted
pub type Responses = IndexMap<String, Vec<String>>;

/// Outcome of validating a whole form
#[derive(Clone, Debug, PartialEq)]
pub enum ValidationResult {
    Valid(Responses),
    Invalid,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn into_responses(self) -> Option<Responses> {
        match self {
            ValidationResult::Valid(responses) => Some(responses),
            ValidationResult::Invalid => None,
        }
    }
}
