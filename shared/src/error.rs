/*!
Common error types for the simulated detector components.
*/

use thiserror::Error;

/// Common result type used throughout the workspace
pub type Result<T> = std::result::Result<T, SimError>;

/// Comprehensive error type for all detector operations
#[derive(Error, Debug)]
pub enum SimError {
    /// No parameter is registered under this name
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),

    /// The value type does not match the parameter's type
    #[error("Parameter {param} expects a {expected} value")]
    WrongType {
        param: &'static str,
        expected: &'static str,
    },

    /// The parameter is an output and cannot be written externally
    #[error("Parameter {0} is read-only")]
    ReadOnly(&'static str),

    /// Value outside of an enumerated parameter's range
    #[error("Invalid value {value} for parameter {param}")]
    InvalidValue { param: &'static str, value: String },

    /// Raw buffer growth or frame pool allocation failed
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// One or more writes in a batch failed; the rest were applied
    #[error("Failed to write parameters: {}", .0.join(", "))]
    ParamBatch(Vec<String>),

    /// Construction arguments that can never produce a frame
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl SimError {
    /// Create a new allocation error
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Create a new invalid value error
    pub fn invalid_value(param: &'static str, value: impl ToString) -> Self {
        Self::InvalidValue {
            param,
            value: value.to_string(),
        }
    }

    /// Create a new invalid geometry error
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// True for failures that abort a frame build
    pub fn is_allocation(&self) -> bool {
        matches!(self, Self::Allocation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_message_lists_names() {
        let err = SimError::ParamBatch(vec!["BIN_X".to_string(), "NOPE".to_string()]);
        assert_eq!(err.to_string(), "Failed to write parameters: BIN_X, NOPE");
    }

    #[test]
    fn test_allocation_classification() {
        assert!(SimError::allocation("pool exhausted").is_allocation());
        assert!(!SimError::ReadOnly("STATUS").is_allocation());
    }
}
