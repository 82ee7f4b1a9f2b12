use thiserror::Error;

/// Errors returned when a configuration section holds an unusable value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{field}` {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}

impl ValidationError {
    /// Builds an error for a numeric field that must be strictly positive.
    pub fn zero(field: &str) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.to_string(),
            constraint: "must be greater than 0".to_string(),
        }
    }
}
