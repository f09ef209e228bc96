// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
        }
        Ok(())
    }

    /// Validate that a URL uses one of the allowed schemes
    pub fn has_scheme(value: &str, schemes: &[&str], field: &str) -> Result<()> {
        let ok = schemes
            .iter()
            .any(|scheme| value.strip_prefix(scheme).is_some_and(|rest| rest.starts_with("://")));
        if !ok {
            return Err(ConfigError::Validation(format!(
                "{} must start with one of: {}",
                field,
                schemes
                    .iter()
                    .map(|s| format!("{}://", s))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(())
    }

    /// Validate that a number is not negative
    pub fn non_negative(value: i64, field: &str) -> Result<()> {
        if value < 0 {
            return Err(ConfigError::Validation(format!(
                "{} cannot be negative (got {})",
                field, value
            )));
        }
        Ok(())
    }

    /// Validate that an optional value parses
    pub fn parses<T>(value: Option<&str>, parse: impl Fn(&str) -> Option<T>, field: &str) -> Result<()> {
        match value {
            Some(v) if parse(v).is_none() => Err(ConfigError::Validation(format!(
                "{} has unsupported value {:?}",
                field, v
            ))),
            _ => Ok(()),
        }
    }
}
