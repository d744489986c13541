//! Validation of the operator configuration.

use tracing::{debug, warn};

use crate::error::{ConfigError, Error, Result};
use crate::registry::KindRegistry;

use super::spec::{ControllerConfig, OperatorConfig};

/// Request timeouts above this many seconds are reported as a warning.
const MAX_REASONABLE_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Validator for operator configurations.
#[derive(Debug)]
pub struct ConfigValidator {
    /// Kinds that may carry apply option overrides.
    registry: KindRegistry,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Creates a validator accepting overrides for the built-in kinds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: KindRegistry::with_builtin_kinds(),
        }
    }

    /// Creates a validator accepting overrides for the kinds of `registry`.
    #[must_use]
    pub const fn with_registry(registry: KindRegistry) -> Self {
        Self { registry }
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any was found.
    pub fn validate(&self, config: &OperatorConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_controller(&config.controller, &mut result);
        self.validate_kinds(config, &mut result);

        for warning in &result.warnings {
            warn!("Configuration warning: {}", warning);
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(Error::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    fn validate_controller(controller: &ControllerConfig, result: &mut ValidationResult) {
        if controller.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("controller.name"),
                message: String::from("Controller name cannot be empty"),
            });
        } else if !is_valid_name(&controller.name) {
            result.errors.push(ValidationError {
                field: String::from("controller.name"),
                message: format!(
                    "Controller name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    controller.name
                ),
            });
        }

        if controller.request_timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("controller.request_timeout_secs"),
                message: String::from("Request timeout must be positive"),
            });
        } else if controller.request_timeout_secs > MAX_REASONABLE_REQUEST_TIMEOUT_SECS {
            result.warnings.push(format!(
                "Request timeout of {}s is unusually long",
                controller.request_timeout_secs
            ));
        }

        match controller.pass_timeout_secs {
            Some(0) => result.errors.push(ValidationError {
                field: String::from("controller.pass_timeout_secs"),
                message: String::from("Pass timeout must be positive"),
            }),
            Some(pass) if pass < controller.request_timeout_secs => {
                result.warnings.push(format!(
                    "Pass timeout of {pass}s is shorter than the request timeout of {}s",
                    controller.request_timeout_secs
                ));
            }
            _ => {}
        }
    }

    fn validate_kinds(&self, config: &OperatorConfig, result: &mut ValidationResult) {
        for (kind, options) in &config.kinds {
            if !self.registry.contains_kind(kind) {
                result.errors.push(ValidationError {
                    field: format!("kinds.{kind}"),
                    message: format!("Kind '{kind}' is not registered"),
                });
            } else if options.allow_missing_controller_ref && options.force_ownership {
                result.warnings.push(format!(
                    "Kind '{kind}' claims orphans without requiring a controller reference"
                ));
            }
        }
    }
}

/// Checks a lowercase DNS-1123 label.
fn is_valid_name(name: &str) -> bool {
    name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}
