//! Configuration of the operator core.
//!
//! - Types mapping `kubeconverge.yaml`
//! - Loading from YAML, `.env` and `KUBECONVERGE_*` variables
//! - Validation of the loaded values

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, ENV_PREFIX, find_config_file};
pub use spec::{ControllerConfig, LoggingConfig, OperatorConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
