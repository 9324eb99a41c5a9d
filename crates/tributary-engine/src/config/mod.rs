//! Engine configuration: types, YAML parsing and semantic validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_config, parse_config_str, substitute_env_vars};
pub use types::{EngineConfig, EngineSection, StateBackendKind, StateConfig};
pub use validator::validate_config;
