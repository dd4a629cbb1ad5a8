//! Configuration loading, env substitution, and reference validation.
//!
//! Config files: `switchboard.toml`, `switchboard.yaml`, or `switchboard.json`
//! Searched in `./` then `~/.config/switchboard/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        AgentConfig, AgentKind, ChannelConfig, NoticesConfig, OutputConfig, SwitchboardConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
