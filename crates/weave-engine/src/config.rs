//! Engine configuration

use serde::Deserialize;
use thiserror::Error;
use weave_bytecode::DEFAULT_MAX_STACK_DEPTH;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed
    #[error("Invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds an unusable value
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),
}

/// Proxy engine options
///
/// Every field has a default, so a partial TOML table is valid:
///
/// ```toml
/// verify = true
/// fuse_stubs = true
/// call_stats = false
/// max_stack_depth = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Run the unit verifier before linking
    pub verify: bool,
    /// Collapse canonical stubs into native dispatch closures
    pub fuse_stubs: bool,
    /// Count individual calls in [`EngineStats`](crate::EngineStats)
    pub call_stats: bool,
    /// Operand stack bound enforced by the verifier
    pub max_stack_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify: true,
            fuse_stubs: true,
            call_stats: false,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Toggle unit verification
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Toggle stub fusion
    pub fn with_fuse_stubs(mut self, fuse_stubs: bool) -> Self {
        self.fuse_stubs = fuse_stubs;
        self
    }

    /// Toggle per-call counters
    pub fn with_call_stats(mut self, call_stats: bool) -> Self {
        self.call_stats = call_stats;
        self
    }

    /// Set the verifier stack bound
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Check field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stack_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_stack_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
