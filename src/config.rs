//! Compiler configuration

use crate::scheduler::Factory;
use crate::{QcbError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Router settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Consecutive cycles without progress tolerated before giving up
    pub stall_limit: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { stall_limit: 8 }
    }
}

/// Settings shared by the scheduler, remapper and router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Non-local operations admitted per cycle
    pub channel_capacity: usize,
    /// Magic-state factories available to the block
    pub factories: Vec<Factory>,
    /// Router settings
    pub router: RouterConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1,
            factories: vec![],
            router: RouterConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Set the channel capacity
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    /// Add a factory
    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factories.push(factory);
        self
    }

    /// Reject settings no schedule can satisfy
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(QcbError::config_error("channel capacity must be at least 1"));
        }
        if let Some(factory) = self.factories.iter().find(|factory| factory.period == 0) {
            return Err(QcbError::config_error(format!(
                "factory for '{}' has a zero period",
                factory.symbol
            )));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CompilerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.router.stall_limit, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CompilerConfig =
            serde_json::from_str(r#"{"factories": [{"symbol": "T", "period": 3}]}"#).unwrap();
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.factories, vec![Factory::new("T", 3)]);
    }

    #[test]
    fn test_validation() {
        assert!(CompilerConfig::default().with_channel_capacity(0).validate().is_err());
        assert!(CompilerConfig::default()
            .with_factory(Factory::new("T", 0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("qcb-config-{}.json", std::process::id()));
        let config = CompilerConfig::default()
            .with_channel_capacity(2)
            .with_factory(Factory::new("T", 4));
        config.to_file(&path).unwrap();
        let loaded = CompilerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
