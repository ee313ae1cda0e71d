use std::collections::HashSet;
use std::path::Path;

use eyre::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs::storage::AllocationStrategy;

/// An extra account created next to the admin at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub username: String,
    #[serde(default)]
    pub admin: bool,
}

/// Engine parameters. Every field has a default, so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes per block.
    pub block_size: usize,
    /// Number of blocks on the simulated disk.
    pub total_blocks: usize,
    pub allocation_strategy: AllocationStrategy,
    /// Name of the admin user, who owns the root directory.
    pub admin: String,
    pub users: Vec<UserSpec>,
}

impl Config {
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;
    pub const DEFAULT_TOTAL_BLOCKS: usize = 50;

    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {path:?}");
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Couldn't read config file {path:?}"))?;
        let config: Self = serde_json::from_str(&text)
            .wrap_err_with(|| format!("Config file {path:?} is not valid"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.block_size > 0, "block_size must be positive");
        ensure!(self.total_blocks > 0, "total_blocks must be positive");
        ensure!(!self.admin.is_empty(), "admin username cannot be empty");
        let mut seen = HashSet::from([self.admin.as_str()]);
        for user in &self.users {
            ensure!(!user.username.is_empty(), "usernames cannot be empty");
            ensure!(
                seen.insert(user.username.as_str()),
                "Duplicate username '{}'",
                user.username
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            total_blocks: Self::DEFAULT_TOTAL_BLOCKS,
            allocation_strategy: AllocationStrategy::Contiguous,
            admin: "admin".to_owned(),
            users: Vec::new(),
        }
    }
}

#[test]
fn test_partial_config_uses_defaults() {
    let config: Config =
        serde_json::from_str(r#"{ "total_blocks": 8, "allocation_strategy": "linked" }"#).unwrap();
    assert_eq!(config.total_blocks, 8);
    assert_eq!(config.block_size, Config::DEFAULT_BLOCK_SIZE);
    assert_eq!(config.allocation_strategy, AllocationStrategy::Linked);
    assert_eq!(config.admin, "admin");
    assert!(config.validate().is_ok());
}

#[test]
fn test_rejects_duplicate_users() {
    let config: Config = serde_json::from_str(
        r#"{ "users": [{ "username": "bob" }, { "username": "bob", "admin": true }] }"#,
    )
    .unwrap();
    assert!(config.validate().is_err());

    let clash = Config {
        users: vec![UserSpec {
            username: "admin".into(),
            admin: false,
        }],
        ..Config::default()
    };
    assert!(clash.validate().is_err());
}

#[test]
fn test_rejects_zero_geometry() {
    let config = Config {
        block_size: 0,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}
