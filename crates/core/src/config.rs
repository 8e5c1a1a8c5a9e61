use std::collections::HashSet;
use std::path::Path;

use ledger_feed_protocol::{DEFAULT_PAGE_SIZE, LaneId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default distance from the end of a viewport, in logical units, at which a
/// scroll signal turns into a load-more request.
pub const DEFAULT_SCROLL_THRESHOLD: u32 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine settings.
///
/// ```toml
/// page_size = 20
/// scroll_threshold = 50
/// lanes = ["customers", "vendors", "transactions"]
/// initial_tab = "customers"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    pub page_size: u32,
    pub scroll_threshold: u32,
    pub lanes: Vec<LaneId>,
    /// Tab activated by `FeedController::start`; the first lane when unset.
    pub initial_tab: Option<LaneId>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            lanes: LaneId::ledger_defaults(),
            initial_tab: None,
        }
    }
}

impl FeedConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.lanes.is_empty() {
            return Err(ConfigError::Invalid("at least one lane is required".into()));
        }
        let mut seen = HashSet::new();
        for lane in &self.lanes {
            if lane.as_str().trim().is_empty() {
                return Err(ConfigError::Invalid("lane ids must not be blank".into()));
            }
            if !seen.insert(lane.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate lane '{lane}'")));
            }
        }
        if let Some(tab) = &self.initial_tab
            && !seen.contains(tab.as_str())
        {
            return Err(ConfigError::Invalid(format!(
                "initial_tab '{tab}' is not one of the configured lanes"
            )));
        }
        Ok(())
    }

    /// The tab activated first.
    pub fn initial_tab(&self) -> Option<&LaneId> {
        self.initial_tab.as_ref().or_else(|| self.lanes.first())
    }
}
