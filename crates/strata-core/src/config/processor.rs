use crate::error::{Result, StrataError};
use crate::types::PathTemplate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static configuration of one processor instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorConfig {
    /// Namespaces the processor's trigger state storage
    pub id: String,

    /// Template of the shard events collection,
    /// e.g. `collections/{collectionId}/items/{itemId}/events`
    #[serde(alias = "docBuilderCollectionPath")]
    pub path_template: String,

    /// Events fetched per page
    /// Default: 300
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pages processed per invocation
    /// Default: 3
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Minimum time between two processing runs of one shard
    /// Default: 5000ms
    #[serde(default = "default_min_trigger_interval_ms")]
    pub min_trigger_interval_ms: u64,

    /// Sweeps span every instantiation of the template
    /// Default: true
    #[serde(default = "default_is_group_scoped")]
    pub is_group_scoped: bool,
}

fn default_batch_size() -> usize {
    300
}

fn default_max_pages() -> usize {
    3
}

fn default_min_trigger_interval_ms() -> u64 {
    5_000
}

fn default_is_group_scoped() -> bool {
    true
}

impl ProcessorConfig {
    pub fn new(id: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path_template: path_template.into(),
            batch_size: default_batch_size(),
            max_pages: default_max_pages(),
            min_trigger_interval_ms: default_min_trigger_interval_ms(),
            is_group_scoped: default_is_group_scoped(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_min_trigger_interval_ms(mut self, ms: u64) -> Self {
        self.min_trigger_interval_ms = ms;
        self
    }

    pub fn with_group_scoped(mut self, is_group_scoped: bool) -> Self {
        self.is_group_scoped = is_group_scoped;
        self
    }

    pub fn min_trigger_interval(&self) -> Duration {
        Duration::from_millis(self.min_trigger_interval_ms)
    }

    /// Validate the configuration and parse its path template.
    pub fn validate(&self) -> Result<PathTemplate> {
        if self.id.is_empty() || self.id.contains('/') {
            return Err(StrataError::Config(format!(
                "processor id '{}' must be non-empty and slash-free",
                self.id
            )));
        }
        if self.batch_size == 0 {
            return Err(StrataError::Config(format!(
                "processor '{}': batchSize must be greater than 0",
                self.id
            )));
        }
        if self.max_pages == 0 {
            return Err(StrataError::Config(format!(
                "processor '{}': maxPages must be greater than 0",
                self.id
            )));
        }
        let template = PathTemplate::parse(&self.path_template)?;
        if !self.is_group_scoped && template.has_placeholders() {
            return Err(StrataError::Config(format!(
                "processor '{}': template '{}' has placeholders but is not group scoped",
                self.id, self.path_template
            )));
        }
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: ProcessorConfig = serde_json::from_str(
            r#"{"id": "referrals", "docBuilderCollectionPath": "referrals/{code}/events"}"#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 300);
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.min_trigger_interval(), Duration::from_secs(5));
        assert!(config.is_group_scoped);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let base = ProcessorConfig::new("p", "referrals/{code}/events");
        assert!(base.clone().with_batch_size(0).validate().is_err());
        assert!(base.clone().with_max_pages(0).validate().is_err());
        assert!(base.clone().with_group_scoped(false).validate().is_err());
        assert!(ProcessorConfig::new("p", "referrals/{code}").validate().is_err());
        assert!(ProcessorConfig::new("a/b", "events").validate().is_err());
        assert!(ProcessorConfig::new("p", "events")
            .with_group_scoped(false)
            .validate()
            .is_ok());
    }
}
