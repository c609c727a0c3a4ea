//! Typed configuration options, one small `Default`-backed struct per
//! concern rather than a generic config map.

use std::collections::HashMap;
use std::time::Duration;

use crate::retention::RetentionPolicy;
use crate::snapshot_policy::SnapshotPolicy;

/// Data store wiring: which named connection backs each collaborator when
/// a [`crate::document::StreamInformation`] doesn't set one explicitly.
#[derive(Debug, Clone)]
pub struct DataStoreConfig {
    pub default_data_store: String,
    pub default_document_store: Option<String>,
    pub default_snap_shot_store: Option<String>,
    pub default_document_tag_store: Option<String>,
    pub auto_create: bool,
    pub enable_stream_chunks: bool,
    pub default_chunk_size: u32,
}

impl DataStoreConfig {
    pub fn new(default_data_store: impl Into<String>) -> Self {
        Self {
            default_data_store: default_data_store.into(),
            default_document_store: None,
            default_snap_shot_store: None,
            default_document_tag_store: None,
            auto_create: true,
            enable_stream_chunks: false,
            default_chunk_size: 1000,
        }
    }

    /// Resolves `default_document_store`, falling back to
    /// `default_data_store` when unset.
    pub fn document_store(&self) -> &str {
        self.default_document_store.as_deref().unwrap_or(&self.default_data_store)
    }

    pub fn snap_shot_store(&self) -> &str {
        self.default_snap_shot_store.as_deref().unwrap_or(&self.default_data_store)
    }

    pub fn document_tag_store(&self) -> &str {
        self.default_document_tag_store.as_deref().unwrap_or(&self.default_data_store)
    }
}

/// Snapshot subsystem configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub default_policy: Option<SnapshotPolicy>,
    pub timeout: Duration,
    pub log_failures_as_warnings: bool,
    pub policy_overrides: HashMap<String, SnapshotPolicy>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_policy: None,
            timeout: Duration::from_secs(5),
            log_failures_as_warnings: true,
            policy_overrides: HashMap::new(),
        }
    }
}

impl SnapshotConfig {
    /// Resolution order: explicit runtime policy (passed by the caller),
    /// then a config override by full type name, then by short name, then
    /// the default policy, then `None`.
    pub fn resolve<'a>(
        &'a self,
        runtime_policy: Option<&'a SnapshotPolicy>,
        full_type_name: &str,
        short_type_name: &str,
    ) -> Option<&'a SnapshotPolicy> {
        runtime_policy
            .or_else(|| self.policy_overrides.get(full_type_name))
            .or_else(|| self.policy_overrides.get(short_type_name))
            .or(self.default_policy.as_ref())
    }
}

/// Retention subsystem configuration.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub default_policy: Option<RetentionPolicy>,
    pub policy_overrides: HashMap<String, RetentionPolicy>,
    pub auto_discover_on_startup: bool,
    pub processing_batch_size: usize,
    pub max_concurrent_processing: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_policy: None,
            policy_overrides: HashMap::new(),
            auto_discover_on_startup: false,
            processing_batch_size: 100,
            max_concurrent_processing: 5,
        }
    }
}

impl RetentionConfig {
    pub fn resolve(&self, type_name: &str) -> Option<&RetentionPolicy> {
        self.policy_overrides.get(type_name).or(self.default_policy.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_store_config_falls_back_to_default_store() {
        let cfg = DataStoreConfig::new("primary");
        assert_eq!(cfg.document_store(), "primary");
        assert_eq!(cfg.snap_shot_store(), "primary");
    }

    #[test]
    fn snapshot_config_resolution_order() {
        let mut cfg = SnapshotConfig::default();
        cfg.default_policy = Some(SnapshotPolicy::default());
        cfg.policy_overrides.insert(
            "Order".to_string(),
            SnapshotPolicy { every: 50, ..SnapshotPolicy::default() },
        );

        let resolved = cfg.resolve(None, "myapp::Order", "Order").unwrap();
        assert_eq!(resolved.every, 50);

        let runtime = SnapshotPolicy { every: 1, ..SnapshotPolicy::default() };
        let resolved = cfg.resolve(Some(&runtime), "myapp::Order", "Order").unwrap();
        assert_eq!(resolved.every, 1);
    }
}
