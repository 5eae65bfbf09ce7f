//! Process-wide metrics registry shared by all components.

use std::sync::OnceLock;

static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Get the global instance of the metric storage registry.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

/// Get the global instance of the prometheus registry, e.g. for serving the
/// metrics endpoint.
pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}
