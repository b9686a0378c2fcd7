//! The point registry.
//!
//! An explicit value owned by the application root and passed by
//! reference to consumers; its lifetime is tied to the owning
//! application instance, and `clear()` gives tests and teardown a
//! clean slate. Points are created lazily on first lookup.

use std::sync::Arc;

use dashmap::DashMap;

use groupware_core::config::EngineConfig;

use crate::point::Point;

/// Map from point id to extension point.
pub struct Registry {
    points: DashMap<String, Arc<Point>>,
    debug: bool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("points", &self.points.len())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry with default settings.
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Create an empty registry honoring the engine configuration.
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            points: DashMap::new(),
            debug: config.engine.debug,
        }
    }

    /// Get a point, creating and registering it on first lookup.
    pub fn point(&self, id: &str) -> Arc<Point> {
        self.points
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Point::with_debug(id, self.debug)))
            .clone()
    }

    /// Whether a point has been looked up before.
    pub fn has(&self, id: &str) -> bool {
        self.points.contains_key(id)
    }

    /// Ids of all registered points.
    pub fn keys(&self) -> Vec<String> {
        self.points.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Clear every point, then the registry itself (teardown / test
    /// isolation).
    pub fn clear(&self) {
        for entry in self.points.iter() {
            entry.value().clear();
        }
        self.points.clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExtensionSpec;

    #[test]
    fn test_point_is_created_lazily_and_cached() {
        let registry = Registry::new();
        assert!(registry.is_empty());

        let a = registry.point("io.ox/mail/listview");
        let b = registry.point("io.ox/mail/listview");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_empties_points_and_registry() {
        let registry = Registry::new();
        let point = registry.point("io.ox/calendar/week");
        point.extend(ExtensionSpec::new("grid")).unwrap();
        assert_eq!(point.count(), 1);

        registry.clear();
        assert!(registry.is_empty());
        // the old handle was cleared too
        assert_eq!(point.count(), 0);
    }
}
