//! Extension descriptors and replacement patches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::hooks::{Hook, HookResult, Perform, hook_fn};
use crate::baton::Baton;

/// Id assigned to descriptors registered without one.
pub const DEFAULT_ID: &str = "default";

/// Index assigned to the anonymous `"default"` descriptor.
pub const DEFAULT_INDEX: i64 = 100;

/// Index sentinel for descriptors with an explicit id but no index,
/// so order-agnostic descriptors sort after explicit ones.
pub const UNORDERED_INDEX: i64 = 1_000_000_000;

/// Sort position of a descriptor within its sibling list.
///
/// `First` sorts before every number, `Last` after every number,
/// numbers ascending. Equal indices preserve registration order —
/// a guaranteed property, enforced by the stable sort in the
/// ordering module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Index {
    /// Always first among siblings.
    First,
    /// Numeric position, ascending.
    At(i64),
    /// Always last among siblings.
    Last,
}

/// Relative placement against another descriptor on the same point.
///
/// Mutually exclusive with each other; the index still orders
/// siblings attached to the same target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Emit immediately before the target id.
    Before(String),
    /// Emit immediately after the target id.
    After(String),
}

impl Placement {
    /// The referenced target id.
    pub fn target(&self) -> &str {
        match self {
            Self::Before(id) | Self::After(id) => id,
        }
    }
}

/// A registered extension: identity, ordering, a property bag merged
/// by `options()`/`prop()`, and the typed callback capabilities.
#[derive(Clone)]
pub struct ExtensionSpec {
    /// Unique id within the point.
    pub id: String,
    /// Sort position.
    pub index: Index,
    /// Optional before/after relation.
    pub placement: Option<Placement>,
    /// Registration-time enabled sugar; consumed by `extend`.
    pub(crate) enabled: Option<bool>,
    /// Arbitrary consumer-owned properties.
    pub props: Map<String, Value>,
    /// Named synchronous hooks.
    pub(crate) hooks: HashMap<String, Arc<dyn Hook>>,
    /// The cascade step, if any.
    pub(crate) perform: Option<Arc<dyn Perform>>,
}

impl fmt::Debug for ExtensionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        hooks.sort_unstable();
        f.debug_struct("ExtensionSpec")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("placement", &self.placement)
            .field("props", &self.props)
            .field("hooks", &hooks)
            .field("perform", &self.perform.is_some())
            .finish()
    }
}

impl Default for ExtensionSpec {
    /// The anonymous descriptor: id `"default"`, index 100.
    fn default() -> Self {
        Self {
            id: DEFAULT_ID.to_string(),
            index: Index::At(DEFAULT_INDEX),
            placement: None,
            enabled: None,
            props: Map::new(),
            hooks: HashMap::new(),
            perform: None,
        }
    }
}

impl ExtensionSpec {
    /// A descriptor with an explicit id. The index defaults to the
    /// large sentinel so explicit indices sort first.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: Index::At(UNORDERED_INDEX),
            ..Self::default()
        }
    }

    /// Set a numeric index.
    pub fn index(mut self, index: i64) -> Self {
        self.index = Index::At(index);
        self
    }

    /// Sort first among siblings.
    pub fn first(mut self) -> Self {
        self.index = Index::First;
        self
    }

    /// Sort last among siblings.
    pub fn last(mut self) -> Self {
        self.index = Index::Last;
        self
    }

    /// Place immediately before the given id.
    pub fn before(mut self, target: impl Into<String>) -> Self {
        self.placement = Some(Placement::Before(target.into()));
        self
    }

    /// Place immediately after the given id.
    pub fn after(mut self, target: impl Into<String>) -> Self {
        self.placement = Some(Placement::After(target.into()));
        self
    }

    /// Registration-time enable/disable sugar. `enabled(false)` is
    /// converted into an immediate `disable(id)` by `extend`.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set a consumer property.
    pub fn prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// Register a hook under a name.
    pub fn on(mut self, name: impl Into<String>, hook: Arc<dyn Hook>) -> Self {
        self.hooks.insert(name.into(), hook);
        self
    }

    /// Register a closure hook under a name.
    pub fn on_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Baton) -> HookResult + Send + Sync + 'static,
    {
        self.on(name, hook_fn(f))
    }

    /// Set the cascade step.
    pub fn perform(mut self, perform: Arc<dyn Perform>) -> Self {
        self.perform = Some(perform);
        self
    }

    /// Look up a hook by name.
    pub fn hook(&self, name: &str) -> Option<&Arc<dyn Hook>> {
        self.hooks.get(name)
    }

    /// Names of all registered hooks.
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.keys().map(String::as_str).collect()
    }

    /// Whether this descriptor carries a cascade step.
    pub fn has_perform(&self) -> bool {
        self.perform.is_some()
    }

    /// Look up a consumer property.
    pub fn get_prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }
}

/// A replacement patch merged into an existing descriptor by
/// `replace`, or queued until the target id registers.
#[derive(Clone, Default)]
pub struct ExtensionPatch {
    /// New index, if changed.
    pub index: Option<Index>,
    /// New placement, if changed.
    pub placement: Option<Placement>,
    /// Properties to merge (later wins per key).
    pub props: Map<String, Value>,
    /// Hooks to add or override.
    pub hooks: HashMap<String, Arc<dyn Hook>>,
    /// New cascade step, if changed.
    pub perform: Option<Arc<dyn Perform>>,
}

impl fmt::Debug for ExtensionPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        hooks.sort_unstable();
        f.debug_struct("ExtensionPatch")
            .field("index", &self.index)
            .field("placement", &self.placement)
            .field("props", &self.props)
            .field("hooks", &hooks)
            .field("perform", &self.perform.is_some())
            .finish()
    }
}

impl ExtensionPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the numeric index.
    pub fn index(mut self, index: i64) -> Self {
        self.index = Some(Index::At(index));
        self
    }

    /// Change the placement to before the given id.
    pub fn before(mut self, target: impl Into<String>) -> Self {
        self.placement = Some(Placement::Before(target.into()));
        self
    }

    /// Change the placement to after the given id.
    pub fn after(mut self, target: impl Into<String>) -> Self {
        self.placement = Some(Placement::After(target.into()));
        self
    }

    /// Merge a consumer property.
    pub fn prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// Add or override a hook.
    pub fn on(mut self, name: impl Into<String>, hook: Arc<dyn Hook>) -> Self {
        self.hooks.insert(name.into(), hook);
        self
    }

    /// Add or override a closure hook.
    pub fn on_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Baton) -> HookResult + Send + Sync + 'static,
    {
        self.on(name, hook_fn(f))
    }

    /// Replace the cascade step.
    pub fn perform(mut self, perform: Arc<dyn Perform>) -> Self {
        self.perform = Some(perform);
        self
    }

    /// Merge this patch into a descriptor.
    pub(crate) fn apply(&self, spec: &mut ExtensionSpec) {
        if let Some(index) = self.index {
            spec.index = index;
        }
        if let Some(placement) = &self.placement {
            spec.placement = Some(placement.clone());
        }
        for (key, value) in &self.props {
            spec.props.insert(key.clone(), value.clone());
        }
        for (name, hook) in &self.hooks {
            spec.hooks.insert(name.clone(), hook.clone());
        }
        if let Some(perform) = &self.perform {
            spec.perform = Some(perform.clone());
        }
    }
}

/// A replacement waiting for its target id to register.
#[derive(Clone)]
pub(crate) enum PendingPatch {
    /// A literal patch, merged as-is.
    Literal(ExtensionPatch),
    /// A function over a copy of the original descriptor.
    Mapped(Arc<dyn Fn(&ExtensionSpec) -> ExtensionPatch + Send + Sync>),
}

impl PendingPatch {
    pub(crate) fn apply(&self, spec: &mut ExtensionSpec) {
        match self {
            Self::Literal(patch) => patch.apply(spec),
            Self::Mapped(f) => {
                let original = spec.clone();
                f(&original).apply(spec);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_ordering() {
        assert!(Index::First < Index::At(i64::MIN));
        assert!(Index::At(i64::MAX) < Index::Last);
        assert!(Index::At(100) < Index::At(200));
        assert!(Index::First < Index::Last);
    }

    #[test]
    fn test_anonymous_descriptor_defaults() {
        let spec = ExtensionSpec::default();
        assert_eq!(spec.id, "default");
        assert_eq!(spec.index, Index::At(100));
    }

    #[test]
    fn test_explicit_id_gets_unordered_sentinel() {
        let spec = ExtensionSpec::new("icon");
        assert_eq!(spec.index, Index::At(UNORDERED_INDEX));
        assert!(ExtensionSpec::new("a").index(50).index < spec.index);
    }

    #[test]
    fn test_patch_apply_merges() {
        let mut spec = ExtensionSpec::new("title")
            .index(300)
            .prop("label", json!("Subject"));
        let patch = ExtensionPatch::new()
            .index(150)
            .prop("label", json!("Topic"))
            .prop("mandatory", json!(true));
        patch.apply(&mut spec);
        assert_eq!(spec.index, Index::At(150));
        assert_eq!(spec.props["label"], json!("Topic"));
        assert_eq!(spec.props["mandatory"], json!(true));
    }
}
