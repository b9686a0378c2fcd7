//! The context object threaded through a dispatch pass.
//!
//! A baton carries the payload plus cooperative flow control: default
//! prevention, propagation stopping, and per-pass extension disables.
//! Opaque UI references (view handles, DOM-ish nodes) live in typed
//! `Arc` slots so a fork keeps them by identity while the data and
//! option maps are copied.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::hooks::InvokeReport;
use crate::registry::Registry;

/// Which point/hook is currently dispatching this baton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeMarker {
    /// The dispatching point id.
    pub point: String,
    /// The hook name being dispatched.
    pub hook: String,
}

/// The baton fields `set()` can shallow-merge into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatonSlot {
    /// The payload.
    Data,
    /// The option map.
    Options,
}

/// An opaque reference held by a baton (view nodes, models, ...).
pub type Handle = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct Flow {
    /// Point id → extension ids disabled for this baton only.
    disable: HashMap<String, Vec<String>>,
}

/// Per-dispatch mutable context.
///
/// Created once per top-level dispatch (e.g. per render pass), forked
/// for derived sub-regions, and disposed when the owning view is torn
/// down so a long-lived baton cannot pin removed UI state.
pub struct Baton {
    /// Correlation id, logged with dispatch failures.
    pub id: Uuid,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// The payload; a single value or a list.
    pub data: Value,
    /// Accumulated options.
    pub options: Map<String, Value>,
    /// Cascade policy: capture step rejections onto the baton and
    /// keep going instead of propagating to the caller.
    pub catch_errors: bool,
    /// Set when a cascade step was rejected and captured.
    pub rejected: bool,
    /// Captured rejection description.
    pub error: Option<String>,
    /// Captured rejection code.
    pub error_code: Option<String>,
    /// Warnings copied from cascade steps.
    pub warning: Option<Value>,
    /// Id of the extension currently executing, set by the dispatcher.
    pub extension: Option<String>,
    /// True once `dispose()` ran.
    pub disposed: bool,
    flow: Flow,
    prevented: bool,
    stopped: bool,
    pub(crate) invoke: Option<InvokeMarker>,
    handles: HashMap<String, Handle>,
    target: Option<Handle>,
}

impl fmt::Debug for Baton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handles: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        handles.sort_unstable();
        f.debug_struct("Baton")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("options", &self.options)
            .field("prevented", &self.prevented)
            .field("stopped", &self.stopped)
            .field("catch_errors", &self.catch_errors)
            .field("rejected", &self.rejected)
            .field("error", &self.error)
            .field("extension", &self.extension)
            .field("invoke", &self.invoke)
            .field("handles", &handles)
            .field("target", &self.target.is_some())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl Default for Baton {
    fn default() -> Self {
        Self::new()
    }
}

impl Baton {
    /// An empty baton.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            data: Value::Null,
            options: Map::new(),
            catch_errors: false,
            rejected: false,
            error: None,
            error_code: None,
            warning: None,
            extension: None,
            disposed: false,
            flow: Flow::default(),
            prevented: false,
            stopped: false,
            invoke: None,
            handles: HashMap::new(),
            target: None,
        }
    }

    /// A baton carrying a payload.
    pub fn with_data(data: Value) -> Self {
        let mut baton = Self::new();
        baton.data = data;
        baton
    }

    /// Normalize a raw value into a baton.
    ///
    /// An object with a `data` key is treated as the full shape
    /// (`data` + `options`); anything else becomes the raw payload.
    pub fn ensure(value: Value) -> Self {
        match value {
            Value::Object(mut shape) if shape.contains_key("data") => {
                let mut baton = Self::new();
                baton.data = shape.remove("data").unwrap_or(Value::Null);
                if let Some(Value::Object(options)) = shape.remove("options") {
                    baton.options = options;
                }
                baton
            }
            other => Self::with_data(other),
        }
    }

    // ── Flow control ──

    /// Whether `prevent_default` was called.
    pub fn is_default_prevented(&self) -> bool {
        self.prevented
    }

    /// Cooperatively cancel the default behavior of this pass.
    pub fn prevent_default(&mut self) {
        self.prevented = true;
    }

    /// Whether `stop_propagation` was called (and not resumed).
    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped
    }

    /// Abort the remaining extensions of the current pass.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    /// Reset a propagation stop so a later pass runs in full.
    pub fn resume_propagation(&mut self) {
        self.stopped = false;
    }

    // ── Payload helpers ──

    /// The payload as a single value (first element of a list).
    pub fn first(&self) -> &Value {
        match &self.data {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        }
    }

    /// The payload as a list (a single value becomes a one-element
    /// list).
    pub fn array(&self) -> Vec<Value> {
        match &self.data {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Shallow-merge a patch into `data` or `options`; chains.
    pub fn set(&mut self, slot: BatonSlot, patch: Map<String, Value>) -> &mut Self {
        match slot {
            BatonSlot::Data => match &mut self.data {
                Value::Object(map) => map.extend(patch),
                other => *other = Value::Object(patch),
            },
            BatonSlot::Options => self.options.extend(patch),
        }
        self
    }

    // ── Per-baton disables ──

    /// Disable one extension of one point for this baton only.
    ///
    /// Distinct from the point's own enable/disable set; other
    /// dispatches over the same point are unaffected.
    pub fn disable(&mut self, point_id: &str, extension_id: &str) {
        self.flow
            .disable
            .entry(point_id.to_string())
            .or_default()
            .push(extension_id.to_string());
    }

    /// Retract a per-baton disable.
    pub fn enable(&mut self, point_id: &str, extension_id: &str) {
        if let Some(list) = self.flow.disable.get_mut(point_id) {
            list.retain(|id| id != extension_id);
        }
    }

    /// Whether an extension is disabled for this baton. The id
    /// `"default"` also counts as disabled while default is
    /// prevented.
    pub fn is_disabled(&self, point_id: &str, extension_id: &str) -> bool {
        if extension_id == crate::descriptor::DEFAULT_ID && self.is_default_prevented() {
            return true;
        }
        self.flow
            .disable
            .get(point_id)
            .is_some_and(|list| list.iter().any(|id| id == extension_id))
    }

    // ── Opaque references ──

    /// Store an opaque reference under a key.
    pub fn insert_handle(&mut self, key: impl Into<String>, handle: Handle) {
        self.handles.insert(key.into(), handle);
    }

    /// Look up an opaque reference.
    pub fn handle(&self, key: &str) -> Option<&Handle> {
        self.handles.get(key)
    }

    /// Set the current dispatch target (the region being built).
    pub fn set_target(&mut self, target: Option<Handle>) {
        self.target = target;
    }

    /// The current dispatch target.
    pub fn target(&self) -> Option<&Handle> {
        self.target.as_ref()
    }

    /// The point/hook currently dispatching this baton, if any.
    pub fn invoke_marker(&self) -> Option<&InvokeMarker> {
        self.invoke.as_ref()
    }

    // ── Lifecycle ──

    /// Derive a baton for a nested dispatch branch.
    ///
    /// Data, options, and flow state are copied so the branch cannot
    /// corrupt the parent's maps; opaque handles and the target keep
    /// their `Arc` identity; flags carry over; the fork gets a fresh
    /// correlation id.
    pub fn fork(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            data: self.data.clone(),
            options: self.options.clone(),
            catch_errors: self.catch_errors,
            rejected: self.rejected,
            error: self.error.clone(),
            error_code: self.error_code.clone(),
            warning: self.warning.clone(),
            extension: self.extension.clone(),
            disposed: false,
            flow: self.flow.clone(),
            prevented: self.prevented,
            stopped: self.stopped,
            invoke: self.invoke.clone(),
            handles: self.handles.clone(),
            target: self.target.clone(),
        }
    }

    /// Null out every carried value so a retained baton cannot pin
    /// removed UI state. The baton is unusable afterwards.
    pub fn dispose(&mut self) {
        self.data = Value::Null;
        self.options = Map::new();
        self.flow.disable.clear();
        self.handles.clear();
        self.target = None;
        self.extension = None;
        self.invoke = None;
        self.error = None;
        self.error_code = None;
        self.warning = None;
        self.rejected = false;
        self.prevented = false;
        self.stopped = false;
        self.catch_errors = false;
        self.disposed = true;
    }

    /// Re-invoke the current hook on the sub-point
    /// `<invoking point>/<sub_id>`, temporarily substituting the
    /// dispatch target. Outside a dispatch pass this is a logged
    /// no-op.
    pub fn branch(
        &mut self,
        registry: &Registry,
        sub_id: &str,
        target: Handle,
    ) -> Option<InvokeReport> {
        let Some(marker) = self.invoke.clone() else {
            warn!(sub_id, baton = %self.id, "branch() called outside of a dispatch pass");
            return None;
        };
        let previous = self.target.replace(target);
        let point = registry.point(&format!("{}/{}", marker.point, sub_id));
        let report = point.invoke(&marker.hook, self);
        self.target = previous;
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flags_are_sticky_until_resumed() {
        let mut baton = Baton::new();
        assert!(!baton.is_propagation_stopped());
        baton.stop_propagation();
        assert!(baton.is_propagation_stopped());
        baton.resume_propagation();
        assert!(!baton.is_propagation_stopped());

        baton.prevent_default();
        assert!(baton.is_default_prevented());
    }

    #[test]
    fn test_prevent_default_disables_default_extension() {
        let mut baton = Baton::new();
        assert!(!baton.is_disabled("io.ox/mail/actions", "default"));
        baton.prevent_default();
        assert!(baton.is_disabled("io.ox/mail/actions", "default"));
        // other ids unaffected
        assert!(!baton.is_disabled("io.ox/mail/actions", "reply"));
    }

    #[test]
    fn test_disable_enable_roundtrip() {
        let mut baton = Baton::new();
        baton.disable("p", "a");
        baton.disable("p", "b");
        assert!(baton.is_disabled("p", "a"));
        baton.enable("p", "a");
        assert!(!baton.is_disabled("p", "a"));
        assert!(baton.is_disabled("p", "b"));
    }

    #[test]
    fn test_ensure_shapes() {
        let raw = Baton::ensure(json!([1, 2, 3]));
        assert_eq!(raw.data, json!([1, 2, 3]));

        let full = Baton::ensure(json!({
            "data": { "subject": "hello" },
            "options": { "mode": "compose" }
        }));
        assert_eq!(full.data, json!({ "subject": "hello" }));
        assert_eq!(full.options["mode"], json!("compose"));
    }

    #[test]
    fn test_first_and_array_normalization() {
        let single = Baton::with_data(json!("x"));
        assert_eq!(single.first(), &json!("x"));
        assert_eq!(single.array(), vec![json!("x")]);

        let list = Baton::with_data(json!(["a", "b"]));
        assert_eq!(list.first(), &json!("a"));
        assert_eq!(list.array(), vec![json!("a"), json!("b")]);
    }

    #[test]
    fn test_set_merges_shallowly() {
        let mut baton = Baton::with_data(json!({ "kept": 1 }));
        baton
            .set(BatonSlot::Data, json!({ "added": 2 }).as_object().unwrap().clone())
            .set(BatonSlot::Options, json!({ "mode": "list" }).as_object().unwrap().clone());
        assert_eq!(baton.data, json!({ "kept": 1, "added": 2 }));
        assert_eq!(baton.options["mode"], json!("list"));
    }

    #[test]
    fn test_fork_copies_maps_but_keeps_handle_identity() {
        let mut baton = Baton::with_data(json!({ "n": 1 }));
        let node: Handle = Arc::new("node".to_string());
        baton.insert_handle("view", node.clone());

        let mut fork = baton.fork();
        fork.set(BatonSlot::Data, json!({ "n": 2 }).as_object().unwrap().clone());

        // the parent's payload is untouched by the fork's mutation
        assert_eq!(baton.data, json!({ "n": 1 }));
        assert_eq!(fork.data, json!({ "n": 2 }));
        // opaque references retain identity
        assert!(Arc::ptr_eq(fork.handle("view").unwrap(), &node));
        // the fork has its own correlation id
        assert_ne!(baton.id, fork.id);
    }

    #[test]
    fn test_dispose_nulls_everything() {
        let mut baton = Baton::with_data(json!({ "n": 1 }));
        baton.insert_handle("view", Arc::new(1u32));
        baton.catch_errors = true;
        baton.dispose();

        assert_eq!(baton.data, Value::Null);
        assert!(baton.options.is_empty());
        assert!(baton.handle("view").is_none());
        assert!(!baton.catch_errors);
        assert!(baton.disposed);
    }
}
