//! A named extension point: ordered, enable/disable-able extensions
//! plus the two dispatch primitives.
//!
//! Fire-each (`invoke`/`fire`):
//! - Hooks run in sorted order; a failed hook is logged and never
//!   aborts its siblings.
//! - In context mode the baton's propagation stop aborts the
//!   remainder and per-baton disables skip single extensions.
//!
//! Waterfall (`cascade`):
//! - `Perform` steps are awaited strictly in sequence.
//! - A rejected step is either captured onto the baton
//!   (`catch_errors`) with the chain continuing, or propagated to the
//!   caller with the remaining steps never run.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use rand::seq::SliceRandom;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use groupware_core::events::PointEvent;
use groupware_core::{EngineError, EngineResult};

use crate::baton::{Baton, InvokeMarker};
use crate::descriptor::{ExtensionPatch, ExtensionSpec, Index, PendingPatch};
use crate::hooks::{InvokeOutcome, InvokeReport, SkipReason, StepError};
use crate::order::{self, Orphans};

/// Extension id that disables/enables the entire point.
pub const WHOLE_POINT: &str = "*";

/// Hook name reserved for the dispatcher itself.
pub const RESERVED_HOOK: &str = "invoke";

type Listener = Box<dyn Fn(&PointEvent) + Send + Sync>;

#[derive(Default)]
struct PointInner {
    /// Always the result of the last successful sort.
    extensions: Vec<ExtensionSpec>,
    /// Disabled extension ids, possibly containing `"*"`.
    disabled: HashSet<String>,
    /// Replacements queued for not-yet-registered ids.
    replacements: HashMap<String, Vec<PendingPatch>>,
    /// Before/after attachments waiting for their target.
    orphans: Orphans,
}

impl PointInner {
    fn has(&self, id: &str) -> bool {
        self.extensions.iter().any(|e| e.id == id)
    }
}

/// One named extension point.
pub struct Point {
    id: String,
    debug: bool,
    inner: RwLock<PointInner>,
    listeners: Mutex<Vec<Listener>>,
}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Point")
            .field("id", &self.id)
            .field("count", &self.count())
            .finish()
    }
}

impl Point {
    /// Create an empty point.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_debug(id, false)
    }

    pub(crate) fn with_debug(id: impl Into<String>, debug: bool) -> Self {
        Self {
            id: id.into(),
            debug,
            inner: RwLock::new(PointInner::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The point id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The reserved dispatch hook must never appear on a descriptor,
    /// whether registered directly or merged in by a replacement.
    fn reject_reserved_hook(&self, spec: &ExtensionSpec) -> EngineResult<()> {
        if spec.hooks.contains_key(RESERVED_HOOK) {
            return Err(EngineError::registration(format!(
                "extensions must not register their own '{RESERVED_HOOK}' hook \
                 (point '{}', extension '{}')",
                self.id, spec.id
            )));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PointInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PointInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Registration ──

    /// Register an extension.
    ///
    /// Assigns defaults (see [`ExtensionSpec`]), applies queued
    /// replacements, appends, and re-sorts. A duplicate id is logged
    /// and skipped, first registration wins. Fatal misconfiguration
    /// (a reserved `invoke` hook, a non-primitive `enabled` property,
    /// a before/after cycle) returns an error and leaves the point
    /// unchanged.
    pub fn extend(&self, mut spec: ExtensionSpec) -> EngineResult<&Self> {
        self.reject_reserved_hook(&spec)?;

        let mut start_disabled = matches!(spec.enabled.take(), Some(false));
        if let Some(value) = spec.props.remove("enabled") {
            start_disabled |= !enabled_prop(&self.id, &spec.id, value)?;
        }

        let mut inner = self.write();

        if inner.has(&spec.id) {
            if self.debug {
                warn!(
                    point = %self.id,
                    extension = %spec.id,
                    descriptor = ?spec,
                    "duplicate extension id skipped, ids must be unique within a point"
                );
            } else {
                warn!(
                    point = %self.id,
                    extension = %spec.id,
                    "duplicate extension id skipped, ids must be unique within a point"
                );
            }
            return Ok(self);
        }

        if let Some(pending) = inner.replacements.get(&spec.id) {
            for patch in pending {
                patch.apply(&mut spec);
            }
            // replacements can add hooks, so the reserved name is
            // re-checked on the patched descriptor
            self.reject_reserved_hook(&spec)?;
        }

        let ext_id = spec.id.clone();
        let mut candidate = inner.extensions.clone();
        candidate.push(spec);
        let (ordered, orphans) = order::sort(&self.id, candidate, inner.orphans.clone())?;

        // commit only after a successful sort
        inner.replacements.remove(&ext_id);
        if start_disabled {
            inner.disabled.insert(ext_id.clone());
        }
        inner.extensions = ordered;
        inner.orphans = orphans;
        drop(inner);

        self.emit(&PointEvent::Extended {
            point: self.id.clone(),
            extension: ext_id,
        });
        Ok(self)
    }

    /// Register several extensions at once.
    pub fn extend_all(
        &self,
        specs: impl IntoIterator<Item = ExtensionSpec>,
    ) -> EngineResult<&Self> {
        for spec in specs {
            self.extend(spec)?;
        }
        Ok(self)
    }

    /// Merge a patch into the extension with the given id, re-sorting
    /// afterwards. If the id has not registered yet the patch is
    /// queued and applied automatically the moment it does.
    pub fn replace(&self, id: &str, patch: ExtensionPatch) -> EngineResult<&Self> {
        self.apply_replacement(id, PendingPatch::Literal(patch))
    }

    /// Like [`replace`](Self::replace), but the patch is computed from
    /// a copy of the original descriptor.
    pub fn replace_with<F>(&self, id: &str, f: F) -> EngineResult<&Self>
    where
        F: Fn(&ExtensionSpec) -> ExtensionPatch + Send + Sync + 'static,
    {
        self.apply_replacement(id, PendingPatch::Mapped(std::sync::Arc::new(f)))
    }

    fn apply_replacement(&self, id: &str, patch: PendingPatch) -> EngineResult<&Self> {
        if id.is_empty() {
            return Err(EngineError::registration("replacements must have an id"));
        }
        if let PendingPatch::Literal(literal) = &patch
            && literal.hooks.contains_key(RESERVED_HOOK)
        {
            return Err(EngineError::registration(format!(
                "replacements must not register an '{RESERVED_HOOK}' hook \
                 (point '{}', extension '{id}')",
                self.id
            )));
        }

        let mut inner = self.write();
        if let Some(pos) = inner.extensions.iter().position(|e| e.id == id) {
            let mut spec = inner.extensions[pos].clone();
            patch.apply(&mut spec);
            self.reject_reserved_hook(&spec)?;
            let mut candidate = inner.extensions.clone();
            candidate[pos] = spec;
            let (ordered, orphans) = order::sort(&self.id, candidate, inner.orphans.clone())?;
            inner.extensions = ordered;
            inner.orphans = orphans;
        } else {
            debug!(
                point = %self.id,
                extension = id,
                "queueing replacement for an unregistered extension id"
            );
            inner
                .replacements
                .entry(id.to_string())
                .or_default()
                .push(patch);
        }
        Ok(self)
    }

    /// Wipe all descriptors and pending replacements.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.extensions.clear();
        inner.replacements.clear();
        inner.orphans = Orphans::default();
        drop(inner);

        self.emit(&PointEvent::Cleared {
            point: self.id.clone(),
        });
    }

    // ── Enable / disable ──

    /// Disable an extension (or the whole point via `"*"`). The
    /// descriptor stays visible to `all()`/`keys()`.
    pub fn disable(&self, id: &str) -> &Self {
        self.write().disabled.insert(id.to_string());
        self
    }

    /// Re-enable an extension (or the whole point via `"*"`).
    pub fn enable(&self, id: &str) -> &Self {
        self.write().disabled.remove(id);
        self
    }

    /// Toggle an extension. With an explicit state, `true` enables;
    /// without one, flips the current state.
    pub fn toggle(&self, id: &str, state: Option<bool>) -> &Self {
        let currently_disabled = self.read().disabled.contains(id);
        match state.unwrap_or(currently_disabled) {
            true => self.enable(id),
            false => self.disable(id),
        }
    }

    /// Whether an extension is enabled (and the point itself is not
    /// wholesale disabled).
    pub fn is_enabled(&self, id: &str) -> bool {
        let inner = self.read();
        !inner.disabled.contains(id) && !inner.disabled.contains(WHOLE_POINT)
    }

    // ── Inspection ──

    /// All descriptors irrespective of enabled state, sorted.
    pub fn all(&self) -> Vec<ExtensionSpec> {
        self.read().extensions.clone()
    }

    /// All descriptor ids irrespective of enabled state, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.read().extensions.iter().map(|e| e.id.clone()).collect()
    }

    /// Whether an extension with this id is registered.
    pub fn has(&self, id: &str) -> bool {
        self.read().has(id)
    }

    /// Look up one descriptor by id.
    pub fn get(&self, id: &str) -> Option<ExtensionSpec> {
        self.read().extensions.iter().find(|e| e.id == id).cloned()
    }

    fn enabled_snapshot(&self) -> Vec<ExtensionSpec> {
        let inner = self.read();
        if inner.disabled.contains(WHOLE_POINT) {
            return Vec::new();
        }
        inner
            .extensions
            .iter()
            .filter(|e| !inner.disabled.contains(&e.id))
            .cloned()
            .collect()
    }

    /// Enabled descriptors in sorted order.
    pub fn list(&self) -> Vec<ExtensionSpec> {
        self.enabled_snapshot()
    }

    /// Number of enabled descriptors.
    pub fn count(&self) -> usize {
        self.enabled_snapshot().len()
    }

    /// Iterate enabled descriptors in order.
    pub fn each(&self, mut f: impl FnMut(&ExtensionSpec)) -> &Self {
        for ext in self.enabled_snapshot() {
            f(&ext);
        }
        self
    }

    /// Map over enabled descriptors in order.
    pub fn map<T>(&self, mut f: impl FnMut(&ExtensionSpec) -> T) -> Vec<T> {
        self.enabled_snapshot().iter().map(|e| f(e)).collect()
    }

    /// Filter enabled descriptors.
    pub fn filter(&self, mut pred: impl FnMut(&ExtensionSpec) -> bool) -> Vec<ExtensionSpec> {
        self.enabled_snapshot()
            .into_iter()
            .filter(|e| pred(e))
            .collect()
    }

    /// Fold over enabled descriptors in order.
    pub fn reduce<T>(&self, mut f: impl FnMut(T, &ExtensionSpec) -> T, seed: T) -> T {
        let mut acc = seed;
        for ext in self.enabled_snapshot() {
            acc = f(acc, &ext);
        }
        acc
    }

    /// Collect one property across enabled descriptors, in order.
    pub fn pluck(&self, attr: &str) -> Vec<Option<Value>> {
        self.enabled_snapshot()
            .iter()
            .map(|e| e.props.get(attr).cloned())
            .collect()
    }

    /// Merge every enabled descriptor's properties into one map;
    /// later descriptors overwrite earlier ones per key.
    pub fn options(&self, defaults: Map<String, Value>) -> Map<String, Value> {
        let mut options = defaults;
        for ext in self.enabled_snapshot() {
            for (key, value) in ext.props {
                options.insert(key, value);
            }
        }
        // bookkeeping keys never leak into merged options
        options.remove("id");
        options.remove("index");
        options
    }

    /// First non-null value of a property across enabled descriptors.
    pub fn prop(&self, attr: &str) -> Option<Value> {
        self.enabled_snapshot()
            .iter()
            .find_map(|e| match e.props.get(attr) {
                Some(Value::Null) | None => None,
                Some(value) => Some(value.clone()),
            })
    }

    /// Log the full point state at debug level.
    pub fn inspect(&self) {
        let inner = self.read();
        debug!(
            point = %self.id,
            extensions = ?inner.extensions,
            disabled = ?inner.disabled,
            pending_replacements = inner.replacements.len(),
            orphans = inner.orphans.len(),
            "extension point state"
        );
    }

    // ── Ordering ──

    /// Re-run the ordering algorithm. Public for testing purposes;
    /// every mutation sorts on its own.
    pub fn sort(&self) -> EngineResult<&Self> {
        let mut inner = self.write();
        let (ordered, orphans) =
            order::sort(&self.id, inner.extensions.clone(), inner.orphans.clone())?;
        inner.extensions = ordered;
        inner.orphans = orphans;
        Ok(self)
    }

    /// Testing aid: randomize descriptor order and reassign indices to
    /// match the new positions, to assert that dispatch code does not
    /// depend on accidental ordering.
    pub fn shuffle(&self) -> &Self {
        let mut inner = self.write();
        inner.extensions.shuffle(&mut rand::rng());
        for (i, ext) in inner.extensions.iter_mut().enumerate() {
            ext.index = Index::At(100 + 100 * i as i64);
        }
        self
    }

    // ── Events ──

    /// Observe registry mutations on this point.
    pub fn observe(&self, listener: impl Fn(&PointEvent) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    fn emit(&self, event: &PointEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event);
        }
    }

    // ── Dispatch ──

    /// Fire-each in context mode.
    ///
    /// Runs the named hook of every enabled descriptor in order. The
    /// baton learns which point/hook is dispatching (restored when the
    /// pass completes); a propagation stop aborts the remainder;
    /// per-baton disables skip single descriptors; a failed hook is
    /// logged with full diagnostics and its siblings still run.
    pub fn invoke(&self, hook: &str, baton: &mut Baton) -> InvokeReport {
        let snapshot = self.enabled_snapshot();
        let mut report = InvokeReport::new(&self.id, hook);

        let previous = baton.invoke.replace(InvokeMarker {
            point: self.id.clone(),
            hook: hook.to_string(),
        });

        for ext in &snapshot {
            if baton.is_propagation_stopped() {
                report.stopped = true;
                break;
            }
            if baton.is_disabled(&self.id, &ext.id) {
                report.outcomes.push(InvokeOutcome::Skipped {
                    extension: ext.id.clone(),
                    reason: SkipReason::Disabled,
                });
                continue;
            }
            let Some(handler) = ext.hook(hook) else {
                report.outcomes.push(InvokeOutcome::Skipped {
                    extension: ext.id.clone(),
                    reason: SkipReason::NoHandler,
                });
                continue;
            };

            baton.extension = Some(ext.id.clone());
            match handler.run(baton) {
                Ok(value) => report.outcomes.push(InvokeOutcome::Invoked {
                    extension: ext.id.clone(),
                    value,
                }),
                Err(e) => {
                    error!(
                        point = %self.id,
                        hook = hook,
                        extension = %ext.id,
                        baton = %baton.id,
                        error = %e,
                        "extension hook failed"
                    );
                    report.outcomes.push(InvokeOutcome::Failed {
                        extension: ext.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        baton.extension = None;
        baton.invoke = previous;
        report
    }

    /// Fire-each in plain mode: a throwaway baton, no flow checks.
    /// Fault isolation is identical to context mode.
    pub fn fire(&self, hook: &str) -> InvokeReport {
        let snapshot = self.enabled_snapshot();
        let mut report = InvokeReport::new(&self.id, hook);
        let mut baton = Baton::new();
        baton.invoke = Some(InvokeMarker {
            point: self.id.clone(),
            hook: hook.to_string(),
        });

        for ext in &snapshot {
            let Some(handler) = ext.hook(hook) else {
                report.outcomes.push(InvokeOutcome::Skipped {
                    extension: ext.id.clone(),
                    reason: SkipReason::NoHandler,
                });
                continue;
            };
            baton.extension = Some(ext.id.clone());
            match handler.run(&mut baton) {
                Ok(value) => report.outcomes.push(InvokeOutcome::Invoked {
                    extension: ext.id.clone(),
                    value,
                }),
                Err(e) => {
                    error!(
                        point = %self.id,
                        hook = hook,
                        extension = %ext.id,
                        baton = %baton.id,
                        error = %e,
                        "extension hook failed"
                    );
                    report.outcomes.push(InvokeOutcome::Failed {
                        extension: ext.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Waterfall over every enabled descriptor's `Perform` step,
    /// strictly sequential. Resolves with the last value a step
    /// produced.
    ///
    /// Descriptors without a step are skipped. A fulfilled step's
    /// warnings are copied onto the baton. A rejected step follows the
    /// baton's `catch_errors` policy: captured (error/code/warnings
    /// copied, `rejected` set, chain continues) or propagated (the
    /// remaining steps never run).
    pub async fn cascade(&self, baton: &mut Baton) -> Result<Option<Value>, StepError> {
        let snapshot = self.enabled_snapshot();
        let previous = baton.invoke.replace(InvokeMarker {
            point: self.id.clone(),
            hook: "perform".to_string(),
        });

        let result = self.run_cascade(&snapshot, baton).await;

        baton.extension = None;
        baton.invoke = previous;
        result
    }

    async fn run_cascade(
        &self,
        snapshot: &[ExtensionSpec],
        baton: &mut Baton,
    ) -> Result<Option<Value>, StepError> {
        let mut last = None;
        for ext in snapshot {
            if baton.is_propagation_stopped() {
                break;
            }
            if baton.is_disabled(&self.id, &ext.id) {
                continue;
            }
            let Some(perform) = &ext.perform else {
                continue;
            };

            baton.extension = Some(ext.id.clone());
            debug!(point = %self.id, extension = %ext.id, baton = %baton.id, "cascade step");
            match perform.perform(baton).await {
                Ok(output) => {
                    if output.value.is_some() {
                        last = output.value;
                    }
                    if let Some(warnings) = output.warnings {
                        baton.warning = Some(warnings);
                    }
                }
                Err(err) => {
                    if baton.catch_errors {
                        if let Some(e) = &err.error {
                            baton.error = Some(e.clone());
                        }
                        if let Some(code) = &err.code {
                            baton.error_code = Some(code.clone());
                        }
                        if let Some(warnings) = &err.warnings {
                            baton.warning = Some(warnings.clone());
                        }
                        baton.rejected = true;
                    } else {
                        error!(
                            point = %self.id,
                            extension = %ext.id,
                            baton = %baton.id,
                            error = %err,
                            "cascade step rejected"
                        );
                        return Err(err);
                    }
                }
            }
        }
        Ok(last)
    }
}

/// Interpret a JSON `enabled` property. Objects and arrays are a
/// fatal configuration error; primitives use their truthiness.
fn enabled_prop(point_id: &str, ext_id: &str, value: Value) -> EngineResult<bool> {
    match value {
        Value::Object(_) | Value::Array(_) => Err(EngineError::configuration(format!(
            "extending '{point_id}' with '{ext_id}' failed: the 'enabled' property must be a primitive"
        ))),
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64() != Some(0.0)),
        Value::String(s) => Ok(!s.is_empty()),
    }
}
