//! # groupware-ext
//!
//! Extension-point and context-propagation engine for the groupware
//! client. Provides:
//!
//! - A registry of named extension points, created lazily on lookup
//! - Extension registration with deterministic ordering (index
//!   sentinels, before/after relations, cycle detection)
//! - Enable/disable and in-place replacement of extensions
//! - A fault-isolating synchronous fire-each dispatcher
//! - An asynchronous waterfall dispatcher (`cascade`) with
//!   policy-controlled error capture
//! - The baton: a per-dispatch context object carrying payload plus
//!   cancellation and per-pass disable flags

pub mod baton;
pub mod descriptor;
pub mod hooks;
mod order;
pub mod point;
pub mod prelude;
pub mod registry;

pub use baton::{Baton, BatonSlot, Handle, InvokeMarker};
pub use descriptor::{ExtensionPatch, ExtensionSpec, Index, Placement};
pub use hooks::{
    Hook, HookResult, InvokeOutcome, InvokeReport, Perform, SkipReason, StepError, StepOutput,
    StepResult, hook_fn, perform_fn,
};
pub use point::{Point, RESERVED_HOOK, WHOLE_POINT};
pub use registry::Registry;
