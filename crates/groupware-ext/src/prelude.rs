//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use groupware_core::events::PointEvent;
pub use groupware_core::{EngineError, EngineResult};

pub use crate::baton::{Baton, BatonSlot, Handle};
pub use crate::descriptor::{ExtensionPatch, ExtensionSpec};
pub use crate::hooks::{
    Hook, HookResult, InvokeReport, Perform, StepError, StepOutput, StepResult, hook_fn,
    perform_fn,
};
pub use crate::point::Point;
pub use crate::registry::Registry;
