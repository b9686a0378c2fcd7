//! Capability interfaces invoked by the dispatchers.
//!
//! An extension contributes behavior through two typed capabilities:
//!
//! - [`Hook`] — synchronous, registered under a hook name
//!   (`"draw"`, `"initialize"`, ...) and fired by [`Point::invoke`].
//! - [`Perform`] — asynchronous, at most one per extension, chained by
//!   [`Point::cascade`] as a strictly sequential waterfall.
//!
//! Both report their outcome as a value; the dispatcher decides
//! continuation from the returned result, never from unwinding.
//!
//! [`Point::invoke`]: crate::point::Point::invoke
//! [`Point::cascade`]: crate::point::Point::cascade

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use groupware_core::EngineResult;

use crate::baton::Baton;

/// Result of a single synchronous hook invocation.
///
/// `Ok(Some(value))` feeds the value into the invoke report;
/// `Err` is captured and logged by the dispatcher without aborting
/// sibling extensions.
pub type HookResult = EngineResult<Option<Value>>;

/// A synchronous callback capability.
pub trait Hook: Send + Sync {
    /// Run the hook against the current dispatch context.
    fn run(&self, baton: &mut Baton) -> HookResult;
}

/// A closure-based hook for quick registration.
pub struct ClosureHook {
    f: Box<dyn Fn(&mut Baton) -> HookResult + Send + Sync>,
}

impl fmt::Debug for ClosureHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureHook")
            .field("f", &"<closure>")
            .finish()
    }
}

impl Hook for ClosureHook {
    fn run(&self, baton: &mut Baton) -> HookResult {
        (self.f)(baton)
    }
}

/// Wraps a closure into an `Arc<dyn Hook>`.
pub fn hook_fn<F>(f: F) -> Arc<dyn Hook>
where
    F: Fn(&mut Baton) -> HookResult + Send + Sync + 'static,
{
    Arc::new(ClosureHook { f: Box::new(f) })
}

/// Value produced by a fulfilled cascade step.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Arbitrary step output; the cascade resolves with the last one
    /// produced.
    pub value: Option<Value>,
    /// Warnings to copy onto the baton.
    pub warnings: Option<Value>,
}

impl StepOutput {
    /// An empty (unit) step output.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A step output carrying a value.
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Some(value),
            warnings: None,
        }
    }

    /// Attach warnings to this output.
    pub fn warnings(mut self, warnings: Value) -> Self {
        self.warnings = Some(warnings);
        self
    }
}

/// Rejection produced by a cascade step.
///
/// When the baton's `catch_errors` policy is active the fields are
/// copied onto the baton and the chain continues; otherwise the error
/// propagates to the cascade caller.
#[derive(Debug, Clone, Default, Error)]
#[error("cascade step rejected: {error:?} (code: {code:?})")]
pub struct StepError {
    /// Human-readable error description.
    pub error: Option<String>,
    /// Machine-readable error code.
    pub code: Option<String>,
    /// Warnings accumulated up to the failure.
    pub warnings: Option<Value>,
}

impl StepError {
    /// Create a step error with a description.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            code: None,
            warnings: None,
        }
    }

    /// Attach an error code.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach warnings.
    pub fn warnings(mut self, warnings: Value) -> Self {
        self.warnings = Some(warnings);
        self
    }
}

/// Result of a single cascade step.
pub type StepResult = Result<StepOutput, StepError>;

/// The asynchronous waterfall capability.
///
/// Steps are awaited strictly in order; step N+1 begins only after
/// step N settles. There is no timeout: a hung step stalls the
/// remainder of the cascade.
#[async_trait]
pub trait Perform: Send + Sync {
    /// Execute this extension's cascade step.
    async fn perform(&self, baton: &mut Baton) -> StepResult;
}

type PerformFn = Box<dyn Fn(&mut Baton) -> BoxFuture<'static, StepResult> + Send + Sync>;

/// A closure-based cascade step for quick registration.
pub struct ClosurePerform {
    f: PerformFn,
}

impl fmt::Debug for ClosurePerform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosurePerform")
            .field("f", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl Perform for ClosurePerform {
    async fn perform(&self, baton: &mut Baton) -> StepResult {
        let fut = (self.f)(baton);
        fut.await
    }
}

/// Wraps a closure into an `Arc<dyn Perform>`.
///
/// The closure receives the baton synchronously (mutate it before
/// returning the future); steps that must hold the baton across an
/// await implement [`Perform`] directly.
///
/// ```rust,ignore
/// let step = perform_fn(|baton| {
///     baton.prevent_default();
///     async { Ok(StepOutput::empty()) }
/// });
/// ```
pub fn perform_fn<F, Fut>(f: F) -> Arc<dyn Perform>
where
    F: Fn(&mut Baton) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = StepResult> + Send + 'static,
{
    Arc::new(ClosurePerform {
        f: Box::new(move |baton| -> BoxFuture<'static, StepResult> { Box::pin(f(baton)) }),
    })
}

/// Why a descriptor was skipped during a fire-each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The baton disabled this extension for this pass.
    Disabled,
    /// The descriptor registers no hook under the dispatched name.
    NoHandler,
}

/// Per-extension outcome of a fire-each pass.
#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    /// The hook ran to completion.
    Invoked {
        /// Extension id.
        extension: String,
        /// Value returned by the hook, if any.
        value: Option<Value>,
    },
    /// The hook was not called.
    Skipped {
        /// Extension id.
        extension: String,
        /// Why it was skipped.
        reason: SkipReason,
    },
    /// The hook returned an error (logged, siblings unaffected).
    Failed {
        /// Extension id.
        extension: String,
        /// Error description.
        error: String,
    },
}

/// Aggregated result of one fire-each pass over a point.
#[derive(Debug, Clone)]
pub struct InvokeReport {
    /// The dispatching point.
    pub point: String,
    /// The hook name that was dispatched.
    pub hook: String,
    /// Outcomes in dispatch order. Extensions behind a propagation
    /// stop do not appear.
    pub outcomes: Vec<InvokeOutcome>,
    /// Whether the pass was cut short by `stop_propagation`.
    pub stopped: bool,
}

impl InvokeReport {
    pub(crate) fn new(point: &str, hook: &str) -> Self {
        Self {
            point: point.to_string(),
            hook: hook.to_string(),
            outcomes: Vec::new(),
            stopped: false,
        }
    }

    /// Values produced by successfully invoked hooks.
    pub fn values(&self) -> Vec<&Value> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                InvokeOutcome::Invoked {
                    value: Some(v), ..
                } => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Number of hooks that actually ran.
    pub fn invoked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, InvokeOutcome::Invoked { .. }))
            .count()
    }

    /// Number of hooks that returned an error.
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, InvokeOutcome::Failed { .. }))
            .count()
    }
}
