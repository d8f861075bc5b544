//! Callback Registry (C2): register, discover, and invoke user hooks at the
//! seven lifecycle points.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::model::{Script, ScriptSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeJob,
    AfterJob,
    BeforeTenant,
    AfterTenant,
    BeforeScript,
    AfterScript,
    OnError,
}

impl HookKind {
    pub const ALL: [HookKind; 7] = [
        HookKind::BeforeJob,
        HookKind::AfterJob,
        HookKind::BeforeTenant,
        HookKind::AfterTenant,
        HookKind::BeforeScript,
        HookKind::AfterScript,
        HookKind::OnError,
    ];

    fn index(self) -> usize {
        match self {
            HookKind::BeforeJob => 0,
            HookKind::AfterJob => 1,
            HookKind::BeforeTenant => 2,
            HookKind::AfterTenant => 3,
            HookKind::BeforeScript => 4,
            HookKind::AfterScript => 5,
            HookKind::OnError => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::BeforeJob => "before_job",
            HookKind::AfterJob => "after_job",
            HookKind::BeforeTenant => "before_tenant",
            HookKind::AfterTenant => "after_tenant",
            HookKind::BeforeScript => "before_script",
            HookKind::AfterScript => "after_script",
            HookKind::OnError => "on_error",
        }
    }
}

/// Context passed to every handler invocation.
#[derive(Debug, Clone)]
pub struct CallbackContext {
    pub job_id: String,
    pub tenant_id: String,
    pub script: Option<Script>,
    pub scripts: ScriptSet,
    pub current_script_index: i64,
    pub metadata: Map<String, Value>,
}

impl CallbackContext {
    pub fn new(job_id: impl Into<String>, tenant_id: impl Into<String>, scripts: ScriptSet) -> Self {
        CallbackContext {
            job_id: job_id.into(),
            tenant_id: tenant_id.into(),
            script: None,
            scripts,
            current_script_index: -1,
            metadata: Map::new(),
        }
    }
}

/// Uniform outcome of a handler invocation. Maps "returns nothing", "returns
/// bool", "returns a mapping", "returns a result", and "raises" from the
/// source reflection-based system onto one tagged variant.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    Proceed(Option<Map<String, Value>>),
    Skip(Option<String>),
    Fail(String),
}

impl HookOutcome {
    pub fn ok() -> Self {
        HookOutcome::Proceed(None)
    }
}

/// One registered handler. Object-safe so handlers can be stored as
/// `Arc<dyn Handler>` and invoked uniformly regardless of what closure or
/// struct backs them.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, ctx: &mut CallbackContext) -> HookOutcome;

    /// Name surfaced in `HookError { handler, .. }`; defaults to a generic
    /// label since most handlers are anonymous closures.
    fn name(&self) -> &str {
        "handler"
    }
}

/// Wraps a plain async closure as a `Handler`, the common case for in-process
/// registration and tests.
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        FnHandler {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(&mut CallbackContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = HookOutcome> + Send,
{
    async fn invoke(&self, ctx: &mut CallbackContext) -> HookOutcome {
        (self.func)(ctx).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered handler lists for each of the seven hook points.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    handlers: [Vec<Arc<dyn Handler>>; 7],
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: HookKind, handler: Arc<dyn Handler>) {
        self.handlers[kind.index()].push(handler);
    }

    /// Invokes every handler registered for `kind` in registration order.
    /// Stops at the first `Fail` or `Skip` outcome; merges `Proceed`
    /// metadata into `ctx.metadata` before continuing.
    pub async fn run(&self, kind: HookKind, ctx: &mut CallbackContext) -> HookOutcome {
        for handler in &self.handlers[kind.index()] {
            match handler.invoke(ctx).await {
                HookOutcome::Proceed(metadata) => {
                    if let Some(extra) = metadata {
                        ctx.metadata.extend(extra);
                    }
                }
                skip @ HookOutcome::Skip(_) => return skip,
                fail @ HookOutcome::Fail(_) => return fail,
            }
        }
        HookOutcome::ok()
    }

    pub fn handler_count(&self, kind: HookKind) -> usize {
        self.handlers[kind.index()].len()
    }
}
