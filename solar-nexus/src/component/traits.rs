use async_trait::async_trait;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::application::Context;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a mounted component instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(NonZeroU64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Behavior bound to a tagged element. Both hooks are optional.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Called once after the component is bound to its element. An error
    /// marks the element as failed and is returned to the caller of
    /// [`crate::ComponentRegistry::init`].
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let _ = cx;
        Ok(())
    }

    /// Called when the instance is destroyed. Release timers, tasks and
    /// subscriptions here.
    fn teardown(&mut self, cx: &mut Context) {
        let _ = cx;
    }
}

/// A loaded component: a factory producing fresh instances.
#[derive(Clone)]
pub struct ComponentDefinition {
    factory: Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>,
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition").finish_non_exhaustive()
    }
}

impl ComponentDefinition {
    pub fn new<F, C>(factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Component,
    {
        Self {
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Component>),
        }
    }

    /// Definition for a component built with `Default`.
    pub fn of<C: Component + Default>() -> Self {
        Self::new(C::default)
    }

    pub fn instantiate(&self) -> Box<dyn Component> {
        (self.factory)()
    }

    /// Whether both handles point at the same definition.
    pub fn same_as(&self, other: &ComponentDefinition) -> bool {
        Arc::ptr_eq(&self.factory, &other.factory)
    }
}
