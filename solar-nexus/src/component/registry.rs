//! Discovery, loading, mounting and teardown of tagged elements.
//!
//! Elements opt in with `data-component="<name>"`. Each element moves
//! through `tagged -> loading -> initialized` (or `-> error`), reflected in
//! `data-component-state`; `destroy` moves an initialized element to
//! `removed`.

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::loader::{ModuleSource, module_path};
use super::traits::{Component, ComponentDefinition, InstanceId};
use crate::application::{AppContext, Context};
use crate::dom::ElementId;
use crate::error::{Error, Result};
use crate::events::{Event, panic_message};
use crate::router::ResolvedRoute;

/// Marks an element for auto-initialization; the value is the component name.
pub const COMPONENT_ATTR: &str = "data-component";
/// Set once an element's component has initialized.
pub const INITIALIZED_ATTR: &str = "data-initialized";
/// Id of the instance bound to an element.
pub const INSTANCE_ATTR: &str = "data-component-id";
/// Lifecycle state of the element, see [`ElementState`].
pub const STATE_ATTR: &str = "data-component-state";
/// Error indicator carrying the failure message.
pub const ERROR_ATTR: &str = "data-component-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Tagged,
    Loading,
    Initialized,
    Error,
    Removed,
}

impl ElementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementState::Tagged => "tagged",
            ElementState::Loading => "loading",
            ElementState::Initialized => "initialized",
            ElementState::Error => "error",
            ElementState::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "tagged" => ElementState::Tagged,
            "loading" => ElementState::Loading,
            "initialized" => ElementState::Initialized,
            "error" => ElementState::Error,
            "removed" => ElementState::Removed,
            _ => return None,
        })
    }
}

/// Extra inputs for [`ComponentRegistry::init`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Route the component is mounted for, if any.
    pub route: Option<ResolvedRoute>,
    /// Load from this module path instead of the conventional one.
    pub module_path: Option<String>,
    /// Free-form options handed to the component.
    pub options: Value,
}

/// Outcome of an auto-initialization scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoInitReport {
    pub successful: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl AutoInitReport {
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }
}

struct Mounted {
    component: Box<dyn Component>,
    cx: Context,
}

/// A live component instance.
#[derive(Clone)]
pub struct Instance {
    id: InstanceId,
    name: String,
    element: ElementId,
    mounted: Arc<tokio::sync::Mutex<Mounted>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("element", &self.element)
            .finish()
    }
}

impl Instance {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element(&self) -> ElementId {
        self.element
    }
}

type PendingLoad = Shared<BoxFuture<'static, std::result::Result<ComponentDefinition, String>>>;
type PendingInit = Shared<BoxFuture<'static, std::result::Result<InstanceId, InitFailure>>>;

/// Failure of an in-flight `init`, replayed to every caller that joined it.
#[derive(Debug, Clone)]
enum InitFailure {
    Load { path: String, reason: String },
    Init { reason: String },
}

impl InitFailure {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::Load { path, reason, .. } => InitFailure::Load {
                path: path.clone(),
                reason: reason.clone(),
            },
            Error::Init { reason, .. } => InitFailure::Init { reason: reason.clone() },
            other => InitFailure::Init {
                reason: other.to_string(),
            },
        }
    }

    fn into_error(self, name: &str) -> Error {
        match self {
            InitFailure::Load { path, reason } => Error::Load {
                name: name.to_string(),
                path,
                reason,
            },
            InitFailure::Init { reason } => Error::Init {
                name: name.to_string(),
                reason,
            },
        }
    }
}

/// What an element holds for one component name.
enum Claim {
    /// Initialization is running; later callers await the same outcome.
    Pending(PendingInit),
    Live(InstanceId),
}

#[derive(Default)]
struct RegistryInner {
    definitions: HashMap<String, ComponentDefinition>,
    pending: HashMap<String, PendingLoad>,
    instances: BTreeMap<InstanceId, Instance>,
    /// One claim per (element, component) pair, taken before the first await.
    claims: HashMap<(ElementId, String), Claim>,
    disabled: HashSet<String>,
}

/// Registry of component definitions and live instances. Clones share state.
#[derive(Clone)]
pub struct ComponentRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    source: Arc<dyn ModuleSource>,
    app: AppContext,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ComponentRegistry")
            .field("definitions", &inner.definitions.len())
            .field("instances", &inner.instances.len())
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new(app: AppContext, source: Arc<dyn ModuleSource>) -> Self {
        Self {
            inner: Arc::default(),
            source,
            app,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a definition directly, bypassing the module source.
    pub fn register(&self, name: &str, definition: ComponentDefinition) {
        self.lock().definitions.insert(name.to_string(), definition);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().definitions.contains_key(name)
    }

    /// Exclude `name` from auto-initialization scans.
    pub fn disable(&self, name: &str) {
        self.lock().disabled.insert(name.to_string());
    }

    pub fn enable(&self, name: &str) {
        self.lock().disabled.remove(name);
    }

    /// Load the definition for `name` from its conventional module path.
    pub async fn load(&self, name: &str) -> Result<ComponentDefinition> {
        self.load_from(name, None).await
    }

    /// Load the definition for `name`, optionally from an explicit path.
    ///
    /// Loaded definitions are cached. Concurrent loads of the same name share
    /// one fetch and observe the same result; a failed load is not retried
    /// automatically but a later call starts a fresh fetch.
    pub async fn load_from(&self, name: &str, path: Option<&str>) -> Result<ComponentDefinition> {
        let path = path.map_or_else(|| module_path(name), str::to_string);
        let pending = {
            let mut inner = self.lock();
            if let Some(definition) = inner.definitions.get(name) {
                return Ok(definition.clone());
            }
            match inner.pending.get(name) {
                Some(pending) => pending.clone(),
                None => {
                    tracing::debug!(component = name, %path, "loading component");
                    let source = Arc::clone(&self.source);
                    let fetch_path = path.clone();
                    let pending = async move {
                        source
                            .fetch(&fetch_path)
                            .await
                            .map_err(|err| format!("{err:#}"))
                    }
                    .boxed()
                    .shared();
                    inner.pending.insert(name.to_string(), pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;

        let mut inner = self.lock();
        // A newer fetch may have replaced ours after an earlier waiter left.
        if inner.pending.get(name).is_some_and(|current| current.ptr_eq(&pending)) {
            inner.pending.remove(name);
        }
        match outcome {
            Ok(definition) => Ok(inner
                .definitions
                .entry(name.to_string())
                .or_insert(definition)
                .clone()),
            Err(reason) => Err(Error::Load {
                name: name.to_string(),
                path,
                reason,
            }),
        }
    }

    /// Bind component `name` to `element`.
    ///
    /// Initializing an element that already holds an instance of `name`
    /// returns that instance's id without doing anything. A call made while
    /// another is still initializing the same element waits for it and gets
    /// the same outcome. On failure the element is marked with the error
    /// indicator and the error is returned so the caller may retry.
    pub async fn init(&self, name: &str, element: ElementId, options: InitOptions) -> Result<InstanceId> {
        let pending = {
            let mut inner = self.lock();
            let key = (element, name.to_string());
            let joined = match inner.claims.get(&key) {
                Some(Claim::Live(id)) => return Ok(*id),
                Some(Claim::Pending(pending)) => Some(pending.clone()),
                None => None,
            };
            match joined {
                Some(pending) => pending,
                None => {
                    let registry = self.clone();
                    let owned_name = name.to_string();
                    let pending = async move {
                        registry
                            .mount(&owned_name, element, options)
                            .await
                            .map_err(|error| InitFailure::from_error(&error))
                    }
                    .boxed()
                    .shared();
                    inner.claims.insert(key, Claim::Pending(pending.clone()));
                    pending
                }
            }
        };
        pending.await.map_err(|failure| failure.into_error(name))
    }

    async fn mount(&self, name: &str, element: ElementId, options: InitOptions) -> Result<InstanceId> {
        let document = self.app.document().clone();
        let id = InstanceId::next();

        if !document.has_attribute(element, COMPONENT_ATTR) {
            document.set_attribute(element, COMPONENT_ATTR, name);
        }
        document.remove_attribute(element, ERROR_ATTR);
        document.set_attribute(element, STATE_ATTR, ElementState::Loading.as_str());

        let definition = match self.load_from(name, options.module_path.as_deref()).await {
            Ok(definition) => definition,
            Err(error) => {
                self.mark_failed(name, element, &error);
                return Err(error);
            }
        };

        let mut component = definition.instantiate();
        let mut cx = Context::new(
            self.app.clone(),
            document.element(element),
            id,
            options.route,
            options.options,
        );
        let started = Instant::now();
        let outcome = AssertUnwindSafe(component.initialize(&mut cx))
            .catch_unwind()
            .await;
        let reason = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{err:#}")),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(reason) = reason {
            let error = Error::Init {
                name: name.to_string(),
                reason,
            };
            self.mark_failed(name, element, &error);
            return Err(error);
        }

        document.set_attribute(element, INITIALIZED_ATTR, "true");
        document.set_attribute(element, INSTANCE_ATTR, id.to_string());
        document.set_attribute(element, STATE_ATTR, ElementState::Initialized.as_str());

        let instance = Instance {
            id,
            name: name.to_string(),
            element,
            mounted: Arc::new(tokio::sync::Mutex::new(Mounted { component, cx })),
        };
        {
            let mut inner = self.lock();
            inner.instances.insert(id, instance);
            inner.claims.insert((element, name.to_string()), Claim::Live(id));
        }

        tracing::debug!(
            component = name,
            instance = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "component initialized"
        );
        self.app.events().emit(Event::ComponentInitialized {
            name: name.to_string(),
            instance: id,
        });
        Ok(id)
    }

    fn mark_failed(&self, name: &str, element: ElementId, error: &Error) {
        self.lock().claims.remove(&(element, name.to_string()));
        let document = self.app.document();
        document.set_attribute(element, STATE_ATTR, ElementState::Error.as_str());
        document.set_attribute(element, ERROR_ATTR, error.to_string());
        tracing::warn!(component = name, %error, "component failed");
        self.app.events().emit(Event::ComponentError {
            name: name.to_string(),
            message: error.to_string(),
        });
    }

    /// Initialize every tagged element in the document.
    pub async fn auto_init(&self) -> AutoInitReport {
        let body = self.app.document().body();
        self.auto_init_within(body).await
    }

    /// Initialize every tagged element under `root` (inclusive).
    ///
    /// Elements that are loading, initialized or failed are skipped, as are
    /// disabled components. All initializations run concurrently and a
    /// failure only counts against its own element.
    pub async fn auto_init_within(&self, root: ElementId) -> AutoInitReport {
        let started = Instant::now();
        let document = self.app.document();
        let disabled = self.lock().disabled.clone();

        let targets: Vec<(String, ElementId)> = document
            .query_attribute_within(root, COMPONENT_ATTR)
            .into_iter()
            .filter(|el| !document.has_attribute(*el, INITIALIZED_ATTR))
            .filter(|el| {
                let state = document.attribute(*el, STATE_ATTR);
                !matches!(
                    state.as_deref().and_then(ElementState::parse),
                    Some(ElementState::Loading | ElementState::Initialized | ElementState::Error)
                )
            })
            .filter_map(|el| document.attribute(el, COMPONENT_ATTR).map(|name| (name, el)))
            .filter(|(name, _)| !name.is_empty() && !disabled.contains(name))
            .collect();

        for (_, el) in &targets {
            document.set_attribute(*el, STATE_ATTR, ElementState::Tagged.as_str());
        }

        let results = join_all(
            targets
                .iter()
                .map(|(name, el)| self.init(name, *el, InitOptions::default())),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        let report = AutoInitReport {
            successful: results.len() - failed,
            failed,
            duration: started.elapsed(),
        };
        tracing::debug!(
            successful = report.successful,
            failed = report.failed,
            duration_ms = report.duration_ms() as u64,
            "auto-init complete"
        );
        report
    }

    /// Tear down an instance: run its `teardown` hook, abort the work it
    /// spawned, then clear the element's markers and forget the instance. Returns false for an
    /// unknown id.
    pub async fn destroy(&self, id: InstanceId) -> bool {
        let instance = {
            let mut inner = self.lock();
            let Some(instance) = inner.instances.remove(&id) else {
                return false;
            };
            inner.claims.remove(&(instance.element, instance.name.clone()));
            instance
        };

        {
            let mut mounted = instance.mounted.lock().await;
            let Mounted { component, cx } = &mut *mounted;
            component.teardown(cx);
            cx.abort_tasks();
        }

        let document = self.app.document();
        if document.exists(instance.element) {
            document.remove_attribute(instance.element, INITIALIZED_ATTR);
            document.remove_attribute(instance.element, INSTANCE_ATTR);
            document.set_attribute(instance.element, STATE_ATTR, ElementState::Removed.as_str());
        }

        tracing::debug!(component = %instance.name, instance = %id, "component destroyed");
        self.app.events().emit(Event::ComponentDestroyed {
            name: instance.name,
            instance: id,
        });
        true
    }

    /// Destroy every instance bound at or beneath `root`. Returns how many
    /// were destroyed.
    pub async fn destroy_within(&self, root: ElementId) -> usize {
        let document = self.app.document();
        let ids: Vec<InstanceId> = self
            .lock()
            .instances
            .values()
            .filter(|i| document.contains(root, i.element))
            .map(|i| i.id)
            .collect();
        let mut destroyed = 0;
        for id in ids {
            if self.destroy(id).await {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// First live instance of `name`.
    pub fn get(&self, name: &str) -> Option<Instance> {
        self.lock().instances.values().find(|i| i.name == name).cloned()
    }

    /// Live instances, optionally only those of `name`, oldest first.
    pub fn get_all(&self, name: Option<&str>) -> Vec<Instance> {
        self.lock()
            .instances
            .values()
            .filter(|i| name.is_none_or(|n| i.name == n))
            .cloned()
            .collect()
    }

    pub fn instance(&self, id: InstanceId) -> Option<Instance> {
        self.lock().instances.get(&id).cloned()
    }
}
