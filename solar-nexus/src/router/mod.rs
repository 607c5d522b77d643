//! Router.
//!
//! Maps URL paths to route configs, keeps session history, publishes the
//! resolved route to state and the event bus, and mounts the route's
//! component into the root container.

pub mod history;
pub mod pattern;
pub mod table;

pub use history::{History, HistoryEntry};
pub use pattern::{Params, PathPattern, normalize_path, split_url};
pub use table::{RouteConfig, RouteMatch, RouteMeta, RouteTable, WILDCARD};

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::application::AppContext;
use crate::component::registry::COMPONENT_ATTR;
use crate::component::{ComponentRegistry, InitOptions};
use crate::dom::ElementId;
use crate::error::{Error, Result};
use crate::events::Event;

/// State key holding the current [`ResolvedRoute`].
pub const ROUTE_KEY: &str = "route";

/// Marks the router's inline error view.
pub const ROUTE_ERROR_ATTR: &str = "data-route-error";

/// A route resolved against a concrete URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRoute {
    /// The normalised pathname that was requested.
    pub path: String,
    /// The pattern that matched, `*` for the fallback.
    pub pattern: String,
    pub name: String,
    pub title: String,
    pub component: String,
    pub module_path: Option<String>,
    pub meta: RouteMeta,
    pub params: Params,
    pub query: BTreeMap<String, String>,
    pub hash: Option<String>,
    /// Data passed to `navigate`, if any.
    pub data: Option<Value>,
}

/// What a before-hook sees.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRequest {
    pub from: Option<String>,
    pub to: String,
    pub data: Option<Value>,
}

/// How a routing pass ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Rendered(ResolvedRoute),
    /// The inline error view replaced the page body.
    ErrorView { path: String, reason: String },
}

impl RouteOutcome {
    pub fn route(&self) -> Option<&ResolvedRoute> {
        match self {
            RouteOutcome::Rendered(route) => Some(route),
            RouteOutcome::ErrorView { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    Completed(RouteOutcome),
    /// A before-hook declined the navigation.
    Cancelled,
}

/// Result of [`Router::follow_link`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// Not ours to handle: another origin or scheme.
    External,
    /// Same-page anchor; nothing was routed.
    Anchor(String),
    Navigated(Navigation),
}

type BeforeHook = Arc<dyn Fn(NavigationRequest) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;
type AfterHook = Arc<dyn Fn(ResolvedRoute) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct RouterInner {
    app: AppContext,
    registry: ComponentRegistry,
    container: ElementId,
    table: RwLock<RouteTable>,
    history: Mutex<History>,
    current: Mutex<Option<ResolvedRoute>>,
    before: RwLock<Vec<BeforeHook>>,
    after: RwLock<Vec<AfterHook>>,
    slow_threshold: Duration,
}

/// The router. Clones share the same table, history and hooks.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes().len())
            .field("current", &self.current().map(|r| r.path))
            .finish()
    }
}

impl Router {
    /// Create a router mounting pages into `container`, starting at
    /// `initial_path`.
    pub fn new(app: AppContext, registry: ComponentRegistry, container: ElementId, initial_path: &str) -> Self {
        Self::with_slow_threshold(app, registry, container, initial_path, Duration::from_millis(500))
    }

    pub fn with_slow_threshold(
        app: AppContext,
        registry: ComponentRegistry,
        container: ElementId,
        initial_path: &str,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                app,
                registry,
                container,
                table: RwLock::new(RouteTable::new()),
                history: Mutex::new(History::new(initial_path)),
                current: Mutex::new(None),
                before: RwLock::default(),
                after: RwLock::default(),
                slow_threshold,
            }),
        }
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.inner.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn container(&self) -> ElementId {
        self.inner.container
    }

    /// Register a route; `*` registers the fallback.
    pub fn add_route(&self, path: &str, config: RouteConfig) -> Result<()> {
        self.inner
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(path, config)
    }

    /// Registered routes in evaluation order, fallback last.
    pub fn routes(&self) -> Vec<(String, RouteConfig)> {
        self.inner.table.read().unwrap_or_else(PoisonError::into_inner).entries()
    }

    pub fn has_fallback(&self) -> bool {
        self.inner.table.read().unwrap_or_else(PoisonError::into_inner).has_fallback()
    }

    pub fn current(&self) -> Option<ResolvedRoute> {
        self.inner.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Path of the current history entry.
    pub fn location(&self) -> String {
        self.history().current().path.clone()
    }

    pub fn history_len(&self) -> usize {
        self.history().len()
    }

    pub fn can_go_back(&self) -> bool {
        self.history().can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.history().can_go_forward()
    }

    /// Run `hook` before every navigation. Returning `Ok(false)` cancels it;
    /// an error aborts it.
    pub fn before_each<F, Fut>(&self, hook: F)
    where
        F: Fn(NavigationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.inner
            .before
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(move |request| hook(request).boxed()));
    }

    /// Run `hook` after every routing pass.
    pub fn after_each<F, Fut>(&self, hook: F)
    where
        F: Fn(ResolvedRoute) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner
            .after
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(move |route| hook(route).boxed()));
    }

    /// Route the current history entry without pushing a new one.
    pub async fn start(&self) -> RouteOutcome {
        let path = self.location();
        self.handle_route(&path, false).await
    }

    /// Navigate to `path`.
    ///
    /// Before-hooks run in registration order, each awaited in turn. If one
    /// declines, history and the `route` state are left untouched.
    pub async fn navigate(&self, path: &str, data: Option<Value>) -> Result<Navigation> {
        let request = NavigationRequest {
            from: self.current().map(|r| r.path),
            to: path.to_string(),
            data: data.clone(),
        };
        let hooks: Vec<BeforeHook> = self
            .inner
            .before
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            match hook(request.clone()).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(to = path, "navigation cancelled by hook");
                    return Ok(Navigation::Cancelled);
                }
                Err(err) => {
                    let error = Error::NavigationHook {
                        path: path.to_string(),
                        reason: format!("{err:#}"),
                    };
                    tracing::warn!(%error, "navigation aborted");
                    return Err(error);
                }
            }
        }

        self.history().push(path, data);
        Ok(Navigation::Completed(self.handle_route(path, true).await))
    }

    /// Go back one history entry and route it, like a browser pop-state.
    pub async fn back(&self) -> Option<RouteOutcome> {
        let path = self.history().back().map(|entry| entry.path.clone())?;
        Some(self.handle_route(&path, false).await)
    }

    /// Go forward one history entry and route it.
    pub async fn forward(&self) -> Option<RouteOutcome> {
        let path = self.history().forward().map(|entry| entry.path.clone())?;
        Some(self.handle_route(&path, false).await)
    }

    /// Handle a click on a link to `href`. Only same-origin absolute paths
    /// are routed.
    pub async fn follow_link(&self, href: &str) -> Result<LinkOutcome> {
        if let Some(anchor) = href.strip_prefix('#') {
            return Ok(LinkOutcome::Anchor(anchor.to_string()));
        }
        if !href.starts_with('/') || href.starts_with("//") {
            return Ok(LinkOutcome::External);
        }
        self.navigate(href, None).await.map(LinkOutcome::Navigated)
    }

    /// Resolve `path` and render it. Never fails: a route that cannot be
    /// rendered is replaced by the inline error view.
    pub async fn handle_route(&self, path: &str, is_navigation: bool) -> RouteOutcome {
        let started = Instant::now();
        let (pathname, query, hash) = split_url(path);

        let matched = self
            .inner
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(&pathname);
        let Some(matched) = matched else {
            let error = Error::RouteResolution {
                path: pathname.clone(),
                reason: "no route matches and no fallback is registered".to_string(),
            };
            return self.fail(&pathname, error).await;
        };

        let data = {
            let history = self.history();
            let entry = history.current();
            if entry.path == path { entry.data.clone() } else { None }
        };
        let route = ResolvedRoute {
            path: pathname,
            pattern: matched.pattern,
            name: matched.config.name,
            title: matched.config.title,
            component: matched.config.component,
            module_path: matched.config.module_path,
            meta: matched.config.meta,
            params: matched.params,
            query,
            hash,
            data,
        };

        let app = &self.inner.app;
        match serde_json::to_value(&route) {
            Ok(value) => {
                app.state().set(ROUTE_KEY, value);
            }
            Err(error) => tracing::warn!(%error, "route could not be stored in state"),
        }
        *self.inner.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(route.clone());
        self.apply_head(&route);
        app.events().emit(Event::RouteChange(route.clone()));

        let outcome = match self.mount(&route).await {
            Ok(()) => RouteOutcome::Rendered(route.clone()),
            Err(error) => {
                let error = Error::RouteResolution {
                    path: route.path.clone(),
                    reason: error.to_string(),
                };
                self.fail(&route.path, error).await
            }
        };

        let hooks: Vec<AfterHook> = self
            .inner
            .after
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if let Err(error) = hook(route.clone()).await {
                tracing::warn!(path = %route.path, error = %format!("{error:#}"), "after-hook failed");
            }
        }

        if is_navigation && route.hash.is_none() {
            app.document().scroll_to(0);
        }

        let elapsed = started.elapsed();
        if elapsed > self.inner.slow_threshold {
            tracing::warn!(path = %route.path, elapsed_ms = elapsed.as_millis() as u64, "slow route");
        } else {
            tracing::info!(path = %route.path, route = %route.name, elapsed_ms = elapsed.as_millis() as u64, "routed");
        }
        outcome
    }

    fn apply_head(&self, route: &ResolvedRoute) {
        let document = self.inner.app.document();
        document.set_title(&route.title);
        document.set_meta("og:title", &route.title);
        match &route.meta.description {
            Some(description) => {
                document.set_meta("description", description);
                document.set_meta("og:description", description);
            }
            None => {
                document.remove_meta("description");
                document.remove_meta("og:description");
            }
        }
        for (name, content) in &route.meta.extra {
            document.set_meta(name, content);
        }
    }

    /// Replace the container's contents with the route's component.
    async fn mount(&self, route: &ResolvedRoute) -> Result<()> {
        let document = self.inner.app.document();
        let container = self.inner.container;
        self.inner.registry.destroy_within(container).await;
        document.clear_children(container);

        let page = document.create_element("div");
        document.set_attribute(page, COMPONENT_ATTR, &route.component);
        document.set_attribute(page, "data-route", &route.name);
        document.append_child(container, page);

        let options = InitOptions {
            route: Some(route.clone()),
            module_path: route.module_path.clone(),
            options: Value::Null,
        };
        self.inner.registry.init(&route.component, page, options).await?;
        self.inner.registry.auto_init_within(page).await;
        Ok(())
    }

    async fn fail(&self, path: &str, error: Error) -> RouteOutcome {
        tracing::error!(%error, "route failed");
        self.render_error_view().await;
        self.inner.app.events().emit(Event::RouteError {
            path: path.to_string(),
            message: error.to_string(),
        });
        RouteOutcome::ErrorView {
            path: path.to_string(),
            reason: error.to_string(),
        }
    }

    async fn render_error_view(&self) {
        let document = self.inner.app.document();
        let container = self.inner.container;
        self.inner.registry.destroy_within(container).await;
        document.clear_children(container);

        let view = document.element(container).append("div", "");
        view.set_attribute(ROUTE_ERROR_ATTR, "true");
        view.set_attribute("class", "route-error");
        view.append("h1", "Sorry, this page could not be loaded");
        view.append("p", "Something went wrong while loading this page. Please try again.");
        view.append("a", "Return to the home page").set_attribute("href", "/");
    }
}
