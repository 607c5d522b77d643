//! Application context and controller.
//!
//! [`AppContext`] bundles the shared services (document, event bus, state
//! store, error reporter) and is threaded through every collaborator.
//! [`App`] is created once at startup: it owns the configuration, wires the
//! registry and router together and drives the first render.

use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::api::{ApiClient, ApiRequest, HttpTransport};
use crate::component::{AutoInitReport, ComponentRegistry, InstanceId, ModuleSource};
use crate::config::AppConfig;
use crate::dom::{Document, Element, ElementId};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, EventName};
use crate::preferences::{PREFERENCES_KEY, Preferences};
use crate::report::{ErrorReporter, ErrorSource};
use crate::router::{ResolvedRoute, RouteOutcome, Router};
use crate::state::StateStore;
use crate::storage::Storage;
use crate::task::{TaskHandle, TaskTracker};

/// DOM id of the root container pages are mounted into.
pub const ROOT_CONTAINER_ID: &str = "app";

/// Marks the static startup failure panel.
pub const APP_ERROR_ATTR: &str = "data-app-error";

static PANIC_HOOK: Once = Once::new();

/// Shared services. Clones are cheap and share everything.
#[derive(Clone)]
pub struct AppContext {
    document: Document,
    events: EventBus,
    state: StateStore,
    reporter: ErrorReporter,
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("state_keys", &self.state.keys())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build the services over `document`, rehydrating persisted state from
    /// `storage`.
    pub fn new(document: Document, storage: Arc<dyn Storage>) -> Self {
        let events = EventBus::new();
        Self {
            document,
            reporter: ErrorReporter::new(events.clone()),
            events,
            state: StateStore::new(storage),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Spawn background work. An error returned by the task is sent to the
    /// error reporter.
    pub fn spawn<F, Fut>(&self, f: F) -> TaskHandle
    where
        F: FnOnce(AppContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        TaskHandle::new(None, &self.spawn_owned(None, f))
    }

    fn spawn_owned<F, Fut>(&self, owner: Option<InstanceId>, f: F) -> JoinHandle<()>
    where
        F: FnOnce(AppContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let cx = self.clone();
        tokio::spawn(async move {
            let reporter = cx.reporter.clone();
            if let Err(err) = f(cx).await {
                let owner = owner.map(|id| format!("instance {id}"));
                reporter.report(ErrorSource::Task, format!("{err:#}"), owner.as_deref());
            }
        })
    }
}

/// What a component sees while it is bound to an element.
pub struct Context {
    app: AppContext,
    element: Element,
    instance: InstanceId,
    route: Option<ResolvedRoute>,
    options: Value,
    tasks: TaskTracker,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("element", &self.element.id())
            .field("instance", &self.instance)
            .field("route", &self.route.as_ref().map(|r| &r.path))
            .field("tasks", &self.tasks.active_count())
            .finish()
    }
}

impl Context {
    pub fn new(
        app: AppContext,
        element: Element,
        instance: InstanceId,
        route: Option<ResolvedRoute>,
        options: Value,
    ) -> Self {
        Self {
            app,
            element,
            instance,
            route,
            options,
            tasks: TaskTracker::new(instance),
        }
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }

    pub fn document(&self) -> &Document {
        self.app.document()
    }

    pub fn state(&self) -> &StateStore {
        self.app.state()
    }

    pub fn events(&self) -> &EventBus {
        self.app.events()
    }

    /// The element this instance is bound to.
    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// The route that mounted this component, for page components.
    pub fn route(&self) -> Option<&ResolvedRoute> {
        self.route.as_ref()
    }

    /// Options passed to `init`.
    pub fn options(&self) -> &Value {
        &self.options
    }

    pub fn emit(&self, event: Event) {
        self.app.events().emit(event);
    }

    /// Ask the application to navigate to `path`.
    pub fn navigate(&self, path: impl Into<String>) {
        self.emit(Event::NavigateRequest { path: path.into() });
    }

    /// Spawn background work owned by this component. It is aborted when
    /// the instance is destroyed.
    pub fn spawn<F, Fut>(&mut self, f: F) -> TaskHandle
    where
        F: FnOnce(AppContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let join = self.app.spawn_owned(Some(self.instance), f);
        self.tasks.track(&join);
        TaskHandle::new(Some(self.instance), &join)
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub(crate) fn abort_tasks(&mut self) -> usize {
        self.tasks.abort_all()
    }
}

/// Host services the application runs on.
pub struct Host {
    pub document: Document,
    pub storage: Arc<dyn Storage>,
    pub modules: Arc<dyn ModuleSource>,
    pub transport: Arc<dyn HttpTransport>,
}

/// Summary of a successful [`App::start`].
#[derive(Debug, Clone)]
pub struct StartupReport {
    pub route: RouteOutcome,
    pub components: AutoInitReport,
    pub duration: Duration,
}

/// The application controller.
pub struct App {
    config: AppConfig,
    context: AppContext,
    registry: ComponentRegistry,
    router: Router,
    api: ApiClient,
    started: AtomicBool,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl App {
    pub fn new(config: AppConfig, host: Host) -> Self {
        let context = AppContext::new(host.document, host.storage);
        let document = context.document();
        let container = match document.find_by_id(ROOT_CONTAINER_ID) {
            Some(id) => id,
            None => {
                let main = document.create_element("main");
                document.set_attribute(main, "id", ROOT_CONTAINER_ID);
                document.append_child(document.body(), main);
                main
            }
        };

        let registry = ComponentRegistry::new(context.clone(), host.modules);
        for name in config.disabled_features() {
            tracing::debug!(component = name, "component disabled by config");
            registry.disable(name);
        }

        let router = Router::with_slow_threshold(
            context.clone(),
            registry.clone(),
            container,
            &config.initial_path,
            Duration::from_millis(config.slow_route_ms),
        );
        let api = ApiClient::new(config.api_base_url.clone(), host.transport, context.clone());

        Self {
            config,
            context,
            registry,
            router,
            api,
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn container(&self) -> ElementId {
        self.router.container()
    }

    /// Bring the application up: preferences, initial route, then every
    /// remaining tagged element. Can only be called once.
    pub async fn start(&self) -> Result<StartupReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }
        let started = Instant::now();

        if self.router.routes().is_empty() {
            let error = Error::NoRoutes;
            self.fail_startup(&error);
            return Err(error);
        }
        if !self.router.has_fallback() {
            tracing::warn!("no fallback route registered; unknown paths render the error view");
        }

        if self.config.capture_panics {
            let reporter = self.context.reporter().clone();
            PANIC_HOOK.call_once(move || reporter.install_panic_hook());
        }

        let preferences = Preferences::load(self.context.state());
        preferences.apply(self.context.document());
        self.watch_preferences();
        self.honour_navigation_requests();

        let route = self.router.start().await;
        let components = self.registry.auto_init().await;
        let duration = started.elapsed();

        tracing::info!(
            path = %self.router.location(),
            components = components.successful,
            failed = components.failed,
            elapsed_ms = duration.as_millis() as u64,
            "application ready"
        );
        self.context.events().emit(Event::AppReady {
            duration,
            components: components.successful,
        });

        Ok(StartupReport {
            route,
            components,
            duration,
        })
    }

    /// Call the JSON API at `endpoint`, relative to the configured base URL.
    pub async fn api(&self, endpoint: &str, request: ApiRequest) -> Result<Value> {
        self.api.request(endpoint, request).await
    }

    pub fn preferences(&self) -> Preferences {
        Preferences::load(self.context.state())
    }

    /// Persist `preferences`. They are applied to the document and broadcast
    /// by the state subscription installed in [`App::start`].
    pub fn set_preferences(&self, preferences: &Preferences) {
        match serde_json::to_value(preferences) {
            Ok(value) => {
                self.context.state().set(PREFERENCES_KEY, value);
            }
            Err(error) => tracing::warn!(%error, "failed to encode preferences"),
        }
    }

    fn watch_preferences(&self) {
        let document = self.context.document().clone();
        let events = self.context.events().clone();
        // Never unsubscribed.
        let _subscription = self.context.state().subscribe(PREFERENCES_KEY, move |value, _, _| {
            let preferences = match value {
                Some(value) => serde_json::from_value(value.clone())?,
                None => Preferences::default(),
            };
            preferences.apply(&document);
            events.emit(Event::PreferencesChange(preferences));
            Ok(())
        });
    }

    fn honour_navigation_requests(&self) {
        let router = self.router.clone();
        let context = self.context.clone();
        self.context.events().on(EventName::NavigateRequest, move |event| {
            let Event::NavigateRequest { path } = event else {
                return Ok(());
            };
            let router = router.clone();
            let path = path.clone();
            context.spawn(move |cx| async move {
                if let Err(error) = router.navigate(&path, None).await {
                    cx.reporter().report(ErrorSource::Route, error.to_string(), Some(&path));
                }
                Ok(())
            });
            Ok(())
        });
    }

    /// Replace the root container with the static failure panel.
    fn fail_startup(&self, error: &Error) {
        self.context
            .reporter()
            .report(ErrorSource::Startup, error.to_string(), None);

        let document = self.context.document();
        let container = self.container();
        document.clear_children(container);
        let panel = document.create_element("div");
        document.set_attribute(panel, APP_ERROR_ATTR, "true");
        document.append_child(container, panel);

        let panel = document.element(panel);
        panel.append("h1", "Something went wrong");
        panel.append("p", "The page could not be loaded. Please try again.");
        panel
            .append("button", "Reload page")
            .set_attribute("data-action", "reload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpRequest, HttpResponse};
    use crate::component::{Component, ComponentDefinition, StaticModules};
    use crate::preferences::Theme;
    use crate::router::RouteConfig;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Page;

    #[async_trait]
    impl Component for Page {
        async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
            let title = cx.route().map(|r| r.title.clone()).unwrap_or_default();
            cx.element().set_text(title);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Nav;

    #[async_trait]
    impl Component for Nav {
        async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
            cx.element().set_text("nav");
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl HttpTransport for Echo {
        async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                body: json!({ "url": request.url }).to_string(),
            })
        }
    }

    fn host(document: Document) -> Host {
        let modules = StaticModules::new()
            .component("home", ComponentDefinition::of::<Page>())
            .component("quote", ComponentDefinition::of::<Page>())
            .component("not-found", ComponentDefinition::of::<Page>())
            .component("nav", ComponentDefinition::of::<Nav>());
        Host {
            document,
            storage: Arc::new(MemoryStorage::new()),
            modules: Arc::new(modules),
            transport: Arc::new(Echo),
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            capture_panics: false,
            ..AppConfig::default()
        }
    }

    fn app_with(config: AppConfig, document: Document) -> App {
        let app = App::new(config, host(document));
        let router = app.router();
        router.add_route("/", RouteConfig::new("home", "Solar Panels", "home")).unwrap();
        router.add_route("/quote", RouteConfig::new("quote", "Get a Quote", "quote")).unwrap();
        router.add_route("*", RouteConfig::new("not-found", "Not Found", "not-found")).unwrap();
        app
    }

    fn app() -> App {
        app_with(config(), Document::new())
    }

    fn nav(document: &Document) -> ElementId {
        let nav = document.create_element("nav");
        document.set_attribute(nav, "data-component", "nav");
        document.append_child(document.body(), nav);
        nav
    }

    #[tokio::test]
    async fn start_renders_route_and_layout() {
        let document = Document::new();
        let nav = nav(&document);
        let app = app_with(config(), document.clone());

        let ready = Arc::new(Mutex::new(None));
        let r = ready.clone();
        app.context().events().on(EventName::AppReady, move |event| {
            if let Event::AppReady { components, .. } = event {
                *r.lock().unwrap() = Some(*components);
            }
            Ok(())
        });

        let report = app.start().await.unwrap();
        assert_eq!(report.route.route().map(|r| r.name.as_str()), Some("home"));
        assert_eq!(report.components.successful, 1);
        assert_eq!(document.title(), "Solar Panels");
        assert_eq!(document.text(nav), "nav");
        assert_eq!(*ready.lock().unwrap(), Some(1));
        assert_eq!(document.attribute(document.body(), "data-theme").as_deref(), Some("light"));
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let app = app();
        app.start().await.unwrap();
        assert!(matches!(app.start().await, Err(Error::AlreadyStarted)));
    }

    #[tokio::test]
    async fn start_without_routes_shows_failure_panel() {
        let app = App::new(config(), host(Document::new()));
        assert!(matches!(app.start().await, Err(Error::NoRoutes)));

        let document = app.context().document();
        assert_eq!(document.query_attribute(APP_ERROR_ATTR).len(), 1);
        let reload = document.query_attribute("data-action");
        assert_eq!(reload.len(), 1);
        assert_eq!(document.attribute(reload[0], "data-action").as_deref(), Some("reload"));
        assert_eq!(app.context().reporter().recent()[0].source, ErrorSource::Startup);
    }

    #[tokio::test]
    async fn existing_root_container_is_reused() {
        let document = Document::new();
        let main = document.create_element("main");
        document.set_attribute(main, "id", ROOT_CONTAINER_ID);
        document.append_child(document.body(), main);

        let app = app_with(config(), document.clone());
        assert_eq!(app.container(), main);
        assert_eq!(document.children(document.body()), vec![main]);
    }

    #[tokio::test]
    async fn disabled_features_are_skipped() {
        let document = Document::new();
        let nav = nav(&document);
        let mut config = config();
        config.features.insert("nav".into(), false);
        let app = app_with(config, document.clone());

        let report = app.start().await.unwrap();
        assert_eq!(report.components.successful, 0);
        assert_eq!(document.text(nav), "");
    }

    #[tokio::test]
    async fn persisted_preferences_apply_before_render() {
        let storage = MemoryStorage::new();
        storage
            .set_item("solar_preferences", r#"{"theme":"dark","reducedMotion":true}"#)
            .unwrap();
        let mut host = host(Document::new());
        host.storage = Arc::new(storage);
        let app = App::new(config(), host);
        app.router().add_route("/", RouteConfig::new("home", "Home", "home")).unwrap();

        app.start().await.unwrap();
        let document = app.context().document();
        let body = document.body();
        assert_eq!(document.attribute(body, "data-theme").as_deref(), Some("dark"));
        assert_eq!(document.attribute(body, "data-animations").as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn set_preferences_applies_and_broadcasts() {
        let app = app();
        app.start().await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        app.context().events().on(EventName::PreferencesChange, move |event| {
            if let Event::PreferencesChange(prefs) = event {
                s.lock().unwrap().push(prefs.theme);
            }
            Ok(())
        });

        let mut prefs = app.preferences();
        prefs.theme = prefs.theme.toggled();
        app.set_preferences(&prefs);

        assert_eq!(*seen.lock().unwrap(), vec![Theme::Dark]);
        let document = app.context().document();
        assert_eq!(document.attribute(document.body(), "data-theme").as_deref(), Some("dark"));
        assert_eq!(app.preferences().theme, Theme::Dark);
    }

    #[tokio::test]
    async fn navigate_requests_from_components_are_honoured() {
        let app = app();
        app.start().await.unwrap();

        app.context().events().emit(Event::NavigateRequest {
            path: "/quote".into(),
        });
        for _ in 0..50 {
            if app.router().location() == "/quote" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(app.router().current().map(|r| r.name), Some("quote".to_string()));
        assert_eq!(app.context().document().title(), "Get a Quote");
    }

    #[tokio::test]
    async fn failed_tasks_are_reported() {
        let app = app();
        let handle = app.context().spawn(|_| async { Err::<(), _>(anyhow::anyhow!("poll failed")) });
        for _ in 0..50 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let recent = app.context().reporter().recent();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].source, ErrorSource::Task);
        assert_eq!(recent[0].message, "poll failed");
    }

    #[tokio::test]
    async fn api_uses_configured_base_url() {
        let mut config = config();
        config.api_base_url = "https://solar.example/api".into();
        let app = app_with(config, Document::new());
        let value = app.api("leads", ApiRequest::post(json!({}))).await.unwrap();
        assert_eq!(value, json!({ "url": "https://solar.example/api/leads" }));
    }
}
