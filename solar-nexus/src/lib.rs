pub mod api;
pub mod application;
pub mod component;
pub mod config;
pub mod dom;
pub mod error;
pub mod events;
pub mod preferences;
pub mod report;
pub mod router;
pub mod state;
pub mod storage;
pub mod task;

pub use error::{Error, Result};

// Re-export common types for convenience
pub use api::{ApiClient, ApiRequest, HttpTransport, Method, ReqwestTransport};
pub use application::{App, AppContext, Context, Host, StartupReport};
pub use component::{Component, ComponentDefinition, ComponentRegistry, InstanceId, ModuleSource, StaticModules};
pub use config::AppConfig;
pub use dom::{Document, Element, ElementId};
pub use events::{Event, EventBus, EventName, ListenerId};
pub use preferences::{Preferences, Theme};
pub use report::{ErrorReport, ErrorReporter, ErrorSource};
pub use router::{ResolvedRoute, RouteConfig, RouteOutcome, Router};
pub use state::{StateStore, Subscription};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use task::{TaskHandle, TaskTracker};
