//! Components: behaviors bound to tagged document elements.

pub mod loader;
pub mod registry;
pub mod traits;

pub use loader::{ModuleSource, StaticModules, module_path};
pub use registry::{AutoInitReport, ComponentRegistry, ElementState, InitOptions, Instance};
pub use traits::{Component, ComponentDefinition, InstanceId};
