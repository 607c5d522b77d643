//! Stand-in page and layout components.
//!
//! They only write text into their elements; the real visuals live
//! elsewhere.

mod calculator;
mod home;
mod layout;
mod location;
mod not_found;
mod quote;

pub use calculator::CalculatorPage;
pub use home::HomePage;
pub use layout::{Cta, Nav};
pub use location::LocationPage;
pub use not_found::NotFoundPage;
pub use quote::QuotePage;

use solar_nexus::component::registry::COMPONENT_ATTR;
use solar_nexus::{ComponentDefinition, Document, StaticModules};

/// The town pages share one module.
pub const LOCATION_MODULE: &str = "/components/pages/location.js";

/// Host document with the site chrome around the routed container: a
/// header nav before it and a footer call to action after it.
pub fn layout() -> Document {
    let document = Document::new();
    let body = document.element(document.body());
    body.append("nav", "").set_attribute(COMPONENT_ATTR, "nav");
    let main = body.append("main", "");
    main.set_attribute("id", solar_nexus::application::ROOT_CONTAINER_ID);
    body.append("footer", "").set_attribute(COMPONENT_ATTR, "cta");
    document
}

pub fn modules() -> StaticModules {
    StaticModules::new()
        .component("home", ComponentDefinition::of::<HomePage>())
        .component("calculator", ComponentDefinition::of::<CalculatorPage>())
        .component("quote", ComponentDefinition::of::<QuotePage>())
        .component("not-found", ComponentDefinition::of::<NotFoundPage>())
        .component("nav", ComponentDefinition::of::<Nav>())
        .component("cta", ComponentDefinition::of::<Cta>())
        .with(LOCATION_MODULE, ComponentDefinition::of::<LocationPage>())
}
