use anyhow::Context as _;
use async_trait::async_trait;
use solar_nexus::component::registry::COMPONENT_ATTR;
use solar_nexus::{Component, Context};

fn blurb(route: &str) -> &'static str {
    match route {
        "oldham" => "Over 300 installations across Oldham, from terraces to new builds.",
        "saddleworth" => "Hillside roofs across the Saddleworth villages, surveyed in person.",
        "uppermill" => "Local fitters based minutes from Uppermill high street.",
        _ => "Installing across Greater Manchester.",
    }
}

/// One page shared by every town route.
#[derive(Default)]
pub struct LocationPage;

#[async_trait]
impl Component for LocationPage {
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let route = cx.route().context("location page mounted without a route")?;
        let root = cx.element();
        root.append("h1", route.title.clone());
        root.append("p", blurb(&route.name));
        if let Some(description) = &route.meta.description {
            root.append("p", description.clone());
        }
        root.append("section", "").set_attribute(COMPONENT_ATTR, "cta");
        Ok(())
    }
}
