use async_trait::async_trait;
use solar_nexus::component::registry::COMPONENT_ATTR;
use solar_nexus::{Component, Context};

#[derive(Default)]
pub struct HomePage;

#[async_trait]
impl Component for HomePage {
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let root = cx.element();
        root.append("h1", "Solar panels for homes across Oldham & Saddleworth");
        root.append("p", "MCS certified installers. Free survey, fixed quote, no pressure.");
        root.append("p", "Serving Oldham, Saddleworth and Uppermill.");
        // Mounted by the router's nested scan.
        root.append("section", "").set_attribute(COMPONENT_ATTR, "cta");
        Ok(())
    }
}
