use async_trait::async_trait;
use solar_nexus::{Component, Context};

#[derive(Default)]
pub struct NotFoundPage;

#[async_trait]
impl Component for NotFoundPage {
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let path = cx.route().map(|r| r.path.clone()).unwrap_or_default();
        let root = cx.element();
        root.append("h1", "Page not found");
        root.append("p", format!("There is nothing at {path}."));
        root.append("a", "Back to the home page").set_attribute("href", "/");
        Ok(())
    }
}
