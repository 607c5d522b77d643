//! Components that live outside the routed container.

use async_trait::async_trait;
use serde_json::Value;
use solar_nexus::router::ROUTE_KEY;
use solar_nexus::{Component, Context, Preferences, Subscription};
use std::time::Duration;

/// Shows the current page title, following the `route` state key.
#[derive(Default)]
pub struct Nav {
    subscription: Option<Subscription>,
}

fn route_title(route: Option<&Value>) -> Option<String> {
    route?.get("title")?.as_str().map(str::to_string)
}

#[async_trait]
impl Component for Nav {
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let current = cx.element().append("span", "");
        if let Some(title) = route_title(cx.state().get(ROUTE_KEY).as_ref()) {
            current.set_text(format!("Now viewing: {title}"));
        }
        self.subscription = Some(cx.state().subscribe(ROUTE_KEY, move |route, _, _| {
            if let Some(title) = route_title(route) {
                current.set_text(format!("Now viewing: {title}"));
            }
            Ok(())
        }));
        Ok(())
    }

    fn teardown(&mut self, _cx: &mut Context) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

const MESSAGES: [&str; 3] = [
    "Cut your energy bills with solar.",
    "Free home survey, fixed price quote.",
    "Battery storage available on every install.",
];

const ROTATE_EVERY: Duration = Duration::from_secs(4);

/// Call to action with a rotating strapline. The rotation stops when the
/// instance is destroyed.
#[derive(Default)]
pub struct Cta;

#[async_trait]
impl Component for Cta {
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let strapline = cx.element().append("p", MESSAGES[0]);
        cx.element()
            .append("a", "Get a free quote")
            .set_attribute("href", "/quote");

        cx.spawn(move |app| async move {
            let mut index = 0;
            while app.document().exists(strapline.id()) {
                tokio::time::sleep(ROTATE_EVERY).await;
                if Preferences::load(app.state()).motion_enabled() {
                    index = (index + 1) % MESSAGES.len();
                    strapline.set_text(MESSAGES[index]);
                }
            }
            Ok(())
        });
        Ok(())
    }
}
