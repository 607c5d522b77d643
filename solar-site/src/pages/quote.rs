use async_trait::async_trait;
use solar_nexus::{Component, Context, Event, EventName, ListenerId};

const QUOTE_FORM: &str = "quote";
const USER_KEY: &str = "user";
pub const THANKS_MODAL: &str = "quote-thanks";

/// Lead capture. A `form:submit` for the quote form stores the contact
/// details and opens the thank-you modal.
#[derive(Default)]
pub struct QuotePage {
    listener: Option<ListenerId>,
}

#[async_trait]
impl Component for QuotePage {
    async fn initialize(&mut self, cx: &mut Context) -> anyhow::Result<()> {
        let root = cx.element();
        root.append("h1", "Get a free quote");
        root.append("p", "Step 1 of 3: your postcode");
        root.append("form", "").set_attribute("data-form", QUOTE_FORM);

        let state = cx.state().clone();
        let events = cx.events().clone();
        let listener = cx.events().on(EventName::FormSubmit, move |event| {
            let Event::FormSubmit { form, fields } = event else {
                return Ok(());
            };
            if form != QUOTE_FORM {
                return Ok(());
            }
            anyhow::ensure!(fields.contains_key("postcode"), "quote submitted without a postcode");
            state.update(USER_KEY, fields.clone());
            events.emit(Event::ModalOpen {
                id: THANKS_MODAL.to_string(),
            });
            Ok(())
        });
        self.listener = Some(listener);
        Ok(())
    }

    fn teardown(&mut self, cx: &mut Context) {
        if let Some(listener) = self.listener.take() {
            cx.events().off(EventName::FormSubmit, listener);
        }
    }
}
