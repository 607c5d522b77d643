//! Process-wide publish/subscribe hub.
//!
//! Components never hold references to one another; they talk through the
//! bus. Listeners for one event name run in registration order, and a
//! listener that fails (by error or panic) is logged and skipped so the rest
//! still run and the emitter never sees the failure.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::component::InstanceId;
use crate::preferences::Preferences;
use crate::report::ErrorReport;
use crate::router::ResolvedRoute;

/// Names of every event the bus carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventName {
    AppReady,
    AppError,
    RouteChange,
    RouteError,
    NavigateRequest,
    ComponentInitialized,
    ComponentError,
    ComponentDestroyed,
    PreferencesChange,
    ModalOpen,
    ModalClose,
    FormSubmit,
}

impl EventName {
    pub const ALL: [EventName; 12] = [
        EventName::AppReady,
        EventName::AppError,
        EventName::RouteChange,
        EventName::RouteError,
        EventName::NavigateRequest,
        EventName::ComponentInitialized,
        EventName::ComponentError,
        EventName::ComponentDestroyed,
        EventName::PreferencesChange,
        EventName::ModalOpen,
        EventName::ModalClose,
        EventName::FormSubmit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::AppReady => "app:ready",
            EventName::AppError => "app:error",
            EventName::RouteChange => "route:change",
            EventName::RouteError => "route:error",
            EventName::NavigateRequest => "navigate:request",
            EventName::ComponentInitialized => "component:initialized",
            EventName::ComponentError => "component:error",
            EventName::ComponentDestroyed => "component:destroyed",
            EventName::PreferencesChange => "preferences:change",
            EventName::ModalOpen => "modal:open",
            EventName::ModalClose => "modal:close",
            EventName::FormSubmit => "form:submit",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("Unknown event: '{s}'"))
    }
}

/// An event with its typed payload.
#[derive(Debug, Clone)]
pub enum Event {
    AppReady {
        duration: Duration,
        components: usize,
    },
    AppError(ErrorReport),
    RouteChange(ResolvedRoute),
    RouteError {
        path: String,
        message: String,
    },
    /// A component asks the application to navigate.
    NavigateRequest {
        path: String,
    },
    ComponentInitialized {
        name: String,
        instance: InstanceId,
    },
    ComponentError {
        name: String,
        message: String,
    },
    ComponentDestroyed {
        name: String,
        instance: InstanceId,
    },
    PreferencesChange(Preferences),
    ModalOpen {
        id: String,
    },
    ModalClose {
        id: String,
    },
    FormSubmit {
        form: String,
        fields: Map<String, Value>,
    },
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::AppReady { .. } => EventName::AppReady,
            Event::AppError(_) => EventName::AppError,
            Event::RouteChange(_) => EventName::RouteChange,
            Event::RouteError { .. } => EventName::RouteError,
            Event::NavigateRequest { .. } => EventName::NavigateRequest,
            Event::ComponentInitialized { .. } => EventName::ComponentInitialized,
            Event::ComponentError { .. } => EventName::ComponentError,
            Event::ComponentDestroyed { .. } => EventName::ComponentDestroyed,
            Event::PreferencesChange(_) => EventName::PreferencesChange,
            Event::ModalOpen { .. } => EventName::ModalOpen,
            Event::ModalClose { .. } => EventName::ModalClose,
            Event::FormSubmit { .. } => EventName::FormSubmit,
        }
    }

    /// Build a form submission from a JSON object. Anything other than an
    /// object is rejected.
    pub fn form_submit(form: impl Into<String>, fields: Value) -> Option<Event> {
        match fields {
            Value::Object(fields) => Some(Event::FormSubmit {
                form: form.into(),
                fields,
            }),
            _ => None,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

struct Listener {
    id: ListenerId,
    once: bool,
    callback: Callback,
}

#[derive(Default)]
struct BusInner {
    listeners: HashMap<EventName, Vec<Listener>>,
    next_id: u64,
}

/// The event bus. Clones share the same listener table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        let counts: HashMap<_, _> = inner
            .listeners
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add<F>(&self, name: EventName, once: bool, callback: F) -> ListenerId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.listeners.entry(name).or_default().push(Listener {
            id,
            once,
            callback: Arc::new(callback),
        });
        id
    }

    /// Register `callback` for `name`.
    pub fn on<F>(&self, name: EventName, callback: F) -> ListenerId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(name, false, callback)
    }

    /// Register `callback` for the next `name` event only.
    pub fn once<F>(&self, name: EventName, callback: F) -> ListenerId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(name, true, callback)
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let Some(list) = inner.listeners.get_mut(&name) else {
            return false;
        };
        let before = list.len();
        list.retain(|listener| listener.id != id);
        before != list.len()
    }

    /// Remove every listener for `name`.
    pub fn clear(&self, name: EventName) {
        self.lock().listeners.remove(&name);
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.lock().listeners.get(&name).map_or(0, Vec::len)
    }

    /// Deliver `event` to every listener of its name, in registration order.
    pub fn emit(&self, event: Event) {
        let name = event.name();
        // Snapshot so listeners may call back into the bus.
        let callbacks: Vec<Callback> = {
            let mut inner = self.lock();
            let Some(list) = inner.listeners.get_mut(&name) else {
                return;
            };
            let callbacks = list.iter().map(|l| Arc::clone(&l.callback)).collect();
            list.retain(|listener| !listener.once);
            callbacks
        };

        tracing::trace!(event = %name, listeners = callbacks.len(), "emit");
        for callback in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let error = crate::Error::Listener {
                event: name.to_string(),
                reason,
            };
            tracing::warn!(%error, "event listener failed");
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn modal(id: &str) -> Event {
        Event::ModalOpen { id: id.to_string() }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            bus.on(EventName::ModalOpen, move |_| {
                seen.lock().unwrap().push(i);
                Ok(())
            });
        }
        bus.emit(modal("quote"));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_listener_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        bus.on(EventName::ModalOpen, move |_| {
            s.lock().unwrap().push("first");
            Ok(())
        });
        bus.on(EventName::ModalOpen, |_| anyhow::bail!("listener error"));
        bus.on(EventName::ModalOpen, |_| panic!("listener panic"));
        let s = seen.clone();
        bus.on(EventName::ModalOpen, move |_| {
            s.lock().unwrap().push("last");
            Ok(())
        });

        bus.emit(modal("quote"));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "last"]);
    }

    #[test]
    fn off_removes_only_that_listener() {
        let bus = EventBus::new();
        let a = bus.on(EventName::ModalClose, |_| Ok(()));
        let _b = bus.on(EventName::ModalClose, |_| Ok(()));
        assert_eq!(bus.listener_count(EventName::ModalClose), 2);

        assert!(bus.off(EventName::ModalClose, a));
        assert!(!bus.off(EventName::ModalClose, a));
        assert_eq!(bus.listener_count(EventName::ModalClose), 1);
        assert_eq!(bus.listener_count(EventName::ModalOpen), 0);
    }

    #[test]
    fn once_fires_a_single_time() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        bus.once(EventName::ModalOpen, move |_| {
            *h.lock().unwrap() += 1;
            Ok(())
        });
        bus.emit(modal("a"));
        bus.emit(modal("b"));
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(bus.listener_count(EventName::ModalOpen), 0);
    }

    #[test]
    fn listeners_may_emit_reentrantly() {
        let bus = EventBus::new();
        let closed = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        bus.on(EventName::ModalOpen, move |event| {
            if let Event::ModalOpen { id } = event {
                inner_bus.emit(Event::ModalClose { id: id.clone() });
            }
            Ok(())
        });
        let c = closed.clone();
        bus.on(EventName::ModalClose, move |event| {
            if let Event::ModalClose { id } = event {
                c.lock().unwrap().push(id.clone());
            }
            Ok(())
        });

        bus.emit(modal("gallery"));
        assert_eq!(*closed.lock().unwrap(), vec!["gallery".to_string()]);
    }

    #[test]
    fn event_names_round_trip_through_strings() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>(), Ok(name));
        }
        assert!("route:nowhere".parse::<EventName>().is_err());
    }

    #[test]
    fn form_submit_requires_an_object() {
        let event = Event::form_submit("quote", serde_json::json!({ "postcode": "OL1" }));
        assert_eq!(event.map(|e| e.name()), Some(EventName::FormSubmit));
        assert!(Event::form_submit("quote", serde_json::json!(["OL1"])).is_none());
    }
}
