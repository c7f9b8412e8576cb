use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::{Event, Listener};

type ListenerRef = Arc<dyn Listener>;
type ListenerMap = HashMap<String, Vec<ListenerRef>>;

/// Fans events out to registered listeners.
///
/// Delivery is asynchronous but strictly ordered: a single worker task
/// drains the queue, and each event is handed to every interested listener
/// before the next event is touched. A panicking listener is logged and
/// skipped; it never takes the worker down or starves later listeners.
///
/// Must be created inside a Tokio runtime.
pub struct Dispatcher {
    listeners: Arc<RwLock<ListenerMap>>,
    tx: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let listeners: Arc<RwLock<ListenerMap>> = Arc::new(RwLock::new(HashMap::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let map = Arc::clone(&listeners);
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                deliver(&map, &event);
            }
        });

        Self {
            listeners,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Register `listener` for each of the given event names. With
    /// `at_front` set the listener is delivered to before previously
    /// registered ones. Registering the same handle twice means it is
    /// invoked twice per event.
    pub fn add_listener(&self, listener: &Arc<dyn Listener>, at_front: bool, names: &[&str]) {
        if names.is_empty() {
            return;
        }
        let mut map = self.listeners.write().expect("listener map lock poisoned");
        for name in names {
            let list = map.entry((*name).to_string()).or_default();
            if at_front {
                list.insert(0, Arc::clone(listener));
            } else {
                list.push(Arc::clone(listener));
            }
        }
    }

    /// Remove the first occurrence of `listener` from each of the given
    /// event names. Unknown listeners and names are silently ignored.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>, names: &[&str]) {
        if names.is_empty() {
            return;
        }
        let mut map = self.listeners.write().expect("listener map lock poisoned");
        for name in names {
            if let Some(list) = map.get_mut(*name) {
                if let Some(pos) = list.iter().position(|l| Arc::ptr_eq(l, listener)) {
                    list.remove(pos);
                }
                if list.is_empty() {
                    map.remove(*name);
                }
            }
        }
    }

    /// Enqueue an event for delivery and return immediately.
    ///
    /// Events are delivered in the order they were dispatched. Dispatching
    /// after [`shutdown`](Self::shutdown) drops the event with a warning.
    pub fn dispatch(&self, event: Event) {
        let tx = self.tx.lock().expect("dispatch queue lock poisoned");
        match tx.as_ref() {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => warn!(event = %event.name, "Dispatch after shutdown, dropping event"),
        }
    }

    /// Stop accepting events and wait until everything already enqueued has
    /// been delivered.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().expect("dispatch queue lock poisoned").take();
        drop(tx);
        let worker = self.worker.lock().expect("worker handle lock poisoned").take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Dispatcher worker task failed: {}", e);
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(map: &RwLock<ListenerMap>, event: &Event) {
    // Snapshot under the read lock so registrations made while an event is
    // in flight do not affect its delivery.
    let snapshot: Vec<ListenerRef> = {
        let map = map.read().expect("listener map lock poisoned");
        map.get(&event.name).cloned().unwrap_or_default()
    };
    for listener in snapshot {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener.event_fired(event))) {
            error!(
                event = %event.name,
                "Event listener panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_listener(tag: &str, log: &Arc<Mutex<Vec<String>>>) -> ListenerRef {
        let tag = tag.to_string();
        let log = Arc::clone(log);
        crate::event::FnListener::arc(move |e: &Event| {
            log.lock().unwrap().push(format!("{}:{}", tag, e.name));
        })
    }

    #[tokio::test]
    async fn delivers_in_registration_order_without_interleaving() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        for tag in ["l1", "l2", "l3"] {
            let listener = recording_listener(tag, &log);
            dispatcher.add_listener(&listener, false, &["e"]);
        }

        dispatcher.dispatch(Event::new("e").with_field("seq", 1));
        dispatcher.dispatch(Event::new("e").with_field("seq", 2));
        dispatcher.shutdown().await;

        let log = log.lock().unwrap();
        assert_eq!(*log, vec!["l1:e", "l2:e", "l3:e", "l1:e", "l2:e", "l3:e"]);
    }

    #[tokio::test]
    async fn front_insertion_is_delivered_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let l1 = recording_listener("l1", &log);
        let l2 = recording_listener("l2", &log);
        dispatcher.add_listener(&l1, false, &["e"]);
        dispatcher.add_listener(&l2, true, &["e"]);

        dispatcher.dispatch(Event::new("e"));
        dispatcher.shutdown().await;

        assert_eq!(*log.lock().unwrap(), vec!["l2:e", "l1:e"]);
    }

    #[tokio::test]
    async fn duplicate_registration_fires_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let listener = recording_listener("l", &log);
        dispatcher.add_listener(&listener, false, &["e"]);
        dispatcher.add_listener(&listener, false, &["e"]);

        dispatcher.dispatch(Event::new("e"));
        dispatcher.shutdown().await;

        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn remove_listener_drops_first_occurrence_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let listener = recording_listener("l", &log);
        dispatcher.add_listener(&listener, false, &["e"]);
        dispatcher.add_listener(&listener, false, &["e"]);
        dispatcher.remove_listener(&listener, &["e"]);

        dispatcher.dispatch(Event::new("e"));
        dispatcher.shutdown().await;

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_unregistered_listener_is_a_no_op() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let registered = recording_listener("a", &log);
        let stranger = recording_listener("b", &log);
        dispatcher.add_listener(&registered, false, &["e"]);
        dispatcher.remove_listener(&stranger, &["e", "other"]);

        dispatcher.dispatch(Event::new("e"));
        dispatcher.shutdown().await;

        assert_eq!(*log.lock().unwrap(), vec!["a:e"]);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let bomb = crate::event::FnListener::arc(|_: &Event| panic!("listener blew up"));
        let survivor = recording_listener("ok", &log);
        dispatcher.add_listener(&bomb, false, &["e"]);
        dispatcher.add_listener(&survivor, false, &["e"]);

        dispatcher.dispatch(Event::new("e"));
        // The dispatcher stays usable after a listener panic.
        dispatcher.dispatch(Event::new("e"));
        dispatcher.shutdown().await;

        assert_eq!(*log.lock().unwrap(), vec!["ok:e", "ok:e"]);
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_dropped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let listener = recording_listener("l", &log);
        dispatcher.add_listener(&listener, false, &["e"]);

        dispatcher.shutdown().await;
        dispatcher.dispatch(Event::new("e"));

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_drains_pending_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        let listener = recording_listener("l", &log);
        dispatcher.add_listener(&listener, false, &["e"]);

        for _ in 0..100 {
            dispatcher.dispatch(Event::new("e"));
        }
        dispatcher.shutdown().await;

        assert_eq!(log.lock().unwrap().len(), 100);
    }
}
