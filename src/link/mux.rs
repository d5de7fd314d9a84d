use std::collections::HashMap;
use tracing::{debug, trace};

use crate::payload::{codec, Payload};

/// Opaque handle for one registered listener. Removal goes through this id,
/// never through callback identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&str, &Payload) + Send>;

/// Refcounted fan-out of topics to listeners.
///
/// Invariant: a network-level subscription exists for a topic exactly while
/// its listener set is non-empty. The mux itself never talks to the wire; it
/// tells the caller when a subscribe or unsubscribe is due, which keeps it a
/// plain data structure the hub drives.
#[derive(Default)]
pub struct TopicMux {
    next_id: u64,
    topics: HashMap<String, Vec<(ListenerId, Listener)>>,
}

impl TopicMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. The boolean is true when this is the first
    /// listener for the topic, i.e. the caller owes the wire a subscribe.
    ///
    /// Listeners are kept in registration order; two listeners on one topic
    /// always observe messages in the same relative order.
    pub fn add_listener(&mut self, topic: &str, listener: Listener) -> (ListenerId, bool) {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        let entry = self.topics.entry(topic.to_string()).or_default();
        let first = entry.is_empty();
        entry.push((id, listener));
        debug!(
            "Listener {:?} added on '{}' ({} total)",
            id,
            topic,
            entry.len()
        );
        (id, first)
    }

    /// Removes a listener. The boolean is true when the topic's set became
    /// empty, i.e. the caller owes the wire an unsubscribe. Removing an
    /// unknown listener is a no-op.
    pub fn remove_listener(&mut self, topic: &str, id: ListenerId) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(listener_id, _)| *listener_id != id);
        if entry.len() == before {
            trace!("Listener {:?} was not registered on '{}'", id, topic);
            return false;
        }
        debug!("Listener {:?} removed from '{}'", id, topic);
        if entry.is_empty() {
            self.topics.remove(topic);
            return true;
        }
        false
    }

    /// Decodes once and fans the shared decoded payload out to every
    /// listener of the topic, in registration order. Messages for topics
    /// with no listeners are dropped silently; returns how many listeners
    /// were reached.
    pub fn dispatch(&mut self, topic: &str, raw: &[u8]) -> usize {
        let Some(entry) = self.topics.get_mut(topic) else {
            trace!("No listeners on '{}', dropping message", topic);
            return 0;
        };
        let payload = codec::decode(raw);
        for (_, listener) in entry.iter_mut() {
            listener(topic, &payload);
        }
        entry.len()
    }

    /// Topics with at least one listener; exactly the set of live network
    /// subscriptions.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    /// Drops every listener without issuing unsubscribes; used when the
    /// connection itself is going away.
    pub fn clear(&mut self) {
        self.topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recording_listener(log: &Arc<Mutex<Vec<Payload>>>) -> Listener {
        let log = log.clone();
        Box::new(move |_topic, payload| log.lock().unwrap().push(payload.clone()))
    }

    #[test]
    fn subscribe_needed_only_for_first_listener() {
        let mut mux = TopicMux::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (a, first_a) = mux.add_listener("t", recording_listener(&log));
        let (b, first_b) = mux.add_listener("t", recording_listener(&log));
        assert!(first_a);
        assert!(!first_b);

        // interleaved removal: unsubscribe is due only when the set empties
        assert!(!mux.remove_listener("t", a));
        let (c, first_c) = mux.add_listener("t", recording_listener(&log));
        assert!(!first_c);
        assert!(!mux.remove_listener("t", b));
        assert!(mux.remove_listener("t", c));
        assert_eq!(mux.listener_count("t"), 0);
    }

    #[test]
    fn fan_out_reaches_every_listener_exactly_once() {
        let mut mux = TopicMux::new();
        let logs: Vec<_> = (0..3).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
        for log in &logs {
            mux.add_listener("fleet/dev-1/up/data", recording_listener(log));
        }

        let reached = mux.dispatch("fleet/dev-1/up/data", br#"{"n": 1}"#);
        assert_eq!(reached, 3);
        for log in &logs {
            let seen = log.lock().unwrap();
            assert_eq!(seen.as_slice(), &[Payload::Json(json!({"n": 1}))]);
        }
    }

    #[test]
    fn messages_without_listeners_are_dropped() {
        let mut mux = TopicMux::new();
        assert_eq!(mux.dispatch("nobody/home", b"{}"), 0);
    }

    #[test]
    fn removing_unknown_listener_is_a_no_op() {
        let mut mux = TopicMux::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (id, _) = mux.add_listener("a", recording_listener(&log));
        assert!(!mux.remove_listener("b", id));
        assert!(!mux.remove_listener("a", ListenerId(999)));
        assert_eq!(mux.listener_count("a"), 1);
    }

    #[test]
    fn listeners_on_other_topics_are_untouched() {
        let mut mux = TopicMux::new();
        let log_a = Arc::new(Mutex::new(Vec::new()));
        let log_b = Arc::new(Mutex::new(Vec::new()));
        mux.add_listener("a", recording_listener(&log_a));
        mux.add_listener("b", recording_listener(&log_b));

        mux.dispatch("a", b"1");
        assert_eq!(log_a.lock().unwrap().len(), 1);
        assert!(log_b.lock().unwrap().is_empty());
    }
}
