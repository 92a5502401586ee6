use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;

/// Notification published whenever an instance holder is destroyed, keyed
/// by the holder's name. Subscribers use it to drop caches or re-resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyEvent {
    pub name: String,
}

/// Per-name destroy notification channels.
///
/// Publishing never blocks and never fails: channels are unbounded, and
/// receivers that have gone away are pruned on the next publish for their
/// name.
#[derive(Default)]
pub(crate) struct EventBus {
    channels: RwLock<HashMap<String, Vec<Sender<DestroyEvent>>>>,
}

impl EventBus {
    pub fn subscribe(&self, name: &str) -> Receiver<DestroyEvent> {
        let (sender, receiver) = unbounded();
        self.channels
            .write()
            .entry(name.to_string())
            .or_default()
            .push(sender);
        receiver
    }

    pub fn publish(&self, name: &str) {
        let mut channels = self.channels.write();
        let Some(senders) = channels.get_mut(name) else {
            return;
        };
        senders.retain(|sender| {
            sender
                .send(DestroyEvent {
                    name: name.to_string(),
                })
                .is_ok()
        });
        if senders.is_empty() {
            channels.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_events_for_their_name_only() {
        let bus = EventBus::default();
        let db = bus.subscribe("db");
        let cache = bus.subscribe("cache");

        bus.publish("db");

        assert_eq!(db.try_recv().unwrap().name, "db");
        assert!(cache.try_recv().is_err());
    }

    #[test]
    fn publish_prunes_dropped_subscribers() {
        let bus = EventBus::default();
        drop(bus.subscribe("db"));

        bus.publish("db");
        assert!(bus.channels.read().get("db").is_none());
    }
}
