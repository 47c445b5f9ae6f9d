//! Pub/sub dispatch layer.
//!
//! A topic-keyed subscription registry and inbound-message router on
//! top of the broker transport.  Subscriptions are an application-level
//! durable list: the registry is append-only and replayed to the
//! transport on every broker (re)connection, independent of
//! transport-level session state.
//!
//! Routing is an enum-tagged table: each subscription carries a
//! [`Route`] describing where the payload goes, and the station layer
//! executes it.  At most one route per topic.

use crate::error::CommsError;
use crate::fleet::{AttributeId, DeviceAddress};
use log::{info, warn};

// ---------------------------------------------------------------------------
// Broker port
// ---------------------------------------------------------------------------

/// Connection parameters for one broker handshake attempt.
pub struct BrokerOptions<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    /// Last-will message: delivered by the broker if this station
    /// disappears uncleanly.
    pub will_topic: &'a str,
    pub will_payload: &'a str,
}

/// One message received from the broker.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// The broker transport primitive.  `connect` is a single blocking,
/// bounded handshake attempt; retry policy lives in the connectivity
/// state machine.
pub trait BrokerPort {
    fn connect(&mut self, options: &BrokerOptions<'_>) -> Result<(), CommsError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError>;
    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError>;

    /// Next buffered inbound message, if any.  Drained by the
    /// cooperative loop between ticks.
    fn poll_inbound(&mut self) -> Option<InboundMessage> {
        None
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// Command topic family (`.../command/<sub>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTopic {
    Screen,
    Wifi,
    Mqtt,
    Ble,
}

/// Where an inbound payload is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Remote attribute update for one fleet device.
    DeviceAttribute {
        address: DeviceAddress,
        attr: AttributeId,
    },
    /// Station command.
    Command(CommandTopic),
}

struct Subscription {
    topic: String,
    route: Route,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Subscription registry + router.
pub struct Dispatch {
    subscriptions: Vec<Subscription>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Register a route for `topic`.  Duplicate registration is
    /// rejected and the original route stays in place.
    ///
    /// When the broker is already connected the subscription is issued
    /// immediately; otherwise it becomes active on the next
    /// [`resubscribe_all`](Self::resubscribe_all).
    pub fn subscribe_to(
        &mut self,
        topic: &str,
        route: Route,
        broker: &mut impl BrokerPort,
    ) -> Result<(), CommsError> {
        if self.route_for(topic).is_some() {
            return Err(CommsError::DuplicateSubscription);
        }
        info!("Subscription {route:?} -> {topic}");
        self.subscriptions.push(Subscription {
            topic: topic.to_string(),
            route,
        });
        if broker.is_connected() {
            if let Err(e) = broker.subscribe(topic) {
                warn!("subscribe {topic} failed: {e}");
            }
        }
        Ok(())
    }

    /// Replay every registered subscription to the transport.  Called
    /// on every successful broker (re)connection.
    pub fn resubscribe_all(&self, broker: &mut impl BrokerPort) {
        for sub in &self.subscriptions {
            if let Err(e) = broker.subscribe(&sub.topic) {
                warn!("resubscribe {} failed: {e}", sub.topic);
            }
        }
    }

    /// Case-insensitive exact topic lookup.
    pub fn route_for(&self, topic: &str) -> Option<Route> {
        self.subscriptions
            .iter()
            .find(|s| s.topic.eq_ignore_ascii_case(topic))
            .map(|s| s.route)
    }

    /// Route one inbound message.  Unmatched topics are logged and
    /// dropped — topic layouts can legitimately overlap across app
    /// versions, so this is not an error.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Option<Route> {
        info!("RX {:3}B T:{topic}", payload.len());
        let route = self.route_for(topic);
        if route.is_none() {
            warn!("Failed finding subscription for {topic}!");
        }
        route
    }

    /// Publish through the transport, logging size and topic.
    pub fn publish(
        &self,
        broker: &mut impl BrokerPort,
        topic: &str,
        payload: &str,
        retain: bool,
    ) -> Result<(), CommsError> {
        info!(
            "TX {:3}B T:{topic}{}",
            payload.len(),
            if retain { " (retain)" } else { "" }
        );
        broker.publish(topic, payload.as_bytes(), retain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Broker that records calls.
    pub struct MockBroker {
        pub connected: bool,
        pub subscribed: Vec<String>,
        pub published: Vec<(String, Vec<u8>, bool)>,
    }

    impl MockBroker {
        pub fn new(connected: bool) -> Self {
            Self {
                connected,
                subscribed: Vec::new(),
                published: Vec::new(),
            }
        }
    }

    impl BrokerPort for MockBroker {
        fn connect(&mut self, _options: &BrokerOptions<'_>) -> Result<(), CommsError> {
            self.connected = true;
            Ok(())
        }
        fn disconnect(&mut self) {
            self.connected = false;
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), CommsError> {
            self.published.push((topic.to_string(), payload.to_vec(), retain));
            Ok(())
        }
        fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
            self.subscribed.push(topic.to_string());
            Ok(())
        }
    }

    fn route() -> Route {
        Route::Command(CommandTopic::Ble)
    }

    #[test]
    fn duplicate_topic_rejected_original_kept() {
        let mut dispatch = Dispatch::new();
        let mut broker = MockBroker::new(false);
        dispatch.subscribe_to("root/cmd/ble", route(), &mut broker).unwrap();
        let second = dispatch.subscribe_to(
            "root/cmd/ble",
            Route::Command(CommandTopic::Wifi),
            &mut broker,
        );
        assert_eq!(second.unwrap_err(), CommsError::DuplicateSubscription);
        assert_eq!(dispatch.count(), 1);
        assert_eq!(dispatch.route_for("root/cmd/ble"), Some(route()));
    }

    #[test]
    fn duplicate_check_is_case_insensitive() {
        let mut dispatch = Dispatch::new();
        let mut broker = MockBroker::new(false);
        dispatch.subscribe_to("Root/Cmd/BLE", route(), &mut broker).unwrap();
        assert!(dispatch.subscribe_to("root/cmd/ble", route(), &mut broker).is_err());
    }

    #[test]
    fn lookup_is_case_insensitive_exact() {
        let mut dispatch = Dispatch::new();
        let mut broker = MockBroker::new(false);
        dispatch.subscribe_to("root/cmd/ble", route(), &mut broker).unwrap();
        assert_eq!(dispatch.route_for("ROOT/CMD/BLE"), Some(route()));
        assert_eq!(dispatch.route_for("root/cmd"), None);
        assert_eq!(dispatch.route_for("root/cmd/ble/extra"), None);
    }

    #[test]
    fn unmatched_dispatch_returns_none() {
        let dispatch = Dispatch::new();
        assert_eq!(dispatch.dispatch("nobody/home", b"x"), None);
    }

    #[test]
    fn subscribe_issues_immediately_when_connected() {
        let mut dispatch = Dispatch::new();
        let mut broker = MockBroker::new(true);
        dispatch.subscribe_to("a/b", route(), &mut broker).unwrap();
        assert_eq!(broker.subscribed, vec!["a/b"]);

        let mut offline = MockBroker::new(false);
        dispatch
            .subscribe_to("c/d", Route::Command(CommandTopic::Mqtt), &mut offline)
            .unwrap();
        assert!(offline.subscribed.is_empty());
    }

    #[test]
    fn resubscribe_replays_registry() {
        let mut dispatch = Dispatch::new();
        let mut broker = MockBroker::new(false);
        dispatch.subscribe_to("a/b", route(), &mut broker).unwrap();
        dispatch
            .subscribe_to("c/d", Route::Command(CommandTopic::Screen), &mut broker)
            .unwrap();

        broker.connected = true;
        dispatch.resubscribe_all(&mut broker);
        assert_eq!(broker.subscribed, vec!["a/b", "c/d"]);
    }

    #[test]
    fn publish_forwards_payload_and_retain() {
        let dispatch = Dispatch::new();
        let mut broker = MockBroker::new(true);
        dispatch.publish(&mut broker, "t/x", "21.5", true).unwrap();
        assert_eq!(broker.published.len(), 1);
        assert_eq!(broker.published[0].0, "t/x");
        assert_eq!(broker.published[0].1, b"21.5");
        assert!(broker.published[0].2);
    }
}
