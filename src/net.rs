//! Network connectivity state machine.
//!
//! Sequences two chained unreliable connections — the WiFi link and
//! the MQTT broker on top of it — through a single process-wide state
//! variable:
//!
//! ```text
//! Disconnected ──begin()──▶ LinkSetup ──▶ LinkConnecting ──▶ LinkConnected
//!                                │ timeout                        │
//!                                ▼                                ▼
//!                           hard reset                   BrokerConnecting ◀─┐
//!                                                                 │         │
//!                                                                 ▼         │
//!                                                        BrokerConnected    │
//!                                                                 │         │
//!                                                                 ▼         │
//!                      LinkConnecting ◀──link down── Verifying ──broker down┘
//! ```
//!
//! Failures are never surfaced as errors to the caller: every outcome
//! is a state transition, and the scheduler just keeps invoking
//! [`Connectivity::step`].  The one exception is the escape hatch — a
//! link that stays down past a configurable threshold hard-resets the
//! device, because a stuck radio stack on this class of hardware is
//! occasionally unrecoverable in software.

use crate::config::StationConfig;
use crate::dispatch::{BrokerOptions, BrokerPort, Dispatch};
use crate::error::CommsError;
use log::{error, info, warn};

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// The link-layer (WiFi station) primitive.
pub trait LinkPort {
    /// Issue an association request.  Non-blocking; progress is
    /// observed by polling [`is_up`](Self::is_up).
    fn connect(&mut self) -> Result<(), CommsError>;
    fn disconnect(&mut self);
    fn is_up(&self) -> bool;
    /// Current signal strength in dBm, when associated.
    fn rssi(&self) -> Option<i8>;
}

/// Last-resort system control.
pub trait SystemPort {
    /// Full device restart.  Does not return on real hardware.
    fn hard_reset(&mut self);
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Connectivity bring-up states.  Exactly one instance, mutated only
/// by [`Connectivity::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    LinkSetup,
    LinkConnecting,
    LinkConnected,
    BrokerConnecting,
    BrokerConnected,
    Verifying,
}

// Step pacing (milliseconds until the next step invocation).
const PACE_IDLE: u64 = 5_000;
const PACE_CHAIN: u64 = 100;
const PACE_POLL: u64 = 1_000;
const PACE_SETUP: u64 = 500;

/// The connectivity state machine.
pub struct Connectivity {
    state: ConnectivityState,
    /// When the link was last known down (escape-hatch reference).
    last_disconnect_ms: u64,
    /// When liveness telemetry was last published.
    last_signal_publish_ms: u64,
}

impl Connectivity {
    pub fn new() -> Self {
        Self {
            state: ConnectivityState::Disconnected,
            last_disconnect_ms: 0,
            last_signal_publish_ms: 0,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// External restart: begin link bring-up.
    pub fn begin(&mut self, now_ms: u64) {
        self.last_disconnect_ms = now_ms;
        self.state = ConnectivityState::LinkSetup;
    }

    /// Tear the uplink down; terminal until [`begin`](Self::begin).
    pub fn end(&mut self, now_ms: u64, link: &mut impl LinkPort, broker: &mut impl BrokerPort) {
        broker.disconnect();
        link.disconnect();
        self.last_disconnect_ms = now_ms;
        self.state = ConnectivityState::Disconnected;
        info!("Connectivity: shut down");
    }

    /// Drop only the broker side; the verifier will reconnect it.
    pub fn drop_broker(&mut self, broker: &mut impl BrokerPort) {
        broker.disconnect();
        if self.state == ConnectivityState::Verifying
            || self.state == ConnectivityState::BrokerConnected
        {
            self.state = ConnectivityState::BrokerConnecting;
        }
    }

    /// Advance the machine by one step.  Never blocks beyond one
    /// bounded broker handshake.  Returns the delay in milliseconds
    /// until the next step is due.
    pub fn step(
        &mut self,
        now_ms: u64,
        config: &StationConfig,
        client_id: &str,
        link: &mut impl LinkPort,
        broker: &mut impl BrokerPort,
        dispatch: &Dispatch,
        sys: &mut impl SystemPort,
    ) -> u64 {
        match self.state {
            // Terminal unless externally restarted.
            ConnectivityState::Disconnected => PACE_IDLE,

            ConnectivityState::LinkSetup => {
                info!("WiFi connect SSID:{}", config.wifi_ssid);
                if let Err(e) = link.connect() {
                    // Stay in setup; the next step retries the request.
                    warn!("link connect request failed: {e}");
                    return PACE_POLL;
                }
                self.state = ConnectivityState::LinkConnecting;
                PACE_SETUP
            }

            ConnectivityState::LinkConnecting => {
                if link.is_up() {
                    self.state = ConnectivityState::LinkConnected;
                    return PACE_CHAIN;
                }

                // Escape hatch: a link that stays down this long is
                // treated as an unrecoverable radio stack.
                if config.wifi_restart_core_sec != 0 {
                    let down_secs = now_ms.saturating_sub(self.last_disconnect_ms) / 1000;
                    if down_secs > u64::from(config.wifi_restart_core_sec) {
                        error!("Restarting core due to WiFi inactivity!");
                        sys.hard_reset();
                        // Unreachable on hardware; keep polling in sim.
                        self.last_disconnect_ms = now_ms;
                    }
                }
                PACE_POLL
            }

            ConnectivityState::LinkConnected => {
                self.state = ConnectivityState::BrokerConnecting;
                PACE_CHAIN
            }

            ConnectivityState::BrokerConnecting => {
                // The broker rides on the link; a dead link sends us
                // back to link bring-up instead of hopeless handshakes.
                if !link.is_up() {
                    warn!("WiFi is down, reconnecting..");
                    self.last_disconnect_ms = now_ms;
                    self.state = ConnectivityState::LinkConnecting;
                    return PACE_POLL;
                }
                if self.try_broker_connect(now_ms, config, client_id, broker, dispatch) {
                    self.state = ConnectivityState::BrokerConnected;
                    PACE_CHAIN
                } else {
                    // Single bounded attempt failed; retry after a
                    // fixed delay.
                    PACE_POLL
                }
            }

            ConnectivityState::BrokerConnected => {
                self.state = ConnectivityState::Verifying;
                u64::from(config.net_verify_interval_sec) * 1000
            }

            ConnectivityState::Verifying => {
                if !link.is_up() {
                    warn!("WiFi is down, reconnecting..");
                    self.last_disconnect_ms = now_ms;
                    self.state = ConnectivityState::LinkConnecting;
                    return PACE_POLL;
                }
                if !broker.is_connected() {
                    warn!("MQTT is down, reconnecting..");
                    self.state = ConnectivityState::BrokerConnecting;
                    return PACE_POLL;
                }

                // Both healthy: periodic liveness telemetry.
                let interval = u64::from(config.signal_publish_interval_sec) * 1000;
                if now_ms.saturating_sub(self.last_signal_publish_ms) > interval {
                    if let Some(rssi) = link.rssi() {
                        let topic = config.topic_wifi("signal");
                        if let Err(e) =
                            dispatch.publish(broker, &topic, &rssi.to_string(), false)
                        {
                            // Aborts only this publish; retried next
                            // interval.
                            warn!("signal publish failed: {e}");
                        }
                    }
                    self.last_signal_publish_ms = now_ms;
                }
                u64::from(config.net_verify_interval_sec) * 1000
            }
        }
    }

    /// One blocking, bounded broker handshake.  On success announces
    /// availability and replays all subscriptions.
    fn try_broker_connect(
        &mut self,
        _now_ms: u64,
        config: &StationConfig,
        client_id: &str,
        broker: &mut impl BrokerPort,
        dispatch: &Dispatch,
    ) -> bool {
        let availability = config.topic_availability();
        let options = BrokerOptions {
            host: &config.mqtt_host,
            port: config.mqtt_port,
            client_id,
            username: config.mqtt_username.as_deref(),
            password: config.mqtt_password.as_deref(),
            will_topic: &availability,
            will_payload: &config.payload_offline,
        };

        if let Err(e) = broker.connect(&options) {
            warn!("Connection failed: {e}");
            return false;
        }
        info!("Connected ({}:{})!", config.mqtt_host, config.mqtt_port);

        // Announce availability; the broker delivers the offline will
        // on our behalf if we vanish uncleanly.
        if let Err(e) = dispatch.publish(broker, &availability, &config.payload_online, true) {
            warn!("availability publish failed: {e}");
        }
        dispatch.resubscribe_all(broker);
        true
    }
}

/// MQTT client identifier: configured value, or
/// `<station_name>-<mac suffix>` derived from the factory MAC.
pub fn client_id(config: &StationConfig, mac: &[u8; 6]) -> String {
    match &config.mqtt_client_id {
        Some(id) => id.clone(),
        None => {
            let id = format!(
                "{}-{:02x}{:02x}{:02x}",
                config.station_name, mac[3], mac[4], mac[5]
            );
            info!("Client id generated: {id}");
            id
        }
    }
}
