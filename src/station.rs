//! Station service — ties the subsystems together.
//!
//! ```text
//!  RadioPort ──▶ ScanPipeline ──▶ Decoder ──▶ Fleet ──┐
//!                                                     ▼
//!  LinkPort ◀── Connectivity ◀──────────── Dispatch ──▶ BrokerPort
//!                                                     ▲
//!  remote stations ───────────── inbound ─────────────┘
//! ```
//!
//! [`Station`] owns the fleet, decoder, dispatch registry, scan
//! pipeline and connectivity machine.  All I/O flows through port
//! traits injected at call sites, so the whole service runs against
//! mock adapters in tests.  Every method here executes on the
//! cooperative scheduler thread.

use crate::config::{ConfigSource, StationConfig};
use crate::decoder::Decoder;
use crate::dispatch::{BrokerPort, CommandTopic, Dispatch, Route};
use crate::error::ScanError;
use crate::fleet::{seeds_from_source, AttributeId, DeviceAddress, Fleet, FleetSink};
use crate::net::{Connectivity, ConnectivityState, LinkPort, SystemPort};
use crate::pipeline::{RadioPort, ScanPipeline, ScanRecord, ScanTiming};
use log::{debug, info, warn};

/// Remote attribute payloads longer than this are discarded.
const MAX_REMOTE_PAYLOAD: usize = 16;

// ---------------------------------------------------------------------------
// Collaborator ports (out-of-scope subsystems, interfaces only)
// ---------------------------------------------------------------------------

/// The on-device display/navigation collaborator.
pub trait UiPort {
    fn next_page(&mut self);
    fn prev_page(&mut self);
    fn next_screen(&mut self);
    fn prev_screen(&mut self);
    fn set_backlight(&mut self, on: bool);
    fn show_station_screen(&mut self);
}

/// Station-local climate (DHT) sensor.
#[derive(Debug, Clone, Copy)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity: f32,
}

pub trait ClimatePort {
    /// One reading, or `None` when the sensor misbehaves.
    fn read(&mut self) -> Option<ClimateReading>;
}

// ---------------------------------------------------------------------------
// Publish sink
// ---------------------------------------------------------------------------

/// Per-attribute payload formatting: temperature keeps two decimals,
/// everything else is integral (RSSI signed).
fn format_value(attr: AttributeId, value: f32) -> String {
    match attr {
        AttributeId::Temperature => format!("{value:.2}"),
        _ => format!("{}", value as i64),
    }
}

/// Borrows the publish path for the duration of one fleet update.
/// Publishes are gated on the broker being connected — the
/// connectivity machine's "ready" condition.
struct PublishSink<'a, B: BrokerPort> {
    dispatch: &'a Dispatch,
    broker: &'a mut B,
    config: &'a StationConfig,
    discovered: Vec<DeviceAddress>,
}

impl<B: BrokerPort> FleetSink for PublishSink<'_, B> {
    fn publish_attribute(&mut self, address: &DeviceAddress, attr: AttributeId, value: f32) {
        if !self.broker.is_connected() {
            return;
        }
        let topic = self
            .config
            .topic_flora(&address.to_string(), attr.topic_name());
        let payload = format_value(attr, value);
        if let Err(e) =
            self.dispatch
                .publish(self.broker, &topic, &payload, self.config.flora_mqtt_retain)
        {
            warn!("attribute publish failed: {e}");
        }
    }

    fn device_discovered(&mut self, address: &DeviceAddress, _id: u32) {
        self.discovered.push(*address);
    }
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

/// The single process-wide application context: constructed once at
/// startup and threaded through the cooperative loop by reference.
pub struct Station {
    config: StationConfig,
    client_id: String,
    fleet: Fleet,
    decoder: Decoder,
    dispatch: Dispatch,
    net: Connectivity,
    pipeline: ScanPipeline,
    last_climate_publish_ms: u64,
}

impl Station {
    pub fn new(config: StationConfig, client_id: String) -> Self {
        Self {
            config,
            client_id,
            fleet: Fleet::new(),
            decoder: Decoder::new(),
            dispatch: Dispatch::new(),
            net: Connectivity::new(),
            pipeline: ScanPipeline::new(),
            last_climate_publish_ms: 0,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.net.state()
    }

    pub fn subscription_count(&self) -> usize {
        self.dispatch.count()
    }

    // ── Boot wiring ───────────────────────────────────────────

    /// Register the station command subscriptions.
    pub fn setup_subscriptions(&mut self, broker: &mut impl BrokerPort) {
        let commands = [
            ("screen", CommandTopic::Screen),
            ("wifi", CommandTopic::Wifi),
            ("mqtt", CommandTopic::Mqtt),
            ("ble", CommandTopic::Ble),
        ];
        for (sub, command) in commands {
            let topic = self.config.topic_command(sub);
            if let Err(e) = self
                .dispatch
                .subscribe_to(&topic, Route::Command(command), broker)
            {
                warn!("command subscription {topic} failed: {e}");
            }
        }
    }

    /// Seed statically configured devices and, when collaboration is
    /// on, cross-subscribe to their attribute topics.
    pub fn load_devices(
        &mut self,
        devices: &impl ConfigSource,
        now_ms: u64,
        broker: &mut impl BrokerPort,
    ) {
        let seeds = seeds_from_source(devices);
        self.fleet.load_seeds(&seeds, now_ms);
        info!("Loaded {} devices", self.fleet.count());
        for seed in &seeds {
            self.subscribe_device_topics(&seed.address, broker);
        }
    }

    /// Subscribe to the four relayed attribute topics of one device.
    fn subscribe_device_topics(&mut self, address: &DeviceAddress, broker: &mut impl BrokerPort) {
        if !self.config.flora_mqtt_collaborate {
            return;
        }
        let attrs = [
            AttributeId::Temperature,
            AttributeId::Conductivity,
            AttributeId::Illuminance,
            AttributeId::Moisture,
        ];
        for attr in attrs {
            let topic = self
                .config
                .topic_flora(&address.to_string(), attr.topic_name());
            let route = Route::DeviceAttribute {
                address: *address,
                attr,
            };
            if let Err(e) = self.dispatch.subscribe_to(&topic, route, broker) {
                warn!("device subscription {topic} failed: {e}");
            }
        }
    }

    // ── Scan lifecycle ────────────────────────────────────────

    pub fn start_scanning<R: RadioPort>(&mut self, radio: R) -> Result<(), ScanError> {
        self.pipeline
            .start_scan(radio, ScanTiming::from_config(&self.config))
    }

    pub fn stop_scanning(&mut self) -> Result<(), ScanError> {
        self.pipeline.stop_scan()
    }

    pub fn is_scanning(&self) -> bool {
        self.pipeline.is_enabled()
    }

    /// Test/shutdown helper: wait for the scanner task to exit.
    pub fn wait_scan_idle(&mut self, timeout_ms: u64) -> bool {
        self.pipeline.wait_idle(timeout_ms)
    }

    // ── Cooperative ticks ─────────────────────────────────────

    /// Drain the scan queue and feed decoder + fleet.
    pub fn ingest_tick(&mut self, now_ms: u64, broker: &mut impl BrokerPort) {
        let mut records = Vec::new();
        self.pipeline.drain(|r| records.push(r));
        for record in records {
            self.ingest_record(&record, now_ms, broker);
        }
    }

    /// Decode one queued observation and apply it to the fleet.
    /// Decode rejections are expected noise and never escalate.
    pub fn ingest_record(
        &mut self,
        record: &ScanRecord,
        now_ms: u64,
        broker: &mut impl BrokerPort,
    ) {
        if self.config.ble_verbose {
            debug!(
                "processing scan data ({} bytes) for device {}",
                record.payload.len(),
                record.address
            );
        }
        match self.decoder.decode(record.address.octets(), &record.payload) {
            Ok(reading) => {
                let mut sink = PublishSink {
                    dispatch: &self.dispatch,
                    broker,
                    config: &self.config,
                    discovered: Vec::new(),
                };
                self.fleet.handle_reading(
                    record.address,
                    &reading,
                    record.rssi,
                    &self.config,
                    now_ms,
                    &mut sink,
                );
                let discovered = sink.discovered;
                for address in discovered {
                    self.subscribe_device_topics(&address, broker);
                }
            }
            Err(e) => debug!("decode from {}: {e}", record.address),
        }
    }

    /// Kick off link bring-up.
    pub fn begin_network(&mut self, now_ms: u64) {
        self.net.begin(now_ms);
    }

    /// One connectivity step; returns the delay until the next one.
    pub fn net_tick(
        &mut self,
        now_ms: u64,
        link: &mut impl LinkPort,
        broker: &mut impl BrokerPort,
        sys: &mut impl SystemPort,
    ) -> u64 {
        self.net.step(
            now_ms,
            &self.config,
            &self.client_id,
            link,
            broker,
            &self.dispatch,
            sys,
        )
    }

    /// Publish the station climate readings, respecting the minimum
    /// publish interval.
    pub fn climate_tick(
        &mut self,
        now_ms: u64,
        climate: &mut impl ClimatePort,
        broker: &mut impl BrokerPort,
    ) {
        let interval = u64::from(self.config.dht_publish_min_interval_sec) * 1000;
        if now_ms.saturating_sub(self.last_climate_publish_ms) < interval {
            return;
        }
        if !broker.is_connected() {
            return;
        }
        let Some(reading) = climate.read() else {
            // Retry on the next interval boundary.
            warn!("climate sensor read failed");
            self.last_climate_publish_ms = now_ms;
            return;
        };
        let retain = self.config.dht_mqtt_retain;
        let temp_topic = self.config.topic_dht("temperature");
        let hum_topic = self.config.topic_dht("humidity");
        let temp = format!("{:.1}", reading.temperature_c);
        let hum = format!("{:.1}", reading.humidity);
        if let Err(e) = self.dispatch.publish(broker, &temp_topic, &temp, retain) {
            warn!("climate publish failed: {e}");
            return;
        }
        if let Err(e) = self.dispatch.publish(broker, &hum_topic, &hum, retain) {
            warn!("climate publish failed: {e}");
            return;
        }
        self.last_climate_publish_ms = now_ms;
    }

    // ── Inbound messages ──────────────────────────────────────

    /// Route one inbound broker message.
    pub fn handle_inbound<R: RadioPort>(
        &mut self,
        topic: &str,
        payload: &[u8],
        now_ms: u64,
        link: &mut impl LinkPort,
        broker: &mut impl BrokerPort,
        ui: &mut impl UiPort,
        make_radio: impl FnOnce() -> R,
    ) {
        let Some(route) = self.dispatch.dispatch(topic, payload) else {
            return;
        };
        match route {
            Route::DeviceAttribute { address, attr } => {
                self.apply_remote_attribute(address, attr, payload, now_ms);
            }
            Route::Command(command) => {
                self.handle_command(command, payload, link, broker, ui, make_radio);
            }
        }
    }

    /// Apply an attribute update relayed by another station, subject
    /// to the local-over-remote arbitration window.
    fn apply_remote_attribute(
        &mut self,
        address: DeviceAddress,
        attr: AttributeId,
        payload: &[u8],
        now_ms: u64,
    ) {
        if payload.len() > MAX_REMOTE_PAYLOAD {
            return;
        }
        let Ok(text) = core::str::from_utf8(payload) else {
            return;
        };
        let Ok(value) = text.trim().parse::<f32>() else {
            return;
        };
        let Some(device) = self.fleet.find_by_address_mut(&address) else {
            return;
        };
        info!("From MQTT {} {}->{}", device.name(), attr.topic_name(), text);
        if !device.update_from_remote(attr, value, now_ms) {
            debug!("remote update for {} shadowed by fresh local reading", attr.topic_name());
        }
    }

    fn handle_command<R: RadioPort>(
        &mut self,
        command: CommandTopic,
        payload: &[u8],
        link: &mut impl LinkPort,
        broker: &mut impl BrokerPort,
        ui: &mut impl UiPort,
        make_radio: impl FnOnce() -> R,
    ) {
        match command {
            CommandTopic::Screen => {
                if payload_is(payload, "next") {
                    ui.next_page();
                } else if payload_is(payload, "prev") {
                    ui.prev_page();
                } else if payload_is(payload, "next_screen") {
                    ui.next_screen();
                } else if payload_is(payload, "prev_screen") {
                    ui.prev_screen();
                } else if payload_is(payload, "on") {
                    ui.set_backlight(true);
                } else if payload_is(payload, "off") {
                    ui.set_backlight(false);
                } else if payload_is(payload, "station") {
                    ui.show_station_screen();
                }
                // Unrecognized payloads are ignored without error.
            }
            CommandTopic::Wifi => {
                if payload_is(payload, "disconnect") {
                    link.disconnect();
                }
            }
            CommandTopic::Mqtt => {
                if payload_is(payload, "disconnect") {
                    self.net.drop_broker(broker);
                }
            }
            CommandTopic::Ble => {
                if payload_is(payload, "stopscan") {
                    let result = self.stop_scanning();
                    info!(
                        "Stopped BLE scan: {}",
                        if result.is_ok() { "success" } else { "failed" }
                    );
                } else if payload_is(payload, "startscan") {
                    let result = self.start_scanning(make_radio());
                    info!(
                        "Start BLE scanning: {}",
                        if result.is_ok() { "success" } else { "failed" }
                    );
                }
            }
        }
    }
}

/// Case-insensitive whole-payload comparison.
fn payload_is(payload: &[u8], term: &str) -> bool {
    payload.len() == term.len() && payload.eq_ignore_ascii_case(term.as_bytes())
}
