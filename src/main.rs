//! FloraHub firmware — main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                   │
//! │                                                            │
//! │  BleRadio        WifiAdapter      MqttAdapter              │
//! │  (RadioPort)     (LinkPort)       (BrokerPort)             │
//! │                                                            │
//! │  ───────────────── Port Trait Boundary ─────────────       │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │            Station (cooperative core)            │      │
//! │  │  Pipeline · Decoder · Fleet · Dispatch · Net     │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                                                            │
//! │  scanner thread ──bounded queue──▶ cooperative loop        │
//! └────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};
use std::time::{Duration, Instant};

use florahub::adapters::ble::BleRadio;
use florahub::adapters::device_id;
use florahub::adapters::mqtt::MqttAdapter;
use florahub::adapters::system::SystemAdapter;
use florahub::adapters::wifi::WifiAdapter;
use florahub::config::{EmptySource, StationConfig};
use florahub::dispatch::BrokerPort;
use florahub::net::client_id;
use florahub::station::{ClimatePort, ClimateReading, Station, UiPort};
use florahub::tasks::TaskTimer;

// ── Out-of-scope collaborators ────────────────────────────────
//
// The display/navigation stack and the DHT driver live outside this
// crate; the station only needs their port traits satisfied.

struct LogUi;

impl UiPort for LogUi {
    fn next_page(&mut self) {
        info!("ui: next page");
    }
    fn prev_page(&mut self) {
        info!("ui: prev page");
    }
    fn next_screen(&mut self) {
        info!("ui: next screen");
    }
    fn prev_screen(&mut self) {
        info!("ui: prev screen");
    }
    fn set_backlight(&mut self, on: bool) {
        info!("ui: backlight {}", if on { "on" } else { "off" });
    }
    fn show_station_screen(&mut self) {
        info!("ui: station screen");
    }
}

struct NoClimate;

impl ClimatePort for NoClimate {
    fn read(&mut self) -> Option<ClimateReading> {
        None
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FloraHub v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    // The config.cfg / devices.cfg file store is an external
    // collaborator; compiled-in defaults apply until it is wired.
    let config = StationConfig::load(&EmptySource);

    // ── 3. Station identity ───────────────────────────────────
    let mac = device_id::read_mac();
    info!(
        "Station ID: {} (hostname: {})",
        device_id::station_id(&mac),
        device_id::hostname(&mac)
    );
    let client_id = client_id(&config, &mac);

    // ── 4. Adapters ───────────────────────────────────────────
    let mut wifi = WifiAdapter::new(&config.wifi_ssid, &config.wifi_password)
        .map_err(|e| anyhow::anyhow!("wifi adapter: {e}"))?;
    let mut mqtt = MqttAdapter::new();
    let mut sys = SystemAdapter::new();
    let mut ui = LogUi;
    let mut climate = NoClimate;

    let make_radio = |cfg: &StationConfig| {
        BleRadio::new(
            cfg.ble_active_scan,
            cfg.ble_scan_interval_ms,
            cfg.ble_window_interval_ms,
        )
    };

    // ── 5. Station service ────────────────────────────────────
    let mut station = Station::new(config.clone(), client_id);
    let start = Instant::now();
    let now0 = start.elapsed().as_millis() as u64;

    station.setup_subscriptions(&mut mqtt);
    station.load_devices(&EmptySource, now0, &mut mqtt);
    station.begin_network(now0);
    if let Err(e) = station.start_scanning(make_radio(&config)) {
        warn!("BLE scan start failed: {e}");
    }

    // ── 6. Cooperative loop ───────────────────────────────────
    let mut ingest_timer = TaskTimer::periodic(u64::from(config.ingest_interval_ms));
    ingest_timer.restart(now0);
    let mut net_timer = TaskTimer::periodic(100);
    net_timer.restart(now0);
    let mut climate_timer = TaskTimer::periodic(1_000);
    climate_timer.restart_delayed(now0);

    info!("System ready. Entering cooperative loop.");

    loop {
        std::thread::sleep(Duration::from_millis(10));
        let now = start.elapsed().as_millis() as u64;

        // Link association progress (request/poll).
        wifi.poll();

        if ingest_timer.due(now) {
            station.ingest_tick(now, &mut mqtt);
        }

        if net_timer.due(now) {
            let pace = station.net_tick(now, &mut wifi, &mut mqtt, &mut sys);
            net_timer.set_interval(pace);
            net_timer.restart_delayed_by(now, pace);
        }

        if climate_timer.due(now) {
            station.climate_tick(now, &mut climate, &mut mqtt);
        }

        // Inbound broker traffic → dispatch → fleet / commands.
        let mut inbound = Vec::new();
        while let Some(msg) = mqtt.poll_inbound() {
            inbound.push(msg);
        }
        for msg in inbound {
            station.handle_inbound(
                &msg.topic,
                &msg.payload,
                now,
                &mut wifi,
                &mut mqtt,
                &mut ui,
                || make_radio(&config),
            );
        }
    }
}
