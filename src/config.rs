//! Station configuration.
//!
//! All tunable parameters for a FloraHub station, with compiled-in
//! defaults.  Overrides come from a [`ConfigSource`] — the textual
//! `section:key=value` store lives outside this crate; here we only
//! consume lookups from it.  Topic construction is centralised here so
//! every subsystem builds identical topic strings.

use serde::{Deserialize, Serialize};

/// External key/value configuration store (e.g. a config file on
/// SPIFFS).  `get` returns the raw string for `section:key`, or `None`
/// when the key is absent — absent keys fall back to compiled-in
/// defaults.
pub trait ConfigSource {
    fn get(&self, section: &str, key: &str) -> Option<&str>;

    /// All section names, in file order.  Used by the fleet to seed
    /// statically configured devices (section name = device address).
    fn sections(&self) -> Vec<String>;
}

/// A source with no overrides: every lookup misses.
pub struct EmptySource;

impl ConfigSource for EmptySource {
    fn get(&self, _section: &str, _key: &str) -> Option<&str> {
        None
    }
    fn sections(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Core station configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    // --- WiFi ---
    pub wifi_ssid: String,
    pub wifi_password: String,
    /// Restart the core if WiFi stays down this long (seconds).
    /// Zero disables the escape hatch.
    pub wifi_restart_core_sec: u32,

    // --- Station identity / topics ---
    pub station_name: String,
    pub root_topic: String,
    /// Defaults to `<root>/station/<name>/status` when `None`.
    pub availability_topic: Option<String>,
    /// Defaults to `<root>/station/<name>/command` when `None`.
    pub command_topic: Option<String>,
    pub payload_online: String,
    pub payload_offline: String,

    // --- MQTT broker ---
    pub mqtt_host: String,
    pub mqtt_port: u16,
    /// Defaults to `<station_name>-<mac suffix>` when `None`.
    pub mqtt_client_id: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,

    // --- Station climate sensor ---
    /// Defaults to `<root>/station/<name>/dht` when `None`.
    pub dht_base_topic: Option<String>,
    pub dht_publish_min_interval_sec: u16,
    pub dht_mqtt_retain: bool,

    // --- Plant sensors ---
    /// Defaults to the shared root topic when `None`, so stations
    /// cross-subscribe to each other's per-device topics.
    pub flora_base_topic: Option<String>,
    pub flora_publish_min_interval_sec: u16,
    pub flora_mqtt_collaborate: bool,
    pub flora_mqtt_retain: bool,
    pub flora_discover_devices: bool,

    // --- Radio scanning ---
    pub ble_scan_duration_sec: u32,
    pub ble_scan_wait_sec: u32,
    pub ble_scan_interval_ms: u16,
    pub ble_window_interval_ms: u16,
    pub ble_active_scan: bool,
    pub ble_verbose: bool,

    // --- Timing ---
    /// Ingest drain period (milliseconds).
    pub ingest_interval_ms: u32,
    /// Liveness verification period once fully connected (seconds).
    pub net_verify_interval_sec: u16,
    /// Minimum interval between wifi/signal publishes (seconds).
    pub signal_publish_interval_sec: u16,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            // WiFi
            wifi_ssid: "WIFISSID".into(),
            wifi_password: "password".into(),
            wifi_restart_core_sec: 120,

            // Station
            station_name: "station1".into(),
            root_topic: "miflora_rbs".into(),
            availability_topic: None,
            command_topic: None,
            payload_online: "online".into(),
            payload_offline: "offline".into(),

            // MQTT
            mqtt_host: "192.168.1.1".into(),
            mqtt_port: 1883,
            mqtt_client_id: None,
            mqtt_username: None,
            mqtt_password: None,

            // DHT
            dht_base_topic: None,
            dht_publish_min_interval_sec: 60,
            dht_mqtt_retain: false,

            // Flora
            flora_base_topic: None,
            flora_publish_min_interval_sec: 10,
            flora_mqtt_collaborate: true,
            flora_mqtt_retain: true,
            flora_discover_devices: true,

            // BLE
            ble_scan_duration_sec: 20,
            ble_scan_wait_sec: 30,
            ble_scan_interval_ms: 50,
            ble_window_interval_ms: 30,
            ble_active_scan: true,
            ble_verbose: false,

            // Timing
            ingest_interval_ms: 50,
            net_verify_interval_sec: 5,
            signal_publish_interval_sec: 10,
        }
    }
}

impl StationConfig {
    /// Build a configuration from defaults plus any overrides present
    /// in `src`.  Station name and topic roots are lowercased once
    /// here; all later topic comparisons are exact.
    pub fn load(src: &impl ConfigSource) -> Self {
        let mut cfg = Self::default();

        let s = |v: Option<&str>, slot: &mut String| {
            if let Some(v) = v {
                *slot = v.to_string();
            }
        };
        let opt = |v: Option<&str>, slot: &mut Option<String>| {
            if let Some(v) = v {
                *slot = Some(v.to_string());
            }
        };

        s(src.get("wifi", "ssid"), &mut cfg.wifi_ssid);
        s(src.get("wifi", "password"), &mut cfg.wifi_password);
        if let Some(v) = src.get("wifi", "restart_core_sec") {
            cfg.wifi_restart_core_sec = v.parse().unwrap_or(cfg.wifi_restart_core_sec);
        }

        s(src.get("station", "name"), &mut cfg.station_name);
        s(src.get("station", "root_topic"), &mut cfg.root_topic);
        opt(src.get("station", "availability_topic"), &mut cfg.availability_topic);
        opt(src.get("station", "command_topic"), &mut cfg.command_topic);
        s(src.get("station", "payload_online"), &mut cfg.payload_online);
        s(src.get("station", "payload_offline"), &mut cfg.payload_offline);

        s(src.get("mqtt", "host"), &mut cfg.mqtt_host);
        if let Some(v) = src.get("mqtt", "port") {
            cfg.mqtt_port = v.parse().unwrap_or(cfg.mqtt_port);
        }
        opt(src.get("mqtt", "clientid"), &mut cfg.mqtt_client_id);
        opt(src.get("mqtt", "username"), &mut cfg.mqtt_username);
        opt(src.get("mqtt", "password"), &mut cfg.mqtt_password);

        opt(src.get("dht", "base_topic"), &mut cfg.dht_base_topic);
        if let Some(v) = src.get("dht", "publish_min_interval_sec") {
            cfg.dht_publish_min_interval_sec = v.parse().unwrap_or(cfg.dht_publish_min_interval_sec);
        }
        if let Some(v) = src.get("dht", "mqtt_retain") {
            cfg.dht_mqtt_retain = parse_bool(v, cfg.dht_mqtt_retain);
        }

        opt(src.get("flora", "base_topic"), &mut cfg.flora_base_topic);
        if let Some(v) = src.get("flora", "publish_min_interval_sec") {
            cfg.flora_publish_min_interval_sec =
                v.parse().unwrap_or(cfg.flora_publish_min_interval_sec);
        }
        if let Some(v) = src.get("flora", "mqtt_collaborate") {
            cfg.flora_mqtt_collaborate = parse_bool(v, cfg.flora_mqtt_collaborate);
        }
        if let Some(v) = src.get("flora", "mqtt_retain") {
            cfg.flora_mqtt_retain = parse_bool(v, cfg.flora_mqtt_retain);
        }
        if let Some(v) = src.get("flora", "discover_devices") {
            cfg.flora_discover_devices = parse_bool(v, cfg.flora_discover_devices);
        }

        if let Some(v) = src.get("ble", "scan_duration_sec") {
            cfg.ble_scan_duration_sec = v.parse().unwrap_or(cfg.ble_scan_duration_sec);
        }
        if let Some(v) = src.get("ble", "scan_wait_sec") {
            cfg.ble_scan_wait_sec = v.parse().unwrap_or(cfg.ble_scan_wait_sec);
        }
        if let Some(v) = src.get("ble", "scan_interval_ms") {
            cfg.ble_scan_interval_ms = v.parse().unwrap_or(cfg.ble_scan_interval_ms);
        }
        if let Some(v) = src.get("ble", "window_interval_ms") {
            cfg.ble_window_interval_ms = v.parse().unwrap_or(cfg.ble_window_interval_ms);
        }
        if let Some(v) = src.get("ble", "active_scan") {
            cfg.ble_active_scan = parse_bool(v, cfg.ble_active_scan);
        }
        if let Some(v) = src.get("ble", "verbose") {
            cfg.ble_verbose = parse_bool(v, cfg.ble_verbose);
        }

        // Scan window must not exceed the scan interval.
        if cfg.ble_window_interval_ms > cfg.ble_scan_interval_ms {
            cfg.ble_window_interval_ms = cfg.ble_scan_interval_ms.saturating_sub(1);
        }

        cfg.station_name.make_ascii_lowercase();
        cfg.root_topic.make_ascii_lowercase();
        cfg
    }

    // ── Topic construction ────────────────────────────────────

    /// `<root>/station/<name>/status`, unless overridden.
    pub fn topic_availability(&self) -> String {
        match &self.availability_topic {
            Some(t) => t.clone(),
            None => format!("{}/station/{}/status", self.root_topic, self.station_name),
        }
    }

    /// `<root>/station/<name>/command/<sub>`, unless overridden.
    pub fn topic_command(&self, sub: &str) -> String {
        match &self.command_topic {
            Some(t) => format!("{t}/{sub}"),
            None => format!(
                "{}/station/{}/command/{sub}",
                self.root_topic, self.station_name
            ),
        }
    }

    /// `<root>/station/<name>/wifi/<sub>`.
    pub fn topic_wifi(&self, sub: &str) -> String {
        format!("{}/station/{}/wifi/{sub}", self.root_topic, self.station_name)
    }

    /// `<dht base>/<sub>`, base defaulting to `<root>/station/<name>/dht`.
    pub fn topic_dht(&self, sub: &str) -> String {
        match &self.dht_base_topic {
            Some(t) => format!("{t}/{sub}"),
            None => format!("{}/station/{}/dht/{sub}", self.root_topic, self.station_name),
        }
    }

    /// `<flora base>/<address>/<attribute>`, base defaulting to the
    /// shared root topic.
    pub fn topic_flora(&self, address: &str, attribute: &str) -> String {
        let base = self.flora_base_topic.as_deref().unwrap_or(&self.root_topic);
        format!("{base}/{address}/{attribute}")
    }
}

fn parse_bool(v: &str, def: bool) -> bool {
    if v.eq_ignore_ascii_case("true") {
        return true;
    }
    if v.eq_ignore_ascii_case("false") {
        return false;
    }
    v.parse::<i64>().map(|n| n != 0).unwrap_or(def)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapSource(Vec<(&'static str, &'static str, &'static str)>);

    impl ConfigSource for MapSource {
        fn get(&self, section: &str, key: &str) -> Option<&str> {
            self.0
                .iter()
                .find(|(s, k, _)| *s == section && *k == key)
                .map(|(_, _, v)| *v)
        }
        fn sections(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn default_config_is_sane() {
        let c = StationConfig::default();
        assert!(c.ble_scan_duration_sec > 0);
        assert!(c.ble_window_interval_ms <= c.ble_scan_interval_ms);
        assert!(c.flora_publish_min_interval_sec > 0);
        assert!(c.ingest_interval_ms > 0);
        assert!(c.mqtt_port > 0);
    }

    #[test]
    fn serde_roundtrip() {
        let c = StationConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: StationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.station_name, c2.station_name);
        assert_eq!(c.mqtt_port, c2.mqtt_port);
        assert_eq!(c.flora_publish_min_interval_sec, c2.flora_publish_min_interval_sec);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = StationConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: StationConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c.root_topic, c2.root_topic);
        assert_eq!(c.ble_scan_wait_sec, c2.ble_scan_wait_sec);
    }

    #[test]
    fn default_topics() {
        let c = StationConfig::default();
        assert_eq!(c.topic_availability(), "miflora_rbs/station/station1/status");
        assert_eq!(c.topic_command("ble"), "miflora_rbs/station/station1/command/ble");
        assert_eq!(c.topic_wifi("signal"), "miflora_rbs/station/station1/wifi/signal");
        assert_eq!(c.topic_dht("temperature"), "miflora_rbs/station/station1/dht/temperature");
        assert_eq!(
            c.topic_flora("c4:7c:8d:66:a1:b2", "temp"),
            "miflora_rbs/c4:7c:8d:66:a1:b2/temp"
        );
    }

    #[test]
    fn explicit_topics_override_defaults() {
        let mut c = StationConfig::default();
        c.availability_topic = Some("custom/avail".into());
        c.command_topic = Some("custom/cmd".into());
        c.flora_base_topic = Some("plants".into());
        assert_eq!(c.topic_availability(), "custom/avail");
        assert_eq!(c.topic_command("wifi"), "custom/cmd/wifi");
        assert_eq!(c.topic_flora("aa:bb:cc:dd:ee:ff", "rssi"), "plants/aa:bb:cc:dd:ee:ff/rssi");
    }

    #[test]
    fn overrides_and_lowercasing() {
        let src = MapSource(vec![
            ("station", "name", "Kitchen"),
            ("station", "root_topic", "MiFlora_RBS"),
            ("mqtt", "port", "8883"),
            ("ble", "scan_duration_sec", "5"),
            ("flora", "mqtt_collaborate", "false"),
        ]);
        let c = StationConfig::load(&src);
        assert_eq!(c.station_name, "kitchen");
        assert_eq!(c.root_topic, "miflora_rbs");
        assert_eq!(c.mqtt_port, 8883);
        assert_eq!(c.ble_scan_duration_sec, 5);
        assert!(!c.flora_mqtt_collaborate);
    }

    #[test]
    fn scan_window_clamped_to_interval() {
        let src = MapSource(vec![
            ("ble", "scan_interval_ms", "40"),
            ("ble", "window_interval_ms", "80"),
        ]);
        let c = StationConfig::load(&src);
        assert_eq!(c.ble_window_interval_ms, 39);
    }

    #[test]
    fn bool_parsing_accepts_numeric() {
        assert!(parse_bool("1", false));
        assert!(!parse_bool("0", true));
        assert!(parse_bool("TRUE", false));
        assert!(!parse_bool("False", true));
        assert!(parse_bool("garbage", true));
    }
}
