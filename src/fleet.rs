//! Device and fleet model.
//!
//! Each discovered plant sensor is a [`Device`] with a fixed set of
//! five [`Attribute`]s.  Attributes are updated from two sources —
//! local radio readings and remote readings relayed by collaborating
//! stations — under an arbitration policy that trusts fresh local
//! observations over relayed ones.
//!
//! The fleet and everything in it is mutated only from the cooperative
//! scheduler thread; no locking here by construction.

use crate::config::{ConfigSource, StationConfig};
use crate::decoder::{DecodedReading, RadioAddr};
use core::fmt;
use core::str::FromStr;
use log::{info, warn};

/// A remote update loses to a local one younger than this.
const ARBITRATION_WINDOW_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Device address
// ---------------------------------------------------------------------------

/// 6-byte radio address.  Displays as lowercase `aa:bb:cc:dd:ee:ff`,
/// which is also the form used in topic paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(RadioAddr);

impl DeviceAddress {
    pub fn new(octets: RadioAddr) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> RadioAddr {
        self.0
    }

    /// Colon-free form for identifier use (e.g. `c47c8d66a1b2`).
    pub fn compressed(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = ();

    /// Parse `aa:bb:cc:dd:ee:ff` (hex digits case-insensitive).
    fn from_str(s: &str) -> Result<Self, ()> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for slot in &mut octets {
            let part = parts.next().ok_or(())?;
            if part.len() != 2 {
                return Err(());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }
        if parts.next().is_some() {
            return Err(());
        }
        Ok(Self(octets))
    }
}

// ---------------------------------------------------------------------------
// Attribute identity
// ---------------------------------------------------------------------------

/// The fixed attribute set of a plant-sensor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum AttributeId {
    Moisture = 0,
    Temperature = 1,
    Conductivity = 2,
    Illuminance = 3,
    Rssi = 4,
}

impl AttributeId {
    pub const COUNT: usize = 5;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Moisture,
        Self::Temperature,
        Self::Conductivity,
        Self::Illuminance,
        Self::Rssi,
    ];

    /// Short display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Moisture => "Moist",
            Self::Temperature => "Temp",
            Self::Conductivity => "Cond",
            Self::Illuminance => "Light",
            Self::Rssi => "RSSI",
        }
    }

    /// Leaf name used in per-device topics.
    pub fn topic_name(self) -> &'static str {
        match self {
            Self::Moisture => "moisture",
            Self::Temperature => "temp",
            Self::Conductivity => "conductivity",
            Self::Illuminance => "light",
            Self::Rssi => "rssi",
        }
    }

    /// Inverse of [`topic_name`](Self::topic_name).
    pub fn from_topic_name(name: &str) -> Option<Self> {
        match name {
            "moisture" => Some(Self::Moisture),
            "temp" => Some(Self::Temperature),
            "conductivity" => Some(Self::Conductivity),
            "light" => Some(Self::Illuminance),
            "rssi" => Some(Self::Rssi),
            _ => None,
        }
    }

    /// Seed/limit key used in the device configuration file.
    pub fn config_name(self) -> &'static str {
        match self {
            Self::Moisture => "moisture",
            Self::Temperature => "temperature",
            Self::Conductivity => "conductivity",
            Self::Illuminance => "illuminance",
            Self::Rssi => "rssi",
        }
    }
}

/// Where an attribute's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateSource {
    #[default]
    None,
    LocalRadio,
    RemoteNetwork,
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// One measured quantity on one device.
///
/// The presence flag gates every reader: when `has_value()` is false
/// the stored value is meaningless.  Mutation goes through [`set`]
/// exclusively, which stamps source and timestamp.
///
/// [`set`]: Attribute::set
#[derive(Debug, Clone)]
pub struct Attribute {
    value: f32,
    has_value: bool,
    source: UpdateSource,
    last_updated_ms: u64,
    min: Option<f32>,
    max: Option<f32>,
    label: &'static str,
}

impl Attribute {
    fn new(label: &'static str) -> Self {
        Self {
            value: 0.0,
            has_value: false,
            source: UpdateSource::None,
            last_updated_ms: 0,
            min: None,
            max: None,
            label,
        }
    }

    /// Unconditional last-writer-wins write.  Arbitration between
    /// sources happens one layer up, before calling this.
    pub fn set(&mut self, value: f32, source: UpdateSource, now_ms: u64) {
        self.value = value;
        self.has_value = true;
        self.source = source;
        self.last_updated_ms = now_ms;
    }

    /// Drop the value; source reverts to `None`.
    pub fn reset(&mut self, now_ms: u64) {
        self.has_value = false;
        self.source = UpdateSource::None;
        self.last_updated_ms = now_ms;
    }

    pub fn get(&self) -> f32 {
        self.value
    }

    pub fn get_or(&self, default: f32) -> f32 {
        if self.has_value {
            self.value
        } else {
            default
        }
    }

    pub fn has_value(&self) -> bool {
        self.has_value
    }

    pub fn source(&self) -> UpdateSource {
        self.source
    }

    pub fn last_updated(&self) -> u64 {
        self.last_updated_ms
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn set_min(&mut self, min: f32) {
        self.min = Some(min);
    }

    pub fn set_max(&mut self, max: f32) {
        self.max = Some(max);
    }

    pub fn reset_limits(&mut self) {
        self.min = None;
        self.max = None;
    }

    /// False only when a present bound is violated; absent bounds
    /// never fail the check.
    pub fn in_limits(&self) -> bool {
        if let Some(max) = self.max {
            if self.value > max {
                return false;
            }
        }
        if let Some(min) = self.min {
            if self.value < min {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Fleet sink
// ---------------------------------------------------------------------------

/// Notifications from the fleet to the station layer.
///
/// The fleet decides *what* to publish (per-attribute min-interval
/// suppression); the station decides *where* (topic formatting) and
/// *whether* (connectivity gating).
pub trait FleetSink {
    /// A local reading cleared the publish interval for `attr`.
    fn publish_attribute(&mut self, address: &DeviceAddress, attr: AttributeId, value: f32);

    /// A device was auto-discovered and appended to the fleet.
    fn device_discovered(&mut self, address: &DeviceAddress, id: u32);
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// One tracked plant sensor.
pub struct Device {
    id: u32,
    address: DeviceAddress,
    name: String,
    attributes: [Attribute; AttributeId::COUNT],
    last_updated_ms: u64,
}

impl Device {
    pub fn new(address: DeviceAddress, id: u32, now_ms: u64) -> Self {
        Self {
            id,
            address,
            name: String::new(),
            attributes: [
                Attribute::new(AttributeId::Moisture.label()),
                Attribute::new(AttributeId::Temperature.label()),
                Attribute::new(AttributeId::Conductivity.label()),
                Attribute::new(AttributeId::Illuminance.label()),
                Attribute::new(AttributeId::Rssi.label()),
            ],
            last_updated_ms: now_ms,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// When any attribute of this device last changed.
    pub fn last_updated(&self) -> u64 {
        self.last_updated_ms
    }

    pub fn attribute(&self, id: AttributeId) -> &Attribute {
        &self.attributes[id as usize]
    }

    pub fn attribute_mut(&mut self, id: AttributeId) -> &mut Attribute {
        &mut self.attributes[id as usize]
    }

    /// Write an attribute and bump the device freshness stamp.
    fn set_attribute(&mut self, id: AttributeId, value: f32, source: UpdateSource, now_ms: u64) {
        self.attributes[id as usize].set(value, source, now_ms);
        self.last_updated_ms = now_ms;
    }

    /// Apply a decoded local radio reading.
    ///
    /// Every present field updates the matching attribute.  A field is
    /// additionally offered to the sink for publishing unless its
    /// previous update is younger than `min_interval_sec` — local
    /// state always wins; only uplink traffic is bounded.
    pub fn update_from_scan(
        &mut self,
        reading: &DecodedReading,
        now_ms: u64,
        min_interval_sec: u16,
        sink: &mut impl FleetSink,
    ) {
        let fields = [
            (AttributeId::Temperature, reading.temperature),
            (AttributeId::Conductivity, reading.conductivity),
            (AttributeId::Illuminance, reading.illuminance),
            (AttributeId::Moisture, reading.moisture),
        ];
        for (id, value) in fields {
            let Some(value) = value else { continue };
            if self.publish_due(id, now_ms, min_interval_sec) {
                sink.publish_attribute(&self.address, id, value);
            }
            info!(
                "From BLE {} {}->{:.1}",
                self.name,
                self.attributes[id as usize].label(),
                value
            );
            self.set_attribute(id, value, UpdateSource::LocalRadio, now_ms);
        }
    }

    /// Apply a signal-strength observation from the local radio.
    pub fn update_rssi(
        &mut self,
        rssi: i16,
        now_ms: u64,
        min_interval_sec: u16,
        sink: &mut impl FleetSink,
    ) {
        if self.publish_due(AttributeId::Rssi, now_ms, min_interval_sec) {
            sink.publish_attribute(&self.address, AttributeId::Rssi, f32::from(rssi));
        }
        self.set_attribute(AttributeId::Rssi, f32::from(rssi), UpdateSource::LocalRadio, now_ms);
    }

    /// Apply an attribute update relayed by another station.
    ///
    /// Rejected (returns false, attribute untouched) while a local
    /// radio update for the same attribute is younger than the 10 s
    /// settling window — a stale remote echo must not clobber a fresh
    /// direct observation.
    pub fn update_from_remote(&mut self, id: AttributeId, value: f32, now_ms: u64) -> bool {
        let attr = &self.attributes[id as usize];
        if attr.source() == UpdateSource::LocalRadio
            && now_ms.saturating_sub(attr.last_updated()) < ARBITRATION_WINDOW_MS
        {
            return false;
        }
        self.set_attribute(id, value, UpdateSource::RemoteNetwork, now_ms);
        true
    }

    /// Whether publishing `id` now would respect the minimum interval
    /// since its previous update.
    fn publish_due(&self, id: AttributeId, now_ms: u64, min_interval_sec: u16) -> bool {
        let last = self.attributes[id as usize].last_updated();
        now_ms.saturating_sub(last) >= u64::from(min_interval_sec) * 1000
    }
}

// ---------------------------------------------------------------------------
// Device seeds (static configuration)
// ---------------------------------------------------------------------------

/// Per-attribute bound pair from the device configuration file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedLimits {
    pub min: Option<f32>,
    pub max: Option<f32>,
}

/// One statically configured device.
#[derive(Debug, Clone)]
pub struct DeviceSeed {
    pub address: DeviceAddress,
    pub id: Option<u32>,
    pub name: String,
    pub limits: [SeedLimits; AttributeId::COUNT],
}

/// Read device seeds from a configuration source whose section names
/// are device addresses.
pub fn seeds_from_source(src: &impl ConfigSource) -> Vec<DeviceSeed> {
    let mut seeds = Vec::new();
    for section in src.sections() {
        let Ok(address) = section.parse::<DeviceAddress>() else {
            warn!("Device section '{section}' is not a radio address, skipped");
            continue;
        };
        let id = src.get(&section, "id").and_then(|v| v.parse().ok());
        let name = src.get(&section, "name").unwrap_or("unknown").to_string();

        let mut limits = [SeedLimits::default(); AttributeId::COUNT];
        for attr in AttributeId::ALL {
            let min_key = format!("min_{}", attr.config_name());
            let max_key = format!("max_{}", attr.config_name());
            limits[attr as usize] = SeedLimits {
                min: src.get(&section, &min_key).and_then(|v| v.parse().ok()),
                max: src.get(&section, &max_key).and_then(|v| v.parse().ok()),
            };
        }
        seeds.push(DeviceSeed {
            address,
            id,
            name,
            limits,
        });
    }
    seeds
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Ordered collection of devices; insertion order is discovery /
/// configuration order.  Address and id are unique; the index is only
/// a view.  Fleet sizes stay small (physical sensors), so every
/// lookup is a linear walk.
pub struct Fleet {
    devices: Vec<Device>,
    next_id: u32,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            next_id: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Append a device.  Rejects duplicate addresses and ids.
    pub fn add_device(&mut self, device: Device) -> bool {
        if self.find_by_address(device.address()).is_some() {
            warn!("Duplicate device address {} rejected", device.address());
            return false;
        }
        if self.find_by_id(device.id()).is_some() {
            warn!("Duplicate device id {} rejected", device.id());
            return false;
        }
        self.next_id = self.next_id.max(device.id() + 1);
        self.devices.push(device);
        true
    }

    pub fn find_by_address(&self, address: &DeviceAddress) -> Option<&Device> {
        self.devices.iter().find(|d| d.address() == address)
    }

    pub fn find_by_address_mut(&mut self, address: &DeviceAddress) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.address() == address)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn find_by_id(&self, id: u32) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn at_index(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    /// Seed statically configured devices at boot.
    pub fn load_seeds(&mut self, seeds: &[DeviceSeed], now_ms: u64) {
        for seed in seeds {
            let id = seed.id.unwrap_or(self.next_id);
            let mut device = Device::new(seed.address, id, now_ms);
            device.set_name(&seed.name);
            for attr in AttributeId::ALL {
                let lim = seed.limits[attr as usize];
                if let Some(min) = lim.min {
                    device.attribute_mut(attr).set_min(min);
                }
                if let Some(max) = lim.max {
                    device.attribute_mut(attr).set_max(max);
                }
            }
            info!("Device '{}' id:{} name:{}", seed.address, id, seed.name);
            self.add_device(device);
        }
    }

    /// Apply one decoded local reading, creating the device on first
    /// contact when auto-discovery is enabled.
    pub fn handle_reading(
        &mut self,
        address: DeviceAddress,
        reading: &DecodedReading,
        rssi: Option<i16>,
        config: &StationConfig,
        now_ms: u64,
        sink: &mut impl FleetSink,
    ) {
        if self.find_by_address(&address).is_none() {
            if !config.flora_discover_devices {
                info!("New flora device: {address} (ignored)");
                return;
            }
            let id = self.next_id;
            let mut device = Device::new(address, id, now_ms);
            device.set_name("Unknown");
            info!("New flora device: {address}");
            self.add_device(device);
            sink.device_discovered(&address, id);
        }

        let Some(device) = self.find_by_address_mut(&address) else {
            return;
        };
        device.update_from_scan(reading, now_ms, config.flora_publish_min_interval_sec, sink);
        if let Some(rssi) = rssi {
            device.update_rssi(rssi, now_ms, config.flora_publish_min_interval_sec, sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: RadioAddr = [0xc4, 0x7c, 0x8d, 0x66, 0xa1, 0xb2];

    fn addr() -> DeviceAddress {
        DeviceAddress::new(ADDR)
    }

    /// Sink that records publish offers and discoveries.
    struct RecordingSink {
        published: Vec<(DeviceAddress, AttributeId, f32)>,
        discovered: Vec<(DeviceAddress, u32)>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                published: Vec::new(),
                discovered: Vec::new(),
            }
        }
    }

    impl FleetSink for RecordingSink {
        fn publish_attribute(&mut self, address: &DeviceAddress, attr: AttributeId, value: f32) {
            self.published.push((*address, attr, value));
        }
        fn device_discovered(&mut self, address: &DeviceAddress, id: u32) {
            self.discovered.push((*address, id));
        }
    }

    fn reading_with_temp(t: f32) -> DecodedReading {
        DecodedReading {
            temperature: Some(t),
            ..DecodedReading::default()
        }
    }

    // ── Address ───────────────────────────────────────────────

    #[test]
    fn address_display_and_parse_roundtrip() {
        let a = addr();
        assert_eq!(a.to_string(), "c4:7c:8d:66:a1:b2");
        assert_eq!("c4:7c:8d:66:a1:b2".parse::<DeviceAddress>().unwrap(), a);
        assert_eq!("C4:7C:8D:66:A1:B2".parse::<DeviceAddress>().unwrap(), a);
        assert_eq!(a.compressed(), "c47c8d66a1b2");
    }

    #[test]
    fn bad_addresses_do_not_parse() {
        assert!("c4:7c:8d:66:a1".parse::<DeviceAddress>().is_err());
        assert!("c4:7c:8d:66:a1:b2:ff".parse::<DeviceAddress>().is_err());
        assert!("zz:7c:8d:66:a1:b2".parse::<DeviceAddress>().is_err());
        assert!("".parse::<DeviceAddress>().is_err());
    }

    // ── Attribute ─────────────────────────────────────────────

    #[test]
    fn set_then_get_returns_value() {
        let mut a = Attribute::new("Temp");
        assert!(!a.has_value());
        a.set(21.5, UpdateSource::LocalRadio, 100);
        assert!(a.has_value());
        assert_eq!(a.get(), 21.5);
        assert_eq!(a.source(), UpdateSource::LocalRadio);
        assert_eq!(a.last_updated(), 100);
    }

    #[test]
    fn get_or_uses_default_only_without_value() {
        let mut a = Attribute::new("Moist");
        assert_eq!(a.get_or(-1.0), -1.0);
        a.set(55.0, UpdateSource::RemoteNetwork, 5);
        assert_eq!(a.get_or(-1.0), 55.0);
    }

    #[test]
    fn reset_clears_value_and_source() {
        let mut a = Attribute::new("Cond");
        a.set(300.0, UpdateSource::LocalRadio, 10);
        a.reset(20);
        assert!(!a.has_value());
        assert_eq!(a.source(), UpdateSource::None);
    }

    #[test]
    fn in_limits_checks_only_present_bounds() {
        let mut a = Attribute::new("Moist");
        a.set(55.0, UpdateSource::LocalRadio, 0);
        assert!(a.in_limits()); // no bounds set

        a.set_max(50.0);
        assert!(!a.in_limits()); // above max
        a.set_max(60.0);
        assert!(a.in_limits());

        a.set_min(60.0);
        assert!(!a.in_limits()); // below min
        a.reset_limits();
        assert!(a.in_limits());
    }

    // ── Arbitration ───────────────────────────────────────────

    #[test]
    fn remote_within_window_of_local_is_rejected() {
        let mut d = Device::new(addr(), 0, 0);
        let mut sink = RecordingSink::new();
        d.update_from_scan(&reading_with_temp(21.0), 1_000, 10, &mut sink);

        // 9 s later: inside the settling window — rejected.
        assert!(!d.update_from_remote(AttributeId::Temperature, 30.0, 10_000));
        let attr = d.attribute(AttributeId::Temperature);
        assert_eq!(attr.get(), 21.0);
        assert_eq!(attr.source(), UpdateSource::LocalRadio);
        assert_eq!(attr.last_updated(), 1_000);
    }

    #[test]
    fn remote_after_window_is_applied() {
        let mut d = Device::new(addr(), 0, 0);
        let mut sink = RecordingSink::new();
        d.update_from_scan(&reading_with_temp(21.0), 1_000, 10, &mut sink);

        // Exactly 10 s after the local update — applied.
        assert!(d.update_from_remote(AttributeId::Temperature, 22.5, 11_000));
        let attr = d.attribute(AttributeId::Temperature);
        assert_eq!(attr.get(), 22.5);
        assert_eq!(attr.source(), UpdateSource::RemoteNetwork);
    }

    #[test]
    fn remote_over_remote_always_applies() {
        let mut d = Device::new(addr(), 0, 0);
        assert!(d.update_from_remote(AttributeId::Moisture, 40.0, 1_000));
        assert!(d.update_from_remote(AttributeId::Moisture, 41.0, 1_500));
        assert_eq!(d.attribute(AttributeId::Moisture).get(), 41.0);
    }

    #[test]
    fn local_always_overwrites_remote() {
        let mut d = Device::new(addr(), 0, 0);
        let mut sink = RecordingSink::new();
        assert!(d.update_from_remote(AttributeId::Temperature, 19.0, 500));
        d.update_from_scan(&reading_with_temp(23.0), 600, 10, &mut sink);
        let attr = d.attribute(AttributeId::Temperature);
        assert_eq!(attr.get(), 23.0);
        assert_eq!(attr.source(), UpdateSource::LocalRadio);
    }

    // ── Publish suppression ───────────────────────────────────

    #[test]
    fn publish_skipped_within_min_interval() {
        let mut d = Device::new(addr(), 0, 0);
        let mut sink = RecordingSink::new();

        d.update_from_scan(&reading_with_temp(21.0), 20_000, 10, &mut sink);
        assert_eq!(sink.published.len(), 1);

        // 5 s later: attribute updates, publish suppressed.
        d.update_from_scan(&reading_with_temp(21.3), 25_000, 10, &mut sink);
        assert_eq!(sink.published.len(), 1);
        assert_eq!(d.attribute(AttributeId::Temperature).get(), 21.3);

        // 10 s after the second update: published again.
        d.update_from_scan(&reading_with_temp(21.6), 35_000, 10, &mut sink);
        assert_eq!(sink.published.len(), 2);
        assert_eq!(sink.published[1].2, 21.6);
    }

    #[test]
    fn rssi_update_follows_same_gate() {
        let mut d = Device::new(addr(), 0, 0);
        let mut sink = RecordingSink::new();
        d.update_rssi(-67, 20_000, 10, &mut sink);
        d.update_rssi(-69, 25_000, 10, &mut sink);
        assert_eq!(sink.published.len(), 1);
        assert_eq!(d.attribute(AttributeId::Rssi).get(), -69.0);
    }

    // ── Fleet ─────────────────────────────────────────────────

    fn seed(section: &str, entries: Vec<(&'static str, &'static str)>) -> impl ConfigSource {
        struct Src(String, Vec<(&'static str, &'static str)>);
        impl ConfigSource for Src {
            fn get(&self, section: &str, key: &str) -> Option<&str> {
                if section != self.0 {
                    return None;
                }
                self.1.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
            }
            fn sections(&self) -> Vec<String> {
                vec![self.0.clone()]
            }
        }
        Src(section.to_string(), entries)
    }

    #[test]
    fn lookup_by_address_name_id_index() {
        let mut fleet = Fleet::new();
        let mut d = Device::new(addr(), 7, 0);
        d.set_name("basil");
        assert!(fleet.add_device(d));

        assert_eq!(fleet.find_by_address(&addr()).unwrap().id(), 7);
        assert_eq!(fleet.find_by_name("basil").unwrap().id(), 7);
        assert_eq!(fleet.find_by_id(7).unwrap().name(), "basil");
        assert_eq!(fleet.at_index(0).unwrap().id(), 7);

        let absent = DeviceAddress::new([0; 6]);
        assert!(fleet.find_by_address(&absent).is_none());
        assert!(fleet.find_by_name("ficus").is_none());
        assert!(fleet.find_by_id(8).is_none());
        assert!(fleet.at_index(1).is_none());
    }

    #[test]
    fn duplicate_address_and_id_rejected() {
        let mut fleet = Fleet::new();
        assert!(fleet.add_device(Device::new(addr(), 0, 0)));
        assert!(!fleet.add_device(Device::new(addr(), 1, 0)));
        let other = DeviceAddress::new([1; 6]);
        assert!(!fleet.add_device(Device::new(other, 0, 0)));
        assert_eq!(fleet.count(), 1);
    }

    #[test]
    fn discovery_creates_device_with_sequential_id() {
        let mut fleet = Fleet::new();
        let cfg = StationConfig::default();
        let mut sink = RecordingSink::new();

        fleet.handle_reading(addr(), &reading_with_temp(20.0), Some(-60), &cfg, 1_000, &mut sink);
        assert_eq!(fleet.count(), 1);
        let d = fleet.find_by_address(&addr()).unwrap();
        assert_eq!(d.id(), 0);
        assert_eq!(d.name(), "Unknown");
        assert_eq!(d.attribute(AttributeId::Temperature).get(), 20.0);
        assert_eq!(d.attribute(AttributeId::Rssi).get(), -60.0);
        assert_eq!(sink.discovered, vec![(addr(), 0)]);

        let second = DeviceAddress::new([0xaa; 6]);
        fleet.handle_reading(second, &reading_with_temp(18.0), None, &cfg, 2_000, &mut sink);
        assert_eq!(fleet.find_by_address(&second).unwrap().id(), 1);
    }

    #[test]
    fn discovery_disabled_drops_reading() {
        let mut fleet = Fleet::new();
        let mut cfg = StationConfig::default();
        cfg.flora_discover_devices = false;
        let mut sink = RecordingSink::new();

        fleet.handle_reading(addr(), &reading_with_temp(20.0), None, &cfg, 1_000, &mut sink);
        assert_eq!(fleet.count(), 0);
        assert!(sink.published.is_empty());
        assert!(sink.discovered.is_empty());
    }

    #[test]
    fn seeds_install_identity_and_limits() {
        let src = seed(
            "c4:7c:8d:66:a1:b2",
            vec![
                ("id", "3"),
                ("name", "monstera"),
                ("min_moisture", "20"),
                ("max_moisture", "65"),
                ("min_temperature", "5"),
                ("min_rssi", "-85"),
            ],
        );
        let seeds = seeds_from_source(&src);
        assert_eq!(seeds.len(), 1);

        let mut fleet = Fleet::new();
        fleet.load_seeds(&seeds, 0);
        let d = fleet.find_by_address(&addr()).unwrap();
        assert_eq!(d.id(), 3);
        assert_eq!(d.name(), "monstera");

        let mut moist = d.attribute(AttributeId::Moisture).clone();
        moist.set(70.0, UpdateSource::LocalRadio, 1);
        assert!(!moist.in_limits());
        moist.set(50.0, UpdateSource::LocalRadio, 2);
        assert!(moist.in_limits());
    }

    #[test]
    fn discovery_id_continues_after_seeds() {
        let src = seed("c4:7c:8d:66:a1:b2", vec![("id", "5"), ("name", "fern")]);
        let mut fleet = Fleet::new();
        fleet.load_seeds(&seeds_from_source(&src), 0);

        let cfg = StationConfig::default();
        let mut sink = RecordingSink::new();
        let new_addr = DeviceAddress::new([0xbb; 6]);
        fleet.handle_reading(new_addr, &reading_with_temp(19.0), None, &cfg, 100, &mut sink);
        assert_eq!(fleet.find_by_address(&new_addr).unwrap().id(), 6);
    }

    #[test]
    fn malformed_seed_sections_skipped() {
        let src = seed("not-an-address", vec![("name", "x")]);
        assert!(seeds_from_source(&src).is_empty());
    }
}
