//! Station identity derived from the factory MAC address.
//!
//! Produces a stable, human-readable station ID in the form
//! `FH-XXYYZZ` (last 3 bytes of the 6-byte MAC in uppercase hex),
//! deterministic across reboots.  The lowercase hostname form is used
//! for mDNS and as the default MQTT client-id suffix.

/// Fixed-size station ID string.
pub type StationIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the short station ID from the last 3 MAC bytes.
pub fn station_id(mac: &MacAddress) -> StationIdString {
    let mut id = StationIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "FH-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// Derive the mDNS hostname from the last 3 MAC bytes.
pub fn hostname(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::<24>::new();
    use core::fmt::Write;
    let _ = write!(name, "florahub-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}
