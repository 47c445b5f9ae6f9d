//! Plant-sensor advertisement decoder.
//!
//! Parses the proprietary service-data payload broadcast by MiFlora
//! (HHCCJCY01) sensors into a [`DecodedReading`].  The parser is a pure
//! function over a byte slice — no I/O, no panics, no out-of-bounds
//! reads on any input.  The only mutable state is the per-device frame
//! counter used for duplicate suppression, owned by [`Decoder`].
//!
//! Payload layout:
//!
//! ```text
//! byte 0      flag bits: 0x40 has-data, 0x20 capability, 0x08 encrypted
//! byte 2..=3  device-family signature (0x98 0x00 = HHCCJCY01)
//! byte 4      frame counter (increments per advertisement)
//! byte 11/12  record stream; offset 12 when the capability bit is set
//! ```
//!
//! Records are TLV: `[type][fixed 0x10|0x00][len][value; len]`.

use crate::error::DecodeError;
use log::{debug, warn};

/// 6-byte radio address in wire order.
pub type RadioAddr = [u8; 6];

/// 128-bit service-data UUID advertised by the MiFlora family
/// (`0000fe95-0000-1000-8000-00805f9b34fb`).
pub const SERVICE_UUID: u128 = 0x0000fe95_0000_1000_8000_00805f9b34fb;

const FLAG_ENCRYPTED: u8 = 0x08;
const FLAG_CAPABILITY: u8 = 0x20;
const FLAG_HAS_DATA: u8 = 0x40;

const SIGNATURE: [u8; 2] = [0x98, 0x00];

/// Structured readings extracted from one advertisement.
///
/// Sparse: every field is optional, set only when the corresponding
/// record was present and well-formed.  Immutable once produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodedReading {
    /// °C, 0.1 precision.
    pub temperature: Option<f32>,
    /// Relative humidity, %.
    pub humidity: Option<f32>,
    /// Soil moisture, %.
    pub moisture: Option<f32>,
    /// Electrical conductivity, µS/cm.
    pub conductivity: Option<f32>,
    /// Illuminance, lux.
    pub illuminance: Option<f32>,
    /// Battery level, %.
    pub battery: Option<f32>,
    /// Formaldehyde, mg/m³.
    pub formaldehyde: Option<f32>,
    /// Consumable tablet level, %.
    pub tablet: Option<f32>,
    /// Hours since last motion.
    pub idle_hours: Option<f32>,
    /// Motion presence, when any motion-bearing record appeared.
    pub motion: Option<bool>,
    /// On/off state.
    pub is_active: Option<bool>,
    /// Illuminance of exactly 100 lx encodes "light present".
    pub is_light: bool,
    /// Frame counter from the advertisement header.
    pub frame_counter: u8,
}

// ---------------------------------------------------------------------------
// Pure parser
// ---------------------------------------------------------------------------

/// Parse one advertisement's service data.  Duplicate suppression is
/// not applied here — see [`Decoder::decode`].
pub fn parse_service_data(msg: &[u8]) -> Result<DecodedReading, DecodeError> {
    if msg.len() < 5 {
        return Err(DecodeError::Truncated);
    }

    let flags = msg[0];
    if flags & FLAG_ENCRYPTED != 0 {
        return Err(DecodeError::EncryptedPayload);
    }
    if flags & FLAG_HAS_DATA == 0 {
        return Err(DecodeError::NoData);
    }

    if msg[2] != SIGNATURE[0] || msg[3] != SIGNATURE[1] {
        return Err(DecodeError::UnknownDevice);
    }

    let offset = if flags & FLAG_CAPABILITY != 0 { 12 } else { 11 };
    let body = match msg.get(offset..) {
        Some(b) if b.len() >= 4 => b,
        _ => return Err(DecodeError::Truncated),
    };

    let mut out = DecodedReading {
        frame_counter: msg[4],
        ..DecodedReading::default()
    };
    let mut rest = body;
    let mut any = false;

    while rest.len() > 3 {
        // A corrupt fixed byte or length means the rest of the body is
        // not record-shaped; keep whatever decoded so far.
        if rest[1] != 0x10 && rest[1] != 0x00 {
            warn!("fixed byte 0x{:02x} unexpected, stop parsing residual data", rest[1]);
            break;
        }
        let len = rest[2] as usize;
        if !(1..=4).contains(&len) || rest.len() < 3 + len {
            warn!("record value has wrong size: {len}");
            break;
        }

        if parse_record(rest[0], &rest[3..3 + len], &mut out) {
            any = true;
        }
        rest = &rest[3 + len..];
    }

    if any {
        Ok(out)
    } else {
        Err(DecodeError::NoKnownFields)
    }
}

/// Interpret a single record.  Returns `false` for unknown type codes
/// or type/length mismatches, which are skipped without error.
fn parse_record(ty: u8, v: &[u8], out: &mut DecodedReading) -> bool {
    match (ty, v.len()) {
        // motion detection, 1 byte bool
        (0x03, 1) => out.motion = Some(v[0] != 0),
        // temperature, 16-bit signed LE, 0.1 °C
        (0x04, 2) => out.temperature = Some(i16::from_le_bytes([v[0], v[1]]) as f32 / 10.0),
        // humidity, 16-bit signed LE, 0.1 %
        (0x06, 2) => out.humidity = Some(i16::from_le_bytes([v[0], v[1]]) as f32 / 10.0),
        // illuminance (0x0F additionally implies motion), 24-bit LE, 1 lx
        (0x07 | 0x0F, 3) => {
            let lux = u32::from(v[0]) | u32::from(v[1]) << 8 | u32::from(v[2]) << 16;
            out.illuminance = Some(lux as f32);
            out.is_light = lux == 100;
            if ty == 0x0F {
                out.motion = Some(true);
            }
        }
        // soil moisture, 8-bit, 1 %
        (0x08, 1) => out.moisture = Some(f32::from(v[0])),
        // conductivity, 16-bit unsigned LE, 1 µS/cm
        (0x09, 2) => out.conductivity = Some(f32::from(u16::from_le_bytes([v[0], v[1]]))),
        // battery, 8-bit, 1 %
        (0x0A, 1) => out.battery = Some(f32::from(v[0])),
        // combined temperature + humidity, two 16-bit signed LE
        (0x0D, 4) => {
            out.temperature = Some(i16::from_le_bytes([v[0], v[1]]) as f32 / 10.0);
            out.humidity = Some(i16::from_le_bytes([v[2], v[3]]) as f32 / 10.0);
        }
        // formaldehyde, 16-bit unsigned LE, 0.01 mg/m³
        (0x10, 2) => out.formaldehyde = Some(f32::from(u16::from_le_bytes([v[0], v[1]])) / 100.0),
        // on/off state, 1 byte bool
        (0x12, 1) => out.is_active = Some(v[0] != 0),
        // consumable tablet, 8-bit, 1 %
        (0x13, 1) => out.tablet = Some(f32::from(v[0])),
        // idle time since last motion, 32-bit unsigned LE, minutes;
        // zero minutes means motion is present right now
        (0x17, 4) => {
            let idle_min = u32::from_le_bytes([v[0], v[1], v[2], v[3]]);
            out.idle_hours = Some(idle_min as f32 / 60.0);
            out.motion = Some(idle_min == 0);
        }
        _ => return false,
    }
    true
}

// ---------------------------------------------------------------------------
// Decoder with duplicate suppression
// ---------------------------------------------------------------------------

/// Maximum number of devices the duplicate filter tracks.
const DEDUP_CAPACITY: usize = 32;

/// Stateful decoder front end: pure parse plus per-device duplicate
/// suppression.
///
/// The frame counter is keyed by device address.  (A single shared
/// counter would let one device's frames suppress another's whenever
/// the counters coincide.)
pub struct Decoder {
    last_frame: heapless::FnvIndexMap<RadioAddr, u8, DEDUP_CAPACITY>,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            last_frame: heapless::FnvIndexMap::new(),
        }
    }

    /// Decode one advertisement from `addr`.
    ///
    /// Rejects with [`DecodeError::DuplicateFrame`] when the frame
    /// counter equals the one from the previous frame of the same
    /// device that passed the header checks.
    pub fn decode(&mut self, addr: RadioAddr, msg: &[u8]) -> Result<DecodedReading, DecodeError> {
        if msg.len() < 5 {
            return Err(DecodeError::Truncated);
        }
        if msg[0] & FLAG_ENCRYPTED != 0 {
            return Err(DecodeError::EncryptedPayload);
        }
        if msg[0] & FLAG_HAS_DATA == 0 {
            return Err(DecodeError::NoData);
        }

        let frame = msg[4];
        if self.last_frame.get(&addr) == Some(&frame) {
            debug!("duplicate data packet received (frame: {frame})");
            return Err(DecodeError::DuplicateFrame);
        }
        // Track the counter even if the signature or record walk fails
        // below, matching the sensor's retransmission behaviour.
        if self.last_frame.insert(addr, frame).is_err() {
            // Filter full: frames from untracked devices are never
            // deduplicated.  Fleet sizes stay far below the capacity.
            warn!("duplicate filter full ({DEDUP_CAPACITY} devices)");
        }

        parse_service_data(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: RadioAddr = [0xc4, 0x7c, 0x8d, 0x66, 0xa1, 0xb2];

    /// Build a valid advertisement frame: header with given flags and
    /// frame counter, HHCCJCY01 signature, body records appended at
    /// offset 11 (or 12 with the capability flag).
    fn frame(flags: u8, counter: u8, body: &[u8]) -> Vec<u8> {
        let offset = if flags & FLAG_CAPABILITY != 0 { 12 } else { 11 };
        let mut msg = vec![0u8; offset];
        msg[0] = flags;
        msg[2] = 0x98;
        msg[3] = 0x00;
        msg[4] = counter;
        msg.extend_from_slice(body);
        msg
    }

    #[test]
    fn temperature_record_decodes() {
        let msg = frame(0x40, 1, &[0x04, 0x10, 0x02, 0xD2, 0x00]);
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.temperature, Some(21.0));
        assert_eq!(r.frame_counter, 1);
    }

    #[test]
    fn short_inputs_always_rejected() {
        for len in 0..11 {
            let msg = vec![0x40u8; len];
            assert!(parse_service_data(&msg).is_err(), "len {len} must reject");
        }
    }

    #[test]
    fn encrypted_payload_rejected() {
        let msg = frame(0x40 | 0x08, 1, &[0x08, 0x10, 0x01, 0x35]);
        assert_eq!(parse_service_data(&msg), Err(DecodeError::EncryptedPayload));
    }

    #[test]
    fn missing_data_flag_rejected() {
        let msg = frame(0x20, 1, &[0x08, 0x10, 0x01, 0x35]);
        assert_eq!(parse_service_data(&msg), Err(DecodeError::NoData));
    }

    #[test]
    fn wrong_signature_rejected() {
        let mut msg = frame(0x40, 1, &[0x08, 0x10, 0x01, 0x35]);
        msg[2] = 0x5d;
        assert_eq!(parse_service_data(&msg), Err(DecodeError::UnknownDevice));
    }

    #[test]
    fn capability_flag_shifts_body_offset() {
        let msg = frame(0x40 | 0x20, 1, &[0x08, 0x10, 0x01, 0x2A]);
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.moisture, Some(42.0));
    }

    #[test]
    fn moisture_conductivity_illuminance() {
        let msg = frame(
            0x40,
            7,
            &[
                0x08, 0x10, 0x01, 0x37, // moisture 55 %
                0x09, 0x10, 0x02, 0xA2, 0x01, // conductivity 418 µS/cm
                0x07, 0x10, 0x03, 0x64, 0x00, 0x00, // illuminance 100 lx
            ],
        );
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.moisture, Some(55.0));
        assert_eq!(r.conductivity, Some(418.0));
        assert_eq!(r.illuminance, Some(100.0));
        assert!(r.is_light);
    }

    #[test]
    fn negative_temperature() {
        // -5.2 °C = -52 = 0xFFCC little-endian
        let msg = frame(0x40, 2, &[0x04, 0x10, 0x02, 0xCC, 0xFF]);
        let r = parse_service_data(&msg).unwrap();
        assert!((r.temperature.unwrap() + 5.2).abs() < 1e-6);
    }

    #[test]
    fn combined_temperature_humidity() {
        let msg = frame(0x40, 3, &[0x0D, 0x10, 0x04, 0xD2, 0x00, 0x58, 0x02]);
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.temperature, Some(21.0));
        assert_eq!(r.humidity, Some(60.0));
    }

    #[test]
    fn bad_fixed_byte_keeps_earlier_fields() {
        let msg = frame(
            0x40,
            4,
            &[
                0x08, 0x10, 0x01, 0x28, // moisture 40 % — valid
                0x09, 0x77, 0x02, 0x00, 0x00, // fixed byte corrupt — halts
            ],
        );
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.moisture, Some(40.0));
        assert_eq!(r.conductivity, None);
    }

    #[test]
    fn oversized_length_halts_parse() {
        let msg = frame(0x40, 5, &[0x08, 0x10, 0x09, 0x28]);
        assert_eq!(parse_service_data(&msg), Err(DecodeError::NoKnownFields));
    }

    #[test]
    fn unknown_type_skipped() {
        let msg = frame(
            0x40,
            6,
            &[
                0x5A, 0x10, 0x01, 0xFF, // unknown type — skipped
                0x08, 0x10, 0x01, 0x14, // moisture 20 %
            ],
        );
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.moisture, Some(20.0));
    }

    #[test]
    fn only_unknown_types_is_rejection() {
        let msg = frame(0x40, 8, &[0x5A, 0x10, 0x01, 0xFF]);
        assert_eq!(parse_service_data(&msg), Err(DecodeError::NoKnownFields));
    }

    #[test]
    fn idle_time_zero_means_motion() {
        let msg = frame(0x40, 9, &[0x17, 0x10, 0x04, 0x00, 0x00, 0x00, 0x00]);
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.motion, Some(true));
        assert_eq!(r.idle_hours, Some(0.0));
    }

    #[test]
    fn idle_time_nonzero_means_no_motion() {
        // 120 minutes idle
        let msg = frame(0x40, 10, &[0x17, 0x10, 0x04, 0x78, 0x00, 0x00, 0x00]);
        let r = parse_service_data(&msg).unwrap();
        assert_eq!(r.motion, Some(false));
        assert_eq!(r.idle_hours, Some(2.0));
    }

    // ── Duplicate suppression ─────────────────────────────────

    #[test]
    fn same_frame_twice_is_duplicate() {
        let mut dec = Decoder::new();
        let msg = frame(0x40, 42, &[0x08, 0x10, 0x01, 0x37]);
        assert!(dec.decode(ADDR, &msg).is_ok());
        assert_eq!(dec.decode(ADDR, &msg), Err(DecodeError::DuplicateFrame));
    }

    #[test]
    fn new_counter_accepted_after_duplicate() {
        let mut dec = Decoder::new();
        let a = frame(0x40, 1, &[0x08, 0x10, 0x01, 0x37]);
        let b = frame(0x40, 2, &[0x08, 0x10, 0x01, 0x38]);
        assert!(dec.decode(ADDR, &a).is_ok());
        assert!(dec.decode(ADDR, &a).is_err());
        assert!(dec.decode(ADDR, &b).is_ok());
    }

    #[test]
    fn counters_are_tracked_per_device() {
        let mut dec = Decoder::new();
        let other: RadioAddr = [0xc4, 0x7c, 0x8d, 0x00, 0x00, 0x01];
        let msg = frame(0x40, 7, &[0x08, 0x10, 0x01, 0x37]);
        assert!(dec.decode(ADDR, &msg).is_ok());
        // Same counter from a different device is not a duplicate.
        assert!(dec.decode(other, &msg).is_ok());
    }

    #[test]
    fn counter_tracked_even_when_body_fails() {
        let mut dec = Decoder::new();
        // Valid header, unknown signature — parse fails but the frame
        // counter is recorded.
        let mut bad = frame(0x40, 9, &[0x08, 0x10, 0x01, 0x37]);
        bad[2] = 0x11;
        assert_eq!(dec.decode(ADDR, &bad), Err(DecodeError::UnknownDevice));
        assert_eq!(dec.decode(ADDR, &bad), Err(DecodeError::DuplicateFrame));
    }
}
