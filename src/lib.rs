//! FloraHub firmware library.
//!
//! Gateway station core for MiFlora plant sensors: BLE advertisement
//! ingestion, payload decoding, an arbitrated device/fleet model
//! synchronized across stations over MQTT, and the connectivity state
//! machine that keeps the uplink alive.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within the adapter modules.

#![deny(unused_must_use)]

pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod fleet;
pub mod net;
pub mod pipeline;
pub mod station;
pub mod tasks;

pub mod adapters;
