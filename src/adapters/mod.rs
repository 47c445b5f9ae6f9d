//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter     | Implements | Connects to                     |
//! |-------------|------------|---------------------------------|
//! | `ble`       | RadioPort  | BLE scanner (Bluedroid / sim)   |
//! | `wifi`      | LinkPort   | ESP-IDF WiFi STA / sim          |
//! | `mqtt`      | BrokerPort | ESP-IDF MQTT client / sim       |
//! | `system`    | SystemPort | esp_restart / sim               |
//! | `device_id` | —          | factory MAC identity            |
//!
//! Every adapter is cfg-gated: `target_os = "espidf"` selects the real
//! hardware path, everything else a deterministic simulation for
//! host-side tests.

pub mod ble;
pub mod device_id;
pub mod mqtt;
pub mod system;
pub mod wifi;
