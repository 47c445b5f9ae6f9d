//! Radio scan pipeline.
//!
//! Two concurrent activities share one bounded queue:
//!
//! ```text
//! ┌─────────────┐   filter by    ┌──────────────┐   drain    ┌──────────┐
//! │ scanner task│──service UUID──▶ bounded queue │───swap────▶ ingester │
//! │ (own thread)│                │ (mutex, FIFO) │            │ (coop)   │
//! └─────────────┘                └──────────────┘            └──────────┘
//! ```
//!
//! The scanner is the only activity allowed to block: it drives the
//! radio in a scan/cooldown cycle and filters advertisements down to
//! plant-sensor service data before they reach the queue.  The
//! ingester runs on the cooperative scheduler and drains the queue by
//! swapping its contents out under the lock, so decode work never
//! blocks the radio producer.

use crate::decoder::SERVICE_UUID;
use crate::error::ScanError;
use crate::fleet::DeviceAddress;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{info, warn};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Queue capacity.  When full, the oldest entry is evicted so a
/// stalled ingester cannot grow memory without bound.
pub const SCAN_QUEUE_CAPACITY: usize = 20;

/// Upper bound on one advertisement's service-data payload.
pub const MAX_SERVICE_DATA: usize = 32;

/// Service-data payload bytes.
pub type Payload = heapless::Vec<u8, MAX_SERVICE_DATA>;

// ---------------------------------------------------------------------------
// Radio observations
// ---------------------------------------------------------------------------

/// One service-data block inside an advertisement.
#[derive(Debug, Clone)]
pub struct ServiceData {
    pub uuid: u128,
    pub data: Payload,
}

/// A raw advertisement as delivered by the radio.  Ephemeral: created
/// per radio event and consumed by the scanner's filter.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub address: DeviceAddress,
    /// Signal strength in dBm, when the radio reported one.
    pub rssi: Option<i16>,
    pub service_data: heapless::Vec<ServiceData, 4>,
}

/// A queued plant-sensor observation (post-filter).
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub address: DeviceAddress,
    pub rssi: Option<i16>,
    pub payload: Payload,
}

// ---------------------------------------------------------------------------
// Radio port
// ---------------------------------------------------------------------------

/// The radio primitive the scanner drives.
///
/// `scan_window` blocks for up to `duration_secs`, delivering every
/// observed advertisement to `emit`.  Implementations must honour
/// `abort` promptly (it is set by [`ScanPipeline::stop_scan`]).
pub trait RadioPort: Send + 'static {
    fn scan_window(
        &mut self,
        duration_secs: u32,
        abort: &AtomicBool,
        emit: &mut dyn FnMut(Advertisement),
    ) -> Result<(), ScanError>;
}

/// Scan cycle timing, copied out of the station config at start.
#[derive(Debug, Clone, Copy)]
pub struct ScanTiming {
    pub scan_duration_sec: u32,
    pub scan_wait_sec: u32,
}

impl ScanTiming {
    pub fn from_config(cfg: &crate::config::StationConfig) -> Self {
        Self {
            scan_duration_sec: cfg.ble_scan_duration_sec,
            scan_wait_sec: cfg.ble_scan_wait_sec,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

type Queue = heapless::Deque<ScanRecord, SCAN_QUEUE_CAPACITY>;

struct Shared {
    queue: Mutex<Queue>,
    /// Scanner keeps cycling while set.
    enabled: AtomicBool,
    /// Scanner task is alive (set by the task itself).
    task_running: AtomicBool,
    /// A scan window is in progress right now.
    scanning_now: AtomicBool,
    /// Ends the in-progress radio window early.
    abort: AtomicBool,
}

fn enqueue(shared: &Shared, record: ScanRecord) {
    let Ok(mut queue) = shared.queue.lock() else {
        return;
    };
    if queue.is_full() {
        warn!("max queue size reached for scanned data (is ingester stalled?)");
        let _ = queue.pop_front();
    }
    let _ = queue.push_back(record);
}

/// Keep only advertisements carrying exactly one service-data block
/// with the plant-sensor UUID.
fn plant_sensor_payload(adv: &Advertisement) -> Option<Payload> {
    if adv.service_data.len() != 1 {
        return None;
    }
    let block = &adv.service_data[0];
    if block.uuid != SERVICE_UUID {
        return None;
    }
    Some(block.data.clone())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Owns the scanner task and the bounded queue.
pub struct ScanPipeline {
    shared: Arc<Shared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ScanPipeline {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::new()),
                enabled: AtomicBool::new(false),
                task_running: AtomicBool::new(false),
                scanning_now: AtomicBool::new(false),
                abort: AtomicBool::new(false),
            }),
            handle: None,
        }
    }

    /// Spawn the scanner task.
    ///
    /// Fails when scanning is already enabled, or when the previous
    /// task has been signalled to stop but has not exited yet.
    pub fn start_scan<R: RadioPort>(
        &mut self,
        radio: R,
        timing: ScanTiming,
    ) -> Result<(), ScanError> {
        if self.shared.enabled.load(Ordering::Acquire) {
            return Err(ScanError::AlreadyRunning);
        }
        if self.shared.task_running.load(Ordering::Acquire) {
            return Err(ScanError::StillStopping);
        }

        self.shared.abort.store(false, Ordering::Release);
        self.shared.enabled.store(true, Ordering::Release);
        self.shared.task_running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("ble-scan".into())
            .spawn(move || scanner_loop(radio, &shared, timing))
        {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(_) => {
                self.shared.enabled.store(false, Ordering::Release);
                self.shared.task_running.store(false, Ordering::Release);
                Err(ScanError::SpawnFailed)
            }
        }
    }

    /// Signal the scanner to exit after the current cycle and end the
    /// in-progress radio window immediately.  Idempotent: returns
    /// `NotRunning` when scanning is already disabled.
    pub fn stop_scan(&mut self) -> Result<(), ScanError> {
        if !self.shared.enabled.load(Ordering::Acquire) {
            return Err(ScanError::NotRunning);
        }
        self.shared.enabled.store(false, Ordering::Release);
        self.shared.abort.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    pub fn is_task_running(&self) -> bool {
        self.shared.task_running.load(Ordering::Acquire)
    }

    pub fn is_scanning_now(&self) -> bool {
        self.shared.scanning_now.load(Ordering::Acquire)
    }

    /// Number of queued records (snapshot).
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Atomically take everything queued, releasing the lock before
    /// `handle` runs.
    pub fn drain(&self, mut handle: impl FnMut(ScanRecord)) {
        let mut drained = {
            let Ok(mut queue) = self.shared.queue.lock() else {
                return;
            };
            core::mem::take(&mut *queue)
        };
        while let Some(record) = drained.pop_front() {
            handle(record);
        }
    }

    /// Block until the scanner task has exited, up to `timeout_ms`.
    /// Stop is cooperative — callers must allow up to one full
    /// scan+cooldown cycle.
    pub fn wait_idle(&mut self, timeout_ms: u64) -> bool {
        let mut waited = 0u64;
        while self.shared.task_running.load(Ordering::Acquire) {
            if waited >= timeout_ms {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
            waited += 10;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        true
    }
}

/// Scanner task body: scan window → cooldown → repeat while enabled.
fn scanner_loop<R: RadioPort>(mut radio: R, shared: &Shared, timing: ScanTiming) {
    info!("scan task started");

    while shared.enabled.load(Ordering::Acquire) {
        info!("Scanning for {} seconds...", timing.scan_duration_sec);
        shared.scanning_now.store(true, Ordering::Release);

        let result = radio.scan_window(timing.scan_duration_sec, &shared.abort, &mut |adv| {
            if let Some(payload) = plant_sensor_payload(&adv) {
                enqueue(
                    shared,
                    ScanRecord {
                        address: adv.address,
                        rssi: adv.rssi,
                        payload,
                    },
                );
            }
        });
        if let Err(e) = result {
            // No retry at this layer; the caller recovers via
            // stop_scan/start_scan.
            warn!("scan window failed: {e}");
        }

        shared.scanning_now.store(false, Ordering::Release);
        info!("Scan complete!");

        // Cooldown between scans, sliced so stop_scan takes effect
        // within ~100 ms.
        let mut waits = timing.scan_wait_sec.saturating_mul(10);
        while shared.enabled.load(Ordering::Acquire) && waits > 0 {
            thread::sleep(Duration::from_millis(100));
            waits -= 1;
        }
    }

    // Release buffered memory before exiting.
    if let Ok(mut queue) = shared.queue.lock() {
        queue.clear();
    }
    info!("scan task stopped");
    shared.task_running.store(false, Ordering::Release);
}
