//! System control adapter: the hard-reset escape hatch.

use crate::net::SystemPort;
use log::error;

pub struct SystemAdapter;

impl SystemAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SystemPort for SystemAdapter {
    #[cfg(target_os = "espidf")]
    fn hard_reset(&mut self) {
        error!("Hard reset requested — restarting core");
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn hard_reset(&mut self) {
        error!("Hard reset requested (sim: ignored)");
    }
}
