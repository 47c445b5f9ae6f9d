//! Unified error types for the FloraHub firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! the station loop's error handling uniform.  All variants are `Copy`
//! so they can be passed through the ingest and connectivity paths
//! without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An advertisement payload could not be decoded.
    Decode(DecodeError),
    /// The radio scan pipeline refused an operation.
    Scan(ScanError),
    /// A communication subsystem failed.
    Comms(CommsError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// Subsystem initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Scan(e) => write!(f, "scan: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder errors
// ---------------------------------------------------------------------------

/// Rejection reasons from the advertisement decoder.
///
/// These are expected noise in normal operation (nearby non-target
/// radios, retransmitted frames) and are absorbed at the ingest
/// boundary — logged, never escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is shorter than the fixed header + one record.
    Truncated,
    /// Header flags an encrypted payload; we cannot read it.
    EncryptedPayload,
    /// Header lacks the "has data" flag.
    NoData,
    /// Frame counter matches the previous accepted frame from the
    /// same device (BLE advertisement retransmission).
    DuplicateFrame,
    /// Device-family signature bytes do not match a plant sensor.
    UnknownDevice,
    /// The record walk produced no interpretable field.
    NoKnownFields,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "payload truncated"),
            Self::EncryptedPayload => write!(f, "payload is encrypted"),
            Self::NoData => write!(f, "no DATA flag in header"),
            Self::DuplicateFrame => write!(f, "duplicate frame"),
            Self::UnknownDevice => write!(f, "not a plant-sensor device"),
            Self::NoKnownFields => write!(f, "no known fields decoded"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Scan pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// `start_scan` while the scanner is already enabled.
    AlreadyRunning,
    /// `start_scan` while the previous scanner task is still winding down.
    StillStopping,
    /// `stop_scan` while the scanner is not enabled.
    NotRunning,
    /// The scanner task could not be spawned.
    SpawnFailed,
    /// The radio failed to start or run a scan window.
    RadioFailed,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "scan already running"),
            Self::StillStopping => write!(f, "previous scan still stopping"),
            Self::NotRunning => write!(f, "scan not running"),
            Self::SpawnFailed => write!(f, "scanner task spawn failed"),
            Self::RadioFailed => write!(f, "radio start failed"),
        }
    }
}

impl From<ScanError> for Error {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    LinkConnectFailed,
    LinkDown,
    BrokerConnectFailed,
    BrokerDown,
    PublishFailed,
    SubscribeFailed,
    /// `subscribe` with a topic that already has a handler.
    DuplicateSubscription,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkConnectFailed => write!(f, "link connect failed"),
            Self::LinkDown => write!(f, "link is down"),
            Self::BrokerConnectFailed => write!(f, "broker connect failed"),
            Self::BrokerDown => write!(f, "broker is down"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::DuplicateSubscription => write!(f, "topic already subscribed"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
