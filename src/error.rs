//! Error types for every failure domain of the display.
//!
//! Recoverable kinds ([`FetchError`], [`TransportError`]) are handled inside
//! their loops; [`InitError`] and [`CompositorError`] end the process after
//! the display close sequence has run.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single position fetch failed. Never fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("no position endpoints configured")]
    NoEndpoints,

    #[error("all {0} endpoints failed")]
    AllFailed(usize),
}

/// The display channel rejected an operation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("SPI bus error: {0}")]
    Bus(String),

    #[error("GPIO error on {pin}: {message}")]
    Pin { pin: &'static str, message: String },

    #[error("frame write took {elapsed:?}, limit {limit:?}")]
    Timeout { elapsed: Duration, limit: Duration },

    #[error("buffer is {actual} bytes, expected {expected}")]
    BufferSize { actual: usize, expected: usize },

    #[error("preview image could not be saved to {path}: {message}")]
    Preview { path: PathBuf, message: String },

    #[error("transport is closed")]
    Closed,
}

/// Startup could not complete.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("frame cache {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("frame cache manifest {path} is invalid: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("frame set is unusable: {0}")]
    Frames(String),

    #[error("display device could not be opened: {0}")]
    Device(String),

    #[error("display initialization failed: {0}")]
    DeviceInit(#[from] TransportError),

    #[error("fetch thread could not be started: {0}")]
    Thread(#[source] io::Error),
}

/// Settings could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// The render loop had to stop.
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("{count} consecutive transport errors, last: {last}")]
    TooManyTransportErrors { count: u32, last: TransportError },

    #[error(transparent)]
    Init(#[from] InitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = FetchError::Status { url: "http://x".into(), status: 503 };
        assert_eq!(err.to_string(), "http://x returned HTTP 503");

        let err = CompositorError::TooManyTransportErrors { count: 20, last: TransportError::Closed };
        assert_eq!(err.to_string(), "20 consecutive transport errors, last: transport is closed");
    }

    #[test]
    fn test_transport_error_converts_to_init() {
        let err: InitError = TransportError::Bus("nack".into()).into();
        assert!(matches!(err, InitError::DeviceInit(TransportError::Bus(_))));
    }
}
