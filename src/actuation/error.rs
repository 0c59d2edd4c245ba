use thiserror::Error;

/// Failures of the RF actuation path. Logged where they happen, never retried.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("Unknown socket id {0}")]
    UnknownSocket(u8),

    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("Transmitter unavailable: {0}")]
    TransmitterUnavailable(String),
}
