//! 433 MHz socket control
//!
//! The sockets understand the common "protocol 1" encoding: every bit is a
//! high/low pulse pair in units of the base pulse length, followed by a
//! sync pair after the code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::error::ActuationError;
use super::SocketCommandIntent;
use crate::config::{RfConfig, SocketConfig};
use crate::decode::SocketAction;

/// (high, low) pulse counts
const SYNC: (u32, u32) = (1, 31);
const ZERO: (u32, u32) = (1, 3);
const ONE: (u32, u32) = (3, 1);

/// The three operations the hub needs from the radio side
pub trait RfController: Send + Sync {
    fn turn_on(&self, socket_id: u8) -> Result<(), ActuationError>;
    fn turn_off(&self, socket_id: u8) -> Result<(), ActuationError>;
    fn send_raw_code(&self, code: u64) -> Result<(), ActuationError>;
}

/// Emits one code on the air. Calls block until the code is sent.
pub trait Transmitter: Send {
    fn transmit(&mut self, code: u64) -> Result<(), ActuationError>;
}

pub struct GpioTransmitter {
    pin: OutputPin,
    pulse: Duration,
    repeat: u32,
    code_length: u32,
}

impl GpioTransmitter {
    pub fn open(config: &RfConfig) -> Result<Self, ActuationError> {
        let pin = Gpio::new()?.get(config.gpio_pin)?.into_output_low();
        info!(
            "RF transmitter on GPIO {} ({} us pulse, {} repeats)",
            config.gpio_pin, config.pulse_length_us, config.tx_repeat
        );
        Ok(Self {
            pin,
            pulse: Duration::from_micros(config.pulse_length_us),
            repeat: config.tx_repeat,
            code_length: config.code_length,
        })
    }

    fn pulse_pair(&mut self, (high, low): (u32, u32)) {
        self.pin.set_high();
        thread::sleep(self.pulse * high);
        self.pin.set_low();
        thread::sleep(self.pulse * low);
    }
}

impl Transmitter for GpioTransmitter {
    fn transmit(&mut self, code: u64) -> Result<(), ActuationError> {
        for _ in 0..self.repeat {
            for bit in (0..self.code_length).rev() {
                if code.checked_shr(bit).unwrap_or(0) & 1 == 1 {
                    self.pulse_pair(ONE);
                } else {
                    self.pulse_pair(ZERO);
                }
            }
            self.pulse_pair(SYNC);
        }
        self.pin.set_low();
        Ok(())
    }
}

/// Logs codes instead of sending them
#[derive(Debug, Default)]
pub struct DryRunTransmitter;

impl Transmitter for DryRunTransmitter {
    fn transmit(&mut self, code: u64) -> Result<(), ActuationError> {
        info!("[dry-run] would transmit RF code {}", code);
        Ok(())
    }
}

/// Maps socket ids to their codes and serialises access to the transmitter
pub struct SocketController {
    codes: HashMap<u8, (u64, u64)>,
    transmitter: Mutex<Box<dyn Transmitter>>,
}

impl SocketController {
    pub fn new(sockets: &[SocketConfig], transmitter: Box<dyn Transmitter>) -> Self {
        let codes = sockets
            .iter()
            .map(|socket| (socket.id, (socket.on_code, socket.off_code)))
            .collect();
        Self {
            codes,
            transmitter: Mutex::new(transmitter),
        }
    }

    fn code_for(&self, socket_id: u8, action: SocketAction) -> Result<u64, ActuationError> {
        let (on, off) = self
            .codes
            .get(&socket_id)
            .ok_or(ActuationError::UnknownSocket(socket_id))?;
        Ok(match action {
            SocketAction::On => *on,
            SocketAction::Off => *off,
        })
    }
}

impl RfController for SocketController {
    fn turn_on(&self, socket_id: u8) -> Result<(), ActuationError> {
        let code = self.code_for(socket_id, SocketAction::On)?;
        debug!("Socket {} on -> code {}", socket_id, code);
        self.send_raw_code(code)
    }

    fn turn_off(&self, socket_id: u8) -> Result<(), ActuationError> {
        let code = self.code_for(socket_id, SocketAction::Off)?;
        debug!("Socket {} off -> code {}", socket_id, code);
        self.send_raw_code(code)
    }

    fn send_raw_code(&self, code: u64) -> Result<(), ActuationError> {
        let mut transmitter = self
            .transmitter
            .lock()
            .map_err(|e| ActuationError::TransmitterUnavailable(e.to_string()))?;
        transmitter.transmit(code)
    }
}

/// Hands intents to the RF controller on the blocking pool.
///
/// Dispatch is detached: the message loop never waits for a transmission and
/// the task touches nothing but the radio.
#[derive(Clone)]
pub struct RfDispatcher {
    controller: Arc<dyn RfController>,
}

impl RfDispatcher {
    pub fn new(controller: Arc<dyn RfController>) -> Self {
        Self { controller }
    }

    pub fn dispatch(&self, intent: SocketCommandIntent) -> JoinHandle<()> {
        let controller = Arc::clone(&self.controller);
        tokio::task::spawn_blocking(move || {
            let result = match intent.action {
                SocketAction::On => controller.turn_on(intent.socket_id),
                SocketAction::Off => controller.turn_off(intent.socket_id),
            };
            match result {
                Ok(()) => info!("Sent {}", intent),
                Err(e) => error!("Failed to send {}: {}", intent, e),
            }
        })
    }
}
