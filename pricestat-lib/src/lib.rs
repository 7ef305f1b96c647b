#![cfg_attr(not(test), no_std)]

use heapless::Vec;
use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod fault;
mod price;
mod snapshot;
mod thermal;

pub use fault::Fault;
pub use price::{FetchApplied, FetchOutcome, PriceCeiling, PriceGate, PriceRequest, Verdict};
pub use snapshot::Snapshot;
pub use thermal::{Band, Command, HeatingState, ThermalController, SAFETY_MARGIN_C};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("postcard error {0}")]
    Postcard(postcard::Error),
}

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    #[error("minimum temperature must be below maximum temperature")]
    InvertedBand,

    #[error("{0} is not a finite number")]
    NotFinite(&'static str),
}

/// Sensor: board thermometer, reported in thousandths of a degree

#[derive(Deserialize, Serialize, MaxSize, Debug, Eq, PartialEq, Copy, Clone)]
pub struct SensorReading {
    pub millicelsius: i32,
}

impl SensorReading {
    #[must_use]
    pub fn celsius(&self) -> f64 {
        f64::from(self.millicelsius) / 1000.0
    }
}

#[repr(u8)]
#[derive(Deserialize, Serialize, MaxSize, Debug, Eq, PartialEq, Copy, Clone)]
pub enum SensorErr {
    Bus,
    CheckSum,
    Missing,
    NonNumeric,
}

#[derive(Deserialize, Serialize, MaxSize, Debug, Eq, PartialEq, Copy, Clone)]
pub enum SensorResult {
    Err(SensorErr),
    Ok(SensorReading),
}

impl SensorResult {
    pub fn celsius(&self) -> Result<f64, SensorErr> {
        match self {
            Self::Ok(reading) => Ok(reading.celsius()),
            Self::Err(e) => Err(*e),
        }
    }
}

/// Relay output as reported by the board: `On` means the load is powered.
#[repr(u8)]
#[derive(Deserialize, Serialize, MaxSize, Debug, Eq, PartialEq, Copy, Clone)]
pub enum Relay {
    On,
    Off,
}

impl From<bool> for Relay {
    fn from(val: bool) -> Self {
        if val {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl From<Relay> for bool {
    fn from(val: Relay) -> Self {
        val == Relay::On
    }
}

#[repr(u8)]
#[derive(Deserialize, Serialize, MaxSize, Debug, Eq, PartialEq, Copy, Clone)]
pub enum Cmd {
    Get,
    Ping,
    Pong,
    Set(Relay),
    Status(Relay, SensorResult),
}

/// Upper bound of one COBS encoded frame, sentinel included.
pub const MAX_FRAME_LEN: usize = Cmd::POSTCARD_MAX_SIZE + 2;

pub type TVec = Vec<u8, MAX_FRAME_LEN>;

impl Cmd {
    pub fn to_vec(&self) -> Result<TVec, WireError> {
        postcard::to_vec_cobs(&self).map_err(WireError::Postcard)
    }

    pub fn from_vec(value: &mut [u8]) -> Result<Self, WireError> {
        postcard::from_bytes_cobs(value).map_err(WireError::Postcard)
    }
}
