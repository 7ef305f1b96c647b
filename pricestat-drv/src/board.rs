use async_trait::async_trait;
use pricestat_lib::SensorErr;

use crate::err::PricestatError;

/// One poll of the device carrying the relay and the thermometer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardStatus {
    /// `None` when the relay state is missing or malformed.
    pub relay: Option<bool>,
    pub temperature: Result<f64, SensorErr>,
    /// Hour of day according to the device, if it knows.
    pub hour: Option<u8>,
}

#[async_trait]
pub trait Board: Send {
    async fn status(&mut self) -> Result<BoardStatus, PricestatError>;

    /// Fire and forget: the outcome shows up in a later `status`.
    async fn set_relay(&mut self, on: bool) -> Result<(), PricestatError>;
}
