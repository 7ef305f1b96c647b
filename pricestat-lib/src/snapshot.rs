use serde::Serialize;

use crate::{PriceGate, ThermalController, Verdict};

/// Read-only view of the controller for logs and status publishing.
#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub struct Snapshot {
    pub price_ceiling: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub last_temp: Option<f64>,
    pub cached_hour: Option<u8>,
    pub price_fetched: bool,
    pub rising: bool,
    pub relay_on: bool,
    pub price_verdict: Verdict,
}

impl Snapshot {
    #[must_use]
    pub fn capture(gate: &PriceGate, thermal: &ThermalController) -> Self {
        let band = thermal.band();
        Self {
            price_ceiling: gate.ceiling().cents(),
            min_temp: band.min(),
            max_temp: band.max(),
            last_temp: thermal.last_temp(),
            cached_hour: gate.cached_hour(),
            price_fetched: gate.fetched_this_hour(),
            rising: thermal.rising(),
            relay_on: thermal.relay_on(),
            price_verdict: gate.verdict(),
        }
    }
}
