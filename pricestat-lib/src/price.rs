use core::fmt;

use serde::Serialize;

use crate::{ConfigError, Fault};

/// Highest acceptable spot price, in cents per kWh. Negative is allowed,
/// that happens sometimes.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy, Serialize)]
pub struct PriceCeiling(f64);

impl PriceCeiling {
    pub fn new(cents: f64) -> Result<Self, ConfigError> {
        if cents.is_finite() {
            Ok(Self(cents))
        } else {
            Err(ConfigError::NotFinite("price ceiling"))
        }
    }

    #[must_use]
    pub fn cents(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for PriceCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum Verdict {
    Unknown,
    Cheap,
    Expensive,
}

impl Verdict {
    #[must_use]
    pub fn is_cheap(self) -> bool {
        self == Self::Cheap
    }
}

/// What came back from one price request.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FetchOutcome {
    Success { cheap: bool },
    /// Worth retrying on the next tick: rate limiting, server errors, timeouts.
    Transient(Fault),
    /// Not expected to heal by itself, but still retried at tick cadence.
    Permanent(Fault),
}

impl FetchOutcome {
    /// Classify the status code of the price service.
    ///
    /// 200 means the current price is at or below the ceiling, 400 means it
    /// is above. Anything else is a fault.
    #[must_use]
    pub fn from_status(code: u16) -> Self {
        match code {
            200 => Self::Success { cheap: true },
            400 => Self::Success { cheap: false },
            429 | 500..=599 => Self::Transient(Fault::PriceService(code)),
            _ => Self::Permanent(Fault::PriceService(code)),
        }
    }
}

/// Result of handing a [`FetchOutcome`] to the gate.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FetchApplied {
    /// Definitive answer, cached until the hour rolls over.
    Cached(Verdict),
    /// Fault, verdict forced to `Expensive`, the hour stays uncached.
    Failed { fault: Fault, transient: bool },
    /// Answer for an hour that is already over; ignored.
    Stale,
}

/// A price lookup the caller must perform and report back through
/// [`PriceGate::on_fetch_result`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PriceRequest {
    pub hour: u8,
    pub ceiling: PriceCeiling,
}

/// Decides whether electricity is cheap enough to heat, with at most one
/// successful price lookup per hour of the day.
#[derive(Debug, Clone)]
pub struct PriceGate {
    ceiling: PriceCeiling,
    current_hour: Option<u8>,
    cached_hour: Option<u8>,
    verdict: Verdict,
    in_flight: Option<u8>,
}

impl PriceGate {
    #[must_use]
    pub fn new(ceiling: PriceCeiling) -> Self {
        Self {
            ceiling,
            current_hour: None,
            cached_hour: None,
            verdict: Verdict::Unknown,
            in_flight: None,
        }
    }

    /// Record the hour of the current tick. Returns `true` on rollover, in
    /// which case the previous hour's verdict no longer applies.
    pub fn observe_hour(&mut self, hour: u8) -> bool {
        if self.current_hour == Some(hour) {
            return false;
        }
        self.current_hour = Some(hour);
        self.cached_hour = None;
        self.verdict = Verdict::Unknown;
        true
    }

    #[must_use]
    pub fn should_fetch(&self, hour: u8) -> bool {
        self.cached_hour != Some(hour) && self.in_flight != Some(hour)
    }

    pub fn begin_fetch(&mut self, hour: u8) -> PriceRequest {
        self.in_flight = Some(hour);
        PriceRequest {
            hour,
            ceiling: self.ceiling,
        }
    }

    pub fn on_fetch_result(&mut self, hour: u8, outcome: FetchOutcome) -> FetchApplied {
        if self.in_flight == Some(hour) {
            self.in_flight = None;
        }
        if self.current_hour != Some(hour) {
            return FetchApplied::Stale;
        }
        match outcome {
            FetchOutcome::Success { cheap } => {
                self.verdict = if cheap {
                    Verdict::Cheap
                } else {
                    Verdict::Expensive
                };
                self.cached_hour = Some(hour);
                FetchApplied::Cached(self.verdict)
            }
            FetchOutcome::Transient(fault) => {
                self.verdict = Verdict::Expensive;
                FetchApplied::Failed {
                    fault,
                    transient: true,
                }
            }
            FetchOutcome::Permanent(fault) => {
                self.verdict = Verdict::Expensive;
                FetchApplied::Failed {
                    fault,
                    transient: false,
                }
            }
        }
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    #[must_use]
    pub fn ceiling(&self) -> PriceCeiling {
        self.ceiling
    }

    #[must_use]
    pub fn cached_hour(&self) -> Option<u8> {
        self.cached_hour
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<u8> {
        self.in_flight
    }

    #[must_use]
    pub fn fetched_this_hour(&self) -> bool {
        self.current_hour.is_some() && self.cached_hour == self.current_hour
    }
}
