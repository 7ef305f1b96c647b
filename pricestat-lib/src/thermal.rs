use serde::Serialize;

use crate::{ConfigError, Verdict};

/// Hard stop this far above the band, whether or not a heating cycle is
/// running.
pub const SAFETY_MARGIN_C: f64 = 0.4;

/// Hysteresis band, in degrees celsius.
#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub struct Band {
    min: f64,
    max: f64,
}

impl Band {
    pub fn new(min: f64, max: f64) -> Result<Self, ConfigError> {
        if !min.is_finite() {
            return Err(ConfigError::NotFinite("minimum temperature"));
        }
        if !max.is_finite() {
            return Err(ConfigError::NotFinite("maximum temperature"));
        }
        if min >= max {
            return Err(ConfigError::InvertedBand);
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[must_use]
    pub fn safety_ceiling(&self) -> f64 {
        self.max + SAFETY_MARGIN_C
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum Command {
    Stop,
    Start,
    NoOp,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum HeatingState {
    Idle,
    Rising,
}

/// Relay hysteresis state machine.
///
/// `Idle -> Rising` when the temperature drops below the band while the
/// price is cheap. `Rising -> Idle` above the band, above the safety
/// ceiling, when the price is no longer cheap, or on a sensor fault.
#[derive(Debug, Clone)]
pub struct ThermalController {
    band: Band,
    relay_on: bool,
    rising: bool,
    last_temp: Option<f64>,
}

impl ThermalController {
    #[must_use]
    pub fn new(band: Band) -> Self {
        Self {
            band,
            relay_on: false,
            rising: false,
            last_temp: None,
        }
    }

    /// Align with what the relay says it is doing. The relay is the source
    /// of truth; a missing report is a fault and stops heating.
    pub fn reconcile_relay(&mut self, reported_on: Option<bool>) -> Command {
        match reported_on {
            Some(on) => {
                self.relay_on = on;
                if !on {
                    self.rising = false;
                }
                Command::NoOp
            }
            None => {
                self.apply(Command::Stop);
                Command::Stop
            }
        }
    }

    /// Decide what the relay should do and update the state accordingly.
    /// The first matching rule wins.
    pub fn evaluate(&mut self, verdict: Verdict, temperature: Option<f64>) -> Command {
        self.last_temp = temperature;
        let command = self.decide(verdict, temperature);
        self.apply(command);
        command
    }

    fn decide(&self, verdict: Verdict, temperature: Option<f64>) -> Command {
        if !verdict.is_cheap() {
            return if self.relay_on {
                Command::Stop
            } else {
                Command::NoOp
            };
        }
        let Some(temp) = temperature else {
            return Command::Stop;
        };
        if temp > self.band.max && self.rising {
            Command::Stop
        } else if temp > self.band.safety_ceiling() {
            Command::Stop
        } else if temp < self.band.min && !self.rising {
            Command::Start
        } else {
            Command::NoOp
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Stop => {
                self.relay_on = false;
                self.rising = false;
            }
            Command::Start => {
                self.relay_on = true;
                self.rising = true;
            }
            Command::NoOp => {}
        }
    }

    #[must_use]
    pub fn state(&self) -> HeatingState {
        if self.rising {
            HeatingState::Rising
        } else {
            HeatingState::Idle
        }
    }

    #[must_use]
    pub fn band(&self) -> Band {
        self.band
    }

    #[must_use]
    pub fn relay_on(&self) -> bool {
        self.relay_on
    }

    #[must_use]
    pub fn rising(&self) -> bool {
        self.rising
    }

    #[must_use]
    pub fn last_temp(&self) -> Option<f64> {
        self.last_temp
    }
}
