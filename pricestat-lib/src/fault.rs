use thiserror::Error;

use crate::SensorErr;

/// Everything that can go wrong around a control decision.
///
/// All of them fail closed: the controller never starts heating on a fault
/// and stops heating if the relay might be on.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Fault {
    #[error("price service unreachable or timed out")]
    Network,

    #[error("price service answered with status {0}")]
    PriceService(u16),

    #[error("temperature sensor fault: {0:?}")]
    Sensor(SensorErr),

    #[error("relay status missing or malformed")]
    Actuator,

    #[error("unexpected fault")]
    Unexpected,
}
