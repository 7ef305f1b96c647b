//! Relay and thermometer on a Shelly Gen2 device, over its local RPC API.

use async_trait::async_trait;
use pricestat_lib::SensorErr;
use serde_json::Value;
use std::time::Duration;

use crate::board::{Board, BoardStatus};
use crate::err::PricestatError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Shelly {
    http: reqwest::Client,
    base_url: String,
    switch_id: u8,
    temperature_id: u8,
}

impl Shelly {
    pub fn new(
        base_url: &str,
        switch_id: u8,
        temperature_id: u8,
    ) -> Result<Self, PricestatError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            switch_id,
            temperature_id,
        })
    }
}

/// Extract what the controller needs from a `Shelly.GetStatus` answer.
pub fn parse_status(status: &Value, switch_id: u8, temperature_id: u8) -> BoardStatus {
    let relay = status[format!("switch:{switch_id}")]["output"].as_bool();

    let temperature = match &status[format!("temperature:{temperature_id}")] {
        Value::Null => Err(SensorErr::Missing),
        sensor => match &sensor["tC"] {
            Value::Null => Err(SensorErr::Missing),
            t => t.as_f64().ok_or(SensorErr::NonNumeric),
        },
    };

    // "21:34", or null while the device has no time sync
    let hour = status["sys"]["time"]
        .as_str()
        .and_then(|t| t.split(':').next())
        .and_then(|h| h.parse::<u8>().ok())
        .filter(|h| *h < 24);

    BoardStatus {
        relay,
        temperature,
        hour,
    }
}

#[async_trait]
impl Board for Shelly {
    async fn status(&mut self) -> Result<BoardStatus, PricestatError> {
        let url = format!("{}/rpc/Shelly.GetStatus", self.base_url);
        let body: Value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !body.is_object() {
            return Err(PricestatError::Malformed(body.to_string()));
        }
        Ok(parse_status(&body, self.switch_id, self.temperature_id))
    }

    async fn set_relay(&mut self, on: bool) -> Result<(), PricestatError> {
        let url = format!("{}/rpc/Switch.Set", self.base_url);
        let response = self
            .http
            .get(url)
            .query(&[("id", self.switch_id.to_string()), ("on", on.to_string())])
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PricestatError::Rejected(response.status()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn full_status() {
        let status = json!({
            "sys": { "time": "21:34" },
            "switch:0": { "id": 0, "output": true },
            "temperature:100": { "id": 100, "tC": 22.3, "tF": 72.1 },
        });
        assert_eq!(
            parse_status(&status, 0, 100),
            BoardStatus {
                relay: Some(true),
                temperature: Ok(22.3),
                hour: Some(21),
            }
        );
    }

    #[test_case(json!({}) => Err(SensorErr::Missing) ; "no sensor")]
    #[test_case(json!({ "temperature:100": { "tC": null } }) => Err(SensorErr::Missing) ; "null reading")]
    #[test_case(json!({ "temperature:100": { "tC": "hot" } }) => Err(SensorErr::NonNumeric) ; "string reading")]
    #[test_case(json!({ "temperature:100": { "tC": -3 } }) => Ok(-3.0) ; "integer reading")]
    fn temperature(status: Value) -> Result<f64, SensorErr> {
        parse_status(&status, 0, 100).temperature
    }

    #[test_case(json!({ "switch:0": { "output": false } }) => Some(false) ; "off")]
    #[test_case(json!({ "switch:0": { "output": "on" } }) => None ; "not a boolean")]
    #[test_case(json!({ "switch:1": { "output": true } }) => None ; "other switch")]
    fn relay(status: Value) -> Option<bool> {
        parse_status(&status, 0, 100).relay
    }

    #[test_case(json!({ "sys": { "time": "07:05" } }) => Some(7) ; "morning")]
    #[test_case(json!({ "sys": { "time": null } }) => None ; "no time sync")]
    #[test_case(json!({ "sys": { "time": "99:00" } }) => None ; "nonsense")]
    fn hour(status: Value) -> Option<u8> {
        parse_status(&status, 0, 100).hour
    }
}
