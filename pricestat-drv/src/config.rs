use pricestat_lib::{Band, PriceCeiling};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::err::PricestatError;

/// Operator thresholds. Read once at startup, never written back.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct Thresholds {
    /// cents per kWh
    pub price_ceiling: f64,
    pub min_temp: f64,
    pub max_temp: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            price_ceiling: 9.0,
            min_temp: 22.1,
            max_temp: 22.5,
        }
    }
}

fn config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "pricestat").map_or_else(
        || Path::new("/tmp").into(),
        |proj_dirs| proj_dirs.config_dir().into(),
    )
}

impl Thresholds {
    /// Load `path`, or `config.toml` in the platform config dir. Only the
    /// platform file may be absent, in which case defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, PricestatError> {
        match path {
            Some(path) => Self::read(path),
            None => Self::read_or_default(&config_path().join("config.toml")),
        }
    }

    fn read(path: &Path) -> Result<Self, PricestatError> {
        tracing::info!("reading thresholds from {}", path.display());
        Self::from_toml(&fs::read_to_string(path)?)
    }

    fn read_or_default(path: &Path) -> Result<Self, PricestatError> {
        if path.exists() {
            Self::read(path)
        } else {
            tracing::info!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(s: &str) -> Result<Self, PricestatError> {
        Ok(toml::from_str(s)?)
    }

    #[must_use]
    pub fn override_with(
        self,
        price_ceiling: Option<f64>,
        min_temp: Option<f64>,
        max_temp: Option<f64>,
    ) -> Self {
        Self {
            price_ceiling: price_ceiling.unwrap_or(self.price_ceiling),
            min_temp: min_temp.unwrap_or(self.min_temp),
            max_temp: max_temp.unwrap_or(self.max_temp),
        }
    }

    pub fn validate(&self) -> Result<(PriceCeiling, Band), PricestatError> {
        Ok((
            PriceCeiling::new(self.price_ceiling)?,
            Band::new(self.min_temp, self.max_temp)?,
        ))
    }
}
