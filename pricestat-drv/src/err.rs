pub type PricestatResult = anyhow::Result<()>;

#[derive(thiserror::Error, Debug)]
pub enum PricestatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] pricestat_lib::ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Wire error: {0}")]
    Wire(#[from] pricestat_lib::WireError),

    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Board did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Board connection closed")]
    Closed,

    #[error("Board rejected command with status {0}")]
    Rejected(reqwest::StatusCode),

    #[error("Malformed board status: {0}")]
    Malformed(String),
}
