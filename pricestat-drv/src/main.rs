use clap::{Parser, ValueEnum};
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::Level;

mod board;
mod config;
mod controller;
mod err;
mod price;
mod sercon;
mod serial;
mod shelly;
mod status;
mod tasks;
use crate::board::Board;
use crate::config::Thresholds;
use crate::controller::Controller;
use crate::err::PricestatResult;
use crate::price::{SpotPrice, DEFAULT_PRICE_URL};
use crate::tasks::{mqtt_poll, mqtt_publish};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BoardKind {
    Shelly,
    Serial,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, env = "PRICESTAT_CONFIG")]
    config: Option<PathBuf>,

    /// Highest price at which heating is allowed, cents per kWh
    #[arg(long, env = "PRICE_CEILING", allow_hyphen_values = true)]
    price_ceiling: Option<f64>,

    #[arg(long, env = "MIN_TEMP", allow_hyphen_values = true)]
    min_temp: Option<f64>,

    #[arg(long, env = "MAX_TEMP", allow_hyphen_values = true)]
    max_temp: Option<f64>,

    #[arg(long, env = "PRICE_URL", default_value = DEFAULT_PRICE_URL)]
    price_url: String,

    /// seconds
    #[arg(long, env = "PRICE_TIMEOUT", default_value_t = 15)]
    price_timeout: u64,

    /// seconds
    #[arg(long, env = "TICK_SECS", default_value_t = 30)]
    tick: u64,

    #[arg(long, env = "BOARD", value_enum, default_value = "shelly")]
    board: BoardKind,

    #[arg(long, env = "SHELLY_URL", default_value = "http://127.0.0.1")]
    shelly_url: String,

    #[arg(long, env = "SWITCH_ID", default_value_t = 0)]
    switch_id: u8,

    #[arg(long, env = "TEMPERATURE_ID", default_value_t = 100)]
    temperature_id: u8,

    #[arg(long, env = "UART_PORT", default_value = "/dev/pricestat")]
    uart_port: String,

    #[arg(long, env = "UART_BAUD", default_value_t = 2_000_000)]
    uart_baud: u32,

    #[arg(long, env = "MQTT_HOST")]
    mqtt_host: Option<String>,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    #[arg(long, env = "MQTT_USER")]
    mqtt_user: Option<String>,

    #[arg(long, env = "MQTT_PASS")]
    mqtt_pass: Option<String>,

    #[arg(long, env = "MQTT_TOPIC", default_value = "pricestat/status")]
    mqtt_topic: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn open_board(args: &Args) -> anyhow::Result<Box<dyn Board>> {
    let board: Box<dyn Board> = match args.board {
        BoardKind::Shelly => Box::new(shelly::Shelly::new(
            &args.shelly_url,
            args.switch_id,
            args.temperature_id,
        )?),
        BoardKind::Serial => Box::new(serial::open(&args.uart_port, args.uart_baud)?),
    };
    Ok(board)
}

fn start_mqtt(args: &Args, host: &str, status: status::SWatchReceiver) {
    let lwt = LastWill::new(args.mqtt_topic.clone(), "Offline", QoS::AtLeastOnce, true);
    let mut mqttoptions = MqttOptions::new("pricestat", host, args.mqtt_port);
    mqttoptions.set_keep_alive(Duration::from_secs(5));
    mqttoptions.set_last_will(lwt);
    if let (Some(user), Some(pass)) = (&args.mqtt_user, &args.mqtt_pass) {
        mqttoptions.set_credentials(user, pass);
    }

    let (client, connection) = AsyncClient::new(mqttoptions, 10);
    let topic = args.mqtt_topic.clone();
    task::spawn(async move {
        if let Err(e) = mqtt_publish(status, client, topic).await {
            tracing::error!("mqtt publisher stopped: {:?}", e);
        }
    });
    task::spawn(mqtt_poll(connection));
}

#[tokio::main]
async fn main() -> PricestatResult {
    let args = Args::parse();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::from_str(&args.log_level)?)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let thresholds = Thresholds::load(args.config.as_deref())?.override_with(
        args.price_ceiling,
        args.min_temp,
        args.max_temp,
    );
    let (ceiling, band) = thresholds.validate()?;
    tracing::info!(
        "heating allowed at or below {} c/kWh, band {}..{} °C",
        ceiling,
        band.min(),
        band.max()
    );

    let board = open_board(&args)?;
    let prices = Arc::new(SpotPrice::new(
        &args.price_url,
        Duration::from_secs(args.price_timeout),
    )?);

    let (status_send, status_receive) = status::channel();
    if let Some(host) = &args.mqtt_host {
        start_mqtt(&args, host, status_receive);
    }

    let controller = Controller::new(board, prices, ceiling, band, status_send)
        .with_tick(Duration::from_secs(args.tick.max(1)));

    let cancellation = CancellationToken::new();
    let running = task::spawn(controller.run(cancellation.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted");
    cancellation.cancel();
    running.await?;
    Ok(())
}
