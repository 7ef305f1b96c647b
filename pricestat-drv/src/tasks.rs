use crate::err::PricestatResult;
use crate::status::SWatchReceiver;
use pricestat_lib::Snapshot;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::time::Duration;
use tokio::time::sleep;

fn payload(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

/// Push every new snapshot to the broker, retained so late subscribers see
/// the current state.
pub async fn mqtt_publish(
    mut get_status: SWatchReceiver,
    client: AsyncClient,
    topic: String,
) -> PricestatResult {
    while get_status.changed().await.is_ok() {
        let msg = match *get_status.borrow_and_update() {
            Some(snapshot) => payload(&snapshot)?,
            None => continue,
        };
        tracing::debug!("publishing status to {}", topic);
        client.publish(&topic, QoS::AtLeastOnce, true, msg).await?;
    }
    Ok(())
}

/// Drive the MQTT connection; rumqttc reconnects on the next poll.
pub async fn mqtt_poll(mut connection: EventLoop) {
    loop {
        if let Err(e) = connection.poll().await {
            tracing::error!("mqtt connection error: {:?}", e);
            sleep(Duration::from_secs(5)).await;
        }
    }
}
