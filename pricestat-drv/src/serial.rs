//! Relay and thermometer on a board attached over a serial line.

use async_trait::async_trait;
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use pricestat_lib::{Cmd, Relay, SensorResult};
use std::time::Duration;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Framed};

use crate::board::{Board, BoardStatus};
use crate::err::PricestatError;
use crate::sercon::SerialConnection;

const ANSWER_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SerialBoard<T> {
    link: T,
}

pub fn open(
    port: &str,
    baud: u32,
) -> Result<SerialBoard<Framed<tokio_serial::SerialStream, SerialConnection>>, PricestatError> {
    #[allow(unused_mut)]
    let mut uart = tokio_serial::new(port, baud).open_native_async()?;
    #[cfg(unix)]
    uart.set_exclusive(false)?;
    Ok(SerialBoard::new(SerialConnection::new().framed(uart)))
}

impl<T> SerialBoard<T>
where
    T: Stream<Item = Result<Cmd, PricestatError>> + Sink<Cmd, Error = PricestatError> + Unpin,
{
    pub fn new(link: T) -> Self {
        Self { link }
    }

    /// Drop whatever arrived since the last poll, so an answer to an
    /// earlier, timed out `Get` is never taken for the current one.
    async fn drain(&mut self) -> Result<(), PricestatError> {
        while let Some(frame) = self.link.next().now_or_never() {
            match frame {
                Some(Ok(Cmd::Ping)) => self.link.send(Cmd::Pong).await?,
                Some(Ok(cmd)) => tracing::debug!("dropping stale {:?}", cmd),
                Some(Err(e)) => return Err(e),
                None => return Err(PricestatError::Closed),
            }
        }
        Ok(())
    }

    async fn wait_for_status(&mut self) -> Result<(Relay, SensorResult), PricestatError> {
        loop {
            match self.link.next().await {
                Some(Ok(Cmd::Status(relay, sensor))) => return Ok((relay, sensor)),
                Some(Ok(Cmd::Ping)) => self.link.send(Cmd::Pong).await?,
                Some(Ok(cmd)) => tracing::debug!("ignoring {:?} while waiting for status", cmd),
                Some(Err(e)) => return Err(e),
                None => return Err(PricestatError::Closed),
            }
        }
    }
}

#[async_trait]
impl<T> Board for SerialBoard<T>
where
    T: Stream<Item = Result<Cmd, PricestatError>>
        + Sink<Cmd, Error = PricestatError>
        + Unpin
        + Send,
{
    async fn status(&mut self) -> Result<BoardStatus, PricestatError> {
        self.drain().await?;
        self.link.send(Cmd::Get).await?;
        let (relay, sensor) = timeout(ANSWER_TIMEOUT, self.wait_for_status())
            .await
            .map_err(|_| PricestatError::Timeout(ANSWER_TIMEOUT))??;
        Ok(BoardStatus {
            relay: Some(relay.into()),
            temperature: sensor.celsius(),
            // the board has no clock
            hour: None,
        })
    }

    async fn set_relay(&mut self, on: bool) -> Result<(), PricestatError> {
        tracing::debug!("sending {:?} to serial", Cmd::Set(on.into()));
        self.link.send(Cmd::Set(on.into())).await
    }
}
