use crate::err::PricestatError;
use bytes::BytesMut;
use pricestat_lib::{Cmd, MAX_FRAME_LEN};
use tokio_util::codec::{Decoder, Encoder};

/// COBS framed postcard messages, delimited by a zero byte.
#[derive(Debug, Default)]
pub struct SerialConnection;

impl Decoder for SerialConnection {
    type Item = Cmd;
    type Error = PricestatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.iter().position(|b| *b == 0) else {
                if src.len() > MAX_FRAME_LEN {
                    tracing::warn!("dropping {} bytes of unterminated serial data", src.len());
                    src.clear();
                }
                return Ok(None);
            };
            let mut frame = src.split_to(end + 1);
            if frame.len() == 1 {
                continue;
            }
            match Cmd::from_vec(&mut frame) {
                Ok(cmd) => return Ok(Some(cmd)),
                Err(e) => tracing::warn!("dropping undecodable serial frame: {}", e),
            }
        }
    }
}

impl Encoder<Cmd> for SerialConnection {
    type Error = PricestatError;

    fn encode(&mut self, cmd: Cmd, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = cmd.to_vec()?;
        buf.reserve(frame.len());
        buf.extend_from_slice(&frame);
        Ok(())
    }
}

impl SerialConnection {
    pub const fn new() -> Self {
        Self
    }
}
