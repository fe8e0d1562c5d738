use crate::codec::ResponseEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;

/// Encodes response frames into an owned buffer and pushes them to the transport.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
    buffer: BytesMut,
    encoder: ResponseEncoder,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), encoder: ResponseEncoder::new() }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Whether the last response head was followed by its terminator.
    #[inline]
    pub fn in_payload(&self) -> bool {
        self.encoder.in_payload()
    }

    #[inline]
    pub fn write<D>(&mut self, item: Message<(ResponseHead, PayloadSize), D>) -> Result<(), SendError>
    where
        D: Buf,
    {
        self.encoder.encode(item, &mut self.buffer)
    }

    /// Encodes every frame, then writes them out in one go.
    pub async fn send_all<D, I>(&mut self, items: I) -> Result<(), SendError>
    where
        D: Buf,
        I: IntoIterator<Item = Message<(ResponseHead, PayloadSize), D>>,
    {
        for item in items {
            self.write(item)?;
        }
        self.flush().await
    }

    pub async fn flush(&mut self) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.writer.write_all(self.buffer.as_ref()).await?;
        self.buffer.clear();
        Ok(self.writer.flush().await?)
    }

    /// Writes raw bytes that bypass the encoder, such as an interim `100 Continue`.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.flush().await?;
        self.writer.write_all(bytes).await?;
        Ok(self.writer.flush().await?)
    }

    pub async fn shutdown(&mut self) -> Result<(), SendError> {
        Ok(self.writer.shutdown().await?)
    }
}
