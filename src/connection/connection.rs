//! The shared handle to one connected socket (plain TCP or TLS).
//!
//! All per-connection IO funnels through here: a single read buffer that
//! survives across requests (pipelined bytes read past one request head
//! belong to the next request), the unread-body counter drained before the
//! next head parse, and the socket itself behind an async mutex. At most
//! one IO operation is in flight per connection, so the locks are
//! uncontended; they exist because the completion tasks on the reactor
//! share this handle with the serving coroutine.

use std::cmp;
use std::sync::{Arc, Mutex};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{HeaderDecoder, ResponseEncoder};
use crate::protocol::{Body, IoError, RequestHeader, Response};
use crate::reactor;

const READ_CHUNK: usize = 8 * 1024;

pub struct Connection<S> {
    io: tokio::sync::Mutex<S>,
    buffer: Mutex<BytesMut>,
    unread_body: Mutex<u64>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Arc<Self> {
        Arc::new(Self {
            io: tokio::sync::Mutex::new(stream),
            buffer: Mutex::new(BytesMut::with_capacity(READ_CHUNK)),
            unread_body: Mutex::new(0),
        })
    }

    /// Reads one request head, returning it with the number of buffered
    /// bytes it consumed.
    ///
    /// EOF between requests is a clean [`IoError::EndOfStream`]; EOF in
    /// the middle of a head is [`IoError::PartialMessage`].
    pub(crate) async fn read_head(&self) -> Result<(RequestHeader, usize), IoError> {
        self.drain_unread_body().await?;

        let mut decoder = HeaderDecoder;
        loop {
            {
                let mut buffer = self.buffer.lock().unwrap();
                let before = buffer.len();
                if let Some((header, body_length)) = decoder.decode(&mut buffer)? {
                    *self.unread_body.lock().unwrap() = body_length;
                    return Ok((header, before - buffer.len()));
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.io.lock().await.read(&mut chunk).await?;
            if n == 0 {
                let started = !self.buffer.lock().unwrap().is_empty();
                return Err(if started { IoError::PartialMessage } else { IoError::EndOfStream });
            }
            self.buffer.lock().unwrap().extend_from_slice(&chunk[..n]);
        }
    }

    /// Discards the previous request's body if the responder never read
    /// it, so the bytes cannot be mistaken for the next request head.
    async fn drain_unread_body(&self) -> Result<(), IoError> {
        loop {
            {
                let mut unread = self.unread_body.lock().unwrap();
                if *unread == 0 {
                    return Ok(());
                }
                let mut buffer = self.buffer.lock().unwrap();
                let buffered = cmp::min(buffer.len() as u64, *unread);
                buffer.advance(buffered as usize);
                *unread -= buffered;
                if *unread == 0 {
                    return Ok(());
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.io.lock().await.read(&mut chunk).await?;
            if n == 0 {
                return Err(IoError::PartialMessage);
            }
            self.buffer.lock().unwrap().extend_from_slice(&chunk[..n]);
        }
    }

    /// Serializes and writes a full response, returning the bytes written.
    /// File bodies are streamed chunk by chunk rather than buffered.
    pub(crate) async fn write_response(&self, response: Response) -> Result<usize, IoError> {
        let (parts, body) = response.into_parts();
        let payload_size = body.payload_size();

        let mut head_bytes = BytesMut::new();
        ResponseEncoder
            .encode((http::Response::from_parts(parts, ()), payload_size), &mut head_bytes)?;

        let mut io = self.io.lock().await;
        io.write_all(&head_bytes).await?;
        let mut written = head_bytes.len();

        match body {
            Body::Empty => {}
            Body::Full(bytes) => {
                io.write_all(&bytes).await?;
                written += bytes.len();
            }
            Body::File { file, .. } => {
                let mut file = tokio::fs::File::from_std(file);
                let mut chunk = vec![0u8; READ_CHUNK];
                loop {
                    let n = file.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    io.write_all(&chunk[..n]).await?;
                    written += n;
                }
            }
        }

        io.flush().await?;
        Ok(written)
    }

    /// Launches an orderly shutdown of the underlying stream on the
    /// reactor. For TLS streams this sends the close-notify alert.
    pub(crate) fn spawn_shutdown(connection: Arc<Self>) {
        reactor::spawn(async move {
            let _ = connection.io.lock().await.shutdown().await;
        });
    }
}
