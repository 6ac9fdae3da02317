//! Stream adapters - writing a message incrementally.
//!
//! [`MessageWriter`] (characters, `fmt::Write`) and [`MessageOutputStream`]
//! (bytes, `io::Write`) buffer up to a configured size. Each time the buffer
//! fills, they send a non-final frame through the endpoint: TEXT or BINARY
//! first, CONTINUATION afterwards. Closing sends the final frame, possibly
//! empty, and completes the attached callback once. Dropping an adapter
//! closes it.
//!
//! An adapter borrows its endpoint mutably, so no other send can slip into
//! the middle of a streamed message.
//!
//! # Example
//!
//! ```
//! use std::fmt::Write;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use ws_outgoing::sink::{BatchMode, FrameSink};
//! # use ws_outgoing::{Callback, Frame, RemoteEndpoint, Result, Session};
//! # use ws_outgoing::encoder::EncoderRegistry;
//! # struct Discard;
//! # impl FrameSink for Discard {
//! #     fn send_frame(&self, _: Frame, cb: Callback, _: BatchMode) -> Result<()> { cb.succeeded(); Ok(()) }
//! #     fn flush_batch(&self, cb: Callback) -> Result<()> { cb.succeeded(); Ok(()) }
//! #     fn idle_timeout(&self) -> Duration { Duration::ZERO }
//! #     fn set_idle_timeout(&self, _: Duration) {}
//! # }
//! let mut endpoint = RemoteEndpoint::new(Session::new(EncoderRegistry::new()), Arc::new(Discard));
//!
//! let mut writer = endpoint.send_writer(Callback::noop());
//! write!(writer, "streamed {}", 42).unwrap();
//! writer.close();
//! drop(writer);
//!
//! assert!(endpoint.open_message_type().is_none());
//! ```

mod emitter;

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::callback::Callback;
use crate::endpoint::RemoteEndpoint;
use crate::error::WsError;
use crate::protocol::{BufferPool, MessageType};

use emitter::FrameEmitter;

/// Character stream adapter producing one text message.
pub struct MessageWriter<'a> {
    inner: FrameEmitter<'a>,
}

impl<'a> MessageWriter<'a> {
    /// Create a writer sending through `endpoint`, emitting a frame every
    /// `max_buffer_size` bytes of UTF-8.
    pub fn new(endpoint: &'a mut RemoteEndpoint, max_buffer_size: usize, pool: Arc<BufferPool>) -> Self {
        Self {
            inner: FrameEmitter::new(endpoint, MessageType::Text, max_buffer_size, pool),
        }
    }

    /// Callback completed when the message is finished.
    pub fn set_callback(&mut self, callback: Callback) {
        self.inner.set_callback(callback);
    }

    /// Mark the message failed; the callback will report `err`.
    pub fn fail(&mut self, err: WsError) {
        self.inner.fail(err);
    }

    /// Send the final frame and complete the callback.
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Frames handed to the endpoint so far.
    pub fn frames_sent(&self) -> usize {
        self.inner.frames_sent()
    }

    /// Send buffered text now as a non-final frame.
    pub fn flush(&mut self) -> crate::Result<()> {
        self.inner.flush()
    }
}

impl fmt::Write for MessageWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

impl fmt::Debug for MessageWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageWriter")
            .field("frames_sent", &self.frames_sent())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Byte stream adapter producing one binary message.
pub struct MessageOutputStream<'a> {
    inner: FrameEmitter<'a>,
}

impl<'a> MessageOutputStream<'a> {
    /// Create a stream sending through `endpoint`, emitting a frame every
    /// `max_buffer_size` bytes.
    pub fn new(endpoint: &'a mut RemoteEndpoint, max_buffer_size: usize, pool: Arc<BufferPool>) -> Self {
        Self {
            inner: FrameEmitter::new(endpoint, MessageType::Binary, max_buffer_size, pool),
        }
    }

    pub fn set_callback(&mut self, callback: Callback) {
        self.inner.set_callback(callback);
    }

    /// Mark the message failed; the callback will report `err`.
    pub fn fail(&mut self, err: WsError) {
        self.inner.fail(err);
    }

    /// Send the final frame and complete the callback.
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn frames_sent(&self) -> usize {
        self.inner.frames_sent()
    }
}

impl io::Write for MessageOutputStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    /// Sends buffered bytes as a non-final frame.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(io::Error::other)
    }
}

impl fmt::Debug for MessageOutputStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageOutputStream")
            .field("frames_sent", &self.frames_sent())
            .field("closed", &self.is_closed())
            .finish()
    }
}
