//! Send dispatcher for one side of a connection.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use super::guard::MessageTypeGuard;
use crate::callback::{Callback, Completion};
use crate::encoder::Encoder;
use crate::error::{EncodeError, ProtocolError, Result, WsError};
use crate::protocol::{Frame, MessageType, OpCode, MAX_CONTROL_PAYLOAD};
use crate::session::{ControlPayloadPolicy, Session};
use crate::sink::{BatchMode, FrameSink};
use crate::stream::{MessageOutputStream, MessageWriter};

/// How far a frame got in [`RemoteEndpoint::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatched {
    /// Handed to the sink.
    Accepted,
    /// Refused by the framing checks; nothing changed.
    Rejected,
    /// Passed the framing checks but the sink refused it.
    Refused,
}

/// The sending half of a WebSocket endpoint.
///
/// Routes data frames through the [`MessageTypeGuard`] into a
/// [`FrameSink`], fans application values out over the registered
/// encoders, and controls batching.
///
/// Every operation that takes a [`Callback`] completes it exactly once, on
/// every path. Sends take `&mut self`: one owner issues sends in order, and
/// sharing an endpoint across tasks means putting it behind a mutex.
pub struct RemoteEndpoint {
    session: Arc<Session>,
    sink: Arc<dyn FrameSink>,
    batch_mode: BatchMode,
    guard: MessageTypeGuard,
}

impl RemoteEndpoint {
    /// Create an endpoint over `sink`.
    ///
    /// Starts in the configured batch mode and pushes the configured idle
    /// timeout to the sink.
    pub fn new(session: Arc<Session>, sink: Arc<dyn FrameSink>) -> Self {
        let config = session.config();
        sink.set_idle_timeout(config.idle_timeout());
        let batch_mode = config.batch_mode;
        Self {
            session,
            sink,
            batch_mode,
            guard: MessageTypeGuard::new(),
        }
    }

    #[inline]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Type of the fragmented message currently in progress, if any.
    #[inline]
    pub fn open_message_type(&self) -> Option<MessageType> {
        self.guard.open_message_type()
    }

    /// Send one frame.
    ///
    /// Data frames pass the message-type guard first; a rejection fails
    /// `callback` and changes nothing. Accepted frames go to the sink with
    /// `batch_mode`, and a final data frame closes the open message whether
    /// or not the sink takes it. Control frames skip the guard.
    pub fn send_frame(&mut self, frame: Frame, callback: Callback, batch_mode: BatchMode) {
        self.dispatch(frame, callback, batch_mode);
    }

    /// Like [`send_frame`](Self::send_frame), reporting how far the frame
    /// got.
    pub(crate) fn dispatch(
        &mut self,
        frame: Frame,
        callback: Callback,
        batch_mode: BatchMode,
    ) -> Dispatched {
        let op_code = frame.op_code();
        let data = op_code.is_data();
        let fin = frame.is_fin();

        let frame = if data {
            if let Err(err) = self.guard.check(op_code) {
                debug!(?op_code, error = %err, "data frame rejected");
                callback.failed(err.into());
                return Dispatched::Rejected;
            }
            frame
        } else {
            match self.check_control_frame(frame) {
                Ok(frame) => frame,
                Err(err) => {
                    callback.failed(err);
                    return Dispatched::Rejected;
                }
            }
        };

        let dispatched = match self.sink.send_frame(frame, callback.clone(), batch_mode) {
            Ok(()) => Dispatched::Accepted,
            Err(err) => {
                debug!(?op_code, error = %err, "frame refused by sink");
                callback.failed(err);
                Dispatched::Refused
            }
        };

        if data && fin {
            self.guard.complete();
        }
        dispatched
    }

    /// Close the open message without sending anything. Only for a message
    /// whose opening frame never reached the sink.
    pub(crate) fn abandon_message(&mut self) {
        self.guard.complete();
    }

    /// Send a whole text message.
    pub fn send_text(&mut self, text: impl Into<String>, callback: Callback) {
        self.send_frame(Frame::text(text), callback, self.batch_mode);
    }

    /// Send a whole binary message.
    pub fn send_binary(&mut self, data: impl Into<Bytes>, callback: Callback) {
        self.send_frame(Frame::binary(data), callback, self.batch_mode);
    }

    /// Send a whole text message, returning a future for the outcome.
    pub fn send_text_async(&mut self, text: impl Into<String>) -> Completion {
        let (callback, completion) = Callback::channel();
        self.send_text(text, callback);
        completion
    }

    /// Send a whole binary message, returning a future for the outcome.
    pub fn send_binary_async(&mut self, data: impl Into<Bytes>) -> Completion {
        let (callback, completion) = Callback::channel();
        self.send_binary(data, callback);
        completion
    }

    /// Send one fragment of a text message.
    ///
    /// The first fragment goes out as TEXT, later ones as CONTINUATION,
    /// until a fragment with `is_last` ends the message.
    pub fn send_partial_text(&mut self, fragment: &str, is_last: bool, callback: Callback) {
        let payload = Bytes::copy_from_slice(fragment.as_bytes());
        let frame = self.fragment(MessageType::Text, payload, is_last);
        self.send_frame(frame, callback, self.batch_mode);
    }

    /// Send one fragment of a binary message.
    pub fn send_partial_binary(&mut self, fragment: impl Into<Bytes>, is_last: bool, callback: Callback) {
        let frame = self.fragment(MessageType::Binary, fragment.into(), is_last);
        self.send_frame(frame, callback, self.batch_mode);
    }

    fn fragment(&self, message_type: MessageType, payload: Bytes, fin: bool) -> Frame {
        let op_code = if self.guard.open_message_type() == Some(message_type) {
            OpCode::Continuation
        } else {
            message_type.op_code()
        };
        Frame::new(op_code, fin, payload)
    }

    /// Send a PING. Fire-and-forget: only a refusal by the sink is reported.
    pub fn send_ping(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.send_control(Frame::ping(payload))
    }

    /// Send a PONG. Fire-and-forget: only a refusal by the sink is reported.
    pub fn send_pong(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.send_control(Frame::pong(payload))
    }

    fn send_control(&mut self, frame: Frame) -> Result<()> {
        let frame = self.check_control_frame(frame)?;
        debug!(op_code = ?frame.op_code(), len = frame.payload_len(), "send control frame");
        self.sink.send_frame(frame, Callback::noop(), self.batch_mode)
    }

    fn check_control_frame(&self, frame: Frame) -> Result<Frame> {
        if !frame.is_fin() {
            return Err(ProtocolError::FragmentedControlFrame(frame.op_code()).into());
        }
        let size = frame.payload_len();
        if size <= MAX_CONTROL_PAYLOAD {
            return Ok(frame);
        }
        match self.session.config().control_payload_policy {
            ControlPayloadPolicy::Reject => Err(ProtocolError::ControlFrameTooBig {
                size,
                max: MAX_CONTROL_PAYLOAD,
            }
            .into()),
            ControlPayloadPolicy::Truncate => {
                let op_code = frame.op_code();
                let payload = frame.into_payload().slice(..MAX_CONTROL_PAYLOAD);
                Ok(Frame::new(op_code, true, payload))
            }
        }
    }

    /// Encode `data` with its registered encoder and send the result.
    ///
    /// `callback` completes exactly once. `None` and values without an
    /// encoder fail with [`WsError::InvalidArgument`]; a failing encoder
    /// with [`WsError::Encode`]. Those two are also returned so the caller
    /// can react. A panicking encoder is reported to `callback` as
    /// [`WsError::Unexpected`] and logged, but not returned.
    ///
    /// Pass the value itself (`Some(&value)`), not a box around it: lookup
    /// uses the runtime type behind the reference.
    pub fn send_object(&mut self, data: Option<&dyn Any>, callback: Callback) -> Result<()> {
        match self.encode_object(data, &callback) {
            Ok(()) => Ok(()),
            Err(err) if err.is_declared() => {
                callback.failed(err.clone());
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "Unable to send object");
                callback.failed(err);
                Ok(())
            }
        }
    }

    /// [`send_object`](Self::send_object) with a future for the outcome.
    pub fn send_object_async(&mut self, data: &dyn Any) -> Completion {
        let (callback, completion) = Callback::channel();
        // The error also reaches the completion.
        let _ = self.send_object(Some(data), callback);
        completion
    }

    fn encode_object(&mut self, data: Option<&dyn Any>, callback: &Callback) -> Result<()> {
        let value = data.ok_or_else(|| WsError::invalid_argument("Cannot send null object"))?;

        let session = Arc::clone(&self.session);
        let registration = session
            .encoders()
            .lookup(value)
            .ok_or_else(|| WsError::invalid_argument("No encoder registered for object type"))?;
        let type_name = registration.type_name();
        debug!(type_name, shape = registration.encoder().shape(), "send_object()");

        match registration.encoder() {
            Encoder::Text(encode) => {
                let text = catch_panic(|| encode(value))?
                    .map_err(|e| encode_failure(e, type_name))?;
                self.send_frame(Frame::text(text), callback.clone(), self.batch_mode);
                Ok(())
            }
            Encoder::Binary(encode) => {
                let data = catch_panic(|| encode(value))?
                    .map_err(|e| encode_failure(e, type_name))?;
                self.send_frame(Frame::binary(data), callback.clone(), self.batch_mode);
                Ok(())
            }
            Encoder::TextStream(encode) => {
                let max = session.config().max_text_message_buffer_size;
                let mut writer = MessageWriter::new(self, max, Arc::clone(session.buffer_pool()));
                writer.set_callback(callback.clone());
                let result = catch_panic(|| encode(value, &mut writer))
                    .and_then(|r| r.map_err(|e| encode_failure(e, type_name)));
                if let Err(err) = &result {
                    writer.fail(err.clone());
                }
                writer.close();
                result
            }
            Encoder::BinaryStream(encode) => {
                let max = session.config().max_binary_message_buffer_size;
                let mut out =
                    MessageOutputStream::new(self, max, Arc::clone(session.buffer_pool()));
                out.set_callback(callback.clone());
                let result = catch_panic(|| encode(value, &mut out))
                    .and_then(|r| r.map_err(|e| encode_failure(e, type_name)));
                if let Err(err) = &result {
                    out.fail(err.clone());
                }
                out.close();
                result
            }
        }
    }

    /// Open a text stream adapter on this endpoint.
    ///
    /// The message is finished when the writer is closed or dropped, at
    /// which point `callback` completes.
    pub fn send_writer(&mut self, callback: Callback) -> MessageWriter<'_> {
        let max = self.session.config().max_text_message_buffer_size;
        let pool = Arc::clone(self.session.buffer_pool());
        let mut writer = MessageWriter::new(self, max, pool);
        writer.set_callback(callback);
        writer
    }

    /// Open a binary stream adapter on this endpoint.
    pub fn send_stream(&mut self, callback: Callback) -> MessageOutputStream<'_> {
        let max = self.session.config().max_binary_message_buffer_size;
        let pool = Arc::clone(self.session.buffer_pool());
        let mut out = MessageOutputStream::new(self, max, pool);
        out.set_callback(callback);
        out
    }

    /// Current batch mode.
    #[inline]
    pub fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    /// Change the batch mode.
    ///
    /// Going from `On` to `Off` flushes first. If that flush fails the mode
    /// stays `On` and the error is returned.
    pub async fn set_batch_mode(&mut self, mode: BatchMode) -> Result<()> {
        debug!(from = ?self.batch_mode, to = ?mode, "set_batch_mode()");
        if self.batch_mode == BatchMode::On && mode == BatchMode::Off {
            self.flush_batch().await?;
        }
        self.batch_mode = mode;
        Ok(())
    }

    /// Whether batching is on.
    #[inline]
    pub fn batching_allowed(&self) -> bool {
        self.batch_mode == BatchMode::On
    }

    /// Boolean view over [`set_batch_mode`](Self::set_batch_mode).
    pub async fn set_batching_allowed(&mut self, allowed: bool) -> Result<()> {
        let mode = if allowed { BatchMode::On } else { BatchMode::Off };
        self.set_batch_mode(mode).await
    }

    /// Write out everything the sink has buffered and wait for it.
    pub async fn flush_batch(&mut self) -> Result<()> {
        debug!("flush_batch()");
        let blocker = self.session.blocking().acquire().await?;
        if let Err(err) = self.sink.flush_batch(blocker.callback()) {
            blocker.callback().failed(err);
        }
        blocker.block().await
    }

    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        self.sink.idle_timeout()
    }

    #[inline]
    pub fn set_idle_timeout(&self, timeout: Duration) {
        self.sink.set_idle_timeout(timeout);
    }
}

impl std::fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("batch_mode", &self.batch_mode)
            .field("open_message_type", &self.guard.open_message_type())
            .finish()
    }
}

fn encode_failure(err: EncodeError, type_name: &'static str) -> WsError {
    match err.type_name() {
        Some(_) => err.into(),
        None => err.for_type(type_name).into(),
    }
}

fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "encoder panicked".to_string());
        WsError::Unexpected(detail)
    })
}
