//! Buffer-and-emit core shared by both stream adapters.

use std::sync::{Arc, Mutex};

use bytes::BytesMut;

use crate::callback::Callback;
use crate::endpoint::{Dispatched, RemoteEndpoint};
use crate::error::{Result, WsError};
use crate::protocol::{BufferPool, Frame, MessageType, OpCode};

/// First failure seen by any frame of one streamed message.
#[derive(Debug, Clone, Default)]
struct Outcome {
    failure: Arc<Mutex<Option<WsError>>>,
}

impl Outcome {
    fn record(&self, err: WsError) {
        let mut slot = self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn failure(&self) -> Option<WsError> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Callback for an intermediate frame: only failures matter.
    fn frame_callback(&self) -> Callback {
        let outcome = self.clone();
        Callback::new(move |result| {
            if let Err(err) = result {
                outcome.record(err);
            }
        })
    }

    /// Callback for the final frame: reports the first failure of the
    /// message, or the final frame's own outcome.
    fn final_callback(&self, user: Callback) -> Callback {
        let outcome = self.clone();
        Callback::new(move |result| match outcome.failure() {
            Some(err) => user.failed(err),
            None => user.complete(result),
        })
    }
}

pub(crate) struct FrameEmitter<'a> {
    endpoint: &'a mut RemoteEndpoint,
    message_type: MessageType,
    buffer: BytesMut,
    max_buffer_size: usize,
    pool: Arc<BufferPool>,
    callback: Callback,
    outcome: Outcome,
    frames_sent: usize,
    refused: bool,
    closed: bool,
}

impl<'a> FrameEmitter<'a> {
    pub(crate) fn new(
        endpoint: &'a mut RemoteEndpoint,
        message_type: MessageType,
        max_buffer_size: usize,
        pool: Arc<BufferPool>,
    ) -> Self {
        let max_buffer_size = max_buffer_size.max(1);
        let buffer = pool.acquire(max_buffer_size);
        Self {
            endpoint,
            message_type,
            buffer,
            max_buffer_size,
            pool,
            callback: Callback::noop(),
            outcome: Outcome::default(),
            frames_sent: 0,
            refused: false,
            closed: false,
        }
    }

    pub(crate) fn set_callback(&mut self, callback: Callback) {
        self.callback = callback;
    }

    pub(crate) fn fail(&mut self, err: WsError) {
        self.outcome.record(err);
    }

    pub(crate) fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn write(&mut self, mut data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(WsError::invalid_argument("Stream is closed"));
        }
        if let Some(err) = self.outcome.failure() {
            return Err(err);
        }
        while !data.is_empty() {
            let room = self.max_buffer_size - self.buffer.len();
            let (head, tail) = data.split_at(room.min(data.len()));
            self.buffer.extend_from_slice(head);
            data = tail;
            if self.buffer.len() >= self.max_buffer_size {
                self.emit(false)?;
            }
        }
        Ok(())
    }

    /// Emit whatever is buffered as a non-final frame.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(WsError::invalid_argument("Stream is closed"));
        }
        if !self.buffer.is_empty() {
            self.emit(false)?;
        }
        Ok(())
    }

    fn emit(&mut self, fin: bool) -> Result<()> {
        let op_code = if self.frames_sent == 0 {
            self.message_type.op_code()
        } else {
            OpCode::Continuation
        };
        let frame = Frame::new(op_code, fin, self.buffer.split().freeze());
        let callback = if fin {
            self.outcome.final_callback(self.callback.clone())
        } else {
            self.outcome.frame_callback()
        };
        let batch_mode = self.endpoint.batch_mode();
        match self.endpoint.dispatch(frame, callback, batch_mode) {
            Dispatched::Accepted => self.frames_sent += 1,
            Dispatched::Rejected => self.refused = true,
            // The guard opened for a frame that never went out.
            Dispatched::Refused if !fin && self.frames_sent == 0 => {
                self.endpoint.abandon_message();
            }
            Dispatched::Refused => {}
        }
        match self.outcome.failure() {
            Some(err) if !fin => Err(err),
            _ => Ok(()),
        }
    }

    /// Finish the message and complete the callback. Idempotent.
    ///
    /// Normally the buffered remainder goes out as the final frame. After a
    /// failure, a final empty frame is still sent if an earlier frame of this
    /// message reached the sink, so the connection is not left mid-message.
    /// Nothing is sent when the guard refused a frame of this message, or
    /// when no frame was accepted by the sink before the failure.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match self.outcome.failure() {
            None if !self.refused => {
                let _ = self.emit(true);
            }
            Some(_) if !self.refused && self.frames_sent > 0 => {
                self.buffer.clear();
                let _ = self.emit(true);
            }
            failure => {
                let err = failure
                    .unwrap_or_else(|| WsError::invalid_argument("Stream frame was refused"));
                self.callback.failed(err);
            }
        }

        let buffer = std::mem::take(&mut self.buffer);
        self.pool.release(buffer);
    }
}

impl Drop for FrameEmitter<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
