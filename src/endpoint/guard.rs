//! Message-type guard.
//!
//! Tracks which data message, if any, is partially sent. A fragmented
//! message is one TEXT or BINARY frame followed by CONTINUATION frames up to
//! and including a final one. Nothing else may be interleaved except control
//! frames, which never pass through the guard.
//!
//! | open     | TEXT        | BINARY      | CONTINUATION | other      |
//! |----------|-------------|-------------|--------------|------------|
//! | none     | open TEXT   | open BINARY | invalid      | invalid    |
//! | TEXT     | proceed     | in progress | proceed      | invalid    |
//! | BINARY   | in progress | proceed     | proceed      | invalid    |
//!
//! A rejection leaves the state untouched. Returning to none is the
//! dispatcher's job: it calls [`MessageTypeGuard::complete`] once a final
//! data frame has been handed to the sink.

use crate::error::ProtocolError;
use crate::protocol::{MessageType, OpCode};

/// State machine enforcing message framing on the send side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageTypeGuard {
    open: Option<MessageType>,
}

impl MessageTypeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type of the message currently in progress.
    #[inline]
    pub fn open_message_type(&self) -> Option<MessageType> {
        self.open
    }

    /// Validate a data frame opcode, committing the transition on success.
    pub fn check(&mut self, op_code: OpCode) -> Result<(), ProtocolError> {
        match (self.open, op_code) {
            (Some(_), OpCode::Continuation) => Ok(()),
            (open, op_code) => {
                let attempted = op_code
                    .message_type()
                    .ok_or(ProtocolError::InvalidDataOpCode(op_code))?;
                match open {
                    None => {
                        self.open = Some(attempted);
                        Ok(())
                    }
                    Some(open) if open == attempted => Ok(()),
                    Some(open) => Err(ProtocolError::MessageInProgress { open, attempted }),
                }
            }
        }
    }

    /// The final frame of the open message has been dispatched.
    #[inline]
    pub fn complete(&mut self) {
        self.open = None;
    }
}
