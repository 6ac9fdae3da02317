//! Frame sink - the seam between the endpoint and the connection.
//!
//! The endpoint never touches sockets. It hands each frame to a
//! [`FrameSink`] together with a completion [`Callback`] and a
//! [`BatchMode`] hint. The sink writes (or buffers) the bytes and completes
//! the callback exactly once, from whatever task it runs on.
//!
//! [`WriterHandle`] is the bundled implementation: a dedicated writer task
//! over any `AsyncWrite`, see [`spawn_writer_task`].

mod writer;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::callback::Callback;
use crate::error::Result;
use crate::protocol::Frame;

pub use writer::{
    spawn_writer_task, spawn_writer_task_default, Role, WriterConfig, WriterHandle,
    DEFAULT_AUTO_BATCH_BYTES, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_BATCH_BYTES,
    DEFAULT_MAX_PENDING_FRAMES,
};

/// Whether frames are written through or buffered before transmission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// Write each frame immediately.
    #[default]
    Off,
    /// Buffer frames until an explicit flush.
    On,
    /// Let the sink decide.
    Auto,
}

/// Destination for outgoing frames.
///
/// Implementations must complete every callback they accept exactly once.
/// Returning `Err` means the request was refused before being queued; the
/// caller then owns failure delivery (completing an already completed
/// [`Callback`] is a no-op, so either side may do it).
pub trait FrameSink: Send + Sync {
    /// Queue a frame for writing.
    fn send_frame(&self, frame: Frame, callback: Callback, batch_mode: BatchMode) -> Result<()>;

    /// Write out anything buffered, then complete `callback`.
    fn flush_batch(&self, callback: Callback) -> Result<()>;

    /// Connection idle timeout.
    fn idle_timeout(&self) -> Duration;

    /// Change the connection idle timeout.
    fn set_idle_timeout(&self, timeout: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_mode_default_is_off() {
        assert_eq!(BatchMode::default(), BatchMode::Off);
    }

    #[test]
    fn test_batch_mode_serde_names() {
        assert_eq!(serde_json::to_string(&BatchMode::Auto).unwrap(), "\"auto\"");
        let mode: BatchMode = serde_json::from_str("\"on\"").unwrap();
        assert_eq!(mode, BatchMode::On);
    }
}
