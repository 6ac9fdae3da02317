//! Dedicated writer task implementing [`FrameSink`].
//!
//! Frames are sent to the task over an mpsc channel together with their
//! callbacks, so senders never hold a lock on the socket and the task can
//! coalesce several frames into a single vectored write.
//!
//! # Architecture
//!
//! ```text
//! Endpoint ─► WriterHandle::send_frame ─► mpsc ─► Writer Task ─► AsyncWrite
//!                                                  │
//!                                                  └─► callbacks completed after write
//! ```
//!
//! # Batching
//!
//! - [`BatchMode::Off`]: the frame (and anything buffered before it) is
//!   written and flushed right away.
//! - [`BatchMode::On`]: frames stay buffered until `flush_batch`, or until
//!   `max_batch_bytes` is exceeded.
//! - [`BatchMode::Auto`]: frames already waiting in the channel are drained
//!   and written together; large batches go out once they reach
//!   `auto_batch_bytes`.

use std::io::IoSlice;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{BatchMode, FrameSink};
use crate::callback::Callback;
use crate::error::{Result, WsError};
use crate::protocol::{apply_mask, encode_header, EncodedHeader, Frame};

/// Default maximum pending commands before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default byte threshold at which an automatic batch is written out.
pub const DEFAULT_AUTO_BATCH_BYTES: usize = 16 * 1024;

/// Default upper bound on bytes held while batching is on.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 4 * 1024 * 1024;

/// Default connection idle timeout.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum commands drained from the channel in one pass.
const MAX_DRAIN: usize = 64;

/// Which side of the connection we are. Clients mask every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    /// Frames are sent unmasked.
    #[default]
    Server,
    /// Frames are masked with a fresh key each.
    Client,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending commands before sends are refused.
    pub max_pending_frames: usize,
    /// Channel capacity for the command queue.
    pub channel_capacity: usize,
    /// Buffered bytes that trigger a write in auto mode.
    pub auto_batch_bytes: usize,
    /// Buffered bytes that force a write even when batching is on.
    pub max_batch_bytes: usize,
    /// Masking behaviour.
    pub role: Role,
    /// Initial idle timeout reported by the sink.
    pub idle_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            auto_batch_bytes: DEFAULT_AUTO_BATCH_BYTES,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            role: Role::Server,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Work item for the writer task.
enum WriterCommand {
    Frame {
        frame: Frame,
        callback: Callback,
        batch_mode: BatchMode,
    },
    Flush(Callback),
}

impl WriterCommand {
    fn fail(self, err: WsError) {
        match self {
            WriterCommand::Frame { callback, .. } | WriterCommand::Flush(callback) => {
                callback.failed(err)
            }
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and implements [`FrameSink`].
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for commands.
    tx: mpsc::Sender<WriterCommand>,
    /// Pending command count (for backpressure).
    pending: Arc<AtomicUsize>,
    /// Maximum pending commands.
    max_pending: usize,
    /// Idle timeout in milliseconds.
    idle_timeout_ms: Arc<AtomicU64>,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<WriterCommand>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            idle_timeout_ms: Arc::new(AtomicU64::new(idle_timeout.as_millis() as u64)),
        }
    }

    /// Queue a command without waiting.
    fn enqueue(&self, command: WriterCommand) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(WsError::Backpressure);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(command).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => WsError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => WsError::ConnectionClosed,
            }
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending command count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl FrameSink for WriterHandle {
    fn send_frame(&self, frame: Frame, callback: Callback, batch_mode: BatchMode) -> Result<()> {
        self.enqueue(WriterCommand::Frame {
            frame,
            callback,
            batch_mode,
        })
    }

    fn flush_batch(&self, callback: Callback) -> Result<()> {
        self.enqueue(WriterCommand::Flush(callback))
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.load(Ordering::Acquire))
    }

    fn set_idle_timeout(&self, timeout: Duration) {
        self.idle_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Release);
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)`. The task ends cleanly once every
/// handle is dropped, or with an error if the output fails; in the latter
/// case every queued callback is failed before the task exits.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.idle_timeout,
    );

    let task = WriterTask::new(writer, config, pending);
    let join = tokio::spawn(task.run(rx));

    (handle, join)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// A frame encoded and ready for the wire.
#[derive(Debug)]
struct OutboundFrame {
    header: EncodedHeader,
    payload: Bytes,
}

impl OutboundFrame {
    fn encode(frame: Frame, mask: Option<[u8; 4]>) -> Self {
        let header = encode_header(&frame, mask);
        let payload = match mask {
            Some(key) if frame.payload_len() > 0 => {
                let mut data = frame.payload().to_vec();
                apply_mask(&mut data, key);
                Bytes::from(data)
            }
            _ => frame.into_payload(),
        };
        Self { header, payload }
    }

    #[inline]
    fn size(&self) -> usize {
        self.header.len() + self.payload.len()
    }
}

/// Encoded frames waiting to be written, with their callbacks.
#[derive(Default)]
struct PendingWrites {
    frames: Vec<OutboundFrame>,
    callbacks: Vec<Callback>,
    bytes: usize,
}

impl PendingWrites {
    fn push(&mut self, frame: OutboundFrame, callback: Callback) {
        self.bytes += frame.size();
        self.frames.push(frame);
        self.callbacks.push(callback);
    }

    /// Write everything buffered and complete the callbacks.
    async fn write_out<W>(&mut self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.frames.is_empty() {
            return Ok(());
        }

        let frames = std::mem::take(&mut self.frames);
        let callbacks = std::mem::take(&mut self.callbacks);
        self.bytes = 0;

        let result = write_batch(writer, &frames).await;
        match &result {
            Ok(()) => callbacks.iter().for_each(Callback::succeeded),
            Err(e) => callbacks.iter().for_each(|cb| cb.failed(e.clone())),
        }
        result
    }
}

struct WriterTask<W> {
    writer: W,
    config: WriterConfig,
    pending: Arc<AtomicUsize>,
    writes: PendingWrites,
    mask_frames: bool,
    auto_due: bool,
}

impl<W> WriterTask<W>
where
    W: AsyncWrite + Unpin,
{
    fn new(writer: W, config: WriterConfig, pending: Arc<AtomicUsize>) -> Self {
        let mask_frames = config.role == Role::Client;
        Self {
            writer,
            config,
            pending,
            writes: PendingWrites::default(),
            mask_frames,
            auto_due: false,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<WriterCommand>) -> Result<()> {
        let result = self.writer_loop(&mut rx).await;

        if let Err(e) = &result {
            tracing::error!("Writer task failed: {}", e);
            rx.close();
            while let Some(command) = rx.recv().await {
                command.fail(WsError::ConnectionClosed);
            }
        }

        result
    }

    /// Main loop - receives commands and writes frames to the output.
    async fn writer_loop(&mut self, rx: &mut mpsc::Receiver<WriterCommand>) -> Result<()> {
        loop {
            let first = match rx.recv().await {
                Some(c) => c,
                None => {
                    // Channel closed: write what is left and stop
                    return self.writes.write_out(&mut self.writer).await;
                }
            };

            // Process the first command plus whatever is already queued
            let mut drained = 1;
            let mut next = Some(first);
            while let Some(command) = next {
                self.process(command).await?;
                next = if drained < MAX_DRAIN {
                    rx.try_recv().ok()
                } else {
                    None
                };
                if next.is_some() {
                    drained += 1;
                }
            }

            if self.auto_due {
                self.auto_due = false;
                self.writes.write_out(&mut self.writer).await?;
            }

            self.pending.fetch_sub(drained, Ordering::Release);
        }
    }

    async fn process(&mut self, command: WriterCommand) -> Result<()> {
        match command {
            WriterCommand::Frame {
                frame,
                callback,
                batch_mode,
            } => {
                let mask = self.mask_frames.then(rand::random::<[u8; 4]>);
                self.writes.push(OutboundFrame::encode(frame, mask), callback);

                let write_now = match batch_mode {
                    BatchMode::Off => true,
                    BatchMode::On => self.writes.bytes >= self.config.max_batch_bytes,
                    BatchMode::Auto => {
                        self.auto_due = true;
                        self.writes.bytes >= self.config.auto_batch_bytes
                    }
                };
                if write_now {
                    self.auto_due = false;
                    self.writes.write_out(&mut self.writer).await?;
                }
                Ok(())
            }
            WriterCommand::Flush(callback) => {
                self.auto_due = false;
                match self.writes.write_out(&mut self.writer).await {
                    Ok(()) => match self.writer.flush().await {
                        Ok(()) => {
                            callback.succeeded();
                            Ok(())
                        }
                        Err(e) => {
                            let err = WsError::from(e);
                            callback.failed(err.clone());
                            Err(err)
                        }
                    },
                    Err(e) => {
                        callback.failed(e.clone());
                        Err(e)
                    }
                }
            }
        }
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    // Each frame contributes 1-2 slices (header, optionally payload)
    let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(batch.len() * 2);
    for frame in batch {
        slices.push(IoSlice::new(frame.header.as_bytes()));
        if !frame.payload.is_empty() {
            slices.push(IoSlice::new(&frame.payload));
        }
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();

    // Fast path: single write_vectored call
    let written = writer.write_vectored(&slices).await?;
    if written == total_size {
        writer.flush().await?;
        return Ok(());
    }

    if written == 0 {
        return Err(write_zero());
    }

    // Slow path: partial write, continue with remaining data
    let mut total_written = written;
    while total_written < total_size {
        let remaining_slices = build_remaining_slices(batch, total_written);
        if remaining_slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&remaining_slices).await?;
        if written == 0 {
            return Err(write_zero());
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

fn write_zero() -> WsError {
    WsError::from(std::io::Error::new(
        std::io::ErrorKind::WriteZero,
        "write_vectored returned 0",
    ))
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut skipped = 0;

    for frame in batch {
        let header = frame.header.as_bytes();
        let header_start = skipped;
        let header_end = skipped + header.len();

        if skip_bytes < header_end {
            let start_in_header = skip_bytes.saturating_sub(header_start);
            slices.push(IoSlice::new(&header[start_in_header..]));
        }
        skipped = header_end;

        if !frame.payload.is_empty() {
            let payload_start = skipped;
            let payload_end = skipped + frame.payload.len();

            if skip_bytes < payload_end {
                let start_in_payload = skip_bytes.saturating_sub(payload_start);
                slices.push(IoSlice::new(&frame.payload[start_in_payload..]));
            }
            skipped = payload_end;
        }
    }

    slices
}
