//! Per-connection session state shared by the endpoint and its adapters.
//!
//! A [`Session`] carries the [`EndpointConfig`], the [`EncoderRegistry`],
//! a [`BufferPool`] for stream adapters, and a [`SharedBlocker`] used to turn
//! asynchronous flush completions into a blocking wait.
//!
//! # Example
//!
//! ```
//! use ws_outgoing::codec::JsonEncoder;
//! use ws_outgoing::{EndpointConfig, Session};
//!
//! let session = Session::builder()
//!     .config(EndpointConfig::default().with_max_text_message_buffer_size(4096))
//!     .register(|encoders| encoders.register_text::<Vec<u32>, _>(JsonEncoder))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(session.config().max_text_message_buffer_size, 4096);
//! assert!(session.encoders().contains::<Vec<u32>>());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::callback::{Callback, Completion};
use crate::encoder::EncoderRegistry;
use crate::error::{Result, WsError};
use crate::protocol::BufferPool;
use crate::sink::BatchMode;

/// Default stream adapter buffer size (32 KiB).
pub const DEFAULT_MESSAGE_BUFFER_SIZE: usize = 32 * 1024;

/// Default idle timeout applied to new endpoints, in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

/// What to do with a ping/pong payload larger than 125 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlPayloadPolicy {
    /// Refuse the frame with a protocol error.
    #[default]
    Reject,
    /// Send only the first 125 bytes.
    Truncate,
}

/// Endpoint settings.
///
/// Deserializable so it can live in an application's config file; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Bytes a text stream adapter buffers before emitting a frame.
    pub max_text_message_buffer_size: usize,
    /// Bytes a binary stream adapter buffers before emitting a frame.
    pub max_binary_message_buffer_size: usize,
    /// Oversized control payload handling.
    pub control_payload_policy: ControlPayloadPolicy,
    /// Batch mode a new endpoint starts in.
    pub batch_mode: BatchMode,
    /// Idle timeout pushed to the sink when an endpoint is created.
    pub idle_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_text_message_buffer_size: DEFAULT_MESSAGE_BUFFER_SIZE,
            max_binary_message_buffer_size: DEFAULT_MESSAGE_BUFFER_SIZE,
            control_payload_policy: ControlPayloadPolicy::Reject,
            batch_mode: BatchMode::Off,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

impl EndpointConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| WsError::invalid_argument(format!("endpoint config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_text_message_buffer_size == 0 {
            return Err(WsError::invalid_argument(
                "max_text_message_buffer_size must be greater than zero",
            ));
        }
        if self.max_binary_message_buffer_size == 0 {
            return Err(WsError::invalid_argument(
                "max_binary_message_buffer_size must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Idle timeout as a `Duration`.
    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn with_max_text_message_buffer_size(mut self, size: usize) -> Self {
        self.max_text_message_buffer_size = size;
        self
    }

    pub fn with_max_binary_message_buffer_size(mut self, size: usize) -> Self {
        self.max_binary_message_buffer_size = size;
        self
    }

    pub fn with_control_payload_policy(mut self, policy: ControlPayloadPolicy) -> Self {
        self.control_payload_policy = policy;
        self
    }

    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }
}

/// Shared per-connection state.
#[derive(Debug)]
pub struct Session {
    config: EndpointConfig,
    encoders: EncoderRegistry,
    buffer_pool: Arc<BufferPool>,
    blocking: SharedBlocker,
}

impl Session {
    /// Start building a session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Session with default config and the given encoders.
    pub fn new(encoders: EncoderRegistry) -> Arc<Self> {
        Arc::new(Self {
            config: EndpointConfig::default(),
            encoders,
            buffer_pool: Arc::new(BufferPool::default()),
            blocking: SharedBlocker::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    #[inline]
    pub fn encoders(&self) -> &EncoderRegistry {
        &self.encoders
    }

    #[inline]
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Blocker used by flush.
    #[inline]
    pub fn blocking(&self) -> &SharedBlocker {
        &self.blocking
    }
}

/// Builder for [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: EndpointConfig,
    encoders: EncoderRegistry,
    buffer_pool: Option<Arc<BufferPool>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    pub fn encoders(mut self, encoders: EncoderRegistry) -> Self {
        self.encoders = encoders;
        self
    }

    /// Register encoders in place.
    pub fn register<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut EncoderRegistry),
    {
        f(&mut self.encoders);
        self
    }

    /// Share a buffer pool across sessions.
    pub fn buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.buffer_pool = Some(pool);
        self
    }

    /// Validate the config and build.
    pub fn build(self) -> Result<Arc<Session>> {
        self.config.validate()?;
        Ok(Arc::new(Session {
            config: self.config,
            encoders: self.encoders,
            buffer_pool: self.buffer_pool.unwrap_or_default(),
            blocking: SharedBlocker::new(),
        }))
    }
}

/// Serializes blocking waits on asynchronous completions.
///
/// At most one [`Blocker`] exists at a time; [`acquire`](Self::acquire)
/// waits for the previous one to be dropped.
#[derive(Debug, Clone)]
pub struct SharedBlocker {
    semaphore: Arc<Semaphore>,
    released: Arc<AtomicUsize>,
}

impl SharedBlocker {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for exclusive use and return a fresh blocker.
    pub async fn acquire(&self) -> Result<Blocker> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| WsError::ConnectionClosed)?;
        let (callback, completion) = Callback::channel();
        Ok(Blocker {
            callback,
            completion,
            released: Arc::clone(&self.released),
            _permit: permit,
        })
    }

    /// No blocker is currently held.
    pub fn is_idle(&self) -> bool {
        self.semaphore.available_permits() == 1
    }

    /// How many blockers have finished waiting.
    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }
}

impl Default for SharedBlocker {
    fn default() -> Self {
        Self::new()
    }
}

/// One blocking wait. Releases the [`SharedBlocker`] when dropped, on every
/// exit path.
#[derive(Debug)]
pub struct Blocker {
    callback: Callback,
    completion: Completion,
    released: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Blocker {
    /// Callback whose completion ends [`block`](Self::block).
    pub fn callback(&self) -> Callback {
        self.callback.clone()
    }

    /// Wait until the callback completes and return its outcome.
    pub async fn block(self) -> Result<()> {
        let Blocker {
            callback,
            completion,
            released,
            _permit,
        } = self;
        drop(callback);
        let result = completion.await;
        released.fetch_add(1, Ordering::AcqRel);
        result
    }
}
