//! # ws-outgoing
//!
//! The sending half of a WebSocket endpoint.
//!
//! Application code hands text, bytes, control frames or arbitrary values
//! to a [`RemoteEndpoint`]; the endpoint enforces message framing, encodes
//! values with registered encoders and passes frames to a [`FrameSink`]
//! that owns the connection.
//!
//! ## Architecture
//!
//! - **Guard**: at most one fragmented message is open at a time
//! - **Dispatcher**: every send completes its [`Callback`] exactly once
//! - **Encoders**: text, binary and streaming shapes, looked up by type
//! - **Sink**: the bundled writer task batches frames onto any `AsyncWrite`
//!
//! ## Example
//!
//! ```ignore
//! use ws_outgoing::codec::JsonEncoder;
//! use ws_outgoing::sink::spawn_writer_task_default;
//! use ws_outgoing::{RemoteEndpoint, Session};
//!
//! #[tokio::main]
//! async fn main() -> ws_outgoing::Result<()> {
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:9001").await?;
//!     let (_, write_half) = stream.into_split();
//!
//!     let session = Session::builder()
//!         .register(|encoders| encoders.register_text::<Vec<String>, _>(JsonEncoder))
//!         .build()?;
//!     let (sink, _writer) = spawn_writer_task_default(write_half);
//!     let mut endpoint = RemoteEndpoint::new(session, std::sync::Arc::new(sink));
//!
//!     endpoint.send_text_async("hello").await?;
//!     let names = vec!["a".to_string(), "b".to_string()];
//!     endpoint.send_object_async(&names).await?;
//!     endpoint.send_ping(&b"are you there"[..])?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod encoder;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod stream;

mod callback;

pub use callback::{Callback, Completion};
pub use endpoint::RemoteEndpoint;
pub use error::{EncodeError, ErrorKind, ProtocolError, Result, WsError};
pub use protocol::{Frame, MessageType, OpCode};
pub use session::{ControlPayloadPolicy, EndpointConfig, Session};
pub use sink::{BatchMode, FrameSink};
