//! Endpoint module - the send side of one connection.
//!
//! - [`MessageTypeGuard`] - keeps fragmented messages from interleaving
//! - [`RemoteEndpoint`] - send dispatcher, encoder fan-out, batch control

mod guard;
mod remote;

pub use guard::MessageTypeGuard;
pub(crate) use remote::Dispatched;
pub use remote::RemoteEndpoint;
