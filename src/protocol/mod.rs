//! Protocol module - frames, opcodes, wire encoding and buffers.
//!
//! This module covers the pieces of RFC 6455 the send side needs:
//! - Frame struct with opcode, final flag and payload
//! - Header encoding (length forms, masking)
//! - Shared buffer pool for streamed messages

mod buffer_pool;
mod frame;
mod wire_format;

pub use buffer_pool::{BufferPool, DEFAULT_POOL_SIZE};
pub use frame::{Frame, MessageType, OpCode};
pub use wire_format::{
    apply_mask, encode_header, EncodedHeader, MAX_CONTROL_PAYLOAD, MAX_HEADER_SIZE,
};
