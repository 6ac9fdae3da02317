//! Integration tests for ws-outgoing.
//!
//! These drive a `RemoteEndpoint` through the bundled writer task and read
//! the resulting frames back off the other end of an in-memory pipe.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::time::timeout;

use ws_outgoing::codec::{JsonEncoder, MsgPackEncoder};
use ws_outgoing::sink::{spawn_writer_task, spawn_writer_task_default, Role, WriterConfig};
use ws_outgoing::{
    BatchMode, Callback, EndpointConfig, ErrorKind, MessageType, RemoteEndpoint, Session,
};

const TEXT: u8 = 0x1;
const BINARY: u8 = 0x2;
const CONTINUATION: u8 = 0x0;
const PING: u8 = 0x9;

#[derive(Debug)]
struct WireFrame {
    fin: bool,
    opcode: u8,
    masked: bool,
    payload: Vec<u8>,
}

/// Read one frame off the wire, unmasking if needed.
async fn read_frame(rd: &mut DuplexStream) -> WireFrame {
    let mut head = [0u8; 2];
    rd.read_exact(&mut head).await.unwrap();
    let fin = head[0] & 0x80 != 0;
    let opcode = head[0] & 0x0F;
    let masked = head[1] & 0x80 != 0;
    let len = match head[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            rd.read_exact(&mut ext).await.unwrap();
            u16::from_be_bytes(ext) as usize
        }
        127 => {
            let mut ext = [0u8; 8];
            rd.read_exact(&mut ext).await.unwrap();
            u64::from_be_bytes(ext) as usize
        }
        n => n as usize,
    };
    let mask = if masked {
        let mut key = [0u8; 4];
        rd.read_exact(&mut key).await.unwrap();
        Some(key)
    } else {
        None
    };
    let mut payload = vec![0u8; len];
    rd.read_exact(&mut payload).await.unwrap();
    if let Some(key) = mask {
        for (i, b) in payload.iter_mut().enumerate() {
            *b ^= key[i % 4];
        }
    }
    WireFrame {
        fin,
        opcode,
        masked,
        payload,
    }
}

/// Read frames until one has FIN set.
async fn read_message(rd: &mut DuplexStream) -> Vec<WireFrame> {
    let mut frames = Vec::new();
    loop {
        let frame = read_frame(rd).await;
        let fin = frame.fin;
        frames.push(frame);
        if fin {
            return frames;
        }
    }
}

async fn assert_quiet(rd: &mut DuplexStream) {
    let mut byte = [0u8; 1];
    assert!(
        timeout(Duration::from_millis(50), rd.read(&mut byte))
            .await
            .is_err(),
        "nothing should be written yet"
    );
}

#[derive(Serialize, PartialEq, Debug)]
struct Reading {
    sensor: String,
    values: Vec<u32>,
}

fn reading() -> Reading {
    Reading {
        sensor: "thermo-1".to_string(),
        values: (0..20).collect(),
    }
}

fn endpoint_over(config: EndpointConfig, rd_capacity: usize) -> (RemoteEndpoint, DuplexStream) {
    let (writer, reader) = tokio::io::duplex(rd_capacity);
    let session = Session::builder()
        .config(config)
        .register(|encoders| {
            encoders.register_text::<Reading, _>(JsonEncoder);
            encoders.register_binary_stream::<Vec<Reading>, _>(MsgPackEncoder);
        })
        .build()
        .unwrap();
    let (sink, _task) = spawn_writer_task_default(writer);
    (RemoteEndpoint::new(session, Arc::new(sink)), reader)
}

/// A JSON-encoded object arrives as one final TEXT frame.
#[tokio::test]
async fn test_json_object_on_wire() {
    let (mut endpoint, mut reader) = endpoint_over(EndpointConfig::default(), 64 * 1024);

    endpoint.send_object_async(&reading()).await.unwrap();

    let frame = read_frame(&mut reader).await;
    assert!(frame.fin);
    assert_eq!(frame.opcode, TEXT);
    assert!(!frame.masked);
    assert_eq!(frame.payload, serde_json::to_vec(&reading()).unwrap());
}

/// A streamed MsgPack value is split at the buffer size into BINARY then
/// CONTINUATION frames.
#[tokio::test]
async fn test_msgpack_stream_fragments_on_wire() {
    let config = EndpointConfig::default().with_max_binary_message_buffer_size(16);
    let (mut endpoint, mut reader) = endpoint_over(config, 64 * 1024);
    let value = vec![reading(), reading()];

    endpoint.send_object_async(&value).await.unwrap();

    let frames = read_message(&mut reader).await;
    assert!(frames.len() > 2);
    assert_eq!(frames[0].opcode, BINARY);
    assert!(frames[1..].iter().all(|f| f.opcode == CONTINUATION));
    assert!(frames[..frames.len() - 1]
        .iter()
        .all(|f| !f.fin && f.payload.len() == 16));

    let joined: Vec<u8> = frames.into_iter().flat_map(|f| f.payload).collect();
    assert_eq!(joined, rmp_serde::to_vec_named(&value).unwrap());
    assert_eq!(endpoint.open_message_type(), None);
}

/// With batching on nothing is written until batching is turned off.
#[tokio::test]
async fn test_batch_mode_off_flushes_buffered_frames() {
    let (mut endpoint, mut reader) = endpoint_over(EndpointConfig::default(), 64 * 1024);
    endpoint.set_batch_mode(BatchMode::On).await.unwrap();

    let first = endpoint.send_text_async("one");
    let second = endpoint.send_binary_async(&b"two"[..]);
    assert_quiet(&mut reader).await;

    endpoint.set_batch_mode(BatchMode::Off).await.unwrap();
    first.await.unwrap();
    second.await.unwrap();

    let one = read_frame(&mut reader).await;
    let two = read_frame(&mut reader).await;
    assert_eq!((one.opcode, one.payload.as_slice()), (TEXT, &b"one"[..]));
    assert_eq!((two.opcode, two.payload.as_slice()), (BINARY, &b"two"[..]));
}

/// An explicit flush writes out the batch and waits for it.
#[tokio::test]
async fn test_explicit_flush() {
    let config = EndpointConfig::default().with_batch_mode(BatchMode::On);
    let (mut endpoint, mut reader) = endpoint_over(config, 64 * 1024);
    assert!(endpoint.batching_allowed());

    endpoint.send_text("buffered", Callback::noop());
    assert_quiet(&mut reader).await;

    endpoint.flush_batch().await.unwrap();
    let frame = read_frame(&mut reader).await;
    assert_eq!(frame.payload, b"buffered");
    assert!(endpoint.session().blocking().is_idle());
}

/// Control frames may sit between the fragments of a message.
#[tokio::test]
async fn test_ping_between_fragments() {
    let (mut endpoint, mut reader) = endpoint_over(EndpointConfig::default(), 64 * 1024);

    endpoint.send_partial_text("hel", false, Callback::noop());
    endpoint.send_ping(&b"are you there"[..]).unwrap();
    assert_eq!(endpoint.open_message_type(), Some(MessageType::Text));
    let (callback, done) = Callback::channel();
    endpoint.send_partial_text("lo", true, callback);
    done.await.unwrap();

    let frames = [
        read_frame(&mut reader).await,
        read_frame(&mut reader).await,
        read_frame(&mut reader).await,
    ];
    assert_eq!((frames[0].opcode, frames[0].fin), (TEXT, false));
    assert_eq!((frames[1].opcode, frames[1].fin), (PING, true));
    assert_eq!(frames[1].payload, b"are you there");
    assert_eq!((frames[2].opcode, frames[2].fin), (CONTINUATION, true));
}

/// Clients mask every frame with a fresh key.
#[tokio::test]
async fn test_client_role_masks_frames() {
    let (writer, mut reader) = tokio::io::duplex(4096);
    let config = WriterConfig {
        role: Role::Client,
        ..Default::default()
    };
    let (sink, _task) = spawn_writer_task(writer, config);
    let mut endpoint = RemoteEndpoint::new(Session::builder().build().unwrap(), Arc::new(sink));

    endpoint.send_binary_async(vec![1u8, 2, 3, 4, 5]).await.unwrap();

    let frame = read_frame(&mut reader).await;
    assert!(frame.masked);
    assert_eq!(frame.payload, vec![1, 2, 3, 4, 5]);
}

/// A failed write reaches the callback as a transport error and the
/// endpoint is ready for the next message.
#[tokio::test]
async fn test_write_failure_resets_message_state() {
    let (mut endpoint, reader) = endpoint_over(EndpointConfig::default(), 1024);
    drop(reader);

    endpoint.send_partial_binary(vec![0u8; 8], false, Callback::noop());
    assert_eq!(endpoint.open_message_type(), Some(MessageType::Binary));

    let (callback, done) = Callback::channel();
    endpoint.send_partial_binary(vec![0u8; 8], true, callback);
    assert_eq!(endpoint.open_message_type(), None);
    assert_eq!(done.await.unwrap_err().kind(), ErrorKind::Transport);

    let result = endpoint.send_text_async("after").await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
    assert_eq!(endpoint.open_message_type(), None);
}

/// Endpoints shared through a mutex never interleave streamed messages.
#[tokio::test]
async fn test_shared_endpoint_keeps_messages_whole() {
    let config = EndpointConfig::default().with_max_text_message_buffer_size(4);
    let (endpoint, mut reader) = endpoint_over(config, 64 * 1024);
    let shared = Arc::new(tokio::sync::Mutex::new(endpoint));

    let mut tasks = Vec::new();
    for id in 0..2 {
        let shared = Arc::clone(&shared);
        tasks.push(tokio::spawn(async move {
            let (callback, done) = Callback::channel();
            {
                let mut endpoint = shared.lock().await;
                let mut writer = endpoint.send_writer(callback);
                write!(writer, "task-{}-payload", id).unwrap();
                writer.close();
            }
            done.await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let frames = read_message(&mut reader).await;
        assert_eq!(frames[0].opcode, TEXT);
        assert!(frames[1..].iter().all(|f| f.opcode == CONTINUATION));
        let body: Vec<u8> = frames.into_iter().flat_map(|f| f.payload).collect();
        bodies.push(String::from_utf8(body).unwrap());
    }
    bodies.sort();
    assert_eq!(bodies, vec!["task-0-payload", "task-1-payload"]);
}

/// The configured idle timeout is pushed down to the writer sink.
#[tokio::test]
async fn test_idle_timeout_reaches_sink() {
    let config = EndpointConfig::default().with_idle_timeout(Duration::from_secs(7));
    let (endpoint, _reader) = endpoint_over(config, 1024);
    assert_eq!(endpoint.idle_timeout(), Duration::from_secs(7));

    endpoint.set_idle_timeout(Duration::from_secs(1));
    assert_eq!(endpoint.idle_timeout(), Duration::from_secs(1));
}

/// Config loaded from JSON drives the endpoint.
#[tokio::test]
async fn test_config_from_json() {
    let config = EndpointConfig::from_json_str(
        r#"{ "batch_mode": "on", "max_text_message_buffer_size": 2 }"#,
    )
    .unwrap();
    let (mut endpoint, mut reader) = endpoint_over(config, 1024);
    assert_eq!(endpoint.batch_mode(), BatchMode::On);

    let (callback, done) = Callback::channel();
    {
        let mut writer = endpoint.send_writer(callback);
        writer.write_str("abc").unwrap();
    }
    endpoint.flush_batch().await.unwrap();
    done.await.unwrap();

    let frames = read_message(&mut reader).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload, b"ab");
    assert_eq!(frames[1].payload, b"c");
}
