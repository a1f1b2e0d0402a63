// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use super::*;
use yare::parameterized;

#[test]
fn hello_without_history_omits_optional_fields() {
    let hello = ClientFrame::watch(None, None);

    let encoded = encode(&hello).expect("encode failed");
    let json: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

    assert_eq!(json, serde_json::json!({ "type": "Hello" }));
}

#[test]
fn hello_accepts_missing_fields() {
    let decoded: ClientFrame = decode(br#"{"type":"Hello"}"#).expect("decode failed");
    assert_eq!(decoded, ClientFrame::watch(None, None));
}

#[test]
fn unsubscribed_hello_wire_shape() {
    let json: serde_json::Value =
        serde_json::from_slice(&encode(&ClientFrame::unsubscribed()).unwrap()).unwrap();
    assert_eq!(json, serde_json::json!({ "type": "Hello", "subscribe": false }));
}

#[test]
fn submit_wire_shape() {
    let decoded: ClientFrame =
        decode(br#"{"type":"Submit","token":"tok-1","content":"hello"}"#).expect("decode failed");

    assert_eq!(
        decoded,
        ClientFrame::Submit {
            token: "tok-1".into(),
            content: "hello".to_string(),
        }
    );
}

#[test]
fn message_frame_wire_shape() {
    let frame = ServerFrame::Message {
        id: MessageId::new(6),
        content: "hi".to_string(),
    };

    let json: serde_json::Value = serde_json::from_slice(&encode(&frame).unwrap()).unwrap();

    assert_eq!(
        json,
        serde_json::json!({ "type": "Message", "id": 6, "content": "hi" })
    );
}

#[parameterized(
    unknown_type = { br#"{"type":"JoinRoom","room":"a"}"# },
    missing_type = { br#"{"token":"t","content":"c"}"# },
    submit_without_token = { br#"{"type":"Submit","content":"c"}"# },
    negative_id = { br#"{"type":"Hello","last_seen_id":-1}"# },
    not_json = { b"hello" },
)]
fn malformed_client_frames_are_violations(bytes: &[u8]) {
    let err = decode::<ClientFrame>(bytes).unwrap_err();
    assert!(err.is_violation());
}

#[test]
fn transport_errors_are_not_violations() {
    assert!(!ProtocolError::ConnectionClosed.is_violation());
    assert!(!ProtocolError::Timeout.is_violation());
}

#[tokio::test]
async fn write_message_adds_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data)
        .await
        .expect("write failed");

    // First 4 bytes are the length prefix
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;

    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn frames_stream_back_to_back() {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &ClientFrame::Ping).await.unwrap();
    write_frame(&mut buffer, &ClientFrame::Status).await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let first: ClientFrame = read_frame(&mut cursor, 1024).await.unwrap();
    let second: ClientFrame = read_frame(&mut cursor, 1024).await.unwrap();

    assert_eq!(first, ClientFrame::Ping);
    assert_eq!(second, ClientFrame::Status);
    assert!(matches!(
        read_frame::<_, ClientFrame>(&mut cursor, 1024).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn oversized_frame_is_rejected_before_reading_body() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, &[b'x'; 64]).await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor, 16).await.unwrap_err();

    assert!(matches!(err, ProtocolError::FrameTooLarge { len: 64, max: 16 }));
    assert!(err.is_violation());
}

#[tokio::test]
async fn truncated_body_is_connection_closed() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, b"hello world").await.unwrap();
    buffer.truncate(8);

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor, 1024).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn read_frame_timeout_expires() {
    let (_client, mut server) = tokio::io::duplex(64);

    let result: Result<ClientFrame, _> =
        read_frame_timeout(&mut server, 1024, Duration::from_millis(20)).await;

    assert!(matches!(result, Err(ProtocolError::Timeout)));
}
