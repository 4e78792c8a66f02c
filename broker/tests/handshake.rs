// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use mqttd::{Broker, Config};

async fn start_broker() -> SocketAddr {
    let config = Config::default().with_port(0);
    let broker = Arc::new(Broker::new(&config));
    let listener = broker.bind(&config).await.expect("bind to an ephemeral port");
    let addr = listener.local_addr().expect("listener has a local address");
    tokio::spawn(broker.serve(listener));
    addr
}

async fn read_response(stream: &mut TcpStream, expected_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; expected_len];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("response arrived before the timeout")
        .expect("read the full response");
    buf
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_v3_1_1_connect_is_accepted() {
    let addr = start_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let connect = [
        0x10, 0x12, 0x00, 0x04, 0x4D, 0x51, 0x54, 0x54, 0x04, 0x02, 0x00, 0x3C, 0x00, 0x06, 0x74,
        0x65, 0x73, 0x74, 0x30, 0x31,
    ];
    stream.write_all(&connect).await.unwrap();

    let response = read_response(&mut stream, 4).await;
    assert_eq!(response, vec![0x20, 0x02, 0x00, 0x00]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_protocol_name_is_rejected() {
    let addr = start_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let connect = [
        0x10, 0x12, 0x00, 0x04, 0x4A, 0x55, 0x4E, 0x4B, 0x04, 0x02, 0x00, 0x3C, 0x00, 0x06, 0x74,
        0x65, 0x73, 0x74, 0x30, 0x31,
    ];
    stream.write_all(&connect).await.unwrap();

    let response = read_response(&mut stream, 4).await;
    assert_eq!(response, vec![0x20, 0x02, 0x00, 0x81]);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_id_too_short_is_rejected() {
    let addr = start_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let connect = [
        0x10, 0x0D, 0x00, 0x04, 0x4D, 0x51, 0x54, 0x54, 0x04, 0x02, 0x00, 0x3C, 0x00, 0x01, 0x78,
    ];
    stream.write_all(&connect).await.unwrap();

    let response = read_response(&mut stream, 4).await;
    assert_eq!(response, vec![0x20, 0x02, 0x00, 0x85]);
}

#[tokio::test(flavor = "multi_thread")]
async fn password_without_username_is_rejected() {
    let addr = start_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let connect = [
        0x10, 0x18, 0x00, 0x04, 0x4D, 0x51, 0x54, 0x54, 0x04, 0x42, 0x00, 0x3C, 0x00, 0x06, 0x74,
        0x65, 0x73, 0x74, 0x30, 0x31, 0x00, 0x04, 0x70, 0x61, 0x73, 0x73,
    ];
    stream.write_all(&connect).await.unwrap();

    let response = read_response(&mut stream, 4).await;
    assert_eq!(response, vec![0x20, 0x02, 0x00, 0x86]);
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribe_after_connect_returns_suback() {
    let addr = start_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let connect = [
        0x10, 0x12, 0x00, 0x04, 0x4D, 0x51, 0x54, 0x54, 0x04, 0x02, 0x00, 0x3C, 0x00, 0x06, 0x74,
        0x65, 0x73, 0x74, 0x30, 0x31,
    ];
    stream.write_all(&connect).await.unwrap();
    let connack = read_response(&mut stream, 4).await;
    assert_eq!(connack, vec![0x20, 0x02, 0x00, 0x00]);

    let subscribe = [
        0x82, 0x08, 0x00, 0x01, 0x00, 0x03, 0x61, 0x2F, 0x62, 0x00,
    ];
    stream.write_all(&subscribe).await.unwrap();

    let suback = read_response(&mut stream, 5).await;
    assert_eq!(suback, vec![0x90, 0x03, 0x00, 0x01, 0x00]);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_remaining_length_closes_the_connection_without_a_connack() {
    let addr = start_broker().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let garbage = [0x10, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
    stream.write_all(&garbage).await.unwrap();

    let mut buf = [0u8; 4];
    let result = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await;
    match result {
        Ok(Ok(0)) => {}
        Ok(Err(_)) => {}
        Ok(Ok(n)) => panic!("expected no CONNACK, got {n} bytes"),
        Err(_) => panic!("connection was not closed within the timeout"),
    }
}
