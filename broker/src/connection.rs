// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Per-connection read/dispatch/write loop.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use mqtt_codec::{
    CodecError, Command, ConnectAckPacket, ConnectPacket, PingResponsePacket, Reader,
    SubscribeAckPacket, SubscribePacket, Writer,
};

use crate::broker::Broker;
use crate::client::{Client, ClientId};
use crate::error::Error;

/// Accumulates bytes across TCP reads until a whole packet (fixed
/// header + remaining length + payload) is available, then hands
/// exactly that span to a fresh `Reader`. This is the persistent
/// input buffer the connection driver needs to survive a packet
/// fragmented across reads -- `Reader::start` itself still requires
/// the whole packet in one call.
struct InputBuffer {
    bytes: Vec<u8>,
}

impl InputBuffer {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Returns the length of the next complete packet at the front of
    /// the buffer, if one has fully arrived.
    fn next_packet_len(&self) -> Option<usize> {
        if self.bytes.len() < 2 {
            return None;
        }
        let mut multiplier: usize = 1;
        let mut value: usize = 0;
        let mut pos = 1usize;
        for _ in 0..4 {
            if pos >= self.bytes.len() {
                return None;
            }
            let byte = self.bytes[pos];
            pos += 1;
            value += usize::from(byte & 0x7F) * multiplier;
            if byte & 0x80 == 0 {
                let total = pos + value;
                return if self.bytes.len() >= total { Some(total) } else { None };
            }
            multiplier *= 128;
        }
        // A fifth continuation byte would be required -- let Reader
        // report InvalidRemainingLength on the malformed prefix.
        Some(pos)
    }

    fn take_packet(&mut self, len: usize) -> Vec<u8> {
        let rest = self.bytes.split_off(len);
        std::mem::replace(&mut self.bytes, rest)
    }
}

/// Drives one accepted connection until DISCONNECT, a zero-length
/// read, or a fatal codec/I/O error.
pub async fn run(broker: Arc<Broker>, mut stream: TcpStream, read_chunk_size: usize) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(err) => {
            log::warn!("Failed to read peer address: {err}");
            return;
        }
    };
    log::info!("Accepted connection from {peer_addr}");

    let mut input = InputBuffer::new();
    let mut chunk = vec![0u8; read_chunk_size];
    let mut client_id: Option<ClientId> = None;

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => {
                log::info!("{peer_addr} closed the connection");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                log::warn!("Read error from {peer_addr}: {err}");
                break;
            }
        };
        input.extend(&chunk[..n]);

        while let Some(packet_len) = input.next_packet_len() {
            let bytes = input.take_packet(packet_len);
            let mut reader = Reader::new(&bytes);
            let command = match frame_packet(&mut reader, bytes.len()) {
                Ok(cmd) => cmd,
                Err(err) => {
                    log::error!("{peer_addr}: framing error: {err}");
                    return_and_cleanup(&broker, client_id).await;
                    return;
                }
            };

            match command {
                Command::Connect => {
                    match handle_connect(&broker, &mut reader, peer_addr, &mut stream).await {
                        Ok(Some(id)) => client_id = Some(id),
                        Ok(None) => {
                            return_and_cleanup(&broker, client_id).await;
                            return;
                        }
                        Err(err) => {
                            log::warn!("{peer_addr}: failed writing CONNACK: {err}");
                            return_and_cleanup(&broker, client_id).await;
                            return;
                        }
                    }
                }
                Command::Subscribe => {
                    let Some(id) = client_id else {
                        log::warn!("{peer_addr}: SUBSCRIBE before CONNECT, closing");
                        return_and_cleanup(&broker, client_id).await;
                        return;
                    };
                    if let Err(err) = handle_subscribe(&broker, id, &mut reader, &mut stream).await
                    {
                        log::warn!("{peer_addr}: failed handling SUBSCRIBE: {err}");
                        return_and_cleanup(&broker, client_id).await;
                        return;
                    }
                }
                Command::PingRequest => {
                    if let Err(err) = handle_ping(&mut stream).await {
                        log::warn!("{peer_addr}: failed writing PINGRESP: {err}");
                        return_and_cleanup(&broker, client_id).await;
                        return;
                    }
                }
                Command::Disconnect => {
                    log::info!("{peer_addr}: received DISCONNECT");
                    return_and_cleanup(&broker, client_id).await;
                    return;
                }
                Command::Publish
                | Command::PublishReceived
                | Command::Unsubscribe => {
                    log::debug!("{peer_addr}: {command:?} not implemented, skipping");
                }
                other => {
                    log::debug!("{peer_addr}: ignoring unexpected command {other:?}");
                }
            }

            if let Some(id) = client_id {
                broker.touch_client(id).await;
            }
        }
    }

    return_and_cleanup(&broker, client_id).await;
}

/// Frames one packet's fixed header: spans the buffer, reads the
/// command nibble, and consumes the remaining-length field. The three
/// underlying `Reader` calls each fail with their own `DecodeError`,
/// but `?` converts all of them through `CodecError`'s `From` impls so
/// the caller has a single match point instead of one per call.
fn frame_packet(reader: &mut Reader<'_>, len: usize) -> Result<Command, CodecError> {
    reader.start(len)?;
    let command = reader.read_command()?;
    reader.read_remaining_length()?;
    Ok(command)
}

async fn return_and_cleanup(broker: &Arc<Broker>, client_id: Option<ClientId>) {
    if let Some(id) = client_id {
        broker.remove_client(id).await;
    }
}

async fn handle_connect(
    broker: &Arc<Broker>,
    reader: &mut Reader<'_>,
    peer_addr: std::net::SocketAddr,
    stream: &mut TcpStream,
) -> Result<Option<ClientId>, Error> {
    let connect = ConnectPacket::decode(reader)?;
    let reason = connect.connack_reason();
    log::info!(
        "{peer_addr}: CONNECT client_id={:?} version={:?} reason={:?}",
        connect.client_identifier,
        connect.protocol_version,
        reason
    );
    for (violation, offset) in &connect.errors {
        log::warn!("{peer_addr}: handshake violation at byte {offset}: {violation:?}");
    }

    let ack = ConnectAckPacket::new(reason, false, connect.protocol_version);
    let mut writer = Writer::new();
    ack.encode(&mut writer)?;
    stream.write_all(writer.as_slice()).await?;

    if !reason.is_success() {
        return Ok(None);
    }

    let client = Client::new(
        broker.next_client_id(),
        connect.client_identifier.unwrap_or_default(),
        connect.protocol_version,
        peer_addr,
        connect.connect_flags.clean_start,
        connect.keep_alive,
        connect.username,
        connect.will_topic,
        connect.will_payload,
    );
    let id = client.id();
    broker.insert_client(client).await;
    Ok(Some(id))
}

async fn handle_subscribe(
    broker: &Arc<Broker>,
    client_id: ClientId,
    reader: &mut Reader<'_>,
    stream: &mut TcpStream,
) -> Result<(), Error> {
    let subscribe = SubscribePacket::decode(reader)?;
    let mut requested_qos = Vec::with_capacity(subscribe.topics.len());
    for topic in &subscribe.topics {
        broker.subscribe(client_id, topic.topic.clone()).await;
        requested_qos.push(topic.options.qos);
    }
    let ack = SubscribeAckPacket::granting(subscribe.packet_id, &requested_qos);
    let mut writer = Writer::new();
    ack.encode(&mut writer)?;
    stream.write_all(writer.as_slice()).await?;
    Ok(())
}

async fn handle_ping(stream: &mut TcpStream) -> Result<(), Error> {
    let mut writer = Writer::new();
    PingResponsePacket.encode(&mut writer)?;
    stream.write_all(writer.as_slice()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_buffer_waits_for_a_full_packet() {
        let mut buf = InputBuffer::new();
        buf.extend(&[0x20, 0x02, 0x00]);
        assert_eq!(buf.next_packet_len(), None);
        buf.extend(&[0x00]);
        assert_eq!(buf.next_packet_len(), Some(4));
    }

    #[test]
    fn input_buffer_handles_coalesced_packets() {
        let mut buf = InputBuffer::new();
        buf.extend(&[0x20, 0x02, 0x00, 0x00, 0x20, 0x02, 0x00, 0x00]);
        let len = buf.next_packet_len().unwrap();
        assert_eq!(len, 4);
        let first = buf.take_packet(len);
        assert_eq!(first, vec![0x20, 0x02, 0x00, 0x00]);
        assert_eq!(buf.next_packet_len(), Some(4));
    }
}
