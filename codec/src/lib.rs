// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Wire-level packet codec for the MQTT 3.1.1 / 5.0 fixed header,
//! CONNECT/CONNACK handshake, and SUBSCRIBE/SUBACK packets.
//!
//! This crate performs no I/O beyond `Writer::write_to_stream`, which
//! is generic over `std::io::Write` so it can be driven from either a
//! synchronous socket or a test buffer; the async connection driver
//! in the `mqttd` broker crate writes `Writer::as_slice()` directly
//! through `tokio`'s `AsyncWrite` instead of calling it.

mod command;
mod connect;
mod connect_ack;
mod error;
mod packet_id;
mod placeholders;
mod protocol_version;
mod qos;
mod reader;
mod reason_code;
mod string_data;
mod subscribe;
mod subscribe_ack;
mod topic;
mod writer;

pub use command::Command;
pub use connect::{ConnectFlags, ConnectPacket, ConnectViolation};
pub use connect_ack::ConnectAckPacket;
pub use error::{CodecError, DecodeError, EncodeError};
pub use packet_id::PacketId;
pub use placeholders::{DisconnectPacket, PingRequestPacket, PingResponsePacket, PublishPacket, UnsubscribePacket};
pub use protocol_version::ProtocolVersion;
pub use qos::QoS;
pub use reader::Reader;
pub use reason_code::ReasonCode;
pub use string_data::StringData;
pub use subscribe::{SubscribePacket, SubscribeTopic, SubscriptionOptions};
pub use subscribe_ack::SubscribeAckPacket;
pub use topic::{validate_topic_name, SubTopic, TopicError};
pub use writer::Writer;

/// Decodes `Self` from a `Reader` positioned at the start of this
/// packet's variable header (the fixed header has already been
/// consumed by the connection driver, except where a packet's own
/// `decode` needs to re-check it -- see `SubscribePacket`).
pub trait DecodePacket: Sized {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError>;
}

/// Encodes `Self` as a complete packet, including its own fixed
/// header, into `writer`.
pub trait EncodePacket {
    fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError>;
}
