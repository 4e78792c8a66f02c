// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::command::Command;
use crate::error::{DecodeError, EncodeError};
use crate::packet_id::PacketId;
use crate::qos::QoS;
use crate::reader::Reader;
use crate::reason_code::ReasonCode;
use crate::writer::Writer;

/// SUBACK: one reason code per filter requested by the matching
/// SUBSCRIBE, in the same order. No QoS downgrade policy is
/// implemented -- the granted QoS always equals the requested one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscribeAckPacket {
    pub packet_id: PacketId,
    pub reason_codes: Vec<ReasonCode>,
}

impl SubscribeAckPacket {
    pub fn new(packet_id: PacketId, reason_codes: Vec<ReasonCode>) -> Self {
        Self { packet_id, reason_codes }
    }

    /// Builds a SUBACK granting every requested QoS as-is.
    pub fn granting(packet_id: PacketId, requested: &[QoS]) -> Self {
        let reason_codes = requested.iter().copied().map(granted_reason_code).collect();
        Self { packet_id, reason_codes }
    }

    pub fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        writer.start_packet(Command::SubscribeAck, 0)?;
        self.packet_id.encode(writer)?;
        for code in &self.reason_codes {
            writer.write_byte(*code as u8)?;
        }
        writer.finish_packet()?;
        Ok(writer.len())
    }

    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let packet_id = PacketId::decode(reader)?;
        let mut reason_codes = Vec::new();
        while !reader.is_exhausted() {
            let byte = reader.read_byte()?;
            reason_codes.push(match byte {
                0x00 => ReasonCode::Success,
                0x01 => ReasonCode::GrantedQoS1,
                0x02 => ReasonCode::GrantedQoS2,
                0x80 => ReasonCode::UnspecifiedError,
                0x8F => ReasonCode::TopicFilterInvalid,
                0x91 => ReasonCode::PacketIdentifierInUse,
                0x97 => ReasonCode::QuotaExceeded,
                0x9E => ReasonCode::SharedSubscriptionsNotSupported,
                0xA1 => ReasonCode::SubscriptionIdentifiersNotSupported,
                0xA2 => ReasonCode::WildcardSubscriptionsNotSupported,
                _ => return Err(DecodeError::MalformedPacket),
            });
        }
        Ok(Self { packet_id, reason_codes })
    }
}

impl crate::DecodePacket for SubscribeAckPacket {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        SubscribeAckPacket::decode(reader)
    }
}

impl crate::EncodePacket for SubscribeAckPacket {
    fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        SubscribeAckPacket::encode(self, writer)
    }
}

fn granted_reason_code(qos: QoS) -> ReasonCode {
    match qos {
        QoS::AtMostOnce => ReasonCode::Success,
        QoS::AtLeastOnce => ReasonCode::GrantedQoS1,
        QoS::ExactlyOnce => ReasonCode::GrantedQoS2,
    }
}
