// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::command::Command;
use crate::error::{DecodeError, EncodeError};
use crate::protocol_version::ProtocolVersion;
use crate::reader::Reader;
use crate::reason_code::ReasonCode;
use crate::writer::Writer;

/// CONNACK: the handshake validator's verdict, sent back to the
/// client regardless of whether the CONNECT was accepted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConnectAckPacket {
    pub session_present: bool,
    pub reason_code: ReasonCode,
    /// Whether to emit the (empty) v5 properties length byte after
    /// the reason code. Only true for a v5 handshake.
    pub v5: bool,
}

impl ConnectAckPacket {
    pub fn new(reason_code: ReasonCode, session_present: bool, version: ProtocolVersion) -> Self {
        Self {
            session_present: session_present && reason_code.is_success(),
            reason_code,
            v5: version.is_v5(),
        }
    }

    pub fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        writer.start_packet(Command::ConnectAck, 0)?;
        writer.write_byte(u8::from(self.session_present))?;
        writer.write_byte(self.reason_code as u8)?;
        if self.v5 {
            // No properties: a single zero-length varint.
            writer.write_byte(0x00)?;
        }
        writer.finish_packet()?;
        Ok(writer.len())
    }
}

impl crate::EncodePacket for ConnectAckPacket {
    fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        ConnectAckPacket::encode(self, writer)
    }
}

impl ConnectAckPacket {
    /// Decodes a CONNACK back out, used by the client-facing unit
    /// tests below; the broker itself never decodes one.
    pub fn decode(reader: &mut Reader, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let ack_flags = reader.read_byte()?;
        let session_present = ack_flags & 0x01 != 0;
        let reason_byte = reader.read_byte()?;
        let reason_code = reason_code_from_byte(reason_byte)?;
        if version.is_v5() && !reader.is_exhausted() {
            let _property_length = reader.read_byte()?;
        }
        Ok(Self {
            session_present,
            reason_code,
            v5: version.is_v5(),
        })
    }
}

fn reason_code_from_byte(byte: u8) -> Result<ReasonCode, DecodeError> {
    use ReasonCode::*;
    let code = match byte {
        0x00 => Success,
        0x01 => GrantedQoS1,
        0x02 => GrantedQoS2,
        0x04 => DisconnectWithWill,
        0x10 => NoMatchingSubscribers,
        0x11 => NoSubscriptionExisted,
        0x18 => ContinueAuthentication,
        0x19 => ReAuthenticate,
        0x80 => UnspecifiedError,
        0x81 => MalformedPacket,
        0x82 => ProtocolError,
        0x83 => ImplementationSpecificError,
        0x84 => UnsupportedProtocolVersion,
        0x85 => ClientIdentifierNotValid,
        0x86 => BadUserNameOrPassword,
        0x87 => NotAuthorized,
        0x88 => ServerUnavailable,
        0x89 => ServerBusy,
        0x8A => Banned,
        0x8B => ServerShuttingDown,
        0x8C => BadAuthenticationMethod,
        0x8D => KeepAliveTimeout,
        0x8E => SessionTakenOver,
        0x8F => TopicFilterInvalid,
        0x90 => TopicNameInvalid,
        0x91 => PacketIdentifierInUse,
        0x92 => PacketIdentifierNotFound,
        0x93 => ReceiveMaximumExceeded,
        0x94 => TopicAliasInvalid,
        0x95 => PacketTooLarge,
        0x96 => MessageRateTooHigh,
        0x97 => QuotaExceeded,
        0x98 => AdministrativeAction,
        0x99 => PayloadFormatInvalid,
        0x9A => RetainNotSupported,
        0x9B => QoSNotSupported,
        0x9C => UseAnotherServer,
        0x9D => ServerMoved,
        0x9E => SharedSubscriptionsNotSupported,
        0x9F => ConnectionRateExceeded,
        0xA0 => MaximumConnectTime,
        0xA1 => SubscriptionIdentifiersNotSupported,
        0xA2 => WildcardSubscriptionsNotSupported,
        _ => return Err(DecodeError::MalformedPacket),
    };
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_successful_v3_1_1_ack() {
        let ack = ConnectAckPacket::new(ReasonCode::Success, false, ProtocolVersion::V3_1_1);
        let mut writer = Writer::new();
        ack.encode(&mut writer).unwrap();
        assert_eq!(writer.as_slice(), &[0x20, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn encodes_a_v5_ack_with_empty_properties() {
        let ack = ConnectAckPacket::new(ReasonCode::Success, false, ProtocolVersion::V5_0);
        let mut writer = Writer::new();
        ack.encode(&mut writer).unwrap();
        assert_eq!(writer.as_slice(), &[0x20, 0x03, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn session_present_is_cleared_on_a_failed_connack() {
        let ack = ConnectAckPacket::new(
            ReasonCode::ClientIdentifierNotValid,
            true,
            ProtocolVersion::V3_1_1,
        );
        assert!(!ack.session_present);
    }

    #[test]
    fn round_trips_through_decode() {
        let ack = ConnectAckPacket::new(ReasonCode::Success, true, ProtocolVersion::V3_1_1);
        let mut writer = Writer::new();
        ack.encode(&mut writer).unwrap();
        let bytes = writer.as_slice();
        let mut reader = Reader::new(bytes);
        reader.start(bytes.len()).unwrap();
        reader.read_command().unwrap();
        reader.read_remaining_length().unwrap();
        let decoded = ConnectAckPacket::decode(&mut reader, ProtocolVersion::V3_1_1).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::Success);
        assert!(decoded.session_present);
    }
}
