// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::error::DecodeError;
use crate::protocol_version::ProtocolVersion;
use crate::qos::QoS;
use crate::reader::Reader;
use crate::reason_code::ReasonCode;

/// Every rule CONNECT decoding can violate. The validator never
/// stops at the first one -- it keeps decoding the rest of the fixed
/// layout and records every violation it finds, each tagged with the
/// byte offset it was detected at.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectViolation {
    ProtocolNameNotMQTT,
    ProtocolVersionInvalid,
    UnsupportedVersion,
    /// Catch-all structural violation: a reserved bit set where it
    /// must be zero, bytes that don't decode to valid UTF-8 outside
    /// the client identifier (which gets its own `ClientIdNotUTF8`),
    /// or trailing bytes after all required fields (`UnexpectedExtraData`
    /// is reported instead when the extra bytes are specifically at
    /// the very end).
    MalformedPacket,
    UnexpectedExtraData,
    EmptyClientIdWithoutCleanSession,
    ClientIdTooShort,
    ClientIdTooLong,
    InvalidClientId,
    ClientIdNotUTF8,
    InvalidWillQoS,
    WillTopicMustBePresent,
    WillMessageMustBePresent,
    WillQosMustBeZero,
    PasswordMustNotBeSet,
    UsernameMustBePresent,
    PasswordMustBePresent,
}

impl ConnectViolation {
    /// First-violation-wins mapping onto the CONNACK reason code,
    /// per the table in the handshake validator design.
    fn connack_reason(self) -> ReasonCode {
        use ConnectViolation::*;
        match self {
            UsernameMustBePresent | PasswordMustBePresent | PasswordMustNotBeSet => {
                ReasonCode::BadUserNameOrPassword
            }
            ClientIdNotUTF8
            | ClientIdTooShort
            | ClientIdTooLong
            | InvalidClientId
            | EmptyClientIdWithoutCleanSession => ReasonCode::ClientIdentifierNotValid,
            ProtocolVersionInvalid | UnsupportedVersion => ReasonCode::UnsupportedProtocolVersion,
            _ => ReasonCode::MalformedPacket,
        }
    }
}

/// Bit-packed CONNECT flags byte:
/// `[username(7) | password(6) | will_retain(5) | will_qos(4..3) | will(2) | clean_start(1) | reserved(0)]`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConnectFlags {
    pub username: bool,
    pub password: bool,
    pub will_retain: bool,
    pub will_qos: u8,
    pub will: bool,
    pub clean_start: bool,
    pub reserved: bool,
}

impl ConnectFlags {
    fn decode(byte: u8) -> Self {
        Self {
            username: byte & 0b1000_0000 != 0,
            password: byte & 0b0100_0000 != 0,
            will_retain: byte & 0b0010_0000 != 0,
            will_qos: (byte & 0b0001_1000) >> 3,
            will: byte & 0b0000_0100 != 0,
            clean_start: byte & 0b0000_0010 != 0,
            reserved: byte & 0b0000_0001 != 0,
        }
    }

    fn encode(self) -> u8 {
        let mut byte = 0u8;
        if self.username {
            byte |= 0b1000_0000;
        }
        if self.password {
            byte |= 0b0100_0000;
        }
        if self.will_retain {
            byte |= 0b0010_0000;
        }
        byte |= (self.will_qos & 0b11) << 3;
        if self.will {
            byte |= 0b0000_0100;
        }
        if self.clean_start {
            byte |= 0b0000_0010;
        }
        byte
    }
}

/// Decoded CONNECT packet plus every violation found while decoding
/// it. An empty `errors` list means the handshake is accepted.
#[derive(Clone, Debug, Default)]
pub struct ConnectPacket {
    pub protocol_name: Option<String>,
    pub protocol_version_raw: u8,
    pub protocol_version: ProtocolVersion,
    pub connect_flags: ConnectFlags,
    pub keep_alive: u16,
    pub client_identifier: Option<String>,
    pub will_topic: Option<String>,
    pub will_payload: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub errors: Vec<(ConnectViolation, usize)>,
}

impl ConnectPacket {
    /// Decodes the CONNECT variable header and payload. `reader` must
    /// already be positioned right after the fixed header (command +
    /// remaining length), which the connection driver consumes before
    /// calling into the validator.
    ///
    /// Returns `Err` only for the codec-tier failures of the
    /// three-tier error model (a field whose length prefix claims
    /// more bytes than remain) -- every protocol-level rule violation
    /// instead lands in `ConnectPacket::errors`.
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let mut packet = ConnectPacket::default();

        // 1. Protocol name.
        let (name, name_valid) = read_lenient(reader, true)?;
        let name_offset = reader.previous_pos();
        if !name_valid {
            packet.errors.push((ConnectViolation::MalformedPacket, name_offset));
        }
        if name.as_deref() != Some("MQTT") {
            packet.errors.push((ConnectViolation::ProtocolNameNotMQTT, name_offset));
        }
        packet.protocol_name = name;

        // 2. Protocol version.
        let version_raw = reader.read_byte()?;
        let version_offset = reader.previous_pos();
        let version = ProtocolVersion::from_u8(version_raw);
        if version == ProtocolVersion::Invalid {
            packet
                .errors
                .push((ConnectViolation::ProtocolVersionInvalid, version_offset));
        } else if version != ProtocolVersion::V3_1_1 && version != ProtocolVersion::V5_0 {
            packet
                .errors
                .push((ConnectViolation::UnsupportedVersion, version_offset));
        }
        packet.protocol_version_raw = version_raw;
        packet.protocol_version = version;

        // 3. Connect flags.
        let flags_byte = reader.read_byte()?;
        let flags_offset = reader.previous_pos();
        let flags = ConnectFlags::decode(flags_byte);
        if flags.reserved {
            packet
                .errors
                .push((ConnectViolation::MalformedPacket, flags_offset));
        }
        packet.connect_flags = flags;

        // 4. Keep alive.
        packet.keep_alive = reader.read_two_bytes()?;

        // 5. Client identifier.
        let (client_id_bytes, client_id_valid) = reader.read_raw_string(true)?.map_or(
            (None, true),
            |(bytes, valid)| (Some(bytes), valid),
        );
        let client_id_offset = reader.previous_pos();
        match client_id_bytes {
            None => {
                if !flags.clean_start {
                    packet.errors.push((
                        ConnectViolation::EmptyClientIdWithoutCleanSession,
                        client_id_offset,
                    ));
                }
                packet.client_identifier = None;
            }
            Some(bytes) => {
                if !client_id_valid {
                    packet
                        .errors
                        .push((ConnectViolation::ClientIdNotUTF8, client_id_offset));
                }
                if bytes.len() < 2 {
                    packet
                        .errors
                        .push((ConnectViolation::ClientIdTooShort, client_id_offset));
                } else if bytes.len() > 64 {
                    packet
                        .errors
                        .push((ConnectViolation::ClientIdTooLong, client_id_offset));
                }
                if !bytes.iter().all(u8::is_ascii_alphanumeric) {
                    packet
                        .errors
                        .push((ConnectViolation::InvalidClientId, client_id_offset));
                }
                packet.client_identifier = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
        }

        // 6. Will topic/payload.
        if flags.will {
            if QoS::try_from(flags.will_qos).is_err() {
                packet
                    .errors
                    .push((ConnectViolation::InvalidWillQoS, flags_offset));
            }
            let (will_topic, valid) = read_lenient(reader, true)?;
            let will_topic_offset = reader.previous_pos();
            if !valid {
                packet.errors.push((ConnectViolation::MalformedPacket, will_topic_offset));
            }
            if will_topic.is_none() {
                packet
                    .errors
                    .push((ConnectViolation::WillTopicMustBePresent, will_topic_offset));
            }
            packet.will_topic = will_topic;

            let (will_payload, valid) = read_lenient(reader, true)?;
            let will_payload_offset = reader.previous_pos();
            if !valid {
                packet.errors.push((ConnectViolation::MalformedPacket, will_payload_offset));
            }
            if will_payload.is_none() {
                packet
                    .errors
                    .push((ConnectViolation::WillMessageMustBePresent, will_payload_offset));
            }
            packet.will_payload = will_payload;
        } else if flags.will_qos != 0 {
            packet
                .errors
                .push((ConnectViolation::WillQosMustBeZero, flags_offset));
        }

        // 7. Password without username (v3.1.1 semantics).
        if flags.password && !flags.username {
            packet
                .errors
                .push((ConnectViolation::PasswordMustNotBeSet, flags_offset));
        }

        // 8. Username.
        if flags.username {
            let (username, valid) = read_lenient(reader, true)?;
            let username_offset = reader.previous_pos();
            if !valid {
                packet.errors.push((ConnectViolation::MalformedPacket, username_offset));
            }
            if username.is_none() {
                packet
                    .errors
                    .push((ConnectViolation::UsernameMustBePresent, username_offset));
            }
            packet.username = username;
        }

        // 9. Password.
        if flags.password {
            let (password, valid) = read_lenient(reader, true)?;
            let password_offset = reader.previous_pos();
            if !valid {
                packet.errors.push((ConnectViolation::MalformedPacket, password_offset));
            }
            if password.is_none() {
                packet
                    .errors
                    .push((ConnectViolation::PasswordMustBePresent, password_offset));
            }
            packet.password = password;
        }

        // 10. No trailing bytes. reader.pos() here is correct, not
        // previous_pos(): it marks where the unexpected trailing span
        // starts, which is the current cursor, not the prior field.
        if !reader.is_exhausted() {
            packet
                .errors
                .push((ConnectViolation::UnexpectedExtraData, reader.pos()));
        }

        Ok(packet)
    }

    /// First-violation-wins CONNACK reason code; `Success` if
    /// `errors` is empty.
    pub fn connack_reason(&self) -> ReasonCode {
        self.errors
            .first()
            .map_or(ReasonCode::Success, |(violation, _)| {
                violation.connack_reason()
            })
    }
}

impl crate::DecodePacket for ConnectPacket {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        ConnectPacket::decode(reader)
    }
}

/// Reads a length-prefixed string without hard-failing on invalid
/// UTF-8, returning the lossily-decoded value (or `None` for a
/// zero-length field) alongside whether it really was valid UTF-8.
fn read_lenient(reader: &mut Reader, allow_zero: bool) -> Result<(Option<String>, bool), DecodeError> {
    match reader.read_raw_string(allow_zero)? {
        None => Ok((None, true)),
        Some((bytes, valid)) => Ok((Some(String::from_utf8_lossy(&bytes).into_owned()), valid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_bytes(bytes: &[u8]) -> ConnectPacket {
        let mut reader = Reader::new(bytes);
        reader.start(bytes.len()).unwrap();
        ConnectPacket::decode(&mut reader).unwrap()
    }

    #[test]
    fn accepts_a_well_formed_v3_1_1_connect() {
        let bytes = [
            0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
            0x04, // protocol level
            0x02, // connect flags: clean_start
            0x00, 0x3C, // keep alive = 60
            0x00, 0x06, b't', b'e', b's', b't', b'0', b'1', // client id
        ];
        let packet = decode_bytes(&bytes);
        assert!(packet.errors.is_empty());
        assert_eq!(packet.connack_reason(), ReasonCode::Success);
        assert_eq!(packet.client_identifier.as_deref(), Some("test01"));
        assert_eq!(packet.connect_flags.clean_start, true);
    }

    #[test]
    fn rejects_wrong_protocol_name() {
        let bytes = [
            0x00, 0x04, b'J', b'U', b'N', b'K', 0x04, 0x02, 0x00, 0x3C, 0x00, 0x06, b't', b'e',
            b's', b't', b'0', b'1',
        ];
        let packet = decode_bytes(&bytes);
        assert!(packet
            .errors
            .iter()
            .any(|(v, _)| *v == ConnectViolation::ProtocolNameNotMQTT));
        assert_eq!(packet.connack_reason(), ReasonCode::MalformedPacket);
    }

    #[test]
    fn flags_client_id_too_short() {
        let bytes = [
            0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3C, 0x00, 0x01, b'x',
        ];
        let packet = decode_bytes(&bytes);
        assert!(packet
            .errors
            .iter()
            .any(|(v, _)| *v == ConnectViolation::ClientIdTooShort));
        assert_eq!(packet.connack_reason(), ReasonCode::ClientIdentifierNotValid);
    }

    #[test]
    fn password_without_username_is_rejected() {
        let bytes = [
            0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x42, // password flag, no username
            0x00, 0x3C, 0x00, 0x06, b't', b'e', b's', b't', b'0', b'1', 0x00, 0x04, b'p', b'a',
            b's', b's',
        ];
        let packet = decode_bytes(&bytes);
        assert!(packet
            .errors
            .iter()
            .any(|(v, _)| *v == ConnectViolation::PasswordMustNotBeSet));
        assert_eq!(packet.connack_reason(), ReasonCode::BadUserNameOrPassword);
    }

    #[test]
    fn reserved_flag_bit_is_malformed() {
        let bytes = [
            0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x03, // clean_start + reserved bit
            0x00, 0x3C, 0x00, 0x06, b't', b'e', b's', b't', b'0', b'1',
        ];
        let packet = decode_bytes(&bytes);
        assert!(packet
            .errors
            .iter()
            .any(|(v, _)| *v == ConnectViolation::MalformedPacket));
    }

    #[test]
    fn empty_client_id_without_clean_session_is_rejected() {
        let bytes = [
            0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x00, // no clean_start
            0x00, 0x3C, 0x00, 0x00,
        ];
        let packet = decode_bytes(&bytes);
        assert!(packet
            .errors
            .iter()
            .any(|(v, _)| *v == ConnectViolation::EmptyClientIdWithoutCleanSession));
    }

    #[test]
    fn empty_client_id_with_clean_session_is_accepted() {
        let bytes = [
            0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, // clean_start set
            0x00, 0x3C, 0x00, 0x00,
        ];
        let packet = decode_bytes(&bytes);
        assert!(!packet
            .errors
            .iter()
            .any(|(v, _)| *v == ConnectViolation::EmptyClientIdWithoutCleanSession));
    }
}
