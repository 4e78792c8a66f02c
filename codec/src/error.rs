// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt;

/// Fatal, codec-tier decode failures.
///
/// These are never accumulated the way handshake violations are: the
/// first one aborts decoding of the current packet and the connection
/// driver closes the network connection.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DecodeError {
    /// Fewer bytes remain in the buffer than a field claims to need.
    BufferTooSmall,

    /// A fifth continuation byte would be required to finish decoding
    /// the remaining-length field, or the buffer ended first.
    InvalidRemainingLength,

    /// The fixed header's high nibble is not a known `Command`.
    InvalidCommand,

    /// A structural rule of the packet was violated: wrong packet
    /// type for this decoder, reserved bits set, or a payload that
    /// does not end where `remaining_length` says it should.
    MalformedPacket,

    /// `Reader::start` was asked to frame more bytes than the buffer holds.
    AllocatedBufferTooSmall,

    /// QoS field outside `{0, 1, 2}`, or reserved bits around it are non-zero.
    InvalidQoS,

    /// SUBSCRIBE/UNSUBSCRIBE packet identifier was zero.
    InvalidPacketId,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for DecodeError {}

/// Codec-tier encode failures.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EncodeError {
    /// Value does not fit in its wire-format width (e.g. a string
    /// longer than 65535 bytes, or a remaining length over 268435455).
    OutOfRange,

    /// `Writer::finish_packet` was called with no packet in progress.
    NoPacketStarted,

    /// `Writer::write_to_stream` performed a short write.
    StreamWriteError,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for EncodeError {}

/// Single match point over every fatal error the connection driver can
/// hit while framing and dispatching one packet: a codec-tier decode
/// or encode failure, or the transport read itself coming back short.
/// Handshake violations are not part of this enum -- they accumulate
/// in `ConnectPacket::errors` instead of aborting the connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CodecError {
    Decode(DecodeError),
    Encode(EncodeError),
    /// The transport read that was supposed to hand back a whole
    /// packet failed or returned something framing couldn't use.
    ClientReadError(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "decode error: {err}"),
            Self::Encode(err) => write!(f, "encode error: {err}"),
            Self::ClientReadError(msg) => write!(f, "client read error: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<DecodeError> for CodecError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

impl From<EncodeError> for CodecError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}
