// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Packet types the connection driver recognizes by `Command` but
//! does not act on beyond logging -- PUBLISH/PUBREC, UNSUBSCRIBE and
//! DISCONNECT QoS/session flows are out of scope. These are markers,
//! not decoders: the driver already knows the byte span to skip from
//! the fixed header's remaining length, so there is nothing for these
//! types to parse.

use crate::command::Command;
use crate::error::EncodeError;
use crate::writer::Writer;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PublishPacket;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UnsubscribePacket;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DisconnectPacket;

/// PINGREQ carries no payload; its only job is to prompt a PINGRESP.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PingRequestPacket;

/// PINGRESP, likewise payload-free, is the one reply the connection
/// driver sends for a packet type this crate otherwise treats as a
/// placeholder -- keep-alive liveness is part of the connection
/// model (`Client::keep_alive`), not a QoS delivery flow.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PingResponsePacket;

impl PingResponsePacket {
    pub fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        writer.start_packet(Command::PingResponse, 0)?;
        writer.finish_packet()?;
        Ok(writer.len())
    }
}

impl crate::EncodePacket for PingResponsePacket {
    fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        PingResponsePacket::encode(self, writer)
    }
}
