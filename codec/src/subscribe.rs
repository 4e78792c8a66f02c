// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::command::Command;
use crate::error::{DecodeError, EncodeError};
use crate::packet_id::PacketId;
use crate::qos::QoS;
use crate::reader::Reader;
use crate::topic::SubTopic;
use crate::writer::Writer;

/// Subscription options byte for a single filter. Only the QoS the
/// client is requesting is implemented -- the v5 no-local,
/// retain-as-published and retain-handling bits are not read or
/// acted on, so the six bits above QoS must all be zero; a SUBSCRIBE
/// carrying any of them set is rejected the same way a v3.1.1 client
/// setting any non-QoS bit would be.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubscriptionOptions {
    pub qos: QoS,
}

impl SubscriptionOptions {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let byte = reader.read_byte()?;
        if byte & 0b1111_1100 != 0 {
            return Err(DecodeError::InvalidQoS);
        }
        let qos = QoS::try_from(byte & 0b0000_0011).map_err(|()| DecodeError::InvalidQoS)?;
        Ok(Self { qos })
    }

    fn encode(self, writer: &mut Writer) -> Result<(), EncodeError> {
        writer.write_byte(self.qos as u8)
    }
}

/// One filter/options pair requested by a SUBSCRIBE packet.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeTopic {
    pub topic: SubTopic,
    pub options: SubscriptionOptions,
}

/// SUBSCRIBE: a packet id and one or more filter/options pairs. At
/// least one filter is required; a SUBSCRIBE with none is malformed
/// per the protocol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscribePacket {
    pub packet_id: PacketId,
    pub topics: Vec<SubscribeTopic>,
}

impl SubscribePacket {
    pub fn new(packet_id: PacketId, topics: Vec<SubscribeTopic>) -> Self {
        Self { packet_id, topics }
    }

    /// Decodes a SUBSCRIBE variable header and payload. `reader` must
    /// be positioned right after the fixed header, with its span
    /// already framed to this packet's remaining length.
    pub fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let packet_id = PacketId::decode(reader)?;
        let mut topics = Vec::new();
        while !reader.is_exhausted() {
            let topic = SubTopic::decode(reader)?;
            let options = SubscriptionOptions::decode(reader)?;
            topics.push(SubscribeTopic { topic, options });
        }
        if topics.is_empty() {
            return Err(DecodeError::MalformedPacket);
        }
        Ok(Self { packet_id, topics })
    }

    pub fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        // SUBSCRIBE's fixed header flags are fixed at 0b0010.
        writer.start_packet(Command::Subscribe, 0b0010)?;
        self.packet_id.encode(writer)?;
        for t in &self.topics {
            t.topic.encode(writer)?;
            t.options.encode(writer)?;
        }
        writer.finish_packet()?;
        Ok(writer.len())
    }
}

impl crate::DecodePacket for SubscribePacket {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        SubscribePacket::decode(reader)
    }
}

impl crate::EncodePacket for SubscribePacket {
    fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        SubscribePacket::encode(self, writer)
    }
}
