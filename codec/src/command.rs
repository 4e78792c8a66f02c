// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

/// Control packet type, carried in the high nibble of the fixed header's
/// first byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    Reserved0 = 0,
    Connect = 1,
    ConnectAck = 2,
    Publish = 3,
    PublishAck = 4,
    PublishReceived = 5,
    PublishRelease = 6,
    PublishComplete = 7,
    Subscribe = 8,
    SubscribeAck = 9,
    Unsubscribe = 10,
    UnsubscribeAck = 11,
    PingRequest = 12,
    PingResponse = 13,
    Disconnect = 14,
    Reserved15 = 15,
}

impl TryFrom<u8> for Command {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Command::Reserved0),
            1 => Ok(Command::Connect),
            2 => Ok(Command::ConnectAck),
            3 => Ok(Command::Publish),
            4 => Ok(Command::PublishAck),
            5 => Ok(Command::PublishReceived),
            6 => Ok(Command::PublishRelease),
            7 => Ok(Command::PublishComplete),
            8 => Ok(Command::Subscribe),
            9 => Ok(Command::SubscribeAck),
            10 => Ok(Command::Unsubscribe),
            11 => Ok(Command::UnsubscribeAck),
            12 => Ok(Command::PingRequest),
            13 => Ok(Command::PingResponse),
            14 => Ok(Command::Disconnect),
            15 => Ok(Command::Reserved15),
            _ => Err(()),
        }
    }
}
