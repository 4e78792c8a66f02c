// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::error::{DecodeError, EncodeError};
use crate::reader::Reader;
use crate::writer::Writer;
use crate::{DecodePacket, EncodePacket};

/// Length-prefixed UTF-8 string, the on-wire shape shared by every
/// string field in the CONNECT family (protocol name, client
/// identifier, will topic/payload, username, password). A zero-length
/// field decodes as `None`, matching `Reader::read_utf8_string`'s
/// "absent" convention.
///
/// `Reader::read_utf8_string`/`Writer::write_utf8_string` are the raw
/// primitives this type is built from; `StringData` is the shared
/// decode/encode pairing the rest of the codec reaches for when it
/// needs the `DecodePacket`/`EncodePacket` traits rather than a bare
/// method call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringData(Option<String>);

impl StringData {
    pub fn new(value: Option<String>) -> Self {
        Self(value)
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn into_option(self) -> Option<String> {
        self.0
    }

    pub fn bytes(&self) -> usize {
        2 + self.0.as_deref().map_or(0, str::len)
    }
}

impl DecodePacket for StringData {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        match reader.read_raw_string(true)? {
            None => Ok(Self(None)),
            Some((bytes, true)) => Ok(Self(Some(
                String::from_utf8(bytes).expect("validated above"),
            ))),
            Some((_, false)) => Err(DecodeError::MalformedPacket),
        }
    }
}

impl EncodePacket for StringData {
    fn encode(&self, writer: &mut Writer) -> Result<usize, EncodeError> {
        let s = self.0.as_deref().unwrap_or("");
        writer.write_utf8_string(s)?;
        Ok(2 + s.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_present_value() {
        let mut writer = Writer::new();
        StringData::new(Some("hello".to_string())).encode(&mut writer).unwrap();
        let bytes = writer.as_slice().to_vec();
        let mut reader = Reader::new(&bytes);
        reader.start(bytes.len()).unwrap();
        assert_eq!(StringData::decode(&mut reader).unwrap().into_option(), Some("hello".to_string()));
    }

    #[test]
    fn zero_length_decodes_as_absent() {
        let buf = [0x00, 0x00];
        let mut reader = Reader::new(&buf);
        reader.start(buf.len()).unwrap();
        assert_eq!(StringData::decode(&mut reader).unwrap().into_option(), None);
    }

    #[test]
    fn absent_value_encodes_as_zero_length() {
        let mut writer = Writer::new();
        StringData::new(None).encode(&mut writer).unwrap();
        assert_eq!(writer.as_slice(), &[0x00, 0x00]);
    }
}
