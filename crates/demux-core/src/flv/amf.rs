//! AMF0 decoding for FLV script data

use rplay_codec_core::ByteReader;

use crate::error::{DemuxError, Result};
use crate::traits::StreamMetadata;

const MAX_DEPTH: usize = 16;

mod marker {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const REFERENCE: u8 = 0x07;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const DATE: u8 = 0x0B;
    pub const LONG_STRING: u8 = 0x0C;
}

/// A decoded AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE-754 double
    Number(f64),
    /// Boolean
    Boolean(bool),
    /// UTF-8 string (short or long form)
    String(String),
    /// Anonymous object or ECMA array
    Object(Vec<(String, AmfValue)>),
    /// Strict array
    Array(Vec<AmfValue>),
    /// Milliseconds since the epoch
    Date(f64),
    /// Null, undefined or an object reference
    Null,
}

impl AmfValue {
    /// Numeric value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Boolean(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// String value, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a property of an object value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        match self {
            Self::Object(props) => props.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Read one AMF0 value
pub fn read_value(r: &mut ByteReader<'_>) -> Result<AmfValue> {
    read_nested(r, 0)
}

fn read_nested(r: &mut ByteReader<'_>, depth: usize) -> Result<AmfValue> {
    if depth > MAX_DEPTH {
        return Err(DemuxError::malformed("amf0", "nesting too deep"));
    }
    let value = match r.read_u8()? {
        marker::NUMBER => AmfValue::Number(r.read_f64()?),
        marker::BOOLEAN => AmfValue::Boolean(r.read_u8()? != 0),
        marker::STRING => AmfValue::String(read_utf8(r)?),
        marker::LONG_STRING => {
            let len = r.read_u32()? as usize;
            AmfValue::String(String::from_utf8_lossy(r.read_bytes(len)?).into_owned())
        }
        marker::OBJECT => AmfValue::Object(read_properties(r, depth)?),
        marker::ECMA_ARRAY => {
            // The count is advisory; the end marker terminates the list
            r.skip(4)?;
            AmfValue::Object(read_properties(r, depth)?)
        }
        marker::STRICT_ARRAY => {
            let count = r.read_u32()? as usize;
            let mut items = Vec::with_capacity(count.min(r.remaining()));
            for _ in 0..count {
                items.push(read_nested(r, depth + 1)?);
            }
            AmfValue::Array(items)
        }
        marker::DATE => {
            let millis = r.read_f64()?;
            r.skip(2)?; // time zone, always zero
            AmfValue::Date(millis)
        }
        marker::NULL | marker::UNDEFINED => AmfValue::Null,
        marker::REFERENCE => {
            r.skip(2)?;
            AmfValue::Null
        }
        other => {
            return Err(DemuxError::unsupported("amf0", format!("marker 0x{other:02x}")));
        }
    };
    Ok(value)
}

fn read_utf8(r: &mut ByteReader<'_>) -> Result<String> {
    let len = r.read_u16()? as usize;
    Ok(String::from_utf8_lossy(r.read_bytes(len)?).into_owned())
}

fn read_properties(r: &mut ByteReader<'_>, depth: usize) -> Result<Vec<(String, AmfValue)>> {
    let mut props = Vec::new();
    loop {
        let key = read_utf8(r)?;
        if key.is_empty() && r.peek_u8()? == marker::OBJECT_END {
            r.skip(1)?;
            return Ok(props);
        }
        let value = read_nested(r, depth + 1)?;
        props.push((key, value));
    }
}

/// Decode an `onMetaData` script tag body.
///
/// Returns `Ok(None)` for script tags carrying other messages.
pub fn parse_metadata(body: &[u8]) -> Result<Option<StreamMetadata>> {
    let mut r = ByteReader::new(body);
    let name = read_value(&mut r)?;
    if name.as_str() != Some("onMetaData") {
        return Ok(None);
    }
    let props = read_value(&mut r)?;
    let number = |key: &str| props.get(key).and_then(AmfValue::as_f64);
    Ok(Some(StreamMetadata {
        duration: number("duration"),
        width: number("width"),
        height: number("height"),
        frame_rate: number("framerate").or_else(|| number("videoframerate")),
        video_codec_id: number("videocodecid"),
        audio_codec_id: number("audiocodecid"),
        audio_sample_rate: number("audiosamplerate"),
        encoder: props.get("encoder").and_then(AmfValue::as_str).map(str::to_owned),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::amf;

    #[test]
    fn test_metadata_from_ecma_array() {
        let body = amf::on_metadata(&[
            ("duration", amf::number(0.0)),
            ("width", amf::number(1280.0)),
            ("height", amf::number(720.0)),
            ("framerate", amf::number(30.0)),
            ("videocodecid", amf::number(7.0)),
            ("encoder", amf::string("Lavf60.3.100")),
        ]);
        let meta = parse_metadata(&body).unwrap().unwrap();
        assert_eq!(meta.width, Some(1280.0));
        assert_eq!(meta.height, Some(720.0));
        assert_eq!(meta.frame_rate, Some(30.0));
        assert_eq!(meta.video_codec_id, Some(7.0));
        assert_eq!(meta.audio_codec_id, None);
        assert_eq!(meta.encoder.as_deref(), Some("Lavf60.3.100"));
    }

    #[test]
    fn test_other_script_messages_are_ignored() {
        let mut body = vec![marker::STRING, 0x00, 0x0A];
        body.extend_from_slice(b"onCuePoint");
        body.push(marker::NULL);
        assert_eq!(parse_metadata(&body).unwrap(), None);
    }

    #[test]
    fn test_nested_values() {
        let data = [
            marker::OBJECT,
            0x00,
            0x01,
            b'a',
            marker::STRICT_ARRAY,
            0x00,
            0x00,
            0x00,
            0x02,
            marker::BOOLEAN,
            0x01,
            marker::NULL,
            0x00,
            0x00,
            marker::OBJECT_END,
        ];
        let value = read_value(&mut ByteReader::new(&data)).unwrap();
        assert_eq!(
            value.get("a"),
            Some(&AmfValue::Array(vec![AmfValue::Boolean(true), AmfValue::Null]))
        );
    }

    #[test]
    fn test_truncated_value_is_an_error() {
        let data = [marker::NUMBER, 0x40, 0x09];
        assert!(read_value(&mut ByteReader::new(&data)).is_err());
    }
}
