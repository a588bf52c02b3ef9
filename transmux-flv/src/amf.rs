//! AMF0 script-data parsing.
//!
//! FLV script tags (type 18) carry AMF0-encoded values, normally a pair of
//! `"onMetaData"` and an ECMA array of stream properties. Parsing is
//! tolerant: missing or mis-typed fields are the caller's problem (warnings,
//! not failures), only structurally broken data errors out.

use std::collections::HashMap;

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{FlvError, Result};

// AMF0 type markers
const AMF0_NUMBER: u8 = 0x00;
const AMF0_BOOLEAN: u8 = 0x01;
const AMF0_STRING: u8 = 0x02;
const AMF0_OBJECT: u8 = 0x03;
const AMF0_NULL: u8 = 0x05;
const AMF0_UNDEFINED: u8 = 0x06;
const AMF0_REFERENCE: u8 = 0x07;
const AMF0_ECMA_ARRAY: u8 = 0x08;
const AMF0_OBJECT_END: u8 = 0x09;
const AMF0_STRICT_ARRAY: u8 = 0x0A;
const AMF0_DATE: u8 = 0x0B;
const AMF0_LONG_STRING: u8 = 0x0C;

/// A parsed AMF0 value.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// AMF0 null.
    Null,
    /// AMF0 undefined.
    Undefined,
    /// Boolean.
    Boolean(bool),
    /// IEEE-754 double.
    Number(f64),
    /// UTF-8 string (short or long encoding).
    String(String),
    /// Strict array.
    Array(Vec<AmfValue>),
    /// Object or ECMA array properties.
    Object(HashMap<String, AmfValue>),
    /// Date: milliseconds since epoch (the timezone offset is discarded).
    Date(f64),
}

impl AmfValue {
    /// The value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as a boolean, if it is one.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an object map, if it is one.
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The value as a strict array, if it is one.
    pub fn as_array(&self) -> Option<&[AmfValue]> {
        match self {
            AmfValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

fn read_string(cursor: &mut Cursor<&[u8]>, long: bool) -> Result<String> {
    let len = if long {
        cursor
            .read_u32::<BigEndian>()
            .map_err(|_| FlvError::InvalidAmf("truncated string length".into()))? as usize
    } else {
        cursor
            .read_u16::<BigEndian>()
            .map_err(|_| FlvError::InvalidAmf("truncated string length".into()))? as usize
    };
    let start = cursor.position() as usize;
    let data = *cursor.get_ref();
    if start + len > data.len() {
        return Err(FlvError::InvalidAmf("truncated string body".into()));
    }
    cursor.set_position((start + len) as u64);
    Ok(String::from_utf8_lossy(&data[start..start + len]).into_owned())
}

fn read_value(cursor: &mut Cursor<&[u8]>, depth: u32) -> Result<AmfValue> {
    if depth > 16 {
        return Err(FlvError::InvalidAmf("nesting too deep".into()));
    }
    let marker = cursor
        .read_u8()
        .map_err(|_| FlvError::InvalidAmf("truncated value marker".into()))?;
    match marker {
        AMF0_NUMBER => cursor
            .read_f64::<BigEndian>()
            .map(AmfValue::Number)
            .map_err(|_| FlvError::InvalidAmf("truncated number".into())),
        AMF0_BOOLEAN => cursor
            .read_u8()
            .map(|b| AmfValue::Boolean(b != 0))
            .map_err(|_| FlvError::InvalidAmf("truncated boolean".into())),
        AMF0_STRING => read_string(cursor, false).map(AmfValue::String),
        AMF0_LONG_STRING => read_string(cursor, true).map(AmfValue::String),
        AMF0_OBJECT => read_properties(cursor, depth).map(AmfValue::Object),
        AMF0_ECMA_ARRAY => {
            // the declared count is advisory; trust the terminator
            cursor
                .read_u32::<BigEndian>()
                .map_err(|_| FlvError::InvalidAmf("truncated array count".into()))?;
            read_properties(cursor, depth).map(AmfValue::Object)
        }
        AMF0_STRICT_ARRAY => {
            let count = cursor
                .read_u32::<BigEndian>()
                .map_err(|_| FlvError::InvalidAmf("truncated array count".into()))?;
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(read_value(cursor, depth + 1)?);
            }
            Ok(AmfValue::Array(items))
        }
        AMF0_DATE => {
            let millis = cursor
                .read_f64::<BigEndian>()
                .map_err(|_| FlvError::InvalidAmf("truncated date".into()))?;
            cursor
                .read_i16::<BigEndian>()
                .map_err(|_| FlvError::InvalidAmf("truncated date offset".into()))?;
            Ok(AmfValue::Date(millis))
        }
        AMF0_NULL => Ok(AmfValue::Null),
        AMF0_UNDEFINED => Ok(AmfValue::Undefined),
        AMF0_REFERENCE => {
            cursor
                .read_u16::<BigEndian>()
                .map_err(|_| FlvError::InvalidAmf("truncated reference".into()))?;
            Ok(AmfValue::Undefined)
        }
        other => Err(FlvError::InvalidAmf(format!("unknown type marker {other}"))),
    }
}

fn read_properties(
    cursor: &mut Cursor<&[u8]>,
    depth: u32,
) -> Result<HashMap<String, AmfValue>> {
    let mut props = HashMap::new();
    loop {
        // peek for the 0x00 0x00 0x09 object-end sequence
        let data = *cursor.get_ref();
        let pos = cursor.position() as usize;
        if pos + 3 <= data.len()
            && data[pos] == 0
            && data[pos + 1] == 0
            && data[pos + 2] == AMF0_OBJECT_END
        {
            cursor.set_position((pos + 3) as u64);
            return Ok(props);
        }

        let name = read_string(cursor, false)?;
        let value = read_value(cursor, depth + 1)?;
        if name.is_empty() {
            continue;
        }
        props.insert(name, value);
    }
}

/// Parse the body of an FLV script tag.
///
/// Returns the top-level name/value pair, normally
/// `("onMetaData", Object(...))`.
pub fn parse_script_data(data: &[u8]) -> Result<(String, AmfValue)> {
    let mut cursor = Cursor::new(data);
    let name = match read_value(&mut cursor, 0)? {
        AmfValue::String(s) => s,
        other => {
            return Err(FlvError::InvalidAmf(format!(
                "script tag name is not a string: {other:?}"
            )))
        }
    };
    let value = read_value(&mut cursor, 0)?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amf_string(s: &str) -> Vec<u8> {
        let mut out = vec![AMF0_STRING];
        out.extend_from_slice(&(s.len() as u16).to_be_bytes());
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn amf_number(n: f64) -> Vec<u8> {
        let mut out = vec![AMF0_NUMBER];
        out.extend_from_slice(&n.to_be_bytes());
        out
    }

    fn prop(name: &str, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(value);
        out
    }

    fn on_metadata_script(props: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut out = amf_string("onMetaData");
        out.push(AMF0_ECMA_ARRAY);
        out.extend_from_slice(&(props.len() as u32).to_be_bytes());
        for (name, value) in props {
            out.extend_from_slice(&prop(name, value));
        }
        out.extend_from_slice(&[0, 0, AMF0_OBJECT_END]);
        out
    }

    #[test]
    fn test_parse_on_metadata() {
        let script = on_metadata_script(&[
            ("duration", amf_number(10.0)),
            ("width", amf_number(640.0)),
            ("height", amf_number(360.0)),
            ("hasAudio", vec![AMF0_BOOLEAN, 1]),
        ]);

        let (name, value) = parse_script_data(&script).unwrap();
        assert_eq!(name, "onMetaData");
        let obj = value.as_object().unwrap();
        assert_eq!(obj["duration"].as_number(), Some(10.0));
        assert_eq!(obj["width"].as_number(), Some(640.0));
        assert_eq!(obj["hasAudio"].as_boolean(), Some(true));
    }

    #[test]
    fn test_parse_nested_object_and_arrays() {
        let mut keyframes = vec![AMF0_OBJECT];
        let mut times = vec![AMF0_STRICT_ARRAY];
        times.extend_from_slice(&2u32.to_be_bytes());
        times.extend_from_slice(&amf_number(0.0));
        times.extend_from_slice(&amf_number(2.0));
        keyframes.extend_from_slice(&prop("times", &times));
        keyframes.extend_from_slice(&[0, 0, AMF0_OBJECT_END]);

        let script = on_metadata_script(&[("keyframes", keyframes)]);
        let (_, value) = parse_script_data(&script).unwrap();
        let obj = value.as_object().unwrap();
        let kf = obj["keyframes"].as_object().unwrap();
        let times = kf["times"].as_array().unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1].as_number(), Some(2.0));
    }

    #[test]
    fn test_parse_truncated() {
        let mut script = on_metadata_script(&[("duration", amf_number(1.0))]);
        script.truncate(script.len() - 4);
        assert!(parse_script_data(&script).is_err());
    }

    #[test]
    fn test_parse_date_and_null() {
        let mut script = amf_string("x");
        script.push(AMF0_DATE);
        script.extend_from_slice(&1234.5f64.to_be_bytes());
        script.extend_from_slice(&0i16.to_be_bytes());
        let (_, value) = parse_script_data(&script).unwrap();
        assert_eq!(value, AmfValue::Date(1234.5));
    }

    #[test]
    fn test_unknown_marker() {
        let mut script = amf_string("x");
        script.push(0x42);
        assert!(parse_script_data(&script).is_err());
    }
}
