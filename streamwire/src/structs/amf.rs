//! AMF0 typed values.
//!
//! Every value on the wire is a one-byte type marker followed by a body whose
//! layout depends on the marker. [`AmfValue::size`] reports the body length
//! only; the marker byte is accounted for by the caller (see
//! [`AmfValue::encoded_size`]).
//!
//! | Marker | Type         | Body                                              |
//! |--------|--------------|---------------------------------------------------|
//! | 0x00   | Number       | IEEE-754 double, big-endian                       |
//! | 0x01   | Boolean      | one byte, non-zero is true                        |
//! | 0x02   | String       | u16 length + UTF-8                                |
//! | 0x03   | Object       | (u16 key length + key + value)*, 0x00 0x00 0x09   |
//! | 0x05   | Null         | empty                                             |
//! | 0x06   | Undefined    | empty                                             |
//! | 0x08   | ECMA array   | u32 count + object body                           |
//! | 0x0A   | Strict array | u32 count + values                                |
//! | 0x0C   | Long string  | u32 length + UTF-8                                |
//!
//! Length fields never truncate: a `String` over 65535 bytes or an object key
//! over 65535 bytes fails [`AmfValue::validate`] and cannot be encoded. Use
//! [`AmfValue::string`] to pick the long form automatically.

use std::io::{self, Read, Write};

use crate::utils::byteorder::WriteBytesBe;
use crate::utils::errors::{AmfError, Malformed};

pub const MARKER_NUMBER: u8 = 0x00;
pub const MARKER_BOOLEAN: u8 = 0x01;
pub const MARKER_STRING: u8 = 0x02;
pub const MARKER_OBJECT: u8 = 0x03;
pub const MARKER_NULL: u8 = 0x05;
pub const MARKER_UNDEFINED: u8 = 0x06;
pub const MARKER_ECMA_ARRAY: u8 = 0x08;
pub const MARKER_OBJECT_END: u8 = 0x09;
pub const MARKER_STRICT_ARRAY: u8 = 0x0A;
pub const MARKER_LONG_STRING: u8 = 0x0C;

/// Nested objects and arrays deeper than this are rejected on decode.
pub const MAX_NESTING_DEPTH: usize = 64;

const OBJECT_END_SIZE: usize = 3;

/// Ordered key/value pairs of an object or ECMA array.
pub type AmfProperties = Vec<(String, AmfValue)>;

#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Number(f64),
    Boolean(bool),
    /// At most 65535 bytes.
    String(String),
    LongString(String),
    Object(AmfProperties),
    Null,
    Undefined,
    EcmaArray(AmfProperties),
    StrictArray(Vec<AmfValue>),
}

impl AmfValue {
    /// Builds a string value, choosing the long form when the text needs it.
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.len() > u16::MAX as usize {
            Self::LongString(value)
        } else {
            Self::String(value)
        }
    }

    pub fn marker(&self) -> u8 {
        match self {
            AmfValue::Number(_) => MARKER_NUMBER,
            AmfValue::Boolean(_) => MARKER_BOOLEAN,
            AmfValue::String(_) => MARKER_STRING,
            AmfValue::LongString(_) => MARKER_LONG_STRING,
            AmfValue::Object(_) => MARKER_OBJECT,
            AmfValue::Null => MARKER_NULL,
            AmfValue::Undefined => MARKER_UNDEFINED,
            AmfValue::EcmaArray(_) => MARKER_ECMA_ARRAY,
            AmfValue::StrictArray(_) => MARKER_STRICT_ARRAY,
        }
    }

    /// Encoded body length in bytes, marker excluded.
    pub fn size(&self) -> usize {
        match self {
            AmfValue::Number(_) => 8,
            AmfValue::Boolean(_) => 1,
            AmfValue::String(s) => 2 + s.len(),
            AmfValue::LongString(s) => 4 + s.len(),
            AmfValue::Object(props) => properties_size(props),
            AmfValue::Null | AmfValue::Undefined => 0,
            AmfValue::EcmaArray(props) => 4 + properties_size(props),
            AmfValue::StrictArray(values) => {
                4 + values.iter().map(AmfValue::encoded_size).sum::<usize>()
            }
        }
    }

    /// Encoded length including the marker byte.
    pub fn encoded_size(&self) -> usize {
        self.size() + 1
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) | AmfValue::LongString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Checks every length field of the value, nested values included.
    pub fn validate(&self) -> Result<(), AmfError> {
        match self {
            AmfValue::String(s) => check_len("string", s.len(), u16::MAX as usize),
            AmfValue::LongString(s) => check_len("long string", s.len(), u32::MAX as usize),
            AmfValue::Object(props) => validate_properties(props),
            AmfValue::EcmaArray(props) => {
                check_len("ECMA array", props.len(), u32::MAX as usize)?;
                validate_properties(props)
            }
            AmfValue::StrictArray(values) => {
                check_len("strict array", values.len(), u32::MAX as usize)?;
                values.iter().try_for_each(AmfValue::validate)
            }
            AmfValue::Number(_) | AmfValue::Boolean(_) | AmfValue::Null | AmfValue::Undefined => {
                Ok(())
            }
        }
    }

    /// Marker and body as one buffer.
    pub fn encode(&self) -> Result<Vec<u8>, AmfError> {
        self.validate()?;
        let mut out = Vec::with_capacity(self.encoded_size());
        self.write_be(&mut out);
        Ok(out)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), AmfError> {
        writer.write_all(&self.encode()?)?;
        Ok(())
    }

    /// Decodes one value and reports how many bytes it occupied on the wire.
    pub fn read<R: Read>(reader: &mut R) -> Result<(Self, usize), AmfError> {
        let mut consumed = 0;
        let value = read_value(reader, &mut consumed, 0)?;
        Ok((value, consumed))
    }

    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), AmfError> {
        Self::read(&mut io::Cursor::new(bytes))
    }
}

impl From<f64> for AmfValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for AmfValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for AmfValue {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for AmfValue {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

/// Writes a value that already passed [`AmfValue::validate`].
impl WriteBytesBe for AmfValue {
    fn write_be(&self, dst: &mut Vec<u8>) {
        self.marker().write_be(dst);

        match self {
            AmfValue::Number(n) => n.write_be(dst),
            AmfValue::Boolean(b) => (*b as u8).write_be(dst),
            AmfValue::String(s) => {
                (s.len() as u16).write_be(dst);
                dst.extend_from_slice(s.as_bytes());
            }
            AmfValue::LongString(s) => {
                (s.len() as u32).write_be(dst);
                dst.extend_from_slice(s.as_bytes());
            }
            AmfValue::Object(props) => write_properties(props, dst),
            AmfValue::Null | AmfValue::Undefined => {}
            AmfValue::EcmaArray(props) => {
                (props.len() as u32).write_be(dst);
                write_properties(props, dst);
            }
            AmfValue::StrictArray(values) => {
                (values.len() as u32).write_be(dst);
                values.iter().for_each(|value| value.write_be(dst));
            }
        }
    }
}

fn properties_size(props: &AmfProperties) -> usize {
    props
        .iter()
        .map(|(key, value)| 2 + key.len() + value.encoded_size())
        .sum::<usize>()
        + OBJECT_END_SIZE
}

fn check_len(what: &'static str, len: usize, max: usize) -> Result<(), AmfError> {
    if len > max {
        return Err(AmfError::ValueTooLong { what, len, max });
    }
    Ok(())
}

fn validate_properties(props: &AmfProperties) -> Result<(), AmfError> {
    props.iter().try_for_each(|(key, value)| {
        check_len("property key", key.len(), u16::MAX as usize)?;
        value.validate()
    })
}

// Keys have no marker, only a u16 length.
fn write_properties(props: &AmfProperties, dst: &mut Vec<u8>) {
    for (key, value) in props {
        (key.len() as u16).write_be(dst);
        dst.extend_from_slice(key.as_bytes());
        value.write_be(dst);
    }

    [0u8, 0, MARKER_OBJECT_END].write_be(dst);
}

fn read_exact<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    consumed: &mut usize,
    what: &'static str,
) -> Result<(), AmfError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => AmfError::MalformedValue(Malformed::Truncated(what)),
        _ => AmfError::Io(e),
    })?;
    *consumed += buf.len();
    Ok(())
}

fn read_u8<R: Read>(reader: &mut R, consumed: &mut usize, what: &'static str) -> Result<u8, AmfError> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf, consumed, what)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R, consumed: &mut usize, what: &'static str) -> Result<u16, AmfError> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf, consumed, what)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R, consumed: &mut usize, what: &'static str) -> Result<u32, AmfError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, consumed, what)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_utf8<R: Read>(
    reader: &mut R,
    len: usize,
    consumed: &mut usize,
    what: &'static str,
) -> Result<String, AmfError> {
    // Grows with the data actually read, never preallocated from `len`.
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    *consumed += buf.len();
    if buf.len() < len {
        return Err(AmfError::MalformedValue(Malformed::Truncated(what)));
    }

    String::from_utf8(buf).map_err(|_| AmfError::MalformedValue(Malformed::InvalidUtf8))
}

fn read_value<R: Read>(reader: &mut R, consumed: &mut usize, depth: usize) -> Result<AmfValue, AmfError> {
    let marker = read_u8(reader, consumed, "type marker")?;
    read_body(reader, marker, consumed, depth)
}

fn read_body<R: Read>(
    reader: &mut R,
    marker: u8,
    consumed: &mut usize,
    depth: usize,
) -> Result<AmfValue, AmfError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(AmfError::MalformedValue(Malformed::NestingTooDeep));
    }

    let value = match marker {
        MARKER_NUMBER => {
            let mut buf = [0u8; 8];
            read_exact(reader, &mut buf, consumed, "number")?;
            AmfValue::Number(f64::from_be_bytes(buf))
        }
        MARKER_BOOLEAN => AmfValue::Boolean(read_u8(reader, consumed, "boolean")? != 0),
        MARKER_STRING => {
            let len = read_u16(reader, consumed, "string length")? as usize;
            AmfValue::String(read_utf8(reader, len, consumed, "string")?)
        }
        MARKER_LONG_STRING => {
            let len = read_u32(reader, consumed, "long string length")? as usize;
            AmfValue::LongString(read_utf8(reader, len, consumed, "long string")?)
        }
        MARKER_OBJECT => AmfValue::Object(read_properties(reader, consumed, depth)?),
        MARKER_NULL => AmfValue::Null,
        MARKER_UNDEFINED => AmfValue::Undefined,
        MARKER_ECMA_ARRAY => {
            // The count is only a hint; the end marker terminates the array.
            let _count = read_u32(reader, consumed, "ECMA array count")?;
            AmfValue::EcmaArray(read_properties(reader, consumed, depth)?)
        }
        MARKER_STRICT_ARRAY => {
            let count = read_u32(reader, consumed, "strict array count")?;
            let mut values = Vec::new();
            for _ in 0..count {
                values.push(read_value(reader, consumed, depth + 1)?);
            }
            AmfValue::StrictArray(values)
        }
        MARKER_OBJECT_END => return Err(AmfError::MalformedValue(Malformed::MisplacedObjectEnd)),
        other => return Err(AmfError::MalformedValue(Malformed::UnknownMarker(other))),
    };

    Ok(value)
}

fn read_properties<R: Read>(
    reader: &mut R,
    consumed: &mut usize,
    depth: usize,
) -> Result<AmfProperties, AmfError> {
    let mut props = Vec::new();

    loop {
        let key_len = read_u16(reader, consumed, "property key length")? as usize;
        if key_len == 0 {
            let marker = read_u8(reader, consumed, "object end")?;
            if marker == MARKER_OBJECT_END {
                return Ok(props);
            }
            // An empty key followed by a regular value.
            props.push((String::new(), read_body(reader, marker, consumed, depth + 1)?));
            continue;
        }

        let key = read_utf8(reader, key_len, consumed, "property key")?;
        let value = read_value(reader, consumed, depth + 1)?;
        props.push((key, value));
    }
}
