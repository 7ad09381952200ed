//! AMF0 command messages.
//!
//! A command is an ordered list of typed values. By convention position 0
//! holds the method name and position 1 the transaction id; everything after
//! that is free-form arguments. The body carries no length of its own, the
//! enclosing message header supplies it.

use std::io::{self, Read, Write};

use log::{debug, trace};

use crate::structs::amf::AmfValue;
use crate::utils::byteorder::WriteBytesBe;
use crate::utils::errors::{AmfError, Malformed};

/// Message type id of an AMF0 command in the outer message header.
pub const MESSAGE_TYPE_AMF0_COMMAND: u8 = 0x14;

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    transaction_id: i32,
    values: Vec<AmfValue>,
    body_size: usize,
}

impl Default for Command {
    fn default() -> Self {
        Self::new("", 0)
    }
}

impl Command {
    /// Creates a command whose body starts with `name` and `transaction_id`.
    pub fn new(name: impl Into<String>, transaction_id: i32) -> Self {
        let name = name.into();
        let mut command = Self {
            name: name.clone(),
            transaction_id,
            values: Vec::with_capacity(4),
            body_size: 0,
        };

        // Always valid: `AmfValue::string` switches to the long form as needed.
        command.append(AmfValue::string(name));
        command.append(AmfValue::Number(transaction_id as f64));

        command
    }

    /// Appends an argument. The body grows by the value's marker and body.
    ///
    /// Values whose length fields would overflow are rejected with
    /// [`AmfError::ValueTooLong`] and leave the command unchanged.
    pub fn push(&mut self, value: impl Into<AmfValue>) -> Result<(), AmfError> {
        let value = value.into();
        value.validate()?;
        self.append(value);
        Ok(())
    }

    fn append(&mut self, value: AmfValue) {
        self.body_size += value.encoded_size();
        self.values.push(value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transaction_id(&self) -> i32 {
        self.transaction_id
    }

    /// Every value in body order, name and transaction id included.
    pub fn values(&self) -> &[AmfValue] {
        &self.values
    }

    /// Values after the name and transaction id.
    pub fn arguments(&self) -> &[AmfValue] {
        self.values.get(2..).unwrap_or_default()
    }

    /// Length of the encoded body in bytes.
    pub fn body_size(&self) -> usize {
        self.body_size
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body_size);
        self.write_be(&mut out);
        out
    }

    pub fn write_body<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode_body())
    }

    /// Decodes a body of `declared_len` bytes.
    ///
    /// Values are decoded one at a time until the consumed byte count reaches
    /// `declared_len`. A value running past the declared length, or a stream
    /// ending early, fails with [`AmfError::TruncatedStream`]. The name and
    /// transaction id are then taken from positions 0 and 1 when those hold
    /// a string and a number.
    pub fn read_body<R: Read>(reader: &mut R, declared_len: usize) -> Result<Self, AmfError> {
        let mut bounded = reader.by_ref().take(declared_len as u64);
        let mut values = Vec::new();
        let mut consumed = 0;

        while consumed < declared_len {
            let (value, size) = AmfValue::read(&mut bounded).map_err(|e| match e {
                AmfError::MalformedValue(Malformed::Truncated(what)) => {
                    debug!("Command body ended inside {what} at byte {consumed}");
                    AmfError::TruncatedStream {
                        declared: declared_len,
                        consumed,
                    }
                }
                e => e,
            })?;
            trace!("Decoded AMF0 value {:?} ({size} bytes)", value);
            consumed += size;
            values.push(value);
        }

        Ok(Self::from_values(values))
    }

    pub fn decode_body(bytes: &[u8]) -> Result<Self, AmfError> {
        Self::read_body(&mut io::Cursor::new(bytes), bytes.len())
    }

    fn from_values(values: Vec<AmfValue>) -> Self {
        let name = values
            .first()
            .and_then(AmfValue::as_str)
            .map(str::to_owned)
            .unwrap_or_default();
        let transaction_id = values
            .get(1)
            .and_then(AmfValue::as_number)
            .map(|id| id as i32)
            .unwrap_or_default();
        let body_size = values.iter().map(AmfValue::encoded_size).sum();

        Self {
            name,
            transaction_id,
            values,
            body_size,
        }
    }
}

impl WriteBytesBe for Command {
    fn write_be(&self, dst: &mut Vec<u8>) {
        self.values.iter().for_each(|value| value.write_be(dst));
    }
}
