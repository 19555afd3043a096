//! Serial types are how SQLite tags the class and byte width of each field
//! stored in a record. This module decodes a serial type plus its raw bytes
//! into a [`FieldValue`], and classifies values against a table's
//! [`ValueClass`] signature.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("error reading field bytes: {0}")]
    Io(String),
    #[error("serial type {0} is reserved and never appears in a well-formed record")]
    ReservedSerialType(i64),
    #[error("serial type {0} is negative, which is never valid")]
    NegativeSerialType(i64),
    #[error("text field is not valid UTF-8")]
    InvalidStringEncoding,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// A decoded record field value. Mirrors the tagged sum the format
/// actually supports: no distinct boolean type exists on disk, but serial
/// types 8 and 9 (the literal constants 0 and 1) are kept distinct from
/// ordinary integers since schema-format-4 databases use them as SQLite's
/// boolean encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    I64(i64),
    F64(f64),
    Text(String),
    Blob(Vec<u8>),
    True,
    False,
}

/// The value class a column's declared type maps to, used for signature
/// matching (§4.7/§4.8). `Any` accepts every non-null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Int,
    Real,
    Text,
    Blob,
    Any,
}

/// The width in bytes a serial type occupies in the record's body, not
/// counting the serial-type varint itself in the header.
pub fn width_of_serial_type(serial_type: i64) -> Result<usize, Error> {
    match serial_type {
        0 | 8 | 9 => Ok(0),
        1 => Ok(1),
        2 => Ok(2),
        3 => Ok(3),
        4 => Ok(4),
        5 => Ok(6),
        6 => Ok(8),
        7 => Ok(8),
        10 | 11 => Err(Error::ReservedSerialType(serial_type)),
        x if x >= 12 && x % 2 == 0 => Ok(((x - 12) / 2) as usize),
        x if x >= 13 => Ok(((x - 13) / 2) as usize),
        x => Err(Error::NegativeSerialType(x)),
    }
}

/// Decodes `data` (exactly `width_of_serial_type(serial_type)` bytes) as a
/// [`FieldValue`].
pub fn decode(serial_type: i64, data: &[u8]) -> Result<FieldValue, Error> {
    use FieldValue::*;
    let mut c = std::io::Cursor::new(data);
    match serial_type {
        0 => Ok(Null),
        1 => Ok(I64(c.read_i8()? as i64)),
        2 => Ok(I64(c.read_i16::<BigEndian>()? as i64)),
        3 => {
            let mut bytes = [0u8; 4];
            c.read_exact(&mut bytes[1..])?;
            bytes[0] = if bytes[1] & 0x80 != 0 { 0xff } else { 0x00 };
            Ok(I64(i32::from_be_bytes(bytes) as i64))
        }
        4 => Ok(I64(c.read_i32::<BigEndian>()? as i64)),
        5 => {
            let mut bytes = [0u8; 8];
            c.read_exact(&mut bytes[2..])?;
            bytes[0] = if bytes[2] & 0x80 != 0 { 0xff } else { 0x00 };
            bytes[1] = bytes[0];
            Ok(I64(i64::from_be_bytes(bytes)))
        }
        6 => Ok(I64(c.read_i64::<BigEndian>()?)),
        7 => Ok(F64(c.read_f64::<BigEndian>()?)),
        8 => Ok(False),
        9 => Ok(True),
        10 | 11 => Err(Error::ReservedSerialType(serial_type)),
        x if x >= 12 && x % 2 == 0 => {
            let mut buf = vec![0u8; ((x - 12) / 2) as usize];
            c.read_exact(&mut buf)?;
            Ok(Blob(buf))
        }
        x if x >= 13 => {
            let mut buf = vec![0u8; ((x - 13) / 2) as usize];
            c.read_exact(&mut buf)?;
            let s = String::from_utf8(buf).map_err(|_| Error::InvalidStringEncoding)?;
            Ok(Text(s))
        }
        x => Err(Error::NegativeSerialType(x)),
    }
}

/// The value class of a decoded value, or `None` for `Null` -- a null is
/// compatible with any column, so callers skip the compatibility check
/// entirely rather than matching it against a class.
pub fn value_class_of(v: &FieldValue) -> Option<ValueClass> {
    match v {
        FieldValue::Null => None,
        FieldValue::I64(_) | FieldValue::True | FieldValue::False => Some(ValueClass::Int),
        FieldValue::F64(_) => Some(ValueClass::Real),
        FieldValue::Text(_) => Some(ValueClass::Text),
        FieldValue::Blob(_) => Some(ValueClass::Blob),
    }
}

/// True when a decoded value's class is compatible with a signature slot.
pub fn class_compatible(value_class: ValueClass, sig_class: ValueClass) -> bool {
    sig_class == ValueClass::Any || value_class == sig_class
}
