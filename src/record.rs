//! Decodes a SQLite record: a varint header length, followed by a packed
//! sequence of serial-type varints, followed by the field bodies those
//! serial types describe.

use crate::serial_type::{self, FieldValue};
use crate::varint;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("record header length exceeds the record's byte length")]
    HeaderPastEnd,
    #[error("field {0} runs past the end of the record")]
    FieldPastEnd(usize),
    #[error(transparent)]
    Varint(#[from] varint::Error),
    #[error(transparent)]
    SerialType(#[from] serial_type::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub index: usize,
    pub serial_type: i64,
    pub value: FieldValue,
    /// Byte width of this field's body (not counting its serial-type varint).
    pub width: usize,
}

/// A parsed record: owns its raw bytes (so the scavenger can truncate a
/// speculatively-decoded record down to just its parsed extent) and the
/// ordered list of decoded fields.
#[derive(Debug, Clone)]
pub struct Record {
    bytes: Vec<u8>,
    header_len: usize,
    fields: Vec<Field>,
}

impl Record {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let (header_length, header_len_varint_size) = varint::read_varint(bytes)?;
        let header_length = header_length as usize;
        if header_length > bytes.len() {
            return Err(Error::HeaderPastEnd);
        }

        let mut fields = Vec::new();
        let mut header_offset = header_len_varint_size;
        let mut field_offset = header_length;
        let mut col_idx = 0;

        while header_offset < header_length {
            let (serial_type, n) = varint::read_varint(&bytes[header_offset..])?;
            header_offset += n;
            let width = serial_type::width_of_serial_type(serial_type)?;

            if field_offset + width > bytes.len() {
                return Err(Error::FieldPastEnd(col_idx));
            }
            let value =
                serial_type::decode(serial_type, &bytes[field_offset..field_offset + width])?;
            fields.push(Field {
                index: col_idx,
                serial_type,
                value,
                width,
            });

            field_offset += width;
            col_idx += 1;
        }

        Ok(Record {
            bytes: bytes.to_vec(),
            header_len: header_length,
            fields,
        })
    }

    pub fn header(&self) -> &[u8] {
        &self.bytes[..self.header_len]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `len(header) + sum(field widths)`: the number of leading bytes of
    /// this record that were actually accounted for during parsing. Used
    /// by the scavenger to discard trailing bytes that were only present
    /// because it over-read a freeblock speculatively.
    pub fn parsed_len(&self) -> usize {
        self.header_len + self.fields.iter().map(|f| f.width).sum::<usize>()
    }

    /// Truncates the record's owned bytes down to [`Self::parsed_len`].
    pub fn truncate_to_parsed_len(&mut self) {
        let len = self.parsed_len();
        self.bytes.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_column_record() {
        // header: len=4 (varint 0x04), serial types 1 (i8), 13 (text len 0)
        // body: one byte for the i8
        let bytes = [0x04, 0x01, 0x0d, 0x2a];
        let record = Record::parse(&bytes).unwrap();
        assert_eq!(record.fields().len(), 2);
        assert_eq!(record.fields()[0].value, FieldValue::I64(42));
        assert_eq!(record.fields()[1].value, FieldValue::Text("".to_string()));
    }

    #[test]
    fn header_past_end_is_malformed() {
        let bytes = [0xFF];
        assert!(matches!(
            Record::parse(&bytes),
            Err(Error::Varint(_)) | Err(Error::HeaderPastEnd)
        ));
    }

    #[test]
    fn field_past_end_is_malformed() {
        // header says a 4-byte int follows but body is too short
        let bytes = [0x02, 0x04];
        assert_eq!(Record::parse(&bytes), Err(Error::FieldPastEnd(0)));
    }

    #[test]
    fn parsed_len_excludes_scavenged_trailing_bytes() {
        let mut bytes = vec![0x02, 0x08]; // header: len=2, serial type 8 (0 bytes)
        bytes.extend_from_slice(b"garbage-after-record");
        let mut record = Record::parse(&bytes).unwrap();
        assert_eq!(record.parsed_len(), 2);
        record.truncate_to_parsed_len();
        assert_eq!(record.bytes().len(), 2);
    }
}
