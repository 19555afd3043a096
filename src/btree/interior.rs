//! Iterates over the cells of a table-interior (0x05) page.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::cell;
use super::{Error, RowId};
use crate::pager::PageNum;
use crate::varint;

/// Decodes one table-interior cell: a 4-byte left-child page number
/// followed by a varint integer key.
pub fn decode_cell(cell: &[u8]) -> Result<(PageNum, RowId), Error> {
    let mut c = Cursor::new(cell);
    let left_child = c
        .read_u32::<BigEndian>()
        .map_err(|_| Error::PageTooShort)?;
    let (key, _) = varint::read_varint(&cell[4..])?;
    Ok((left_child as PageNum, key))
}

/// Iterator over the child pointers of a table-interior page, for full
/// scans (table builder BFS). Produces each cell's left child followed,
/// last, by the page's right-most child pointer.
pub struct ScanIterator<'a> {
    ci: cell::Iterator<'a>,
    returned_rightmost: bool,
    rightmost_pointer: PageNum,
}

impl<'a> ScanIterator<'a> {
    pub fn new(ci: cell::Iterator<'a>, rightmost_pointer: PageNum) -> Self {
        ScanIterator {
            ci,
            returned_rightmost: false,
            rightmost_pointer,
        }
    }
}

impl<'a> core::iter::Iterator for ScanIterator<'a> {
    type Item = Result<PageNum, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.returned_rightmost {
            return None;
        }
        match self.ci.next() {
            None => {
                self.returned_rightmost = true;
                Some(Ok(self.rightmost_pointer))
            }
            Some(cell) => Some(decode_cell(cell).map(|(left_child, _key)| left_child)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::header;

    fn interior_page_with_two_children() -> Vec<u8> {
        let mut page = vec![0u8; 512];
        page[0] = 0x05;
        page[3..5].copy_from_slice(&1u16.to_be_bytes()); // num_cells = 1
        page[5..7].copy_from_slice(&500u16.to_be_bytes()); // cell_content_start
        page[8..12].copy_from_slice(&9u32.to_be_bytes()); // rightmost pointer = page 9

        // cell pointer array entry at offset 12 -> cell at 500
        page[12..14].copy_from_slice(&500u16.to_be_bytes());
        // cell at 500: left_child=4, key=varint(42)
        page[500..504].copy_from_slice(&4u32.to_be_bytes());
        page[504] = 42;
        page
    }

    #[test]
    fn scans_children_then_rightmost() {
        let page = interior_page_with_two_children();
        let header = header::check_header(&page, 0).unwrap();
        let ci = cell::Iterator::new(&page, &header, 0, 512).unwrap();
        let mut scan = ScanIterator::new(ci, header.rightmost_pointer.unwrap() as PageNum);
        assert_eq!(scan.next().unwrap().unwrap(), 4);
        assert_eq!(scan.next().unwrap().unwrap(), 9);
        assert!(scan.next().is_none());
    }

    #[test]
    fn decodes_cell_left_child_and_key() {
        let mut cell = vec![0u8; 5];
        cell[0..4].copy_from_slice(&7u32.to_be_bytes());
        cell[4] = 42;
        let (left_child, key) = decode_cell(&cell).unwrap();
        assert_eq!(left_child, 7);
        assert_eq!(key, 42);
    }
}
