//! `cell::Iterator` iterates over the raw cell slices of a b-tree page,
//! without interpreting what kind of cell they are.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

use super::header::Header;
use super::Error;

/// Iterator over cells within a page, without interpreting the cell contents.
pub struct Iterator<'a> {
    page: &'a [u8],
    cell_idx: usize,
    cell_offsets: Vec<usize>,
    cell_lengths: Vec<usize>,
}

impl<'a> Iterator<'a> {
    /// Creates an iterator over the cells of a single page of a btree.
    ///
    /// Each item produced is a slice of bytes beginning at the cell's
    /// offset and extending to the start of the previous cell in the
    /// pointer array (cells are packed from the end of the page backwards).
    pub fn new(
        page: &'a [u8],
        header: &Header,
        non_btree_header_bytes: usize,
        page_size: u32,
    ) -> Result<Self, Error> {
        let mut c = Cursor::new(page);
        c.seek(SeekFrom::Start(
            (header.header_size() + non_btree_header_bytes) as u64,
        ))
        .map_err(|_| Error::PageTooShort)?;

        let mut it = Iterator {
            page,
            cell_idx: 0,
            cell_offsets: Vec::new(),
            cell_lengths: Vec::new(),
        };

        // """
        // The cell pointer array of a b-tree page immediately follows the b-tree page header.
        // Let K be the number of cells on the btree. The cell pointer array consists of K 2-byte
        // integer offsets to the cell contents. The cell pointers are arranged in key order with
        // left-most cell (the cell with the smallest key) first and the right-most cell (the cell
        // with the largest key) last.
        // """
        let mut last_offset: usize = page_size as usize;
        for _ in 0..header.num_cells {
            let off = c
                .read_u16::<BigEndian>()
                .map_err(|_| Error::PageTooShort)? as usize;
            it.cell_offsets.push(off);
            it.cell_lengths.push(last_offset.saturating_sub(off));
            last_offset = off;
        }

        if let Some(min_offset) = it.min_cell_offset() {
            let declared = header.cell_content_start as usize;
            if min_offset != declared {
                debug_assert_eq!(min_offset, declared);
                log::warn!(
                    "cell pointer array's minimum offset {} disagrees with the header's \
                     cell_content_start {}",
                    min_offset,
                    declared
                );
            }
        }

        Ok(it)
    }

    /// The minimum cell offset seen in the pointer array; backs the
    /// `min(cell_pointer_array) == cell_content_offset` consistency check
    /// run at construction time.
    pub fn min_cell_offset(&self) -> Option<usize> {
        self.cell_offsets.iter().copied().min()
    }
}

impl<'a> core::iter::Iterator for Iterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.cell_idx >= self.cell_offsets.len() {
            return None;
        }
        let b = self.cell_offsets[self.cell_idx];
        let e = b + self.cell_lengths[self.cell_idx];
        self.cell_idx += 1;
        self.page.get(b..e)
    }
}

// From command: xxd resources/test/multipage-512B-page.db
#[cfg(test)]
const TEST_PAGE: &str = "0d00 0000 0a01 ce00 01fb 01f6 01f1 01ec
01e7 01e2 01dd 01d8 01d3 01ce 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 030a
020f 4a03 0902 0f49 0308 020f 4803 0702
0f47 0306 020f 4603 0502 0f45 0304 020f
4403 0302 0f43 0302 020f 4203 0102 0f41";

#[cfg(test)]
mod tests {
    use super::*;
    use hex::FromHex;

    #[test]
    fn test_cell_iterator() {
        let p: Vec<u8> =
            Vec::from_hex(TEST_PAGE.replace([' ', '\n'], "")).expect("Invalid Hex String");
        assert_eq!(p.len(), 512);
        let header = super::super::header::check_header(&p, 0).unwrap();
        let mut ci = Iterator::new(&p, &header, 0, 512).unwrap();
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0301020f41").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0302020f42").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0303020f43").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0304020f44").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0305020f45").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0306020f46").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0307020f47").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0308020f48").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("0309020f49").unwrap());
        assert_eq!(ci.next().unwrap(), Vec::from_hex("030a020f4a").unwrap());
        assert_eq!(ci.next(), None);
    }
}

// Cell Formats from https://www.sqlite.org/fileformat2.html#b_tree_pages
//
// Table B-Tree Leaf Cell (header 0x0d):
// A varint which is the total number of bytes of payload, including any overflow
// A varint which is the integer key, a.k.a. "rowid"
// The initial portion of the payload that does not spill to overflow pages.
// A 4-byte big-endian integer page number for the first page of the overflow page list - omitted if all payload fits on the b-tree page.
//
// Table B-Tree Interior Cell (header 0x05):
// A 4-byte big-endian page number which is the left child pointer.
// A varint which is the integer key
