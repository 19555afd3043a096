//! Pointer-map pages, present in auto/incremental-vacuum databases, record a
//! "child to parent" pointer for every btree-nonroot, overflow, and freelist
//! page in the file. Used to reparent orphaned table-leaf pages by walking
//! an ancestor chain back to a btree root.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::pager::PageNum;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("ptrmap entry has unrecognized kind byte {0}")]
    BadKind(u8),
    #[error("ptrmap entry at page {0} of kind {1:?} has parent pointer {2}, expected zero")]
    ParentPointerShouldBeZero(PageNum, PtrmapKind, u32),
    #[error("ptrmap entry at page {0} of kind {1:?} has zero parent pointer")]
    ParentPointerShouldBeNonzero(PageNum, PtrmapKind),
    #[error("ptrmap page {0} too short to hold its entry table")]
    PageTooShort(PageNum),
}

/// The kind of page a ptrmap entry describes, per the 1-byte tag SQLite
/// writes into each 5-byte entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtrmapKind {
    BtreeRoot,
    Freelist,
    FirstOverflow,
    NonFirstOverflow,
    BtreeNonRoot,
}

impl PtrmapKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(PtrmapKind::BtreeRoot),
            2 => Some(PtrmapKind::Freelist),
            3 => Some(PtrmapKind::FirstOverflow),
            4 => Some(PtrmapKind::NonFirstOverflow),
            5 => Some(PtrmapKind::BtreeNonRoot),
            _ => None,
        }
    }
}

/// One decoded ptrmap entry: the page it describes, its kind, and the
/// "parent" page pointer (a btree page number for overflow/nonroot pages,
/// always zero for root and freelist pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtrmapEntry {
    pub page: PageNum,
    pub kind: PtrmapKind,
    pub parent_page_ptr: u32,
}

/// The number of ptrmap entries that fit in one ptrmap page.
pub fn entries_per_ptrmap_page(usable_size: u32) -> u32 {
    usable_size / 5
}

/// Whether `page` is itself a ptrmap page, given the usable page size.
/// Ptrmap pages start at page 2 and recur every `entries_per_page + 1`
/// pages thereafter.
pub fn is_ptrmap_page(page: PageNum, usable_size: u32) -> bool {
    if page < 2 {
        return false;
    }
    let stride = entries_per_ptrmap_page(usable_size) as usize + 1;
    (page - 2) % stride == 0
}

/// Decodes every ptrmap page in the file into a `page -> PtrmapEntry` map,
/// skipping over entries with kind byte 0 (unused, padding at the tail of
/// the last ptrmap page).
pub fn read_ptrmap(
    page_bytes: impl Fn(PageNum) -> Option<Vec<u8>>,
    size_in_pages: u32,
    usable_size: u32,
) -> Result<std::collections::HashMap<PageNum, PtrmapEntry>, Error> {
    let mut map = std::collections::HashMap::new();
    let entries_per_page = entries_per_ptrmap_page(usable_size);
    let mut ptrmap_page_idx: PageNum = 2;

    while ptrmap_page_idx as u32 <= size_in_pages {
        let bytes = page_bytes(ptrmap_page_idx).ok_or(Error::PageTooShort(ptrmap_page_idx))?;
        let entry_table_len = 5 * entries_per_page as usize;
        if bytes.len() < entry_table_len {
            return Err(Error::PageTooShort(ptrmap_page_idx));
        }

        for entry_idx in 0..entries_per_page as usize {
            let ptr_page_idx = ptrmap_page_idx + entry_idx + 1;
            let slice = &bytes[5 * entry_idx..5 * (entry_idx + 1)];
            let mut c = Cursor::new(slice);
            let kind_byte = c.read_u8().map_err(|_| Error::PageTooShort(ptrmap_page_idx))?;
            if kind_byte == 0 {
                break;
            }
            let parent_page_ptr = c
                .read_u32::<BigEndian>()
                .map_err(|_| Error::PageTooShort(ptrmap_page_idx))?;
            let kind = PtrmapKind::from_byte(kind_byte).ok_or(Error::BadKind(kind_byte))?;

            match kind {
                PtrmapKind::BtreeRoot | PtrmapKind::Freelist => {
                    if parent_page_ptr != 0 {
                        return Err(Error::ParentPointerShouldBeZero(
                            ptr_page_idx,
                            kind,
                            parent_page_ptr,
                        ));
                    }
                }
                PtrmapKind::FirstOverflow | PtrmapKind::NonFirstOverflow | PtrmapKind::BtreeNonRoot => {
                    if parent_page_ptr == 0 {
                        return Err(Error::ParentPointerShouldBeNonzero(ptr_page_idx, kind));
                    }
                }
            }

            map.insert(
                ptr_page_idx,
                PtrmapEntry {
                    page: ptr_page_idx,
                    kind,
                    parent_page_ptr,
                },
            );
        }

        ptrmap_page_idx += entries_per_page as usize + 1;
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ptrmap_page(entries: &[(u8, u32)], usable_size: u32) -> Vec<u8> {
        let mut page = vec![0u8; usable_size as usize];
        for (i, (kind, parent)) in entries.iter().enumerate() {
            page[5 * i] = *kind;
            page[5 * i + 1..5 * i + 5].copy_from_slice(&parent.to_be_bytes());
        }
        page
    }

    #[test]
    fn is_ptrmap_page_recurs_at_stride() {
        let usable = 20; // 4 entries per page, stride = 5
        assert!(is_ptrmap_page(2, usable));
        assert!(!is_ptrmap_page(3, usable));
        assert!(is_ptrmap_page(7, usable));
        assert!(!is_ptrmap_page(1, usable));
    }

    #[test]
    fn reads_root_and_overflow_entries() {
        let usable = 20u32; // 4 entries/page
        let page2 = make_ptrmap_page(&[(1, 0), (3, 9), (0, 0), (0, 0)], usable);
        let lookup = |pn: PageNum| if pn == 2 { Some(page2.clone()) } else { None };
        let map = read_ptrmap(lookup, 2, usable).unwrap();
        assert_eq!(map[&3].kind, PtrmapKind::BtreeRoot);
        assert_eq!(map[&3].parent_page_ptr, 0);
        assert_eq!(map[&4].kind, PtrmapKind::FirstOverflow);
        assert_eq!(map[&4].parent_page_ptr, 9);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn rejects_nonzero_parent_for_root_kind() {
        let usable = 20u32;
        let page2 = make_ptrmap_page(&[(1, 7)], usable);
        let lookup = |pn: PageNum| if pn == 2 { Some(page2.clone()) } else { None };
        assert_eq!(
            read_ptrmap(lookup, 2, usable),
            Err(Error::ParentPointerShouldBeZero(3, PtrmapKind::BtreeRoot, 7))
        );
    }

    #[test]
    fn rejects_bad_kind_byte() {
        let usable = 20u32;
        let page2 = make_ptrmap_page(&[(9, 1)], usable);
        let lookup = |pn: PageNum| if pn == 2 { Some(page2.clone()) } else { None };
        assert_eq!(read_ptrmap(lookup, 2, usable), Err(Error::BadKind(9)));
    }
}
