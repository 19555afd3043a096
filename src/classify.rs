//! The page classifier: three passes over the page cache that assign every
//! page a type label, combining the freelist chain, the pointer-map pages,
//! and (as a fallback) inspection of each page's own B-tree header byte.

use std::collections::HashMap;

use crate::btree::PageType;
use crate::dbheader::DbfileHeader;
use crate::pager::{PageCache, PageNum};
use crate::ptrmap::{self, PtrmapEntry, PtrmapKind};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("freelist walk found {found} trunk+leaf pages, header declares {declared}")]
    FreelistCountMismatch { found: u32, declared: u32 },
    #[error("freelist trunk page {0} too short for its header")]
    FreelistTrunkTooShort(PageNum),
    #[error(transparent)]
    Ptrmap(#[from] ptrmap::Error),
    #[error("page read failed during classification")]
    PageReadFailed,
}

/// The type label a page carries once classification completes. Matches
/// the label set the classifier assigns: pages found via the freelist or
/// ptrmap walk get a precise label; pages that fall through to B-tree
/// header inspection without a ptrmap to confirm root-ness default to
/// `BtreeNonRoot` (the schema learner later knows the true table/index
/// root pages and may re-label them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLabel {
    FreelistTrunk,
    FreelistLeaf,
    Ptrmap,
    FirstOverflow,
    NonFirstOverflow,
    BtreeRoot,
    BtreeNonRoot,
    Unknown,
}

pub struct Classification {
    pub labels: HashMap<PageNum, PageLabel>,
    pub ptrmap: HashMap<PageNum, PtrmapEntry>,
}

fn read_u32_be(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
}

/// Pass 1: walk the freelist trunk chain, labelling every trunk and leaf
/// page. Returns the count of trunk+leaf pages visited.
fn walk_freelist(
    cache: &PageCache,
    header: &DbfileHeader,
    labels: &mut HashMap<PageNum, PageLabel>,
) -> Result<u32, Error> {
    let mut trunk_idx = header.first_freelist_trunk as PageNum;
    let mut count = 0u32;

    while trunk_idx != 0 {
        labels.insert(trunk_idx, PageLabel::FreelistTrunk);
        count += 1;

        let page = cache.get_page(trunk_idx).map_err(|_| Error::PageReadFailed)?;
        let next_trunk =
            read_u32_be(page, 0).ok_or(Error::FreelistTrunkTooShort(trunk_idx))? as PageNum;
        let leaf_count =
            read_u32_be(page, 4).ok_or(Error::FreelistTrunkTooShort(trunk_idx))? as usize;

        for i in 0..leaf_count {
            let leaf_idx = read_u32_be(page, 8 + 4 * i)
                .ok_or(Error::FreelistTrunkTooShort(trunk_idx))? as PageNum;
            labels.insert(leaf_idx, PageLabel::FreelistLeaf);
            count += 1;
        }

        trunk_idx = next_trunk;
    }

    Ok(count)
}

fn walk_ptrmap(
    cache: &PageCache,
    header: &DbfileHeader,
    labels: &mut HashMap<PageNum, PageLabel>,
) -> Result<HashMap<PageNum, PtrmapEntry>, Error> {
    if header.largest_btree_page == 0 {
        return Ok(HashMap::new());
    }

    let usable = header.usable_size();
    let entries_per_page = ptrmap::entries_per_ptrmap_page(usable);
    let stride = entries_per_page as usize + 1;

    let map = ptrmap::read_ptrmap(
        |pn| cache.get_page(pn).ok().map(|p| p.to_vec()),
        header.size_in_pages,
        usable,
    )?;

    let mut ptrmap_idx: PageNum = 2;
    while ptrmap_idx as u32 <= header.size_in_pages {
        labels.insert(ptrmap_idx, PageLabel::Ptrmap);
        ptrmap_idx += stride;
    }

    for entry in map.values() {
        match entry.kind {
            PtrmapKind::BtreeRoot => {
                labels.insert(entry.page, PageLabel::BtreeRoot);
            }
            PtrmapKind::Freelist => {
                debug_assert!(matches!(
                    labels.get(&entry.page),
                    Some(PageLabel::FreelistTrunk) | Some(PageLabel::FreelistLeaf)
                ));
            }
            PtrmapKind::FirstOverflow => {
                labels.insert(entry.page, PageLabel::FirstOverflow);
            }
            PtrmapKind::NonFirstOverflow => {
                labels.insert(entry.page, PageLabel::NonFirstOverflow);
            }
            PtrmapKind::BtreeNonRoot => {
                labels.insert(entry.page, PageLabel::BtreeNonRoot);
            }
        }
    }

    Ok(map)
}

/// Pass 3: any page not yet labelled is attempted as a B-tree page by
/// reading its first byte.
fn inspect_remaining(
    cache: &PageCache,
    header: &DbfileHeader,
    labels: &mut HashMap<PageNum, PageLabel>,
) {
    for pgnum in 1..=(header.size_in_pages as PageNum) {
        if labels.contains_key(&pgnum) {
            continue;
        }
        if cache.is_lock_byte_page(pgnum) {
            continue;
        }
        let page = match cache.get_page(pgnum) {
            Ok(p) => p,
            Err(_) => {
                labels.insert(pgnum, PageLabel::Unknown);
                continue;
            }
        };
        let offset = if pgnum == 1 {
            crate::dbheader::SQLITE_DB_HEADER_BYTES
        } else {
            0
        };
        let label = match page.get(offset).copied().and_then(PageType::from_byte) {
            Some(_) => PageLabel::BtreeNonRoot,
            None => PageLabel::Unknown,
        };
        labels.insert(pgnum, label);
    }
}

/// Runs all three classification passes and returns the resulting label
/// map plus the decoded ptrmap (empty if the file carries none).
pub fn classify(cache: &PageCache) -> Result<Classification, Error> {
    let header = cache.header();
    let mut labels = HashMap::new();

    let freelist_count = if header.first_freelist_trunk != 0 {
        walk_freelist(cache, header, &mut labels)?
    } else {
        0
    };
    if freelist_count != header.freelist_page_count {
        debug_assert_eq!(freelist_count, header.freelist_page_count);
        log::warn!(
            "freelist walk found {} pages but header declares {}",
            freelist_count,
            header.freelist_page_count
        );
    }

    let ptrmap = walk_ptrmap(cache, header, &mut labels)?;
    inspect_remaining(cache, header, &mut labels);

    Ok(Classification { labels, ptrmap })
}
