//! Enumerates the leaf pages of a table B-tree, and iterates the live rows
//! stored across them. Hides the fact that a btree spans several pages.

use std::collections::VecDeque;

use super::{header, interior, leaf, Error, PageType, RowId};
use crate::pager::{PageCache, PageNum};

/// Result of a table B-tree walk: every page visited (so the caller can
/// record page->table association for interior pages too) and the subset
/// that are leaves, in traversal order.
pub struct WalkResult {
    pub visited: Vec<PageNum>,
    pub leaves: Vec<PageNum>,
}

/// BFS over a table's B-tree starting at `root`: the right-most child of
/// every interior page plus each cell's left child are queued; leaf pages
/// are appended to the result in traversal order.
pub fn walk_table_btree(cache: &PageCache, root: PageNum) -> Result<WalkResult, Error> {
    let mut visited = Vec::new();
    let mut leaves = Vec::new();
    let mut queue: VecDeque<PageNum> = VecDeque::new();
    queue.push_back(root);

    while let Some(pgnum) = queue.pop_front() {
        visited.push(pgnum);
        let page = cache.get_page(pgnum).map_err(|_| Error::PageTooShort)?;
        let offset = leaf::Iterator::btree_start_offset(pgnum);
        let hdr = header::check_header(page, offset)?;
        match hdr.btree_page_type {
            PageType::TableLeaf => {
                leaves.push(pgnum);
            }
            PageType::TableInterior => {
                let ci = super::cell::Iterator::new(page, &hdr, offset, cache.page_size() as u32)?;
                let rmp = hdr
                    .rightmost_pointer
                    .expect("interior page header always carries a rightmost pointer")
                    as PageNum;
                let scan = interior::ScanIterator::new(ci, rmp);
                for child in scan {
                    queue.push_back(child?);
                }
            }
            PageType::IndexInterior | PageType::IndexLeaf => {
                // Index pages are classified but not traversed as table content.
            }
        }
    }
    Ok(WalkResult { visited, leaves })
}

/// Iterates the live (rowid, payload) rows of one table, across every leaf
/// page of its B-tree, in leaf traversal order.
pub struct RowIterator<'a> {
    cache: &'a PageCache,
    leaf_pages: std::vec::IntoIter<PageNum>,
    current: Option<leaf::Iterator<'a>>,
}

impl<'a> RowIterator<'a> {
    pub fn new(cache: &'a PageCache, leaf_pages: Vec<PageNum>) -> Self {
        RowIterator {
            cache,
            leaf_pages: leaf_pages.into_iter(),
            current: None,
        }
    }
}

impl<'a> core::iter::Iterator for RowIterator<'a> {
    type Item = Result<(RowId, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cur) = self.current.as_mut() {
                if let Some(item) = cur.next() {
                    return Some(item);
                }
                self.current = None;
            }
            let next_page = self.leaf_pages.next()?;
            let page = match self.cache.get_page(next_page) {
                Ok(p) => p,
                Err(_) => return Some(Err(Error::PageTooShort)),
            };
            let offset = leaf::Iterator::btree_start_offset(next_page);
            let hdr = match header::check_header(page, offset) {
                Ok(h) => h,
                Err(e) => return Some(Err(e)),
            };
            match leaf::Iterator::new(self.cache, next_page, &hdr) {
                Ok(it) => self.current = Some(it),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
