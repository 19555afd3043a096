//! Ties the whole pipeline together: opens a file, classifies every page,
//! learns the schema from `sqlite_master`, builds each table's leaf list,
//! and reparents orphaned leaf pages. Everything runs eagerly at `open`
//! time, matching the teacher crate's own eager `StoredDb::open`.

use std::collections::HashMap;

use crate::btree::{self, header, table::walk_table_btree};
use crate::classify::{self, PageLabel};
use crate::heuristic::Heuristic;
use crate::pager::{self, PageCache, PageNum};
use crate::ptrmap::PtrmapEntry;
use crate::record::Record;
use crate::schema;
use crate::table::Table;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Pager(#[from] pager::Error),
    #[error(transparent)]
    Classify(#[from] classify::Error),
    #[error(transparent)]
    Btree(#[from] btree::Error),
    #[error(transparent)]
    Record(#[from] crate::record::Error),
    #[error("invalid search pattern: {0}")]
    BadPattern(#[from] regex::Error),
}

pub struct Db {
    cache: PageCache,
    page_types: HashMap<PageNum, PageLabel>,
    ptrmap: HashMap<PageNum, PtrmapEntry>,
    tables: HashMap<String, Table>,
    page_table: HashMap<PageNum, String>,
}

impl Db {
    pub fn open(path: &str) -> Result<Self, Error> {
        let cache = PageCache::open(path)?;
        Self::open_cache(cache)
    }

    /// Runs the pipeline against an already-built page cache. Exposed
    /// separately so tests can build a fake database in memory.
    pub fn open_cache(cache: PageCache) -> Result<Self, Error> {
        let classification = classify::classify(&cache)?;
        let mut page_table: HashMap<PageNum, String> = HashMap::new();

        let master_walk = walk_table_btree(&cache, 1)?;
        let mut tables = HashMap::new();

        let builtins = schema::builtin_table_columns();
        let master_columns: Vec<String> = builtins["sqlite_master"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let master_table = Table::new(
            "sqlite_master".to_string(),
            1,
            master_columns,
            None,
            master_walk.leaves.clone(),
        );

        let mut learned: Vec<(String, PageNum, Vec<String>, Vec<crate::serial_type::ValueClass>)> =
            Vec::new();
        for leaf in &master_walk.leaves {
            for row in crate::btree::leaf::Iterator::new(
                &cache,
                *leaf,
                &header::check_header(
                    cache.get_page(*leaf)?,
                    crate::btree::leaf::Iterator::btree_start_offset(*leaf),
                )?,
            )? {
                let (_rowid, payload) = row?;
                let record = Record::parse(&payload)?;
                let fields = record.fields();
                if fields.len() < 5 {
                    continue;
                }
                let row_type = field_text(&fields[0]);
                let name = field_text(&fields[1]);
                let root_page = field_int(&fields[3]);
                let sql = field_text(&fields[4]);
                if row_type.as_deref() != Some("table") {
                    continue;
                }
                let (name, columns, signature) = match schema::parse_create_table(&sql.unwrap_or_default())
                {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        log::warn!("couldn't parse schema for {:?}: {}", name, e);
                        continue;
                    }
                };
                if let Some(root_page) = root_page {
                    learned.push((name, root_page as PageNum, columns, signature));
                }
            }
        }

        for pgnum in &master_walk.visited {
            page_table.insert(*pgnum, "sqlite_master".to_string());
        }

        for (name, root_page, columns, signature) in learned {
            let walk = match walk_table_btree(&cache, root_page) {
                Ok(w) => w,
                Err(e) => {
                    log::error!("couldn't walk table {:?} rooted at {}: {}", name, root_page, e);
                    continue;
                }
            };
            for pgnum in &walk.visited {
                page_table.insert(*pgnum, name.clone());
            }
            let table = Table::new(name.clone(), root_page, columns, Some(signature), walk.leaves);
            tables.insert(name, table);
        }

        let mut db = Db {
            cache,
            page_types: classification.labels,
            ptrmap: classification.ptrmap,
            tables,
            page_table,
        };
        db.tables
            .insert("sqlite_master".to_string(), master_table);
        db.reparent_orphans();
        Ok(db)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn page_label(&self, pgnum: PageNum) -> Option<PageLabel> {
        self.page_types.get(&pgnum).copied()
    }

    /// Walks the ancestor chain of `page` via the ptrmap until it finds a
    /// page already associated with a table, or runs out of parent links.
    fn ancestor_table(&self, page: PageNum) -> Option<String> {
        let mut current = page;
        loop {
            if let Some(name) = self.page_table.get(&current) {
                return Some(name.clone());
            }
            let entry = self.ptrmap.get(&current)?;
            if entry.parent_page_ptr == 0 {
                return None;
            }
            current = entry.parent_page_ptr as PageNum;
        }
    }

    fn reparent_orphans(&mut self) {
        let candidate_pages: Vec<PageNum> = self
            .page_types
            .iter()
            .filter(|(_, label)| {
                matches!(label, PageLabel::BtreeRoot | PageLabel::BtreeNonRoot)
            })
            .map(|(pg, _)| *pg)
            .filter(|pg| !self.page_table.contains_key(pg))
            .collect();

        let mut reparented = 0usize;
        for page in candidate_pages {
            let page_bytes = match self.cache.get_page(page) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let offset = crate::btree::leaf::Iterator::btree_start_offset(page);
            let hdr = match header::check_header(page_bytes, offset) {
                Ok(h) => h,
                Err(_) => continue,
            };
            if hdr.btree_page_type != btree::PageType::TableLeaf {
                continue;
            }

            if let Some(name) = self.ancestor_table(page) {
                if let Some(table) = self.tables.get_mut(&name) {
                    table.adopt_orphan_leaf(page);
                    self.page_table.insert(page, name);
                    reparented += 1;
                    continue;
                }
            }

            let it = match crate::btree::leaf::Iterator::new(&self.cache, page, &hdr) {
                Ok(it) => it,
                Err(_) => continue,
            };
            let mut rows = it;
            let first_row = match rows.next() {
                Some(Ok(r)) => r,
                _ => continue,
            };
            let record = match Record::parse(&first_row.1) {
                Ok(r) => r,
                Err(_) => continue,
            };

            let matches: Vec<String> = self
                .tables
                .values()
                .filter(|t| t.signature_match(&record))
                .map(|t| t.name().to_string())
                .collect();

            match matches.as_slice() {
                [one] => {
                    if let Some(table) = self.tables.get_mut(one) {
                        table.adopt_orphan_leaf(page);
                        self.page_table.insert(page, one.clone());
                        reparented += 1;
                    }
                }
                [] => log::error!("no matching table signature for orphan page {}", page),
                many => log::error!(
                    "ambiguous signature match for orphan page {}: {:?}",
                    page,
                    many
                ),
            }
        }
        if reparented > 0 {
            log::info!("reparented {} orphaned leaf page(s)", reparented);
        }
    }

    /// Searches every page for `needle` (treated as raw bytes), returning
    /// `(page, offset)` for every match. Logs a warning if nothing at all
    /// was found across the whole file.
    pub fn grep(&self, needle: &str) -> Result<Vec<(PageNum, usize)>, Error> {
        let re = regex::bytes::Regex::new(needle)?;
        let mut hits = Vec::new();
        let mut match_found = false;
        for pgnum in 1..=(self.cache.page_count() as PageNum) {
            let page = match self.cache.get_page(pgnum) {
                Ok(p) => p,
                Err(_) => continue,
            };
            for m in re.find_iter(page) {
                hits.push((pgnum, m.start()));
                match_found = true;
            }
        }
        if !match_found {
            log::warn!("search term {:?} not found", needle);
        }
        Ok(hits)
    }

    /// Recovers deleted rows for `table_name` using `heuristic`.
    pub fn recover(
        &self,
        table_name: &str,
        heuristic: &Heuristic,
    ) -> Result<Vec<crate::scavenger::RecoveredRecord>, btree::Error> {
        match self.tables.get(table_name) {
            Some(table) => table.recover(&self.cache, heuristic),
            None => Ok(Vec::new()),
        }
    }
}

fn field_text(field: &crate::record::Field) -> Option<String> {
    match &field.value {
        crate::serial_type::FieldValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn field_int(field: &crate::record::Field) -> Option<i64> {
    match &field.value {
        crate::serial_type::FieldValue::I64(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 16] = [
        0x53, 0x51, 0x4c, 0x69, 0x74, 0x65, 0x20, 0x66, 0x6f, 0x72, 0x6d, 0x61, 0x74, 0x20, 0x33,
        0x00,
    ];

    fn empty_db() -> Vec<u8> {
        let mut page1 = vec![0u8; 512];
        page1[0..16].copy_from_slice(&MAGIC);
        page1[16..18].copy_from_slice(&512u16.to_be_bytes());
        page1[18] = 1;
        page1[19] = 1;
        page1[24..28].copy_from_slice(&1u32.to_be_bytes());
        page1[28..32].copy_from_slice(&1u32.to_be_bytes()); // 1 page
        page1[44..48].copy_from_slice(&4u32.to_be_bytes());
        page1[92..96].copy_from_slice(&1u32.to_be_bytes());

        // sqlite_master btree header at offset 100: table-leaf, 0 cells.
        page1[100] = 0x0d;
        page1[105..107].copy_from_slice(&512u16.to_be_bytes()); // cell_content_start
        page1
    }

    #[test]
    fn opens_a_db_with_no_user_tables() {
        let cache = PageCache::from_bytes(empty_db()).unwrap();
        let db = Db::open_cache(cache).unwrap();
        assert!(db.table("sqlite_master").is_some());
        assert_eq!(db.tables().count(), 1);
    }

    #[test]
    fn grep_reports_no_hits_without_erroring() {
        let cache = PageCache::from_bytes(empty_db()).unwrap();
        let db = Db::open_cache(cache).unwrap();
        let hits = db.grep("needle").unwrap();
        assert!(hits.is_empty());
    }
}
