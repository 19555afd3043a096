//! A recovered table: its schema (columns, type signature), root page, and
//! the ordered list of leaf pages that make up its B-tree, including any
//! orphaned pages adopted by the reparenter.

use crate::btree::{self, table::RowIterator};
use crate::heuristic::Heuristic;
use crate::pager::{PageCache, PageNum};
use crate::record::Record;
use crate::scavenger::{self, RecoveredRecord};
use crate::serial_type::{self, ValueClass};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Btree(#[from] btree::Error),
}

pub struct Table {
    name: String,
    columns: Vec<String>,
    signature: Option<Vec<ValueClass>>,
    root_page: PageNum,
    leaves: Vec<PageNum>,
    orphan_reparented: bool,
}

impl Table {
    pub fn new(
        name: String,
        root_page: PageNum,
        columns: Vec<String>,
        signature: Option<Vec<ValueClass>>,
        leaves: Vec<PageNum>,
    ) -> Self {
        Table {
            name,
            columns,
            signature,
            root_page,
            leaves,
            orphan_reparented: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn root_page(&self) -> PageNum {
        self.root_page
    }

    pub fn leaves(&self) -> &[PageNum] {
        &self.leaves
    }

    pub fn orphan_reparented(&self) -> bool {
        self.orphan_reparented
    }

    /// Adopts an orphaned table-leaf page discovered by the reparenter.
    pub fn adopt_orphan_leaf(&mut self, page: PageNum) {
        self.leaves.push(page);
        self.orphan_reparented = true;
    }

    /// Iterates the live rows of this table across all of its leaf pages.
    pub fn live_rows<'a>(&self, cache: &'a PageCache) -> RowIterator<'a> {
        RowIterator::new(cache, self.leaves.clone())
    }

    /// Runs the freeblock scavenger over every leaf page of this table,
    /// using `heuristic` to locate candidate record starts.
    pub fn recover(
        &self,
        cache: &PageCache,
        heuristic: &Heuristic,
    ) -> Result<Vec<RecoveredRecord>, btree::Error> {
        let mut out = Vec::new();
        for &pgnum in &self.leaves {
            out.extend(scavenger::scavenge_page(cache, pgnum, heuristic)?);
        }
        Ok(out)
    }

    /// True iff `record` has no more fields than the signature has columns,
    /// and every non-null field's value class is compatible with the
    /// corresponding signature slot (or that slot is `Any`). A record with
    /// fewer fields than the signature is allowed -- `ALTER TABLE ADD
    /// COLUMN` can leave older rows with fewer stored fields than the
    /// current schema.
    pub fn signature_match(&self, record: &Record) -> bool {
        let sig = match &self.signature {
            Some(s) => s,
            None => return false,
        };
        if record.fields().len() > sig.len() {
            return false;
        }
        record.fields().iter().enumerate().all(|(i, field)| {
            match serial_type::value_class_of(&field.value) {
                None => true,
                Some(class) => serial_type::class_compatible(class, sig[i]),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_table(signature: Vec<ValueClass>) -> Table {
        Table::new(
            "t".to_string(),
            1,
            vec!["a".to_string(), "b".to_string()],
            Some(signature),
            vec![1],
        )
    }

    #[test]
    fn adopting_orphan_sets_flag_and_appends_leaf() {
        let mut t = make_table(vec![ValueClass::Int, ValueClass::Text]);
        assert!(!t.orphan_reparented());
        t.adopt_orphan_leaf(42);
        assert!(t.orphan_reparented());
        assert_eq!(t.leaves(), &[1, 42]);
    }

    #[test]
    fn signature_match_allows_fewer_fields_than_columns() {
        let t = make_table(vec![ValueClass::Int, ValueClass::Text]);
        // header len=2, one field: serial type 9 (True, class Int)
        let record = Record::parse(&[0x02, 0x09]).unwrap();
        assert!(t.signature_match(&record));
    }

    #[test]
    fn signature_match_rejects_more_fields_than_columns() {
        let t = make_table(vec![ValueClass::Int]);
        // header len=3, two fields: 9 (True), 9 (True)
        let record = Record::parse(&[0x03, 0x09, 0x09]).unwrap();
        assert!(!t.signature_match(&record));
    }

    #[test]
    fn signature_match_rejects_incompatible_class() {
        let t = make_table(vec![ValueClass::Text]);
        // header len=2, one field: serial type 9 (True, class Int) vs sig Text
        let record = Record::parse(&[0x02, 0x09]).unwrap();
        assert!(!t.signature_match(&record));
    }
}
