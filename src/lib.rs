//! A read-only SQLite forensic recovery library.
//!
//! Given a raw `.sqlite` file -- possibly truncated, possibly missing a
//! rollback journal, possibly with its freelist or pointer-map in a state no
//! live `sqlite3` build would produce -- [`Db::open`] classifies every page,
//! learns the schema from `sqlite_master`, and exposes both the live rows of
//! each table and, via [`Db::recover`], rows that were deleted but still
//! live on in freeblock space.

pub mod btree;
pub mod classify;
pub mod db;
pub mod dbheader;
pub mod heuristic;
pub mod pager;
pub mod ptrmap;
pub mod record;
pub mod scavenger;
pub mod schema;
pub mod serial_type;
pub mod table;
pub mod varint;

pub use db::Db;
pub use table::Table;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Varint(#[from] varint::Error),
    #[error(transparent)]
    Dbheader(#[from] dbheader::Error),
    #[error(transparent)]
    Pager(#[from] pager::Error),
    #[error(transparent)]
    Btree(#[from] btree::Error),
    #[error(transparent)]
    Record(#[from] record::Error),
    #[error(transparent)]
    SerialType(#[from] serial_type::Error),
    #[error(transparent)]
    Ptrmap(#[from] ptrmap::Error),
    #[error(transparent)]
    Classify(#[from] classify::Error),
    #[error(transparent)]
    Schema(#[from] schema::Error),
    #[error(transparent)]
    Heuristic(#[from] heuristic::Error),
    #[error(transparent)]
    Db(#[from] db::Error),
}
