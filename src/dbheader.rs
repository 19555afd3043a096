//! dbheader reads the 100-byte file header of a SQLite database file.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("the magic bytes for this file are wrong")]
    WrongMagic,
    #[error("page size {0} is not a supported SQLite page size")]
    UnsupportedPagesize(u32),
    #[error("header declares {pages} pages of {pagesize} bytes ({declared} bytes), file is only {actual} bytes")]
    FileTooShort {
        pages: u32,
        pagesize: u32,
        declared: u64,
        actual: u64,
    },
    #[error("file_change_counter ({counter}) does not match version_valid_for ({valid_for})")]
    VersionMismatch { counter: u32, valid_for: u32 },
    #[error("reserved expansion bytes are non-zero")]
    ReservedNotZero,
    #[error("error reading file")]
    ReadFailed,
}

pub const SQLITE_DB_HEADER_BYTES: usize = 100;
const SQLITE3_MAGIC_STRING: &[u8] = &[
    0x53, 0x51, 0x4c, 0x69, 0x74, 0x65, 0x20, 0x66, 0x6f, 0x72, 0x6d, 0x61, 0x74, 0x20, 0x33, 0x00,
];

/// The full database file header, all twelve u32 fields retained so that
/// the page classifier and the ptrmap walk can read them directly rather
/// than re-deriving them from the page cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbfileHeader {
    pub pagesize: u32,
    pub write_version: u8,
    pub read_version: u8,
    pub reserved_tail: u8,
    pub max_payload_fraction: u8,
    pub min_payload_fraction: u8,
    pub leaf_payload_fraction: u8,
    pub file_change_counter: u32,
    pub size_in_pages: u32,
    pub first_freelist_trunk: u32,
    pub freelist_page_count: u32,
    pub schema_cookie: u32,
    pub schema_format: u32,
    pub default_page_cache_size: u32,
    pub largest_btree_page: u32,
    pub text_encoding: u32,
    pub user_version: u32,
    pub incremental_vacuum: u32,
    pub application_id: u32,
    pub version_valid_for: u32,
    pub sqlite_version_number: u32,
}

impl DbfileHeader {
    pub fn usable_size(&self) -> u32 {
        self.pagesize - self.reserved_tail as u32
    }

    /// True when this file uses pointer-map pages (autovacuum enabled).
    pub fn has_ptrmap(&self) -> bool {
        self.largest_btree_page != 0
    }
}

pub fn get_header_clone(f: &mut std::fs::File) -> Result<DbfileHeader, Error> {
    let file_len = f.metadata().map_err(|_| Error::ReadFailed)?.len();
    let mut v = vec![0_u8; SQLITE_DB_HEADER_BYTES];
    f.seek(SeekFrom::Start(0)).map_err(|_| Error::ReadFailed)?;
    f.read_exact(&mut v[..]).map_err(|_| Error::ReadFailed)?;
    let mut c = Cursor::new(v);
    get_header(&mut c, file_len)
}

pub fn get_header<R: Read + Seek>(f: &mut R, file_len: u64) -> Result<DbfileHeader, Error> {
    f.seek(SeekFrom::Start(0)).map_err(|_| Error::ReadFailed)?;

    // Offset 0, 16 bytes: magic string "SQLite format 3\0"
    let mut fileid_buffer = [0; 16];
    f.read_exact(&mut fileid_buffer)
        .map_err(|_| Error::ReadFailed)?;
    if fileid_buffer != SQLITE3_MAGIC_STRING {
        return Err(Error::WrongMagic);
    }

    // Offset 16, 2 bytes: page size. 1 means 65536.
    let pagesize_raw = f.read_u16::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let pagesize: u32 = match pagesize_raw {
        512 => 512,
        1024 => 1024,
        2048 => 2048,
        4096 => 4096,
        8192 => 8192,
        16384 => 16384,
        32768 => 32768,
        1 => 65536,
        other => return Err(Error::UnsupportedPagesize(other as u32)),
    };

    let write_version = f.read_u8().map_err(|_| Error::ReadFailed)?;
    let read_version = f.read_u8().map_err(|_| Error::ReadFailed)?;
    let reserved_tail = f.read_u8().map_err(|_| Error::ReadFailed)?;
    let max_payload_fraction = f.read_u8().map_err(|_| Error::ReadFailed)?;
    let min_payload_fraction = f.read_u8().map_err(|_| Error::ReadFailed)?;
    let leaf_payload_fraction = f.read_u8().map_err(|_| Error::ReadFailed)?;

    let file_change_counter = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let size_in_pages = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let first_freelist_trunk = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let freelist_page_count = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let schema_cookie = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let schema_format = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let default_page_cache_size = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let largest_btree_page = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let text_encoding = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let user_version = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let incremental_vacuum = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let application_id = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;

    // Offset 72, 20 bytes: reserved for expansion, must be zero.
    let mut reserved_buffer = [0; 20];
    f.read_exact(&mut reserved_buffer)
        .map_err(|_| Error::ReadFailed)?;
    if reserved_buffer != [0; 20] {
        return Err(Error::ReservedNotZero);
    }

    let version_valid_for = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let sqlite_version_number = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;

    if file_change_counter != version_valid_for {
        return Err(Error::VersionMismatch {
            counter: file_change_counter,
            valid_for: version_valid_for,
        });
    }

    let declared = pagesize as u64 * size_in_pages as u64;
    if declared > file_len {
        return Err(Error::FileTooShort {
            pages: size_in_pages,
            pagesize,
            declared,
            actual: file_len,
        });
    }

    Ok(DbfileHeader {
        pagesize,
        write_version,
        read_version,
        reserved_tail,
        max_payload_fraction,
        min_payload_fraction,
        leaf_payload_fraction,
        file_change_counter,
        size_in_pages,
        first_freelist_trunk,
        freelist_page_count,
        schema_cookie,
        schema_format,
        default_page_cache_size,
        largest_btree_page,
        text_encoding,
        user_version,
        incremental_vacuum,
        application_id,
        version_valid_for,
        sqlite_version_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_header_bytes(pagesize: u16, numpages: u32, change_counter: u32, version_valid: u32) -> Vec<u8> {
        let mut v = vec![0u8; SQLITE_DB_HEADER_BYTES];
        v[0..16].copy_from_slice(SQLITE3_MAGIC_STRING);
        v[16..18].copy_from_slice(&pagesize.to_be_bytes());
        v[18] = 1; // write version
        v[19] = 1; // read version
        v[24..28].copy_from_slice(&change_counter.to_be_bytes());
        v[28..32].copy_from_slice(&numpages.to_be_bytes());
        v[44..48].copy_from_slice(&4u32.to_be_bytes()); // schema format
        v[92..96].copy_from_slice(&version_valid.to_be_bytes());
        v[96..100].copy_from_slice(&3037000u32.to_be_bytes());
        v
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut v = build_header_bytes(4096, 1, 1, 1);
        v[0] = 0;
        let mut c = Cursor::new(v);
        assert_eq!(get_header(&mut c, 4096).unwrap_err(), Error::WrongMagic);
    }

    #[test]
    fn rejects_bad_pagesize() {
        let v = build_header_bytes(3000, 1, 1, 1);
        let mut c = Cursor::new(v);
        assert_eq!(
            get_header(&mut c, 4096).unwrap_err(),
            Error::UnsupportedPagesize(3000)
        );
    }

    #[test]
    fn rejects_version_mismatch() {
        let v = build_header_bytes(4096, 1, 5, 6);
        let mut c = Cursor::new(v);
        assert_eq!(
            get_header(&mut c, 4096).unwrap_err(),
            Error::VersionMismatch {
                counter: 5,
                valid_for: 6
            }
        );
    }

    #[test]
    fn rejects_declared_size_past_eof() {
        let v = build_header_bytes(4096, 10, 1, 1);
        let mut c = Cursor::new(v);
        assert!(matches!(
            get_header(&mut c, 4096).unwrap_err(),
            Error::FileTooShort { .. }
        ));
    }

    #[test]
    fn accepts_well_formed_header() {
        let v = build_header_bytes(4096, 1, 1, 1);
        let mut c = Cursor::new(v);
        let header = get_header(&mut c, 4096).unwrap();
        assert_eq!(header.pagesize, 4096);
        assert_eq!(header.size_in_pages, 1);
        assert!(!header.has_ptrmap());
        assert_eq!(header.usable_size(), 4096);
    }

    #[test]
    fn pagesize_one_means_65536() {
        let mut v = build_header_bytes(1, 1, 1, 1);
        // build_header_bytes writes the u16 literally; 1 is the magic value
        v[16..18].copy_from_slice(&1u16.to_be_bytes());
        let mut c = Cursor::new(v);
        let header = get_header(&mut c, 65536).unwrap();
        assert_eq!(header.pagesize, 65536);
    }
}
