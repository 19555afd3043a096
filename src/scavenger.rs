//! The freeblock scavenger: for a table-leaf page with freeblocks, runs the
//! table's heuristic against each freeblock body, tries each match in
//! reverse, and validates candidates by decoding a full record.

use crate::btree::header::{self, Freeblock};
use crate::heuristic::Heuristic;
use crate::pager::PageCache;
use crate::record::Record;

/// A record recovered from free space on a page, together with where its
/// bytes were found.
#[derive(Debug, Clone)]
pub struct RecoveredRecord {
    pub page: crate::pager::PageNum,
    pub freeblock_offset: u32,
    pub record: Record,
}

/// Scavenges every freeblock on one table-leaf page, returning the records
/// that decoded successfully. De-duplicates by the recovered record's raw
/// bytes (structural identity, since rowids are lost once a row is
/// deleted and its cell pointer removed).
pub fn scavenge_page(
    cache: &PageCache,
    pgnum: crate::pager::PageNum,
    heuristic: &Heuristic,
) -> Result<Vec<RecoveredRecord>, crate::btree::Error> {
    let page = cache
        .get_page(pgnum)
        .map_err(|_| crate::btree::Error::PageTooShort)?;
    let offset = crate::btree::leaf::Iterator::btree_start_offset(pgnum);
    let btree_header = header::check_header(page, offset)?;
    let freeblocks = header::read_freeblocks(page, &btree_header)?;
    let usable_size = cache.header().usable_size();

    let mut recovered = Vec::new();
    let mut seen_bytes: Vec<Vec<u8>> = Vec::new();

    for fb in &freeblocks {
        for candidate in scavenge_freeblock(page, fb, heuristic, usable_size) {
            if seen_bytes.iter().any(|b| b == candidate.bytes()) {
                continue;
            }
            seen_bytes.push(candidate.bytes().to_vec());
            recovered.push(RecoveredRecord {
                page: pgnum,
                freeblock_offset: fb.offset,
                record: candidate,
            });
        }
    }

    log::info!(
        "page {}: recovered {} record(s) from {} freeblock(s)",
        pgnum,
        recovered.len(),
        freeblocks.len()
    );

    Ok(recovered)
}

/// Runs the heuristic against one freeblock's body, returning every
/// successfully-decoded candidate record, in reverse match order (the same
/// order the matches are tried in). `usable_size` bounds each candidate to
/// the in-page overflow threshold `X = usable_size - 35`: a freed cell's
/// overflow chain is gone, so nothing past that many bytes could ever have
/// been part of its inline payload.
fn scavenge_freeblock(
    page: &[u8],
    fb: &Freeblock,
    heuristic: &Heuristic,
    usable_size: u32,
) -> Vec<Record> {
    let body_range = fb.body_range();
    let body = match page.get(body_range.clone()) {
        Some(b) => b,
        None => return Vec::new(),
    };
    let overflow_threshold = (usable_size as usize).saturating_sub(35);

    let matches: Vec<_> = heuristic.magic.find_iter(body).collect();
    let mut out = Vec::new();

    for m in matches.into_iter().rev() {
        let match_start = m.start();
        if match_start < heuristic.offset {
            continue;
        }
        let candidate_start = match_start - heuristic.offset;
        let candidate_end = body.len().min(candidate_start + overflow_threshold);
        let candidate_slice = &body[candidate_start..candidate_end];
        match Record::parse(candidate_slice) {
            Ok(mut record) => {
                record.truncate_to_parsed_len();
                out.push(record);
            }
            Err(_) => continue,
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::bytes::Regex;

    fn heuristic(magic: &str, offset: usize) -> Heuristic {
        Heuristic {
            magic: Regex::new(magic).unwrap(),
            offset,
            name_regex: None,
        }
    }

    #[test]
    fn finds_and_decodes_a_valid_candidate() {
        // A tiny record: header len=2, serial type 9 (True), no body.
        let record_bytes = [0x02, 0x09];
        let mut freeblock_body = vec![0xAAu8; 10];
        freeblock_body.extend_from_slice(&record_bytes);
        freeblock_body.extend_from_slice(&[0xBB; 4]);

        // magic matches the 0x09 byte itself; offset walks back 1 byte to
        // the header-length varint.
        let h = heuristic(r"\x09", 1);
        let fb = Freeblock {
            offset: 0,
            total_size: (4 + freeblock_body.len()) as u32,
        };
        let mut page = vec![0u8; 4];
        page.extend_from_slice(&freeblock_body);

        let found = scavenge_freeblock(&page, &fb, &h, 4096);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bytes(), &record_bytes);
    }

    #[test]
    fn skips_matches_that_fail_to_parse() {
        let h = heuristic(r"\xFF", 0);
        let mut page = vec![0u8; 4];
        page.extend_from_slice(&[0xFFu8; 1]); // lone 0xFF is not a valid record header
        let fb = Freeblock {
            offset: 0,
            total_size: page.len() as u32,
        };
        let found = scavenge_freeblock(&page, &fb, &h, 4096);
        assert!(found.is_empty());
    }

    #[test]
    fn match_before_offset_is_skipped() {
        let h = heuristic(r"\x09", 5); // offset walks back past the start of body
        let mut page = vec![0u8; 4];
        page.extend_from_slice(&[0x09]);
        let fb = Freeblock {
            offset: 0,
            total_size: page.len() as u32,
        };
        assert!(scavenge_freeblock(&page, &fb, &h, 4096).is_empty());
    }

    #[test]
    fn candidate_past_overflow_threshold_is_unparseable() {
        // header len=2, serial type 4 (4-byte int): 6 bytes total. With
        // usable_size 40 the overflow threshold X is 5, one byte short of
        // the int field -- the freeblock's trailing byte is unreachable
        // since a freed cell has no overflow chain left to follow.
        let record_bytes = [0x02, 0x04, 0xAA, 0xBB, 0xCC, 0xDD];

        let h = heuristic(r"\x04", 1);
        let fb = Freeblock {
            offset: 0,
            total_size: (4 + record_bytes.len()) as u32,
        };
        let mut page = vec![0u8; 4];
        page.extend_from_slice(&record_bytes);

        assert_eq!(scavenge_freeblock(&page, &fb, &h, 4096).len(), 1);
        assert!(scavenge_freeblock(&page, &fb, &h, 40).is_empty());
    }
}
