//! Loads the per-table recovery heuristics used by the freeblock scavenger:
//! a byte-pattern "magic" regex plus a byte offset back to where a candidate
//! record header should start relative to the match.
//!
//! The registry is a two-level map, `grouping -> table name -> Heuristic`.
//! Two sources are merged in order: a built-in catalog embedded in the
//! binary via `include_str!`, then an optional user-supplied YAML file; on
//! a `(grouping, table)` collision the user entry wins.

use std::collections::HashMap;

use regex::bytes::Regex;
use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("heuristic for {grouping}/{table} has a negative offset: {offset}")]
    NegativeOffset { grouping: String, table: String, offset: i64 },
    #[error("heuristic for {grouping}/{table} has an unparsable magic regex: {source}")]
    BadMagicRegex {
        grouping: String,
        table: String,
        source: regex::Error,
    },
}

/// A compiled, validated recovery heuristic for one table.
#[derive(Debug, Clone)]
pub struct Heuristic {
    pub magic: Regex,
    pub offset: usize,
    pub name_regex: Option<Regex>,
}

/// The raw YAML shape before `magic`/`name_regex` are compiled into
/// [`regex::bytes::Regex`] and validated.
#[derive(Debug, Deserialize)]
struct RawHeuristic {
    magic: String,
    offset: i64,
    #[serde(default)]
    name_regex: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(flatten)]
    groupings: HashMap<String, HashMap<String, RawHeuristic>>,
}

#[derive(Debug, Default)]
pub struct HeuristicRegistry {
    by_grouping: HashMap<String, HashMap<String, Heuristic>>,
}

impl HeuristicRegistry {
    pub fn empty() -> Self {
        HeuristicRegistry {
            by_grouping: HashMap::new(),
        }
    }

    /// Looks up the heuristic for an exact `(grouping, table)` pair.
    pub fn get(&self, grouping: &str, table: &str) -> Option<&Heuristic> {
        self.by_grouping.get(grouping)?.get(table)
    }

    /// Searches every grouping for a heuristic matching `table`, used when
    /// the caller doesn't know (or care) which grouping a table belongs to.
    pub fn find_any_grouping(&self, table: &str) -> Option<&Heuristic> {
        self.by_grouping.values().find_map(|tables| tables.get(table))
    }

    fn insert_raw(&mut self, grouping: &str, table: &str, raw: RawHeuristic) -> Result<(), Error> {
        if raw.offset < 0 {
            return Err(Error::NegativeOffset {
                grouping: grouping.to_string(),
                table: table.to_string(),
                offset: raw.offset,
            });
        }
        let magic = Regex::new(&raw.magic).map_err(|source| Error::BadMagicRegex {
            grouping: grouping.to_string(),
            table: table.to_string(),
            source,
        })?;
        let name_regex = raw
            .name_regex
            .map(|s| Regex::new(&s))
            .transpose()
            .map_err(|source| Error::BadMagicRegex {
                grouping: grouping.to_string(),
                table: table.to_string(),
                source,
            })?;

        self.by_grouping
            .entry(grouping.to_string())
            .or_default()
            .insert(
                table.to_string(),
                Heuristic {
                    magic,
                    offset: raw.offset as usize,
                    name_regex,
                },
            );
        Ok(())
    }

    fn merge_yaml(&mut self, yaml: &str) -> Result<(), Error> {
        let catalog: RawCatalog = serde_yaml::from_str(yaml)?;
        for (grouping, tables) in catalog.groupings {
            for (table, raw) in tables {
                self.insert_raw(&grouping, &table, raw)?;
            }
        }
        Ok(())
    }
}

/// The built-in heuristic catalog, embedded in the binary at compile time.
const BUILTIN_CATALOG_YAML: &str = include_str!("../heuristics/builtin.yaml");

/// Loads the registry: built-in catalog first, then `user_yaml` (if given)
/// merged on top, winning any `(grouping, table)` collisions.
pub fn load_registry(user_yaml: Option<&str>) -> Result<HeuristicRegistry, Error> {
    let mut registry = HeuristicRegistry::empty();
    registry.merge_yaml(BUILTIN_CATALOG_YAML)?;
    if let Some(yaml) = user_yaml {
        registry.merge_yaml(yaml)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_catalog() {
        let yaml = r#"
contacts:
  people:
    magic: "\\x01\\x09"
    offset: 2
"#;
        let mut registry = HeuristicRegistry::empty();
        registry.merge_yaml(yaml).unwrap();
        let h = registry.get("contacts", "people").unwrap();
        assert_eq!(h.offset, 2);
    }

    #[test]
    fn user_catalog_overrides_builtin_on_collision() {
        let mut registry = HeuristicRegistry::empty();
        registry
            .merge_yaml("g:\n  t:\n    magic: \"a\"\n    offset: 1\n")
            .unwrap();
        registry
            .merge_yaml("g:\n  t:\n    magic: \"b\"\n    offset: 9\n")
            .unwrap();
        let h = registry.get("g", "t").unwrap();
        assert_eq!(h.offset, 9);
    }

    #[test]
    fn negative_offset_is_fatal() {
        let mut registry = HeuristicRegistry::empty();
        let err = registry
            .merge_yaml("g:\n  t:\n    magic: \"a\"\n    offset: -1\n")
            .unwrap_err();
        assert!(matches!(err, Error::NegativeOffset { .. }));
    }

    #[test]
    fn bad_regex_is_fatal() {
        let mut registry = HeuristicRegistry::empty();
        let err = registry
            .merge_yaml("g:\n  t:\n    magic: \"(\"\n    offset: 0\n")
            .unwrap_err();
        assert!(matches!(err, Error::BadMagicRegex { .. }));
    }

    #[test]
    fn find_any_grouping_searches_every_grouping() {
        let mut registry = HeuristicRegistry::empty();
        registry
            .merge_yaml("contacts:\n  people:\n    magic: \"x\"\n    offset: 0\n")
            .unwrap();
        assert!(registry.find_any_grouping("people").is_some());
        assert!(registry.find_any_grouping("nope").is_none());
    }
}
