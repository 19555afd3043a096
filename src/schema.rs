//! Learns table schemas from `sqlite_master`: registers each table's root
//! page and derives a column list and type signature from its stored
//! `CREATE TABLE` SQL using a hand-written tokenizer (no SQL grammar, just
//! enough structure to split column definitions apart).

use std::collections::HashMap;

use crate::pager::PageNum;
use crate::serial_type::ValueClass;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("sqlite_master SQL does not start with CREATE TABLE: {0:?}")]
    NotACreateTable(String),
    #[error("CREATE TABLE statement has no parenthesized column list: {0:?}")]
    MissingColumnList(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub root_page: PageNum,
    pub columns: Vec<String>,
    /// `None` for the built-in tables, which bypass signature checking.
    pub signature: Option<Vec<ValueClass>>,
}

/// Maps a declared SQL column type to the value class used for signature
/// matching. Anything not recognized maps to `Any`.
fn value_class_for_declared_type(declared: &str) -> ValueClass {
    match declared.to_uppercase().as_str() {
        "INTEGER" | "LONG" => ValueClass::Int,
        "TEXT" | "VARCHAR" | "LONGVARCHAR" => ValueClass::Text,
        "REAL" | "FLOAT" => ValueClass::Real,
        "BLOB" => ValueClass::Blob,
        _ => ValueClass::Any,
    }
}

/// Removes every parenthesized group from `s`, including the parens
/// themselves -- strips things like a `VARCHAR(255)` length qualifier or an
/// inline `CHECK (...)` constraint so the remaining text can be split on
/// top-level commas safely.
fn strip_nested_parens(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Splits the `(col-list)` body of a `CREATE TABLE` statement into column
/// definitions, dropping table-level `PRIMARY`/`UNIQUE` constraint clauses,
/// and derives the column name list plus its type signature.
fn parse_column_list(column_list: &str) -> (Vec<String>, Vec<ValueClass>) {
    let expunged = strip_nested_parens(column_list);

    let defs: Vec<&str> = expunged
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| !s.starts_with("PRIMARY") && !s.starts_with("UNIQUE"))
        .collect();

    let mut columns = Vec::with_capacity(defs.len());
    let mut signature = Vec::with_capacity(defs.len());
    for def in defs {
        let mut tokens = def.split_whitespace();
        let name = match tokens.next() {
            Some(n) => n.to_string(),
            None => continue,
        };
        let class = match tokens.next() {
            Some(declared_type) => value_class_for_declared_type(declared_type),
            None => ValueClass::Any,
        };
        columns.push(name);
        signature.push(class);
    }
    (columns, signature)
}

/// Parses a `CREATE TABLE name (col-list)` statement into a column list and
/// type signature. Column defaults/constraints beyond the declared type are
/// ignored.
pub fn parse_create_table(sql: &str) -> Result<(String, Vec<String>, Vec<ValueClass>), Error> {
    let sql = sql.trim();
    let rest = sql
        .strip_prefix("CREATE TABLE")
        .ok_or_else(|| Error::NotACreateTable(sql.to_string()))?
        .trim_start();

    let open_paren = rest
        .find('(')
        .ok_or_else(|| Error::MissingColumnList(sql.to_string()))?;
    let name = rest[..open_paren].trim().to_string();

    let close_paren = rest
        .rfind(')')
        .ok_or_else(|| Error::MissingColumnList(sql.to_string()))?;
    if close_paren <= open_paren {
        return Err(Error::MissingColumnList(sql.to_string()));
    }
    let column_list = &rest[open_paren + 1..close_paren];

    let (columns, signature) = parse_column_list(column_list);
    Ok((name, columns, signature))
}

/// Column lists for the five built-in tables, which never carry a type
/// signature (they bypass the signature-match check entirely).
pub fn builtin_table_columns() -> HashMap<&'static str, Vec<&'static str>> {
    let mut m = HashMap::new();
    m.insert("sqlite_master", vec!["type", "name", "tbl_name", "rootpage", "sql"]);
    m.insert("sqlite_sequence", vec!["name", "seq"]);
    m.insert("sqlite_stat1", vec!["tbl", "idx", "stat"]);
    m.insert("sqlite_stat2", vec!["tbl", "idx", "sampleno", "sample"]);
    m.insert("sqlite_stat3", vec!["tbl", "idx", "nEq", "nLt", "nDLt", "sample"]);
    m.insert("sqlite_stat4", vec!["tbl", "idx", "nEq", "nLt", "nDLt", "sample"]);
    m
}
