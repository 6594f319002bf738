use std::sync::LazyLock;

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use super::normalize::clean_cell;
use super::wikicode::Wikicode;

static BOLD_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!'''(.*?)'''").unwrap());
static BARE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!(.*?)\n").unwrap());
// A leading pipe not followed by `-` (row separator) is a data cell.
static CELL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\|([^-\n].*)$").unwrap());

const ROW_SEPARATOR: &str = "|-";

pub type Table = Vec<Row>;

/// One table row: column title → cell text, in source column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    /// Insert or overwrite. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (key, value) in &self.cells {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Every table in `text` that yields at least one well-formed row.
pub fn parse_tables(text: &str) -> Vec<Table> {
    extract_tables(&Wikicode::parse(text))
}

pub fn extract_tables(doc: &Wikicode) -> Vec<Table> {
    doc.tables()
        .iter()
        .filter_map(|block| parse_table(&block.contents))
        .collect()
}

fn parse_table(contents: &str) -> Option<Table> {
    let titles = column_titles(contents);
    if titles.is_empty() {
        debug!("Skipping table without recognisable column titles");
        return None;
    }

    let mut rows = Vec::new();
    for chunk in contents.split(ROW_SEPARATOR).skip(1) {
        let cells: Vec<String> = CELL_RE
            .captures_iter(chunk)
            .map(|caps| clean_cell(&caps[1]))
            .collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() != titles.len() {
            debug!(
                "Dropping row with {} cells (table has {} columns)",
                cells.len(),
                titles.len()
            );
            continue;
        }

        let mut row = Row::default();
        for (title, cell) in titles.iter().zip(cells) {
            row.insert(title.as_str(), cell);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

/// Bold `!'''Title'''` headers win; bare `!Title` lines are the fallback.
fn column_titles(contents: &str) -> Vec<String> {
    let bold: Vec<String> = BOLD_TITLE_RE
        .captures_iter(contents)
        .map(|caps| caps[1].trim().to_string())
        .collect();
    if !bold.is_empty() {
        return bold;
    }
    BARE_TITLE_RE
        .captures_iter(contents)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

// ── Tests ──
