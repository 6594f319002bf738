use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::wikicode::Wikicode;

/// `{{Temperature|c1}}`, `{{Temperature|c1|c2}}` and the call-like
/// `Temperature(c1)` / `Temperature(c1, c2)` spelling.
static TEMPERATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\{\{\s*[Tt]emperature\s*\|\s*(-?\d+)\s*(?:\|\s*(-?\d+)\s*)?\}\}|\b[Tt]emperature\(\s*(-?\d+)\s*(?:,\s*(-?\d+)\s*)?\)",
    )
    .unwrap()
});
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static PIPED_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[[^|\]]*\|([^\]]+)\]\]").unwrap());
static PLAIN_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());

/// Markup → plain prose: temperatures expanded, everything else stripped,
/// comparison glyphs spelled out.
pub fn clean(text: &str) -> String {
    clean_document(&parse_markup(text))
}

/// Parse `text` with temperature templates already expanded, so they
/// survive stripping as plain text.
pub fn parse_markup(text: &str) -> Wikicode {
    Wikicode::parse(&expand_temperatures(text))
}

pub fn clean_document(doc: &Wikicode) -> String {
    normalize_glyphs(doc.strip_code().trim()).trim().to_string()
}

/// Table cells keep their markup except for line breaks and links.
pub fn clean_cell(cell: &str) -> String {
    let c = BR_RE.replace_all(cell, ", ");
    let c = PIPED_LINK_RE.replace_all(&c, "$1");
    let c = PLAIN_LINK_RE.replace_all(&c, "$1");
    let c = expand_temperatures(&c);
    normalize_glyphs(&c).trim().to_string()
}

pub fn expand_temperatures(text: &str) -> Cow<'_, str> {
    TEMPERATURE_RE.replace_all(text, |caps: &Captures| {
        let first = caps.get(1).or_else(|| caps.get(3));
        let second = caps.get(2).or_else(|| caps.get(4));
        let c1 = first.and_then(|m| m.as_str().parse::<i64>().ok());
        let c2 = second.map(|m| m.as_str().parse::<i64>().ok());
        match (c1, c2) {
            (Some(c1), None) => format_temperature(c1, None),
            (Some(c1), Some(Some(c2))) => format_temperature(c1, Some(c2)),
            // Out-of-range digits: leave the directive as written.
            _ => caps[0].to_string(),
        }
    })
}

pub fn normalize_glyphs(text: &str) -> String {
    text.replace('≥', ">=").replace('≤', "<=")
}

/// The range form prints the lower Fahrenheit bound with one decimal and
/// the upper with none; downstream consumers match on that exact shape.
fn format_temperature(c1: i64, c2: Option<i64>) -> String {
    let f1 = celsius_to_fahrenheit(c1);
    match c2 {
        None => format!("{c1}C ({f1:.0}F)"),
        Some(c2) => {
            let f2 = celsius_to_fahrenheit(c2);
            format!("{c1}-{c2}C ({f1:.1}-{f2:.0}F)")
        }
    }
}

fn celsius_to_fahrenheit(c: i64) -> f64 {
    c as f64 * 9.0 / 5.0 + 32.0
}

// ── Tests ──
