use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use rayon::prelude::*;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{info, warn};

use super::Family;
use crate::export::write_json;
use crate::fetch::{FetchedPage, WikiClient};
use crate::parser::wikicode::Wikicode;
use crate::parser::{extract_page, Section};

static TYPES_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)==\s*Types of ghosts.*?\{\|(.*?)\|\}").unwrap());
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(?:([^|\]]*)\|)?([^\]]+)\]\]").unwrap());
static FILE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:alt|link)=([^|\]]+)").unwrap());
static FILE_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"File:([^.|\]]+)").unwrap());
static PIXEL_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+x\d+px").unwrap());

/// Evidence icon file slug → evidence name.
const EVIDENCE_ICONS: &[(&str, &str)] = &[
    ("EMFReader_Render", "EMF Level 5"),
    ("Fingerprints_3", "Ultraviolet"),
    ("ClosedBook_Render", "Ghost Writing"),
    ("SpiritBox_Render", "Spirit Box"),
    ("DOTTSRender", "D.O.T.S Projector"),
    ("GhostOrb_Render", "Ghost Orbs"),
    ("Thermometer_Render", "Freezing Temperatures"),
];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GhostSummary {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Abilities")]
    pub abilities: String,
    #[serde(rename = "Strengths")]
    pub strengths: String,
    #[serde(rename = "Weaknesses")]
    pub weaknesses: String,
    #[serde(rename = "Evidence")]
    pub evidence: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GhostRecord {
    #[serde(rename = "Ghost Name")]
    pub name: String,
    #[serde(rename = "Ghost Summary")]
    pub summary: GhostSummary,
    #[serde(rename = "Wiki Content")]
    pub wiki_content: Section,
}

/// Ghost names from the first table after the "Types of ghosts" heading,
/// in table order, without duplicates.
pub fn ghost_names(index: &str) -> Vec<String> {
    let Some(table) = TYPES_TABLE_RE.captures(index) else {
        return Vec::new();
    };

    let mut names: Vec<String> = Vec::new();
    for link in LINK_RE.captures_iter(&table[1]) {
        if is_file_link(&link) {
            continue;
        }
        let name = link[2].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn is_file_link(link: &Captures<'_>) -> bool {
    let target = link.get(1).or_else(|| link.get(2)).map_or("", |m| m.as_str());
    let target = target.trim_start().to_ascii_lowercase();
    target.starts_with("file:") || target.starts_with("image:")
}

/// Summary fields from the infobox `key = value` parameters. Later
/// occurrences of a key overwrite earlier ones.
pub fn parse_summary(wikitext: &str) -> GhostSummary {
    let doc = Wikicode::parse(wikitext);
    let mut fields: Vec<(String, String)> = Vec::new();
    for template in doc.templates() {
        for (key, value) in template.named_params() {
            let value = clean_infobox_value(value);
            match fields.iter_mut().find(|(k, _)| k == key) {
                Some(field) => field.1 = value,
                None => fields.push((key.to_string(), value)),
            }
        }
    }

    let get = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    GhostSummary {
        description: get("quote"),
        abilities: get("abiliti(es)"),
        strengths: get("strength"),
        weaknesses: get("weakness(es)"),
        evidence: fields
            .iter()
            .filter(|(k, v)| k.starts_with("Evidence") && !v.is_empty())
            .map(|(_, v)| v.clone())
            .collect(),
    }
}

/// Reduce an infobox value to plain text. A value embedding a file is
/// replaced by the file's `alt`/`link` label, or else its icon name.
pub fn clean_infobox_value(raw: &str) -> String {
    let mut value = raw.trim().to_string();

    if value.contains("[[File:") {
        if let Some(caps) = FILE_LABEL_RE.captures(&value) {
            value = caps[1].to_string();
        } else if let Some(caps) = FILE_SLUG_RE.captures(&value) {
            value = icon_label(&caps[1]);
        }
    }

    let value = LINK_RE.replace_all(&value, "${2}");
    let value = value.replace("'''", "").replace('*', "");
    PIXEL_SIZE_RE.replace_all(value.trim(), "").trim().to_string()
}

fn icon_label(slug: &str) -> String {
    EVIDENCE_ICONS
        .iter()
        .find(|(icon, _)| *icon == slug)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| slug.replace('_', " "))
}

pub fn build_record(name: &str, wikitext: &str) -> GhostRecord {
    GhostRecord {
        name: name.to_string(),
        summary: parse_summary(wikitext),
        wiki_content: extract_page(wikitext, Family::Ghosts.excluded_sections()),
    }
}

pub async fn run(client: &WikiClient, output_dir: &Path) -> Result<PathBuf> {
    let index_title = Family::Ghosts.page_title();
    let index = super::fetch_required(client, index_title).await?;

    let names = ghost_names(&index);
    if names.is_empty() {
        warn!("Could not find the 'Types of ghosts' table on '{}'", index_title);
    } else {
        info!("Found {} ghost types", names.len());
    }

    let pages = client.fetch_many(&names).await?;
    let ghosts = build_records(&pages);
    info!("Extracted {} of {} ghosts", ghosts.len(), names.len());

    write_json(output_dir, Family::Ghosts.output_file(), &ghosts)
}

fn build_records(pages: &[FetchedPage]) -> Vec<GhostRecord> {
    pages
        .par_iter()
        .filter_map(|page| Some(build_record(&page.title, page.wikitext.as_deref()?)))
        .collect()
}

// ── Tests ──
