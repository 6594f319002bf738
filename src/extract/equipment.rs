use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use super::Family;
use crate::export::write_json;
use crate::fetch::{FetchedPage, WikiClient};
use crate::parser::{extract_page, Section};

static CATEGORY_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^==[ \t]*([A-Za-z]+)[ \t]+[Ee]quipment[ \t]*==[ \t]*$").unwrap()
});

/// `|[[Target]]` or `|[[Target|Display]]` at the start of a table cell line.
static ITEM_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\|\[\[(?:([^\]|]*)\|)?([^\]|]+)\]\]").unwrap());

#[derive(Debug, Serialize)]
pub struct EquipmentItem {
    #[serde(rename = "Equipment Name")]
    pub name: String,
    #[serde(rename = "Wiki Content")]
    pub wiki_content: Section,
}

#[derive(Debug, Default, Serialize)]
pub struct EquipmentCatalog {
    #[serde(rename = "StarterEquipment")]
    pub starter: Vec<EquipmentItem>,
    #[serde(rename = "OptionalEquipment")]
    pub optional: Vec<EquipmentItem>,
    #[serde(rename = "TruckEquipment")]
    pub truck: Vec<EquipmentItem>,
}

impl EquipmentCatalog {
    pub fn len(&self) -> usize {
        self.starter.len() + self.optional.len() + self.truck.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Item names listed under the `==<category> equipment==` heading, up to
/// the next heading. Names are link display texts; file embeds are skipped.
pub fn category_items(wikitext: &str, category: &str) -> Vec<String> {
    let Some(heading) = CATEGORY_HEADING_RE
        .captures_iter(wikitext)
        .find(|caps| caps[1].eq_ignore_ascii_case(category))
    else {
        return Vec::new();
    };

    let body = &wikitext[heading.get(0).map_or(0, |m| m.end())..];
    let body = body.find("==").map_or(body, |end| &body[..end]);

    ITEM_LINK_RE
        .captures_iter(body)
        .filter(|caps| !caps.get(1).is_some_and(|target| is_file_target(target.as_str())))
        .map(|caps| caps[2].trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn is_file_target(target: &str) -> bool {
    let target = target.trim_start().to_ascii_lowercase();
    target.starts_with("file:") || target.starts_with("image:")
}

/// One item per fetched page; pages that could not be fetched are left out.
pub fn build_items(pages: &[FetchedPage]) -> Vec<EquipmentItem> {
    let excluded = Family::Equipment.excluded_sections();
    pages
        .par_iter()
        .filter_map(|page| {
            let wikitext = page.wikitext.as_deref()?;
            Some(EquipmentItem {
                name: page.title.clone(),
                wiki_content: extract_page(wikitext, excluded),
            })
        })
        .collect()
}

pub async fn run(client: &WikiClient, output_dir: &Path) -> Result<PathBuf> {
    let index_title = Family::Equipment.page_title();
    let index = super::fetch_required(client, index_title).await?;

    let catalog = EquipmentCatalog {
        starter: collect_category(client, &index, "Starter").await?,
        optional: collect_category(client, &index, "Optional").await?,
        truck: collect_category(client, &index, "Truck").await?,
    };
    info!("Extracted {} equipment pages", catalog.len());

    write_json(output_dir, Family::Equipment.output_file(), &catalog)
}

async fn collect_category(
    client: &WikiClient,
    index: &str,
    category: &str,
) -> Result<Vec<EquipmentItem>> {
    let names = category_items(index, category);
    if names.is_empty() {
        warn!("No {} equipment listed on the index page", category);
        return Ok(Vec::new());
    }
    info!("{} equipment: fetching {} pages", category, names.len());

    let pages = client.fetch_many(&names).await?;
    Ok(build_items(&pages))
}

// ── Tests ──
