use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use super::Family;
use crate::export::write_json;
use crate::fetch::WikiClient;
use crate::parser::{extract_page, Section};

/// A whole page as one filtered section tree.
#[derive(Debug, Serialize)]
pub struct WikiPage {
    #[serde(rename = "Wiki Content")]
    pub wiki_content: Section,
}

pub fn build_document(family: Family, wikitext: &str) -> WikiPage {
    WikiPage {
        wiki_content: extract_page(wikitext, family.excluded_sections()),
    }
}

pub async fn run(family: Family, client: &WikiClient, output_dir: &Path) -> Result<PathBuf> {
    let title = family.page_title();
    let wikitext = super::fetch_required(client, title).await?;
    let page = build_document(family, &wikitext);
    info!(
        "{}: {} sections after filtering",
        title,
        page.wiki_content.descendant_count()
    );
    write_json(output_dir, family.output_file(), &page)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{name}")).unwrap()
    }

    #[test]
    fn hunt_page_drops_history_and_references() {
        let page = build_document(Family::Hunts, &fixture("hunt.wiki"));
        let tree = &page.wiki_content;

        assert!(tree.find("History").is_none());
        assert!(tree.find("References").is_none());
        assert!(tree.find("Gallery").is_none());
        assert!(tree.find("Hunt duration").is_some());
    }

    #[test]
    fn equipment_general_keeps_every_section() {
        let text = fixture("equipment.wiki");
        let page = build_document(Family::EquipmentGeneral, &text);
        let unfiltered = crate::parser::parse_wiki_hierarchy(&text);
        assert_eq!(
            page.wiki_content.descendant_count(),
            unfiltered.descendant_count()
        );
    }

    #[test]
    fn serialized_shape() {
        let page = build_document(Family::GhostGeneral, "lead\n== Evidence ==\nx\n== Behaviour ==\ny\n");
        let json = serde_json::to_value(&page).unwrap();
        let subsections = json["Wiki Content"]["subsections"].as_array().unwrap();
        assert_eq!(subsections.len(), 1);
        assert_eq!(subsections[0]["title"], "Behaviour");
        assert_eq!(json["Wiki Content"]["content"], "lead");
    }
}
