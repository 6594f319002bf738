pub mod equipment;
pub mod general;
pub mod ghosts;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::fetch::WikiClient;

/// One extraction job: which page(s) to pull and where the JSON lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Family {
    GhostGeneral,
    Ghosts,
    EquipmentGeneral,
    Equipment,
    Hunts,
}

impl Family {
    pub const ALL: [Family; 5] = [
        Family::GhostGeneral,
        Family::Ghosts,
        Family::EquipmentGeneral,
        Family::Equipment,
        Family::Hunts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Family::GhostGeneral => "ghost-general",
            Family::Ghosts => "ghosts",
            Family::EquipmentGeneral => "equipment-general",
            Family::Equipment => "equipment",
            Family::Hunts => "hunts",
        }
    }

    /// The index page the family starts from.
    pub fn page_title(self) -> &'static str {
        match self {
            Family::GhostGeneral | Family::Ghosts => "Ghost",
            Family::EquipmentGeneral | Family::Equipment => "Equipment",
            Family::Hunts => "Hunt",
        }
    }

    pub fn output_file(self) -> &'static str {
        match self {
            Family::GhostGeneral => "general_ghost_data.json",
            Family::Ghosts => "all_ghosts_data.json",
            Family::EquipmentGeneral => "general_equipment_data.json",
            Family::Equipment => "all_equipment_data.json",
            Family::Hunts => "hunt_data.json",
        }
    }

    /// Section titles pruned from every extracted tree. For `ghosts` and
    /// `equipment` these apply to the per-item pages.
    pub fn excluded_sections(self) -> &'static [&'static str] {
        match self {
            Family::GhostGeneral => &["See also", "References", "Trivia", "Evidence"],
            Family::Ghosts => &["Notes", "References", "History", "Trivia", "Evidence"],
            Family::EquipmentGeneral => &[],
            Family::Equipment => &[
                "Notes",
                "References",
                "History",
                "Trivia",
                "Gallery",
                "See also",
                "Possible Writing Patterns",
            ],
            Family::Hunts => &["History", "Gallery", "See also", "References", "Notes"],
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run one family end to end and return the written file.
pub async fn run(family: Family, client: &WikiClient, output_dir: &Path) -> Result<PathBuf> {
    match family {
        Family::GhostGeneral | Family::EquipmentGeneral | Family::Hunts => {
            general::run(family, client, output_dir).await
        }
        Family::Equipment => equipment::run(client, output_dir).await,
        Family::Ghosts => ghosts::run(client, output_dir).await,
    }
}

/// Fetch a page the family cannot do without.
async fn fetch_required(client: &WikiClient, title: &str) -> Result<String> {
    client
        .fetch_wikitext(title)
        .await?
        .with_context(|| format!("Page '{title}' does not exist"))
}

// ── Tests ──
