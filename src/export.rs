use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::info;

const INDENT: &[u8] = b"    ";

/// Pretty JSON with four-space indentation. Non-ASCII text is written as-is.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buf)?)
}

/// Write `value` to `dir/file_name`, creating `dir` if needed.
pub fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(file_name);
    let json = to_pretty_json(value)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(path)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_wiki_hierarchy;

    #[test]
    fn four_space_indent() {
        let json = to_pretty_json(&serde_json::json!({ "a": [1] })).unwrap();
        assert_eq!(json, "{\n    \"a\": [\n        1\n    ]\n}");
    }

    #[test]
    fn unicode_kept_verbatim() {
        let json = to_pretty_json(&"Fantôme ≥").unwrap();
        assert_eq!(json, "\"Fantôme ≥\"");
    }

    #[test]
    fn writes_into_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out").join("nested");
        let tree = parse_wiki_hierarchy("intro\n== A ==\nbody\n");

        let path = write_json(&target, "page.json", &tree).unwrap();

        assert_eq!(path, target.join("page.json"));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["title"], "Root");
        assert_eq!(written["content"], "intro");
        assert_eq!(written["subsections"][0]["title"], "A");
    }
}
