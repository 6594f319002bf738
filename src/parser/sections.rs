use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use super::normalize::{clean, clean_document, parse_markup};
use super::tables::{extract_tables, Table};

pub const ROOT_TITLE: &str = "Root";
const MAX_HEADING_DEPTH: usize = 6;

/// Node of the document tree. The root is synthetic: title `"Root"`,
/// level 0, content taken from the text before the first heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub level: u8,
    pub content: Content,
    pub subsections: Vec<Section>,
}

/// Plain text when a section body holds no usable table, text plus
/// tables otherwise (even if the text is empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured { text: String, tables: Vec<Table> },
}

/// A heading and the raw markup up to the next heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    /// Depth relative to the shallowest heading on the page (1-based).
    pub level: u8,
    /// Number of `=` on each side of the heading as written.
    pub marker_depth: u8,
    pub title: String,
    pub body: String,
}

impl Content {
    fn from_parts(text: String, tables: Vec<Table>) -> Self {
        if tables.is_empty() {
            Content::Text(text)
        } else {
            Content::Structured { text, tables }
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Content::Text(text) | Content::Structured { text, .. } => text,
        }
    }

    pub fn tables(&self) -> &[Table] {
        match self {
            Content::Text(_) => &[],
            Content::Structured { tables, .. } => tables,
        }
    }
}

impl Section {
    fn new(title: String, level: u8, content: Content) -> Self {
        Self {
            title,
            level,
            content,
            subsections: Vec::new(),
        }
    }

    /// Depth-first search by exact title.
    pub fn find(&self, title: &str) -> Option<&Section> {
        self.subsections.iter().find_map(|sub| {
            if sub.title == title {
                Some(sub)
            } else {
                sub.find(title)
            }
        })
    }

    /// Number of sections below this one.
    pub fn descendant_count(&self) -> usize {
        self.subsections
            .iter()
            .map(|sub| 1 + sub.descendant_count())
            .sum()
    }
}

/// Split `text` at heading lines. Returns the preamble (text before the
/// first heading) and one raw section per heading, in document order.
pub fn tokenize(text: &str) -> (String, Vec<RawSection>) {
    struct Heading<'t> {
        start: usize,
        end: usize,
        depth: usize,
        title: &'t str,
    }

    let mut headings = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if let Some((depth, title)) = match_heading(line) {
            headings.push(Heading {
                start,
                end: offset,
                depth,
                title,
            });
        }
    }

    let preamble_end = headings.first().map_or(text.len(), |h| h.start);
    let preamble = text[..preamble_end].to_string();
    let shallowest = headings.iter().map(|h| h.depth).min().unwrap_or(1);

    let raw = headings
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let body_end = headings.get(i + 1).map_or(text.len(), |next| next.start);
            RawSection {
                level: (h.depth - shallowest + 1) as u8,
                marker_depth: h.depth as u8,
                title: h.title.to_string(),
                body: text[h.end..body_end].to_string(),
            }
        })
        .collect();

    (preamble, raw)
}

/// Recognise `== Title ==`. The marker count is the largest n ≤ 6 for
/// which the line both starts and ends with n `=`; extra `=` stay in the
/// title. Anything else is body text.
fn match_heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim_end();
    let leading = line.bytes().take_while(|b| *b == b'=').count();
    (1..=leading.min(MAX_HEADING_DEPTH)).rev().find_map(|depth| {
        let rest = &line[depth..];
        let marker = &"======"[..depth];
        let inner = rest.strip_suffix(marker)?;
        Some((depth, inner.trim()))
    })
}

/// Fold raw sections into a tree. Each heading becomes the last child of
/// the nearest open section with a lower level.
pub fn build(preamble: &str, raw: &[RawSection]) -> Section {
    let root = Section::new(ROOT_TITLE.to_string(), 0, section_content(preamble));
    let mut stack = vec![root];

    for entry in raw {
        let section = Section::new(clean(&entry.title), entry.level, section_content(&entry.body));
        while stack.len() > 1 && stack.last().is_some_and(|top| top.level >= section.level) {
            close_top(&mut stack);
        }
        stack.push(section);
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }

    let root = stack.pop().unwrap_or_else(|| {
        Section::new(ROOT_TITLE.to_string(), 0, Content::Text(String::new()))
    });
    debug!(
        "Built section tree: {} sections from {} headings",
        root.descendant_count(),
        raw.len()
    );
    root
}

fn close_top(stack: &mut Vec<Section>) {
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.subsections.push(done);
        }
    }
}

/// A blank body gives `Content::Text("")`, never an empty text-and-tables
/// object. Callers rely on the two shapes serializing differently.
fn section_content(body: &str) -> Content {
    if body.trim().is_empty() {
        return Content::Text(String::new());
    }
    let doc = parse_markup(body);
    let tables = extract_tables(&doc);
    let text = clean_document(&doc.without_tables());
    Content::from_parts(text, tables)
}

/// Drop every subsection whose title is in `exclude` (case-insensitive),
/// together with everything beneath it. The root itself is always kept.
pub fn filter_sections<S: AsRef<str>>(mut tree: Section, exclude: &[S]) -> Section {
    let excluded: HashSet<String> = exclude
        .iter()
        .map(|title| title.as_ref().to_lowercase())
        .collect();
    if !excluded.is_empty() {
        prune(&mut tree, &excluded);
    }
    tree
}

fn prune(section: &mut Section, excluded: &HashSet<String>) {
    section.subsections.retain(|sub| {
        let drop = excluded.contains(&sub.title.to_lowercase());
        if drop {
            debug!("Excluding section '{}' ({} nested)", sub.title, sub.descendant_count());
        }
        !drop
    });
    for sub in &mut section.subsections {
        prune(sub, excluded);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(text: &str) -> Section {
        let (preamble, raw) = tokenize(text);
        build(&preamble, &raw)
    }

    fn titles(section: &Section) -> Vec<&str> {
        section.subsections.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn heading_forms() {
        assert_eq!(match_heading("== A ==\n"), Some((2, "A")));
        assert_eq!(match_heading("===B===   "), Some((3, "B")));
        assert_eq!(match_heading("=Top="), Some((1, "Top")));
        assert_eq!(match_heading("== A ==="), Some((2, "A =")));
        assert_eq!(match_heading("=== A =="), Some((2, "= A")));
        assert_eq!(match_heading("==A"), None);
        assert_eq!(match_heading(" == A =="), None);
        assert_eq!(match_heading("="), None);
        assert_eq!(match_heading("text == x =="), None);
    }

    #[test]
    fn seven_markers_keep_extra_in_title() {
        assert_eq!(match_heading("======= Deep ======="), Some((6, "= Deep =")));
    }

    #[test]
    fn tokenize_preamble_and_bodies() {
        let (preamble, raw) = tokenize("intro\n== A ==\nbody a\n=== B ===\nbody b\n");
        assert_eq!(preamble, "intro\n");
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].title, "A");
        assert_eq!(raw[0].body, "body a\n");
        assert_eq!(raw[0].marker_depth, 2);
        assert_eq!(raw[0].level, 1);
        assert_eq!(raw[1].level, 2);
        assert_eq!(raw[1].body, "body b\n");
    }

    #[test]
    fn tokenize_without_headings() {
        let (preamble, raw) = tokenize("just text\n= not a heading");
        assert_eq!(preamble, "just text\n= not a heading");
        assert!(raw.is_empty());
    }

    #[test]
    fn tokenize_empty() {
        let (preamble, raw) = tokenize("");
        assert!(preamble.is_empty());
        assert!(raw.is_empty());
    }

    #[test]
    fn root_shape() {
        let root = tree("");
        assert_eq!(root.title, ROOT_TITLE);
        assert_eq!(root.level, 0);
        assert_eq!(root.content, Content::Text(String::new()));
        assert!(root.subsections.is_empty());
    }

    #[test]
    fn nested_round_trip() {
        let root = tree("pre\n== A ==\nbodyA\n=== B ===\nbodyB\n");
        assert_eq!(root.content.text(), "pre");
        assert_eq!(titles(&root), vec!["A"]);
        let a = &root.subsections[0];
        assert_eq!(a.level, 1);
        assert_eq!(a.content.text(), "bodyA");
        assert_eq!(titles(a), vec!["B"]);
        let b = &a.subsections[0];
        assert_eq!(b.level, 2);
        assert_eq!(b.content.text(), "bodyB");
        assert!(b.subsections.is_empty());
    }

    #[test]
    fn skipped_levels_nest_under_open_section() {
        let root = tree("== A ==\n===== Deep =====\nd\n=== Mid ===\nm\n== C ==\n");
        assert_eq!(titles(&root), vec!["A", "C"]);
        let a = &root.subsections[0];
        assert_eq!(titles(a), vec!["Deep", "Mid"]);
        assert_eq!(a.subsections[0].level, 4);
        assert_eq!(a.subsections[1].level, 2);
    }

    #[test]
    fn siblings_and_return_to_shallower_level() {
        let root = tree("= One =\n== A ==\n== B ==\n= Two =\n== C ==\n");
        assert_eq!(titles(&root), vec!["One", "Two"]);
        assert_eq!(titles(&root.subsections[0]), vec!["A", "B"]);
        assert_eq!(titles(&root.subsections[1]), vec!["C"]);
    }

    #[test]
    fn deeper_first_heading_then_shallower() {
        let root = tree("=== Early ===\n== Later ==\n=== Child ===\n");
        assert_eq!(titles(&root), vec!["Early", "Later"]);
        assert_eq!(root.subsections[0].level, 2);
        assert_eq!(root.subsections[1].level, 1);
        assert_eq!(titles(&root.subsections[1]), vec!["Child"]);
    }

    #[test]
    fn titles_are_cleaned() {
        let root = tree("== '''[[Spirit Box|Box]]''' usage ==\nx\n");
        assert_eq!(root.subsections[0].title, "Box usage");
    }

    #[test]
    fn section_with_table_is_structured() {
        let root = tree("== Tiers ==\nIntro '''text'''.\n{|\n!'''Tier'''\n!'''Cost'''\n|-\n|I\n|30\n|}\nOutro.\n");
        let tiers = &root.subsections[0];
        match &tiers.content {
            Content::Structured { text, tables } => {
                assert_eq!(text, "Intro text.\n\nOutro.");
                assert_eq!(tables.len(), 1);
                assert_eq!(tables[0][0].get("Tier"), Some("I"));
            }
            other => panic!("expected structured content, got {:?}", other),
        }
    }

    #[test]
    fn table_only_body_keeps_empty_text() {
        let root = tree("== T ==\n{|\n!A\n|-\n|1\n|}\n");
        let content = &root.subsections[0].content;
        assert!(matches!(content, Content::Structured { text, .. } if text.is_empty()));
        assert_eq!(content.tables().len(), 1);
    }

    #[test]
    fn unusable_table_falls_back_to_text() {
        let root = tree("== T ==\nwords\n{|\n|-\n|no titles\n|}\n");
        let content = &root.subsections[0].content;
        assert!(matches!(content, Content::Text(t) if t == "words"));
    }

    #[test]
    fn blank_body_is_empty_text() {
        let root = tree("== A ==\n  \n\n== B ==\n");
        for section in &root.subsections {
            assert_eq!(section.content, Content::Text(String::new()));
        }
        assert_eq!(serde_json::to_value(&root.subsections[0].content).unwrap(), "");
    }

    #[test]
    fn preamble_tables_land_on_root() {
        let root = tree("{|\n!A\n|-\n|1\n|}\n== S ==\n");
        assert_eq!(root.content.tables().len(), 1);
    }

    #[test]
    fn filter_with_empty_set_is_identity() {
        let root = tree("== A ==\na\n=== B ===\nb\n== C ==\nc\n");
        let empty: [&str; 0] = [];
        assert_eq!(filter_sections(root.clone(), &empty), root);
    }

    #[test]
    fn filter_removes_subtree_wholesale() {
        let root = tree("== X ==\nx\n=== Y ===\ny\n== Keep ==\nk\n=== Y ===\nnested y stays\n");
        let filtered = filter_sections(root, &["x"]);
        assert_eq!(titles(&filtered), vec!["Keep"]);
        assert_eq!(titles(&filtered.subsections[0]), vec!["Y"]);
        assert!(filtered.find("X").is_none());
    }

    #[test]
    fn filter_prunes_at_any_depth() {
        let root = tree("== A ==\n=== Trivia ===\nt\n==== Under ====\nu\n=== Facts ===\nf\n");
        let filtered = filter_sections(root, &["TRIVIA"]);
        assert_eq!(titles(&filtered.subsections[0]), vec!["Facts"]);
        assert!(filtered.find("Under").is_none());
    }

    #[test]
    fn filter_never_removes_root() {
        let root = tree("== Root ==\nr\n");
        let filtered = filter_sections(root, &["root"]);
        assert_eq!(filtered.title, ROOT_TITLE);
        assert!(filtered.subsections.is_empty());
    }

    #[test]
    fn filter_is_membership_not_pattern() {
        let root = tree("== See also ==\n== See also (extra) ==\n");
        let filtered = filter_sections(root, &["see also"]);
        assert_eq!(titles(&filtered), vec!["See also (extra)"]);
    }

    #[test]
    fn content_serializes_untagged() {
        let text = serde_json::to_value(Content::Text("a".into())).unwrap();
        assert_eq!(text, serde_json::json!("a"));

        let root = tree("== T ==\n{|\n!A\n|-\n|1\n|}\n");
        let value = serde_json::to_value(&root.subsections[0]).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "title": "T",
                "level": 1,
                "content": { "text": "", "tables": [[{ "A": "1" }]] },
                "subsections": []
            })
        );
    }
}
