//! Adapter over `parse_wiki_text`: reduces a page to its visible prose,
//! lists its top-level templates and slices out its tables.
//!
//! Parsing is total. Markup nested deeper than [`MAX_NESTING`] is not
//! handed to the parser and is kept as plain text instead.

use std::ops::Range;
use std::sync::LazyLock;

use parse_wiki_text::{Configuration, ConfigurationSource, Node, Parameter};
use regex::Regex;
use tracing::warn;

/// Deepest bracket, tag or list nesting handed to the parser.
pub const MAX_NESTING: usize = 256;

const PROTOCOLS: &[&str] = &[
    "//", "ftp://", "ftps://", "git://", "http://", "https://", "irc://", "ircs://", "mailto:",
    "news:", "sftp://", "ssh://", "svn://", "tel:", "telnet://", "urn:", "xmpp:",
];

/// MediaWiki defaults as served by Fandom. No link trail: `[[ghost]]s`
/// keeps the `s` outside the link.
const FANDOM: ConfigurationSource<'static> = ConfigurationSource {
    category_namespaces: &["category"],
    extension_tags: &[
        "categorytree", "gallery", "graph", "imagemap", "indicator", "inputbox", "math", "nowiki", "poem", "pre", "ref", "references", "score", "section", "source",
        "syntaxhighlight", "tabber", "templatedata", "templatestyles", "timeline",
    ],
    file_namespaces: &["file", "image"],
    link_trail: "",
    magic_words: &[
        "DISAMBIG", "FORCETOC", "HIDDENCAT", "INDEX", "NEWSECTIONLINK", "NOEDITSECTION",
        "NOGALLERY", "NOINDEX", "NOTITLECONVERT", "NOTOC", "STATICREDIRECT", "TOC",
    ],
    protocols: PROTOCOLS,
    redirect_magic_words: &["REDIRECT"],
};

static CONFIGURATION: LazyLock<Configuration> = LazyLock::new(|| Configuration::new(&FANDOM));
static MULTI_NEWLINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Extension tags whose contents never reach the rendered text.
const INVISIBLE_TAGS: &[&str] = &[
    "categorytree", "gallery", "graph", "imagemap", "indicator", "inputbox", "math", "ref",
    "references", "score", "section", "source", "syntaxhighlight", "templatedata",
    "templatestyles", "timeline",
];
/// Tags that never enclose anything, written with or without `/>`.
const VOID_TAGS: &[&str] = &["br", "hr", "img", "wbr", "p", "li"];

/// A parsed page: stripped text plus the top-level templates and tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wikicode {
    source: String,
    text: String,
    templates: Vec<Template>,
    tables: Vec<TableBlock>,
    table_spans: Vec<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub params: Vec<Param>,
}

/// One template argument, as written. `name` is `None` for positional ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub value: String,
}

/// A `{| … |}` block. `contents` is the raw markup between the opening
/// line and the closing `|}`, starting with the newline that ends the
/// opening line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    pub attributes: String,
    pub contents: String,
}

impl Wikicode {
    pub fn parse(text: &str) -> Self {
        if nesting_exceeds(text, MAX_NESTING) {
            warn!(
                "Markup nested deeper than {} levels, keeping {} bytes as plain text",
                MAX_NESTING,
                text.len()
            );
            return Self {
                source: text.to_string(),
                text: text.to_string(),
                ..Self::default()
            };
        }

        let output = CONFIGURATION.parse(text);
        let mut doc = Self {
            source: text.to_string(),
            ..Self::default()
        };
        for node in &output.nodes {
            match node {
                Node::Template {
                    start,
                    end,
                    parameters,
                    ..
                } => doc.templates.push(template(text, *start, *end, parameters)),
                Node::Table { start, end, .. } => {
                    if let Some(raw) = text.get(*start..*end) {
                        doc.tables.push(table_block(raw));
                        doc.table_spans.push(*start..*end);
                    }
                }
                _ => {}
            }
        }

        let mut out = String::new();
        strip_nodes(&output.nodes, &mut out);
        doc.text = MULTI_NEWLINE_RE.replace_all(&out, "\n\n").into_owned();
        doc
    }

    /// Visible text: markup removed, links reduced to their labels,
    /// runs of blank lines collapsed to one.
    pub fn strip_code(&self) -> &str {
        &self.text
    }

    /// Top-level templates in document order.
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Top-level tables. Nested tables stay inside their outer block.
    pub fn tables(&self) -> &[TableBlock] {
        &self.tables
    }

    /// The same page with its top-level tables cut out.
    pub fn without_tables(&self) -> Self {
        if self.table_spans.is_empty() {
            return self.clone();
        }
        let mut rest = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for span in &self.table_spans {
            rest.push_str(&self.source[cursor..span.start]);
            cursor = span.end;
        }
        rest.push_str(&self.source[cursor..]);
        Self::parse(&rest)
    }
}

impl Template {
    /// `key = value` parameters, trimmed. Positional parameters are skipped.
    pub fn named_params(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.params
            .iter()
            .filter_map(|param| Some((param.name.as_deref()?, param.value.as_str())))
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.named_params()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| value)
    }
}

fn template(source: &str, start: usize, end: usize, parameters: &[Parameter<'_>]) -> Template {
    let name_end = parameters.first().map_or(end.saturating_sub(2), |p| p.start);
    let name = source
        .get(start + 2..name_end)
        .unwrap_or_default()
        .trim()
        .trim_end_matches('|')
        .trim()
        .to_string();

    let params = parameters
        .iter()
        .map(|p| {
            let raw = source.get(p.start..p.end).unwrap_or_default();
            let raw = raw.strip_prefix('|').unwrap_or(raw);
            match (&p.name, raw.split_once('=')) {
                (Some(_), Some((key, value))) => Param {
                    name: Some(key.trim().to_string()),
                    value: value.trim().to_string(),
                },
                _ => Param {
                    name: None,
                    value: raw.trim().to_string(),
                },
            }
        })
        .collect();

    Template { name, params }
}

fn table_block(raw: &str) -> TableBlock {
    let raw = raw.trim_start();
    let (header, body) = raw.split_once('\n').unwrap_or((raw, ""));
    let body = body.trim_end();
    let body = body.strip_suffix("|}").unwrap_or(body);
    let mut contents = format!("\n{}", body.trim_end_matches([' ', '\t']));
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    TableBlock {
        attributes: header.trim_start_matches("{|").trim().to_string(),
        contents,
    }
}

fn strip_nodes(nodes: &[Node<'_>], out: &mut String) {
    for node in nodes {
        strip_node(node, out);
    }
}

fn strip_node(node: &Node<'_>, out: &mut String) {
    match node {
        Node::Text { value, .. } => out.push_str(value),
        Node::CharacterEntity { character, .. } => out.push(*character),
        Node::ParagraphBreak { .. } => out.push_str("\n\n"),
        Node::StartTag { name, .. } if name == "br" => out.push('\n'),
        Node::Link { target, text, .. } => {
            if text.is_empty() {
                out.push_str(target.trim().trim_start_matches(':'));
            } else {
                strip_nodes(text, out);
            }
        }
        Node::ExternalLink { nodes, .. } => {
            let mut inner = String::new();
            strip_nodes(nodes, &mut inner);
            let inner = inner.trim();
            // Bare `[http://…]` has no label.
            let label = if PROTOCOLS.iter().any(|p| inner.starts_with(p)) {
                inner.split_once(char::is_whitespace).map_or("", |(_, title)| title.trim())
            } else {
                inner
            };
            out.push_str(label);
        }
        Node::Heading { nodes, .. } => {
            start_line(out);
            strip_nodes(nodes, out);
            out.push('\n');
        }
        Node::UnorderedList { items, .. } | Node::OrderedList { items, .. } => {
            start_line(out);
            for item in items {
                strip_nodes(&item.nodes, out);
                start_line(out);
            }
        }
        Node::DefinitionList { items, .. } => {
            start_line(out);
            for item in items {
                strip_nodes(&item.nodes, out);
                start_line(out);
            }
        }
        Node::Preformatted { nodes, .. } => {
            start_line(out);
            strip_nodes(nodes, out);
            start_line(out);
        }
        Node::Table { captions, rows, .. } => {
            start_line(out);
            for caption in captions {
                strip_nodes(&caption.content, out);
                start_line(out);
            }
            for row in rows {
                for cell in &row.cells {
                    strip_nodes(&cell.content, out);
                    start_line(out);
                }
            }
        }
        Node::Tag { name, nodes, .. } => {
            let name: &str = name;
            if !INVISIBLE_TAGS.contains(&name) {
                strip_nodes(nodes, out);
            }
        }
        _ => {}
    }
}

fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// One pass over `text` tracking how deep `{{`, `[[`, `{|`, tags and list
/// markers go. Unclosed openers count as open until the end.
fn nesting_exceeds(text: &str, limit: usize) -> bool {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut list_run = 0usize;
    let mut at_line_start = true;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if at_line_start {
            if matches!(b, b'*' | b'#' | b':' | b';') {
                list_run += 1;
                if list_run > limit {
                    return true;
                }
                i += 1;
                continue;
            }
            at_line_start = false;
            list_run = 0;
        }

        match (b, bytes.get(i + 1).copied()) {
            (b'{', Some(b'{' | b'|')) | (b'[', Some(b'[')) => {
                depth += 1;
                i += 2;
            }
            (b'}', Some(b'}')) | (b']', Some(b']')) | (b'|', Some(b'}')) | (b'<', Some(b'/')) => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            (b'<', Some(c)) if c.is_ascii_alphabetic() => {
                if !is_void_tag(&bytes[i + 1..]) {
                    depth += 1;
                }
                i += 1;
            }
            (b'\n', _) => {
                at_line_start = true;
                i += 1;
            }
            _ => i += 1,
        }

        if depth > limit {
            return true;
        }
    }
    false
}

/// `tag` starts right after `<`. The `>` search is bounded so a run of
/// unterminated tags stays linear.
fn is_void_tag(tag: &[u8]) -> bool {
    let name_len = tag.iter().take_while(|b| b.is_ascii_alphanumeric()).count();
    let name = tag[..name_len].to_ascii_lowercase();
    if VOID_TAGS.iter().any(|void| void.as_bytes() == name.as_slice()) {
        return true;
    }
    match tag.iter().take(512).position(|b| *b == b'>') {
        Some(close) => close > 0 && tag[close - 1] == b'/',
        None => false,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(text: &str) -> String {
        Wikicode::parse(text).strip_code().trim().to_string()
    }

    #[test]
    fn links_reduce_to_labels() {
        assert_eq!(strip("See [[Banshee]] and [[Demon|the Demon]]."), "See Banshee and the Demon.");
    }

    #[test]
    fn bold_italic_and_comments_removed() {
        assert_eq!(strip("'''Bold''' ''it'' <!-- hidden -->text"), "Bold it text");
    }

    #[test]
    fn templates_removed_from_text() {
        assert_eq!(strip("a {{Stub}}b"), "a b");
    }

    #[test]
    fn files_and_categories_dropped() {
        assert_eq!(strip("[[File:X.png|thumb|Caption]]Body[[Category:Ghosts]]"), "Body");
    }

    #[test]
    fn invisible_tags_dropped() {
        assert_eq!(strip("Fact.<ref>Source</ref>"), "Fact.");
        assert_eq!(strip("<gallery>\nA.png|a\n</gallery>\nafter"), "after");
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(strip("a &amp; b"), "a & b");
    }

    #[test]
    fn external_link_label() {
        assert_eq!(strip("[https://example.com the site]"), "the site");
    }

    #[test]
    fn blank_runs_collapsed() {
        assert!(!Wikicode::parse("a\n\n\n\n\nb").strip_code().contains("\n\n\n"));
    }

    #[test]
    fn table_block_found() {
        let doc = Wikicode::parse("intro\n{| class=\"wikitable\"\n!A\n|-\n|1\n|}\noutro");
        let tables = doc.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].attributes, "class=\"wikitable\"");
        assert_eq!(tables[0].contents, "\n!A\n|-\n|1\n");
    }

    #[test]
    fn nested_table_stays_in_outer_block() {
        let doc = Wikicode::parse("{|\n|a\n{|\n|b\n|}\n|c\n|}\n");
        let tables = doc.tables();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].contents.contains("|b"));
        assert!(tables[0].contents.contains("|c"));
    }

    #[test]
    fn without_tables_keeps_surrounding_text() {
        let doc = Wikicode::parse("before\n{|\n!A\n|-\n|1\n|}\nafter").without_tables();
        assert!(doc.tables().is_empty());
        let text = doc.strip_code();
        assert!(text.contains("before"));
        assert!(text.contains("after"));
        assert!(!text.contains('1'));
    }

    #[test]
    fn template_params() {
        let doc = Wikicode::parse(
            "{{Ghost\n|quote = Hi [[A|b]]\n|Evidence1=[[File:X.png|24x24px|link=EMF]]\n|positional\n}}",
        );
        let t = &doc.templates()[0];
        assert_eq!(t.name, "Ghost");
        assert_eq!(t.params.len(), 3);
        assert_eq!(t.param("quote"), Some("Hi [[A|b]]"));
        assert_eq!(t.param("Evidence1"), Some("[[File:X.png|24x24px|link=EMF]]"));
        assert_eq!(t.named_params().count(), 2);
    }

    #[test]
    fn nesting_measure() {
        assert!(!nesting_exceeds("{{a|[[b|c]]}} <span>x</span><br><ref name=\"n\" />", 2));
        assert!(nesting_exceeds("{{a|{{b|{{c}}}}}}", 2));
        assert!(nesting_exceeds("[[a|[[a|[[a|", 2));
        assert!(nesting_exceeds("<span><span><span>", 2));
        assert!(nesting_exceeds("***deep", 2));
        assert!(!nesting_exceeds("**\n**\n**", 2));
    }

    #[test]
    fn deep_link_nesting_kept_as_text() {
        let text = format!("{}x{}", "[[a|".repeat(20_000), "]]".repeat(20_000));
        let doc = Wikicode::parse(&text);
        assert_eq!(doc.strip_code(), text);
        assert!(doc.templates().is_empty());
        assert!(doc.tables().is_empty());
    }

    #[test]
    fn long_unclosed_runs_are_total() {
        for opener in ["{{", "[[", "<span>", "<ref>", "{|\n", "*"] {
            let text = format!("{} tail", opener.repeat(20_000));
            assert!(Wikicode::parse(&text).strip_code().contains("tail"), "{opener}");
        }
    }

    #[test]
    fn shallow_unclosed_openers_parse() {
        let text = format!("{} tail", "{{".repeat(MAX_NESTING / 2));
        assert!(Wikicode::parse(&text).strip_code().contains("tail"));
    }

    #[test]
    fn unterminated_table_at_end_of_input() {
        let doc = Wikicode::parse("intro\n{|\n!A\n|-\n|1");
        assert!(doc.strip_code().contains("intro"));
    }
}
