pub mod normalize;
pub mod sections;
pub mod tables;
pub mod wikicode;

pub use sections::{Content, RawSection, Section, ROOT_TITLE};
pub use tables::{Row, Table};

/// Two-pass pipeline: wikitext → raw sections → section tree.
pub fn parse_wiki_hierarchy(text: &str) -> Section {
    let (preamble, raw) = sections::tokenize(text);
    sections::build(&preamble, &raw)
}

pub fn parse_tables(text: &str) -> Vec<Table> {
    tables::parse_tables(text)
}

pub fn filter_sections<S: AsRef<str>>(tree: Section, exclude_titles: &[S]) -> Section {
    sections::filter_sections(tree, exclude_titles)
}

/// Hierarchy with the excluded sections already pruned.
pub fn extract_page<S: AsRef<str>>(text: &str, exclude_titles: &[S]) -> Section {
    filter_sections(parse_wiki_hierarchy(text), exclude_titles)
}
