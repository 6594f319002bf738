//! Structural extraction of MediaWiki pages: wikitext in, a titled section
//! tree with cleaned prose and column-keyed tables out.

pub mod config;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod parser;

pub use parser::{
    extract_page, filter_sections, parse_tables, parse_wiki_hierarchy, Content, Row, Section,
    Table,
};
