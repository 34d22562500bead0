//! HTML extraction shared by the page-scraped sources.

pub mod html;
pub mod jsonld;

pub use html::collect_links;
pub use jsonld::page_record;
