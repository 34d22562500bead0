// Source adapters: two JSON APIs and four listing/detail page crawlers

pub mod artscentre;
pub mod base;
pub mod eventbrite;
pub mod factory;
pub mod feverup;
pub mod marriner;
pub mod page_crawler;
pub mod parsers;
pub mod ticketmaster;
pub mod whatson;

pub use base::{Cap, ScrapeOptions, ScrapeOutcome, SourceAdapter, SourceContext};
pub use factory::create_adapter;
