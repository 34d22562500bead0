//! Maps raw source records onto [`CanonicalEvent`]. Pure and synchronous.

use chrono::{DateTime, Utc};

use crate::common::error::MappingError;
use crate::domain::{CanonicalEvent, EventSource};

pub mod base;
pub mod normalizers;

pub use normalizers::eventbrite::RawEventbriteEvent;
pub use normalizers::ticketmaster::RawTicketmasterEvent;
pub use normalizers::venue_page::RawPageRecord;

/// One record as a source delivered it, tagged with the source that produced it.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Ticketmaster(RawTicketmasterEvent),
    Eventbrite(RawEventbriteEvent),
    ArtsCentre(RawPageRecord),
    Marriner(RawPageRecord),
    Feverup(RawPageRecord),
    WhatsOn(RawPageRecord),
}

impl RawRecord {
    pub fn source(&self) -> EventSource {
        match self {
            RawRecord::Ticketmaster(_) => EventSource::Ticketmaster,
            RawRecord::Eventbrite(_) => EventSource::Eventbrite,
            RawRecord::ArtsCentre(_) => EventSource::Artscentre,
            RawRecord::Marriner(_) => EventSource::Marriner,
            RawRecord::Feverup(_) => EventSource::Feverup,
            RawRecord::WhatsOn(_) => EventSource::Whatson,
        }
    }

    /// Something to identify the record by in logs, even when it fails to map.
    pub fn id_hint(&self) -> String {
        match self {
            RawRecord::Ticketmaster(raw) => raw.id.clone().unwrap_or_else(|| "<no id>".into()),
            RawRecord::Eventbrite(raw) => raw.id.clone().unwrap_or_else(|| "<no id>".into()),
            RawRecord::ArtsCentre(page)
            | RawRecord::Marriner(page)
            | RawRecord::Feverup(page)
            | RawRecord::WhatsOn(page) => page.url.clone(),
        }
    }

    /// Wrap a page record for a page-scraped source. `None` for API sources.
    pub fn from_page(source: EventSource, page: RawPageRecord) -> Option<Self> {
        match source {
            EventSource::Artscentre => Some(RawRecord::ArtsCentre(page)),
            EventSource::Marriner => Some(RawRecord::Marriner(page)),
            EventSource::Feverup => Some(RawRecord::Feverup(page)),
            EventSource::Whatson => Some(RawRecord::WhatsOn(page)),
            EventSource::Ticketmaster | EventSource::Eventbrite => None,
        }
    }
}

pub fn normalize(
    record: &RawRecord,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    match record {
        RawRecord::Ticketmaster(raw) => normalizers::ticketmaster::normalize(raw, scraped_at),
        RawRecord::Eventbrite(raw) => normalizers::eventbrite::normalize(raw, scraped_at),
        RawRecord::ArtsCentre(page) => normalizers::venue_page::normalize_artscentre(page, scraped_at),
        RawRecord::Marriner(page) => normalizers::venue_page::normalize_marriner(page, scraped_at),
        RawRecord::Feverup(page) => normalizers::venue_page::normalize_feverup(page, scraped_at),
        RawRecord::WhatsOn(page) => normalizers::venue_page::normalize_whatson(page, scraped_at),
    }
}
