use chrono::{DateTime, Utc};

use super::super::base::{
    derive_price, description_or_placeholder, map_category, non_empty, optional_url,
    page_source_id, parse_timestamp, require_booking_url, require_source_id, require_start,
    require_title, strip_title_suffix, PriceSignals,
};
use crate::common::constants::{ARTSCENTRE_VENUE_NAME, MARRINER_VENUE_NAME, UNKNOWN_VENUE_NAME};
use crate::common::error::MappingError;
use crate::domain::{CanonicalEvent, EventSource, Venue};

/// Fields lifted from a venue or aggregator detail page (JSON-LD first, then
/// OpenGraph and page markup). Everything except `url` is optional at this stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPageRecord {
    pub url: String,
    /// Set when the page exposes its own id; otherwise derived from `url`.
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub venue_suburb: Option<String>,
    pub image: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub price_texts: Vec<String>,
    pub is_free: Option<bool>,
    pub categories: Vec<String>,
}

struct PageDefaults {
    source: EventSource,
    home_venue: Option<(&'static str, &'static str)>,
    title_suffixes: &'static [&'static str],
}

const ARTSCENTRE: PageDefaults = PageDefaults {
    source: EventSource::Artscentre,
    home_venue: Some((ARTSCENTRE_VENUE_NAME, "Southbank")),
    title_suffixes: &["Arts Centre Melbourne"],
};

const MARRINER: PageDefaults = PageDefaults {
    source: EventSource::Marriner,
    home_venue: Some((MARRINER_VENUE_NAME, "Melbourne")),
    title_suffixes: &["Marriner Group", "Marriner Theatres"],
};

const FEVERUP: PageDefaults = PageDefaults {
    source: EventSource::Feverup,
    home_venue: None,
    title_suffixes: &["Fever", "Feverup"],
};

const WHATSON: PageDefaults = PageDefaults {
    source: EventSource::Whatson,
    home_venue: None,
    title_suffixes: &["What's On Melbourne", "City of Melbourne"],
};

pub fn normalize_artscentre(
    page: &RawPageRecord,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    normalize_page(page, &ARTSCENTRE, scraped_at)
}

pub fn normalize_marriner(
    page: &RawPageRecord,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    normalize_page(page, &MARRINER, scraped_at)
}

pub fn normalize_feverup(
    page: &RawPageRecord,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    normalize_page(page, &FEVERUP, scraped_at)
}

pub fn normalize_whatson(
    page: &RawPageRecord,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    normalize_page(page, &WHATSON, scraped_at)
}

fn venue_for(page: &RawPageRecord, defaults: &PageDefaults) -> Venue {
    let address = non_empty(page.venue_address.as_deref());
    let suburb = non_empty(page.venue_suburb.as_deref());
    match (non_empty(page.venue_name.as_deref()), defaults.home_venue) {
        (Some(name), _) => Venue {
            name,
            address,
            suburb,
        },
        (None, Some((home, home_suburb))) => Venue {
            name: home.to_string(),
            address,
            suburb: suburb.or_else(|| Some(home_suburb.to_string())),
        },
        (None, None) => Venue {
            name: UNKNOWN_VENUE_NAME.to_string(),
            address,
            suburb,
        },
    }
}

fn normalize_page(
    page: &RawPageRecord,
    defaults: &PageDefaults,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    let booking_url = require_booking_url(Some(page.url.as_str()))?;
    let source_id = match page.source_id.as_deref() {
        Some(id) => require_source_id(Some(id))?,
        None => page_source_id(&booking_url),
    };
    let title = require_title(page.title.as_deref())
        .map(|t| strip_title_suffix(&t, defaults.title_suffixes))?;
    let start_date = require_start(page.start.as_deref())?;
    let end_date = page
        .end
        .as_deref()
        .and_then(parse_timestamp)
        .filter(|end| *end >= start_date);

    let price = derive_price(&PriceSignals {
        min: page.price_min,
        max: page.price_max,
        explicit_free: page.is_free,
        texts: page.price_texts.clone(),
    })?;
    let (category, subcategories) = map_category(&page.categories);

    Ok(CanonicalEvent {
        title,
        description: description_or_placeholder(page.description.as_deref()),
        category,
        subcategories,
        start_date,
        end_date,
        venue: venue_for(page, defaults),
        price_min: price.min,
        price_max: price.max,
        is_free: price.is_free,
        booking_url,
        image_url: optional_url(page.image.as_deref()),
        source: defaults.source,
        source_id,
        scraped_at,
        last_updated: scraped_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::DESCRIPTION_PLACEHOLDER;
    use crate::domain::Category;

    fn hamlet_page() -> RawPageRecord {
        RawPageRecord {
            url: "https://marrinergroup.com.au/shows/hamlet".into(),
            title: Some("Hamlet | Marriner Group".into()),
            description: Some("<p>Shakespeare's greatest tragedy.</p>".into()),
            start: Some("2025-11-01T19:30:00+11:00".into()),
            venue_name: Some("Comedy Theatre".into()),
            price_texts: vec!["Tickets from $79".into()],
            categories: vec!["Theatre".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_marriner_page() {
        let event = normalize_marriner(&hamlet_page(), Utc::now()).unwrap();
        assert_eq!(event.source, EventSource::Marriner);
        assert_eq!(event.source_id, "hamlet");
        assert_eq!(event.title, "Hamlet");
        assert_eq!(event.description, "Shakespeare's greatest tragedy.");
        assert_eq!(event.price_min, Some(79.0));
        assert_eq!(event.category, Category::Theatre);
        assert_eq!(event.venue.name, "Comedy Theatre");
    }

    #[test]
    fn test_home_venue_fallback() {
        let mut page = hamlet_page();
        page.venue_name = None;
        let event = normalize_artscentre(&page, Utc::now()).unwrap();
        assert_eq!(event.venue.name, ARTSCENTRE_VENUE_NAME);
        assert_eq!(event.venue.suburb.as_deref(), Some("Southbank"));

        let event = normalize_whatson(&page, Utc::now()).unwrap();
        assert_eq!(event.venue.name, UNKNOWN_VENUE_NAME);
        assert_eq!(event.venue.suburb, None);
    }

    #[test]
    fn test_feverup_plan_id_and_free_event() {
        let page = RawPageRecord {
            url: "https://feverup.com/m/154321".into(),
            title: Some("Candlelight: Vivaldi's Four Seasons".into()),
            start: Some("2025-12-02".into()),
            is_free: Some(true),
            ..Default::default()
        };
        let event = normalize_feverup(&page, Utc::now()).unwrap();
        assert_eq!(event.source_id, "154321");
        assert!(event.is_free);
        assert_eq!(event.description, DESCRIPTION_PLACEHOLDER);
        assert_eq!(event.image_url, None);
    }

    #[test]
    fn test_required_fields_and_end_before_start() {
        let mut page = hamlet_page();
        page.end = Some("2025-10-01T19:30:00+10:00".into());
        let event = normalize_marriner(&page, Utc::now()).unwrap();
        assert_eq!(event.end_date, None);

        let mut page = hamlet_page();
        page.start = None;
        assert_eq!(normalize_marriner(&page, Utc::now()).unwrap_err().field, "startDate");

        let mut page = hamlet_page();
        page.title = None;
        assert_eq!(normalize_marriner(&page, Utc::now()).unwrap_err().field, "title");

        let mut page = hamlet_page();
        page.source_id = Some("  ".into());
        assert_eq!(normalize_marriner(&page, Utc::now()).unwrap_err().field, "sourceId");
    }
}
