use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use super::super::base::{
    derive_price, description_or_placeholder, local_date_time, map_category, non_empty,
    optional_url, parse_timestamp, require_booking_url, require_source_id, require_title,
    PriceSignals,
};
use crate::common::constants::{DEFAULT_TIMEZONE, UNKNOWN_VENUE_NAME};
use crate::common::error::MappingError;
use crate::domain::{CanonicalEvent, EventSource, Venue};

/// An event object from the Discovery API `_embedded.events` array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicketmasterEvent {
    pub id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub info: Option<String>,
    pub please_note: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<TmImage>,
    #[serde(default)]
    pub dates: TmDates,
    #[serde(default)]
    pub classifications: Vec<TmClassification>,
    #[serde(default)]
    pub price_ranges: Vec<TmPriceRange>,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<TmEmbedded>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmImage {
    pub url: Option<String>,
    pub ratio: Option<String>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmDates {
    #[serde(default)]
    pub start: TmDate,
    pub end: Option<TmDate>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TmDate {
    pub local_date: Option<String>,
    pub local_time: Option<String>,
    pub date_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TmClassification {
    #[serde(default)]
    pub primary: bool,
    pub segment: Option<TmNamed>,
    pub genre: Option<TmNamed>,
    pub sub_genre: Option<TmNamed>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmNamed {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmPriceRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmEmbedded {
    #[serde(default)]
    pub venues: Vec<TmVenue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmVenue {
    pub name: Option<String>,
    pub address: Option<TmAddress>,
    pub city: Option<TmNamed>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmAddress {
    pub line1: Option<String>,
}

fn event_timezone(dates: &TmDates) -> Tz {
    dates
        .timezone
        .as_deref()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(DEFAULT_TIMEZONE)
}

/// `dateTime` is UTC and wins; otherwise the local date and time in the event timezone.
fn resolve_date(date: &TmDate, tz: Tz) -> Option<DateTime<Utc>> {
    if let Some(instant) = date.date_time.as_deref().and_then(parse_timestamp) {
        return Some(instant);
    }
    let day = NaiveDate::parse_from_str(date.local_date.as_deref()?.trim(), "%Y-%m-%d").ok()?;
    let time = date.local_time.as_deref().and_then(|t| {
        NaiveTime::parse_from_str(t.trim(), "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(t.trim(), "%H:%M"))
            .ok()
    });
    local_date_time(day, time, tz)
}

/// Widest 16:9 image, else the widest of any ratio.
fn pick_image(images: &[TmImage]) -> Option<String> {
    let widest = |wide_only: bool| {
        images
            .iter()
            .filter(|img| !wide_only || img.ratio.as_deref() == Some("16_9"))
            .filter(|img| img.url.is_some())
            .max_by_key(|img| img.width.unwrap_or(0))
            .and_then(|img| optional_url(img.url.as_deref()))
    };
    widest(true).or_else(|| widest(false))
}

/// Most specific label first so genre beats segment.
fn labels(classifications: &[TmClassification]) -> Vec<String> {
    let primary = classifications
        .iter()
        .find(|c| c.primary)
        .or_else(|| classifications.first());
    let Some(c) = primary else {
        return Vec::new();
    };
    [&c.genre, &c.sub_genre, &c.segment]
        .into_iter()
        .filter_map(|named| named.as_ref().and_then(|n| non_empty(n.name.as_deref())))
        .collect()
}

pub fn normalize(
    raw: &RawTicketmasterEvent,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    let source_id = require_source_id(raw.id.as_deref())?;
    let title = require_title(raw.name.as_deref())?;
    let booking_url = require_booking_url(raw.url.as_deref())?;

    let tz = event_timezone(&raw.dates);
    let start_date = resolve_date(&raw.dates.start, tz).ok_or_else(|| {
        if raw.dates.start.local_date.is_none() && raw.dates.start.date_time.is_none() {
            MappingError::missing("startDate")
        } else {
            MappingError::new("startDate", "unparseable Discovery API start date")
        }
    })?;
    let end_date = raw.dates.end.as_ref().and_then(|end| resolve_date(end, tz));

    let signals = PriceSignals {
        min: raw.price_ranges.iter().filter_map(|p| p.min).reduce(f64::min),
        max: raw.price_ranges.iter().filter_map(|p| p.max).reduce(f64::max),
        explicit_free: None,
        texts: Vec::new(),
    };
    let price = derive_price(&signals)?;

    let (category, subcategories) = map_category(&labels(&raw.classifications));

    let venue = raw
        .embedded
        .as_ref()
        .and_then(|e| e.venues.first())
        .map(|v| Venue {
            name: non_empty(v.name.as_deref()).unwrap_or_else(|| UNKNOWN_VENUE_NAME.to_string()),
            address: v.address.as_ref().and_then(|a| non_empty(a.line1.as_deref())),
            suburb: v.city.as_ref().and_then(|c| non_empty(c.name.as_deref())),
        })
        .unwrap_or_else(|| Venue::named(UNKNOWN_VENUE_NAME));

    let description = raw
        .description
        .as_deref()
        .or(raw.info.as_deref())
        .or(raw.please_note.as_deref());

    Ok(CanonicalEvent {
        title,
        description: description_or_placeholder(description),
        category,
        subcategories,
        start_date,
        end_date,
        venue,
        price_min: price.min,
        price_max: price.max,
        is_free: price.is_free,
        booking_url,
        image_url: pick_image(&raw.images),
        source: EventSource::Ticketmaster,
        source_id,
        scraped_at,
        last_updated: scraped_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;

    fn sample() -> RawTicketmasterEvent {
        serde_json::from_value(serde_json::json!({
            "name": "Hamlet",
            "id": "G5vYZ9hamlet",
            "url": "https://www.ticketmaster.com.au/hamlet-melbourne-01-11-2025/event/1",
            "images": [
                {"ratio": "4_3", "url": "https://img.tm.test/hamlet_4_3.jpg", "width": 2048},
                {"ratio": "16_9", "url": "https://img.tm.test/hamlet_small.jpg", "width": 640},
                {"ratio": "16_9", "url": "https://img.tm.test/hamlet_large.jpg", "width": 1024}
            ],
            "dates": {
                "start": {"localDate": "2025-11-01", "localTime": "19:30:00"},
                "timezone": "Australia/Melbourne"
            },
            "classifications": [{
                "primary": true,
                "segment": {"name": "Arts & Theatre"},
                "genre": {"name": "Theatre"},
                "subGenre": {"name": "Drama"}
            }],
            "info": "A new production of Shakespeare's tragedy.",
            "priceRanges": [{"type": "standard", "currency": "AUD", "min": 59.9, "max": 149.9}],
            "_embedded": {"venues": [{
                "name": "Comedy Theatre",
                "address": {"line1": "240 Exhibition St"},
                "city": {"name": "Melbourne"}
            }]}
        }))
        .unwrap()
    }

    #[test]
    fn test_maps_discovery_event() {
        let scraped_at = Utc::now();
        let event = normalize(&sample(), scraped_at).unwrap();

        assert_eq!(event.source_id, "G5vYZ9hamlet");
        assert_eq!(event.title, "Hamlet");
        assert_eq!(event.start_date.to_rfc3339(), "2025-11-01T08:30:00+00:00");
        assert_eq!(event.category, Category::Theatre);
        assert_eq!(event.subcategories, vec!["drama", "arts & theatre"]);
        assert_eq!(event.price_min, Some(59.9));
        assert_eq!(event.price_max, Some(149.9));
        assert!(!event.is_free);
        assert_eq!(event.venue.name, "Comedy Theatre");
        assert_eq!(event.venue.suburb.as_deref(), Some("Melbourne"));
        assert_eq!(event.image_url.as_deref(), Some("https://img.tm.test/hamlet_large.jpg"));
        assert_eq!(event.description, "A new production of Shakespeare's tragedy.");
        assert_eq!(event.scraped_at, scraped_at);
    }

    #[test]
    fn test_utc_date_time_wins_over_local_parts() {
        let mut raw = sample();
        raw.dates.start.date_time = Some("2025-11-01T09:00:00Z".into());
        let event = normalize(&raw, Utc::now()).unwrap();
        assert_eq!(event.start_date.to_rfc3339(), "2025-11-01T09:00:00+00:00");
    }

    #[test]
    fn test_missing_pieces() {
        let mut raw = sample();
        raw.price_ranges.clear();
        raw.embedded = None;
        raw.info = None;
        let event = normalize(&raw, Utc::now()).unwrap();
        assert!(event.is_free);
        assert_eq!(event.price_min, None);
        assert_eq!(event.venue.name, UNKNOWN_VENUE_NAME);
        assert!(!event.has_real_description());

        let mut raw = sample();
        raw.dates.start = TmDate::default();
        assert_eq!(normalize(&raw, Utc::now()).unwrap_err().field, "startDate");

        let mut raw = sample();
        raw.id = None;
        assert_eq!(normalize(&raw, Utc::now()).unwrap_err().field, "sourceId");
    }
}
