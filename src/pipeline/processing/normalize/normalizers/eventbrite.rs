use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use super::super::base::{
    derive_price, description_or_placeholder, map_category, non_empty, optional_url,
    parse_timestamp, parse_timestamp_in, require_booking_url, require_source_id, require_title,
    PriceSignals,
};
use crate::common::constants::{DEFAULT_TIMEZONE, UNKNOWN_VENUE_NAME};
use crate::common::error::MappingError;
use crate::domain::{CanonicalEvent, EventSource, Venue};

/// An event from the Eventbrite v3 API, requested with
/// `expand=venue,ticket_availability,category,subcategory,format`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEventbriteEvent {
    pub id: Option<String>,
    pub name: Option<EbText>,
    pub description: Option<EbText>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub start: Option<EbDate>,
    pub end: Option<EbDate>,
    pub is_free: Option<bool>,
    pub logo: Option<EbLogo>,
    pub venue: Option<EbVenue>,
    pub ticket_availability: Option<EbTicketAvailability>,
    pub category: Option<EbNamed>,
    pub subcategory: Option<EbNamed>,
    pub format: Option<EbNamed>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbText {
    pub text: Option<String>,
    pub html: Option<String>,
}

impl EbText {
    fn best(&self) -> Option<&str> {
        self.text.as_deref().or(self.html.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbDate {
    pub timezone: Option<String>,
    pub local: Option<String>,
    pub utc: Option<String>,
}

impl EbDate {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        if let Some(instant) = self.utc.as_deref().and_then(parse_timestamp) {
            return Some(instant);
        }
        let tz = self
            .timezone
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(DEFAULT_TIMEZONE);
        self.local
            .as_deref()
            .and_then(|local| parse_timestamp_in(local, tz))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbLogo {
    pub url: Option<String>,
    pub original: Option<EbImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbImage {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbVenue {
    pub name: Option<String>,
    pub address: Option<EbAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbAddress {
    pub address_1: Option<String>,
    pub city: Option<String>,
    pub localized_address_display: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbTicketAvailability {
    pub minimum_ticket_price: Option<EbMoney>,
    pub maximum_ticket_price: Option<EbMoney>,
}

/// `major_value` is a decimal string such as `"25.00"`; `value` is in cents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbMoney {
    pub major_value: Option<String>,
    pub value: Option<i64>,
}

impl EbMoney {
    fn amount(&self) -> Option<f64> {
        self.major_value
            .as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .or_else(|| self.value.map(|cents| cents as f64 / 100.0))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EbNamed {
    pub name: Option<String>,
    pub short_name: Option<String>,
}

pub fn normalize(
    raw: &RawEventbriteEvent,
    scraped_at: DateTime<Utc>,
) -> Result<CanonicalEvent, MappingError> {
    let source_id = require_source_id(raw.id.as_deref())?;
    let title = require_title(raw.name.as_ref().and_then(EbText::best))?;
    let booking_url = require_booking_url(raw.url.as_deref())?;

    let start = raw.start.as_ref().ok_or_else(|| MappingError::missing("startDate"))?;
    let start_date = start
        .resolve()
        .ok_or_else(|| MappingError::new("startDate", "unparseable Eventbrite start date"))?;
    let end_date = raw.end.as_ref().and_then(EbDate::resolve);

    let tickets = raw.ticket_availability.as_ref();
    let signals = PriceSignals {
        min: tickets
            .and_then(|t| t.minimum_ticket_price.as_ref())
            .and_then(EbMoney::amount),
        max: tickets
            .and_then(|t| t.maximum_ticket_price.as_ref())
            .and_then(EbMoney::amount),
        explicit_free: raw.is_free,
        texts: Vec::new(),
    };
    let price = derive_price(&signals)?;

    let labels: Vec<String> = [&raw.subcategory, &raw.category, &raw.format]
        .into_iter()
        .filter_map(|named| {
            named
                .as_ref()
                .and_then(|n| non_empty(n.name.as_deref().or(n.short_name.as_deref())))
        })
        .collect();
    let (category, subcategories) = map_category(&labels);

    let venue = match &raw.venue {
        Some(v) => {
            let address = v.address.as_ref();
            Venue {
                name: non_empty(v.name.as_deref())
                    .unwrap_or_else(|| UNKNOWN_VENUE_NAME.to_string()),
                address: address.and_then(|a| {
                    non_empty(a.address_1.as_deref())
                        .or_else(|| non_empty(a.localized_address_display.as_deref()))
                }),
                suburb: address.and_then(|a| non_empty(a.city.as_deref())),
            }
        }
        None => Venue::named(UNKNOWN_VENUE_NAME),
    };

    let description = raw
        .description
        .as_ref()
        .and_then(EbText::best)
        .or(raw.summary.as_deref());

    let image_url = raw.logo.as_ref().and_then(|logo| {
        optional_url(logo.original.as_ref().and_then(|o| o.url.as_deref()))
            .or_else(|| optional_url(logo.url.as_deref()))
    });

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
        image_url,
        source: EventSource::Eventbrite,
        source_id,
        scraped_at,
        last_updated: scraped_at,
    })
}
