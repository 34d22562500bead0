use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::common::constants::*;
use crate::common::error::ScraperError;

/// External site or API an event was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Ticketmaster,
    Eventbrite,
    Artscentre,
    Marriner,
    Feverup,
    Whatson,
}

impl EventSource {
    pub const ALL: [EventSource; 6] = [
        EventSource::Ticketmaster,
        EventSource::Eventbrite,
        EventSource::Artscentre,
        EventSource::Marriner,
        EventSource::Feverup,
        EventSource::Whatson,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Ticketmaster => TICKETMASTER_SOURCE,
            EventSource::Eventbrite => EVENTBRITE_SOURCE,
            EventSource::Artscentre => ARTSCENTRE_SOURCE,
            EventSource::Marriner => MARRINER_SOURCE,
            EventSource::Feverup => FEVERUP_SOURCE,
            EventSource::Whatson => WHATSON_SOURCE,
        }
    }

    /// Rank used to break ties between duplicates. Lower wins: box offices that sell
    /// their own shows outrank ticketing platforms, which outrank aggregators.
    pub fn priority(&self) -> u8 {
        match self {
            EventSource::Marriner => 0,
            EventSource::Artscentre => 1,
            EventSource::Ticketmaster => 2,
            EventSource::Eventbrite => 3,
            EventSource::Feverup => 4,
            EventSource::Whatson => 5,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        EventSource::ALL
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| ScraperError::Config(format!("unknown source '{}'", s.trim())))
    }
}

/// Canonical category taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Music,
    Theatre,
    Comedy,
    Dance,
    Festival,
    Family,
    Film,
    Arts,
    Sport,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Music => "music",
            Category::Theatre => "theatre",
            Category::Comedy => "comedy",
            Category::Dance => "dance",
            Category::Festival => "festival",
            Category::Family => "family",
            Category::Film => "film",
            Category::Arts => "arts",
            Category::Sport => "sport",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suburb: Option<String>,
}

impl Venue {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            suburb: None,
        }
    }
}

/// The unified event record every source is normalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    pub title: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub subcategories: Vec<String>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub venue: Venue,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    pub is_free: bool,
    pub booking_url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub source: EventSource,
    pub source_id: String,
    pub scraped_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CanonicalEvent {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.source, self.source_id.clone())
    }

    pub fn has_real_description(&self) -> bool {
        !self.description.is_empty() && self.description != DESCRIPTION_PLACEHOLDER
    }
}

/// `(source, sourceId)`: the storage-level identity of an event. Orders by the persisted
/// strings, not enum declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaturalKey {
    pub source: EventSource,
    pub source_id: String,
}

impl NaturalKey {
    pub fn new(source: EventSource, source_id: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
        }
    }
}

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.source
            .as_str()
            .cmp(other.source.as_str())
            .then_with(|| self.source_id.cmp(&other.source_id))
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

/// A persisted event document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: CanonicalEvent,
}

/// Overwritable fields of a stored event. `scraped_at` keeps the first sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPatch {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub subcategories: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub venue: Venue,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub is_free: bool,
    pub booking_url: String,
    pub image_url: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl EventPatch {
    pub fn from_event(event: &CanonicalEvent, now: DateTime<Utc>) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            category: event.category,
            subcategories: event.subcategories.clone(),
            start_date: event.start_date,
            end_date: event.end_date,
            venue: event.venue.clone(),
            price_min: event.price_min,
            price_max: event.price_max,
            is_free: event.is_free,
            booking_url: event.booking_url.clone(),
            image_url: event.image_url.clone(),
            last_updated: now,
        }
    }

    pub fn apply(self, event: &mut CanonicalEvent) {
        event.title = self.title;
        event.description = self.description;
        event.category = self.category;
        event.subcategories = self.subcategories;
        event.start_date = self.start_date;
        event.end_date = self.end_date;
        event.venue = self.venue;
        event.price_min = self.price_min;
        event.price_max = self.price_max;
        event.is_free = self.is_free;
        event.booking_url = self.booking_url;
        event.image_url = self.image_url;
        event.last_updated = self.last_updated;
    }
}
