/// Source name constants to ensure consistency across the codebase.
/// These strings are half of the persisted natural key and must never change.
pub const TICKETMASTER_SOURCE: &str = "ticketmaster";
pub const EVENTBRITE_SOURCE: &str = "eventbrite";
pub const ARTSCENTRE_SOURCE: &str = "artscentre";
pub const MARRINER_SOURCE: &str = "marriner";
pub const FEVERUP_SOURCE: &str = "feverup";
pub const WHATSON_SOURCE: &str = "whatson";

// Listing and API endpoints
pub const TICKETMASTER_API_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";
pub const EVENTBRITE_API_URL: &str = "https://www.eventbriteapi.com/v3";
pub const ARTSCENTRE_LISTING_URL: &str = "https://www.artscentremelbourne.com.au/whats-on";
pub const MARRINER_LISTING_URL: &str = "https://marrinergroup.com.au/shows";
pub const FEVERUP_LISTING_URL: &str = "https://feverup.com/en/melbourne";
pub const WHATSON_LISTING_URL: &str = "https://whatson.melbourne.vic.gov.au/things-to-do";

// Credentials are read from these environment variables unless overridden in config
pub const TICKETMASTER_API_KEY_ENV: &str = "TICKETMASTER_API_KEY";
pub const EVENTBRITE_TOKEN_ENV: &str = "EVENTBRITE_TOKEN";

// Home venues for single-operator sources
pub const ARTSCENTRE_VENUE_NAME: &str = "Arts Centre Melbourne";
pub const MARRINER_VENUE_NAME: &str = "Marriner Theatres";
pub const UNKNOWN_VENUE_NAME: &str = "Venue TBA";

/// Timezone applied to source timestamps that carry none.
pub const DEFAULT_TIMEZONE: chrono_tz::Tz = chrono_tz::Australia::Melbourne;

pub const DESCRIPTION_PLACEHOLDER: &str = "No description available.";

// Scrape defaults
pub const DEFAULT_MAX_EVENTS: usize = 50;
pub const DEFAULT_MAX_PAGES: usize = 5;
pub const TICKETMASTER_PAGE_SIZE: usize = 50;

// Run defaults
pub const DEFAULT_CONCURRENCY: usize = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
