use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::common::constants::{DEFAULT_TIMEZONE, DESCRIPTION_PLACEHOLDER};
use crate::common::error::MappingError;
use crate::domain::Category;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:A\$|AUD\s?|\$)\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?")
        .expect("valid amount regex")
});
static FEVER_PLAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/m/(\d+)").expect("valid plan id regex"));
static BARE_AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d{1,2})?)\s*$").expect("valid bare amount regex"));

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%z"];

/// Keyword table for the canonical taxonomy. Checked in order, so more specific
/// categories come first.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Festival, &["festival", "festivals", "fest", "carnival"]),
    (
        Category::Comedy,
        &["comedy", "comedian", "stand up", "standup", "improv"],
    ),
    (
        Category::Family,
        &["family", "families", "kids", "children", "childrens", "school holidays"],
    ),
    (Category::Dance, &["dance", "ballet", "dancing", "tap"]),
    (
        Category::Theatre,
        &[
            "theatre", "theater", "musical", "musicals", "play", "plays", "drama", "cabaret",
            "circus", "opera", "performing arts",
        ],
    ),
    (
        Category::Music,
        &[
            "music", "concert", "concerts", "gig", "gigs", "rock", "pop", "jazz", "classical",
            "orchestra", "symphony", "hip hop", "rap", "electronic", "country", "folk", "blues",
            "metal", "indie", "r b", "soul", "choir", "live music",
        ],
    ),
    (
        Category::Film,
        &["film", "films", "cinema", "movie", "movies", "screening"],
    ),
    (
        Category::Arts,
        &[
            "art", "arts", "exhibition", "exhibitions", "gallery", "museum", "visual",
            "workshop", "talk", "talks", "literature", "books",
        ],
    ),
    (
        Category::Sport,
        &[
            "sport", "sports", "football", "afl", "cricket", "tennis", "basketball", "racing",
            "motorsport", "rugby", "soccer",
        ],
    ),
];

const IGNORED_LABELS: &[&str] = &["undefined", "other", "miscellaneous", "misc", "event", "events"];

/// Collapse runs of whitespace into single spaces.
pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned text, or `None` when nothing is left.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    let cleaned = clean_text(value?);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Drop tags and decode the handful of entities sources actually emit.
pub fn strip_html(input: &str) -> String {
    let without_tags = TAG_RE.replace_all(input, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&rsquo;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    clean_text(&decoded)
}

pub fn description_or_placeholder(value: Option<&str>) -> String {
    value
        .map(strip_html)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DESCRIPTION_PLACEHOLDER.to_string())
}

pub fn require_title(value: Option<&str>) -> Result<String, MappingError> {
    value
        .map(strip_html)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MappingError::missing("title"))
}

pub fn require_source_id(value: Option<&str>) -> Result<String, MappingError> {
    non_empty(value).ok_or_else(|| MappingError::missing("sourceId"))
}

/// Stable id for a page-scraped event: the last path slug of its URL, the Fever plan id
/// for `/m/<id>` URLs, or a short SHA-256 of the URL when neither is usable.
pub fn page_source_id(url: &str) -> String {
    if let Some(caps) = FEVER_PLAN_RE.captures(url) {
        return caps[1].to_string();
    }
    let slug = reqwest::Url::parse(url.trim()).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_lowercase))
    });
    match slug {
        Some(slug) if slug.chars().any(|c| c.is_alphanumeric()) => slug,
        _ => {
            let digest = Sha256::digest(url.trim().as_bytes());
            hex::encode(digest)[..16].to_string()
        }
    }
}

/// Absolute http(s) URL or `None`.
pub fn optional_url(value: Option<&str>) -> Option<String> {
    let raw = value?.trim();
    let url = reqwest::Url::parse(raw).ok()?;
    if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
        Some(url.to_string())
    } else {
        None
    }
}

pub fn require_booking_url(value: Option<&str>) -> Result<String, MappingError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Err(MappingError::missing("bookingUrl")),
        Some(raw) => optional_url(Some(raw))
            .ok_or_else(|| MappingError::new("bookingUrl", format!("'{}' is not a valid URL", raw))),
    }
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earlier instant; times in
/// a DST gap move forward an hour.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn local_date_time(date: NaiveDate, time: Option<NaiveTime>, tz: Tz) -> Option<DateTime<Utc>> {
    resolve_local(date.and_time(time.unwrap_or(NaiveTime::MIN)), tz)
}

/// Parse a source timestamp. Values without an offset are read in `tz`; date-only values
/// resolve to local midnight.
pub fn parse_timestamp_in(value: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return resolve_local(naive, tz);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| local_date_time(date, None, tz))
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    parse_timestamp_in(value, DEFAULT_TIMEZONE)
}

pub fn require_start(value: Option<&str>) -> Result<DateTime<Utc>, MappingError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MappingError::missing("startDate"))?;
    parse_timestamp(raw)
        .ok_or_else(|| MappingError::new("startDate", format!("unparseable date '{}'", raw)))
}

/// Every price hint a record carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSignals {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// What the source itself says about being free, when it says anything.
    pub explicit_free: Option<bool>,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedPrice {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub is_free: bool,
}

impl DerivedPrice {
    const FREE: DerivedPrice = DerivedPrice {
        min: None,
        max: None,
        is_free: true,
    };
}

fn parse_amounts(text: &str) -> Vec<f64> {
    if let Some(caps) = BARE_AMOUNT_RE.captures(text) {
        return caps[1].parse::<f64>().ok().into_iter().collect();
    }
    AMOUNT_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps[1].replace(',', "");
            let amount = match caps.get(2) {
                Some(cents) => format!("{}.{}", whole, cents.as_str()),
                None => whole,
            };
            amount.parse::<f64>().ok()
        })
        .collect()
}

fn reads_as_free(text: &str) -> bool {
    if text.to_lowercase().contains("free") {
        return true;
    }
    let amounts = parse_amounts(text);
    !amounts.is_empty() && amounts.iter().all(|a| *a == 0.0)
}

fn range_of(amounts: &[f64]) -> Option<(f64, f64)> {
    let lo = amounts.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lo.is_finite() && hi.is_finite()).then_some((lo, hi))
}

/// Work out the price range and the free flag.
///
/// Structured prices win over amounts found in text. An event is free only when no
/// non-zero price signal exists; a paid signal that yields no usable price is an error,
/// never a guess.
pub fn derive_price(signals: &PriceSignals) -> Result<DerivedPrice, MappingError> {
    let valid = |v: Option<f64>| v.filter(|x| x.is_finite() && *x >= 0.0);
    let structured: Vec<f64> = [valid(signals.min), valid(signals.max)]
        .into_iter()
        .flatten()
        .collect();

    if structured.iter().any(|a| *a > 0.0) {
        if let Some((lo, hi)) = range_of(&structured) {
            return Ok(DerivedPrice {
                min: Some(lo),
                max: Some(hi),
                is_free: false,
            });
        }
    }

    let texts: Vec<&str> = signals
        .texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    let text_amounts: Vec<f64> = texts.iter().flat_map(|t| parse_amounts(t)).collect();
    if text_amounts.iter().any(|a| *a > 0.0) {
        if let Some((lo, hi)) = range_of(&text_amounts) {
            return Ok(DerivedPrice {
                min: Some(lo),
                max: Some(hi),
                is_free: false,
            });
        }
    }

    if signals.explicit_free == Some(false) {
        return Err(MappingError::new(
            "price",
            "source marks the event as paid but gives no price",
        ));
    }
    if let Some(unreadable) = texts.iter().find(|t| !reads_as_free(t)) {
        return Err(MappingError::new(
            "price",
            format!("unrecognised price text '{}'", unreadable),
        ));
    }

    Ok(DerivedPrice::FREE)
}

fn keyword_form(label: &str) -> String {
    let spaced: String = label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", clean_text(&spaced))
}

fn category_for(label: &str) -> Option<Category> {
    let form = keyword_form(label);
    CATEGORY_KEYWORDS.iter().find_map(|(category, keywords)| {
        keywords
            .iter()
            .any(|kw| form.contains(&format!(" {} ", kw)))
            .then_some(*category)
    })
}

/// Map free-text source labels onto the canonical taxonomy. The first label that maps
/// decides the category; everything else is kept as lowercase subcategories.
pub fn map_category(labels: &[String]) -> (Category, Vec<String>) {
    let category = labels
        .iter()
        .find_map(|label| category_for(label))
        .unwrap_or(Category::Other);

    let mut subcategories: Vec<String> = Vec::new();
    for label in labels {
        let cleaned = clean_text(label).to_lowercase();
        if cleaned.is_empty()
            || IGNORED_LABELS.contains(&cleaned.as_str())
            || cleaned == category.as_str()
            || subcategories.contains(&cleaned)
        {
            continue;
        }
        subcategories.push(cleaned);
    }
    (category, subcategories)
}

/// Remove a trailing site-name suffix such as `" | Arts Centre Melbourne"`.
pub fn strip_title_suffix(title: &str, suffixes: &[&str]) -> String {
    let mut trimmed = title.trim();
    for suffix in suffixes {
        let wanted = suffix.to_lowercase();
        for sep in [" | ", " - ", " – ", " — "] {
            // Compare on the original text: lowercasing can change byte lengths.
            let cut = trimmed
                .rmatch_indices(sep)
                .map(|(idx, _)| idx)
                .find(|idx| *idx > 0 && trimmed[idx + sep.len()..].to_lowercase() == wanted);
            if let Some(idx) = cut {
                trimmed = trimmed[..idx].trim_end();
                break;
            }
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn signals(min: Option<f64>, max: Option<f64>, free: Option<bool>, texts: &[&str]) -> PriceSignals {
        PriceSignals {
            min,
            max,
            explicit_free: free,
            texts: texts.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_missing_price_is_free_with_absent_range() {
        let price = derive_price(&PriceSignals::default()).unwrap();
        assert_eq!(price, DerivedPrice { min: None, max: None, is_free: true });
    }

    #[test]
    fn test_zero_range_is_free() {
        let price = derive_price(&signals(Some(0.0), Some(0.0), None, &[])).unwrap();
        assert!(price.is_free);
        assert_eq!(price.min, None);
    }

    #[test]
    fn test_structured_range_wins() {
        let price = derive_price(&signals(Some(89.0), Some(49.5), Some(true), &["$10"])).unwrap();
        assert_eq!(price, DerivedPrice { min: Some(49.5), max: Some(89.0), is_free: false });

        let only_max = derive_price(&signals(None, Some(120.0), None, &[])).unwrap();
        assert_eq!(only_max.min, Some(120.0));
        assert_eq!(only_max.max, Some(120.0));
    }

    #[test]
    fn test_price_parsed_from_text() {
        let price = derive_price(&signals(None, None, None, &["Tickets from $45 – $1,250.50"])).unwrap();
        assert_eq!(price, DerivedPrice { min: Some(45.0), max: Some(1250.5), is_free: false });

        let bare = derive_price(&signals(None, None, None, &["39.90"])).unwrap();
        assert_eq!(bare.min, Some(39.9));
    }

    #[test]
    fn test_free_texts_stay_free() {
        let price = derive_price(&signals(None, None, Some(true), &["Free entry", "$0"])).unwrap();
        assert!(price.is_free);
    }

    #[test]
    fn test_paid_signal_without_price_is_mapping_error() {
        let err = derive_price(&signals(None, None, Some(false), &[])).unwrap_err();
        assert_eq!(err.field, "price");

        let err = derive_price(&signals(None, None, None, &["Prices vary"])).unwrap_err();
        assert_eq!(err.field, "price");
    }

    #[test]
    fn test_timestamps_resolve_in_melbourne() {
        let with_offset = parse_timestamp("2025-11-01T19:30:00+11:00").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2025-11-01T08:30:00+00:00");

        let naive = parse_timestamp("2025-11-01T19:30:00").unwrap();
        assert_eq!(naive, with_offset);

        let winter = parse_timestamp("2025-07-01 19:30").unwrap();
        assert_eq!(winter.hour(), 9);

        let date_only = parse_timestamp("2025-11-01").unwrap();
        assert_eq!(date_only.to_rfc3339(), "2025-10-31T13:00:00+00:00");

        let compact_offset = parse_timestamp("2025-11-01T19:30:00+1100").unwrap();
        assert_eq!(compact_offset, with_offset);

        assert!(parse_timestamp("next Tuesday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_dst_gap_moves_forward() {
        // Clocks jump from 02:00 to 03:00 on 2025-10-05 in Melbourne
        let in_gap = parse_timestamp("2025-10-05T02:30:00").unwrap();
        let after = parse_timestamp("2025-10-05T03:30:00").unwrap();
        assert_eq!(in_gap, after);
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(require_title(Some("  Hamlet <b>Live</b> ")).unwrap(), "Hamlet Live");
        assert_eq!(require_title(Some("   ")).unwrap_err().field, "title");
        assert_eq!(require_source_id(None).unwrap_err().field, "sourceId");
        assert_eq!(require_start(Some("soon")).unwrap_err().field, "startDate");

        assert_eq!(
            require_booking_url(Some("https://marrinergroup.com.au/shows/hamlet")).unwrap(),
            "https://marrinergroup.com.au/shows/hamlet"
        );
        assert_eq!(require_booking_url(Some("/shows/hamlet")).unwrap_err().field, "bookingUrl");
        assert_eq!(require_booking_url(Some("mailto:box@office.test")).unwrap_err().field, "bookingUrl");
        assert_eq!(require_booking_url(None).unwrap_err().field, "bookingUrl");
    }

    #[test]
    fn test_description_placeholder() {
        assert_eq!(description_or_placeholder(None), DESCRIPTION_PLACEHOLDER);
        assert_eq!(description_or_placeholder(Some("<p> </p>")), DESCRIPTION_PLACEHOLDER);
        assert_eq!(
            description_or_placeholder(Some("<p>Shakespeare&#39;s tragedy &amp; more</p>")),
            "Shakespeare's tragedy & more"
        );
    }

    #[test]
    fn test_category_mapping() {
        let labels = vec!["Theatre".to_string(), "Drama".to_string(), "Arts & Theatre".to_string()];
        let (category, subs) = map_category(&labels);
        assert_eq!(category, Category::Theatre);
        assert_eq!(subs, vec!["drama".to_string(), "arts & theatre".to_string()]);

        let (category, _) = map_category(&["Hip-Hop/Rap".to_string()]);
        assert_eq!(category, Category::Music);

        let (category, _) = map_category(&["Stand-up Comedy".to_string(), "Music".to_string()]);
        assert_eq!(category, Category::Comedy);

        let (category, subs) = map_category(&["Undefined".to_string(), "Party".to_string()]);
        assert_eq!(category, Category::Other);
        assert_eq!(subs, vec!["party".to_string()]);

        assert_eq!(map_category(&[]).0, Category::Other);
    }

    #[test]
    fn test_page_source_ids() {
        assert_eq!(page_source_id("https://marrinergroup.com.au/shows/Hamlet/"), "hamlet");
        assert_eq!(page_source_id("https://feverup.com/m/154321?utm=x"), "154321");
        assert_eq!(page_source_id("https://feverup.com/m/154321/candlelight"), "154321");

        let hashed = page_source_id("https://whatson.melbourne.vic.gov.au/");
        assert_eq!(hashed.len(), 16);
        assert_eq!(hashed, page_source_id("https://whatson.melbourne.vic.gov.au/"));
    }

    #[test]
    fn test_strip_title_suffix() {
        assert_eq!(
            strip_title_suffix("Hamlet | Arts Centre Melbourne", &["Arts Centre Melbourne"]),
            "Hamlet"
        );
        assert_eq!(strip_title_suffix("Hamlet - Fever", &["Fever"]), "Hamlet");
        assert_eq!(strip_title_suffix("Fever", &["Fever"]), "Fever");
    }

    #[test]
    fn test_strip_title_suffix_with_case_folding_that_changes_length() {
        // 'İ' lowercases to three bytes, the Kelvin sign to one.
        assert_eq!(strip_title_suffix("Café | İstanbul", &["İstanbul"]), "Café");
        assert_eq!(strip_title_suffix("Café | istanbul", &["İSTANBUL"]), "Café | istanbul");
        assert_eq!(strip_title_suffix("\u{212A}ing Lear | Fever", &["Fever"]), "\u{212A}ing Lear");
        assert_eq!(strip_title_suffix("Jazz Night | \u{212A}ino Café", &["kino café"]), "Jazz Night");
        assert_eq!(strip_title_suffix("Ré | İ", &["İİİ"]), "Ré | İ");
    }
}
