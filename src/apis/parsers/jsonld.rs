use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::html::{first_attr, first_text, meta_content};
use crate::pipeline::processing::normalize::RawPageRecord;

static LD_JSON: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid ld+json selector")
});
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid title selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid h1 selector"));
static TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("valid time selector"));

fn is_event_type(value: &Value) -> bool {
    let matches = |t: &str| t.ends_with("Event") || t == "Festival";
    match value.get("@type") {
        Some(Value::String(t)) => matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn collect_events(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| collect_events(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_events(graph, out);
            }
            let object = Value::Object(map);
            if is_event_type(&object) {
                out.push(object);
            }
        }
        _ => {}
    }
}

/// Every schema.org `*Event` object in the page's JSON-LD blocks, in document order.
/// Blocks that are not valid JSON are skipped.
pub fn extract_events(document: &Html) -> Vec<Value> {
    let mut events = Vec::new();
    for script in document.select(&LD_JSON) {
        let text = script.inner_html();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => collect_events(value, &mut events),
            Err(e) => debug!(error = %e, "Skipping unparseable JSON-LD block"),
        }
    }
    events
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_of(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

fn first_of(value: Option<&Value>) -> Option<&Value> {
    match value? {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

fn image_of(value: Option<&Value>) -> Option<String> {
    let value = first_of(value)?;
    text_of(Some(value)).or_else(|| text_of(value.get("url")))
}

fn apply_location(location: &Value, record: &mut RawPageRecord) {
    if let Some(name) = text_of(Some(location)) {
        record.venue_name = Some(name);
        return;
    }
    record.venue_name = text_of(location.get("name"));
    match location.get("address") {
        Some(Value::String(address)) => record.venue_address = Some(address.trim().to_string()),
        Some(address @ Value::Object(_)) => {
            record.venue_address = text_of(address.get("streetAddress"));
            record.venue_suburb = text_of(address.get("addressLocality"));
        }
        _ => {}
    }
}

fn apply_offers(offers: &Value, record: &mut RawPageRecord) {
    let items: Vec<&Value> = match offers {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut amounts = Vec::new();
    for offer in items {
        amounts.extend(number_of(offer.get("lowPrice")));
        amounts.extend(number_of(offer.get("highPrice")));
        match offer.get("price") {
            Some(Value::String(s)) if s.trim().parse::<f64>().is_err() => {
                record.price_texts.push(s.trim().to_string())
            }
            price => amounts.extend(number_of(price)),
        }
    }
    if !amounts.is_empty() {
        record.price_min = amounts.iter().copied().reduce(f64::min);
        record.price_max = amounts.iter().copied().reduce(f64::max);
    }
}

fn categories_of(event: &Value) -> Vec<String> {
    let mut labels = Vec::new();
    for key in ["genre", "keywords"] {
        match event.get(key) {
            Some(Value::String(s)) => labels.extend(
                s.split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            ),
            Some(Value::Array(items)) => labels.extend(items.iter().filter_map(|v| text_of(Some(v)))),
            _ => {}
        }
    }
    // `TheaterEvent` -> `Theater`, but not the generic `Event`
    if let Some(kind) = text_of(first_of(event.get("@type"))) {
        if let Some(stem) = kind.strip_suffix("Event").filter(|s| !s.is_empty()) {
            labels.push(stem.to_string());
        }
    }
    labels
}

/// Map one JSON-LD event onto a page record.
pub fn record_from_event(event: &Value, url: &str) -> RawPageRecord {
    let mut record = RawPageRecord {
        url: url.to_string(),
        title: text_of(event.get("name")),
        description: text_of(event.get("description")),
        start: text_of(event.get("startDate")),
        end: text_of(event.get("endDate")),
        image: image_of(event.get("image")),
        categories: categories_of(event),
        ..Default::default()
    };
    if let Some(location) = first_of(event.get("location")) {
        apply_location(location, &mut record);
    }
    if let Some(offers) = event.get("offers") {
        apply_offers(offers, &mut record);
    }
    if let Some(Value::Bool(free)) = event.get("isAccessibleForFree") {
        record.is_free = Some(*free);
    }
    record
}

/// Build a page record from a detail page: the first JSON-LD event wins, OpenGraph and
/// page markup fill whatever it leaves out. `None` when the page has no title at all.
pub fn page_record(document: &Html, url: &str) -> Option<RawPageRecord> {
    let mut record = extract_events(document)
        .first()
        .map(|event| record_from_event(event, url))
        .unwrap_or_else(|| RawPageRecord {
            url: url.to_string(),
            ..Default::default()
        });

    if record.title.is_none() {
        record.title = meta_content(document, "og:title")
            .or_else(|| first_text(document, &H1))
            .or_else(|| first_text(document, &TITLE));
    }
    if record.description.is_none() {
        record.description =
            meta_content(document, "og:description").or_else(|| meta_content(document, "description"));
    }
    if record.image.is_none() {
        record.image = meta_content(document, "og:image");
    }
    if record.start.is_none() {
        record.start = meta_content(document, "event:start_time")
            .or_else(|| first_attr(document, &TIME, "datetime"));
    }

    record.title.is_some().then_some(record)
}
