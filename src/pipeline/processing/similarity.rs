//! String similarity for matching the same event across sources.

use std::collections::BTreeSet;

const TITLE_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "of", "at", "in", "on", "for", "with", "live",
];

/// Separators that split a headline from a venue, tour or presenter suffix.
const SEGMENT_SEPARATORS: &[&str] = &[" — ", " – ", " - ", " | ", ": "];

const CONTAINMENT_DISCOUNT: f64 = 0.9;

fn simplify(input: &str) -> String {
    let spaced: String = input
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '’' | '‘'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, punctuation-free title with stop words removed.
pub fn normalize_title(title: &str) -> String {
    let simplified = simplify(title);
    let kept: Vec<&str> = simplified
        .split(' ')
        .filter(|w| !w.is_empty() && !TITLE_STOP_WORDS.contains(w))
        .collect();
    if kept.is_empty() {
        simplified
    } else {
        kept.join(" ")
    }
}

/// Headline part of a title, before the first separator.
pub fn primary_segment(title: &str) -> &str {
    SEGMENT_SEPARATORS
        .iter()
        .filter_map(|sep| title.find(sep))
        .min()
        .map(|idx| &title[..idx])
        .filter(|head| !head.trim().is_empty())
        .unwrap_or(title)
}

/// Share of the smaller token set found in the larger one.
pub fn token_containment(a: &str, b: &str) -> f64 {
    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();
    let smaller = left.len().min(right.len());
    if smaller == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / smaller as f64
}

pub fn title_similarity(a: &str, b: &str) -> f64 {
    let full_a = normalize_title(a);
    let full_b = normalize_title(b);
    if full_a.is_empty() || full_b.is_empty() {
        return 0.0;
    }
    let full = strsim::normalized_levenshtein(&full_a, &full_b);
    // A shared headline alone is not enough: series titles share their prefix.
    let headline = normalize_title(primary_segment(a)) == full_b
        || normalize_title(primary_segment(b)) == full_a;
    let primary = if headline { 1.0 } else { 0.0 };
    let contained = CONTAINMENT_DISCOUNT * token_containment(&full_a, &full_b);
    full.max(primary).max(contained)
}

/// Venue name folded so spelling variants of one building compare equal.
pub fn normalize_venue(name: &str) -> String {
    let with_and = name.replace('&', " and ");
    let simplified = simplify(&with_and);
    let mut words: Vec<&str> = simplified
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|word| match word {
            "st" => "street",
            "mt" => "mount",
            "rd" => "road",
            other => other,
        })
        .collect();
    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }
    words.join(" ")
}

pub fn venue_similarity(a: &str, b: &str) -> f64 {
    let left = normalize_venue(a);
    let right = normalize_venue(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(&left, &right).max(token_containment(&left, &right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_normalization() {
        assert_eq!(normalize_title("The Lion King: Live!"), "lion king");
        assert_eq!(normalize_title("Shakespeare's Hamlet"), "shakespeares hamlet");
        assert_eq!(normalize_title("The"), "the");
    }

    #[test]
    fn test_primary_segment() {
        assert_eq!(primary_segment("Hamlet — Marriner Theatres"), "Hamlet");
        assert_eq!(primary_segment("Six | The Musical"), "Six");
        assert_eq!(primary_segment("Hamlet"), "Hamlet");
        assert_eq!(primary_segment(" - Encore"), " - Encore");
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("Hamlet", "Hamlet — Marriner Theatres"), 1.0);
        assert!(title_similarity("The Lion King", "Disney's The Lion King") >= 0.9);
        assert!(title_similarity("Hamlet", "Macbeth") < 0.5);
        assert_eq!(title_similarity("", "Hamlet"), 0.0);
    }

    #[test]
    fn test_shared_series_prefix_is_not_a_match() {
        assert!(
            title_similarity(
                "Candlelight: Vivaldi's Four Seasons",
                "Candlelight: A Tribute to Coldplay"
            ) < 0.5
        );
        assert!(title_similarity("Hamlet — Marriner Theatres", "Hamlet — The Musical") < 0.8);
        assert_eq!(title_similarity("Candlelight", "Candlelight: A Tribute to Coldplay"), 1.0);
    }

    #[test]
    fn test_venue_similarity() {
        assert_eq!(normalize_venue("Her Majesty's Theatre"), "her majestys theatre");
        assert_eq!(normalize_venue("The Forum, Flinders St"), "forum flinders street");
        assert_eq!(venue_similarity("Her Majesty's Theatre", "Her Majestys Theatre"), 1.0);
        assert_eq!(venue_similarity("Arts Centre Melbourne", "Arts Centre Melbourne & Hamer Hall"), 1.0);
        assert!(venue_similarity("Palais Theatre", "Princess Theatre") < 0.9);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let pairs = [
            ("Hamlet", "Hamlet — Marriner Theatres"),
            ("Six the Musical", "SIX"),
            ("Comedy Gala", "Melbourne International Comedy Festival Gala"),
        ];
        for (a, b) in pairs {
            assert_eq!(title_similarity(a, b), title_similarity(b, a));
        }
    }
}
