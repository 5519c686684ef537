//! Loose key/value extraction from ODIN feed fields.
//!
//! ODIN encodes the alarm group and station as query-string fragments inside
//! an entry's link (and sometimes its summary), e.g.
//! `https://www.odin.dk/112puls/?beredskabsID=4001&enhed=Brand`. Extraction is
//! a plain first-match substring search: no URL parsing, no anchoring, so a
//! marker embedded in a longer word still matches.

/// Marker for the alarm group identifier (`beredskabsID=...`).
pub const IDENTIFIER_MARKER: &str = "beredskabsID";
/// Marker for the responding station (`enhed=...`).
pub const STATION_MARKER: &str = "enhed";

/// Returns the value following the first `<marker>=` in `text`, up to the
/// next `&` or the end of the string.
///
/// A missing marker or an empty value yields `None`.
///
/// ```
/// use odin_feed::feed::extract_marker;
///
/// let link = "https://example.com/x?beredskabsID=A1&enhed=S1";
/// assert_eq!(extract_marker(link, "beredskabsID"), Some("A1"));
/// assert_eq!(extract_marker(link, "enhed"), Some("S1"));
/// assert_eq!(extract_marker(link, "antal"), None);
/// ```
pub fn extract_marker<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let needle = format!("{marker}=");
    let start = text.find(&needle)? + needle.len();
    let rest = &text[start..];
    let value = rest.split('&').next().unwrap_or(rest);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Derives the station name for an entry.
///
/// Looks for `enhed=` in the link, then the summary. When neither carries it,
/// falls back to the title text before the first `-`, trimmed
/// (`"Brand Nord - Bygningsbrand"` gives `"Brand Nord"`).
pub fn derive_station(
    link: Option<&str>,
    summary: Option<&str>,
    title: Option<&str>,
) -> Option<String> {
    let structured = [link, summary]
        .into_iter()
        .flatten()
        .find_map(|field| extract_marker(field, STATION_MARKER));

    match structured {
        Some(station) => Some(station.to_string()),
        None => title.and_then(station_from_title),
    }
}

fn station_from_title(title: &str) -> Option<String> {
    let (head, _) = title.split_once('-')?;
    let head = head.trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_terminated_by_ampersand() {
        assert_eq!(
            extract_marker("https://x/?beredskabsID=A1&enhed=S1", IDENTIFIER_MARKER),
            Some("A1")
        );
    }

    #[test]
    fn test_marker_at_end_of_string() {
        assert_eq!(
            extract_marker("https://x/?beredskabsID=A1&enhed=S1", STATION_MARKER),
            Some("S1")
        );
    }

    #[test]
    fn test_missing_marker_is_none() {
        assert_eq!(extract_marker("https://x/?foo=bar", IDENTIFIER_MARKER), None);
        assert_eq!(extract_marker("", STATION_MARKER), None);
    }

    #[test]
    fn test_empty_value_is_none() {
        assert_eq!(extract_marker("https://x/?enhed=&antal=5", STATION_MARKER), None);
        assert_eq!(extract_marker("https://x/?enhed=", STATION_MARKER), None);
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(
            extract_marker("enhed=First&enhed=Second", STATION_MARKER),
            Some("First")
        );
    }

    #[test]
    fn test_unanchored_match() {
        // "xenhed=" still contains "enhed="
        assert_eq!(extract_marker("?xenhed=Loose", STATION_MARKER), Some("Loose"));
    }

    #[test]
    fn test_station_from_link_marker() {
        assert_eq!(
            derive_station(Some("?enhed=S1"), None, Some("Other - thing")),
            Some("S1".to_string())
        );
    }

    #[test]
    fn test_station_from_summary_marker() {
        assert_eq!(
            derive_station(Some("https://x/"), Some("enhed=S2&y"), Some("Other - thing")),
            Some("S2".to_string())
        );
    }

    #[test]
    fn test_station_title_fallback() {
        assert_eq!(
            derive_station(Some("https://x/"), None, Some("StationX - Incident report")),
            Some("StationX".to_string())
        );
    }

    #[test]
    fn test_station_title_fallback_uses_first_separator() {
        assert_eq!(
            derive_station(None, None, Some("  Brand Nord - Trafikuheld - 2 biler ")),
            Some("Brand Nord".to_string())
        );
    }

    #[test]
    fn test_station_title_without_separator() {
        assert_eq!(derive_station(None, None, Some("No separator here")), None);
        assert_eq!(derive_station(None, None, Some(" - leading dash")), None);
        assert_eq!(derive_station(None, None, None), None);
    }
}
