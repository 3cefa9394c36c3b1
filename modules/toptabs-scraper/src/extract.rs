// Listing extraction: the top pages embed their state as attribute-encoded
// JSON (`data-content="..."`). Tabs live under `store.page.data.tabs`, view
// counts under `store.page.data.hits` keyed by tab id.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use toptabs_catalog::{Extraction, Extractor, ListingEntry};
use toptabs_common::{tab_url, Listing, Observation};

const DATA_CONTENT_MARKER: &str = "data-content=";

static DATA_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-content]").expect("valid selector"));

/// Decoded value of the first `data-content` attribute in the document.
fn embedded_blob(payload: &str) -> Option<String> {
    let document = Html::parse_document(payload);
    document
        .select(&DATA_CONTENT)
        .find_map(|element| element.value().attr("data-content"))
        .map(String::from)
}

pub struct EmbeddedJsonExtractor;

impl Extractor for EmbeddedJsonExtractor {
    fn extract(&self, listing: &Listing, payload: &str) -> Result<Extraction> {
        let Some(blob) = embedded_blob(payload) else {
            warn!(url = listing.url.as_str(), "No embedded data-content in listing");
            return Ok(Extraction::default());
        };

        let data: Value =
            serde_json::from_str(&blob).context("Embedded data-content is not valid JSON")?;
        let page_data = data.pointer("/store/page/data").unwrap_or(&Value::Null);

        let mut extraction = Extraction::default();

        for tab in array_at(page_data, "tabs") {
            if let Some(entry) = parse_tab(tab, listing) {
                extraction.entries.push(entry);
            }
        }

        for hit in array_at(page_data, "hits") {
            let (Some(id), Some(hits)) = (
                hit.get("id").and_then(coerce_int),
                hit.get("hits").and_then(coerce_int),
            ) else {
                continue;
            };
            extraction.hits_by_id.insert(id.to_string(), hits);
        }

        debug!(
            url = listing.url.as_str(),
            tabs = extraction.entries.len(),
            hits = extraction.hits_by_id.len(),
            "Listing parsed"
        );
        Ok(extraction)
    }

    /// Case-insensitive, without parsing the document.
    fn recognizes(&self, payload: &str) -> bool {
        payload
            .as_bytes()
            .windows(DATA_CONTENT_MARKER.len())
            .any(|w| w.eq_ignore_ascii_case(DATA_CONTENT_MARKER.as_bytes()))
    }
}

fn array_at<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn parse_tab(tab: &Value, listing: &Listing) -> Option<ListingEntry> {
    let id = tab.get("id").and_then(coerce_int)?;

    let mut obs = Observation::new(tab_url(id), listing.category);
    obs.artist = text_field(tab, "artist_name");
    obs.song = text_field(tab, "song_name");
    obs.rating = tab.get("rating").and_then(coerce_float);
    obs.votes = tab.get("votes").and_then(coerce_int);

    Some(ListingEntry {
        raw_id: id.to_string(),
        observation: obs,
    })
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Non-negative integer from a JSON number or numeric string. Fractions truncate.
fn coerce_int(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|f: &f64| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toptabs_common::{Category, SortOrder};

    fn listing() -> Listing {
        Listing::new("https://www.ultimate-guitar.com", Category::Chords, SortOrder::Hits)
    }

    /// Wrap a JSON value the way the listing template does.
    fn page(store: Value) -> String {
        let encoded = store
            .to_string()
            .replace('&', "&amp;")
            .replace('"', "&quot;");
        format!(r#"<html><body><div class="js-store" data-content="{encoded}"></div></body></html>"#)
    }

    #[test]
    fn extracts_tabs_and_hits() {
        let html = page(serde_json::json!({
            "store": {"page": {"data": {
                "tabs": [
                    {"id": 101, "artist_name": " Oasis ", "song_name": "Wonderwall", "rating": 4.81, "votes": 3021},
                    {"id": "102", "artist_name": "AC/DC & Co", "song_name": "T.N.T.", "rating": "4.5", "votes": null},
                    {"artist_name": "No id", "song_name": "Dropped"},
                    {"id": "abc", "artist_name": "Bad id", "song_name": "Dropped"}
                ],
                "hits": [
                    {"id": 101, "hits": 1200000},
                    {"id": "102", "hits": "35"},
                    {"id": 103},
                    "junk"
                ]
            }}}
        }));

        let extraction = EmbeddedJsonExtractor.extract(&listing(), &html).unwrap();

        assert_eq!(extraction.entries.len(), 2);
        let first = &extraction.entries[0];
        assert_eq!(first.raw_id, "101");
        assert_eq!(first.observation.url, "https://tabs.ultimate-guitar.com/tab/101");
        assert_eq!(first.observation.category, Category::Chords);
        assert_eq!(first.observation.artist.as_deref(), Some("Oasis"));
        assert_eq!(first.observation.rating, Some(4.81));
        assert_eq!(first.observation.votes, Some(3021));

        let second = &extraction.entries[1].observation;
        assert_eq!(second.artist.as_deref(), Some("AC/DC & Co"));
        assert_eq!(second.rating, Some(4.5));
        assert_eq!(second.votes, None);

        assert_eq!(extraction.hits_by_id.len(), 2);
        assert_eq!(extraction.hits_by_id["101"], 1_200_000);
        assert_eq!(extraction.hits_by_id["102"], 35);

        let hits: Vec<Option<u64>> = extraction
            .into_observations()
            .into_iter()
            .map(|o| o.hits)
            .collect();
        assert_eq!(hits, vec![Some(1_200_000), Some(35)]);
    }

    #[test]
    fn missing_attribute_yields_empty_extraction() {
        let html = "<html><body>Please enable JavaScript</body></html>";
        assert!(!EmbeddedJsonExtractor.recognizes(html));

        let extraction = EmbeddedJsonExtractor.extract(&listing(), html).unwrap();
        assert!(extraction.entries.is_empty());
        assert!(extraction.hits_by_id.is_empty());
    }

    #[test]
    fn missing_store_path_yields_empty_extraction() {
        let html = page(serde_json::json!({"store": {"page": null}}));
        let extraction = EmbeddedJsonExtractor.extract(&listing(), &html).unwrap();
        assert!(extraction.entries.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let html = r#"<div data-content="{&quot;store&quot;: "></div>"#;
        assert!(EmbeddedJsonExtractor.recognizes(html));
        assert!(EmbeddedJsonExtractor.extract(&listing(), html).is_err());
    }

    #[test]
    fn attribute_match_is_case_insensitive() {
        let html = r#"<div DATA-CONTENT="{&quot;store&quot;:{&quot;page&quot;:{&quot;data&quot;:{&quot;tabs&quot;:[{&quot;id&quot;:5}]}}}}"></div>"#;
        assert!(EmbeddedJsonExtractor.recognizes(html));
        let extraction = EmbeddedJsonExtractor.extract(&listing(), html).unwrap();
        assert_eq!(extraction.entries.len(), 1);
        assert_eq!(extraction.entries[0].observation.artist, None);
    }

    #[test]
    fn named_entities_in_names_are_decoded() {
        let json = r#"{"store":{"page":{"data":{"tabs":[
            {"id":1,"artist_name":"Beyonc&eacute; &ntilde; &copy;","song_name":"Guns &amp Roses"}
        ]}}}}"#;
        let html = format!(
            r#"<div class="js-store" data-content="{}"></div>"#,
            json.replace('"', "&quot;")
        );

        let extraction = EmbeddedJsonExtractor.extract(&listing(), &html).unwrap();
        let obs = &extraction.entries[0].observation;
        assert_eq!(obs.artist.as_deref(), Some("Beyoncé ñ ©"));
        assert_eq!(obs.song.as_deref(), Some("Guns & Roses"));
    }
}
