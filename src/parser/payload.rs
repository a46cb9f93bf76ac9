use serde_json::Value;

use super::lookup::{Lookup, Seg};

/// Where the ad-bearing search edges live in an Ads Library GraphQL result.
const ANCHOR: &[Seg<'static>] = &[
    Seg::Key("data"),
    Seg::Key("ad_library_main"),
    Seg::Key("search_results_connection"),
    Seg::Key("edges"),
];

/// Anti-JSON-hijacking prefix some endpoints put in front of the body.
const HIJACK_PREFIX: &str = "for (;;);";

/// An ad-like element found in a payload, not yet validated.
#[derive(Debug, Clone, Copy)]
pub struct RawAd<'a> {
    pub element: &'a Value,
    /// `snapshot` of the element, or of the enclosing edge node when the
    /// collated result carries none.
    pub snapshot: Option<&'a Value>,
}

#[derive(Debug, Default)]
pub struct Extraction<'a> {
    pub ads: Vec<RawAd<'a>>,
    /// False when the payload does not contain the search-results path at all.
    pub anchor_found: bool,
}

/// Find every ad-like object under the search-results anchor. Never fails:
/// any missing, null, or non-array segment yields nothing for that branch.
pub fn extract(payload: &Value) -> Extraction<'_> {
    let edges = Lookup::new(payload).path(ANCHOR);
    if edges.value().and_then(Value::as_array).is_none() {
        return Extraction::default();
    }

    let mut ads = Vec::new();
    for edge in edges.items() {
        let node = edge.key("node");
        let node_snapshot = node.key("snapshot").value();
        for result in node.key("collated_results").items() {
            let Some(element) = result.value().filter(|v| v.is_object()) else {
                continue;
            };
            let snapshot = result.key("snapshot").value().or(node_snapshot);
            ads.push(RawAd { element, snapshot });
        }
    }

    Extraction {
        ads,
        anchor_found: true,
    }
}

/// Decode a response body into zero or more JSON documents.
///
/// The GraphQL endpoint sometimes streams several results in one body, one
/// per line; lines that are not JSON are skipped.
pub fn decode_body(body: &str) -> Vec<Value> {
    let body = body.trim_start();
    let body = body.strip_prefix(HIJACK_PREFIX).unwrap_or(body);

    if let Ok(v) = serde_json::from_str::<Value>(body) {
        return vec![v];
    }

    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(ex: &Extraction<'_>) -> Vec<String> {
        ex.ads
            .iter()
            .map(|a| a.element["ad_archive_id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn malformed_shapes_yield_nothing() {
        let shapes = [
            Value::Null,
            json!({}),
            json!({ "data": null }),
            json!({ "data": {} }),
            json!({ "data": { "ad_library_main": null } }),
            json!({ "data": { "ad_library_main": { "search_results_connection": null } } }),
            json!({ "data": { "ad_library_main": { "search_results_connection": { "edges": {} } } } }),
            json!({ "data": { "ad_library_main": { "search_results_connection": { "edges": "x" } } } }),
            json!([1, 2, 3]),
            json!("string"),
        ];
        for shape in &shapes {
            let ex = extract(shape);
            assert!(ex.ads.is_empty(), "expected nothing from {}", shape);
        }
    }

    #[test]
    fn anchor_flag_distinguishes_drift_from_empty() {
        let empty = json!({ "data": { "ad_library_main": { "search_results_connection": { "edges": [] } } } });
        assert!(extract(&empty).anchor_found);
        assert!(!extract(&json!({ "data": {} })).anchor_found);
    }

    #[test]
    fn null_branches_inside_edges_are_skipped() {
        let v = json!({ "data": { "ad_library_main": { "search_results_connection": { "edges": [
            null,
            { "node": null },
            { "node": { "collated_results": null } },
            { "node": { "collated_results": [null, 7, { "ad_archive_id": "A" }] } }
        ] } } } });
        let ex = extract(&v);
        assert_eq!(ids(&ex), vec!["A"]);
    }

    #[test]
    fn collated_results_are_flattened_in_order() {
        let raw = std::fs::read_to_string("tests/fixtures/search_results.json").unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        let ex = extract(&v);
        assert_eq!(ids(&ex), vec!["A", "B", "C"]);
    }

    #[test]
    fn node_snapshot_used_when_result_has_none() {
        let v = json!({ "data": { "ad_library_main": { "search_results_connection": { "edges": [
            { "node": {
                "snapshot": { "body": { "text": "shared" } },
                "collated_results": [
                    { "ad_archive_id": "A" },
                    { "ad_archive_id": "B", "snapshot": { "body": { "text": "own" } } }
                ]
            } }
        ] } } } });
        let ex = extract(&v);
        assert_eq!(ex.ads[0].snapshot.unwrap()["body"]["text"], "shared");
        assert_eq!(ex.ads[1].snapshot.unwrap()["body"]["text"], "own");
    }

    #[test]
    fn decode_strips_prefix_and_splits_lines() {
        assert_eq!(decode_body("for (;;);{\"a\":1}"), vec![json!({ "a": 1 })]);
        let multi = "{\"a\":1}\n{\"b\":2}\nnot json\n";
        assert_eq!(decode_body(multi), vec![json!({ "a": 1 }), json!({ "b": 2 })]);
        assert!(decode_body("<html>rate limited</html>").is_empty());
        assert!(decode_body("").is_empty());
    }
}
