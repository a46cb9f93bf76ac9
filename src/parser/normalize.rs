use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::lookup::{Lookup, Seg};
use super::payload::RawAd;
use crate::record::AdRecord;

type Path = &'static [Seg<'static>];

// Candidate fields per logical field, highest priority first.
const ID_FIELDS: &[Path] = &[
    &[Seg::Key("ad_archive_id")],
    &[Seg::Key("adArchiveID")],
    &[Seg::Key("ad_id")],
    &[Seg::Key("id")],
];
const PAGE_ID_FIELDS: &[Path] = &[
    &[Seg::Key("page_id")],
    &[Seg::Key("pageID")],
    &[Seg::Key("snapshot"), Seg::Key("page_id")],
];
const ACTIVE_FIELDS: &[Path] = &[&[Seg::Key("is_active")], &[Seg::Key("isActive")]];
const START_FIELDS: &[Path] = &[
    &[Seg::Key("start_date")],
    &[Seg::Key("startDate")],
    &[Seg::Key("ad_delivery_start_time")],
];
const END_FIELDS: &[Path] = &[
    &[Seg::Key("end_date")],
    &[Seg::Key("endDate")],
    &[Seg::Key("ad_delivery_stop_time")],
];
const SNAPSHOT_URL_FIELDS: &[Path] = &[
    &[Seg::Key("snapshot_url")],
    &[Seg::Key("ad_snapshot_url")],
    &[Seg::Key("snapshot"), Seg::Key("link_url")],
    &[Seg::Key("snapshot"), Seg::Key("cards"), Seg::Index(0), Seg::Key("link_url")],
];

/// Why an ad-like element did not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    MissingId,
    MissingPageId,
}

/// Turn one ad-like element into a canonical record, or reject it when no
/// identity can be derived. Either a complete record comes out or nothing.
pub fn normalize(raw: &RawAd<'_>, fetched_at: DateTime<Utc>) -> Result<AdRecord, Rejected> {
    let merged = merged_view(raw);
    let root = Lookup::new(&merged);

    let id = first(root, ID_FIELDS, |l| l.as_ident()).ok_or(Rejected::MissingId)?;
    let page_id = first(root, PAGE_ID_FIELDS, |l| l.as_ident()).ok_or(Rejected::MissingPageId)?;
    let is_active = first(root, ACTIVE_FIELDS, |l| l.as_bool()).unwrap_or(true);
    let start_date = first(root, START_FIELDS, as_date);
    let end_date = first(root, END_FIELDS, as_date);
    let snapshot_url = first(root, SNAPSHOT_URL_FIELDS, |l| l.as_text().map(str::to_string));
    let creative_bodies = creative_bodies(root);

    Ok(AdRecord {
        id,
        page_id,
        is_active,
        start_date,
        end_date,
        snapshot_url,
        creative_bodies,
        fetched_at,
        raw_data: merged,
    })
}

/// Deep copy of the element with the separately located snapshot folded in.
fn merged_view(raw: &RawAd<'_>) -> Value {
    let mut out = raw.element.clone();
    if let (Some(obj), Some(snapshot)) = (out.as_object_mut(), raw.snapshot) {
        // A null snapshot on the element counts as missing, as it does in extraction.
        if matches!(obj.get("snapshot"), None | Some(Value::Null)) {
            obj.insert("snapshot".to_string(), snapshot.clone());
        }
    }
    out
}

fn first<'a, T>(
    root: Lookup<'a>,
    candidates: &[Path],
    pick: impl Fn(Lookup<'a>) -> Option<T>,
) -> Option<T> {
    candidates.iter().find_map(|path| pick(root.path(path)))
}

/// Date strings are kept verbatim; integers are Unix seconds.
fn as_date(l: Lookup<'_>) -> Option<String> {
    if let Some(s) = l.as_text() {
        return Some(s.to_string());
    }
    let secs = l.as_i64().filter(|s| *s > 0)?;
    DateTime::from_timestamp(secs, 0).map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn creative_bodies(root: Lookup<'_>) -> Vec<String> {
    let snapshot = root.key("snapshot");

    let body = snapshot.key("body");
    if let Some(text) = body.key("text").as_text().or_else(|| body.as_text()) {
        return vec![text.to_string()];
    }

    let cards: Vec<String> = snapshot
        .key("cards")
        .items()
        .filter_map(|c| c.key("body").as_text().map(str::to_string))
        .collect();
    if !cards.is_empty() {
        return cards;
    }

    root.key("ad_creative_bodies")
        .items()
        .filter_map(|b| b.as_text().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn norm(v: &Value) -> Result<AdRecord, Rejected> {
        normalize(&RawAd { element: v, snapshot: v.get("snapshot") }, now())
    }

    #[test]
    fn rejects_missing_identity() {
        assert_eq!(norm(&json!({ "page_id": "P" })).unwrap_err(), Rejected::MissingId);
        assert_eq!(norm(&json!({ "ad_archive_id": "A" })).unwrap_err(), Rejected::MissingPageId);
        assert_eq!(norm(&json!({ "ad_archive_id": "", "page_id": "P" })).unwrap_err(), Rejected::MissingId);
        assert_eq!(norm(&json!({})).unwrap_err(), Rejected::MissingId);
    }

    #[test]
    fn identity_fallbacks_in_priority_order() {
        let r = norm(&json!({ "adArchiveID": "X", "id": "Y", "pageID": 99 })).unwrap();
        assert_eq!(r.id, "X");
        assert_eq!(r.page_id, "99");

        let r = norm(&json!({ "ad_archive_id": "A", "id": "Y", "snapshot": { "page_id": "SP" } })).unwrap();
        assert_eq!(r.id, "A");
        assert_eq!(r.page_id, "SP");
    }

    #[test]
    fn defaults_when_fields_absent() {
        let r = norm(&json!({ "ad_archive_id": "A", "page_id": "P" })).unwrap();
        assert!(r.is_active);
        assert_eq!(r.start_date, None);
        assert_eq!(r.end_date, None);
        assert!(r.creative_bodies.is_empty());
        assert_eq!(r.fetched_at, now());
    }

    #[test]
    fn preserves_flags_and_dates() {
        let r = norm(&json!({
            "ad_archive_id": "B", "page_id": "P", "is_active": false, "end_date": "2024-12-01"
        }))
        .unwrap();
        assert!(!r.is_active);
        assert_eq!(r.end_date.as_deref(), Some("2024-12-01"));
    }

    #[test]
    fn delivery_timestamps_are_date_fallback() {
        let r = norm(&json!({
            "ad_archive_id": "A", "page_id": "P",
            "start_date": 1700000000, "ad_delivery_stop_time": 1700086400
        }))
        .unwrap();
        assert_eq!(r.start_date.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(r.end_date.as_deref(), Some("2023-11-15T22:13:20Z"));
    }

    #[test]
    fn fetched_at_is_never_taken_from_payload() {
        let r = norm(&json!({ "ad_archive_id": "A", "page_id": "P", "fetched_at": "1999-01-01T00:00:00Z" })).unwrap();
        assert_eq!(r.fetched_at, now());
    }

    #[test]
    fn bodies_from_snapshot_cards_and_list() {
        let r = norm(&json!({ "ad_archive_id": "A", "page_id": "P", "snapshot": { "body": { "text": " Hello " } } })).unwrap();
        assert_eq!(r.creative_bodies, vec!["Hello"]);

        let r = norm(&json!({ "ad_archive_id": "A", "page_id": "P",
            "snapshot": { "body": { "text": "" }, "cards": [ { "body": "one" }, { "body": null }, { "body": "two" } ] } }))
        .unwrap();
        assert_eq!(r.creative_bodies, vec!["one", "two"]);

        let r = norm(&json!({ "ad_archive_id": "A", "page_id": "P", "ad_creative_bodies": ["x", "", "y"] })).unwrap();
        assert_eq!(r.creative_bodies, vec!["x", "y"]);
    }

    #[test]
    fn snapshot_url_falls_back_to_first_card() {
        let r = norm(&json!({ "ad_archive_id": "A", "page_id": "P",
            "snapshot": { "cards": [ { "link_url": "https://example.com/1" }, { "link_url": "https://example.com/2" } ] } }))
        .unwrap();
        assert_eq!(r.snapshot_url.as_deref(), Some("https://example.com/1"));

        let r = norm(&json!({ "ad_archive_id": "A", "page_id": "P", "snapshot_url": "https://x", "snapshot": { "link_url": "https://y" } })).unwrap();
        assert_eq!(r.snapshot_url.as_deref(), Some("https://x"));
    }

    #[test]
    fn null_snapshot_on_element_takes_edge_snapshot() {
        let element = json!({ "ad_archive_id": "A", "snapshot": null });
        let snapshot = json!({ "page_id": "P", "body": { "text": "shared" } });
        let r = normalize(&RawAd { element: &element, snapshot: Some(&snapshot) }, now()).unwrap();
        assert_eq!(r.page_id, "P");
        assert_eq!(r.creative_bodies, vec!["shared"]);
        assert_eq!(r.raw_data["snapshot"], snapshot);
    }

    #[test]
    fn null_snapshot_through_extraction() {
        let payload = json!({ "data": { "ad_library_main": { "search_results_connection": { "edges": [
            { "node": {
                "snapshot": { "page_id": "P", "body": { "text": "shared" } },
                "collated_results": [ { "ad_archive_id": "A", "snapshot": null } ]
            } }
        ] } } } });
        let ex = crate::parser::payload::extract(&payload);
        let r = normalize(&ex.ads[0], now()).unwrap();
        assert_eq!((r.id.as_str(), r.page_id.as_str()), ("A", "P"));
        assert_eq!(r.creative_bodies, vec!["shared"]);
    }

    #[test]
    fn raw_data_merges_separate_snapshot() {
        let element = json!({ "ad_archive_id": "A", "page_id": "P", "extra": { "nested": [1, 2] } });
        let snapshot = json!({ "body": { "text": "from edge" } });
        let r = normalize(&RawAd { element: &element, snapshot: Some(&snapshot) }, now()).unwrap();
        assert_eq!(r.raw_data["extra"]["nested"], json!([1, 2]));
        assert_eq!(r.raw_data["snapshot"], snapshot);
        assert_eq!(r.creative_bodies, vec!["from edge"]);
    }
}
