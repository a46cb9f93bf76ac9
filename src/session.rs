use std::collections::HashMap;

use crate::record::AdRecord;

/// Outcome of offering a record to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Inserted,
    /// Same id seen earlier in the run; the later record replaced it.
    Replaced,
    CapReached,
}

impl Accept {
    pub fn accepted(self) -> bool {
        !matches!(self, Accept::CapReached)
    }
}

/// Records captured during one run, keyed by ad id. Last seen wins.
#[derive(Debug, Default)]
pub struct Session {
    records: HashMap<String, AdRecord>,
    max: Option<usize>,
}

impl Session {
    pub fn new(max: Option<usize>) -> Self {
        Self {
            records: HashMap::new(),
            max,
        }
    }

    /// The cap counts distinct ids: at the cap, new ids are refused but an
    /// id already held is still replaced by its later capture.
    pub fn accept(&mut self, record: AdRecord) -> Accept {
        if let Some(slot) = self.records.get_mut(&record.id) {
            *slot = record;
            return Accept::Replaced;
        }
        if self.is_full() {
            return Accept::CapReached;
        }
        self.records.insert(record.id.clone(), record);
        Accept::Inserted
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_full(&self) -> bool {
        self.max.is_some_and(|m| self.records.len() >= m)
    }

    /// Session content ordered by (page_id, id) so downstream writes are stable.
    pub fn into_records(self) -> Vec<AdRecord> {
        let mut out: Vec<AdRecord> = self.records.into_values().collect();
        out.sort_by(|a, b| (&a.page_id, &a.id).cmp(&(&b.page_id, &b.id)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(id: &str, active: bool) -> AdRecord {
        AdRecord {
            id: id.into(),
            page_id: "P".into(),
            is_active: active,
            start_date: None,
            end_date: None,
            snapshot_url: None,
            creative_bodies: vec![],
            fetched_at: Utc::now(),
            raw_data: serde_json::Value::Null,
        }
    }

    #[test]
    fn cap_limits_distinct_ids() {
        let mut s = Session::new(Some(2));
        assert_eq!(s.accept(rec("A", true)), Accept::Inserted);
        assert_eq!(s.accept(rec("B", true)), Accept::Inserted);
        assert_eq!(s.accept(rec("C", true)), Accept::CapReached);
        assert!(!s.accept(rec("D", true)).accepted());
        assert_eq!(s.size(), 2);
        assert!(s.is_full());
    }

    #[test]
    fn later_record_wins_even_at_cap() {
        let mut s = Session::new(Some(1));
        s.accept(rec("A", true));
        assert_eq!(s.accept(rec("A", false)), Accept::Replaced);
        let out = s.into_records();
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_active);
    }

    #[test]
    fn uncapped_session_takes_everything() {
        let mut s = Session::new(None);
        for i in 0..50 {
            assert!(s.accept(rec(&i.to_string(), true)).accepted());
        }
        assert_eq!(s.size(), 50);
        assert!(!s.is_full());
    }

    #[test]
    fn records_come_out_sorted() {
        let mut s = Session::new(None);
        for id in ["c", "a", "b"] {
            s.accept(rec(id, true));
        }
        let ids: Vec<_> = s.into_records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
