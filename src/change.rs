use crate::record::AdRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Changed,
    Unchanged,
}

impl Change {
    /// Only new and changed records are written back.
    pub fn needs_save(self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

/// Compare a candidate against what was last persisted for the same id.
///
/// Only `is_active`, `start_date`, `end_date` and `creative_bodies` count;
/// `raw_data` and `fetched_at` move on every capture and are ignored.
pub fn classify(previous: Option<&AdRecord>, candidate: &AdRecord) -> Change {
    let Some(prev) = previous else {
        return Change::New;
    };
    if tracked(prev) == tracked(candidate) {
        Change::Unchanged
    } else {
        Change::Changed
    }
}

fn tracked(r: &AdRecord) -> (bool, Option<&str>, Option<&str>, &[String]) {
    (
        r.is_active,
        r.start_date.as_deref(),
        r.end_date.as_deref(),
        &r.creative_bodies,
    )
}
