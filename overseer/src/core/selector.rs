//! Deterministic selection logic shared by goals and subtasks.
//!
//! Candidates are ordered by `(priority desc, created_at asc, seq asc)`; the
//! first one whose dependencies are all complete wins.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};

/// Something the scheduler can pick: goals and subtasks.
pub trait Schedulable {
    type Priority: Ord + Copy;

    fn priority(&self) -> Self::Priority;
    fn created_at(&self) -> DateTime<Utc>;
    /// Allocation order, breaks ties between records created in the same instant.
    fn seq(&self) -> u64;
    fn dependencies(&self) -> &[String];
}

/// Sort `candidates` by the two-key schedule order in place.
pub fn sort_by_schedule<T: Schedulable>(candidates: &mut [&T]) {
    candidates.sort_by_key(|c| (Reverse(c.priority()), c.created_at(), c.seq()));
}

/// Return the first schedulable candidate whose dependencies satisfy `is_complete`.
///
/// Unknown dependency ids count as incomplete.
pub fn first_ready<'a, T, F>(mut candidates: Vec<&'a T>, is_complete: F) -> Option<&'a T>
where
    T: Schedulable,
    F: Fn(&str) -> bool,
{
    sort_by_schedule(&mut candidates);
    candidates
        .into_iter()
        .find(|c| c.dependencies().iter().all(|dep| is_complete(dep)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Item {
        id: &'static str,
        priority: i32,
        created_at: DateTime<Utc>,
        seq: u64,
        deps: Vec<String>,
    }

    impl Schedulable for Item {
        type Priority = i32;

        fn priority(&self) -> i32 {
            self.priority
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn seq(&self) -> u64 {
            self.seq
        }

        fn dependencies(&self) -> &[String] {
            &self.deps
        }
    }

    fn item(id: &'static str, priority: i32, secs: i64, seq: u64, deps: &[&str]) -> Item {
        Item {
            id,
            priority,
            created_at: Utc.timestamp_opt(secs, 0).single().expect("timestamp"),
            seq,
            deps: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn highest_priority_wins_then_earliest() {
        let items = [
            item("late-high", 5, 20, 3, &[]),
            item("early-high", 5, 10, 2, &[]),
            item("low", 1, 0, 1, &[]),
        ];
        let picked = first_ready(items.iter().collect(), |_| true).expect("pick");
        assert_eq!(picked.id, "early-high");
    }

    #[test]
    fn seq_breaks_identical_timestamps() {
        let items = [item("second", 3, 0, 2, &[]), item("first", 3, 0, 1, &[])];
        let picked = first_ready(items.iter().collect(), |_| true).expect("pick");
        assert_eq!(picked.id, "first");
    }

    #[test]
    fn blocked_candidates_are_skipped() {
        let items = [item("blocked", 9, 0, 1, &["dep"]), item("free", 1, 0, 2, &[])];
        let picked = first_ready(items.iter().collect(), |dep| dep != "dep").expect("pick");
        assert_eq!(picked.id, "free");
        assert!(first_ready(vec![&items[0]], |_| false).is_none());
    }
}
