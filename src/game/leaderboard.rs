//! Leaderboard
//!
//! Scores keyed by username. Snapshots are sorted by descending score. Among
//! equal scores, names that are plain integers (`"0"`, `"42"`, no sign or
//! leading zeros) come first in numeric order, then every other name in the
//! order it first scored. Browser clients list score objects the same way.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// One row of a leaderboard snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Player name.
    pub username: String,
    /// Correct answers credited to this name.
    pub score: u32,
}

impl LeaderboardEntry {
    /// Create an entry.
    pub fn new(username: impl Into<String>, score: u32) -> Self {
        Self {
            username: username.into(),
            score,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ScoreRecord {
    score: u32,
    /// Position in first-score order, used to break ties.
    first_scored: u64,
}

/// Per-game score table.
#[derive(Clone, Debug, Default)]
pub struct Leaderboard {
    scores: BTreeMap<String, ScoreRecord>,
    next_seq: u64,
}

impl Leaderboard {
    /// Create an empty leaderboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit one point to `username`, returning the new score.
    pub fn award(&mut self, username: &str) -> u32 {
        if let Some(record) = self.scores.get_mut(username) {
            record.score += 1;
            return record.score;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.scores.insert(
            username.to_string(),
            ScoreRecord {
                score: 1,
                first_scored: seq,
            },
        );
        1
    }

    /// Score for a username (0 if it never scored).
    pub fn score(&self, username: &str) -> u32 {
        self.scores.get(username).map(|r| r.score).unwrap_or(0)
    }

    /// Number of usernames on the board.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True if nobody has scored.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Ordered copy of the board.
    pub fn snapshot(&self) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(&String, &ScoreRecord)> = self.scores.iter().collect();
        rows.sort_by_key(|(name, record)| (Reverse(record.score), tie_rank(name, record)));
        rows.into_iter()
            .map(|(name, record)| LeaderboardEntry::new(name.clone(), record.score))
            .collect()
    }

    /// Forget all scores.
    pub fn clear(&mut self) {
        self.scores.clear();
        self.next_seq = 0;
    }
}

/// Position among equal scores: integer names by value, then first-scored.
fn tie_rank(name: &str, record: &ScoreRecord) -> (u8, u64) {
    match integer_key(name) {
        Some(index) => (0, u64::from(index)),
        None => (1, record.first_scored),
    }
}

/// `name` as a canonical integer key below `u32::MAX`.
fn integer_key(name: &str) -> Option<u32> {
    let value: u32 = name.parse().ok()?;
    (value != u32::MAX && value.to_string() == name).then_some(value)
}
