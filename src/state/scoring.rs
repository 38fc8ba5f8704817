//! Derived statistics computed from a player's sequence.
//!
//! Nothing here is stored: every figure is a pure function of the encoded
//! sequence and is recomputed whenever the sequence changes.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::sequence::{EncodedSequence, Event, Token};

/// Score, best streak and entry accuracy for one player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    /// Sum of every hit run.
    pub score: u64,
    /// Longest single run, including an unterminated trailing run.
    pub best_streak: u64,
    /// Entries that produced at least one hit.
    pub entry_successes: u32,
    /// Misses counted as failed entry attempts.
    pub entry_failures: u32,
}

impl PlayerStats {
    /// Evaluate an encoded sequence in a single left-to-right pass.
    pub fn evaluate(sequence: &EncodedSequence) -> Self {
        let mut evaluator = Evaluator::default();
        for token in sequence.tokens() {
            match token {
                Token::Run(count) => evaluator.hit_run(*count),
                Token::Miss => evaluator.miss(),
            }
        }
        evaluator.finish()
    }

    /// Evaluate a raw event stream. Equivalent to evaluating its encoding.
    pub fn evaluate_events(events: &[Event]) -> Self {
        let mut evaluator = Evaluator::default();
        for event in events {
            match event {
                Event::Hit => evaluator.hit_run(1),
                Event::Miss => evaluator.miss(),
            }
        }
        evaluator.finish()
    }

    /// Total number of classified entries.
    pub fn entry_total(&self) -> u32 {
        self.entry_successes.saturating_add(self.entry_failures)
    }

    /// Presentational form of the entry accuracy.
    pub fn entry_display(&self) -> EntryDisplay {
        let total = self.entry_total();
        if total == 0 {
            return EntryDisplay::NoData;
        }
        // Integer round-half-up of successes / total * 100.
        let (successes, all) = (u64::from(self.entry_successes), u64::from(total));
        let percent = (successes * 200 + all) / (2 * all);
        EntryDisplay::Ratio {
            successes: self.entry_successes,
            total,
            percent: percent as u32,
        }
    }
}

#[derive(Debug, Default)]
struct Evaluator {
    total: u64,
    current_section: u64,
    best_streak: u64,
    in_miss_section: bool,
    miss_count: u32,
    had_success_before_miss: bool,
    entry_successes: u32,
    entry_failures: u32,
}

impl Evaluator {
    fn hit_run(&mut self, hits: u32) {
        self.close_miss_section();
        self.current_section = self.current_section.saturating_add(u64::from(hits));
        self.best_streak = self.best_streak.max(self.current_section);
    }

    fn miss(&mut self) {
        if !self.in_miss_section {
            self.total = self.total.saturating_add(self.current_section);
            self.had_success_before_miss = self.current_section > 0;
            if self.had_success_before_miss {
                self.entry_successes = self.entry_successes.saturating_add(1);
            }
            self.current_section = 0;
            self.in_miss_section = true;
        }
        self.miss_count = self.miss_count.saturating_add(1);
    }

    /// Commit a pending miss run. The first miss after a successful run is the
    /// delimiter of that entry and is not counted as a failure.
    fn close_miss_section(&mut self) {
        if !self.in_miss_section || self.miss_count == 0 {
            return;
        }
        let failures = if self.had_success_before_miss {
            self.miss_count - 1
        } else {
            self.miss_count
        };
        self.entry_failures = self.entry_failures.saturating_add(failures);
        self.miss_count = 0;
        self.in_miss_section = false;
        self.had_success_before_miss = false;
    }

    fn finish(mut self) -> PlayerStats {
        self.close_miss_section();
        self.total = self.total.saturating_add(self.current_section);
        self.best_streak = self.best_streak.max(self.current_section);
        if self.current_section > 0 {
            self.entry_successes = self.entry_successes.saturating_add(1);
        }

        PlayerStats {
            score: self.total,
            best_streak: self.best_streak,
            entry_successes: self.entry_successes,
            entry_failures: self.entry_failures,
        }
    }
}

/// Entry accuracy as shown on scoreboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDisplay {
    /// No entry has been classified yet.
    NoData,
    /// `successes/total (percent%)`.
    Ratio {
        /// Successful entries.
        successes: u32,
        /// Successful plus failed entries.
        total: u32,
        /// Rounded success percentage.
        percent: u32,
    },
}

impl fmt::Display for EntryDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDisplay::NoData => f.write_str("no data"),
            EntryDisplay::Ratio {
                successes,
                total,
                percent,
            } => write!(f, "{successes}/{total} ({percent}%)"),
        }
    }
}

/// Display block of a sequence: a hit run shown as its total, or a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Section {
    /// Maximal run of hits.
    Hits {
        /// Number of hits in the run.
        total: u32,
    },
    /// A single miss.
    Miss,
}

/// Split a sequence into display sections.
pub fn sections(sequence: &EncodedSequence) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::with_capacity(sequence.tokens().len());
    for token in sequence.tokens() {
        match token {
            Token::Run(count) => {
                if let Some(Section::Hits { total }) = sections.last_mut() {
                    *total = total.saturating_add(*count);
                } else {
                    sections.push(Section::Hits { total: *count });
                }
            }
            Token::Miss => sections.push(Section::Miss),
        }
    }
    sections
}

/// One ranked scoreboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardRow {
    /// 1-based position.
    pub rank: usize,
    /// Player name.
    pub player: String,
    /// Derived statistics.
    #[serde(flatten)]
    pub stats: PlayerStats,
    /// Entry accuracy rendered for display.
    pub entry_display: String,
    /// Rendered sections of the player's sequence.
    pub sections: Vec<Section>,
}

/// Players ranked by score, highest first. Ties keep player order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Scoreboard(Vec<ScoreboardRow>);

impl Scoreboard {
    /// Rank every player of a match from their current sequences.
    pub fn rank(sequences: &IndexMap<String, EncodedSequence>) -> Self {
        let mut scored = sequences
            .iter()
            .map(|(player, sequence)| {
                (
                    player.clone(),
                    PlayerStats::evaluate(sequence),
                    sections(sequence),
                )
            })
            .collect::<Vec<_>>();

        // Stable sort keeps creation order among equal scores.
        scored.sort_by(|(_, left, _), (_, right, _)| right.score.cmp(&left.score));

        let rows = scored
            .into_iter()
            .enumerate()
            .map(|(index, (player, stats, sections))| ScoreboardRow {
                rank: index + 1,
                player,
                entry_display: stats.entry_display().to_string(),
                stats,
                sections,
            })
            .collect();

        Self(rows)
    }

    /// Ranked rows.
    pub fn rows(&self) -> &[ScoreboardRow] {
        &self.0
    }

    /// Top-ranked player, if any.
    pub fn winner(&self) -> Option<&ScoreboardRow> {
        self.0.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(raw: &[&str]) -> PlayerStats {
        PlayerStats::evaluate(&EncodedSequence::parse_lenient(raw.iter().copied()))
    }

    fn expected(score: u64, best: u64, successes: u32, failures: u32) -> PlayerStats {
        PlayerStats {
            score,
            best_streak: best,
            entry_successes: successes,
            entry_failures: failures,
        }
    }

    #[test]
    fn empty_sequence_has_zero_stats() {
        assert_eq!(stats(&[]), PlayerStats::default());
    }

    #[test]
    fn run_closed_by_single_miss_then_trailing_run() {
        assert_eq!(stats(&["+3", "-0", "+2"]), expected(5, 3, 2, 0));
    }

    #[test]
    fn leading_misses_all_count_as_failures() {
        assert_eq!(stats(&["-0", "-0", "+1"]), expected(1, 1, 1, 2));
    }

    #[test]
    fn unterminated_run_without_misses() {
        assert_eq!(stats(&["+5"]), expected(5, 5, 1, 0));
    }

    #[test]
    fn only_misses_are_all_failures() {
        assert_eq!(stats(&["-0", "-0", "-0"]), expected(0, 0, 0, 3));
    }

    #[test]
    fn extra_misses_after_a_run_are_failures() {
        // The first miss delimits the 2-run; the next two are failed attempts.
        assert_eq!(stats(&["+2", "-0", "-0", "-0", "+4"]), expected(6, 4, 2, 2));
        // A trailing miss run is committed at end of input.
        assert_eq!(stats(&["+2", "-0", "-0"]), expected(2, 2, 1, 1));
    }

    #[test]
    fn best_streak_tracks_the_longest_run() {
        assert_eq!(stats(&["+1", "-0", "+7", "-0", "+3"]), expected(11, 7, 3, 0));
    }

    #[test]
    fn raw_events_evaluate_like_their_encoding() {
        use Event::{Hit, Miss};
        let raw = [Miss, Hit, Hit, Miss, Miss, Hit, Hit, Hit];
        assert_eq!(
            PlayerStats::evaluate_events(&raw),
            PlayerStats::evaluate(&crate::state::sequence::encode(&raw))
        );
    }

    #[test]
    fn score_is_monotonic_under_appends_and_undo() {
        let mut sequence = EncodedSequence::new();
        let mut last = 0;
        for event in [Event::Hit, Event::Miss, Event::Hit, Event::Hit, Event::Miss] {
            sequence.append(event);
            let score = PlayerStats::evaluate(&sequence).score;
            match event {
                Event::Hit => assert_eq!(score, last + 1),
                Event::Miss => assert_eq!(score, last),
            }
            last = score;
        }
        while !sequence.is_empty() {
            sequence.undo_last();
            let score = PlayerStats::evaluate(&sequence).score;
            assert!(score <= last);
            last = score;
        }
    }

    #[test]
    fn maximal_runs_sum_without_overflow() {
        let max = u64::from(u32::MAX);
        assert_eq!(
            stats(&["+4294967295", "-0", "+1"]),
            expected(max + 1, max, 2, 0)
        );
        assert_eq!(
            stats(&["+4294967295", "-0", "+4294967295"]),
            expected(2 * max, max, 2, 0)
        );
    }

    #[test]
    fn scoreboard_ranks_maximal_runs() {
        let mut sequences = IndexMap::new();
        sequences.insert(
            "Alice".to_string(),
            EncodedSequence::parse_lenient(["+4294967295", "-0", "+1"]),
        );
        sequences.insert("Bob".to_string(), EncodedSequence::parse_lenient(["+3"]));

        let board = Scoreboard::rank(&sequences);
        let winner = board.winner().map(|row| (row.player.as_str(), row.stats.score));
        assert_eq!(winner, Some(("Alice", u64::from(u32::MAX) + 1)));
    }

    #[test]
    fn entry_display_rounds_percentages() {
        assert_eq!(PlayerStats::default().entry_display().to_string(), "no data");
        assert_eq!(expected(0, 0, 2, 1).entry_display().to_string(), "2/3 (67%)");
        assert_eq!(expected(0, 0, 1, 1).entry_display().to_string(), "1/2 (50%)");
        assert_eq!(expected(0, 0, 1, 7).entry_display().to_string(), "1/8 (13%)");
    }

    #[test]
    fn sections_render_runs_and_misses() {
        let sequence = EncodedSequence::parse_lenient(["+3", "-0", "-0", "+1"]);
        assert_eq!(
            sections(&sequence),
            vec![
                Section::Hits { total: 3 },
                Section::Miss,
                Section::Miss,
                Section::Hits { total: 1 },
            ]
        );
    }

    #[test]
    fn scoreboard_ranks_by_score_and_keeps_order_on_ties() {
        let mut sequences = IndexMap::new();
        sequences.insert("Alice".to_string(), EncodedSequence::parse_lenient(["+2"]));
        sequences.insert("Bob".to_string(), EncodedSequence::parse_lenient(["+4"]));
        sequences.insert("Chloe".to_string(), EncodedSequence::parse_lenient(["+2"]));

        let board = Scoreboard::rank(&sequences);
        let order = board
            .rows()
            .iter()
            .map(|row| (row.rank, row.player.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(order, [(1, "Bob"), (2, "Alice"), (3, "Chloe")]);
        assert_eq!(board.winner().map(|row| row.player.as_str()), Some("Bob"));
    }
}
