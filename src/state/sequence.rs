//! Run-length encoding of a player's hit/miss stream.
//!
//! The raw stream is a list of [`Event`]s. Storage and the wire use the
//! compact [`EncodedSequence`] form: consecutive hits collapse into a single
//! `+<n>` token and every miss is its own `-0` token. Mutations only ever
//! touch the tail so that an undo exactly reverses the last recorded action.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;

/// Atomic player action recorded during a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// The player scored.
    Hit,
    /// The player missed.
    Miss,
}

/// Single entry of an encoded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum Token {
    /// Run of `n >= 1` consecutive hits, written `+<n>`.
    Run(u32),
    /// Single miss marker, written `-0`.
    Miss,
}

/// Raised when a wire token is neither `+<n>` (n >= 1) nor `-0`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed sequence token `{0}`")]
pub struct MalformedToken(pub String);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Run(count) => write!(f, "+{count}"),
            Token::Miss => f.write_str("-0"),
        }
    }
}

impl FromStr for Token {
    type Err = MalformedToken;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == "-0" {
            return Ok(Token::Miss);
        }

        raw.strip_prefix('+')
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u32>().ok())
            .filter(|count| *count >= 1)
            .map(Token::Run)
            .ok_or_else(|| MalformedToken(raw.to_string()))
    }
}

/// Canonical run-length encoded sequence for one player.
///
/// Invariant: two [`Token::Run`] entries are never adjacent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct EncodedSequence(Vec<Token>);

impl EncodedSequence {
    /// Build an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a canonical sequence from arbitrary tokens, merging adjacent runs.
    pub fn from_tokens(tokens: impl IntoIterator<Item = Token>) -> Self {
        let mut sequence = Self::new();
        for token in tokens {
            match token {
                Token::Run(count) => sequence.push_hits(count),
                Token::Miss => sequence.append_miss(),
            }
        }
        sequence
    }

    /// Parse wire tokens, skipping (and logging) malformed entries so that one
    /// corrupt value does not wipe an otherwise valid history.
    pub fn parse_lenient<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_tokens(raw.into_iter().filter_map(|entry| {
            match entry.as_ref().parse::<Token>() {
                Ok(token) => Some(token),
                Err(err) => {
                    warn!(error = %err, "skipping malformed sequence token");
                    None
                }
            }
        }))
    }

    /// Borrow the underlying tokens.
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    /// Whether no event has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of raw events represented by this sequence.
    pub fn event_count(&self) -> usize {
        self.0
            .iter()
            .map(|token| match token {
                Token::Run(count) => *count as usize,
                Token::Miss => 1,
            })
            .sum()
    }

    /// Record one hit, extending the trailing run in place when there is one.
    pub fn append_hit(&mut self) {
        self.push_hits(1);
    }

    /// Record one miss. Consecutive misses stay separate tokens.
    pub fn append_miss(&mut self) {
        self.0.push(Token::Miss);
    }

    /// Record a single event.
    pub fn append(&mut self, event: Event) {
        match event {
            Event::Hit => self.append_hit(),
            Event::Miss => self.append_miss(),
        }
    }

    /// Remove the last recorded event. Undo on an empty sequence is a no-op.
    pub fn undo_last(&mut self) {
        match self.0.last_mut() {
            Some(Token::Run(count)) if *count > 1 => *count -= 1,
            Some(_) => {
                self.0.pop();
            }
            None => {}
        }
    }

    /// Wire representation (`["+3", "-0", ...]`).
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// Extend the trailing run. A run that would exceed `u32::MAX` is skipped
    /// and logged like a malformed token.
    fn push_hits(&mut self, hits: u32) {
        if hits == 0 {
            return;
        }
        match self.0.last_mut() {
            Some(Token::Run(count)) => match count.checked_add(hits) {
                Some(merged) => *count = merged,
                None => warn!(run = *count, hits, "skipping hits that overflow the current run"),
            },
            _ => self.0.push(Token::Run(hits)),
        }
    }
}

impl From<Vec<String>> for EncodedSequence {
    fn from(raw: Vec<String>) -> Self {
        Self::parse_lenient(raw)
    }
}

/// Encode a raw event stream into its canonical run-length form.
pub fn encode(events: &[Event]) -> EncodedSequence {
    let mut sequence = EncodedSequence::new();
    for event in events {
        sequence.append(*event);
    }
    sequence
}

/// Expand an encoded sequence back into the raw event stream.
pub fn decode(sequence: &EncodedSequence) -> Vec<Event> {
    let mut events = Vec::with_capacity(sequence.event_count());
    for token in sequence.tokens() {
        match token {
            Token::Run(count) => {
                events.extend(std::iter::repeat_n(Event::Hit, *count as usize));
            }
            Token::Miss => events.push(Event::Miss),
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    use Event::{Hit, Miss};

    fn strings(sequence: &EncodedSequence) -> Vec<String> {
        sequence.to_strings()
    }

    #[test]
    fn encode_collapses_hits_and_keeps_misses_apart() {
        let encoded = encode(&[Hit, Hit, Hit, Miss, Miss, Hit, Hit]);
        assert_eq!(strings(&encoded), ["+3", "-0", "-0", "+2"]);
    }

    #[test]
    fn decode_restores_the_raw_stream() {
        let streams: [&[Event]; 5] = [
            &[],
            &[Miss],
            &[Hit],
            &[Miss, Hit, Hit, Miss, Miss, Miss, Hit],
            &[Hit, Hit, Miss, Hit, Hit, Hit, Hit],
        ];
        for raw in streams {
            assert_eq!(decode(&encode(raw)), raw);
        }
    }

    #[test]
    fn incremental_appends_stay_canonical() {
        let mut sequence = EncodedSequence::new();
        for event in [Hit, Hit, Miss, Hit, Miss, Miss, Hit, Hit, Hit] {
            sequence.append(event);
            let adjacent_runs = sequence
                .tokens()
                .windows(2)
                .any(|pair| matches!(pair, [Token::Run(_), Token::Run(_)]));
            assert!(!adjacent_runs, "adjacent runs in {:?}", strings(&sequence));
        }
        assert_eq!(strings(&sequence), ["+2", "-0", "+1", "-0", "-0", "+3"]);
    }

    #[test]
    fn undo_reverses_the_last_append() {
        let base = encode(&[Hit, Miss, Hit, Hit]);

        let mut after_hit = base.clone();
        after_hit.append_hit();
        after_hit.undo_last();
        assert_eq!(after_hit, base);

        let mut after_miss = base.clone();
        after_miss.append_miss();
        after_miss.undo_last();
        assert_eq!(after_miss, base);

        let mut empty = EncodedSequence::new();
        empty.append_hit();
        empty.undo_last();
        assert!(empty.is_empty());
    }

    #[test]
    fn undo_on_empty_is_a_noop() {
        let mut sequence = EncodedSequence::new();
        sequence.undo_last();
        assert_eq!(sequence, EncodedSequence::new());
    }

    #[test]
    fn undo_decrements_runs_before_removing_them() {
        let mut sequence = encode(&[Miss, Hit, Hit]);
        sequence.undo_last();
        assert_eq!(strings(&sequence), ["-0", "+1"]);
        sequence.undo_last();
        assert_eq!(strings(&sequence), ["-0"]);
        sequence.undo_last();
        assert!(sequence.is_empty());
    }

    #[test]
    fn token_parsing_rejects_malformed_entries() {
        assert_eq!("+12".parse::<Token>(), Ok(Token::Run(12)));
        assert_eq!("-0".parse::<Token>(), Ok(Token::Miss));
        for bad in ["+0", "+", "-1", "3", "+x", "+-2", "", " +1"] {
            assert!(bad.parse::<Token>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn lenient_parse_skips_bad_tokens_and_merges_runs() {
        let sequence = EncodedSequence::parse_lenient(["+1", "bogus", "+1", "-0", "+0", "+4"]);
        assert_eq!(strings(&sequence), ["+2", "-0", "+4"]);
    }

    #[test]
    fn runs_that_would_overflow_are_skipped() {
        let sequence = EncodedSequence::parse_lenient(["+4294967295", "+1", "-0", "+2"]);
        assert_eq!(strings(&sequence), ["+4294967295", "-0", "+2"]);

        let mut saturated = EncodedSequence::parse_lenient(["+4294967295"]);
        saturated.append_hit();
        assert_eq!(saturated.tokens(), &[Token::Run(u32::MAX)]);
    }

    #[test]
    fn serde_uses_the_string_form() {
        let sequence: EncodedSequence =
            serde_json::from_str(r#"["+3", "-0", "oops", "+2"]"#).unwrap();
        assert_eq!(sequence.event_count(), 6);
        assert_eq!(
            serde_json::to_string(&sequence).unwrap(),
            r#"["+3","-0","+2"]"#
        );
    }
}
