//! Sequential document numbers with optional per-year reset.

use serde::{Deserialize, Serialize};

/// Persisted counter for one document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceState {
    /// Year of the last issued number, 0 when nothing has been issued yet.
    pub last_year: i32,
    pub counter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingScheme {
    pub prefix: String,
    pub include_year: bool,
    pub reset_yearly: bool,
}

impl NumberingScheme {
    pub fn new(prefix: impl Into<String>, include_year: bool, reset_yearly: bool) -> Self {
        Self {
            prefix: prefix.into(),
            include_year,
            reset_yearly,
        }
    }

    /// The state after issuing one number in `year`.
    pub fn advance(&self, state: SequenceState, year: i32) -> SequenceState {
        if self.reset_yearly && state.last_year != year {
            SequenceState { last_year: year, counter: 1 }
        } else {
            SequenceState {
                last_year: year,
                counter: state.counter.saturating_add(1),
            }
        }
    }

    pub fn format(&self, state: SequenceState) -> String {
        if self.include_year {
            format!("{}-{:04}-{:04}", self.prefix, state.last_year, state.counter)
        } else {
            format!("{}-{:04}", self.prefix, state.counter)
        }
    }

    /// Advances `state` in place and returns the formatted number.
    pub fn next(&self, state: &mut SequenceState, year: i32) -> String {
        *state = self.advance(*state, year);
        self.format(*state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_number() {
        let scheme = NumberingScheme::new("INV", true, true);
        let mut state = SequenceState::default();
        assert_eq!(scheme.next(&mut state, 2024), "INV-2024-0001");
        assert_eq!(state, SequenceState { last_year: 2024, counter: 1 });
    }

    #[test]
    fn test_increments_within_year() {
        let scheme = NumberingScheme::new("INV", true, true);
        let mut state = SequenceState::default();
        let mut previous = 0;
        for expected in 1..=25u32 {
            let number = scheme.next(&mut state, 2024);
            assert_eq!(number, format!("INV-2024-{:04}", expected));
            assert!(state.counter > previous);
            previous = state.counter;
        }
    }

    #[test]
    fn test_resets_on_year_boundary() {
        let scheme = NumberingScheme::new("QUO", true, true);
        let mut state = SequenceState { last_year: 2023, counter: 41 };
        assert_eq!(scheme.next(&mut state, 2024), "QUO-2024-0001");
        assert_eq!(scheme.next(&mut state, 2024), "QUO-2024-0002");
    }

    #[test]
    fn test_no_reset_keeps_counting() {
        let scheme = NumberingScheme::new("INV", false, false);
        let mut state = SequenceState { last_year: 2023, counter: 41 };
        assert_eq!(scheme.next(&mut state, 2024), "INV-0042");
        assert_eq!(state.last_year, 2024);
    }

    #[test]
    fn test_wide_counter_not_truncated() {
        let scheme = NumberingScheme::new("INV", false, true);
        let mut state = SequenceState { last_year: 2024, counter: 9999 };
        assert_eq!(scheme.next(&mut state, 2024), "INV-10000");
    }
}
