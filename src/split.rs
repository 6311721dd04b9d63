//! Delimiter-aware list splitting.
//!
//! Enumerations in almanac prose use whichever separator the author
//! preferred, and commas frequently appear inside parenthetical asides:
//!
//! ```text
//! fruits and vegetables (grown in oases); camels, sheep, goats (kept by nomads); fish
//! ```
//!
//! [`split`] picks the separator that occurs most often outside parentheses
//! and never splits inside `(...)`.

use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

/// Options for [`split`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// Candidate delimiters in priority order. On equal counts the earlier
    /// delimiter wins.
    pub delimiters: Vec<char>,

    /// Ignore delimiters that sit inside parentheses.
    pub respect_parens: bool,

    /// Normalize the whole input and every emitted item.
    pub normalize: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            delimiters: vec![';', ',', '|', '\n'],
            respect_parens: true,
            normalize: true,
        }
    }
}

impl SplitOptions {
    /// Restrict splitting to the given delimiters, highest priority first.
    pub fn with_delimiters(mut self, delimiters: &[char]) -> Self {
        self.delimiters = delimiters.to_vec();
        self
    }

    pub fn respect_parens(mut self, respect: bool) -> Self {
        self.respect_parens = respect;
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Tracks parenthesis depth during a scan. Depth never goes below zero, so a
/// stray `)` cannot hide later delimiters.
#[derive(Debug, Default)]
struct DepthTracker {
    depth: usize,
    enabled: bool,
}

impl DepthTracker {
    fn new(enabled: bool) -> Self {
        Self { depth: 0, enabled }
    }

    fn observe(&mut self, c: char) {
        if !self.enabled {
            return;
        }
        match c {
            '(' => self.depth += 1,
            ')' => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn at_top_level(&self) -> bool {
        self.depth == 0
    }
}

/// Pick the delimiter with the most top-level occurrences.
///
/// Returns `None` when no candidate occurs outside parentheses. Ties go to
/// the candidate listed first in `options.delimiters`.
pub fn select_delimiter(text: &str, options: &SplitOptions) -> Option<char> {
    let mut counts = vec![0usize; options.delimiters.len()];
    let mut tracker = DepthTracker::new(options.respect_parens);

    for c in text.chars() {
        if tracker.at_top_level() {
            if let Some(index) = options.delimiters.iter().position(|d| *d == c) {
                counts[index] += 1;
            }
        }
        tracker.observe(c);
    }

    let mut best: Option<(usize, usize)> = None;
    for (index, count) in counts.into_iter().enumerate() {
        if count == 0 {
            continue;
        }
        // Strict comparison keeps the earlier (higher priority) candidate on ties.
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((index, count)),
        }
    }

    best.map(|(index, _)| options.delimiters[index])
}

/// Split a text blob into an ordered list of items.
///
/// Order follows the source and duplicates are kept. Empty items are
/// dropped, so an empty input yields an empty list.
///
/// # Example
///
/// ```
/// use almanac::{split, SplitOptions};
///
/// let items = split(
///     "fruits and vegetables (grown in oases); camels, sheep, goats (kept by nomads); fish",
///     &SplitOptions::default(),
/// );
/// assert_eq!(items, vec![
///     "fruits and vegetables (grown in oases)",
///     "camels, sheep, goats (kept by nomads)",
///     "fish",
/// ]);
/// ```
pub fn split(text: &str, options: &SplitOptions) -> Vec<String> {
    let prepared = if options.normalize {
        normalize(text)
    } else {
        text.to_string()
    };

    let Some(delimiter) = select_delimiter(&prepared, options) else {
        return finish_items(vec![prepared], options);
    };

    let mut items = Vec::new();
    let mut current = String::new();
    let mut tracker = DepthTracker::new(options.respect_parens);

    for c in prepared.chars() {
        if c == delimiter && tracker.at_top_level() {
            items.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
        tracker.observe(c);
    }
    items.push(current);

    finish_items(items, options)
}

fn finish_items(items: Vec<String>, options: &SplitOptions) -> Vec<String> {
    items
        .into_iter()
        .map(|item| {
            if options.normalize {
                normalize(&item)
            } else {
                item.trim().to_string()
            }
        })
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_wins_over_inner_commas() {
        let items = split(
            "fruits and vegetables (grown in oases); camels, sheep, goats (kept by nomads); fish",
            &SplitOptions::default(),
        );

        assert_eq!(items.len(), 3);
        assert_eq!(items[1], "camels, sheep, goats (kept by nomads)");
    }

    #[test]
    fn test_commas_inside_parens_not_counted() {
        let text = "wheat (durum, soft); barley";
        assert_eq!(select_delimiter(text, &SplitOptions::default()), Some(';'));
        assert_eq!(split(text, &SplitOptions::default()), vec!["wheat (durum, soft)", "barley"]);
    }

    #[test]
    fn test_most_frequent_delimiter_chosen() {
        let text = "Arabic, English, French; Hebrew";
        assert_eq!(select_delimiter(text, &SplitOptions::default()), Some(','));
        assert_eq!(
            split(text, &SplitOptions::default()),
            vec!["Arabic", "English", "French; Hebrew"]
        );
    }

    #[test]
    fn test_tie_broken_by_priority() {
        let text = "a, b; c";
        assert_eq!(select_delimiter(text, &SplitOptions::default()), Some(';'));

        let reversed = SplitOptions::default().with_delimiters(&[',', ';']);
        assert_eq!(select_delimiter(text, &reversed), Some(','));
    }

    #[test]
    fn test_no_delimiter_returns_whole_string() {
        assert_eq!(
            split("  single item (with, aside)  ", &SplitOptions::default()),
            vec!["single item (with, aside)"]
        );
    }

    #[test]
    fn test_empty_input_yields_no_items() {
        assert!(split("", &SplitOptions::default()).is_empty());
        assert!(split(" ; ;", &SplitOptions::default()).is_empty());
    }

    #[test]
    fn test_unbalanced_close_paren_clamped() {
        let items = split("a) b, c, d", &SplitOptions::default());
        assert_eq!(items, vec!["a) b", "c", "d"]);
    }

    #[test]
    fn test_unclosed_paren_swallows_rest() {
        let items = split("a; b (c; d", &SplitOptions::default());
        assert_eq!(items, vec!["a", "b (c; d"]);
    }

    #[test]
    fn test_parens_ignored_when_disabled() {
        let options = SplitOptions::default().respect_parens(false);
        let items = split("x (y, z), w", &options);
        assert_eq!(items, vec!["x (y", "z)", "w"]);
    }

    #[test]
    fn test_duplicates_preserved() {
        let items = split("cattle; sheep; cattle", &SplitOptions::default());
        assert_eq!(items, vec!["cattle", "sheep", "cattle"]);
    }

    #[test]
    fn test_line_break_delimiter() {
        let items = split("first line\nsecond line", &SplitOptions::default());
        assert_eq!(items, vec!["first line", "second line"]);
    }

    #[test]
    fn test_items_normalized() {
        let items = split("caf&eacute;;  tea&nbsp;&amp; milk", &SplitOptions::default());
        assert_eq!(items, vec!["café", "tea & milk"]);
    }

    #[test]
    fn test_without_normalization_items_are_trimmed_only() {
        let options = SplitOptions::default().normalize(false);
        let items = split("a&b ;  c  d", &options);
        assert_eq!(items, vec!["a&b", "c  d"]);
    }
}
