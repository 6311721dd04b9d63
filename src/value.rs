//! Scalar value parsing.
//!
//! Turns value strings such as `"$1.2 trillion (2023 est.)"`, `"4.5% (2022)"`,
//! `"$310 million (FY19/20 est.)"` or `"331,449,281 (2021 est.)"` into a
//! [`ParsedValue`]. Recognized forms, in priority order:
//!
//! 1. the unavailable sentinel `NA`
//! 2. a magnitude followed by `trillion`, `billion` or `million`
//! 3. a percentage
//! 4. a bare year marker such as `(FY19/20 est.)`
//! 5. a plain (optionally comma-grouped) number with a year marker, or
//!    followed by nothing but a unit phrase
//!
//! Each line of multi-line text is tried in turn. Text matching none of
//! these comes back with every field absent and the original text in
//! [`ParsedValue::raw`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::normalize::normalize;

// Magnitude with a scale word, e.g. "-$1.25 billion kWh (2019 est.)"
static RE_SCALED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<sign>-)?\s*(?P<cur>\$)?\s*(?P<num>-?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|-?\.\d+)\s*(?P<scale>trillion|billion|million)\b(?P<rest>.*)$",
    )
    .unwrap()
});

// Percentage, e.g. "-0.4% (2023 est.)"
static RE_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<num>-?(?:\d+(?:\.\d+)?|\.\d+))\s*%(?P<rest>.*)$").unwrap()
});

// Plain number, e.g. "$-24,500 (2020 est.)" or "78.5 years (2023 est.)"
static RE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<sign>-)?\s*(?P<cur>\$)?\s*(?P<num>-?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)(?P<rest>(?:[\s(].*)?)$",
    )
    .unwrap()
});

static RE_PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((?P<inner>[^()]*)\)").unwrap());

static RE_FISCAL_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bFY\s?(?P<start>\d{4}|\d{2})\s*/\s*(?P<end>\d{2,4})\b").unwrap()
});

static RE_CALENDAR_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<year>\d{4})\b").unwrap());

// Unit phrase with no digits, e.g. " sq km" or " bbl/day"
static RE_UNIT_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+[A-Za-z][A-Za-z /.]*$").unwrap());

// "est.", "estimate", "estimated"
static RE_ESTIMATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\best(?:imated?)?\b").unwrap());

const MAX_UNIT_LEN: usize = 32;

/// Result of parsing one value string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedValue {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub year: Option<i32>,
    pub is_estimate: bool,
    pub is_unavailable: bool,

    /// Start calendar year of an `FYxx/yy` marker. Reported even when the
    /// marker is not used as [`ParsedValue::year`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_year: Option<i32>,

    /// The text as handed to the parser.
    #[serde(skip)]
    pub raw: String,
}

/// Coarse classification of a [`ParsedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueStatus {
    /// A numeric value was recovered.
    Parsed,
    /// The text was the `NA` sentinel.
    Unavailable,
    /// No numeric value was recovered.
    Unparsed,
}

impl ParsedValue {
    fn unparsed(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            ..Self::default()
        }
    }

    pub fn status(&self) -> ValueStatus {
        if self.is_unavailable {
            ValueStatus::Unavailable
        } else if self.value.is_some() {
            ValueStatus::Parsed
        } else {
            ValueStatus::Unparsed
        }
    }

    /// True when the parse produced anything a time series can record: a
    /// value, the unavailable sentinel, an estimate flag or a year.
    pub fn has_signal(&self) -> bool {
        self.value.is_some()
            || self.is_unavailable
            || self.is_estimate
            || self.year.is_some()
            || self.fiscal_year.is_some()
    }
}

/// Error returned by [`try_parse_value`] when no pattern matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedValue {
    pub raw: String,
}

impl fmt::Display for UnparsedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unrecognized value text: {:?}", self.raw)
    }
}

impl std::error::Error for UnparsedValue {}

/// Caller-selectable parsing behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueOptions {
    /// Report the start year of an `FYxx/yy` marker as `year`.
    pub fiscal_year_as_year: bool,
}

/// Parse a value string with default options. Never fails.
///
/// # Example
///
/// ```
/// use almanac::parse_value;
///
/// let parsed = parse_value("$1.2 trillion (2023 est.)");
/// assert_eq!(parsed.value, Some(1.2e12));
/// assert_eq!(parsed.year, Some(2023));
/// assert!(parsed.is_estimate);
/// ```
pub fn parse_value(text: &str) -> ParsedValue {
    parse_value_with(text, &ValueOptions::default())
}

/// Like [`parse_value`] but rejects text that carries no value.
///
/// The `NA` sentinel counts as a successful parse.
pub fn try_parse_value(text: &str, options: &ValueOptions) -> Result<ParsedValue, UnparsedValue> {
    let parsed = parse_value_with(text, options);
    match parsed.status() {
        ValueStatus::Unparsed => Err(UnparsedValue { raw: parsed.raw }),
        _ => Ok(parsed),
    }
}

/// Parse a value string.
///
/// Lines of the normalized text are tried in order and the first one that
/// yields a value, the `NA` sentinel or a year marker wins, so a leading
/// label line such as `"euros per US dollar -"` is skipped.
pub fn parse_value_with(text: &str, options: &ValueOptions) -> ParsedValue {
    let normalized = normalize(text);
    for line in normalized.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let parsed = parse_line(text, line, options);
        if parsed.has_signal() {
            return parsed;
        }
    }

    tracing::debug!(raw = %text, "no value pattern matched");
    ParsedValue::unparsed(text)
}

fn parse_line(text: &str, line: &str, options: &ValueOptions) -> ParsedValue {
    let mut parsed = ParsedValue::unparsed(text);

    if is_unavailable(line) {
        parsed.is_unavailable = true;
        apply_marker(&mut parsed, &line[2..], options);
        return parsed;
    }

    if let Some(caps) = RE_SCALED.captures(line) {
        let exponent = match caps["scale"].to_ascii_lowercase().as_str() {
            "trillion" => 12,
            "billion" => 9,
            _ => 6,
        };
        let negative = caps.name("sign").is_some();
        if let Some(value) = scaled_number(&caps["num"], exponent, negative) {
            let rest = caps.name("rest").map_or("", |m| m.as_str());
            parsed.value = Some(value);
            parsed.unit = unit_text(rest).or_else(|| caps.name("cur").map(|_| "USD".to_string()));
            apply_marker(&mut parsed, rest, options);
            return parsed;
        }
    }

    if let Some(caps) = RE_PERCENT.captures(line) {
        if let Some(value) = scaled_number(&caps["num"], 0, false) {
            parsed.value = Some(value);
            parsed.unit = Some("%".to_string());
            apply_marker(&mut parsed, &caps["rest"], options);
            return parsed;
        }
    }

    if line.starts_with('(') {
        apply_marker(&mut parsed, line, options);
        if parsed.year.is_some() || parsed.fiscal_year.is_some() {
            return parsed;
        }
        return ParsedValue::unparsed(text);
    }

    if let Some(caps) = RE_NUMBER.captures(line) {
        let rest = caps.name("rest").map_or("", |m| m.as_str());
        let mut candidate = ParsedValue::unparsed(text);
        apply_marker(&mut candidate, rest, options);
        let has_marker = candidate.year.is_some() || candidate.fiscal_year.is_some();

        let unit_only = RE_UNIT_ONLY.is_match(rest) && rest.trim().len() <= MAX_UNIT_LEN;

        if has_marker || unit_only || rest.trim().is_empty() {
            let negative = caps.name("sign").is_some();
            if let Some(value) = scaled_number(&caps["num"], 0, negative) {
                candidate.value = Some(value);
                candidate.unit =
                    unit_text(rest).or_else(|| caps.name("cur").map(|_| "USD".to_string()));
                return candidate;
            }
        }
    }

    parsed
}

/// Convert the two- or four-digit start of a fiscal-year token to a calendar
/// year. Two-digit years below 50 land in the 2000s, the rest in the 1900s.
pub fn fiscal_year_start(start: &str) -> Option<i32> {
    let year: i32 = start.parse().ok()?;
    match start.len() {
        2 if year < 50 => Some(2000 + year),
        2 => Some(1900 + year),
        4 => Some(year),
        _ => None,
    }
}

fn is_unavailable(line: &str) -> bool {
    let Some(head) = line.get(..2) else {
        return false;
    };
    if !head.eq_ignore_ascii_case("NA") {
        return false;
    }
    let tail = &line[2..];
    tail.is_empty() || tail.starts_with(' ')
}

/// Apply the first parenthetical carrying a year or fiscal-year token, and
/// the estimate flag, from `rest`.
fn apply_marker(parsed: &mut ParsedValue, rest: &str, options: &ValueOptions) {
    parsed.is_estimate = RE_ESTIMATE.is_match(rest);

    for caps in RE_PARENTHETICAL.captures_iter(rest) {
        let inner = &caps["inner"];
        if let Some(fy) = RE_FISCAL_YEAR.captures(inner) {
            parsed.fiscal_year = fiscal_year_start(&fy["start"]);
            if options.fiscal_year_as_year {
                parsed.year = parsed.fiscal_year;
            }
            return;
        }
        if let Some(year) = RE_CALENDAR_YEAR.captures(inner) {
            parsed.year = year["year"].parse().ok();
            return;
        }
    }
}

/// Build `num × 10^exponent` from decimal text so the result is the nearest
/// double to the written literal.
fn scaled_number(num: &str, exponent: i32, negative: bool) -> Option<f64> {
    let digits: String = num.chars().filter(|c| *c != ',').collect();
    let value: f64 = format!("{}e{}", digits, exponent).parse().ok()?;
    if negative && value > 0.0 {
        Some(-value)
    } else {
        Some(value)
    }
}

/// Unit words between a number and its first parenthetical or list break.
fn unit_text(rest: &str) -> Option<String> {
    let end = rest.find(['(', ';', ',']).unwrap_or(rest.len());
    let unit = rest[..end].trim().trim_end_matches([':', '.', '-']).trim();
    if unit.is_empty() || unit.len() > MAX_UNIT_LEN {
        None
    } else {
        Some(unit.to_string())
    }
}
