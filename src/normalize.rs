//! Text normalization for free-text field leaves.
//!
//! Source documents mix HTML markup, character entities, typographic
//! punctuation and ragged whitespace. [`normalize`] reduces all of that to
//! plain text while keeping explicit line breaks.

use regex::{Captures, Regex};
use std::sync::LazyLock;

// Line-breaking tags: <br>, <br/>, <br />, </p>
static RE_BREAK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>").unwrap());

// Any other simple tag. Requires a letter after `<` so "<1%" survives.
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").unwrap());

static RE_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#(?P<dec>[0-9]{1,7})|#[xX](?P<hex>[0-9A-Fa-f]{1,6})|(?P<name>[A-Za-z][A-Za-z0-9]{1,31}));")
        .unwrap()
});

static RE_HSPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

static RE_SPACE_AROUND_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").unwrap());

/// Named entities seen in almanac prose. Anything else is left untouched.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201c}"),
    ("rdquo", "\u{201d}"),
    ("hellip", "\u{2026}"),
    ("deg", "\u{b0}"),
    ("frac12", "\u{bd}"),
    ("frac14", "\u{bc}"),
    ("frac34", "\u{be}"),
    ("plusmn", "\u{b1}"),
    ("times", "\u{d7}"),
    ("middot", "\u{b7}"),
    ("eacute", "\u{e9}"),
    ("egrave", "\u{e8}"),
    ("aacute", "\u{e1}"),
    ("iacute", "\u{ed}"),
    ("oacute", "\u{f3}"),
    ("uacute", "\u{fa}"),
    ("ocirc", "\u{f4}"),
    ("ntilde", "\u{f1}"),
    ("ccedil", "\u{e7}"),
    ("auml", "\u{e4}"),
    ("ouml", "\u{f6}"),
    ("uuml", "\u{fc}"),
];

/// Normalize one free-text leaf.
///
/// Decodes entities, strips markup, maps curly quotes and en/em dashes to
/// ASCII, collapses runs of spaces and tabs, and trims the result. Line
/// breaks are kept. The function is idempotent.
///
/// # Example
///
/// ```
/// use almanac::normalize;
///
/// assert_eq!(normalize("  Côte d&rsquo;Ivoire \u{2013} north  "), "Côte d'Ivoire - north");
/// assert_eq!(normalize("first<br>second"), "first\nsecond");
/// ```
pub fn normalize(text: &str) -> String {
    let mut current = text.to_string();
    // Decoding can surface new entities or tags ("&amp;lt;b&amp;gt;"), so
    // iterate to a fixpoint. Each pass consumes markup or entities, so the
    // loop ends once none are left.
    loop {
        let next = normalize_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn normalize_pass(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = RE_BREAK_TAG.replace_all(text, "\n");
    let text = RE_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = map_typography(&text);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = RE_HSPACE.replace_all(&text, " ");
    let text = RE_SPACE_AROUND_BREAK.replace_all(&text, "\n");

    text.trim().to_string()
}

/// Decode numeric and known named character entities in one pass.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    RE_ENTITY
        .replace_all(text, |caps: &Captures| {
            let decoded = if let Some(dec) = caps.name("dec") {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else if let Some(hex) = caps.name("hex") {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            } else {
                caps.name("name").and_then(|name| {
                    NAMED_ENTITIES
                        .iter()
                        .find(|(entity, _)| *entity == name.as_str())
                        .map(|(_, value)| value.to_string())
                })
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn map_typography(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{201b}' | '\u{2032}' => out.push('\''),
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{201f}' | '\u{2033}' => out.push('"'),
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' => {
                out.push('-')
            }
            '\u{a0}' | '\u{2007}' | '\u{202f}' => out.push(' '),
            '\u{2026}' => out.push_str("..."),
            _ => out.push(c),
        }
    }
    out
}
