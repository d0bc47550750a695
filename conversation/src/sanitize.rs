//! Text sanitizer for generated prose.
//!
//! Backends emit typographic Unicode, stray control bytes and zero-width
//! characters that render badly in plain-text transcripts. Full sanitizing
//! applies to appended turns and the final artifact; streamed fragments only
//! get the character map, since whitespace collapsing across fragment
//! boundaries would change the concatenated reply.

use std::sync::LazyLock;

use regex::Regex;

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\x{80}-\x{9F}]")
        .expect("CONTROL_CHARS regex should compile")
});

static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("SPACE_RUNS regex should compile"));

static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m) +$").expect("TRAILING_SPACE regex should compile"));

fn map_char(c: char, out: &mut String) {
    match c {
        // DC4 shows up where an em dash was mangled upstream.
        '\u{0014}' => out.push('\u{2014}'),
        '\u{2018}' | '\u{2019}' | '\u{201B}' => out.push('\''),
        '\u{201C}' | '\u{201D}' | '\u{201F}' => out.push('"'),
        '\u{2026}' => out.push_str("..."),
        '\u{00A0}' | '\u{2007}' | '\u{202F}' => out.push(' '),
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => {}
        '\u{FFFD}' => out.push('?'),
        other => out.push(other),
    }
}

/// Character map only. Safe to apply to individual stream fragments.
pub fn sanitize_fragment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        map_char(c, &mut out);
    }
    out
}

/// Full cleanup for complete text.
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mapped = sanitize_fragment(text);
    let stripped = CONTROL_CHARS.replace_all(&mapped, "");
    let collapsed = SPACE_RUNS.replace_all(&stripped, " ");
    TRAILING_SPACE.replace_all(&collapsed, "").into_owned()
}
