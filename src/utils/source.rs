// src/utils/source.rs

use std::sync::LazyLock;

use regex::Regex;

static NON_BREAKING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{00A0}\x{2007}\x{202F}]").unwrap());

static ZERO_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{200B}-\x{200D}\x{2060}\x{FEFF}]").unwrap());

static CURLY_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{2018}-\x{201B}]").unwrap());

static CURLY_DOUBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{201C}-\x{201F}]").unwrap());

static LINE_ENDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").unwrap());

/// Normalizes text pasted from rich editors so it compiles as typed.
///
/// Non-breaking spaces become plain spaces, zero-width marks are removed,
/// typographic quotes are straightened and every line ending becomes `\n`.
/// Never fails.
pub fn sanitize_source(raw: &str) -> String {
    let text = NON_BREAKING_SPACE.replace_all(raw, " ");
    let text = ZERO_WIDTH.replace_all(&text, "");
    let text = CURLY_SINGLE.replace_all(&text, "'");
    let text = CURLY_DOUBLE.replace_all(&text, "\"");
    LINE_ENDING.replace_all(&text, "\n").into_owned()
}

/// `header + "\n" + source + "\n" + footer`
pub fn assemble_source(header: &str, source: &str, footer: &str) -> String {
    let mut out = String::with_capacity(header.len() + source.len() + footer.len() + 2);
    out.push_str(header);
    out.push('\n');
    out.push_str(source);
    out.push('\n');
    out.push_str(footer);
    out
}
