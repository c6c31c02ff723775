use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static HYPHEN_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<prefix>\w)-[ \t]*\r?\n[ \t]*(?P<suffix>\w)").unwrap());

pub fn sanitize_extracted_text(raw: &str) -> String {
    let normalized: String = raw
        .nfkc()
        .map(|ch| if ch == '\u{c}' { '\n' } else { ch })
        .filter(|ch| !ch.is_control() || *ch == '\n' || *ch == '\t' || *ch == '\r')
        .collect();
    let de_hyphenated = HYPHEN_NEWLINE.replace_all(&normalized, "$prefix$suffix");

    let mut result = String::with_capacity(de_hyphenated.len());
    let mut pending_break = false;

    for line in de_hyphenated.lines().map(str::trim) {
        if line.is_empty() {
            pending_break = !result.is_empty();
            continue;
        }
        if !result.is_empty() {
            result.push_str(if pending_break { "\n\n" } else { "\n" });
        }
        squeeze_whitespace(line, &mut result);
        pending_break = false;
    }

    result
}

fn squeeze_whitespace(line: &str, out: &mut String) {
    let mut words = line.split_whitespace();
    if let Some(first) = words.next() {
        out.push_str(first);
        for word in words {
            out.push(' ');
            out.push_str(word);
        }
    }
}
