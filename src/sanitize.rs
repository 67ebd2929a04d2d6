//! Title to local filename conversion.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Namespace prefix MediaWiki puts in front of every file title.
pub const FILE_NAMESPACE: &str = "File:";

/// Converts a remote member title into a local filename.
///
/// - Strips the `File:` namespace prefix
/// - Percent-decodes until no `%XX` escape is left (invalid UTF-8 decodes lossily)
/// - Replaces whitespace, `/`, `\`, NUL and control characters with `_`
/// - Maps names that would address a directory (empty, `.`, `..`) to underscores
pub fn sanitize(title: &str) -> String {
    let stripped = title.strip_prefix(FILE_NAMESPACE).unwrap_or(title);
    let decoded = decode_fully(stripped);

    let mut out: String = decoded
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' || c == '\0' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if out.is_empty() || out.chars().all(|c| c == '.') {
        out = "_".repeat(out.len().max(1));
    }
    out
}

/// Decodes repeatedly so that `%2520` ends up as a space rather than `%20`.
fn decode_fully(value: &str) -> String {
    let mut current = value.to_string();
    loop {
        let next = match percent_decode_str(&current).decode_utf8_lossy() {
            Cow::Borrowed(_) => return current,
            Cow::Owned(decoded) => decoded,
        };
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_namespace_and_replaces_spaces() {
        assert_eq!(sanitize("File:Treble clef.svg"), "Treble_clef.svg");
    }

    #[test]
    fn keeps_titles_without_namespace() {
        assert_eq!(sanitize("Bass_clef.svg"), "Bass_clef.svg");
    }

    #[test]
    fn decodes_nested_escapes() {
        assert_eq!(sanitize("File:Quarter%2520note.svg"), "Quarter_note.svg");
    }

    #[test]
    fn encoded_slash_cannot_escape_directory() {
        assert_eq!(sanitize("File:a%2Fb.svg"), "a_b.svg");
    }

    #[test]
    fn dot_names_become_underscores() {
        assert_eq!(sanitize("File:.."), "__");
        assert_eq!(sanitize("File:"), "_");
    }
}
