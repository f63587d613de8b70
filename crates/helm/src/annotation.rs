//! Quoting helpers for the `"tag"` and `'repeat'` suffixes HELM hangs off of tokens

/// A token split into its body and any trailing `'repeat'` and `"tag"` suffixes
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Detached<'a> {
    pub body: &'a str,
    pub repeat: Option<&'a str>,
    /// Already unescaped
    pub tag: Option<String>,
}

#[must_use]
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\r' => escaped.push_str(r"\r"),
            '\n' => escaped.push_str(r"\n"),
            '\t' => escaped.push_str(r"\t"),
            '"' => escaped.push_str(r#"\""#),
            '\\' => escaped.push_str(r"\\"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The inverse of [`escape`]. Any other escaped character stands for itself.
#[must_use]
pub fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => unescaped.push('\r'),
            Some('n') => unescaped.push('\n'),
            Some('t') => unescaped.push('\t'),
            Some(c) => unescaped.push(c),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Wraps `text` in double quotes, escaping its contents
#[must_use]
pub fn quote(text: &str) -> String {
    format!("\"{}\"", escape(text))
}

/// Strips a trailing `"tag"` and then a trailing `'repeat'` from `token`, so `(A.G)'3'"note"` yields a body of
/// `(A.G)`, a repeat of `3`, and a tag of `note`
#[must_use]
pub fn detach(token: &str) -> Detached<'_> {
    let (rest, tag) = match suffix(token, '"') {
        Some((rest, tag)) => (rest, Some(unescape(tag))),
        None => (token, None),
    };
    let (body, repeat) = match suffix(rest, '\'') {
        Some((body, repeat)) => (body, Some(repeat)),
        None => (rest, None),
    };
    Detached { body, repeat, tag }
}

fn suffix(token: &str, delimiter: char) -> Option<(&str, &str)> {
    let bytes = token.as_bytes();
    let delimiter = u8::try_from(delimiter).ok()?;
    let close = token.len().checked_sub(1)?;
    if bytes[close] != delimiter || is_escaped(bytes, close) {
        return None;
    }
    let open = (0..close)
        .rev()
        .find(|&i| bytes[i] == delimiter && !is_escaped(bytes, i))?;
    // A token that's entirely quoted is a body, not a suffix
    if open == 0 {
        return None;
    }
    Some((&token[..open], &token[open + 1..close]))
}

fn is_escaped(bytes: &[u8], index: usize) -> bool {
    let backslashes = bytes[..index]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count();
    backslashes % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_round_trips() {
        let text = "line one\n\t\"quoted\" \\ back\r";
        let escaped = escape(text);
        assert_eq!(escaped, r#"line one\n\t\"quoted\" \\ back\r"#);
        assert_eq!(unescape(&escaped), text);
    }

    #[test]
    fn unknown_escapes_stand_for_themselves() {
        assert_eq!(unescape(r"\a\$\'"), "a$'");
        assert_eq!(unescape(r"dangling\"), r"dangling\");
    }

    #[test]
    fn quote_escapes_inner_quotes() {
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn detach_outer_tag_then_repeat() {
        assert_eq!(
            detach(r#"(A.G)'3'"note""#),
            Detached {
                body: "(A.G)",
                repeat: Some("3"),
                tag: Some("note".to_owned())
            }
        );
        assert_eq!(
            detach("A'2-5'"),
            Detached {
                body: "A",
                repeat: Some("2-5"),
                tag: None
            }
        );
        assert_eq!(
            detach(r#"[dF]"D-Phe""#),
            Detached {
                body: "[dF]",
                repeat: None,
                tag: Some("D-Phe".to_owned())
            }
        );
    }

    #[test]
    fn detach_respects_escaped_quotes() {
        let detached = detach(r#"A"a \"quoted\" word""#);
        assert_eq!(detached.body, "A");
        assert_eq!(detached.tag.as_deref(), Some(r#"a "quoted" word"#));

        let escaped_close = detach(r#"A"open\""#);
        assert_eq!(escaped_close.body, r#"A"open\""#);
        assert_eq!(escaped_close.tag, None);
    }

    #[test]
    fn leading_delimiters_are_not_suffixes() {
        assert_eq!(detach(r#""whole""#).body, r#""whole""#);
        assert_eq!(detach("'3'").repeat, None);
        assert_eq!(detach("").body, "");
        assert_eq!(detach("\"").tag, None);
    }
}
