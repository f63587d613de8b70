//! Splitting HELM on separators that aren't hidden inside brackets or quotes

use nom_miette::LabeledParseError;

use crate::{HelmErrorKind, errors::ParseResult};

/// Tracks `[...]`, `(...)`, and `{...}` nesting independently, plus whether we're inside a `"..."` annotation
#[derive(Copy, Clone, Default, Debug)]
struct Nesting {
    square: usize,
    round: usize,
    curly: usize,
    quoted: bool,
    escaped: bool,
}

/// What a single character did to the nesting
enum Step {
    Open,
    Close,
    /// A closer with no matching opener
    Unmatched,
    Other,
}

impl Nesting {
    const fn depth(&self) -> usize {
        self.square + self.round + self.curly
    }

    const fn is_top_level(&self) -> bool {
        self.depth() == 0 && !self.quoted
    }

    fn step(&mut self, c: char) -> Step {
        if self.quoted {
            match (self.escaped, c) {
                (true, _) => self.escaped = false,
                (false, '\\') => self.escaped = true,
                (false, '"') => {
                    self.quoted = false;
                    return Step::Close;
                }
                _ => (),
            }
            return Step::Other;
        }

        let counter = match c {
            '"' => {
                self.quoted = true;
                return Step::Open;
            }
            '[' | ']' => &mut self.square,
            '(' | ')' => &mut self.round,
            '{' | '}' => &mut self.curly,
            _ => return Step::Other,
        };
        if matches!(c, '[' | '(' | '{') {
            *counter += 1;
            Step::Open
        } else if let Some(decremented) = counter.checked_sub(1) {
            *counter = decremented;
            Step::Close
        } else {
            Step::Unmatched
        }
    }
}

/// Checks that every bracket and quote in `input` is closed, and that nothing nests deeper than `limit`
pub fn check_nesting(input: &str, limit: usize) -> ParseResult<'_, ()> {
    let mut nesting = Nesting::default();
    let mut openers: Vec<(usize, char)> = Vec::new();

    for (i, c) in input.char_indices() {
        let token = &input[i..i + c.len_utf8()];
        match nesting.step(c) {
            Step::Open => {
                openers.push((i, c));
                if nesting.depth() > limit {
                    return Err(LabeledParseError::spanning(
                        token,
                        HelmErrorKind::NestingTooDeep(limit),
                    ));
                }
            }
            Step::Close => {
                openers.pop();
            }
            Step::Unmatched => {
                return Err(LabeledParseError::spanning(
                    token,
                    HelmErrorKind::UnmatchedCloser(c),
                ));
            }
            Step::Other => (),
        }
    }

    // NOTE: Counters are independent, so `[(])` is balanced. Report the earliest opener still left open.
    if let Some(&(i, c)) = openers.first() {
        return Err(LabeledParseError::spanning(
            &input[i..i + c.len_utf8()],
            HelmErrorKind::UnclosedDelimiter(c),
        ));
    }
    Ok(())
}

/// Splits `token` on every top-level `separator`. Always returns at least one (possibly empty) piece.
pub fn split_top_level(token: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for i in top_level_indices(token, separator) {
        pieces.push(&token[start..i]);
        start = i + separator.len_utf8();
    }
    pieces.push(&token[start..]);
    pieces
}

/// Whether `separator` appears anywhere in `token` outside of brackets and quotes
pub fn contains_top_level(token: &str, separator: char) -> bool {
    top_level_indices(token, separator).next().is_some()
}

/// The index of the closer matching the opener at the start of `token`, if `token` starts with one
pub fn matching_close(token: &str) -> Option<usize> {
    let mut nesting = Nesting::default();
    for (i, c) in token.char_indices() {
        nesting.step(c);
        if nesting.is_top_level() {
            return (i > 0).then_some(i);
        }
    }
    None
}

fn top_level_indices(token: &str, separator: char) -> impl Iterator<Item = usize> + '_ {
    let mut nesting = Nesting::default();
    token.char_indices().filter_map(move |(i, c)| {
        let at_top = nesting.is_top_level();
        nesting.step(c);
        (at_top && c == separator).then_some(i)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    #[test]
    fn split_ignores_nested_separators() {
        assert_eq!(
            split_top_level("PEPTIDE1{A.G}|CHEM1{[a|b]}", '|'),
            ["PEPTIDE1{A.G}", "CHEM1{[a|b]}"]
        );
        assert_eq!(split_top_level("A.(D.F)'3'.A", '.'), ["A", "(D.F)'3'", "A"]);
        assert_eq!(
            split_top_level(r#"A"x.y".G"#, '.'),
            [r#"A"x.y""#, "G"]
        );
        assert_eq!(
            split_top_level(r#"A"a \". b".G"#, '.'),
            [r#"A"a \". b""#, "G"]
        );
        assert_eq!(split_top_level("", '.'), [""]);
        assert_eq!(split_top_level("A..G", '.'), ["A", "", "G"]);
    }

    #[test]
    fn sections_split_on_dollars() {
        let sections = split_top_level(r#"PEPTIDE1{A}"$1"$$$$"#, '$');
        assert_eq!(sections, [r#"PEPTIDE1{A}"$1""#, "", "", "", ""]);
    }

    #[test]
    fn top_level_containment() {
        assert!(contains_top_level("A,G", ','));
        assert!(!contains_top_level("(A,G)", ','));
        assert!(!contains_top_level(r#""A,G""#, ','));
    }

    #[test]
    fn find_matching_closers() {
        assert_eq!(matching_close("(A.(G))'3'"), Some(6));
        assert_eq!(matching_close("[dF]"), Some(3));
        assert_eq!(matching_close("A(G)"), None);
        assert_eq!(matching_close("(A"), None);
    }

    #[test]
    fn balanced_nesting() {
        assert_eq!(check_nesting("PEPTIDE1{A.[dF].(A,G)}$$$$", 64), Ok(()));
        assert_eq!(check_nesting(r#"PEPTIDE1{A"}"}"#, 64), Ok(()));
        assert_eq!(check_nesting("", 64), Ok(()));
    }

    #[test]
    fn unbalanced_nesting() {
        let input = "PEPTIDE1{A.A.A";
        let error = check_nesting(input, 64).unwrap_err().finalize(input);
        assert_eq!(
            error.kind(),
            Some(&HelmErrorKind::UnclosedDelimiter('{'))
        );
        assert_eq!(
            error.kind().map(HelmErrorKind::category),
            Some(ErrorCategory::MalformedNotation)
        );
        assert_eq!(error.spans().next(), Some((8..9).into()));

        let input = "PEPTIDE1{A]}";
        let error = check_nesting(input, 64).unwrap_err().finalize(input);
        assert_eq!(error.kind(), Some(&HelmErrorKind::UnmatchedCloser(']')));
        assert_eq!(error.spans().next(), Some((10..11).into()));

        let input = r#"PEPTIDE1{A}"open"#;
        let error = check_nesting(input, 64).unwrap_err().finalize(input);
        assert_eq!(error.kind(), Some(&HelmErrorKind::UnclosedDelimiter('"')));
    }

    #[test]
    fn nesting_limit() {
        let input = "((((A))))";
        assert!(check_nesting(input, 4).is_ok());
        let error = check_nesting(input, 3).unwrap_err().finalize(input);
        assert_eq!(error.kind(), Some(&HelmErrorKind::NestingTooDeep(3)));
        assert_eq!(error.spans().next(), Some((3..4).into()));
    }
}
