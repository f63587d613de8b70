//! Labeled `nom` errors that render as `miette` diagnostics pointing back into the parsed input

use std::fmt;

use ahash::{HashMap, HashMapExt};
use miette::{Diagnostic, LabeledSpan, SourceSpan};
use nom::{
    Finish, IResult, Parser,
    combinator::{all_consuming, complete},
    error::ParseError,
};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{error}")]
pub struct LabeledError<E: LabeledErrorKind> {
    full_input: String,
    labels: Vec<LabeledSpan>,
    error: ErrorTree<E>,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ErrorTree<E: LabeledErrorKind> {
    #[error("{kind}")]
    Node {
        kind: E,
        #[source]
        source: Option<Box<LabeledError<E>>>,
    },
    #[error("attempted {} parse branches unsuccessfully", .0.len())]
    Branch(Vec<LabeledError<E>>),
}

impl<E: LabeledErrorKind> Diagnostic for LabeledError<E> {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.full_input)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        if let ErrorTree::Node { kind, .. } = &self.error {
            kind.help()
        } else {
            None
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(self.labels.iter().cloned()))
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        if let ErrorTree::Branch(related) = &self.error {
            Some(Box::new(related.iter().map(|e| e as &dyn Diagnostic)))
        } else {
            None
        }
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        if let ErrorTree::Node { source, .. } = &self.error {
            source.as_ref().map(|e| &**e as &dyn Diagnostic)
        } else {
            None
        }
    }
}

impl<E: LabeledErrorKind> LabeledError<E> {
    /// The outermost kind of this error: the node's own kind, or that of the first branch attempted
    #[must_use]
    pub fn kind(&self) -> Option<&E> {
        self.kinds().next()
    }

    /// Every kind in this error, outermost first
    pub fn kinds(&self) -> Box<dyn Iterator<Item = &E> + '_> {
        match &self.error {
            ErrorTree::Node { kind, source } => Box::new(
                std::iter::once(kind).chain(source.iter().flat_map(|source| source.kinds())),
            ),
            ErrorTree::Branch(alternatives) => {
                Box::new(alternatives.iter().flat_map(|alternative| alternative.kinds()))
            }
        }
    }

    /// The spans (byte ranges into the original input) that this error points at
    pub fn spans(&self) -> impl Iterator<Item = SourceSpan> + '_ {
        self.labels.iter().map(|label| *label.inner())
    }

    fn bubble_labels(&mut self) {
        if self.labels.is_empty() {
            match &mut self.error {
                ErrorTree::Node {
                    source: Some(child),
                    ..
                } => {
                    child.bubble_labels();
                    self.labels = child.labels.drain(..).collect();
                }
                ErrorTree::Branch(alternatives) => {
                    let new_labels = alternatives.iter_mut().flat_map(|child| {
                        child.bubble_labels();
                        child.labels.drain(..)
                    });
                    self.labels = Self::merge_labels(new_labels);
                }
                ErrorTree::Node { .. } => (),
            }
        }
    }

    // NOTE: Labels pointing at the same span are joined with "or"; labels on different spans are kept apart
    fn merge_labels(labels: impl Iterator<Item = LabeledSpan>) -> Vec<LabeledSpan> {
        let mut span_order = Vec::new();
        let mut span_map: HashMap<SourceSpan, Vec<String>> = HashMap::new();
        for labeled_span in labels {
            let span = *labeled_span.inner();
            let Some(label) = labeled_span.label() else {
                continue;
            };
            span_map
                .entry(span)
                .or_insert_with(|| {
                    span_order.push(span);
                    Vec::new()
                })
                .push(label.to_owned());
        }
        span_order
            .into_iter()
            .filter_map(|span| {
                let labels = span_map.remove(&span)?;
                Some(LabeledSpan::new_with_span(Some(labels.join(" or ")), span))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LabeledParseError<'a, E> {
    input: &'a str,
    length: usize,
    kind: E,
    alternatives: Vec<LabeledParseError<'a, E>>,
    source: Option<Box<LabeledParseError<'a, E>>>,
}

pub trait LabeledErrorKind: Diagnostic + Clone + Eq + From<nom::error::ErrorKind> {
    fn label(&self) -> Option<&'static str> {
        None
    }
}

impl<'a, E: LabeledErrorKind> LabeledParseError<'a, E> {
    /// An error pointing at the start of `input`
    pub fn new(input: &'a str, kind: E) -> Self {
        Self::new_with_source(input, kind, None)
    }

    pub fn new_with_source(
        input: &'a str,
        kind: E,
        source: Option<LabeledParseError<'a, E>>,
    ) -> Self {
        Self {
            input,
            length: 0,
            kind,
            alternatives: Vec::new(),
            source: source.map(Box::new),
        }
    }

    /// An error spanning the whole of `token` (which must be a sub-slice of the eventual full input)
    pub fn spanning(token: &'a str, kind: E) -> Self {
        Self {
            length: token.len(),
            ..Self::new(token, kind)
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &E {
        &self.kind
    }

    /// Converts this error into an owned diagnostic, resolving every span against `full_input`. Every `input` slice
    /// held by this error (or its sources and alternatives) must point into `full_input`.
    #[must_use]
    pub fn finalize(self, full_input: &str) -> LabeledError<E> {
        let mut error = self.into_final_error(full_input);
        error.bubble_labels();
        error
    }

    fn into_final_error(self, full_input: &str) -> LabeledError<E> {
        let span = self.span_from_input(full_input);
        // NOTE: The additional space is added so that Diagnostic labels can point to the end of an input
        let padded_input = format!("{full_input} ");
        let Self {
            input,
            length,
            kind,
            alternatives,
            source,
        } = self;

        if alternatives.is_empty() {
            let labels = kind
                .label()
                .map(|label| LabeledSpan::new_with_span(Some(label.to_owned()), span))
                .into_iter()
                .collect();
            let source = source.map(|e| Box::new(e.into_final_error(full_input)));
            LabeledError {
                full_input: padded_input,
                labels,
                error: ErrorTree::Node { kind, source },
            }
        } else {
            let head = Self {
                input,
                length,
                kind,
                alternatives: Vec::new(),
                source,
            };
            let branches = std::iter::once(head)
                .chain(alternatives)
                .map(|e| e.into_final_error(full_input))
                .collect();
            LabeledError {
                full_input: padded_input,
                labels: Vec::new(),
                error: ErrorTree::Branch(branches),
            }
        }
    }

    fn span_from_input(&self, full_input: &str) -> SourceSpan {
        let base_addr = full_input.as_ptr() as usize;
        let substr_addr = self.input.as_ptr() as usize;
        // NOTE: Inputs that don't point into `full_input` (they should never exist) get clamped to its bounds
        // rather than producing a nonsense span
        let start = substr_addr
            .checked_sub(base_addr)
            .filter(|&start| start <= full_input.len())
            .unwrap_or(full_input.len());
        let length = self.length.min(full_input.len() - start);
        SourceSpan::from(start..start + length)
    }
}

/// Runs `parser` over the whole of a token, returning the still-unfinalized error on failure. Used when the token is
/// a slice of some larger input that errors will eventually be reported against.
pub fn complete_parser<'a, O, P, E>(
    parser: P,
) -> impl FnMut(&'a str) -> Result<O, LabeledParseError<'a, E>>
where
    E: LabeledErrorKind,
    P: Parser<&'a str, O, LabeledParseError<'a, E>>,
{
    let mut parser = all_consuming(complete(parser));
    move |input| parser.parse(input).finish().map(|(_, o)| o)
}

/// Wraps any error from `parser` in a new error of `kind`, keeping the original as its source
pub fn wrap_err<'a, O, P, E>(
    mut parser: P,
    kind: E,
) -> impl FnMut(&'a str) -> IResult<&'a str, O, LabeledParseError<'a, E>>
where
    E: LabeledErrorKind,
    P: Parser<&'a str, O, LabeledParseError<'a, E>>,
{
    move |i| {
        parser
            .parse(i)
            .map_err(|e| e.map(|e| LabeledParseError::new_with_source(i, kind.clone(), Some(e))))
    }
}

/// Replaces any error from `parser` with a fresh error of `kind`
pub fn expect<'a, O, P, E>(
    mut parser: P,
    kind: E,
) -> impl FnMut(&'a str) -> IResult<&'a str, O, LabeledParseError<'a, E>>
where
    E: LabeledErrorKind,
    P: Parser<&'a str, O, LabeledParseError<'a, E>>,
{
    move |i| {
        parser
            .parse(i)
            .map_err(|e| e.map(|_| LabeledParseError::new(i, kind.clone())))
    }
}

impl<'a, E: LabeledErrorKind> ParseError<&'a str> for LabeledParseError<'a, E> {
    fn from_error_kind(input: &'a str, kind: nom::error::ErrorKind) -> Self {
        Self::new(input, kind.into())
    }

    fn append(_input: &str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }

    fn or(self, other: Self) -> Self {
        let mut alternatives = self.alternatives;
        alternatives.push(other);
        Self {
            alternatives,
            ..self
        }
    }
}
