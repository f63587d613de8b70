use std::fmt;

use miette::Diagnostic;
use nom::error::ErrorKind;
use nom_miette::{LabeledError, LabeledErrorKind, LabeledParseError};
use thiserror::Error;

use crate::{Attachment, Biotype, Repeat};

pub type Result<T, E = HelmError> = std::result::Result<T, E>;

/// The four ways a HELM codec operation can fail
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCategory {
    MalformedNotation,
    UnknownMonomer,
    InvalidConnection,
    AdjacencyViolation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedNotation => "malformed notation",
            Self::UnknownMonomer => "unknown monomer",
            Self::InvalidConnection => "invalid connection",
            Self::AdjacencyViolation => "adjacency violation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Diagnostic, Error)]
pub enum HelmError {
    /// Failures while reading notation, labeled with spans into the input
    #[error(transparent)]
    #[diagnostic(transparent)]
    Notation(#[from] LabeledError<HelmErrorKind>),

    /// Failures while editing or serializing a graph, which have no source text to point into
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] HelmErrorKind),
}

impl HelmError {
    #[must_use]
    pub fn kind(&self) -> Option<&HelmErrorKind> {
        match self {
            Self::Notation(e) => e.kind(),
            Self::Graph(kind) => Some(kind),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.kind()
            .map_or(ErrorCategory::MalformedNotation, HelmErrorKind::category)
    }
}

pub(crate) type ParseResult<'a, T> = std::result::Result<T, LabeledParseError<'a, HelmErrorKind>>;

#[derive(Clone, Eq, PartialEq, Debug, Diagnostic, Error)]
pub enum HelmErrorKind {
    // Malformed notation ----------------------------------------------------------------------------------------------
    #[error("found a closing {0:?} with no matching opener")]
    #[diagnostic(help("check that every bracket, brace, and parenthesis is balanced"))]
    UnmatchedCloser(char),

    #[error("the {0:?} opened here is never closed")]
    #[diagnostic(help("check that every bracket, brace, parenthesis, and quote is balanced"))]
    UnclosedDelimiter(char),

    #[error("notation is nested more than {0} levels deep")]
    NestingTooDeep(usize),

    #[error("HELM notation has at most five `$`-separated sections, but {0} were found")]
    TooManySections(usize),

    #[error("expected a polymer id like PEPTIDE1, RNA2, CHEM1, or BLOB1")]
    ExpectedPolymerId,

    #[error("expected a chain or group id like PEPTIDE1 or G1")]
    ExpectedReference,

    #[error("expected a `{{...}}`-wrapped list of monomers")]
    ExpectedChainBody,

    #[error("expected a monomer")]
    ExpectedMonomer,

    #[error("the polymer {0} has already been defined")]
    #[diagnostic(help("every chain in the sequence section needs a distinct id"))]
    DuplicateChain(String),

    #[error("expected a connection like PEPTIDE1,CHEM1,3:R3-1:R1")]
    ExpectedConnection,

    #[error("expected a group like G1(PEPTIDE1+RNA1)")]
    ExpectedGroup,

    #[error("the group {0} has already been declared")]
    DuplicateGroup(String),

    #[error("a group cannot mix `+` and `,` between its members")]
    #[diagnostic(help("use `+` for an AND-group or `,` for an OR-group, but not both"))]
    MixedGroupLogic,

    #[error("the group {0} contains itself")]
    CyclicGroup(String),

    #[error("{member} already belongs to {group}")]
    #[diagnostic(help("a chain or group can only be a member of one enclosing group"))]
    AlreadyGrouped { member: String, group: String },

    #[error("the group {0} is connected to, but is nested inside another connected group")]
    NestedConnectedGroup(String),

    #[error("expected a repeat count like '3' or a range like '2-5'")]
    ExpectedRepeat,

    #[error("a repeat of {count} copies is over the limit of {limit}")]
    RepeatTooLarge { count: usize, limit: usize },

    #[error("a '{repeat}' repeat cannot be built from {copies} copies")]
    RepeatMismatch { repeat: Repeat, copies: usize },

    #[error("expected a version like V2.0")]
    ExpectedVersion,

    #[error("the annotation section is not valid HELM2 JSON: {0}")]
    InvalidAnnotation(String),

    #[error("expected an XHELM document with a <HelmNotation> element")]
    ExpectedXHelm,

    #[error("could not tell whether this is HELM notation, an RNA sequence, or a peptide sequence")]
    #[diagnostic(help("plain sequences use one-letter codes, optionally ending with `>` to close a ring"))]
    UnknownFormat,

    #[error("unexpected end of input")]
    Incomplete,

    #[error(transparent)]
    #[diagnostic(transparent)]
    NomError(#[from] NomErrorKind),

    // Unknown monomers ------------------------------------------------------------------------------------------------
    #[error("no {biotype} monomer with the symbol {symbol:?} could be found")]
    #[diagnostic(help(
        "double-check for typos, wrap multi-letter symbols in [...], or add the monomer to the library"
    ))]
    UnknownMonomer { biotype: Biotype, symbol: String },

    // Invalid connections ---------------------------------------------------------------------------------------------
    #[error("no chain or group named {0} has been defined")]
    UnknownChain(String),

    #[error("{chain} has no monomer at position {position}")]
    UnknownPosition { chain: String, position: usize },

    #[error("the monomer {symbol:?} has no {attachment} attachment point")]
    UndefinedAttachment {
        symbol: String,
        attachment: Attachment,
    },

    #[error("the {attachment} attachment point of {node} is already bonded")]
    OccupiedAttachment { node: String, attachment: Attachment },

    #[error("a monomer cannot be bonded to itself")]
    SelfBond,

    #[error("base pairs can only be formed between RNA chains")]
    PairOutsideRna,

    #[error("the group {0} is referenced, but never declared")]
    #[diagnostic(help("add a declaration like {0}(PEPTIDE1+RNA1) to the group section"))]
    UndeclaredGroup(String),

    #[error("the graph has no node {0}")]
    MissingNode(String),

    #[error("the graph has no group {0}")]
    MissingGroup(String),

    #[error("{0} is not a collapsed group")]
    NotCollapsed(String),

    #[error("a bond is attached directly to the collapsed group {0}, so it cannot be expanded")]
    PortlessBond(String),

    #[error("{0} is not part of any chain")]
    DanglingBond(String),

    // Adjacency violations --------------------------------------------------------------------------------------------
    #[error("a base can only be attached to a sugar, not to {0:?}")]
    #[diagnostic(help("in RNA, bases follow sugars: R(A)P rather than P(A)"))]
    BaseWithoutSugar(String),

    #[error("a base can only bond through a sugar's R3 and its own R1")]
    IllegalBaseBond,

    #[error("the base {0:?} is not attached to any sugar")]
    OrphanBase(String),
}

impl HelmErrorKind {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownMonomer { .. } => ErrorCategory::UnknownMonomer,
            Self::UnknownChain(_)
            | Self::UnknownPosition { .. }
            | Self::UndefinedAttachment { .. }
            | Self::OccupiedAttachment { .. }
            | Self::SelfBond
            | Self::PairOutsideRna
            | Self::UndeclaredGroup(_)
            | Self::MissingNode(_)
            | Self::MissingGroup(_)
            | Self::NotCollapsed(_)
            | Self::PortlessBond(_)
            | Self::DanglingBond(_) => ErrorCategory::InvalidConnection,
            Self::BaseWithoutSugar(_) | Self::IllegalBaseBond | Self::OrphanBase(_) => {
                ErrorCategory::AdjacencyViolation
            }
            Self::UnmatchedCloser(_)
            | Self::UnclosedDelimiter(_)
            | Self::NestingTooDeep(_)
            | Self::TooManySections(_)
            | Self::ExpectedPolymerId
            | Self::ExpectedReference
            | Self::ExpectedChainBody
            | Self::ExpectedMonomer
            | Self::DuplicateChain(_)
            | Self::ExpectedConnection
            | Self::ExpectedGroup
            | Self::DuplicateGroup(_)
            | Self::MixedGroupLogic
            | Self::CyclicGroup(_)
            | Self::AlreadyGrouped { .. }
            | Self::NestedConnectedGroup(_)
            | Self::ExpectedRepeat
            | Self::RepeatTooLarge { .. }
            | Self::RepeatMismatch { .. }
            | Self::ExpectedVersion
            | Self::InvalidAnnotation(_)
            | Self::ExpectedXHelm
            | Self::UnknownFormat
            | Self::Incomplete
            | Self::NomError(_) => ErrorCategory::MalformedNotation,
        }
    }
}

impl LabeledErrorKind for HelmErrorKind {
    fn label(&self) -> Option<&'static str> {
        Some(match self {
            Self::UnmatchedCloser(_) => "unmatched closer",
            Self::UnclosedDelimiter(_) => "never closed",
            Self::NestingTooDeep(_) => "nested too deeply",
            Self::TooManySections(_) => "extra section",
            Self::ExpectedPolymerId => "expected polymer id",
            Self::ExpectedReference => "expected chain or group id",
            Self::ExpectedChainBody => "expected {...}",
            Self::ExpectedMonomer => "expected monomer",
            Self::DuplicateChain(_) => "duplicate chain",
            Self::ExpectedConnection => "expected connection",
            Self::ExpectedGroup => "expected group",
            Self::DuplicateGroup(_) => "duplicate group",
            Self::MixedGroupLogic => "mixed group logic",
            Self::CyclicGroup(_) => "cyclic group",
            Self::AlreadyGrouped { .. } => "already grouped",
            Self::NestedConnectedGroup(_) => "nested connected group",
            Self::ExpectedRepeat => "expected repeat",
            Self::RepeatTooLarge { .. } => "repeated too many times",
            Self::ExpectedVersion => "expected version",
            Self::InvalidAnnotation(_) => "invalid annotation",
            Self::ExpectedXHelm => "expected XHELM",
            Self::UnknownFormat => "unknown format",
            Self::UnknownMonomer { .. } => "unknown monomer",
            Self::UnknownChain(_) => "unknown chain",
            Self::UnknownPosition { .. } => "unknown position",
            Self::UndefinedAttachment { .. } => "undefined attachment point",
            Self::OccupiedAttachment { .. } => "attachment point in use",
            Self::SelfBond => "self bond",
            Self::PairOutsideRna => "pair outside RNA",
            Self::UndeclaredGroup(_) => "undeclared group",
            Self::BaseWithoutSugar(_) => "base without sugar",
            Self::IllegalBaseBond => "illegal base bond",
            _ => return None,
        })
    }
}

// NOTE: This wrapper lets `nom`'s own error kinds live inside `HelmErrorKind` while still deriving `Diagnostic`
#[derive(Clone, Eq, PartialEq, Debug, Diagnostic, Error)]
#[error("the parser failed internally with {0:?}")]
pub struct NomErrorKind(ErrorKind);

impl From<ErrorKind> for HelmErrorKind {
    fn from(value: ErrorKind) -> Self {
        if value == ErrorKind::Eof {
            Self::Incomplete
        } else {
            Self::NomError(NomErrorKind(value))
        }
    }
}
