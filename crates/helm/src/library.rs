//! Monomer definitions, and the KDL-backed library that parsing resolves symbols against

use std::collections::hash_map::Entry;

use ahash::{HashMap, HashMapExt};
use knus::{Decode, span::Span};
use miette::{Diagnostic, LabeledSpan, NamedSource, Result};
use serde::Serialize;
use static_assertions::assert_impl_all;
use thiserror::Error;

use crate::{Attachment, Biotype};

// Public API ==========================================================================================================

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct MonomerDefinition {
    pub symbol: String,
    pub name: String,
    pub biotype: Biotype,
    pub natural_analog: Option<String>,
    /// Sorted, with no duplicates
    pub attachments: Vec<Attachment>,
    pub smiles: Option<String>,
}

impl MonomerDefinition {
    #[must_use]
    pub fn has_attachment(&self, attachment: Attachment) -> bool {
        self.attachments.binary_search(&attachment).is_ok()
    }
}

/// Read-only monomer lookup. Implementations must be safe to share between threads parsing independent graphs.
pub trait MonomerStore {
    fn lookup(&self, biotype: Biotype, symbol: &str) -> Option<&MonomerDefinition>;

    fn default_monomer(&self, biotype: Biotype) -> Option<&str>;

    /// Wildcards (`*` and `?`) and parenthesized mixtures of known monomers, like `(A,G)` or `(A:1+G:2.5)`
    fn is_ambiguous(&self, symbol: &str, biotype: Biotype) -> bool {
        if matches!(symbol, "*" | "?") {
            return true;
        }
        let Some(inner) = symbol.strip_prefix('(').and_then(|s| s.strip_suffix(')')) else {
            return false;
        };
        let separator = match (inner.contains(','), inner.contains('+')) {
            (true, false) => ',',
            (false, true) => '+',
            _ => return false,
        };
        inner.split(separator).all(|alternative| {
            let (code, ratio) = alternative
                .split_once(':')
                .map_or((alternative, None), |(code, ratio)| (code, Some(ratio)));
            let code = unbracket(code);
            ratio.is_none_or(is_ratio)
                && (matches!(code, "*" | "?") || self.lookup(biotype, code).is_some())
        })
    }
}

/// Strips the `[...]` that HELM wraps around multi-character symbols
#[must_use]
pub fn unbracket(symbol: &str) -> &str {
    let Some(inner) = symbol.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return symbol;
    };
    // `[*:1]CC[*:2]` starts and ends with brackets, but they aren't a pair
    let mut depth = 0_usize;
    for c in inner.chars() {
        match c {
            '[' => depth += 1,
            ']' => match depth.checked_sub(1) {
                Some(decremented) => depth = decremented,
                None => return symbol,
            },
            _ => (),
        }
    }
    inner
}

pub(crate) fn is_ratio(ratio: &str) -> bool {
    !ratio.is_empty()
        && ratio.chars().all(|c| c.is_ascii_digit() || c == '.')
        && ratio.chars().filter(|&c| c == '.').count() <= 1
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MonomerLibrary {
    monomers: HashMap<Biotype, HashMap<String, MonomerDefinition>>,
    defaults: HashMap<Biotype, String>,
}

impl MonomerLibrary {
    /// The KDL source of the library built into this crate
    pub const EMBEDDED: &str = include_str!("../data/monomer_library.kdl");

    pub fn new(file_name: impl AsRef<str>, kdl_text: impl AsRef<str>) -> Result<Self> {
        let parsed_library: MonomerLibraryKdl =
            knus::parse(file_name.as_ref(), kdl_text.as_ref())?;
        parsed_library
            .validate(())
            .map_err(|e| e.finalize(file_name, kdl_text).into())
    }

    pub fn embedded() -> Result<Self> {
        Self::new("monomer_library.kdl", Self::EMBEDDED)
    }

    pub fn monomers(&self) -> impl Iterator<Item = &MonomerDefinition> {
        self.monomers.values().flat_map(HashMap::values)
    }
}

impl MonomerStore for MonomerLibrary {
    fn lookup(&self, biotype: Biotype, symbol: &str) -> Option<&MonomerDefinition> {
        self.monomers.get(&biotype)?.get(symbol)
    }

    fn default_monomer(&self, biotype: Biotype) -> Option<&str> {
        self.defaults.get(&biotype).map(String::as_str)
    }
}

// Parsing threads share one library
assert_impl_all!(MonomerLibrary: Send, Sync);

// KDL File Schema =====================================================================================================

#[derive(Debug, Decode)]
#[knus(span_type=Span)]
struct MonomerLibraryKdl {
    #[knus(child, unwrap(children))]
    types: Vec<MonomerTypeKdl>,
    #[knus(children)]
    monomers: Vec<MonomerKdl>,
}

#[derive(Debug, Decode)]
#[knus(span_type=Span)]
struct MonomerTypeKdl {
    #[knus(span)]
    span: Span,
    #[knus(node_name)]
    name: String,
    #[knus(children(name = "attachment"))]
    attachments: Vec<AttachmentKdl>,
}

#[derive(Debug, Decode)]
#[knus(span_type=Span)]
struct MonomerKdl {
    #[knus(span)]
    span: Span,
    #[knus(node_name)]
    biotype: String,
    #[knus(argument)]
    symbol: String,
    #[knus(argument)]
    name: String,
    #[knus(property(name = "natural"))]
    natural_analog: Option<String>,
    #[knus(property(name = "default"), default)]
    default: bool,
    #[knus(child, unwrap(argument))]
    smiles: Option<String>,
    #[knus(children(name = "attachment"))]
    attachments: Vec<AttachmentKdl>,
}

#[derive(Clone, Debug, Decode)]
#[knus(span_type=Span)]
struct AttachmentKdl {
    #[knus(span)]
    span: Span,
    #[knus(argument)]
    name: String,
}

// Contextual Validation Trait =========================================================================================

type LibraryResult<T> = std::result::Result<T, LibraryErrorKind>;

trait ValidateInto<'c, T> {
    type Context: 'c;

    fn validate(self, ctx: Self::Context) -> LibraryResult<T>;
}

// Monomer Library Validation ==========================================================================================

impl ValidateInto<'_, MonomerLibrary> for MonomerLibraryKdl {
    type Context = ();

    fn validate(self, _ctx: Self::Context) -> LibraryResult<MonomerLibrary> {
        let types = self.types.validate(())?;

        let mut monomers: HashMap<Biotype, HashMap<String, (Span, MonomerDefinition)>> =
            HashMap::new();
        let mut defaults: HashMap<Biotype, (Span, String)> = HashMap::new();

        for monomer in self.monomers {
            let (span, is_default) = (monomer.span, monomer.default);
            let definition = monomer.validate(&types)?;

            if is_default {
                match defaults.entry(definition.biotype) {
                    Entry::Occupied(e) => {
                        return Err(LibraryErrorKind::MultipleDefaults(
                            e.get().0,
                            span,
                            definition.biotype,
                        ));
                    }
                    Entry::Vacant(e) => e.insert((span, definition.symbol.clone())),
                };
            }

            match monomers
                .entry(definition.biotype)
                .or_default()
                .entry(definition.symbol.clone())
            {
                Entry::Occupied(e) => {
                    return Err(LibraryErrorKind::DuplicateMonomer(
                        e.get().0,
                        span,
                        definition.biotype,
                        definition.symbol,
                    ));
                }
                Entry::Vacant(e) => e.insert((span, definition)),
            };
        }

        Ok(MonomerLibrary {
            monomers: monomers
                .into_iter()
                .map(|(biotype, symbols)| {
                    let symbols = symbols.into_iter().map(|(s, (_, d))| (s, d)).collect();
                    (biotype, symbols)
                })
                .collect(),
            defaults: defaults
                .into_iter()
                .map(|(biotype, (_, symbol))| (biotype, symbol))
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------------------------------------------------

type MonomerTypes = HashMap<Biotype, Vec<AttachmentKdl>>;

// NOTE: The Context = () means this is essentially a TryInto implementation, which the orphan rules forbid for Vec<_>
impl ValidateInto<'_, MonomerTypes> for Vec<MonomerTypeKdl> {
    type Context = ();

    fn validate(self, _ctx: Self::Context) -> LibraryResult<MonomerTypes> {
        let mut seen_types = HashMap::new();

        for monomer_type in self {
            let biotype = monomer_type.name.parse().map_err(|()| {
                LibraryErrorKind::InvalidType(monomer_type.span, monomer_type.name.clone())
            })?;
            match seen_types.entry(biotype) {
                Entry::Occupied(e) => {
                    let (first_defined_at, _) = e.get();
                    return Err(LibraryErrorKind::DuplicateType(
                        *first_defined_at,
                        monomer_type.span,
                        monomer_type.name,
                    ));
                }
                Entry::Vacant(e) => e.insert((monomer_type.span, monomer_type.attachments)),
            };
        }

        Ok(seen_types
            .into_iter()
            .map(|(biotype, (_, attachments))| (biotype, attachments))
            .collect())
    }
}

impl<'t> ValidateInto<'t, MonomerDefinition> for MonomerKdl {
    type Context = &'t MonomerTypes;

    fn validate(self, ctx: Self::Context) -> LibraryResult<MonomerDefinition> {
        let undefined_type = || LibraryErrorKind::UndefinedType(self.span, self.biotype.clone());
        let biotype: Biotype = self.biotype.parse().map_err(|()| undefined_type())?;
        let attachments_from_type = ctx.get(&biotype).ok_or_else(undefined_type)?;

        let mut seen_attachments = HashMap::new();
        for attachment_kdl in attachments_from_type.iter().chain(&self.attachments) {
            let attachment = attachment_kdl.validate(())?;
            match seen_attachments.entry(attachment) {
                Entry::Occupied(e) => {
                    return Err(LibraryErrorKind::DuplicateAttachment(
                        *e.get(),
                        attachment_kdl.span,
                        attachment,
                    ));
                }
                Entry::Vacant(e) => e.insert(attachment_kdl.span),
            };
        }
        let mut attachments: Vec<_> = seen_attachments.into_keys().collect();
        attachments.sort_unstable();

        Ok(MonomerDefinition {
            symbol: self.symbol,
            name: self.name,
            biotype,
            natural_analog: self.natural_analog,
            attachments,
            smiles: self.smiles,
        })
    }
}

impl ValidateInto<'_, Attachment> for &AttachmentKdl {
    type Context = ();

    fn validate(self, _ctx: Self::Context) -> LibraryResult<Attachment> {
        self.name
            .parse()
            .ok()
            .filter(|a: &Attachment| a.is_numbered())
            .ok_or_else(|| LibraryErrorKind::InvalidAttachment(self.span, self.name.clone()))
    }
}

// Validation Error Types and Trait Implementations ====================================================================

#[derive(Debug, Error)]
#[error("failed to validate monomer library file")]
struct LibraryError {
    kdl: NamedSource<String>,
    #[source]
    kind: LibraryErrorKind,
}

// NOTE: This is manually implemented because the list of labels is dynamic and needs to be extracted from `self.kind`
impl Diagnostic for LibraryError {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.kdl)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(self.kind.labels().into_iter().map(|(s, l)| {
            LabeledSpan::new_with_span(Some(l.to_owned()), *s)
        })))
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        Some(&self.kind)
    }
}

#[derive(Clone, Debug, Diagnostic, Error)]
enum LibraryErrorKind {
    #[error("the monomer type {2:?} has already been defined")]
    #[diagnostic(help("consider consolidating duplicate types"))]
    DuplicateType(Span, Span, String),

    #[error("{1:?} is not a kind of monomer")]
    #[diagnostic(help(
        "monomer types are one of Sugar, Linker, Base, AminoAcid, Chem, Blob, or Nucleotide"
    ))]
    InvalidType(Span, String),

    #[error("the monomer type {1:?} is undefined")]
    #[diagnostic(help("double-check for typos, or add {1:?} to the types section"))]
    UndefinedType(Span, String),

    #[error("the attachment point {1:?} is invalid")]
    #[diagnostic(help("attachment points are numbered from R1 upwards"))]
    InvalidAttachment(Span, String),

    #[error("the attachment point {2} has already been defined")]
    #[diagnostic(help("double-check for typos, or remove the duplicate attachment point"))]
    DuplicateAttachment(Span, Span, Attachment),

    #[error("the {2} monomer {3:?} has already been defined")]
    DuplicateMonomer(Span, Span, Biotype, String),

    #[error("more than one {2} monomer has been marked as the default")]
    #[diagnostic(help("remove `default=true` from all but one of them"))]
    MultipleDefaults(Span, Span, Biotype),
}

impl LibraryErrorKind {
    fn labels(&self) -> Vec<(&Span, &'static str)> {
        match self {
            Self::DuplicateType(s1, s2, _)
            | Self::DuplicateAttachment(s1, s2, _)
            | Self::DuplicateMonomer(s1, s2, _, _)
            | Self::MultipleDefaults(s1, s2, _) => {
                vec![(s1, "first defined here"), (s2, "then again here")]
            }
            Self::InvalidType(s, _) => vec![(s, "invalid monomer type")],
            Self::UndefinedType(s, _) => vec![(s, "undefined monomer type")],
            Self::InvalidAttachment(s, _) => vec![(s, "invalid attachment point")],
        }
    }

    fn finalize(self, file_name: impl AsRef<str>, kdl: impl AsRef<str>) -> LibraryError {
        let kdl = NamedSource::new(file_name, kdl.as_ref().to_owned());
        LibraryError { kdl, kind: self }
    }
}

// Module Tests ========================================================================================================

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_ron_snapshot;

    use crate::testing_tools::{LIBRARY, assert_miette_labels};

    use super::*;

    fn parse_library(kdl: &str) -> std::result::Result<MonomerLibrary, LibraryError> {
        let library: MonomerLibraryKdl = knus::parse("test", kdl).unwrap();
        library.validate(()).map_err(|e| e.finalize("test", kdl))
    }

    #[test]
    fn embedded_library_is_valid() {
        assert_eq!(LIBRARY.monomers().count(), 42);
        assert!(MonomerLibrary::embedded().is_ok());
    }

    #[test]
    fn lookup_is_per_biotype() {
        let arginine = LIBRARY.lookup(Biotype::AminoAcid, "R").unwrap();
        assert_eq!(arginine.name, "Arginine");
        let ribose = LIBRARY.lookup(Biotype::Sugar, "R").unwrap();
        assert_eq!(ribose.name, "Ribose");
        assert!(LIBRARY.lookup(Biotype::Linker, "R").is_none());
        assert!(LIBRARY.lookup(Biotype::AminoAcid, "[dF]").is_none());
        assert!(LIBRARY.lookup(Biotype::AminoAcid, "dF").is_some());
    }

    #[test]
    fn attachments_merge_type_and_monomer_points() {
        let cysteine = LIBRARY.lookup(Biotype::AminoAcid, "C").unwrap();
        assert_eq!(
            cysteine.attachments,
            vec![Attachment::R1, Attachment::R2, Attachment::R3]
        );
        assert!(cysteine.has_attachment(Attachment::R3));
        let alanine = LIBRARY.lookup(Biotype::AminoAcid, "A").unwrap();
        assert!(!alanine.has_attachment(Attachment::R3));
        let azide = LIBRARY.lookup(Biotype::Chem, "Az").unwrap();
        assert_eq!(azide.attachments, vec![Attachment::R1]);
        assert_ron_snapshot!(azide, @r#"
        MonomerDefinition(
          symbol: "Az",
          name: "Azide",
          biotype: Chem,
          natural_analog: None,
          attachments: [
            R(1),
          ],
          smiles: Some("[*:1]N=[N+]=[N-]"),
        )
        "#);
    }

    #[test]
    fn defaults_are_per_biotype() {
        assert_eq!(LIBRARY.default_monomer(Biotype::Sugar), Some("R"));
        assert_eq!(LIBRARY.default_monomer(Biotype::Linker), Some("P"));
        assert_eq!(LIBRARY.default_monomer(Biotype::AminoAcid), Some("G"));
        assert_eq!(LIBRARY.default_monomer(Biotype::Chem), None);
    }

    #[test]
    fn ambiguous_symbols() {
        let ambiguous = |s| LIBRARY.is_ambiguous(s, Biotype::AminoAcid);
        assert!(ambiguous("*"));
        assert!(ambiguous("?"));
        assert!(ambiguous("(A,G)"));
        assert!(ambiguous("(A:1+G:2.5)"));
        assert!(ambiguous("([dF],A)"));
        assert!(!ambiguous("(A,Zz)"));
        assert!(!ambiguous("(A,G+L)"));
        assert!(!ambiguous("(A:x,G)"));
        assert!(!ambiguous("A"));
        assert!(!ambiguous("(A)"));
        assert!(LIBRARY.is_ambiguous("(A,G)", Biotype::Base));
        assert!(!LIBRARY.is_ambiguous("(A,Q)", Biotype::Base));
    }

    #[test]
    fn strip_brackets() {
        assert_eq!(unbracket("[dF]"), "dF");
        assert_eq!(unbracket("A"), "A");
        assert_eq!(unbracket("[dF"), "[dF");
        assert_eq!(unbracket("[*:1]CC[*:2]"), "[*:1]CC[*:2]");
        assert_eq!(unbracket("[[*:1]CC[*:2]]"), "[*:1]CC[*:2]");
    }

    #[test]
    fn parse_minimal_library() {
        let kdl = indoc! {r#"
            types {
                Chem
            }
            Chem "EG" "Ethylene Glycol" {
                attachment "R1"
                attachment "R2"
            }
        "#};
        let library = parse_library(kdl).unwrap();
        let eg = library.lookup(Biotype::Chem, "EG").unwrap();
        assert_eq!(eg.attachments, vec![Attachment::R1, Attachment::R2]);
        assert_eq!(library.default_monomer(Biotype::Chem), None);
    }

    #[test]
    fn parse_library_with_duplicate_types() {
        let kdl = indoc! {r#"
            types {
                Base {
                    attachment "R1"
                }
                Base
            }
        "#};
        let error = parse_library(kdl).unwrap_err();
        assert!(matches!(error.kind, LibraryErrorKind::DuplicateType(_, _, ref t) if t == "Base"));
        assert_miette_labels!(error, ["first defined here", "then again here"]);
    }

    #[test]
    fn parse_library_with_invalid_type() {
        let kdl = indoc! {r#"
            types {
                Nucleoside
            }
        "#};
        let error = parse_library(kdl).unwrap_err();
        assert!(matches!(error.kind, LibraryErrorKind::InvalidType(_, ref t) if t == "Nucleoside"));
        assert_miette_labels!(error, ["invalid monomer type"]);
    }

    #[test]
    fn parse_library_with_undefined_type() {
        let kdl = indoc! {r#"
            types {
                Sugar
            }
            Base "A" "Adenine" natural="A"
        "#};
        let error = parse_library(kdl).unwrap_err();
        assert!(matches!(error.kind, LibraryErrorKind::UndefinedType(_, ref t) if t == "Base"));
        assert_miette_labels!(error, ["undefined monomer type"]);
    }

    #[test]
    fn parse_library_with_invalid_attachments() {
        for attachment in ["R0", "pair", "?", "X2"] {
            let kdl = format!(
                "types {{\n    Chem\n}}\nChem \"EG\" \"Ethylene Glycol\" {{\n    attachment \"{attachment}\"\n}}\n"
            );
            let error = parse_library(&kdl).unwrap_err();
            assert!(
                matches!(error.kind, LibraryErrorKind::InvalidAttachment(_, ref a) if a == attachment)
            );
        }
    }

    #[test]
    fn parse_library_with_duplicate_attachments() {
        let kdl = indoc! {r#"
            types {
                AminoAcid {
                    attachment "R1"
                    attachment "R2"
                }
            }
            AminoAcid "A" "Alanine" {
                attachment "R2"
            }
        "#};
        let error = parse_library(kdl).unwrap_err();
        assert!(matches!(
            error.kind,
            LibraryErrorKind::DuplicateAttachment(_, _, a) if a == Attachment::R2
        ));
        assert_miette_labels!(error, ["first defined here", "then again here"]);
    }

    #[test]
    fn parse_library_with_duplicate_monomers() {
        let kdl = indoc! {r#"
            types {
                AminoAcid
                Sugar
            }
            AminoAcid "R" "Arginine"
            Sugar "R" "Ribose"
            AminoAcid "R" "Arginine, again"
        "#};
        let error = parse_library(kdl).unwrap_err();
        assert!(matches!(
            error.kind,
            LibraryErrorKind::DuplicateMonomer(_, _, Biotype::AminoAcid, ref s) if s == "R"
        ));
    }

    #[test]
    fn parse_library_with_multiple_defaults() {
        let kdl = indoc! {r#"
            types {
                Linker
            }
            Linker "P" "Phosphate" default=true
            Linker "sP" "Phosphorothioate" default=true
        "#};
        let error = parse_library(kdl).unwrap_err();
        assert!(matches!(
            error.kind,
            LibraryErrorKind::MultipleDefaults(_, _, Biotype::Linker)
        ));
        assert_eq!(
            error.kind.to_string(),
            "more than one Linker monomer has been marked as the default"
        );
    }

    #[test]
    fn malformed_kdl_is_reported() {
        let kdl = indoc! {r#"
            AminoAcid "A" "Alanine"
        "#};
        assert!(MonomerLibrary::new("test", kdl).is_err());
    }
}
