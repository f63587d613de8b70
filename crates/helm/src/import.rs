//! Importing plain one-letter sequences, like `ACDEFG` or `AUGC>`, as HELM graphs

use nom_miette::LabeledParseError;

use crate::{
    Attachment, Biotype, Endpoint, GraphEditor, HelmErrorKind, MonomerGraph, MonomerNode, MonomerStore,
    NodeId, Result, Symbol, errors::ParseResult, library::unbracket, parser::Parser,
};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Format {
    Helm,
    Rna,
    Peptide,
}

const HELM_PREFIXES: [&str; 4] = ["RNA", "PEPTIDE", "CHEM", "BLOB"];
const RNA_CODES: &str = "ACGTU";
const PEPTIDE_CODES: &str = "ACDEFGHIKLMNPQRSTVWYZ";

/// Guesses the format of `text`: HELM if it opens with a polymer id, otherwise a plain RNA or peptide sequence (in
/// that order, so `ACG` reads as RNA). A trailing `>` marks a circular sequence.
#[must_use]
pub fn detect(text: &str) -> Option<Format> {
    let text = text.trim().to_ascii_uppercase();
    let opens_with_id = HELM_PREFIXES.iter().any(|prefix| {
        text.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
    });
    if opens_with_id {
        return Some(Format::Helm);
    }

    let codes = text.strip_suffix('>').unwrap_or(&text);
    let all_in = |alphabet: &str| !codes.is_empty() && codes.chars().all(|c| alphabet.contains(c));
    if all_in(RNA_CODES) {
        Some(Format::Rna)
    } else if all_in(PEPTIDE_CODES) {
        Some(Format::Peptide)
    } else {
        None
    }
}

/// Reads HELM notation or a plain sequence, whichever `text` turns out to be
pub fn read(store: &impl MonomerStore, text: &str) -> Result<MonomerGraph> {
    match detect(text) {
        Some(Format::Helm) => Parser::new(store).parse(text.trim()),
        Some(Format::Rna) => rna(store, text),
        Some(Format::Peptide) => peptide(store, text),
        None => Err(LabeledParseError::spanning(text, HelmErrorKind::UnknownFormat)
            .finalize(text)
            .into()),
    }
}

/// Builds a single peptide from one-letter amino acid codes
pub fn peptide(store: &impl MonomerStore, sequence: &str) -> Result<MonomerGraph> {
    let mut graph = MonomerGraph::new();
    build_peptide(store, &mut graph, sequence).map_err(|e| e.finalize(sequence))?;
    Ok(graph)
}

/// Builds a single strand from one-letter base codes, joining nucleotides with the store's default sugar and linker
pub fn rna(store: &impl MonomerStore, sequence: &str) -> Result<MonomerGraph> {
    rna_with_backbone(store, sequence, None, None)
}

/// Like [`rna`], but any given `sugar` or `linker` (like `dR` or `[sP]`) replaces the store's default
pub fn rna_with_backbone(
    store: &impl MonomerStore,
    sequence: &str,
    sugar: Option<&str>,
    linker: Option<&str>,
) -> Result<MonomerGraph> {
    let mut graph = MonomerGraph::new();
    build_rna(store, &mut graph, sequence, sugar, linker).map_err(|e| e.finalize(sequence))?;
    Ok(graph)
}

fn build_peptide<'a>(
    store: &impl MonomerStore,
    graph: &mut MonomerGraph,
    sequence: &'a str,
) -> ParseResult<'a, ()> {
    let (codes, circular) = split_ring(sequence);
    let mut residues = Vec::new();
    for (offset, code) in codes.char_indices() {
        let token = &codes[offset..offset + code.len_utf8()];
        let symbol = resolve(store, Biotype::AminoAcid, token)?;
        let residue = add(graph, Biotype::AminoAcid, symbol, residues.len());
        if let Some(&previous) = residues.last() {
            link(graph, previous, residue).map_err(|kind| LabeledParseError::spanning(token, kind))?;
        }
        residues.push(residue);
    }

    if circular && let [first, .., last] = residues[..] {
        link(graph, last, first).map_err(|kind| LabeledParseError::spanning(sequence, kind))?;
    }
    Ok(())
}

fn build_rna<'a>(
    store: &impl MonomerStore,
    graph: &mut MonomerGraph,
    sequence: &'a str,
    sugar: Option<&str>,
    linker: Option<&str>,
) -> ParseResult<'a, ()> {
    let (codes, circular) = split_ring(sequence);
    let backbone = |biotype: Biotype, chosen: Option<&str>, fallback: &'static str| {
        let code = match chosen {
            Some(code) => unbracket(code.trim()).to_owned(),
            None => store.default_monomer(biotype).unwrap_or(fallback).to_owned(),
        };
        store
            .lookup(biotype, &code)
            .map(|definition| definition.symbol.clone())
            .ok_or_else(|| {
                LabeledParseError::spanning(
                    sequence,
                    HelmErrorKind::UnknownMonomer {
                        biotype,
                        symbol: code,
                    },
                )
            })
    };
    let sugar = backbone(Biotype::Sugar, sugar, "R")?;
    let linker = backbone(Biotype::Linker, linker, "P")?;

    let mut position = 0;
    let mut sugars = Vec::new();
    let mut last: Option<NodeId> = None;
    for (offset, code) in codes.char_indices() {
        let token = &codes[offset..offset + code.len_utf8()];
        let base = resolve(store, Biotype::Base, token)?;
        let to_error = |kind: HelmErrorKind| LabeledParseError::spanning(token, kind);

        if let Some(previous) = last {
            let joint = add(graph, Biotype::Linker, linker.clone(), position);
            position += 1;
            link(graph, previous, joint).map_err(to_error)?;
            last = Some(joint);
        }
        let ribose = add(graph, Biotype::Sugar, sugar.clone(), position);
        let base = add(graph, Biotype::Base, base, position + 1);
        position += 2;
        graph
            .create_bond(
                Endpoint::new(ribose, Attachment::R3),
                Endpoint::new(base, Attachment::R1),
            )
            .map_err(to_error)?;
        if let Some(previous) = last {
            link(graph, previous, ribose).map_err(to_error)?;
        }
        last = Some(ribose);
        sugars.push(ribose);
    }

    // Closing a ring takes one more linker, from the last sugar back around to the first
    if circular && let (Some(last), [first, _, ..]) = (last, &sugars[..]) {
        let joint = add(graph, Biotype::Linker, linker, position);
        let to_error = |kind: HelmErrorKind| LabeledParseError::spanning(sequence, kind);
        link(graph, last, joint).map_err(to_error)?;
        link(graph, joint, *first).map_err(to_error)?;
    }
    Ok(())
}

fn split_ring(sequence: &str) -> (&str, bool) {
    let sequence = sequence.trim();
    sequence
        .strip_suffix('>')
        .map_or((sequence, false), |codes| (codes, true))
}

fn resolve<'a>(store: &impl MonomerStore, biotype: Biotype, token: &'a str) -> ParseResult<'a, String> {
    let code = token.to_ascii_uppercase();
    store
        .lookup(biotype, &code)
        .map(|definition| definition.symbol.clone())
        .ok_or_else(|| {
            LabeledParseError::spanning(
                token,
                HelmErrorKind::UnknownMonomer {
                    biotype,
                    symbol: code,
                },
            )
        })
}

fn add(graph: &mut MonomerGraph, biotype: Biotype, symbol: String, index: usize) -> NodeId {
    let ordinal = u32::try_from(index + 1).unwrap_or(u32::MAX);
    graph.create_node(MonomerNode::new(biotype, Symbol::Monomer(symbol)).with_ordinal(ordinal))
}

fn link(graph: &mut MonomerGraph, from: NodeId, to: NodeId) -> Result<(), HelmErrorKind> {
    graph
        .create_bond(
            Endpoint::new(from, Attachment::R2),
            Endpoint::new(to, Attachment::R1),
        )
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::{Chain, ErrorCategory, chain::decompose, serialize, testing_tools::LIBRARY};

    #[test]
    fn detect_formats() {
        assert_eq!(detect("PEPTIDE1{A.G}$$$$"), Some(Format::Helm));
        assert_eq!(detect("rna1{R(A)P}"), Some(Format::Helm));
        assert_eq!(detect("ACGU"), Some(Format::Rna));
        assert_eq!(detect("acgt>"), Some(Format::Rna));
        assert_eq!(detect("ACDEFGHIK"), Some(Format::Peptide));
        assert_eq!(detect(" KLMNPQ> "), Some(Format::Peptide));
        assert_eq!(detect("PEPTIDE{A}"), None);
        assert_eq!(detect("ABJ"), None);
        assert_eq!(detect(">"), None);
        assert_eq!(detect(""), None);
    }

    #[test]
    fn import_peptides() {
        let graph = peptide(&*LIBRARY, "ACGK").unwrap();
        assert_snapshot!(serialize(&graph).unwrap(), @"PEPTIDE1{A.C.G.K}$$$$");

        let graph = peptide(&*LIBRARY, "acgk>").unwrap();
        let chains: Vec<Chain> = decompose(&graph).chains;
        assert!(chains[0].is_circle());
        assert_snapshot!(
            serialize(&graph).unwrap(),
            @"PEPTIDE1{A.C.G.K}$PEPTIDE1,PEPTIDE1,4:R2-1:R1$$$"
        );

        // A single residue can't close a ring with itself
        let graph = peptide(&*LIBRARY, "W>").unwrap();
        assert_eq!(graph.bond_count(), 0);
    }

    #[test]
    fn import_rna() {
        let graph = rna(&*LIBRARY, "AUG").unwrap();
        assert_eq!(graph.node_count(), 8);
        assert_snapshot!(serialize(&graph).unwrap(), @"RNA1{R(A)P.R(U)P.R(G)}$$$$");

        let graph = rna(&*LIBRARY, "AU>").unwrap();
        assert_snapshot!(
            serialize(&graph).unwrap(),
            @"RNA1{R(A)P.R(U)P}$RNA1,RNA1,6:R2-1:R1$$$"
        );
    }

    #[test]
    fn import_rna_with_other_backbones() {
        let graph = rna_with_backbone(&*LIBRARY, "AC", Some("dR"), Some("[sP]")).unwrap();
        assert_snapshot!(serialize(&graph).unwrap(), @"RNA1{[dR](A)[sP].[dR](C)}$$$$");

        // Only the linker changes here, so the sugar stays the default
        let graph = rna_with_backbone(&*LIBRARY, "GU", None, Some("sP")).unwrap();
        assert_snapshot!(serialize(&graph).unwrap(), @"RNA1{R(G)[sP].R(U)}$$$$");

        let error = rna_with_backbone(&*LIBRARY, "AC", Some("P"), None).unwrap_err();
        assert_eq!(
            error.kind(),
            Some(&HelmErrorKind::UnknownMonomer {
                biotype: Biotype::Sugar,
                symbol: "P".to_owned()
            })
        );
        assert_eq!(error.category(), ErrorCategory::UnknownMonomer);
    }

    #[test]
    fn read_any_format() {
        let notation = |text| serialize(&read(&*LIBRARY, text).unwrap()).unwrap();
        assert_eq!(notation("PEPTIDE1{A.G}$$$$"), "PEPTIDE1{A.G}$$$$");
        assert_eq!(notation("GU"), "RNA1{R(G)P.R(U)}$$$$");
        assert_eq!(notation("MKV"), "PEPTIDE1{M.K.V}$$$$");

        let error = read(&*LIBRARY, "hello world").unwrap_err();
        assert_eq!(error.kind(), Some(&HelmErrorKind::UnknownFormat));
        assert_eq!(error.category(), ErrorCategory::MalformedNotation);
    }

    #[test]
    fn unknown_codes_are_labeled() {
        // Z passes detection, but isn't in the library
        let error = peptide(&*LIBRARY, "AGZK").unwrap_err();
        assert_eq!(
            error.kind(),
            Some(&HelmErrorKind::UnknownMonomer {
                biotype: Biotype::AminoAcid,
                symbol: "Z".to_owned()
            })
        );
        crate::testing_tools::assert_miette_labels!(error, ["unknown monomer"]);

        let error = rna(&*LIBRARY, "AGX").unwrap_err();
        assert_eq!(error.category(), ErrorCategory::UnknownMonomer);
    }
}
