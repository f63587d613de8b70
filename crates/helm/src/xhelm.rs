//! The XHELM envelope: HELM notation wrapped in XML, alongside the definitions of the monomers it uses
//!
//! ```xml
//! <Xhelm>
//! <HelmNotation>PEPTIDE1{A.[dF]}$$$$</HelmNotation>
//! <Monomers>
//! <Monomer>
//! <MonomerID>dF</MonomerID>
//! <PolymerType>PEPTIDE</PolymerType>
//! <MonomerType>Undefined</MonomerType>
//! </Monomer>
//! </Monomers>
//! </Xhelm>
//! ```

use std::{collections::BTreeMap, fmt::Write};

use nom_miette::LabeledParseError;
use roxmltree::{Document, Node};

use crate::{
    Biotype, HelmErrorKind, MonomerGraph, MonomerLibrary, MonomerStore, PolymerKind, Result, Symbol,
    parser::Parser, serializer::Serializer,
};

/// The contents of an XHELM document
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct XHelm {
    pub notation: String,
    pub monomers: Vec<XHelmMonomer>,
}

/// One entry of an XHELM `<Monomers>` list
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct XHelmMonomer {
    pub id: String,
    pub polymer: PolymerKind,
    /// `Backbone`, `Branch`, or `Undefined`
    pub monomer_type: String,
    pub name: Option<String>,
    pub smiles: Option<String>,
    pub natural_analog: Option<String>,
}

/// Reads an XHELM document, decoding its notation. Monomers without an id or a known polymer type are skipped.
pub fn read(document: &str) -> Result<XHelm> {
    let expected = || -> crate::HelmError {
        LabeledParseError::spanning(document, HelmErrorKind::ExpectedXHelm)
            .finalize(document)
            .into()
    };
    let xml = Document::parse(document).map_err(|e| {
        log::debug!("not well-formed XML: {e}");
        expected()
    })?;
    let root = xml.root_element();
    if !root.has_tag_name("Xhelm") {
        return Err(expected());
    }
    let notation = child(root, "HelmNotation").ok_or_else(expected)?;

    let monomers = child(root, "Monomers")
        .into_iter()
        .flat_map(|list| list.children().filter(|n| n.has_tag_name("Monomer")))
        .filter_map(monomer_entry)
        .collect();

    Ok(XHelm {
        notation: text(notation),
        monomers,
    })
}

/// Wraps the notation of `graph` in an XHELM envelope, listing every distinct monomer it uses. Definitions are filled
/// in from `store` wherever it knows the monomer.
pub fn write(graph: &MonomerGraph, store: &(impl MonomerStore + ?Sized)) -> Result<String> {
    let notation = Serializer::new().serialize(graph)?;

    let mut monomers = BTreeMap::new();
    collect_monomers(graph, &mut monomers);

    let mut document = format!("<Xhelm>\n<HelmNotation>{}</HelmNotation>\n<Monomers>\n", escape(&notation));
    for ((biotype, symbol), smiles) in monomers {
        let definition = store.lookup(biotype, &symbol);
        let (polymer, monomer_type) = listed_type(biotype);
        let name = definition.map(|d| d.name.as_str());
        let smiles = smiles.or_else(|| definition?.smiles.clone());
        let analog = definition.and_then(|d| d.natural_analog.as_deref());

        document.push_str("<Monomer>\n");
        push_field(&mut document, "MonomerID", Some(&symbol));
        push_field(&mut document, "MonomerName", name);
        push_field(&mut document, "MonomerSmiles", smiles.as_deref());
        push_field(&mut document, "PolymerType", Some(polymer.prefix()));
        push_field(&mut document, "MonomerType", Some(monomer_type));
        push_field(&mut document, "NaturalAnalog", analog);
        document.push_str("</Monomer>\n");
    }
    document.push_str("</Monomers>\n</Xhelm>");
    Ok(document)
}

impl XHelm {
    /// Maps listed monomers the library doesn't know onto library monomers with the same SMILES
    pub fn renames<'a>(&'a self, library: &'a MonomerLibrary) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.monomers.iter().filter_map(|listed| {
            let smiles = listed.smiles.as_deref()?;
            let known = library.monomers().any(|m| {
                m.symbol == listed.id && m.biotype.polymer() == listed.polymer
            });
            if known {
                return None;
            }
            library
                .monomers()
                .find(|m| m.biotype.polymer() == listed.polymer && m.smiles.as_deref() == Some(smiles))
                .map(|m| (listed.id.as_str(), m.symbol.as_str()))
        })
    }

    /// Parses the enclosed notation, resolving renamed monomers against `library`
    pub fn parse(&self, library: &MonomerLibrary) -> Result<MonomerGraph> {
        Parser::new(library)
            .with_renames(self.renames(library))
            .parse(&self.notation)
    }
}

// Private Helpers =====================================================================================================

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

/// The trimmed text of `node`, with entities decoded and any CDATA sections joined in
fn text(node: Node) -> String {
    let text: String = node
        .descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect();
    text.trim().to_owned()
}

fn monomer_entry(entry: Node) -> Option<XHelmMonomer> {
    let field = |name| {
        child(entry, name)
            .map(text)
            .filter(|value| !value.is_empty())
    };
    let Some(id) = field("MonomerID") else {
        log::debug!("skipping an XHELM monomer with no id");
        return None;
    };
    let Some(polymer) = field("PolymerType").and_then(|p| p.parse().ok()) else {
        log::debug!("skipping the XHELM monomer {id:?}, which has no known polymer type");
        return None;
    };
    Some(XHelmMonomer {
        id,
        polymer,
        monomer_type: field("MonomerType").unwrap_or_else(|| "Undefined".to_owned()),
        name: field("MonomerName"),
        smiles: field("MonomerSmiles"),
        natural_analog: field("NaturalAnalog"),
    })
}

/// Every library-backed or SMILES monomer in `graph` and the graphs of its collapsed groups
fn collect_monomers(graph: &MonomerGraph, monomers: &mut BTreeMap<(Biotype, String), Option<String>>) {
    for (_, node) in graph.nodes() {
        if let Some(superatom) = node.superatom() {
            collect_monomers(superatom.graph(), monomers);
        }
        match node.symbol() {
            Symbol::Monomer(symbol) => {
                monomers.entry((node.biotype(), symbol.clone())).or_insert(None);
            }
            Symbol::Smiles(smiles) => {
                monomers.insert((node.biotype(), smiles.clone()), Some(smiles.clone()));
            }
            Symbol::Ambiguous(_) | Symbol::Blob(_) | Symbol::Group => (),
        }
    }
}

const fn listed_type(biotype: Biotype) -> (PolymerKind, &'static str) {
    match biotype {
        Biotype::Sugar | Biotype::Linker | Biotype::Nucleotide => (PolymerKind::Rna, "Backbone"),
        Biotype::Base => (PolymerKind::Rna, "Branch"),
        Biotype::AminoAcid => (PolymerKind::Peptide, "Undefined"),
        Biotype::Chem => (PolymerKind::Chem, "Undefined"),
        Biotype::Blob => (PolymerKind::Blob, "Undefined"),
    }
}

fn push_field(document: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        // NOTE: Writing to a `String` never fails
        let _ = writeln!(document, "<{name}>{}</{name}>", escape(value));
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
