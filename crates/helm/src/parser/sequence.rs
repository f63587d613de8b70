//! The simple-polymer section: `PEPTIDE1{A.C.[dF]}|RNA1{R(A)P.R(U)}|CHEM1{[SMCC]}|BLOB1{Bead}`

use ahash::{HashSet, HashSetExt};
use nom_miette::{LabeledParseError, complete_parser};

use crate::{
    Attachment, Biotype, Endpoint, GraphEditor, HelmErrorKind, MonomerDefinition, MonomerNode,
    MonomerStore, NodeId, PolymerKind, Repeat, RepeatBracket, Symbol,
    annotation::{Detached, detach},
    errors::ParseResult,
    library::unbracket,
};

use super::{
    Builder, ChainRecord,
    grammar::{self, Reference},
    run,
    splitter::{contains_top_level, matching_close, split_top_level},
};

#[derive(Clone, Debug)]
pub(super) struct PolymerToken<'a> {
    pub(super) id: Reference,
    pub(super) body: &'a str,
    pub(super) annotation: Option<String>,
}

/// A monomer symbol resolved against the store
type Resolved<'p> = (Symbol, Option<&'p MonomerDefinition>);

/// The chain currently being built
#[derive(Default)]
struct ChainState {
    positions: Vec<NodeId>,
    /// The last node on the chain's backbone, which the next backbone node bonds to
    last: Option<NodeId>,
}

/// Adds a single (already detached) sequence item to a chain
type AddItem<'a, B> = fn(&mut B, &mut ChainState, &'a str, Option<String>) -> ParseResult<'a, ()>;

/// One element of an RNA nucleotide like `R(A)P` or `[dR]([5meC])[sP]`
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Part<'a> {
    Symbol(&'a str),
    /// `inner` is the text between the parentheses of `text`
    Base { inner: &'a str, text: &'a str },
}

pub(super) fn polymer_tokens(section: &str) -> ParseResult<'_, Vec<PolymerToken<'_>>> {
    if section.is_empty() {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut polymers = Vec::new();
    for token in split_top_level(section, '|') {
        let Detached {
            body,
            repeat,
            tag: annotation,
        } = detach(token);
        let (rest, id) = run(grammar::chain_id(body))?;
        let is_wrapped = rest.starts_with('{')
            && matching_close(rest).is_some_and(|close| close + 1 == rest.len());
        if !is_wrapped || repeat.is_some() {
            return Err(LabeledParseError::spanning(
                rest,
                HelmErrorKind::ExpectedChainBody,
            ));
        }
        if !seen.insert(id) {
            return Err(LabeledParseError::spanning(
                &body[..body.len() - rest.len()],
                HelmErrorKind::DuplicateChain(id.to_string()),
            ));
        }
        polymers.push(PolymerToken {
            id,
            body: &rest[1..rest.len() - 1],
            annotation,
        });
    }
    Ok(polymers)
}

impl<'a, 'p, S: MonomerStore + ?Sized, G: GraphEditor> Builder<'a, 'p, S, G> {
    pub(super) fn build_chain(&mut self, polymer: PolymerToken<'a>) -> ParseResult<'a, ()> {
        let PolymerToken {
            id,
            body,
            mut annotation,
        } = polymer;
        let polymer_body = body;
        let mut chain = ChainState::default();
        match id.kind {
            PolymerKind::Peptide => {
                for item in split_top_level(body, '.') {
                    self.sequence_item(&mut chain, item, Self::residue)?;
                }
            }
            PolymerKind::Rna => {
                for item in split_top_level(body, '.') {
                    self.sequence_item(&mut chain, item, Self::nucleotide)?;
                }
            }
            PolymerKind::Chem => self.chem(&mut chain, body)?,
            PolymerKind::Blob => {
                let Detached { body, tag, .. } = detach(body);
                let blob_type = (!body.is_empty() && body != "Blob").then(|| body.to_owned());
                // A blob has no inner structure to hang an annotation on, so it's kept on the node itself
                let tag = annotation.take().or(tag);
                self.add_node(&mut chain, Biotype::Blob, (Symbol::Blob(blob_type), None), tag);
            }
            PolymerKind::Group => unreachable!("group ids are rejected by `chain_id`"),
        }

        self.chains.insert(
            id,
            ChainRecord {
                kind: id.kind,
                body: polymer_body,
                positions: chain.positions,
                annotation,
            },
        );
        Ok(())
    }

    /// Handles one `.`-separated item, which may be a single monomer, a parenthesized run of them, and may be
    /// repeated (`A'3'`, `(D.F)'2-5'`)
    fn sequence_item(
        &mut self,
        chain: &mut ChainState,
        item: &'a str,
        add: AddItem<'a, Self>,
    ) -> ParseResult<'a, ()> {
        if item.is_empty() {
            return Err(LabeledParseError::spanning(item, HelmErrorKind::ExpectedMonomer));
        }
        let Detached { body, repeat, tag } = detach(item);
        let repeat = repeat.map(complete_parser(grammar::repeat)).transpose()?;

        let unit = match run_inner(body) {
            Some(inner) => split_top_level(inner, '.'),
            None if repeat.is_none() => return add(self, chain, body, tag),
            None => vec![body],
        };
        if repeat.is_none() && tag.is_none() {
            for member in unit {
                self.unit_member(chain, member, add)?;
            }
            return Ok(());
        }

        // NOTE: A tagged run with no repeat is kept as a single copy, so the tag has a bracket to live on
        let repeat = repeat.unwrap_or(Repeat::Exact(1));
        let limit = self.parser.repeat_limit;
        if repeat.copies() > limit {
            let kind = HelmErrorKind::RepeatTooLarge {
                count: repeat.copies(),
                limit,
            };
            return Err(LabeledParseError::spanning(item, kind));
        }

        let start = chain.positions.len();
        for _ in 0..repeat.copies() {
            for &member in &unit {
                self.unit_member(chain, member, add)?;
            }
        }
        self.editor
            .add_repeat(RepeatBracket {
                nodes: chain.positions[start..].to_vec(),
                repeat,
                copies: repeat.copies(),
                tag,
            })
            .map_err(|kind| LabeledParseError::spanning(item, kind))
    }

    /// Repeats don't nest, so members of a repeated unit can only carry tags
    fn unit_member(
        &mut self,
        chain: &mut ChainState,
        member: &'a str,
        add: AddItem<'a, Self>,
    ) -> ParseResult<'a, ()> {
        let Detached { body, repeat, tag } = detach(member);
        if body.is_empty() || repeat.is_some() || run_inner(body).is_some() {
            return Err(LabeledParseError::spanning(member, HelmErrorKind::ExpectedMonomer));
        }
        add(self, chain, body, tag)
    }

    fn residue(
        &mut self,
        chain: &mut ChainState,
        body: &'a str,
        tag: Option<String>,
    ) -> ParseResult<'a, ()> {
        let resolved = self.resolve(Biotype::AminoAcid, body)?;
        let node = self.add_node(chain, Biotype::AminoAcid, resolved, tag);
        self.link_backbone(chain, node, body)
    }

    /// A nucleotide is a run of backbone monomers (sugars and linkers), where each sugar may carry a base
    fn nucleotide(
        &mut self,
        chain: &mut ChainState,
        body: &'a str,
        tag: Option<String>,
    ) -> ParseResult<'a, ()> {
        let parts = nucleotide_parts(body)?;
        let last_symbol = parts.iter().rposition(|part| matches!(part, Part::Symbol(_)));
        let mut tag = tag;
        let mut previous: Option<(NodeId, Biotype, &'a str)> = None;

        for (index, part) in parts.into_iter().enumerate() {
            match part {
                Part::Symbol(text) => {
                    let (biotype, resolved) = self.backbone_monomer(text)?;
                    let node_tag = if Some(index) == last_symbol { tag.take() } else { None };
                    let node = self.add_node(chain, biotype, resolved, node_tag);
                    self.link_backbone(chain, node, text)?;
                    previous = Some((node, biotype, text));
                }
                Part::Base { inner, text } => {
                    let sugar = match previous {
                        Some((sugar, Biotype::Sugar, _)) => sugar,
                        Some((_, _, symbol)) => {
                            return Err(LabeledParseError::spanning(
                                text,
                                HelmErrorKind::BaseWithoutSugar(unbracket(symbol).to_owned()),
                            ));
                        }
                        None => {
                            return Err(LabeledParseError::spanning(
                                text,
                                HelmErrorKind::BaseWithoutSugar(String::new()),
                            ));
                        }
                    };
                    let Detached {
                        body: base,
                        repeat,
                        tag: base_tag,
                    } = detach(inner);
                    if base.is_empty() || repeat.is_some() {
                        return Err(LabeledParseError::spanning(
                            text,
                            HelmErrorKind::ExpectedMonomer,
                        ));
                    }
                    let resolved = self.resolve_base(base)?;
                    let node = self.add_node(chain, Biotype::Base, resolved, base_tag);
                    self.editor
                        .create_bond(
                            Endpoint::new(sugar, Attachment::R3),
                            Endpoint::new(node, Attachment::R1),
                        )
                        .map_err(|kind| LabeledParseError::spanning(text, kind))?;
                    previous = Some((node, Biotype::Base, base));
                }
            }
        }
        Ok(())
    }

    /// Sugars are recognized by name; everything else on an RNA backbone is a linker, apart from `*`, which stands in
    /// for a whole nucleotide
    fn backbone_monomer(&self, text: &'a str) -> ParseResult<'a, (Biotype, Resolved<'p>)> {
        if text == "*" {
            return Ok((Biotype::Nucleotide, (Symbol::Ambiguous("*".to_owned()), None)));
        }
        if let Some(resolved) = self.lookup(Biotype::Sugar, text) {
            return Ok((Biotype::Sugar, resolved));
        }
        Ok((Biotype::Linker, self.resolve(Biotype::Linker, text)?))
    }

    /// Base mixtures are written without their parentheses, as in `R(A,G)P`
    fn resolve_base(&self, base: &'a str) -> ParseResult<'a, Resolved<'p>> {
        if contains_top_level(base, ',') || contains_top_level(base, '+') {
            let mixture = format!("({base})");
            return if self.parser.store.is_ambiguous(&mixture, Biotype::Base) {
                Ok((Symbol::Ambiguous(base.to_owned()), None))
            } else {
                Err(LabeledParseError::spanning(
                    base,
                    HelmErrorKind::UnknownMonomer {
                        biotype: Biotype::Base,
                        symbol: mixture,
                    },
                ))
            };
        }
        self.resolve(Biotype::Base, base)
    }

    fn chem(&mut self, chain: &mut ChainState, body: &'a str) -> ParseResult<'a, ()> {
        let items = split_top_level(body, '.');
        if let Some(&extra) = items.get(1) {
            return Err(LabeledParseError::spanning(extra, HelmErrorKind::ExpectedChainBody));
        }
        let Detached { body, repeat, tag } = detach(body);
        if body.is_empty() || repeat.is_some() {
            return Err(LabeledParseError::spanning(body, HelmErrorKind::ExpectedMonomer));
        }
        let resolved = self.resolve(Biotype::Chem, body)?;
        self.add_node(chain, Biotype::Chem, resolved, tag);
        Ok(())
    }

    // Node Creation ---------------------------------------------------------------------------------------------------

    fn add_node(
        &mut self,
        chain: &mut ChainState,
        biotype: Biotype,
        (symbol, definition): Resolved<'p>,
        tag: Option<String>,
    ) -> NodeId {
        let ordinal = u32::try_from(chain.positions.len() + 1).unwrap_or(u32::MAX);
        let node = MonomerNode::new(biotype, symbol)
            .with_ordinal(ordinal)
            .with_tag(tag);
        let id = self.editor.create_node(node);
        chain.positions.push(id);
        if let Some(definition) = definition {
            self.definitions.insert(id, definition);
        }
        id
    }

    fn link_backbone(
        &mut self,
        chain: &mut ChainState,
        node: NodeId,
        token: &'a str,
    ) -> ParseResult<'a, ()> {
        if let Some(previous) = chain.last.replace(node) {
            self.editor
                .create_bond(
                    Endpoint::new(previous, Attachment::R2),
                    Endpoint::new(node, Attachment::R1),
                )
                .map_err(|kind| LabeledParseError::spanning(token, kind))?;
        }
        Ok(())
    }

    // Symbol Resolution -----------------------------------------------------------------------------------------------

    /// Finds a library monomer (after applying any renames) or a valid ambiguity
    fn lookup(&self, biotype: Biotype, token: &str) -> Option<Resolved<'p>> {
        let store = self.parser.store;
        let code = unbracket(token);
        let code = self.parser.renames.get(code).map_or(code, String::as_str);
        if let Some(definition) = store.lookup(biotype, code) {
            return Some((Symbol::Monomer(definition.symbol.clone()), Some(definition)));
        }
        store
            .is_ambiguous(code, biotype)
            .then(|| (Symbol::Ambiguous(code.to_owned()), None))
    }

    /// Like [`Builder::lookup`], but falls back to inline SMILES before giving up
    fn resolve(&self, biotype: Biotype, token: &'a str) -> ParseResult<'a, Resolved<'p>> {
        if let Some(resolved) = self.lookup(biotype, token) {
            return Ok(resolved);
        }
        let code = unbracket(token);
        if code.len() > 1 && code.contains('*') {
            return Ok((Symbol::Smiles(code.to_owned()), None));
        }
        Err(LabeledParseError::spanning(
            token,
            HelmErrorKind::UnknownMonomer {
                biotype,
                symbol: code.to_owned(),
            },
        ))
    }
}

/// The inside of a parenthesized run like `(D.F)`, but not of a mixture like `(A,G)`
fn run_inner(body: &str) -> Option<&str> {
    if !body.starts_with('(') || matching_close(body)? + 1 != body.len() {
        return None;
    }
    let inner = &body[1..body.len() - 1];
    (!contains_top_level(inner, ',') && !contains_top_level(inner, '+')).then_some(inner)
}

/// NucleotideParts = { Symbol | Base }- ;
/// Symbol = "[" , { any character } , "]" | any character - ( "[" | "(" ) ;
/// Base = "(" , { any character } , ")" ;
fn nucleotide_parts(body: &str) -> ParseResult<'_, Vec<Part<'_>>> {
    let mut parts = Vec::new();
    let mut rest = body;
    while let Some(c) = rest.chars().next() {
        let length = match c {
            '[' | '(' => {
                let close = matching_close(rest).ok_or_else(|| {
                    LabeledParseError::spanning(&rest[..1], HelmErrorKind::UnclosedDelimiter(c))
                })?;
                close + 1
            }
            _ => c.len_utf8(),
        };
        let (text, tail) = rest.split_at(length);
        parts.push(if c == '(' {
            Part::Base {
                inner: &text[1..length - 1],
                text,
            }
        } else {
            Part::Symbol(text)
        });
        rest = tail;
    }

    if parts.is_empty() {
        return Err(LabeledParseError::spanning(body, HelmErrorKind::ExpectedMonomer));
    }
    Ok(parts)
}
