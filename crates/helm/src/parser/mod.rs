//! Reading HELM notation into a [`MonomerGraph`]
//!
//! Parsing happens in two passes: every section is first split into tokens (all slices of the original notation, so
//! errors can point back into it), then those tokens are built into a fresh graph through [`GraphEditor`]. A graph is
//! only ever returned whole; any error discards everything built so far.

mod grammar;
mod groups;
mod sequence;
mod splitter;

use std::collections::BTreeMap;

use ahash::{HashMap, HashMapExt};
use nom::Finish;
use nom_miette::{LabeledParseError, complete_parser};
use serde_json::Value;

use crate::{
    Attachment, BondId, BondRatio, Endpoint, GraphEditor, GroupId, HelmErrorKind, MonomerDefinition,
    MonomerGraph, MonomerStore, NodeId, PolymerKind, Result, Strand,
    annotation::detach,
    errors::ParseResult,
};

pub(crate) use self::grammar::Reference;

use self::{
    grammar::{ConnectionToken, EndToken, NomResult, Site},
    splitter::{check_nesting, split_top_level},
};

// Public API ==========================================================================================================

/// A reusable HELM reader, configured once and then used to parse any number of independent notations
#[derive(Clone, Debug)]
pub struct Parser<'s, S: ?Sized> {
    store: &'s S,
    renames: HashMap<String, String>,
    depth_limit: usize,
    repeat_limit: usize,
}

impl<'s, S: MonomerStore + ?Sized> Parser<'s, S> {
    pub const DEFAULT_DEPTH_LIMIT: usize = 64;
    pub const DEFAULT_REPEAT_LIMIT: usize = 1000;

    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            renames: HashMap::new(),
            depth_limit: Self::DEFAULT_DEPTH_LIMIT,
            repeat_limit: Self::DEFAULT_REPEAT_LIMIT,
        }
    }

    /// Maps legacy monomer symbols onto the symbols used by the store, applied before any lookup
    #[must_use]
    pub fn with_renames(
        mut self,
        renames: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.renames
            .extend(renames.into_iter().map(|(from, to)| (from.into(), to.into())));
        self
    }

    /// Caps how deeply brackets and groups may nest before the notation is rejected
    #[must_use]
    pub const fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit;
        self
    }

    /// Caps how many copies a single repeat like `A'3'` or `(D.F)'20'` may build
    #[must_use]
    pub const fn with_repeat_limit(mut self, limit: usize) -> Self {
        self.repeat_limit = limit;
        self
    }

    pub fn parse(&self, notation: &str) -> Result<MonomerGraph> {
        self.parse_into(notation, MonomerGraph::new())
    }

    /// Builds the graph described by `notation` on top of `editor`, which is handed back only if parsing succeeds
    pub fn parse_into<G: GraphEditor>(&self, notation: &str, editor: G) -> Result<G> {
        let mut builder = Builder::new(self, editor);
        builder.build(notation).map_err(|e| e.finalize(notation))?;
        log::trace!(
            "parsed {} chain(s) and {} group(s) from {notation:?}",
            builder.chains.len(),
            builder.groups.len()
        );
        Ok(builder.editor)
    }
}

// Graph Building ======================================================================================================

/// Everything the builder remembers about a chain after creating its nodes
#[derive(Clone, Debug)]
struct ChainRecord<'a> {
    kind: PolymerKind,
    /// The chain's body, for labeling errors
    body: &'a str,
    /// Indexed by (one-based) position
    positions: Vec<NodeId>,
    annotation: Option<String>,
}

/// A connection from the connection section (or a base pair from the group section), plus its `"tag"`
#[derive(Clone, Debug)]
struct Connection<'a> {
    token: &'a str,
    ends: [EndToken<'a>; 2],
    tag: Option<String>,
}

/// Where one end of a connection resolved to, before any groups have been collapsed
#[derive(Copy, Clone, Debug)]
enum Target {
    Node(NodeId),
    Group(GroupId),
}

struct Builder<'a, 'p, S: ?Sized, G> {
    parser: &'p Parser<'p, S>,
    editor: G,
    chains: BTreeMap<Reference, ChainRecord<'a>>,
    groups: BTreeMap<Reference, GroupId>,
    /// The single-chain groups created to carry a chain's annotation or ratio, or to be connected to with `?`
    wrappers: HashMap<Reference, GroupId>,
    parents: HashMap<GroupId, GroupId>,
    definitions: HashMap<NodeId, &'p MonomerDefinition>,
    /// Which token claimed each group, for labeling errors
    group_tokens: HashMap<GroupId, &'a str>,
}

impl<'a, 'p, S: MonomerStore + ?Sized, G: GraphEditor> Builder<'a, 'p, S, G> {
    fn new(parser: &'p Parser<'p, S>, editor: G) -> Self {
        Self {
            parser,
            editor,
            chains: BTreeMap::new(),
            groups: BTreeMap::new(),
            wrappers: HashMap::new(),
            parents: HashMap::new(),
            definitions: HashMap::new(),
            group_tokens: HashMap::new(),
        }
    }

    fn build(&mut self, input: &'a str) -> ParseResult<'a, ()> {
        check_nesting(input, self.parser.depth_limit)?;

        let sections = split_top_level(input, '$');
        if sections.len() > 5 {
            let offset: usize = sections[..5].iter().map(|s| s.len() + 1).sum();
            return Err(LabeledParseError::spanning(
                &input[offset..],
                HelmErrorKind::TooManySections(sections.len()),
            ));
        }
        let [polymers, connections, groups, annotations, version] =
            std::array::from_fn(|i| sections.get(i).copied().unwrap_or(&input[input.len()..]));

        if !version.is_empty() {
            complete_parser(grammar::version)(version)?;
        }
        let mut polymers = sequence::polymer_tokens(polymers)?;
        let connections = connection_tokens(connections)?;
        let (declarations, pairs) = groups::group_tokens(groups)?;
        let strands = strand_annotations(annotations)?;

        polymers.sort_by_key(|polymer| polymer.id);
        for polymer in polymers {
            self.build_chain(polymer)?;
        }

        let connections: Vec<_> = connections.into_iter().chain(pairs).collect();
        let ratios = groups::bond_ratios(&declarations, &connections);
        let declarations: Vec<_> = declarations
            .into_iter()
            .filter(|group| !ratios.values().any(|(id, _)| *id == group.id))
            .collect();

        self.build_groups(&declarations, &connections)?;
        let deferred = self.connect_positions(connections, &ratios)?;
        self.apply_strands(strands)?;
        self.connect_groups(deferred, &ratios)
    }

    /// Creates every bond that only involves numbered positions, returning the connections that land on groups
    fn connect_positions(
        &mut self,
        connections: Vec<Connection<'a>>,
        ratios: &HashMap<usize, (Reference, BondRatio)>,
    ) -> ParseResult<'a, Vec<(usize, Connection<'a>, [Target; 2])>> {
        let mut deferred = Vec::new();
        for (index, connection) in connections.into_iter().enumerate() {
            let [a, b] = &connection.ends;
            let targets = [self.locate(a)?, self.locate(b)?];
            if let [Target::Node(node_a), Target::Node(node_b)] = targets {
                self.check_attachment(node_a, a)?;
                self.check_attachment(node_b, b)?;
                let bond = self.create_connection(&connection, node_a, node_b)?;
                self.annotate(bond, &connection, ratios.get(&index))?;
            } else {
                deferred.push((index, connection, targets));
            }
        }
        Ok(deferred)
    }

    /// Collapses every group that's connected to as a whole, then bonds to the nodes standing in for them
    fn connect_groups(
        &mut self,
        deferred: Vec<(usize, Connection<'a>, [Target; 2])>,
        ratios: &HashMap<usize, (Reference, BondRatio)>,
    ) -> ParseResult<'a, ()> {
        let mut referenced: HashMap<GroupId, &'a str> = HashMap::new();
        for (_, connection, targets) in &deferred {
            for (end, target) in connection.ends.iter().zip(targets) {
                if let &Target::Group(group) = target {
                    referenced.entry(group).or_insert(end.reference_text);
                }
            }
        }

        for (&group, &token) in &referenced {
            let mut ancestor = self.parents.get(&group);
            while let Some(parent) = ancestor {
                if referenced.contains_key(parent) {
                    return Err(LabeledParseError::spanning(
                        token,
                        HelmErrorKind::NestedConnectedGroup(token.to_owned()),
                    ));
                }
                ancestor = self.parents.get(parent);
            }
        }

        // NOTE: Collapsing in id order keeps the numbering of stand-in nodes independent of hash ordering
        let mut order: Vec<_> = referenced.into_iter().collect();
        order.sort_unstable();
        let mut stand_ins = HashMap::new();
        for (group, token) in order {
            let stand_in = self
                .editor
                .collapse_group(group)
                .map_err(|kind| LabeledParseError::spanning(token, kind))?;
            stand_ins.insert(group, stand_in);
        }

        for (index, connection, targets) in deferred {
            let [end_a, end_b] = &connection.ends;
            let a = self.group_endpoint(end_a, targets[0], &stand_ins)?;
            let b = self.group_endpoint(end_b, targets[1], &stand_ins)?;
            let bond = self
                .editor
                .create_bond(a, b)
                .map_err(|kind| LabeledParseError::spanning(connection.token, kind))?;
            self.annotate(bond, &connection, ratios.get(&index))?;
        }
        Ok(())
    }

    fn group_endpoint(
        &self,
        end: &EndToken<'a>,
        target: Target,
        stand_ins: &HashMap<GroupId, NodeId>,
    ) -> ParseResult<'a, Endpoint> {
        match target {
            Target::Node(node) => {
                self.check_attachment(node, end)?;
                Ok(self.endpoint(node, end))
            }
            Target::Group(group) => {
                let stand_in = stand_ins.get(&group).copied().ok_or_else(|| {
                    LabeledParseError::spanning(
                        end.reference_text,
                        HelmErrorKind::MissingGroup(group.to_string()),
                    )
                })?;
                Ok(Endpoint::new(stand_in, end.attachment).with_site(site_text(end.site)))
            }
        }
    }

    fn create_connection(
        &mut self,
        connection: &Connection<'a>,
        node_a: NodeId,
        node_b: NodeId,
    ) -> ParseResult<'a, BondId> {
        let [a, b] = &connection.ends;
        let result = match (a.attachment, b.attachment) {
            (Attachment::Pair, Attachment::Pair) => {
                let is_rna = |end: &EndToken| end.reference.kind == PolymerKind::Rna;
                if !(is_rna(a) && is_rna(b)) {
                    return Err(LabeledParseError::spanning(
                        connection.token,
                        HelmErrorKind::PairOutsideRna,
                    ));
                }
                self.editor.create_hydrogen_bond(node_a, node_b)
            }
            (Attachment::Pair, _) | (_, Attachment::Pair) => {
                return Err(LabeledParseError::spanning(
                    connection.token,
                    HelmErrorKind::ExpectedConnection,
                ));
            }
            _ => {
                let (a, b) = (self.endpoint(node_a, a), self.endpoint(node_b, b));
                self.editor.create_bond(a, b)
            }
        };
        result.map_err(|kind| LabeledParseError::spanning(connection.token, kind))
    }

    fn annotate(
        &mut self,
        bond: BondId,
        connection: &Connection<'a>,
        ratio: Option<&(Reference, BondRatio)>,
    ) -> ParseResult<'a, ()> {
        let ratio = ratio.map(|(_, ratio)| ratio.clone());
        if ratio.is_none() && connection.tag.is_none() {
            return Ok(());
        }
        self.editor
            .annotate_bond(bond, ratio, connection.tag.clone())
            .map_err(|kind| LabeledParseError::spanning(connection.token, kind))
    }

    fn locate(&self, end: &EndToken<'a>) -> ParseResult<'a, Target> {
        if end.reference.kind == PolymerKind::Group {
            return self.groups.get(&end.reference).map(|&g| Target::Group(g)).ok_or_else(|| {
                LabeledParseError::spanning(
                    end.reference_text,
                    HelmErrorKind::UndeclaredGroup(end.reference.to_string()),
                )
            });
        }

        let chain = self.chains.get(&end.reference).ok_or_else(|| {
            LabeledParseError::spanning(
                end.reference_text,
                HelmErrorKind::UnknownChain(end.reference.to_string()),
            )
        })?;
        match end.site {
            Site::Position(position) => position
                .checked_sub(1)
                .and_then(|i| chain.positions.get(i))
                .map(|&node| Target::Node(node))
                .ok_or_else(|| {
                    LabeledParseError::spanning(
                        end.text,
                        HelmErrorKind::UnknownPosition {
                            chain: end.reference.to_string(),
                            position,
                        },
                    )
                }),
            Site::Wildcard(_) if chain.kind.is_single() => Ok(Target::Node(chain.positions[0])),
            Site::Wildcard(_) => self
                .wrappers
                .get(&end.reference)
                .map(|&group| Target::Group(group))
                .ok_or_else(|| {
                    LabeledParseError::spanning(
                        end.reference_text,
                        HelmErrorKind::UnknownChain(end.reference.to_string()),
                    )
                }),
        }
    }

    /// Blobs have no positions of their own, so they keep whatever site was written
    fn endpoint(&self, node: NodeId, end: &EndToken) -> Endpoint {
        let endpoint = Endpoint::new(node, end.attachment);
        if end.reference.kind == PolymerKind::Blob {
            endpoint.with_site(site_text(end.site))
        } else {
            endpoint
        }
    }

    fn check_attachment(&self, node: NodeId, end: &EndToken<'a>) -> ParseResult<'a, ()> {
        if let Some(definition) = self.definitions.get(&node)
            && end.attachment.is_numbered()
            && !definition.has_attachment(end.attachment)
        {
            return Err(LabeledParseError::spanning(
                end.text,
                HelmErrorKind::UndefinedAttachment {
                    symbol: definition.symbol.clone(),
                    attachment: end.attachment,
                },
            ));
        }
        Ok(())
    }

    fn apply_strands(&mut self, strands: Vec<StrandToken<'a>>) -> ParseResult<'a, ()> {
        for (reference, strand, token) in strands {
            match self.chains.get(&reference) {
                Some(chain) if chain.kind == PolymerKind::Rna => {
                    // Strand annotations can only come from RNA chains, which are never empty
                    let first = chain.positions[0];
                    self.editor
                        .set_strand(first, strand)
                        .map_err(|kind| LabeledParseError::spanning(token, kind))?;
                }
                _ => log::debug!("ignoring the strand annotation on {reference}, which isn't an RNA chain"),
            }
        }
        Ok(())
    }
}

fn site_text(site: Site) -> String {
    match site {
        Site::Position(position) => position.to_string(),
        Site::Wildcard(wildcard) => wildcard.to_owned(),
    }
}

// Section Tokenizers ==================================================================================================

type StrandToken<'a> = (Reference, Strand, &'a str);

/// Runs a `nom` parser over the start of a token, handing back whatever it didn't consume
fn run<'a, O>(result: NomResult<'a, O>) -> ParseResult<'a, (&'a str, O)> {
    result.finish()
}

fn connection_tokens(section: &str) -> ParseResult<'_, Vec<Connection<'_>>> {
    if section.is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(section, '|')
        .into_iter()
        .map(connection_token)
        .collect()
}

fn connection_token(token: &str) -> ParseResult<'_, Connection<'_>> {
    let detached = detach(token);
    if detached.repeat.is_some() {
        return Err(LabeledParseError::spanning(
            token,
            HelmErrorKind::ExpectedConnection,
        ));
    }
    let ConnectionToken { ends } = complete_parser(grammar::connection)(detached.body)?;
    Ok(Connection {
        token,
        ends,
        tag: detached.tag,
    })
}

/// Reads HELM2 JSON like `{"RNA1":{"strandtype":"ss"}}` or HELM1 annotations like `RNA1{ss}|RNA2{as}`
fn strand_annotations(section: &str) -> ParseResult<'_, Vec<StrandToken<'_>>> {
    if section.is_empty() {
        return Ok(Vec::new());
    }
    if section.starts_with('{') {
        return json_strands(section);
    }

    let mut strands = Vec::new();
    for token in split_top_level(section, '|') {
        let (rest, reference) = run(grammar::chain_id(token))?;
        let strand = rest
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .and_then(|s| s.parse().ok());
        match strand {
            Some(strand) => strands.push((reference, strand, token)),
            None => log::debug!("ignoring the unrecognized annotation {token:?}"),
        }
    }
    Ok(strands)
}

fn json_strands(section: &str) -> ParseResult<'_, Vec<StrandToken<'_>>> {
    let invalid = |message: String| {
        LabeledParseError::spanning(section, HelmErrorKind::InvalidAnnotation(message))
    };
    let json: Value = serde_json::from_str(section).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(chains) = json else {
        return Err(invalid("expected a JSON object".to_owned()));
    };

    let mut strands = Vec::new();
    for (key, value) in chains {
        let Ok(reference) = complete_parser(grammar::chain_id)(key.as_str()) else {
            log::debug!("ignoring the annotation for {key:?}, which isn't a polymer id");
            continue;
        };
        let Value::Object(properties) = value else {
            return Err(invalid(format!("the annotation for {key} must be an object")));
        };
        for (property, value) in properties {
            match (property.as_str(), value.as_str().map(str::parse)) {
                ("strandtype", Some(Ok(strand))) => strands.push((reference, strand, section)),
                ("strandtype", _) => {
                    return Err(invalid(format!(
                        "the strandtype of {key} must be \"ss\" or \"as\""
                    )));
                }
                _ => log::debug!("ignoring the unrecognized annotation {property:?} on {key}"),
            }
        }
    }
    Ok(strands)
}
