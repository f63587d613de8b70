//! Writing a [`MonomerGraph`] back out as HELM notation
//!
//! Serialization walks the graph (and every collapsed group nested inside it) through [`decompose`], giving each
//! single-type run of a backbone its own chain id. Everything gathered along the way lives in a [`Context`] that is
//! local to one call, so serializing never touches any shared state.

use std::{borrow::Cow, cmp::Reverse, collections::BTreeMap};

use ahash::{HashMap, HashMapExt, HashSet};
use itertools::Itertools;
use serde_json::{Map, Value, json};

use crate::{
    Biotype, Bond, BondId, BondKind, Endpoint, GroupId, GroupInfo, GroupLogic, HelmErrorKind, MonomerGraph,
    MonomerNode, MonomerStore, NodeId, PolymerKind, Repeat, RepeatBracket, Result, Symbol,
    annotation::quote,
    chain::{Chain, Segment, decompose},
    parser::Reference,
};

// Public API ==========================================================================================================

/// A reusable HELM writer. Output always carries all four `$` separators, and only ends with a version when asked.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Serializer {
    version: bool,
    depth_limit: usize,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    pub const VERSION: &str = "V2.0";
    pub const DEFAULT_DEPTH_LIMIT: usize = 64;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            version: false,
            depth_limit: Self::DEFAULT_DEPTH_LIMIT,
        }
    }

    /// Ends the notation with a `V2.0` version section
    #[must_use]
    pub const fn with_version(mut self) -> Self {
        self.version = true;
        self
    }

    /// Caps how deeply collapsed groups may nest inside one another
    #[must_use]
    pub const fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit;
        self
    }

    pub fn serialize(&self, graph: &MonomerGraph) -> Result<String> {
        let mut context = Context::new(self.depth_limit);
        context.walk(graph, None, 0)?;
        context.number_chains();
        context.resolve_groups();

        let mut notation = context.render()?;
        if self.version {
            notation.push_str(Self::VERSION);
        }
        log::trace!(
            "serialized {} chain(s) and {} group(s) as {notation:?}",
            context.segments.len(),
            context.groups.len()
        );
        Ok(notation)
    }
}

/// The natural-analog sequence of every chain in `graph`, one line per chain. Amino acids and the bases hanging off of
/// sugars become their natural analogs (or `?` when they have none), and `-` marks a change of polymer type.
pub fn natural_sequence(graph: &MonomerGraph, store: &(impl MonomerStore + ?Sized)) -> Result<String> {
    let mut lines = Vec::new();
    natural_lines(graph, store, 0, &mut lines)?;
    Ok(lines.join("\n"))
}

// Graph Walking =======================================================================================================

/// Everything gathered from one walk over a graph and the graphs of its collapsed groups
// NOTE: Nodes are keyed by id across nesting levels, which works because collapsing a group never re-numbers nodes
struct Context<'g> {
    depth_limit: usize,
    segments: Vec<SegmentEntry<'g>>,
    groups: Vec<GroupEntry>,
    /// Every bond that's written out as a connection
    bonds: Vec<&'g Bond>,
    /// The segment and (one-based) HELM position of every node that belongs to a chain
    locations: HashMap<NodeId, (usize, usize)>,
    stand_ins: HashMap<NodeId, usize>,
    repeats: Vec<&'g RepeatBracket>,
}

struct SegmentEntry<'g> {
    graph: &'g MonomerGraph,
    kind: PolymerKind,
    nodes: Vec<NodeId>,
    bases: Vec<Option<NodeId>>,
    number: u32,
    annotation: Option<String>,
}

struct GroupEntry {
    info: GroupInfo,
    members: Vec<Member>,
    /// `None` until the group is resolved, then `None` again inside if the group turned out to be empty
    resolved: Option<Option<MemberRef>>,
    /// The members written out for a group that survives resolution
    listed: Vec<MemberRef>,
    number: Option<u32>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Member {
    Chain(usize),
    Group(usize),
}

/// How a member appears in its parent group's list, like `PEPTIDE1:0.5`
#[derive(Clone, Eq, PartialEq, Debug)]
struct MemberRef {
    member: Member,
    ratio: Option<String>,
}

impl<'g> Context<'g> {
    fn new(depth_limit: usize) -> Self {
        Self {
            depth_limit,
            segments: Vec::new(),
            groups: Vec::new(),
            bonds: Vec::new(),
            locations: HashMap::new(),
            stand_ins: HashMap::new(),
            repeats: Vec::new(),
        }
    }

    /// Records every chain, group, and connection of `graph`. Anything not placed in a group of its own belongs to
    /// `scope`, the collapsed group `graph` was nested in.
    fn walk(&mut self, graph: &'g MonomerGraph, scope: Option<usize>, depth: usize) -> Result<()> {
        if depth > self.depth_limit {
            return Err(HelmErrorKind::NestingTooDeep(self.depth_limit).into());
        }
        let decomposition = decompose(graph);
        if let Some(&orphan) = decomposition.orphans.first() {
            let symbol = graph
                .node(orphan)
                .map_or_else(|| orphan.to_string(), |node| node.symbol().as_str().to_owned());
            return Err(HelmErrorKind::OrphanBase(symbol).into());
        }

        let expanded = self.expanded_groups(graph, scope, depth)?;
        for chain in &decomposition.chains {
            let segments = chain.segments(graph);
            for segment in &segments {
                let first = chain.nodes()[segment.range.start];
                let node = graph
                    .node(first)
                    .ok_or_else(|| HelmErrorKind::MissingNode(first.to_string()))?;
                let owner = match node.group() {
                    Some(group) => Some(
                        expanded
                            .get(&group)
                            .copied()
                            .ok_or_else(|| HelmErrorKind::MissingGroup(group.to_string()))?,
                    ),
                    None => scope,
                };

                if let Some(superatom) = node.superatom() {
                    let group = self.push_group(superatom.info().clone());
                    self.attach(Member::Group(group), owner);
                    self.stand_ins.insert(first, group);
                    self.walk(superatom.graph(), Some(group), depth + 1)?;
                } else {
                    let index = self.push_segment(graph, chain, segment);
                    self.attach(Member::Chain(index), owner);
                }
            }

            // Backbone bonds between segments of different types become connections, as does a circle's closing bond
            for pair in segments.windows(2) {
                self.push_bond(graph, chain.bonds()[pair[0].range.end - 1])?;
            }
            if let Some(closing) = chain.closing_bond() {
                self.push_bond(graph, closing)?;
            }
        }
        for &branch in &decomposition.branches {
            self.push_bond(graph, branch)?;
        }
        self.repeats.extend(graph.repeats());
        Ok(())
    }

    /// Creates an entry for each of `graph`'s expanded groups, nesting the top-level ones inside `scope`
    fn expanded_groups(
        &mut self,
        graph: &MonomerGraph,
        scope: Option<usize>,
        depth: usize,
    ) -> Result<HashMap<GroupId, usize>> {
        let mut expanded = HashMap::new();
        for (id, group) in graph.groups() {
            let ancestry: Vec<_> = graph.ancestry(id).collect();
            // `ancestry` stops early on a cycle, or when it reaches a group that doesn't exist
            if let Some(&last) = ancestry.last() {
                match graph.group(last) {
                    None => return Err(HelmErrorKind::MissingGroup(last.to_string()).into()),
                    Some(root) if root.parent.is_some() => {
                        return Err(HelmErrorKind::CyclicGroup(id.to_string()).into());
                    }
                    Some(_) => (),
                }
            }
            if depth + ancestry.len() > self.depth_limit {
                return Err(HelmErrorKind::NestingTooDeep(self.depth_limit).into());
            }
            expanded.insert(id, self.push_group(group.info.clone()));
        }

        for (id, group) in graph.groups() {
            let parent = group.parent.and_then(|parent| expanded.get(&parent).copied());
            if let Some(&index) = expanded.get(&id) {
                self.attach(Member::Group(index), parent.or(scope));
            }
        }
        Ok(expanded)
    }

    fn push_group(&mut self, info: GroupInfo) -> usize {
        self.groups.push(GroupEntry {
            info,
            members: Vec::new(),
            resolved: None,
            listed: Vec::new(),
            number: None,
        });
        self.groups.len() - 1
    }

    fn attach(&mut self, member: Member, owner: Option<usize>) {
        if let Some(owner) = owner {
            self.groups[owner].members.push(member);
        }
    }

    fn push_segment(&mut self, graph: &'g MonomerGraph, chain: &Chain, segment: &Segment) -> usize {
        let index = self.segments.len();
        let nodes = chain.nodes()[segment.range.clone()].to_vec();
        let bases = chain.bases()[segment.range.clone()].to_vec();

        // HELM counts bases as positions of their own, right after the sugar they hang off of
        let mut position = 0;
        for (&node, &base) in nodes.iter().zip(&bases) {
            position += 1;
            self.locations.insert(node, (index, position));
            if let Some(base) = base {
                position += 1;
                self.locations.insert(base, (index, position));
            }
        }

        self.segments.push(SegmentEntry {
            graph,
            kind: segment.kind,
            nodes,
            bases,
            number: 0,
            annotation: None,
        });
        index
    }

    fn push_bond(&mut self, graph: &'g MonomerGraph, id: BondId) -> Result<()> {
        let bond = graph
            .bond(id)
            .ok_or_else(|| HelmErrorKind::DanglingBond(id.to_string()))?;
        self.bonds.push(bond);
        Ok(())
    }

    // Numbering -------------------------------------------------------------------------------------------------------

    /// Chains are numbered per type, in order of the earliest node each contains
    fn number_chains(&mut self) {
        let order: Vec<_> = (0..self.segments.len())
            .sorted_by_key(|&index| {
                let segment = &self.segments[index];
                let first = segment.nodes.iter().chain(segment.bases.iter().flatten()).min();
                (segment.kind, first.copied())
            })
            .collect();

        let mut counters: BTreeMap<PolymerKind, u32> = BTreeMap::new();
        for index in order {
            let counter = counters.entry(self.segments[index].kind).or_default();
            *counter += 1;
            self.segments[index].number = *counter;
        }
    }

    /// Drops empty groups, demotes single-member groups to their member, then numbers whatever groups remain
    fn resolve_groups(&mut self) {
        for group in 0..self.groups.len() {
            self.resolve(group);
        }

        let surviving: Vec<_> = (0..self.groups.len())
            .filter(|&group| !self.groups[group].listed.is_empty())
            .sorted_by_cached_key(|&group| {
                let chains = self.chains_within(Member::Group(group));
                let first = chains.iter().min().cloned();
                // A group always holds more chains than any group nested inside of it, so outer groups come first
                (first, Reverse(chains.len()))
            })
            .collect();
        for (number, group) in (1..).zip(surviving) {
            self.groups[group].number = Some(number);
        }
    }

    fn resolve(&mut self, group: usize) -> Option<MemberRef> {
        if let Some(resolved) = &self.groups[group].resolved {
            return resolved.clone();
        }

        let members = self.groups[group].members.clone();
        let listed: Vec<_> = members
            .into_iter()
            .filter_map(|member| match member {
                Member::Chain(_) => Some(MemberRef {
                    member,
                    ratio: None,
                }),
                Member::Group(inner) => self.resolve(inner),
            })
            .collect();

        let resolved = match <[_; 1]>::try_from(listed) {
            Ok([only]) => Some(self.demote(group, only)),
            Err(listed) if listed.is_empty() => {
                log::debug!("dropping a group with no members");
                None
            }
            Err(listed) => {
                self.groups[group].listed = listed;
                Some(MemberRef {
                    member: Member::Group(group),
                    ratio: self.groups[group].info.ratio.clone(),
                })
            }
        };
        self.groups[group].resolved = Some(resolved.clone());
        resolved
    }

    /// A group with a single member is written as that member: its tag becomes the member's annotation, and its ratio
    /// is written after the member's id
    fn demote(&mut self, group: usize, only: MemberRef) -> MemberRef {
        let GroupInfo { ratio, tag, .. } = self.groups[group].info.clone();
        if let Some(tag) = tag {
            let slot = match only.member {
                Member::Chain(segment) => &mut self.segments[segment].annotation,
                Member::Group(inner) => &mut self.groups[inner].info.tag,
            };
            if slot.is_some() {
                log::debug!("dropping the tag {tag:?} of a single-member group, whose member is already tagged");
            } else {
                *slot = Some(tag);
            }
        }
        MemberRef {
            member: only.member,
            ratio: ratio.or(only.ratio),
        }
    }

    fn chains_within(&self, member: Member) -> Vec<String> {
        match member {
            Member::Chain(segment) => vec![self.segments[segment].reference().to_string()],
            Member::Group(group) => self.groups[group]
                .listed
                .iter()
                .flat_map(|inner| self.chains_within(inner.member))
                .collect(),
        }
    }

    fn member_reference(&self, member: Member) -> Reference {
        match member {
            Member::Chain(segment) => self.segments[segment].reference(),
            Member::Group(group) => Reference {
                kind: PolymerKind::Group,
                number: self.groups[group].number.unwrap_or_default(),
            },
        }
    }
}

impl SegmentEntry<'_> {
    const fn reference(&self) -> Reference {
        Reference {
            kind: self.kind,
            number: self.number,
        }
    }

    fn node(&self, id: NodeId) -> Result<&MonomerNode> {
        self.graph
            .node(id)
            .ok_or_else(|| HelmErrorKind::MissingNode(id.to_string()).into())
    }
}

// Rendering ===========================================================================================================

impl Context<'_> {
    fn render(&self) -> Result<String> {
        let polymers = self.render_polymers()?;
        let (connections, ratios) = self.render_connections()?;
        let groups = self.render_groups(ratios);
        let annotations = self.render_annotations()?;
        Ok(format!("{polymers}${connections}${groups}${annotations}$"))
    }

    fn render_polymers(&self) -> Result<String> {
        let mut polymers = Vec::with_capacity(self.segments.len());
        for (index, segment) in self.segments.iter().enumerate() {
            let body = match segment.kind {
                PolymerKind::Peptide | PolymerKind::Rna => self.render_sequence(index)?,
                PolymerKind::Chem | PolymerKind::Blob | PolymerKind::Group => {
                    let node = segment.node(segment.nodes[0])?;
                    let mut body = symbol_text(node.symbol()).into_owned();
                    if segment.kind == PolymerKind::Chem
                        && let Some(tag) = node.tag()
                    {
                        body.push_str(&quote(tag));
                    }
                    body
                }
            };

            // A blob's tag is written as the annotation of its chain
            let blob_tag = if segment.kind == PolymerKind::Blob {
                segment.node(segment.nodes[0])?.tag()
            } else {
                None
            };
            let annotation = blob_tag.or(segment.annotation.as_deref()).map(quote);

            let polymer = format!(
                "{}{{{body}}}{}",
                segment.reference(),
                annotation.unwrap_or_default()
            );
            polymers.push(((segment.kind.prefix(), segment.number), polymer));
        }
        polymers.sort_unstable();
        Ok(polymers.into_iter().map(|(_, polymer)| polymer).join("|"))
    }

    /// Renders a PEPTIDE or RNA body, folding any repeat brackets that still line up back into `(...)'n'` notation
    fn render_sequence(&self, index: usize) -> Result<String> {
        let segment = &self.segments[index];
        let items: Vec<_> = (0..segment.nodes.len())
            .map(|position| self.render_position(segment, position))
            .collect::<Result<_>>()?;
        let mut separated: Vec<_> = (1..segment.nodes.len())
            .map(|position| needs_separator(segment, position))
            .collect::<Result<_>>()?;

        let brackets = self.aligned_brackets(index, &items);
        for &(start, end, _) in &brackets {
            if let Some(before) = start.checked_sub(1) {
                separated[before] = true;
            }
            if end < segment.nodes.len() {
                separated[end - 1] = true;
            }
        }

        let join = |range: std::ops::Range<usize>| {
            let mut text = String::new();
            for position in range.clone() {
                if position > range.start && separated[position - 1] {
                    text.push('.');
                }
                text.push_str(&items[position]);
            }
            text
        };

        let mut body = String::new();
        let mut position = 0;
        let mut brackets = brackets.into_iter().peekable();
        while position < segment.nodes.len() {
            if position > 0 && separated[position - 1] {
                body.push('.');
            }
            let Some((start, end, bracket)) = brackets.next_if(|&(start, ..)| start == position) else {
                body.push_str(&items[position]);
                position += 1;
                continue;
            };

            let unit = (end - start) / bracket.copies;
            let unit_text = join(start..start + unit);
            let single_item = !separated[start..start + unit - 1].contains(&true);
            match bracket.repeat {
                Repeat::Exact(1) => body.push_str(&format!("({unit_text})")),
                repeat if single_item => body.push_str(&format!("{unit_text}'{repeat}'")),
                repeat => body.push_str(&format!("({unit_text})'{repeat}'")),
            }
            if let Some(tag) = &bracket.tag {
                body.push_str(&quote(tag));
            }
            position = end;
        }
        Ok(body)
    }

    fn render_position(&self, segment: &SegmentEntry, position: usize) -> Result<String> {
        let node = segment.node(segment.nodes[position])?;
        let mut item = symbol_text(node.symbol()).into_owned();
        if let Some(base) = segment.bases[position] {
            let base = segment.node(base)?;
            let symbol = match base.symbol() {
                Symbol::Ambiguous(mixture) => Cow::Borrowed(mixture.as_str()),
                symbol => symbol_text(symbol),
            };
            item.push('(');
            item.push_str(&symbol);
            if let Some(tag) = base.tag() {
                item.push_str(&quote(tag));
            }
            item.push(')');
        }
        if let Some(tag) = node.tag() {
            item.push_str(&quote(tag));
        }
        Ok(item)
    }

    /// The brackets on segment `index` that still cover a whole run of positions and whose copies still match. Returns
    /// the (backbone) range each bracket covers, sorted and without overlaps.
    fn aligned_brackets(&self, index: usize, items: &[String]) -> Vec<(usize, usize, &RepeatBracket)> {
        let segment = &self.segments[index];
        let mut aligned: Vec<_> = self
            .repeats
            .iter()
            .filter(|bracket| {
                bracket
                    .nodes
                    .first()
                    .and_then(|node| self.locations.get(node))
                    .is_some_and(|&(segment, _)| segment == index)
            })
            .filter_map(|&bracket| {
                let range = align(segment, bracket, items);
                if range.is_none() {
                    log::debug!(
                        "dropping a '{}' repeat that no longer lines up with its chain",
                        bracket.repeat
                    );
                }
                range.map(|(start, end)| (start, end, bracket))
            })
            // An untagged single copy says nothing, so it's written as a plain run
            .filter(|(_, _, bracket)| bracket.repeat != Repeat::Exact(1) || bracket.tag.is_some())
            .collect();

        aligned.sort_by_key(|&(start, end, _)| (start, end));
        let mut covered = 0;
        aligned.retain(|&(start, end, _)| {
            let keep = start >= covered;
            if keep {
                covered = end;
            } else {
                log::debug!("dropping a repeat that overlaps another");
            }
            keep
        });
        aligned
    }

    fn render_connections(&self) -> Result<(String, Vec<String>)> {
        let mut covalent = Vec::new();
        let mut pairs = Vec::new();
        let mut ratios = Vec::new();
        for bond in &self.bonds {
            let (id_a, site_a) = self.endpoint_text(bond.a())?;
            let (id_b, site_b) = self.endpoint_text(bond.b())?;
            let mut connection = format!(
                "{id_a},{id_b},{site_a}:{}-{site_b}:{}",
                bond.a().attachment,
                bond.b().attachment
            );
            if let Some(tag) = bond.tag() {
                connection.push_str(&quote(tag));
            }

            if let Some(ratio) = bond.ratio() {
                ratios.push((connection.clone(), format!("{id_a}:{}+{id_b}:{}", ratio.a, ratio.b)));
            }
            match bond.kind() {
                BondKind::Covalent => covalent.push(connection),
                BondKind::Hydrogen => pairs.push(connection),
            }
        }
        covalent.sort_unstable();
        pairs.sort_unstable();
        ratios.sort_unstable();

        let connections = covalent.into_iter().chain(pairs).join("|");
        Ok((connections, ratios.into_iter().map(|(_, members)| members).collect()))
    }

    /// The chain id and site written for one end of a connection
    fn endpoint_text(&self, endpoint: &Endpoint) -> Result<(Reference, String)> {
        if let Some(&(segment, position)) = self.locations.get(&endpoint.node) {
            let segment = &self.segments[segment];
            let site = if segment.kind == PolymerKind::Blob {
                endpoint.site.clone().unwrap_or_else(|| "?".to_owned())
            } else {
                position.to_string()
            };
            return Ok((segment.reference(), site));
        }

        let group = self
            .stand_ins
            .get(&endpoint.node)
            .and_then(|&group| self.groups[group].resolved.clone().flatten())
            .ok_or_else(|| HelmErrorKind::DanglingBond(endpoint.node.to_string()))?;
        let site = match group.member {
            // Connections to a lone CHEM always land on its only monomer
            Member::Chain(segment) if self.segments[segment].kind == PolymerKind::Chem => "1".to_owned(),
            _ => endpoint.site.clone().unwrap_or_else(|| "?".to_owned()),
        };
        Ok((self.member_reference(group.member), site))
    }

    fn render_groups(&self, ratios: Vec<String>) -> String {
        let mut surviving: Vec<_> = self
            .groups
            .iter()
            .filter_map(|group| Some((group.number?, group)))
            .collect();
        surviving.sort_unstable_by_key(|&(number, _)| number);

        let mut groups = Vec::with_capacity(surviving.len() + ratios.len());
        for &(number, group) in &surviving {
            let members = group
                .listed
                .iter()
                .map(|member| {
                    let id = self.member_reference(member.member).to_string();
                    match &member.ratio {
                        Some(ratio) => format!("{id}:{ratio}"),
                        None => id,
                    }
                })
                .sorted_unstable()
                .join(&group.info.logic.unwrap_or(GroupLogic::Or).to_string());
            let tag = group.info.tag.as_deref().map(quote).unwrap_or_default();
            groups.push(format!("G{number}({members}){tag}"));
        }

        let first_ratio = surviving.len() + 1;
        groups.extend(
            (first_ratio..)
                .zip(ratios)
                .map(|(number, members)| format!("G{number}({members})")),
        );
        groups.join("|")
    }

    fn render_annotations(&self) -> Result<String> {
        let mut strands = Map::new();
        for segment in self.segments.iter().filter(|s| s.kind == PolymerKind::Rna) {
            for &node in &segment.nodes {
                if let Some(strand) = segment.node(node)?.strand() {
                    let id = segment.reference().to_string();
                    strands.insert(id, json!({ "strandtype": strand.to_string() }));
                    break;
                }
            }
        }
        if strands.is_empty() {
            return Ok(String::new());
        }
        Ok(Value::Object(strands).to_string())
    }
}

// Private Helpers =====================================================================================================

/// Multi-character monomers and SMILES are written in `[...]`, while wildcards and mixtures are written as they came
fn symbol_text(symbol: &Symbol) -> Cow<'_, str> {
    match symbol {
        Symbol::Monomer(code) if code.chars().count() == 1 => Cow::Borrowed(code.as_str()),
        Symbol::Monomer(code) | Symbol::Smiles(code) => Cow::Owned(format!("[{code}]")),
        Symbol::Ambiguous(code) => Cow::Borrowed(code.as_str()),
        Symbol::Blob(_) | Symbol::Group => Cow::Borrowed(symbol.as_str()),
    }
}

/// Whether a `.` is needed between `position` and the position before it. In RNA, an untagged sugar runs straight
/// into the linker after it, as in `R(A)P`.
fn needs_separator(segment: &SegmentEntry, position: usize) -> Result<bool> {
    if segment.kind != PolymerKind::Rna {
        return Ok(true);
    }
    let previous = segment.node(segment.nodes[position - 1])?;
    let current = segment.node(segment.nodes[position])?;
    Ok(!(previous.biotype() == Biotype::Sugar
        && previous.tag().is_none()
        && current.biotype() == Biotype::Linker))
}

/// Finds the backbone range `bracket` covers on `segment`, as long as it covers that range (and the bases hanging off of
/// it) exactly, and every copy of the repeated unit is still identical
fn align(segment: &SegmentEntry, bracket: &RepeatBracket, items: &[String]) -> Option<(usize, usize)> {
    let members: HashSet<_> = bracket.nodes.iter().copied().collect();
    let positions: Vec<_> = segment
        .nodes
        .iter()
        .positions(|node| members.contains(node))
        .collect();
    let (&start, &last) = (positions.first()?, positions.last()?);
    let end = last + 1;

    let covered: HashSet<_> = (start..end)
        .flat_map(|position| [Some(segment.nodes[position]), segment.bases[position]])
        .flatten()
        .collect();
    if positions.len() != end - start || covered != members {
        return None;
    }

    let copies = bracket.copies;
    if copies == 0 || copies != bracket.repeat.copies() || (end - start) % copies != 0 {
        return None;
    }
    let unit = (end - start) / copies;
    let copies_match = (1..copies).all(|copy| {
        let offset = start + copy * unit;
        items[start..start + unit] == items[offset..offset + unit]
    });
    copies_match.then_some((start, end))
}

fn natural_lines(
    graph: &MonomerGraph,
    store: &(impl MonomerStore + ?Sized),
    depth: usize,
    lines: &mut Vec<String>,
) -> Result<()> {
    if depth > Serializer::DEFAULT_DEPTH_LIMIT {
        return Err(HelmErrorKind::NestingTooDeep(Serializer::DEFAULT_DEPTH_LIMIT).into());
    }

    let mut nested = Vec::new();
    for chain in decompose(graph).chains {
        let mut line = String::new();
        let mut previous = None;
        for (&id, &base) in chain.nodes().iter().zip(chain.bases()) {
            let Some(node) = graph.node(id) else {
                continue;
            };
            if let Some(superatom) = node.superatom() {
                nested.push(superatom.graph());
            }

            let analog = match node.biotype() {
                Biotype::AminoAcid => Some(natural_analog(store, node)),
                Biotype::Sugar => base
                    .and_then(|base| graph.node(base))
                    .map(|base| natural_analog(store, base)),
                _ => None,
            };
            let polymer = node.polymer();
            if let Some(analog) = analog {
                if previous.is_some_and(|previous| previous != polymer)
                    && !line.is_empty()
                    && !line.ends_with('-')
                {
                    line.push('-');
                }
                line.push_str(analog);
            }
            previous = Some(polymer);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }

    for graph in nested {
        natural_lines(graph, store, depth + 1, lines)?;
    }
    Ok(())
}

fn natural_analog<'s>(store: &'s (impl MonomerStore + ?Sized), node: &MonomerNode) -> &'s str {
    store
        .lookup(node.biotype(), node.symbol().as_str())
        .and_then(|definition| definition.natural_analog.as_deref())
        .unwrap_or("?")
}
