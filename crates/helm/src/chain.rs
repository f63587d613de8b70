//! Splits a monomer graph into backbone chains, the bases hanging off of them, and whatever branches remain

use std::{
    collections::{BTreeSet, VecDeque},
    ops::Range,
};

use crate::{Attachment, Biotype, BondId, BondKind, MonomerGraph, NodeId, PolymerKind};

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Chain {
    nodes: Vec<NodeId>,
    bases: Vec<Option<NodeId>>,
    /// Backbone bonds in chain order. The bond closing a circle comes last.
    bonds: Vec<BondId>,
    circular: bool,
}

/// A run of a chain with a single polymer type, like the PEPTIDE part of a PEPTIDE-CHEM conjugate
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Segment {
    pub kind: PolymerKind,
    pub range: Range<usize>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Decomposition {
    pub chains: Vec<Chain>,
    /// Bonds that are neither part of a backbone, nor hold a base to its sugar
    pub branches: Vec<BondId>,
    /// Bases that aren't attached to any sugar
    pub orphans: Vec<NodeId>,
}

impl Chain {
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The base attached to each backbone node, in step with [`Chain::nodes`]
    #[must_use]
    pub fn bases(&self) -> &[Option<NodeId>] {
        &self.bases
    }

    #[must_use]
    pub fn bonds(&self) -> &[BondId] {
        &self.bonds
    }

    #[must_use]
    pub const fn is_circle(&self) -> bool {
        self.circular
    }

    /// The bond joining the last node of a circular chain back to its first
    #[must_use]
    pub fn closing_bond(&self) -> Option<BondId> {
        self.circular.then(|| self.bonds.last().copied()).flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Splits the chain wherever its polymer type changes. CHEM, BLOB, and collapsed group nodes always stand alone.
    #[must_use]
    pub fn segments(&self, graph: &MonomerGraph) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        for (i, &node) in self.nodes.iter().enumerate() {
            let kind = polymer_of(graph, node);
            match segments.last_mut() {
                Some(last) if last.kind == kind && !kind.is_single() => last.range.end = i + 1,
                _ => segments.push(Segment {
                    kind,
                    range: i..i + 1,
                }),
            }
        }
        segments
    }

    fn rotate_left(&mut self, mid: usize) {
        if mid == 0 {
            return;
        }
        self.nodes.rotate_left(mid);
        self.bases.rotate_left(mid);
        self.bonds.rotate_left(mid);
    }
}

/// Walks every backbone of `graph`. Chains are ordered by the earliest-created node they contain.
#[must_use]
pub fn decompose(graph: &MonomerGraph) -> Decomposition {
    let mut remaining: BTreeSet<_> = graph
        .bonds()
        .filter(|(_, bond)| bond.is_backbone())
        .map(|(id, _)| id)
        .collect();
    let mut visited = BTreeSet::new();
    let mut chains = Vec::new();
    let mut branches = Vec::new();

    while let Some(seed) = remaining.pop_first() {
        let Some((head, tail)) = graph.bond(seed).and_then(|b| b.backbone_order()) else {
            continue;
        };
        // Opaque nodes can sit on several backbones, but each node only ever belongs to one chain
        if visited.contains(&head) || visited.contains(&tail) {
            branches.push(seed);
            continue;
        }
        let chain = extend(graph, &mut remaining, &mut visited, seed, head, tail);
        chains.push(chain);
    }

    for (id, node) in graph.nodes() {
        if !visited.contains(&id) && node.biotype() != Biotype::Base {
            chains.push(Chain {
                nodes: vec![id],
                bases: vec![None],
                ..Chain::default()
            });
        }
    }

    branches.extend(
        graph
            .bonds()
            .filter(|(_, bond)| !bond.is_backbone())
            .map(|(id, _)| id),
    );
    let mut claimed = BTreeSet::new();
    for chain in &mut chains {
        claim_bases(graph, chain, &mut claimed, &mut branches);
        if chain.circular {
            orient_circle(graph, chain);
        }
    }
    chains.sort_by_key(|chain| chain.nodes.iter().min().copied());
    branches.sort_unstable();

    let orphans = graph
        .nodes()
        .filter(|&(id, node)| node.biotype() == Biotype::Base && !claimed.contains(&id))
        .map(|(id, _)| id)
        .collect();

    log::trace!(
        "decomposed {} nodes into {} chains with {} branches",
        graph.node_count(),
        chains.len(),
        branches.len()
    );
    Decomposition {
        chains,
        branches,
        orphans,
    }
}

/// The chain whose backbone contains `node`, or `None` if it's a base or isn't in the graph
#[must_use]
pub fn chain_of(graph: &MonomerGraph, node: NodeId) -> Option<Chain> {
    decompose(graph)
        .chains
        .into_iter()
        .find(|chain| chain.contains(node))
}

// Private Helpers =====================================================================================================

fn polymer_of(graph: &MonomerGraph, node: NodeId) -> PolymerKind {
    graph
        .node(node)
        .map_or(PolymerKind::Blob, |node| node.polymer())
}

fn extend(
    graph: &MonomerGraph,
    remaining: &mut BTreeSet<BondId>,
    visited: &mut BTreeSet<NodeId>,
    seed: BondId,
    head: NodeId,
    tail: NodeId,
) -> Chain {
    let mut nodes = VecDeque::from([head, tail]);
    let mut bonds = VecDeque::from([seed]);
    visited.extend([head, tail]);
    let mut circular = false;

    // NOTE: Each pass scans every remaining bond, which is fine for chains of realistic length
    loop {
        let (first, last) = (nodes[0], nodes[nodes.len() - 1]);
        let next = remaining.iter().find_map(|&id| {
            let (from, to) = graph.bond(id)?.backbone_order()?;
            let appends = from == last && (to == first || !visited.contains(&to));
            let prepends = to == first && !visited.contains(&from);
            (appends || prepends).then_some((id, from, to))
        });
        let Some((id, from, to)) = next else {
            break;
        };
        remaining.remove(&id);

        if from == last && to == first {
            bonds.push_back(id);
            circular = true;
            break;
        } else if from == last {
            nodes.push_back(to);
            bonds.push_back(id);
            visited.insert(to);
        } else {
            nodes.push_front(from);
            bonds.push_front(id);
            visited.insert(from);
        }
    }

    let nodes: Vec<_> = nodes.into();
    Chain {
        bases: vec![None; nodes.len()],
        nodes,
        bonds: bonds.into(),
        circular,
    }
}

fn claim_bases(
    graph: &MonomerGraph,
    chain: &mut Chain,
    claimed: &mut BTreeSet<NodeId>,
    branches: &mut Vec<BondId>,
) {
    for (i, &node) in chain.nodes.iter().enumerate() {
        if graph.node(node).map(|n| n.biotype()) != Some(Biotype::Sugar) {
            continue;
        }
        let base_bond = branches.iter().position(|&id| {
            graph.bond(id).is_some_and(|bond| {
                bond.kind() == BondKind::Covalent
                    && bond.end_at(node).is_some_and(|e| e.attachment == Attachment::R3)
                    && bond.other(node).is_some_and(|e| {
                        e.attachment == Attachment::R1
                            && graph.node(e.node).map(|n| n.biotype()) == Some(Biotype::Base)
                            && !claimed.contains(&e.node)
                    })
            })
        });
        if let Some(position) = base_bond {
            let id = branches.remove(position);
            if let Some(base) = graph.bond(id).and_then(|b| b.other(node)) {
                chain.bases[i] = Some(base.node);
                claimed.insert(base.node);
            }
        }
    }
}

fn orient_circle(graph: &MonomerGraph, chain: &mut Chain) {
    let len = chain.nodes.len();
    let start = chain
        .nodes
        .iter()
        .enumerate()
        .min_by_key(|&(_, id)| id)
        .map_or(0, |(i, _)| i);
    chain.rotate_left(start);

    let biotype = |i: usize| graph.node(chain.nodes[i % len]).map(|n| n.biotype());
    if len > 1 && biotype(0) == Some(Biotype::Linker) && biotype(1) == Some(Biotype::Sugar) {
        chain.rotate_left(1);
    }

    let splits_after = |i: usize| {
        let (a, b) = (
            polymer_of(graph, chain.nodes[i % len]),
            polymer_of(graph, chain.nodes[(i + 1) % len]),
        );
        a != b || a.is_single()
    };
    if len > 1
        && !splits_after(len - 1)
        && let Some(boundary) = (0..len - 1).find(|&i| splits_after(i))
    {
        chain.rotate_left(boundary + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Endpoint, GraphEditor, MonomerNode, Symbol};

    fn add(graph: &mut MonomerGraph, biotype: Biotype, symbol: &str) -> NodeId {
        graph.create_node(MonomerNode::new(
            biotype,
            Symbol::Monomer(symbol.to_owned()),
        ))
    }

    fn link(graph: &mut MonomerGraph, from: NodeId, to: NodeId) -> BondId {
        graph
            .create_bond(
                Endpoint::new(from, Attachment::R2),
                Endpoint::new(to, Attachment::R1),
            )
            .unwrap()
    }

    fn peptide(graph: &mut MonomerGraph, symbols: &str) -> Vec<NodeId> {
        let nodes: Vec<_> = symbols
            .chars()
            .map(|c| add(graph, Biotype::AminoAcid, &c.to_string()))
            .collect();
        for pair in nodes.windows(2) {
            link(graph, pair[0], pair[1]);
        }
        nodes
    }

    #[test]
    fn unbonded_nodes_are_singleton_chains() {
        let mut graph = MonomerGraph::new();
        for symbol in ["A", "G", "L", "K"] {
            add(&mut graph, Biotype::AminoAcid, symbol);
        }
        let decomposition = decompose(&graph);
        assert_eq!(decomposition.chains.len(), 4);
        assert!(decomposition.chains.iter().all(|c| c.len() == 1 && !c.is_circle()));
        assert!(decomposition.branches.is_empty());
    }

    #[test]
    fn linear_chains_run_from_r1_to_r2() {
        let mut graph = MonomerGraph::new();
        let [a, b, c] = ["A", "G", "L"].map(|s| add(&mut graph, Biotype::AminoAcid, s));
        // Bonds are made out of order, so the chain has to grow in both directions
        let bc = link(&mut graph, b, c);
        let ab = link(&mut graph, a, b);

        let chain = chain_of(&graph, c).unwrap();
        assert_eq!(chain.nodes(), [a, b, c]);
        assert_eq!(chain.bonds(), [ab, bc]);
        assert!(!chain.is_circle());
        assert_eq!(chain.closing_bond(), None);
    }

    #[test]
    fn closed_loops_are_circles() {
        let mut graph = MonomerGraph::new();
        let nodes = peptide(&mut graph, "CAGC");
        let closing = link(&mut graph, nodes[3], nodes[0]);

        let decomposition = decompose(&graph);
        assert_eq!(decomposition.chains.len(), 1);
        let chain = &decomposition.chains[0];
        assert!(chain.is_circle());
        assert_eq!(chain.nodes(), nodes);
        assert_eq!(chain.bonds().len(), 4);
        assert_eq!(chain.closing_bond(), Some(closing));
    }

    #[test]
    fn circles_start_at_the_earliest_node() {
        let mut graph = MonomerGraph::new();
        let [a, b, c] = ["A", "G", "L"].map(|s| add(&mut graph, Biotype::AminoAcid, s));
        link(&mut graph, b, c);
        link(&mut graph, c, a);
        let closing = link(&mut graph, a, b);

        let chain = chain_of(&graph, b).unwrap();
        assert_eq!(chain.nodes(), [a, b, c]);
        assert!(chain.is_circle());
        // Whichever bond joins the last node back to the first closes the circle
        let closing_bond = graph.bond(chain.closing_bond().unwrap()).unwrap();
        assert_eq!(closing_bond.backbone_order(), Some((c, a)));
        assert_ne!(chain.closing_bond(), Some(closing));
    }

    #[test]
    fn rna_circles_never_start_on_a_linker() {
        let mut graph = MonomerGraph::new();
        let p1 = add(&mut graph, Biotype::Linker, "P");
        let r1 = add(&mut graph, Biotype::Sugar, "R");
        let p2 = add(&mut graph, Biotype::Linker, "P");
        let r2 = add(&mut graph, Biotype::Sugar, "R");
        link(&mut graph, p1, r1);
        link(&mut graph, r1, p2);
        link(&mut graph, p2, r2);
        link(&mut graph, r2, p1);

        let chain = chain_of(&graph, p1).unwrap();
        assert_eq!(chain.nodes(), [r1, p2, r2, p1]);
    }

    #[test]
    fn mixed_circles_start_at_a_type_boundary() {
        let mut graph = MonomerGraph::new();
        let peptide = peptide(&mut graph, "AG");
        let chem = add(&mut graph, Biotype::Chem, "SMCC");
        let tail = add(&mut graph, Biotype::AminoAcid, "L");
        link(&mut graph, peptide[1], chem);
        link(&mut graph, chem, tail);
        link(&mut graph, tail, peptide[0]);

        let decomposition = decompose(&graph);
        let chain = &decomposition.chains[0];
        assert_eq!(chain.nodes(), [chem, tail, peptide[0], peptide[1]]);
        let segments = chain.segments(&graph);
        assert_eq!(
            segments,
            [
                Segment {
                    kind: PolymerKind::Chem,
                    range: 0..1
                },
                Segment {
                    kind: PolymerKind::Peptide,
                    range: 1..4
                },
            ]
        );
    }

    #[test]
    fn bases_are_claimed_by_their_sugars() {
        let mut graph = MonomerGraph::new();
        let sugar = add(&mut graph, Biotype::Sugar, "R");
        let base = add(&mut graph, Biotype::Base, "A");
        let linker = add(&mut graph, Biotype::Linker, "P");
        let lone_sugar = add(&mut graph, Biotype::Sugar, "R");
        let lone_base = add(&mut graph, Biotype::Base, "U");
        let orphan = add(&mut graph, Biotype::Base, "G");
        link(&mut graph, sugar, linker);
        for (s, b) in [(sugar, base), (lone_sugar, lone_base)] {
            graph
                .create_bond(
                    Endpoint::new(s, Attachment::R3),
                    Endpoint::new(b, Attachment::R1),
                )
                .unwrap();
        }

        let decomposition = decompose(&graph);
        assert_eq!(decomposition.chains.len(), 2);
        assert_eq!(decomposition.chains[0].bases(), [Some(base), None]);
        assert_eq!(decomposition.chains[1].nodes(), [lone_sugar]);
        assert_eq!(decomposition.chains[1].bases(), [Some(lone_base)]);
        assert!(decomposition.branches.is_empty());
        assert_eq!(decomposition.orphans, [orphan]);
        assert_eq!(chain_of(&graph, base), None);
    }

    #[test]
    fn side_chain_bonds_are_branches() {
        let mut graph = MonomerGraph::new();
        let first = peptide(&mut graph, "CAC");
        let second = peptide(&mut graph, "CG");
        let bridge = graph
            .create_bond(
                Endpoint::new(first[2], Attachment::R3),
                Endpoint::new(second[0], Attachment::R3),
            )
            .unwrap();
        let pair = graph.create_hydrogen_bond(first[1], second[1]).unwrap();

        let decomposition = decompose(&graph);
        assert_eq!(decomposition.chains.len(), 2);
        assert_eq!(decomposition.chains[0].nodes(), first);
        assert_eq!(decomposition.chains[1].nodes(), second);
        assert_eq!(decomposition.branches, [bridge, pair]);
    }

    #[test]
    fn opaque_nodes_join_only_one_chain() {
        let mut graph = MonomerGraph::new();
        let blob = graph.create_node(MonomerNode::new(Biotype::Blob, Symbol::Blob(None)));
        let [a, b] = ["A", "G"].map(|s| add(&mut graph, Biotype::AminoAcid, s));
        link(&mut graph, blob, a);
        let second = link(&mut graph, blob, b);

        let decomposition = decompose(&graph);
        assert_eq!(decomposition.chains.len(), 2);
        assert_eq!(decomposition.chains[0].nodes(), [blob, a]);
        assert_eq!(decomposition.chains[1].nodes(), [b]);
        assert_eq!(decomposition.branches, [second]);
    }

    #[test]
    fn chain_of_unknown_node() {
        let mut graph = MonomerGraph::new();
        let a = add(&mut graph, Biotype::AminoAcid, "A");
        let mut other = MonomerGraph::new();
        add(&mut other, Biotype::AminoAcid, "A");
        let missing = add(&mut other, Biotype::AminoAcid, "G");
        assert!(chain_of(&graph, a).is_some());
        assert_eq!(chain_of(&graph, missing), None);
    }
}
