//! The graph-editing operations the parser (or any other editor) builds graphs with

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    Attachment, Biotype, BondRatio, GroupInfo, HelmErrorKind, MonomerGraph, MonomerNode, RepeatBracket,
    Strand, Symbol,
};

use super::{Bond, BondId, BondKind, Endpoint, Group, GroupId, NodeId, Port, Superatom};

type EditResult<T> = Result<T, HelmErrorKind>;

/// A backend that monomer graphs can be built in. The parser only ever talks to graphs through this trait.
pub trait GraphEditor {
    fn create_node(&mut self, node: MonomerNode) -> NodeId;

    fn create_bond(&mut self, a: Endpoint, b: Endpoint) -> EditResult<BondId>;

    fn create_hydrogen_bond(&mut self, a: NodeId, b: NodeId) -> EditResult<BondId>;

    fn annotate_bond(
        &mut self,
        bond: BondId,
        ratio: Option<BondRatio>,
        tag: Option<String>,
    ) -> EditResult<()>;

    fn create_group(&mut self, info: GroupInfo) -> GroupId;

    fn join_group(&mut self, node: NodeId, group: GroupId) -> EditResult<()>;

    fn nest_group(&mut self, child: GroupId, parent: GroupId) -> EditResult<()>;

    /// Hides every node in `group` inside a single stand-in node, returning that node
    fn collapse_group(&mut self, group: GroupId) -> EditResult<NodeId>;

    /// Reverses [`GraphEditor::collapse_group`], returning the newly expanded group
    fn expand_group(&mut self, node: NodeId) -> EditResult<GroupId>;

    /// Records that `bracket.nodes` were built from `bracket.copies` copies of one repeated unit
    fn add_repeat(&mut self, bracket: RepeatBracket) -> EditResult<()>;

    fn set_strand(&mut self, node: NodeId, strand: Strand) -> EditResult<()>;
}

impl GraphEditor for MonomerGraph {
    fn create_node(&mut self, node: MonomerNode) -> NodeId {
        let id = NodeId(self.next_id());
        self.nodes.insert(id, node);
        id
    }

    fn create_bond(&mut self, a: Endpoint, b: Endpoint) -> EditResult<BondId> {
        if a.node == b.node {
            return Err(HelmErrorKind::SelfBond);
        }
        let (node_a, node_b) = (self.existing_node(a.node)?, self.existing_node(b.node)?);
        check_base_adjacency((node_a, a.attachment), (node_b, b.attachment))?;
        for endpoint in [&a, &b] {
            self.check_free(endpoint)?;
        }

        for endpoint in [&a, &b] {
            if let Some(node) = self.nodes.get_mut(&endpoint.node)
                && !node.is_opaque()
                && endpoint.attachment.is_numbered()
            {
                node.used_attachments.insert(endpoint.attachment);
            }
        }
        Ok(self.insert_bond(Bond {
            a,
            b,
            kind: BondKind::Covalent,
            ratio: None,
            tag: None,
        }))
    }

    fn create_hydrogen_bond(&mut self, a: NodeId, b: NodeId) -> EditResult<BondId> {
        if a == b {
            return Err(HelmErrorKind::SelfBond);
        }
        self.existing_node(a)?;
        self.existing_node(b)?;
        Ok(self.insert_bond(Bond {
            a: Endpoint::new(a, Attachment::Pair),
            b: Endpoint::new(b, Attachment::Pair),
            kind: BondKind::Hydrogen,
            ratio: None,
            tag: None,
        }))
    }

    fn annotate_bond(
        &mut self,
        bond: BondId,
        ratio: Option<BondRatio>,
        tag: Option<String>,
    ) -> EditResult<()> {
        let bond = self
            .bonds
            .get_mut(&bond)
            .ok_or_else(|| HelmErrorKind::DanglingBond(bond.to_string()))?;
        bond.ratio = ratio.or(bond.ratio.take());
        bond.tag = tag.or(bond.tag.take());
        Ok(())
    }

    fn create_group(&mut self, info: GroupInfo) -> GroupId {
        let id = GroupId(self.next_id());
        self.groups.insert(id, Group { info, parent: None });
        id
    }

    fn join_group(&mut self, node: NodeId, group: GroupId) -> EditResult<()> {
        self.existing_group(group)?;
        let node = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| HelmErrorKind::MissingNode(node.to_string()))?;
        node.group = Some(group);
        Ok(())
    }

    fn nest_group(&mut self, child: GroupId, parent: GroupId) -> EditResult<()> {
        self.existing_group(child)?;
        self.existing_group(parent)?;
        if self.ancestry(parent).any(|g| g == child) {
            return Err(HelmErrorKind::CyclicGroup(child.to_string()));
        }
        if let Some(group) = self.groups.get_mut(&child) {
            group.parent = Some(parent);
        }
        Ok(())
    }

    fn collapse_group(&mut self, group: GroupId) -> EditResult<NodeId> {
        let Group { info, parent } = self.existing_group(group)?.clone();
        let inner_groups: BTreeSet<_> = self
            .groups
            .keys()
            .copied()
            .filter(|&g| self.ancestry(g).any(|a| a == group))
            .collect();
        let inner_nodes: BTreeSet<_> = self
            .nodes()
            .filter(|(_, node)| node.group.is_some_and(|g| inner_groups.contains(&g)))
            .map(|(id, _)| id)
            .collect();

        let mut nested = Self::default();
        for id in &inner_nodes {
            if let Some(mut node) = self.nodes.remove(id) {
                if node.group == Some(group) {
                    node.group = None;
                }
                nested.nodes.insert(*id, node);
            }
        }
        for id in &inner_groups {
            if let Some(mut inner) = self.groups.remove(id)
                && *id != group
            {
                if inner.parent == Some(group) {
                    inner.parent = None;
                }
                nested.groups.insert(*id, inner);
            }
        }
        let (inside, outside): (Vec<_>, Vec<_>) = std::mem::take(&mut self.repeats)
            .into_iter()
            .partition(|bracket| bracket.nodes.iter().all(|n| inner_nodes.contains(n)));
        nested.repeats = inside;
        self.repeats = outside;

        let stand_in = NodeId(self.next_id());
        let mut ports = BTreeMap::new();
        let mut next_port = 1;
        for (id, mut bond) in std::mem::take(&mut self.bonds) {
            if inner_nodes.contains(&bond.a.node) && inner_nodes.contains(&bond.b.node) {
                nested.bonds.insert(id, bond);
                continue;
            }
            for endpoint in bond.endpoints_mut() {
                if inner_nodes.contains(&endpoint.node) {
                    let port = Port(next_port);
                    next_port += 1;
                    ports.insert(port, (endpoint.node, endpoint.port));
                    endpoint.node = stand_in;
                    endpoint.port = Some(port);
                }
            }
            self.bonds.insert(id, bond);
        }
        nested.next_id = self.next_id;

        log::trace!(
            "collapsed {group} ({} nodes, {} ports) into {stand_in}",
            nested.node_count(),
            ports.len()
        );
        let node = MonomerNode {
            group: parent,
            superatom: Some(Box::new(Superatom {
                graph: nested,
                info,
                ports,
            })),
            ..MonomerNode::new(Biotype::Blob, Symbol::Group)
        };
        self.nodes.insert(stand_in, node);
        Ok(stand_in)
    }

    fn expand_group(&mut self, node: NodeId) -> EditResult<GroupId> {
        let stand_in = self.existing_node(node)?;
        let Some(superatom) = stand_in.superatom.as_deref() else {
            return Err(HelmErrorKind::NotCollapsed(node.to_string()));
        };
        let portless = self.bonds.values().flat_map(|b| [&b.a, &b.b]).any(|e| {
            e.node == node && e.port.and_then(|p| superatom.ports.get(&p)).is_none()
        });
        if portless {
            return Err(HelmErrorKind::PortlessBond(node.to_string()));
        }

        let Some(stand_in) = self.nodes.remove(&node) else {
            return Err(HelmErrorKind::MissingNode(node.to_string()));
        };
        let Some(superatom) = stand_in.superatom else {
            return Err(HelmErrorKind::NotCollapsed(node.to_string()));
        };
        let Superatom {
            graph: nested,
            info,
            ports,
        } = *superatom;

        self.next_id = self.next_id.max(nested.next_id);
        let group = GroupId(self.next_id());
        self.groups.insert(
            group,
            Group {
                info,
                parent: stand_in.group,
            },
        );
        for (id, mut inner) in nested.nodes {
            inner.group.get_or_insert(group);
            self.nodes.insert(id, inner);
        }
        for (id, mut inner) in nested.groups {
            inner.parent.get_or_insert(group);
            self.groups.insert(id, inner);
        }
        self.bonds.extend(nested.bonds);
        self.repeats.extend(nested.repeats);

        for bond in self.bonds.values_mut() {
            for endpoint in bond.endpoints_mut() {
                if endpoint.node == node
                    && let Some(&(inner, inner_port)) =
                        endpoint.port.and_then(|p| ports.get(&p))
                {
                    endpoint.node = inner;
                    endpoint.port = inner_port;
                }
            }
        }
        Ok(group)
    }

    fn add_repeat(&mut self, bracket: RepeatBracket) -> EditResult<()> {
        let RepeatBracket { repeat, copies, .. } = bracket;
        if copies == 0 || copies != repeat.copies() || bracket.nodes.len() % copies != 0 {
            return Err(HelmErrorKind::RepeatMismatch { repeat, copies });
        }
        for &node in &bracket.nodes {
            self.existing_node(node)?;
        }
        self.repeats.push(bracket);
        Ok(())
    }

    fn set_strand(&mut self, node: NodeId, strand: Strand) -> EditResult<()> {
        let node = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| HelmErrorKind::MissingNode(node.to_string()))?;
        node.strand = Some(strand);
        Ok(())
    }
}

// Private Helpers =====================================================================================================

impl MonomerGraph {
    fn existing_node(&self, id: NodeId) -> EditResult<&MonomerNode> {
        self.node(id)
            .ok_or_else(|| HelmErrorKind::MissingNode(id.to_string()))
    }

    fn existing_group(&self, id: GroupId) -> EditResult<&Group> {
        self.group(id)
            .ok_or_else(|| HelmErrorKind::MissingGroup(id.to_string()))
    }

    fn check_free(&self, endpoint: &Endpoint) -> EditResult<()> {
        let node = self.existing_node(endpoint.node)?;
        if !node.is_opaque()
            && endpoint.attachment.is_numbered()
            && node.used_attachments.contains(&endpoint.attachment)
        {
            return Err(HelmErrorKind::OccupiedAttachment {
                node: node.symbol.as_str().to_owned(),
                attachment: endpoint.attachment,
            });
        }
        Ok(())
    }

    fn insert_bond(&mut self, bond: Bond) -> BondId {
        let id = BondId(self.next_id());
        self.bonds.insert(id, bond);
        id
    }
}

fn check_base_adjacency(
    a: (&MonomerNode, Attachment),
    b: (&MonomerNode, Attachment),
) -> EditResult<()> {
    let is_base = |(node, _): (&MonomerNode, Attachment)| node.biotype == Biotype::Base;
    let is_sugar_to_base = |(sugar, r3): (&MonomerNode, Attachment),
                            (base, r1): (&MonomerNode, Attachment)| {
        sugar.biotype == Biotype::Sugar
            && r3 == Attachment::R3
            && base.biotype == Biotype::Base
            && r1 == Attachment::R1
    };
    if (is_base(a) || is_base(b)) && !(is_sugar_to_base(a, b) || is_sugar_to_base(b, a)) {
        return Err(HelmErrorKind::IllegalBaseBond);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCategory, GroupLogic, Repeat};

    fn monomer(biotype: Biotype, symbol: &str) -> MonomerNode {
        MonomerNode::new(biotype, Symbol::Monomer(symbol.to_owned()))
    }

    fn backbone(graph: &mut MonomerGraph, from: NodeId, to: NodeId) -> BondId {
        graph
            .create_bond(
                Endpoint::new(from, Attachment::R2),
                Endpoint::new(to, Attachment::R1),
            )
            .unwrap()
    }

    #[test]
    fn ids_are_forged_in_creation_order() {
        let mut graph = MonomerGraph::new();
        let a = graph.create_node(monomer(Biotype::AminoAcid, "A"));
        let b = graph.create_node(monomer(Biotype::AminoAcid, "G"));
        let bond = backbone(&mut graph, a, b);
        assert!(a < b);
        assert_eq!(graph.bond(bond).unwrap().backbone_order(), Some((a, b)));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.bond_count(), 1);
        assert_eq!(
            graph.node(a).unwrap().used_attachments(),
            &BTreeSet::from([Attachment::R2])
        );
    }

    #[test]
    fn attachment_points_can_only_be_used_once() {
        let mut graph = MonomerGraph::new();
        let [a, b, c] = ["A", "G", "C"].map(|s| graph.create_node(monomer(Biotype::AminoAcid, s)));
        backbone(&mut graph, a, b);
        let reused = graph.create_bond(
            Endpoint::new(a, Attachment::R2),
            Endpoint::new(c, Attachment::R1),
        );
        assert_eq!(
            reused,
            Err(HelmErrorKind::OccupiedAttachment {
                node: "A".to_owned(),
                attachment: Attachment::R2
            })
        );
        // A failed bond leaves no trace
        assert!(graph.node(c).unwrap().used_attachments().is_empty());
    }

    #[test]
    fn blobs_accept_any_number_of_bonds() {
        let mut graph = MonomerGraph::new();
        let blob = graph.create_node(MonomerNode::new(Biotype::Blob, Symbol::Blob(None)));
        let [a, b] = ["A", "G"].map(|s| graph.create_node(monomer(Biotype::AminoAcid, s)));
        for residue in [a, b] {
            graph
                .create_bond(
                    Endpoint::new(blob, Attachment::R1).with_site("?"),
                    Endpoint::new(residue, Attachment::R3),
                )
                .unwrap();
        }
        assert!(graph.node(blob).unwrap().used_attachments().is_empty());
    }

    #[test]
    fn self_bonds_are_rejected() {
        let mut graph = MonomerGraph::new();
        let a = graph.create_node(monomer(Biotype::AminoAcid, "C"));
        let bond = graph.create_bond(
            Endpoint::new(a, Attachment::R3),
            Endpoint::new(a, Attachment::R1),
        );
        assert_eq!(bond, Err(HelmErrorKind::SelfBond));
        assert_eq!(
            graph.create_hydrogen_bond(a, a),
            Err(HelmErrorKind::SelfBond)
        );
    }

    #[test]
    fn bases_only_hang_off_sugars() {
        let mut graph = MonomerGraph::new();
        let sugar = graph.create_node(monomer(Biotype::Sugar, "R"));
        let linker = graph.create_node(monomer(Biotype::Linker, "P"));
        let base = graph.create_node(monomer(Biotype::Base, "A"));

        let on_linker = graph.create_bond(
            Endpoint::new(linker, Attachment::R3),
            Endpoint::new(base, Attachment::R1),
        );
        assert_eq!(on_linker, Err(HelmErrorKind::IllegalBaseBond));
        assert_eq!(
            on_linker.map_err(|e| e.category()),
            Err(ErrorCategory::AdjacencyViolation)
        );

        let wrong_attachment = graph.create_bond(
            Endpoint::new(sugar, Attachment::R2),
            Endpoint::new(base, Attachment::R1),
        );
        assert_eq!(wrong_attachment, Err(HelmErrorKind::IllegalBaseBond));

        assert!(
            graph
                .create_bond(
                    Endpoint::new(base, Attachment::R1),
                    Endpoint::new(sugar, Attachment::R3),
                )
                .is_ok()
        );
    }

    #[test]
    fn hydrogen_bonds_use_pair_attachments() {
        let mut graph = MonomerGraph::new();
        let [a, u] = ["A", "U"].map(|s| graph.create_node(monomer(Biotype::Base, s)));
        let pair = graph.create_hydrogen_bond(a, u).unwrap();
        let bond = graph.bond(pair).unwrap();
        assert_eq!(bond.kind(), BondKind::Hydrogen);
        assert_eq!(bond.a().attachment, Attachment::Pair);
        assert!(!bond.is_backbone());
    }

    #[test]
    fn nesting_groups_cannot_form_cycles() {
        let mut graph = MonomerGraph::new();
        let outer = graph.create_group(GroupInfo::default());
        let inner = graph.create_group(GroupInfo::default());
        graph.nest_group(inner, outer).unwrap();
        assert_eq!(
            graph.nest_group(outer, inner),
            Err(HelmErrorKind::CyclicGroup(outer.to_string()))
        );
        assert_eq!(graph.ancestry(inner).collect::<Vec<_>>(), vec![inner, outer]);
    }

    #[test]
    fn collapse_and_expand_move_nodes_between_graphs() {
        let mut graph = MonomerGraph::new();
        let [a, b, c] = ["A", "G", "C"].map(|s| graph.create_node(monomer(Biotype::AminoAcid, s)));
        let chem = graph.create_node(monomer(Biotype::Chem, "SMCC"));
        backbone(&mut graph, a, b);
        backbone(&mut graph, b, c);
        let link = graph
            .create_bond(
                Endpoint::new(c, Attachment::R3),
                Endpoint::new(chem, Attachment::R1),
            )
            .unwrap();

        let info = GroupInfo {
            logic: Some(GroupLogic::And),
            ratio: Some("0.5".to_owned()),
            tag: None,
        };
        let group = graph.create_group(info.clone());
        for node in [a, b, c] {
            graph.join_group(node, group).unwrap();
        }

        let stand_in = graph.collapse_group(group).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.bond_count(), 1);
        assert!(graph.group(group).is_none());
        let superatom = graph.node(stand_in).unwrap().superatom().unwrap();
        assert_eq!(superatom.graph().node_count(), 3);
        assert_eq!(superatom.graph().bond_count(), 2);
        assert_eq!(superatom.info(), &info);
        let crossing = graph.bond(link).unwrap();
        assert_eq!(crossing.a().node, stand_in);
        assert_eq!(superatom.port(crossing.a().port.unwrap()), Some(c));

        let expanded = graph.expand_group(stand_in).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.bond_count(), 3);
        assert_eq!(graph.group(expanded).unwrap().info, info);
        assert_eq!(graph.node(a).unwrap().group(), Some(expanded));
        let restored = graph.bond(link).unwrap();
        assert_eq!(restored.a().node, c);
        assert_eq!(restored.a().port, None);
    }

    #[test]
    fn bonds_made_straight_to_a_collapsed_group_block_expansion() {
        let mut graph = MonomerGraph::new();
        let a = graph.create_node(monomer(Biotype::AminoAcid, "A"));
        let chem = graph.create_node(monomer(Biotype::Chem, "SMCC"));
        let group = graph.create_group(GroupInfo::default());
        graph.join_group(a, group).unwrap();
        let stand_in = graph.collapse_group(group).unwrap();
        graph
            .create_bond(
                Endpoint::new(stand_in, Attachment::R2).with_site("?"),
                Endpoint::new(chem, Attachment::R1),
            )
            .unwrap();
        assert_eq!(
            graph.expand_group(stand_in),
            Err(HelmErrorKind::PortlessBond(stand_in.to_string()))
        );
        assert_eq!(
            graph.expand_group(chem),
            Err(HelmErrorKind::NotCollapsed(chem.to_string()))
        );
    }

    #[test]
    fn collapsing_keeps_inner_groups_nested() {
        let mut graph = MonomerGraph::new();
        let [a, b] = ["A", "G"].map(|s| graph.create_node(monomer(Biotype::AminoAcid, s)));
        let outer = graph.create_group(GroupInfo::default());
        let inner = graph.create_group(GroupInfo {
            ratio: Some("2".to_owned()),
            ..GroupInfo::default()
        });
        graph.nest_group(inner, outer).unwrap();
        graph.join_group(a, inner).unwrap();
        graph.join_group(b, outer).unwrap();

        let stand_in = graph.collapse_group(outer).unwrap();
        let nested = graph.node(stand_in).unwrap().superatom().unwrap().graph();
        assert_eq!(nested.group(inner).unwrap().parent, None);
        assert_eq!(nested.node(a).unwrap().group(), Some(inner));
        assert_eq!(nested.node(b).unwrap().group(), None);

        let expanded = graph.expand_group(stand_in).unwrap();
        assert_eq!(graph.group(inner).unwrap().parent, Some(expanded));
        assert!(graph.is_within(a, expanded));
        assert!(graph.is_within(b, expanded));
    }

    #[test]
    fn repeats_must_match_their_copies() {
        let mut graph = MonomerGraph::new();
        let [d, f] = ["D", "F"].map(|s| graph.create_node(monomer(Biotype::AminoAcid, s)));
        let bracket = |repeat, copies| RepeatBracket {
            nodes: vec![d, f],
            repeat,
            copies,
            tag: None,
        };

        for (repeat, copies) in [(Repeat::Exact(0), 0), (Repeat::Exact(3), 2), (Repeat::Range(2, 5), 2)] {
            let error = graph.add_repeat(bracket(repeat, copies)).unwrap_err();
            assert_eq!(error, HelmErrorKind::RepeatMismatch { repeat, copies });
            assert_eq!(error.category(), ErrorCategory::MalformedNotation);
        }
        // Two nodes can't be split into three equal copies
        assert!(graph.add_repeat(bracket(Repeat::Exact(3), 3)).is_err());
        assert_eq!(graph.repeats().len(), 0);

        graph.add_repeat(bracket(Repeat::Exact(2), 2)).unwrap();
        graph.add_repeat(bracket(Repeat::Range(1, 4), 1)).unwrap();
        assert_eq!(graph.repeats().len(), 2);
    }
}
