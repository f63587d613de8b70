//! The monomer connectivity graph described by HELM notation

pub mod editor;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    num::NonZeroU8,
    str::FromStr,
};

use derive_more::Display;
use serde::Serialize;

// Public API ==========================================================================================================

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct MonomerGraph {
    next_id: Id,
    nodes: BTreeMap<NodeId, MonomerNode>,
    bonds: BTreeMap<BondId, Bond>,
    groups: BTreeMap<GroupId, Group>,
    repeats: Vec<RepeatBracket>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MonomerNode {
    biotype: Biotype,
    symbol: Symbol,
    ordinal: Option<u32>,
    tag: Option<String>,
    strand: Option<Strand>,
    group: Option<GroupId>,
    superatom: Option<Box<Superatom>>,
    used_attachments: BTreeSet<Attachment>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Bond {
    a: Endpoint,
    b: Endpoint,
    kind: BondKind,
    ratio: Option<BondRatio>,
    tag: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub struct Endpoint {
    pub node: NodeId,
    pub attachment: Attachment,
    /// The position text written for blob and group endpoints, which have no positional id of their own
    pub site: Option<String>,
    /// Which node of a collapsed group's nested graph this endpoint really attaches to
    pub port: Option<Port>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Group {
    pub info: GroupInfo,
    pub parent: Option<GroupId>,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default, Serialize)]
pub struct GroupInfo {
    pub logic: Option<GroupLogic>,
    pub ratio: Option<String>,
    pub tag: Option<String>,
}

/// The hidden detail of a collapsed group
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Superatom {
    graph: MonomerGraph,
    info: GroupInfo,
    /// Each port leads to a node of `graph` (and, if that node is itself collapsed, one of its own ports)
    ports: BTreeMap<Port, (NodeId, Option<Port>)>,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub struct RepeatBracket {
    /// Every node covered by the bracket, including all instantiated copies of the repeated unit
    pub nodes: Vec<NodeId>,
    pub repeat: Repeat,
    /// How many copies of the unit were instantiated
    pub copies: usize,
    pub tag: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub struct BondRatio {
    pub a: String,
    pub b: String,
}

// ---------------------------------------------------------------------------------------------------------------------

// NOTE: This underlying `Id` type is a private synonym: users can't construct their own `*Id`s, only the graph can
type Id = usize;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize)]
#[display("node #{_0}")]
pub struct NodeId(Id);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize)]
#[display("bond #{_0}")]
pub struct BondId(Id);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize)]
#[display("group #{_0}")]
pub struct GroupId(Id);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize)]
#[display("port {_0}")]
pub struct Port(u32);

// ---------------------------------------------------------------------------------------------------------------------

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize)]
pub enum Biotype {
    Sugar,
    Linker,
    Base,
    AminoAcid,
    Chem,
    Blob,
    /// An ambiguous nucleotide (`*`) standing in for a whole sugar-base-linker unit
    Nucleotide,
}

/// The kinds of chain HELM gives ids to
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub enum PolymerKind {
    Rna,
    Peptide,
    Chem,
    Blob,
    Group,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub enum Symbol {
    /// A monomer defined in the library
    Monomer(String),
    /// An inline SMILES structure with `*` attachment points
    Smiles(String),
    /// A wildcard or a mixture of alternatives, kept exactly as written: `*`, `?`, or `(A:1,G:2)`
    Ambiguous(String),
    /// An opaque blob, with an optional type like "Bead"
    Blob(Option<String>),
    /// The stand-in node for a collapsed group
    Group,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub enum Attachment {
    R(NonZeroU8),
    /// `?`: attached somewhere unspecified
    Unknown,
    /// `*`: attached anywhere
    Any,
    /// A hydrogen-bonded base pair
    Pair,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub enum BondKind {
    Covalent,
    Hydrogen,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub enum GroupLogic {
    And,
    Or,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub enum Repeat {
    Exact(u32),
    Range(u32, u32),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub enum Strand {
    Sense,
    Antisense,
}

// Graph Queries =======================================================================================================

impl MonomerGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&MonomerNode> {
        self.nodes.get(&id)
    }

    /// Every node, in creation order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &MonomerNode)> + '_ {
        self.nodes.iter().map(|(&id, node)| (id, node))
    }

    #[must_use]
    pub fn bond(&self, id: BondId) -> Option<&Bond> {
        self.bonds.get(&id)
    }

    /// Every bond, in creation order
    pub fn bonds(&self) -> impl Iterator<Item = (BondId, &Bond)> + '_ {
        self.bonds.iter().map(|(&id, bond)| (id, bond))
    }

    pub fn bonds_of(&self, node: NodeId) -> impl Iterator<Item = (BondId, &Bond)> + '_ {
        self.bonds().filter(move |(_, bond)| bond.touches(node))
    }

    #[must_use]
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Every expanded group, in creation order
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &Group)> + '_ {
        self.groups.iter().map(|(&id, group)| (id, group))
    }

    #[must_use]
    pub fn repeats(&self) -> &[RepeatBracket] {
        &self.repeats
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `group` followed by each of its enclosing groups, innermost first. Stops early on a parent cycle.
    pub fn ancestry(&self, group: GroupId) -> impl Iterator<Item = GroupId> + '_ {
        let mut seen = BTreeSet::new();
        std::iter::successors(Some(group), |&g| self.group(g).and_then(|g| g.parent))
            .take_while(move |&g| seen.insert(g))
    }

    /// Whether `node` sits inside `group`, directly or through nested groups
    #[must_use]
    pub fn is_within(&self, node: NodeId, group: GroupId) -> bool {
        self.node(node)
            .and_then(MonomerNode::group)
            .is_some_and(|g| self.ancestry(g).any(|a| a == group))
    }

    fn next_id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl MonomerNode {
    #[must_use]
    pub const fn new(biotype: Biotype, symbol: Symbol) -> Self {
        Self {
            biotype,
            symbol,
            ordinal: None,
            tag: None,
            strand: None,
            group: None,
            superatom: None,
            used_attachments: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_tag(self, tag: Option<String>) -> Self {
        Self { tag, ..self }
    }

    #[must_use]
    pub fn with_ordinal(self, ordinal: u32) -> Self {
        Self {
            ordinal: Some(ordinal),
            ..self
        }
    }

    #[must_use]
    pub const fn biotype(&self) -> Biotype {
        self.biotype
    }

    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub const fn ordinal(&self) -> Option<u32> {
        self.ordinal
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    #[must_use]
    pub const fn strand(&self) -> Option<Strand> {
        self.strand
    }

    #[must_use]
    pub const fn group(&self) -> Option<GroupId> {
        self.group
    }

    #[must_use]
    pub fn superatom(&self) -> Option<&Superatom> {
        self.superatom.as_deref()
    }

    #[must_use]
    pub const fn used_attachments(&self) -> &BTreeSet<Attachment> {
        &self.used_attachments
    }

    /// The kind of chain this node belongs in, where collapsed groups are chains of their own
    #[must_use]
    pub const fn polymer(&self) -> PolymerKind {
        if self.superatom.is_some() {
            PolymerKind::Group
        } else {
            self.biotype.polymer()
        }
    }

    /// Blobs and collapsed groups have no fixed attachment points, so any number of bonds can share one
    #[must_use]
    pub const fn is_opaque(&self) -> bool {
        matches!(self.biotype, Biotype::Blob)
    }
}

impl Bond {
    #[must_use]
    pub const fn a(&self) -> &Endpoint {
        &self.a
    }

    #[must_use]
    pub const fn b(&self) -> &Endpoint {
        &self.b
    }

    #[must_use]
    pub const fn kind(&self) -> BondKind {
        self.kind
    }

    #[must_use]
    pub const fn ratio(&self) -> Option<&BondRatio> {
        self.ratio.as_ref()
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    #[must_use]
    pub fn touches(&self, node: NodeId) -> bool {
        self.a.node == node || self.b.node == node
    }

    /// The endpoint opposite to `node`, if this bond touches `node` at all
    #[must_use]
    pub fn other(&self, node: NodeId) -> Option<&Endpoint> {
        if self.a.node == node {
            Some(&self.b)
        } else if self.b.node == node {
            Some(&self.a)
        } else {
            None
        }
    }

    /// The endpoint on `node`, if this bond touches `node` at all
    #[must_use]
    pub fn end_at(&self, node: NodeId) -> Option<&Endpoint> {
        if self.a.node == node {
            Some(&self.a)
        } else if self.b.node == node {
            Some(&self.b)
        } else {
            None
        }
    }

    /// Backbone bonds join one node's R2 to another node's R1, in either order
    #[must_use]
    pub fn is_backbone(&self) -> bool {
        let (a, b) = (self.a.attachment, self.b.attachment);
        self.kind == BondKind::Covalent
            && ((a == Attachment::R1 && b == Attachment::R2)
                || (a == Attachment::R2 && b == Attachment::R1))
    }

    /// For a backbone bond, the node offering R2 (the earlier residue) and the node offering R1 (the later one)
    #[must_use]
    pub fn backbone_order(&self) -> Option<(NodeId, NodeId)> {
        if !self.is_backbone() {
            return None;
        }
        if self.a.attachment == Attachment::R2 {
            Some((self.a.node, self.b.node))
        } else {
            Some((self.b.node, self.a.node))
        }
    }

    fn endpoints_mut(&mut self) -> [&mut Endpoint; 2] {
        [&mut self.a, &mut self.b]
    }
}

impl Endpoint {
    #[must_use]
    pub const fn new(node: NodeId, attachment: Attachment) -> Self {
        Self {
            node,
            attachment,
            site: None,
            port: None,
        }
    }

    #[must_use]
    pub fn with_site(self, site: impl Into<String>) -> Self {
        Self {
            site: Some(site.into()),
            ..self
        }
    }
}

impl Superatom {
    #[must_use]
    pub const fn graph(&self) -> &MonomerGraph {
        &self.graph
    }

    #[must_use]
    pub const fn info(&self) -> &GroupInfo {
        &self.info
    }

    #[must_use]
    pub fn port(&self, port: Port) -> Option<NodeId> {
        self.ports.get(&port).map(|&(node, _)| node)
    }
}

impl Biotype {
    #[must_use]
    pub const fn polymer(self) -> PolymerKind {
        match self {
            Self::Sugar | Self::Linker | Self::Base | Self::Nucleotide => PolymerKind::Rna,
            Self::AminoAcid => PolymerKind::Peptide,
            Self::Chem => PolymerKind::Chem,
            Self::Blob => PolymerKind::Blob,
        }
    }
}

impl FromStr for Biotype {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Sugar" => Self::Sugar,
            "Linker" => Self::Linker,
            "Base" => Self::Base,
            "AminoAcid" => Self::AminoAcid,
            "Chem" => Self::Chem,
            "Blob" => Self::Blob,
            "Nucleotide" => Self::Nucleotide,
            _ => return Err(()),
        })
    }
}

impl PolymerKind {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Rna => "RNA",
            Self::Peptide => "PEPTIDE",
            Self::Chem => "CHEM",
            Self::Blob => "BLOB",
            Self::Group => "G",
        }
    }

    /// CHEM, BLOB, and group "chains" always hold exactly one node
    #[must_use]
    pub const fn is_single(self) -> bool {
        matches!(self, Self::Chem | Self::Blob | Self::Group)
    }

    /// The biotype of the monomers making up this kind of chain, looked up by the one-letter sequence importers
    #[must_use]
    pub const fn monomer_biotype(self) -> Option<Biotype> {
        match self {
            Self::Peptide => Some(Biotype::AminoAcid),
            Self::Rna => Some(Biotype::Base),
            Self::Chem => Some(Biotype::Chem),
            Self::Blob | Self::Group => None,
        }
    }
}

impl fmt::Display for PolymerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for PolymerKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "RNA" => Self::Rna,
            "PEPTIDE" => Self::Peptide,
            "CHEM" => Self::Chem,
            "BLOB" => Self::Blob,
            "G" => Self::Group,
            _ => return Err(()),
        })
    }
}

impl Symbol {
    /// The text used to look this symbol up, without any brackets
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Monomer(s) | Self::Smiles(s) | Self::Ambiguous(s) => s,
            Self::Blob(blob_type) => blob_type.as_deref().unwrap_or("Blob"),
            Self::Group => "Group",
        }
    }
}

impl Attachment {
    pub const R1: Self = Self::R(NonZeroU8::MIN);
    pub const R2: Self = Self::R(NonZeroU8::new(2).unwrap());
    pub const R3: Self = Self::R(NonZeroU8::new(3).unwrap());

    /// Wildcard and pairing attachments never use up a numbered attachment point
    #[must_use]
    pub const fn is_numbered(self) -> bool {
        matches!(self, Self::R(_))
    }
}

impl FromStr for Attachment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "?" => Ok(Self::Unknown),
            "*" => Ok(Self::Any),
            "pair" => Ok(Self::Pair),
            _ => {
                let index = s.strip_prefix('R').ok_or(())?;
                // Rules out signs and leading zeros, so each attachment has a single spelling
                if index.starts_with(['+', '0']) {
                    return Err(());
                }
                index.parse().map(Self::R).map_err(|_| ())
            }
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::R(n) => write!(f, "R{n}"),
            Self::Unknown => f.write_str("?"),
            Self::Any => f.write_str("*"),
            Self::Pair => f.write_str("pair"),
        }
    }
}

impl fmt::Display for GroupLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "+",
            Self::Or => ",",
        })
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Range(low, high) => write!(f, "{low}-{high}"),
        }
    }
}

impl Repeat {
    /// How many copies of the repeated unit get built into the graph
    #[must_use]
    pub const fn copies(self) -> usize {
        match self {
            Self::Exact(n) => n as usize,
            Self::Range(..) => 1,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sense => "ss",
            Self::Antisense => "as",
        })
    }
}

impl FromStr for Strand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ss" => Ok(Self::Sense),
            "as" => Ok(Self::Antisense),
            _ => Err(()),
        }
    }
}
