//! A bidirectional codec between HELM notation and monomer connectivity graphs

pub mod annotation;
pub mod chain;
pub mod errors;
pub mod graph;
pub mod import;
pub mod library;
pub mod parser;
pub mod serializer;
pub mod transport;
pub mod xhelm;
#[cfg(test)]
mod testing_tools;

pub use chain::{Chain, Decomposition};
pub use errors::{ErrorCategory, HelmError, HelmErrorKind, Result};
pub use graph::{
    Attachment, Biotype, Bond, BondId, BondKind, BondRatio, Endpoint, Group, GroupId, GroupInfo,
    GroupLogic, MonomerGraph, MonomerNode, NodeId, PolymerKind, Port, Repeat, RepeatBracket, Strand,
    Superatom, Symbol, editor::GraphEditor,
};
pub use library::{MonomerDefinition, MonomerLibrary, MonomerStore};
pub use parser::Parser;
pub use serializer::Serializer;

/// Parses HELM notation into a fresh [`MonomerGraph`], resolving monomers against `store`
pub fn parse(store: &impl MonomerStore, notation: &str) -> Result<MonomerGraph> {
    Parser::new(store).parse(notation)
}

/// Renders `graph` as canonical HELM notation (without a version suffix)
pub fn serialize(graph: &MonomerGraph) -> Result<String> {
    Serializer::new().serialize(graph)
}

/// Renders the natural-analog sequence of every chain in `graph`, one line per chain
pub fn natural_sequence(graph: &MonomerGraph, store: &impl MonomerStore) -> Result<String> {
    serializer::natural_sequence(graph, store)
}
