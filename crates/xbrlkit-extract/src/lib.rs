//! XbrlKit Extract — event-driven parsers for taxonomy schemas,
//! linkbases and instance documents, plus the in-memory concept graph
//! built from their relationships.

pub mod graph;
pub mod instance;
pub mod linkbase;
pub mod schema;
mod xml;

pub use graph::{ConceptGraph, ConceptPlacement};
pub use instance::{DtsReference, FactContext, InstanceDoc, InstanceFact, Period};
pub use linkbase::{CalculationArc, ConceptLabel, DefinitionArc, LinkbaseDoc, PresentationArc};
pub use schema::{ConceptDecl, SchemaDoc, SchemaImport};
