//! Statement assembly and derived-ratio computation.
//!
//! Takes the flat line items extracted from an instance document and
//! produces (a) statement groupings ordered by presentation and (b) a
//! catalog of financial ratios with confidence scoring. Missing inputs
//! degrade or skip a ratio, they never fail the pipeline.

pub mod ratios;
pub mod statements;

pub use ratios::{compute_ratios, compute_ratios_with_prior};
pub use statements::{group_line_items, AssembledStatement, SectionGroup, StatementSet};
