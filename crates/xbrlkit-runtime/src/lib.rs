//! Filing pipeline — drives one filing from raw instance bytes to
//! completed statement: store content, resolve the DTS, extract
//! concepts and facts, classify line items, compute ratios.
//!
//! One filing is one independent unit of work. A crash mid-filing
//! leaves the registry retryable, never corrupt.

pub mod pipeline;
pub mod types;

pub use pipeline::FilingPipeline;
pub use types::{FilingInput, PipelineReport};
