//! XbrlKit Resolve — fetching and transitive closure of a discoverable
//! taxonomy set, cycle-safe and budget-bounded.

pub mod fetcher;
pub mod resolver;

pub use fetcher::{Fetcher, HttpFetcher, StaticFetcher};
pub use resolver::{DtsReport, DtsResolver};
