//! XbrlKit Core — shared types, enums, error taxonomy, configuration.

pub mod config;
pub mod enums;
pub mod error;
pub mod qname;

pub use config::{PipelineConfig, ResolverConfig, StoreConfig};
pub use enums::*;
pub use error::{Error, Result};
pub use qname::QName;
