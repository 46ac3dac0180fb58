//! XbrlKit Store — content-addressed blob storage plus the taxonomy
//! registry and statement catalog, on SQLite.

pub mod codec;
pub mod content;
pub mod registry;
pub mod schema;
pub mod statements;
pub mod store;
pub mod types;

pub use registry::{NewLinkbase, NewSchema};
pub use store::XbrlStore;
pub use types::*;
