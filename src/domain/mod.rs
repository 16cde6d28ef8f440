pub mod chunking;
pub mod entities;
pub mod errors;
pub mod ports;

pub use chunking::{ChunkingOptions, RecursiveSplitter};
pub use entities::*;
pub use errors::{DomainError, Result};
