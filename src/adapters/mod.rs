// Adapters layer: concrete implementations of the domain ports (files, formats).

pub mod artifact;
pub mod records;
pub mod storage;

pub use artifact::{FileArtifactSource, InMemoryArtifactSource};
pub use storage::LocalStorage;
