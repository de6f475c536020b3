//! Typed index handles and the dense maps keyed by them. Every node of the
//! IR graph lives in one of these maps and is referred to by its handle.
mod index_trait;
mod macros;
pub mod maps;

pub use index_trait::IndexRef;
pub use maps::{IndexedMap, IndexedPool, SecondaryMap};
