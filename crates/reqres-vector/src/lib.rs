//! reqres-vector
//!
//! LanceDB-backed dense index. The chunk table doubles as the chunk store used to
//! resolve fused candidates, and a small meta table records which embedder built it.

pub mod schema;
pub mod store;
pub mod table;

pub use store::VectorStore;
