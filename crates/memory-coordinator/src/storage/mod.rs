//! Collaborator stores: blob storage and the semantic vector index
pub mod blob_store;
pub mod vector_index;

pub use blob_store::{blob_key, BlobError, BlobStore, FsBlobStore, InMemoryBlobStore};
pub use vector_index::{SqliteVectorIndex, VectorError, VectorFilter, VectorHit, VectorIndex, VectorRecord};
