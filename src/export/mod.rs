//! Model persistence. Blobs are plain serde values; writing them anywhere is
//! left to the caller.

pub mod model;

pub use model::{ModelBlob, ModelMetadata, TableEntry, MODEL_VERSION};
