//! MeshStreamError: Unified error type for mesh-stream public APIs
//!
//! Every reader, writer and topology routine reports failures through this
//! enum. A mesh-preparation run treats all of them as fatal: nothing here is
//! retried and no partial result is ever returned alongside an error.

use thiserror::Error;

/// Unified error type for mesh-stream operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshStreamError {
    /// A call into the file backend returned a non-success status.
    #[error("{op} failed with status {status}: {detail}")]
    Backend {
        /// Name of the failing backend operation.
        op: &'static str,
        /// Underlying status code (OS error code, or -1 when none is available).
        status: i32,
        /// Human-readable description of the failure.
        detail: String,
    },
    /// The file header or directory could not be decoded.
    #[error("invalid mesh file header: {0}")]
    InvalidHeader(String),
    /// The file's dimensionality differs from the one requested by the reader.
    #[error("mesh dimension mismatch: expected dimension ({expected}) != file dimension ({found})")]
    DimensionMismatch {
        /// Dimension requested by the caller.
        expected: usize,
        /// Dimension declared in the file header.
        found: usize,
    },
    /// The reader only understands 2D and 3D meshes.
    #[error("unsupported mesh dimension: {0}")]
    UnsupportedDimension(usize),
    /// A block's element type tag matches no known element category.
    #[error("unknown block type `{0}`")]
    UnknownBlockType(String),
    /// No block contains the requested entity id.
    #[error("entity {0} is not contained in any block")]
    EntityNotFound(usize),
    /// The requested vertex id is outside the coordinate section.
    #[error("vertex {0} is out of range")]
    VertexNotFound(usize),
    /// The requested `from -> to` connectivity cannot be produced.
    #[error("connectivity {from} -> {to} is not available")]
    UnsupportedConnectivity {
        /// Source entity dimension.
        from: usize,
        /// Target entity dimension.
        to: usize,
    },
    /// Block payload is inconsistent with its header.
    #[error("corrupt block {block}: {detail}")]
    CorruptBlock {
        /// Block id as stored in the file.
        block: i64,
        /// What was inconsistent.
        detail: String,
    },
    /// A CSR table violates the offsets/indices invariant.
    #[error("CSR invariant violated: {0}")]
    CsrInvariant(String),
    /// A row references an entity outside the referenced table.
    #[error("index {index} out of range for table with {rows} rows")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of rows in the referenced table.
        rows: usize,
    },
    /// No sub-entity template exists for this parent shape.
    #[error("no {dim}D template for a {parent_dim}D entity with {len} vertices")]
    MissingTemplate {
        /// Dimension of the derived entities.
        dim: usize,
        /// Dimension of the owning entities.
        parent_dim: usize,
        /// Vertex count of the owning entity.
        len: usize,
    },
    /// Two related arrays disagree in length.
    #[error("{what}: expected length {expected}, found {found}")]
    LengthMismatch {
        /// Which array was checked.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Actual length.
        found: usize,
    },
    /// A stored real could not be represented in the reader's scalar type.
    #[error("coordinate value {0} is not representable")]
    NumericConversion(String),
    /// A configuration value is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),
    /// Message exchange between ranks failed.
    #[error("communication error: {0}")]
    Communication(String),
    /// The external partitioner failed.
    #[error("partitioner error: {0}")]
    Partition(String),
}

impl MeshStreamError {
    /// Wrap an I/O failure from backend operation `op`.
    pub(crate) fn backend(op: &'static str, err: &std::io::Error) -> Self {
        MeshStreamError::Backend {
            op,
            status: err.raw_os_error().unwrap_or(-1),
            detail: err.to_string(),
        }
    }
}
