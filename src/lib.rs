#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-stream
//!
//! mesh-stream rebuilds unstructured-mesh topology from blocked, Exodus-style
//! mesh files without loading the whole mesh. Cell connectivity and point
//! coordinates are decoded through bounded windows, turned into CSR tables,
//! and fed to a distributed partition/migrate pipeline that derives edges and
//! faces and writes the resulting coloring back out.
//!
//! ## Features
//! - Streaming cursors over fixed-size, polygonal and polyhedral blocks
//! - Random-access or sequential window lookup, runtime chunk sizes
//! - Dual graph construction and pluggable colorers (block slabs, METIS)
//! - Pluggable communication backends (serial, threads, MPI) for migration
//! - Edge/face derivation with global deduplication and table intersection
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! mesh-stream = "0.3"
//! # Optional features:
//! # features = ["mpi-support","rayon","metis-support"]
//! ```
//!
//! ## Pipeline
//! [`io::definition::MeshDefinition`] → [`algs::make_dual_graph`] →
//! [`algs::partition::Colorer`] → [`algs::migrate`] →
//! [`algs::build_intermediary`] / [`algs::intersect_connectivity`] →
//! [`io::coloring::write_coloring`].

pub mod algs;
pub mod debug_invariants;
pub mod io;
pub mod mesh_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::partition::{BlockColorer, Colorer};
    #[cfg(feature = "metis-support")]
    pub use crate::algs::partition::MetisColorer;
    pub use crate::algs::{
        DualGraph, Intermediary, MeshGraph, Migrated, build_intermediary, gather_colors,
        intersect_connectivity, make_dual_graph, migrate, naive_range,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::io::coloring::{write_coloring, write_coloring_file};
    pub use crate::io::definition::{LookupStrategy, MeshDefinition, ReaderState, StreamOptions};
    pub use crate::io::exodus::{CreateMode, ExoFile, ExoWriter};
    pub use crate::io::memory::MemoryMesh;
    pub use crate::io::{BlockInfo, ConnKind, MeshParams, MeshSink, MeshSource};
    pub use crate::mesh_error::MeshStreamError;
    pub use crate::topology::{BlockKind, Csr};
}
