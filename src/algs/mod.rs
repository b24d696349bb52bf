//! Re-export public algorithms.

pub mod communicator;
pub mod dual_graph;
pub mod intermediary;
pub mod intersect;
pub mod migrate;
pub mod partition;
pub mod wire;

pub use dual_graph::{DualGraph, MeshGraph, make_dual_graph, naive_range};
pub use intermediary::{Intermediary, build_intermediary};
pub use intersect::intersect_connectivity;
pub use migrate::{Migrated, gather_colors, migrate};
