//! Top-level module for mesh topology tables.
//!
//! This module provides the pieces the readers and connectivity builders share:
//! - [`Csr`] incidence tables
//! - [`BlockKind`] element categories of file blocks
//! - sub-entity templates for deriving edges and faces

pub mod block_kind;
pub mod csr;
pub mod templates;

pub use block_kind::BlockKind;
pub use csr::Csr;
pub use templates::{Template, template_for};
