//! Element categories of mesh-file blocks.

use serde::{Deserialize, Serialize};

/// Element category shared by every entity of a block.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    /// 3-node triangle.
    Tri,
    /// 4-node quadrilateral (also 4-node shells).
    Quad,
    /// 4-node tetrahedron.
    Tet,
    /// 8-node hexahedron.
    Hex,
    /// Arbitrary polygons (`nsided`), per-element node counts.
    Polygon,
    /// Arbitrary polyhedra (`nfaced`), per-element face counts.
    Polyhedron,
    /// Tag not recognised.
    Unknown,
    /// Block without elements.
    Empty,
}

impl BlockKind {
    /// Canonicalize a raw element-type tag. Matching is case-insensitive.
    ///
    /// `num_elem == 0` always yields [`BlockKind::Empty`].
    pub fn from_type_name(name: &str, num_elem: usize) -> BlockKind {
        if num_elem == 0 {
            return BlockKind::Empty;
        }
        let tag = name.trim().to_ascii_lowercase();
        match tag.as_str() {
            "nsided" => BlockKind::Polygon,
            "nfaced" => BlockKind::Polyhedron,
            "tri" | "tri3" => BlockKind::Tri,
            "quad" | "quad4" | "shell" | "shell4" => BlockKind::Quad,
            "tet" | "tetra" | "tet4" | "tetra4" => BlockKind::Tet,
            "hex" | "hex8" => BlockKind::Hex,
            _ => BlockKind::Unknown,
        }
    }

    /// Tag written back to mesh files.
    pub fn type_name(self) -> &'static str {
        match self {
            BlockKind::Tri => "tri3",
            BlockKind::Quad => "quad4",
            BlockKind::Tet => "tetra4",
            BlockKind::Hex => "hex8",
            BlockKind::Polygon => "nsided",
            BlockKind::Polyhedron => "nfaced",
            BlockKind::Unknown => "unknown",
            BlockKind::Empty => "null",
        }
    }

    /// Nodes per element for fixed-size kinds.
    pub fn nodes_per_element(self) -> Option<usize> {
        match self {
            BlockKind::Tri => Some(3),
            BlockKind::Quad | BlockKind::Tet => Some(4),
            BlockKind::Hex => Some(8),
            _ => None,
        }
    }

    /// `true` when the block is decoded in bounded chunks.
    ///
    /// Unknown tags count as fixed so that a lookup can still land on the
    /// block; decoding it reports the error.
    pub fn is_chunked(self) -> bool {
        matches!(
            self,
            BlockKind::Tri | BlockKind::Quad | BlockKind::Tet | BlockKind::Hex | BlockKind::Unknown
        )
    }
}
