//! Sub-entity templates used to derive intermediary entities.
//!
//! Local vertex numbering follows the Exodus convention:
//!
//! - tetrahedron `(0,1,2,3)`, with `0,1,2` the base triangle;
//! - hexahedron `(0..8)`, with `0..=3` the bottom face and `4..=7` the top face.
//!
//! Faces are listed with outward orientation. Polygons (and faces used as
//! parents of edges) are walked as cycles.

use crate::mesh_error::MeshStreamError;

/// Tetrahedron edges.
pub const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];

/// Hexahedron edges.
pub const HEX_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Tetrahedron faces.
pub const TET_FACES: [[usize; 3]; 4] = [[0, 1, 3], [1, 2, 3], [0, 3, 2], [0, 2, 1]];

/// Hexahedron faces.
pub const HEX_FACES: [[usize; 4]; 6] = [
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [0, 4, 7, 3],
    [0, 3, 2, 1],
    [4, 5, 6, 7],
];

/// How to enumerate the sub-entities of one owning entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Template {
    /// Consecutive vertex pairs, closing the last vertex back to the first.
    Cycle,
    /// Fixed local-vertex groupings.
    Table(&'static [&'static [usize]]),
}

const TET_EDGE_TABLE: [&[usize]; 6] = [
    &TET_EDGES[0],
    &TET_EDGES[1],
    &TET_EDGES[2],
    &TET_EDGES[3],
    &TET_EDGES[4],
    &TET_EDGES[5],
];

const HEX_EDGE_TABLE: [&[usize]; 12] = [
    &HEX_EDGES[0],
    &HEX_EDGES[1],
    &HEX_EDGES[2],
    &HEX_EDGES[3],
    &HEX_EDGES[4],
    &HEX_EDGES[5],
    &HEX_EDGES[6],
    &HEX_EDGES[7],
    &HEX_EDGES[8],
    &HEX_EDGES[9],
    &HEX_EDGES[10],
    &HEX_EDGES[11],
];

const TET_FACE_TABLE: [&[usize]; 4] = [&TET_FACES[0], &TET_FACES[1], &TET_FACES[2], &TET_FACES[3]];

const HEX_FACE_TABLE: [&[usize]; 6] = [
    &HEX_FACES[0],
    &HEX_FACES[1],
    &HEX_FACES[2],
    &HEX_FACES[3],
    &HEX_FACES[4],
    &HEX_FACES[5],
];

/// Select the template deriving `dim`-dimensional entities from a
/// `parent_dim`-dimensional entity with `len` vertices.
///
/// 3D parents are recognised by vertex count: 4 is a tetrahedron, 8 a
/// hexahedron.
pub fn template_for(dim: usize, parent_dim: usize, len: usize) -> Result<Template, MeshStreamError> {
    let missing = MeshStreamError::MissingTemplate {
        dim,
        parent_dim,
        len,
    };
    match (dim, parent_dim) {
        (1, 2) if len >= 2 => Ok(Template::Cycle),
        (1, 3) => match len {
            4 => Ok(Template::Table(&TET_EDGE_TABLE)),
            8 => Ok(Template::Table(&HEX_EDGE_TABLE)),
            _ => Err(missing),
        },
        (2, 3) => match len {
            4 => Ok(Template::Table(&TET_FACE_TABLE)),
            8 => Ok(Template::Table(&HEX_FACE_TABLE)),
            _ => Err(missing),
        },
        _ => Err(missing),
    }
}

impl Template {
    /// Emit each sub-entity of `vertices` through `f`, in template order.
    pub fn for_each(self, vertices: &[usize], mut f: impl FnMut(&[usize])) {
        match self {
            Template::Cycle => {
                let n = vertices.len();
                for i in 0..n {
                    f(&[vertices[i], vertices[(i + 1) % n]]);
                }
            }
            Template::Table(groups) => {
                let mut buf = Vec::with_capacity(4);
                for group in groups {
                    buf.clear();
                    buf.extend(group.iter().map(|&l| vertices[l]));
                    f(&buf);
                }
            }
        }
    }

    /// Number of sub-entities produced for a parent with `len` vertices.
    pub fn count(self, len: usize) -> usize {
        match self {
            Template::Cycle => len,
            Template::Table(groups) => groups.len(),
        }
    }
}
