//! Derive intermediary entities (edges, faces) from cell → vertex tables.
//!
//! Every sub-entity produced by a parent's template is canonicalized by its
//! sorted vertex tuple. The first occurrence gets the next dense id and keeps
//! its orientation; later occurrences reuse that id.

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use log::debug;

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshStreamError;
use crate::topology::{Csr, Template, template_for};

/// Result of [`build_intermediary`].
#[derive(Debug, Clone, Default)]
pub struct Intermediary {
    /// Derived entity → vertices, first-discovered orientation.
    pub forward: Csr,
    /// Parent row → derived entity ids, template order.
    pub reverse: Csr,
    /// Sorted vertex tuple → derived entity id.
    pub registry: HashMap<Vec<usize>, usize>,
}

impl Intermediary {
    pub fn num_entities(&self) -> usize {
        self.forward.num_rows()
    }

    /// Id of the derived entity spanned by `vertices`, in any order.
    pub fn lookup(&self, vertices: &[usize]) -> Option<usize> {
        let mut key = vertices.to_vec();
        key.sort_unstable();
        self.registry.get(&key).copied()
    }
}

/// Derive the `dim`-dimensional entities of the `parent_dim`-dimensional rows
/// of `c2v`.
///
/// Parents are visited in row order, or in increasing `p2m[row]` (global id)
/// when `p2m` is given, so that numbering does not depend on how rows were
/// distributed. `reverse` is indexed by row either way.
pub fn build_intermediary(
    dim: usize,
    parent_dim: usize,
    c2v: &Csr,
    p2m: Option<&[usize]>,
) -> Result<Intermediary, MeshStreamError> {
    let rows = c2v.num_rows();
    let mut templates: Vec<Template> = Vec::with_capacity(rows);
    let mut offsets = Vec::with_capacity(rows + 1);
    offsets.push(0);
    for verts in c2v.rows() {
        let t = template_for(dim, parent_dim, verts.len())?;
        let last = offsets[offsets.len() - 1];
        offsets.push(last + t.count(verts.len()));
        templates.push(t);
    }

    let mut order: Vec<usize> = (0..rows).collect();
    if let Some(p2m) = p2m {
        if p2m.len() != rows {
            return Err(MeshStreamError::LengthMismatch {
                what: "p2m",
                expected: rows,
                found: p2m.len(),
            });
        }
        order.sort_by_key(|&r| p2m[r]);
    }

    let total = offsets[rows];
    let mut reverse_ids = vec![0usize; total];
    let mut forward = Csr::with_capacity(total / 2, total);
    let mut registry: HashMap<Vec<usize>, usize> = HashMap::with_capacity(total / 2);

    for &r in &order {
        let mut slot = offsets[r];
        templates[r].for_each(c2v.row(r), |sub| {
            let mut key = sub.to_vec();
            key.sort_unstable();
            let id = match registry.entry(key) {
                Entry::Occupied(e) => *e.get(),
                Entry::Vacant(e) => {
                    let id = forward.num_rows();
                    forward.push_row(sub.iter().copied());
                    *e.insert(id)
                }
            };
            reverse_ids[slot] = id;
            slot += 1;
        });
    }

    forward.debug_assert_invariants();
    debug!(
        "derived {} {dim}D entities from {rows} {parent_dim}D parents",
        forward.num_rows()
    );
    Ok(Intermediary {
        forward,
        reverse: Csr {
            offsets,
            indices: reverse_ids,
        },
        registry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_edge_gets_one_id() {
        // two triangles sharing edge {1, 2}, seen as (1,2) and (2,1)
        let c2v = Csr::from_rows([vec![0, 1, 2], vec![2, 1, 3]]);
        let inter = build_intermediary(1, 2, &c2v, None).unwrap();
        assert_eq!(inter.num_entities(), 5);
        let shared = inter.lookup(&[2, 1]).unwrap();
        assert!(inter.reverse.row(0).contains(&shared));
        assert!(inter.reverse.row(1).contains(&shared));
        assert_eq!(inter.forward.row(shared), &[1, 2]);
        let occurrences = inter
            .forward
            .rows()
            .filter(|r| {
                let mut r = r.to_vec();
                r.sort_unstable();
                r == [1, 2]
            })
            .count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn global_order_decides_numbering() {
        let c2v = Csr::from_rows([vec![2, 1, 3], vec![0, 1, 2]]);
        let inter = build_intermediary(1, 2, &c2v, Some(&[11, 10])).unwrap();
        // row 1 (global 10) is visited first
        assert_eq!(inter.reverse.row(1), &[0, 1, 2]);
        assert_eq!(inter.forward.row(0), &[0, 1]);
        assert_eq!(inter.reverse.row(0), &[1, 3, 4]);
    }

    #[test]
    fn hex_faces_are_shared() {
        // two unit hexes stacked in z
        let c2v = Csr::from_rows([
            vec![0, 1, 2, 3, 4, 5, 6, 7],
            vec![4, 5, 6, 7, 8, 9, 10, 11],
        ]);
        let inter = build_intermediary(2, 3, &c2v, None).unwrap();
        assert_eq!(inter.num_entities(), 11);
        // top of the first hex is the bottom of the second
        assert_eq!(inter.reverse.row(0)[5], inter.reverse.row(1)[4]);
    }

    #[test]
    fn unknown_shape_is_an_error() {
        let c2v = Csr::from_rows([vec![0, 1, 2, 3, 4, 5]]);
        assert!(matches!(
            build_intermediary(2, 3, &c2v, None),
            Err(MeshStreamError::MissingTemplate { len: 6, .. })
        ));
        assert!(build_intermediary(1, 2, &c2v, Some(&[0, 1])).is_err());
    }
}
