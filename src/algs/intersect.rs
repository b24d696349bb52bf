//! Compose two incidence tables through their shared middle dimension.
//!
//! Given `A → M` and `M → B`, row `a` of the result lists every `b` reachable
//! through some `m` of row `a`, once, in first-seen order.

use hashbrown::HashSet;

use crate::mesh_error::MeshStreamError;
use crate::topology::Csr;

fn check_range(a2m: &Csr, m2b: &Csr) -> Result<(), MeshStreamError> {
    let rows = m2b.num_rows();
    match a2m.max_index() {
        Some(index) if index >= rows => Err(MeshStreamError::IndexOutOfRange { index, rows }),
        _ => Ok(()),
    }
}

fn union_row(mids: &[usize], m2b: &Csr, seen: &mut HashSet<usize>, out: &mut Vec<usize>) {
    seen.clear();
    for &m in mids {
        for &b in m2b.row(m) {
            if seen.insert(b) {
                out.push(b);
            }
        }
    }
}

/// `A → B` as the deduplicated union of `M → B` over each row of `A → M`.
pub fn intersect_connectivity(a2m: &Csr, m2b: &Csr) -> Result<Csr, MeshStreamError> {
    check_range(a2m, m2b)?;
    let mut out = Csr::with_capacity(a2m.num_rows(), a2m.nnz());
    let mut seen = HashSet::new();
    let mut row = Vec::new();
    for mids in a2m.rows() {
        row.clear();
        union_row(mids, m2b, &mut seen, &mut row);
        out.push_row(row.iter().copied());
    }
    Ok(out)
}

/// Row-parallel [`intersect_connectivity`].
#[cfg(feature = "rayon")]
pub fn par_intersect_connectivity(a2m: &Csr, m2b: &Csr) -> Result<Csr, MeshStreamError> {
    use rayon::prelude::*;

    check_range(a2m, m2b)?;
    let rows: Vec<Vec<usize>> = (0..a2m.num_rows())
        .into_par_iter()
        .map_init(HashSet::new, |seen, r| {
            let mut row = Vec::new();
            union_row(a2m.row(r), m2b, seen, &mut row);
            row
        })
        .collect();
    Ok(Csr::from_rows(rows))
}
