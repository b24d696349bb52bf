//! Build the distributed dual graph of a streamed mesh.
//
// Each cell is a graph vertex; two cells are joined when they share more
// than `adjacency_depth` mesh vertices (depth 0: any vertex, depth 1 in 2D:
// an edge, depth 2 in 3D: at least a triangle's worth of a face).
//
// Returned in ParMETIS-ready CSR form over the worker's local cells:
//
// * `xadj[i] .. xadj[i+1]`   = neighbour list of local cell *i*
// * `adjncy`                 = concatenated neighbours, as global cell ids
// * `vwgt[i]`                = vertex weight, 1
//
// The graph is symmetric over the whole mesh and free of self loops.

use std::ops::Range;

use hashbrown::HashMap;
use log::debug;
use num_traits::Float;

use crate::io::MeshSource;
use crate::io::definition::MeshDefinition;
use crate::mesh_error::MeshStreamError;
use crate::topology::Csr;

/// CSR graph over the local cells `first..first + num_local()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualGraph {
    /// Global id of local row 0.
    pub first: usize,
    pub xadj: Vec<usize>,
    pub adjncy: Vec<usize>,
    pub vwgt: Vec<i32>, // ParMETIS expects i32
}

impl DualGraph {
    pub fn num_local(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    /// Global id of local row `i`.
    pub fn global_id(&self, i: usize) -> usize {
        self.first + i
    }

    /// Neighbours of local row `i`.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.adjncy[self.xadj[i]..self.xadj[i + 1]]
    }
}

/// Dual graph plus the tables it was derived from.
#[derive(Debug, Clone)]
pub struct MeshGraph {
    pub graph: DualGraph,
    /// Local cell → global vertex ids.
    pub c2v: Csr,
    /// Global vertex → global cell ids; only vertices of local cells have
    /// non-empty rows.
    pub v2c: Csr,
    /// Local cell → adjacent global cell ids, ascending.
    pub c2c: Csr,
}

/// Contiguous share of `n` entities owned by `rank` out of `size`; the first
/// `n % size` ranks take one extra.
pub fn naive_range(n: usize, rank: usize, size: usize) -> Range<usize> {
    let base = n / size;
    let extra = n % size;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    start..start + len
}

/// Rank whose [`naive_range`] holds `id`.
pub fn naive_owner(id: usize, n: usize, size: usize) -> usize {
    let base = n / size;
    let extra = n % size;
    let split = extra * (base + 1);
    if id < split {
        id / (base + 1)
    } else {
        extra + (id - split) / base.max(1)
    }
}

/// Stream the cells in `range` and the whole mesh once more to build the
/// dual graph of `range`.
pub fn make_dual_graph<S, T>(
    def: &mut MeshDefinition<S, T>,
    adjacency_depth: usize,
    range: Range<usize>,
) -> Result<MeshGraph, MeshStreamError>
where
    S: MeshSource,
    T: Float,
{
    let dim = def.dimension();
    let num_cells = def.num_entities(dim)?;
    let num_verts = def.num_entities(0)?;
    if range.end > num_cells || range.start > range.end {
        return Err(MeshStreamError::IndexOutOfRange {
            index: range.end,
            rows: num_cells,
        });
    }

    let mut row = Vec::new();
    let mut c2v = Csr::with_capacity(range.len(), 0);
    let mut touched: HashMap<usize, Vec<usize>> = HashMap::new();
    for cell in range.clone() {
        def.stream_into(cell, &mut row)?;
        for &v in &row {
            touched.entry(v).or_default();
        }
        c2v.push_row(row.iter().copied());
    }

    for cell in 0..num_cells {
        def.stream_into(cell, &mut row)?;
        for v in &row {
            if let Some(cells) = touched.get_mut(v) {
                cells.push(cell);
            }
        }
    }

    let mut v2c = Csr::with_capacity(num_verts, 0);
    for v in 0..num_verts {
        match touched.get(&v) {
            Some(cells) => v2c.push_row(cells.iter().copied()),
            None => v2c.push_row(std::iter::empty()),
        }
    }

    let mut c2c = Csr::with_capacity(range.len(), 0);
    let mut shared: HashMap<usize, usize> = HashMap::new();
    let mut nbrs = Vec::new();
    for (local, cell) in range.clone().enumerate() {
        shared.clear();
        for &v in c2v.row(local) {
            for &other in v2c.row(v) {
                if other != cell {
                    *shared.entry(other).or_insert(0) += 1;
                }
            }
        }
        nbrs.clear();
        nbrs.extend(
            shared
                .iter()
                .filter(|&(_, &n)| n > adjacency_depth)
                .map(|(&c, _)| c),
        );
        nbrs.sort_unstable();
        c2c.push_row(nbrs.iter().copied());
    }

    debug!(
        "dual graph of cells {}..{}: {} edges (depth {adjacency_depth})",
        range.start,
        range.end,
        c2c.nnz()
    );
    let graph = DualGraph {
        first: range.start,
        xadj: c2c.offsets.clone(),
        adjncy: c2c.indices.clone(),
        vwgt: vec![1; range.len()],
    };
    Ok(MeshGraph { graph, c2v, v2c, c2c })
}
