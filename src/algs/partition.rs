//! Color assignment of dual-graph vertices (cells).
//!
//! A [`Colorer`] maps every local row of a [`DualGraph`] to a color in
//! `0..num_colors`; each color later becomes the owning rank of the cell.

use log::debug;

use super::dual_graph::{DualGraph, naive_owner};
use crate::mesh_error::MeshStreamError;

/// Partitioner interface: one color per local graph row.
pub trait Colorer {
    fn color(&self, graph: &DualGraph, num_colors: usize) -> Result<Vec<usize>, MeshStreamError>;
}

/// Contiguous slabs of global ids, ignoring the graph's edges.
#[derive(Clone, Copy, Debug)]
pub struct BlockColorer {
    /// Total number of cells over all ranks.
    pub num_entities: usize,
}

impl Colorer for BlockColorer {
    fn color(&self, graph: &DualGraph, num_colors: usize) -> Result<Vec<usize>, MeshStreamError> {
        if num_colors == 0 {
            return Err(MeshStreamError::Partition("zero colors requested".into()));
        }
        let n = graph.num_local();
        if graph.first + n > self.num_entities {
            return Err(MeshStreamError::IndexOutOfRange {
                index: graph.first + n,
                rows: self.num_entities,
            });
        }
        Ok((0..n)
            .map(|i| naive_owner(graph.global_id(i), self.num_entities, num_colors))
            .collect())
    }
}

/// METIS k-way partition of a graph holding every cell.
#[cfg(feature = "metis-support")]
#[derive(Clone, Copy, Debug, Default)]
pub struct MetisColorer;

#[cfg(feature = "metis-support")]
impl Colorer for MetisColorer {
    fn color(&self, graph: &DualGraph, num_colors: usize) -> Result<Vec<usize>, MeshStreamError> {
        use metis::Idx;

        let n = graph.num_local();
        if graph.first != 0 || graph.adjncy.iter().any(|&c| c >= n) {
            return Err(MeshStreamError::Partition(
                "METIS needs the dual graph of the whole mesh".into(),
            ));
        }
        if num_colors <= 1 || n == 0 {
            return Ok(vec![0; n]);
        }
        let to_idx = |v: usize| {
            Idx::try_from(v).map_err(|_| MeshStreamError::Partition(format!("{v} exceeds METIS index range")))
        };
        let mut xadj = graph.xadj.iter().map(|&v| to_idx(v)).collect::<Result<Vec<Idx>, _>>()?;
        let mut adjncy = graph.adjncy.iter().map(|&v| to_idx(v)).collect::<Result<Vec<Idx>, _>>()?;
        let nparts = to_idx(num_colors)?;
        let mut part: Vec<Idx> = vec![0; n];

        let cut = metis::Graph::new(1, nparts, &mut xadj, &mut adjncy)
            .map_err(|e| MeshStreamError::Partition(format!("{e:?}")))?
            .part_kway(&mut part)
            .map_err(|e| MeshStreamError::Partition(format!("{e:?}")))?;
        debug!("METIS k-way into {num_colors} parts: edge cut {cut}");

        part.into_iter()
            .map(|p| usize::try_from(p).map_err(|_| MeshStreamError::Partition(format!("negative part {p}"))))
            .collect()
    }
}

/// Number of cells per color, for balance reporting.
pub fn color_counts(colors: &[usize], num_colors: usize) -> Vec<usize> {
    let mut counts = vec![0; num_colors];
    for &c in colors {
        if let Some(slot) = counts.get_mut(c) {
            *slot += 1;
        }
    }
    debug!("color counts: {counts:?}");
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(first: usize, n: usize) -> DualGraph {
        DualGraph {
            first,
            xadj: (0..=n).collect(),
            adjncy: (0..n).map(|i| first + i + 1).collect(),
            vwgt: vec![1; n],
        }
    }

    #[test]
    fn block_colors_follow_global_slabs() {
        let colorer = BlockColorer { num_entities: 10 };
        let colors = colorer.color(&path_graph(4, 4), 3).unwrap();
        // slabs: 0..4, 4..7, 7..10
        assert_eq!(colors, vec![1, 1, 1, 2]);
        assert_eq!(color_counts(&colors, 3), vec![0, 3, 1]);
    }

    #[test]
    fn block_colorer_rejects_bad_input() {
        let colorer = BlockColorer { num_entities: 3 };
        assert!(colorer.color(&path_graph(0, 2), 0).is_err());
        assert!(colorer.color(&path_graph(2, 2), 2).is_err());
    }
}
