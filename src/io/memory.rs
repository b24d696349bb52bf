//! In-memory blocked mesh container.
//!
//! [`MemoryMesh`] implements both [`MeshSource`] and [`MeshSink`] with the same
//! conventions as the on-disk container: 1-based connectivity, dimension-major
//! coordinates, Exodus-style block headers. It is the reference backend for
//! tests and the staging area of [`super::exodus::ExoWriter`].

use std::collections::BTreeMap;

use super::{BlockInfo, ConnKind, MeshParams, MeshSink, MeshSource};
use crate::mesh_error::MeshStreamError;

/// One element block held in memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryBlock {
    /// Block id.
    pub id: i64,
    /// Optional block name.
    pub name: Option<String>,
    /// Block header.
    pub info: BlockInfo,
    /// Per-element counts for `nsided` / `nfaced` blocks.
    pub counts: Vec<usize>,
    /// Flat 1-based node connectivity.
    pub nodes: Vec<i64>,
    /// Flat 1-based face connectivity (`nfaced` only).
    pub faces: Vec<i64>,
}

/// Number of payload reads served, for observing windowing behaviour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Connectivity and count reads.
    pub conn_reads: usize,
    /// Coordinate reads.
    pub coord_reads: usize,
}

/// In-memory mesh container.
#[derive(Clone, Debug, Default)]
pub struct MemoryMesh {
    params: MeshParams,
    blocks: Vec<MemoryBlock>,
    coords: Vec<Vec<f64>>,
    var_names: Vec<String>,
    times: Vec<f64>,
    vars: BTreeMap<(usize, usize, i64), Vec<f64>>,
    stats: ReadStats,
    finished: bool,
}

fn missing_block(op: &'static str, blk_id: i64) -> MeshStreamError {
    MeshStreamError::Backend {
        op,
        status: -1,
        detail: format!("no element block with id {blk_id}"),
    }
}

impl MemoryMesh {
    /// Empty mesh of spatial dimension `num_dim`.
    pub fn new(num_dim: usize) -> Self {
        Self {
            params: MeshParams {
                num_dim,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Set the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.params.title = title.into();
        self
    }

    /// Append a fixed-size block; `conn` is 1-based, `nodes_per_elem` per element.
    pub fn fixed_block(mut self, id: i64, elem_type: &str, nodes_per_elem: usize, conn: Vec<i64>) -> Self {
        let num_elem = if nodes_per_elem == 0 {
            0
        } else {
            conn.len() / nodes_per_elem
        };
        self.blocks.push(MemoryBlock {
            id,
            name: None,
            info: BlockInfo {
                elem_type: elem_type.to_string(),
                num_elem,
                num_nodes_per_elem: nodes_per_elem,
                num_faces_per_elem: 0,
                num_attr: 0,
            },
            counts: Vec::new(),
            nodes: conn,
            faces: Vec::new(),
        });
        self.refresh_params();
        self
    }

    /// Append an `nsided` block.
    pub fn polygon_block(mut self, id: i64, counts: Vec<usize>, conn: Vec<i64>) -> Self {
        self.blocks.push(MemoryBlock {
            id,
            name: None,
            info: BlockInfo {
                elem_type: "nsided".to_string(),
                num_elem: counts.len(),
                num_nodes_per_elem: conn.len(),
                num_faces_per_elem: 0,
                num_attr: 0,
            },
            counts,
            nodes: conn,
            faces: Vec::new(),
        });
        self.refresh_params();
        self
    }

    /// Append an `nfaced` block; `faces` are 1-based face ids.
    pub fn polyhedron_block(mut self, id: i64, counts: Vec<usize>, faces: Vec<i64>) -> Self {
        self.blocks.push(MemoryBlock {
            id,
            name: None,
            info: BlockInfo {
                elem_type: "nfaced".to_string(),
                num_elem: counts.len(),
                num_nodes_per_elem: 0,
                num_faces_per_elem: faces.len(),
                num_attr: 0,
            },
            counts,
            nodes: Vec::new(),
            faces,
        });
        self.refresh_params();
        self
    }

    /// Append a block without elements.
    pub fn empty_block(mut self, id: i64, elem_type: &str) -> Self {
        self.blocks.push(MemoryBlock {
            id,
            info: BlockInfo {
                elem_type: elem_type.to_string(),
                ..Default::default()
            },
            ..Default::default()
        });
        self.refresh_params();
        self
    }

    /// Set node coordinates, one vector per dimension.
    pub fn coords(mut self, coords: Vec<Vec<f64>>) -> Self {
        self.coords = coords;
        self.refresh_params();
        self
    }

    fn refresh_params(&mut self) {
        self.params.num_elem = self.blocks.iter().map(|b| b.info.num_elem).sum();
        self.params.num_elem_blk = self.blocks.len();
        self.params.num_nodes = self.coords.first().map_or(0, Vec::len);
    }

    /// Stored blocks, in file order.
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    /// Stored coordinates, one vector per dimension.
    pub fn coordinates(&self) -> &[Vec<f64>] {
        &self.coords
    }

    /// Read counters.
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Zero the read counters.
    pub fn reset_stats(&mut self) {
        self.stats = ReadStats::default();
    }

    /// `true` once [`MeshSink::finish`] succeeded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn header(&self) -> &MeshParams {
        &self.params
    }

    pub(crate) fn variables(&self) -> (&[String], &[f64], &BTreeMap<(usize, usize, i64), Vec<f64>>) {
        (&self.var_names, &self.times, &self.vars)
    }

    pub(crate) fn from_parts(
        params: MeshParams,
        blocks: Vec<MemoryBlock>,
        coords: Vec<Vec<f64>>,
        var_names: Vec<String>,
        times: Vec<f64>,
        vars: BTreeMap<(usize, usize, i64), Vec<f64>>,
    ) -> Self {
        Self {
            params,
            blocks,
            coords,
            var_names,
            times,
            vars,
            stats: ReadStats::default(),
            finished: true,
        }
    }

    fn block(&self, op: &'static str, blk_id: i64) -> Result<&MemoryBlock, MeshStreamError> {
        self.blocks
            .iter()
            .find(|b| b.id == blk_id)
            .ok_or_else(|| missing_block(op, blk_id))
    }

    fn block_mut(&mut self, op: &'static str, blk_id: i64) -> Result<&mut MemoryBlock, MeshStreamError> {
        self.blocks
            .iter_mut()
            .find(|b| b.id == blk_id)
            .ok_or_else(|| missing_block(op, blk_id))
    }
}

impl MeshSource for MemoryMesh {
    fn params(&self) -> Result<MeshParams, MeshStreamError> {
        Ok(self.params.clone())
    }

    fn block_ids(&self) -> Result<Vec<i64>, MeshStreamError> {
        Ok(self.blocks.iter().map(|b| b.id).collect())
    }

    fn block_info(&mut self, blk_id: i64) -> Result<BlockInfo, MeshStreamError> {
        Ok(self.block("block_info", blk_id)?.info.clone())
    }

    fn read_partial_conn(
        &mut self,
        blk_id: i64,
        start: usize,
        count: usize,
    ) -> Result<Vec<i64>, MeshStreamError> {
        const OP: &str = "read_partial_conn";
        let block = self.block(OP, blk_id)?;
        let npe = block.info.num_nodes_per_elem;
        if start + count > block.info.num_elem {
            return Err(MeshStreamError::Backend {
                op: OP,
                status: -1,
                detail: format!(
                    "elements {start}..{} exceed block {blk_id} of {} elements",
                    start + count,
                    block.info.num_elem
                ),
            });
        }
        let lo = start * npe;
        let hi = (start + count) * npe;
        let out = block
            .nodes
            .get(lo..hi)
            .ok_or_else(|| MeshStreamError::Backend {
                op: OP,
                status: -1,
                detail: format!("connectivity of block {blk_id} is truncated"),
            })?
            .to_vec();
        self.stats.conn_reads += 1;
        Ok(out)
    }

    fn read_entity_counts(&mut self, blk_id: i64) -> Result<Vec<usize>, MeshStreamError> {
        let out = self.block("read_entity_counts", blk_id)?.counts.clone();
        self.stats.conn_reads += 1;
        Ok(out)
    }

    fn read_conn(&mut self, blk_id: i64, kind: ConnKind) -> Result<Vec<i64>, MeshStreamError> {
        let block = self.block("read_conn", blk_id)?;
        let out = match kind {
            ConnKind::Nodes => block.nodes.clone(),
            ConnKind::Faces => block.faces.clone(),
        };
        self.stats.conn_reads += 1;
        Ok(out)
    }

    fn read_partial_coords(
        &mut self,
        start: usize,
        count: usize,
    ) -> Result<Vec<f64>, MeshStreamError> {
        let mut out = Vec::with_capacity(count * self.coords.len());
        for axis in &self.coords {
            let slice = axis
                .get(start..start + count)
                .ok_or_else(|| MeshStreamError::Backend {
                    op: "read_partial_coords",
                    status: -1,
                    detail: format!("nodes {start}..{} out of range", start + count),
                })?;
            out.extend_from_slice(slice);
        }
        self.stats.coord_reads += 1;
        Ok(out)
    }

    fn variable_names(&mut self) -> Result<Vec<String>, MeshStreamError> {
        Ok(self.var_names.clone())
    }

    fn times(&mut self) -> Result<Vec<f64>, MeshStreamError> {
        Ok(self.times.clone())
    }

    fn read_block_var(
        &mut self,
        step: usize,
        var: usize,
        blk_id: i64,
    ) -> Result<Vec<f64>, MeshStreamError> {
        self.vars
            .get(&(step, var, blk_id))
            .cloned()
            .ok_or_else(|| MeshStreamError::Backend {
                op: "read_block_var",
                status: -1,
                detail: format!("no variable {var} at step {step} on block {blk_id}"),
            })
    }
}

impl MeshSink for MemoryMesh {
    fn put_params(&mut self, params: &MeshParams) -> Result<(), MeshStreamError> {
        self.params = params.clone();
        self.blocks.clear();
        self.coords.clear();
        self.var_names.clear();
        self.times.clear();
        self.vars.clear();
        self.finished = false;
        Ok(())
    }

    fn put_block(&mut self, blk_id: i64, info: &BlockInfo) -> Result<(), MeshStreamError> {
        if self.blocks.iter().any(|b| b.id == blk_id) {
            return Err(MeshStreamError::Backend {
                op: "put_block",
                status: -1,
                detail: format!("block {blk_id} already defined"),
            });
        }
        self.blocks.push(MemoryBlock {
            id: blk_id,
            info: info.clone(),
            ..Default::default()
        });
        Ok(())
    }

    fn put_block_name(&mut self, blk_id: i64, name: &str) -> Result<(), MeshStreamError> {
        self.block_mut("put_block_name", blk_id)?.name = Some(name.to_string());
        Ok(())
    }

    fn put_conn(&mut self, blk_id: i64, kind: ConnKind, conn: &[i64]) -> Result<(), MeshStreamError> {
        let block = self.block_mut("put_conn", blk_id)?;
        match kind {
            ConnKind::Nodes => block.nodes = conn.to_vec(),
            ConnKind::Faces => block.faces = conn.to_vec(),
        }
        Ok(())
    }

    fn put_entity_counts(&mut self, blk_id: i64, counts: &[usize]) -> Result<(), MeshStreamError> {
        self.block_mut("put_entity_counts", blk_id)?.counts = counts.to_vec();
        Ok(())
    }

    fn put_variable_names(&mut self, names: &[&str]) -> Result<(), MeshStreamError> {
        self.var_names = names.iter().map(|n| n.to_string()).collect();
        Ok(())
    }

    fn put_time(&mut self, step: usize, time: f64) -> Result<(), MeshStreamError> {
        if step > self.times.len() {
            return Err(MeshStreamError::Backend {
                op: "put_time",
                status: -1,
                detail: format!("time step {step} written before step {}", self.times.len()),
            });
        }
        if step == self.times.len() {
            self.times.push(time);
        } else {
            self.times[step] = time;
        }
        Ok(())
    }

    fn put_block_var(
        &mut self,
        step: usize,
        var: usize,
        blk_id: i64,
        values: &[f64],
    ) -> Result<(), MeshStreamError> {
        const OP: &str = "put_block_var";
        if var >= self.var_names.len() {
            return Err(MeshStreamError::Backend {
                op: OP,
                status: -1,
                detail: format!("variable {var} not declared"),
            });
        }
        let num_elem = self.block(OP, blk_id)?.info.num_elem;
        if values.len() != num_elem {
            return Err(MeshStreamError::LengthMismatch {
                what: "block variable",
                expected: num_elem,
                found: values.len(),
            });
        }
        self.vars.insert((step, var, blk_id), values.to_vec());
        Ok(())
    }

    fn put_coords(&mut self, coords: &[Vec<f64>]) -> Result<(), MeshStreamError> {
        if coords.len() != self.params.num_dim {
            return Err(MeshStreamError::LengthMismatch {
                what: "coordinate axes",
                expected: self.params.num_dim,
                found: coords.len(),
            });
        }
        if let Some(axis) = coords.iter().find(|a| a.len() != self.params.num_nodes) {
            return Err(MeshStreamError::LengthMismatch {
                what: "coordinates per axis",
                expected: self.params.num_nodes,
                found: axis.len(),
            });
        }
        self.coords = coords.to_vec();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), MeshStreamError> {
        if self.blocks.len() != self.params.num_elem_blk {
            return Err(MeshStreamError::LengthMismatch {
                what: "element blocks",
                expected: self.params.num_elem_blk,
                found: self.blocks.len(),
            });
        }
        let num_elem: usize = self.blocks.iter().map(|b| b.info.num_elem).sum();
        if num_elem != self.params.num_elem {
            return Err(MeshStreamError::LengthMismatch {
                what: "elements",
                expected: self.params.num_elem,
                found: num_elem,
            });
        }
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_quads() -> MemoryMesh {
        MemoryMesh::new(2)
            .fixed_block(1, "quad4", 4, vec![1, 2, 5, 4, 2, 3, 6, 5])
            .coords(vec![
                vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0],
                vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            ])
    }

    #[test]
    fn builder_derives_header() {
        let mesh = two_quads();
        let params = mesh.params().unwrap();
        assert_eq!(params.num_elem, 2);
        assert_eq!(params.num_nodes, 6);
        assert_eq!(params.num_elem_blk, 1);
    }

    #[test]
    fn partial_reads_are_windowed() {
        let mut mesh = two_quads();
        assert_eq!(mesh.read_partial_conn(1, 1, 1).unwrap(), vec![2, 3, 6, 5]);
        assert!(mesh.read_partial_conn(1, 1, 2).is_err());
        assert_eq!(
            mesh.read_partial_coords(4, 2).unwrap(),
            vec![1.0, 2.0, 1.0, 1.0]
        );
        assert_eq!(mesh.stats().conn_reads, 1);
        assert_eq!(mesh.stats().coord_reads, 1);
    }

    #[test]
    fn unknown_block_id_is_backend_error() {
        let mut mesh = two_quads();
        let err = mesh.block_info(9).unwrap_err();
        assert!(matches!(err, MeshStreamError::Backend { op: "block_info", .. }));
    }

    #[test]
    fn sink_checks_block_variable_length() {
        let mut mesh = MemoryMesh::default();
        let params = MeshParams {
            num_dim: 2,
            num_nodes: 0,
            num_elem: 2,
            num_elem_blk: 1,
            ..Default::default()
        };
        mesh.put_params(&params).unwrap();
        let info = BlockInfo {
            elem_type: "tri3".into(),
            num_elem: 2,
            num_nodes_per_elem: 3,
            ..Default::default()
        };
        mesh.put_block(7, &info).unwrap();
        mesh.put_variable_names(&["color"]).unwrap();
        assert!(mesh.put_block_var(0, 0, 7, &[1.0]).is_err());
        mesh.put_block_var(0, 0, 7, &[1.0, 0.0]).unwrap();
        assert!(mesh.put_block(7, &info).is_err());
        mesh.finish().unwrap();
        assert!(mesh.is_finished());
    }
}
