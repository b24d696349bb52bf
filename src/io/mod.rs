//! Blocked mesh-file I/O.
//!
//! The container format is reached only through the [`MeshSource`] (read) and
//! [`MeshSink`] (write) traits. On top of them sit the streaming cursors, the
//! [`definition::MeshDefinition`] reader and the coloring writer.

pub mod coloring;
pub mod cursor;
pub mod definition;
pub mod exodus;
pub mod memory;

use crate::mesh_error::MeshStreamError;
use serde::{Deserialize, Serialize};

/// Global header of a mesh container.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshParams {
    /// Free-form title.
    pub title: String,
    /// Spatial dimension.
    pub num_dim: usize,
    /// Number of nodes (vertices).
    pub num_nodes: usize,
    /// Number of elements (cells) over all blocks.
    pub num_elem: usize,
    /// Number of element blocks.
    pub num_elem_blk: usize,
}

/// Per-block header.
///
/// For `nsided` blocks `num_nodes_per_elem` holds the node total of the whole
/// block; for `nfaced` blocks `num_faces_per_elem` holds the face total.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Raw element-type tag.
    pub elem_type: String,
    /// Number of elements in the block.
    pub num_elem: usize,
    /// Nodes per element (fixed kinds) or node total (`nsided`).
    pub num_nodes_per_elem: usize,
    /// Face total for `nfaced`, zero otherwise.
    pub num_faces_per_elem: usize,
    /// Attributes per element.
    pub num_attr: usize,
}

/// Which connectivity array of a variable-size block to read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnKind {
    /// Element → node indices.
    Nodes,
    /// Element → face indices.
    Faces,
}

/// Read side of a blocked mesh container.
///
/// Entity indices crossing this boundary are 1-based, as stored on disk.
pub trait MeshSource {
    /// Global header.
    fn params(&self) -> Result<MeshParams, MeshStreamError>;

    /// Ids of the element blocks, in file order.
    fn block_ids(&self) -> Result<Vec<i64>, MeshStreamError>;

    /// Header of block `blk_id`.
    fn block_info(&mut self, blk_id: i64) -> Result<BlockInfo, MeshStreamError>;

    /// Node connectivity of elements `start..start + count` (0-based element
    /// range) of a fixed-size block, `count * nodes_per_elem` entries.
    fn read_partial_conn(
        &mut self,
        blk_id: i64,
        start: usize,
        count: usize,
    ) -> Result<Vec<i64>, MeshStreamError>;

    /// Per-element node (`nsided`) or face (`nfaced`) counts of a whole block.
    fn read_entity_counts(&mut self, blk_id: i64) -> Result<Vec<usize>, MeshStreamError>;

    /// Flat connectivity array of a whole block.
    fn read_conn(&mut self, blk_id: i64, kind: ConnKind) -> Result<Vec<i64>, MeshStreamError>;

    /// Coordinates of nodes `start..start + count` in dimension-major layout:
    /// entry `d * count + i` is coordinate `d` of node `start + i`.
    fn read_partial_coords(&mut self, start: usize, count: usize)
    -> Result<Vec<f64>, MeshStreamError>;

    /// Names of the element variables.
    fn variable_names(&mut self) -> Result<Vec<String>, MeshStreamError>;

    /// Time values, one per stored step.
    fn times(&mut self) -> Result<Vec<f64>, MeshStreamError>;

    /// Values of element variable `var` on block `blk_id` at `step`.
    fn read_block_var(
        &mut self,
        step: usize,
        var: usize,
        blk_id: i64,
    ) -> Result<Vec<f64>, MeshStreamError>;
}

/// Write side of a blocked mesh container.
pub trait MeshSink {
    /// Global header. Must precede every other call.
    fn put_params(&mut self, params: &MeshParams) -> Result<(), MeshStreamError>;

    /// Declare block `blk_id`.
    fn put_block(&mut self, blk_id: i64, info: &BlockInfo) -> Result<(), MeshStreamError>;

    /// Attach a name to block `blk_id`.
    fn put_block_name(&mut self, blk_id: i64, name: &str) -> Result<(), MeshStreamError>;

    /// Store a whole connectivity array (1-based) for block `blk_id`.
    fn put_conn(&mut self, blk_id: i64, kind: ConnKind, conn: &[i64]) -> Result<(), MeshStreamError>;

    /// Store per-element counts for a variable-size block.
    fn put_entity_counts(&mut self, blk_id: i64, counts: &[usize]) -> Result<(), MeshStreamError>;

    /// Declare the element variables.
    fn put_variable_names(&mut self, names: &[&str]) -> Result<(), MeshStreamError>;

    /// Record the time value of `step`.
    fn put_time(&mut self, step: usize, time: f64) -> Result<(), MeshStreamError>;

    /// Store element variable `var` on block `blk_id` at `step`.
    fn put_block_var(
        &mut self,
        step: usize,
        var: usize,
        blk_id: i64,
        values: &[f64],
    ) -> Result<(), MeshStreamError>;

    /// Store all coordinates, one vector per dimension.
    fn put_coords(&mut self, coords: &[Vec<f64>]) -> Result<(), MeshStreamError>;

    /// Flush and close.
    fn finish(&mut self) -> Result<(), MeshStreamError>;
}

/// Convert file-convention 1-based indices to 0-based ones.
pub(crate) fn to_zero_based(raw: &[i64], block: i64) -> Result<Vec<usize>, MeshStreamError> {
    raw.iter()
        .map(|&v| {
            if v >= 1 {
                Ok((v - 1) as usize)
            } else {
                Err(MeshStreamError::CorruptBlock {
                    block,
                    detail: format!("non-positive entity index {v}"),
                })
            }
        })
        .collect()
}
