//! Persist a cell coloring as an element variable on a copy of the mesh.

use std::path::Path;

use num_traits::Float;

use super::definition::MeshDefinition;
use super::exodus::{CreateMode, ExoWriter};
use super::{BlockInfo, ConnKind, MeshParams, MeshSink, MeshSource};
use crate::mesh_error::MeshStreamError;
use crate::topology::BlockKind;

/// Name of the element variable holding the color of each cell.
pub const COLOR_VARIABLE: &str = "color";

/// Name given to written block `blk_id`.
pub fn block_name(blk_id: i64) -> String {
    format!("cell-block-{blk_id}")
}

fn one_based(row: &[usize], out: &mut Vec<i64>) {
    out.extend(row.iter().map(|&v| v as i64 + 1));
}

/// Write the mesh read by `def` to `sink`, with `colors[cell]` stored as the
/// [`COLOR_VARIABLE`] element variable at time step 0.
///
/// The reader is rewound and streamed once more from the first cell. Blocks
/// without elements are dropped; polyhedral blocks keep their face rows.
pub fn write_coloring<K, S, T>(
    sink: &mut K,
    def: &mut MeshDefinition<S, T>,
    colors: &[usize],
) -> Result<(), MeshStreamError>
where
    K: MeshSink,
    S: MeshSource,
    T: Float,
{
    let dim = def.dimension();
    let num_cells = def.num_entities(dim)?;
    if colors.len() != num_cells {
        return Err(MeshStreamError::LengthMismatch {
            what: "colors",
            expected: num_cells,
            found: colors.len(),
        });
    }
    def.rewind();

    // (block id, kind, first cell, cell count)
    let mut layout = Vec::new();
    let mut start = 0;
    for b in def.blocks() {
        if b.kind != BlockKind::Empty {
            layout.push((b.id, b.kind, start, b.info.num_elem));
        }
        start += b.info.num_elem;
    }

    let params = def.params();
    sink.put_params(&MeshParams {
        title: params.title.clone(),
        num_dim: dim,
        num_nodes: params.num_nodes,
        num_elem: num_cells,
        num_elem_blk: layout.len(),
    })?;

    let mut conn = Vec::new();
    let mut counts = Vec::new();
    for &(blk_id, kind, first, n) in &layout {
        let (to, conn_kind) = if kind == BlockKind::Polyhedron {
            (2, ConnKind::Faces)
        } else {
            (0, ConnKind::Nodes)
        };
        conn.clear();
        counts.clear();
        for cell in first..first + n {
            let row = def.entities(dim, to, cell)?;
            counts.push(row.len());
            one_based(&row, &mut conn);
        }

        let mut info = BlockInfo {
            elem_type: kind.type_name().to_string(),
            num_elem: n,
            ..Default::default()
        };
        match kind {
            BlockKind::Polygon => info.num_nodes_per_elem = conn.len(),
            BlockKind::Polyhedron => info.num_faces_per_elem = conn.len(),
            _ => info.num_nodes_per_elem = counts.first().copied().unwrap_or(0),
        }
        sink.put_block(blk_id, &info)?;
        sink.put_block_name(blk_id, &block_name(blk_id))?;
        if matches!(kind, BlockKind::Polygon | BlockKind::Polyhedron) {
            sink.put_entity_counts(blk_id, &counts)?;
        }
        sink.put_conn(blk_id, conn_kind, &conn)?;
    }

    sink.put_variable_names(&[COLOR_VARIABLE])?;
    sink.put_time(0, 0.0)?;
    for &(blk_id, _, first, n) in &layout {
        let values: Vec<f64> = colors[first..first + n].iter().map(|&c| c as f64).collect();
        sink.put_block_var(0, 0, blk_id, &values)?;
    }

    let coords = def
        .read_point_coords()?
        .into_iter()
        .map(|axis| {
            axis.into_iter()
                .map(|x| {
                    x.to_f64().ok_or_else(|| {
                        MeshStreamError::NumericConversion("coordinate has no f64 value".into())
                    })
                })
                .collect::<Result<Vec<f64>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    sink.put_coords(&coords)?;
    sink.finish()
}

/// [`write_coloring`] into a new `.exob` file at `path`, replacing any
/// existing file.
pub fn write_coloring_file<P, S, T>(
    path: P,
    def: &mut MeshDefinition<S, T>,
    colors: &[usize],
) -> Result<(), MeshStreamError>
where
    P: AsRef<Path>,
    S: MeshSource,
    T: Float,
{
    let mut writer = ExoWriter::create(path, CreateMode::Clobber)?;
    write_coloring(&mut writer, def, colors)
}

/// Read the [`COLOR_VARIABLE`] of every cell back, in block order.
pub fn read_coloring<S: MeshSource>(source: &mut S) -> Result<Vec<usize>, MeshStreamError> {
    let var = source
        .variable_names()?
        .iter()
        .position(|n| n == COLOR_VARIABLE)
        .ok_or_else(|| MeshStreamError::Backend {
            op: "read_coloring",
            status: -1,
            detail: format!("no `{COLOR_VARIABLE}` variable"),
        })?;
    let mut out = Vec::new();
    for blk_id in source.block_ids()? {
        for v in source.read_block_var(0, var, blk_id)? {
            if v < 0.0 || v.fract() != 0.0 {
                return Err(MeshStreamError::NumericConversion(v.to_string()));
            }
            out.push(v as usize);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryMesh;

    #[test]
    fn colors_land_on_their_blocks() {
        let mesh = MemoryMesh::new(2)
            .fixed_block(3, "tri3", 3, vec![1, 2, 3, 2, 4, 3])
            .empty_block(4, "quad4")
            .polygon_block(5, vec![4], vec![2, 5, 6, 4])
            .coords(vec![vec![0.0, 1.0, 0.0, 1.0, 2.0, 2.0], vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0]]);
        let mut def: MeshDefinition<_> = MeshDefinition::open(mesh, 2).unwrap();
        let mut out = MemoryMesh::default();
        write_coloring(&mut out, &mut def, &[1, 0, 1]).unwrap();

        assert!(out.is_finished());
        assert_eq!(out.blocks().len(), 2);
        assert_eq!(out.blocks()[0].name.as_deref(), Some("cell-block-3"));
        assert_eq!(out.blocks()[1].info.elem_type, "nsided");
        assert_eq!(out.blocks()[1].counts, vec![4]);
        assert_eq!(out.blocks()[1].nodes, vec![2, 5, 6, 4]);
        assert_eq!(read_coloring(&mut out).unwrap(), vec![1, 0, 1]);
        assert_eq!(out.times().unwrap(), vec![0.0]);
    }

    #[test]
    fn color_count_must_match_cells() {
        let mesh = MemoryMesh::new(2)
            .fixed_block(1, "tri3", 3, vec![1, 2, 3])
            .coords(vec![vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]);
        let mut def: MeshDefinition<_> = MeshDefinition::open(mesh, 2).unwrap();
        let mut out = MemoryMesh::default();
        assert!(matches!(
            write_coloring(&mut out, &mut def, &[0, 1]),
            Err(MeshStreamError::LengthMismatch { what: "colors", .. })
        ));
    }
}
