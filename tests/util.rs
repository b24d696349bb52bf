#![allow(dead_code)]
use std::path::PathBuf;

use mesh_stream::{
    algs::communicator::RayonComm,
    io::MeshSource,
    io::definition::MeshDefinition,
    io::memory::MemoryMesh,
    topology::BlockKind,
};

fn one_based(rows: &[Vec<usize>]) -> Vec<i64> {
    rows.iter().flatten().map(|&v| v as i64 + 1).collect()
}

/// 2×2 quads on a 3×3 vertex grid; vertex `(i, j)` is `3 * j + i`, cell
/// `(i, j)` is `2 * j + i`.
pub fn quad_2x2() -> MemoryMesh {
    let v = |i: usize, j: usize| 3 * j + i;
    let mut cells = Vec::new();
    for j in 0..2 {
        for i in 0..2 {
            cells.push(vec![v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)]);
        }
    }
    let xs = (0..9).map(|n| (n % 3) as f64).collect();
    let ys = (0..9).map(|n| (n / 3) as f64).collect();
    MemoryMesh::new(2)
        .title("quad 2x2")
        .fixed_block(1, "QUAD4", 4, one_based(&cells))
        .coords(vec![xs, ys])
}

/// Quads, an empty block, triangles, polygons and a trailing triangle.
pub fn mixed_2d() -> MemoryMesh {
    let xs = (0..12).map(|n| n as f64 * 0.5).collect();
    let ys = (0..12).map(|n| (n / 4) as f64).collect();
    MemoryMesh::new(2)
        .title("mixed")
        .fixed_block(10, "quad4", 4, one_based(&[vec![0, 1, 5, 4], vec![1, 2, 6, 5]]))
        .empty_block(20, "quad4")
        .fixed_block(
            30,
            "tri",
            3,
            one_based(&[vec![2, 3, 7], vec![2, 7, 6], vec![4, 5, 8]]),
        )
        .polygon_block(40, vec![4, 5], one_based(&[vec![5, 6, 9, 8], vec![6, 7, 10, 11, 9]]))
        .fixed_block(50, "shell4", 4, one_based(&[vec![3, 10, 7, 2]]))
        .coords(vec![xs, ys])
}

/// Structured `nx × ny × nz` hexahedra in one block.
pub fn hex_box(nx: usize, ny: usize, nz: usize) -> MemoryMesh {
    let v = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);
    let mut cells = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                cells.push(vec![
                    v(i, j, k),
                    v(i + 1, j, k),
                    v(i + 1, j + 1, k),
                    v(i, j + 1, k),
                    v(i, j, k + 1),
                    v(i + 1, j, k + 1),
                    v(i + 1, j + 1, k + 1),
                    v(i, j + 1, k + 1),
                ]);
            }
        }
    }
    let n = (nx + 1) * (ny + 1) * (nz + 1);
    let mut coords = vec![Vec::with_capacity(n); 3];
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                coords[0].push(i as f64);
                coords[1].push(j as f64);
                coords[2].push(k as f64);
            }
        }
    }
    MemoryMesh::new(3)
        .title("hex box")
        .fixed_block(1, "hex8", 8, one_based(&cells))
        .coords(coords)
}

/// One hexahedron, then a polyhedral block of two cells (face rows).
pub fn polyhedral_3d() -> MemoryMesh {
    let mut mesh = hex_box(1, 1, 1);
    mesh = mesh.polyhedron_block(2, vec![6, 4], (1..=10).collect());
    mesh
}

/// Every cell's row decoded straight from the stored blocks: vertex rows,
/// or face rows for polyhedral blocks.
pub fn reference_rows(mesh: &MemoryMesh) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    for b in mesh.blocks() {
        let kind = BlockKind::from_type_name(&b.info.elem_type, b.info.num_elem);
        let flat: Vec<usize> = match kind {
            BlockKind::Polyhedron => b.faces.iter().map(|&f| f as usize - 1).collect(),
            _ => b.nodes.iter().map(|&v| v as usize - 1).collect(),
        };
        match kind {
            BlockKind::Empty => {}
            BlockKind::Polygon | BlockKind::Polyhedron => {
                let mut at = 0;
                for &n in &b.counts {
                    out.push(flat[at..at + n].to_vec());
                    at += n;
                }
            }
            _ => {
                let npe = b.info.num_nodes_per_elem;
                out.extend(flat.chunks(npe).map(<[usize]>::to_vec));
            }
        }
    }
    out
}

/// Row of `cell` through the reader: vertices, or faces for polyhedra.
pub fn stream_row<S: MeshSource>(def: &mut MeshDefinition<S>, cell: usize) -> Vec<usize> {
    let dim = def.dimension();
    match def.entities(dim, 0, cell) {
        Ok(row) => row,
        Err(_) => def.entities(dim, dim - 1, cell).expect("face row"),
    }
}

/// Scratch file path unique to this test process.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mesh_stream_{}_{name}", std::process::id()))
}

/// Two-rank in-process comms (ranks 0 and 1).
pub fn rayons() -> (RayonComm, RayonComm) {
    (RayonComm::new(0, 2), RayonComm::new(1, 2))
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
