mod util;

use std::collections::BTreeSet;

use mesh_stream::algs::{build_intermediary, intersect_connectivity};
use mesh_stream::io::definition::MeshDefinition;
use mesh_stream::io::memory::MemoryMesh;
use mesh_stream::topology::Csr;
use proptest::prelude::*;
use util::*;

fn cell_table(mesh: MemoryMesh) -> Csr {
    let dim = mesh.coordinates().len();
    let mut def = MeshDefinition::<_, f64>::open(mesh, dim).unwrap();
    let n = def.num_entities(dim).unwrap();
    let mut c2v = Csr::new();
    for cell in 0..n {
        c2v.push_row(def.stream(cell).unwrap());
    }
    c2v
}

fn vertex_pairs(ids: &[usize], e2v: &Csr) -> BTreeSet<(usize, usize)> {
    ids.iter()
        .map(|&e| {
            let r = e2v.row(e);
            (r[0].min(r[1]), r[0].max(r[1]))
        })
        .collect()
}

#[test]
fn quad_grid_edges_are_shared_once() {
    let c2v = cell_table(quad_2x2());
    let edges = build_intermediary(1, 2, &c2v, None).unwrap();
    assert_eq!(edges.num_entities(), 12);
    assert!(edges.reverse.rows().all(|r| r.len() == 4));

    // the edge between cells 0 and 1 is (1, 4)
    let shared = edges.lookup(&[4, 1]).unwrap();
    assert!(edges.reverse.row(0).contains(&shared));
    assert!(edges.reverse.row(1).contains(&shared));

    let e2c = edges.reverse.transpose(edges.num_entities()).unwrap();
    let interior = e2c.rows().filter(|r| r.len() == 2).count();
    assert_eq!(interior, 4);
}

#[test]
fn hex_edges_through_faces_match_direct_edges() {
    let c2v = cell_table(hex_box(2, 1, 1));
    let faces = build_intermediary(2, 3, &c2v, None).unwrap();
    assert_eq!(faces.num_entities(), 11);
    let face_edges = build_intermediary(1, 2, &faces.forward, None).unwrap();
    assert_eq!(face_edges.num_entities(), 20);

    let c2e = intersect_connectivity(&faces.reverse, &face_edges.reverse).unwrap();
    let direct = build_intermediary(1, 3, &c2v, None).unwrap();
    assert_eq!(direct.num_entities(), 20);

    for cell in 0..c2v.num_rows() {
        assert_eq!(c2e.row_len(cell), 12, "cell {cell} has duplicate edges");
        assert_eq!(
            vertex_pairs(c2e.row(cell), &face_edges.forward),
            vertex_pairs(direct.reverse.row(cell), &direct.forward)
        );
    }
}

#[test]
fn intersection_is_a_set_union_per_row() {
    let a2m = Csr::from_rows([vec![0, 1, 2], vec![2], vec![]]);
    let m2b = Csr::from_rows([vec![5, 6], vec![6, 7], vec![7, 5]]);
    let a2b = intersect_connectivity(&a2m, &m2b).unwrap();
    assert_permutation(a2b.row(0), &[5, 6, 7]);
    assert_permutation(a2b.row(1), &[5, 7]);
    assert!(a2b.row(2).is_empty());
}

#[test]
fn numbering_follows_global_ids() {
    let c2v = cell_table(quad_2x2());
    // same cells, rows reversed, global ids carried along
    let mut rows: Vec<Vec<usize>> = c2v.rows().map(<[usize]>::to_vec).collect();
    rows.reverse();
    let reversed = Csr::from_rows(rows);
    let plain = build_intermediary(1, 2, &c2v, None).unwrap();
    let p2m = [3, 2, 1, 0];
    let mapped = build_intermediary(1, 2, &reversed, Some(&p2m)).unwrap();
    assert_eq!(plain.forward, mapped.forward);
    for r in 0..4 {
        assert_eq!(plain.reverse.row(r), mapped.reverse.row(3 - r));
    }
}

proptest! {
    #[test]
    fn structured_box_entity_counts(nx in 1usize..4, ny in 1usize..4, nz in 1usize..3) {
        let c2v = cell_table(hex_box(nx, ny, nz));
        let faces = build_intermediary(2, 3, &c2v, None).unwrap();
        let edges = build_intermediary(1, 3, &c2v, None).unwrap();
        let want_faces = (nx + 1) * ny * nz + nx * (ny + 1) * nz + nx * ny * (nz + 1);
        let want_edges =
            nx * (ny + 1) * (nz + 1) + (nx + 1) * ny * (nz + 1) + (nx + 1) * (ny + 1) * nz;
        prop_assert_eq!(faces.num_entities(), want_faces);
        prop_assert_eq!(edges.num_entities(), want_edges);
        prop_assert_eq!(faces.registry.len(), want_faces);
    }
}
