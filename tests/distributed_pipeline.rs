mod util;

use mesh_stream::algs::communicator::{Communicator, NoComm, RayonComm};
use mesh_stream::algs::partition::{BlockColorer, Colorer, color_counts};
use mesh_stream::algs::{
    DualGraph, Migrated, build_intermediary, gather_colors, make_dual_graph, migrate, naive_range,
};
use mesh_stream::io::coloring::{read_coloring, write_coloring};
use mesh_stream::io::definition::MeshDefinition;
use mesh_stream::io::memory::MemoryMesh;
use mesh_stream::mesh_error::MeshStreamError;
use serial_test::serial;
use util::*;

/// Even global ids to color 0, odd to color 1, ...
struct Parity;

impl Colorer for Parity {
    fn color(&self, graph: &DualGraph, num_colors: usize) -> Result<Vec<usize>, MeshStreamError> {
        Ok((0..graph.num_local())
            .map(|i| graph.global_id(i) % num_colors)
            .collect())
    }
}

fn run_rank<C: Communicator>(
    mesh: MemoryMesh,
    colorer: &dyn Colorer,
    comm: &C,
) -> (Migrated, Option<Vec<usize>>) {
    let dim = mesh.coordinates().len();
    let mut def = MeshDefinition::<_, f64>::open(mesh, dim).unwrap();
    let n = def.num_entities(dim).unwrap();
    let range = naive_range(n, comm.rank(), comm.size());
    let mg = make_dual_graph(&mut def, dim - 1, range).unwrap();
    let colors = colorer.color(&mg.graph, comm.size()).unwrap();
    let migrated = migrate(&mg.graph, comm.size(), &colors, &mg.c2v, &mg.c2c, comm).unwrap();
    let gathered = gather_colors(&colors, comm, 0).unwrap();
    (migrated, gathered)
}

#[test]
#[serial]
fn two_ranks_migrate_cells_to_their_color() {
    let (c0, c1) = rayons();
    let ((m0, g0), (m1, g1)) = std::thread::scope(|s| {
        let h0 = s.spawn(|| run_rank(quad_2x2(), &Parity, &c0));
        let h1 = s.spawn(|| run_rank(quad_2x2(), &Parity, &c1));
        (h0.join().unwrap(), h1.join().unwrap())
    });

    assert_eq!(m0.p2m, vec![0, 2]);
    assert_eq!(m1.p2m, vec![1, 3]);
    assert_eq!(m0.c2v.row(1), &[3, 4, 7, 6]);
    assert_eq!(m1.c2v.row(0), &[1, 2, 5, 4]);
    assert_eq!(m0.c2c.row(0), &[1, 2]);
    assert_eq!(m1.c2c.row(1), &[1, 2]);
    assert_eq!(m1.m2p[&3], 1);

    assert_eq!(g0, Some(vec![0, 1, 0, 1]));
    assert_eq!(g1, None);

    // cells 0 and 2 share the edge (3, 4)
    let edges = build_intermediary(1, 2, &m0.c2v, Some(&m0.p2m)).unwrap();
    assert_eq!(edges.num_entities(), 7);
}

#[test]
#[serial]
fn block_colorer_keeps_cells_in_place() {
    let (c0, c1) = rayons();
    let colorer = BlockColorer { num_entities: 24 };
    let ((m0, g0), (m1, _)) = std::thread::scope(|s| {
        let h0 = s.spawn(|| run_rank(hex_box(4, 3, 2), &colorer, &c0));
        let h1 = s.spawn(|| run_rank(hex_box(4, 3, 2), &colorer, &c1));
        (h0.join().unwrap(), h1.join().unwrap())
    });
    assert_eq!(m0.p2m, (0..12).collect::<Vec<_>>());
    assert_eq!(m1.p2m, (12..24).collect::<Vec<_>>());
    let colors = g0.unwrap();
    assert_eq!(color_counts(&colors, 2), vec![12, 12]);
}

#[test]
fn serial_pipeline_writes_a_readable_coloring() {
    let mesh = mixed_2d();
    let (migrated, gathered) = run_rank(mesh.clone(), &Parity, &NoComm);
    assert_eq!(migrated.num_owned(), 8);
    let colors = gathered.unwrap();
    assert_eq!(colors, vec![0; 8]);

    let mut def = MeshDefinition::<_, f64>::open(mesh, 2).unwrap();
    let mut sink = MemoryMesh::default();
    let painted: Vec<usize> = (0..8).map(|c| c % 3).collect();
    write_coloring(&mut sink, &mut def, &painted).unwrap();
    assert!(sink.is_finished());
    assert_eq!(read_coloring(&mut sink).unwrap(), painted);
    // the empty block is dropped
    assert_eq!(sink.blocks().len(), 4);
    assert_eq!(sink.blocks()[1].name.as_deref(), Some("cell-block-30"));

    assert_eq!(
        write_coloring(&mut MemoryMesh::default(), &mut def, &painted[..3]),
        Err(MeshStreamError::LengthMismatch {
            what: "colors",
            expected: 8,
            found: 3
        })
    );
}

#[test]
fn colors_must_name_a_rank() {
    let mut def = MeshDefinition::<_, f64>::open(quad_2x2(), 2).unwrap();
    let mg = make_dual_graph(&mut def, 1, 0..4).unwrap();
    assert!(matches!(
        migrate(&mg.graph, 1, &[0, 0, 1, 0], &mg.c2v, &mg.c2c, &NoComm),
        Err(MeshStreamError::Partition(_))
    ));
    assert!(matches!(
        migrate(&mg.graph, 2, &[0; 4], &mg.c2v, &mg.c2c, &RayonComm::new(0, 1)),
        Err(MeshStreamError::Partition(_))
    ));
}
