mod util;

use mesh_stream::io::coloring::{read_coloring, write_coloring_file};
use mesh_stream::io::definition::{LookupStrategy, MeshDefinition, StreamOptions};
use mesh_stream::io::exodus::{CreateMode, ExoFile, ExoWriter};
use mesh_stream::io::{MeshSink, MeshSource};
use bytes::{BufMut, BytesMut};
use mesh_stream::io::exodus::HEADER_SIZE;
use mesh_stream::mesh_error::MeshStreamError;
use util::*;

/// A version-1 header followed by `dir`, with the counts taken verbatim.
fn hand_built(num_elem_blk: u64, directory_len: u64, num_nodes: u64, dir: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"EXOB");
    buf.put_u16_le(1);
    buf.put_u16_le(2);
    buf.put_u64_le(num_nodes);
    buf.put_u64_le(0);
    buf.put_u64_le(num_elem_blk);
    buf.put_u64_le(directory_len);
    buf.put_u64_le((HEADER_SIZE + dir.len()) as u64);
    buf.put_bytes(0, HEADER_SIZE - buf.len());
    buf.put_slice(dir);
    buf.to_vec()
}

fn open_bytes(name: &str, raw: Vec<u8>) -> Result<ExoFile, MeshStreamError> {
    let path = temp_path(name);
    std::fs::write(&path, raw).unwrap();
    let opened = ExoFile::open(&path);
    std::fs::remove_file(&path).ok();
    opened
}

#[test]
fn file_round_trip_preserves_blocks_and_coords() {
    let path = temp_path("round_trip.exob");
    let mesh = mixed_2d();
    ExoWriter::write_mesh(&path, CreateMode::Clobber, &mesh).expect("write");

    let mut file = ExoFile::open(&path).expect("open");
    let params = file.params().unwrap();
    assert_eq!(params.title, "mixed");
    assert_eq!(params.num_elem, 8);
    assert_eq!(file.block_ids().unwrap(), vec![10, 20, 30, 40, 50]);

    let back = file.to_memory().unwrap();
    assert_eq!(back.blocks(), mesh.blocks());
    assert_eq!(back.coordinates(), mesh.coordinates());
    std::fs::remove_file(&path).ok();
}

#[test]
fn windows_read_from_file_match_full_load() {
    let path = temp_path("windows.exob");
    let mesh = polyhedral_3d();
    let want = reference_rows(&mesh);
    ExoWriter::write_mesh(&path, CreateMode::Clobber, &mesh).unwrap();

    for lookup in [LookupStrategy::RandomAccess, LookupStrategy::Sequential] {
        let opts = StreamOptions {
            chunk_size: 1,
            vertex_chunk_size: 3,
            lookup,
        };
        let file = ExoFile::open(&path).unwrap();
        let mut def = MeshDefinition::<_, f64>::with_options(file, 3, opts).unwrap();
        for cell in (0..want.len()).rev() {
            assert_eq!(stream_row(&mut def, cell), want[cell]);
        }
        assert_eq!(def.vertex(7).unwrap(), vec![1.0, 1.0, 1.0]);
        assert_eq!(def.read_point_coords().unwrap(), mesh.coordinates());
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn no_clobber_refuses_existing_file() {
    let path = temp_path("no_clobber.exob");
    ExoWriter::write_mesh(&path, CreateMode::Clobber, &quad_2x2()).unwrap();
    let err = ExoWriter::create(&path, CreateMode::NoClobber).err().unwrap();
    assert!(matches!(err, MeshStreamError::Backend { op: "create", .. }));
    // the existing file is untouched
    assert!(ExoFile::open(&path).is_ok());
    std::fs::remove_file(&path).ok();
}

#[test]
fn garbage_header_is_rejected() {
    let path = temp_path("garbage.exob");
    std::fs::write(&path, vec![0x42u8; 128]).unwrap();
    assert!(matches!(
        ExoFile::open(&path),
        Err(MeshStreamError::InvalidHeader(_))
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn oversized_counts_fail_without_allocating() {
    // empty title, no variables, no times, no records
    let empty_dir = [0u8; 16];
    let huge_blocks = hand_built(1 << 60, 16, 0, &empty_dir);
    assert!(matches!(
        open_bytes("huge_blocks.exob", huge_blocks),
        Err(MeshStreamError::InvalidHeader(_))
    ));

    let huge_dir = hand_built(0, u64::MAX / 2, 0, &empty_dir);
    assert!(matches!(
        open_bytes("huge_dir.exob", huge_dir),
        Err(MeshStreamError::InvalidHeader(_))
    ));

    let huge_nodes = hand_built(0, 16, 1 << 61, &empty_dir);
    assert!(matches!(
        open_bytes("huge_nodes.exob", huge_nodes),
        Err(MeshStreamError::InvalidHeader(_))
    ));

    // the same file with honest counts opens
    let empty = open_bytes("empty_mesh.exob", hand_built(0, 16, 0, &empty_dir)).unwrap();
    assert_eq!(empty.block_ids().unwrap(), Vec::<i64>::new());
}

#[test]
fn writer_refuses_puts_after_finish() {
    let path = temp_path("finished.exob");
    let mut w = ExoWriter::create(&path, CreateMode::Clobber).unwrap();
    let mesh = quad_2x2();
    let params = MeshSource::params(&mesh).unwrap();
    w.put_params(&params).unwrap();
    w.put_block(1, &mesh.blocks()[0].info).unwrap();
    w.put_conn(1, mesh_stream::io::ConnKind::Nodes, &mesh.blocks()[0].nodes)
        .unwrap();
    w.put_coords(mesh.coordinates()).unwrap();
    w.finish().unwrap();
    assert!(w.put_params(&params).is_err());

    let file = ExoFile::open(&path).unwrap();
    let mut def = MeshDefinition::<_, f64>::open(file, 2).unwrap();
    assert_eq!(def.stream(3).unwrap(), vec![4, 5, 8, 7]);
    std::fs::remove_file(&path).ok();
}

#[test]
fn coloring_file_reads_back() {
    let path = temp_path("coloring.exob");
    let mut def = MeshDefinition::<_, f64>::open(mixed_2d(), 2).unwrap();
    let colors = vec![1, 1, 0, 2, 2, 0, 1, 0];
    write_coloring_file(&path, &mut def, &colors).unwrap();

    let mut file = ExoFile::open(&path).unwrap();
    assert_eq!(read_coloring(&mut file).unwrap(), colors);
    assert_eq!(file.block_ids().unwrap(), vec![10, 30, 40, 50]);
    assert_eq!(file.block_name(40), Some("cell-block-40"));
    assert_eq!(file.block_info(30).unwrap().elem_type, "tri3");
    assert_eq!(file.variable_names().unwrap(), vec!["color".to_string()]);

    // the colored copy streams like the source
    let mut copy = MeshDefinition::<_, f64>::open(file, 2).unwrap();
    let want = reference_rows(&mixed_2d());
    for (cell, row) in want.iter().enumerate() {
        assert_eq!(&copy.stream(cell).unwrap(), row);
    }
    std::fs::remove_file(&path).ok();
}
