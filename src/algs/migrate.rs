//! Move cells to the rank named by their color.
//!
//! Every rank sends each peer a size message and then a row message, even
//! when it has nothing for that peer, so receives never wait on a message
//! that is not coming.

use hashbrown::HashMap;
use log::debug;

use super::communicator::{Communicator, Wait};
use super::dual_graph::DualGraph;
use super::wire::{KIND_COLORS, KIND_ROWS, KIND_SIZE, SIZE_MSG_LEN, decode_words, encode_words};
use crate::mesh_error::MeshStreamError;
use crate::topology::Csr;

const TAG_SIZES: u16 = 0xA1;
const TAG_ROWS: u16 = 0xA2;
const TAG_GATHER_SIZE: u16 = 0xA3;
const TAG_GATHER: u16 = 0xA4;

/// Cells owned by this rank after migration, ordered by global id.
#[derive(Debug, Clone, Default)]
pub struct Migrated {
    /// Owned cell → global vertex ids.
    pub c2v: Csr,
    /// Owned cell → adjacent global cell ids.
    pub c2c: Csr,
    /// Local row → global cell id.
    pub p2m: Vec<usize>,
    /// Global cell id → local row.
    pub m2p: HashMap<usize, usize>,
}

impl Migrated {
    pub fn num_owned(&self) -> usize {
        self.p2m.len()
    }
}

fn to_usize(w: u64) -> Result<usize, MeshStreamError> {
    usize::try_from(w).map_err(|_| MeshStreamError::Communication(format!("word {w} overflows usize")))
}

/// Rows for one destination: `[count, (gid, nv, v.., nc, c..)*]`.
fn pack_rows(rows: &[usize], graph: &DualGraph, c2v: &Csr, c2c: &Csr) -> Vec<u64> {
    let mut words = vec![rows.len() as u64];
    for &i in rows {
        words.push(graph.global_id(i) as u64);
        for table in [c2v, c2c] {
            let row = table.row(i);
            words.push(row.len() as u64);
            words.extend(row.iter().map(|&v| v as u64));
        }
    }
    words
}

type Row = (usize, Vec<usize>, Vec<usize>);

fn unpack_rows(words: &[u64], out: &mut Vec<Row>) -> Result<(), MeshStreamError> {
    let truncated = || MeshStreamError::Communication("truncated row message".into());
    let mut it = words.iter().copied();
    let mut next = || it.next().ok_or_else(truncated).and_then(to_usize);
    let count = next()?;
    for _ in 0..count {
        let gid = next()?;
        let nv = next()?;
        let verts = (0..nv).map(|_| next()).collect::<Result<Vec<_>, _>>()?;
        let nc = next()?;
        let cells = (0..nc).map(|_| next()).collect::<Result<Vec<_>, _>>()?;
        out.push((gid, verts, cells));
    }
    Ok(())
}

/// Send `payload` to every peer (one per entry) and receive theirs, sizes
/// first. Entry `comm.rank()` is returned as is.
fn exchange<C: Communicator>(
    comm: &C,
    payloads: Vec<Vec<u8>>,
    size_tag: u16,
    data_tag: u16,
) -> Result<Vec<Vec<u8>>, MeshStreamError> {
    let (me, size) = (comm.rank(), comm.size());

    let mut size_recvs = Vec::with_capacity(size);
    for peer in (0..size).filter(|&p| p != me) {
        let mut buf = [0u8; SIZE_MSG_LEN];
        size_recvs.push((peer, comm.irecv(peer, size_tag, &mut buf)));
    }
    for (peer, payload) in payloads.iter().enumerate().filter(|&(p, _)| p != me) {
        comm.isend(peer, size_tag, &encode_words(KIND_SIZE, &[payload.len() as u64]))
            .wait();
    }
    let mut sizes = vec![0usize; size];
    for (peer, h) in size_recvs {
        let raw = h
            .wait()
            .ok_or_else(|| MeshStreamError::Communication(format!("no size message from rank {peer}")))?;
        let words = decode_words(KIND_SIZE, &raw)?;
        sizes[peer] = to_usize(words.first().copied().unwrap_or(0))?;
    }

    let mut data_recvs = Vec::with_capacity(size);
    for peer in (0..size).filter(|&p| p != me) {
        let mut buf = vec![0u8; sizes[peer]];
        data_recvs.push((peer, comm.irecv(peer, data_tag, &mut buf)));
    }
    let mut received: Vec<Vec<u8>> = vec![Vec::new(); size];
    for (peer, payload) in payloads.into_iter().enumerate() {
        if peer == me {
            received[me] = payload;
        } else {
            comm.isend(peer, data_tag, &payload).wait();
        }
    }
    for (peer, h) in data_recvs {
        received[peer] = h
            .wait()
            .ok_or_else(|| MeshStreamError::Communication(format!("no data message from rank {peer}")))?;
    }
    Ok(received)
}

/// Redistribute the rows of `c2v` / `c2c` so that rank `r` owns every cell
/// colored `r`. `num_colors` must equal the number of ranks.
pub fn migrate<C: Communicator>(
    graph: &DualGraph,
    num_colors: usize,
    colors: &[usize],
    c2v: &Csr,
    c2c: &Csr,
    comm: &C,
) -> Result<Migrated, MeshStreamError> {
    let size = comm.size();
    if num_colors != size {
        return Err(MeshStreamError::Partition(format!(
            "{num_colors} colors for {size} ranks"
        )));
    }
    let n = graph.num_local();
    for (what, len) in [
        ("colors", colors.len()),
        ("c2v rows", c2v.num_rows()),
        ("c2c rows", c2c.num_rows()),
    ] {
        if len != n {
            return Err(MeshStreamError::LengthMismatch {
                what,
                expected: n,
                found: len,
            });
        }
    }
    if let Some(&bad) = colors.iter().find(|&&c| c >= num_colors) {
        return Err(MeshStreamError::Partition(format!("color {bad} out of range")));
    }

    let mut by_dest: Vec<Vec<usize>> = vec![Vec::new(); size];
    for (i, &c) in colors.iter().enumerate() {
        by_dest[c].push(i);
    }
    let payloads = by_dest
        .iter()
        .map(|rows| encode_words(KIND_ROWS, &pack_rows(rows, graph, c2v, c2c)))
        .collect();
    let received = exchange(comm, payloads, TAG_SIZES, TAG_ROWS)?;

    let mut rows = Vec::new();
    for raw in &received {
        unpack_rows(&decode_words(KIND_ROWS, raw)?, &mut rows)?;
    }
    rows.sort_unstable_by_key(|r| r.0);

    let mut out = Migrated::default();
    for (local, (gid, verts, cells)) in rows.into_iter().enumerate() {
        out.c2v.push_row(verts);
        out.c2c.push_row(cells);
        out.p2m.push(gid);
        out.m2p.insert(gid, local);
    }
    debug!("rank {} owns {} cells after migration", comm.rank(), out.num_owned());
    Ok(out)
}

/// Concatenate every rank's `local` colors, in rank order, at `root`.
///
/// Returns `Some` on `root` and `None` elsewhere.
pub fn gather_colors<C: Communicator>(
    local: &[usize],
    comm: &C,
    root: usize,
) -> Result<Option<Vec<usize>>, MeshStreamError> {
    let (me, size) = (comm.rank(), comm.size());
    if root >= size {
        return Err(MeshStreamError::Communication(format!("root {root} out of {size} ranks")));
    }
    let words: Vec<u64> = local.iter().map(|&c| c as u64).collect();
    let msg = encode_words(KIND_COLORS, &words);

    if me != root {
        comm.isend(root, TAG_GATHER_SIZE, &encode_words(KIND_SIZE, &[msg.len() as u64]))
            .wait();
        comm.isend(root, TAG_GATHER, &msg).wait();
        return Ok(None);
    }

    let mut all = Vec::new();
    for peer in 0..size {
        if peer == me {
            all.extend_from_slice(local);
            continue;
        }
        let mut size_buf = [0u8; SIZE_MSG_LEN];
        let raw = comm
            .irecv(peer, TAG_GATHER_SIZE, &mut size_buf)
            .wait()
            .ok_or_else(|| MeshStreamError::Communication(format!("no size message from rank {peer}")))?;
        let len = to_usize(decode_words(KIND_SIZE, &raw)?.first().copied().unwrap_or(0))?;
        let mut buf = vec![0u8; len];
        let raw = comm
            .irecv(peer, TAG_GATHER, &mut buf)
            .wait()
            .ok_or_else(|| MeshStreamError::Communication(format!("no colors from rank {peer}")))?;
        for w in decode_words(KIND_COLORS, &raw)? {
            all.push(to_usize(w)?);
        }
    }
    Ok(Some(all))
}
