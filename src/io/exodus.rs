//! Binary blocked mesh container (`.exob`).
//!
//! Exodus-style data model in a seekable little-endian layout, so that
//! connectivity and coordinates can be read window by window.
//!
//! ```text
//! HEADER (64 bytes)
//!   0-3    magic "EXOB"
//!   4-5    version (u16)
//!   6-7    num_dim (u16)
//!   8-15   num_nodes (u64)
//!  16-23   num_elem (u64)
//!  24-31   num_elem_blk (u64)
//!  32-39   directory_len (u64)
//!  40-47   coords_offset (u64, absolute)
//!  48-63   reserved
//! DIRECTORY (directory_len bytes)
//!   title                  u32 len + utf8
//!   num_elem_blk entries   id i64, type u16 len + utf8, name u16 len + utf8,
//!                          num_elem, nodes_per_elem, faces_per_elem, num_attr,
//!                          counts_off, counts_len, conn_off, conn_len, faces_off, faces_len (u64)
//!   variable names         u32 count, each u16 len + utf8
//!   times                  u32 count, f64 each
//!   variable entries       u32 count, each step u64, var u64, blk i64, off u64, len u64
//! PAYLOAD
//!   per block: counts (u64), node connectivity (i64, 1-based), face connectivity (i64)
//!   coordinates (f64, dimension-major)
//!   variables (f64)
//! ```
//!
//! Directory offsets are relative to the first payload byte.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, warn};
use static_assertions::const_assert_eq;

use super::memory::{MemoryBlock, MemoryMesh};
use super::{BlockInfo, ConnKind, MeshParams, MeshSink, MeshSource};
use crate::mesh_error::MeshStreamError;

const MAGIC: &[u8; 4] = b"EXOB";
const VERSION: u16 = 1;
/// Size of the fixed file header.
pub const HEADER_SIZE: usize = 64;

const_assert_eq!(HEADER_SIZE, 4 + 2 + 2 + 5 * 8 + 16);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ExoHeader {
    version: u16,
    num_dim: u16,
    num_nodes: u64,
    num_elem: u64,
    num_elem_blk: u64,
    directory_len: u64,
    coords_offset: u64,
}

impl ExoHeader {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u16_le(self.version);
        buf.put_u16_le(self.num_dim);
        buf.put_u64_le(self.num_nodes);
        buf.put_u64_le(self.num_elem);
        buf.put_u64_le(self.num_elem_blk);
        buf.put_u64_le(self.directory_len);
        buf.put_u64_le(self.coords_offset);
        buf.put_bytes(0, HEADER_SIZE - buf.len());
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, MeshStreamError> {
        if &bytes[..4] != MAGIC {
            return Err(MeshStreamError::InvalidHeader(
                "invalid magic bytes (expected EXOB)".into(),
            ));
        }
        let mut buf = &bytes[4..];
        let header = Self {
            version: buf.get_u16_le(),
            num_dim: buf.get_u16_le(),
            num_nodes: buf.get_u64_le(),
            num_elem: buf.get_u64_le(),
            num_elem_blk: buf.get_u64_le(),
            directory_len: buf.get_u64_le(),
            coords_offset: buf.get_u64_le(),
        };
        if header.version != VERSION {
            return Err(MeshStreamError::InvalidHeader(format!(
                "unsupported version {}",
                header.version
            )));
        }
        Ok(header)
    }
}

/// Directory entry of one block, offsets relative to the payload start.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BlockEntry {
    id: i64,
    name: String,
    info: BlockInfo,
    counts_off: u64,
    counts_len: u64,
    conn_off: u64,
    conn_len: u64,
    faces_off: u64,
    faces_len: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct VarEntry {
    step: u64,
    var: u64,
    blk: i64,
    off: u64,
    len: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Directory {
    title: String,
    blocks: Vec<BlockEntry>,
    var_names: Vec<String>,
    times: Vec<f64>,
    vars: Vec<VarEntry>,
}

fn to_u64(v: usize) -> u64 {
    v as u64
}

/// Smallest encoded block entry: id, two empty strings, ten `u64` fields.
const MIN_BLOCK_ENTRY: usize = 8 + 2 + 2 + 10 * 8;
/// Encoded variable record.
const VAR_ENTRY: usize = 5 * 8;

/// Byte length of `n_values` 8-byte values starting at `offset`, checked
/// against the end of the file.
fn payload_span(offset: u64, n_values: usize, file_len: u64, what: &str) -> Result<usize, MeshStreamError> {
    n_values
        .checked_mul(8)
        .filter(|&len| offset.checked_add(to_u64(len)).is_some_and(|end| end <= file_len))
        .ok_or_else(|| {
            MeshStreamError::InvalidHeader(format!(
                "{what}: {n_values} values at byte {offset} run past the end of the file ({file_len} bytes)"
            ))
        })
}

fn to_usize(v: u64, what: &str) -> Result<usize, MeshStreamError> {
    usize::try_from(v).map_err(|_| MeshStreamError::InvalidHeader(format!("{what} {v} overflows usize")))
}

fn put_str16(buf: &mut BytesMut, s: &str) -> Result<(), MeshStreamError> {
    let len = u16::try_from(s.len())
        .map_err(|_| MeshStreamError::InvalidHeader(format!("string `{s}` too long")))?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_str32(buf: &mut BytesMut, s: &str) -> Result<(), MeshStreamError> {
    let len = u32::try_from(s.len())
        .map_err(|_| MeshStreamError::InvalidHeader("title too long".into()))?;
    buf.put_u32_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_count(buf: &mut BytesMut, n: usize, what: &str) -> Result<(), MeshStreamError> {
    let n = u32::try_from(n).map_err(|_| MeshStreamError::InvalidHeader(format!("too many {what}")))?;
    buf.put_u32_le(n);
    Ok(())
}

/// Bounds-checked reads over the directory bytes.
struct DirReader {
    buf: Bytes,
}

impl DirReader {
    fn need(&self, n: usize, what: &str) -> Result<(), MeshStreamError> {
        if self.buf.remaining() < n {
            return Err(MeshStreamError::InvalidHeader(format!(
                "directory truncated while reading {what}"
            )));
        }
        Ok(())
    }

    fn u16(&mut self, what: &str) -> Result<u16, MeshStreamError> {
        self.need(2, what)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self, what: &str) -> Result<u32, MeshStreamError> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self, what: &str) -> Result<u64, MeshStreamError> {
        self.need(8, what)?;
        Ok(self.buf.get_u64_le())
    }

    fn usize(&mut self, what: &str) -> Result<usize, MeshStreamError> {
        let v = self.u64(what)?;
        to_usize(v, what)
    }

    fn i64(&mut self, what: &str) -> Result<i64, MeshStreamError> {
        self.need(8, what)?;
        Ok(self.buf.get_i64_le())
    }

    fn f64(&mut self, what: &str) -> Result<f64, MeshStreamError> {
        self.need(8, what)?;
        Ok(self.buf.get_f64_le())
    }

    fn string(&mut self, len: usize, what: &str) -> Result<String, MeshStreamError> {
        self.need(len, what)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|_| MeshStreamError::InvalidHeader(format!("{what} is not utf-8")))
    }

    fn str16(&mut self, what: &str) -> Result<String, MeshStreamError> {
        let len = self.u16(what)? as usize;
        self.string(len, what)
    }

    fn str32(&mut self, what: &str) -> Result<String, MeshStreamError> {
        let len = self.u32(what)? as usize;
        self.string(len, what)
    }
}

impl Directory {
    fn encode(&self) -> Result<BytesMut, MeshStreamError> {
        let mut buf = BytesMut::new();
        put_str32(&mut buf, &self.title)?;
        for b in &self.blocks {
            buf.put_i64_le(b.id);
            put_str16(&mut buf, &b.info.elem_type)?;
            put_str16(&mut buf, &b.name)?;
            buf.put_u64_le(to_u64(b.info.num_elem));
            buf.put_u64_le(to_u64(b.info.num_nodes_per_elem));
            buf.put_u64_le(to_u64(b.info.num_faces_per_elem));
            buf.put_u64_le(to_u64(b.info.num_attr));
            buf.put_u64_le(b.counts_off);
            buf.put_u64_le(b.counts_len);
            buf.put_u64_le(b.conn_off);
            buf.put_u64_le(b.conn_len);
            buf.put_u64_le(b.faces_off);
            buf.put_u64_le(b.faces_len);
        }
        put_count(&mut buf, self.var_names.len(), "variables")?;
        for name in &self.var_names {
            put_str16(&mut buf, name)?;
        }
        put_count(&mut buf, self.times.len(), "time steps")?;
        for &t in &self.times {
            buf.put_f64_le(t);
        }
        put_count(&mut buf, self.vars.len(), "variable records")?;
        for v in &self.vars {
            buf.put_u64_le(v.step);
            buf.put_u64_le(v.var);
            buf.put_i64_le(v.blk);
            buf.put_u64_le(v.off);
            buf.put_u64_le(v.len);
        }
        Ok(buf)
    }

    fn decode(bytes: Bytes, num_blocks: usize) -> Result<Self, MeshStreamError> {
        let mut r = DirReader { buf: bytes };
        let title = r.str32("title")?;
        let table = num_blocks.checked_mul(MIN_BLOCK_ENTRY).ok_or_else(|| {
            MeshStreamError::InvalidHeader(format!("{num_blocks} blocks overflow the directory"))
        })?;
        r.need(table, "block table")?;
        let mut blocks = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            let id = r.i64("block id")?;
            let elem_type = r.str16("element type")?;
            let name = r.str16("block name")?;
            let info = BlockInfo {
                elem_type,
                num_elem: r.usize("num_elem")?,
                num_nodes_per_elem: r.usize("num_nodes_per_elem")?,
                num_faces_per_elem: r.usize("num_faces_per_elem")?,
                num_attr: r.usize("num_attr")?,
            };
            blocks.push(BlockEntry {
                id,
                name,
                info,
                counts_off: r.u64("counts offset")?,
                counts_len: r.u64("counts length")?,
                conn_off: r.u64("connectivity offset")?,
                conn_len: r.u64("connectivity length")?,
                faces_off: r.u64("face offset")?,
                faces_len: r.u64("face length")?,
            });
        }
        let n = r.u32("variable count")?;
        let var_names = (0..n)
            .map(|_| r.str16("variable name"))
            .collect::<Result<Vec<_>, _>>()?;
        let n = r.u32("time count")?;
        let times = (0..n).map(|_| r.f64("time")).collect::<Result<Vec<_>, _>>()?;
        let n = r.u32("variable record count")?;
        r.need(n as usize * VAR_ENTRY, "variable records")?;
        let mut vars = Vec::with_capacity(n as usize);
        for _ in 0..n {
            vars.push(VarEntry {
                step: r.u64("variable step")?,
                var: r.u64("variable index")?,
                blk: r.i64("variable block")?,
                off: r.u64("variable offset")?,
                len: r.u64("variable length")?,
            });
        }
        Ok(Self {
            title,
            blocks,
            var_names,
            times,
            vars,
        })
    }
}

/// Serialize a whole mesh into the container layout.
fn encode_mesh(mesh: &MemoryMesh) -> Result<BytesMut, MeshStreamError> {
    let params = mesh.header();
    let (var_names, times, vars) = mesh.variables();

    let mut payload = BytesMut::new();
    let mut dir = Directory {
        title: params.title.clone(),
        var_names: var_names.to_vec(),
        times: times.to_vec(),
        ..Default::default()
    };
    for b in mesh.blocks() {
        let counts_off = to_u64(payload.len());
        for &c in &b.counts {
            payload.put_u64_le(to_u64(c));
        }
        let conn_off = to_u64(payload.len());
        for &v in &b.nodes {
            payload.put_i64_le(v);
        }
        let faces_off = to_u64(payload.len());
        for &v in &b.faces {
            payload.put_i64_le(v);
        }
        dir.blocks.push(BlockEntry {
            id: b.id,
            name: b.name.clone().unwrap_or_default(),
            info: b.info.clone(),
            counts_off,
            counts_len: to_u64(b.counts.len()),
            conn_off,
            conn_len: to_u64(b.nodes.len()),
            faces_off,
            faces_len: to_u64(b.faces.len()),
        });
    }
    let coords_rel = to_u64(payload.len());
    for axis in mesh.coordinates() {
        for &x in axis {
            payload.put_f64_le(x);
        }
    }
    for (&(step, var, blk), values) in vars {
        dir.vars.push(VarEntry {
            step: to_u64(step),
            var: to_u64(var),
            blk,
            off: to_u64(payload.len()),
            len: to_u64(values.len()),
        });
        for &x in values {
            payload.put_f64_le(x);
        }
    }

    let dir_bytes = dir.encode()?;
    let num_dim = u16::try_from(params.num_dim)
        .map_err(|_| MeshStreamError::UnsupportedDimension(params.num_dim))?;
    let header = ExoHeader {
        version: VERSION,
        num_dim,
        num_nodes: to_u64(params.num_nodes),
        num_elem: to_u64(params.num_elem),
        num_elem_blk: to_u64(mesh.blocks().len()),
        directory_len: to_u64(dir_bytes.len()),
        coords_offset: to_u64(HEADER_SIZE + dir_bytes.len()) + coords_rel,
    };

    let mut out = BytesMut::with_capacity(HEADER_SIZE + dir_bytes.len() + payload.len());
    out.put_slice(&header.to_bytes());
    out.put_slice(&dir_bytes);
    out.put_slice(&payload);
    Ok(out)
}

/// Reader over an `.exob` file. The file handle is closed on drop.
#[derive(Debug)]
pub struct ExoFile {
    file: BufReader<File>,
    params: MeshParams,
    dir: Directory,
    payload_start: u64,
    coords_offset: u64,
    file_len: u64,
}

impl ExoFile {
    /// Open `path` and decode its header and directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MeshStreamError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| MeshStreamError::backend("open", &e))?;
        let file_len = file
            .metadata()
            .map_err(|e| MeshStreamError::backend("open", &e))?
            .len();
        let mut file = BufReader::new(file);

        let mut raw = [0u8; HEADER_SIZE];
        file.read_exact(&mut raw)
            .map_err(|e| MeshStreamError::backend("read header", &e))?;
        let header = ExoHeader::from_bytes(&raw)?;
        let num_blocks = to_usize(header.num_elem_blk, "num_elem_blk")?;
        let dir_len = to_usize(header.directory_len, "directory_len")?;
        if header.directory_len > file_len.saturating_sub(to_u64(HEADER_SIZE)) {
            return Err(MeshStreamError::InvalidHeader(format!(
                "directory of {dir_len} bytes does not fit a {file_len}-byte file"
            )));
        }

        let mut dir_raw = vec![0u8; dir_len];
        file.read_exact(&mut dir_raw)
            .map_err(|e| MeshStreamError::backend("read directory", &e))?;
        let dir = Directory::decode(Bytes::from(dir_raw), num_blocks)?;

        let params = MeshParams {
            title: dir.title.clone(),
            num_dim: header.num_dim as usize,
            num_nodes: to_usize(header.num_nodes, "num_nodes")?,
            num_elem: to_usize(header.num_elem, "num_elem")?,
            num_elem_blk: num_blocks,
        };
        let coord_values = params.num_dim.checked_mul(params.num_nodes).ok_or_else(|| {
            MeshStreamError::InvalidHeader(format!("{} nodes overflow the coordinates", params.num_nodes))
        })?;
        payload_span(header.coords_offset, coord_values, file_len, "coordinates")?;
        debug!(
            "opened {}: {}D, {} nodes, {} elements, {} blocks",
            path.display(),
            params.num_dim,
            params.num_nodes,
            params.num_elem,
            params.num_elem_blk
        );
        Ok(Self {
            file,
            params,
            dir,
            payload_start: to_u64(HEADER_SIZE) + header.directory_len,
            coords_offset: header.coords_offset,
            file_len,
        })
    }

    /// Name stored for block `blk_id`, if any.
    pub fn block_name(&self, blk_id: i64) -> Option<&str> {
        self.dir
            .blocks
            .iter()
            .find(|b| b.id == blk_id && !b.name.is_empty())
            .map(|b| b.name.as_str())
    }

    /// Load the whole file into a [`MemoryMesh`].
    pub fn to_memory(&mut self) -> Result<MemoryMesh, MeshStreamError> {
        let mut blocks = Vec::with_capacity(self.dir.blocks.len());
        for entry in self.dir.blocks.clone() {
            let counts = self.read_u64s("read counts", entry.counts_off, entry.counts_len)?;
            let nodes = self.read_i64s("read connectivity", entry.conn_off, entry.conn_len)?;
            let faces = self.read_i64s("read connectivity", entry.faces_off, entry.faces_len)?;
            blocks.push(MemoryBlock {
                id: entry.id,
                name: (!entry.name.is_empty()).then(|| entry.name.clone()),
                info: entry.info.clone(),
                counts: counts.into_iter().map(|c| to_usize(c, "entity count")).collect::<Result<_, _>>()?,
                nodes,
                faces,
            });
        }
        let flat = self.read_partial_coords(0, self.params.num_nodes)?;
        let coords = if self.params.num_nodes == 0 {
            vec![Vec::new(); self.params.num_dim]
        } else {
            flat.chunks(self.params.num_nodes).map(<[f64]>::to_vec).collect()
        };
        let mut vars = BTreeMap::new();
        for v in self.dir.vars.clone() {
            let values = self.read_f64s_rel("read variable", v.off, v.len)?;
            vars.insert(
                (to_usize(v.step, "step")?, to_usize(v.var, "variable")?, v.blk),
                values,
            );
        }
        Ok(MemoryMesh::from_parts(
            self.params.clone(),
            blocks,
            coords,
            self.dir.var_names.clone(),
            self.dir.times.clone(),
            vars,
        ))
    }

    fn entry(&self, op: &'static str, blk_id: i64) -> Result<&BlockEntry, MeshStreamError> {
        self.dir
            .blocks
            .iter()
            .find(|b| b.id == blk_id)
            .ok_or_else(|| MeshStreamError::Backend {
                op,
                status: -1,
                detail: format!("no element block with id {blk_id}"),
            })
    }

    fn read_at(&mut self, op: &'static str, offset: u64, n_values: usize) -> Result<Bytes, MeshStreamError> {
        let len = payload_span(offset, n_values, self.file_len, op)?;
        let mut raw = vec![0u8; len];
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| MeshStreamError::backend(op, &e))?;
        self.file
            .read_exact(&mut raw)
            .map_err(|e| MeshStreamError::backend(op, &e))?;
        Ok(Bytes::from(raw))
    }

    fn read_i64s(&mut self, op: &'static str, rel: u64, len: u64) -> Result<Vec<i64>, MeshStreamError> {
        let n = to_usize(len, "array length")?;
        let mut buf = self.read_at(op, self.payload_start.saturating_add(rel), n)?;
        Ok((0..n).map(|_| buf.get_i64_le()).collect())
    }

    fn read_u64s(&mut self, op: &'static str, rel: u64, len: u64) -> Result<Vec<u64>, MeshStreamError> {
        let n = to_usize(len, "array length")?;
        let mut buf = self.read_at(op, self.payload_start.saturating_add(rel), n)?;
        Ok((0..n).map(|_| buf.get_u64_le()).collect())
    }

    fn read_f64s_rel(&mut self, op: &'static str, rel: u64, len: u64) -> Result<Vec<f64>, MeshStreamError> {
        let n = to_usize(len, "array length")?;
        let mut buf = self.read_at(op, self.payload_start.saturating_add(rel), n)?;
        Ok((0..n).map(|_| buf.get_f64_le()).collect())
    }
}

impl MeshSource for ExoFile {
    fn params(&self) -> Result<MeshParams, MeshStreamError> {
        Ok(self.params.clone())
    }

    fn block_ids(&self) -> Result<Vec<i64>, MeshStreamError> {
        Ok(self.dir.blocks.iter().map(|b| b.id).collect())
    }

    fn block_info(&mut self, blk_id: i64) -> Result<BlockInfo, MeshStreamError> {
        Ok(self.entry("block_info", blk_id)?.info.clone())
    }

    fn read_partial_conn(
        &mut self,
        blk_id: i64,
        start: usize,
        count: usize,
    ) -> Result<Vec<i64>, MeshStreamError> {
        const OP: &str = "read_partial_conn";
        let entry = self.entry(OP, blk_id)?;
        let npe = entry.info.num_nodes_per_elem;
        let end = start
            .checked_add(count)
            .filter(|&end| end <= entry.info.num_elem)
            .and_then(|end| end.checked_mul(npe))
            .filter(|&n| to_u64(n) <= entry.conn_len);
        if end.is_none() {
            return Err(MeshStreamError::Backend {
                op: OP,
                status: -1,
                detail: format!("elements {start}..{start}+{count} out of range for block {blk_id}"),
            });
        }
        // start * npe <= conn_len, which fits the file
        let rel = entry.conn_off + to_u64(start * npe * 8);
        self.read_i64s(OP, rel, to_u64(count * npe))
    }

    fn read_entity_counts(&mut self, blk_id: i64) -> Result<Vec<usize>, MeshStreamError> {
        const OP: &str = "read_entity_counts";
        let entry = self.entry(OP, blk_id)?;
        let (off, len) = (entry.counts_off, entry.counts_len);
        self.read_u64s(OP, off, len)?
            .into_iter()
            .map(|c| to_usize(c, "entity count"))
            .collect()
    }

    fn read_conn(&mut self, blk_id: i64, kind: ConnKind) -> Result<Vec<i64>, MeshStreamError> {
        const OP: &str = "read_conn";
        let entry = self.entry(OP, blk_id)?;
        let (off, len) = match kind {
            ConnKind::Nodes => (entry.conn_off, entry.conn_len),
            ConnKind::Faces => (entry.faces_off, entry.faces_len),
        };
        self.read_i64s(OP, off, len)
    }

    fn read_partial_coords(
        &mut self,
        start: usize,
        count: usize,
    ) -> Result<Vec<f64>, MeshStreamError> {
        const OP: &str = "read_partial_coords";
        let num_nodes = self.params.num_nodes;
        if start.checked_add(count).is_none_or(|end| end > num_nodes) {
            return Err(MeshStreamError::Backend {
                op: OP,
                status: -1,
                detail: format!("nodes {start}..{start}+{count} out of range"),
            });
        }
        let mut out = Vec::with_capacity(count * self.params.num_dim);
        for d in 0..self.params.num_dim {
            let offset = self.coords_offset + to_u64((d * num_nodes + start) * 8);
            let mut buf = self.read_at(OP, offset, count)?;
            out.extend((0..count).map(|_| buf.get_f64_le()));
        }
        Ok(out)
    }

    fn variable_names(&mut self) -> Result<Vec<String>, MeshStreamError> {
        Ok(self.dir.var_names.clone())
    }

    fn times(&mut self) -> Result<Vec<f64>, MeshStreamError> {
        Ok(self.dir.times.clone())
    }

    fn read_block_var(
        &mut self,
        step: usize,
        var: usize,
        blk_id: i64,
    ) -> Result<Vec<f64>, MeshStreamError> {
        const OP: &str = "read_block_var";
        let entry = self
            .dir
            .vars
            .iter()
            .find(|v| v.step == to_u64(step) && v.var == to_u64(var) && v.blk == blk_id)
            .copied()
            .ok_or_else(|| MeshStreamError::Backend {
                op: OP,
                status: -1,
                detail: format!("no variable {var} at step {step} on block {blk_id}"),
            })?;
        self.read_f64s_rel(OP, entry.off, entry.len)
    }
}

/// Whether [`ExoWriter::create`] may replace an existing file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    Clobber,
    NoClobber,
}

/// Writer producing an `.exob` file.
///
/// Data is staged in memory and serialized by [`MeshSink::finish`].
#[derive(Debug)]
pub struct ExoWriter {
    path: PathBuf,
    file: Option<File>,
    staged: MemoryMesh,
}

impl ExoWriter {
    /// Create `path`. With [`CreateMode::NoClobber`] an existing file is an error.
    pub fn create<P: AsRef<Path>>(path: P, mode: CreateMode) -> Result<Self, MeshStreamError> {
        let path = path.as_ref().to_path_buf();
        let mut opts = OpenOptions::new();
        opts.write(true);
        match mode {
            CreateMode::Clobber => opts.create(true).truncate(true),
            CreateMode::NoClobber => opts.create_new(true),
        };
        let file = opts
            .open(&path)
            .map_err(|e| MeshStreamError::backend("create", &e))?;
        Ok(Self {
            path,
            file: Some(file),
            staged: MemoryMesh::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a complete in-memory mesh to `path`.
    pub fn write_mesh<P: AsRef<Path>>(
        path: P,
        mode: CreateMode,
        mesh: &MemoryMesh,
    ) -> Result<(), MeshStreamError> {
        let mut writer = Self::create(path, mode)?;
        writer.staged = mesh.clone();
        writer.finish()
    }

    fn closed(op: &'static str) -> MeshStreamError {
        MeshStreamError::Backend {
            op,
            status: -1,
            detail: "writer already finished".into(),
        }
    }

    fn staged(&mut self, op: &'static str) -> Result<&mut MemoryMesh, MeshStreamError> {
        if self.file.is_none() {
            return Err(Self::closed(op));
        }
        Ok(&mut self.staged)
    }
}

impl MeshSink for ExoWriter {
    fn put_params(&mut self, params: &MeshParams) -> Result<(), MeshStreamError> {
        self.staged("put_params")?.put_params(params)
    }

    fn put_block(&mut self, blk_id: i64, info: &BlockInfo) -> Result<(), MeshStreamError> {
        self.staged("put_block")?.put_block(blk_id, info)
    }

    fn put_block_name(&mut self, blk_id: i64, name: &str) -> Result<(), MeshStreamError> {
        self.staged("put_block_name")?.put_block_name(blk_id, name)
    }

    fn put_conn(&mut self, blk_id: i64, kind: ConnKind, conn: &[i64]) -> Result<(), MeshStreamError> {
        self.staged("put_conn")?.put_conn(blk_id, kind, conn)
    }

    fn put_entity_counts(&mut self, blk_id: i64, counts: &[usize]) -> Result<(), MeshStreamError> {
        self.staged("put_entity_counts")?.put_entity_counts(blk_id, counts)
    }

    fn put_variable_names(&mut self, names: &[&str]) -> Result<(), MeshStreamError> {
        self.staged("put_variable_names")?.put_variable_names(names)
    }

    fn put_time(&mut self, step: usize, time: f64) -> Result<(), MeshStreamError> {
        self.staged("put_time")?.put_time(step, time)
    }

    fn put_block_var(
        &mut self,
        step: usize,
        var: usize,
        blk_id: i64,
        values: &[f64],
    ) -> Result<(), MeshStreamError> {
        self.staged("put_block_var")?.put_block_var(step, var, blk_id, values)
    }

    fn put_coords(&mut self, coords: &[Vec<f64>]) -> Result<(), MeshStreamError> {
        self.staged("put_coords")?.put_coords(coords)
    }

    fn finish(&mut self) -> Result<(), MeshStreamError> {
        const OP: &str = "finish";
        self.staged(OP)?.finish()?;
        let bytes = encode_mesh(&self.staged)?;
        let file = self.file.take().ok_or_else(|| Self::closed(OP))?;
        let mut out = BufWriter::new(file);
        out.write_all(&bytes)
            .and_then(|_| out.flush())
            .map_err(|e| MeshStreamError::backend(OP, &e))?;
        debug!("wrote {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }
}

impl Drop for ExoWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            warn!("{} dropped without finish; file left empty", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = ExoHeader {
            version: VERSION,
            num_dim: 3,
            num_nodes: 27,
            num_elem: 8,
            num_elem_blk: 2,
            directory_len: 123,
            coords_offset: 4096,
        };
        assert_eq!(ExoHeader::from_bytes(&h.to_bytes()).unwrap(), h);
    }

    #[test]
    fn bad_magic_is_invalid_header() {
        let mut raw = [0u8; HEADER_SIZE];
        raw[..4].copy_from_slice(b"NOPE");
        assert!(matches!(
            ExoHeader::from_bytes(&raw),
            Err(MeshStreamError::InvalidHeader(_))
        ));
    }

    #[test]
    fn truncated_directory_is_rejected() {
        let dir = Directory {
            title: "t".into(),
            ..Default::default()
        };
        let bytes = dir.encode().unwrap().freeze();
        assert!(Directory::decode(bytes.clone(), 0).is_ok());
        assert!(matches!(
            Directory::decode(bytes.slice(..bytes.len() - 1), 0),
            Err(MeshStreamError::InvalidHeader(_))
        ));
        assert!(Directory::decode(bytes, 1).is_err());
    }

    #[test]
    fn payload_spans_stay_inside_the_file() {
        assert_eq!(payload_span(64, 4, 96, "x").unwrap(), 32);
        assert!(payload_span(64, 5, 96, "x").is_err());
        assert!(payload_span(u64::MAX - 4, 1, u64::MAX, "x").is_err());
        assert!(payload_span(0, usize::MAX, u64::MAX, "x").is_err());
    }
}
