//! Mesh definition reader: streams cell connectivity and point coordinates
//! out of a blocked mesh container through bounded windows.
//!
//! A [`MeshDefinition`] owns its [`MeshSource`] and every cursor. Queries take
//! `&mut self` because a miss decodes the next window.
//!
//! ```no_run
//! use mesh_stream::io::definition::MeshDefinition;
//! use mesh_stream::io::exodus::ExoFile;
//!
//! let file = ExoFile::open("mesh.exob")?;
//! let mut def: MeshDefinition<_> = MeshDefinition::open(file, 2)?;
//! for cell in 0..def.num_entities(2)? {
//!     let verts = def.stream(cell)?;
//!     println!("{cell}: {verts:?}");
//! }
//! # Ok::<(), mesh_stream::mesh_error::MeshStreamError>(())
//! ```

use log::{debug, trace};
use num_traits::Float;
use serde::{Deserialize, Serialize};

use super::cursor::{BlockCursor, BlockIndex, ConnectivityCursor, VertexCursor};
use super::{BlockInfo, ConnKind, MeshParams, MeshSource, to_zero_based};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshStreamError;
use crate::topology::BlockKind;

/// How a miss in the connectivity window is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupStrategy {
    /// Binary search over cumulative block sizes, then decode only the chunk
    /// holding the id.
    #[default]
    RandomAccess,
    /// Keep decoding forward from the current position, rewinding when the id
    /// lies behind the window.
    Sequential,
}

/// Window sizes and lookup strategy of a reader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Fixed-size elements decoded per read.
    pub chunk_size: usize,
    /// Vertices paged in per coordinate read.
    pub vertex_chunk_size: usize,
    pub lookup: LookupStrategy,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            vertex_chunk_size: 256,
            lookup: LookupStrategy::RandomAccess,
        }
    }
}

impl StreamOptions {
    pub fn validate(&self) -> Result<(), MeshStreamError> {
        if self.chunk_size == 0 {
            return Err(MeshStreamError::InvalidOption(
                "chunk_size must be positive".into(),
            ));
        }
        if self.vertex_chunk_size == 0 {
            return Err(MeshStreamError::InvalidOption(
                "vertex_chunk_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Where the sequential decoder stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// The next decode opens a new block.
    AwaitingBlock,
    /// The current block has undecoded chunks left.
    DecodingBlock,
    /// Every block has been decoded.
    Exhausted,
}

/// Header and canonical kind of one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockMeta {
    pub id: i64,
    pub info: BlockInfo,
    pub kind: BlockKind,
}

/// Streaming reader over a blocked mesh container.
///
/// `T` is the real type coordinates are converted to.
pub struct MeshDefinition<S: MeshSource, T: Float = f64> {
    source: S,
    params: MeshParams,
    dim: usize,
    options: StreamOptions,
    blocks: Vec<BlockMeta>,
    index: BlockIndex,
    block_cursor: BlockCursor,
    conn: ConnectivityCursor,
    vertices: VertexCursor<T>,
    state: ReaderState,
}

impl<S: MeshSource, T: Float> MeshDefinition<S, T> {
    /// Open a `dim`-dimensional reader with default options.
    pub fn open(source: S, dim: usize) -> Result<Self, MeshStreamError> {
        Self::with_options(source, dim, StreamOptions::default())
    }

    /// Open a `dim`-dimensional reader.
    ///
    /// Fails before decoding any block when the container's dimension differs
    /// from `dim`.
    pub fn with_options(
        mut source: S,
        dim: usize,
        options: StreamOptions,
    ) -> Result<Self, MeshStreamError> {
        options.validate()?;
        if !(2..=3).contains(&dim) {
            return Err(MeshStreamError::UnsupportedDimension(dim));
        }
        let params = source.params()?;
        if params.num_dim != dim {
            return Err(MeshStreamError::DimensionMismatch {
                expected: dim,
                found: params.num_dim,
            });
        }

        let ids = source.block_ids()?;
        if ids.len() != params.num_elem_blk {
            return Err(MeshStreamError::InvalidHeader(format!(
                "header declares {} blocks, directory lists {}",
                params.num_elem_blk,
                ids.len()
            )));
        }
        let mut blocks = Vec::with_capacity(ids.len());
        for id in ids {
            let info = source.block_info(id)?;
            let kind = BlockKind::from_type_name(&info.elem_type, info.num_elem);
            blocks.push(BlockMeta { id, info, kind });
        }
        let index = BlockIndex::new(blocks.iter().map(|b| (b.info.num_elem, b.kind.is_chunked())));
        if index.num_entities() != params.num_elem {
            return Err(MeshStreamError::InvalidHeader(format!(
                "header declares {} elements, blocks hold {}",
                params.num_elem,
                index.num_entities()
            )));
        }

        debug!(
            "opened {}D mesh `{}`: {} nodes, {} elements in {} blocks (chunk {}, {:?})",
            dim,
            params.title,
            params.num_nodes,
            params.num_elem,
            blocks.len(),
            options.chunk_size,
            options.lookup
        );

        let state = if blocks.is_empty() {
            ReaderState::Exhausted
        } else {
            ReaderState::AwaitingBlock
        };
        Ok(Self {
            source,
            params,
            dim,
            options,
            blocks,
            index,
            block_cursor: BlockCursor::new(),
            conn: ConnectivityCursor::new(),
            vertices: VertexCursor::new(dim),
            state,
        })
    }

    pub fn params(&self) -> &MeshParams {
        &self.params
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn blocks(&self) -> &[BlockMeta] {
        &self.blocks
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Number of entities of dimension `dim`: cells or vertices.
    pub fn num_entities(&self, dim: usize) -> Result<usize, MeshStreamError> {
        if dim == self.dim {
            Ok(self.params.num_elem)
        } else if dim == 0 {
            Ok(self.params.num_nodes)
        } else {
            Err(MeshStreamError::UnsupportedDimension(dim))
        }
    }

    /// Index of the block the sequential decoder is in (or opens next).
    pub fn current_block(&self) -> usize {
        self.block_cursor.current_block()
    }

    /// `true` when the connectivity of `id` is already decoded.
    pub fn stream_contains(&self, id: usize) -> bool {
        self.conn.contains(id)
    }

    /// Vertices of cell `id`, 0-based.
    pub fn stream(&mut self, id: usize) -> Result<Vec<usize>, MeshStreamError> {
        let mut out = Vec::new();
        self.stream_into(id, &mut out)?;
        Ok(out)
    }

    /// Vertices of cell `id` copied into `out`.
    pub fn stream_into(&mut self, id: usize, out: &mut Vec<usize>) -> Result<(), MeshStreamError> {
        self.entities_into(self.dim, 0, id, out)
    }

    /// Connectivity row `from -> to` of entity `id`.
    ///
    /// Cells map to vertices, except polyhedral cells which only map to their
    /// faces (`3 -> 2`).
    pub fn entities(&mut self, from: usize, to: usize, id: usize) -> Result<Vec<usize>, MeshStreamError> {
        let mut out = Vec::new();
        self.entities_into(from, to, id, &mut out)?;
        Ok(out)
    }

    fn entities_into(
        &mut self,
        from: usize,
        to: usize,
        id: usize,
        out: &mut Vec<usize>,
    ) -> Result<(), MeshStreamError> {
        let unsupported = MeshStreamError::UnsupportedConnectivity { from, to };
        if from != self.dim || !(to == 0 || (self.dim == 3 && to == 2)) {
            return Err(unsupported);
        }
        let block = self.ensure_loaded(id)?;
        let is_faces = self.blocks[block].kind == BlockKind::Polyhedron;
        if is_faces != (to == 2) {
            return Err(unsupported);
        }
        self.conn.get(id, out);
        Ok(())
    }

    /// Make the window cover `id`; returns the block it lies in.
    fn ensure_loaded(&mut self, id: usize) -> Result<usize, MeshStreamError> {
        if id >= self.params.num_elem {
            return Err(MeshStreamError::EntityNotFound(id));
        }
        if !self.conn.contains(id) {
            match self.options.lookup {
                LookupStrategy::RandomAccess => self.seek_to(id)?,
                LookupStrategy::Sequential => self.scan_to(id)?,
            }
        }
        self.conn
            .current_block()
            .ok_or(MeshStreamError::EntityNotFound(id))
    }

    fn seek_to(&mut self, id: usize) -> Result<(), MeshStreamError> {
        let loc = self
            .index
            .locate(id, self.options.chunk_size)
            .ok_or(MeshStreamError::EntityNotFound(id))?;
        debug!(
            "seeking to entity {id}: block {} offset {}",
            self.blocks[loc.block].id, loc.local_base
        );
        let count = self.blocks[loc.block].info.num_elem;
        self.block_cursor.seek(loc.block, count - loc.local_base);
        self.conn.seek(loc.block, loc.global_base, loc.local_base);
        self.state = ReaderState::DecodingBlock;
        self.decode_chunk()?;
        if self.conn.contains(id) {
            Ok(())
        } else {
            Err(MeshStreamError::EntityNotFound(id))
        }
    }

    fn scan_to(&mut self, id: usize) -> Result<(), MeshStreamError> {
        if id < self.conn.base() {
            self.rewind();
        }
        while !self.conn.contains(id) {
            if self.decode_chunk()?.is_none() {
                return Err(MeshStreamError::EntityNotFound(id));
            }
        }
        Ok(())
    }

    /// Decode the next chunk in file order.
    ///
    /// Returns the id and kind of the block it came from, or `None` once
    /// every block has been decoded.
    pub fn read_next_block(&mut self) -> Result<Option<(i64, BlockKind)>, MeshStreamError> {
        Ok(self
            .decode_chunk()?
            .map(|b| (self.blocks[b].id, self.blocks[b].kind)))
    }

    fn decode_chunk(&mut self) -> Result<Option<usize>, MeshStreamError> {
        let block = self.block_cursor.current_block();
        if block >= self.blocks.len() {
            self.state = ReaderState::Exhausted;
            return Ok(None);
        }
        debug_assert_eq!(self.conn.next_block(), block);
        self.block_cursor.init(self.blocks[block].info.num_elem);
        self.state = ReaderState::DecodingBlock;

        let rows = match self.blocks[block].kind {
            BlockKind::Empty => {
                self.conn.begin_chunk(0, 0, true);
                0
            }
            BlockKind::Tri | BlockKind::Quad | BlockKind::Tet | BlockKind::Hex => {
                self.decode_fixed(block)?
            }
            BlockKind::Polygon => self.decode_variable(block, ConnKind::Nodes)?,
            BlockKind::Polyhedron => self.decode_variable(block, ConnKind::Faces)?,
            BlockKind::Unknown => {
                return Err(MeshStreamError::UnknownBlockType(
                    self.blocks[block].info.elem_type.clone(),
                ));
            }
        };
        self.conn.window().debug_assert_invariants();
        trace!(
            "decoded {rows} rows of block {} at entity {}",
            self.blocks[block].id,
            self.conn.base()
        );

        if self.block_cursor.advance(rows) {
            self.state = if block + 1 == self.blocks.len() {
                ReaderState::Exhausted
            } else {
                ReaderState::AwaitingBlock
            };
        }
        Ok(Some(block))
    }

    fn decode_fixed(&mut self, block: usize) -> Result<usize, MeshStreamError> {
        let meta = &self.blocks[block];
        let (blk_id, num_elem, npe) = (meta.id, meta.info.num_elem, meta.info.num_nodes_per_elem);
        if meta.kind.nodes_per_element() != Some(npe) {
            return Err(MeshStreamError::CorruptBlock {
                block: blk_id,
                detail: format!("{npe} nodes per element in a {} block", meta.kind.type_name()),
            });
        }
        let start = self.conn.next_in_block();
        let count = self.options.chunk_size.min(num_elem - start);

        let raw = self.source.read_partial_conn(blk_id, start, count)?;
        if raw.len() != count * npe {
            return Err(MeshStreamError::CorruptBlock {
                block: blk_id,
                detail: format!(
                    "expected {} connectivity entries, read {}",
                    count * npe,
                    raw.len()
                ),
            });
        }
        let nodes = to_zero_based(&raw, blk_id)?;

        self.conn.begin_chunk(count, nodes.len(), start + count == num_elem);
        for row in nodes.chunks(npe) {
            self.conn.push_row(row.iter().copied());
        }
        Ok(count)
    }

    /// Whole-block decode of `nsided` (node rows) or `nfaced` (face rows).
    fn decode_variable(&mut self, block: usize, kind: ConnKind) -> Result<usize, MeshStreamError> {
        let (blk_id, num_elem) = (self.blocks[block].id, self.blocks[block].info.num_elem);
        let counts = self.source.read_entity_counts(blk_id)?;
        if counts.len() != num_elem {
            return Err(MeshStreamError::CorruptBlock {
                block: blk_id,
                detail: format!("{} entity counts for {num_elem} elements", counts.len()),
            });
        }
        let raw = self.source.read_conn(blk_id, kind)?;
        let total: usize = counts.iter().sum();
        if raw.len() != total {
            return Err(MeshStreamError::CorruptBlock {
                block: blk_id,
                detail: format!("counts sum to {total}, connectivity holds {}", raw.len()),
            });
        }
        let ids = to_zero_based(&raw, blk_id)?;

        self.conn.begin_chunk(num_elem, ids.len(), true);
        let mut at = 0;
        for n in counts {
            self.conn.push_row(ids[at..at + n].iter().copied());
            at += n;
        }
        Ok(num_elem)
    }

    /// Reset every cursor for another pass from entity 0.
    pub fn rewind(&mut self) {
        debug!("rewinding mesh stream");
        self.block_cursor.reset();
        self.conn.reset();
        self.vertices.reset();
        self.state = if self.blocks.is_empty() {
            ReaderState::Exhausted
        } else {
            ReaderState::AwaitingBlock
        };
    }

    /// Coordinates of vertex `id`.
    pub fn vertex(&mut self, id: usize) -> Result<Vec<T>, MeshStreamError> {
        let mut out = vec![T::zero(); self.dim];
        self.vertex_into(id, &mut out)?;
        Ok(out)
    }

    /// Coordinates of vertex `id` written to `out`, which must hold
    /// `dimension()` values.
    pub fn vertex_into(&mut self, id: usize, out: &mut [T]) -> Result<(), MeshStreamError> {
        if out.len() != self.dim {
            return Err(MeshStreamError::LengthMismatch {
                what: "vertex buffer",
                expected: self.dim,
                found: out.len(),
            });
        }
        if id >= self.params.num_nodes {
            return Err(MeshStreamError::VertexNotFound(id));
        }
        if !self.vertices.contains(id) {
            self.page_vertices(id)?;
        }
        self.vertices.get(id, out);
        Ok(())
    }

    /// Walk the coordinate window forward until it holds `id`, restarting
    /// from the first vertex when `id` is behind the window.
    fn page_vertices(&mut self, id: usize) -> Result<(), MeshStreamError> {
        let chunk = self.options.vertex_chunk_size;
        let num_nodes = self.params.num_nodes;
        let mut base = if id < self.vertices.base() {
            trace!("vertex window wraps to the first vertex");
            0
        } else {
            self.vertices.next_base(num_nodes)
        };
        loop {
            let count = chunk.min(num_nodes - base);
            let raw = self.source.read_partial_coords(base, count)?;
            let coords = convert_coords(&raw, count * self.dim)?;
            trace!("paged vertices {base}..{}", base + count);
            self.vertices.load(base, count, coords);
            if self.vertices.contains(id) {
                return Ok(());
            }
            base = self.vertices.next_base(num_nodes);
        }
    }

    /// All point coordinates, one vector per dimension.
    pub fn read_point_coords(&mut self) -> Result<Vec<Vec<T>>, MeshStreamError> {
        let n = self.params.num_nodes;
        let raw = self.source.read_partial_coords(0, n)?;
        let flat = convert_coords(&raw, n * self.dim)?;
        Ok(flat.chunks(n.max(1)).take(self.dim).map(<[T]>::to_vec).collect())
    }
}

fn convert_coords<T: Float>(raw: &[f64], expected: usize) -> Result<Vec<T>, MeshStreamError> {
    if raw.len() != expected {
        return Err(MeshStreamError::LengthMismatch {
            what: "coordinates",
            expected,
            found: raw.len(),
        });
    }
    raw.iter()
        .map(|&v| {
            num_traits::cast::<f64, T>(v).ok_or_else(|| MeshStreamError::NumericConversion(v.to_string()))
        })
        .collect()
}
