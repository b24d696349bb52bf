//! Streaming cursors over a blocked mesh file.
//!
//! - [`BlockCursor`] counts down the entities left in the block being decoded.
//! - [`ConnectivityCursor`] owns the decoded connectivity window and the
//!   global / block-local bookkeeping of where the next chunk starts.
//! - [`VertexCursor`] owns a window of point coordinates.
//! - [`BlockIndex`] maps an entity id to its block through cumulative sizes.

use crate::topology::Csr;

/// Position of the sequential decoder within the block list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockCursor {
    block: usize,
    remaining: usize,
    initialized: bool,
}

impl BlockCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the current block with `count` entities.
    ///
    /// No-op while the block is in progress, so repeated calls between
    /// chunked reads keep the remaining count.
    pub fn init(&mut self, count: usize) {
        if !self.initialized {
            self.remaining = count;
            self.initialized = true;
        }
    }

    /// Account for `decoded` entities. Returns `true` when the block is
    /// finished, in which case the cursor moves to the next block.
    pub fn advance(&mut self, decoded: usize) -> bool {
        self.remaining = self.remaining.saturating_sub(decoded);
        if self.remaining == 0 {
            self.block += 1;
            self.initialized = false;
            true
        } else {
            false
        }
    }

    /// Index of the block currently (or next) decoded.
    pub fn current_block(&self) -> usize {
        self.block
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Entities of the current block not decoded yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Jump into `block` with `remaining` entities left to decode.
    pub fn seek(&mut self, block: usize, remaining: usize) {
        self.block = block;
        self.remaining = remaining;
        self.initialized = true;
    }

    /// Back to the first block.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Block bookkeeping of the current connectivity window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkState {
    /// Nothing decoded since the last reset.
    #[default]
    NotStarted,
    /// The window holds rows `local_base..` of `block`, and the block
    /// continues after it.
    InBlock { block: usize, local_base: usize },
    /// The window holds the tail of `block`; the next chunk opens a new block.
    BetweenBlocks { block: usize, local_base: usize },
}

/// Window of decoded entity → vertex rows covering ids `[base, base + rows)`.
#[derive(Clone, Debug, Default)]
pub struct ConnectivityCursor {
    state: ChunkState,
    base: usize,
    window: Csr,
}

impl ConnectivityCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// First global id held by the window.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Rows currently held.
    pub fn rows(&self) -> usize {
        self.window.num_rows()
    }

    pub fn window(&self) -> &Csr {
        &self.window
    }

    /// `true` iff `base <= id < base + rows`.
    pub fn contains(&self, id: usize) -> bool {
        id >= self.base && id - self.base < self.window.num_rows()
    }

    /// Global id of the first entity after the window.
    pub fn next_global(&self) -> usize {
        self.base + self.window.num_rows()
    }

    /// Block-local offset of the first entity after the window; 0 right after
    /// a block boundary.
    pub fn next_in_block(&self) -> usize {
        match self.state {
            ChunkState::NotStarted | ChunkState::BetweenBlocks { .. } => 0,
            ChunkState::InBlock { local_base, .. } => local_base + self.window.num_rows(),
        }
    }

    /// Block the next chunk belongs to.
    pub fn next_block(&self) -> usize {
        match self.state {
            ChunkState::NotStarted => 0,
            ChunkState::InBlock { block, .. } => block,
            ChunkState::BetweenBlocks { block, .. } => block + 1,
        }
    }

    /// Block of the rows held, if any chunk was started.
    pub fn current_block(&self) -> Option<usize> {
        match self.state {
            ChunkState::NotStarted => None,
            ChunkState::InBlock { block, .. } | ChunkState::BetweenBlocks { block, .. } => Some(block),
        }
    }

    /// Open a new window right after the previous one.
    ///
    /// The window is cleared and sized for `rows` rows holding `nnz` indices.
    /// `ends_block` records that this chunk is the last one of its block.
    pub fn begin_chunk(&mut self, rows: usize, nnz: usize, ends_block: bool) {
        let base = self.next_global();
        let local_base = self.next_in_block();
        let block = self.next_block();
        self.base = base;
        self.state = if ends_block {
            ChunkState::BetweenBlocks { block, local_base }
        } else {
            ChunkState::InBlock { block, local_base }
        };
        self.window.clear();
        self.window.reserve(rows, nnz);
    }

    /// Append one decoded row to the window.
    pub fn push_row<I: IntoIterator<Item = usize>>(&mut self, row: I) {
        self.window.push_row(row);
    }

    /// Position an empty window at `local_base` of `block`, global id
    /// `global_base`.
    pub fn seek(&mut self, block: usize, global_base: usize, local_base: usize) {
        self.base = global_base;
        self.state = ChunkState::InBlock { block, local_base };
        self.window.clear();
    }

    /// Forget everything; the next chunk starts block 0 at global id 0.
    pub fn reset(&mut self) {
        self.base = 0;
        self.state = ChunkState::NotStarted;
        self.window.clear();
    }

    /// Row of `id`.
    ///
    /// # Panics
    /// If `id` is not held by the window.
    pub fn row(&self, id: usize) -> &[usize] {
        assert!(
            self.contains(id),
            "entity {id} outside connectivity window [{}, {})",
            self.base,
            self.next_global()
        );
        self.window.row(id - self.base)
    }

    /// Copy the row of `id` into `out`, replacing its contents.
    ///
    /// # Panics
    /// If `id` is not held by the window.
    pub fn get(&self, id: usize, out: &mut Vec<usize>) {
        out.clear();
        out.extend_from_slice(self.row(id));
    }
}

/// Window of point coordinates covering vertex ids `[base, base + count)`.
///
/// Coordinates are stored dimension-major: coordinate `d` of vertex `v` is at
/// `d * count + (v - base)`.
#[derive(Clone, Debug)]
pub struct VertexCursor<T> {
    dim: usize,
    base: usize,
    count: usize,
    coords: Vec<T>,
}

impl<T: Copy> VertexCursor<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            base: 0,
            count: 0,
            coords: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn contains(&self, id: usize) -> bool {
        id >= self.base && id - self.base < self.count
    }

    /// First vertex of the window following this one, wrapping to 0 past
    /// `num_verts`.
    pub fn next_base(&self, num_verts: usize) -> usize {
        let next = self.base + self.count;
        if next >= num_verts { 0 } else { next }
    }

    /// Replace the window. `coords.len()` must be `count * dimension()`.
    pub fn load(&mut self, base: usize, count: usize, coords: Vec<T>) {
        debug_assert_eq!(coords.len(), count * self.dim);
        self.base = base;
        self.count = count;
        self.coords = coords;
    }

    /// Coordinate `d` of vertex `id`.
    ///
    /// # Panics
    /// If `id` is not held by the window or `d >= dimension()`.
    pub fn coord(&self, id: usize, d: usize) -> T {
        assert!(self.contains(id), "vertex {id} outside coordinate window");
        self.coords[d * self.count + (id - self.base)]
    }

    /// Write all coordinates of `id` into `out[..dimension()]`.
    pub fn get(&self, id: usize, out: &mut [T]) {
        for (d, slot) in out.iter_mut().enumerate().take(self.dim) {
            *slot = self.coord(id, d);
        }
    }

    pub fn reset(&mut self) {
        self.base = 0;
        self.count = 0;
        self.coords.clear();
    }
}

/// Result of [`BlockIndex::locate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    /// Block index in file order.
    pub block: usize,
    /// Global id of the first entity of the chunk to decode.
    pub global_base: usize,
    /// Offset of that entity within the block.
    pub local_base: usize,
}

/// Cumulative entity counts of the blocks, for random-access lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockIndex {
    starts: Vec<usize>,
    chunked: Vec<bool>,
}

impl BlockIndex {
    /// Build from `(entity count, decoded in chunks)` per block.
    pub fn new<I: IntoIterator<Item = (usize, bool)>>(blocks: I) -> Self {
        let mut starts = vec![0];
        let mut chunked = Vec::new();
        for (count, is_chunked) in blocks {
            let last = starts[starts.len() - 1];
            starts.push(last + count);
            chunked.push(is_chunked);
        }
        Self { starts, chunked }
    }

    pub fn num_blocks(&self) -> usize {
        self.chunked.len()
    }

    pub fn num_entities(&self) -> usize {
        self.starts[self.starts.len() - 1]
    }

    /// Global id of the first entity of `block`.
    pub fn block_start(&self, block: usize) -> usize {
        self.starts[block]
    }

    /// Block holding `id` and the start of the chunk to decode.
    ///
    /// Chunked blocks locate to the `chunk_size`-aligned offset, whole-block
    /// kinds to offset 0. Empty blocks are skipped.
    pub fn locate(&self, id: usize, chunk_size: usize) -> Option<Location> {
        let block = self.starts[1..].partition_point(|&end| end <= id);
        if block >= self.num_blocks() {
            return None;
        }
        let local = id - self.starts[block];
        let local_base = if self.chunked[block] {
            local / chunk_size * chunk_size
        } else {
            0
        };
        Some(Location {
            block,
            global_base: self.starts[block] + local_base,
            local_base,
        })
    }
}
