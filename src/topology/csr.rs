//! Compressed sparse row incidence tables.
//!
//! A [`Csr`] maps each row (an entity id) to a variable-length list of related
//! entity ids. Row `r` is `indices[offsets[r]..offsets[r + 1]]`; the order of
//! a row is preserved exactly as it was pushed.

use serde::{Deserialize, Serialize};

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshStreamError;

/// Row-offset / column-index pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Csr {
    /// Row offsets, `rows + 1` entries, starting at 0 and non-decreasing.
    pub offsets: Vec<usize>,
    /// Concatenated row contents.
    pub indices: Vec<usize>,
}

impl Default for Csr {
    fn default() -> Self {
        Self::new()
    }
}

impl Csr {
    /// Empty table with zero rows.
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }

    /// Empty table with room for `rows` rows and `nnz` indices.
    pub fn with_capacity(rows: usize, nnz: usize) -> Self {
        let mut offsets = Vec::with_capacity(rows + 1);
        offsets.push(0);
        Self {
            offsets,
            indices: Vec::with_capacity(nnz),
        }
    }

    /// Build from an iterator of rows.
    pub fn from_rows<R, I>(rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = usize>,
    {
        let mut csr = Self::new();
        for row in rows {
            csr.push_row(row);
        }
        csr
    }

    /// Build from raw parts, validating the offsets invariant.
    pub fn from_parts(offsets: Vec<usize>, indices: Vec<usize>) -> Result<Self, MeshStreamError> {
        let csr = Self { offsets, indices };
        csr.validate_invariants()?;
        Ok(csr)
    }

    /// Drop every row, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.offsets.clear();
        self.offsets.push(0);
        self.indices.clear();
    }

    /// Reserve room for `rows` more rows and `nnz` more indices.
    pub fn reserve(&mut self, rows: usize, nnz: usize) {
        self.offsets.reserve(rows);
        self.indices.reserve(nnz);
    }

    /// Append one row.
    pub fn push_row<I: IntoIterator<Item = usize>>(&mut self, row: I) {
        self.indices.extend(row);
        self.offsets.push(self.indices.len());
    }

    /// Number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Total number of stored indices.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// `true` when the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Row `r`. Panics when `r >= num_rows()`.
    #[inline]
    pub fn row(&self, r: usize) -> &[usize] {
        &self.indices[self.offsets[r]..self.offsets[r + 1]]
    }

    /// Row `r`, or `None` when out of range.
    #[inline]
    pub fn get_row(&self, r: usize) -> Option<&[usize]> {
        (r < self.num_rows()).then(|| self.row(r))
    }

    /// Length of row `r`. Panics when `r >= num_rows()`.
    #[inline]
    pub fn row_len(&self, r: usize) -> usize {
        self.offsets[r + 1] - self.offsets[r]
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[usize]> + '_ {
        self.offsets
            .windows(2)
            .map(move |w| &self.indices[w[0]..w[1]])
    }

    /// Largest index stored in any row.
    pub fn max_index(&self) -> Option<usize> {
        self.indices.iter().copied().max()
    }

    /// Reverse table: row `c` lists every row of `self` containing `c`, in
    /// increasing row order. `num_cols` must exceed every stored index.
    pub fn transpose(&self, num_cols: usize) -> Result<Csr, MeshStreamError> {
        let mut counts = vec![0usize; num_cols + 1];
        for &c in &self.indices {
            if c >= num_cols {
                return Err(MeshStreamError::IndexOutOfRange {
                    index: c,
                    rows: num_cols,
                });
            }
            counts[c + 1] += 1;
        }
        for i in 0..num_cols {
            counts[i + 1] += counts[i];
        }
        let offsets = counts.clone();
        let mut write = counts;
        let mut indices = vec![0usize; self.indices.len()];
        for (r, row) in self.rows().enumerate() {
            for &c in row {
                indices[write[c]] = r;
                write[c] += 1;
            }
        }
        Ok(Csr { offsets, indices })
    }
}

impl DebugInvariants for Csr {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Csr");
    }

    fn validate_invariants(&self) -> Result<(), MeshStreamError> {
        match self.offsets.first() {
            Some(0) => {}
            Some(first) => {
                return Err(MeshStreamError::CsrInvariant(format!(
                    "offsets[0] = {first}, expected 0"
                )));
            }
            None => return Err(MeshStreamError::CsrInvariant("offsets is empty".into())),
        }
        if let Some(r) = self.offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(MeshStreamError::CsrInvariant(format!(
                "offsets decrease at row {r}"
            )));
        }
        let last = *self.offsets.last().unwrap_or(&0);
        if last != self.indices.len() {
            return Err(MeshStreamError::CsrInvariant(format!(
                "last offset {last} != indices length {}",
                self.indices.len()
            )));
        }
        Ok(())
    }
}
