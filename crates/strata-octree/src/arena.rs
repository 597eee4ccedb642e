//! Flat cell arena shared by the shard octree and the coarse shard index.
//!
//! A node is one `i32` cell. Positive values are branches holding the index of
//! the first of eight contiguous children; zero and negative values are leaves
//! holding the negated payload. Children are allocated in 8-cell blocks. Freed
//! blocks form a singly-linked list threaded through their own first cell.

use crate::OctreeError;

/// Hard ceiling on the number of cells one arena may hold.
pub const MAX_CELLS: usize = i32::MAX as usize - 16;
pub const INITIAL_CELLS: usize = 64;
const GROWTH: f64 = 1.5;
const NO_BLOCK: i32 = -1;

#[derive(Clone, Debug)]
pub struct NodeArena {
    cells: Vec<i32>,
    size: usize,
    free_head: i32,
    free_blocks: usize,
    limit: usize,
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeArena {
    /// Arena holding a single empty root leaf.
    pub fn new() -> Self {
        Self {
            cells: vec![0; INITIAL_CELLS],
            size: 1,
            free_head: NO_BLOCK,
            free_blocks: 0,
            limit: MAX_CELLS,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::new()
        }
    }

    /// Rebuild an arena from persisted cells; the free list is not persisted,
    /// so blocks that were free at store time stay unreachable.
    pub fn from_cells(cells: Vec<i32>) -> Self {
        let size = cells.len();
        Self {
            cells,
            size,
            free_head: NO_BLOCK,
            free_blocks: 0,
            limit: MAX_CELLS,
        }
    }

    /// Number of cells in use, free blocks included.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    /// Cells `[0, size)`.
    #[inline]
    pub fn cells(&self) -> &[i32] {
        &self.cells[..self.size]
    }

    #[inline]
    pub fn cell(&self, index: usize) -> i32 {
        self.cells[index]
    }

    #[inline]
    pub fn set_cell(&mut self, index: usize, value: i32) {
        self.cells[index] = value;
    }

    #[inline]
    pub fn is_branch(&self, index: usize) -> bool {
        self.cells[index] > 0
    }

    /// Index of child `slot` of the branch at `index`.
    #[inline]
    pub fn child(&self, index: usize, slot: usize) -> usize {
        self.cells[index] as usize + slot
    }

    /// Make sure `blocks` more child blocks can be allocated without failing.
    ///
    /// Grows the array up front so a multi-level descent either fails before
    /// touching any cell or completes.
    pub fn reserve_blocks(&mut self, blocks: usize) -> Result<(), OctreeError> {
        let fresh = blocks.saturating_sub(self.free_blocks);
        let needed = self.size + fresh * 8;
        if needed > self.limit {
            return Err(OctreeError::Capacity {
                requested: needed,
                limit: self.limit,
            });
        }
        if needed <= self.cells.len() {
            return Ok(());
        }
        let mut new_len = self.cells.len().max(8);
        while new_len < needed {
            new_len = (new_len as f64 * GROWTH).ceil() as usize;
        }
        let new_len = new_len.min(self.limit);
        log::trace!(target: "octree", "grow cells {} -> {}", self.cells.len(), new_len);
        self.cells.resize(new_len, 0);
        Ok(())
    }

    /// Take an 8-cell block, preferring the free list.
    pub fn alloc_block(&mut self) -> Result<usize, OctreeError> {
        if self.free_head != NO_BLOCK {
            let index = self.free_head as usize;
            self.free_head = self.cells[index];
            self.free_blocks -= 1;
            return Ok(index);
        }
        self.reserve_blocks(1)?;
        let index = self.size;
        self.size += 8;
        Ok(index)
    }

    /// Return the block starting at `index` to the free list.
    pub fn free_block(&mut self, index: usize) {
        self.cells[index] = self.free_head;
        self.free_head = index as i32;
        self.free_blocks += 1;
    }

    /// Turn the leaf at `index` into a branch whose eight children copy it.
    pub fn subdivide(&mut self, index: usize) -> Result<usize, OctreeError> {
        let value = self.cells[index];
        let first = self.alloc_block()?;
        self.cells[first..first + 8].fill(value);
        self.cells[index] = first as i32;
        Ok(first)
    }

    /// Payload of the eight children of `index` when they are all leaves
    /// holding the same value.
    pub fn uniform_children(&self, index: usize) -> Option<i32> {
        let base = self.cells[index] as usize;
        let first = self.cells[base];
        if first > 0 {
            return None;
        }
        self.cells[base + 1..base + 8]
            .iter()
            .all(|&c| c == first)
            .then_some(first)
    }

    /// Collapse the branch at `index` into a leaf holding `value`.
    pub fn merge(&mut self, index: usize, value: i32) {
        let base = self.cells[index] as usize;
        self.free_block(base);
        self.cells[index] = value;
    }

    /// Drop spare capacity past `size`.
    pub fn shrink_to_fit(&mut self) {
        self.cells.truncate(self.size);
        self.cells.shrink_to_fit();
    }

    /// Count reachable nodes below `index`; `leaf_weight` decides how much
    /// each leaf contributes.
    pub fn count_nodes(&self, index: usize, leaf_weight: &impl Fn(i32) -> u64) -> u64 {
        if self.is_branch(index) {
            let base = self.cells[index] as usize;
            1 + (0..8)
                .map(|k| self.count_nodes(base + k, leaf_weight))
                .sum::<u64>()
        } else {
            leaf_weight(self.cells[index])
        }
    }
}
