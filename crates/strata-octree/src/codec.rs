//! Binary shard layout: big-endian `depth: i32`, `size: i32`,
//! `center: 3 x f64`, then exactly `size` cells as `i32`.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::arena::{MAX_CELLS, NodeArena};
use crate::packed::{MAX_DEPTH, PackedOctree};
use crate::OctreeError;

/// Cells decoded per read.
const READ_CHUNK: usize = 1 << 16;

impl PackedOctree {
    /// Serialize the whole tree, free blocks included.
    pub fn store<W: Write>(&self, out: &mut W) -> Result<(), OctreeError> {
        let cells = self.cells();
        out.write_i32::<BigEndian>(self.depth() as i32)?;
        out.write_i32::<BigEndian>(cells.len() as i32)?;
        for c in self.center() {
            out.write_f64::<BigEndian>(c)?;
        }
        for &cell in cells {
            out.write_i32::<BigEndian>(cell)?;
        }
        Ok(())
    }

    /// Read a tree written by [`PackedOctree::store`].
    ///
    /// The reachable structure is validated before the tree is returned, so a
    /// corrupt stream cannot produce out-of-range child indices.
    pub fn load<R: Read>(input: &mut R) -> Result<Self, OctreeError> {
        let depth = input.read_i32::<BigEndian>()?;
        if depth <= 0 || depth as u32 > MAX_DEPTH {
            return Err(OctreeError::Malformed("depth out of range"));
        }
        let size = input.read_i32::<BigEndian>()?;
        if size <= 0 || size as usize > MAX_CELLS {
            return Err(OctreeError::Malformed("cell count out of range"));
        }
        let mut center = [0.0f64; 3];
        for c in center.iter_mut() {
            *c = input.read_f64::<BigEndian>()?;
        }
        // The header is untrusted: grow with the data actually read.
        let size = size as usize;
        let mut cells = Vec::with_capacity(size.min(READ_CHUNK));
        let mut chunk = vec![0i32; size.min(READ_CHUNK)];
        while cells.len() < size {
            let n = (size - cells.len()).min(chunk.len());
            input.read_i32_into::<BigEndian>(&mut chunk[..n])?;
            cells.extend_from_slice(&chunk[..n]);
        }
        validate(&cells, depth as u32)?;
        Ok(PackedOctree::from_parts(
            depth as u32,
            center,
            NodeArena::from_cells(cells),
        ))
    }
}

fn validate(cells: &[i32], depth: u32) -> Result<(), OctreeError> {
    let mut stack = vec![(0usize, depth)];
    while let Some((node, level)) = stack.pop() {
        let value = cells[node];
        if value <= 0 {
            continue;
        }
        if level == 0 {
            return Err(OctreeError::Malformed("branch below the deepest level"));
        }
        let base = value as usize;
        if base + 8 > cells.len() {
            return Err(OctreeError::Malformed("child block out of range"));
        }
        stack.extend((0..8).map(|k| (base + k, level - 1)));
    }
    Ok(())
}
