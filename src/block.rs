//! Contiguous emitted regions and alignment padding

use std::cell::{Cell, Ref, RefCell};

/// A contiguous region of emitted bytes.
///
/// A block records its `offset` into the internal emission buffer, its
/// `size` once closed, the positions where alignment NOPs must be injected,
/// and — after resolution — its `start` in the final layout.
#[derive(Debug, Default)]
pub struct Block {
    offset: usize,
    start: Cell<Option<usize>>,
    size: Cell<usize>,
    paddings: RefCell<Vec<usize>>,
}

impl Block {
    pub(crate) fn new(offset: usize) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Position of the block in the internal emission buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Final layout position, once assigned by [`Block::resolve`].
    pub fn start(&self) -> Option<usize> {
        self.start.get()
    }

    /// Emitted size in bytes, valid once the block is closed.
    pub fn size(&self) -> usize {
        self.size.get()
    }

    /// Assign the block's final start position and return its end, i.e. the
    /// start of the following block: `start + size + padding`.
    pub fn resolve(&self, start: usize) -> usize {
        self.start.set(Some(start));
        start + self.size.get() + self.padding_before(start, self.padding_count())
    }

    pub(crate) fn close(&self, buffer_len: usize) {
        self.size.set(buffer_len - self.offset);
    }

    /// Record an alignment-padding point at the given buffer offset.
    ///
    /// Points are recorded in emission order, so the list stays in
    /// increasing offset order.
    pub(crate) fn push_padding(&self, offset: usize) {
        self.paddings.borrow_mut().push(offset);
    }

    pub(crate) fn padding_count(&self) -> usize {
        self.paddings.borrow().len()
    }

    pub(crate) fn paddings(&self) -> Ref<'_, Vec<usize>> {
        self.paddings.borrow()
    }

    /// NOP bytes injected before buffer position `offset + …` when the block
    /// is laid out at `start`, considering only the first `limit` padding
    /// points. A function of `start` alone for a fixed point list, computed
    /// on demand and idempotent.
    pub(crate) fn padding_before(&self, start: usize, limit: usize) -> usize {
        padding(&self.paddings.borrow(), start, self.offset, limit)
    }
}

/// Alignment padding for the points in `points[..limit]`: at each point,
/// NOPs are added until the byte *after* the padding run lands one short of
/// a 4-byte boundary — which puts the last byte of a following 5-byte
/// branch, i.e. the end of its displacement field, on the boundary.
pub(crate) fn padding(points: &[usize], start: usize, block_offset: usize, limit: usize) -> usize {
    let mut padding = 0;
    for &point in points.iter().take(limit) {
        let index = point - block_offset;
        while (start + index + padding + 1) % 4 != 0 {
            padding += 1;
        }
    }
    padding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_aligns_following_displacement() {
        // One padding point at the block head: the next byte must land at
        // 3 mod 4 so a 5-byte branch ends on a 4-byte boundary.
        for start in 0..8 {
            let pad = padding(&[0], start, 0, 1);
            assert_eq!((start + pad + 1) % 4, 0, "start {start}");
        }
    }

    #[test]
    fn padding_respects_limit() {
        let points = [0, 8];
        assert_eq!(padding(&points, 0, 0, 0), 0);
        assert_eq!(padding(&points, 0, 0, 1), 3);
        // Second point: 8 + 3 carried + pad + 1 ≡ 0 (mod 4).
        assert_eq!(padding(&points, 0, 0, 2), 3);
    }

    #[test]
    fn resolve_accounts_for_padding() {
        let block = Block::new(0);
        block.push_padding(0);
        block.close(5);

        let end = block.resolve(1);
        assert_eq!(block.start(), Some(1));
        // Two NOPs push the branch so its last byte sits at offset 7.
        assert_eq!(end, 1 + 5 + 2);
    }

    #[test]
    fn sequential_resolution() {
        let first = Block::new(0);
        first.close(3);
        let second = Block::new(3);
        second.close(10);

        let end = first.resolve(0);
        assert_eq!(end, 3);
        assert_eq!(second.resolve(end), 10);
    }
}
