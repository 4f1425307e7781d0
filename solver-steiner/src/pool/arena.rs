//! Block-based coefficient storage.
//!
//! Rows are written into fixed-capacity blocks and addressed by [`Span`]
//! handles. Blocks are kept oldest-first; the last block is the allocation
//! head. Compaction rewrites the live rows front to back, remaps their spans
//! and releases the blocks left empty at the tail.

use crate::error::{PoolError, PoolResult};
use crate::row::Coef;

/// Handle to a row's coefficients inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    block: u32,
    start: u32,
    len: u32,
}

impl Span {
    /// Number of coefficients.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for a zero-length span.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct Block {
    buf: Box<[Coef]>,
    used: usize,
}

impl Block {
    fn with_capacity(cap: usize) -> Self {
        Self {
            buf: vec![Coef::default(); cap].into_boxed_slice(),
            used: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn free(&self) -> usize {
        self.buf.len() - self.used
    }
}

/// Memory summary of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaMemory {
    /// Number of blocks.
    pub blocks: usize,
    /// Free coefficients in the allocation head.
    pub free: usize,
    /// Unused tails of older blocks (unreachable until compaction).
    pub wasted: usize,
    /// Total coefficient capacity.
    pub total: usize,
}

/// Append-only coefficient arena.
#[derive(Debug)]
pub struct CoefArena {
    blocks: Vec<Block>,
}

impl CoefArena {
    /// Create an arena whose first block holds `capacity` coefficients.
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: vec![Block::with_capacity(capacity.max(1))],
        }
    }

    /// Free space in the allocation head.
    pub fn head_free(&self) -> usize {
        self.blocks.last().map_or(0, Block::free)
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Copy `coefs` into the arena.
    ///
    /// When the head lacks room a new block is started with the head's
    /// capacity (or `coefs.len()` if larger); the old head's tail is wasted.
    pub fn alloc(&mut self, coefs: &[Coef]) -> PoolResult<Span> {
        let len = coefs.len();
        if self.head_free() < len {
            let cap = self
                .blocks
                .last()
                .map_or(len, |b| b.capacity())
                .max(len);
            self.blocks.push(Block::with_capacity(cap));
        }

        let block = self.blocks.len() - 1;
        let head = &mut self.blocks[block];
        let start = head.used;
        head.buf[start..start + len].copy_from_slice(coefs);
        head.used += len;

        Ok(Span {
            block: handle(block, "block")?,
            start: handle(start, "offset")?,
            len: handle(len, "length")?,
        })
    }

    /// Coefficients behind a span.
    pub fn get(&self, span: Span) -> &[Coef] {
        let start = span.start as usize;
        &self.blocks[span.block as usize].buf[start..start + span.len()]
    }

    /// Compact live rows to the front of the arena.
    ///
    /// `live` must yield every surviving span in allocation order. Each span
    /// is rewritten in place to its new location.
    pub fn compact<'a, I>(&mut self, live: I) -> PoolResult<()>
    where
        I: IntoIterator<Item = &'a mut Span>,
    {
        let mut bi = 0usize;
        let mut offset = 0usize;

        for span in live {
            let len = span.len();
            while self.blocks[bi].capacity() - offset < len {
                self.blocks[bi].used = offset;
                bi += 1;
                offset = 0;
            }

            let src_block = span.block as usize;
            let src_start = span.start as usize;
            if src_block == bi {
                if src_start != offset {
                    self.blocks[bi]
                        .buf
                        .copy_within(src_start..src_start + len, offset);
                }
            } else {
                // Destination always precedes the source.
                let (front, back) = self.blocks.split_at_mut(src_block);
                let src = &back[0].buf[src_start..src_start + len];
                front[bi].buf[offset..offset + len].copy_from_slice(src);
            }

            span.block = handle(bi, "block")?;
            span.start = handle(offset, "offset")?;
            offset += len;
        }

        self.blocks[bi].used = offset;
        self.blocks.truncate(bi + 1);
        Ok(())
    }

    /// Memory summary.
    pub fn memory(&self) -> ArenaMemory {
        let last = self.blocks.len().saturating_sub(1);
        let mut mem = ArenaMemory {
            blocks: self.blocks.len(),
            ..Default::default()
        };
        for (i, b) in self.blocks.iter().enumerate() {
            mem.total += b.capacity();
            if i == last {
                mem.free += b.free();
            } else {
                mem.wasted += b.free();
            }
        }
        mem
    }
}

fn handle(value: usize, what: &str) -> PoolResult<u32> {
    u32::try_from(value)
        .map_err(|_| PoolError::ArenaExhausted(format!("{} {} exceeds u32", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coefs(vars: &[usize]) -> Vec<Coef> {
        vars.iter().map(|&v| Coef::new(v, v as i64 + 1)).collect()
    }

    #[test]
    fn test_alloc_grows_blocks() {
        let mut arena = CoefArena::new(4);
        let a = arena.alloc(&coefs(&[0, 1, 2])).unwrap();
        assert_eq!(arena.num_blocks(), 1);
        assert_eq!(arena.head_free(), 1);

        let b = arena.alloc(&coefs(&[3, 4])).unwrap();
        assert_eq!(arena.num_blocks(), 2);
        assert_eq!(arena.get(a), coefs(&[0, 1, 2]).as_slice());
        assert_eq!(arena.get(b), coefs(&[3, 4]).as_slice());

        let mem = arena.memory();
        assert_eq!(mem.wasted, 1);
        assert_eq!(mem.free, 2);
        assert_eq!(mem.total, 8);
    }

    #[test]
    fn test_oversized_row_gets_own_block() {
        let mut arena = CoefArena::new(2);
        let big = arena.alloc(&coefs(&[0, 1, 2, 3, 4])).unwrap();
        assert_eq!(arena.get(big).len(), 5);
        assert_eq!(arena.memory().total, 2 + 5);
    }

    #[test]
    fn test_compact_moves_rows_forward() {
        let mut arena = CoefArena::new(4);
        let mut spans = vec![
            arena.alloc(&coefs(&[0, 1, 2])).unwrap(),
            arena.alloc(&coefs(&[3, 4])).unwrap(),
            arena.alloc(&coefs(&[5])).unwrap(),
        ];
        assert_eq!(arena.num_blocks(), 2);

        // Drop the first row; the others move into the first block.
        spans.remove(0);
        arena.compact(spans.iter_mut()).unwrap();

        assert_eq!(arena.get(spans[0]), coefs(&[3, 4]).as_slice());
        assert_eq!(arena.get(spans[1]), coefs(&[5]).as_slice());
        assert_eq!(arena.num_blocks(), 1);
        assert_eq!(arena.head_free(), 1);
    }

    #[test]
    fn test_compact_releases_empty_blocks() {
        let mut arena = CoefArena::new(2);
        let mut keep = vec![arena.alloc(&coefs(&[0])).unwrap()];
        for v in 1..6 {
            arena.alloc(&coefs(&[v, v + 10])).unwrap();
        }
        assert_eq!(arena.num_blocks(), 6);

        arena.compact(keep.iter_mut()).unwrap();
        assert_eq!(arena.num_blocks(), 1);
        assert_eq!(arena.get(keep[0]), coefs(&[0]).as_slice());
        assert_eq!(arena.head_free(), 1);
    }

    #[test]
    fn test_handles_beyond_u32_are_rejected() {
        assert_eq!(handle(7, "offset").unwrap(), 7);
        assert!(matches!(
            handle(u32::MAX as usize + 1, "offset"),
            Err(PoolError::ArenaExhausted(_))
        ));
    }

    #[test]
    fn test_compact_everything_dropped() {
        let mut arena = CoefArena::new(3);
        arena.alloc(&coefs(&[0, 1, 2])).unwrap();
        arena.alloc(&coefs(&[3, 4])).unwrap();
        arena.compact(std::iter::empty()).unwrap();
        assert_eq!(arena.num_blocks(), 1);
        assert_eq!(arena.head_free(), 3);
    }
}
