/// Bounded-size, order-preserving views over flat mesh buffers
use crate::error::{Error, Result};

/// One contiguous sub-range of a streamed buffer.
#[derive(Debug)]
pub struct Chunk<'a, T> {
    /// Ordinal of the chunk within its pass.
    pub index: usize,
    /// Position of the first element in the full buffer.
    pub offset: usize,
    pub items: &'a [T],
}

// Manual impls: a view is copyable whatever the element type.
impl<T> Clone for Chunk<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Chunk<'_, T> {}

impl<T> Chunk<'_, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Restartable chunking of a slice. Every call to `iter` yields the same
/// `ceil(len / chunk_size)` chunks, in buffer order, covering each element
/// exactly once.
#[derive(Debug)]
pub struct ChunkStream<'a, T> {
    items: &'a [T],
    chunk_size: usize,
}

impl<T> Clone for ChunkStream<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ChunkStream<'_, T> {}

impl<'a, T> ChunkStream<'a, T> {
    pub fn new(items: &'a [T], chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid_configuration(
                "chunk size must be a positive integer",
            ));
        }
        Ok(Self { items, chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks a pass yields.
    pub fn len(&self) -> usize {
        self.items.len().div_ceil(self.chunk_size)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Chunk<'a, T>> + use<'a, T> {
        let chunk_size = self.chunk_size;
        self.items
            .chunks(chunk_size)
            .enumerate()
            .map(move |(index, items)| Chunk {
                index,
                offset: index * chunk_size,
                items,
            })
    }

    /// Final chunk of a pass, if any.
    pub fn last(&self) -> Option<Chunk<'a, T>> {
        let count = self.len();
        if count == 0 {
            return None;
        }
        let index = count - 1;
        let offset = index * self.chunk_size;
        Some(Chunk {
            index,
            offset,
            items: &self.items[offset..],
        })
    }
}
