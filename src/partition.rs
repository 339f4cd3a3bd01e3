//! Splitting a global array into per-process chunks
//!
//! A global array of length `N` is split into `P` contiguous, order-preserving chunks of
//! `N / P` elements: chunk `r` holds global indices `[r * N/P, (r + 1) * N/P)`. Uneven splits are
//! rejected up front, before any process communicates.

use std::ops::Range;

use conv::ConvUtil;

use crate::error::{try_with_capacity, Error, Result};
use crate::topology::Rank;

/// The layout of a global array across the processes of a run
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    len: usize,
    size: Rank,
    chunk_len: usize,
}

impl Partition {
    /// Lay out `len` elements across `size` processes.
    ///
    /// Fails if `size` is not positive, if `len` is zero, or if `len` is not a multiple of
    /// `size`.
    pub fn new(len: usize, size: Rank) -> Result<Partition> {
        let processes: usize = match size.value_as() {
            Ok(p) if p > 0 => p,
            _ => return Err(Error::ProcessCount(size)),
        };
        if len == 0 {
            return Err(Error::EmptyArray { size });
        }
        if len % processes != 0 {
            return Err(Error::Partition { len, size });
        }
        Ok(Partition {
            len,
            size,
            chunk_len: len / processes,
        })
    }

    /// Length of the global array
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: empty arrays cannot be partitioned
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of processes
    pub fn size(&self) -> Rank {
        self.size
    }

    /// Number of elements in every chunk
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    fn index(&self, rank: Rank) -> Result<usize> {
        let invalid = Error::Rank {
            rank,
            size: self.size,
        };
        if rank >= self.size {
            return Err(invalid);
        }
        rank.value_as().map_err(|_| invalid)
    }

    /// Global indices held by the chunk of `rank`
    pub fn range(&self, rank: Rank) -> Result<Range<usize>> {
        let start = self.index(rank)? * self.chunk_len;
        Ok(start..start + self.chunk_len)
    }

    /// The rank whose chunk holds global index `index`
    pub fn owner(&self, index: usize) -> Option<Rank> {
        if index >= self.len {
            return None;
        }
        (index / self.chunk_len).value_as().ok()
    }

    /// Global index of position `local` within the chunk of `rank`
    pub fn to_global(&self, rank: Rank, local: usize) -> Result<usize> {
        if local >= self.chunk_len {
            return Err(Error::Count {
                expected: self.chunk_len,
                actual: local + 1,
            });
        }
        Ok(self.range(rank)?.start + local)
    }

    /// The owning rank and position within its chunk of global index `index`
    pub fn to_local(&self, index: usize) -> Option<(Rank, usize)> {
        self.owner(index)
            .map(|rank| (rank, index % self.chunk_len))
    }

    fn check_len<T>(&self, global: &[T]) -> Result<()> {
        if global.len() == self.len {
            Ok(())
        } else {
            Err(Error::Count {
                expected: self.len,
                actual: global.len(),
            })
        }
    }

    /// The chunk of `rank` within `global`
    pub fn chunk<'a, T>(&self, global: &'a [T], rank: Rank) -> Result<&'a [T]> {
        self.check_len(global)?;
        Ok(&global[self.range(rank)?])
    }

    /// All chunks of `global`, in rank order
    pub fn chunks<'a, T>(&self, global: &'a [T]) -> Result<std::slice::ChunksExact<'a, T>> {
        self.check_len(global)?;
        Ok(global.chunks_exact(self.chunk_len))
    }

    /// Concatenate per-rank results in rank order into a global array.
    ///
    /// Expects exactly one chunk of `chunk_len()` elements per process.
    pub fn assemble<T: Clone>(&self, parts: &[Vec<T>]) -> Result<Vec<T>> {
        let processes = self.index(self.size - 1)? + 1;
        if parts.len() != processes {
            return Err(Error::Count {
                expected: processes,
                actual: parts.len(),
            });
        }
        let mut global = try_with_capacity(self.len)?;
        for part in parts {
            if part.len() != self.chunk_len {
                return Err(Error::Count {
                    expected: self.chunk_len,
                    actual: part.len(),
                });
            }
            global.extend_from_slice(part);
        }
        Ok(global)
    }
}

/// The global array, owned by the coordinator for the duration of a run
///
/// Other processes never observe it; they only receive their own chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalArray<T> {
    values: Vec<T>,
}

impl<T> GlobalArray<T> {
    /// Take ownership of `values`
    pub fn new(values: Vec<T>) -> GlobalArray<T> {
        GlobalArray { values }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read access to the elements
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Lay the array out across `size` processes
    pub fn partition(&self, size: Rank) -> Result<Partition> {
        Partition::new(self.len(), size)
    }

    /// Give the elements back
    pub fn into_inner(self) -> Vec<T> {
        self.values
    }
}

impl<T> From<Vec<T>> for GlobalArray<T> {
    fn from(values: Vec<T>) -> Self {
        GlobalArray::new(values)
    }
}
