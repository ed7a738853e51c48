use std::collections::BTreeMap;

use constants::memory::HEAP_ALIGNMENT;

use super::module::{Address, NULL};
use crate::error::{PipelineError, Result};

/// Allocation counters for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub malloc_calls: u64,
    pub free_calls: u64,
    pub invalid_frees: u64,
    pub live_allocations: usize,
    pub bytes_in_use: usize,
    pub capacity: usize,
}

/// Byte-addressed linear memory with a first-fit allocator.
///
/// Behaves like the heap of a compiled module: it starts at an initial size,
/// grows on demand up to a maximum, and never hands out address zero.
#[derive(Debug)]
pub struct LinearHeap {
    memory: Vec<u8>,
    maximum: usize,
    /// Free blocks keyed by start address, coalesced on release.
    free_blocks: BTreeMap<Address, u32>,
    /// Live allocations keyed by start address.
    live: BTreeMap<Address, u32>,
    malloc_calls: u64,
    free_calls: u64,
    invalid_frees: u64,
}

impl LinearHeap {
    pub fn new(initial_size: usize, maximum_size: usize) -> Self {
        let maximum = maximum_size.min(u32::MAX as usize);
        let reserved = HEAP_ALIGNMENT as usize;
        let initial = initial_size.clamp(reserved * 2, maximum.max(reserved * 2));

        let mut free_blocks = BTreeMap::new();
        free_blocks.insert(reserved as Address, (initial - reserved) as u32);

        Self {
            memory: vec![0; initial],
            maximum: maximum.max(initial),
            free_blocks,
            live: BTreeMap::new(),
            malloc_calls: 0,
            free_calls: 0,
            invalid_frees: 0,
        }
    }

    /// Allocate a zeroed block. Returns [`NULL`] when the heap cannot grow.
    pub fn malloc(&mut self, size: usize) -> Address {
        self.malloc_calls += 1;

        let Some(rounded) = align_up(size.max(1)) else {
            return NULL;
        };

        let address = match self.first_fit(rounded) {
            Some(address) => address,
            None => {
                if !self.grow(rounded) {
                    return NULL;
                }
                match self.first_fit(rounded) {
                    Some(address) => address,
                    None => return NULL,
                }
            }
        };

        self.memory[address as usize..address as usize + rounded as usize].fill(0);
        self.live.insert(address, rounded);
        address
    }

    /// Release a live block. Returns false for null, unknown or already freed
    /// addresses.
    pub fn free(&mut self, address: Address) -> bool {
        self.free_calls += 1;

        let Some(length) = self.live.remove(&address) else {
            self.invalid_frees += 1;
            return false;
        };
        self.release(address, length);
        true
    }

    pub fn write(&mut self, address: Address, bytes: &[u8]) -> Result<()> {
        let range = self.checked_range(address, bytes.len())?;
        self.memory[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read(&self, address: Address, out: &mut [u8]) -> Result<()> {
        let range = self.checked_range(address, out.len())?;
        out.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    pub fn read_vec(&self, address: Address, length: usize) -> Result<Vec<u8>> {
        let range = self.checked_range(address, length)?;
        Ok(self.memory[range].to_vec())
    }

    /// Largest size the heap may grow to, in bytes.
    pub fn maximum(&self) -> usize {
        self.maximum
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            malloc_calls: self.malloc_calls,
            free_calls: self.free_calls,
            invalid_frees: self.invalid_frees,
            live_allocations: self.live.len(),
            bytes_in_use: self.live.values().map(|len| *len as usize).sum(),
            capacity: self.memory.len(),
        }
    }

    fn checked_range(&self, address: Address, length: usize) -> Result<std::ops::Range<usize>> {
        let start = address as usize;
        let end = start.checked_add(length);
        match end {
            Some(end) if address != NULL && end <= self.memory.len() => Ok(start..end),
            _ => Err(PipelineError::HeapAccess { address, length }),
        }
    }

    fn first_fit(&mut self, size: u32) -> Option<Address> {
        let (&start, &length) = self.free_blocks.iter().find(|(_, len)| **len >= size)?;
        self.free_blocks.remove(&start);
        if length > size {
            self.free_blocks.insert(start + size, length - size);
        }
        Some(start)
    }

    /// Extend memory so a block of `size` bytes fits at the end.
    fn grow(&mut self, size: u32) -> bool {
        let current = self.memory.len();

        // A free block touching the end of memory counts toward the request.
        let trailing = self
            .free_blocks
            .iter()
            .next_back()
            .filter(|(start, len)| **start as usize + **len as usize == current)
            .map_or(0, |(_, len)| *len as usize);

        let needed = current + (size as usize - trailing.min(size as usize));
        if needed > self.maximum {
            return false;
        }

        let target = (current * 2).clamp(needed, self.maximum);
        self.memory.resize(target, 0);
        self.release(current as Address, (target - current) as u32);
        true
    }

    fn release(&mut self, address: Address, length: u32) {
        let mut start = address;
        let mut length = length;

        if let Some((&prev_start, &prev_len)) = self.free_blocks.range(..start).next_back() {
            if prev_start + prev_len == start {
                self.free_blocks.remove(&prev_start);
                start = prev_start;
                length += prev_len;
            }
        }

        if let Some(next_len) = self.free_blocks.remove(&(start + length)) {
            length += next_len;
        }

        self.free_blocks.insert(start, length);
    }
}

fn align_up(size: usize) -> Option<u32> {
    let align = HEAP_ALIGNMENT as usize;
    let rounded = size.checked_add(align - 1)? / align * align;
    u32::try_from(rounded).ok()
}
