use std::fmt;

use tracing::trace;

use super::module::{Address, NULL, NativeModule};
use crate::error::{PipelineError, Result};

/// Which side of the boundary allocated a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOwner {
    /// Allocated by the host through `malloc`.
    Caller,
    /// Allocated inside the native module and handed to the host.
    Native,
}

/// Scoped handle to a block of foreign heap memory.
///
/// The block is released exactly once, when the handle drops, through the
/// free function matching its owner.
pub struct ForeignHeapRegion<'m> {
    module: &'m dyn NativeModule,
    address: Address,
    length: usize,
    owner: RegionOwner,
}

impl<'m> ForeignHeapRegion<'m> {
    /// Allocate `length` bytes on the caller's behalf.
    pub fn allocate(module: &'m dyn NativeModule, length: usize) -> Result<Self> {
        let address = module.malloc(length);
        if address == NULL {
            return Err(PipelineError::ForeignAllocation { size: length });
        }
        trace!("Allocated {} bytes at {:#x}", length, address);

        Ok(Self {
            module,
            address,
            length,
            owner: RegionOwner::Caller,
        })
    }

    /// Allocate a region sized to `bytes` and copy them in.
    pub fn allocate_with(module: &'m dyn NativeModule, bytes: &[u8]) -> Result<Self> {
        let region = Self::allocate(module, bytes.len())?;
        module.write(region.address, bytes)?;
        Ok(region)
    }

    /// Take ownership of a block the native side returned. Null yields `None`.
    pub fn adopt(module: &'m dyn NativeModule, address: Address, length: usize) -> Option<Self> {
        (address != NULL).then_some(Self {
            module,
            address,
            length,
            owner: RegionOwner::Native,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn owner(&self) -> RegionOwner {
        self.owner
    }

    /// Set the readable length once the native side has reported it.
    pub fn set_length(&mut self, length: usize) {
        self.length = length;
    }

    pub fn read_u32(&self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_into(&mut raw)?;
        Ok(u32::from_ne_bytes(raw))
    }

    /// Copy `count` f32 values out of the region.
    pub fn read_f32s(&self, count: usize) -> Result<Vec<f32>> {
        let mut values = vec![0f32; count];
        self.read_into(bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }

    /// Copy `count` u16 values out of the region.
    pub fn read_u16s(&self, count: usize) -> Result<Vec<u16>> {
        let mut values = vec![0u16; count];
        self.read_into(bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }

    fn read_into(&self, out: &mut [u8]) -> Result<()> {
        if out.len() > self.length {
            return Err(PipelineError::HeapAccess {
                address: self.address,
                length: out.len(),
            });
        }
        self.module.read(self.address, out)
    }
}

impl Drop for ForeignHeapRegion<'_> {
    fn drop(&mut self) {
        match self.owner {
            RegionOwner::Caller => self.module.free(self.address),
            RegionOwner::Native => self.module.free_owned(self.address),
        }
        trace!("Released {:?} region at {:#x}", self.owner, self.address);
    }
}

impl fmt::Debug for ForeignHeapRegion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignHeapRegion")
            .field("address", &self.address)
            .field("length", &self.length)
            .field("owner", &self.owner)
            .finish()
    }
}
