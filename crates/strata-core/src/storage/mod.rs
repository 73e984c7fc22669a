mod raw_buffer;

pub use raw_buffer::*;

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::ElementType;

/// Backing storage for a [`crate::TensorOrMemref`].
///
/// Shared between every view derived from it. Deallocation is a logical
/// flag: the bytes stay reserved until the last `Arc` drops, but no element
/// may be read or written once it is set.
#[derive(Debug)]
pub struct Buffer {
    storage: RwLock<RawBuffer>,
    element_size: usize,
    deallocated: AtomicBool,
}

impl Buffer {
    /// Allocates zeroed storage for `num_elements` values of `T`.
    pub fn allocate<T: ElementType>(num_elements: usize) -> Arc<Buffer> {
        let element_size = std::mem::size_of::<T>();
        let raw = RawBuffer::zeroed(num_elements * element_size, std::mem::align_of::<T>());
        Arc::new(Self {
            storage: RwLock::new(raw),
            element_size,
            deallocated: AtomicBool::new(false),
        })
    }

    /// Bytes of the element at `idx`.
    ///
    /// # Panics
    ///
    /// If the buffer has been deallocated or the element lies past the end.
    pub fn at(&self, idx: usize, element_size: usize) -> MappedRwLockReadGuard<'_, [u8]> {
        let range = self.element_range(idx, element_size);
        RwLockReadGuard::map(self.storage.read(), |raw| &raw.as_bytes()[range])
    }

    /// Mutable bytes of the element at `idx`.
    ///
    /// # Panics
    ///
    /// If the buffer has been deallocated or the element lies past the end.
    pub fn at_mut(&self, idx: usize, element_size: usize) -> MappedRwLockWriteGuard<'_, [u8]> {
        let range = self.element_range(idx, element_size);
        RwLockWriteGuard::map(self.storage.write(), |raw| &mut raw.as_bytes_mut()[range])
    }

    /// The whole allocation.
    ///
    /// # Panics
    ///
    /// If the buffer has been deallocated.
    pub fn bytes(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        assert!(!self.deallocated(), "accessing deallocated buffer");
        RwLockReadGuard::map(self.storage.read(), |raw| raw.as_bytes())
    }

    /// The whole allocation, mutably.
    ///
    /// # Panics
    ///
    /// If the buffer has been deallocated.
    pub fn bytes_mut(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        assert!(!self.deallocated(), "accessing deallocated buffer");
        RwLockWriteGuard::map(self.storage.write(), |raw| raw.as_bytes_mut())
    }

    fn element_range(&self, idx: usize, element_size: usize) -> Range<usize> {
        assert!(!self.deallocated(), "accessing deallocated buffer");
        let start = idx * element_size;
        let end = start + element_size;
        assert!(
            end <= self.byte_size(),
            "element {} of size {} is past the end of a {} byte buffer",
            idx,
            element_size,
            self.byte_size()
        );
        start..end
    }

    pub fn byte_size(&self) -> usize {
        self.storage.read().n_bytes()
    }

    /// Size of the element type the buffer was allocated for.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn num_elements(&self) -> usize {
        match self.element_size {
            0 => 0,
            size => self.byte_size() / size,
        }
    }

    pub fn deallocate(&self) {
        log::trace!("Deallocating buffer of {} bytes", self.byte_size());
        self.deallocated.store(true, Ordering::Release);
    }

    pub fn deallocated(&self) -> bool {
        self.deallocated.load(Ordering::Acquire)
    }

    /// Renders the buffer contents as `T`, eliding the middle of large
    /// buffers unless `full` is set.
    pub fn dump<T: ElementType>(&self, full: bool) -> String {
        if self.deallocated() {
            return "<deallocated>".to_string();
        }
        let bytes = self.bytes();
        let data: &[T] = bytemuck::cast_slice(&bytes[..]);
        let length = data.len().min(64);
        if full || data.len() <= 2 * length {
            format!("{:?}", data)
        } else {
            format!("{:?}...{:?}", &data[..length], &data[data.len() - length..])
        }
    }
}
