use std::alloc::Layout;

/// Zero-initialised heap allocation with a caller-chosen alignment.
#[derive(Debug, PartialEq, Eq)]
pub struct RawBuffer(*mut u8, Layout);

// The allocation is uniquely owned; shared access goes through `Buffer`'s lock.
unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    pub fn zeroed(size: usize, alignment: usize) -> Self {
        let layout = match Layout::from_size_align(size, alignment) {
            Ok(layout) => layout,
            Err(e) => panic!("Invalid layout for {} bytes at alignment {}: {}", size, alignment, e),
        };
        let data = if size == 0 {
            // Non-null and aligned; never dereferenced.
            layout.align() as *mut u8
        } else {
            let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
            if ptr.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            ptr
        };
        log::trace!("Allocated {} bytes at {:p}", size, data);
        Self(data, layout)
    }

    pub fn into_raw_parts(&self) -> (*mut u8, Layout) {
        (self.0, self.1)
    }

    pub fn n_bytes(&self) -> usize {
        self.1.size()
    }

    pub fn alignment(&self) -> usize {
        self.1.align()
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.0, self.1.size()) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.0, self.1.size()) }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if self.1.size() > 0 {
            log::trace!("Dropping {} bytes at {:p}", self.1.size(), self.0);
            unsafe { std::alloc::dealloc(self.0, self.1) }
        }
    }
}
