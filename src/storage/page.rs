//! Page image: the byte-for-byte identical layout used on disk and in cache
//! (§3, §6). Grounded on the teacher's `buffer::page_cache::PageBuffer`, with
//! the backing array swapped for a runtime-sized allocation so `page_size`
//! can be a config value instead of a compile-time constant (§6).

use crate::common::PageId;

/// Raw page data plus a checksum helper. Identical on disk and in a frame.
#[derive(Clone)]
pub struct PageBuffer {
    data: Box<[u8]>,
}

impl PageBuffer {
    /// Create a new zeroed page buffer of `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    /// Wrap externally-read bytes (must be exactly `page_size` long).
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Zero the entire page (used when allocating a fresh page).
    pub fn zero(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
    }

    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    pub fn copy_from(&mut self, other: &PageBuffer) {
        self.data.copy_from_slice(&other.data);
    }

    /// CRC32 checksum of the page image, used to detect on-disk corruption
    /// (invariants J1-J6, §7 `Corruption`).
    #[inline]
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.data)
    }

    pub fn verify_checksum(&self, expected: u32) -> bool {
        self.checksum() == expected
    }
}

/// A page on disk: identifier plus its byte image, used only at the
/// DiskManager boundary (frames keep the image inline, see
/// `buffer::frame::Frame`).
pub struct DiskPage {
    pub id: PageId,
    pub buffer: PageBuffer,
}

impl DiskPage {
    pub fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            buffer: PageBuffer::new(page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_on_creation() {
        let page = PageBuffer::new(4096);
        assert_eq!(page.len(), 4096);
        assert!(page.is_zeroed());
    }

    #[test]
    fn checksum_changes_with_content() {
        let mut page = PageBuffer::new(4096);
        let c0 = page.checksum();
        page.data_mut()[0] = 7;
        assert_ne!(c0, page.checksum());
        assert!(page.verify_checksum(page.checksum()));
    }
}
