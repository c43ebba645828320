//! Shared memory blocks and typed views into them.
//!
//! Activation records, io areas and buffer planes live in memfd-backed blocks
//! so they stay mappable across process boundaries. A [`Region`] is a typed
//! window into a block; regions are reference counted against their file so
//! the mapping outlives every user.

use core::any;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;
use core::slice;
use core::sync::atomic::{AtomicBool, Ordering};

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use anyhow::{Result, bail, ensure};
use runtime::flags;
use slab::Slab;
use tracing::Level;

static MLOCK_WARNED: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
#[allow(unused)]
pub(crate) struct File {
    fd: OwnedFd,
    flags: flags::MemBlock,
    size: usize,
    users: u32,
    ptr: NonNull<u8>,
    locked: bool,
}

// SAFETY: The raw mapping is plain shared memory; access discipline is
// enforced by the field-wise accessors of `crate::ptr`.
unsafe impl Send for File {}

impl Drop for File {
    fn drop(&mut self) {
        // SAFETY: The pointer was produced by mmap with this size.
        unsafe {
            if self.locked {
                libc::munlock(self.ptr.as_ptr().cast(), self.size);
            }

            libc::munmap(self.ptr.as_ptr().cast(), self.size);
        }
    }
}

/// A region of memory inside a mapped block.
#[must_use = "A region must be freed against its pool to release the mapping"]
pub struct Region<T>
where
    T: ?Sized,
{
    file: usize,
    size: usize,
    ptr: NonNull<()>,
    _marker: PhantomData<*mut T>,
}

// SAFETY: Regions point into shared mappings which are valid for any thread;
// all access goes through volatile or atomic field projections.
unsafe impl<T> Send for Region<T> where T: ?Sized {}
unsafe impl<T> Sync for Region<T> where T: ?Sized {}

impl Region<[u8]> {
    /// Add the given offset aligned to the specified alignment to the region.
    pub fn offset(&self, offset: usize, align: usize) -> Result<Self> {
        let offset = offset.next_multiple_of(align);

        if offset > self.size {
            bail!("Offset {offset} is larger than region size {}", self.size);
        }

        let ptr = unsafe {
            let ptr = self.as_ptr().wrapping_add(offset);
            NonNull::new_unchecked(ptr.cast_mut())
        };

        Ok(Region {
            file: self.file,
            size: self.size - offset,
            ptr: ptr.cast(),
            _marker: PhantomData,
        })
    }

    /// Limit the size of the region.
    pub fn size(&self, size: usize) -> Result<Self> {
        if size > self.size {
            bail!(
                "Requested size {size} is larger than region size {}",
                self.size
            );
        }

        Ok(Region {
            file: self.file,
            size,
            ptr: self.ptr,
            _marker: PhantomData,
        })
    }

    /// Cast the region to a typed view.
    #[inline]
    pub fn cast<U>(&self) -> Result<Region<U>> {
        const {
            assert!(mem::size_of::<U>() > 0);
        }

        ensure!(
            self.ptr.as_ptr().addr() % mem::align_of::<U>() == 0,
            "Region<{}> pointer {:p} must be aligned to 0x{:x}",
            any::type_name::<U>(),
            self.ptr.as_ptr(),
            mem::align_of::<U>()
        );

        ensure!(
            self.size >= mem::size_of::<U>(),
            "Region<{}> needs {} bytes, region holds {}",
            any::type_name::<U>(),
            mem::size_of::<U>(),
            self.size
        );

        Ok(Region {
            file: self.file,
            size: mem::size_of::<U>(),
            ptr: self.ptr.cast(),
            _marker: PhantomData,
        })
    }

    /// Get the length of the region in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Test if the region is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Get a pointer to the memory region.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.cast::<u8>().as_ptr().cast_const()
    }

    /// Get a mutable pointer to the memory region.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.cast::<u8>().as_ptr()
    }

    /// Coerce the memory region into a byte slice.
    ///
    /// # Safety
    ///
    /// The caller must hold the buffer this region belongs to, so no other
    /// actor writes it concurrently.
    #[inline]
    pub unsafe fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    /// Coerce the memory region into a mutable byte slice.
    ///
    /// # Safety
    ///
    /// The caller must hold the buffer this region belongs to exclusively.
    #[inline]
    pub unsafe fn as_slice_mut(&self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), self.size) }
    }
}

impl<T> Region<T> {
    /// Get a pointer to the record.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.cast::<T>().as_ptr().cast_const()
    }

    /// Get a mutable pointer to the record.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut T {
        self.ptr.cast::<T>().as_ptr()
    }

    /// Erase the type signature of the region.
    #[inline]
    pub fn erase(self) -> Region<()> {
        Region {
            file: self.file,
            size: self.size,
            ptr: self.ptr.cast(),
            _marker: PhantomData,
        }
    }

    /// View the record as its underlying bytes.
    #[inline]
    pub fn as_bytes(&self) -> Region<[u8]> {
        Region {
            file: self.file,
            size: mem::size_of::<T>(),
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Region<T>
where
    T: ?Sized,
{
    #[inline]
    fn clone(&self) -> Self {
        Self {
            file: self.file,
            size: self.size,
            ptr: self.ptr,
            _marker: self._marker,
        }
    }
}

impl<T> fmt::Debug for Region<T>
where
    T: ?Sized,
{
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("file", &self.file)
            .field("size", &self.size)
            .field("ptr", &self.ptr)
            .finish()
    }
}

/// Allocator of memfd-backed shared blocks.
#[derive(Debug)]
pub struct MemPool {
    files: Slab<File>,
    allow_mlock: bool,
    warn_mlock: bool,
}

impl MemPool {
    /// Construct a new pool.
    pub fn new() -> Self {
        Self {
            files: Slab::new(),
            allow_mlock: true,
            warn_mlock: false,
        }
    }

    /// Configure the memory locking policy.
    pub fn set_mlock(&mut self, allow: bool, warn: bool) {
        self.allow_mlock = allow;
        self.warn_mlock = warn;
    }

    /// Allocate a new block and return a region covering all of it.
    #[tracing::instrument(skip(self), ret(level = Level::TRACE))]
    pub fn alloc(&mut self, size: usize, flags: flags::MemBlock) -> Result<Region<[u8]>> {
        let size = size.next_multiple_of(page_size());

        // SAFETY: We're just using c-apis as intended.
        let fd = unsafe {
            let fd = libc::memfd_create(c"flowmix-mem".as_ptr(), libc::MFD_CLOEXEC);

            if fd == -1 {
                bail!(io::Error::last_os_error());
            }

            let fd = OwnedFd::from_raw_fd(fd);

            if libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) == -1 {
                bail!(io::Error::last_os_error());
            }

            fd
        };

        let mut prot = 0;

        if flags.contains(flags::MemBlock::READABLE) {
            prot |= libc::PROT_READ;
        }

        if flags.contains(flags::MemBlock::WRITABLE) {
            prot |= libc::PROT_WRITE;
        }

        // SAFETY: We're just using c-apis as intended.
        let ptr = unsafe {
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                size,
                prot,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            );

            if ptr == libc::MAP_FAILED {
                bail!(io::Error::last_os_error());
            }

            NonNull::new_unchecked(ptr.cast::<u8>())
        };

        let locked = self.allow_mlock && self.mlock(ptr, size);

        let file = self.files.insert(File {
            fd,
            flags,
            size,
            users: 1,
            ptr,
            locked,
        });

        Ok(Region {
            file,
            size,
            ptr: ptr.cast(),
            _marker: PhantomData,
        })
    }

    fn mlock(&self, ptr: NonNull<u8>, size: usize) -> bool {
        // SAFETY: The range was just mapped.
        let res = unsafe { libc::mlock(ptr.as_ptr().cast(), size) };

        if res == 0 {
            return true;
        }

        let error = io::Error::last_os_error();

        if self.warn_mlock && !MLOCK_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                ?error,
                size,
                "Failed to lock memory, consider raising the memlock limit"
            );
        } else {
            tracing::debug!(?error, size, "Failed to lock memory");
        }

        false
    }

    /// Add a user to the block behind a region.
    pub fn track<T>(&mut self, region: &Region<T>)
    where
        T: ?Sized,
    {
        if let Some(file) = self.files.get_mut(region.file) {
            file.users += 1;
        }
    }

    /// Drop a region, unmapping the block when the last user is gone.
    #[tracing::instrument(skip(self, region))]
    pub fn free<T>(&mut self, region: Region<T>)
    where
        T: ?Sized,
    {
        let Some(file) = self.files.get_mut(region.file) else {
            return;
        };

        file.users -= 1;

        if file.users == 0 {
            self.files.remove(region.file);
        }
    }

    /// The readable/writable flags the pool allocates with by default.
    pub fn default_flags() -> flags::MemBlock {
        flags::MemBlock::READWRITE | flags::MemBlock::MAP
    }
}

impl Default for MemPool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    if n <= 0 { 4096 } else { n as usize }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_write() {
        let mut pool = MemPool::new();
        let region = pool.alloc(128, MemPool::default_flags()).unwrap();

        // SAFETY: The region was just allocated and is exclusively held.
        unsafe {
            region.as_slice_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
            assert_eq!(&region.as_slice()[..4], &[1, 2, 3, 4]);
        }

        pool.free(region);
    }

    #[test]
    fn regions_share_the_block() {
        let mut pool = MemPool::new();
        let region = pool.alloc(4096, MemPool::default_flags()).unwrap();

        let second = region.offset(128, 8).unwrap().size(64).unwrap();
        pool.track(&second);

        pool.free(region);

        // The block is still alive through the second region.
        // SAFETY: Exclusively held.
        unsafe {
            second.as_slice_mut()[0] = 7;
            assert_eq!(second.as_slice()[0], 7);
        }

        pool.free(second);
    }

    #[test]
    fn cast_checks_size_and_alignment() {
        let mut pool = MemPool::new();
        let region = pool.alloc(64, MemPool::default_flags()).unwrap();

        assert!(region.cast::<u64>().is_ok());
        assert!(region.offset(1, 1).unwrap().cast::<u64>().is_err());

        pool.free(region);
    }
}
