//! Buffers and their planes.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use std::sync::Arc;

use runtime::flags;
use runtime::id;

use crate::ffi;
use crate::memory::Region;
use crate::ptr::{atomic, volatile};

/// A set of buffers shared between the two ends of a link.
pub type BufferList = Arc<Vec<Arc<Buffer>>>;

const FLAG_MAPPED: u32 = 1 << 0;
const FLAG_QUEUED: u32 = 1 << 1;
const FLAG_ADDED: u32 = 1 << 2;

/// Metadata attached to a buffer.
#[derive(Debug)]
#[non_exhaustive]
pub struct Meta {
    pub ty: id::Meta,
    pub region: Region<[u8]>,
}

/// A single data plane of a buffer.
#[derive(Debug)]
#[non_exhaustive]
pub struct Data {
    pub ty: id::DataType,
    pub flags: flags::DataFlag,
    /// The plane memory. For mappable planes this is established during
    /// use-buffers and torn down with the buffer set.
    pub region: Region<[u8]>,
    /// The valid region descriptor, shared with the peer.
    pub chunk: Region<ffi::Chunk>,
    pub max_size: usize,
}

impl Data {
    /// Read the chunk descriptor.
    pub fn chunk(&self) -> ffi::Chunk {
        ffi::Chunk {
            offset: volatile!(self.chunk, offset).read(),
            size: volatile!(self.chunk, size).read(),
            stride: volatile!(self.chunk, stride).read(),
            flags: volatile!(self.chunk, flags).read(),
        }
    }

    /// Update the chunk descriptor.
    pub fn set_chunk(&self, offset: u32, size: u32, stride: i32) {
        volatile!(self.chunk, offset).write(offset);
        volatile!(self.chunk, size).write(size);
        volatile!(self.chunk, stride).write(stride);
    }

    /// The valid bytes of the plane.
    ///
    /// # Safety
    ///
    /// The caller must hold the buffer.
    pub unsafe fn valid_slice(&self) -> &[u8] {
        let chunk = self.chunk();
        let offset = (chunk.offset as usize).min(self.region.len());
        let size = (chunk.size as usize).min(self.region.len() - offset);

        // SAFETY: Bounds were clamped to the region, holding the buffer is
        // the caller's obligation.
        unsafe { &self.region.as_slice()[offset..offset + size] }
    }

    /// The whole writable plane.
    ///
    /// # Safety
    ///
    /// The caller must hold the buffer exclusively.
    pub unsafe fn writable_slice(&self) -> &mut [u8] {
        // SAFETY: Holding the buffer is the caller's obligation.
        unsafe { self.region.as_slice_mut() }
    }
}

/// A buffer of a port.
///
/// Shared by id between the user, the graph and the peer port. The flags word
/// tracks which side holds it: a buffer is either inside one of the two port
/// rings, or held by the user.
#[non_exhaustive]
pub struct Buffer {
    pub id: u32,
    flags: AtomicU32,
    pub metas: Vec<Meta>,
    pub datas: Vec<Data>,
    /// Busy counter metadata, when negotiated.
    pub busy: Option<Region<ffi::MetaBusy>>,
}

impl Buffer {
    /// Construct a new buffer.
    pub(crate) fn new(
        id: u32,
        metas: Vec<Meta>,
        datas: Vec<Data>,
        busy: Option<Region<ffi::MetaBusy>>,
        mapped: bool,
    ) -> Self {
        Self {
            id,
            flags: AtomicU32::new(if mapped { FLAG_MAPPED } else { 0 }),
            metas,
            datas,
            busy,
        }
    }

    /// The sum of valid bytes over all planes.
    pub fn size(&self) -> u64 {
        self.datas
            .iter()
            .map(|d| u64::from(d.chunk().size))
            .sum()
    }

    /// Assert the queued flag.
    ///
    /// Returns `false` when the buffer was already queued.
    pub(crate) fn set_queued(&self) -> bool {
        self.flags.fetch_or(FLAG_QUEUED, Ordering::AcqRel) & FLAG_QUEUED == 0
    }

    /// Clear the queued flag.
    pub(crate) fn clear_queued(&self) {
        self.flags.fetch_and(!FLAG_QUEUED, Ordering::AcqRel);
    }

    /// Test the queued flag.
    pub fn is_queued(&self) -> bool {
        self.flags.load(Ordering::Acquire) & FLAG_QUEUED != 0
    }

    /// Mark the buffer as announced to the user.
    pub(crate) fn set_added(&self) -> bool {
        self.flags.fetch_or(FLAG_ADDED, Ordering::AcqRel) & FLAG_ADDED == 0
    }

    pub(crate) fn was_mapped(&self) -> bool {
        self.flags.load(Ordering::Acquire) & FLAG_MAPPED != 0
    }

    /// Increment the busy counter, returning the previous value.
    pub(crate) fn busy_inc(&self) -> u32 {
        match &self.busy {
            Some(busy) => atomic!(busy, count).add(1),
            None => 0,
        }
    }

    /// Decrement the busy counter.
    pub(crate) fn busy_dec(&self) {
        if let Some(busy) = &self.busy {
            atomic!(busy, count).sub(1);
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("flags", &self.flags.load(Ordering::Relaxed))
            .field("datas", &self.datas.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::MemPool;

    pub(crate) fn make_buffers(pool: &mut MemPool, n: usize, size: usize) -> Vec<Arc<Buffer>> {
        let mut buffers = Vec::with_capacity(n);

        for id in 0..n {
            let meta = pool
                .alloc(
                    core::mem::size_of::<ffi::MetaBusy>() + core::mem::size_of::<ffi::Chunk>(),
                    MemPool::default_flags(),
                )
                .unwrap();

            let busy = meta.cast::<ffi::MetaBusy>().unwrap();
            pool.track(&meta);
            let chunk = meta
                .offset(core::mem::size_of::<ffi::MetaBusy>(), 8)
                .unwrap()
                .cast::<ffi::Chunk>()
                .unwrap();

            let data = pool.alloc(size, MemPool::default_flags()).unwrap();

            let plane = Data {
                ty: id::DataType::MEM_FD,
                flags: flags::DataFlag::READWRITE | flags::DataFlag::MAPPABLE,
                region: data,
                chunk,
                max_size: size,
            };

            buffers.push(Arc::new(Buffer::new(
                id as u32,
                Vec::new(),
                vec![plane],
                Some(busy),
                true,
            )));
        }

        buffers
    }

    #[test]
    fn queued_flag_is_single_owner() {
        let mut pool = MemPool::new();
        let buffers = make_buffers(&mut pool, 1, 4096);
        let b = &buffers[0];

        assert!(b.set_queued());
        assert!(!b.set_queued());
        b.clear_queued();
        assert!(b.set_queued());
    }

    #[test]
    fn chunk_round_trip() {
        let mut pool = MemPool::new();
        let buffers = make_buffers(&mut pool, 1, 4096);
        let d = &buffers[0].datas[0];

        d.set_chunk(0, 1024, 4);
        let chunk = d.chunk();
        assert_eq!(chunk.size, 1024);
        assert_eq!(chunk.stride, 4);
        assert_eq!(buffers[0].size(), 1024);
    }

    #[test]
    fn busy_counter() {
        let mut pool = MemPool::new();
        let buffers = make_buffers(&mut pool, 1, 64);
        let b = &buffers[0];

        assert_eq!(b.busy_inc(), 0);
        assert_eq!(b.busy_inc(), 1);
        b.busy_dec();
        b.busy_dec();
        assert_eq!(b.busy_inc(), 0);
    }
}
