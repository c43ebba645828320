pod::macros::flags! {
    /// The flags a stream is created with.
    pub struct StreamFlags(u32) {
        NONE;
        /// Try to automatically connect this stream.
        AUTOCONNECT = 1 << 0;
        /// Start the stream inactive; it needs to be activated explicitly.
        INACTIVE = 1 << 1;
        /// mmap the buffer planes that are marked mappable.
        MAP_BUFFERS = 1 << 2;
        /// Be a driver.
        DRIVER = 1 << 3;
        /// Call process from the data thread. Only real-time safe
        /// functions may be used in the process callback.
        RT_PROCESS = 1 << 4;
        /// Require exclusive access to the target.
        EXCLUSIVE = 1 << 6;
        /// Don't try to reconnect this stream when the target is removed.
        DONT_RECONNECT = 1 << 7;
        /// The stream will allocate buffer memory and the peer mirrors it.
        ALLOC_BUFFERS = 1 << 8;
        /// The stream is not scheduled automatically; `trigger_process`
        /// starts a cycle.
        TRIGGER = 1 << 9;
        /// Buffers are not dequeued/queued from the process callback.
        ASYNC = 1 << 10;
        /// Call process as soon as there is a buffer to dequeue.
        EARLY_PROCESS = 1 << 11;
    }

    /// The status of a processing cycle on a port or node.
    pub struct Status(i32) {
        OK;
        /// The node consumed its input and wants more.
        NEED_DATA = 1 << 0;
        /// The node produced output.
        HAVE_DATA = 1 << 1;
        /// An error occurred on a port.
        STOPPED = 1 << 2;
        /// The node used queued data to drain.
        DRAINED = 1 << 3;
    }

    /// Flags on a single buffer data plane.
    pub struct DataFlag(u32) {
        NONE;
        /// Data is readable.
        READABLE = 1 << 0;
        /// Data is writable.
        WRITABLE = 1 << 1;
        /// Data pointer can change per chunk.
        DYNAMIC = 1 << 2;
        /// Data may be mapped with plain mmap.
        MAPPABLE = 1 << 3;
    }

    /// Availability flags of one parameter id.
    pub struct ParamFlag(u32) {
        NONE;
        /// Toggled to signal an update even when read/write do not change.
        SERIAL = 1 << 0;
        /// The parameter can be enumerated.
        READ = 1 << 1;
        /// The parameter can be set.
        WRITE = 1 << 2;
    }

    /// Flags on a parameter blob.
    pub struct ParamBlobFlag(u32) {
        NONE;
        /// The blob survives a bulk clear.
        LOCKED = 1 << 0;
    }

    /// Flags of a memory block.
    pub struct MemBlock(u32) {
        NONE;
        /// Memory is readable.
        READABLE = 1 << 0;
        /// Memory is writable.
        WRITABLE = 1 << 1;
        /// Seal the fd after allocating.
        SEAL = 1 << 2;
        /// Map the whole block eagerly.
        MAP = 1 << 3;
    }

    /// Flags of a memory mapping.
    pub struct MemMap(u32) {
        NONE;
        /// Map in read mode.
        READ = 1 << 0;
        /// Map in write mode.
        WRITE = 1 << 1;
        /// Lock the mapping into RAM.
        LOCKED = 1 << 4;
    }

    /// Flags on the valid region of a data plane.
    pub struct ChunkFlags(u32) {
        NONE;
        /// Chunk data is corrupted in some way.
        CORRUPTED = 1 << 0;
        /// Chunk data is media-neutral (silence, black).
        EMPTY = 1 << 1;
    }

    /// Static flags of a port.
    pub struct PortFlags(u32) {
        NONE;
        /// The port can be removed.
        REMOVABLE = 1 << 0;
        /// Processing on the port is optional.
        OPTIONAL = 1 << 1;
        /// The port can allocate buffer data.
        CAN_ALLOC_BUFFERS = 1 << 2;
        /// Output buffers are timestamped against a live clock.
        LIVE = 1 << 5;
        /// Data was not created on this port and will not leave it.
        TERMINAL = 1 << 7;
    }

    /// Which parts of the node info changed since the last emit.
    pub struct NodeChangeMask(u64) {
        NONE;
        FLAGS = 1 << 0;
        PROPS = 1 << 1;
        PARAMS = 1 << 2;
        STATE = 1 << 3;
    }

    /// Which parts of the port info changed since the last emit.
    pub struct PortChangeMask(u64) {
        NONE;
        FLAGS = 1 << 0;
        RATE = 1 << 1;
        PROPS = 1 << 2;
        PARAMS = 1 << 3;
    }

    /// Static flags of a node implementation.
    pub struct NodeFlags(u64) {
        NONE;
        /// The node can do real-time processing.
        RT = 1 << 0;
        /// The node needs configuration before it can be started.
        NEED_CONFIGURE = 1 << 5;
        /// The implementation computes and emits its own latency params.
        CUSTOM_LATENCY = 1 << 7;
    }
}

impl ParamFlag {
    /// Read and write flags combined.
    pub const READWRITE: Self = Self::from_raw(Self::READ.into_raw() | Self::WRITE.into_raw());
}

impl MemBlock {
    pub const READWRITE: Self = Self::from_raw(Self::READABLE.into_raw() | Self::WRITABLE.into_raw());
}

impl MemMap {
    pub const READWRITE: Self = Self::from_raw(Self::READ.into_raw() | Self::WRITE.into_raw());
}

impl DataFlag {
    pub const READWRITE: Self = Self::from_raw(Self::READABLE.into_raw() | Self::WRITABLE.into_raw());
}

impl Status {
    /// Convert a raw process status into flags, treating negative values as
    /// empty.
    #[inline]
    pub fn from_status(status: i32) -> Self {
        if status < 0 {
            Self::OK
        } else {
            Self::from_raw(status)
        }
    }
}
