//! Shared plain records.
//!
//! These layouts are mapped into memfd-backed memory and read concurrently by
//! the data thread, the main thread and the facades. No language-native
//! containers live inside them; every cross-actor field is accessed through
//! the [`crate::ptr`] helpers.

use core::ffi::c_char;
use core::fmt;

use runtime::consts::{
    ActivationCommand, ActivationStatus, MAX_SEGMENTS, PositionState,
};
use runtime::flags::{ChunkFlags, Status};

#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct Pad<T>(T);

impl<T> fmt::Debug for Pad<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pad")
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Fraction {
    pub num: u32,
    pub denom: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rectangle {
    pub width: u32,
    pub height: u32,
}

/// Counters gating when a node may run in the current cycle.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NodeActivationState {
    /// Current status, the result of the last process call.
    pub status: Status,
    /// Required number of signals before the node wakes.
    pub required: u32,
    /// Number of signals still pending this cycle.
    pub pending: u32,
}

/// A segment converts a running time to a stream position.
///
/// The segment position is valid when the current running time is between
/// start and start + duration. The position is then calculated as:
/// (running time - start) * rate + position.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IoSegment {
    pub version: u32,
    pub flags: u32,
    /// Value of the running time when this segment activates. Can be in the
    /// future for pending changes.
    pub start: u64,
    /// Duration after which this segment becomes invalid, in running time.
    /// Zero extends the segment to the next one.
    pub duration: u64,
    /// Overall rate of the segment, negative for backwards time reporting.
    pub rate: f64,
    /// The stream position when the running time equals start.
    pub position: u64,
}

impl IoSegment {
    pub(crate) const EMPTY: Self = Self {
        version: 0,
        flags: 0,
        start: 0,
        duration: 0,
        rate: 1.0,
        position: 0,
    };
}

/// The size of the video in the current cycle.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IoVideoSize {
    pub flags: u32,
    /// Video stride in bytes.
    pub stride: u32,
    pub size: Rectangle,
    /// The minimum framerate; the cycle duration is always smaller so there
    /// is at most one video frame per cycle.
    pub framerate: Fraction,
    pub(crate) _pad: Pad<[u32; 4]>,
}

/// Absolute time reporting of the driver clock.
///
/// The driver updates these fields before signaling the start of a graph
/// cycle; every other node treats them as read only.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IoClock {
    pub flags: u32,
    /// Unique clock id, assigned when the driver is registered.
    pub id: u32,
    /// Clock name, unique per clock so nodes can check if they share one.
    pub name: [c_char; 64],
    /// Time in nanoseconds against the monotonic clock.
    pub nsec: u64,
    /// Rate for position, duration and delay.
    pub rate: Fraction,
    /// Current position in samples at `rate`.
    pub position: u64,
    /// Duration of the current cycle in samples at `rate`.
    pub duration: u64,
    /// Delay between position and hardware in samples at `rate`.
    pub delay: i64,
    /// Rate difference between the clock and monotonic time.
    pub rate_diff: f64,
    /// Estimated next wakeup time in nanoseconds.
    pub next_nsec: u64,
    /// Target rate of the next cycle.
    pub target_rate: Fraction,
    /// Target duration of the next cycle.
    pub target_duration: u64,
    pub cycle: u32,
    pub xrun: u64,
}

/// The transport position, owned by the driver.
///
/// The clock carries the raw time of the driving node; the segments convert
/// it to stream time. All nodes of a scheduling group read the same position
/// record.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IoPosition {
    /// Clock position of the driver, always valid and read only.
    pub clock: IoClock,
    /// Size of the video in the current cycle.
    pub video: IoVideoSize,
    /// An offset to subtract from the clock position to get a running time:
    /// the time the transport has been in the RUNNING state.
    pub offset: i64,
    pub state: PositionState,
    pub n_segments: u32,
    pub segments: [IoSegment; MAX_SEGMENTS],
}

/// IO area to exchange buffers between a node and the graph.
///
/// If status is NEED_DATA, the other side should recycle the buffer in
/// `buffer_id` if possible and place a new buffer id there. If status is
/// HAVE_DATA, the buffer in `buffer_id` should be consumed and the status set
/// back to NEED_DATA when new data is wanted.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IoBuffers {
    pub status: Status,
    pub buffer_id: u32,
}

/// Rate matching information between a follower and its driver.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IoRateMatch {
    /// Extra delay in samples reported by the resampler.
    pub delay: u32,
    /// The number of samples wanted in the next cycle.
    pub size: u32,
    /// The rate correction to apply.
    pub rate: f64,
    pub flags: u32,
}

/// The valid region of a data plane.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Offset of the valid data in the plane.
    pub offset: u32,
    /// Size of the valid data.
    pub size: u32,
    /// Stride of the valid data, 0 when unknown.
    pub stride: i32,
    pub flags: ChunkFlags,
}

/// Busy counter metadata on a buffer.
///
/// Incremented when the consumer side hands the buffer to the user,
/// decremented when it comes back.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MetaBusy {
    pub flags: u32,
    pub count: u32,
}

/// The shared record coordinating one graph cycle.
///
/// Mapped from a memfd so it can be shared across processes. The
/// `state[0].pending` decrement is the edge trigger that wakes a node; all
/// other cross-actor fields are written by exactly one role.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NodeActivation {
    pub status: ActivationStatus,
    /// A transport sync is pending on this node.
    pub pending_sync: u32,
    /// A new position is pending on this node.
    pub pending_new_pos: u32,
    /// One current state and one next state.
    pub state: [NodeActivationState; 2],
    /// Time at which the node was triggered as ready to start processing.
    pub signal_time: u64,
    /// Time at which processing actually started.
    pub awake_time: u64,
    /// Time at which processing completed.
    pub finish_time: u64,
    /// Previous time at which the node was triggered.
    pub prev_signal_time: u64,
    pub prev_awake_time: u64,
    pub prev_finish_time: u64,
    /// Reposition info, applied when the driver's reposition owner has this
    /// node id.
    pub reposition: IoSegment,
    /// Extra segment info, merged when a segment owner has this node id.
    pub segment: IoSegment,
    /// Owners for each extra segment info; nodes CAS their id in here.
    pub segment_owner: [u32; 2],
    pub(crate) _pad: Pad<[u32; 7]>,
    /// The current driver id as seen by this node.
    pub active_driver_id: u32,
    /// Contains the current position and segment info, owned by the driver.
    pub position: IoPosition,
    /// Nanoseconds after which a starting transport stops waiting for slow
    /// sync clients.
    pub sync_timeout: u64,
    /// Number of cycles left before the sync timeout trips.
    pub sync_left: u64,
    /// CPU load averaged over short, medium and long windows.
    pub cpu_load: [f32; 3],
    /// Number of xruns observed on this node.
    pub xrun_count: u32,
    /// Time of the last xrun in microseconds.
    pub xrun_time: u64,
    /// Delay of the last xrun in microseconds.
    pub xrun_delay: u64,
    /// Largest xrun delay in microseconds.
    pub max_delay: u64,
    /// Next transport command.
    pub command: ActivationCommand,
    /// Owner id with new reposition info, the last one to update wins.
    pub reposition_owner: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem;

    #[test]
    fn activation_is_plain() {
        // The record must stay mappable: no destructor, stable layout.
        assert!(!mem::needs_drop::<NodeActivation>());
        assert_eq!(mem::align_of::<NodeActivation>() % mem::align_of::<u64>(), 0);
    }

    #[test]
    fn io_records_are_plain() {
        assert!(!mem::needs_drop::<IoPosition>());
        assert!(!mem::needs_drop::<IoBuffers>());
        assert!(!mem::needs_drop::<IoRateMatch>());
        assert_eq!(mem::size_of::<IoBuffers>(), 8);
        assert_eq!(mem::size_of::<Chunk>(), 16);
    }
}
