//! Well-known constants of the graph runtime.

/// The largest number of buffers a port can carry.
pub const MAX_BUFFERS: usize = 64;

/// The default duration of one cycle in frames.
pub const DEFAULT_QUANTUM: u64 = 1024;

/// The default clock rate in frames per second.
pub const DEFAULT_RATE: u32 = 48000;

/// The default transport sync timeout in nanoseconds.
pub const DEFAULT_SYNC_TIMEOUT: u64 = 5_000_000_000;

/// The number of segments visible in the future of a position.
pub const MAX_SEGMENTS: usize = 8;

pod::macros::id! {
    /// The direction of a port.
    pub struct Direction(u32) {
        UNKNOWN;
        INPUT = 0;
        OUTPUT = 1;
    }

    /// Where a node stands in the current graph cycle.
    pub struct ActivationStatus(u32) {
        UNKNOWN;
        NOT_TRIGGERED = 0;
        TRIGGERED = 1;
        AWAKE = 2;
        FINISHED = 3;
        INACTIVE = 4;
    }

    /// A transport command written into the activation record.
    pub struct ActivationCommand(u32) {
        UNKNOWN;
        NONE = 0;
        START = 1;
        STOP = 2;
    }

    /// The state of the transport position.
    pub struct PositionState(u32) {
        UNKNOWN;
        STOPPED = 0;
        STARTING = 1;
        RUNNING = 2;
    }

    /// The lifecycle state of a node.
    pub struct NodeState(u32) {
        UNKNOWN;
        ERROR = 0;
        CREATING = 1;
        SUSPENDED = 2;
        IDLE = 3;
        PAUSED = 4;
        RUNNING = 5;
    }

    /// The lifecycle state of a stream facade.
    pub struct StreamState(u32) {
        UNKNOWN;
        ERROR = 0;
        UNCONNECTED = 1;
        CONNECTING = 2;
        PAUSED = 3;
        STREAMING = 4;
    }
}

impl Direction {
    /// The opposite direction.
    #[inline]
    pub fn reverse(self) -> Self {
        match self {
            Direction::INPUT => Direction::OUTPUT,
            Direction::OUTPUT => Direction::INPUT,
            other => other,
        }
    }
}

impl NodeState {
    /// Human readable name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::ERROR => "error",
            NodeState::CREATING => "creating",
            NodeState::SUSPENDED => "suspended",
            NodeState::IDLE => "idle",
            NodeState::PAUSED => "paused",
            NodeState::RUNNING => "running",
            _ => "unknown",
        }
    }
}

impl ActivationStatus {
    /// Human readable name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivationStatus::NOT_TRIGGERED => "not-triggered",
            ActivationStatus::TRIGGERED => "triggered",
            ActivationStatus::AWAKE => "awake",
            ActivationStatus::FINISHED => "finished",
            ActivationStatus::INACTIVE => "inactive",
            _ => "unknown",
        }
    }
}
