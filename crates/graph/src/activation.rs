//! The shared activation record of a node.

use std::sync::Arc;

use anyhow::Result;
use runtime::EventFd;
use runtime::consts::{ActivationStatus, DEFAULT_SYNC_TIMEOUT, PositionState};

use crate::ffi;
use crate::memory::{MemPool, Region};
use crate::ptr::{atomic, volatile};

/// A node's activation record together with its wakeup fd.
///
/// Cloning shares the same region and fd; a clone placed on a peer's target
/// list is how that peer wakes this node.
#[derive(Debug, Clone)]
pub struct Activation {
    region: Region<ffi::NodeActivation>,
    event: Arc<EventFd>,
}

impl Activation {
    /// Allocate a fresh activation record from the pool.
    pub fn allocate(pool: &mut MemPool, quantum: u64, rate: u32) -> Result<Self> {
        let region = pool
            .alloc(
                core::mem::size_of::<ffi::NodeActivation>(),
                MemPool::default_flags(),
            )?
            .cast::<ffi::NodeActivation>()?;

        let event = Arc::new(EventFd::new(0)?);

        let this = Self { region, event };
        this.init(quantum, rate);
        Ok(this)
    }

    fn init(&self, quantum: u64, rate: u32) {
        let a = &self.region;

        atomic!(a, status).store(ActivationStatus::INACTIVE);
        volatile!(a, pending_sync).write(0);
        volatile!(a, pending_new_pos).write(0);
        atomic!(a, state[0].required).store(0);
        atomic!(a, state[0].pending).store(0);
        volatile!(a, sync_timeout).write(DEFAULT_SYNC_TIMEOUT);
        volatile!(a, sync_left).write(0);
        volatile!(a, segment_owner[0]).write(0);
        volatile!(a, segment_owner[1]).write(0);
        atomic!(a, command).store(runtime::consts::ActivationCommand::NONE);
        atomic!(a, reposition_owner).store(0);

        volatile!(a, reposition).write(ffi::IoSegment::EMPTY);
        volatile!(a, segment).write(ffi::IoSegment::EMPTY);

        volatile!(a, position.clock.rate).write(ffi::Fraction { num: 1, denom: rate });
        volatile!(a, position.clock.duration).write(quantum);
        volatile!(a, position.clock.target_rate).write(ffi::Fraction { num: 1, denom: rate });
        volatile!(a, position.clock.target_duration).write(quantum);
        volatile!(a, position.clock.position).write(0);
        atomic!(a, position.state).store(PositionState::STOPPED);
        volatile!(a, position.n_segments).write(1);
        volatile!(a, position.offset).write(0);
        volatile!(a, position.segments[0]).write(ffi::IoSegment::EMPTY);
    }

    /// The shared record.
    #[inline]
    pub fn region(&self) -> &Region<ffi::NodeActivation> {
        &self.region
    }

    /// The wakeup fd of the node.
    #[inline]
    pub fn event(&self) -> &Arc<EventFd> {
        &self.event
    }

    /// The current status.
    #[inline]
    pub fn status(&self) -> ActivationStatus {
        atomic!(self.region, status).load()
    }

    /// Store a new status.
    #[inline]
    pub fn set_status(&self, status: ActivationStatus) {
        atomic!(self.region, status).store(status);
    }

    /// Reset the pending counter to its steady-state value.
    #[inline]
    pub fn reset_pending(&self) {
        let required = atomic!(self.region, state[0].required).load();
        atomic!(self.region, state[0].pending).store(required);
    }

    /// Account one more edge that must trigger this node per cycle.
    pub fn add_required(&self) {
        atomic!(self.region, state[0].required).add(1);
        atomic!(self.region, state[0].pending).add(1);
    }

    /// Remove one edge.
    pub fn remove_required(&self) {
        atomic!(self.region, state[0].required).sub(1);
        atomic!(self.region, state[0].pending).sub(1);
    }

    /// Decrement the pending counter, waking the node when it reaches zero.
    ///
    /// Returns `true` when the node was signalled.
    pub fn trigger(&self, nsec: u64) -> bool {
        let pending = atomic!(self.region, state[0].pending).sub(1);

        if pending != 1 {
            return false;
        }

        self.set_status(ActivationStatus::TRIGGERED);
        volatile!(self.region, signal_time).write(nsec);

        match self.event.write(1) {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!("Short write signalling activation");
                false
            }
            Err(error) => {
                tracing::error!(?error, "Failed to signal activation");
                false
            }
        }
    }

    /// Wake the node unconditionally, outside pending accounting.
    pub fn signal(&self, nsec: u64) {
        self.set_status(ActivationStatus::TRIGGERED);
        volatile!(self.region, signal_time).write(nsec);

        if let Err(error) = self.event.write(1) {
            tracing::error!(?error, "Failed to signal activation");
        }
    }

    /// Read the current clock duration.
    pub fn duration(&self) -> u64 {
        volatile!(self.region, position.clock.duration).read()
    }

    /// Read the current clock position.
    pub fn position(&self) -> u64 {
        volatile!(self.region, position.clock.position).read()
    }

    /// Read the xrun counter.
    pub fn xrun_count(&self) -> u32 {
        volatile!(self.region, xrun_count).read()
    }

    /// Read the cpu load averages.
    pub fn cpu_load(&self) -> [f32; 3] {
        volatile!(self.region, cpu_load).read()
    }

    /// Post a transport command.
    pub fn send_command(&self, command: runtime::consts::ActivationCommand) {
        atomic!(self.region, command).store(command);
    }

    /// The current transport position state.
    pub fn position_state(&self) -> PositionState {
        atomic!(self.region, position.state).load()
    }

    /// Constrain how long a starting transport waits for this node's sync.
    pub fn set_sync_timeout(&self, timeout_ns: u64) {
        volatile!(self.region, sync_timeout).write(timeout_ns);
    }

    /// Request a reposition to the given segment, racing other owners.
    pub fn request_reposition(&self, segment: ffi::IoSegment, owner: u32) {
        volatile!(self.region, reposition).write(segment);
        atomic!(self.region, reposition_owner).store(owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_fires_on_last_edge() {
        let mut pool = MemPool::new();
        let a = Activation::allocate(&mut pool, 1024, 48000).unwrap();

        a.add_required();
        a.add_required();
        a.reset_pending();

        assert!(!a.trigger(1));
        assert!(a.trigger(2));
        assert_eq!(a.status(), ActivationStatus::TRIGGERED);
        assert_eq!(a.event().read().unwrap(), Some(1));
    }

    #[test]
    fn required_accounting_is_symmetric() {
        let mut pool = MemPool::new();
        let a = Activation::allocate(&mut pool, 1024, 48000).unwrap();

        a.add_required();
        a.add_required();
        a.remove_required();
        a.remove_required();
        a.reset_pending();

        // With no edges, a single decrement is never enough to fire.
        assert!(!a.trigger(1));
    }

    #[test]
    fn initial_clock() {
        let mut pool = MemPool::new();
        let a = Activation::allocate(&mut pool, 256, 44100).unwrap();

        assert_eq!(a.duration(), 256);
        assert_eq!(a.position(), 0);
        assert_eq!(a.status(), ActivationStatus::INACTIVE);
    }
}
