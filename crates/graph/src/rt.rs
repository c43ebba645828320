//! The data-thread side of the graph.
//!
//! One [`RtGraph`] lives on each data thread and holds the real-time state of
//! every node scheduled there: the activation record, the wakeup fd, the
//! target list and the processor. The driver cycle and the per-node process
//! step run here and never allocate or block.

use core::fmt;

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

use runtime::RateLimit;
use runtime::consts::{ActivationCommand, ActivationStatus, PositionState};
use runtime::flags::Status;
use runtime::monotonic_nsec;
use runtime::poll::Token;
use slab::Slab;

use crate::activation::Activation;
use crate::ffi;
use crate::ptr::{atomic, volatile};
use crate::target::Target;

/// Log window for repeating data-thread warnings.
const WARN_INTERVAL_NS: u64 = 2_000_000_000;
const WARN_BURST: u32 = 1;

/// The data-thread half of a node implementation.
pub trait Processor: Send {
    /// Run one processing step, returning a status bitfield or a negative
    /// errno. Must be real-time safe.
    fn process(&mut self) -> i32;
}

/// Real-time events a node emits from the data thread.
#[allow(unused_variables)]
pub trait RtEvents: Send + Sync {
    /// The driver started a cycle.
    fn start(&self) {}

    /// The driver closed a cycle.
    fn complete(&self) {}

    /// A cycle started before the previous one finished.
    fn incomplete(&self) {}

    /// The transport sync timed out; `stuck` names a follower that never
    /// cleared its pending sync.
    fn timeout(&self, stuck: u32) {}

    /// The node reported a drained cycle.
    fn drained(&self) {}

    /// A follower did not finish in time.
    fn xrun(&self, id: u32, count: u32) {}
}

/// Pending poller registration changes, applied by the loop between
/// dispatches.
pub(crate) enum PollOp {
    Add(RawFd, Token),
    Remove(RawFd),
}

/// The real-time state of one node.
pub struct RtNode {
    pub id: u32,
    pub name: String,
    pub activation: Activation,
    /// The nodes to wake when this node finishes.
    pub targets: Vec<Target>,
    pub added: bool,
    pub driver: bool,
    pub driving: bool,
    pub trigger: bool,
    pub transport_sync: bool,
    pub processor: Option<Box<dyn Processor>>,
    pub events: Vec<Arc<dyn RtEvents>>,
    rate_limit: RateLimit,
    driver_start: u64,
    elapsed: u64,
}

impl RtNode {
    /// Construct the real-time state for a node.
    pub fn new(id: u32, name: String, activation: Activation) -> Self {
        Self {
            id,
            name,
            activation,
            targets: Vec::new(),
            added: false,
            driver: false,
            driving: false,
            trigger: false,
            transport_sync: false,
            processor: None,
            events: Vec::new(),
            rate_limit: RateLimit::new(WARN_INTERVAL_NS, WARN_BURST),
            driver_start: 0,
            elapsed: 0,
        }
    }

    /// Find a target by node id.
    pub fn find_target(&self, id: u32) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }
}

impl fmt::Debug for RtNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("added", &self.added)
            .field("driving", &self.driving)
            .field("targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}

type AuxHandler = Box<dyn FnMut(&mut RtGraph) + Send>;

struct AuxSource {
    handler: Option<AuxHandler>,
}

/// All real-time state owned by one data thread.
pub struct RtGraph {
    nodes: Slab<RtNode>,
    by_id: HashMap<u32, usize>,
    aux: Slab<AuxSource>,
    pub(crate) poll_ops: Vec<PollOp>,
    pub(crate) stopping: bool,
    missed_limit: RateLimit,
}

/// Tokens for node sources carry this bit, auxiliary sources the other.
const TOKEN_KIND_SHIFT: u64 = 32;
const TOKEN_NODE: u64 = 1 << TOKEN_KIND_SHIFT;
const TOKEN_AUX: u64 = 2 << TOKEN_KIND_SHIFT;

impl RtGraph {
    /// Construct an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Slab::new(),
            by_id: HashMap::new(),
            aux: Slab::new(),
            poll_ops: Vec::new(),
            stopping: false,
            missed_limit: RateLimit::new(WARN_INTERVAL_NS, WARN_BURST),
        }
    }

    /// Insert a node, registering its wakeup fd with the poller.
    pub fn add_node(&mut self, node: RtNode) -> usize {
        use std::os::fd::AsRawFd;

        let fd = node.activation.event().as_raw_fd();
        let id = node.id;
        let key = self.nodes.insert(node);

        self.by_id.insert(id, key);
        self.poll_ops
            .push(PollOp::Add(fd, Token::new(TOKEN_NODE | key as u64)));

        self.nodes[key].added = true;
        key
    }

    /// Remove a node.
    ///
    /// Dropping its target list releases the required counters of every edge;
    /// edges pointing at the node from other target lists are removed as
    /// well.
    pub fn remove_node(&mut self, id: u32) -> Option<RtNode> {
        use std::os::fd::AsRawFd;

        let key = self.by_id.remove(&id)?;
        let node = self.nodes.try_remove(key)?;

        self.poll_ops
            .push(PollOp::Remove(node.activation.event().as_raw_fd()));

        for (_, other) in self.nodes.iter_mut() {
            other.targets.retain(|t| t.id != id);
        }

        Some(node)
    }

    /// Look up a node key by id.
    pub fn key_of(&self, id: u32) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// Access a node by key.
    pub fn node_mut(&mut self, key: usize) -> Option<&mut RtNode> {
        self.nodes.get_mut(key)
    }

    /// Access a node by id.
    pub fn node_by_id_mut(&mut self, id: u32) -> Option<&mut RtNode> {
        let key = self.key_of(id)?;
        self.nodes.get_mut(key)
    }

    /// Register an auxiliary fd source.
    pub fn add_aux(
        &mut self,
        fd: RawFd,
        handler: impl FnMut(&mut RtGraph) + Send + 'static,
    ) -> usize {
        let key = self.aux.insert(AuxSource {
            handler: Some(Box::new(handler)),
        });

        self.poll_ops
            .push(PollOp::Add(fd, Token::new(TOKEN_AUX | key as u64)));
        key
    }

    /// Remove an auxiliary source.
    pub fn remove_aux(&mut self, key: usize, fd: RawFd) {
        self.aux.try_remove(key);
        self.poll_ops.push(PollOp::Remove(fd));
    }

    /// Ask the loop to exit.
    pub fn stop(&mut self) {
        self.stopping = true;
    }

    /// Dispatch a readable token.
    pub(crate) fn dispatch(&mut self, token: Token) {
        let value = token.value();
        let key = (value & ((1 << TOKEN_KIND_SHIFT) - 1)) as usize;

        match value & !((1 << TOKEN_KIND_SHIFT) - 1) {
            TOKEN_NODE => self.handle_node_wakeup(key),
            TOKEN_AUX => self.handle_aux(key),
            _ => tracing::warn!(value, "Wakeup for unknown token"),
        }
    }

    fn handle_aux(&mut self, key: usize) {
        let Some(mut handler) = self.aux.get_mut(key).and_then(|s| s.handler.take()) else {
            return;
        };

        handler(self);

        if let Some(source) = self.aux.get_mut(key) {
            source.handler = Some(handler);
        }
    }

    fn handle_node_wakeup(&mut self, key: usize) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };

        match node.activation.event().read() {
            Ok(Some(count)) if count > 1 => {
                let nsec = monotonic_nsec();

                if let Some(suppressed) = self.missed_limit.test(nsec) {
                    tracing::info!(
                        node = %node.name,
                        missed = count - 1,
                        suppressed,
                        "Client missed wakeups"
                    );
                }
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(node = %node.name, ?error, "Failed to read wakeup");
                return;
            }
        }

        self.process_node(key);
    }

    /// The main processing entry point of a node, called when its wakeup fd
    /// fires.
    pub fn process_node(&mut self, key: usize) -> i32 {
        let Some(node) = self.nodes.get_mut(key) else {
            return Status::OK.into_raw();
        };

        let nsec = monotonic_nsec();
        let a = node.activation.region().clone();

        node.activation.set_status(ActivationStatus::AWAKE);
        let prev = volatile!(a, awake_time).replace(nsec);
        volatile!(a, prev_awake_time).write(prev);

        // When transport sync is not supported, just clear the flag.
        if !node.transport_sync {
            volatile!(a, pending_sync).write(0);
        }

        let status = if node.added {
            match node.processor.as_mut() {
                Some(processor) => processor.process(),
                None => Status::HAVE_DATA.into_raw(),
            }
        } else {
            // The node was scheduled out but links are still winding down;
            // skip processing and still release the peers below.
            tracing::debug!(node = %node.name, "Scheduling non-active node");
            Status::HAVE_DATA.into_raw()
        };

        atomic!(a, state[0].status).store(Status::from_raw(status.max(0)));

        let nsec = monotonic_nsec();
        node.activation.set_status(ActivationStatus::FINISHED);
        let prev = volatile!(a, finish_time).replace(nsec);
        volatile!(a, prev_finish_time).write(prev);

        if !node.driving {
            for t in &node.targets {
                if t.active {
                    t.activation.trigger(nsec);
                }
            }
        } else {
            // The driving node finishing means the whole graph finished.
            volatile!(a, signal_time).write(node.driver_start);
            calculate_stats(&node.activation);

            for e in &node.events {
                e.complete();
            }
        }

        if Status::from_status(status).contains(Status::DRAINED) {
            for e in &node.events {
                e.drained();
            }
        }

        status
    }

    /// The starting point of a driver cycle.
    ///
    /// Checks the previous cycle for stragglers, applies transport commands
    /// and repositions, resets every target's pending counter and finally
    /// wakes the first wave of followers.
    pub fn node_ready(&mut self, key: usize, status: i32) -> i32 {
        let Some(node) = self.nodes.get_mut(key) else {
            return runtime::Error::NoEntity.status();
        };

        if !node.added {
            // A stopping node may still emit ready events; ignore them.
            tracing::info!(node = %node.name, "Ready for non-active node");
            return runtime::Error::Io.status();
        }

        let nsec = monotonic_nsec();

        if node.driving {
            let a = node.activation.region().clone();

            if node.activation.status() != ActivationStatus::FINISHED {
                check_states(node, nsec);

                for e in &node.events {
                    e.incomplete();
                }
            }

            // Use the new target duration and rate for this cycle.
            let target_duration = volatile!(a, position.clock.target_duration).read();
            let target_rate = volatile!(a, position.clock.target_rate).read();
            volatile!(a, position.clock.duration).write(target_duration);
            volatile!(a, position.clock.rate).write(target_rate);

            let command = atomic!(a, command).swap(ActivationCommand::NONE);
            let mut reposition_owner = atomic!(a, reposition_owner).swap(0);

            let mut sync_start = false;

            match command {
                ActivationCommand::STOP => {
                    atomic!(a, position.state).store(PositionState::STOPPED);
                }
                ActivationCommand::START => {
                    atomic!(a, position.state).store(PositionState::STARTING);
                    sync_start = true;
                }
                _ => {}
            }

            let owner = [
                volatile!(a, segment_owner[0]).read(),
                volatile!(a, segment_owner[1]).read(),
            ];

            let mut all_ready;

            loop {
                all_ready = !sync_start;
                let update_sync = sync_start;
                let mut reposition_target = None;

                let mut min_timeout = u64::MAX;

                for t in &node.targets {
                    let ta = t.activation.region();

                    t.activation.set_status(ActivationStatus::NOT_TRIGGERED);
                    t.activation.reset_pending();

                    if t.id == reposition_owner {
                        reposition_target = Some(t);
                    }

                    if t.id == owner[0] || t.id == owner[1] {
                        let extra = volatile!(ta, segment).read();
                        volatile!(a, position.segments[0]).write(extra);
                    }

                    min_timeout = min_timeout.min(volatile!(ta, sync_timeout).read());

                    if update_sync {
                        volatile!(ta, pending_sync).write(1);
                        volatile!(ta, pending_new_pos).write(1);
                    } else {
                        all_ready &= volatile!(ta, pending_sync).read() == 0;
                    }
                }

                volatile!(a, sync_timeout)
                    .write(min_timeout.min(runtime::consts::DEFAULT_SYNC_TIMEOUT));

                if let Some(t) = reposition_target {
                    do_reposition(&a, t);
                    sync_start = true;
                    reposition_owner = 0;
                    continue;
                }

                // The countdown starts once the group's timeout is known.
                if sync_start {
                    volatile!(a, sync_left).write(sync_left_cycles(&a));
                }

                break;
            }

            node.activation.set_status(ActivationStatus::TRIGGERED);
            let prev = volatile!(a, signal_time).replace(nsec);
            volatile!(a, prev_signal_time).write(prev);
            node.driver_start = nsec;

            // Advance the transport when running, force it running when a
            // starting sync never converges.
            if atomic!(a, position.state).load() == PositionState::STARTING {
                if !all_ready {
                    let left = volatile!(a, sync_left).read().saturating_sub(1);
                    volatile!(a, sync_left).write(left);

                    if left == 0 {
                        let stuck = node
                            .targets
                            .iter()
                            .find(|t| {
                                volatile!(t.activation.region(), pending_sync).read() != 0
                            })
                            .map(|t| t.id)
                            .unwrap_or(u32::MAX);

                        tracing::warn!(
                            node = %node.name,
                            stuck,
                            "Sync timeout, going to running"
                        );
                        check_states(node, nsec);

                        for e in &node.events {
                            e.timeout(stuck);
                        }

                        all_ready = true;
                    }
                }

                if all_ready {
                    atomic!(a, position.state).store(PositionState::RUNNING);
                }
            }

            if atomic!(a, position.state).load() == PositionState::RUNNING {
                node.elapsed += volatile!(a, position.clock.duration).read();
            }

            let position = volatile!(a, position.clock.position).read();
            volatile!(a, position.offset).write(position as i64 - node.elapsed as i64);

            for e in &node.events {
                e.start();
            }
        }

        if node.driver && !node.driving {
            // Driver nodes that are not currently driving should not emit
            // ready.
            return 0;
        }

        if !node.driver {
            // Non-drivers resume the graph through their peers directly.
            node.activation.set_status(ActivationStatus::FINISHED);
            volatile!(node.activation.region(), finish_time).write(nsec);
        }

        let _ = status;

        for t in &node.targets {
            if t.active {
                t.activation.trigger(nsec);
            }
        }

        0
    }

    /// Wake a node outside pending accounting, as an explicit trigger.
    pub fn trigger_node(&mut self, id: u32) {
        let nsec = monotonic_nsec();

        if let Some(node) = self.node_by_id_mut(id) {
            node.activation.reset_pending();
            node.activation.signal(nsec);
        }
    }

    /// Start a cycle on a driving node from an explicit trigger.
    ///
    /// The driver produces into its io area first so followers woken by the
    /// cycle prologue find the data already there.
    pub fn trigger_driver(&mut self, id: u32) {
        let Some(key) = self.key_of(id) else {
            return;
        };

        if let Some(node) = self.nodes.get_mut(key)
            && node.driving
            && let Some(processor) = node.processor.as_mut()
        {
            processor.process();
        }

        self.node_ready(key, 0);
    }
}

impl Default for RtGraph {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Number of cycles a starting transport waits for sync clients.
fn sync_left_cycles(a: &crate::memory::Region<ffi::NodeActivation>) -> u64 {
    let duration = volatile!(a, position.clock.duration).read().max(1);
    let denom = volatile!(a, position.clock.rate).read().denom.max(1);
    let timeout = volatile!(a, sync_timeout).read();

    let cycle_ns = (duration.saturating_mul(1_000_000_000) / denom as u64).max(1);
    (timeout / cycle_ns).max(1)
}

/// Merge a target's reposition request into the driver position.
fn do_reposition(a: &crate::memory::Region<ffi::NodeActivation>, target: &Target) {
    let src = volatile!(target.activation.region(), reposition).read();

    tracing::info!(target = target.id, position = src.position, "Reposition");

    let mut dst = src;

    if dst.start == 0 {
        let position = volatile!(a, position.clock.position).read();
        let offset = volatile!(a, position.offset).read();
        dst.start = (position as i64 - offset) as u64;
    }

    volatile!(a, position.segments[0]).write(dst);

    if atomic!(a, position.state).load() == PositionState::RUNNING {
        atomic!(a, position.state).store(PositionState::STARTING);
    }
}

/// Look for followers that did not finish the previous cycle.
fn check_states(driver: &mut RtNode, nsec: u64) {
    let suppressed = driver.rate_limit.test(nsec);

    for t in &driver.targets {
        if t.id == driver.id {
            continue;
        }

        let ta = t.activation.region();
        let status = t.activation.status();

        if matches!(
            status,
            ActivationStatus::TRIGGERED | ActivationStatus::AWAKE
        ) {
            let count = update_xrun_stats(ta, nsec / 1000, 0);

            if let Some(suppressed) = suppressed {
                tracing::warn!(
                    target = %t.name,
                    id = t.id,
                    status = status.as_str(),
                    suppressed,
                    "Client too slow"
                );
            }

            for e in &driver.events {
                e.xrun(t.id, count);
            }
        }
    }
}

fn update_xrun_stats(
    a: &crate::memory::Region<ffi::NodeActivation>,
    trigger_us: u64,
    delay_us: u64,
) -> u32 {
    let count = volatile!(a, xrun_count).read() + 1;
    volatile!(a, xrun_count).write(count);
    volatile!(a, xrun_time).write(trigger_us);
    volatile!(a, xrun_delay).write(delay_us);

    let max = volatile!(a, max_delay).read();
    volatile!(a, max_delay).write(max.max(delay_us));
    count
}

/// CPU load moving averages at cycle close.
fn calculate_stats(activation: &Activation) {
    let a = activation.region();

    let signal_time = volatile!(a, signal_time).read();
    let prev_signal_time = volatile!(a, prev_signal_time).read();
    let finish_time = volatile!(a, finish_time).read();

    if signal_time > prev_signal_time {
        let process_time = finish_time.saturating_sub(signal_time);
        let period_time = signal_time - prev_signal_time;
        let load = process_time as f32 / period_time as f32;

        let cpu = volatile!(a, cpu_load).read();
        volatile!(a, cpu_load).write([
            (cpu[0] + load) / 2.0,
            (cpu[1] * 7.0 + load) / 8.0,
            (cpu[2] * 31.0 + load) / 32.0,
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemPool;

    fn rt_node(pool: &mut MemPool, id: u32, name: &str) -> RtNode {
        let activation = Activation::allocate(pool, 1024, 48000).unwrap();
        RtNode::new(id, String::from(name), activation)
    }

    #[test]
    fn remove_restores_required_counters() {
        let mut pool = MemPool::new();
        let mut rt = RtGraph::new();

        let driver = rt_node(&mut pool, 1, "driver");
        let follower = rt_node(&mut pool, 2, "follower");

        let follower_activation = follower.activation.clone();

        let dk = rt.add_node(driver);
        let fk = rt.add_node(follower);

        // driver -> follower edge.
        let mut t = Target::new(2, String::from("follower"), follower_activation.clone());
        t.activate();
        rt.nodes[dk].targets.push(t);

        // follower -> driver edge.
        let driver_activation = rt.nodes[dk].activation.clone();
        let mut t = Target::new(1, String::from("driver"), driver_activation);
        t.activate();
        rt.nodes[fk].targets.push(t);

        follower_activation.reset_pending();

        rt.remove_node(1);

        // The follower's required count is back to zero: a reset plus a
        // single decrement never fires.
        follower_activation.reset_pending();
        assert!(!follower_activation.trigger(1));
    }

    #[test]
    fn process_propagates_to_targets() {
        let mut pool = MemPool::new();
        let mut rt = RtGraph::new();

        let producer = rt_node(&mut pool, 1, "producer");
        let consumer = rt_node(&mut pool, 2, "consumer");

        let consumer_activation = consumer.activation.clone();

        let pk = rt.add_node(producer);
        let _ck = rt.add_node(consumer);

        let mut t = Target::new(2, String::from("consumer"), consumer_activation.clone());
        t.activate();
        rt.nodes[pk].targets.push(t);

        consumer_activation.reset_pending();
        rt.process_node(pk);

        assert_eq!(consumer_activation.status(), ActivationStatus::TRIGGERED);
        assert_eq!(consumer_activation.event().read().unwrap(), Some(1));
    }

    #[test]
    fn driver_cycle_wakes_first_wave() {
        let mut pool = MemPool::new();
        let mut rt = RtGraph::new();

        let mut driver = rt_node(&mut pool, 1, "driver");
        driver.driver = true;
        driver.driving = true;

        let follower = rt_node(&mut pool, 2, "follower");
        let follower_activation = follower.activation.clone();

        let dk = rt.add_node(driver);
        let _fk = rt.add_node(follower);

        let driver_activation = rt.nodes[dk].activation.clone();

        // Self edge plus both directions of the follower relation.
        let mut t = Target::new(1, String::from("driver"), driver_activation.clone());
        t.activate();
        rt.nodes[dk].targets.push(t);

        let mut t = Target::new(2, String::from("follower"), follower_activation.clone());
        t.activate();
        rt.nodes[dk].targets.push(t);

        let fk = rt.key_of(2).unwrap();
        let mut t = Target::new(1, String::from("driver"), driver_activation.clone());
        t.activate();
        rt.nodes[fk].targets.push(t);

        rt.node_ready(dk, 0);

        // The follower had one pending edge from the driver, so it fired.
        assert_eq!(follower_activation.status(), ActivationStatus::TRIGGERED);

        // The driver itself still waits for the follower to finish.
        assert_eq!(driver_activation.status(), ActivationStatus::TRIGGERED);
        assert!(driver_activation.event().read().unwrap().is_none());

        // The follower finishing releases the driver.
        rt.process_node(fk);
        assert_eq!(driver_activation.event().read().unwrap(), Some(1));

        // The driver closing the cycle emits no further triggers.
        rt.process_node(dk);
        assert_eq!(driver_activation.status(), ActivationStatus::FINISHED);
    }

    #[test]
    fn xruns_accumulate_on_stragglers() {
        let mut pool = MemPool::new();
        let mut rt = RtGraph::new();

        let mut driver = rt_node(&mut pool, 1, "driver");
        driver.driver = true;
        driver.driving = true;

        let follower = rt_node(&mut pool, 2, "follower");
        let follower_activation = follower.activation.clone();

        let dk = rt.add_node(driver);
        rt.add_node(follower);

        let mut t = Target::new(2, String::from("follower"), follower_activation.clone());
        t.activate();
        rt.nodes[dk].targets.push(t);

        // First cycle: follower never finishes.
        rt.node_ready(dk, 0);
        assert_eq!(follower_activation.status(), ActivationStatus::TRIGGERED);

        // Second cycle start observes the straggler.
        rt.node_ready(dk, 0);
        assert_eq!(follower_activation.xrun_count(), 1);
    }
}
