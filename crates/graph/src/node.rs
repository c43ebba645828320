//! Graph vertices and their lifecycle.

use core::fmt;

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use pod::Value;
use runtime::consts::{Direction, NodeState};
use runtime::flags::{NodeChangeMask, NodeFlags, ParamFlag};
use runtime::id;
use runtime::{Error, Properties, prop};

use crate::activation::Activation;
use crate::buffer::BufferList;
use crate::hooks::Hooks;
use crate::latency::{LatencyInfo, ProcessLatency};
use crate::memory::Region;
use crate::params::{ParamInfo, ParamStore};
use crate::port::{Port, Ports};
use crate::rt::Processor;
use crate::work::WorkQueue;
use crate::{async_seq_of, is_async};

/// The interface a node implementation provides to the graph.
///
/// Methods return a non-negative status or a negative error; a positive
/// result with the async bit carries a sequence number that completes later
/// through the result listener.
#[allow(unused_variables)]
pub trait NodeImpl: Send {
    /// Enumerate parameters of the given id.
    fn enum_params(
        &mut self,
        seq: u32,
        id: id::Param,
        start: u32,
        num: u32,
        filter: Option<&Value>,
        result: &mut dyn FnMut(u32, u32, Value),
    ) -> Result<i32, Error> {
        Err(Error::NotSupported)
    }

    /// Set a parameter.
    fn set_param(&mut self, id: id::Param, param: Option<&Value>) -> Result<i32, Error> {
        Err(Error::NotSupported)
    }

    /// Install an io area on the node.
    fn set_io(&mut self, ty: id::IoType, region: Option<Region<[u8]>>) -> Result<(), Error> {
        Ok(())
    }

    /// Send a command to the node.
    fn send_command(&mut self, command: id::NodeCommand) -> Result<i32, Error> {
        Ok(0)
    }

    /// Enumerate parameters of a port.
    fn port_enum_params(
        &mut self,
        seq: u32,
        direction: Direction,
        port_id: u32,
        id: id::Param,
        start: u32,
        num: u32,
        filter: Option<&Value>,
        result: &mut dyn FnMut(u32, u32, Value),
    ) -> Result<i32, Error> {
        Err(Error::NotSupported)
    }

    /// A parameter was set on a port.
    fn port_set_param(
        &mut self,
        direction: Direction,
        port_id: u32,
        id: id::Param,
        param: Option<&Value>,
    ) -> Result<i32, Error> {
        Ok(0)
    }

    /// An io area was installed on a port.
    fn port_set_io(
        &mut self,
        direction: Direction,
        port_id: u32,
        ty: id::IoType,
        region: Option<Region<[u8]>>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// A buffer set was installed on a port.
    fn port_use_buffers(
        &mut self,
        direction: Direction,
        port_id: u32,
        buffers: &BufferList,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// The peer recycled a buffer outside the io slot.
    fn port_reuse_buffer(&mut self, port_id: u32, buffer_id: u32) -> Result<(), Error> {
        Ok(())
    }

    /// Produce the data-thread half of the implementation.
    fn make_processor(&mut self) -> Option<Box<dyn Processor>> {
        None
    }

    /// The fixed processing latency, when the implementation has one.
    fn process_latency(&mut self) -> Option<ProcessLatency> {
        None
    }
}

/// Listener callbacks a node emits on the main thread.
#[allow(unused_variables)]
pub trait NodeEvents {
    /// The info changed; the change mask says what.
    fn info_changed(&self, info: &NodeInfo) {}

    /// The node moved to a new state.
    fn state_changed(&self, old: NodeState, new: NodeState, error: Option<&str>) {}

    /// A parameter of the node changed.
    fn param_changed(&self, id: id::Param) {}

    /// A parameter of a port changed.
    fn port_param_changed(&self, direction: Direction, port_id: u32, id: id::Param) {}

    /// An out-of-band result arrived.
    fn result(&self, seq: u32, res: i32) {}
}

/// Public information about a node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: u32,
    pub max_input_ports: u32,
    pub max_output_ports: u32,
    pub flags: NodeFlags,
    pub state: NodeState,
    pub error: Option<String>,
    /// The negative status code that produced the error state.
    pub error_res: i32,
    pub change_mask: NodeChangeMask,
    pub n_params: u32,
}

/// A vertex in the media graph.
pub struct Node {
    pub id: u32,
    pub name: String,
    pub properties: Properties,
    pub info: NodeInfo,
    pub params: ParamStore,
    pub ports: Ports,
    implementation: Option<Box<dyn NodeImpl>>,
    activation: Activation,
    listeners: Hooks<dyn NodeEvents>,
    listener_cookie: u64,
    work: WorkQueue<NodeState>,
    pending_seq: Option<u32>,
    pub(crate) pending_state: Option<NodeState>,
    /// Drivers hold their start until every follower reached running.
    pub(crate) start_ready: bool,

    /// The node this one is scheduled by; the driver points at itself.
    pub driver_node: Option<u32>,
    pub registered: bool,
    pub active: bool,
    /// Present in the data loop and its driver's target list.
    pub added: bool,
    /// The node can drive a graph.
    pub driver: bool,
    /// The node is currently driving its graph.
    pub driving: bool,
    /// The node is only scheduled through explicit triggers.
    pub trigger: bool,
    pub remote: bool,
    pub exported: bool,
    pub transport_sync: bool,

    pub pause_on_idle: bool,
    pub suspend_on_idle: bool,
    pub want_driver: bool,
    pub always_process: bool,
    pub passive_in: bool,
    pub passive_out: bool,
    pub lock_quantum: bool,
    pub lock_rate: bool,
    pub rate: Option<(u32, u32)>,
    pub latency: Option<(u32, u32)>,
    pub max_latency: Option<(u32, u32)>,
    pub force_quantum: Option<u32>,
    pub force_rate: Option<u32>,
    pub group: Option<String>,
    pub link_group: Option<String>,
    pub priority_driver: i32,
    pub cache_params: bool,
}

impl Node {
    /// Construct a new node.
    pub fn new(id: u32, name: String, properties: Properties, activation: Activation) -> Self {
        let mut node = Self {
            id,
            name,
            properties,
            info: NodeInfo {
                id,
                max_input_ports: u32::MAX,
                max_output_ports: u32::MAX,
                flags: NodeFlags::RT,
                state: NodeState::CREATING,
                error: None,
                error_res: 0,
                change_mask: NodeChangeMask::NONE,
                n_params: 0,
            },
            params: ParamStore::new([
                ParamInfo::new(id::Param::ENUM_FORMAT, ParamFlag::READ),
                ParamInfo::new(id::Param::FORMAT, ParamFlag::READWRITE),
                ParamInfo::new(id::Param::PROP_INFO, ParamFlag::READ),
                ParamInfo::new(id::Param::PROPS, ParamFlag::READWRITE),
                ParamInfo::new(id::Param::PROCESS_LATENCY, ParamFlag::READ),
            ]),
            ports: Ports::new(),
            implementation: None,
            activation,
            listeners: Hooks::new(),
            listener_cookie: 0,
            work: WorkQueue::new(),
            pending_seq: None,
            pending_state: None,
            start_ready: false,
            driver_node: None,
            registered: false,
            active: false,
            added: false,
            driver: false,
            driving: false,
            trigger: false,
            remote: false,
            exported: false,
            transport_sync: false,
            pause_on_idle: true,
            suspend_on_idle: false,
            want_driver: true,
            always_process: false,
            passive_in: false,
            passive_out: false,
            lock_quantum: false,
            lock_rate: false,
            rate: None,
            latency: None,
            max_latency: None,
            force_quantum: None,
            force_rate: None,
            group: None,
            link_group: None,
            priority_driver: 0,
            cache_params: true,
        };

        node.check_properties();
        node
    }

    /// The activation record of the node.
    #[inline]
    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    /// Install the node implementation.
    pub fn set_implementation(&mut self, implementation: Box<dyn NodeImpl>) {
        self.implementation = Some(implementation);
    }

    /// Access the implementation.
    pub fn implementation_mut(&mut self) -> Option<&mut Box<dyn NodeImpl>> {
        self.implementation.as_mut()
    }

    /// Add a listener, returning the cookie to remove it with.
    pub fn add_listener(&mut self, listener: Arc<dyn NodeEvents>) -> u64 {
        self.listener_cookie += 1;
        self.listeners.add(listener, self.listener_cookie);
        self.listener_cookie
    }

    /// Remove a listener by cookie.
    pub fn remove_listener(&mut self, cookie: u64) {
        self.listeners.remove(cookie);
    }

    /// Interpret the scheduling properties of the node.
    ///
    /// Returns `true` when a property relevant to scheduling changed.
    pub fn check_properties(&mut self) -> bool {
        let props = &self.properties;

        let driver = props.get_bool(prop::NODE_DRIVER, false);
        let trigger = props.get_bool(prop::NODE_TRIGGER, false);
        let pause_on_idle = props.get_bool(prop::NODE_PAUSE_ON_IDLE, true);
        let suspend_on_idle = props.get_bool(prop::NODE_SUSPEND_ON_IDLE, false);
        let want_driver = props.get_bool(prop::NODE_WANT_DRIVER, true);
        let always_process = props.get_bool(prop::NODE_ALWAYS_PROCESS, false);
        let transport_sync = props.get_bool(prop::NODE_TRANSPORT_SYNC, false);
        let lock_quantum = props.get_bool(prop::NODE_LOCK_QUANTUM, false);
        let lock_rate = props.get_bool(prop::NODE_LOCK_RATE, false);

        let (passive_in, passive_out) = match props.get(prop::NODE_PASSIVE) {
            Some("in") => (true, false),
            Some("out") => (false, true),
            Some(v) => {
                let b = v == "true" || v == "1";
                (b, b)
            }
            None => (false, false),
        };

        let latency = props.get_fraction(prop::NODE_LATENCY);
        let max_latency = props.get_fraction(prop::NODE_MAX_LATENCY);
        let rate = props.get_fraction(prop::NODE_RATE);
        let force_quantum = props.parse(prop::NODE_FORCE_QUANTUM);
        let force_rate = props.parse(prop::NODE_FORCE_RATE);
        let group = props.get(prop::NODE_GROUP).map(String::from);
        let link_group = props.get(prop::NODE_LINK_GROUP).map(String::from);
        let priority_driver = props.parse(prop::PRIORITY_DRIVER).unwrap_or(0);

        let changed = self.driver != driver
            || self.trigger != trigger
            || self.latency != latency
            || self.rate != rate
            || self.force_quantum != force_quantum
            || self.force_rate != force_rate
            || self.group != group
            || self.link_group != link_group
            || self.priority_driver != priority_driver;

        self.driver = driver;
        self.trigger = trigger;
        self.pause_on_idle = pause_on_idle;
        self.suspend_on_idle = suspend_on_idle;
        self.want_driver = want_driver;
        self.always_process = always_process;
        self.transport_sync = transport_sync;
        self.lock_quantum = lock_quantum;
        self.lock_rate = lock_rate;
        self.passive_in = passive_in;
        self.passive_out = passive_out;
        self.latency = latency;
        self.max_latency = max_latency;
        self.rate = rate;
        self.force_quantum = force_quantum;
        self.force_rate = force_rate;
        self.group = group;
        self.link_group = link_group;
        self.priority_driver = priority_driver;

        changed
    }

    /// Merge new properties into the node and re-interpret them.
    pub fn update_properties(&mut self, updates: &Properties) -> bool {
        let mut changed = self.properties.extend(updates);
        changed |= self.check_properties();

        if changed {
            self.info.change_mask |= NodeChangeMask::PROPS;
        }

        changed
    }

    /// The current state.
    #[inline]
    pub fn state(&self) -> NodeState {
        self.info.state
    }

    /// Request a state change.
    ///
    /// Transitions are asynchronous when the implementation replies with an
    /// async sequence number; a newer request cancels the older pending one.
    #[tracing::instrument(skip(self), fields(node = %self.name))]
    pub fn set_state(&mut self, state: NodeState) -> Result<()> {
        if self.info.state == NodeState::ERROR && state != NodeState::SUSPENDED {
            bail!("Node {} is in error and needs recovery", self.name);
        }

        if let Some(seq) = self.pending_seq.take() {
            // The previous transition still completes but its result is
            // discarded.
            self.work.cancel(seq);
            self.pending_state = None;
        }

        let res = match state {
            NodeState::SUSPENDED => self.suspend_node(),
            NodeState::PAUSED => self.pause_node(),
            NodeState::IDLE => self.idle_node(),
            NodeState::RUNNING => self.start_node(),
            NodeState::ERROR => Ok(0),
            state => {
                bail!("Cannot request state {state:?}");
            }
        };

        match res {
            Ok(res) if is_async(res) => {
                let seq = async_seq_of(res);
                self.work.add(seq, state);
                self.pending_seq = Some(seq);
                self.pending_state = Some(state);
            }
            Ok(_) => {
                self.update_state(state, 0, None);
            }
            Err(Error::Busy) if state == NodeState::RUNNING && self.driver => {
                // The driver start stays pending until every follower has
                // reached running.
                self.pending_state = Some(NodeState::RUNNING);
            }
            Err(Error::Io) if state == NodeState::SUSPENDED => {
                // Absorbed so the next connect starts clean.
                tracing::warn!(node = %self.name, "Suspend failed, forcing suspended");
                self.update_state(NodeState::SUSPENDED, 0, None);
            }
            Err(e) => {
                self.update_state(NodeState::ERROR, e.status(), Some(e.to_string()));
                bail!(e);
            }
        }

        Ok(())
    }

    fn suspend_node(&mut self) -> Result<i32, Error> {
        let res = match self.implementation.as_mut() {
            Some(implementation) => {
                match implementation.send_command(id::NodeCommand::SUSPEND) {
                    Err(Error::NotSupported) => {
                        implementation.send_command(id::NodeCommand::PAUSE)
                    }
                    res => res,
                }
            }
            None => Ok(0),
        };

        for direction in [Direction::INPUT, Direction::OUTPUT] {
            let ids: Vec<u32> = self.ports.iter(direction).map(|p| p.id).collect();

            for port_id in ids {
                if let Ok(port) = self.ports.get_mut(direction, port_id) {
                    let _ = port.set_param(id::Param::FORMAT, None);
                }

                if let Some(implementation) = self.implementation.as_mut() {
                    let _ = implementation.port_set_param(
                        direction,
                        port_id,
                        id::Param::FORMAT,
                        None,
                    );
                }
            }
        }

        res
    }

    fn pause_node(&mut self) -> Result<i32, Error> {
        match self.implementation.as_mut() {
            Some(implementation) => implementation.send_command(id::NodeCommand::PAUSE),
            None => Ok(0),
        }
    }

    fn idle_node(&mut self) -> Result<i32, Error> {
        // Entering idle while running physically pauses the node when
        // configured so; suspend-on-idle cascades further.
        if self.pause_on_idle
            && let Some(implementation) = self.implementation.as_mut()
        {
            implementation.send_command(id::NodeCommand::PAUSE)?;
        }

        Ok(0)
    }

    fn start_node(&mut self) -> Result<i32, Error> {
        if self.driver && !self.start_ready {
            return Err(Error::Busy);
        }

        match self.implementation.as_mut() {
            Some(implementation) => implementation.send_command(id::NodeCommand::START),
            None => Ok(0),
        }
    }

    /// Finalize a state change and publish it.
    pub(crate) fn update_state(&mut self, state: NodeState, res: i32, error: Option<String>) {
        let old = self.info.state;

        if old == state {
            return;
        }

        if state == NodeState::ERROR {
            tracing::error!(node = %self.name, res, ?error, "Node entered error state");
        } else {
            tracing::debug!(
                node = %self.name,
                "State {} -> {}",
                old.as_str(),
                state.as_str()
            );
        }

        self.info.state = state;
        self.info.error = error;
        self.info.error_res = res.min(0);
        self.info.change_mask |= NodeChangeMask::STATE;

        let error_ref = self.info.error.clone();
        self.listeners
            .emit(|l| l.state_changed(old, state, error_ref.as_deref()));
        self.emit_info();
    }

    /// Deliver an asynchronous completion.
    pub fn handle_result(&mut self, seq: u32, res: i32, error: Option<String>) {
        self.listeners.emit(|l| l.result(seq, res));

        let Some(state) = self.work.complete(seq) else {
            return;
        };

        if self.pending_seq == Some(seq) {
            self.pending_seq = None;
            self.pending_state = None;
        }

        if res < 0 {
            let message = error.unwrap_or_else(|| format!("async transition failed: {res}"));
            self.update_state(NodeState::ERROR, res, Some(message));
        } else {
            self.update_state(state, res, None);
        }
    }

    /// The idle cascade: pause, and optionally suspend.
    pub fn on_idle(&mut self) -> Result<()> {
        if self.info.state != NodeState::RUNNING {
            return Ok(());
        }

        if self.pause_on_idle {
            self.set_state(NodeState::IDLE)?;

            if self.suspend_on_idle {
                self.set_state(NodeState::SUSPENDED)?;
            }
        }

        Ok(())
    }

    /// Enumerate parameters, serving from the cache when it is complete.
    ///
    /// An unbounded uncached query replaces the cache with the collected
    /// results and marks the id complete.
    pub fn for_each_param(
        &mut self,
        seq: u32,
        param_id: id::Param,
        start: u32,
        num: u32,
        filter: Option<&Value>,
        callback: &mut dyn FnMut(u32, u32, Value),
    ) -> Result<()> {
        self.params
            .info(param_id)
            .with_context(|| format!("No param {param_id:?} on node {}", self.name))?;

        let num = if num == 0 { u32::MAX } else { num };

        if self.params.is_cached(param_id) {
            self.params.enumerate(param_id, start, num, filter, |index, next, value| {
                callback(index, next, value);
            })?;
            return Ok(());
        }

        let Some(implementation) = self.implementation.as_mut() else {
            bail!("Node {} has no implementation to enumerate", self.name);
        };

        let cache = self.cache_params && filter.is_none() && start == 0 && num == u32::MAX;

        if cache {
            self.params.begin_pending(param_id);
        }

        let pending = &mut self.params;
        let mut collect = |index: u32, next: u32, value: Value| {
            if cache {
                pending.push_pending(param_id, value.clone());
            }

            callback(index, next, value);
        };

        let res = implementation.enum_params(seq, param_id, start, num, filter, &mut collect);

        match res {
            Ok(_) => {
                if cache {
                    self.params.commit_pending();
                }

                Ok(())
            }
            Err(e) => {
                if cache {
                    self.params.abort_pending();
                }

                bail!("Enumerating {param_id:?} on {}: {e}", self.name)
            }
        }
    }

    /// Set a parameter on the node.
    pub fn set_param(&mut self, param_id: id::Param, param: Option<&Value>) -> Result<i32, Error> {
        let Some(implementation) = self.implementation.as_mut() else {
            return Err(Error::Io);
        };

        let res = implementation.set_param(param_id, param)?;
        self.listeners.emit(|l| l.param_changed(param_id));
        Ok(res)
    }

    /// Recompute and publish the latency params of every port.
    ///
    /// The latency of a port in direction `d` combines the opposite-direction
    /// latencies of every other port plus the implementation's process
    /// latency. Implementations flagged `CUSTOM_LATENCY` do this themselves.
    pub fn compute_latency(&mut self) -> Result<()> {
        if self.info.flags.contains(NodeFlags::CUSTOM_LATENCY) {
            return Ok(());
        }

        let process = self
            .implementation
            .as_mut()
            .and_then(|i| i.process_latency())
            .unwrap_or_default();

        for direction in [Direction::INPUT, Direction::OUTPUT] {
            let other = direction.reverse();

            let mut combined = LatencyInfo::new(direction);
            let mut first = true;

            for port in self.ports.iter(other) {
                let latency = &port.latency[direction.into_id() as usize];

                if first {
                    combined = *latency;
                    first = false;
                } else {
                    combined.combine(latency);
                }
            }

            combined.direction = direction;
            combined.add_process(&process);

            let ids: Vec<u32> = self.ports.iter(direction).map(|p| p.id).collect();

            for port_id in ids {
                let port = self.ports.get_mut(direction, port_id)?;
                port.set_param(id::Param::LATENCY, Some(combined.to_value()))?;
            }
        }

        Ok(())
    }

    /// Set a parameter on a port, informing the implementation.
    pub fn port_set_param(
        &mut self,
        direction: Direction,
        port_id: u32,
        param_id: id::Param,
        param: Option<Value>,
    ) -> Result<()> {
        let port = self.ports.get_mut(direction, port_id)?;
        port.set_param(param_id, param.clone())?;

        if let Some(implementation) = self.implementation.as_mut() {
            implementation
                .port_set_param(direction, port_id, param_id, param.as_ref())
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        self.emit_port_param_changed(direction, port_id, param_id);
        Ok(())
    }

    /// Install buffers on a port, informing the implementation.
    pub fn port_use_buffers(
        &mut self,
        direction: Direction,
        port_id: u32,
        buffers: BufferList,
    ) -> Result<()> {
        let port = self.ports.get_mut(direction, port_id)?;
        port.use_buffers(buffers.clone())?;

        if let Some(implementation) = self.implementation.as_mut() {
            implementation
                .port_use_buffers(direction, port_id, &buffers)
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        Ok(())
    }

    /// Install an io area on a port, informing the implementation.
    pub fn port_set_io(
        &mut self,
        direction: Direction,
        port_id: u32,
        ty: id::IoType,
        region: Option<Region<[u8]>>,
    ) -> Result<()> {
        let port = self.ports.get_mut(direction, port_id)?;
        port.set_io(ty, region.clone())?;

        if let Some(implementation) = self.implementation.as_mut() {
            implementation
                .port_set_io(direction, port_id, ty, region)
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        Ok(())
    }

    /// Publish accumulated info changes to the listeners.
    ///
    /// This is the only path that clears the change mask.
    pub fn emit_info(&mut self) {
        if self.params.take_changed() {
            self.info.change_mask |= NodeChangeMask::PARAMS;
        }

        if self.info.change_mask == NodeChangeMask::NONE {
            return;
        }

        self.info.n_params = self.params.infos().len() as u32;

        let info = self.info.clone();
        self.listeners.emit(|l| l.info_changed(&info));
        self.info.change_mask = NodeChangeMask::NONE;
    }

    /// Notify listeners that a port parameter changed.
    pub fn emit_port_param_changed(&mut self, direction: Direction, port_id: u32, id: id::Param) {
        self.listeners
            .emit(|l| l.port_param_changed(direction, port_id, id));
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.info.state)
            .field("driver", &self.driver)
            .field("driving", &self.driving)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemPool;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn node(name: &str) -> Node {
        let mut pool = MemPool::new();
        let activation = Activation::allocate(&mut pool, 1024, 48000).unwrap();
        Node::new(1, String::from(name), Properties::new(), activation)
    }

    struct AsyncImpl {
        replies: Vec<i32>,
    }

    impl NodeImpl for AsyncImpl {
        fn send_command(&mut self, _: id::NodeCommand) -> Result<i32, Error> {
            Ok(self.replies.pop().unwrap_or(0))
        }
    }

    struct StateCollector {
        states: std::sync::Mutex<Vec<(NodeState, NodeState)>>,
    }

    impl NodeEvents for StateCollector {
        fn state_changed(&self, old: NodeState, new: NodeState, _: Option<&str>) {
            self.states.lock().unwrap().push((old, new));
        }
    }

    #[test]
    fn sync_transition_applies_directly() {
        let mut node = node("sync");
        node.set_implementation(Box::new(AsyncImpl { replies: vec![0] }));

        node.set_state(NodeState::PAUSED).unwrap();
        assert_eq!(node.state(), NodeState::PAUSED);
    }

    #[test]
    fn async_transition_completes_later() {
        let mut node = node("async");
        node.set_implementation(Box::new(AsyncImpl {
            replies: vec![crate::async_seq(7)],
        }));

        // The work queue tracks its own sequence numbers; reuse the one the
        // implementation replied with.
        node.set_state(NodeState::PAUSED).unwrap();
        assert_eq!(node.state(), NodeState::CREATING);

        node.handle_result(7, 0, None);
        assert_eq!(node.state(), NodeState::PAUSED);
    }

    #[test]
    fn newer_transition_cancels_pending() {
        let mut node = node("cancel");
        node.set_implementation(Box::new(AsyncImpl {
            replies: vec![0, crate::async_seq(9)],
        }));

        node.set_state(NodeState::RUNNING).unwrap();
        assert_eq!(node.state(), NodeState::CREATING);

        // Request a different state; the old completion must no-op.
        node.set_state(NodeState::PAUSED).unwrap();
        assert_eq!(node.state(), NodeState::PAUSED);

        node.handle_result(9, 0, None);
        assert_eq!(node.state(), NodeState::PAUSED);
    }

    #[test]
    fn error_state_is_absorbing() {
        let mut node = node("error");
        node.update_state(NodeState::ERROR, -libc::EIO, Some(String::from("gone")));

        assert!(node.set_state(NodeState::RUNNING).is_err());
        assert_eq!(node.state(), NodeState::ERROR);

        // Explicit recovery through suspended is allowed.
        node.set_state(NodeState::SUSPENDED).unwrap();
        assert_eq!(node.state(), NodeState::SUSPENDED);
    }

    #[test]
    fn state_listener_sees_final_error() {
        let mut node = node("observer");

        let collector = Arc::new(StateCollector {
            states: std::sync::Mutex::new(Vec::new()),
        });
        node.add_listener(collector.clone());

        node.update_state(NodeState::ERROR, -libc::EPIPE, Some(String::from("hangup")));

        let states = collector.states.lock().unwrap();
        assert_eq!(states.last(), Some(&(NodeState::CREATING, NodeState::ERROR)));
    }

    #[test]
    fn properties_drive_scheduling_flags() {
        let mut pool = MemPool::new();
        let activation = Activation::allocate(&mut pool, 1024, 48000).unwrap();

        let mut props = Properties::new();
        props.insert(prop::NODE_DRIVER, "true");
        props.insert(prop::NODE_LATENCY, "512/48000");
        props.insert(prop::NODE_PASSIVE, "out");
        props.insert(prop::PRIORITY_DRIVER, "100");

        let node = Node::new(1, String::from("props"), props, activation);

        assert!(node.driver);
        assert_eq!(node.latency, Some((512, 48000)));
        assert!(node.passive_out);
        assert!(!node.passive_in);
        assert_eq!(node.priority_driver, 100);
    }

    #[test]
    fn suspend_clears_port_formats() {
        use pod::ObjectBuilder;

        let mut node = node("suspend");
        node.set_implementation(Box::new(AsyncImpl { replies: vec![0, 0] }));

        let port = node.ports.insert(Direction::OUTPUT);
        let format = ObjectBuilder::new(
            id::ObjectType::FORMAT.into_id(),
            id::Param::FORMAT.into_id(),
        )
        .property(id::Format::AUDIO_RATE.into_id(), 48000i32)
        .build_value();
        port.set_param(id::Param::FORMAT, Some(format)).unwrap();

        node.set_state(NodeState::SUSPENDED).unwrap();

        let port = node.ports.get(Direction::OUTPUT, 0).unwrap();
        assert!(port.format().is_none());
        assert_eq!(port.state, crate::port::PortState::Configure);
    }

    struct CountingImpl {
        enums: Arc<AtomicU32>,
        values: Vec<i32>,
    }

    impl NodeImpl for CountingImpl {
        fn enum_params(
            &mut self,
            _: u32,
            id: id::Param,
            _: u32,
            _: u32,
            _: Option<&Value>,
            result: &mut dyn FnMut(u32, u32, Value),
        ) -> Result<i32, Error> {
            self.enums.fetch_add(1, Ordering::Relaxed);

            for (i, v) in self.values.iter().enumerate() {
                let obj = pod::ObjectBuilder::new(
                    id::ObjectType::FORMAT.into_id(),
                    id.into_id(),
                )
                .property(id::Format::AUDIO_RATE.into_id(), *v)
                .build_value();

                result(i as u32, i as u32 + 1, obj);
            }

            Ok(0)
        }
    }

    #[test]
    fn unbounded_enum_populates_cache() {
        let mut node = node("cache");
        let enums = Arc::new(AtomicU32::new(0));

        node.set_implementation(Box::new(CountingImpl {
            enums: enums.clone(),
            values: vec![44100, 48000],
        }));

        let mut first = Vec::new();
        node.for_each_param(1, id::Param::ENUM_FORMAT, 0, 0, None, &mut |_, _, v| {
            first.push(v);
        })
        .unwrap();

        assert_eq!(enums.load(Ordering::Relaxed), 1);
        assert!(node.params.is_cached(id::Param::ENUM_FORMAT));

        // The second query is served locally and yields the same sequence.
        let mut second = Vec::new();
        node.for_each_param(2, id::Param::ENUM_FORMAT, 0, 0, None, &mut |_, _, v| {
            second.push(v);
        })
        .unwrap();

        assert_eq!(enums.load(Ordering::Relaxed), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn bounded_enum_does_not_cache() {
        let mut node = node("nocache");
        let enums = Arc::new(AtomicU32::new(0));

        node.set_implementation(Box::new(CountingImpl {
            enums: enums.clone(),
            values: vec![44100, 48000],
        }));

        let mut out = Vec::new();
        node.for_each_param(1, id::Param::ENUM_FORMAT, 0, 1, None, &mut |_, _, v| {
            out.push(v);
        })
        .unwrap();

        assert!(!node.params.is_cached(id::Param::ENUM_FORMAT));
    }
}
