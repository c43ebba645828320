//! The context owns every graph object.
//!
//! Nodes live in an arena and refer to each other by id, so driver and
//! follower relations never form ownership cycles. The context also owns the
//! memory pool, the data thread and the main-thread invocation queue.

use core::mem::offset_of;

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use pod::Value;
use runtime::consts::{ActivationCommand, Direction, NodeState};
use runtime::id;
use runtime::invoke::{self, InvokeQueue, InvokeReceiver};
use runtime::{Error, Properties, prop};
use slab::Slab;

use crate::activation::Activation;
use crate::buffer::{Buffer, BufferList, Data, Meta};
use crate::driver::DummyDriver;
use crate::ffi;
use crate::loop_::DataLoop;
use crate::memory::MemPool;
use crate::node::Node;
use crate::ptr::atomic;
use crate::rt::{RtEvents, RtNode};
use crate::rules::RuleSet;
use crate::target::Target;

/// Global tunables of a context.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Default cycle duration in frames.
    pub quantum: u64,
    /// Default clock rate in frames per second.
    pub rate: u32,
    /// Whether buffer memory may be locked into RAM.
    pub allow_mlock: bool,
    /// Warn when locking fails against the rlimit.
    pub warn_mlock: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quantum: runtime::consts::DEFAULT_QUANTUM,
            rate: runtime::consts::DEFAULT_RATE,
            allow_mlock: true,
            warn_mlock: false,
        }
    }
}

struct Link {
    output: (u32, u32),
    input: (u32, u32),
    io: crate::Region<ffi::IoBuffers>,
    active: bool,
}

/// The owner of all graph state on the main thread.
pub struct Context {
    // Dropped before the pool so the data thread never outlives a mapping.
    data_loop: Arc<DataLoop>,
    pool: MemPool,
    nodes: Slab<Node>,
    links: Slab<Link>,
    drivers: Vec<u32>,
    settings: Settings,
    stream_rules: RuleSet,
    filter_rules: RuleSet,
    main_queue: InvokeQueue<()>,
    main_recv: InvokeReceiver<()>,
    dummy_driver: Option<u32>,
}

impl Context {
    /// Construct a new context with its own data thread.
    pub fn new(settings: Settings) -> Result<Self> {
        let mut pool = MemPool::new();
        pool.set_mlock(settings.allow_mlock, settings.warn_mlock);

        let data_loop = Arc::new(DataLoop::spawn()?);
        let (main_queue, main_recv) = invoke::channel::<()>()?;

        Ok(Self {
            data_loop,
            pool,
            nodes: Slab::new(),
            links: Slab::new(),
            drivers: Vec::new(),
            settings,
            stream_rules: RuleSet::new(),
            filter_rules: RuleSet::new(),
            main_queue,
            main_recv,
            dummy_driver: None,
        })
    }

    /// The context settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Install the stream property rules.
    pub fn set_stream_rules(&mut self, rules: RuleSet) {
        self.stream_rules = rules;
    }

    /// Install the filter property rules.
    pub fn set_filter_rules(&mut self, rules: RuleSet) {
        self.filter_rules = rules;
    }

    /// The stream property rules.
    pub fn stream_rules(&self) -> &RuleSet {
        &self.stream_rules
    }

    /// The filter property rules.
    pub fn filter_rules(&self) -> &RuleSet {
        &self.filter_rules
    }

    /// The data thread handle.
    pub fn data_loop(&self) -> Arc<DataLoop> {
        self.data_loop.clone()
    }

    /// The main-thread invocation queue.
    pub fn main_queue(&self) -> InvokeQueue<()> {
        self.main_queue.clone()
    }

    /// Run queued main-thread work: deferred listener callbacks and driver
    /// start checks.
    pub fn iterate(&mut self) {
        self.main_recv.drain(&mut ());
        self.maybe_start_drivers();
    }

    fn key(id: u32) -> usize {
        (id - 1) as usize
    }

    /// Create a new node. The node is not registered yet.
    pub fn create_node(&mut self, name: &str, properties: Properties) -> Result<u32> {
        let activation =
            Activation::allocate(&mut self.pool, self.settings.quantum, self.settings.rate)?;

        let vacant = self.nodes.vacant_key();
        let id = vacant as u32 + 1;

        let node = Node::new(id, String::from(name), properties, activation);
        self.nodes.insert(node);

        tracing::debug!(id, name, "Created node");
        Ok(id)
    }

    /// Access a node.
    pub fn node_mut(&mut self, id: u32) -> Result<&mut Node> {
        let Some(node) = self.nodes.get_mut(Self::key(id)) else {
            bail!(Error::NoEntity);
        };

        Ok(node)
    }

    /// Access a node immutably.
    pub fn node(&self, id: u32) -> Result<&Node> {
        let Some(node) = self.nodes.get(Self::key(id)) else {
            bail!(Error::NoEntity);
        };

        Ok(node)
    }

    /// Iterate over every node.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().map(|(_, n)| n)
    }

    /// Register a node into the graph and assign its driver.
    ///
    /// Registration moves a creating node to suspended, the state connects
    /// negotiate from.
    pub fn register_node(&mut self, id: u32) -> Result<()> {
        let node = self.node_mut(id)?;

        if node.registered {
            return Ok(());
        }

        node.registered = true;
        let is_driver = node.driver;
        let priority = node.priority_driver;

        if node.state() == NodeState::CREATING {
            node.update_state(NodeState::SUSPENDED, 0, None);
        }

        if is_driver {
            // Drivers keep a priority ordering so assignment picks the best.
            let pos = self
                .drivers
                .iter()
                .position(|d| {
                    self.nodes
                        .get(Self::key(*d))
                        .is_none_or(|n| n.priority_driver < priority)
                })
                .unwrap_or(self.drivers.len());

            self.drivers.insert(pos, id);
        }

        self.assign_driver(id)?;
        Ok(())
    }

    fn assign_driver(&mut self, id: u32) -> Result<()> {
        let (is_driver, wants) = {
            let node = self.node(id)?;
            (node.driver, node.want_driver)
        };

        let driver_id = if is_driver {
            id
        } else if wants {
            match self.drivers.first().copied() {
                Some(driver) => driver,
                None => self.ensure_dummy_driver()?,
            }
        } else {
            id
        };

        let node = self.node_mut(id)?;
        node.driver_node = Some(driver_id);
        node.driving = is_driver && driver_id == id;
        Ok(())
    }

    /// Create the fallback timer driver when no real driver is registered.
    fn ensure_dummy_driver(&mut self) -> Result<u32> {
        if let Some(id) = self.dummy_driver {
            return Ok(id);
        }

        let mut properties = Properties::new();
        properties.insert(prop::NODE_NAME, "dummy-driver");
        properties.insert(prop::NODE_DRIVER, "true");
        properties.insert(prop::NODE_WANT_DRIVER, "false");
        properties.insert(prop::PRIORITY_DRIVER, "-1000");

        let id = self.create_node("dummy-driver", properties)?;

        let activation = self.node(id)?.activation().clone();
        let driver = DummyDriver::new(id, activation, self.data_loop.clone())?;

        self.node_mut(id)?.set_implementation(Box::new(driver));
        self.dummy_driver = Some(id);

        self.register_node(id)?;
        self.activate_node(id)?;
        Ok(id)
    }

    /// Add the node to the data loop and its driver's scheduling group.
    pub fn activate_node(&mut self, id: u32) -> Result<()> {
        let driver_id = {
            let node = self.node_mut(id)?;
            node.active = true;

            if node.added {
                return Ok(());
            }

            node.driver_node.context("Node has no driver assigned")?
        };

        let (activation, name, driver, driving, trigger, transport_sync, processor) = {
            let node = self.node_mut(id)?;
            let processor = node
                .implementation_mut()
                .and_then(|i| i.make_processor());

            (
                node.activation().clone(),
                node.name.clone(),
                node.driver,
                node.driving,
                node.trigger,
                node.transport_sync,
                processor,
            )
        };

        // Share the driver's position with the node implementation.
        let driver_activation = self.node(driver_id)?.activation().clone();
        let position = driver_activation
            .region()
            .as_bytes()
            .offset(offset_of!(ffi::NodeActivation, position), 8)?
            .size(core::mem::size_of::<ffi::IoPosition>())?;

        if let Some(implementation) = self.node_mut(id)?.implementation_mut() {
            implementation
                .set_io(id::IoType::POSITION, Some(position))
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        let driver_name = self.node(driver_id)?.name.clone();
        let driver_act = driver_activation.clone();
        let node_act = activation.clone();
        let node_id = id;

        self.data_loop.invoke_block(move |rt| {
            let mut node = RtNode::new(node_id, name, node_act.clone());
            node.driver = driver;
            node.driving = driving;
            node.trigger = trigger;
            node.transport_sync = transport_sync;
            node.processor = processor;

            if driving {
                // The driver targets itself so the cycle closes on it.
                let mut t = Target::new(node_id, node.name.clone(), node_act.clone());
                t.activate();
                node.targets.push(t);
            } else {
                // Followers release the driver when they finish. Trigger
                // nodes stay outside the pending accounting; their edges are
                // kept inactive so only explicit triggers schedule them.
                let mut t = Target::new(driver_id, driver_name, driver_act.clone());

                if !trigger {
                    t.activate();
                }

                node.targets.push(t);
            }

            rt.add_node(node);

            if !driving
                && let Some(driver_node) = rt.node_by_id_mut(driver_id)
            {
                // The driver wakes the follower at cycle start.
                let mut t = Target::new(node_id, String::new(), node_act);

                if !trigger {
                    t.activate();
                }

                driver_node.targets.push(t);
            }
        });

        let node = self.node_mut(id)?;
        node.added = true;

        if node.state() == NodeState::SUSPENDED {
            node.set_state(NodeState::PAUSED)?;
        }

        self.recalc_quantum(driver_id)?;
        self.maybe_start_drivers();
        Ok(())
    }

    /// Remove the node from the data loop and its driver's group.
    ///
    /// The data thread drops the node's targets before the main thread tears
    /// anything down.
    pub fn deactivate_node(&mut self, id: u32) -> Result<()> {
        let node = self.node_mut(id)?;
        node.active = false;

        if !node.added {
            return Ok(());
        }

        node.added = false;

        self.data_loop.invoke_block(move |rt| {
            rt.remove_node(id);
        });

        let node = self.node_mut(id)?;

        if node.state() == NodeState::RUNNING {
            node.on_idle()?;
        }

        Ok(())
    }

    /// Install a real-time event listener on a node.
    pub fn add_rt_listener(&mut self, id: u32, events: Arc<dyn RtEvents>) -> Result<()> {
        self.node(id)?;

        self.data_loop.invoke_block(move |rt| {
            if let Some(node) = rt.node_by_id_mut(id) {
                node.events.push(events);
            }
        });

        Ok(())
    }

    /// Destroy a node, draining it out of the graph first.
    pub fn destroy_node(&mut self, id: u32) -> Result<()> {
        self.deactivate_node(id)?;

        // Tear down the links touching the node.
        let stale: Vec<usize> = self
            .links
            .iter()
            .filter(|(_, l)| l.output.0 == id || l.input.0 == id)
            .map(|(k, _)| k)
            .collect();

        for key in stale {
            let link = self.links.remove(key);
            self.unlink_rt(&link);
            self.pool.free(link.io);
        }

        self.drivers.retain(|d| *d != id);

        let Some(mut node) = self.nodes.try_remove(Self::key(id)) else {
            bail!(Error::NoEntity);
        };

        let _ = node.set_state(NodeState::SUSPENDED);
        self.pool.free(node.activation().region().clone());

        tracing::debug!(id, "Destroyed node");
        Ok(())
    }

    /// Merge properties into a node and propagate scheduling changes.
    pub fn update_node_properties(&mut self, id: u32, properties: &Properties) -> Result<bool> {
        let node = self.node_mut(id)?;
        let changed = node.update_properties(properties);
        let driver_id = node.driver_node;
        node.emit_info();

        if changed && let Some(driver_id) = driver_id {
            self.recalc_quantum(driver_id)?;
        }

        Ok(changed)
    }

    /// Recompute the driver's target duration from its followers.
    ///
    /// A follower forcing the quantum wins; otherwise the smallest latency
    /// request of the group decides. Nodes locking the quantum keep the
    /// current value in place.
    fn recalc_quantum(&mut self, driver_id: u32) -> Result<()> {
        let mut quantum = None;
        let mut forced = None;
        let mut locked = false;

        for (_, node) in self.nodes.iter() {
            if node.driver_node != Some(driver_id) || !node.active {
                continue;
            }

            locked |= node.lock_quantum;

            if let Some(force) = node.force_quantum {
                forced = Some(u64::from(force));
            }

            if let Some((num, denom)) = node.latency {
                let frames = u64::from(num)
                    .saturating_mul(u64::from(self.settings.rate))
                    / u64::from(denom.max(1));
                quantum = Some(quantum.map_or(frames, |q: u64| q.min(frames)));
            }
        }

        let target = match forced {
            Some(forced) => forced,
            None if locked => return Ok(()),
            None => quantum.unwrap_or(self.settings.quantum),
        };

        let driver = self.node(driver_id)?;
        let a = driver.activation().region();
        crate::ptr::volatile!(a, position.clock.target_duration).write(target.max(1));
        Ok(())
    }

    /// Start every driver whose followers are all running.
    pub fn maybe_start_drivers(&mut self) {
        let driver_ids: Vec<u32> = self
            .drivers
            .iter()
            .copied()
            .chain(self.dummy_driver)
            .collect();

        for driver_id in driver_ids {
            let Ok(driver) = self.node(driver_id) else {
                continue;
            };

            if !driver.added || driver.state() == NodeState::RUNNING {
                continue;
            }

            let mut followers = 0;
            let all_running = self
                .nodes
                .iter()
                .filter(|(_, n)| {
                    n.id != driver_id && n.driver_node == Some(driver_id) && n.active
                })
                .all(|(_, n)| {
                    followers += 1;
                    n.state() == NodeState::RUNNING
                });

            // An empty group keeps its driver idle.
            if followers == 0 || !all_running {
                continue;
            }

            let Ok(driver) = self.node_mut(driver_id) else {
                continue;
            };

            driver.start_ready = true;

            if driver.set_state(NodeState::RUNNING).is_ok()
                && driver.state() == NodeState::RUNNING
            {
                driver.driving = true;
                driver.activation().send_command(ActivationCommand::START);
            }
        }
    }

    /// Connect an output port to an input port.
    ///
    /// Negotiates a format both ends accept, allocates the shared buffer set
    /// and the io area, and adds the scheduling edge so the producer wakes
    /// the consumer.
    #[tracing::instrument(skip(self))]
    pub fn link(
        &mut self,
        output_node: u32,
        output_port: u32,
        input_node: u32,
        input_port: u32,
    ) -> Result<u32> {
        let format = self.negotiate_format(output_node, output_port, input_node, input_port)?;

        self.node_mut(output_node)?.port_set_param(
            Direction::OUTPUT,
            output_port,
            id::Param::FORMAT,
            Some(format.clone()),
        )?;
        self.node_mut(input_node)?.port_set_param(
            Direction::INPUT,
            input_port,
            id::Param::FORMAT,
            Some(format.clone()),
        )?;

        // Buffer geometry from the output port's buffers param, when given.
        let (n_buffers, size) = self.buffer_geometry(output_node, output_port)?;
        let buffers = self.alloc_buffers(n_buffers, size)?;

        self.node_mut(output_node)?.port_use_buffers(
            Direction::OUTPUT,
            output_port,
            buffers.clone(),
        )?;
        self.node_mut(input_node)?.port_use_buffers(
            Direction::INPUT,
            input_port,
            buffers.clone(),
        )?;

        // One shared io area hands buffers across the link.
        let io = self
            .pool
            .alloc(core::mem::size_of::<ffi::IoBuffers>(), MemPool::default_flags())?
            .cast::<ffi::IoBuffers>()?;

        atomic!(io, status).store(runtime::flags::Status::NEED_DATA);
        atomic!(io, buffer_id).store(u32::MAX);

        self.node_mut(output_node)?.port_set_io(
            Direction::OUTPUT,
            output_port,
            id::IoType::BUFFERS,
            Some(io.as_bytes()),
        )?;
        self.node_mut(input_node)?.port_set_io(
            Direction::INPUT,
            input_port,
            id::IoType::BUFFERS,
            Some(io.as_bytes()),
        )?;

        // The producer wakes the consumer within the cycle.
        let consumer_activation = self.node(input_node)?.activation().clone();
        let consumer_name = self.node(input_node)?.name.clone();

        self.data_loop.invoke_block(move |rt| {
            if let Some(producer) = rt.node_by_id_mut(output_node) {
                let mut t = Target::new(input_node, consumer_name, consumer_activation);
                t.activate();
                producer.targets.push(t);
            }
        });

        let key = self.links.insert(Link {
            output: (output_node, output_port),
            input: (input_node, input_port),
            io,
            active: true,
        });

        // Both ends may flow now.
        for (node_id, _) in [(output_node, output_port), (input_node, input_port)] {
            let node = self.node_mut(node_id)?;

            if node.active && node.state() != NodeState::RUNNING && !node.driving {
                node.set_state(NodeState::RUNNING)?;
            }

            self.node_mut(node_id)?.compute_latency()?;
        }

        self.maybe_start_drivers();

        tracing::info!(
            output_node,
            output_port,
            input_node,
            input_port,
            "Linked ports"
        );

        Ok(key as u32 + 1)
    }

    /// Destroy a link.
    pub fn unlink(&mut self, link_id: u32) -> Result<()> {
        let Some(link) = self.links.try_remove((link_id - 1) as usize) else {
            bail!(Error::NoEntity);
        };

        self.unlink_rt(&link);

        let (output_node, output_port) = link.output;
        let (input_node, input_port) = link.input;

        if let Ok(node) = self.node_mut(output_node) {
            let _ = node.port_set_io(Direction::OUTPUT, output_port, id::IoType::BUFFERS, None);
        }

        if let Ok(node) = self.node_mut(input_node) {
            let _ = node.port_set_io(Direction::INPUT, input_port, id::IoType::BUFFERS, None);
        }

        self.pool.free(link.io);
        Ok(())
    }

    fn unlink_rt(&mut self, link: &Link) {
        if !link.active {
            return;
        }

        let (output_node, _) = link.output;
        let (input_node, _) = link.input;

        self.data_loop.invoke_block(move |rt| {
            if let Some(producer) = rt.node_by_id_mut(output_node) {
                // Only the link edge goes; a coinciding driver edge stays.
                if let Some(pos) = producer.targets.iter().rposition(|t| t.id == input_node) {
                    producer.targets.remove(pos);
                }
            }
        });
    }

    fn negotiate_format(
        &mut self,
        output_node: u32,
        output_port: u32,
        input_node: u32,
        input_port: u32,
    ) -> Result<Value> {
        let mut offered = Vec::new();
        {
            let node = self.node_mut(output_node)?;
            let port = node.ports.get(Direction::OUTPUT, output_port)?;
            port.params
                .enumerate(id::Param::ENUM_FORMAT, 0, 0, None, |_, _, v| offered.push(v))?;
        }

        let mut accepted = Vec::new();
        {
            let node = self.node_mut(input_node)?;
            let port = node.ports.get(Direction::INPUT, input_port)?;
            port.params
                .enumerate(id::Param::ENUM_FORMAT, 0, 0, None, |_, _, v| accepted.push(v))?;
        }

        if offered.is_empty() || accepted.is_empty() {
            bail!("Link has no formats to negotiate with");
        }

        for offer in &offered {
            for accept in &accepted {
                let Ok(mut format) = pod::filter(offer, Some(accept)) else {
                    continue;
                };

                pod::fixate(&mut format).map_err(|e| anyhow::anyhow!("{e}"))?;
                return Ok(format);
            }
        }

        bail!(Error::NotSupported)
    }

    fn buffer_geometry(&mut self, node_id: u32, port_id: u32) -> Result<(usize, usize)> {
        let node = self.node(node_id)?;
        let port = node.ports.get(Direction::OUTPUT, port_id)?;

        let mut n_buffers = 4usize;
        let mut size = 4096usize;

        if let Some(blob) = port.params.iter(id::Param::BUFFERS).next()
            && let Some(obj) = blob.value.as_object()
        {
            if let Some(n) = obj
                .value(id::ParamBuffers::BUFFERS.into_id())
                .and_then(buffers_default)
            {
                n_buffers = n as usize;
            }

            if let Some(s) = obj
                .value(id::ParamBuffers::SIZE.into_id())
                .and_then(buffers_default)
            {
                size = s as usize;
            }
        }

        if n_buffers > runtime::consts::MAX_BUFFERS {
            bail!(Error::NoSpace);
        }

        Ok((n_buffers, size))
    }

    /// Allocate a shared buffer set: busy meta, chunk and one data plane per
    /// buffer.
    fn alloc_buffers(&mut self, n_buffers: usize, size: usize) -> Result<BufferList> {
        let mut buffers = Vec::with_capacity(n_buffers);

        for buffer_id in 0..n_buffers {
            let meta = self.pool.alloc(
                core::mem::size_of::<ffi::MetaBusy>() + core::mem::size_of::<ffi::Chunk>(),
                MemPool::default_flags(),
            )?;

            let busy = meta.cast::<ffi::MetaBusy>()?;
            self.pool.track(&meta);

            let chunk = meta
                .offset(core::mem::size_of::<ffi::MetaBusy>(), 8)?
                .cast::<ffi::Chunk>()?;

            atomic!(busy, count).store(0);

            let data = self.pool.alloc(size, MemPool::default_flags())?;

            let plane = Data {
                ty: id::DataType::MEM_FD,
                flags: runtime::flags::DataFlag::READWRITE | runtime::flags::DataFlag::MAPPABLE,
                region: data,
                chunk,
                max_size: size,
            };

            buffers.push(Arc::new(Buffer::new(
                buffer_id as u32,
                Vec::<Meta>::new(),
                vec![plane],
                Some(busy),
                true,
            )));
        }

        Ok(Arc::new(buffers))
    }

}

impl Drop for Context {
    fn drop(&mut self) {
        let ids: Vec<u32> = self.nodes.iter().map(|(_, n)| n.id).collect();

        for id in ids {
            let _ = self.destroy_node(id);
        }
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("drivers", &self.drivers)
            .finish_non_exhaustive()
    }
}

fn buffers_default(value: &Value) -> Option<i32> {
    match value {
        Value::Choice(c) => c.default_value().and_then(Value::as_int),
        value => value.as_int(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_stable_and_nonzero() {
        let mut context = Context::new(Settings::default()).unwrap();

        let a = context.create_node("a", Properties::new()).unwrap();
        let b = context.create_node("b", Properties::new()).unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(context.node(a).unwrap().name, "a");

        context.destroy_node(a).unwrap();
        assert!(context.node(a).is_err());
        assert!(context.node(b).is_ok());
    }

    #[test]
    fn registration_assigns_dummy_driver() {
        let mut context = Context::new(Settings::default()).unwrap();

        let id = context.create_node("follower", Properties::new()).unwrap();
        context.register_node(id).unwrap();

        let node = context.node(id).unwrap();
        let driver = node.driver_node.unwrap();
        assert_ne!(driver, id);

        let driver = context.node(driver).unwrap();
        assert!(driver.driver);
        assert_eq!(driver.name, "dummy-driver");
    }

    #[test]
    fn driver_priority_orders_assignment() {
        let mut context = Context::new(Settings::default()).unwrap();

        let mut props = Properties::new();
        props.insert(prop::NODE_DRIVER, "true");
        props.insert(prop::PRIORITY_DRIVER, "10");
        let low = context.create_node("low", props).unwrap();
        context.register_node(low).unwrap();

        let mut props = Properties::new();
        props.insert(prop::NODE_DRIVER, "true");
        props.insert(prop::PRIORITY_DRIVER, "100");
        let high = context.create_node("high", props).unwrap();
        context.register_node(high).unwrap();

        let follower = context.create_node("f", Properties::new()).unwrap();
        context.register_node(follower).unwrap();

        assert_eq!(context.node(follower).unwrap().driver_node, Some(high));
    }

    #[test]
    fn registration_moves_creating_to_suspended() {
        let mut context = Context::new(Settings::default()).unwrap();

        let id = context.create_node("n", Properties::new()).unwrap();
        assert_eq!(context.node(id).unwrap().state(), NodeState::CREATING);

        context.register_node(id).unwrap();
        assert_eq!(context.node(id).unwrap().state(), NodeState::SUSPENDED);
    }
}
