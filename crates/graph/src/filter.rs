//! A filter, the multi-port facade over a node.
//!
//! Unlike a stream, a filter owns an arbitrary set of input and output ports
//! and processes them all in one callback: inputs are drained from their io
//! slots first, then the callback runs, then outputs are refilled.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result, bail};
use pod::Value;
use runtime::consts::{Direction, StreamState};
use runtime::flags::{ParamBlobFlag, Status, StreamFlags};
use runtime::id;
use runtime::invoke::InvokeQueue;
use runtime::{Error, Properties, prop};

use crate::buffer::Buffer;
use crate::node::{NodeEvents, NodeImpl};
use crate::port::PortShared;
use crate::ptr::atomic;
use crate::rt::Processor;
use crate::Context;

/// Listener callbacks of a filter.
#[allow(unused_variables)]
pub trait FilterEvents: Send + Sync {
    /// The filter moved to a new state.
    fn state_changed(&self, old: StreamState, new: StreamState, error: Option<&str>) {}

    /// A parameter changed on the filter or one of its ports.
    fn param_changed(&self, port_id: Option<u32>, id: id::Param, param: Option<&Value>) {}

    /// Data can be moved on the ports.
    fn process(&self) {}

    /// All queued data was consumed.
    fn drained(&self) {}
}

struct FilterShared {
    name: String,
    flags: StreamFlags,
    state: AtomicU32,
    listener: Mutex<Option<Arc<dyn FilterEvents>>>,
    inputs: Mutex<Vec<Arc<PortShared>>>,
    outputs: Mutex<Vec<Arc<PortShared>>>,
    draining: AtomicBool,
    drained: AtomicBool,
    main: InvokeQueue<()>,
}

impl FilterShared {
    fn listener(&self) -> Option<Arc<dyn FilterEvents>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn ports(&self, direction: Direction) -> Vec<Arc<PortShared>> {
        match direction {
            Direction::INPUT => self.inputs.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            _ => self.outputs.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    fn set_state(&self, state: StreamState, error: Option<String>) {
        let old = StreamState::from_id(self.state.swap(state.into_id(), Ordering::AcqRel));

        if old == state {
            return;
        }

        if let Some(listener) = self.listener() {
            listener.state_changed(old, state, error.as_deref());
        }
    }

    fn call_process(&self) {
        let Some(listener) = self.listener() else {
            return;
        };

        if self.flags.contains(StreamFlags::RT_PROCESS) {
            listener.process();
        } else {
            self.main.invoke(move |_| listener.process());
        }
    }
}

struct FilterProcessor {
    shared: Arc<FilterShared>,
}

impl Processor for FilterProcessor {
    fn process(&mut self) -> i32 {
        let shared = &self.shared;
        let mut status = Status::OK;

        // Pull arrived buffers off every input io slot.
        for port in shared.ports(Direction::INPUT) {
            let Some(io) = port.io() else {
                continue;
            };

            let io_status = atomic!(io, status).load();
            let buffer_id = atomic!(io, buffer_id).load();

            if io_status.contains(Status::HAVE_DATA)
                && let Some(buffer) = port.get_buffer(buffer_id)
                && port.queue_push(&port.dequeued, &buffer).is_ok()
            {
                buffer.busy_inc();
            }
        }

        shared.call_process();

        // Refill every output io slot.
        let mut have_data = false;
        let mut all_empty = true;

        for port in shared.ports(Direction::OUTPUT) {
            let Some(io) = port.io() else {
                continue;
            };

            if atomic!(io, status).load().contains(Status::HAVE_DATA) {
                have_data = true;
                continue;
            }

            let old_id = atomic!(io, buffer_id).load();

            if let Some(buffer) = port.get_buffer(old_id) {
                let _ = port.queue_push(&port.dequeued, &buffer);
            }

            match port.queue_pop(&port.queued) {
                Ok(buffer) => {
                    shared.drained.store(false, Ordering::Release);
                    atomic!(io, buffer_id).store(buffer.id);
                    atomic!(io, status).store(Status::HAVE_DATA);
                    have_data = true;
                    all_empty = false;
                }
                Err(_) => {
                    atomic!(io, buffer_id).store(u32::MAX);
                    atomic!(io, status).store(Status::NEED_DATA);
                }
            }
        }

        // Recycle input buffers back to the producers.
        for port in shared.ports(Direction::INPUT) {
            let Some(io) = port.io() else {
                continue;
            };

            if let Ok(buffer) = port.queue_pop(&port.queued) {
                atomic!(io, buffer_id).store(buffer.id);
            } else {
                atomic!(io, buffer_id).store(u32::MAX);
            }

            atomic!(io, status).store(Status::NEED_DATA);
            status |= Status::NEED_DATA;
        }

        if have_data {
            status |= Status::HAVE_DATA;
        } else if all_empty
            && shared.draining.load(Ordering::Acquire)
            && !shared.drained.swap(true, Ordering::AcqRel)
        {
            shared.draining.store(false, Ordering::Release);

            if let Some(listener) = shared.listener() {
                listener.drained();
            }

            status |= Status::DRAINED;
        }

        status.into_raw()
    }
}

struct FilterImpl {
    shared: Arc<FilterShared>,
}

impl NodeImpl for FilterImpl {
    fn port_set_param(
        &mut self,
        _direction: Direction,
        port_id: u32,
        param_id: id::Param,
        param: Option<&Value>,
    ) -> Result<i32, Error> {
        if let Some(listener) = self.shared.listener() {
            listener.param_changed(Some(port_id), param_id, param);
        }

        Ok(0)
    }

    fn set_param(&mut self, param_id: id::Param, param: Option<&Value>) -> Result<i32, Error> {
        if let Some(listener) = self.shared.listener() {
            listener.param_changed(None, param_id, param);
        }

        Ok(0)
    }

    fn send_command(&mut self, command: id::NodeCommand) -> Result<i32, Error> {
        match command {
            id::NodeCommand::START => {
                self.shared.set_state(StreamState::STREAMING, None);
            }
            id::NodeCommand::PAUSE | id::NodeCommand::SUSPEND => {
                self.shared.set_state(StreamState::PAUSED, None);
            }
            _ => {}
        }

        Ok(0)
    }

    fn make_processor(&mut self) -> Option<Box<dyn Processor>> {
        Some(Box::new(FilterProcessor {
            shared: self.shared.clone(),
        }))
    }
}

struct FilterObserver {
    shared: Arc<FilterShared>,
}

impl NodeEvents for FilterObserver {
    fn state_changed(
        &self,
        _old: runtime::consts::NodeState,
        new: runtime::consts::NodeState,
        error: Option<&str>,
    ) {
        use runtime::consts::NodeState;

        let mapped = match new {
            NodeState::ERROR => StreamState::ERROR,
            NodeState::CREATING | NodeState::SUSPENDED => StreamState::CONNECTING,
            NodeState::IDLE | NodeState::PAUSED => StreamState::PAUSED,
            NodeState::RUNNING => StreamState::STREAMING,
            _ => return,
        };

        self.shared.set_state(mapped, error.map(String::from));
    }
}

/// A multi-port processing facade.
pub struct Filter {
    shared: Arc<FilterShared>,
    properties: Properties,
    node_id: Option<u32>,
    observer_cookie: Option<u64>,
    data_loop: Arc<crate::DataLoop>,
}

impl Filter {
    /// Allocate a new unconnected filter.
    pub fn new(context: &Context, name: &str, mut properties: Properties) -> Self {
        if properties.get(prop::NODE_NAME).is_none() {
            properties.insert(prop::NODE_NAME, name);
        }

        if properties.get(prop::NODE_WANT_DRIVER).is_none() {
            properties.insert(prop::NODE_WANT_DRIVER, "true");
        }

        context.filter_rules().apply(&mut properties);

        let shared = Arc::new(FilterShared {
            name: String::from(name),
            flags: StreamFlags::NONE,
            state: AtomicU32::new(StreamState::UNCONNECTED.into_id()),
            listener: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            draining: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            main: context.main_queue(),
        });

        Self {
            shared,
            properties,
            node_id: None,
            observer_cookie: None,
            data_loop: context.data_loop(),
        }
    }

    /// The filter name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The current state.
    pub fn state(&self) -> StreamState {
        StreamState::from_id(self.shared.state.load(Ordering::Acquire))
    }

    /// The node backing the filter, when connected.
    pub fn node_id(&self) -> Option<u32> {
        self.node_id
    }

    /// Install the listener.
    pub fn set_listener(&mut self, listener: Arc<dyn FilterEvents>) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    /// Connect the filter into the graph, without ports yet.
    #[tracing::instrument(skip(self, context), fields(filter = %self.shared.name))]
    pub fn connect(&mut self, context: &mut Context, flags: StreamFlags) -> Result<()> {
        if self.node_id.is_some() {
            bail!(Error::Busy);
        }

        let Some(shared) = Arc::get_mut(&mut self.shared) else {
            bail!("Filter shared state already aliased before connect");
        };

        shared.flags = flags;

        self.shared.set_state(StreamState::CONNECTING, None);

        let node_id = context.create_node(&self.shared.name, self.properties.clone())?;

        {
            let node = context.node_mut(node_id)?;
            node.set_implementation(Box::new(FilterImpl {
                shared: self.shared.clone(),
            }));

            let observer = Arc::new(FilterObserver {
                shared: self.shared.clone(),
            });
            self.observer_cookie = Some(node.add_listener(observer));
        }

        self.node_id = Some(node_id);
        context.register_node(node_id)?;

        if !flags.contains(StreamFlags::INACTIVE) {
            context.activate_node(node_id)?;
        }

        Ok(())
    }

    /// Add a port to the connected filter.
    pub fn add_port(
        &mut self,
        context: &mut Context,
        direction: Direction,
        params: Vec<Value>,
    ) -> Result<u32> {
        let node_id = self.node_id.context("Filter is not connected")?;
        let node = context.node_mut(node_id)?;

        let port = node.ports.insert(direction);
        let port_id = port.id;

        for param in params {
            let id = param
                .as_object()
                .map(|o| id::Param::from_id(o.object_id))
                .unwrap_or(id::Param::INVALID);
            port.params.add(id, ParamBlobFlag::NONE, param)?;
        }

        let shared = port.shared().clone();

        let list = match direction {
            Direction::INPUT => &self.shared.inputs,
            _ => &self.shared.outputs,
        };

        list.lock().unwrap_or_else(|e| e.into_inner()).push(shared);
        Ok(port_id)
    }

    /// Remove a port from the filter.
    pub fn remove_port(
        &mut self,
        context: &mut Context,
        direction: Direction,
        port_id: u32,
    ) -> Result<()> {
        let node_id = self.node_id.context("Filter is not connected")?;
        let node = context.node_mut(node_id)?;

        let Some(port) = node.ports.remove(direction, port_id) else {
            bail!(Error::NoEntity);
        };

        let removed = port.shared().clone();
        let list = match direction {
            Direction::INPUT => &self.shared.inputs,
            _ => &self.shared.outputs,
        };

        list.lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|p| !Arc::ptr_eq(p, &removed));
        Ok(())
    }

    /// Take a buffer from a port.
    pub fn dequeue_buffer(&self, direction: Direction, index: usize) -> Result<Arc<Buffer>, Error> {
        let ports = self.shared.ports(direction);
        let port = ports.get(index).ok_or(Error::NoEntity)?;
        port.queue_pop(&port.dequeued)
    }

    /// Hand a buffer back to a port.
    pub fn queue_buffer(
        &self,
        direction: Direction,
        index: usize,
        buffer: &Arc<Buffer>,
    ) -> Result<(), Error> {
        let ports = self.shared.ports(direction);
        let port = ports.get(index).ok_or(Error::NoEntity)?;

        if direction == Direction::INPUT {
            buffer.busy_dec();
        }

        port.queue_push(&port.queued, buffer)
    }

    /// Flush the filter ports.
    pub fn flush(&self, drain: bool) -> Result<()> {
        let shared = self.shared.clone();

        self.data_loop.invoke_block(move |_| {
            if drain {
                shared.draining.store(true, Ordering::Release);
                shared.drained.store(false, Ordering::Release);
                return;
            }

            for port in shared.ports(Direction::OUTPUT) {
                port.clear_queues();

                for buffer in port.buffers().iter() {
                    let _ = port.queue_push(&port.dequeued, buffer);
                }
            }

            for port in shared.ports(Direction::INPUT) {
                port.clear_queues();
            }
        });

        Ok(())
    }

    /// Disconnect and destroy the internal node.
    pub fn disconnect(&mut self, context: &mut Context) -> Result<()> {
        let Some(node_id) = self.node_id.take() else {
            return Ok(());
        };

        if let Some(cookie) = self.observer_cookie.take()
            && let Ok(node) = context.node_mut(node_id)
        {
            node.remove_listener(cookie);
        }

        context.destroy_node(node_id)?;

        self.shared.inputs.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.shared.outputs.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.shared.set_state(StreamState::UNCONNECTED, None);
        Ok(())
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("node", &self.node_id)
            .finish_non_exhaustive()
    }
}
