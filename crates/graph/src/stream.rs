//! A stream, the single-port facade over a node.
//!
//! Producers connect an output stream and queue filled buffers; consumers
//! connect an input stream and dequeue them. The process callback runs either
//! directly on the data thread or is posted to the main loop.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result, bail};
use pod::Value;
use runtime::consts::{Direction, StreamState};
use runtime::flags::{Status, StreamFlags};
use runtime::id;
use runtime::invoke::InvokeQueue;
use runtime::{Error, Properties, prop};

use crate::buffer::Buffer;
use crate::control::Control;
use crate::ffi;
use crate::memory::Region;
use crate::node::{NodeEvents, NodeImpl};
use crate::port::PortShared;
use crate::ptr::{atomic, volatile};
use crate::rt::Processor;
use crate::{Context, latency::ProcessLatency};

/// How often the realtime output path may re-enter the process callback
/// within one cycle before yielding to the next wakeup.
const MAX_PROCESS_LOOPS: u32 = 2;

/// A consistent snapshot of the stream clock.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Time {
    /// Monotonic time of the snapshot in nanoseconds.
    pub now: u64,
    /// The rate of ticks and delay.
    pub rate: (u32, u32),
    /// Stream position in samples, monotonically nondecreasing.
    pub ticks: u64,
    /// Delay to the playback or capture point.
    pub delay: i64,
    /// Bytes queued in the stream but not yet processed.
    pub queued: u64,
    /// The duration of one cycle in samples.
    pub quantum: u64,
    /// The number of samples the graph wants in the next cycle.
    pub size: u32,
}

#[derive(Default)]
struct TimeData {
    time: Time,
    base_pos: u64,
    clock_id: u32,
}

/// Writer-side sequence lock around the stream time.
struct TimeLock {
    seq: AtomicU32,
    data: UnsafeCell<TimeData>,
}

// SAFETY: The data is only written inside the odd windows of `seq` by the
// single data thread; readers retry until they observe an even, unchanged
// sequence.
unsafe impl Sync for TimeLock {}
unsafe impl Send for TimeLock {}

impl TimeLock {
    fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            data: UnsafeCell::new(TimeData::default()),
        }
    }

    /// Update the snapshot; data-thread only.
    fn write(&self, f: impl FnOnce(&mut TimeData)) {
        self.seq.fetch_add(1, Ordering::Release);

        // SAFETY: Only the data thread writes and it is inside the odd
        // window.
        unsafe {
            f(&mut *self.data.get());
        }

        self.seq.fetch_add(1, Ordering::Release);
    }

    /// Read a consistent snapshot.
    fn read(&self) -> Time {
        loop {
            let before = self.seq.load(Ordering::Acquire);

            if before & 1 != 0 {
                core::hint::spin_loop();
                continue;
            }

            // SAFETY: Torn reads are detected by the sequence re-check.
            let time = unsafe { (*self.data.get()).time };

            if self.seq.load(Ordering::Acquire) == before {
                return time;
            }
        }
    }
}

/// Listener callbacks of a stream.
#[allow(unused_variables)]
pub trait StreamEvents: Send + Sync {
    /// The stream moved to a new state.
    fn state_changed(&self, old: StreamState, new: StreamState, error: Option<&str>) {}

    /// A parameter changed on the stream.
    fn param_changed(&self, id: id::Param, param: Option<&Value>) {}

    /// An io area changed.
    fn io_changed(&self, ty: id::IoType) {}

    /// A buffer joined the stream.
    fn add_buffer(&self, id: u32) {}

    /// A buffer left the stream.
    fn remove_buffer(&self, id: u32) {}

    /// Data can be dequeued or queued.
    fn process(&self) {}

    /// All queued data was played.
    fn drained(&self) {}

    /// An explicitly triggered cycle completed.
    fn trigger_done(&self) {}

    /// A control was discovered or changed.
    fn control_info(&self, id: u32, control: &Control) {}

    /// A command reached the stream node.
    fn command(&self, command: id::NodeCommand) {}
}

pub(crate) struct StreamShared {
    name: String,
    direction: Direction,
    flags: StreamFlags,
    state: AtomicU32,
    error: Mutex<Option<String>>,
    port: Mutex<Option<Arc<PortShared>>>,
    position: Mutex<Option<Region<ffi::IoPosition>>>,
    listener: Mutex<Option<Arc<dyn StreamEvents>>>,
    controls: Mutex<Vec<Control>>,
    time: TimeLock,
    draining: AtomicBool,
    drained: AtomicBool,
    driving: AtomicBool,
    using_trigger: AtomicBool,
    trigger_warned: AtomicBool,
    node_id: AtomicU32,
    driver_id: AtomicU32,
    main: InvokeQueue<()>,
}

impl StreamShared {
    fn listener(&self) -> Option<Arc<dyn StreamEvents>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn port(&self) -> Option<Arc<PortShared>> {
        self.port.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn position(&self) -> Option<Region<ffi::IoPosition>> {
        self.position.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn state(&self) -> StreamState {
        StreamState::from_id(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: StreamState, error: Option<String>) -> bool {
        let old = StreamState::from_id(self.state.swap(state.into_id(), Ordering::AcqRel));

        if old == state {
            return false;
        }

        if state == StreamState::ERROR {
            tracing::error!(stream = %self.name, ?error, "Stream error");
        }

        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = error.clone();

        if let Some(listener) = self.listener() {
            listener.state_changed(old, state, error.as_deref());
        }

        true
    }

    fn process_rt(&self) -> bool {
        self.flags.contains(StreamFlags::RT_PROCESS)
    }

    fn call_process(&self) {
        let Some(listener) = self.listener() else {
            return;
        };

        if self.process_rt() {
            listener.process();
        } else {
            self.main.invoke(move |_| listener.process());
        }
    }

    fn call_trigger_done(&self) {
        let Some(listener) = self.listener() else {
            return;
        };

        if self.process_rt() {
            listener.trigger_done();
        } else {
            self.main.invoke(move |_| listener.trigger_done());
        }
    }

    fn call_drained(&self) {
        let Some(listener) = self.listener() else {
            return;
        };

        if self.process_rt() {
            listener.drained();
        } else {
            self.main.invoke(move |_| listener.drained());
        }
    }

    /// Take a consistent snapshot of the position into the time lock.
    fn copy_position(&self, queued: u64) {
        let position = self.position();
        let rate_match = self.port().and_then(|p| p.rate_match());

        self.time.write(|d| {
            if let Some(p) = &position {
                d.time.now = volatile!(p, clock.nsec).read();

                let rate = volatile!(p, clock.rate).read();
                d.time.rate = (rate.num, rate.denom);

                let clock_id = volatile!(p, clock.id).read();
                let pos = volatile!(p, clock.position).read();

                if d.clock_id != clock_id {
                    d.base_pos = pos.wrapping_sub(d.time.ticks);
                    d.clock_id = clock_id;
                }

                d.time.ticks = pos.wrapping_sub(d.base_pos);
                d.time.delay = 0;
                d.time.queued = queued;
                d.time.quantum = volatile!(p, clock.duration).read();
            }

            d.time.size = match &rate_match {
                Some(rm) => volatile!(rm, size).read(),
                None => d.time.quantum as u32,
            };
        });
    }
}

/// Cycles between statistic reports.
const STATS_INTERVAL: u32 = 8192;

/// The data-thread half of a stream.
struct StreamProcessor {
    shared: Arc<StreamShared>,
    stats: crate::Stats,
    cycles: u32,
}

impl Processor for StreamProcessor {
    fn process(&mut self) -> i32 {
        let status = match self.shared.direction {
            Direction::INPUT => self.process_input(),
            _ => self.process_output(),
        };

        self.cycles = self.cycles.wrapping_add(1);

        if self.cycles % STATS_INTERVAL == 0 {
            self.stats.report();
        }

        status
    }
}

impl StreamProcessor {
    fn process_input(&mut self) -> i32 {
        let shared = &self.shared;

        let Some(port) = shared.port() else {
            return Error::Io.status();
        };

        let Some(io) = port.io() else {
            return Error::Io.status();
        };

        let status = atomic!(io, status).load();
        let buffer_id = atomic!(io, buffer_id).load();

        if status.contains(Status::HAVE_DATA)
            && let Some(buffer) = port.get_buffer(buffer_id)
            && port.queue_push(&port.dequeued, &buffer).is_ok()
        {
            buffer.busy_inc();
        }

        shared.copy_position(port.dequeued.incount());

        if !port.dequeued.is_empty() {
            shared.call_process();
        }

        if !status.contains(Status::NEED_DATA) || buffer_id == u32::MAX {
            // Pop a buffer to recycle back to the producer.
            match port.queue_pop(&port.queued) {
                Ok(buffer) => {
                    atomic!(io, buffer_id).store(buffer.id);
                }
                Err(_) => {
                    self.stats.no_input_buffer += 1;
                    atomic!(io, buffer_id).store(u32::MAX);
                }
            }

            atomic!(io, status).store(Status::NEED_DATA);
        }

        if shared.driving.load(Ordering::Acquire)
            && shared.using_trigger.load(Ordering::Acquire)
        {
            shared.call_trigger_done();
        }

        (Status::NEED_DATA | Status::HAVE_DATA).into_raw()
    }

    fn process_output(&mut self) -> i32 {
        let shared = &self.shared;

        let Some(port) = shared.port() else {
            return Error::Io.status();
        };

        let Some(io) = port.io() else {
            return Error::Io.status();
        };

        let mut iterations = 0;

        loop {
            let mut ask_more;
            let mut res = atomic!(io, status).load();

            if !res.contains(Status::HAVE_DATA) {
                // Recycle the previous buffer.
                let old_id = atomic!(io, buffer_id).load();

                if let Some(buffer) = port.get_buffer(old_id) {
                    let _ = port.queue_push(&port.dequeued, &buffer);
                }

                match port.queue_pop(&port.queued) {
                    Ok(buffer) => {
                        shared.drained.store(false, Ordering::Release);
                        atomic!(io, buffer_id).store(buffer.id);
                        atomic!(io, status).store(Status::HAVE_DATA);
                        res = Status::HAVE_DATA;

                        ask_more = !shared.process_rt()
                            && port.rate_match().is_none()
                            && (shared.flags.contains(StreamFlags::EARLY_PROCESS)
                                || port.queued.is_empty())
                            && !port.dequeued.is_empty();
                    }
                    Err(_)
                        if shared.draining.load(Ordering::Acquire)
                            || shared.drained.load(Ordering::Acquire) =>
                    {
                        let newly = !shared.drained.swap(true, Ordering::AcqRel);
                        shared.draining.store(false, Ordering::Release);

                        atomic!(io, buffer_id).store(u32::MAX);
                        res = Status::DRAINED;

                        // Park the slot on need-data so the producer can
                        // resume filling after the drain.
                        atomic!(io, status).store(Status::NEED_DATA);

                        if newly {
                            shared.call_drained();
                        }

                        ask_more = false;
                    }
                    Err(_) => {
                        self.stats.no_output_buffer += 1;
                        atomic!(io, buffer_id).store(u32::MAX);
                        atomic!(io, status).store(Status::NEED_DATA);
                        res = Status::NEED_DATA;
                        ask_more = true;
                    }
                }
            } else {
                ask_more = !shared.process_rt()
                    && (shared.flags.contains(StreamFlags::EARLY_PROCESS)
                        || port.queued.is_empty())
                    && !port.dequeued.is_empty();
            }

            shared.copy_position(port.queued.outcount());

            if !shared.draining.load(Ordering::Acquire)
                && !shared.driving.load(Ordering::Acquire)
                && ask_more
            {
                shared.call_process();

                // Realtime streams can pick up the freshly queued buffer in
                // the same cycle, up to the iteration cap.
                iterations += 1;

                if shared.process_rt()
                    && iterations < MAX_PROCESS_LOOPS
                    && (shared.draining.load(Ordering::Acquire) || !port.queued.is_empty())
                {
                    continue;
                }
            }

            if shared.driving.load(Ordering::Acquire)
                && shared.using_trigger.load(Ordering::Acquire)
                && !res.contains(Status::HAVE_DATA)
            {
                shared.call_trigger_done();
            }

            return res.into_raw();
        }
    }
}

/// The node implementation half of a stream.
struct StreamImpl {
    shared: Arc<StreamShared>,
    /// Params the client supplied at connect, served to enumeration.
    params: Vec<(id::Param, Value)>,
    /// Buffer ids announced to the listener.
    announced: Vec<u32>,
}

impl NodeImpl for StreamImpl {
    fn enum_params(
        &mut self,
        _seq: u32,
        param_id: id::Param,
        start: u32,
        num: u32,
        filter: Option<&Value>,
        result: &mut dyn FnMut(u32, u32, Value),
    ) -> Result<i32, Error> {
        let num = if num == 0 { u32::MAX } else { num };
        let mut index = 0;
        let mut matched = 0;

        for (id, value) in &self.params {
            if *id != param_id {
                continue;
            }

            let current = index;
            index += 1;

            if current < start {
                continue;
            }

            let Ok(value) = pod::filter(value, filter) else {
                continue;
            };

            result(current, index, value);
            matched += 1;

            if matched == num {
                break;
            }
        }

        Ok(0)
    }

    fn set_param(&mut self, param_id: id::Param, param: Option<&Value>) -> Result<i32, Error> {
        if param_id != id::Param::PROPS {
            return Err(Error::NotSupported);
        }

        let listener = self.shared.listener();

        if let Some(obj) = param.and_then(Value::as_object) {
            let mut controls = self
                .shared
                .controls
                .lock()
                .unwrap_or_else(|e| e.into_inner());

            for property in &obj.properties {
                let Some(control) = controls.iter_mut().find(|c| c.id == property.key) else {
                    continue;
                };

                let values: Vec<f32> = match &property.value {
                    Value::Array(values) => {
                        values.iter().filter_map(Value::as_float).collect()
                    }
                    value => value.as_float().into_iter().collect(),
                };

                if !values.is_empty() {
                    control.set_values(&values);

                    if let Some(listener) = &listener {
                        listener.control_info(control.id, control);
                    }
                }
            }
        }

        if let Some(listener) = &listener {
            listener.param_changed(param_id, param);
        }

        Ok(0)
    }

    fn set_io(&mut self, ty: id::IoType, region: Option<Region<[u8]>>) -> Result<(), Error> {
        if ty == id::IoType::POSITION {
            let region = match region {
                Some(region) => Some(region.cast::<ffi::IoPosition>().map_err(|_| Error::Invalid)?),
                None => None,
            };

            *self
                .shared
                .position
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = region;
        }

        if let Some(listener) = self.shared.listener() {
            listener.io_changed(ty);
        }

        Ok(())
    }

    fn send_command(&mut self, command: id::NodeCommand) -> Result<i32, Error> {
        let shared = &self.shared;

        match command {
            id::NodeCommand::START => {
                if shared.direction == Direction::INPUT
                    && let Some(io) = shared.port().and_then(|p| p.io())
                {
                    atomic!(io, status).store(Status::NEED_DATA);
                }

                shared.set_state(StreamState::STREAMING, None);
            }
            id::NodeCommand::PAUSE | id::NodeCommand::SUSPEND => {
                if shared.state() == StreamState::STREAMING {
                    shared.set_state(StreamState::PAUSED, None);
                }
            }
            _ => {}
        }

        if let Some(listener) = shared.listener() {
            listener.command(command);
        }

        Ok(0)
    }

    fn port_set_param(
        &mut self,
        _direction: Direction,
        _port_id: u32,
        param_id: id::Param,
        param: Option<&Value>,
    ) -> Result<i32, Error> {
        // Clearing the format tears the buffers down with it.
        if param_id == id::Param::FORMAT && param.is_none() {
            self.retract_buffers();
        }

        if let Some(listener) = self.shared.listener() {
            listener.param_changed(param_id, param);
        }

        Ok(0)
    }

    fn port_use_buffers(
        &mut self,
        _direction: Direction,
        _port_id: u32,
        buffers: &crate::buffer::BufferList,
    ) -> Result<(), Error> {
        self.retract_buffers();

        if let Some(listener) = self.shared.listener() {
            for buffer in buffers.iter() {
                if buffer.set_added() {
                    listener.add_buffer(buffer.id);
                    self.announced.push(buffer.id);
                }
            }
        }

        Ok(())
    }

    fn port_set_io(
        &mut self,
        _direction: Direction,
        _port_id: u32,
        ty: id::IoType,
        _region: Option<Region<[u8]>>,
    ) -> Result<(), Error> {
        if let Some(listener) = self.shared.listener() {
            listener.io_changed(ty);
        }

        Ok(())
    }

    fn make_processor(&mut self) -> Option<Box<dyn Processor>> {
        Some(Box::new(StreamProcessor {
            shared: self.shared.clone(),
            stats: crate::Stats::default(),
            cycles: 0,
        }))
    }

    fn process_latency(&mut self) -> Option<ProcessLatency> {
        None
    }
}

impl StreamImpl {
    fn retract_buffers(&mut self) {
        if self.announced.is_empty() {
            return;
        }

        let listener = self.shared.listener();

        for id in self.announced.drain(..) {
            if let Some(listener) = &listener {
                listener.remove_buffer(id);
            }
        }
    }
}

/// Forwards node state to the stream.
struct StreamObserver {
    shared: Arc<StreamShared>,
}

impl NodeEvents for StreamObserver {
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

/// A producing or consuming endpoint of the graph.
pub struct Stream {
    shared: Arc<StreamShared>,
    properties: Properties,
    node_id: Option<u32>,
    observer_cookie: Option<u64>,
    data_loop: Arc<crate::DataLoop>,
}

impl Stream {
    /// Allocate a new unconnected stream.
    ///
    /// Stream defaults and the context's stream rules are applied to the
    /// properties here.
    pub fn new(context: &Context, name: &str, mut properties: Properties) -> Self {
        if properties.get(prop::NODE_NAME).is_none() {
            properties.insert(prop::NODE_NAME, name);
        }

        if properties.get(prop::NODE_WANT_DRIVER).is_none() {
            properties.insert(prop::NODE_WANT_DRIVER, "true");
        }

        if properties.get(prop::STREAM_IS_LIVE).is_none() {
            properties.insert(prop::STREAM_IS_LIVE, "true");
        }

        context.stream_rules().apply(&mut properties);

        let shared = Arc::new(StreamShared {
            name: String::from(name),
            direction: Direction::UNKNOWN,
            flags: StreamFlags::NONE,
            state: AtomicU32::new(StreamState::UNCONNECTED.into_id()),
            error: Mutex::new(None),
            port: Mutex::new(None),
            position: Mutex::new(None),
            listener: Mutex::new(None),
            controls: Mutex::new(Vec::new()),
            time: TimeLock::new(),
            draining: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            driving: AtomicBool::new(false),
            using_trigger: AtomicBool::new(false),
            trigger_warned: AtomicBool::new(false),
            node_id: AtomicU32::new(0),
            driver_id: AtomicU32::new(0),
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

    /// The stream name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The current state.
    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// The node backing the stream, when connected.
    pub fn node_id(&self) -> Option<u32> {
        self.node_id
    }

    /// Install the listener.
    pub fn set_listener(&mut self, listener: Arc<dyn StreamEvents>) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    /// Connect the stream into the graph.
    ///
    /// The internal node is created here, lazily; it lives until
    /// [`Stream::disconnect`].
    #[tracing::instrument(skip(self, context, params), fields(stream = %self.shared.name))]
    pub fn connect(
        &mut self,
        context: &mut Context,
        direction: Direction,
        flags: StreamFlags,
        params: Vec<Value>,
    ) -> Result<()> {
        if self.node_id.is_some() {
            bail!(Error::Busy);
        }

        // Direction and flags stay fixed for the lifetime of the connection.
        let Some(shared_mut) = Arc::get_mut(&mut self.shared) else {
            bail!("Stream shared state already aliased before connect");
        };

        shared_mut.direction = direction;
        shared_mut.flags = flags;

        if flags.contains(StreamFlags::DRIVER) {
            self.properties.insert(prop::NODE_DRIVER, "true");
        }

        // Derive the media class from the offered formats.
        if let Some(media_type) = params
            .iter()
            .filter_map(|p| p.as_object())
            .find_map(|o| o.value(id::Format::MEDIA_TYPE.into_id()))
            .and_then(|v| v.as_id::<id::MediaType>())
        {
            let class = match (self.shared.direction, media_type) {
                (Direction::INPUT, id::MediaType::AUDIO) => "Stream/Input/Audio",
                (Direction::INPUT, id::MediaType::VIDEO) => "Stream/Input/Video",
                (_, id::MediaType::VIDEO) => "Stream/Output/Video",
                _ => "Stream/Output/Audio",
            };

            self.properties.insert(prop::MEDIA_CLASS, class);
        }

        self.shared
            .set_state(StreamState::CONNECTING, None);

        let stream_params: Vec<(id::Param, Value)> = params
            .into_iter()
            .filter_map(|p| {
                let id = p.as_object().map(|o| id::Param::from_id(o.object_id))?;
                Some((id, p))
            })
            .collect();

        let implementation = Box::new(StreamImpl {
            shared: self.shared.clone(),
            params: stream_params.clone(),
            announced: Vec::new(),
        });

        let node_id = context.create_node(&self.shared.name, self.properties.clone())?;

        {
            let node = context.node_mut(node_id)?;
            node.set_implementation(implementation);

            let port = node.ports.insert(direction);
            port.set_map_buffers(flags.contains(StreamFlags::MAP_BUFFERS));

            for (param_id, value) in &stream_params {
                port.set_param(*param_id, Some(value.clone()))?;
                port.params.set_cached(*param_id);
            }

            let port_shared = port.shared().clone();
            *self.shared.port.lock().unwrap_or_else(|e| e.into_inner()) = Some(port_shared);

            let observer = Arc::new(StreamObserver {
                shared: self.shared.clone(),
            });
            self.observer_cookie = Some(node.add_listener(observer));
        }

        self.shared.node_id.store(node_id, Ordering::Release);
        self.node_id = Some(node_id);

        context.register_node(node_id)?;

        if !flags.contains(StreamFlags::INACTIVE) {
            self.set_active(context, true)?;
        }

        let driver = context.node_mut(node_id)?.driver_node.unwrap_or(node_id);
        self.shared.driver_id.store(driver, Ordering::Release);
        self.shared
            .driving
            .store(context.node_mut(node_id)?.driving, Ordering::Release);

        Ok(())
    }

    /// Activate or deactivate the stream.
    pub fn set_active(&mut self, context: &mut Context, active: bool) -> Result<()> {
        let node_id = self.node_id.context("Stream is not connected")?;

        if active {
            context.activate_node(node_id)?;
        } else {
            context.deactivate_node(node_id)?;
        }

        Ok(())
    }

    /// Disconnect and destroy the internal node.
    #[tracing::instrument(skip(self, context), fields(stream = %self.shared.name))]
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

        *self.shared.port.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.shared.node_id.store(0, Ordering::Release);
        self.shared.set_state(StreamState::UNCONNECTED, None);
        Ok(())
    }

    /// Take a buffer from the stream.
    ///
    /// Output streams holding a busy-meta reject a buffer the peer still
    /// reads.
    pub fn dequeue_buffer(&self) -> Result<Arc<Buffer>, Error> {
        let Some(port) = self.shared.port() else {
            return Err(Error::Pipe);
        };

        let buffer = port.queue_pop(&port.dequeued)?;

        if self.shared.direction == Direction::OUTPUT && buffer.busy_inc() >= 1 {
            buffer.busy_dec();
            let _ = port.queue_push(&port.dequeued, &buffer);
            return Err(Error::Busy);
        }

        Ok(buffer)
    }

    /// Hand a buffer back to the stream.
    pub fn queue_buffer(&self, buffer: &Arc<Buffer>) -> Result<(), Error> {
        let Some(port) = self.shared.port() else {
            return Err(Error::Pipe);
        };

        buffer.busy_dec();
        port.queue_push(&port.queued, buffer)?;

        // The legacy self-trigger of driving output streams.
        if self.shared.direction == Direction::OUTPUT
            && self.shared.driving.load(Ordering::Acquire)
            && !self.shared.using_trigger.load(Ordering::Acquire)
        {
            if !self.shared.trigger_warned.swap(true, Ordering::AcqRel) {
                tracing::warn!(
                    stream = %self.shared.name,
                    "Deprecated driver wakeup from queue_buffer, use trigger_process"
                );
            }

            self.do_trigger();
        }

        Ok(())
    }

    /// Flush the stream.
    ///
    /// With `drain` the stream reports a drained cycle once all queued
    /// buffers were consumed; otherwise all buffers return to their initial
    /// side immediately.
    pub fn flush(&self, drain: bool) -> Result<()> {
        let shared = self.shared.clone();

        self.data_loop.invoke_block(move |_| {
            let Some(port) = shared.port() else {
                return;
            };

            if drain {
                shared.draining.store(true, Ordering::Release);
                shared.drained.store(false, Ordering::Release);
                return;
            }

            port.clear_queues();

            let buffers = port.buffers();

            if shared.direction == Direction::OUTPUT {
                for buffer in buffers.iter() {
                    let _ = port.queue_push(&port.dequeued, buffer);
                }
            } else {
                for buffer in buffers.iter() {
                    let _ = port.queue_push(&port.queued, buffer);
                }
            }
        });

        Ok(())
    }

    /// Explicitly schedule a cycle for this stream.
    ///
    /// On a driving stream this starts a graph cycle; on a trigger stream it
    /// wakes the node; anywhere else the driver is asked for an extra cycle.
    pub fn trigger_process(&self) -> Result<()> {
        if !self.shared.using_trigger.swap(true, Ordering::AcqRel)
            && self.shared.trigger_warned.load(Ordering::Acquire)
        {
            tracing::warn!(
                stream = %self.shared.name,
                "Mixing queue_buffer wakeups with trigger_process"
            );
        }

        self.do_trigger();
        Ok(())
    }

    fn do_trigger(&self) {
        let shared = self.shared.clone();

        if shared.driving.load(Ordering::Acquire) {
            let node_id = shared.node_id.load(Ordering::Acquire);

            self.data_loop.invoke(move |rt| {
                rt.trigger_driver(node_id);
            });
        } else if shared.flags.contains(StreamFlags::TRIGGER) {
            let node_id = shared.node_id.load(Ordering::Acquire);

            self.data_loop.invoke(move |rt| {
                rt.trigger_node(node_id);
            });
        } else {
            // Ask the driver for an extra cycle on behalf of this stream.
            let driver_id = shared.driver_id.load(Ordering::Acquire);

            self.data_loop.invoke(move |rt| {
                if let Some(key) = rt.key_of(driver_id) {
                    rt.node_ready(key, 0);
                }
            });
        }
    }

    /// A consistent snapshot of the stream clock.
    pub fn get_time(&self) -> Time {
        self.shared.time.read()
    }

    /// Set a parameter on the stream node.
    pub fn set_param(
        &mut self,
        context: &mut Context,
        param_id: id::Param,
        param: Option<&Value>,
    ) -> Result<()> {
        let node_id = self.node_id.context("Stream is not connected")?;
        let node = context.node_mut(node_id)?;
        node.set_param(param_id, param).map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    /// Declare the controls the stream exposes.
    pub fn add_control(&mut self, info: &Value) -> Result<()> {
        let obj = info.as_object().context("Control info must be an object")?;
        let control = Control::from_prop_info(obj).context("Malformed control info")?;

        if let Some(listener) = self.shared.listener() {
            listener.control_info(control.id, &control);
        }

        self.shared
            .controls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(control);
        Ok(())
    }

    /// Read a control.
    pub fn get_control(&self, control_id: u32) -> Option<Control> {
        self.shared
            .controls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|c| c.id == control_id)
            .cloned()
    }

    /// Write control values through a props param.
    pub fn set_control(
        &mut self,
        context: &mut Context,
        control_id: u32,
        values: &[f32],
    ) -> Result<()> {
        let props = {
            let mut controls = self
                .shared
                .controls
                .lock()
                .unwrap_or_else(|e| e.into_inner());

            let control = controls
                .iter_mut()
                .find(|c| c.id == control_id)
                .context("Unknown control")?;

            if !control.set_values(values) {
                bail!(Error::NoSpace);
            }

            control.to_props()
        };

        self.set_param(context, id::Param::PROPS, Some(&props))
    }

    /// The merged stream properties.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Update properties on a live stream, re-running the context rules.
    pub fn update_properties(
        &mut self,
        context: &mut Context,
        updates: &Properties,
    ) -> Result<usize> {
        self.properties.extend(updates);
        let changed = context.stream_rules().apply(&mut self.properties);

        if let Some(node_id) = self.node_id {
            let props = self.properties.clone();
            context.update_node_properties(node_id, &props)?;
        }

        Ok(changed)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.shared.name)
            .field("direction", &self.shared.direction)
            .field("state", &self.state())
            .field("node", &self.node_id)
            .finish_non_exhaustive()
    }
}
