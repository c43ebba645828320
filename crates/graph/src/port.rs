//! Ports, the directional endpoints of a node.

use core::fmt;

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use pod::Value;
use runtime::consts::{Direction, MAX_BUFFERS};
use runtime::flags::{ParamBlobFlag, ParamFlag, PortChangeMask, PortFlags};
use runtime::id;
use runtime::{Error, Properties};
use slab::Slab;

use crate::buffer::{Buffer, BufferList};
use crate::ffi;
use crate::latency::LatencyInfo;
use crate::memory::Region;
use crate::params::{ParamInfo, ParamStore};
use crate::queue::BufferQueue;

/// The state of a port's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Waiting for a format.
    Configure,
    /// Has a format, waiting for buffers.
    Ready,
    /// Has buffers, data is not flowing.
    Paused,
    /// Data is flowing.
    Streaming,
}

/// The part of a port shared with the data thread and the facade user.
pub struct PortShared {
    pub direction: Direction,
    /// Buffers available to the user.
    pub dequeued: BufferQueue,
    /// Buffers handed back to the graph.
    pub queued: BufferQueue,
    buffers: Mutex<BufferList>,
    io: Mutex<Option<Region<ffi::IoBuffers>>>,
    rate_match: Mutex<Option<Region<ffi::IoRateMatch>>>,
}

impl PortShared {
    /// Construct the shared part of a port.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            dequeued: BufferQueue::new(),
            queued: BufferQueue::new(),
            buffers: Mutex::new(Arc::new(Vec::new())),
            io: Mutex::new(None),
            rate_match: Mutex::new(None),
        }
    }

    /// The current buffer set.
    pub fn buffers(&self) -> BufferList {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_buffers(&self, buffers: BufferList) {
        *self.buffers.lock().unwrap_or_else(|e| e.into_inner()) = buffers;
    }

    /// Look up a buffer by id.
    pub fn get_buffer(&self, id: u32) -> Option<Arc<Buffer>> {
        self.buffers().get(id as usize).cloned()
    }

    /// The installed io-buffers slot.
    pub fn io(&self) -> Option<Region<ffi::IoBuffers>> {
        self.io.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_io(&self, region: Option<Region<ffi::IoBuffers>>) {
        *self.io.lock().unwrap_or_else(|e| e.into_inner()) = region;
    }

    /// The installed rate-match slot.
    pub fn rate_match(&self) -> Option<Region<ffi::IoRateMatch>> {
        self.rate_match
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_rate_match(&self, region: Option<Region<ffi::IoRateMatch>>) {
        *self.rate_match.lock().unwrap_or_else(|e| e.into_inner()) = region;
    }

    /// Push a buffer onto a ring, asserting its queued flag.
    pub fn queue_push(&self, queue: &BufferQueue, buffer: &Buffer) -> Result<(), Error> {
        if !buffer.set_queued() {
            return Err(Error::Invalid);
        }

        queue.push(buffer.id, buffer.size());
        Ok(())
    }

    /// Pop the next buffer from a ring.
    pub fn queue_pop(&self, queue: &BufferQueue) -> Result<Arc<Buffer>, Error> {
        let id = queue.pop()?;

        let Some(buffer) = self.get_buffer(id) else {
            return Err(Error::NoEntity);
        };

        queue.account_out(buffer.size());
        buffer.clear_queued();
        Ok(buffer)
    }

    /// Forget every queued id.
    pub fn clear_queues(&self) {
        for buffer in self.buffers().iter() {
            buffer.clear_queued();
        }

        self.dequeued.clear();
        self.queued.clear();
    }
}

impl fmt::Debug for PortShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortShared")
            .field("direction", &self.direction)
            .field("dequeued", &self.dequeued)
            .field("queued", &self.queued)
            .finish_non_exhaustive()
    }
}

/// A directional endpoint of a node.
pub struct Port {
    pub id: u32,
    pub direction: Direction,
    pub flags: PortFlags,
    pub properties: Properties,
    pub params: ParamStore,
    /// Latency per direction, input at index 0.
    pub latency: [LatencyInfo; 2],
    pub state: PortState,
    pub(crate) change_mask: PortChangeMask,
    shared: Arc<PortShared>,
    format: Option<Value>,
    /// The owner maps mappable planes on this port.
    map_buffers: bool,
    /// Derived from the current format.
    pub stride: u32,
    pub blocks: u32,
    pub size: u32,
    pub maxsize: u32,
    alignment_warned: bool,
}

impl Port {
    /// Construct a new port.
    pub fn new(direction: Direction, id: u32) -> Self {
        Self {
            id,
            direction,
            flags: PortFlags::NONE,
            properties: Properties::new(),
            params: ParamStore::new([
                ParamInfo::new(id::Param::ENUM_FORMAT, ParamFlag::READ),
                ParamInfo::new(id::Param::FORMAT, ParamFlag::READWRITE),
                ParamInfo::new(id::Param::BUFFERS, ParamFlag::READ),
                ParamInfo::new(id::Param::META, ParamFlag::READ),
                ParamInfo::new(id::Param::IO, ParamFlag::READ),
                ParamInfo::new(id::Param::LATENCY, ParamFlag::READWRITE),
                ParamInfo::new(id::Param::TAG, ParamFlag::READWRITE),
            ]),
            latency: [
                LatencyInfo::new(Direction::INPUT),
                LatencyInfo::new(Direction::OUTPUT),
            ],
            state: PortState::Configure,
            change_mask: PortChangeMask::NONE,
            shared: Arc::new(PortShared::new(direction)),
            format: None,
            map_buffers: false,
            stride: 0,
            blocks: 1,
            size: 0,
            maxsize: 0,
            alignment_warned: false,
        }
    }

    /// The shared part of the port.
    #[inline]
    pub fn shared(&self) -> &Arc<PortShared> {
        &self.shared
    }

    /// The current format, when negotiated.
    #[inline]
    pub fn format(&self) -> Option<&Value> {
        self.format.as_ref()
    }

    /// Update a parameter on the port.
    ///
    /// Clearing the format also clears the buffers and drops the port back to
    /// the configure state. Latency params merge into the per-direction pair.
    #[tracing::instrument(skip(self, param), fields(port_id = self.id))]
    pub fn set_param(&mut self, id: id::Param, param: Option<Value>) -> Result<()> {
        match id {
            id::Param::FORMAT => match param {
                Some(param) => {
                    self.derive_format(&param);
                    self.format = Some(param.clone());
                    self.params.clear(Some(id::Param::FORMAT));
                    self.params.add(id::Param::FORMAT, ParamBlobFlag::NONE, param)?;

                    if self.state == PortState::Configure {
                        self.state = PortState::Ready;
                    }
                }
                None => {
                    self.format = None;
                    self.clear_buffers();
                    self.params.clear(Some(id::Param::FORMAT));
                    self.state = PortState::Configure;
                }
            },
            id::Param::LATENCY => {
                if let Some(param) = param {
                    if let Some(info) = param.as_object().and_then(LatencyInfo::from_object) {
                        let side = info.direction.into_id() as usize;
                        self.latency[side] = info;
                    }

                    self.params.clear(Some(id::Param::LATENCY));
                    self.params.add(id::Param::LATENCY, ParamBlobFlag::NONE, param)?;
                } else {
                    self.params.clear(Some(id::Param::LATENCY));
                }
            }
            id => match param {
                Some(mut param) => {
                    if id == id::Param::BUFFERS {
                        self.adjust_buffers_param(&mut param);
                    }

                    self.params.add(id, ParamBlobFlag::NONE, param)?;
                }
                None => {
                    self.params.clear(Some(id));
                }
            },
        }

        if self.params.take_changed() {
            self.change_mask |= PortChangeMask::PARAMS;
        }

        Ok(())
    }

    /// Let the owner of the port map mappable buffer planes.
    pub fn set_map_buffers(&mut self, map: bool) {
        self.map_buffers = map;
    }

    /// Accept pointer data alongside mappable memory.
    ///
    /// When this input port maps its buffers, any data-type choice offering
    /// in-place memory is widened with the mappable type so both ways of
    /// delivering planes negotiate.
    fn adjust_buffers_param(&self, param: &mut Value) {
        if self.direction != Direction::INPUT || !self.map_buffers {
            return;
        }

        let Value::Object(obj) = param else {
            return;
        };

        let Some(prop) = obj
            .properties
            .iter_mut()
            .find(|p| p.key == id::ParamBuffers::DATA_TYPE.into_id())
        else {
            return;
        };

        let mem_ptr = 1i32 << id::DataType::MEM_PTR.into_id();
        let mem_fd = 1i32 << id::DataType::MEM_FD.into_id();

        let widen = |v: &mut Value| {
            if let Value::Int(bits) = v
                && *bits & mem_ptr != 0
            {
                *bits |= mem_fd;
            }
        };

        match &mut prop.value {
            Value::Choice(choice) => {
                for v in &mut choice.values {
                    widen(v);
                }
            }
            value => widen(value),
        }
    }

    fn derive_format(&mut self, format: &Value) {
        let Some(obj) = format.as_object() else {
            return;
        };

        let rate = obj
            .value(id::Format::AUDIO_RATE.into_id())
            .and_then(Value::as_int)
            .unwrap_or(0);
        let channels = obj
            .value(id::Format::AUDIO_CHANNELS.into_id())
            .and_then(Value::as_int)
            .unwrap_or(1);

        // Samples are 32 bit in the dsp domain.
        self.stride = 4 * channels.max(1) as u32;
        self.blocks = 1;
        let _ = rate;
    }

    /// Install a set of buffers on the port.
    ///
    /// Output ports immediately make every buffer available for dequeueing;
    /// input ports start empty and fill through the io slot during
    /// scheduling.
    #[tracing::instrument(skip(self, buffers), fields(port_id = self.id))]
    pub fn use_buffers(&mut self, buffers: BufferList) -> Result<()> {
        if buffers.len() > MAX_BUFFERS {
            bail!(Error::NoSpace);
        }

        if self.state == PortState::Configure && !buffers.is_empty() {
            bail!(Error::Io);
        }

        self.clear_buffers();

        for buffer in buffers.iter() {
            self.check_alignment(buffer);
            self.maxsize = self
                .maxsize
                .max(buffer.datas.iter().map(|d| d.max_size as u32).max().unwrap_or(0));
        }

        self.shared.set_buffers(buffers.clone());

        if self.direction == Direction::OUTPUT {
            for buffer in buffers.iter() {
                self.shared
                    .queue_push(&self.shared.dequeued, buffer)
                    .map_err(|e| anyhow::anyhow!(e))?;
            }
        }

        if !buffers.is_empty() {
            self.state = PortState::Paused;
        }

        Ok(())
    }

    fn check_alignment(&mut self, buffer: &Buffer) {
        const ALIGN: usize = 16;

        for data in &buffer.datas {
            if data.region.as_ptr().addr() % ALIGN != 0 && !self.alignment_warned {
                tracing::warn!(
                    buffer = buffer.id,
                    "Buffer data is not aligned to the preferred {ALIGN} bytes"
                );
                self.alignment_warned = true;
            }
        }
    }

    /// Drop the current buffer set.
    pub fn clear_buffers(&mut self) {
        self.shared.clear_queues();
        self.shared.set_buffers(Arc::new(Vec::new()));
        self.maxsize = 0;

        if matches!(self.state, PortState::Paused | PortState::Streaming) {
            self.state = PortState::Ready;
        }
    }

    /// Install an io area on the port.
    pub fn set_io(&mut self, ty: id::IoType, region: Option<Region<[u8]>>) -> Result<()> {
        match ty {
            id::IoType::BUFFERS => {
                let region = match region {
                    Some(region) => Some(region.cast::<ffi::IoBuffers>()?),
                    None => None,
                };

                self.shared.set_io(region);
            }
            id::IoType::RATE_MATCH => {
                let region = match region {
                    Some(region) => Some(region.cast::<ffi::IoRateMatch>()?),
                    None => None,
                };

                self.shared.set_rate_match(region);
            }
            ty => bail!("Unsupported io type {ty:?} on port {}", self.id),
        }

        Ok(())
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// The ports of a node, by direction.
#[derive(Default, Debug)]
pub struct Ports {
    input_ports: Slab<Port>,
    output_ports: Slab<Port>,
}

impl Ports {
    /// Construct a new collection of ports.
    pub fn new() -> Self {
        Self {
            input_ports: Slab::new(),
            output_ports: Slab::new(),
        }
    }

    /// Insert a new port in the specified direction.
    pub fn insert(&mut self, direction: Direction) -> &mut Port {
        let ports = self.direction_mut(direction);
        let id = ports.vacant_key() as u32;
        let key = ports.insert(Port::new(direction, id));
        &mut ports[key]
    }

    /// Get a port.
    pub fn get(&self, direction: Direction, id: u32) -> Result<&Port> {
        let Some(port) = self.direction(direction).get(id as usize) else {
            bail!("Port {id} not found in {direction:?} ports");
        };

        Ok(port)
    }

    /// Get a port mutably.
    pub fn get_mut(&mut self, direction: Direction, id: u32) -> Result<&mut Port> {
        let Some(port) = self.direction_mut(direction).get_mut(id as usize) else {
            bail!("Port {id} not found in {direction:?} ports");
        };

        Ok(port)
    }

    /// Remove a port.
    pub fn remove(&mut self, direction: Direction, id: u32) -> Option<Port> {
        let ports = self.direction_mut(direction);
        ports.try_remove(id as usize)
    }

    /// The number of ports in the given direction.
    pub fn len(&self, direction: Direction) -> usize {
        self.direction(direction).len()
    }

    /// Iterate over the ports in one direction.
    pub fn iter(&self, direction: Direction) -> impl Iterator<Item = &Port> {
        self.direction(direction).iter().map(|(_, p)| p)
    }

    /// Iterate over the ports in one direction mutably.
    pub fn iter_mut(&mut self, direction: Direction) -> impl Iterator<Item = &mut Port> {
        self.direction_mut(direction).iter_mut().map(|(_, p)| p)
    }

    fn direction(&self, direction: Direction) -> &Slab<Port> {
        match direction {
            Direction::INPUT => &self.input_ports,
            _ => &self.output_ports,
        }
    }

    fn direction_mut(&mut self, direction: Direction) -> &mut Slab<Port> {
        match direction {
            Direction::INPUT => &mut self.input_ports,
            _ => &mut self.output_ports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemPool;
    use crate::buffer::tests::make_buffers;
    use pod::ObjectBuilder;

    fn format() -> Value {
        ObjectBuilder::new(
            id::ObjectType::FORMAT.into_id(),
            id::Param::FORMAT.into_id(),
        )
        .property(id::Format::MEDIA_TYPE.into_id(), id::MediaType::AUDIO)
        .property(id::Format::MEDIA_SUB_TYPE.into_id(), id::MediaSubType::RAW)
        .property(id::Format::AUDIO_RATE.into_id(), 48000i32)
        .property(id::Format::AUDIO_CHANNELS.into_id(), 2i32)
        .build_value()
    }

    #[test]
    fn output_buffers_start_dequeued() {
        let mut pool = MemPool::new();
        let mut port = Port::new(Direction::OUTPUT, 0);

        port.set_param(id::Param::FORMAT, Some(format())).unwrap();

        let buffers = Arc::new(make_buffers(&mut pool, 4, 4096));
        port.use_buffers(buffers).unwrap();

        assert_eq!(port.state, PortState::Paused);

        let mut popped = 0;
        while port.shared().queue_pop(&port.shared().dequeued).is_ok() {
            popped += 1;
        }

        assert_eq!(popped, 4);
    }

    #[test]
    fn input_buffers_start_empty() {
        let mut pool = MemPool::new();
        let mut port = Port::new(Direction::INPUT, 0);

        port.set_param(id::Param::FORMAT, Some(format())).unwrap();
        port.use_buffers(Arc::new(make_buffers(&mut pool, 2, 256))).unwrap();

        assert!(port.shared().dequeued.is_empty());
        assert!(port.shared().queued.is_empty());
    }

    #[test]
    fn too_many_buffers_is_no_space() {
        let mut pool = MemPool::new();
        let mut port = Port::new(Direction::OUTPUT, 0);

        port.set_param(id::Param::FORMAT, Some(format())).unwrap();

        let buffers = Arc::new(make_buffers(&mut pool, MAX_BUFFERS + 1, 64));
        let err = port.use_buffers(buffers).unwrap_err();
        assert_eq!(err.downcast::<Error>().unwrap(), Error::NoSpace);
    }

    #[test]
    fn clearing_format_resets_to_configure() {
        let mut pool = MemPool::new();
        let mut port = Port::new(Direction::OUTPUT, 0);

        port.set_param(id::Param::FORMAT, Some(format())).unwrap();
        port.use_buffers(Arc::new(make_buffers(&mut pool, 2, 64))).unwrap();

        port.set_param(id::Param::FORMAT, None).unwrap();

        assert_eq!(port.state, PortState::Configure);
        assert!(port.shared().buffers().is_empty());
        assert_eq!(port.params.iter(id::Param::FORMAT).count(), 0);
    }

    #[test]
    fn buffers_param_widens_pointer_types_when_mapping() {
        let mut port = Port::new(Direction::INPUT, 0);
        port.set_map_buffers(true);

        let mem_ptr = 1i32 << id::DataType::MEM_PTR.into_id();
        let mem_fd = 1i32 << id::DataType::MEM_FD.into_id();

        let buffers = pod::ObjectBuilder::new(
            id::ObjectType::PARAM_BUFFERS.into_id(),
            id::Param::BUFFERS.into_id(),
        )
        .property(id::ParamBuffers::BUFFERS.into_id(), 4i32)
        .property(id::ParamBuffers::DATA_TYPE.into_id(), mem_ptr)
        .build_value();

        port.set_param(id::Param::BUFFERS, Some(buffers)).unwrap();

        let blob = port.params.iter(id::Param::BUFFERS).next().unwrap();
        let data_type = blob
            .value
            .as_object()
            .unwrap()
            .value(id::ParamBuffers::DATA_TYPE.into_id())
            .unwrap();

        assert_eq!(data_type.as_int(), Some(mem_ptr | mem_fd));
    }

    #[test]
    fn latency_param_merges_by_direction() {
        let mut port = Port::new(Direction::OUTPUT, 0);

        let mut latency = LatencyInfo::new(Direction::INPUT);
        latency.min_ns = 100;
        latency.max_ns = 200;

        port.set_param(id::Param::LATENCY, Some(latency.to_value())).unwrap();

        assert_eq!(port.latency[Direction::INPUT.into_id() as usize], latency);
    }

    #[test]
    fn live_buffers_partition_between_rings_and_user() {
        let mut pool = MemPool::new();
        let mut port = Port::new(Direction::OUTPUT, 0);

        port.set_param(id::Param::FORMAT, Some(format())).unwrap();
        port.use_buffers(Arc::new(make_buffers(&mut pool, 3, 64))).unwrap();

        let shared = port.shared();

        // One held by the user, one moved to the queued ring, one left.
        let held = shared.queue_pop(&shared.dequeued).unwrap();
        let moved = shared.queue_pop(&shared.dequeued).unwrap();
        shared.queue_push(&shared.queued, &moved).unwrap();

        let buffers = shared.buffers();
        let queued_count = buffers.iter().filter(|b| b.is_queued()).count();

        // Exactly one buffer (the one held by the user) is unqueued.
        assert_eq!(queued_count, 2);
        assert!(!held.is_queued());

        // Double-queueing the same buffer is rejected.
        let err = shared.queue_push(&shared.queued, &moved).unwrap_err();
        assert_eq!(err, Error::Invalid);
    }
}
