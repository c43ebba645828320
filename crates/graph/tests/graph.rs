//! End to end scenarios over a real data thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use graph::{Context, MemPool, RtEvents, Settings, Stream, StreamEvents};
use pod::{ObjectBuilder, Value};
use runtime::consts::{Direction, PositionState, StreamState};
use runtime::flags::StreamFlags;
use runtime::id;
use runtime::{Error, Properties};

const TIMEOUT: Duration = Duration::from_secs(5);

fn settings() -> Settings {
    Settings {
        // Short cycles keep the tests fast.
        quantum: 64,
        rate: 48000,
        allow_mlock: false,
        warn_mlock: false,
    }
}

fn format_params(n_buffers: i32) -> Vec<Value> {
    vec![
        ObjectBuilder::new(
            id::ObjectType::FORMAT.into_id(),
            id::Param::ENUM_FORMAT.into_id(),
        )
        .property(id::Format::MEDIA_TYPE.into_id(), id::MediaType::AUDIO)
        .property(id::Format::MEDIA_SUB_TYPE.into_id(), id::MediaSubType::RAW)
        .property_enum(id::Format::AUDIO_RATE.into_id(), 44100i32, [44100i32, 48000])
        .property(id::Format::AUDIO_CHANNELS.into_id(), 2i32)
        .build_value(),
        ObjectBuilder::new(
            id::ObjectType::PARAM_BUFFERS.into_id(),
            id::Param::BUFFERS.into_id(),
        )
        .property(id::ParamBuffers::BUFFERS.into_id(), n_buffers)
        .property(id::ParamBuffers::SIZE.into_id(), 4096i32)
        .build_value(),
    ]
}

#[derive(Default)]
struct Collector {
    processes: AtomicU32,
    drains: AtomicU32,
    states: Mutex<Vec<StreamState>>,
}

impl StreamEvents for Collector {
    fn state_changed(&self, _old: StreamState, new: StreamState, _error: Option<&str>) {
        self.states.lock().unwrap().push(new);
    }

    fn process(&self) {
        self.processes.fetch_add(1, Ordering::SeqCst);
    }

    fn drained(&self) {
        self.drains.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RtCollector {
    timeouts: Mutex<Vec<u32>>,
    xruns: Mutex<Vec<(u32, u32)>>,
    completes: AtomicU32,
    incompletes: AtomicU32,
}

impl RtEvents for RtCollector {
    fn complete(&self) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }

    fn incomplete(&self) {
        self.incompletes.fetch_add(1, Ordering::SeqCst);
    }

    fn timeout(&self, stuck: u32) {
        self.timeouts.lock().unwrap().push(stuck);
    }

    fn xrun(&self, id: u32, count: u32) {
        self.xruns.lock().unwrap().push((id, count));
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();

    while start.elapsed() < TIMEOUT {
        if condition() {
            return true;
        }

        std::thread::sleep(Duration::from_millis(2));
    }

    false
}

fn connect_pair(
    ctx: &mut Context,
    flags: StreamFlags,
    n_buffers: i32,
) -> (Stream, Stream, Arc<Collector>, Arc<Collector>) {
    let mut producer = Stream::new(ctx, "producer", Properties::new());
    let mut consumer = Stream::new(ctx, "consumer", Properties::new());

    let p_events = Arc::new(Collector::default());
    let c_events = Arc::new(Collector::default());

    producer.set_listener(p_events.clone());
    consumer.set_listener(c_events.clone());

    producer
        .connect(ctx, Direction::OUTPUT, flags, format_params(n_buffers))
        .unwrap();
    consumer
        .connect(ctx, Direction::INPUT, flags, format_params(n_buffers))
        .unwrap();

    let link = ctx.link(
        producer.node_id().unwrap(),
        0,
        consumer.node_id().unwrap(),
        0,
    );
    link.unwrap();

    ctx.iterate();

    (producer, consumer, p_events, c_events)
}

#[test]
fn passthrough_one_producer_one_consumer() {
    let mut ctx = Context::new(settings()).unwrap();

    let (producer, consumer, _p_events, c_events) = connect_pair(
        &mut ctx,
        StreamFlags::RT_PROCESS | StreamFlags::MAP_BUFFERS,
        4,
    );

    assert!(wait_for(|| {
        producer.state() == StreamState::STREAMING && consumer.state() == StreamState::STREAMING
    }));

    // Fill a payload and hand it into the graph.
    let payload: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();

    let buffer = producer.dequeue_buffer().unwrap();
    // SAFETY: We hold the buffer between dequeue and queue.
    unsafe {
        buffer.datas[0].writable_slice()[..1024].copy_from_slice(&payload);
    }
    buffer.datas[0].set_chunk(0, 1024, 8);
    producer.queue_buffer(&buffer).unwrap();

    // The consumer's process callback fires and the data arrives intact.
    assert!(wait_for(|| c_events.processes.load(Ordering::SeqCst) > 0));

    let received = loop {
        match consumer.dequeue_buffer() {
            Ok(buffer) => break buffer,
            Err(Error::Pipe) => std::thread::sleep(Duration::from_millis(2)),
            Err(e) => panic!("Dequeue failed: {e}"),
        }
    };

    let chunk = received.datas[0].chunk();
    assert_eq!(chunk.size, 1024);

    // SAFETY: We hold the buffer.
    let data = unsafe { received.datas[0].valid_slice() };
    assert_eq!(data, &payload[..]);

    consumer.queue_buffer(&received).unwrap();

    // The stream clock advances with the cycles.
    assert!(wait_for(|| producer.get_time().ticks >= 100 * 64));
    assert_eq!(producer.get_time().quantum, 64);
}

#[test]
fn buffers_recirculate() {
    let mut ctx = Context::new(settings()).unwrap();

    let (producer, consumer, _p, _c) = connect_pair(
        &mut ctx,
        StreamFlags::RT_PROCESS | StreamFlags::MAP_BUFFERS,
        4,
    );

    assert!(wait_for(|| producer.state() == StreamState::STREAMING));

    // Push several rounds through; every buffer must come back to the
    // producer eventually.
    for round in 0..16u8 {
        let buffer = loop {
            match producer.dequeue_buffer() {
                Ok(b) => break b,
                Err(_) => std::thread::sleep(Duration::from_millis(2)),
            }
        };

        // SAFETY: We hold the buffer.
        unsafe {
            buffer.datas[0].writable_slice()[0] = round;
        }
        buffer.datas[0].set_chunk(0, 64, 8);
        producer.queue_buffer(&buffer).unwrap();

        let received = loop {
            match consumer.dequeue_buffer() {
                Ok(b) => break b,
                Err(_) => std::thread::sleep(Duration::from_millis(2)),
            }
        };

        // SAFETY: We hold the buffer.
        let value = unsafe { received.datas[0].valid_slice()[0] };
        assert_eq!(value, round);
        consumer.queue_buffer(&received).unwrap();
    }
}

#[test]
fn drain_reports_once_and_resumes() {
    let mut ctx = Context::new(settings()).unwrap();

    let (producer, consumer, p_events, _c) = connect_pair(
        &mut ctx,
        StreamFlags::RT_PROCESS | StreamFlags::MAP_BUFFERS,
        2,
    );

    assert!(wait_for(|| producer.state() == StreamState::STREAMING));

    // Queue one of the two buffers, then drain.
    let buffer = producer.dequeue_buffer().unwrap();
    buffer.datas[0].set_chunk(0, 256, 8);
    producer.queue_buffer(&buffer).unwrap();

    producer.flush(true).unwrap();

    assert!(wait_for(|| p_events.drains.load(Ordering::SeqCst) == 1));

    // The drain fires exactly once.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(p_events.drains.load(Ordering::SeqCst), 1);

    // The producer can resume after the drain.
    let buffer = loop {
        match producer.dequeue_buffer() {
            Ok(b) => break b,
            Err(_) => std::thread::sleep(Duration::from_millis(2)),
        }
    };
    buffer.datas[0].set_chunk(0, 256, 8);
    producer.queue_buffer(&buffer).unwrap();

    let received = loop {
        match consumer.dequeue_buffer() {
            Ok(b) => break b,
            Err(_) => std::thread::sleep(Duration::from_millis(2)),
        }
    };
    consumer.queue_buffer(&received).unwrap();
}

#[test]
fn enum_format_filters_to_single_value() {
    let mut ctx = Context::new(settings()).unwrap();

    let mut producer = Stream::new(&ctx, "producer", Properties::new());
    producer
        .connect(
            &mut ctx,
            Direction::OUTPUT,
            StreamFlags::INACTIVE,
            format_params(4),
        )
        .unwrap();

    let node_id = producer.node_id().unwrap();

    let filter = ObjectBuilder::new(
        id::ObjectType::FORMAT.into_id(),
        id::Param::ENUM_FORMAT.into_id(),
    )
    .property_range(id::Format::AUDIO_RATE.into_id(), 48000i32, 40000i32, 46000i32)
    .build_value();

    let node = ctx.node_mut(node_id).unwrap();
    let port = node.ports.get(Direction::OUTPUT, 0).unwrap();

    let mut results = Vec::new();
    port.params
        .enumerate(id::Param::ENUM_FORMAT, 0, 0, Some(&filter), |_, _, v| {
            results.push(v);
        })
        .unwrap();

    assert_eq!(results.len(), 1);

    let rate = results[0]
        .as_object()
        .unwrap()
        .value(id::Format::AUDIO_RATE.into_id())
        .unwrap();
    assert_eq!(rate, &Value::Int(44100));
}

#[test]
fn transport_sync_timeout_forces_running() {
    let mut ctx = Context::new(settings()).unwrap();

    let mut producer = Stream::new(&ctx, "producer", Properties::new());
    let mut sync_props = Properties::new();
    sync_props.insert("node.transport.sync", "true");
    let mut consumer = Stream::new(&ctx, "consumer", sync_props);

    producer
        .connect(
            &mut ctx,
            Direction::OUTPUT,
            StreamFlags::RT_PROCESS,
            format_params(4),
        )
        .unwrap();
    consumer
        .connect(
            &mut ctx,
            Direction::INPUT,
            StreamFlags::RT_PROCESS,
            format_params(4),
        )
        .unwrap();

    let consumer_node = consumer.node_id().unwrap();

    // The stuck follower constrains the sync timeout to 50ms.
    ctx.node(consumer_node)
        .unwrap()
        .activation()
        .set_sync_timeout(50_000_000);

    let driver_id = ctx.node(consumer_node).unwrap().driver_node.unwrap();
    let rt_events = Arc::new(RtCollector::default());
    ctx.add_rt_listener(driver_id, rt_events.clone()).unwrap();

    ctx.link(
        producer.node_id().unwrap(),
        0,
        consumer.node_id().unwrap(),
        0,
    )
    .unwrap();
    ctx.iterate();

    // The transport cannot finish starting while the sync client never
    // acknowledges; the timeout trips and names it.
    assert!(wait_for(|| !rt_events.timeouts.lock().unwrap().is_empty()));
    assert_eq!(
        rt_events.timeouts.lock().unwrap().first(),
        Some(&consumer_node)
    );

    let driver_activation = ctx.node(driver_id).unwrap().activation().clone();
    assert!(wait_for(|| {
        driver_activation.position_state() == PositionState::RUNNING
    }));
}

#[test]
fn straggler_counts_xruns() {
    let ctx = Context::new(settings()).unwrap();
    let data_loop = ctx.data_loop();

    let mut pool = MemPool::new();
    let driver_activation = graph::Activation::allocate(&mut pool, 64, 48000).unwrap();
    let stuck_activation = graph::Activation::allocate(&mut pool, 64, 48000).unwrap();

    let rt_events = Arc::new(RtCollector::default());

    let da = driver_activation.clone();
    let sa = stuck_activation.clone();
    let events = rt_events.clone();

    data_loop.invoke_block(move |rt| {
        use graph::{RtNode, Target};

        let mut driver = RtNode::new(100, String::from("driver"), da.clone());
        driver.driver = true;
        driver.driving = true;
        driver.events.push(events);

        // The straggler never runs, so the driver never finishes a cycle.
        let mut t = Target::new(101, String::from("stuck"), sa.clone());
        t.activate();
        driver.targets.push(t);

        let key = rt.add_node(driver);

        rt.node_ready(key, 0);
        rt.node_ready(key, 0);
        rt.node_ready(key, 0);
    });

    // Every cycle after the first sees the straggler still triggered; the
    // very first cycle is incomplete too because nothing ever finished.
    assert_eq!(stuck_activation.xrun_count(), 2);
    assert_eq!(rt_events.incompletes.load(Ordering::SeqCst), 3);

    let xruns = rt_events.xruns.lock().unwrap();
    assert_eq!(xruns.len(), 2);
    assert_eq!(xruns[0], (101, 1));
    assert_eq!(xruns[1], (101, 2));
    drop(xruns);

    // Tear the manual node down before the local pool unmaps its records.
    data_loop.invoke_block(move |rt| {
        rt.remove_node(100);
    });
}

#[test]
fn hot_latency_update_propagates_to_clock() {
    let mut ctx = Context::new(settings()).unwrap();

    let (producer, consumer, _p, _c) = connect_pair(
        &mut ctx,
        StreamFlags::RT_PROCESS | StreamFlags::MAP_BUFFERS,
        4,
    );

    let mut producer = producer;
    let _consumer = consumer;

    assert!(wait_for(|| producer.state() == StreamState::STREAMING));
    assert!(wait_for(|| producer.get_time().quantum == 64));

    // Request a smaller cycle.
    let mut updates = Properties::new();
    updates.insert("node.latency", "32/48000");
    let changed = producer.update_properties(&mut ctx, &updates);
    changed.unwrap();

    // The driver picks up the new target duration on a following cycle.
    assert!(wait_for(|| producer.get_time().quantum == 32));
}

#[test]
fn control_round_trip() {
    let mut ctx = Context::new(settings()).unwrap();

    let mut producer = Stream::new(&ctx, "producer", Properties::new());
    producer
        .connect(
            &mut ctx,
            Direction::OUTPUT,
            StreamFlags::INACTIVE,
            format_params(4),
        )
        .unwrap();

    assert!(producer.get_control(0x10003).is_none());

    producer
        .add_control(&graph::control::prop_info(0x10003, "volume", 1.0, 0.0, 4.0))
        .unwrap();

    producer.set_control(&mut ctx, 0x10003, &[0.75]).unwrap();

    let control = producer.get_control(0x10003).unwrap();
    assert_eq!(control.values[0], 0.75);
}

#[test]
fn driver_stream_paces_the_graph() {
    let mut ctx = Context::new(settings()).unwrap();

    let mut producer = Stream::new(&ctx, "driver-producer", Properties::new());
    let mut consumer = Stream::new(&ctx, "consumer", Properties::new());

    let c_events = Arc::new(Collector::default());
    consumer.set_listener(c_events.clone());

    producer
        .connect(
            &mut ctx,
            Direction::OUTPUT,
            StreamFlags::DRIVER | StreamFlags::RT_PROCESS | StreamFlags::MAP_BUFFERS,
            format_params(4),
        )
        .unwrap();
    consumer
        .connect(
            &mut ctx,
            Direction::INPUT,
            StreamFlags::RT_PROCESS | StreamFlags::MAP_BUFFERS,
            format_params(4),
        )
        .unwrap();

    // The stream itself is the driver of the group.
    assert_eq!(
        ctx.node(consumer.node_id().unwrap()).unwrap().driver_node,
        producer.node_id()
    );

    ctx.link(
        producer.node_id().unwrap(),
        0,
        consumer.node_id().unwrap(),
        0,
    )
    .unwrap();
    ctx.iterate();

    assert!(wait_for(|| producer.state() == StreamState::STREAMING));

    // Nothing cycles until the driver is triggered.
    let before = c_events.processes.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(c_events.processes.load(Ordering::SeqCst), before);

    let buffer = producer.dequeue_buffer().unwrap();
    // SAFETY: We hold the buffer.
    unsafe {
        buffer.datas[0].writable_slice()[0] = 0xaa;
    }
    buffer.datas[0].set_chunk(0, 64, 8);
    producer.queue_buffer(&buffer).unwrap();

    producer.trigger_process().unwrap();

    assert!(wait_for(|| {
        match consumer.dequeue_buffer() {
            Ok(received) => {
                // SAFETY: We hold the buffer.
                let value = unsafe { received.datas[0].valid_slice()[0] };
                consumer.queue_buffer(&received).unwrap();
                value == 0xaa
            }
            Err(_) => {
                producer.trigger_process().unwrap();
                false
            }
        }
    }));
}

#[test]
fn second_connect_is_busy() {
    let mut ctx = Context::new(settings()).unwrap();

    let mut stream = Stream::new(&ctx, "s", Properties::new());
    stream
        .connect(
            &mut ctx,
            Direction::OUTPUT,
            StreamFlags::INACTIVE,
            format_params(4),
        )
        .unwrap();

    let err = stream
        .connect(
            &mut ctx,
            Direction::OUTPUT,
            StreamFlags::INACTIVE,
            format_params(4),
        )
        .unwrap_err();

    assert_eq!(err.downcast::<Error>().unwrap(), Error::Busy);
}

#[test]
fn disconnect_returns_to_unconnected() {
    let mut ctx = Context::new(settings()).unwrap();

    let (mut producer, _consumer, _p, _c) = connect_pair(
        &mut ctx,
        StreamFlags::RT_PROCESS | StreamFlags::MAP_BUFFERS,
        4,
    );

    assert!(wait_for(|| producer.state() == StreamState::STREAMING));

    producer.disconnect(&mut ctx).unwrap();
    assert_eq!(producer.state(), StreamState::UNCONNECTED);
    assert!(producer.node_id().is_none());
}
