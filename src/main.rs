use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use graph::{Context, Stream};
use pod::ObjectBuilder;
use runtime::Properties;
use runtime::consts::Direction;
use runtime::flags::StreamFlags;
use runtime::id;

mod config;
mod web;

use self::config::Config;
use self::web::{NodeStatus, Snapshot, Status};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("flowmix.conf"));

    let config = Config::load(&path)?;

    let status = Status::default();

    // The status endpoint runs on its own tokio runtime; the engine keeps
    // the main thread.
    let listen = config.web.listen.clone();
    let web_status = status.clone();

    std::thread::Builder::new()
        .name(String::from("web"))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(error) => {
                    tracing::error!(?error, "Failed to build web runtime");
                    return;
                }
            };

            if let Err(error) = runtime.block_on(web::serve(listen, web_status)) {
                tracing::error!(?error, "Status server failed");
            }
        })
        .context("Spawning web thread")?;

    run(config, status)
}

fn run(config: Config, status: Status) -> Result<()> {
    let mut context = Context::new(config.settings())?;
    context.set_stream_rules(config.stream_rules());
    context.set_filter_rules(config.filter_rules());

    // A small demo graph: a tone producer feeding a sink consumer, driven by
    // the fallback timer driver.
    let mut producer = Stream::new(&context, "flowmix-tone", Properties::new());
    let mut consumer = Stream::new(&context, "flowmix-sink", Properties::new());

    let params = vec![
        ObjectBuilder::new(
            id::ObjectType::FORMAT.into_id(),
            id::Param::ENUM_FORMAT.into_id(),
        )
        .property(id::Format::MEDIA_TYPE.into_id(), id::MediaType::AUDIO)
        .property(id::Format::MEDIA_SUB_TYPE.into_id(), id::MediaSubType::RAW)
        .property_enum(
            id::Format::AUDIO_RATE.into_id(),
            config.settings().rate as i32,
            [44100i32, 48000],
        )
        .property(id::Format::AUDIO_CHANNELS.into_id(), 2i32)
        .build_value(),
    ];

    producer.connect(
        &mut context,
        Direction::OUTPUT,
        StreamFlags::MAP_BUFFERS,
        params.clone(),
    )?;
    consumer.connect(
        &mut context,
        Direction::INPUT,
        StreamFlags::MAP_BUFFERS,
        params,
    )?;

    context.link(
        producer.node_id().context("producer has no node")?,
        0,
        consumer.node_id().context("consumer has no node")?,
        0,
    )?;

    tracing::info!("Graph up");

    let mut phase = 0u8;

    loop {
        context.iterate();

        // Pump the demo payload through outside the realtime path.
        while let Ok(buffer) = producer.dequeue_buffer() {
            let len = buffer.datas[0].max_size.min(4096);

            // SAFETY: The buffer is held between dequeue and queue.
            unsafe {
                for b in &mut buffer.datas[0].writable_slice()[..len] {
                    *b = phase;
                    phase = phase.wrapping_add(1);
                }
            }

            buffer.datas[0].set_chunk(0, len as u32, 8);

            if producer.queue_buffer(&buffer).is_err() {
                break;
            }
        }

        while let Ok(buffer) = consumer.dequeue_buffer() {
            let _ = consumer.queue_buffer(&buffer);
        }

        status.publish(snapshot(&context));
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn snapshot(context: &Context) -> Snapshot {
    Snapshot {
        nodes: context
            .nodes()
            .map(|node| {
                let activation = node.activation();

                NodeStatus {
                    id: node.id,
                    name: node.name.clone(),
                    state: String::from(node.state().as_str()),
                    driver: node.driver,
                    position: activation.position(),
                    duration: activation.duration(),
                    xrun_count: activation.xrun_count(),
                    cpu_load: activation.cpu_load(),
                }
            })
            .collect(),
    }
}
