//! A timer-driven driver node.
//!
//! Graphs whose nodes all want to be driven still need something to initiate
//! cycles. This driver arms a timerfd at the cycle duration and runs the
//! driver prologue on every expiry, updating the clock as a hardware driver
//! would.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex};

use runtime::TimerFd;
use runtime::flags::Status;
use runtime::id;
use runtime::monotonic_nsec;

use runtime::Error;

use crate::DataLoop;
use crate::activation::Activation;
use crate::node::NodeImpl;
use crate::ptr::volatile;
use crate::rt::{Processor, RtGraph};

/// The node implementation of the timer driver.
pub struct DummyDriver {
    node_id: u32,
    activation: Activation,
    data_loop: Arc<DataLoop>,
    timer: Arc<TimerFd>,
    running: Arc<AtomicBool>,
    aux: Arc<Mutex<Option<usize>>>,
}

impl DummyDriver {
    /// Construct the driver implementation for the given node.
    pub fn new(
        node_id: u32,
        activation: Activation,
        data_loop: Arc<DataLoop>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            node_id,
            activation,
            data_loop,
            timer: Arc::new(TimerFd::new()?),
            running: Arc::new(AtomicBool::new(false)),
            aux: Arc::new(Mutex::new(None)),
        })
    }

    fn cycle_duration(&self) -> Duration {
        let a = self.activation.region();
        let duration = volatile!(a, position.clock.target_duration).read().max(1);
        let denom = volatile!(a, position.clock.target_rate).read().denom.max(1);

        Duration::from_nanos(duration.saturating_mul(1_000_000_000) / denom as u64)
    }

    fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let timer = self.timer.clone();
        let node_id = self.node_id;
        let running = self.running.clone();
        let aux_slot = self.aux.clone();

        if let Err(error) = self.timer.set_timeout(self.cycle_duration()) {
            tracing::error!(?error, "Failed to arm driver timer");
            self.running.store(false, Ordering::Release);
            return;
        }

        let fd = self.timer.as_raw_fd();

        self.data_loop.invoke(move |rt| {
            let handler_timer = timer.clone();
            let handler_running = running.clone();

            let key = rt.add_aux(fd, move |rt: &mut RtGraph| {
                if handler_timer.read().is_err() {
                    return;
                }

                if !handler_running.load(Ordering::Acquire) {
                    return;
                }

                let Some(key) = rt.key_of(node_id) else {
                    return;
                };

                // Advance the clock the way a hardware driver would before
                // starting the cycle.
                let mut next = Duration::from_millis(10);

                if let Some(node) = rt.node_mut(key) {
                    let a = node.activation.region().clone();
                    let nsec = monotonic_nsec();

                    let duration = volatile!(a, position.clock.duration).read();
                    let position = volatile!(a, position.clock.position).read();
                    volatile!(a, position.clock.position).write(position.wrapping_add(duration));
                    volatile!(a, position.clock.nsec).write(nsec);

                    let target = volatile!(a, position.clock.target_duration).read().max(1);
                    let denom = volatile!(a, position.clock.target_rate).read().denom.max(1);
                    next = Duration::from_nanos(
                        target.saturating_mul(1_000_000_000) / denom as u64,
                    );

                    let cycle = volatile!(a, position.clock.cycle).read();
                    volatile!(a, position.clock.cycle).write(cycle.wrapping_add(1));
                    volatile!(a, position.clock.next_nsec).write(nsec + next.as_nanos() as u64);
                }

                rt.node_ready(key, 0);

                // Rearm one-shot so a new target duration takes effect on
                // the next cycle.
                if let Err(error) = handler_timer.set_timeout(next) {
                    tracing::warn!(?error, "Failed to rearm driver timer");
                }
            });

            *aux_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(key);
        });
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Err(error) = self.timer.stop() {
            tracing::warn!(?error, "Failed to stop driver timer");
        }

        let aux_slot = self.aux.clone();
        let fd = self.timer.as_raw_fd();

        self.data_loop.invoke(move |rt| {
            if let Some(key) = aux_slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                rt.remove_aux(key, fd);
            }
        });
    }
}

impl NodeImpl for DummyDriver {
    fn send_command(&mut self, command: id::NodeCommand) -> Result<i32, Error> {
        match command {
            id::NodeCommand::START => self.start(),
            id::NodeCommand::PAUSE | id::NodeCommand::SUSPEND => self.stop(),
            _ => {}
        }

        Ok(0)
    }

    fn make_processor(&mut self) -> Option<Box<dyn Processor>> {
        Some(Box::new(DriverProcessor))
    }
}

impl Drop for DummyDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The driver's own processing step: it closes the cycle and produces
/// nothing itself.
struct DriverProcessor;

impl Processor for DriverProcessor {
    fn process(&mut self) -> i32 {
        Status::HAVE_DATA.into_raw()
    }
}
