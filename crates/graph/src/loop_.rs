//! The data thread.
//!
//! Owns the poller and the real-time graph. Everything else talks to it
//! through the invocation queue; state mutation from other threads never
//! happens directly.

use std::thread::JoinHandle;

use anyhow::{Context as _, Result};
use runtime::Poll;
use runtime::invoke::{self, InvokeQueue};
use runtime::poll::{Interest, PollEvent, Token};

use crate::rt::{PollOp, RtGraph};

const TOKEN_INVOKE: Token = Token::new(0);

/// Handle to a running data thread.
pub struct DataLoop {
    queue: InvokeQueue<RtGraph>,
    thread: Option<JoinHandle<()>>,
}

impl DataLoop {
    /// Spawn a new data thread.
    pub fn spawn() -> Result<Self> {
        let mut poll = Poll::new().context("Creating poller")?;
        let (queue, receiver) = invoke::channel::<RtGraph>().context("Creating invoke queue")?;

        poll.add(receiver.as_raw_fd(), TOKEN_INVOKE, Interest::READ)
            .context("Registering invoke queue")?;

        let thread = std::thread::Builder::new()
            .name(String::from("data-loop"))
            .spawn(move || {
                receiver.attach_current_thread();

                let mut rt = RtGraph::new();
                let mut events: Vec<PollEvent> = Vec::with_capacity(16);

                loop {
                    apply_poll_ops(&mut poll, &mut rt);

                    if rt.stopping {
                        break;
                    }

                    events.clear();

                    if let Err(error) = poll.poll(&mut events, -1) {
                        tracing::error!(?error, "Poll failed on the data thread");
                        break;
                    }

                    for e in &events {
                        if e.token == TOKEN_INVOKE {
                            receiver.drain(&mut rt);
                        } else if e.interest.is_read() {
                            rt.dispatch(e.token);
                        }
                    }
                }
            })
            .context("Spawning data thread")?;

        Ok(Self {
            queue,
            thread: Some(thread),
        })
    }

    /// Post a closure to run on the data thread.
    #[inline]
    pub fn invoke(&self, f: impl FnOnce(&mut RtGraph) + Send + 'static) {
        self.queue.invoke(f);
    }

    /// Post a closure and wait for it to have run.
    #[inline]
    pub fn invoke_block(&self, f: impl FnOnce(&mut RtGraph) + Send + 'static) {
        self.queue.invoke_block(f);
    }
}

impl Drop for DataLoop {
    fn drop(&mut self) {
        self.queue.invoke(|rt| rt.stop());

        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("Data thread panicked");
        }
    }
}

fn apply_poll_ops(poll: &mut Poll, rt: &mut RtGraph) {
    for op in rt.poll_ops.drain(..) {
        let res = match op {
            PollOp::Add(fd, token) => poll.add(fd, token, Interest::READ),
            PollOp::Remove(fd) => poll.delete(fd),
        };

        if let Err(error) = res {
            tracing::warn!(?error, "Failed to update poller registration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn invocations_reach_the_thread() {
        let data_loop = DataLoop::spawn().unwrap();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        data_loop.invoke_block(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn node_wakeups_dispatch() {
        use crate::activation::Activation;
        use crate::rt::RtNode;
        use crate::MemPool;

        let data_loop = DataLoop::spawn().unwrap();

        let mut pool = MemPool::new();
        let activation = Activation::allocate(&mut pool, 64, 48000).unwrap();
        let shared = activation.clone();

        data_loop.invoke_block(move |rt| {
            rt.add_node(RtNode::new(1, String::from("wakeup"), shared));
        });

        activation.signal(runtime::monotonic_nsec());

        // Give the loop a moment to pick up the wakeup and finish the node.
        for _ in 0..100 {
            if activation.status() == runtime::consts::ActivationStatus::FINISHED {
                break;
            }

            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(
            activation.status(),
            runtime::consts::ActivationStatus::FINISHED
        );
    }
}
