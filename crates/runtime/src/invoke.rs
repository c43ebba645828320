//! Cross-thread invocation onto a loop.
//!
//! Closures posted here run on the thread that drains the receiver, with
//! exclusive access to the loop-owned state. A blocking post waits until the
//! closure has run, which is how the main thread synchronises with the data
//! thread.

use std::os::fd::AsRawFd;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::EventFd;

struct Invocation<T> {
    f: Box<dyn FnOnce(&mut T) + Send>,
    done: Option<mpsc::SyncSender<()>>,
}

struct Shared {
    event: EventFd,
    owner: Mutex<Option<ThreadId>>,
}

/// The sending half of an invocation queue.
pub struct InvokeQueue<T> {
    tx: mpsc::Sender<Invocation<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for InvokeQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// The receiving half, owned by the loop thread.
pub struct InvokeReceiver<T> {
    rx: mpsc::Receiver<Invocation<T>>,
    shared: Arc<Shared>,
}

/// Create a new invocation queue pair.
pub fn channel<T>() -> std::io::Result<(InvokeQueue<T>, InvokeReceiver<T>)> {
    let (tx, rx) = mpsc::channel();

    let shared = Arc::new(Shared {
        event: EventFd::new(0)?,
        owner: Mutex::new(None),
    });

    Ok((
        InvokeQueue {
            tx,
            shared: shared.clone(),
        },
        InvokeReceiver { rx, shared },
    ))
}

impl<T> InvokeQueue<T> {
    /// Post a closure to run on the loop thread.
    pub fn invoke(&self, f: impl FnOnce(&mut T) + Send + 'static) {
        self.post(Invocation {
            f: Box::new(f),
            done: None,
        });
    }

    /// Post a closure and block until it has run.
    ///
    /// Must not be called from the loop thread itself, which would wait on
    /// work only that thread can perform.
    pub fn invoke_block(&self, f: impl FnOnce(&mut T) + Send + 'static) {
        let owner = self.shared.owner.lock().unwrap_or_else(|e| e.into_inner());

        debug_assert!(
            *owner != Some(thread::current().id()),
            "blocking invoke from the loop thread"
        );

        drop(owner);

        let (done_tx, done_rx) = mpsc::sync_channel(1);

        self.post(Invocation {
            f: Box::new(f),
            done: Some(done_tx),
        });

        // The loop thread drops the sender when the invocation ran, so an
        // error here also means completion.
        let _ = done_rx.recv();
    }

    fn post(&self, invocation: Invocation<T>) {
        if self.tx.send(invocation).is_err() {
            tracing::warn!("Invocation posted to a finished loop");
            return;
        }

        if let Err(error) = self.shared.event.write(1) {
            tracing::error!(?error, "Failed to signal invocation");
        }
    }
}

impl<T> InvokeReceiver<T> {
    /// The eventfd that becomes readable when invocations are pending.
    #[inline]
    pub fn event(&self) -> &EventFd {
        &self.shared.event
    }

    /// The raw fd to register with a poller.
    #[inline]
    pub fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.shared.event.as_raw_fd()
    }

    /// Claim the queue for the current thread.
    pub fn attach_current_thread(&self) {
        let mut owner = self.shared.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner = Some(thread::current().id());
    }

    /// Run every pending invocation against the loop state.
    pub fn drain(&self, state: &mut T) {
        if let Err(error) = self.shared.event.read() {
            tracing::warn!(?error, "Failed to drain invocation event");
        }

        while let Ok(invocation) = self.rx.try_recv() {
            (invocation.f)(state);
            drop(invocation.done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocations_run_in_order() {
        let (tx, rx) = channel::<Vec<u32>>().unwrap();

        tx.invoke(|state| state.push(1));
        tx.invoke(|state| state.push(2));

        let mut state = Vec::new();
        rx.drain(&mut state);
        assert_eq!(state, [1, 2]);
    }

    #[test]
    fn blocking_invoke_completes() {
        let (tx, rx) = channel::<u32>().unwrap();

        let handle = std::thread::spawn(move || {
            let mut state = 0u32;

            // Poll the queue until the blocking invocation arrives.
            loop {
                rx.drain(&mut state);

                if state != 0 {
                    break;
                }

                std::thread::yield_now();
            }

            state
        });

        tx.invoke_block(|state| *state = 42);
        assert_eq!(handle.join().unwrap(), 42);
    }
}
