//! OS and support layer for the media graph.
//!
//! Wraps the raw file descriptor machinery (epoll, eventfd, timerfd) the data
//! loop is built on, and carries the shared vocabulary of the graph:
//! identifiers, flags, properties and the error taxonomy.

pub mod error;
pub use self::error::Error;

pub mod consts;
pub mod flags;
pub mod id;

pub mod ids;
pub use self::ids::IdSet;

mod properties;
pub use self::properties::Properties;

pub mod prop;
pub use self::prop::Prop;

mod event_fd;
pub use self::event_fd::EventFd;

mod timer_fd;
pub use self::timer_fd::TimerFd;

pub mod poll;
pub use self::poll::Poll;

mod events;
pub use self::events::Events;

pub mod invoke;
pub use self::invoke::InvokeQueue;

mod ratelimit;
pub use self::ratelimit::RateLimit;

/// Get the current monotonic time in nanoseconds.
pub fn monotonic_nsec() -> u64 {
    const NSEC_PER_SEC: u64 = 1_000_000_000;

    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // SAFETY: We're just using c-apis as intended.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }

    (ts.tv_sec as u64)
        .saturating_mul(NSEC_PER_SEC)
        .saturating_add(ts.tv_nsec as u64)
}
