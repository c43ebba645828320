//! The real-time media graph engine.
//!
//! Nodes exchange buffers over ports; a driver node owns the transport clock
//! and initiates cycles which wake every node of its scheduling group in
//! dependency order. The [`Stream`] and [`Filter`] facades wrap a single node
//! for client code that produces or consumes buffers.

pub(crate) mod ptr;

pub mod ffi;

mod memory;
pub use self::memory::{MemPool, Region};

mod params;
pub use self::params::{ParamBlob, ParamInfo, ParamStore};

mod latency;
pub use self::latency::{LatencyInfo, ProcessLatency};

mod queue;
pub use self::queue::BufferQueue;

mod buffer;
pub use self::buffer::{Buffer, BufferList, Data, Meta};

mod port;
pub use self::port::{Port, PortShared, PortState, Ports};

mod activation;
pub use self::activation::Activation;

mod target;
pub use self::target::Target;

mod hooks;
pub use self::hooks::Hooks;

mod work;
pub use self::work::WorkQueue;

pub mod node;
pub use self::node::{Node, NodeEvents, NodeImpl, NodeInfo};

mod rt;
pub use self::rt::{Processor, RtEvents, RtGraph, RtNode};

mod loop_;
pub use self::loop_::DataLoop;

pub mod control;
pub use self::control::Control;

mod rules;
pub use self::rules::{Match, Rule, RuleSet};

pub mod stream;
pub use self::stream::{Stream, StreamEvents, Time};

pub mod filter;
pub use self::filter::{Filter, FilterEvents};

mod driver;
pub use self::driver::DummyDriver;

mod context;
pub use self::context::{Context, Settings};

mod stats;
pub use self::stats::Stats;

/// A positive return code carrying an asynchronous sequence number.
///
/// Methods of a node implementation reply with this when the operation
/// completes later through a result callback.
pub const ASYNC_BIT: i32 = 1 << 30;

/// Mark a sequence number as asynchronous.
#[inline]
pub const fn async_seq(seq: u32) -> i32 {
    ASYNC_BIT | (seq as i32 & (ASYNC_BIT - 1))
}

/// Test if a result code is asynchronous.
#[inline]
pub const fn is_async(res: i32) -> bool {
    res & ASYNC_BIT != 0
}

/// Extract the sequence number of an asynchronous result.
#[inline]
pub const fn async_seq_of(res: i32) -> u32 {
    (res & (ASYNC_BIT - 1)) as u32
}
