//! Latency information and aggregation.

use pod::{Object, ObjectBuilder, Value};
use runtime::consts::Direction;
use runtime::id;

/// Latency on one side of a port.
///
/// Quantum values are fractions of a cycle, rate values are samples, ns
/// values are nanoseconds. The total latency of a path is the sum of all
/// three terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyInfo {
    pub direction: Direction,
    pub min_quantum: f32,
    pub max_quantum: f32,
    pub min_rate: u32,
    pub max_rate: u32,
    pub min_ns: u64,
    pub max_ns: u64,
}

impl LatencyInfo {
    /// Zero latency in the given direction.
    pub const fn new(direction: Direction) -> Self {
        Self {
            direction,
            min_quantum: 0.0,
            max_quantum: 0.0,
            min_rate: 0,
            max_rate: 0,
            min_ns: 0,
            max_ns: 0,
        }
    }

    /// Combine with another latency, elementwise min over the minimums and
    /// max over the maximums.
    pub fn combine(&mut self, other: &LatencyInfo) {
        self.min_quantum = self.min_quantum.min(other.min_quantum);
        self.max_quantum = self.max_quantum.max(other.max_quantum);
        self.min_rate = self.min_rate.min(other.min_rate);
        self.max_rate = self.max_rate.max(other.max_rate);
        self.min_ns = self.min_ns.min(other.min_ns);
        self.max_ns = self.max_ns.max(other.max_ns);
    }

    /// Add a process latency on top.
    pub fn add_process(&mut self, process: &ProcessLatency) {
        self.min_quantum += process.quantum as f32;
        self.max_quantum += process.quantum as f32;
        self.min_rate += process.rate;
        self.max_rate += process.rate;
        self.min_ns += process.ns;
        self.max_ns += process.ns;
    }

    /// Build the latency param object.
    pub fn to_value(&self) -> Value {
        ObjectBuilder::new(
            id::ObjectType::PARAM_LATENCY.into_id(),
            id::Param::LATENCY.into_id(),
        )
        .property(id::ParamLatency::DIRECTION.into_id(), self.direction)
        .property(id::ParamLatency::MIN_QUANTUM.into_id(), self.min_quantum)
        .property(id::ParamLatency::MAX_QUANTUM.into_id(), self.max_quantum)
        .property(id::ParamLatency::MIN_RATE.into_id(), self.min_rate as i32)
        .property(id::ParamLatency::MAX_RATE.into_id(), self.max_rate as i32)
        .property(id::ParamLatency::MIN_NS.into_id(), self.min_ns as i64)
        .property(id::ParamLatency::MAX_NS.into_id(), self.max_ns as i64)
        .build_value()
    }

    /// Parse a latency param object.
    pub fn from_object(obj: &Object) -> Option<Self> {
        let direction = obj
            .value(id::ParamLatency::DIRECTION.into_id())?
            .as_id::<Direction>()?;

        let mut info = LatencyInfo::new(direction);

        if let Some(v) = obj.value(id::ParamLatency::MIN_QUANTUM.into_id()) {
            info.min_quantum = v.as_float()?;
        }

        if let Some(v) = obj.value(id::ParamLatency::MAX_QUANTUM.into_id()) {
            info.max_quantum = v.as_float()?;
        }

        if let Some(v) = obj.value(id::ParamLatency::MIN_RATE.into_id()) {
            info.min_rate = v.as_int()? as u32;
        }

        if let Some(v) = obj.value(id::ParamLatency::MAX_RATE.into_id()) {
            info.max_rate = v.as_int()? as u32;
        }

        if let Some(v) = obj.value(id::ParamLatency::MIN_NS.into_id()) {
            info.min_ns = v.as_long()? as u64;
        }

        if let Some(v) = obj.value(id::ParamLatency::MAX_NS.into_id()) {
            info.max_ns = v.as_long()? as u64;
        }

        Some(info)
    }
}

/// Fixed processing latency of a node implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessLatency {
    pub quantum: u32,
    pub rate: u32,
    pub ns: u64,
}

impl ProcessLatency {
    /// Build the process-latency param object.
    pub fn to_value(&self) -> Value {
        ObjectBuilder::new(
            id::ObjectType::PARAM_PROCESS_LATENCY.into_id(),
            id::Param::PROCESS_LATENCY.into_id(),
        )
        .property(id::ParamProcessLatency::QUANTUM.into_id(), self.quantum as i32)
        .property(id::ParamProcessLatency::RATE.into_id(), self.rate as i32)
        .property(id::ParamProcessLatency::NS.into_id(), self.ns as i64)
        .build_value()
    }

    /// Parse a process-latency param object.
    pub fn from_object(obj: &Object) -> Option<Self> {
        Some(Self {
            quantum: obj
                .value(id::ParamProcessLatency::QUANTUM.into_id())
                .and_then(Value::as_int)
                .unwrap_or(0) as u32,
            rate: obj
                .value(id::ParamProcessLatency::RATE.into_id())
                .and_then(Value::as_int)
                .unwrap_or(0) as u32,
            ns: obj
                .value(id::ParamProcessLatency::NS.into_id())
                .and_then(Value::as_long)
                .unwrap_or(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_min_max_elementwise() {
        let mut a = LatencyInfo {
            direction: Direction::OUTPUT,
            min_quantum: 0.5,
            max_quantum: 1.0,
            min_rate: 64,
            max_rate: 128,
            min_ns: 1_000,
            max_ns: 2_000,
        };

        let b = LatencyInfo {
            direction: Direction::OUTPUT,
            min_quantum: 0.25,
            max_quantum: 2.0,
            min_rate: 128,
            max_rate: 64,
            min_ns: 500,
            max_ns: 4_000,
        };

        a.combine(&b);

        assert_eq!(a.min_quantum, 0.25);
        assert_eq!(a.max_quantum, 2.0);
        assert_eq!(a.min_rate, 64);
        assert_eq!(a.max_rate, 128);
        assert_eq!(a.min_ns, 500);
        assert_eq!(a.max_ns, 4_000);
    }

    #[test]
    fn param_round_trip() {
        let info = LatencyInfo {
            direction: Direction::INPUT,
            min_quantum: 1.0,
            max_quantum: 1.0,
            min_rate: 256,
            max_rate: 256,
            min_ns: 10_000,
            max_ns: 20_000,
        };

        let value = info.to_value();
        let parsed = LatencyInfo::from_object(value.as_object().unwrap()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn process_latency_adds() {
        let mut info = LatencyInfo::new(Direction::OUTPUT);
        info.add_process(&ProcessLatency {
            quantum: 1,
            rate: 32,
            ns: 100,
        });

        assert_eq!(info.min_quantum, 1.0);
        assert_eq!(info.min_rate, 32);
        assert_eq!(info.max_ns, 100);
    }
}
