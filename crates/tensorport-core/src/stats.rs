use std::fmt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub marshal_us: u64,
    pub engine_us: u64,
    pub unmarshal_us: u64,
}

impl Timings {
    pub fn total_us(&self) -> u64 {
        self.marshal_us + self.engine_us + self.unmarshal_us
    }

    fn accumulate(&mut self, other: Timings) {
        self.marshal_us = self.marshal_us.saturating_add(other.marshal_us);
        self.engine_us = self.engine_us.saturating_add(other.engine_us);
        self.unmarshal_us = self.unmarshal_us.saturating_add(other.unmarshal_us);
    }
}

/// Per-model call counters and accumulated timings.
#[derive(Debug, Default, Clone)]
pub struct InferenceStats {
    pub calls: u64,
    pub failures: u64,
    pub total: Timings,
    pub last: Option<Timings>,
}

impl InferenceStats {
    pub(crate) fn record(&mut self, timings: Timings) {
        self.calls += 1;
        self.total.accumulate(timings);
        self.last = Some(timings);
    }

    pub(crate) fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn mean_engine_us(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.total.engine_us as f64 / self.calls as f64
    }
}

impl fmt::Display for InferenceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "calls: {} ({} failed)", self.calls, self.failures)?;
        writeln!(
            f,
            "total: marshal {}us, engine {}us, unmarshal {}us",
            self.total.marshal_us, self.total.engine_us, self.total.unmarshal_us
        )?;
        write!(f, "mean engine time: {:.1}us", self.mean_engine_us())?;
        if let Some(last) = &self.last {
            write!(f, "\nlast call: {}us", last.total_us())?;
        }
        Ok(())
    }
}
