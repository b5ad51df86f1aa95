use std::collections::VecDeque;

use chrono::{Local, TimeZone};
use tracing::info;

use crate::wire::Measurement;

/// Consumer of decoded measurements. Implementations must not block
/// materially and must tolerate the cpu count changing between calls.
pub trait Sink {
    fn accept(&mut self, measurement: &Measurement);
}

/// Accumulates one bounded time series per CPU slot and logs every accepted
/// measurement. Series are added lazily when a measurement carries more slots
/// than seen so far.
#[derive(Debug)]
pub struct SeriesSink {
    max_history_samples: usize,
    series: Vec<VecDeque<(f64, f64)>>,
}

impl SeriesSink {
    pub fn new(max_history_samples: usize) -> Self {
        SeriesSink {
            max_history_samples,
            series: Vec::new(),
        }
    }

    pub fn series(&self, slot: usize) -> Option<&VecDeque<(f64, f64)>> {
        self.series.get(slot)
    }

    pub fn ncpu(&self) -> usize {
        self.series.len()
    }

    fn push(&mut self, slot: usize, ts: f64, load: f64) {
        while self.series.len() <= slot {
            self.series.push(VecDeque::new());
        }
        let series = &mut self.series[slot];
        series.push_back((ts, load));
        if series.len() > self.max_history_samples {
            series.pop_front();
        }
    }
}

impl Sink for SeriesSink {
    fn accept(&mut self, measurement: &Measurement) {
        let ts = measurement.timestamp();
        for (slot, &load) in measurement.loads.iter().enumerate() {
            self.push(slot, ts, load);
        }

        let when = Local
            .timestamp_opt(measurement.seconds as i64, measurement.nanoseconds as u32)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| format!("{}.{:09}", measurement.seconds, measurement.nanoseconds));

        let total = measurement.loads.first().copied().unwrap_or(0.0);
        let per_cpu = measurement.loads[1.min(measurement.loads.len())..]
            .iter()
            .map(|load| format!("{:.0}%", load * 100.0))
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            "{when} total {:.2}% [{per_cpu}]",
            total * 100.0
        );
    }
}
