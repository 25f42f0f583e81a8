//! Bounded per-service sample history
//!
//! Keeps a FIFO window of valid samples for each service and derives moving
//! averages and least-squares slopes from it. Only the predictive and
//! exponential algorithms read trend data.

use crate::models::{MetricKind, MetricSample};
use std::collections::{HashMap, VecDeque};

/// Result of a slope query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    /// Fewer samples than the configured minimum
    InsufficientData,
    /// Rate of change per second over the window
    Slope(f64),
}

impl Trend {
    /// Slope if strictly rising
    pub fn rising(&self) -> Option<f64> {
        match self {
            Trend::Slope(s) if *s > 0.0 => Some(*s),
            _ => None,
        }
    }
}

/// Ordered, bounded sample history for one service
#[derive(Debug, Clone)]
pub struct TrendWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
    min_samples: usize,
}

impl TrendWindow {
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            min_samples: min_samples.max(2),
        }
    }

    /// Append a valid sample, evicting the oldest at capacity.
    ///
    /// Returns false if the sample is invalid or not newer than the last one.
    pub fn push(&mut self, sample: MetricSample) -> bool {
        if !sample.valid {
            return false;
        }
        if let Some(last) = self.samples.back() {
            if sample.timestamp <= last.timestamp {
                return false;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    /// The `n` most recent samples, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter().skip(self.samples.len().saturating_sub(n))
    }

    pub fn moving_average(&self, metric: MetricKind) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.value(metric)).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Least-squares slope of `metric` in units per second
    pub fn trend(&self, metric: MetricKind) -> Trend {
        if self.samples.len() < self.min_samples {
            return Trend::InsufficientData;
        }

        let n = self.samples.len() as f64;
        // Offsets from the first sample keep the sums small
        let t0 = match self.samples.front() {
            Some(first) => first.timestamp,
            None => return Trend::InsufficientData,
        };

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;

        for sample in &self.samples {
            let x = (sample.timestamp - t0).num_milliseconds() as f64 / 1000.0;
            let y = sample.value(metric);
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_xx += x * x;
        }

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator.abs() < f64::EPSILON {
            return Trend::Slope(0.0);
        }

        Trend::Slope((n * sum_xy - sum_x * sum_y) / denominator)
    }
}

/// Trend windows for every tracked service
#[derive(Debug, Clone)]
pub struct TrendStore {
    windows: HashMap<String, TrendWindow>,
    capacity: usize,
    min_samples: usize,
}

impl TrendStore {
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity,
            min_samples,
        }
    }

    /// Record a sample for a service. Invalid samples are dropped.
    pub fn record(&mut self, service: &str, sample: MetricSample) -> bool {
        if !sample.valid {
            return false;
        }
        let (capacity, min_samples) = (self.capacity, self.min_samples);
        self.windows
            .entry(service.to_string())
            .or_insert_with(|| TrendWindow::new(capacity, min_samples))
            .push(sample)
    }

    pub fn window(&self, service: &str) -> Option<&TrendWindow> {
        self.windows.get(service)
    }

    pub fn trend(&self, service: &str, metric: MetricKind) -> Trend {
        self.windows
            .get(service)
            .map(|w| w.trend(metric))
            .unwrap_or(Trend::InsufficientData)
    }

    pub fn moving_average(&self, service: &str, metric: MetricKind) -> Option<f64> {
        self.windows.get(service).and_then(|w| w.moving_average(metric))
    }

    /// Drop windows for services no longer configured
    pub fn retain<'a>(&mut self, services: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = services.into_iter().collect();
        self.windows.retain(|name, _| keep.contains(name.as_str()));
    }
}
