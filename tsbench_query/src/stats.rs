use std::fmt;

/// Latency of one query execution
#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    pub label: String,
    pub value_ms: f64,
    /// Part of a query whose total is reported separately; counted under its own label only
    pub is_partial: bool,
    /// Second, cache warm, execution of a query when prewarming
    pub is_warm: bool,
}

impl Stat {
    pub fn new(label: impl Into<String>, value_ms: f64) -> Self {
        Self {
            label: label.into(),
            value_ms,
            is_partial: false,
            is_warm: false,
        }
    }

    pub fn partial(mut self) -> Self {
        self.is_partial = true;
        self
    }

    pub fn warm(mut self) -> Self {
        self.is_warm = true;
        self
    }
}

/// Running summary of a set of latencies, updated with Welford's online algorithm
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatGroup {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl StatGroup {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

impl fmt::Display for StatGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min: {:8.2}ms, mean: {:8.2}ms, max: {:8.2}ms, stddev: {:8.2}ms, sum: {:5.1}sec, count: {}",
            self.min,
            self.mean,
            self.max,
            self.std_dev(),
            self.sum / 1000.0,
            self.count
        )
    }
}
