use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng};
use std::time::Duration;
use tracing::debug;

use crate::{DataSpec, Error, Point, Result, host::Host};

/// What to simulate and for how long
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub log_interval: Duration,
    /// Hosts reporting at the first interval
    pub initial_scale: u64,
    /// Hosts reporting at the last interval
    pub scale: u64,
    /// Stop after this many points, `0` for no limit
    pub limit: u64,
    pub seed: u64,
}

/// Produces points epoch by epoch: every active host reports every measurement, then all
/// hosts advance one step.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    spec: DataSpec,
    hosts: Vec<Host>,
    rng: StdRng,
    start_nanos: i64,
    interval_nanos: i64,
    epochs: u64,
    epoch: u64,
    host: usize,
    measurement: usize,
    made: u64,
}

impl Simulator {
    pub fn new(spec: DataSpec, config: SimulatorConfig) -> Result<Self> {
        spec.validate()?;
        if config.end <= config.start {
            return Err(Error::InvalidTimeRange {
                start: config.start.to_rfc3339(),
                end: config.end.to_rfc3339(),
            });
        }
        if config.log_interval.is_zero() {
            return Err(Error::ZeroLogInterval);
        }
        if config.scale == 0 || config.initial_scale > config.scale {
            return Err(Error::InvalidScale {
                initial: config.initial_scale,
                scale: config.scale,
            });
        }

        let interval_nanos = i64::try_from(config.log_interval.as_nanos()).unwrap_or(i64::MAX);
        let span = (config.end - config.start)
            .num_nanoseconds()
            .unwrap_or(i64::MAX);
        let epochs = (span / interval_nanos) as u64;
        let start_nanos = config.start.timestamp_nanos_opt().unwrap_or_default();

        let mut rng = StdRng::seed_from_u64(config.seed);
        let hosts = (0..config.scale)
            .map(|id| Host::new(id, &spec, &mut rng))
            .collect();
        debug!(epochs, hosts = config.scale, "simulator ready");

        Ok(Self {
            config,
            spec,
            hosts,
            rng,
            start_nanos,
            interval_nanos,
            epochs,
            epoch: 0,
            host: 0,
            measurement: 0,
            made: 0,
        })
    }

    pub fn spec(&self) -> &DataSpec {
        &self.spec
    }

    /// Number of log intervals between start and end
    pub fn epochs(&self) -> u64 {
        self.epochs
    }

    /// Hosts reporting during `epoch`, growing linearly from the initial scale to the scale
    pub fn active_hosts(&self, epoch: u64) -> usize {
        let initial = self.config.initial_scale;
        let growth = self.config.scale - initial;
        let active = if self.epochs <= 1 {
            initial
        } else {
            initial + growth * epoch.min(self.epochs - 1) / (self.epochs - 1)
        };
        // an initial scale of zero still needs someone reporting
        active.max(1) as usize
    }

    fn finished(&self) -> bool {
        self.epoch >= self.epochs || (self.config.limit > 0 && self.made >= self.config.limit)
    }
}

impl Iterator for Simulator {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.finished() {
            return None;
        }

        let timestamp = self.start_nanos + self.epoch as i64 * self.interval_nanos;
        let point = self.hosts[self.host].point(self.measurement, timestamp);
        self.made += 1;

        self.measurement += 1;
        if self.measurement == self.hosts[self.host].measurement_count() {
            self.measurement = 0;
            self.host += 1;
            if self.host == self.active_hosts(self.epoch) {
                self.host = 0;
                self.epoch += 1;
                for host in &mut self.hosts {
                    host.tick(&mut self.rng);
                }
            }
        }
        Some(point)
    }
}
