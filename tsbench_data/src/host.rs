//! Simulated machines and the random walks of their measurements.

use std::sync::Arc;

use rand::{Rng, seq::SliceRandom};

use crate::{DataSpec, Point, specification::FieldSpec};

/// Tags every host carries, in output order
pub const MACHINE_TAG_KEYS: [&str; 10] = [
    "hostname",
    "region",
    "datacenter",
    "rack",
    "os",
    "arch",
    "team",
    "service",
    "service_version",
    "service_environment",
];

const REGIONS: &[(&str, &[&str])] = &[
    ("us-east-1", &["us-east-1a", "us-east-1b", "us-east-1c", "us-east-1e"]),
    ("us-west-1", &["us-west-1a", "us-west-1b"]),
    ("us-west-2", &["us-west-2a", "us-west-2b", "us-west-2c"]),
    ("eu-west-1", &["eu-west-1a", "eu-west-1b", "eu-west-1c"]),
    ("eu-central-1", &["eu-central-1a", "eu-central-1b"]),
    ("ap-southeast-1", &["ap-southeast-1a", "ap-southeast-1b"]),
    ("ap-southeast-2", &["ap-southeast-2a", "ap-southeast-2b"]),
    ("ap-northeast-1", &["ap-northeast-1a", "ap-northeast-1c"]),
    ("sa-east-1", &["sa-east-1a", "sa-east-1b", "sa-east-1c"]),
];

const OS: &[&str] = &["Ubuntu16.10", "Ubuntu16.04LTS", "Ubuntu15.10"];
const ARCH: &[&str] = &["x64", "x86"];
const TEAM: &[&str] = &["SF", "NYC", "LON", "CHI"];
const SERVICE_ENVIRONMENT: &[&str] = &["production", "staging", "test"];

fn pick<R: Rng>(rng: &mut R, values: &[&str]) -> String {
    values.choose(rng).copied().unwrap_or_default().to_string()
}

#[derive(Debug)]
struct Field {
    key: Arc<str>,
    value: f64,
    min: f64,
    max: f64,
    step: f64,
}

impl Field {
    fn new<R: Rng>(spec: &FieldSpec, rng: &mut R) -> Self {
        let value = if spec.min < spec.max {
            rng.gen_range(spec.min..=spec.max)
        } else {
            spec.min
        };
        Self {
            key: Arc::from(spec.key.as_str()),
            value,
            min: spec.min,
            max: spec.max,
            step: spec.step,
        }
    }

    fn tick<R: Rng>(&mut self, rng: &mut R) {
        if self.step > 0.0 {
            let delta = rng.gen_range(-self.step..=self.step);
            self.value = (self.value + delta).clamp(self.min, self.max);
        }
    }
}

#[derive(Debug)]
struct Measurement {
    name: Arc<str>,
    tags: Vec<(Arc<str>, Arc<str>)>,
    fields: Vec<Field>,
}

/// A machine reporting every measurement of a [`DataSpec`]
#[derive(Debug)]
pub struct Host {
    tags: Vec<(Arc<str>, Arc<str>)>,
    measurements: Vec<Measurement>,
}

impl Host {
    /// Create host number `id`, drawing its tags and starting values from `rng`
    pub fn new<R: Rng>(id: u64, spec: &DataSpec, rng: &mut R) -> Self {
        let (region, datacenters) = REGIONS[rng.gen_range(0..REGIONS.len())];
        let values = [
            format!("host_{id}"),
            region.to_string(),
            pick(rng, datacenters),
            rng.gen_range(0..100).to_string(),
            pick(rng, OS),
            pick(rng, ARCH),
            pick(rng, TEAM),
            rng.gen_range(0..20).to_string(),
            rng.gen_range(0..2).to_string(),
            pick(rng, SERVICE_ENVIRONMENT),
        ];
        let tags = MACHINE_TAG_KEYS
            .iter()
            .zip(values)
            .map(|(k, v)| (Arc::from(*k), Arc::from(v)))
            .collect();

        let measurements = spec
            .measurements
            .iter()
            .map(|m| Measurement {
                name: Arc::from(m.name.as_str()),
                tags: m
                    .tags
                    .iter()
                    .map(|t| {
                        let value = t.values.choose(rng).cloned().unwrap_or_default();
                        (Arc::from(t.key.as_str()), Arc::from(value))
                    })
                    .collect(),
                fields: m.fields.iter().map(|f| Field::new(f, rng)).collect(),
            })
            .collect();

        Self { tags, measurements }
    }

    pub fn tags(&self) -> &[(Arc<str>, Arc<str>)] {
        &self.tags
    }

    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    /// The current values of measurement `index`, rounded to two decimals
    pub fn point(&self, index: usize, timestamp: i64) -> Point {
        let m = &self.measurements[index];
        Point {
            measurement: Arc::clone(&m.name),
            tags: self.tags.iter().chain(&m.tags).cloned().collect(),
            fields: m
                .fields
                .iter()
                .map(|f| (Arc::clone(&f.key), (f.value * 100.0).round() / 100.0))
                .collect(),
            timestamp,
        }
    }

    /// Advance every field one step
    pub fn tick<R: Rng>(&mut self, rng: &mut R) {
        for f in self.measurements.iter_mut().flat_map(|m| &mut m.fields) {
            f.tick(rng);
        }
    }
}
