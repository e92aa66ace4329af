use std::{cmp::Ordering, collections::HashSet, fmt::Display, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The specification for the data to be generated
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DataSpec {
    /// The name of this spec
    pub name: String,
    /// The measurements every host reports at each interval
    pub measurements: Vec<MeasurementSpec>,
}

impl DataSpec {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadSpec {
            path: path.to_path_buf(),
            source,
        })?;
        let spec: Self = serde_json::from_str(&contents)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.measurements.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "spec {} has no measurements",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for m in &self.measurements {
            if m.name.is_empty() {
                return Err(Error::InvalidSpec("measurement with empty name".to_string()));
            }
            if !names.insert(m.name.as_str()) {
                return Err(Error::InvalidSpec(format!(
                    "measurement {} appears more than once",
                    m.name
                )));
            }
            if m.fields.is_empty() {
                return Err(Error::InvalidSpec(format!(
                    "measurement {} has no fields",
                    m.name
                )));
            }
            for tag in &m.tags {
                if tag.values.is_empty() {
                    return Err(Error::InvalidSpec(format!(
                        "tag {} of measurement {} has no values",
                        tag.key, m.name
                    )));
                }
            }
            for f in &m.fields {
                let ordered = matches!(
                    f.min.partial_cmp(&f.max),
                    Some(Ordering::Less | Ordering::Equal)
                );
                if !ordered || f.step.is_nan() || f.step < 0.0 {
                    return Err(Error::InvalidSpec(format!(
                        "field {}.{} needs min <= max and a non-negative step",
                        m.name, f.key
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Specification for a measurement to be generated
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MeasurementSpec {
    /// The name of the measurement
    pub name: String,
    /// Tags added on top of the host tags. Each host picks one value per tag and keeps it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagSpec>,
    /// The float fields of each line
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TagSpec {
    pub key: String,
    pub values: Vec<String>,
}

/// A float field moving as a random walk, clamped to `[min, max]`. A step of zero keeps the
/// starting value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub key: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl FieldSpec {
    fn new(key: &str, min: f64, max: f64, step: f64) -> Self {
        Self {
            key: key.to_string(),
            min,
            max,
            step,
        }
    }

    fn percent(key: &str) -> Self {
        Self::new(key, 0.0, 100.0, 1.0)
    }
}

/// The built in data sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseCase {
    Devops,
    CpuOnly,
    CpuSingle,
}

impl UseCase {
    pub fn spec(self) -> DataSpec {
        let measurements = match self {
            Self::Devops => vec![cpu(), mem(), disk()],
            Self::CpuOnly => vec![cpu()],
            Self::CpuSingle => vec![MeasurementSpec {
                name: "cpu".to_string(),
                tags: vec![],
                fields: vec![FieldSpec::percent("usage_user")],
            }],
        };
        DataSpec {
            name: self.to_string(),
            measurements,
        }
    }
}

impl Display for UseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Devops => write!(f, "devops"),
            Self::CpuOnly => write!(f, "cpu-only"),
            Self::CpuSingle => write!(f, "cpu-single"),
        }
    }
}

impl FromStr for UseCase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "devops" => Ok(Self::Devops),
            "cpu-only" => Ok(Self::CpuOnly),
            "cpu-single" => Ok(Self::CpuSingle),
            _ => Err(Error::UnknownUseCase(s.to_string())),
        }
    }
}

const CPU_FIELDS: [&str; 10] = [
    "usage_user",
    "usage_system",
    "usage_idle",
    "usage_nice",
    "usage_iowait",
    "usage_irq",
    "usage_softirq",
    "usage_steal",
    "usage_guest",
    "usage_guest_nice",
];

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn cpu() -> MeasurementSpec {
    MeasurementSpec {
        name: "cpu".to_string(),
        tags: vec![],
        fields: CPU_FIELDS.iter().map(|k| FieldSpec::percent(k)).collect(),
    }
}

fn mem() -> MeasurementSpec {
    let bytes = |key| FieldSpec::new(key, 0.0, 8.0 * GIB, GIB / 64.0);
    MeasurementSpec {
        name: "mem".to_string(),
        tags: vec![],
        fields: vec![
            FieldSpec::new("total", 8.0 * GIB, 8.0 * GIB, 0.0),
            bytes("available"),
            bytes("used"),
            bytes("free"),
            bytes("cached"),
            bytes("buffered"),
            FieldSpec::percent("used_percent"),
            FieldSpec::percent("available_percent"),
            FieldSpec::percent("buffered_percent"),
        ],
    }
}

fn disk() -> MeasurementSpec {
    let tag = |key: &str, values: &[&str]| TagSpec {
        key: key.to_string(),
        values: values.iter().map(|v| v.to_string()).collect(),
    };
    MeasurementSpec {
        name: "disk".to_string(),
        tags: vec![
            tag("path", &["/dev/sda1", "/dev/sdb1", "/dev/sdc1"]),
            tag("fstype", &["ext3", "ext4", "btrfs"]),
        ],
        fields: vec![
            FieldSpec::new("total", 500.0 * GIB, 500.0 * GIB, 0.0),
            FieldSpec::new("free", 0.0, 500.0 * GIB, GIB),
            FieldSpec::new("used", 0.0, 500.0 * GIB, GIB),
            FieldSpec::percent("used_percent"),
            FieldSpec::new("inodes_total", 32_768_000.0, 32_768_000.0, 0.0),
            FieldSpec::new("inodes_free", 0.0, 32_768_000.0, 1_000.0),
            FieldSpec::new("inodes_used", 0.0, 32_768_000.0, 1_000.0),
        ],
    }
}
