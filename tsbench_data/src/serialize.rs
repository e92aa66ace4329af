//! Output formats of generated points.

use std::{fmt::Display, io::Write, str::FromStr};

use crate::{DataSpec, Error, Point, host::MACHINE_TAG_KEYS};

/// How generated points are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// InfluxDB line protocol with nanosecond timestamps
    Influx,
    /// Comma separated lines: a `tags` line followed by a values line, behind a schema header
    Clickhouse,
    /// Same layout as [`Format::Clickhouse`]
    TimescaleDb,
}

impl Format {
    /// Write what a loader needs to know before the first point
    pub fn write_header<W: Write>(self, spec: &DataSpec, w: &mut W) -> std::io::Result<()> {
        match self {
            Self::Influx => Ok(()),
            Self::Clickhouse | Self::TimescaleDb => write_csv_header(spec, w),
        }
    }

    pub fn write_point<W: Write>(self, point: &Point, w: &mut W) -> std::io::Result<()> {
        match self {
            Self::Influx => write_line_protocol(point, w),
            Self::Clickhouse | Self::TimescaleDb => write_csv(point, w),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Influx => write!(f, "influx"),
            Self::Clickhouse => write!(f, "clickhouse"),
            Self::TimescaleDb => write!(f, "timescaledb"),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "influx" => Ok(Self::Influx),
            "clickhouse" => Ok(Self::Clickhouse),
            "timescaledb" => Ok(Self::TimescaleDb),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

fn write_line_protocol<W: Write>(point: &Point, w: &mut W) -> std::io::Result<()> {
    write!(w, "{}", escape(&point.measurement, &[',', ' ']))?;
    for (key, value) in &point.tags {
        write!(w, ",{}={}", escape_key(key), escape_key(value))?;
    }
    for (i, (key, value)) in point.fields.iter().enumerate() {
        let sep = if i == 0 { ' ' } else { ',' };
        write!(w, "{sep}{}={value}", escape_key(key))?;
    }
    writeln!(w, " {}", point.timestamp)
}

fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn write_csv_header<W: Write>(spec: &DataSpec, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "tags,{}", MACHINE_TAG_KEYS.join(","))?;

    let mut measurements: Vec<_> = spec.measurements.iter().collect();
    measurements.sort_by(|a, b| a.name.cmp(&b.name));
    for m in measurements {
        write!(w, "{}", m.name)?;
        for f in &m.fields {
            write!(w, ",{}", f.key)?;
        }
        writeln!(w)?;
    }
    writeln!(w)
}

fn write_csv<W: Write>(point: &Point, w: &mut W) -> std::io::Result<()> {
    write!(w, "tags")?;
    for (key, value) in &point.tags {
        write!(w, ",{key}={value}")?;
    }
    write!(w, "\n{},{}", point.measurement, point.timestamp)?;
    for (_, value) in &point.fields {
        write!(w, ",{value}")?;
    }
    writeln!(w)
}
