use std::io::{self, Write};

use tracing::info;

use crate::{Error, Format, Result, Simulator};

/// Round robin share of the generated points, so that several processes can each produce a
/// disjoint slice of the same data set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interleave {
    group_id: u32,
    groups: u32,
}

impl Interleave {
    pub fn new(group_id: u32, groups: u32) -> Result<Self> {
        if group_id >= groups {
            return Err(Error::InvalidInterleave { group_id, groups });
        }
        Ok(Self { group_id, groups })
    }

    fn keeps(&self, index: u64) -> bool {
        index % u64::from(self.groups) == u64::from(self.group_id)
    }
}

impl Default for Interleave {
    fn default() -> Self {
        Self {
            group_id: 0,
            groups: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateSummary {
    /// Points the simulator produced, across every group
    pub points_generated: u64,
    /// Points this group wrote
    pub points_written: u64,
    pub bytes_written: usize,
}

/// Serialize the points of `simulator` that belong to `interleave` into `out`
pub fn generate<W: Write>(
    simulator: Simulator,
    format: Format,
    interleave: Interleave,
    out: W,
) -> Result<GenerateSummary> {
    let mut w = ByteCounter::new(out);
    format.write_header(simulator.spec(), &mut w)?;

    let mut summary = GenerateSummary {
        points_generated: 0,
        points_written: 0,
        bytes_written: 0,
    };
    for point in simulator {
        if interleave.keeps(summary.points_generated) {
            format.write_point(&point, &mut w)?;
            summary.points_written += 1;
        }
        summary.points_generated += 1;
    }
    w.flush()?;

    summary.bytes_written = w.bytes_written();
    info!(
        points = summary.points_written,
        bytes = summary.bytes_written,
        %format,
        "generated data"
    );
    Ok(summary)
}

#[derive(Debug)]
struct ByteCounter<W> {
    inner: W,
    count: usize,
}

impl<W> ByteCounter<W>
where
    W: Write,
{
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn bytes_written(&self) -> usize {
        self.count
    }
}

impl<W> Write for ByteCounter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res = self.inner.write(buf);
        if let Ok(size) = res {
            self.count += size
        }
        res
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    use super::*;
    use crate::{SimulatorConfig, UseCase};
    use pretty_assertions::assert_eq;

    fn simulator() -> Simulator {
        let start = DateTime::parse_from_rfc3339("2016-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let config = SimulatorConfig {
            start,
            end: start + chrono::Duration::minutes(1),
            log_interval: Duration::from_secs(10),
            initial_scale: 2,
            scale: 2,
            limit: 0,
            seed: 9,
        };
        Simulator::new(UseCase::CpuOnly.spec(), config).unwrap()
    }

    #[test]
    fn writes_every_point() {
        let mut out = vec![];
        let summary = generate(simulator(), Format::Influx, Interleave::default(), &mut out).unwrap();
        assert_eq!(summary.points_generated, 12);
        assert_eq!(summary.points_written, 12);
        assert_eq!(summary.bytes_written, out.len());

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 12);
        assert!(text.lines().all(|l| l.starts_with("cpu,hostname=host_")));
    }

    #[test]
    fn interleaved_groups_split_the_points() {
        let mut all = vec![];
        generate(simulator(), Format::Clickhouse, Interleave::default(), &mut all).unwrap();
        let all = String::from_utf8(all).unwrap();

        let mut parts = vec![];
        for group_id in 0..3 {
            let mut out = vec![];
            let summary = generate(
                simulator(),
                Format::Clickhouse,
                Interleave::new(group_id, 3).unwrap(),
                &mut out,
            )
            .unwrap();
            assert_eq!(summary.points_generated, 12);
            assert_eq!(summary.points_written, 4);
            parts.push(String::from_utf8(out).unwrap());
        }

        // each group repeats the header, then owns every third point
        let body = |s: &str| -> Vec<String> {
            let (_, body) = s.split_once("\n\n").unwrap();
            body.lines()
                .collect::<Vec<_>>()
                .chunks(2)
                .map(|c| c.join("\n"))
                .collect()
        };
        let all = body(&all);
        for (group_id, part) in parts.iter().enumerate() {
            let expected: Vec<_> = all.iter().skip(group_id).step_by(3).cloned().collect();
            assert_eq!(body(part), expected);
        }
    }

    #[test]
    fn group_id_must_be_below_groups() {
        let err = Interleave::new(2, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "interleaved group id 2 must be less than the number of groups 2"
        );
    }
}
