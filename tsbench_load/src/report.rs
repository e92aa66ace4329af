//! Load progress counters and the periodic rate report.

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::warn;

use crate::{Error, Result};

/// Header line of the periodic report
pub const REPORT_HEADER: &str =
    "time,per. metric/s,metric total,overall metric/s,per. row/s,row total,overall row/s";

/// Running totals of metrics and rows written, updated by every worker
#[derive(Debug, Default)]
pub struct LoadStats {
    metrics: AtomicU64,
    rows: AtomicU64,
}

impl LoadStats {
    pub fn record(&self, metrics: u64, rows: u64) {
        self.metrics.fetch_add(metrics, Ordering::Relaxed);
        self.rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> u64 {
        self.metrics.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }
}

/// State carried between two report lines
#[derive(Debug)]
struct Progress {
    start: Instant,
    prev: Instant,
    prev_metrics: u64,
    prev_rows: u64,
}

impl Progress {
    fn new(start: Instant) -> Self {
        Self {
            start,
            prev: start,
            prev_metrics: 0,
            prev_rows: 0,
        }
    }

    fn line(&mut self, now: Instant, wall_secs: u64, metrics: u64, rows: u64) -> String {
        let period = now.duration_since(self.prev).as_secs_f64();
        let overall = now.duration_since(self.start).as_secs_f64();
        let rate = |count: u64, secs: f64| if secs > 0.0 { count as f64 / secs } else { 0.0 };

        let line = format!(
            "{wall_secs},{:.2},{:.6E},{:.2},{:.2},{:.6E},{:.2}",
            rate(metrics - self.prev_metrics, period),
            metrics as f64,
            rate(metrics, overall),
            rate(rows - self.prev_rows, period),
            rows as f64,
            rate(rows, overall),
        );

        self.prev = now;
        self.prev_metrics = metrics;
        self.prev_rows = rows;
        line
    }
}

/// Background thread writing one report line per period until stopped
#[derive(Debug)]
pub struct Reporter {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Reporter {
    /// Write the header and start reporting `stats` to `out` every `period`
    pub fn spawn<W>(stats: Arc<LoadStats>, period: Duration, mut out: W) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (stop, stopped) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("tsbench-reporter".to_string())
            .spawn(move || {
                let mut progress = Progress::new(Instant::now());
                if let Err(e) = writeln!(out, "{REPORT_HEADER}") {
                    warn!(%e, "could not write load report, disabling it");
                    return;
                }
                loop {
                    match stopped.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let wall_secs = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or_default();
                    let line =
                        progress.line(Instant::now(), wall_secs, stats.metrics(), stats.rows());
                    if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
                        warn!(%e, "could not write load report, disabling it");
                        return;
                    }
                }
            })
            .map_err(Error::Spawn)?;

        Ok(Self { stop, handle })
    }

    /// Stop the reporter and wait for it to exit
    pub fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            warn!("load reporter panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stats_accumulate() {
        let stats = LoadStats::default();
        stats.record(10, 2);
        stats.record(5, 1);
        assert_eq!(stats.metrics(), 15);
        assert_eq!(stats.rows(), 3);
    }

    #[test]
    fn progress_lines() {
        let start = Instant::now();
        let mut progress = Progress::new(start);

        let line = progress.line(start + Duration::from_secs(2), 1_000, 400, 40);
        assert_eq!(
            line,
            "1000,200.00,4.000000E2,200.00,20.00,4.000000E1,20.00"
        );

        let line = progress.line(start + Duration::from_secs(4), 1_002, 600, 60);
        assert_eq!(
            line,
            "1002,100.00,6.000000E2,150.00,10.00,6.000000E1,15.00"
        );
    }

    #[test]
    fn progress_without_elapsed_time() {
        let start = Instant::now();
        let mut progress = Progress::new(start);
        assert_eq!(
            progress.line(start, 7, 0, 0),
            "7,0.00,0.000000E0,0.00,0.00,0.000000E0,0.00"
        );
    }

    #[derive(Debug, Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reporter_writes_header_and_lines() {
        let stats = Arc::new(LoadStats::default());
        stats.record(100, 10);
        let buf = SharedBuf::default();
        let reporter =
            Reporter::spawn(Arc::clone(&stats), Duration::from_millis(10), buf.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        reporter.stop();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some(REPORT_HEADER));
        let first = lines.next().expect("at least one report line");
        assert_eq!(first.split(',').count(), 7);
        assert!(first.contains("1.000000E2"), "{first}");
    }
}
