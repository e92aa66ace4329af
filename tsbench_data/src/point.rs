use std::sync::Arc;

/// One generated line: a measurement for one host at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: Arc<str>,
    /// Host tags first, in [`MACHINE_TAG_KEYS`](crate::host::MACHINE_TAG_KEYS) order, then
    /// the measurement's own tags
    pub tags: Vec<(Arc<str>, Arc<str>)>,
    pub fields: Vec<(Arc<str>, f64)>,
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
}
