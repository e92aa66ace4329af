//! Decoded input units and the containers that carry them to workers.
//!
//! The dispatcher never looks inside a point. A point is whatever the decoder of a particular
//! target database produces, and a [`Batch`] is the matching container that its processor knows
//! how to write.

/// An aggregate of points for a particular data system.
///
/// A batch needs a way to measure its size, so that it can be flushed once it reaches the
/// configured batch size, and a way to append a point. Appending never fails: a batch is only
/// bounded by the flush threshold.
pub trait Batch: Send + 'static {
    /// The decoded unit this batch accumulates
    type Point;

    /// Number of points appended so far
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a point, taking ownership of it
    fn append(&mut self, point: Self::Point);
}

/// Manufactures empty batches.
///
/// Called once per flushed batch from the dispatcher thread, so implementations should be cheap.
pub trait BatchFactory {
    type Batch: Batch;

    /// Return a new, empty batch
    fn new_batch(&self) -> Self::Batch;
}

impl<F, B> BatchFactory for F
where
    F: Fn() -> B,
    B: Batch,
{
    type Batch = B;

    fn new_batch(&self) -> B {
        self()
    }
}

/// Decodes the next point from an input stream.
pub trait PointDecoder {
    type Point;

    /// Decode the next point.
    ///
    /// Returns `Ok(None)` on a clean end of input, after which the decoder is not called again.
    fn decode(&mut self) -> Result<Option<Self::Point>, DecodeError>;
}

/// Decoding failed for a reason other than reaching the end of the input
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed input at line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}

impl DecodeError {
    pub fn malformed(line: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}
