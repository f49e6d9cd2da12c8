//! Typed rows for the raw inputs and the five output tables.
//!
//! Raw records are decoded from Arrow batches with every field optional.
//! Table rows are what gets written; each implements [`TableRow`] so the sink
//! can lay it out on storage and read it back.

mod columns;
mod event;
mod song;
mod songplay;

pub use event::{EventRecord, TimeRow, UserRow};
pub use song::{ArtistRow, SongRecord, SongRow};
pub use songplay::SongplayRow;

use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::arrow::error::ArrowError;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::error::ReaderError;

/// An `f64` with total ordering, so rows holding floats can be deduplicated
/// and sorted.
///
/// `-0.0` equals `0.0` and every NaN equals every other NaN.
#[derive(Debug, Clone, Copy)]
pub struct Double(pub f64);

impl Double {
    fn normalized(self) -> f64 {
        if self.0 == 0.0 {
            0.0
        } else if self.0.is_nan() {
            f64::NAN
        } else {
            self.0
        }
    }
}

impl PartialEq for Double {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Double {}

impl PartialOrd for Double {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Double {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized().total_cmp(&other.normalized())
    }
}

impl Hash for Double {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().to_bits().hash(state);
    }
}

impl From<f64> for Double {
    fn from(value: f64) -> Self {
        Double(value)
    }
}

/// A row of one of the output tables.
pub trait TableRow: Sized {
    /// Table name. Also the directory the table is written under.
    const NAME: &'static str;

    /// Schema as read back, partition columns last.
    fn schema() -> SchemaRef;

    /// Partition columns in directory nesting order.
    fn partition_columns() -> &'static [&'static str] {
        &[]
    }

    /// Partition values rendered as strings, in [`Self::partition_columns`]
    /// order. `None` is a null value.
    fn partition_values(&self) -> Vec<Option<String>> {
        Vec::new()
    }

    /// Encode rows as a batch over [`Self::schema`].
    fn to_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError>;

    /// Decode rows from a batch over [`Self::schema`].
    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_double_signed_zero_and_nan_collapse() {
        assert_eq!(Double(-0.0), Double(0.0));
        assert_eq!(Double(f64::NAN), Double(-f64::NAN));
        assert!(Double(-1.0) < Double(-0.0));

        let set: HashSet<Double> = [Double(0.0), Double(-0.0), Double(f64::NAN), Double(-f64::NAN)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }
}
