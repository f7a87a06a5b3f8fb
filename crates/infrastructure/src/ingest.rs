//! CSV review ingest
//!
//! Streams review rows out of a CSV file. Rows that cannot be parsed or
//! that carry an empty review id are skipped with a warning instead of
//! aborting the whole batch.

use std::path::Path;

use application::ApplicationError;
use domain::{Review, ReviewId};
use serde::Deserialize;
use tracing::warn;

/// One CSV row; extra columns are ignored, missing ones default to empty
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    review_id: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    rating: String,
    #[serde(default)]
    text: String,
}

/// Reads review records from CSV files
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReviewExtractor;

impl CsvReviewExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Read every usable review row from the file
    pub fn extract_reviews(&self, path: impl AsRef<Path>) -> Result<Vec<Review>, ApplicationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ApplicationError::NotFound(format!(
                "CSV file not found: {}",
                path.display()
            )));
        }

        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| ApplicationError::Internal(format!("could not open CSV: {e}")))?;

        let mut reviews = Vec::new();
        for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
            let line = index + 2; // header is line 1
            let row = match record {
                Ok(row) => row,
                Err(err) => {
                    warn!(line, error = %err, "Skipping unparseable CSV row");
                    continue;
                },
            };
            let review_id = match ReviewId::new(row.review_id) {
                Ok(id) => id,
                Err(err) => {
                    warn!(line, error = %err, "Skipping CSV row without a review id");
                    continue;
                },
            };
            reviews.push(Review::new(review_id, row.date, row.rating, row.text));
        }
        Ok(reviews)
    }
}
