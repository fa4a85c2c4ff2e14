//! Columnar snapshot of the annotation table.
//!
//! After each run the entire `highlights_notes` table is re-materialized
//! into one Parquet file, fully replacing the previous snapshot. The write
//! goes to a temp file in the same directory followed by a rename, so a
//! failed run never leaves a truncated snapshot behind.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::errors::ParquetError;
use thiserror::Error;
use tracing::info;

use crate::models::AnnotationRecord;

/// Errors from writing the columnar snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to build snapshot batch: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Failed to write snapshot: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes the full record set to a Parquet file.
#[derive(Debug, Clone)]
pub struct ParquetSnapshot {
    path: PathBuf,
}

impl ParquetSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arrow schema mirroring the `highlights_notes` columns.
    ///
    /// Timestamps stay RFC 3339 text, matching the relational store's own
    /// encoding, so the two files always agree byte-for-byte on values.
    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("book_title", DataType::Utf8, false),
            Field::new("book_author", DataType::Utf8, false),
            Field::new("book_asin", DataType::Utf8, false),
            Field::new("item_type", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("original_id", DataType::Utf8, false),
            Field::new("location", DataType::Utf8, false),
            Field::new("date_created", DataType::Utf8, true),
            Field::new("retrieved_at", DataType::Utf8, false),
        ]))
    }

    fn to_batch(records: &[AnnotationRecord]) -> Result<RecordBatch, ArrowError> {
        let ids = Int64Array::from(records.iter().map(|r| r.id).collect::<Vec<i64>>());
        let titles = StringArray::from_iter_values(records.iter().map(|r| r.book_title.as_str()));
        let authors = StringArray::from_iter_values(records.iter().map(|r| r.book_author.as_str()));
        let asins = StringArray::from_iter_values(records.iter().map(|r| r.book_asin.as_str()));
        let item_types =
            StringArray::from_iter_values(records.iter().map(|r| r.item_type.as_str()));
        let contents = StringArray::from_iter_values(records.iter().map(|r| r.content.as_str()));
        let original_ids =
            StringArray::from_iter_values(records.iter().map(|r| r.original_id.as_str()));
        let locations = StringArray::from_iter_values(records.iter().map(|r| r.location.as_str()));
        let dates_created = StringArray::from_iter(
            records
                .iter()
                .map(|r| r.date_created.map(|dt| dt.to_rfc3339())),
        );
        let retrieved =
            StringArray::from_iter_values(records.iter().map(|r| r.retrieved_at.to_rfc3339()));

        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(ids) as ArrayRef,
                Arc::new(titles),
                Arc::new(authors),
                Arc::new(asins),
                Arc::new(item_types),
                Arc::new(contents),
                Arc::new(original_ids),
                Arc::new(locations),
                Arc::new(dates_created),
                Arc::new(retrieved),
            ],
        )
    }

    /// Replace the snapshot with exactly these records.
    pub fn write_all(&self, records: &[AnnotationRecord]) -> Result<(), SnapshotError> {
        let tmp_path = self.path.with_extension("parquet.tmp");

        let file = File::create(&tmp_path)?;
        let mut writer = ArrowWriter::try_new(file, Self::schema(), None)?;
        if !records.is_empty() {
            let batch = Self::to_batch(records)?;
            writer.write(&batch)?;
        }
        writer.close()?;

        std::fs::rename(&tmp_path, &self.path)?;

        info!(
            "Wrote {} rows to snapshot {}",
            records.len(),
            self.path.display()
        );

        Ok(())
    }
}
