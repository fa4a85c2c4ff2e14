//! Data models for KindleHarvest.

mod annotation;

pub use annotation::{AnnotationRecord, BookExportStatus, ItemType, RunSummary};
