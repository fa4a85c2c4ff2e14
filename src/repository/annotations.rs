//! Diesel-based annotation repository for SQLite.
//!
//! One table, `highlights_notes`, keyed for deduplication on the unique
//! `original_id` column. Inserts use ON CONFLICT DO NOTHING so re-running
//! a harvest against an unchanged source never grows the table.

use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};

use super::pool::{AsyncSqlitePool, DieselError};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{AnnotationRecord, ItemType};
use crate::schema::highlights_notes;

/// Table DDL, applied idempotently at open.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS highlights_notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_title TEXT NOT NULL,
    book_author TEXT NOT NULL DEFAULT '',
    book_asin TEXT NOT NULL DEFAULT '',
    item_type TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    original_id TEXT NOT NULL UNIQUE,
    location TEXT NOT NULL DEFAULT '',
    date_created TEXT,
    retrieved_at TEXT NOT NULL
);
"#;

/// Count of records for one item type.
#[derive(Debug, Clone)]
pub struct TypeCount {
    pub item_type: String,
    pub count: u64,
}

/// Distinct-book count for one author.
#[derive(Debug, Clone)]
pub struct AuthorBooks {
    pub author: String,
    pub books: u64,
}

/// Diesel-based annotation repository with compile-time query checking.
#[derive(Clone)]
pub struct AnnotationRepository {
    pool: AsyncSqlitePool,
}

impl AnnotationRepository {
    /// Create a new annotation repository.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Open a repository against a database file, creating the table if needed.
    pub async fn open(pool: AsyncSqlitePool) -> Result<Self, DieselError> {
        let repo = Self::new(pool);
        repo.ensure_schema().await?;
        Ok(repo)
    }

    /// Apply the table DDL. Safe to call on an existing database.
    pub async fn ensure_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        Ok(())
    }

    /// Insert records, ignoring any whose `original_id` already exists.
    ///
    /// Records failing `is_valid_for_write` are dropped before the write.
    /// Returns the number of rows actually inserted; the whole batch runs
    /// in one transaction.
    pub async fn insert_ignoring_duplicates(
        &self,
        records: &[AnnotationRecord],
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;

        let valid: Vec<&AnnotationRecord> =
            records.iter().filter(|r| r.is_valid_for_write()).collect();

        conn.transaction(|conn| {
            Box::pin(async move {
                let mut inserted = 0;
                for record in valid {
                    let date_created = record.date_created.map(|dt| dt.to_rfc3339());
                    let retrieved_at = record.retrieved_at.to_rfc3339();

                    inserted += diesel::insert_into(highlights_notes::table)
                        .values((
                            highlights_notes::book_title.eq(&record.book_title),
                            highlights_notes::book_author.eq(&record.book_author),
                            highlights_notes::book_asin.eq(&record.book_asin),
                            highlights_notes::item_type.eq(record.item_type.as_str()),
                            highlights_notes::content.eq(&record.content),
                            highlights_notes::original_id.eq(&record.original_id),
                            highlights_notes::location.eq(&record.location),
                            highlights_notes::date_created.eq(&date_created),
                            highlights_notes::retrieved_at.eq(&retrieved_at),
                        ))
                        .on_conflict(highlights_notes::original_id)
                        .do_nothing()
                        .execute(conn)
                        .await?;
                }
                Ok(inserted)
            })
        })
        .await
    }

    /// Count all records.
    pub async fn count(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = highlights_notes::table
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }

    /// Load the entire table in insertion order.
    pub async fn get_all(&self) -> Result<Vec<AnnotationRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<AnnotationRow> = highlights_notes::table
            .order(highlights_notes::id.asc())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(AnnotationRow::into_record).collect())
    }

    /// Record counts grouped by item type.
    pub async fn count_by_type(&self) -> Result<Vec<TypeCount>, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<TypeCountRow> = diesel::sql_query(
            "SELECT item_type, COUNT(*) as count FROM highlights_notes \
             GROUP BY item_type ORDER BY item_type",
        )
        .load(&mut conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TypeCount {
                item_type: r.item_type,
                count: r.count as u64,
            })
            .collect())
    }

    /// Count records whose content is empty.
    pub async fn count_empty_content(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = highlights_notes::table
            .filter(highlights_notes::content.eq(""))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }

    /// Count `original_id` groups holding more than one row.
    ///
    /// The unique constraint should keep this at zero; the stats command
    /// surfaces it as a sanity check.
    pub async fn duplicate_key_groups(&self) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        let row: CountRow = diesel::sql_query(
            "SELECT COUNT(*) as count FROM \
             (SELECT original_id FROM highlights_notes GROUP BY original_id HAVING COUNT(*) > 1)",
        )
        .get_result(&mut conn)
        .await?;

        Ok(row.count as u64)
    }

    /// Authors ordered by how many distinct books of theirs hold records.
    ///
    /// The unresolved-author sentinel is excluded; those rows carry no
    /// author information worth rolling up.
    pub async fn authors_by_book_count(&self) -> Result<Vec<AuthorBooks>, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<AuthorBooksRow> = diesel::sql_query(
            "SELECT book_author, COUNT(DISTINCT book_title) as books FROM highlights_notes \
             WHERE book_author != '' AND book_author != 'Unknown Author' \
             GROUP BY book_author ORDER BY books DESC, book_author ASC",
        )
        .load(&mut conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AuthorBooks {
                author: r.book_author,
                books: r.books as u64,
            })
            .collect())
    }

    /// Most recently retrieved records of one type.
    pub async fn recent_by_type(
        &self,
        item_type: ItemType,
        limit: u32,
    ) -> Result<Vec<AnnotationRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<AnnotationRow> = highlights_notes::table
            .filter(highlights_notes::item_type.eq(item_type.as_str()))
            .order((
                highlights_notes::retrieved_at.desc(),
                highlights_notes::id.desc(),
            ))
            .limit(limit as i64)
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(AnnotationRow::into_record).collect())
    }
}

/// Raw table row as diesel loads it.
#[derive(Queryable)]
struct AnnotationRow {
    id: i32,
    book_title: String,
    book_author: String,
    book_asin: String,
    item_type: String,
    content: String,
    original_id: String,
    location: String,
    date_created: Option<String>,
    retrieved_at: String,
}

impl AnnotationRow {
    fn into_record(self) -> AnnotationRecord {
        AnnotationRecord {
            id: self.id as i64,
            book_title: self.book_title,
            book_author: self.book_author,
            book_asin: self.book_asin,
            item_type: ItemType::from_str(&self.item_type).unwrap_or(ItemType::Highlight),
            content: self.content,
            original_id: self.original_id,
            location: self.location,
            date_created: parse_datetime_opt(self.date_created),
            retrieved_at: parse_datetime(&self.retrieved_at),
        }
    }
}

// Helper structs for SQL queries
#[derive(diesel::QueryableByName)]
struct TypeCountRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    item_type: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

#[derive(diesel::QueryableByName)]
struct CountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

#[derive(diesel::QueryableByName)]
struct AuthorBooksRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    book_author: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    books: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemType;
    use tempfile::tempdir;

    async fn setup_test_repo() -> (AnnotationRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = AsyncSqlitePool::from_path(&db_path);
        let repo = AnnotationRepository::open(pool).await.unwrap();
        (repo, dir)
    }

    fn record(original_id: &str, item_type: ItemType, content: &str) -> AnnotationRecord {
        AnnotationRecord::new(
            "The Dispossessed".to_string(),
            "Ursula K. Le Guin".to_string(),
            "B002PDMYQO".to_string(),
            item_type,
            content.to_string(),
            original_id.to_string(),
            "Page 42".to_string(),
        )
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_on_original_id() {
        let (repo, _dir) = setup_test_repo().await;

        let records = vec![record("highlight-a", ItemType::Highlight, "first pass")];
        assert_eq!(repo.insert_ignoring_duplicates(&records).await.unwrap(), 1);
        assert_eq!(repo.insert_ignoring_duplicates(&records).await.unwrap(), 0);
        assert_eq!(repo.count().await.unwrap(), 1);

        // The stored row keeps its first-write content
        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "first pass");
    }

    #[tokio::test]
    async fn test_insert_counts_only_new_rows() {
        let (repo, _dir) = setup_test_repo().await;

        let first = vec![
            record("highlight-a", ItemType::Highlight, "alpha"),
            record("note-b", ItemType::Note, "beta"),
        ];
        assert_eq!(repo.insert_ignoring_duplicates(&first).await.unwrap(), 2);

        let second = vec![
            record("highlight-a", ItemType::Highlight, "alpha"),
            record("highlight-c", ItemType::Highlight, "gamma"),
        ];
        assert_eq!(repo.insert_ignoring_duplicates(&second).await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_invalid_records_are_not_written() {
        let (repo, _dir) = setup_test_repo().await;

        let mut untitled = record("highlight-a", ItemType::Highlight, "text");
        untitled.book_title = String::new();
        let mut keyless = record("", ItemType::Highlight, "text");
        keyless.original_id = String::new();

        let written = repo
            .insert_ignoring_duplicates(&[untitled, keyless])
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_all_round_trips_fields() {
        let (repo, _dir) = setup_test_repo().await;

        let mut original = record("note-xyz", ItemType::Note, "margin thought");
        original.location = "Location 1234".to_string();
        repo.insert_ignoring_duplicates(std::slice::from_ref(&original))
            .await
            .unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        let stored = &all[0];
        assert!(stored.id > 0);
        assert_eq!(stored.book_title, original.book_title);
        assert_eq!(stored.book_author, original.book_author);
        assert_eq!(stored.book_asin, original.book_asin);
        assert_eq!(stored.item_type, ItemType::Note);
        assert_eq!(stored.content, "margin thought");
        assert_eq!(stored.original_id, "note-xyz");
        assert_eq!(stored.location, "Location 1234");
        assert!(stored.date_created.is_none());
        assert_eq!(
            stored.retrieved_at.timestamp(),
            original.retrieved_at.timestamp()
        );
    }

    #[tokio::test]
    async fn test_stat_queries() {
        let (repo, _dir) = setup_test_repo().await;

        let mut empty_content = record("highlight-2", ItemType::Highlight, "");
        empty_content.book_title = "Another Book".to_string();
        let records = vec![
            record("highlight-1", ItemType::Highlight, "text"),
            empty_content,
            record("note-1", ItemType::Note, "a note"),
        ];
        repo.insert_ignoring_duplicates(&records).await.unwrap();

        let by_type = repo.count_by_type().await.unwrap();
        assert_eq!(by_type.len(), 2);
        assert_eq!(by_type[0].item_type, "highlight");
        assert_eq!(by_type[0].count, 2);
        assert_eq!(by_type[1].item_type, "note");
        assert_eq!(by_type[1].count, 1);

        assert_eq!(repo.count_empty_content().await.unwrap(), 1);
        assert_eq!(repo.duplicate_key_groups().await.unwrap(), 0);

        let authors = repo.authors_by_book_count().await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].author, "Ursula K. Le Guin");
        assert_eq!(authors[0].books, 2);

        let recent = repo.recent_by_type(ItemType::Highlight, 5).await.unwrap();
        assert_eq!(recent.len(), 2);
    }
}
