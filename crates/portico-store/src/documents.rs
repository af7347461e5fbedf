//! Catalog operations for [`Document`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Document, NewDocument};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new document and return the created record.
    ///
    /// Title, category and file URL must be non-empty; the file URL must
    /// already have been issued by the blob store.  Id and creation time
    /// are server-assigned and the download counter starts at zero,
    /// whatever the caller supplied.
    pub fn insert_document(&self, new: &NewDocument) -> Result<Document> {
        if new.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".into()));
        }
        if new.category.trim().is_empty() {
            return Err(StoreError::Validation("category must not be empty".into()));
        }
        if new.file_url.trim().is_empty() {
            return Err(StoreError::Validation("file_url must not be empty".into()));
        }

        let document = Document {
            id: Uuid::new_v4(),
            title: new.title.clone(),
            description: new.description.clone(),
            category: new.category.clone(),
            file_url: new.file_url.clone(),
            file_type: new.file_type.clone(),
            uploaded_by: new.uploaded_by.clone(),
            created_at: Utc::now(),
            download_count: 0,
        };

        self.conn().execute(
            "INSERT INTO documents (id, title, description, category, file_url,
                                    file_type, uploaded_by, created_at, download_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                document.id.to_string(),
                document.title,
                document.description,
                document.category,
                document.file_url,
                document.file_type,
                document.uploaded_by,
                document.created_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(id = %document.id, title = %document.title, "document published");
        Ok(document)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single document by UUID.
    pub fn get_document(&self, id: Uuid) -> Result<Document> {
        self.conn()
            .query_row(
                "SELECT id, title, description, category, file_url, file_type,
                        uploaded_by, created_at, download_count
                 FROM documents
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_document,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Search the catalog, newest first.
    ///
    /// An empty query returns the full catalog.  A non-empty query is
    /// matched case-insensitively as a substring against title, description
    /// and category; one matching field is enough.
    ///
    /// This fetches every row and filters in memory.  Fine for an
    /// institutional-scale catalog; revisit only if the catalog outgrows
    /// that.
    pub fn search_documents(&self, query: &str) -> Result<Vec<Document>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, title, description, category, file_url, file_type,
                    uploaded_by, created_at, download_count
             FROM documents
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_document)?;
        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }

        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(documents);
        }

        Ok(documents
            .into_iter()
            .filter(|d| {
                d.title.to_lowercase().contains(&query)
                    || d.description.to_lowercase().contains(&query)
                    || d.category.to_lowercase().contains(&query)
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Edit document metadata.
    ///
    /// Touches title, description and category only; the file reference
    /// and the download counter are out of reach.  Ledger entries written
    /// before the edit keep the title snapshot they were recorded with.
    pub fn update_document_metadata(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
        category: &str,
    ) -> Result<()> {
        if title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".into()));
        }
        if category.trim().is_empty() {
            return Err(StoreError::Validation("category must not be empty".into()));
        }

        let affected = self.conn().execute(
            "UPDATE documents SET title = ?2, description = ?3, category = ?4
             WHERE id = ?1",
            params![id.to_string(), title, description, category],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Document`].
fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let description: String = row.get(2)?;
    let category: String = row.get(3)?;
    let file_url: String = row.get(4)?;
    let file_type: String = row.get(5)?;
    let uploaded_by: String = row.get(6)?;
    let created_str: String = row.get(7)?;
    let download_count: i64 = row.get(8)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Document {
        id,
        title,
        description,
        category,
        file_url,
        file_type,
        uploaded_by,
        created_at,
        download_count,
    })
}
