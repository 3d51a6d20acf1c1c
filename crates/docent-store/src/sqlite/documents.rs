use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::SqliteStore;
use crate::error::StoreError;

pub const DOCUMENTS_PER_PAGE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub user_id: i64,
    pub title: String,
    pub file_path: String,
    pub is_processed: bool,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub documents: Vec<DocumentRecord>,
    pub page: u64,
    pub per_page: u32,
    pub total: u64,
    pub num_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Admin listing filters.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub processed: Option<bool>,
    /// Substring matched against the title or the owner's email.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDocument {
    #[serde(flatten)]
    pub document: DocumentRecord,
    pub owner_email: String,
}

type DocumentRow = (String, i64, String, String, bool, DateTime<Utc>, DateTime<Utc>);

const DOCUMENT_COLUMNS: &str =
    "d.id, d.user_id, d.title, d.file_path, d.is_processed, d.uploaded_at, d.updated_at";

fn into_record(row: DocumentRow) -> Result<DocumentRecord, StoreError> {
    let (id, user_id, title, file_path, is_processed, uploaded_at, updated_at) = row;
    let id = Uuid::parse_str(&id)
        .map_err(|e| StoreError::InvalidData(format!("document id {id}: {e}")))?;
    Ok(DocumentRecord {
        id,
        user_id,
        title,
        file_path,
        is_processed,
        uploaded_at,
        updated_at,
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl SqliteStore {
    /// Insert a new, unprocessed document record.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (for example an unknown user).
    pub async fn create_document(
        &self,
        user_id: i64,
        title: &str,
        file_path: &str,
    ) -> Result<DocumentRecord, StoreError> {
        let now = Utc::now();
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_owned(),
            file_path: file_path.to_owned(),
            is_processed: false,
            uploaded_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO documents (id, user_id, title, file_path, is_processed, uploaded_at, updated_at) \
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(user_id)
        .bind(title)
        .bind(file_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// Fetch a document only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn document_for_user(
        &self,
        user_id: i64,
        id: Uuid,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.id = ? AND d.user_id = ?"
        ))
        .bind(id.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_record).transpose()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn title_exists(&self, user_id: i64, title: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE user_id = ? AND title = ?)",
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// One page of the user's documents, newest first.
    ///
    /// `page` is 1-based; out-of-range pages are clamped to the nearest valid page.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_documents(
        &self,
        user_id: i64,
        page: u64,
        per_page: u32,
    ) -> Result<DocumentPage, StoreError> {
        let per_page = per_page.max(1);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        let total = u64::try_from(total).unwrap_or(0);
        let num_pages = total.div_ceil(u64::from(per_page)).max(1);
        let page = page.clamp(1, num_pages);
        let offset = (page - 1) * u64::from(per_page);

        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.user_id = ? \
             ORDER BY d.uploaded_at DESC, d.rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(i64::from(per_page))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;

        let documents = rows
            .into_iter()
            .map(into_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DocumentPage {
            documents,
            page,
            per_page,
            total,
            num_pages,
            has_next: page < num_pages,
            has_previous: page > 1,
        })
    }

    /// Every document across users, newest first, for the admin listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_all_documents(
        &self,
        filter: &DocumentFilter,
    ) -> Result<Vec<AdminDocument>, StoreError> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {DOCUMENT_COLUMNS}, u.email FROM documents d \
             JOIN users u ON u.id = d.user_id WHERE 1 = 1"
        ));
        if let Some(processed) = filter.processed {
            qb.push(" AND d.is_processed = ").push_bind(processed);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (d.title LIKE ")
                .push_bind(pattern.clone())
                .push(r" ESCAPE '\' OR u.email LIKE ")
                .push_bind(pattern)
                .push(r" ESCAPE '\')");
        }
        qb.push(" ORDER BY d.uploaded_at DESC, d.rowid DESC");

        let rows: Vec<(String, i64, String, String, bool, DateTime<Utc>, DateTime<Utc>, String)> =
            qb.build_query_as().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(id, user_id, title, file_path, processed, uploaded, updated, email)| {
                Ok(AdminDocument {
                    document: into_record((
                        id, user_id, title, file_path, processed, uploaded, updated,
                    ))?,
                    owner_email: email,
                })
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the document does not exist.
    pub async fn mark_processed(&self, id: Uuid) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE documents SET is_processed = 1, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "document",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a document record. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_document(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Escape `LIKE` wildcards so a search matches its text literally.
fn escape_like(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len());
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_store;
    use super::*;

    async fn user(store: &SqliteStore, email: &str) -> i64 {
        store.create_user(email, "u", false).await.unwrap().0.id
    }

    #[tokio::test]
    async fn create_and_fetch_scoped_to_owner() {
        let (_dir, store) = test_store().await;
        let owner = user(&store, "owner@example.com").await;
        let other = user(&store, "other@example.com").await;

        let doc = store
            .create_document(owner, "guide.md", "documents/1/guide.md")
            .await
            .unwrap();
        assert!(!doc.is_processed);

        let fetched = store.document_for_user(owner, doc.id).await.unwrap();
        assert_eq!(fetched, Some(doc.clone()));
        assert!(store.document_for_user(other, doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn title_exists_per_user() {
        let (_dir, store) = test_store().await;
        let a = user(&store, "a@example.com").await;
        let b = user(&store, "b@example.com").await;
        store.create_document(a, "notes.md", "p").await.unwrap();

        assert!(store.title_exists(a, "notes.md").await.unwrap());
        assert!(!store.title_exists(b, "notes.md").await.unwrap());
        assert!(!store.title_exists(a, "other.md").await.unwrap());
    }

    #[tokio::test]
    async fn mark_processed_and_delete() {
        let (_dir, store) = test_store().await;
        let a = user(&store, "a@example.com").await;
        let doc = store.create_document(a, "x.md", "p").await.unwrap();

        store.mark_processed(doc.id).await.unwrap();
        let fetched = store.document_for_user(a, doc.id).await.unwrap().unwrap();
        assert!(fetched.is_processed);
        assert!(fetched.updated_at >= fetched.uploaded_at);

        assert!(store.delete_document(doc.id).await.unwrap());
        assert!(!store.delete_document(doc.id).await.unwrap());
        assert!(matches!(
            store.mark_processed(doc.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn pagination_newest_first() {
        let (_dir, store) = test_store().await;
        let a = user(&store, "a@example.com").await;
        for i in 0..23 {
            store
                .create_document(a, &format!("doc-{i:02}.md"), "p")
                .await
                .unwrap();
        }

        let first = store.list_documents(a, 1, DOCUMENTS_PER_PAGE).await.unwrap();
        assert_eq!(first.total, 23);
        assert_eq!(first.num_pages, 3);
        assert_eq!(first.documents.len(), 10);
        assert_eq!(first.documents[0].title, "doc-22.md");
        assert!(first.has_next);
        assert!(!first.has_previous);

        let last = store.list_documents(a, 3, DOCUMENTS_PER_PAGE).await.unwrap();
        assert_eq!(last.documents.len(), 3);
        assert_eq!(last.documents[2].title, "doc-00.md");
        assert!(!last.has_next);

        let clamped = store.list_documents(a, 99, DOCUMENTS_PER_PAGE).await.unwrap();
        assert_eq!(clamped.page, 3);
        let zero = store.list_documents(a, 0, DOCUMENTS_PER_PAGE).await.unwrap();
        assert_eq!(zero.page, 1);
    }

    #[tokio::test]
    async fn empty_listing_has_one_page() {
        let (_dir, store) = test_store().await;
        let a = user(&store, "a@example.com").await;
        let page = store.list_documents(a, 1, DOCUMENTS_PER_PAGE).await.unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.num_pages, 1);
        assert!(page.documents.is_empty());
    }

    #[tokio::test]
    async fn admin_listing_filters() {
        let (_dir, store) = test_store().await;
        let a = user(&store, "alice@example.com").await;
        let b = user(&store, "bob@example.org").await;
        let done = store.create_document(a, "rust.md", "p").await.unwrap();
        store.mark_processed(done.id).await.unwrap();
        store.create_document(b, "python.md", "p").await.unwrap();

        let all = store
            .list_all_documents(&DocumentFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let processed = store
            .list_all_documents(&DocumentFilter {
                processed: Some(true),
                search: None,
            })
            .await
            .unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].owner_email, "alice@example.com");

        let by_email = store
            .list_all_documents(&DocumentFilter {
                processed: None,
                search: Some("example.org".into()),
            })
            .await
            .unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].document.title, "python.md");
    }

    #[tokio::test]
    async fn admin_search_treats_wildcards_literally() {
        let (_dir, store) = test_store().await;
        let a = user(&store, "alice@example.com").await;
        store.create_document(a, "100%_done.md", "p").await.unwrap();
        store.create_document(a, "1000-done.md", "p").await.unwrap();

        let search = |text: &str| DocumentFilter {
            processed: None,
            search: Some(text.into()),
        };
        let percent = store.list_all_documents(&search("0%_d")).await.unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].document.title, "100%_done.md");

        assert_eq!(store.list_all_documents(&search("_")).await.unwrap().len(), 1);
        assert_eq!(store.list_all_documents(&search("%")).await.unwrap().len(), 1);
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("a%b_c\\d"), "a\\%b\\_c\\\\d");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn deleting_user_cascades() {
        let (_dir, store) = test_store().await;
        let a = user(&store, "a@example.com").await;
        let doc = store.create_document(a, "x.md", "p").await.unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(a)
            .execute(store.pool())
            .await
            .unwrap();
        assert!(!store.delete_document(doc.id).await.unwrap());
    }
}
