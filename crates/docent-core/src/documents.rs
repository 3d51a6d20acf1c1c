//! Upload, listing and deletion of a user's Markdown documents.
//!
//! Every upload is stored under `<media_root>/documents/<user_id>/`, recorded
//! in SQLite and ingested into the user's vector collection. Deletion removes
//! the vectors first (best effort), then the backing file, then the record.

use std::path::{Path, PathBuf};

use docent_store::document::{ChunkTags, DocumentError, IngestionPipeline, MarkdownLoader};
use docent_store::{DOCUMENTS_PER_PAGE, DocumentPage, SqliteStore, StoreError, VectorIndex};
use serde::Serialize;
use uuid::Uuid;

const MARKDOWN_SUFFIX: &str = ".md";
const FALLBACK_STEM: &str = "document";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no file selected")]
    NoFiles,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentServiceError {
    #[error("document {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure while storing or ingesting a single upload.
#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// One file from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A user-facing status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub messages: Vec<Notice>,
    /// Ids of the documents that were stored and ingested.
    pub uploaded: Vec<Uuid>,
    pub success: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl UploadReport {
    fn push(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.messages.push(Notice::new(level, text));
    }

    fn summarize(&mut self) {
        if self.success > 0 {
            let n = self.success;
            self.push(
                NoticeLevel::Success,
                format!("{n} document(s) uploaded and processed successfully"),
            );
        }
        if self.skipped > 0 {
            let n = self.skipped;
            self.push(
                NoticeLevel::Info,
                format!("{n} file(s) skipped because they already exist"),
            );
        }
        if self.errors > 0 {
            let n = self.errors;
            self.push(NoticeLevel::Warning, format!("{n} file(s) failed"));
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub messages: Vec<Notice>,
}

pub struct DocumentService {
    store: SqliteStore,
    pipeline: IngestionPipeline,
    loader: MarkdownLoader,
    media_root: PathBuf,
}

impl DocumentService {
    #[must_use]
    pub fn new(
        store: SqliteStore,
        pipeline: IngestionPipeline,
        loader: MarkdownLoader,
        media_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            pipeline,
            loader,
            media_root: media_root.into(),
        }
    }

    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        self.pipeline.index()
    }

    #[must_use]
    pub fn user_media_dir(&self, user_id: i64) -> PathBuf {
        self.media_root.join("documents").join(user_id.to_string())
    }

    /// Store, record and ingest every Markdown file in `files`.
    ///
    /// Per-file problems, database failures included, become entries in the
    /// report; only an empty upload is an error.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::NoFiles` for an empty upload.
    pub async fn upload(
        &self,
        user_id: i64,
        files: Vec<UploadedFile>,
    ) -> Result<UploadReport, UploadError> {
        if files.is_empty() {
            return Err(UploadError::NoFiles);
        }

        let mut report = UploadReport::default();
        for file in &files {
            let title = base_name(&file.filename);

            if !title.ends_with(MARKDOWN_SUFFIX) {
                tracing::warn!(user_id, filename = %title, "rejected non-markdown upload");
                report.errors += 1;
                report.push(
                    NoticeLevel::Error,
                    format!("{title}: only Markdown (.md) files can be uploaded"),
                );
                continue;
            }

            let exists = match self.store.title_exists(user_id, title).await {
                Ok(exists) => exists,
                Err(e) => {
                    tracing::error!(user_id, filename = %title, "duplicate check failed: {e}");
                    report.errors += 1;
                    report.push(
                        NoticeLevel::Error,
                        format!("{title}: processing failed - {e}"),
                    );
                    continue;
                }
            };
            if exists {
                tracing::warn!(user_id, filename = %title, "skipped duplicate upload");
                report.skipped += 1;
                report.push(
                    NoticeLevel::Warning,
                    format!(
                        "{title}: a document with the same file name already exists, skipped"
                    ),
                );
                continue;
            }

            match self.process(user_id, title, &file.bytes).await {
                Ok(id) => {
                    report.success += 1;
                    report.uploaded.push(id);
                }
                Err(e) => {
                    tracing::error!(user_id, filename = %title, "document processing failed: {e}");
                    report.errors += 1;
                    report.push(
                        NoticeLevel::Error,
                        format!("{title}: processing failed - {e}"),
                    );
                }
            }
        }

        report.summarize();
        Ok(report)
    }

    async fn process(&self, user_id: i64, title: &str, bytes: &[u8]) -> Result<Uuid, ProcessError> {
        let size = bytes.len() as u64;
        if size > self.loader.max_file_size {
            return Err(DocumentError::FileTooLarge(size).into());
        }

        let path = self.write_file(user_id, title, bytes).await?;
        let file_path = path.display().to_string();

        let record = match self.store.create_document(user_id, title, &file_path).await {
            Ok(record) => record,
            Err(e) => {
                remove_backing_file(&path).await;
                return Err(e.into());
            }
        };

        let tags = ChunkTags {
            user_id,
            document_id: record.id,
        };
        let chunks = self
            .pipeline
            .load_and_ingest(&self.loader, &path, tags)
            .await?;
        self.store.mark_processed(record.id).await?;

        tracing::info!(
            user_id,
            document_id = %record.id,
            chunks,
            path = %file_path,
            "document uploaded"
        );
        Ok(record.id)
    }

    async fn write_file(
        &self,
        user_id: i64,
        title: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, std::io::Error> {
        let dir = self.user_media_dir(user_id);
        tokio::fs::create_dir_all(&dir).await?;

        let stem = sanitize_stem(title);
        let mut path = dir.join(format!("{stem}{MARKDOWN_SUFFIX}"));
        if tokio::fs::try_exists(&path).await? {
            let suffix = Uuid::new_v4().simple().to_string();
            path = dir.join(format!("{stem}_{}{MARKDOWN_SUFFIX}", &suffix[..8]));
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// One page of the user's documents, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self, user_id: i64, page: u64) -> Result<DocumentPage, StoreError> {
        self.store
            .list_documents(user_id, page, DOCUMENTS_PER_PAGE)
            .await
    }

    /// Delete one of the user's documents with its chunks and backing file.
    ///
    /// A vector cleanup failure is reported in the returned messages and
    /// does not stop the deletion.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist or belongs to another
    /// user, or a database error.
    pub async fn delete(
        &self,
        user_id: i64,
        id: Uuid,
    ) -> Result<DeleteReport, DocumentServiceError> {
        let Some(document) = self.store.document_for_user(user_id, id).await? else {
            return Err(DocumentServiceError::NotFound(id));
        };

        let mut report = DeleteReport::default();
        match self.index().delete_document(user_id, &id.to_string()).await {
            Ok(outcome) => {
                tracing::info!(user_id, document_id = %id, ?outcome, "vector cleanup finished");
            }
            Err(e) => {
                report.messages.push(Notice::new(
                    NoticeLevel::Error,
                    format!("error while removing the document from the vector store: {e}"),
                ));
            }
        }

        remove_backing_file(Path::new(&document.file_path)).await;
        self.store.delete_document(id).await?;

        tracing::info!(user_id, document_id = %id, "document deleted");
        report
            .messages
            .push(Notice::new(NoticeLevel::Success, "document deleted"));
        Ok(report)
    }
}

async fn remove_backing_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove document file: {e}"),
    }
}

/// Last path component of a client-supplied filename.
fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// Filesystem-safe stem for a `.md` title.
fn sanitize_stem(title: &str) -> String {
    let stem = title.strip_suffix(MARKDOWN_SUFFIX).unwrap_or(title);
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        FALLBACK_STEM.to_owned()
    } else {
        cleaned.to_owned()
    }
}
