//! Configuration, document lifecycle and retrieval-augmented answering.

pub mod bootstrap;
pub mod config;
pub mod documents;
pub mod rag;
pub mod vault;

pub use bootstrap::{App, AppBuilder};
pub use config::Config;
pub use documents::{
    DeleteReport, DocumentService, DocumentServiceError, Notice, NoticeLevel, UploadError,
    UploadReport, UploadedFile,
};
pub use rag::RagService;
