use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use super::{DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata};

const EXTENSIONS: &[&str] = &["md", "markdown"];

/// Loads a Markdown file and renders it to plain text.
pub struct MarkdownLoader {
    pub max_file_size: u64,
}

impl Default for MarkdownLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for MarkdownLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = tokio::fs::canonicalize(&path).await?;

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();
            if !EXTENSIONS.contains(&ext.as_str()) {
                return Err(DocumentError::UnsupportedFormat(ext));
            }

            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let raw = tokio::fs::read_to_string(&path).await?;

            Ok(vec![Document {
                content: markdown_to_text(&raw),
                metadata: DocumentMetadata {
                    source: path.display().to_string(),
                    content_type: "text/markdown".to_owned(),
                    extra: HashMap::new(),
                },
            }])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        EXTENSIONS
    }
}

/// Strip Markdown markup, keeping the readable text.
///
/// Block elements start on a fresh line and end with a blank line, code is kept verbatim and only the
/// visible text of links and images survives. Raw HTML is dropped.
#[must_use]
pub fn markdown_to_text(input: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut out = String::with_capacity(input.len());

    for event in Parser::new_ext(input, options) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Start(
                Tag::Paragraph
                | Tag::Item
                | Tag::List(_)
                | Tag::CodeBlock(_)
                | Tag::BlockQuote(_),
            ) if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::TableHead
                | TagEnd::TableRow,
            ) => out.push_str("\n\n"),
            Event::End(TagEnd::TableCell) => out.push(' '),
            Event::Rule => out.push_str("\n\n"),
            _ => {}
        }
    }

    out
}
