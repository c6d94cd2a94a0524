// Document source module
// Resolves a document name to its extracted, paginated text


use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{ManualError, Result};

/// Page separator emitted by `pdftotext` and most PDF-to-text converters
pub const PAGE_SEPARATOR: char = '\u{000C}';

const TEXT_EXTENSION: &str = "txt";

/// Text extracted from one page of a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub text: String,
    /// 1-based page number within the source document
    pub page_number: u32,
    pub source_id: String,
}

/// A named store of paginated document text
pub trait DocumentSource: Send + Sync {
    /// Fetch every non-blank page of `source_id`, in page order.
    ///
    /// Fails with [`ManualError::NotFound`] when the store has no such document.
    fn fetch(&self, source_id: &str) -> Result<Vec<RawPage>>;

    /// Names of all documents this store can serve
    fn list(&self) -> Result<Vec<String>>;
}

/// Split converter output into pages, numbering every page and dropping blank ones
#[inline]
pub fn split_pages(source_id: &str, text: &str) -> Vec<RawPage> {
    text.split(PAGE_SEPARATOR)
        .zip(1_u32..)
        .filter(|(page, _)| !page.trim().is_empty())
        .map(|(page, page_number)| RawPage {
            text: page.trim().to_string(),
            page_number,
            source_id: source_id.to_string(),
        })
        .collect()
}

/// Documents stored as pre-extracted text files in a single directory.
///
/// A request for `Lada_Vesta.pdf` is served from `Lada_Vesta.txt`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, source_id: &str) -> Option<PathBuf> {
        let name = source_id.trim();
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return None;
        }

        let path = self.root.join(name);
        let is_text = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(TEXT_EXTENSION));

        Some(if is_text {
            path
        } else {
            path.with_extension(TEXT_EXTENSION)
        })
    }
}

impl DocumentSource for DirectorySource {
    fn fetch(&self, source_id: &str) -> Result<Vec<RawPage>> {
        let path = self
            .resolve(source_id)
            .ok_or_else(|| ManualError::NotFound(source_id.to_string()))?;

        if !path.is_file() {
            debug!("No extracted text at {}", path.display());
            return Err(ManualError::NotFound(source_id.to_string()));
        }

        let text = fs::read_to_string(&path)?;
        let pages = split_pages(source_id, &text);
        debug!(
            "Read {} non-blank pages of '{}' from {}",
            pages.len(),
            source_id,
            path.display()
        );
        Ok(pages)
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            warn!("Documents directory {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_text = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(TEXT_EXTENSION));
            if !is_text || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(format!("{stem}.pdf"));
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Documents held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: BTreeMap<String, Vec<String>>,
}

impl MemorySource {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document whose pages are given in order, starting at page 1
    #[inline]
    #[must_use]
    pub fn with_document<I, S>(mut self, source_id: &str, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.documents.insert(
            source_id.to_string(),
            pages.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl DocumentSource for MemorySource {
    fn fetch(&self, source_id: &str) -> Result<Vec<RawPage>> {
        let pages = self
            .documents
            .get(source_id)
            .ok_or_else(|| ManualError::NotFound(source_id.to_string()))?;

        Ok(pages
            .iter()
            .zip(1_u32..)
            .filter(|(text, _)| !text.trim().is_empty())
            .map(|(text, page_number)| RawPage {
                text: text.trim().to_string(),
                page_number,
                source_id: source_id.to_string(),
            })
            .collect())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.documents.keys().cloned().collect())
    }
}
