//! PDF text extraction
//!
//! Wraps the pdf-extract crate. Page texts are concatenated in page order
//! with no separator; a page that yields no text contributes an empty
//! string. Encrypted, scanned or corrupted PDFs surface as `ExtractError`.

use thiserror::Error;

use crate::utils;

/// The header may be preceded by junk, but must start within the first 1 KiB
const HEADER_SEARCH_WINDOW: usize = 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("uploaded file is empty")]
    Empty,
    #[error("file is not a PDF document")]
    NotPdf,
    #[error("failed to read PDF: {0}")]
    Parse(String),
}

/// Text of a whole document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

impl ExtractedText {
    /// First `max_chars` characters, for display
    pub fn preview(&self, max_chars: usize) -> &str {
        utils::truncate_chars(&self.text, max_chars)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// True when no page produced any visible text (e.g. scanned PDFs)
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Per-page text access; `None` means the page yielded no text
pub trait PageSource {
    fn page_texts(&self) -> Result<Vec<Option<String>>, ExtractError>;
}

/// Pages of an in-memory PDF, read with pdf-extract
pub struct PdfPages<'a> {
    bytes: &'a [u8],
}

impl<'a> PdfPages<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::Empty);
        }
        let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
        if !window.windows(5).any(|w| w == b"%PDF-") {
            return Err(ExtractError::NotPdf);
        }
        Ok(Self { bytes })
    }
}

impl PageSource for PdfPages<'_> {
    fn page_texts(&self) -> Result<Vec<Option<String>>, ExtractError> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(self.bytes)
            .map_err(|e| ExtractError::Parse(e.to_string()))?;
        Ok(pages
            .into_iter()
            .map(|text| if text.is_empty() { None } else { Some(text) })
            .collect())
    }
}

/// Concatenate the pages of any source in order
pub fn extract_from_source(source: &dyn PageSource) -> Result<ExtractedText, ExtractError> {
    let pages = source.page_texts()?;
    let page_count = pages.len();
    let text: String = pages.into_iter().map(Option::unwrap_or_default).collect();
    Ok(ExtractedText { text, page_count })
}

/// Extract the full text of a PDF held in memory
pub fn extract_text(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let pages = PdfPages::new(bytes)?;
    let extracted = extract_from_source(&pages)?;
    tracing::info!(
        pages = extracted.page_count,
        chars = extracted.char_len(),
        "extracted PDF text"
    );
    if extracted.is_blank() {
        tracing::warn!("PDF has no extractable text (scanned or image-only?)");
    }
    Ok(extracted)
}
