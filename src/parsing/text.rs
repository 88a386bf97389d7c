//! Text-only fallback for files with no language extractor.
//!
//! Such files still get trigram postings (built from raw content by the
//! indexer); there are no symbols, references or classified ranges.

use super::{Capabilities, Extractor};
use crate::types::{ExtractionResult, FileId};

pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for TextExtractor {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn extract(&self, _file_id: FileId, _content: &str) -> ExtractionResult {
        ExtractionResult::default()
    }
}
