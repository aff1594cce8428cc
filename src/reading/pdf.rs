//! PDF text extraction

use super::html::compact_ws;
use super::ExtractError;

/// Extract per-page text, whitespace collapsed, pages separated by a blank line.
pub(crate) fn text(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed documents
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked".to_string()))?
        .map_err(|e| ExtractError::Pdf(format!("{e:?}")))?;

    let pages: Vec<String> = pages
        .iter()
        .map(|page| compact_ws(page))
        .filter(|page| !page.is_empty())
        .collect();

    Ok(pages.join("\n\n"))
}
