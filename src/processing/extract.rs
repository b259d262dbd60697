use lopdf::Document;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
    #[error("Failed to read PDF: {0}")]
    Pdf(String),
    #[error("No text could be extracted from file")]
    Empty,
}

/// Uses the declared mime type unless it is missing or generic, in which
/// case the file extension decides.
pub fn resolve_mime(declared: Option<&str>, file_name: &str) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => mime.to_string(),
        _ => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

pub fn extract_text(data: &[u8], mime_type: &str) -> Result<String, ExtractError> {
    let text = match mime_type {
        "application/pdf" => extract_pdf_text(data)?,
        m if m.starts_with("text/") => String::from_utf8_lossy(data).into_owned(),
        other => return Err(ExtractError::Unsupported(other.to_string())),
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

fn extract_pdf_text(data: &[u8]) -> Result<String, ExtractError> {
    let doc = Document::load_mem(data).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut text = String::new();
    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => tracing::warn!("Skipping unreadable PDF page {}: {}", page_num, e),
        }
    }

    Ok(text)
}
