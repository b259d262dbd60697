use anyhow::{Result, bail};
use bytes::Bytes;

pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const PDF_MIME: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Only PDFs are accepted: the declared type or the extension must say PDF
/// and the content must start with the PDF header.
pub fn validate_file(file_name: &str, content_type: Option<&str>, file_data: &Bytes) -> Result<()> {
    if file_data.is_empty() {
        bail!("File is empty");
    }

    if file_data.len() > MAX_FILE_SIZE {
        bail!("File size exceeds maximum allowed size of 10MB");
    }

    let declared_pdf = content_type.is_some_and(|c| c == PDF_MIME);
    let extension_pdf = file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("pdf"));
    if !(declared_pdf || extension_pdf) || !file_data.starts_with(PDF_MAGIC) {
        bail!("Only PDF files are allowed");
    }

    Ok(())
}

/// Name used on disk: `files-<millis>-<random>.pdf`.
pub fn stored_file_name() -> String {
    format!(
        "files-{}-{}.pdf",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Splits a comma separated tag field, dropping blanks.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
