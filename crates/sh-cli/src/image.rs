//! Profile image encoding

use std::path::Path;

use anyhow::Context as _;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Read an image file into a `data:` URL
pub fn data_url(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(encode(&bytes, content_type(path)))
}

fn encode(bytes: &[u8], content_type: &str) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_data_url_from_file() {
        let mut file = tempfile::Builder::new().suffix(".PNG").tempfile().unwrap();
        file.write_all(b"\x89PNG").unwrap();

        let url = data_url(file.path()).unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(content_type(Path::new("headshot.tiff")), "application/octet-stream");
        assert_eq!(encode(b"", "image/gif"), "data:image/gif;base64,");
    }

    #[test]
    fn test_missing_file() {
        let err = data_url(Path::new("/nonexistent/headshot.jpg")).unwrap_err();
        assert!(err.to_string().contains("Failed to read image"));
    }
}
