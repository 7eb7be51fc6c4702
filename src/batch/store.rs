use crate::artifact::{write_atomic, ArtifactPaths};
use crate::Result;
use sha2::{Digest, Sha256};

/// Content-addressed location of a page body, relative to the domain directory
///
/// The address is the SHA-256 of the URL, fanned out by its first byte:
/// `pages/<aa>/<sha256>.<ext>` where the extension follows the content type.
pub fn page_location(url: &str, content_type: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let extension = if content_type.to_ascii_lowercase().contains("json") {
        "json"
    } else {
        "html"
    };
    format!("pages/{}/{}.{}", &digest[..2], digest, extension)
}

/// Writes a page body to its content-addressed location
///
/// Returns the relative location recorded in the fetch metadata.
pub fn store_page(paths: &ArtifactPaths, url: &str, content_type: &str, body: &str) -> Result<String> {
    let location = page_location(url, content_type);
    write_atomic(&paths.resolve(&location), body.as_bytes())?;
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_location_is_stable_and_fanned_out() {
        let a = page_location("https://shop.example/product/a", "text/html");
        let b = page_location("https://shop.example/product/a", "text/html; charset=utf-8");
        assert_eq!(a, b);
        assert!(a.starts_with("pages/"));
        assert!(a.ends_with(".html"));
        let digest = a.trim_start_matches("pages/");
        assert_eq!(&digest[..2], &digest[3..5]);

        let json = page_location("https://shop.example/api/1", "application/json");
        assert!(json.ends_with(".json"));
    }

    #[test]
    fn test_store_page_writes_body() {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "shop.example");
        let location = store_page(&paths, "https://shop.example/p", "text/html", "<h1>x</h1>").unwrap();
        assert_eq!(std::fs::read_to_string(paths.resolve(&location)).unwrap(), "<h1>x</h1>");
    }
}
