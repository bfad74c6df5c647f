use mime_guess::{from_path, get_mime_extensions_str};
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::authenticate;
use crate::config::*;
use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{new_id, respond};
use crate::models::views::UploadView;

/// Raster formats only; SVG can carry script.
const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

fn upload_name(path: &str) -> Option<&str> {
    path.strip_prefix(UPLOADS_PREFIX)
        .filter(|name| !name.is_empty() && !name.contains('/') && !name.contains(".."))
}

/// Stores image bytes under a fresh UUID-based name and returns its path.
pub fn store_upload<S: DocumentStore>(
    store: &S,
    content_type: &str,
    bytes: &[u8],
) -> Result<UploadView, ApiError> {
    let content_type = content_type.split(';').next().unwrap_or("").trim().to_lowercase();
    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::validation("Only PNG, JPEG, GIF or WebP images are allowed"));
    }
    if bytes.is_empty() {
        return Err(ApiError::validation("Image body is empty"));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::validation("Image exceeds 5 MiB"));
    }

    let extension = get_mime_extensions_str(&content_type)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or("bin");
    let name = format!("{}.{}", new_id(), extension);

    store.set(&upload_key(&name), bytes)?;
    info!(name = %name, size = bytes.len(), "stored upload");

    Ok(UploadView {
        path: format!("{}{}", UPLOADS_PREFIX, name),
    })
}

/// Checks that a record is about to reference an upload that really exists.
pub fn ensure_upload_exists<S: DocumentStore>(store: &S, path: &str) -> Result<(), ApiError> {
    let Some(name) = upload_name(path) else {
        return Err(ApiError::validation("Image must be an uploaded file path"));
    };
    if !store.exists(&upload_key(name))? {
        return Err(ApiError::validation("Image upload not found"));
    }
    Ok(())
}

// === HTTP Handlers ===

pub fn upload_image<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|_| {
        let content_type = req
            .header("Content-Type")
            .and_then(|h| h.as_str())
            .unwrap_or_default();
        store_upload(store, content_type, req.body())
    });
    respond(201, result)
}

pub fn serve_upload<S: DocumentStore>(store: &S, path: &str) -> anyhow::Result<Response> {
    let bytes = match upload_name(path) {
        Some(name) => store.get(&upload_key(name))?,
        None => None,
    };

    let Some(bytes) = bytes else {
        return Ok(ApiError::not_found("File not found").into());
    };

    let mime = from_path(path).first_or_octet_stream();
    let content_type = if ALLOWED_IMAGE_TYPES.contains(&mime.essence_str()) {
        mime.essence_str()
    } else {
        "application/octet-stream"
    };

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", content_type)
        .header("X-Content-Type-Options", "nosniff")
        .header("Access-Control-Allow-Origin", "*")
        .body(bytes)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryStore;

    #[test]
    fn stores_images_under_generated_names() {
        let store = MemoryStore::new();
        let a = store_upload(&store, "image/png", b"\x89PNG....").unwrap();
        let b = store_upload(&store, "image/png", b"\x89PNG....").unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.path.starts_with("/uploads/"));
        assert!(a.path.ends_with(".png"));
        ensure_upload_exists(&store, &a.path).unwrap();
    }

    #[test]
    fn rejects_non_images_and_empty_bodies() {
        let store = MemoryStore::new();
        assert!(matches!(store_upload(&store, "text/plain", b"hi"), Err(ApiError::Validation(_))));
        assert!(matches!(store_upload(&store, "image/jpeg", b""), Err(ApiError::Validation(_))));
    }

    #[test]
    fn rejects_scriptable_image_types() {
        let store = MemoryStore::new();
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(1)</script></svg>"#;
        assert!(matches!(store_upload(&store, "image/svg+xml", svg), Err(ApiError::Validation(_))));
        assert!(matches!(store_upload(&store, "image/x-icon", b"ico"), Err(ApiError::Validation(_))));

        let jpeg = store_upload(&store, "image/jpeg; charset=binary", b"\xff\xd8").unwrap();
        assert!(!jpeg.path.ends_with(".bin"));
        let webp = store_upload(&store, "image/webp", b"RIFF").unwrap();
        assert!(webp.path.ends_with(".webp"));
    }

    #[test]
    fn served_uploads_are_not_sniffed() {
        let store = MemoryStore::new();
        let view = store_upload(&store, "image/png", b"\x89PNG").unwrap();
        let resp = serve_upload(&store, &view.path).unwrap();
        assert_eq!(resp.header("content-type").and_then(|v| v.as_str()), Some("image/png"));
        assert_eq!(resp.header("x-content-type-options").and_then(|v| v.as_str()), Some("nosniff"));

        // bytes planted under a scriptable extension are never served as such
        store.set(&upload_key("planted.svg"), b"<svg/>").unwrap();
        let resp = serve_upload(&store, "/uploads/planted.svg").unwrap();
        assert_eq!(
            resp.header("content-type").and_then(|v| v.as_str()),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn upload_paths_cannot_escape() {
        let store = MemoryStore::new();
        assert!(ensure_upload_exists(&store, "/uploads/../token:abc").is_err());
        assert!(ensure_upload_exists(&store, "/etc/passwd").is_err());
    }

    #[test]
    fn serves_stored_bytes() {
        let store = MemoryStore::new();
        let view = store_upload(&store, "image/gif", b"GIF89a").unwrap();
        let resp = serve_upload(&store, &view.path).unwrap();
        assert_eq!(*resp.status(), 200);
        assert_eq!(resp.body(), b"GIF89a");

        let missing = serve_upload(&store, "/uploads/nope.gif").unwrap();
        assert_eq!(*missing.status(), 404);
    }
}
