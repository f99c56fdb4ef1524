//! Image upload providers: a hosted CDN endpoint or an embedded data URL.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Turns raw image bytes into a durable reference stored on the article.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    fn name(&self) -> &'static str;

    async fn upload(&self, bytes: &[u8], filename_hint: &str) -> Result<String>;
}

fn check_size(bytes: &[u8], max_bytes: usize) -> Result<()> {
    if bytes.is_empty() {
        return Err(Error::Upload("image is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(Error::Upload(format!(
            "image is {} bytes, limit is {}",
            bytes.len(),
            max_bytes
        )));
    }
    Ok(())
}

/// Sniffs the mime type from magic bytes, then from the file extension.
pub fn detect_mime(bytes: &[u8], filename_hint: &str) -> &'static str {
    const SIGNATURES: [(&[u8], &str); 5] = [
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
    ];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| bytes.starts_with(sig)) {
        return *mime;
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }

    let extension = Path::new(filename_hint)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Local fallback that stores the image inline as a `data:` URL.
#[derive(Debug, Clone)]
pub struct EmbeddedImageUploader {
    max_bytes: usize,
}

impl Default for EmbeddedImageUploader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl EmbeddedImageUploader {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl ImageUploader for EmbeddedImageUploader {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn upload(&self, bytes: &[u8], filename_hint: &str) -> Result<String> {
        check_size(bytes, self.max_bytes)?;
        let mime = detect_mime(bytes, filename_hint);
        debug!("Embedding {} ({} bytes, {})", filename_hint, bytes.len(), mime);
        Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
    }
}

#[derive(Debug, Deserialize)]
struct HostedUploadResponse {
    secure_url: Option<String>,
    #[serde(default)]
    error: Option<HostedUploadError>,
}

#[derive(Debug, Deserialize)]
struct HostedUploadError {
    message: String,
}

/// Hosted image CDN accepting unsigned multipart uploads with a preset.
#[derive(Debug, Clone)]
pub struct HostedImageUploader {
    client: Client,
    endpoint: String,
    upload_preset: String,
    folder: String,
    max_bytes: usize,
}

impl HostedImageUploader {
    pub fn new(cloud_name: &str, upload_preset: impl Into<String>) -> Result<Self> {
        let endpoint = format!("https://api.cloudinary.com/v1_1/{}/image/upload", cloud_name);
        Self::with_endpoint(endpoint, upload_preset)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, upload_preset: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint).map_err(|_| Error::InvalidUrl(endpoint.clone()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Upload(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            upload_preset: upload_preset.into(),
            folder: "news".to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
        })
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageUploader for HostedImageUploader {
    fn name(&self) -> &'static str {
        "hosted"
    }

    async fn upload(&self, bytes: &[u8], filename_hint: &str) -> Result<String> {
        check_size(bytes, self.max_bytes)?;

        let public_id = format!("{}/{}", self.folder, uuid::Uuid::new_v4());
        let part = Part::bytes(bytes.to_vec())
            .file_name(filename_hint.to_string())
            .mime_str(detect_mime(bytes, filename_hint))
            .map_err(|e| Error::Upload(format!("Invalid image mime type: {}", e)))?;

        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone())
            .text("public_id", public_id.clone());

        debug!("Uploading {} ({} bytes) as {}", filename_hint, bytes.len(), public_id);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upload(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        let body: HostedUploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Upload(format!("HTTP {}: unreadable upload response: {}", status.as_u16(), e)))?;

        if !status.is_success() {
            let reason = body
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
            return Err(Error::Upload(format!("HTTP {}: {}", status.as_u16(), reason)));
        }

        let url = body
            .secure_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Upload("response did not include secure_url".to_string()))?;

        info!("Uploaded image {} -> {}", filename_hint, url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(PNG, "whatever.bin"), "image/png");
        assert_eq!(detect_mime(b"\xFF\xD8\xFF\xE0", "x"), "image/jpeg");
        assert_eq!(detect_mime(b"????", "photo.JPG"), "image/jpeg");
        assert_eq!(detect_mime(b"????", "notes"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_embedded_upload_returns_data_url() {
        let uploader = EmbeddedImageUploader::default();
        let url = uploader.upload(PNG, "cover.png").await.unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        let payload = url.trim_start_matches("data:image/png;base64,");
        assert_eq!(STANDARD.decode(payload).unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_embedded_upload_limits() {
        let uploader = EmbeddedImageUploader::new(4);
        assert!(matches!(uploader.upload(b"", "a.png").await, Err(Error::Upload(_))));
        assert!(matches!(uploader.upload(PNG, "a.png").await, Err(Error::Upload(_))));
    }

    #[tokio::test]
    async fn test_hosted_upload_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/image/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secure_url": "https://cdn.example/news/abc.png"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = HostedImageUploader::with_endpoint(
            format!("{}/image/upload", server.uri()),
            "unsigned_upload",
        )
        .unwrap();
        let url = uploader.upload(PNG, "cover.png").await.unwrap();
        assert_eq!(url, "https://cdn.example/news/abc.png");
    }

    #[tokio::test]
    async fn test_hosted_upload_without_secure_url_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "public_id": "x" })))
            .mount(&server)
            .await;

        let uploader = HostedImageUploader::with_endpoint(server.uri(), "unsigned_upload").unwrap();
        assert!(matches!(uploader.upload(PNG, "a.png").await, Err(Error::Upload(_))));
    }

    #[tokio::test]
    async fn test_hosted_upload_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Upload preset not found" }
            })))
            .mount(&server)
            .await;

        let uploader = HostedImageUploader::with_endpoint(server.uri(), "missing").unwrap();
        let err = uploader.upload(PNG, "a.png").await.unwrap_err();
        assert!(err.to_string().contains("Upload preset not found"));
    }
}
