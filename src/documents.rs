use crate::models::{Document, DocumentPurpose, ProviderError, ProviderId};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-file ceiling enforced before any bytes leave the process. Matches
/// the smallest limit among the configured providers.
pub const MAX_DOCUMENT_BYTES: usize = 8 * 1024 * 1024;

/// Resolves an opaque `file_reference` into bytes.
///
/// File storage belongs to an external collaborator; this trait is the
/// only way the orchestration layer touches document content.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, file_reference: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Fetches document bytes over HTTP from pre-signed storage URLs.
pub struct HttpDocumentSource {
    client: reqwest::Client,
}

impl HttpDocumentSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, file_reference: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(file_reference)
            .send()
            .await
            .map_err(|e| ProviderError::Document(format!("document fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Document(format!(
                "document fetch returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Document(format!("document read failed: {}", e)))?;

        Ok(bytes.to_vec())
    }
}

/// In-memory document source for tests and local tooling.
#[derive(Default)]
pub struct StaticDocumentSource {
    files: HashMap<String, Vec<u8>>,
}

impl StaticDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, reference: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.insert(reference.into(), bytes);
        self
    }
}

#[async_trait]
impl DocumentSource for StaticDocumentSource {
    async fn fetch(&self, file_reference: &str) -> Result<Vec<u8>, ProviderError> {
        self.files
            .get(file_reference)
            .cloned()
            .ok_or_else(|| {
                ProviderError::Document(format!("no document stored for '{}'", file_reference))
            })
    }
}

// ============ Pre-transmission checks ============

/// Sniff the content type from the file's magic bytes. Providers accept
/// JPEG/PNG images and PDFs; anything else is rejected before transmission.
pub fn detect_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png")
    } else if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else {
        None
    }
}

/// Validate one file's size and format. Returns the sniffed content type.
pub fn check_document_bytes(
    reference: &str,
    bytes: &[u8],
) -> Result<&'static str, ProviderError> {
    if bytes.is_empty() {
        return Err(ProviderError::Document(format!(
            "document '{}' is empty",
            reference
        )));
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ProviderError::Document(format!(
            "document '{}' is {} bytes, over the {} byte ceiling",
            reference,
            bytes.len(),
            MAX_DOCUMENT_BYTES
        )));
    }
    detect_content_type(bytes).ok_or_else(|| {
        ProviderError::Document(format!(
            "document '{}' is not a recognized JPEG/PNG/PDF",
            reference
        ))
    })
}

/// A document validated and encoded for a JSON upload body.
#[derive(Debug, Clone)]
pub struct EncodedDocument {
    pub file_name: String,
    pub content_type: &'static str,
    /// Base64 of the raw bytes, per the identity-graph provider contract.
    pub content: String,
    pub purpose: DocumentPurpose,
}

/// Upload seam implemented by adapters whose providers take documents in a
/// second call after identity creation.
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    async fn upload_documents(
        &self,
        identity_reference: &str,
        documents: Vec<EncodedDocument>,
    ) -> Result<(), ProviderError>;
}

// ============ Upload task ============

/// Dependent follow-up work: runs only after a prerequisite submission
/// yielded a provider-side identity handle.
pub struct DocumentUploadTask {
    pub provider: ProviderId,
    pub identity_reference: String,
    pub documents: Vec<Document>,
    pub source: Arc<dyn DocumentSource>,
}

impl DocumentUploadTask {
    /// Fetch, check, encode, and transmit the documents. Fails closed: a
    /// document that is missing, oversized, or malformed is skipped with a
    /// structured warning instead of being sent partial, and the upload call
    /// is skipped entirely when nothing usable remains.
    pub async fn run(&self, uploader: &dyn DocumentUploader) -> Result<usize, ProviderError> {
        let mut encoded = Vec::new();

        for (index, document) in self.documents.iter().enumerate() {
            let purpose = document
                .purposes
                .iter()
                .next()
                .copied()
                .unwrap_or(DocumentPurpose::Other);

            let bytes = match self.source.fetch(&document.file_reference).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(
                        provider = %self.provider,
                        identity = %self.identity_reference,
                        file_reference = %document.file_reference,
                        "Skipping document: {}",
                        e
                    );
                    continue;
                }
            };

            let content_type = match check_document_bytes(&document.file_reference, &bytes) {
                Ok(content_type) => content_type,
                Err(e) => {
                    tracing::warn!(
                        provider = %self.provider,
                        identity = %self.identity_reference,
                        file_reference = %document.file_reference,
                        "Skipping document: {}",
                        e
                    );
                    continue;
                }
            };

            encoded.push(EncodedDocument {
                file_name: format!("document-{}.{}", index + 1, extension_for(content_type)),
                content_type,
                content: BASE64.encode(&bytes),
                purpose,
            });
        }

        if encoded.is_empty() {
            tracing::warn!(
                provider = %self.provider,
                identity = %self.identity_reference,
                "No usable documents; skipping upload call"
            );
            return Ok(0);
        }

        let count = encoded.len();
        uploader
            .upload_documents(&self.identity_reference, encoded)
            .await?;

        tracing::info!(
            provider = %self.provider,
            identity = %self.identity_reference,
            count,
            "Uploaded documents"
        );
        Ok(count)
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        _ => "pdf",
    }
}
