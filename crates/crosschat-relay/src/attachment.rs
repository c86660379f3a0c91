//! Attachment intake and per-destination re-packaging.
//!
//! Platform send primitives consume their file payload. The forwarder reads
//! each inbound attachment exactly once into an immutable buffer and then
//! stamps out a fresh [`SendableAttachment`] for every send attempt.

use crate::error::RelayError;
use crate::Result;
use bytes::Bytes;
use crosschat_core::config::AttachmentsConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Source of attachment data.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// Bytes in memory.
    Bytes(Bytes),

    /// Local file path.
    Path(PathBuf),

    /// URL to download from.
    Url(String),
}

/// An attachment as it arrives with an inbound message.
#[derive(Debug, Clone)]
pub struct InboundAttachment {
    /// File name.
    pub filename: String,

    /// MIME type.
    pub content_type: String,

    /// Content source.
    pub source: AttachmentSource,
}

impl InboundAttachment {
    /// Create an attachment from bytes.
    pub fn from_bytes(
        bytes: impl Into<Bytes>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            source: AttachmentSource::Bytes(bytes.into()),
        }
    }

    /// Create an attachment from a file path, guessing the MIME type.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let content_type = guess_content_type(&filename);

        Self {
            filename,
            content_type,
            source: AttachmentSource::Path(path),
        }
    }

    /// Create an attachment from a URL, guessing the MIME type from the file name.
    pub fn from_url(url: impl Into<String>, filename: impl Into<String>) -> Self {
        let filename: String = filename.into();
        let content_type = guess_content_type(&filename);

        Self {
            filename,
            content_type,
            source: AttachmentSource::Url(url.into()),
        }
    }

    /// Override the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

/// Reusable descriptor of an attachment that has been read once.
///
/// Cloning shares the immutable buffer; it never re-reads the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedAttachment {
    filename: String,
    content_type: String,
    payload: Bytes,
}

impl PreparedAttachment {
    /// File name.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A single-use, send-ready attachment for one destination.
///
/// Not `Clone`: a send consumes it through [`SendableAttachment::into_parts`].
#[derive(Debug)]
pub struct SendableAttachment {
    filename: String,
    content_type: String,
    data: Bytes,
}

impl SendableAttachment {
    /// File name.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Consume the attachment into `(filename, content_type, bytes)`.
    pub fn into_parts(self) -> (String, String, Bytes) {
        (self.filename, self.content_type, self.data)
    }
}

/// Reads attachments once and serves independent copies per destination.
#[derive(Debug, Clone)]
pub struct AttachmentForwarder {
    max_bytes: usize,
    client: reqwest::Client,
}

impl AttachmentForwarder {
    /// Create a forwarder from attachment settings.
    pub fn new(config: &AttachmentsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.download_timeout_ms))
            .build()?;

        Ok(Self {
            max_bytes: config.max_bytes,
            client,
        })
    }

    /// Read an attachment's bytes exactly once.
    pub async fn prepare(&self, attachment: &InboundAttachment) -> Result<PreparedAttachment> {
        let payload = match &attachment.source {
            AttachmentSource::Bytes(bytes) => bytes.clone(),
            AttachmentSource::Path(path) => {
                let data = tokio::fs::read(path).await.map_err(|e| {
                    RelayError::AttachmentUnavailable(format!("{}: {}", path.display(), e))
                })?;
                Bytes::from(data)
            }
            AttachmentSource::Url(url) => {
                debug!(url = %url, "Downloading attachment");
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| RelayError::AttachmentUnavailable(e.to_string()))?;
                response
                    .bytes()
                    .await
                    .map_err(|e| RelayError::AttachmentUnavailable(e.to_string()))?
            }
        };

        if payload.len() > self.max_bytes {
            return Err(RelayError::AttachmentUnavailable(format!(
                "{} is {} bytes (max: {} bytes)",
                attachment.filename,
                payload.len(),
                self.max_bytes
            )));
        }

        Ok(PreparedAttachment {
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
            payload,
        })
    }

    /// Prepare every attachment of a message, failing if any is unreadable.
    pub async fn prepare_all(
        &self,
        attachments: &[InboundAttachment],
    ) -> Result<Vec<PreparedAttachment>> {
        let mut prepared = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            prepared.push(self.prepare(attachment).await?);
        }
        Ok(prepared)
    }

    /// Stamp out a fresh single-use instance for one send.
    pub fn instantiate_for_destination(&self, descriptor: &PreparedAttachment) -> SendableAttachment {
        SendableAttachment {
            filename: descriptor.filename.clone(),
            content_type: descriptor.content_type.clone(),
            data: descriptor.payload.clone(),
        }
    }

    /// Instantiate a whole attachment set for one send.
    pub fn instantiate_all(&self, descriptors: &[PreparedAttachment]) -> Vec<SendableAttachment> {
        descriptors
            .iter()
            .map(|d| self.instantiate_for_destination(d))
            .collect()
    }
}
