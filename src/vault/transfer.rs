//! Upload and download flows.

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::FileVault;
use crate::access::validate_password_strength;
use crate::fs::{trim_name, FileRecord, NewFileRecord};
use crate::store::BlobReader;
use crate::{Result, VaultError};

/// Content type served for ciphertext downloaded without a passphrase.
const RAW_CONTENT_TYPE: &str = "application/octet-stream";

/// A file upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Client-side file name.
    pub name: String,
    /// File content.
    pub bytes: Vec<u8>,
    /// Declared MIME type; guessed from the name when absent.
    pub content_type: Option<String>,
    /// Target directory; the owner's root when absent.
    pub directory_id: Option<i64>,
    /// Encrypt the content under this passphrase.
    pub passphrase: Option<String>,
    /// Client asked for a streamed upload.
    pub stream: bool,
}

impl UploadRequest {
    /// Upload `bytes` as `name` into the owner's root.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    /// Upload into `directory_id`.
    pub fn in_directory(mut self, directory_id: i64) -> Self {
        self.directory_id = Some(directory_id);
        self
    }

    /// Declare the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Encrypt under `passphrase`.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Mark the upload as streamed.
    pub fn streamed(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Result of an upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    /// The stored file record.
    pub file: FileRecord,
    /// Whether the name had to be trimmed.
    pub trimmed: bool,
}

/// Options for a download.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    /// Passphrase for encrypted files.
    pub passphrase: Option<String>,
    /// Stream instead of buffering. Not available for encrypted files.
    pub stream: bool,
    /// Ephemeral link key (public downloads).
    pub key: Option<String>,
    /// Share password (public downloads).
    pub password: Option<String>,
}

impl DownloadRequest {
    /// Buffered download with no credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decrypt with `passphrase`.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Present a link key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Present a share password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Stream the content.
    pub fn streamed(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Downloaded content.
pub enum DownloadBody {
    /// Whole content in memory.
    Buffered(Vec<u8>),
    /// Reader over the stored blob.
    Stream(BlobReader),
}

impl std::fmt::Debug for DownloadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadBody::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            DownloadBody::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// A download ready to be sent.
#[derive(Debug)]
pub struct Download {
    /// The downloaded file.
    pub file: FileRecord,
    /// Content type to serve.
    pub content_type: String,
    /// The content.
    pub body: DownloadBody,
}

impl Download {
    /// Copy the content to `out` through a buffer of `buffer_size` bytes.
    ///
    /// Returns the number of bytes written.
    pub async fn write_to<W>(self, out: &mut W, buffer_size: usize) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let written = match self.body {
            DownloadBody::Buffered(bytes) => {
                out.write_all(&bytes).await?;
                bytes.len() as u64
            }
            DownloadBody::Stream(mut reader) => {
                let mut buf = vec![0u8; buffer_size.max(1)];
                let mut total = 0u64;
                loop {
                    let n = reader.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    out.write_all(&buf[..n]).await?;
                    total += n as u64;
                }
                total
            }
        };
        out.flush().await?;
        Ok(written)
    }

    /// Collect the content into memory.
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        match self.body {
            DownloadBody::Buffered(bytes) => Ok(bytes),
            DownloadBody::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes).await?;
                Ok(bytes)
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl FileVault {
    /// Store a file for `owner`.
    ///
    /// With a passphrase the content is sealed before it reaches the blob
    /// store. The recorded size is always the plaintext size.
    pub async fn upload(&self, owner: i64, request: UploadRequest) -> Result<UploadedFile> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("file name is required".to_string()));
        }

        let passphrase = non_empty(request.passphrase.as_deref());
        if let Some(passphrase) = passphrase {
            validate_password_strength(passphrase).map_err(|e| {
                VaultError::Validation(format!("invalid passphrase format: {e}"))
            })?;
        }

        let directory = self.tree().resolve(owner, request.directory_id).await?;

        let size = request.bytes.len() as i64;
        if passphrase.is_some() {
            if request.stream {
                return Err(VaultError::Validation(
                    "stream mode is not supported for encrypted uploads".to_string(),
                ));
            }
            if size > self.config.files.max_encrypted_size_bytes {
                return Err(VaultError::Validation(
                    "file size exceeds the limit for encrypted uploads".to_string(),
                ));
            }
        }

        let (name, trimmed) = trim_name(name, self.config.files.max_name_length);
        self.usage().check_quota(owner, size).await?;

        let content_type = match non_empty(request.content_type.as_deref()) {
            Some(content_type) => content_type.to_string(),
            None => mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        let (hash, encryption) = match passphrase {
            Some(passphrase) => {
                let payload = self.pipeline().encrypt_for_upload(&request.bytes, passphrase)?;
                let hash = self.services.blobs.put(&name, &payload.ciphertext).await?;
                (hash, Some((payload.salt, payload.nonce)))
            }
            None => (self.services.blobs.put(&name, &request.bytes).await?, None),
        };

        let mut record = NewFileRecord::new(owner, directory.id, &name, hash, size)
            .with_content_type(content_type)
            .with_access(self.config.files.default_access_mode()?);
        if let Some((salt, nonce)) = encryption {
            record = record.with_encryption(salt, nonce);
        }

        let file = self.files().create_file(&record).await?;
        self.settle(directory.id, owner).await?;

        info!(
            owner,
            file_id = file.id,
            directory_id = directory.id,
            size,
            encrypted = file.is_encrypted,
            "Uploaded file"
        );
        Ok(UploadedFile { file, trimmed })
    }

    /// Download a file as an authenticated user.
    ///
    /// Callers without access get NotFound, as if the file did not exist.
    pub async fn download_owned(
        &self,
        requester: i64,
        file_id: i64,
        request: &DownloadRequest,
    ) -> Result<Download> {
        let file = self.files().read_file(file_id).await?;
        if !self.access().validate_file_access(&file, requester).await? {
            return Err(VaultError::NotFound("file".to_string()));
        }
        self.deliver(file, request).await
    }

    /// Download a file without authentication, by mode, password or link key.
    pub async fn download_public(
        &self,
        file_id: i64,
        request: &DownloadRequest,
    ) -> Result<Download> {
        let file = self.files().read_file(file_id).await?;
        self.access()
            .authorize_public_download(
                &file,
                non_empty(request.key.as_deref()),
                request.password.as_deref(),
            )
            .await?;
        self.deliver(file, request).await
    }

    async fn deliver(&self, file: FileRecord, request: &DownloadRequest) -> Result<Download> {
        if request.stream {
            if file.is_encrypted {
                return Err(VaultError::Validation(
                    "stream mode is not supported for encrypted downloads".to_string(),
                ));
            }
            let reader = self.services.blobs.open(&file.hash).await?;
            debug!(file_id = file.id, "Streaming download");
            return Ok(Download {
                content_type: file.content_type.clone(),
                file,
                body: DownloadBody::Stream(reader),
            });
        }

        let stored = self.services.blobs.get(&file.hash).await?;
        if !file.is_encrypted {
            return Ok(Download {
                content_type: file.content_type.clone(),
                file,
                body: DownloadBody::Buffered(stored),
            });
        }

        let Some(passphrase) = non_empty(request.passphrase.as_deref()) else {
            debug!(file_id = file.id, "Serving raw ciphertext");
            return Ok(Download {
                content_type: RAW_CONTENT_TYPE.to_string(),
                file,
                body: DownloadBody::Buffered(stored),
            });
        };

        let (Some(salt), Some(nonce)) = (file.salt.as_deref(), file.nonce.as_deref()) else {
            return Err(VaultError::Upstream(format!(
                "encrypted file {} has no key material",
                file.id
            )));
        };
        let plaintext = self
            .pipeline()
            .decrypt_for_download(&stored, salt, nonce, passphrase)?;

        Ok(Download {
            content_type: file.content_type.clone(),
            file,
            body: DownloadBody::Buffered(plaintext),
        })
    }
}
