use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::{IntegrationResult, ServiceKind};

use crate::params::{parse_provider, Params};
use crate::provider::{requested, Adapters, VendorCall};
use crate::simulated::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    UploadFile,
    DownloadFile,
    ListFiles,
    DeleteFile,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadFile => "uploadFile",
            Self::DownloadFile => "downloadFile",
            Self::ListFiles => "listFiles",
            Self::DeleteFile => "deleteFile",
        }
    }
}

impl FromStr for StorageOperation {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploadFile" => Ok(Self::UploadFile),
            "downloadFile" => Ok(Self::DownloadFile),
            "listFiles" => Ok(Self::ListFiles),
            "deleteFile" => Ok(Self::DeleteFile),
            _ => Err(SwitchyardError::OperationNotFound {
                service: ServiceKind::Storage.to_string(),
                operation: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageProvider {
    Mock,
    Local,
    S3,
    Dropbox,
    GoogleDrive,
}

const PROVIDERS: [(&str, StorageProvider); 5] = [
    ("local", StorageProvider::Local),
    ("s3", StorageProvider::S3),
    ("dropbox", StorageProvider::Dropbox),
    ("google_drive", StorageProvider::GoogleDrive),
    ("google-drive", StorageProvider::GoogleDrive),
];

impl StorageProvider {
    fn name(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Dropbox => "dropbox",
            Self::GoogleDrive => "google_drive",
        }
    }

    fn check_credentials(&self, p: &Params<'_>) -> Result<()> {
        match self {
            Self::S3 => p.require_str("bucket").map(|_| ()),
            Self::Dropbox | Self::GoogleDrive => p.require_str("accessToken").map(|_| ()),
            Self::Local => p.require_str("basePath").map(|_| ()),
            Self::Mock => Ok(()),
        }
    }
}

fn mime_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// File storage: S3, Dropbox, Google Drive, the local filesystem, or simulated.
pub struct StorageService {
    simulator: Simulator,
    adapters: Adapters,
}

impl StorageService {
    pub fn new(simulator: Simulator, adapters: Adapters) -> Self {
        Self {
            simulator,
            adapters,
        }
    }

    pub async fn execute(
        &self,
        operation: StorageOperation,
        params: &Value,
    ) -> Result<IntegrationResult> {
        let p = Params::new(operation.as_str(), params);
        match operation {
            StorageOperation::UploadFile => {
                p.require_str("path")?;
                p.require("content")?;
            }
            StorageOperation::DownloadFile | StorageOperation::DeleteFile => {
                p.require_str("path")?;
            }
            StorageOperation::ListFiles => {}
        }

        let provider = parse_provider(
            "storage",
            p.str("provider").as_deref(),
            &PROVIDERS,
            StorageProvider::Mock,
        )?;
        provider.check_credentials(&p)?;

        match provider {
            StorageProvider::Mock => Ok(self.simulate(operation, &p).await),
            StorageProvider::Local => local(operation, &p).await,
            vendor => {
                let vendor = vendor.name();
                match self
                    .adapters
                    .call(ServiceKind::Storage, vendor, operation.as_str(), params)
                    .await
                {
                    VendorCall::Done(result) => result,
                    VendorCall::Simulate => {
                        Ok(requested(self.simulate(operation, &p).await, vendor))
                    }
                }
            }
        }
    }

    async fn simulate(&self, operation: StorageOperation, p: &Params<'_>) -> IntegrationResult {
        self.simulator.pause().await;
        let path = p.str("path").unwrap_or_default();
        match operation {
            StorageOperation::UploadFile => {
                let content = content_text(p.get("content"));
                IntegrationResult::mock()
                    .with("url", format!("mock://storage/{}", path.trim_start_matches('/')))
                    .with("size", content.len())
                    .with("mimeType", mime_type(&path))
                    .with("uploadedAt", Utc::now().to_rfc3339())
                    .with("path", path)
            }
            StorageOperation::DownloadFile => {
                let content = format!("Simulated content of {}", path);
                IntegrationResult::mock()
                    .with("size", content.len())
                    .with("content", content)
                    .with("mimeType", mime_type(&path))
                    .with("path", path)
            }
            StorageOperation::ListFiles => {
                let files = simulated_listing(&path);
                IntegrationResult::mock()
                    .with("count", files.len())
                    .with("files", files)
                    .with("path", path)
            }
            StorageOperation::DeleteFile => IntegrationResult::mock()
                .with("deleted", true)
                .with("path", path),
        }
    }
}

/// A fixed listing under the requested prefix.
fn simulated_listing(prefix: &str) -> Vec<Value> {
    let prefix = prefix.trim_matches('/');
    [("report.pdf", 24_576), ("data.csv", 2_048), ("image.png", 131_072)]
        .iter()
        .map(|(name, size)| {
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", prefix, name)
            };
            json!({"path": path, "size": size, "mimeType": mime_type(name)})
        })
        .collect()
}

fn content_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Join a relative path under `base`, refusing anything that escapes it.
fn confined(base: &Path, rel: &str, operation: &str) -> Result<PathBuf> {
    let rel = Path::new(rel.trim_start_matches('/'));
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(SwitchyardError::Configuration(format!(
                    "{}: path '{}' escapes the storage root",
                    operation,
                    rel.display()
                )))
            }
        }
    }
    Ok(base.join(rel))
}

fn io_error(path: &Path, e: std::io::Error) -> SwitchyardError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SwitchyardError::NotFound(path.display().to_string())
    } else {
        SwitchyardError::Provider {
            provider: "local".into(),
            message: format!("{}: {}", path.display(), e),
        }
    }
}

/// Local filesystem provider rooted at `basePath`.
async fn local(operation: StorageOperation, p: &Params<'_>) -> Result<IntegrationResult> {
    let op = operation.as_str();
    let base = PathBuf::from(p.require_str("basePath")?);
    let rel = p.str("path").unwrap_or_default();
    let target = confined(&base, &rel, op)?;
    let result = IntegrationResult::success("local").with("path", rel.clone());

    match operation {
        StorageOperation::UploadFile => {
            let content = content_text(p.get("content"));
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
            tokio::fs::write(&target, content.as_bytes())
                .await
                .map_err(|e| io_error(&target, e))?;
            debug!(path = %target.display(), bytes = content.len(), "File written");
            Ok(result
                .with("size", content.len())
                .with("mimeType", mime_type(&rel))
                .with("url", format!("file://{}", target.display()))
                .with("uploadedAt", Utc::now().to_rfc3339()))
        }
        StorageOperation::DownloadFile => {
            let content = tokio::fs::read_to_string(&target)
                .await
                .map_err(|e| io_error(&target, e))?;
            Ok(result
                .with("size", content.len())
                .with("mimeType", mime_type(&rel))
                .with("content", content))
        }
        StorageOperation::ListFiles => {
            let mut entries = tokio::fs::read_dir(&target)
                .await
                .map_err(|e| io_error(&target, e))?;
            let mut files = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error(&target, e))?
            {
                let meta = entry.metadata().await.map_err(|e| io_error(&target, e))?;
                if !meta.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                let path = if rel.trim_matches('/').is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", rel.trim_matches('/'), name)
                };
                files.push(json!({"path": path, "size": meta.len(), "mimeType": mime_type(&name)}));
            }
            files.sort_by(|a, b| a["path"].as_str().cmp(&b["path"].as_str()));
            Ok(result.with("count", files.len()).with("files", files))
        }
        StorageOperation::DeleteFile => {
            tokio::fs::remove_file(&target)
                .await
                .map_err(|e| io_error(&target, e))?;
            Ok(result.with("deleted", true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> StorageService {
        StorageService::new(Simulator::instant(), Adapters::default())
    }

    #[tokio::test]
    async fn test_simulated_upload_infers_mime() {
        let result = service()
            .execute(
                StorageOperation::UploadFile,
                &json!({"path": "reports/q1.pdf", "content": "abc"}),
            )
            .await
            .unwrap();
        assert!(result.is_mock());
        assert_eq!(result.get("mimeType").unwrap(), "application/pdf");
        assert_eq!(result.get("size").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_simulated_listing_is_deterministic() {
        let params = json!({"path": "/exports/"});
        let a = service().execute(StorageOperation::ListFiles, &params).await.unwrap();
        let b = service().execute(StorageOperation::ListFiles, &params).await.unwrap();
        assert_eq!(a.get("files"), b.get("files"));
        assert_eq!(a.get("count").unwrap(), 3);
        assert_eq!(a.get("files").unwrap()[1]["path"], "exports/data.csv");
    }

    #[tokio::test]
    async fn test_upload_requires_content() {
        let err = service()
            .execute(StorageOperation::UploadFile, &json!({"path": "a.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Configuration(ref m) if m.contains("content")));
    }

    #[tokio::test]
    async fn test_s3_requires_bucket() {
        let err = service()
            .execute(
                StorageOperation::DeleteFile,
                &json!({"path": "a.txt", "provider": "s3"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Configuration(ref m) if m.contains("bucket")));
    }

    #[tokio::test]
    async fn test_google_drive_spellings() {
        for provider in ["google_drive", "google-drive", "Google-Drive"] {
            let result = service()
                .execute(
                    StorageOperation::DownloadFile,
                    &json!({"path": "a.txt", "provider": provider, "accessToken": "t"}),
                )
                .await
                .unwrap();
            assert!(result.is_mock());
            assert_eq!(result.get("requestedProvider").unwrap(), "google_drive");
        }
    }

    #[tokio::test]
    async fn test_local_provider_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let svc = service();

        svc.execute(
            StorageOperation::UploadFile,
            &json!({"provider": "local", "basePath": base, "path": "out/hello.txt", "content": "hi"}),
        )
        .await
        .unwrap();

        let listed = svc
            .execute(
                StorageOperation::ListFiles,
                &json!({"provider": "local", "basePath": base, "path": "out"}),
            )
            .await
            .unwrap();
        assert_eq!(listed.get("count").unwrap(), 1);
        assert_eq!(listed.get("files").unwrap()[0]["path"], "out/hello.txt");

        let read = svc
            .execute(
                StorageOperation::DownloadFile,
                &json!({"provider": "local", "basePath": base, "path": "out/hello.txt"}),
            )
            .await
            .unwrap();
        assert_eq!(read.provider, "local");
        assert_eq!(read.get("content").unwrap(), "hi");

        svc.execute(
            StorageOperation::DeleteFile,
            &json!({"provider": "local", "basePath": base, "path": "out/hello.txt"}),
        )
        .await
        .unwrap();
        let err = svc
            .execute(
                StorageOperation::DownloadFile,
                &json!({"provider": "local", "basePath": base, "path": "out/hello.txt"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_local_rejects_parent_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = service()
            .execute(
                StorageOperation::DownloadFile,
                &json!({"provider": "local", "basePath": dir.path(), "path": "../etc/passwd"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Configuration(_)));
    }
}
