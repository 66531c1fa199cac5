//! Local filesystem storage adapter.

use async_trait::async_trait;
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use omnistore_common::{object_rel, BatchFailures, Error, Result};

use crate::adapter::{mod_time_or_epoch, Adapter, ByteStream, File, UploadOptions};
use crate::config;
use crate::context::Context;

/// Characters escaped in the path of a public URL.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Local adapter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    /// Root directory objects are stored under.
    pub path: String,
    /// Public domain the root directory is served from.
    pub domain: String,
}

/// Local filesystem storage adapter.
///
/// Object keys map to files below the root directory. Upload headers are
/// not persisted and signed URLs are plain public URLs.
pub struct LocalAdapter {
    root: PathBuf,
    domain: String,
}

impl LocalAdapter {
    /// Create a new local adapter.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    /// - On unix, root permissions are set to 0o776
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>, domain: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o776))?;
        }

        info!(root = %root.display(), "Local adapter ready");
        Ok(Self {
            root,
            domain: config::trim_domain(domain),
        })
    }

    /// Construct from opaque configuration.
    pub fn from_value(value: Value) -> Result<Self> {
        let cfg: LocalConfig = config::decode("local", value)?;
        config::require("local", "path", &cfg.path)?;
        config::require("local", "domain", &cfg.domain)?;
        Self::new(&cfg.path, &cfg.domain)
    }

    /// Convert an object key to a filesystem path below the root.
    fn to_fs_path(&self, object: &str) -> Result<PathBuf> {
        let key = object_rel(object);
        let relative = Path::new(&key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::InvalidInput(format!(
                "Object key escapes storage root: {}",
                object
            )));
        }
        Ok(self.root.join(relative))
    }

    fn create_file(&self, key: String, fs_meta: &std::fs::Metadata) -> File {
        File {
            mod_time: mod_time_or_epoch(fs_meta.modified().ok()),
            name: key,
            size: fs_meta.len(),
            is_dir: fs_meta.is_dir(),
            header: HashMap::new(),
        }
    }

    /// Walk the root and collect files whose key starts with `prefix`.
    async fn walk(&self, prefix: &str) -> Result<Vec<File>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let key = match entry_path.strip_prefix(&self.root) {
                    Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                    Err(_) => continue,
                };
                let fs_meta = entry.metadata().await?;

                if fs_meta.is_dir() {
                    // Only descend where a match is still possible.
                    let dir_key = format!("{}/", key);
                    if dir_key.starts_with(prefix) || prefix.starts_with(&dir_key) {
                        pending.push(entry_path);
                    }
                } else if key.starts_with(prefix) {
                    files.push(self.create_file(key, &fs_meta));
                }
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn write_file(&self, target: &Path, mut body: ByteStream) -> Result<u64> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = target.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, Error>(written)
        }
        .await;

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(e);
            }
        };

        fs::rename(&tmp, target).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(target, std::fs::Permissions::from_mode(0o666)).await?;
        }
        Ok(written)
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn name(&self) -> &str {
        "local"
    }

    async fn delete(&self, ctx: &Context, objects: &[String]) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        ctx.run(async {
            let mut failures = BatchFailures::new();
            for object in objects {
                let fs_path = match self.to_fs_path(object) {
                    Ok(p) => p,
                    Err(e) => {
                        failures.push(object.as_str(), e);
                        continue;
                    }
                };
                debug!(object = %object, "Deleting file");
                match fs::remove_file(&fs_path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => failures.push(object.as_str(), e),
                }
            }
            if !failures.is_empty() {
                warn!(failed = failures.len(), total = objects.len(), "Batch delete incomplete");
            }
            failures.into_result()
        })
        .await
    }

    async fn sign_url(&self, ctx: &Context, object: &str, _expire: Option<i64>) -> Result<String> {
        ctx.check()?;
        let key = object_rel(object);
        Ok(format!(
            "{}/{}",
            self.domain,
            utf8_percent_encode(&key, PATH_SEGMENT)
        ))
    }

    async fn lists(&self, ctx: &Context, prefix: &str) -> Result<Vec<File>> {
        let prefix = object_rel(prefix);
        ctx.run(self.walk(&prefix)).await
    }

    async fn upload(
        &self,
        ctx: &Context,
        path: &str,
        body: ByteStream,
        _size: Option<u64>,
        _opts: &UploadOptions,
    ) -> Result<()> {
        let target = self.to_fs_path(path)?;
        if target == self.root {
            return Err(Error::InvalidInput("Object key cannot be empty".to_string()));
        }
        ctx.run(async {
            let written = self.write_file(&target, body).await?;
            debug!(object = %path, size = written, "File written");
            Ok(())
        })
        .await
    }

    async fn download(&self, ctx: &Context, object: &str) -> Result<ByteStream> {
        let fs_path = self.to_fs_path(object)?;
        ctx.run(async {
            let file = match fs::File::open(&fs_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::NotFound(format!("File not found: {}", object)));
                }
                Err(e) => return Err(e.into()),
            };
            if file.metadata().await?.is_dir() {
                return Err(Error::InvalidInput("Cannot download directory".to_string()));
            }
            let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(Error::from));
            Ok(Box::pin(stream) as ByteStream)
        })
        .await
    }

    async fn get_info(&self, ctx: &Context, object: &str) -> Result<File> {
        let fs_path = self.to_fs_path(object)?;
        ctx.run(async {
            match fs::metadata(&fs_path).await {
                Ok(fs_meta) => Ok(self.create_file(object_rel(object), &fs_meta)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(Error::NotFound(format!("Path not found: {}", object)))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}
