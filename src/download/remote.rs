//! Downloader for archives streamed from a remote source

use super::{
    check_cancelled, check_destination, remove_partial, DownloaderState, ExceptionHandler,
    HashAlgorithm, PackageDownloader, Throttle,
};
use crate::error::{FeedError, FeedResult};
use crate::packaging::{PackageArchiveReader, PackageIdentity};
use crate::protocol::PackageContentSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const TYPE_NAME: &str = "RemotePackageArchiveDownloader";

#[derive(Default)]
struct Downloaded {
    path: Option<PathBuf>,
    reader: Option<Arc<PackageArchiveReader>>,
}

/// Streams a package archive from a [`PackageContentSource`] to disk.
///
/// The readers only become available after a successful copy, since there
/// is nothing local to read before that.
pub struct RemotePackageArchiveDownloader {
    source: String,
    content: Arc<dyn PackageContentSource>,
    identity: PackageIdentity,
    downloaded: Mutex<Downloaded>,
    state: DownloaderState,
}

impl RemotePackageArchiveDownloader {
    pub fn new(
        source: impl Into<String>,
        content: Arc<dyn PackageContentSource>,
        identity: PackageIdentity,
    ) -> FeedResult<Self> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(FeedError::argument("source", "must not be empty"));
        }
        if identity.id().trim().is_empty() {
            return Err(FeedError::argument("identity", "package id must not be empty"));
        }

        Ok(Self {
            source,
            content,
            identity,
            downloaded: Mutex::new(Downloaded::default()),
            state: DownloaderState::default(),
        })
    }

    fn reader(&self) -> FeedResult<Arc<PackageArchiveReader>> {
        self.state.ensure_not_disposed(TYPE_NAME)?;
        self.downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reader
            .clone()
            .ok_or_else(|| {
                FeedError::InvalidOperation(format!(
                    "{} has not been copied yet; call copy_nupkg_file_to first",
                    self.identity
                ))
            })
    }

    fn downloaded_path(&self) -> Option<PathBuf> {
        self.downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .path
            .clone()
    }

    async fn copy(&self, destination: &Path, token: &CancellationToken) -> FeedResult<bool> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FeedError::io(format!("creating {}", parent.display()), e))?;
            }
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| FeedError::io(format!("creating {}", destination.display()), e))?;
        let found = self
            .content
            .copy_nupkg_to_stream(&self.identity, &mut file, token)
            .await;
        let found = match found {
            Ok(found) => found,
            Err(e) => {
                drop(file);
                remove_partial(destination).await;
                return Err(e);
            }
        };

        if !found {
            drop(file);
            remove_partial(destination).await;
            debug!("{} not found at {}", self.identity, self.source);
            return Ok(false);
        }

        file.flush()
            .await
            .map_err(|e| FeedError::io(format!("flushing {}", destination.display()), e))?;
        drop(file);

        let path = destination.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || PackageArchiveReader::open(path))
            .await
            .map_err(|e| FeedError::Internal(format!("Archive open task failed: {}", e)))??;

        let mut downloaded = self.downloaded.lock().unwrap_or_else(PoisonError::into_inner);
        downloaded.path = Some(destination.to_path_buf());
        downloaded.reader = Some(Arc::new(reader));
        debug!("Downloaded {} from {} to {}", self.identity, self.source, destination.display());
        Ok(true)
    }

    async fn hash(&self, algorithm: HashAlgorithm, token: &CancellationToken) -> FeedResult<String> {
        if let Some(path) = self.downloaded_path() {
            return algorithm.digest_file(&path, token).await;
        }

        let mut buffer: Vec<u8> = Vec::new();
        let found = self
            .content
            .copy_nupkg_to_stream(&self.identity, &mut buffer, token)
            .await?;
        if !found {
            return Err(FeedError::User(format!(
                "Package {} was not found at {}",
                self.identity, self.source
            )));
        }
        Ok(algorithm.digest(&buffer))
    }
}

#[async_trait]
impl PackageDownloader for RemotePackageArchiveDownloader {
    fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn content_reader(&self) -> FeedResult<Arc<PackageArchiveReader>> {
        self.reader()
    }

    fn core_reader(&self) -> FeedResult<Arc<PackageArchiveReader>> {
        self.reader()
    }

    fn set_throttle(&self, throttle: Option<Throttle>) {
        self.state.set_throttle(throttle);
    }

    fn set_exception_handler(&self, handler: ExceptionHandler) {
        self.state.set_handler(handler);
    }

    async fn copy_nupkg_file_to(&self, destination: &Path, token: &CancellationToken) -> FeedResult<bool> {
        self.state.ensure_not_disposed(TYPE_NAME)?;
        check_destination(destination)?;
        check_cancelled(token)?;

        let _permit = self.state.acquire(token).await?;
        let result = self.copy(destination, token).await;
        self.state.handle(result)
    }

    async fn get_package_hash(&self, algorithm: &str, token: &CancellationToken) -> FeedResult<String> {
        self.state.ensure_not_disposed(TYPE_NAME)?;
        let algorithm = HashAlgorithm::parse(algorithm)?;
        check_cancelled(token)?;

        let _permit = self.state.acquire(token).await?;
        self.hash(algorithm, token).await
    }

    fn dispose(&self) {
        if self.state.dispose() {
            let mut downloaded = self.downloaded.lock().unwrap_or_else(PoisonError::into_inner);
            downloaded.reader = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::archive::test_support::write_package;
    use crate::packaging::PackageVersion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncWrite;

    /// Serves one archive's bytes, or reports it missing, or fails
    struct FakeContent {
        bytes: Option<Vec<u8>>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeContent {
        fn serving(bytes: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                bytes: Some(bytes),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn missing() -> Arc<Self> {
            Arc::new(Self {
                bytes: None,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                bytes: None,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PackageContentSource for FakeContent {
        async fn copy_nupkg_to_stream(
            &self,
            _identity: &PackageIdentity,
            destination: &mut (dyn AsyncWrite + Unpin + Send),
            _token: &CancellationToken,
        ) -> FeedResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FeedError::transport("https://feed/a.nupkg", Some(500), "server error"));
            }
            match &self.bytes {
                Some(bytes) => {
                    destination
                        .write_all(bytes)
                        .await
                        .map_err(|e| FeedError::io("writing", e))?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn package_bytes(dir: &Path) -> Vec<u8> {
        let path = dir.join("source.nupkg");
        write_package(&path, "A", "1.0.0");
        std::fs::read(path).unwrap()
    }

    fn downloader(content: Arc<FakeContent>) -> Arc<RemotePackageArchiveDownloader> {
        let identity = PackageIdentity::new("A", PackageVersion::parse("1.0.0").unwrap());
        Arc::new(RemotePackageArchiveDownloader::new("https://feed/", content, identity).unwrap())
    }

    #[test]
    fn readers_unavailable_before_copy() {
        let d = downloader(FakeContent::missing());
        assert!(matches!(d.content_reader(), Err(FeedError::InvalidOperation(_))));
        assert!(matches!(d.core_reader(), Err(FeedError::InvalidOperation(_))));

        d.dispose();
        assert!(matches!(d.content_reader(), Err(FeedError::Disposed(TYPE_NAME))));
    }

    #[tokio::test]
    async fn copy_makes_readers_available() {
        let temp = TempDir::new().unwrap();
        let bytes = package_bytes(temp.path());
        let d = downloader(FakeContent::serving(bytes.clone()));
        let destination = temp.path().join("out").join("a.1.0.0.nupkg");

        assert!(d.copy_nupkg_file_to(&destination, &CancellationToken::new()).await.unwrap());
        assert_eq!(std::fs::read(&destination).unwrap(), bytes);

        let reader = d.content_reader().unwrap();
        assert_eq!(reader.manifest().id, "A");
        assert!(Arc::ptr_eq(&reader, &d.core_reader().unwrap()));
    }

    #[tokio::test]
    async fn missing_package_returns_false_and_removes_file() {
        let temp = TempDir::new().unwrap();
        let d = downloader(FakeContent::missing());
        let destination = temp.path().join("a.nupkg");

        assert!(!d.copy_nupkg_file_to(&destination, &CancellationToken::new()).await.unwrap());
        assert!(!destination.exists());
        assert!(matches!(d.content_reader(), Err(FeedError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn handler_turns_source_failure_into_false() {
        let temp = TempDir::new().unwrap();
        let d = downloader(FakeContent::failing());
        let destination = temp.path().join("a.nupkg");

        let err = d
            .copy_nupkg_file_to(&destination, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Transport { status: Some(500), .. }));
        assert!(!destination.exists());

        d.set_exception_handler(Arc::new(|e| matches!(e, FeedError::Transport { .. })));
        assert!(!d.copy_nupkg_file_to(&destination, &CancellationToken::new()).await.unwrap());
    }

    #[tokio::test]
    async fn check_order_is_disposed_then_arguments_then_cancellation() {
        let d = downloader(FakeContent::missing());
        let token = CancellationToken::new();
        token.cancel();

        let err = d.copy_nupkg_file_to(Path::new(""), &token).await.unwrap_err();
        assert!(matches!(err, FeedError::InvalidArgument { .. }));
        let err = d.copy_nupkg_file_to(Path::new("a.nupkg"), &token).await.unwrap_err();
        assert!(err.is_cancelled());

        d.dispose();
        let err = d.copy_nupkg_file_to(Path::new(""), &token).await.unwrap_err();
        assert!(matches!(err, FeedError::Disposed(_)));
    }

    #[tokio::test]
    async fn throttle_blocks_until_released() {
        let temp = TempDir::new().unwrap();
        let content = FakeContent::serving(package_bytes(temp.path()));
        let d = downloader(Arc::clone(&content));
        let throttle = Throttle::new(0);
        d.set_throttle(Some(throttle.clone()));

        let task = {
            let d = Arc::clone(&d);
            let destination = temp.path().join("a.nupkg");
            tokio::spawn(async move { d.copy_nupkg_file_to(&destination, &CancellationToken::new()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(content.calls.load(Ordering::SeqCst), 0);

        throttle.release(1);
        assert!(task.await.unwrap().unwrap());
        assert_eq!(throttle.available_permits(), 1);
    }

    #[tokio::test]
    async fn throttle_restored_after_failure() {
        let temp = TempDir::new().unwrap();
        let d = downloader(FakeContent::failing());
        let throttle = Throttle::new(1);
        d.set_throttle(Some(throttle.clone()));

        let result = d
            .copy_nupkg_file_to(&temp.path().join("a.nupkg"), &CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(throttle.available_permits(), 1);
    }

    #[tokio::test]
    async fn hash_streams_when_not_copied() {
        let temp = TempDir::new().unwrap();
        let bytes = package_bytes(temp.path());
        let content = FakeContent::serving(bytes.clone());
        let d = downloader(Arc::clone(&content));

        let hash = d.get_package_hash("SHA512", &CancellationToken::new()).await.unwrap();
        assert_eq!(hash, HashAlgorithm::Sha512.digest(&bytes));
        assert_eq!(content.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hash_uses_copied_file() {
        let temp = TempDir::new().unwrap();
        let bytes = package_bytes(temp.path());
        let content = FakeContent::serving(bytes.clone());
        let d = downloader(Arc::clone(&content));

        d.copy_nupkg_file_to(&temp.path().join("a.nupkg"), &CancellationToken::new())
            .await
            .unwrap();
        let hash = d.get_package_hash("sha256", &CancellationToken::new()).await.unwrap();
        assert_eq!(hash, HashAlgorithm::Sha256.digest(&bytes));
        assert_eq!(content.calls.load(Ordering::SeqCst), 1);
    }
}
