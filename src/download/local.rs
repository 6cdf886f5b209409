//! Downloader for archives already on disk

use super::{
    check_cancelled, check_destination, remove_partial, DownloaderState, ExceptionHandler,
    HashAlgorithm, PackageDownloader, Throttle,
};
use crate::error::{FeedError, FeedResult};
use crate::packaging::{PackageArchiveReader, PackageIdentity};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const TYPE_NAME: &str = "LocalPackageArchiveDownloader";

/// Copies a package archive from a local folder or share
pub struct LocalPackageArchiveDownloader {
    source: String,
    package_path: PathBuf,
    identity: PackageIdentity,
    reader: Mutex<Option<Arc<PackageArchiveReader>>>,
    state: DownloaderState,
}

impl LocalPackageArchiveDownloader {
    pub fn new(
        source: impl Into<String>,
        package_path: impl Into<PathBuf>,
        identity: PackageIdentity,
    ) -> FeedResult<Self> {
        let source = source.into();
        let package_path = package_path.into();
        if source.trim().is_empty() {
            return Err(FeedError::argument("source", "must not be empty"));
        }
        if package_path.as_os_str().is_empty() {
            return Err(FeedError::argument("package_path", "must not be empty"));
        }
        if identity.id().trim().is_empty() {
            return Err(FeedError::argument("identity", "package id must not be empty"));
        }

        Ok(Self {
            source,
            package_path,
            identity,
            reader: Mutex::new(None),
            state: DownloaderState::default(),
        })
    }

    pub fn package_path(&self) -> &Path {
        &self.package_path
    }

    /// Open the archive on first use and keep the reader
    fn reader(&self) -> FeedResult<Arc<PackageArchiveReader>> {
        self.state.ensure_not_disposed(TYPE_NAME)?;
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reader) = reader.as_ref() {
            return Ok(Arc::clone(reader));
        }
        let opened = Arc::new(PackageArchiveReader::open(&self.package_path)?);
        *reader = Some(Arc::clone(&opened));
        Ok(opened)
    }

    async fn copy(&self, destination: &Path, token: &CancellationToken) -> FeedResult<bool> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FeedError::io(format!("creating {}", parent.display()), e))?;
            }
        }

        let mut input = tokio::fs::File::open(&self.package_path)
            .await
            .map_err(|e| FeedError::io(format!("opening {}", self.package_path.display()), e))?;
        let mut output = tokio::fs::File::create(destination)
            .await
            .map_err(|e| FeedError::io(format!("creating {}", destination.display()), e))?;

        let copied = match write_all_from(&mut input, &mut output, destination, token).await {
            Ok(copied) => copied,
            Err(e) => {
                drop(output);
                remove_partial(destination).await;
                return Err(e);
            }
        };

        debug!("Copied {} ({} bytes) to {}", self.identity, copied, destination.display());
        Ok(true)
    }
}

async fn write_all_from(
    input: &mut tokio::fs::File,
    output: &mut tokio::fs::File,
    destination: &Path,
    token: &CancellationToken,
) -> FeedResult<u64> {
    let copied = tokio::select! {
        result = tokio::io::copy(input, output) => result
            .map_err(|e| FeedError::io(format!("copying to {}", destination.display()), e))?,
        _ = token.cancelled() => return Err(FeedError::Cancelled),
    };
    output
        .sync_all()
        .await
        .map_err(|e| FeedError::io(format!("flushing {}", destination.display()), e))?;
    Ok(copied)
}

#[async_trait]
impl PackageDownloader for LocalPackageArchiveDownloader {
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
        algorithm.digest_file(&self.package_path, token).await
    }

    fn dispose(&self) {
        if self.state.dispose() {
            self.reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::archive::test_support::write_package;
    use crate::packaging::PackageVersion;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        dir: PathBuf,
        downloader: Arc<LocalPackageArchiveDownloader>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        let package = dir.join("a.1.0.0.nupkg");
        write_package(&package, "A", "1.0.0");
        let identity = PackageIdentity::new("A", PackageVersion::parse("1.0.0").unwrap());
        let downloader = LocalPackageArchiveDownloader::new("/feed", package, identity).unwrap();
        Fixture {
            _temp: temp,
            dir,
            downloader: Arc::new(downloader),
        }
    }

    #[test]
    fn constructor_validates_arguments() {
        let identity = PackageIdentity::new("A", PackageVersion::new(1, 0, 0));
        assert!(matches!(
            LocalPackageArchiveDownloader::new("", "/a.nupkg", identity.clone()),
            Err(FeedError::InvalidArgument { name: "source", .. })
        ));
        assert!(matches!(
            LocalPackageArchiveDownloader::new("/feed", "", identity.clone()),
            Err(FeedError::InvalidArgument { name: "package_path", .. })
        ));
        assert!(matches!(
            LocalPackageArchiveDownloader::new("/feed", "/a.nupkg", PackageIdentity::new("", PackageVersion::new(1, 0, 0))),
            Err(FeedError::InvalidArgument { name: "identity", .. })
        ));
    }

    #[test]
    fn readers_are_available_immediately() {
        let f = fixture();
        let content = f.downloader.content_reader().unwrap();
        let core = f.downloader.core_reader().unwrap();
        assert!(Arc::ptr_eq(&content, &core));
        assert_eq!(content.manifest().id, "A");
    }

    #[test]
    fn readers_fail_after_dispose() {
        let f = fixture();
        f.downloader.dispose();
        f.downloader.dispose();
        assert!(matches!(f.downloader.content_reader(), Err(FeedError::Disposed(_))));
        assert!(matches!(f.downloader.core_reader(), Err(FeedError::Disposed(_))));
    }

    #[tokio::test]
    async fn copy_writes_package_bytes() {
        let f = fixture();
        let destination = f.dir.join("out").join("copy.nupkg");
        let copied = f
            .downloader
            .copy_nupkg_file_to(&destination, &CancellationToken::new())
            .await
            .unwrap();
        assert!(copied);
        assert_eq!(
            std::fs::read(&destination).unwrap(),
            std::fs::read(f.downloader.package_path()).unwrap()
        );
    }

    #[tokio::test]
    async fn copy_checks_disposed_before_arguments() {
        let f = fixture();
        f.downloader.dispose();
        let token = CancellationToken::new();
        token.cancel();
        let err = f.downloader.copy_nupkg_file_to(Path::new(""), &token).await.unwrap_err();
        assert!(matches!(err, FeedError::Disposed(_)));
    }

    #[tokio::test]
    async fn copy_checks_arguments_before_cancellation() {
        let f = fixture();
        let token = CancellationToken::new();
        token.cancel();
        let err = f.downloader.copy_nupkg_file_to(Path::new(""), &token).await.unwrap_err();
        assert!(matches!(err, FeedError::InvalidArgument { name: "destination", .. }));

        let err = f
            .downloader
            .copy_nupkg_file_to(&f.dir.join("x.nupkg"), &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!f.dir.join("x.nupkg").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_copy_removes_partial_destination() {
        let f = fixture();
        // Opening a directory succeeds on unix but reading it fails
        let unreadable = f.dir.join("not-a-package");
        std::fs::create_dir(&unreadable).unwrap();
        let identity = PackageIdentity::new("A", PackageVersion::new(1, 0, 0));
        let downloader = LocalPackageArchiveDownloader::new("/feed", &unreadable, identity).unwrap();
        let destination = f.dir.join("out").join("partial.nupkg");

        let err = downloader
            .copy_nupkg_file_to(&destination, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn exception_handler_turns_failure_into_false() {
        let f = fixture();
        std::fs::remove_file(f.downloader.package_path()).unwrap();
        let destination = f.dir.join("copy.nupkg");

        let err = f
            .downloader
            .copy_nupkg_file_to(&destination, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));

        f.downloader.set_exception_handler(Arc::new(|_| true));
        let copied = f
            .downloader
            .copy_nupkg_file_to(&destination, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!copied);
    }

    #[tokio::test]
    async fn copy_waits_for_throttle() {
        let f = fixture();
        let throttle = Throttle::new(0);
        f.downloader.set_throttle(Some(throttle.clone()));
        let destination = f.dir.join("throttled.nupkg");

        let task = {
            let downloader = Arc::clone(&f.downloader);
            let destination = destination.clone();
            tokio::spawn(async move {
                downloader
                    .copy_nupkg_file_to(&destination, &CancellationToken::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert!(!destination.exists());

        throttle.release(1);
        assert!(task.await.unwrap().unwrap());
        assert_eq!(throttle.available_permits(), 1);
    }

    #[tokio::test]
    async fn throttle_restored_after_failure() {
        let f = fixture();
        let throttle = Throttle::new(1);
        f.downloader.set_throttle(Some(throttle.clone()));
        std::fs::remove_file(f.downloader.package_path()).unwrap();

        let result = f
            .downloader
            .copy_nupkg_file_to(&f.dir.join("copy.nupkg"), &CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(throttle.available_permits(), 1);
    }

    #[tokio::test]
    async fn hash_matches_file_contents() {
        let f = fixture();
        let bytes = std::fs::read(f.downloader.package_path()).unwrap();
        let hash = f
            .downloader
            .get_package_hash("SHA512", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hash, HashAlgorithm::Sha512.digest(&bytes));
    }

    #[tokio::test]
    async fn hash_performs_the_same_checks() {
        let f = fixture();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            f.downloader.get_package_hash("", &token).await,
            Err(FeedError::InvalidArgument { name: "algorithm", .. })
        ));
        assert!(f.downloader.get_package_hash("SHA256", &token).await.unwrap_err().is_cancelled());

        f.downloader.dispose();
        assert!(matches!(
            f.downloader.get_package_hash("", &token).await,
            Err(FeedError::Disposed(_))
        ));
    }
}
