//! Package downloaders
//!
//! A downloader copies one package archive to a destination file and can
//! hash it. Two variants exist:
//!
//! | Variant | Reader available | Bytes come from |
//! |---------|------------------|-----------------|
//! | [`LocalPackageArchiveDownloader`] | immediately | an archive on disk |
//! | [`RemotePackageArchiveDownloader`] | after a successful copy | a [`PackageContentSource`] |
//!
//! Every operation checks, in order: disposed, arguments, cancellation.
//! It then holds a throttle permit (when a throttle is set) until it
//! finishes.
//!
//! [`PackageContentSource`]: crate::protocol::PackageContentSource

pub mod local;
pub mod remote;
pub mod throttle;

pub use local::LocalPackageArchiveDownloader;
pub use remote::RemotePackageArchiveDownloader;
pub use throttle::{Throttle, ThrottlePermit};

use crate::error::{FeedError, FeedResult};
use crate::packaging::{PackageArchiveReader, PackageIdentity};
use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256, Sha512};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decides whether a failed operation should be reported as `Ok(false)`
/// (`true`) or propagated (`false`)
pub type ExceptionHandler = Arc<dyn Fn(&FeedError) -> bool + Send + Sync>;

/// Copies and hashes one package archive
#[async_trait]
pub trait PackageDownloader: Send + Sync {
    fn identity(&self) -> &PackageIdentity;

    /// Where the package comes from, for logs
    fn source(&self) -> &str;

    /// Reader over the archive contents
    fn content_reader(&self) -> FeedResult<Arc<PackageArchiveReader>>;

    /// Reader over the archive metadata
    fn core_reader(&self) -> FeedResult<Arc<PackageArchiveReader>>;

    /// Attach, replace or remove the throttle used by later operations
    fn set_throttle(&self, throttle: Option<Throttle>);

    fn set_exception_handler(&self, handler: ExceptionHandler);

    /// Copy the archive to `destination`. Returns `true` when the file now
    /// holds the package.
    async fn copy_nupkg_file_to(&self, destination: &Path, token: &CancellationToken) -> FeedResult<bool>;

    /// Base64 digest of the archive with `SHA512` or `SHA256`
    async fn get_package_hash(&self, algorithm: &str, token: &CancellationToken) -> FeedResult<String>;

    /// Release readers; later calls fail with `Disposed`. Safe to repeat.
    fn dispose(&self);
}

/// Supported package hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> FeedResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SHA512" | "SHA-512" => Ok(Self::Sha512),
            "SHA256" | "SHA-256" => Ok(Self::Sha256),
            "" => Err(FeedError::argument("algorithm", "must not be empty")),
            _ => Err(FeedError::argument(
                "algorithm",
                format!("unsupported hash algorithm '{}'", name),
            )),
        }
    }

    /// Base64 digest of `data`
    pub fn digest(&self, data: &[u8]) -> String {
        let bytes = match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        };
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    /// Base64 digest of a file, read in chunks
    pub async fn digest_file(&self, path: &Path, token: &CancellationToken) -> FeedResult<String> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FeedError::io(format!("opening {}", path.display()), e))?;

        let bytes = match self {
            Self::Sha256 => hash_reader::<Sha256>(file, path, token).await?,
            Self::Sha512 => hash_reader::<Sha512>(file, path, token).await?,
        };
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

async fn hash_reader<D: Digest>(
    mut file: tokio::fs::File,
    path: &Path,
    token: &CancellationToken,
) -> FeedResult<Vec<u8>> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        check_cancelled(token)?;
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| FeedError::io(format!("reading {}", path.display()), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Disposal flag, throttle and exception handler shared by both variants
#[derive(Default)]
pub(crate) struct DownloaderState {
    disposed: AtomicBool,
    throttle: Mutex<Option<Throttle>>,
    handler: Mutex<Option<ExceptionHandler>>,
}

impl DownloaderState {
    pub(crate) fn ensure_not_disposed(&self, type_name: &'static str) -> FeedResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(FeedError::Disposed(type_name));
        }
        Ok(())
    }

    /// Mark disposed; returns `true` only the first time
    pub(crate) fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn set_throttle(&self, throttle: Option<Throttle>) {
        *self.throttle.lock().unwrap_or_else(PoisonError::into_inner) = throttle;
    }

    pub(crate) fn set_handler(&self, handler: ExceptionHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Take a throttle permit if a throttle is attached
    pub(crate) async fn acquire(&self, token: &CancellationToken) -> FeedResult<Option<ThrottlePermit>> {
        let throttle = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match throttle {
            Some(throttle) => throttle.acquire(token).await.map(Some),
            None => Ok(None),
        }
    }

    /// Let the exception handler turn a failure into `Ok(false)`.
    /// Cancellation always propagates.
    pub(crate) fn handle(&self, result: FeedResult<bool>) -> FeedResult<bool> {
        match result {
            Err(e) if !e.is_cancelled() => {
                let handler = self
                    .handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match handler {
                    Some(handler) if handler(&e) => {
                        debug!("Download failure handled: {}", e);
                        Ok(false)
                    }
                    _ => Err(e),
                }
            }
            other => other,
        }
    }
}

/// Validate a destination path argument
pub(crate) fn check_destination(destination: &Path) -> FeedResult<()> {
    if destination.as_os_str().is_empty() {
        return Err(FeedError::argument("destination", "must not be empty"));
    }
    Ok(())
}

/// Delete a partially written destination after a failed copy
pub(crate) async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial download {}: {}", path.display(), e);
        }
    }
}

/// Fail early when the token has already fired
pub(crate) fn check_cancelled(token: &CancellationToken) -> FeedResult<()> {
    if token.is_cancelled() {
        return Err(FeedError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_algorithm_names() {
        assert_eq!(HashAlgorithm::parse("sha512").unwrap(), HashAlgorithm::Sha512);
        assert_eq!(HashAlgorithm::parse("SHA256").unwrap(), HashAlgorithm::Sha256);
        assert!(matches!(
            HashAlgorithm::parse(""),
            Err(FeedError::InvalidArgument { name: "algorithm", .. })
        ));
        assert!(HashAlgorithm::parse("md5").is_err());
    }

    #[test]
    fn digest_is_base64() {
        assert_eq!(
            HashAlgorithm::Sha256.digest(b"abc"),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
        assert_eq!(HashAlgorithm::Sha512.digest(b"abc").len(), 88);
    }

    #[tokio::test]
    async fn file_digest_matches_memory_digest() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            assert_eq!(
                algorithm.digest_file(&path, &CancellationToken::new()).await.unwrap(),
                algorithm.digest(&data)
            );
        }
    }

    #[tokio::test]
    async fn file_digest_stops_when_cancelled() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            assert!(matches!(
                algorithm.digest_file(&path, &token).await,
                Err(FeedError::Cancelled)
            ));
        }
    }

    #[tokio::test]
    async fn remove_partial_ignores_missing_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("partial.nupkg");
        std::fs::write(&path, b"half").unwrap();

        remove_partial(&path).await;
        assert!(!path.exists());
        remove_partial(&path).await;
    }

    #[test]
    fn handler_turns_errors_into_false() {
        let state = DownloaderState::default();
        let error = || Err(FeedError::transport("u", Some(500), "boom"));
        assert!(state.handle(error()).is_err());

        state.set_handler(Arc::new(|_| true));
        assert!(!state.handle(error()).unwrap());
        assert!(state.handle(Err(FeedError::Cancelled)).is_err());

        state.set_handler(Arc::new(|_| false));
        assert!(state.handle(error()).is_err());
    }

    #[test]
    fn dispose_reports_first_call() {
        let state = DownloaderState::default();
        assert!(state.ensure_not_disposed("X").is_ok());
        assert!(state.dispose());
        assert!(!state.dispose());
        assert!(matches!(state.ensure_not_disposed("X"), Err(FeedError::Disposed("X"))));
    }
}
