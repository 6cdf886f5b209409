//! Download command - copy a package archive and print its hash

use crate::cli::args::DownloadArgs;
use crate::config::Config;
use crate::download::{
    LocalPackageArchiveDownloader, PackageDownloader, RemotePackageArchiveDownloader, Throttle,
};
use crate::error::{FeedError, FeedResult};
use crate::local::LocalRepositoryIndex;
use crate::packaging::{PackageIdentity, PackageVersion};
use crate::protocol::PackageBaseAddressResource;
use crate::repository::{FeedKind, SourceRepository};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Execute the download command
pub async fn execute(args: DownloadArgs, config: &Config) -> FeedResult<()> {
    let source = config.resolve_source(&args.source);
    let version = PackageVersion::parse(&args.package_version)?;
    let identity = PackageIdentity::new(args.id.as_str(), version);
    let output = args.output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "{}.{}.nupkg",
            identity.normalized_id(),
            identity.version().to_normalized_string().to_lowercase()
        ))
    });
    let algorithm = args
        .hash_algorithm
        .unwrap_or_else(|| config.downloads.hash_algorithm.clone());

    let token = super::interrupt_token();
    let repository = super::repository_factory(config)?.create(source.clone());
    let downloader = create_downloader(&repository, &identity, &token).await?;
    downloader.set_throttle(Some(Throttle::new(config.downloads.max_concurrent.max(1))));

    info!("Downloading {} from {}", identity, source);
    let result = copy_and_hash(downloader.as_ref(), &output, &algorithm, &token).await;
    downloader.dispose();
    let hash = result?;

    println!(
        "{} {} -> {}",
        style("✓").green(),
        style(&identity).bold(),
        output.display()
    );
    println!("{}: {}", algorithm.to_uppercase(), hash);
    Ok(())
}

async fn copy_and_hash(
    downloader: &dyn PackageDownloader,
    output: &std::path::Path,
    algorithm: &str,
    token: &CancellationToken,
) -> FeedResult<String> {
    if !downloader.copy_nupkg_file_to(output, token).await? {
        return Err(FeedError::User(format!(
            "Package {} was not found at {}",
            downloader.identity(),
            downloader.source()
        )));
    }
    downloader.get_package_hash(algorithm, token).await
}

/// Pick the downloader for the source kind
async fn create_downloader(
    repository: &SourceRepository,
    identity: &PackageIdentity,
    token: &CancellationToken,
) -> FeedResult<Box<dyn PackageDownloader>> {
    let source = repository.source();
    match source.feed_kind() {
        FeedKind::ServiceIndex => {
            let content = repository
                .get::<PackageBaseAddressResource>(token)
                .await?
                .ok_or_else(|| {
                    FeedError::User(format!("{} does not advertise a package content endpoint", source))
                })?;
            Ok(Box::new(RemotePackageArchiveDownloader::new(
                source.location.as_str(),
                content,
                identity.clone(),
            )?))
        }
        FeedKind::LocalFolder => {
            let index = repository
                .get::<LocalRepositoryIndex>(token)
                .await?
                .ok_or_else(|| FeedError::User(format!("{} is not a readable folder", source)))?;
            let found = {
                let index = Arc::clone(&index);
                let identity = identity.clone();
                tokio::task::spawn_blocking(move || index.find_package(identity.id(), identity.version()))
                    .await
                    .map_err(|e| FeedError::Internal(format!("Package scan task failed: {}", e)))?
            };
            let info = found.ok_or_else(|| {
                FeedError::User(format!("Package {} is not installed in {}", identity, source))
            })?;
            Ok(Box::new(LocalPackageArchiveDownloader::new(
                source.location.as_str(),
                info.path().to_path_buf(),
                identity.clone(),
            )?))
        }
        FeedKind::ODataFeed => Err(FeedError::User(format!(
            "Downloading from OData feeds is not supported: {}",
            source
        ))),
    }
}
