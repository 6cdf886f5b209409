//! Integration tests for feedkit

mod support {
    use feedkit::local::VersionFolderPathResolver;
    use feedkit::packaging::PackageVersion;
    use std::io::Write;
    use std::path::Path;
    use zip::write::FileOptions;

    pub fn nuspec(id: &str, version: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?>\
             <package xmlns=\"http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd\">\
             <metadata><id>{}</id><version>{}</version><authors>tests</authors>\
             <description>integration package</description></metadata></package>",
            id, version
        )
    }

    pub fn write_package(path: &Path, id: &str, version: &str) {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        let options = FileOptions::<()>::default();
        zip.start_file(format!("{}.nuspec", id), options).unwrap();
        zip.write_all(nuspec(id, version).as_bytes()).unwrap();
        zip.start_file("lib/net8.0/lib.dll", options).unwrap();
        zip.write_all(b"binary").unwrap();
        zip.finish().unwrap();
    }

    /// Install one version into a local repository; the hash file goes last
    pub fn install(root: &Path, id: &str, version: &str) {
        let resolver = VersionFolderPathResolver::new(root);
        let parsed = PackageVersion::parse(version).unwrap();
        std::fs::create_dir_all(resolver.install_path(id, &parsed)).unwrap();
        write_package(&resolver.package_file_path(id, &parsed), id, version);
        std::fs::write(resolver.manifest_path(id, &parsed), nuspec(id, version)).unwrap();
        std::fs::write(resolver.hash_path(id, &parsed), "aGFzaA==").unwrap();
    }
}

mod cli_tests {
    use super::support::install;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config file
    fn feedkit(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("feedkit");
        cmd.env("FEEDKIT_CONFIG", config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        feedkit(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("package source client"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        feedkit(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("feedkit"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        feedkit(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        feedkit(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[downloads]"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        feedkit(&temp).args(["config", "init"]).assert().success();
        assert!(temp.path().join("config.toml").exists());

        feedkit(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_fails_other_commands() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[downloads\n").unwrap();
        feedkit(&temp)
            .args(["list", "a", "--root", "/nonexistent"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn list_installed_versions() {
        let temp = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        install(repo.path(), "Contoso.Lib", "1.0.0");
        install(repo.path(), "Contoso.Lib", "2.0.0-beta");

        feedkit(&temp)
            .args(["list", "contoso.lib", "--format", "plain", "--root"])
            .arg(repo.path())
            .assert()
            .success()
            .stdout(predicate::str::diff("1.0.0\n2.0.0-beta\n"));
    }

    #[test]
    fn list_unknown_id_is_empty_json() {
        let temp = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        feedkit(&temp)
            .args(["list", "missing", "-f", "json", "--root"])
            .arg(repo.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn resources_for_local_folder() {
        let temp = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        feedkit(&temp)
            .args(["resources", "--format", "plain"])
            .arg(repo.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("LocalRepository"));
    }

    #[test]
    fn download_from_local_folder() {
        let temp = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        install(repo.path(), "A", "1.0.0");
        let output = temp.path().join("out").join("a.nupkg");

        feedkit(&temp)
            .arg("download")
            .arg(repo.path())
            .args(["A", "1.0.0", "--hash-algorithm", "sha256", "--output"])
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("SHA256: "));

        let installed = repo.path().join("a").join("1.0.0").join("a.1.0.0.nupkg");
        assert_eq!(std::fs::read(output).unwrap(), std::fs::read(installed).unwrap());
    }

    #[test]
    fn download_missing_version_fails() {
        let temp = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        install(repo.path(), "A", "1.0.0");

        feedkit(&temp)
            .arg("download")
            .arg(repo.path())
            .args(["A", "9.9.9"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not installed"));
    }
}

mod local_repository_tests {
    use super::support::install;
    use feedkit::cache::LocalMetadataCache;
    use feedkit::local::LocalRepositoryIndex;
    use feedkit::packaging::PackageVersion;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn concurrent_install_clear_and_read() {
        let temp = TempDir::new().unwrap();
        let index = Arc::new(LocalRepositoryIndex::new(
            temp.path(),
            Arc::new(LocalMetadataCache::new()),
        ));

        let workers: Vec<_> = (0..10)
            .map(|worker| {
                let index = Arc::clone(&index);
                let root = temp.path().to_path_buf();
                thread::spawn(move || {
                    for v in 0..10 {
                        install(&root, "Stress.Pkg", &format!("{}.{}.0", worker + 1, v));
                        index.clear_cache_for_ids(["Stress.Pkg"]);
                        for info in index.find_packages_by_id("stress.pkg").iter() {
                            // Anything listed was fully installed
                            assert_eq!(info.manifest().unwrap().id, "Stress.Pkg");
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        index.clear_cache_for_ids(["stress.pkg"]);
        let packages = index.find_packages_by_id("STRESS.PKG");
        assert_eq!(packages.len(), 100);
        assert!(packages
            .windows(2)
            .all(|pair| pair[0].identity().version() < pair[1].identity().version()));
    }

    #[test]
    fn equal_versions_share_one_entry() {
        let temp = TempDir::new().unwrap();
        install(temp.path(), "A", "1.0.0-beta");
        let index = LocalRepositoryIndex::new(temp.path(), Arc::new(LocalMetadataCache::new()));

        let lower = index.find_package("a", &PackageVersion::parse("1.0.0-beta").unwrap()).unwrap();
        let upper = index.find_package("A", &PackageVersion::parse("1.0.0-BETA").unwrap()).unwrap();
        assert!(Arc::ptr_eq(&lower, &upper));
        assert!(Arc::ptr_eq(lower.manifest_cell(), upper.manifest_cell()));
    }
}

mod repository_tests {
    use super::support::install;
    use feedkit::cache::LocalMetadataCache;
    use feedkit::download::{LocalPackageArchiveDownloader, PackageDownloader, Throttle};
    use feedkit::local::{LocalRepositoryIndex, VersionFolderPathResolver};
    use feedkit::packaging::{PackageIdentity, PackageVersion};
    use feedkit::protocol::{RetryPolicy, UreqFetcher, UserAgent};
    use feedkit::repository::{PackageSource, RepositoryFactory, ResourceCatalog, ServiceIndexResource};
    use feedkit::FeedError;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn factory() -> RepositoryFactory {
        let fetcher = UreqFetcher::new(UserAgent::default(), RetryPolicy::default(), Duration::from_secs(5));
        let catalog = ResourceCatalog::standard(Arc::new(fetcher), Arc::new(LocalMetadataCache::new()));
        RepositoryFactory::new(catalog).unwrap()
    }

    #[tokio::test]
    async fn local_source_builds_only_local_resources() {
        let temp = TempDir::new().unwrap();
        install(temp.path(), "A", "1.0.0");
        let repository = factory().create(PackageSource::new("local", temp.path().display().to_string()));
        let token = CancellationToken::new();

        assert!(repository.get::<ServiceIndexResource>(&token).await.unwrap().is_none());
        let first = repository.get::<LocalRepositoryIndex>(&token).await.unwrap().unwrap();
        let second = repository.get::<LocalRepositoryIndex>(&token).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.find_packages_by_id("a").len(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_resource_creation() {
        let temp = TempDir::new().unwrap();
        let repository = factory().create(PackageSource::from_location(temp.path().display().to_string()));
        let token = CancellationToken::new();
        token.cancel();

        let err = repository.get::<LocalRepositoryIndex>(&token).await.unwrap_err();
        assert!(matches!(err, FeedError::Cancelled));
    }

    #[tokio::test]
    async fn shared_throttle_is_restored_after_concurrent_downloads() {
        let temp = TempDir::new().unwrap();
        let throttle = Throttle::new(1);
        let resolver = VersionFolderPathResolver::new(temp.path());

        let mut tasks = Vec::new();
        for n in 0..5 {
            let version = PackageVersion::parse(&format!("1.0.{}", n)).unwrap();
            install(temp.path(), "A", &version.to_string());
            let identity = PackageIdentity::new("A", version.clone());
            let downloader = LocalPackageArchiveDownloader::new(
                "local",
                resolver.package_file_path("A", &version),
                identity,
            )
            .unwrap();
            downloader.set_throttle(Some(throttle.clone()));

            let destination = temp.path().join("out").join(format!("{}.nupkg", version));
            tasks.push(tokio::spawn(async move {
                downloader
                    .copy_nupkg_file_to(&destination, &CancellationToken::new())
                    .await
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }
        assert_eq!(throttle.available_permits(), 1);
    }
}

mod queue_tests {
    use feedkit::queue::SequentialWorkQueue;
    use std::sync::{Arc, Mutex};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queue_preserves_order_across_threads() {
        let queue = SequentialWorkQueue::new();
        queue.start().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..50 {
            let seen = Arc::clone(&seen);
            queue
                .enqueue(async move {
                    tokio::task::yield_now().await;
                    seen.lock().unwrap().push(n);
                })
                .unwrap();
        }

        queue.dispose_and_wait().await;
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }
}
