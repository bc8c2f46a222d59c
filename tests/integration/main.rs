//! Integration tests for offbuild

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn offbuild() -> Command {
        let mut cmd = cargo_bin_cmd!("offbuild");
        cmd.env_remove("OFFBUILD_SERVER_URL");
        cmd
    }

    fn server() -> Command {
        cargo_bin_cmd!("offbuild-server")
    }

    #[test]
    fn help_displays() {
        offbuild()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("remote build server"))
            .stdout(predicate::str::contains("--race"));
    }

    #[test]
    fn version_displays() {
        offbuild()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("offbuild"));
    }

    #[test]
    fn server_help_displays() {
        server()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--data-dir"))
            .stdout(predicate::str::contains("--toolchain-root"));
    }

    #[test]
    fn missing_server_url_fails() {
        offbuild()
            .arg("hello")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No build server configured"))
            .stderr(predicate::str::contains("OFFBUILD_SERVER_URL"));
    }

    #[test]
    fn server_rejects_half_tls_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("server.toml");
        std::fs::write(&config, "[listen]\ntls_cert = \"cert.pem\"\n").unwrap();

        server()
            .arg("--config")
            .arg(&config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("TLS requires both"));
    }
}

#[cfg(unix)]
mod end_to_end {
    use offbuild::cache::ContentHash;
    use offbuild::client::{
        run_build, BuildClient, BuildOptions, ManifestBuilder, PackageImporter, Platform,
        ResolvedPackage,
    };
    use offbuild::config::ServerConfig;
    use offbuild::error::{OffbuildError, OffbuildResult};
    use offbuild::model::Package;
    use offbuild::server::Server;
    use offbuild::session::BuildId;
    use offbuild::ui::UiContext;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use tempfile::TempDir;

    /// Stands in for `go`: reports an environment, and "builds" a package
    /// into a shell script printing `a`, failing when a source file
    /// contains SYNTAX ERROR.
    const FAKE_GO: &str = r#"#!/bin/sh
case "$1" in
env)
    printf '{"GOOS":"linux","GOARCH":"amd64","GOVERSION":"go1.22.1"}\n'
    ;;
version)
    echo "go version go1.22.1 linux/amd64"
    ;;
build)
    shift
    out=""
    while [ $# -gt 1 ]; do
        case "$1" in
        -o) out="$2"; shift 2 ;;
        *) shift ;;
        esac
    done
    pkg="$1"
    if grep -rq "SYNTAX ERROR" "$GOPATH/src/$pkg"; then
        echo "$pkg/main.go:3:1: syntax error: unexpected }" >&2
        exit 2
    fi
    printf '#!/bin/sh\necho a\n' > "$out"
    ;;
*)
    echo "unsupported: $*" >&2
    exit 1
    ;;
esac
"#;

    /// Importer over packages written to a temp dir
    struct StaticImporter {
        packages: Vec<ResolvedPackage>,
    }

    impl PackageImporter for StaticImporter {
        fn import(&self, path: &str, _platform: &Platform) -> OffbuildResult<ResolvedPackage> {
            self.packages
                .iter()
                .find(|p| p.import_path == path)
                .cloned()
                .ok_or_else(|| OffbuildError::resolution(path, "cannot find package"))
        }
    }

    struct Fixture {
        dir: TempDir,
        url: String,
    }

    impl Fixture {
        fn start() -> Self {
            let dir = TempDir::new().unwrap();

            let bin = dir.path().join("goroot/bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join("go"), FAKE_GO).unwrap();
            std::fs::set_permissions(bin.join("go"), std::fs::Permissions::from_mode(0o755))
                .unwrap();

            let mut config = ServerConfig::default();
            config.general.data_dir = dir.path().join("data");
            config.toolchain.root = Some(dir.path().join("goroot"));

            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let runtime = tokio::runtime::Runtime::new().unwrap();
                runtime.block_on(async move {
                    let server = Server::new(&config).await.unwrap();
                    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                    tx.send(listener.local_addr().unwrap()).unwrap();
                    server.serve_on(listener).await.unwrap();
                });
            });
            let addr = rx.recv().unwrap();

            Self {
                dir,
                url: format!("http://{addr}"),
            }
        }

        /// Write a single-file package and an importer that knows it
        fn package(&self, name: &str, source: &str) -> StaticImporter {
            let pkg_dir = self.dir.path().join("src").join(name);
            std::fs::create_dir_all(&pkg_dir).unwrap();
            std::fs::write(pkg_dir.join("main.go"), source).unwrap();

            StaticImporter {
                packages: vec![
                    ResolvedPackage {
                        import_path: name.to_string(),
                        dir: pkg_dir,
                        standard: false,
                        imports: vec!["fmt".to_string()],
                        files: vec!["main.go".to_string()],
                    },
                    ResolvedPackage {
                        import_path: "fmt".to_string(),
                        standard: true,
                        ..Default::default()
                    },
                ],
            }
        }

        fn output(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn options(&self, package: &str, output: &Path) -> BuildOptions {
            BuildOptions {
                server_url: self.url.clone(),
                package: package.to_string(),
                output: output.to_path_buf(),
                flags: vec![],
            }
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.dir.path().join("data/scratch"))
                .unwrap()
                .next()
                .is_none()
        }
    }

    fn platform() -> Platform {
        Platform {
            os: "linux".into(),
            arch: "amd64".into(),
        }
    }

    /// Run a produced artifact through sh and return its stdout
    fn run_artifact(path: &Path) -> String {
        let output = Command::new("sh").arg(path).output().unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    }

    const HELLO: &str = "package main\n\nfunc main() { println(\"a\") }\n";

    #[test]
    fn environment_reports_server_toolchain() {
        let fixture = Fixture::start();
        let env = BuildClient::new(&fixture.url).environment().unwrap();
        assert_eq!(env.os, "linux");
        assert_eq!(env.arch, "amd64");
        assert_eq!(env.toolchain_version, "go1.22.1");
    }

    #[test]
    fn hello_round_trip_then_cached() {
        let fixture = Fixture::start();
        let importer = fixture.package("hello", HELLO);
        let client = BuildClient::new(&fixture.url);
        let hash = ContentHash::of_bytes(HELLO.as_bytes());

        let manifest = ManifestBuilder::new(&importer, platform())
            .build("hello", vec![])
            .unwrap();
        let begun = client.begin(&manifest.request).unwrap();
        assert_eq!(begun.missing.len(), 1);
        assert_eq!(begun.missing[0].name, "hello");
        assert_eq!(begun.missing[0].files.len(), 1);
        assert_eq!(begun.missing[0].files[0].name, "main.go");
        assert_eq!(begun.missing[0].files[0].hash, hash);

        let path = manifest.sources.path(&hash).unwrap();
        client.upload(&hash, path).unwrap();

        let first = fixture.output("hello-1");
        client.fetch(&begun.id, &first).unwrap();
        assert_eq!(run_artifact(&first).trim(), "a");
        let mode = std::fs::metadata(&first).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        // Same sources again: nothing to upload, same artifact.
        let again = client.begin(&manifest.request).unwrap();
        assert_eq!(again.missing, Vec::<Package>::new());
        let second = fixture.output("hello-2");
        client.fetch(&again.id, &second).unwrap();
        assert_eq!(run_artifact(&second).trim(), "a");
    }

    #[test]
    fn run_build_writes_artifact() {
        let fixture = Fixture::start();
        let importer = fixture.package("tool", HELLO);
        let output = fixture.output("tool");

        let summary = run_build(
            &fixture.options("tool", &output),
            &importer,
            &UiContext::non_interactive(),
        )
        .unwrap();

        assert_eq!(summary.packages, 1);
        assert_eq!(summary.uploaded, 1);
        assert_eq!(run_artifact(&output).trim(), "a");
    }

    #[test]
    fn compile_failure_returns_diagnostics_verbatim() {
        let fixture = Fixture::start();
        let importer = fixture.package("broken", "package main\n\nSYNTAX ERROR }\n");
        let output = fixture.output("broken");

        let err = run_build(
            &fixture.options("broken", &output),
            &importer,
            &UiContext::non_interactive(),
        )
        .unwrap_err();

        match err {
            OffbuildError::Compile { diagnostics } => assert_eq!(
                String::from_utf8(diagnostics).unwrap(),
                "broken/main.go:3:1: syntax error: unexpected }\n"
            ),
            other => panic!("expected compile failure, got {other}"),
        }
        assert!(!output.exists());
        assert!(fixture.scratch_is_empty());
    }

    #[test]
    fn unknown_build_is_404() {
        let fixture = Fixture::start();
        let output = fixture.output("nothing");

        let err = BuildClient::new(&fixture.url)
            .fetch(&BuildId::generate(), &output)
            .unwrap_err();

        match err {
            OffbuildError::Protocol { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such build");
            }
            other => panic!("expected protocol error, got {other}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn mislabeled_upload_is_rejected() {
        let fixture = Fixture::start();
        let importer = fixture.package("hello", HELLO);
        let source = importer.packages[0].dir.join("main.go");
        let wrong = ContentHash::of_bytes(b"something else");

        let err = BuildClient::new(&fixture.url)
            .upload(&wrong, &source)
            .unwrap_err();
        assert!(matches!(err, OffbuildError::Protocol { status: 400, .. }));

        let manifest = ManifestBuilder::new(&importer, platform())
            .build("hello", vec![])
            .unwrap();
        let begun = BuildClient::new(&fixture.url)
            .begin(&manifest.request)
            .unwrap();
        assert_eq!(begun.missing.len(), 1);
    }
}
