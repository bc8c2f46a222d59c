//! Build protocol client
//!
//! A build is three sequential round trips: `begin` submits the manifest
//! and learns which files the server lacks, `upload` sends those files one
//! at a time, and `fetch` asks for the result. Any failure ends the run;
//! nothing is retried.

use crate::cache::ContentHash;
use crate::client::importer::{PackageImporter, Platform};
use crate::client::manifest::ManifestBuilder;
use crate::error::{OffbuildError, OffbuildResult};
use crate::model::{routes, BeginResponse, BuildRequest, Environment, COMPILE_FAILED_STATUS};
use crate::session::BuildId;
use crate::ui::{UiContext, UploadProgress};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use ureq::http::Response;
use ureq::{Agent, Body, SendBody};

/// Dial timeout for every request
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one build server
#[derive(Clone)]
pub struct BuildClient {
    agent: Agent,
    base_url: String,
}

impl BuildClient {
    pub fn new(base_url: &str) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ask the server which platform and toolchain it builds with
    pub fn environment(&self) -> OffbuildResult<Environment> {
        let url = self.url(&format!("{}?format=json", routes::VERSION));
        let mut response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| http_error(&url, e))?;
        expect_ok(routes::VERSION, &mut response)?;

        let body = read_body(&url, &mut response)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Submit a manifest; returns the build id and the files to upload
    pub fn begin(&self, request: &BuildRequest) -> OffbuildResult<BeginResponse> {
        let url = self.url(routes::BEGIN);
        let payload = serde_json::to_vec(request)?;

        debug!("POST {}", url);
        let mut response = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(&payload[..])
            .map_err(|e| http_error(&url, e))?;
        expect_ok(routes::BEGIN, &mut response)?;

        let body = read_body(&url, &mut response)?;
        serde_json::from_slice(&body).map_err(|e| OffbuildError::Protocol {
            endpoint: routes::BEGIN.to_string(),
            status: 200,
            body: format!("undecodable response: {e}"),
        })
    }

    /// Stream the file at `path` to the server's cache under `hash`
    pub fn upload(&self, hash: &ContentHash, path: &Path) -> OffbuildResult<()> {
        let url = self.url(&format!("{}/{}", routes::UPLOAD, hash));
        let mut file = std::fs::File::open(path)
            .map_err(|e| OffbuildError::io(format!("opening {}", path.display()), e))?;

        debug!("POST {} ({})", url, path.display());
        let mut response = self
            .agent
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .send(SendBody::from_reader(&mut file))
            .map_err(|e| http_error(&url, e))?;
        expect_ok(routes::UPLOAD, &mut response)
    }

    /// Request the result of build `id` and write the artifact to `output`.
    ///
    /// A compile failure is [`OffbuildError::Compile`] carrying the
    /// toolchain's output. A download that fails, or whose result cannot be
    /// made executable, leaves no file behind.
    pub fn fetch(&self, id: &BuildId, output: &Path) -> OffbuildResult<u64> {
        self.fetch_with(id, output, make_executable)
    }

    /// [`fetch`](Self::fetch) with the step applied to a complete download
    fn fetch_with(
        &self,
        id: &BuildId,
        output: &Path,
        finalize: impl FnOnce(&Path) -> OffbuildResult<()>,
    ) -> OffbuildResult<u64> {
        let url = self.url(&format!("{}/{}", routes::BUILD, id));

        debug!("GET {}", url);
        let mut response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| http_error(&url, e))?;

        if response.status().as_u16() == COMPILE_FAILED_STATUS {
            let diagnostics = read_body(&url, &mut response)?;
            return Err(OffbuildError::Compile { diagnostics });
        }
        expect_ok(routes::BUILD, &mut response)?;

        let mut file = std::fs::File::create(output)
            .map_err(|e| OffbuildError::io(format!("creating {}", output.display()), e))?;
        let copied = io::copy(&mut response.body_mut().as_reader(), &mut file)
            .and_then(|n| file.flush().map(|()| n));
        drop(file);

        let written = match copied {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(output);
                return Err(OffbuildError::io(
                    format!("downloading artifact to {}", output.display()),
                    e,
                ));
            }
        };

        if let Err(e) = finalize(output) {
            let _ = std::fs::remove_file(output);
            return Err(e);
        }
        Ok(written)
    }
}

fn http_error(url: &str, err: ureq::Error) -> OffbuildError {
    OffbuildError::Http {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

fn read_body(url: &str, response: &mut Response<Body>) -> OffbuildResult<Vec<u8>> {
    let mut body = Vec::new();
    response
        .body_mut()
        .as_reader()
        .read_to_end(&mut body)
        .map_err(|e| OffbuildError::io(format!("reading response from {url}"), e))?;
    Ok(body)
}

/// Turn any non-200 status into a protocol error carrying the body
fn expect_ok(endpoint: &str, response: &mut Response<Body>) -> OffbuildResult<()> {
    let status = response.status().as_u16();
    if status == 200 {
        return Ok(());
    }

    let mut body = Vec::new();
    let _ = response.body_mut().as_reader().read_to_end(&mut body);
    Err(OffbuildError::Protocol {
        endpoint: endpoint.to_string(),
        status,
        body: String::from_utf8_lossy(&body).trim().to_string(),
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> OffbuildResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| OffbuildError::io(format!("marking {} executable", path.display()), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> OffbuildResult<()> {
    Ok(())
}

/// Everything one client run needs
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Base URL of the build server
    pub server_url: String,

    /// Package path to build, as given on the command line
    pub package: String,

    /// Where to write the artifact
    pub output: PathBuf,

    /// Toolchain flags, passed through verbatim
    pub flags: Vec<String>,
}

/// What a successful run did
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub id: BuildId,
    pub packages: usize,
    pub uploaded: usize,
    pub bytes: u64,
}

/// Resolve, begin, upload what is missing, and fetch the artifact
pub fn run_build(
    options: &BuildOptions,
    importer: &dyn PackageImporter,
    ui: &UiContext,
) -> OffbuildResult<BuildSummary> {
    let client = BuildClient::new(&options.server_url);

    let env = client.environment()?;
    info!(
        "Server builds for {}/{} with {}",
        env.os, env.arch, env.toolchain_version
    );

    let manifest = ManifestBuilder::new(importer, Platform::from(&env))
        .build(&options.package, options.flags.clone())?;

    let begun = client.begin(&manifest.request)?;
    let missing: usize = begun.missing.iter().map(|p| p.files.len()).sum();
    info!(
        build_id = %begun.id,
        "Server is missing {} file(s) in {} package(s)",
        missing,
        begun.missing.len()
    );

    let mut progress = UploadProgress::new(ui, missing as u64);
    for pkg in &begun.missing {
        for file in &pkg.files {
            let path = manifest.sources.path(&file.hash).ok_or_else(|| {
                OffbuildError::Protocol {
                    endpoint: routes::BEGIN.to_string(),
                    status: 200,
                    body: format!("server asked for unknown file {}/{}", pkg.name, file.name),
                }
            })?;

            progress.start_file(&file.name);
            if let Err(e) = client.upload(&file.hash, path) {
                progress.finish();
                return Err(e);
            }
            progress.file_done();
        }
    }
    progress.finish();

    let bytes = client.fetch(&begun.id, &options.output)?;
    info!(bytes, "Wrote {}", options.output.display());

    Ok(BuildSummary {
        id: begun.id,
        packages: manifest.request.packages.len(),
        uploaded: missing,
        bytes,
    })
}
