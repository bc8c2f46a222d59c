//! Manifest construction
//!
//! Walks the import graph of a root package depth-first, dependencies
//! before dependents, resolving every package once. Standard-library
//! packages and the cgo pseudo-import are not descended into. Every file of
//! every remaining package is hashed; the resulting [`SourceIndex`] remembers
//! where each hash came from so missing files can be uploaded later.

use crate::cache::{hash_file, ContentHash};
use crate::client::importer::{PackageImporter, Platform, ResolvedPackage, CGO_PSEUDO_IMPORT};
use crate::error::OffbuildResult;
use crate::model::{BuildRequest, File, Package};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Local path of every hashed file, keyed by content hash
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    paths: HashMap<ContentHash, PathBuf>,
}

impl SourceIndex {
    pub fn insert(&mut self, hash: ContentHash, path: PathBuf) {
        self.paths.entry(hash).or_insert(path);
    }

    /// Path of a file with the given content
    pub fn path(&self, hash: &ContentHash) -> Option<&Path> {
        self.paths.get(hash).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A manifest and the local files it was built from
#[derive(Debug, Clone)]
pub struct Manifest {
    pub request: BuildRequest,
    pub sources: SourceIndex,
}

/// Builds manifests by resolving packages through an importer
pub struct ManifestBuilder<'a> {
    importer: &'a dyn PackageImporter,
    platform: Platform,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(importer: &'a dyn PackageImporter, platform: Platform) -> Self {
        Self { importer, platform }
    }

    /// Resolve `root` and its transitive dependencies into a manifest.
    ///
    /// Any resolution or hashing failure aborts the whole walk.
    pub fn build(&self, root: &str, flags: Vec<String>) -> OffbuildResult<Manifest> {
        let mut visited = HashSet::new();
        let mut packages = Vec::new();
        let mut sources = SourceIndex::default();

        let target = self.visit(root, &mut visited, &mut packages, &mut sources)?;

        info!(
            target = %target,
            packages = packages.len(),
            files = sources.len(),
            "Resolved build manifest"
        );

        Ok(Manifest {
            request: BuildRequest {
                package_name: target,
                packages,
                flags,
            },
            sources,
        })
    }

    /// Resolve one package and, first, its unvisited imports. Returns the
    /// package's import path.
    fn visit(
        &self,
        path: &str,
        visited: &mut HashSet<String>,
        packages: &mut Vec<Package>,
        sources: &mut SourceIndex,
    ) -> OffbuildResult<String> {
        let resolved = self.importer.import(path, &self.platform)?;
        visited.insert(path.to_string());
        visited.insert(resolved.import_path.clone());

        if resolved.standard {
            debug!("Skipping standard library package {}", resolved.import_path);
            return Ok(resolved.import_path);
        }

        for dep in &resolved.imports {
            if dep == CGO_PSEUDO_IMPORT || visited.contains(dep) {
                continue;
            }
            self.visit(dep, visited, packages, sources)?;
        }

        packages.push(hash_package(&resolved, sources)?);
        Ok(resolved.import_path)
    }
}

fn hash_package(resolved: &ResolvedPackage, sources: &mut SourceIndex) -> OffbuildResult<Package> {
    let mut files = Vec::with_capacity(resolved.files.len());
    for name in &resolved.files {
        let path = resolved.dir.join(name);
        let hash = hash_file(&path)?;
        sources.insert(hash.clone(), path);
        files.push(File {
            name: name.clone(),
            hash,
        });
    }

    debug!(files = files.len(), "Hashed package {}", resolved.import_path);
    Ok(Package {
        name: resolved.import_path.clone(),
        files,
    })
}
