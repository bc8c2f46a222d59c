//! Wire types shared by the client and the server
//!
//! Field names follow the established JSON format (`Name`, `Hash`,
//! `PackageName`, ...), so payloads stay compatible across implementations.

use crate::cache::ContentHash;
use crate::error::{OffbuildError, OffbuildResult};
use crate::session::BuildId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path};

/// Status code reserved for "your source failed to build"
pub const COMPILE_FAILED_STATUS: u16 = 412;

/// HTTP routes of the build protocol
pub mod routes {
    pub const BEGIN: &str = "/begin";
    pub const UPLOAD: &str = "/upload";
    pub const BUILD: &str = "/build";
    pub const VERSION: &str = "/version";
}

/// A single source file, identified by name within its package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct File {
    pub name: String,
    pub hash: ContentHash,
}

/// A package (import path) and the files it consists of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub files: Vec<File>,
}

/// The build manifest: everything the server needs to perform one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildRequest {
    /// Import path of the package to build
    pub package_name: String,

    /// Transitive non-stdlib packages, in resolution order
    #[serde(default)]
    pub packages: Vec<Package>,

    /// Toolchain flags, passed through verbatim
    #[serde(default)]
    pub flags: Vec<String>,
}

impl BuildRequest {
    /// Reject manifests that could address paths outside a build tree.
    ///
    /// Package names must be relative paths made of normal components, file
    /// names must be single path components, and file names must be unique
    /// within their package.
    pub fn validate(&self) -> OffbuildResult<()> {
        if self.package_name.is_empty() {
            return Err(OffbuildError::InvalidManifest(
                "empty target package name".to_string(),
            ));
        }

        // Directories the tree will contain: every package and its ancestors.
        let mut packages = HashSet::new();
        let mut dirs = HashSet::new();
        for pkg in &self.packages {
            if !is_relative_import_path(&pkg.name) {
                return Err(OffbuildError::InvalidManifest(format!(
                    "bad package name {:?}",
                    pkg.name
                )));
            }

            let key = tree_path(&pkg.name);
            if !packages.insert(key.clone()) {
                return Err(OffbuildError::InvalidManifest(format!(
                    "duplicate package {}",
                    pkg.name
                )));
            }
            let mut prefix = String::new();
            for segment in key.split('/') {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(segment);
                dirs.insert(prefix.clone());
            }
        }

        for pkg in &self.packages {

            let mut seen = HashSet::new();
            for file in &pkg.files {
                if !is_plain_file_name(&file.name) {
                    return Err(OffbuildError::InvalidManifest(format!(
                        "bad file name {:?} in package {}",
                        file.name, pkg.name
                    )));
                }
                if !seen.insert(file.name.as_str()) {
                    return Err(OffbuildError::InvalidManifest(format!(
                        "duplicate file {} in package {}",
                        file.name, pkg.name
                    )));
                }
                if dirs.contains(&format!("{}/{}", tree_path(&pkg.name), file.name)) {
                    return Err(OffbuildError::InvalidManifest(format!(
                        "file {} in package {} collides with a package directory",
                        file.name, pkg.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Total number of files across all packages
    pub fn file_count(&self) -> usize {
        self.packages.iter().map(|p| p.files.len()).sum()
    }
}

/// Reply to `begin`: the new build id and the files the cache lacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginResponse {
    #[serde(rename = "ID")]
    pub id: BuildId,

    #[serde(rename = "Missing", default, deserialize_with = "null_as_empty")]
    pub missing: Vec<Package>,
}

/// Target platform and toolchain of the build server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(rename = "GOOS")]
    pub os: String,

    #[serde(rename = "GOARCH")]
    pub arch: String,

    #[serde(rename = "Version")]
    pub toolchain_version: String,
}

fn is_relative_import_path(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('\\')
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Slash-joined normal components, so `a//b` and `a/./b` name the same directory
fn tree_path(name: &str) -> String {
    Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    !name.contains(['/', '\\'])
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}

// Older servers encode an empty missing list as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Package>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Package>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::of_bytes(&[byte])
    }

    fn request(packages: Vec<Package>) -> BuildRequest {
        BuildRequest {
            package_name: "hello".to_string(),
            packages,
            flags: vec![],
        }
    }

    fn package(name: &str, files: &[&str]) -> Package {
        Package {
            name: name.to_string(),
            files: files
                .iter()
                .enumerate()
                .map(|(i, f)| File {
                    name: f.to_string(),
                    hash: hash(i as u8),
                })
                .collect(),
        }
    }

    #[test]
    fn build_request_wire_names() {
        let req = BuildRequest {
            package_name: "hello".to_string(),
            packages: vec![package("hello", &["main.go"])],
            flags: vec!["-race".to_string()],
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["PackageName"], "hello");
        assert_eq!(json["Packages"][0]["Name"], "hello");
        assert_eq!(json["Packages"][0]["Files"][0]["Name"], "main.go");
        assert_eq!(json["Packages"][0]["Files"][0]["Hash"], hash(0).as_str());
        assert_eq!(json["Flags"][0], "-race");
    }

    #[test]
    fn begin_response_accepts_null_missing() {
        let id = BuildId::generate();
        let json = format!(r#"{{"ID":"{}","Missing":null}}"#, id);
        let resp: BeginResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp.id, id);
        assert!(resp.missing.is_empty());
    }

    #[test]
    fn request_without_flags_decodes() {
        let json = r#"{"PackageName":"hello","Packages":[]}"#;
        let req: BuildRequest = serde_json::from_str(json).unwrap();
        assert!(req.flags.is_empty());
    }

    #[test]
    fn environment_wire_names() {
        let env = Environment {
            os: "linux".into(),
            arch: "amd64".into(),
            toolchain_version: "go1.22.1".into(),
        };
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"GOOS":"linux","GOARCH":"amd64","Version":"go1.22.1"}"#);
    }

    #[test]
    fn validate_accepts_nested_import_paths() {
        let req = request(vec![
            package("github.com/user/lib", &["lib.go", "lib_linux.go"]),
            package("hello", &["main.go"]),
        ]);
        assert!(req.validate().is_ok());
        assert_eq!(req.file_count(), 3);
    }

    #[test]
    fn validate_rejects_escaping_names() {
        for name in ["../evil", "/abs/path", "a/../../b", "", "a\\b"] {
            let req = request(vec![package(name, &["main.go"])]);
            assert!(req.validate().is_err(), "package name {name:?} accepted");
        }

        for file in ["../main.go", "dir/main.go", "..", ".", ""] {
            let req = request(vec![package("hello", &[file])]);
            assert!(req.validate().is_err(), "file name {file:?} accepted");
        }
    }

    #[test]
    fn validate_rejects_duplicate_files() {
        let req = request(vec![package("hello", &["main.go", "main.go"])]);
        assert!(matches!(
            req.validate(),
            Err(OffbuildError::InvalidManifest(_))
        ));
    }

    #[test]
    fn validate_rejects_duplicate_packages() {
        let req = request(vec![
            package("hello", &["main.go"]),
            package("hello", &["main.go"]),
        ]);
        assert!(matches!(
            req.validate(),
            Err(OffbuildError::InvalidManifest(_))
        ));

        let req = request(vec![
            package("example.com/lib", &["lib.go"]),
            package("example.com//lib/", &["other.go"]),
        ]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_file_shadowing_package_dir() {
        let req = request(vec![
            package("example.com", &["lib"]),
            package("example.com/lib", &["lib.go"]),
        ]);
        assert!(req.validate().is_err());

        let req = request(vec![
            package("example.com", &["net"]),
            package("example.com/net/http", &["http.go"]),
        ]);
        assert!(req.validate().is_err());

        // A parent package next to its child is fine.
        let req = request(vec![
            package("example.com", &["root.go"]),
            package("example.com/lib", &["lib.go"]),
        ]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_target() {
        let mut req = request(vec![]);
        req.package_name.clear();
        assert!(req.validate().is_err());
    }
}
