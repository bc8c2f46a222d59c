//! Build client: dependency resolution, manifest construction and the
//! three-phase build protocol

pub mod importer;
pub mod manifest;
pub mod protocol;

pub use importer::{GoListImporter, PackageImporter, Platform, ResolvedPackage};
pub use manifest::{Manifest, ManifestBuilder, SourceIndex};
pub use protocol::{run_build, BuildClient, BuildOptions, BuildSummary};
