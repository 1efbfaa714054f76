//! Webcamoid Windows deploy library.
//!
//! This crate turns a MinGW cross-compiled Webcamoid build into a
//! self-contained Windows application tree and packages it as a portable
//! zip and, when the Qt Installer Framework is available, an installer. It
//! is used by the `webcamoid-deploy` CLI binary and can be driven
//! programmatically for testing.
//!
//! # Modules
//!
//! - [`build_info`] - Build provenance record written into the package
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - TOML deploy configuration
//! - [`error`] - Semantic error types
//! - [`exec`] - External command execution abstraction
//! - [`installer`] - Qt Installer Framework inputs and generation
//! - [`launcher`] - `qt.conf` and batch launcher generation
//! - [`layout`] - Staging tree layout and target architecture
//! - [`package`] - Package artefacts and the portable archive
//! - [`pecoff`] - PE import scanning and dependency resolution
//! - [`pipeline`] - Deploy orchestration
//! - [`plugins`] - Qt plugin selection
//! - [`project`] - Project version and `make install`
//! - [`provenance`] - Host package-manager lookups
//! - [`qml`] - QML module discovery and copying
//! - [`qt`] - qmake and Qt Installer Framework detection
//! - [`staging`] - Filesystem operations on the staging tree
//! - [`strip`] - Symbol stripping of staged binaries
//! - [`summary`] - Console summaries of finished packages

pub mod build_info;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod installer;
pub mod launcher;
pub mod layout;
pub mod package;
pub mod pecoff;
pub mod pipeline;
pub mod plugins;
pub mod project;
pub mod provenance;
pub mod qml;
pub mod qt;
pub mod staging;
pub mod strip;
pub mod summary;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
