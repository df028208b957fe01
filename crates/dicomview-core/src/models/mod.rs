//! Data models for DICOM study manifests.
//!
//! A manifest describes one study and its series, each series listing the
//! instances (slices) the viewer can display.

pub mod study;

pub use study::{Instance, Series, StudyInfo, StudyManifest};
