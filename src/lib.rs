//! BundleMaster diffs two builds of a Unity asset bundle tree, derives a
//! remap table between their identifiers, and patches other bundles with it.

pub mod batch;
pub mod cli;
pub mod generator;
pub mod identity;
pub mod patcher;
pub mod remap;
pub mod report;
pub mod scratch;
pub mod settings;

mod path_serializer;

pub use bundle_codec;
