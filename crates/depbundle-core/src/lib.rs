//! depbundle core: transitive native-dependency resolution.
//!
//! Given an executable or shared library, computes every other shared
//! library or framework it needs at load time (directly or indirectly) that
//! is not already present on a clean target machine, so those files can be
//! shipped alongside it.
//!
//! # Architecture
//!
//! - **Introspectors** ([`introspect`]) list the raw dependency declarations
//!   recorded inside one binary by shelling out to `otool` or `objdump`.
//! - **Resolution** ([`resolve`]) maps a declaration onto an absolute path
//!   using ordered search directories.
//! - **Classification** ([`classify`]) separates system libraries from
//!   bundleable ones and collapses framework bundles to one node.
//! - **Closure** ([`closure`]) drives the three over an explicit frontier
//!   and visited set.
//! - **Bundling** ([`bundler`]) copies the result into an output directory.

pub mod bundler;
pub mod classify;
pub mod closure;
pub mod config;
pub mod error;
pub mod format;
pub mod introspect;
pub mod process;
pub mod resolve;

pub use bundler::{BundleReport, Bundler, Compressor};
pub use classify::{Classification, Classifier, NodeKey};
pub use closure::{Closure, compute_closure, compute_closure_with};
pub use config::{Blacklist, BundleConfig, ConfigFile, Traversal};
pub use error::ClosureError;
pub use format::{BinaryFormat, Platform};
pub use introspect::{Introspector, ObjdumpIntrospector, OtoolIntrospector, introspector_for};
