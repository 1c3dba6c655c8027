//! Tessera Core - glTF 2.0 decoding and linking.
//!
//! This crate provides:
//!
//! - **Document model**: serde types for the glTF JSON tree, each with
//!   extensions, extras and a post-link hook
//! - **Format registry**: numeric codes and names mapped to typed enums
//! - **Linking**: reference validation, cycle detection and materialization
//!   of geometry, materials, textures, animations, skins and cameras
//! - **Post-link dispatch**: every node's hook runs once, children first
//! - **Media**: image decoding and video handles, cached per image
//!
//! # Example
//!
//! ```ignore
//! use tessera_core::{import_value, Blobs, ImportOptions};
//!
//! let blobs = Blobs::new().with_buffer(std::fs::read("scene.bin")?);
//! let value = serde_json::from_slice(&std::fs::read("scene.gltf")?)?;
//! let import = import_value(value, &blobs, &ImportOptions::default())?;
//! println!("Loaded {} geometries, {} hook failures",
//!     import.scene.geometries.len(),
//!     import.report.failures.len());
//! ```

pub mod buffer;
pub mod dispatch;
pub mod document;
pub mod extension;
pub mod import;
pub mod layout;
pub mod link;
pub mod media;
pub mod mesh;
pub mod property;
pub mod registry;
pub mod scene;

// Re-export commonly used types
pub use buffer::{Blobs, ReadError};
pub use dispatch::{HookFailure, LinkContext, PostLinkDispatcher};
pub use document::Document;
pub use extension::{Extension, ExtensionBag};
pub use import::{import, import_value, Import, ImportError, ImportOptions, ImportReport};
pub use link::{Diagnostic, LinkError, Linker};
pub use media::{DisplayHandle, MediaKind, MediaOptions, MediaResolver};
pub use mesh::{Bounds, MeshData};
pub use property::{HookError, NodeRef, Property};
pub use scene::{Scene, Transform};
