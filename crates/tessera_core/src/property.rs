//! The contract every decoded document node satisfies.
//!
//! A [`Property`] carries an optional extension bag and optional extras, and
//! receives [`Property::on_post_link`] once the whole document is linked.
//! The default hook forwards to every extension value that is itself a
//! property, which makes extension dispatch recursive without the core
//! knowing extension types up front.

use std::fmt;

use thiserror::Error;

use crate::buffer::ReadError;
use crate::dispatch::LinkContext;
use crate::document::TextureSlot;
use crate::extension::{ExtensionBag, Extras};
use crate::media::MediaError;
use crate::registry::FormatError;

/// Identity of a node in the document graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    Document,
    Scene(usize),
    Node(usize),
    Mesh(usize),
    Primitive { mesh: usize, primitive: usize },
    Accessor(usize),
    BufferView(usize),
    Buffer(usize),
    Material(usize),
    MaterialTexture { material: usize, slot: TextureSlot },
    Texture(usize),
    Image(usize),
    Sampler(usize),
    Animation(usize),
    Channel { animation: usize, channel: usize },
    AnimationSampler { animation: usize, sampler: usize },
    Skin(usize),
    Camera(usize),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Document => write!(f, "document"),
            NodeRef::Scene(i) => write!(f, "scenes[{}]", i),
            NodeRef::Node(i) => write!(f, "nodes[{}]", i),
            NodeRef::Mesh(i) => write!(f, "meshes[{}]", i),
            NodeRef::Primitive { mesh, primitive } => {
                write!(f, "meshes[{}].primitives[{}]", mesh, primitive)
            }
            NodeRef::Accessor(i) => write!(f, "accessors[{}]", i),
            NodeRef::BufferView(i) => write!(f, "bufferViews[{}]", i),
            NodeRef::Buffer(i) => write!(f, "buffers[{}]", i),
            NodeRef::Material(i) => write!(f, "materials[{}]", i),
            NodeRef::MaterialTexture { material, slot } => {
                write!(f, "materials[{}].{}", material, slot.field_name())
            }
            NodeRef::Texture(i) => write!(f, "textures[{}]", i),
            NodeRef::Image(i) => write!(f, "images[{}]", i),
            NodeRef::Sampler(i) => write!(f, "samplers[{}]", i),
            NodeRef::Animation(i) => write!(f, "animations[{}]", i),
            NodeRef::Channel { animation, channel } => {
                write!(f, "animations[{}].channels[{}]", animation, channel)
            }
            NodeRef::AnimationSampler { animation, sampler } => {
                write!(f, "animations[{}].samplers[{}]", animation, sampler)
            }
            NodeRef::Skin(i) => write!(f, "skins[{}]", i),
            NodeRef::Camera(i) => write!(f, "cameras[{}]", i),
        }
    }
}

/// Errors a post-link hook can report. They are recorded per node and never
/// stop the rest of the dispatch.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("Malformed {name} extension: {reason}")]
    MalformedExtension { name: String, reason: String },

    #[error("{extension} does not apply to {target}")]
    Misplaced {
        extension: &'static str,
        target: NodeRef,
    },

    #[error("{target} references missing {field} {index}")]
    DanglingReference {
        target: NodeRef,
        field: &'static str,
        index: usize,
    },

    #[error("{0} has no materialized object")]
    MissingObject(NodeRef),

    #[error("{hook} hook cannot run for {target}")]
    WrongTarget { hook: &'static str, target: NodeRef },

    #[error("{0} has no image or video source")]
    MissingSource(NodeRef),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

/// Result type for post-link hooks.
pub type HookResult<T> = Result<T, HookError>;

/// A decoded document node that can carry extensions and extras.
pub trait Property {
    /// Extension payloads keyed by extension name.
    fn extensions(&self) -> Option<&ExtensionBag>;

    /// Application-specific data.
    fn extras(&self) -> Option<&Extras>;

    /// Called once per node after the whole document is linked.
    ///
    /// `target` identifies the node the hook runs for; extension hooks
    /// receive their owner's identity. The default forwards to extensions.
    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        dispatch_extensions(self.extensions(), target, ctx);
        Ok(())
    }
}

/// Run the hook of every extension in `bag` that is itself a property.
///
/// Failures are recorded on the context under the extension's name, so one
/// broken extension does not stop its siblings. Unrecognized extensions are
/// skipped.
pub fn dispatch_extensions(bag: Option<&ExtensionBag>, target: NodeRef, ctx: &mut LinkContext<'_>) {
    let Some(bag) = bag else {
        return;
    };

    for (name, extension) in bag.iter() {
        match extension.as_property() {
            Some(property) => {
                if let Err(error) = property.on_post_link(target, ctx) {
                    ctx.record_failure(target, Some(name.as_str()), error);
                }
            }
            None => log::debug!("Ignoring unrecognized extension {} on {}", name, target),
        }
    }
}

/// Implement [`Property`] with the default hook for types that have
/// `extensions` and `extras` fields.
macro_rules! impl_property {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::property::Property for $ty {
            fn extensions(&self) -> Option<&$crate::extension::ExtensionBag> {
                self.extensions.as_ref()
            }

            fn extras(&self) -> Option<&$crate::extension::Extras> {
                self.extras.as_ref()
            }
        }
    )*};
}

pub(crate) use impl_property;
