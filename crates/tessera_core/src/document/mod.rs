//! The decoded property tree.
//!
//! Plain serde mirrors of the glTF JSON objects. Cross-references are kept as
//! integer indices; nothing is resolved here. The [`Linker`](crate::link::Linker)
//! validates and materializes them once the whole tree is known.

mod animation;
mod geometry;
mod material;
mod scene;

pub use animation::{Animation, AnimationSampler, Channel, ChannelTarget};
pub use geometry::{Accessor, Buffer, BufferView, Mesh, Primitive};
pub use material::{Image, Material, PbrMetallicRoughness, Sampler, Texture, TextureInfo, TextureSlot};
pub use scene::{Camera, Node, Orthographic, Perspective, Scene, Skin};

use serde::Deserialize;
use serde_json::Value;

use crate::extension::{ExtensionBag, Extras};
use crate::property::{impl_property, NodeRef, Property};

/// Asset metadata.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub version: String,
    pub min_version: Option<String>,
    pub generator: Option<String>,
    pub copyright: Option<String>,
}

impl Default for Asset {
    fn default() -> Self {
        Self {
            version: "2.0".to_string(),
            min_version: None,
            generator: None,
            copyright: None,
        }
    }
}

/// Root of the property tree.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub asset: Asset,
    /// Default scene index
    pub scene: Option<usize>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub accessors: Vec<Accessor>,
    #[serde(default)]
    pub buffer_views: Vec<BufferView>,
    #[serde(default)]
    pub buffers: Vec<Buffer>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub textures: Vec<Texture>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub samplers: Vec<Sampler>,
    #[serde(default)]
    pub animations: Vec<Animation>,
    #[serde(default)]
    pub skins: Vec<Skin>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub extensions_used: Vec<String>,
    #[serde(default)]
    pub extensions_required: Vec<String>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

impl_property!(Document);

impl Document {
    /// Deserialize a document from an already-parsed JSON tree.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Parse and deserialize a document from JSON text.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Index of the scene to show by default.
    pub fn default_scene(&self) -> Option<usize> {
        self.scene.or_else(|| (!self.scenes.is_empty()).then_some(0))
    }

    /// Look up the property behind a node identity.
    pub fn property(&self, node: NodeRef) -> Option<&dyn Property> {
        let property: &dyn Property = match node {
            NodeRef::Document => self,
            NodeRef::Scene(i) => self.scenes.get(i)?,
            NodeRef::Node(i) => self.nodes.get(i)?,
            NodeRef::Mesh(i) => self.meshes.get(i)?,
            NodeRef::Primitive { mesh, primitive } => self.meshes.get(mesh)?.primitives.get(primitive)?,
            NodeRef::Accessor(i) => self.accessors.get(i)?,
            NodeRef::BufferView(i) => self.buffer_views.get(i)?,
            NodeRef::Buffer(i) => self.buffers.get(i)?,
            NodeRef::Material(i) => self.materials.get(i)?,
            NodeRef::MaterialTexture { material, slot } => self.materials.get(material)?.texture(slot)?,
            NodeRef::Texture(i) => self.textures.get(i)?,
            NodeRef::Image(i) => self.images.get(i)?,
            NodeRef::Sampler(i) => self.samplers.get(i)?,
            NodeRef::Animation(i) => self.animations.get(i)?,
            NodeRef::Channel { animation, channel } => self.animations.get(animation)?.channels.get(channel)?,
            NodeRef::AnimationSampler { animation, sampler } => {
                self.animations.get(animation)?.samplers.get(sampler)?
            }
            NodeRef::Skin(i) => self.skins.get(i)?,
            NodeRef::Camera(i) => self.cameras.get(i)?,
        };
        Some(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document() {
        let document = Document::from_value(json!({ "asset": { "version": "2.0" } })).unwrap();
        assert_eq!(document.asset.version, "2.0");
        assert!(document.nodes.is_empty());
        assert_eq!(document.default_scene(), None);
    }

    #[test]
    fn test_defaults_are_applied() {
        let document = Document::from_value(json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "name": "root" }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
            "materials": [{}],
            "samplers": [{}],
            "buffers": [{ "byteLength": 4 }],
            "bufferViews": [{ "buffer": 0, "byteLength": 4 }],
        }))
        .unwrap();

        assert_eq!(document.default_scene(), Some(0));
        assert_eq!(document.meshes[0].primitives[0].mode, 4);
        assert_eq!(document.materials[0].alpha_mode, "OPAQUE");
        assert_eq!(document.materials[0].alpha_cutoff, 0.5);
        assert_eq!(document.samplers[0].wrap_s, 10497);
        assert_eq!(document.buffer_views[0].byte_offset, 0);
    }

    #[test]
    fn test_property_lookup() {
        let document = Document::from_value(json!({
            "asset": { "version": "2.0" },
            "nodes": [{ "extensions": { "VENDOR_tag": { "id": 7 } }, "extras": { "note": "hi" } }],
            "materials": [{
                "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } }
            }],
        }))
        .unwrap();

        let node = document.property(NodeRef::Node(0)).unwrap();
        assert_eq!(node.extensions().map(ExtensionBag::len), Some(1));
        assert_eq!(node.extras(), Some(&json!({ "note": "hi" })));

        let slot = NodeRef::MaterialTexture {
            material: 0,
            slot: TextureSlot::BaseColor,
        };
        assert!(document.property(slot).is_some());
        let missing = NodeRef::MaterialTexture {
            material: 0,
            slot: TextureSlot::Normal,
        };
        assert!(document.property(missing).is_none());
        assert!(document.property(NodeRef::Node(3)).is_none());
    }

    #[test]
    fn test_rejects_wrong_field_types() {
        let result = Document::from_value(json!({ "nodes": [{ "children": "zero" }] }));
        assert!(result.is_err());
    }
}
