//! Linking: reference validation and scene materialization.
//!
//! Linking runs in three passes over a fully decoded [`Document`]:
//!
//! 1. Every cross-reference index is checked. The first dangling one aborts
//!    the import before anything is materialized or any hook runs.
//! 2. The node hierarchy is checked for cycles and parent links are built.
//! 3. Geometry, materials, textures, animations, skins and cameras are
//!    materialized through the format registry and the element layout rules.
//!
//! Format problems found in pass 3 reject only the object they belong to.
//! In strict mode they abort instead. Unknown attribute names and
//! unsupported animation paths are always skipped with a diagnostic.

use std::collections::BTreeMap;
use std::fmt;

use glam::{Mat4, Quat, Vec3, Vec4};
use thiserror::Error;

use crate::buffer::{AccessorBinding, Blobs, BufferWindow, ReadError};
use crate::document::{Document, PbrMetallicRoughness};
use crate::extension::SUPPORTED_EXTENSIONS;
use crate::import::ImportOptions;
use crate::layout::{resolve_element, AccessorUsage, ElementLayout};
use crate::property::NodeRef;
use crate::registry::{self, FormatError, PrimitiveMode, SamplerFilter};
use crate::scene::{
    AnimationChannel, Geometry, GeometryPrimitive, Projection, SamplerSettings, Scene, SceneAnimation, SceneCamera,
    SceneMaterial, SceneNode, SceneSkin, SceneTexture, TextureBinding, TopologyResolution, Transform,
};

/// Errors that abort linking.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("{from} references missing {field} {index}")]
    DanglingReference {
        from: NodeRef,
        field: &'static str,
        index: usize,
    },

    #[error("Node hierarchy contains a cycle through nodes[{0}]")]
    CyclicHierarchy(usize),

    #[error("accessors[{accessor}] ends at byte {end} of a {len}-byte buffer view")]
    BufferOverrun { accessor: usize, end: usize, len: usize },

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Format error at {node}: {error}")]
    Format { node: NodeRef, error: FormatError },
}

/// Result type for linking.
pub type LinkResult<T> = Result<T, LinkError>;

/// A non-fatal condition found while linking.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// The object was skipped and left empty in the scene
    Rejected { node: NodeRef, error: FormatError },
    /// Vertex attribute name outside the registry
    UnknownAttribute { node: NodeRef, name: String },
    /// A second texcoord set the consumer cannot hold
    TexcoordCollapse { node: NodeRef, set: u32 },
    /// Primitive must go through index expansion before use
    RequiresExpansion { node: NodeRef, mode: PrimitiveMode },
    /// `extensionsRequired` lists an extension without a known payload
    UnsupportedRequiredExtension(String),
}

impl Diagnostic {
    pub fn node(&self) -> Option<NodeRef> {
        match self {
            Diagnostic::Rejected { node, .. }
            | Diagnostic::UnknownAttribute { node, .. }
            | Diagnostic::TexcoordCollapse { node, .. }
            | Diagnostic::RequiresExpansion { node, .. } => Some(*node),
            Diagnostic::UnsupportedRequiredExtension(_) => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Rejected { node, error } => write!(f, "{} skipped: {}", node, error),
            Diagnostic::UnknownAttribute { node, name } => {
                write!(f, "{} has unknown attribute {}", node, name)
            }
            Diagnostic::TexcoordCollapse { node, set } => {
                write!(f, "{} uses texcoord set {} which cannot be stored separately", node, set)
            }
            Diagnostic::RequiresExpansion { node, mode } => {
                write!(f, "{} uses {:?} and requires index expansion", node, mode)
            }
            Diagnostic::UnsupportedRequiredExtension(name) => {
                write!(f, "Required extension {} is not supported", name)
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Validates a document and materializes its scene.
pub struct Linker<'a> {
    document: &'a Document,
    blobs: &'a Blobs,
    options: &'a ImportOptions,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Linker<'a> {
    pub fn new(document: &'a Document, blobs: &'a Blobs, options: &'a ImportOptions) -> Self {
        Self {
            document,
            blobs,
            options,
            diagnostics: Vec::new(),
        }
    }

    /// Run all passes and return the scene with its diagnostics.
    pub fn link(mut self) -> LinkResult<(Scene, Vec<Diagnostic>)> {
        self.validate_references()?;
        let parents = self.node_parents()?;
        self.check_required_extensions();

        let doc = self.document;
        let mut scene = Scene {
            images: vec![None; doc.images.len()],
            scenes: doc.scenes.iter().map(|s| s.nodes.clone()).collect(),
            default_scene: doc.default_scene(),
            ..Default::default()
        };

        scene.nodes = doc
            .nodes
            .iter()
            .zip(parents)
            .map(|(node, parents)| SceneNode {
                name: node.name.clone(),
                transform: node_transform(node),
                parents,
                children: node.children.clone(),
                mesh: node.mesh,
                skin: node.skin,
                camera: node.camera,
                light: None,
                weights: node.weights.clone(),
                extras: node.extras.clone(),
            })
            .collect();

        for mesh in 0..doc.meshes.len() {
            let geometry = self.link_mesh(mesh)?;
            scene.geometries.push(geometry);
        }
        for material in 0..doc.materials.len() {
            let material = self.link_material(material)?;
            scene.materials.push(material);
        }
        for texture in 0..doc.textures.len() {
            let texture = self.link_texture(texture)?;
            scene.textures.push(texture);
        }
        for animation in 0..doc.animations.len() {
            let animation = self.link_animation(animation)?;
            scene.animations.push(animation);
        }
        for skin in 0..doc.skins.len() {
            let skin = self.link_skin(skin)?;
            scene.skins.push(skin);
        }
        for camera in 0..doc.cameras.len() {
            let camera = self.link_camera(camera)?;
            scene.cameras.push(camera);
        }

        log::debug!(
            "Linked {} nodes, {} geometries, {} materials ({} diagnostics)",
            scene.nodes.len(),
            scene.geometries.len(),
            scene.materials.len(),
            self.diagnostics.len()
        );

        Ok((scene, self.diagnostics))
    }

    // ========================================================================
    // Pass 1: references
    // ========================================================================

    /// Check every cross-reference index in the document.
    pub fn validate_references(&self) -> LinkResult<()> {
        let doc = self.document;
        let nodes = doc.nodes.len();
        let accessors = doc.accessors.len();
        let views = doc.buffer_views.len();

        if let Some(scene) = doc.scene {
            check(NodeRef::Document, "scene", scene, doc.scenes.len())?;
        }
        for (i, scene) in doc.scenes.iter().enumerate() {
            for &node in &scene.nodes {
                check(NodeRef::Scene(i), "nodes", node, nodes)?;
            }
        }

        for (i, node) in doc.nodes.iter().enumerate() {
            let from = NodeRef::Node(i);
            for &child in &node.children {
                check(from, "children", child, nodes)?;
            }
            check_opt(from, "mesh", node.mesh, doc.meshes.len())?;
            check_opt(from, "skin", node.skin, doc.skins.len())?;
            check_opt(from, "camera", node.camera, doc.cameras.len())?;
        }

        for (m, mesh) in doc.meshes.iter().enumerate() {
            for (p, primitive) in mesh.primitives.iter().enumerate() {
                let from = NodeRef::Primitive { mesh: m, primitive: p };
                for &accessor in primitive.attributes.values() {
                    check(from, "attributes", accessor, accessors)?;
                }
                for target in &primitive.targets {
                    for &accessor in target.values() {
                        check(from, "targets", accessor, accessors)?;
                    }
                }
                check_opt(from, "indices", primitive.indices, accessors)?;
                check_opt(from, "material", primitive.material, doc.materials.len())?;
            }
        }

        for (i, accessor) in doc.accessors.iter().enumerate() {
            check_opt(NodeRef::Accessor(i), "bufferView", accessor.buffer_view, views)?;
        }
        for (i, view) in doc.buffer_views.iter().enumerate() {
            check(NodeRef::BufferView(i), "buffer", view.buffer, doc.buffers.len())?;
        }

        for (i, material) in doc.materials.iter().enumerate() {
            for (slot, info) in material.textures() {
                let from = NodeRef::MaterialTexture { material: i, slot };
                check(from, "index", info.index, doc.textures.len())?;
            }
        }
        for (i, texture) in doc.textures.iter().enumerate() {
            let from = NodeRef::Texture(i);
            check_opt(from, "source", texture.source, doc.images.len())?;
            check_opt(from, "sampler", texture.sampler, doc.samplers.len())?;
        }
        for (i, image) in doc.images.iter().enumerate() {
            check_opt(NodeRef::Image(i), "bufferView", image.buffer_view, views)?;
        }

        for (a, animation) in doc.animations.iter().enumerate() {
            for (c, channel) in animation.channels.iter().enumerate() {
                let from = NodeRef::Channel { animation: a, channel: c };
                check(from, "sampler", channel.sampler, animation.samplers.len())?;
                check_opt(from, "target.node", channel.target.node, nodes)?;
            }
            for (s, sampler) in animation.samplers.iter().enumerate() {
                let from = NodeRef::AnimationSampler { animation: a, sampler: s };
                check(from, "input", sampler.input, accessors)?;
                check(from, "output", sampler.output, accessors)?;
            }
        }

        for (i, skin) in doc.skins.iter().enumerate() {
            let from = NodeRef::Skin(i);
            for &joint in &skin.joints {
                check(from, "joints", joint, nodes)?;
            }
            check_opt(from, "skeleton", skin.skeleton, nodes)?;
            check_opt(from, "inverseBindMatrices", skin.inverse_bind_matrices, accessors)?;
        }

        Ok(())
    }

    // ========================================================================
    // Pass 2: hierarchy
    // ========================================================================

    /// Parents of every node. Fails if any node is its own ancestor.
    pub fn node_parents(&self) -> LinkResult<Vec<Vec<usize>>> {
        let nodes = &self.document.nodes;
        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for &child in &node.children {
                if !parents[child].contains(&i) {
                    parents[child].push(i);
                }
            }
        }

        let mut state = vec![Visit::New; nodes.len()];
        for root in 0..nodes.len() {
            if state[root] != Visit::New {
                continue;
            }

            state[root] = Visit::Active;
            let mut stack = vec![(root, 0usize)];
            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                match nodes[node].children.get(*next) {
                    Some(&child) => {
                        *next += 1;
                        match state[child] {
                            Visit::Active => return Err(LinkError::CyclicHierarchy(child)),
                            Visit::New => {
                                state[child] = Visit::Active;
                                stack.push((child, 0));
                            }
                            Visit::Done => {}
                        }
                    }
                    None => {
                        state[node] = Visit::Done;
                        stack.pop();
                    }
                }
            }
        }

        Ok(parents)
    }

    fn check_required_extensions(&mut self) {
        for name in &self.document.extensions_required {
            if !SUPPORTED_EXTENSIONS.contains(&name.as_str()) {
                log::warn!("Required extension {} is not supported", name);
                self.diagnostics
                    .push(Diagnostic::UnsupportedRequiredExtension(name.clone()));
            }
        }
    }

    // ========================================================================
    // Pass 3: materialization
    // ========================================================================

    /// Record a rejected object, or fail in strict mode. Errors other than
    /// format errors always fail.
    fn reject(&mut self, error: LinkError) -> LinkResult<()> {
        match error {
            LinkError::Format { node, error } if !self.options.strict => {
                log::warn!("Skipping {}: {}", node, error);
                self.diagnostics.push(Diagnostic::Rejected { node, error });
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Record a problem that is skipped even in strict mode.
    fn skip(&mut self, node: NodeRef, error: FormatError) {
        log::debug!("Skipping {}: {}", node, error);
        self.diagnostics.push(Diagnostic::Rejected { node, error });
    }

    /// Like [`Linker::reject`] for a lookup result, yielding the value if any.
    fn resolve<T>(&mut self, node: NodeRef, result: Result<T, FormatError>) -> LinkResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) => self.reject(LinkError::Format { node, error }).map(|_| None),
        }
    }

    /// Bind an accessor for one usage, checking its layout and window.
    pub fn bind_accessor(&self, index: usize, usage: AccessorUsage, owner: NodeRef) -> LinkResult<AccessorBinding> {
        let accessor = &self.document.accessors[index];
        let format = |error: FormatError| LinkError::Format { node: owner, error };

        let component_type = registry::component_type(accessor.component_type).map_err(format)?;
        let shape = registry::vector_shape(&accessor.shape).map_err(format)?;
        let layout = resolve_element(component_type, shape, usage).map_err(format)?;

        let window = accessor
            .buffer_view
            .map(|view| self.window(index, view, &layout))
            .transpose()?;

        Ok(AccessorBinding {
            accessor: index,
            layout,
            count: accessor.count,
            normalize: layout.needs_normalization(accessor.normalized),
            window,
        })
    }

    fn try_bind(&mut self, index: usize, usage: AccessorUsage, owner: NodeRef) -> LinkResult<Option<AccessorBinding>> {
        match self.bind_accessor(index, usage, owner) {
            Ok(binding) => Ok(Some(binding)),
            Err(error) => self.reject(error).map(|_| None),
        }
    }

    fn window(&self, index: usize, view_index: usize, layout: &ElementLayout) -> LinkResult<BufferWindow> {
        let accessor = &self.document.accessors[index];
        let view = &self.document.buffer_views[view_index];

        let element_size = layout.byte_size;
        let stride = view.byte_stride.unwrap_or(element_size);
        if stride < element_size {
            return Err(ReadError::InvalidStride { stride, element_size }.into());
        }

        let overrun = |end: usize| LinkError::BufferOverrun {
            accessor: index,
            end,
            len: view.byte_length,
        };

        let window = BufferWindow {
            buffer: view.buffer,
            offset: view
                .byte_offset
                .checked_add(accessor.byte_offset)
                .ok_or_else(|| overrun(usize::MAX))?,
            stride,
            count: accessor.count,
            element_size,
        };

        // Overflowing sizes can never fit the view
        let end = window
            .span()
            .and_then(|span| accessor.byte_offset.checked_add(span))
            .unwrap_or(usize::MAX);
        if end > view.byte_length {
            return Err(overrun(end));
        }

        let blob = self
            .blobs
            .buffer(view.buffer)
            .ok_or(ReadError::MissingBuffer(view.buffer))?;
        let view_end = view.byte_offset.saturating_add(view.byte_length);
        if view_end > blob.len() {
            return Err(ReadError::OutOfBounds {
                what: "buffer",
                start: view.byte_offset,
                end: view_end,
                len: blob.len(),
            }
            .into());
        }

        Ok(window)
    }

    fn link_mesh(&mut self, index: usize) -> LinkResult<Geometry> {
        let doc = self.document;
        let mesh = &doc.meshes[index];
        let mut primitives = Vec::with_capacity(mesh.primitives.len());
        for primitive in 0..mesh.primitives.len() {
            if let Some(linked) = self.link_primitive(index, primitive)? {
                primitives.push(linked);
            }
        }

        let users = (0..doc.nodes.len())
            .filter(|&n| doc.nodes[n].mesh == Some(index))
            .collect();

        Ok(Geometry {
            name: mesh.name.clone(),
            primitives,
            users,
        })
    }

    fn link_primitive(&mut self, mesh: usize, index: usize) -> LinkResult<Option<GeometryPrimitive>> {
        let doc = self.document;
        let primitive = &doc.meshes[mesh].primitives[index];
        let node = NodeRef::Primitive { mesh, primitive: index };

        let Some(mode) = self.resolve(node, registry::primitive_mode(primitive.mode))? else {
            return Ok(None);
        };
        let topology = match mode.direct_topology() {
            Some(topology) => TopologyResolution::Direct(topology),
            None => {
                self.diagnostics.push(Diagnostic::RequiresExpansion { node, mode });
                TopologyResolution::RequiresExpansion(mode)
            }
        };

        let mut sources = Vec::with_capacity(primitive.attributes.len());
        for (name, &accessor) in &primitive.attributes {
            let attribute = match registry::semantic_for(name) {
                Ok(attribute) => attribute,
                Err(_) => {
                    log::debug!("{} has unknown attribute {}", node, name);
                    self.diagnostics.push(Diagnostic::UnknownAttribute {
                        node,
                        name: name.clone(),
                    });
                    continue;
                }
            };
            if attribute.set > 0 && !self.options.multiple_texcoord_sets {
                self.diagnostics
                    .push(Diagnostic::TexcoordCollapse { node, set: attribute.set });
                continue;
            }

            let usage = AccessorUsage::Vertex(attribute.semantic);
            let Some(binding) = self.try_bind(accessor, usage, node)? else {
                return Ok(None);
            };
            sources.push((attribute, binding));
        }

        let elements = match primitive.indices {
            Some(accessor) => match self.try_bind(accessor, AccessorUsage::Index, node)? {
                Some(binding) => Some(binding),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(GeometryPrimitive {
            index,
            sources,
            elements,
            topology,
            material: primitive.material,
        }))
    }

    fn link_material(&mut self, index: usize) -> LinkResult<Option<SceneMaterial>> {
        let doc = self.document;
        let material = &doc.materials[index];
        let node = NodeRef::Material(index);

        let Some(alpha_mode) = self.resolve(node, registry::alpha_mode(&material.alpha_mode))? else {
            return Ok(None);
        };

        let mut textures = BTreeMap::new();
        for (slot, info) in material.textures() {
            if info.tex_coord > 0 && !self.options.multiple_texcoord_sets {
                self.diagnostics.push(Diagnostic::TexcoordCollapse {
                    node: NodeRef::MaterialTexture { material: index, slot },
                    set: info.tex_coord,
                });
            }
            textures.insert(
                slot,
                TextureBinding {
                    texture: info.index,
                    set: info.tex_coord,
                    scale: info.scale.or(info.strength).unwrap_or(1.0),
                    transform: None,
                },
            );
        }

        let default_pbr = PbrMetallicRoughness::default();
        let pbr = material.pbr_metallic_roughness.as_ref().unwrap_or(&default_pbr);

        Ok(Some(SceneMaterial {
            name: material.name.clone(),
            base_color: Vec4::from_array(pbr.base_color_factor),
            metallic: pbr.metallic_factor,
            roughness: pbr.roughness_factor,
            emissive: Vec3::from_array(material.emissive_factor),
            emissive_strength: 1.0,
            alpha_mode,
            alpha_cutoff: material.alpha_cutoff,
            double_sided: material.double_sided,
            unlit: false,
            textures,
            extras: material.extras.clone(),
        }))
    }

    fn link_texture(&mut self, index: usize) -> LinkResult<Option<SceneTexture>> {
        let doc = self.document;
        let texture = &doc.textures[index];
        let node = NodeRef::Texture(index);

        let sampler = match texture.sampler {
            Some(sampler) => match self.resolve(node, self.sampler_settings(sampler))? {
                Some(settings) => settings,
                None => return Ok(None),
            },
            None => SamplerSettings::default(),
        };

        Ok(Some(SceneTexture {
            name: texture.name.clone(),
            source: texture.source,
            sampler,
            handle: None,
        }))
    }

    fn sampler_settings(&self, index: usize) -> Result<SamplerSettings, FormatError> {
        let sampler = &self.document.samplers[index];

        let mag_filter = sampler
            .mag_filter
            .map(|code| match registry::filter_mode(code)? {
                // Magnification has no mipmap variants
                SamplerFilter { mipmap: Some(_), .. } => Err(FormatError::UnknownCode {
                    domain: "mag filter",
                    code: code.to_string(),
                }),
                filter => Ok(filter),
            })
            .transpose()?;
        let min_filter = sampler.min_filter.map(registry::filter_mode).transpose()?;

        Ok(SamplerSettings {
            mag_filter,
            min_filter,
            wrap_s: registry::wrap_mode(sampler.wrap_s)?,
            wrap_t: registry::wrap_mode(sampler.wrap_t)?,
        })
    }

    fn link_animation(&mut self, index: usize) -> LinkResult<SceneAnimation> {
        let doc = self.document;
        let animation = &doc.animations[index];
        let mut channels = Vec::with_capacity(animation.channels.len());

        for (c, channel) in animation.channels.iter().enumerate() {
            let node = NodeRef::Channel {
                animation: index,
                channel: c,
            };
            let Some(target) = channel.target.node else {
                log::debug!("{} has no target node", node);
                continue;
            };
            let property = match registry::animation_target(&channel.target.path) {
                Ok(property) => property,
                Err(error) => {
                    self.skip(node, error);
                    continue;
                }
            };

            let sampler = &animation.samplers[channel.sampler];
            let Some(interpolation) = self.resolve(node, registry::interpolation(&sampler.interpolation))? else {
                continue;
            };
            let Some(input) = self.try_bind(sampler.input, AccessorUsage::AnimationInput, node)? else {
                continue;
            };
            let Some(output) = self.try_bind(sampler.output, AccessorUsage::AnimationOutput(property), node)? else {
                continue;
            };

            channels.push(AnimationChannel {
                node: target,
                property,
                interpolation,
                input,
                output,
            });
        }

        Ok(SceneAnimation {
            name: animation.name.clone(),
            channels,
        })
    }

    fn link_skin(&mut self, index: usize) -> LinkResult<Option<SceneSkin>> {
        let doc = self.document;
        let skin = &doc.skins[index];
        let inverse_bind_matrices = match skin.inverse_bind_matrices {
            Some(accessor) => {
                match self.try_bind(accessor, AccessorUsage::InverseBindMatrices, NodeRef::Skin(index))? {
                    Some(binding) => Some(binding),
                    None => return Ok(None),
                }
            }
            None => None,
        };

        Ok(Some(SceneSkin {
            name: skin.name.clone(),
            joints: skin.joints.clone(),
            skeleton: skin.skeleton,
            inverse_bind_matrices,
        }))
    }

    fn link_camera(&mut self, index: usize) -> LinkResult<Option<SceneCamera>> {
        let doc = self.document;
        let camera = &doc.cameras[index];
        let projection = match (camera.kind.as_str(), camera.perspective, camera.orthographic) {
            ("perspective", Some(p), _) => Ok(Projection::Perspective {
                yfov: p.yfov,
                aspect_ratio: p.aspect_ratio,
                znear: p.znear,
                zfar: p.zfar,
            }),
            ("orthographic", _, Some(o)) => Ok(Projection::Orthographic {
                xmag: o.xmag,
                ymag: o.ymag,
                znear: o.znear,
                zfar: o.zfar,
            }),
            (kind, _, _) => Err(FormatError::UnknownCode {
                domain: "camera projection",
                code: kind.to_string(),
            }),
        };

        let Some(projection) = self.resolve(NodeRef::Camera(index), projection)? else {
            return Ok(None);
        };
        Ok(Some(SceneCamera {
            name: camera.name.clone(),
            projection,
        }))
    }
}

fn check(from: NodeRef, field: &'static str, index: usize, len: usize) -> LinkResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(LinkError::DanglingReference { from, field, index })
    }
}

fn check_opt(from: NodeRef, field: &'static str, index: Option<usize>, len: usize) -> LinkResult<()> {
    index.map_or(Ok(()), |index| check(from, field, index, len))
}

fn node_transform(node: &crate::document::Node) -> Transform {
    match node.matrix {
        Some(matrix) => Transform::from_matrix(Mat4::from_cols_array(&matrix)),
        None => Transform {
            translation: node.translation.map_or(Vec3::ZERO, Vec3::from_array),
            rotation: node.rotation.map_or(Quat::IDENTITY, Quat::from_array),
            scale: node.scale.map_or(Vec3::ONE, Vec3::from_array),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Semantic, Topology, VertexAttribute, WrapMode};
    use serde_json::{json, Value};

    fn link(value: Value, blobs: &Blobs, options: &ImportOptions) -> LinkResult<(Scene, Vec<Diagnostic>)> {
        let document = Document::from_value(value).unwrap();
        Linker::new(&document, blobs, options).link()
    }

    /// One triangle: positions then u16 indices, in a 42-byte buffer.
    fn triangle_blobs() -> Blobs {
        let positions = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let mut data: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
        data.extend([0u16, 1, 2].iter().flat_map(|v| v.to_le_bytes()));
        Blobs::new().with_buffer(data)
    }

    fn triangle_document(mode: u32, index_type: u32) -> Value {
        json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0, "translation": [1.0, 2.0, 3.0] }],
            "meshes": [{ "primitives": [{
                "attributes": { "POSITION": 0, "TEXCOORD_1": 0, "_CUSTOM": 0 },
                "indices": 1,
                "mode": mode
            }] }],
            "buffers": [{ "byteLength": 42 }],
            "bufferViews": [
                { "buffer": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" },
                { "bufferView": 1, "componentType": index_type, "count": 3, "type": "SCALAR" }
            ]
        })
    }

    #[test]
    fn test_links_triangle() {
        let mut value = triangle_document(4, 5123);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
        let (scene, diagnostics) = link(value, &triangle_blobs(), &ImportOptions::default()).unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(scene.geometries.len(), 1);
        assert_eq!(scene.geometries[0].users, vec![0]);

        let primitive = &scene.geometries[0].primitives[0];
        assert_eq!(primitive.topology, TopologyResolution::Direct(Topology::Triangles));
        assert!(primitive.source(VertexAttribute::new(Semantic::Position, 0)).is_some());
        assert_eq!(primitive.elements.unwrap().count, 3);
        assert_eq!(primitive.triangle_count(), 1);
        assert_eq!(scene.nodes[0].transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(scene.root_nodes(), vec![0]);
    }

    #[test]
    fn test_unknown_attribute_and_fan() {
        let mut value = triangle_document(6, 5123);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0, "_CUSTOM": 0 });
        let (scene, diagnostics) = link(value, &triangle_blobs(), &ImportOptions::default()).unwrap();
        let node = NodeRef::Primitive { mesh: 0, primitive: 0 };

        assert!(diagnostics.contains(&Diagnostic::UnknownAttribute {
            node,
            name: "_CUSTOM".to_string()
        }));
        assert!(diagnostics.contains(&Diagnostic::RequiresExpansion {
            node,
            mode: PrimitiveMode::TriangleFan
        }));

        let primitive = &scene.geometries[0].primitives[0];
        assert_eq!(primitive.topology, TopologyResolution::RequiresExpansion(PrimitiveMode::TriangleFan));
    }

    #[test]
    fn test_texcoord_collapse_is_reported() {
        let options = ImportOptions {
            multiple_texcoord_sets: false,
            ..Default::default()
        };
        let (scene, diagnostics) = link(triangle_document(4, 5123), &triangle_blobs(), &options).unwrap();
        let node = NodeRef::Primitive { mesh: 0, primitive: 0 };

        assert!(diagnostics.contains(&Diagnostic::TexcoordCollapse { node, set: 1 }));
        let primitive = &scene.geometries[0].primitives[0];
        assert!(primitive.source(VertexAttribute::new(Semantic::Texcoord, 1)).is_none());
        assert!(primitive.source(VertexAttribute::new(Semantic::Texcoord, 0)).is_none());
    }

    #[test]
    fn test_invalid_vertex_layout_rejects_primitive() {
        // TEXCOORD_1 points at a VEC3 accessor
        let (scene, diagnostics) = link(triangle_document(4, 5123), &triangle_blobs(), &ImportOptions::default()).unwrap();
        assert!(scene.geometries[0].primitives.is_empty());
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::Rejected {
                error: FormatError::InvalidCombination { .. },
                ..
            }
        )));
    }

    #[test]
    fn test_float_indices_fail_in_strict_mode() {
        let mut value = triangle_document(4, 5126);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
        value["accessors"][1]["count"] = json!(1);
        value["bufferViews"][1]["byteLength"] = json!(4);
        let blobs = Blobs::new().with_buffer(vec![0; 40]);

        let strict = ImportOptions {
            strict: true,
            ..Default::default()
        };
        let result = link(value, &blobs, &strict);
        assert!(matches!(
            result,
            Err(LinkError::Format {
                error: FormatError::InvalidCombination {
                    usage: AccessorUsage::Index,
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn test_dangling_reference() {
        let mut value = triangle_document(4, 5123);
        value["nodes"][0]["children"] = json!([4]);
        let result = link(value, &triangle_blobs(), &ImportOptions::default());
        assert!(matches!(
            result,
            Err(LinkError::DanglingReference {
                from: NodeRef::Node(0),
                field: "children",
                index: 4
            })
        ));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let value = json!({
            "nodes": [{ "children": [1] }, { "children": [2] }, { "children": [0] }]
        });
        let result = link(value, &Blobs::new(), &ImportOptions::default());
        assert!(matches!(result, Err(LinkError::CyclicHierarchy(_))));

        let self_parent = json!({ "nodes": [{ "children": [0] }] });
        let result = link(self_parent, &Blobs::new(), &ImportOptions::default());
        assert!(matches!(result, Err(LinkError::CyclicHierarchy(0))));
    }

    #[test]
    fn test_shared_child_gets_both_parents() {
        let value = json!({
            "nodes": [{ "children": [2] }, { "children": [2] }, {}]
        });
        let (scene, _) = link(value, &Blobs::new(), &ImportOptions::default()).unwrap();
        assert_eq!(scene.nodes[2].parents, vec![0, 1]);
        assert_eq!(scene.root_nodes(), vec![0, 1]);
    }

    #[test]
    fn test_buffer_overrun() {
        let mut value = triangle_document(4, 5123);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
        value["accessors"][0]["count"] = json!(4);
        let result = link(value, &triangle_blobs(), &ImportOptions::default());
        assert!(matches!(
            result,
            Err(LinkError::BufferOverrun {
                accessor: 0,
                end: 48,
                len: 36
            })
        ));
    }

    #[test]
    fn test_oversized_accessor_is_an_overrun() {
        let mut value = triangle_document(4, 5123);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
        value["accessors"][0]["count"] = json!(u64::MAX);
        let result = link(value, &triangle_blobs(), &ImportOptions::default());
        assert!(matches!(
            result,
            Err(LinkError::BufferOverrun {
                accessor: 0,
                end: usize::MAX,
                len: 36
            })
        ));

        let mut value = triangle_document(4, 5123);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
        value["accessors"][1]["byteOffset"] = json!(u64::MAX);
        let result = link(value, &triangle_blobs(), &ImportOptions::default());
        assert!(matches!(result, Err(LinkError::BufferOverrun { accessor: 1, .. })));
    }

    #[test]
    fn test_missing_blob() {
        let mut value = triangle_document(4, 5123);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
        let result = link(value, &Blobs::new(), &ImportOptions::default());
        assert!(matches!(result, Err(LinkError::Read(ReadError::MissingBuffer(0)))));
    }

    #[test]
    fn test_materials_and_samplers() {
        let value = json!({
            "materials": [
                {
                    "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0], "baseColorTexture": { "index": 0, "texCoord": 1 } },
                    "occlusionTexture": { "index": 0, "strength": 0.5 },
                    "alphaMode": "MASK"
                },
                { "alphaMode": "GLASS" }
            ],
            "textures": [{ "sampler": 0 }, { "sampler": 1 }],
            "samplers": [
                { "magFilter": 9729, "minFilter": 9987, "wrapS": 33071 },
                { "magFilter": 9987 }
            ]
        });
        let (scene, diagnostics) = link(value, &Blobs::new(), &ImportOptions::default()).unwrap();

        let material = scene.material(0).unwrap();
        assert_eq!(material.base_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(material.alpha_mode, registry::AlphaMode::Mask);
        assert_eq!(material.texture(crate::document::TextureSlot::BaseColor).unwrap().set, 1);
        assert_eq!(material.texture(crate::document::TextureSlot::Occlusion).unwrap().scale, 0.5);
        assert!(scene.material(1).is_none());

        let texture = scene.texture(0).unwrap();
        assert_eq!(texture.sampler.wrap_s, WrapMode::Clamp);
        assert_eq!(texture.sampler.wrap_t, WrapMode::Repeat);
        assert_eq!(texture.sampler.min_filter.unwrap().code(), 9987);
        // Mipmapped magnification is not a thing
        assert!(scene.texture(1).is_none());

        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_unsupported_animation_path_is_skipped() {
        let mut value = triangle_document(4, 5123);
        value["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
        value["animations"] = json!([{
            "channels": [
                { "sampler": 0, "target": { "node": 0, "path": "weights" } },
                { "sampler": 0, "target": { "node": 0, "path": "translation" } }
            ],
            "samplers": [{ "input": 1, "output": 0 }]
        }]);
        let strict = ImportOptions {
            strict: true,
            ..Default::default()
        };
        // Input accessor is u16 indices, which is not a valid keyframe time
        let result = link(value.clone(), &triangle_blobs(), &strict);
        assert!(matches!(result, Err(LinkError::Format { .. })));

        let (scene, diagnostics) = link(value, &triangle_blobs(), &ImportOptions::default()).unwrap();
        assert!(scene.animations[0].channels.is_empty());
        assert!(diagnostics.contains(&Diagnostic::Rejected {
            node: NodeRef::Channel { animation: 0, channel: 0 },
            error: FormatError::UnsupportedAnimationPath("weights".to_string()),
        }));
    }

    #[test]
    fn test_required_extensions() {
        let value = json!({
            "extensionsRequired": ["KHR_materials_unlit", "KHR_draco_mesh_compression"]
        });
        let (_, diagnostics) = link(value, &Blobs::new(), &ImportOptions::default()).unwrap();
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnsupportedRequiredExtension("KHR_draco_mesh_compression".to_string())]
        );
    }

    #[test]
    fn test_cameras() {
        let value = json!({
            "cameras": [
                { "type": "perspective", "perspective": { "yfov": 0.8, "znear": 0.1 } },
                { "type": "orthographic", "orthographic": { "xmag": 1.0, "ymag": 1.0, "znear": 0.1, "zfar": 10.0 } },
                { "type": "fisheye" }
            ]
        });
        let (scene, diagnostics) = link(value, &Blobs::new(), &ImportOptions::default()).unwrap();
        assert!(matches!(
            scene.cameras[0].as_ref().unwrap().projection,
            Projection::Perspective { zfar: None, .. }
        ));
        assert!(scene.cameras[1].is_some());
        assert!(scene.cameras[2].is_none());
        assert_eq!(diagnostics.len(), 1);
    }
}
