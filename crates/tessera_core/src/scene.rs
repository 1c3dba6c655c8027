//! Materialized scene produced by an import.
//!
//! Every collection is indexed the same way as the document it came from, so
//! a document index is also a scene index. Objects rejected during linking
//! leave a `None` in their slot instead of shifting their neighbours.

use std::collections::BTreeMap;

use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::buffer::AccessorBinding;
use crate::document::TextureSlot;
use crate::extension::Extras;
use crate::media::DisplayHandle;
use crate::registry::{
    AlphaMode, Interpolation, PrimitiveMode, SamplerFilter, Topology, TransformProperty, VertexAttribute, WrapMode,
};

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Decompose a 4x4 matrix into translation, rotation, and scale.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A node in the linked hierarchy.
#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub name: Option<String>,
    pub transform: Transform,
    /// Nodes listing this one as a child. More than one is tolerated.
    pub parents: Vec<usize>,
    pub children: Vec<usize>,
    /// Geometry index
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub camera: Option<usize>,
    /// Punctual light index, bound by `KHR_lights_punctual`
    pub light: Option<usize>,
    pub weights: Vec<f32>,
    pub extras: Option<Extras>,
}

/// How a primitive's topology maps onto the renderer's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyResolution {
    Direct(Topology),
    /// Needs [`expand_indices`](crate::mesh::expand_indices) before use
    RequiresExpansion(PrimitiveMode),
}

impl TopologyResolution {
    pub fn direct(self) -> Option<Topology> {
        match self {
            TopologyResolution::Direct(topology) => Some(topology),
            TopologyResolution::RequiresExpansion(_) => None,
        }
    }

    pub fn mode(self) -> PrimitiveMode {
        match self {
            TopologyResolution::Direct(topology) => topology.mode(),
            TopologyResolution::RequiresExpansion(mode) => mode,
        }
    }
}

/// A primitive with resolved vertex sources and element buffer.
#[derive(Clone, Debug)]
pub struct GeometryPrimitive {
    /// Index of the primitive within its mesh
    pub index: usize,
    pub sources: Vec<(VertexAttribute, AccessorBinding)>,
    pub elements: Option<AccessorBinding>,
    pub topology: TopologyResolution,
    pub material: Option<usize>,
}

impl GeometryPrimitive {
    pub fn source(&self, attribute: VertexAttribute) -> Option<&AccessorBinding> {
        self.sources
            .iter()
            .find(|(attr, _)| *attr == attribute)
            .map(|(_, binding)| binding)
    }

    /// Number of vertices referenced, by index count when indexed.
    pub fn vertex_count(&self) -> usize {
        match &self.elements {
            Some(elements) => elements.count,
            None => self.sources.first().map_or(0, |(_, binding)| binding.count),
        }
    }

    pub fn triangle_count(&self) -> usize {
        let n = self.vertex_count();
        match self.topology.mode() {
            PrimitiveMode::Triangles => n / 3,
            PrimitiveMode::TriangleStrip | PrimitiveMode::TriangleFan => n.saturating_sub(2),
            _ => 0,
        }
    }
}

/// A mesh: primitives plus the nodes that instance it.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub name: Option<String>,
    pub primitives: Vec<GeometryPrimitive>,
    pub users: Vec<usize>,
}

impl Geometry {
    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(GeometryPrimitive::triangle_count).sum()
    }
}

/// UV offset, rotation and scale from `KHR_texture_transform`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvTransform {
    pub offset: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}

impl UvTransform {
    /// Order: Scale -> Rotate -> Translate. Rotation is clockwise in UV space.
    pub fn to_matrix(&self) -> Mat3 {
        Mat3::from_scale_angle_translation(self.scale, -self.rotation, self.offset)
    }
}

/// A material slot bound to a texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureBinding {
    pub texture: usize,
    /// Texcoord set
    pub set: u32,
    /// Normal scale or occlusion strength; 1 elsewhere
    pub scale: f32,
    pub transform: Option<UvTransform>,
}

/// A PBR metallic-roughness material.
#[derive(Clone, Debug)]
pub struct SceneMaterial {
    pub name: Option<String>,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    pub emissive_strength: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    /// Set by `KHR_materials_unlit`
    pub unlit: bool,
    pub textures: BTreeMap<TextureSlot, TextureBinding>,
    pub extras: Option<Extras>,
}

impl Default for SceneMaterial {
    fn default() -> Self {
        Self {
            name: None,
            base_color: Vec4::ONE,
            metallic: 1.0,
            roughness: 1.0,
            emissive: Vec3::ZERO,
            emissive_strength: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            unlit: false,
            textures: BTreeMap::new(),
            extras: None,
        }
    }
}

impl SceneMaterial {
    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureBinding> {
        self.textures.get(&slot)
    }

    pub fn has_textures(&self) -> bool {
        !self.textures.is_empty()
    }

    pub fn is_emissive(&self) -> bool {
        (self.emissive.length_squared() > 0.0 && self.emissive_strength > 0.0)
            || self.textures.contains_key(&TextureSlot::Emissive)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerSettings {
    pub mag_filter: Option<SamplerFilter>,
    pub min_filter: Option<SamplerFilter>,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

#[derive(Clone, Debug)]
pub struct SceneTexture {
    pub name: Option<String>,
    pub source: Option<usize>,
    pub sampler: SamplerSettings,
    /// Bound after the source image is resolved
    pub handle: Option<DisplayHandle>,
}

/// A sampler bound to one node property.
#[derive(Clone, Debug)]
pub struct AnimationChannel {
    pub node: usize,
    pub property: TransformProperty,
    pub interpolation: Interpolation,
    pub input: AccessorBinding,
    pub output: AccessorBinding,
}

#[derive(Clone, Debug, Default)]
pub struct SceneAnimation {
    pub name: Option<String>,
    pub channels: Vec<AnimationChannel>,
}

#[derive(Clone, Debug)]
pub struct SceneSkin {
    pub name: Option<String>,
    pub joints: Vec<usize>,
    pub skeleton: Option<usize>,
    pub inverse_bind_matrices: Option<AccessorBinding>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        yfov: f32,
        aspect_ratio: Option<f32>,
        znear: f32,
        /// `None` means an infinite far plane
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

impl Projection {
    /// Projection matrix. `aspect` is used when the camera does not fix one.
    pub fn to_matrix(&self, aspect: f32) -> Mat4 {
        match *self {
            Projection::Perspective {
                yfov,
                aspect_ratio,
                znear,
                zfar,
            } => {
                let aspect = aspect_ratio.unwrap_or(aspect);
                match zfar {
                    Some(zfar) => Mat4::perspective_rh_gl(yfov, aspect, znear, zfar),
                    None => Mat4::perspective_infinite_rh(yfov, aspect, znear),
                }
            }
            Projection::Orthographic { xmag, ymag, znear, zfar } => {
                Mat4::orthographic_rh_gl(-xmag, xmag, -ymag, ymag, znear, zfar)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SceneCamera {
    pub name: Option<String>,
    pub projection: Projection,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
    Spot { inner_cone_angle: f32, outer_cone_angle: f32 },
}

#[derive(Clone, Debug)]
pub struct SceneLight {
    pub name: Option<String>,
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// `None` means unlimited range
    pub range: Option<f32>,
}

/// A complete imported scene.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub nodes: Vec<SceneNode>,
    pub geometries: Vec<Geometry>,
    pub materials: Vec<Option<SceneMaterial>>,
    pub textures: Vec<Option<SceneTexture>>,
    /// Filled in as image hooks resolve media
    pub images: Vec<Option<DisplayHandle>>,
    pub animations: Vec<SceneAnimation>,
    pub skins: Vec<Option<SceneSkin>>,
    pub cameras: Vec<Option<SceneCamera>>,
    pub lights: Vec<SceneLight>,
    /// Root nodes of each document scene
    pub scenes: Vec<Vec<usize>>,
    pub default_scene: Option<usize>,
}

impl Scene {
    pub fn material(&self, index: usize) -> Option<&SceneMaterial> {
        self.materials.get(index)?.as_ref()
    }

    pub fn material_mut(&mut self, index: usize) -> Option<&mut SceneMaterial> {
        self.materials.get_mut(index)?.as_mut()
    }

    pub fn texture(&self, index: usize) -> Option<&SceneTexture> {
        self.textures.get(index)?.as_ref()
    }

    /// Roots of the default scene, or every parentless node when the
    /// document has no scenes.
    pub fn root_nodes(&self) -> Vec<usize> {
        match self.default_scene.and_then(|i| self.scenes.get(i)) {
            Some(roots) => roots.clone(),
            None => (0..self.nodes.len())
                .filter(|&i| self.nodes[i].parents.is_empty())
                .collect(),
        }
    }

    /// World matrix of a node, following its first parent at each level.
    pub fn world_matrix(&self, node: usize) -> Option<Mat4> {
        let mut matrix = self.nodes.get(node)?.transform.to_matrix();
        let mut current = node;
        // At most one step per node, even for a hand-built cyclic scene
        for _ in 0..self.nodes.len() {
            match self.nodes[current].parents.first() {
                Some(&parent) => {
                    matrix = self.nodes.get(parent)?.transform.to_matrix() * matrix;
                    current = parent;
                }
                None => break,
            }
        }
        Some(matrix)
    }

    /// Triangles across all mesh instances.
    pub fn total_triangle_count(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|node| node.mesh.and_then(|mesh| self.geometries.get(mesh)))
            .map(Geometry::triangle_count)
            .sum()
    }

    pub fn instance_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.mesh.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_matrix_roundtrip() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let recovered = Transform::from_matrix(transform.to_matrix());

        assert!((recovered.translation - transform.translation).length() < 0.001);
        assert!((recovered.scale - transform.scale).length() < 0.001);
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let mut scene = Scene::default();
        scene.nodes.push(SceneNode {
            transform: Transform::from_translation(Vec3::X),
            children: vec![1],
            ..Default::default()
        });
        scene.nodes.push(SceneNode {
            transform: Transform::from_translation(Vec3::Y),
            parents: vec![0],
            ..Default::default()
        });

        let world = scene.world_matrix(1).unwrap();
        assert!((world.transform_point3(Vec3::ZERO) - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
        assert_eq!(scene.root_nodes(), vec![0]);
        assert!(scene.world_matrix(5).is_none());
    }

    #[test]
    fn test_world_matrix_terminates_on_cycle() {
        let mut scene = Scene::default();
        for other in [1, 0] {
            scene.nodes.push(SceneNode {
                parents: vec![other],
                ..Default::default()
            });
        }
        assert!(scene.world_matrix(0).is_some());
    }

    #[test]
    fn test_uv_transform_identity() {
        let identity = UvTransform {
            offset: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
        };
        assert!(identity.to_matrix().abs_diff_eq(Mat3::IDENTITY, 1e-6));

        let shifted = UvTransform {
            offset: Vec2::new(0.5, 0.0),
            rotation: 0.0,
            scale: Vec2::splat(2.0),
        };
        let uv = shifted.to_matrix().transform_point2(Vec2::new(1.0, 1.0));
        assert!((uv - Vec2::new(2.5, 2.0)).length() < 1e-6);
    }

    #[test]
    fn test_material_defaults() {
        let mut material = SceneMaterial::default();
        assert!(!material.has_textures());
        assert!(!material.is_emissive());

        material.emissive = Vec3::ONE;
        assert!(material.is_emissive());
        material.emissive_strength = 0.0;
        assert!(!material.is_emissive());
    }
}
