//! Extension payloads and their post-link hooks.
//!
//! Extensions decode into a closed set of known variants. Anything else is
//! kept as [`Extension::Unrecognized`] and is inert during dispatch; a known
//! name whose payload does not decode becomes [`Extension::Malformed`], whose
//! hook reports the decode failure instead of failing the whole import.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::dispatch::LinkContext;
use crate::link::Diagnostic;
use crate::property::{dispatch_extensions, HookError, HookResult, NodeRef, Property};
use crate::registry::FormatError;
use crate::scene::{LightKind, SceneLight, UvTransform};

pub const KHR_MATERIALS_UNLIT: &str = "KHR_materials_unlit";
pub const KHR_MATERIALS_EMISSIVE_STRENGTH: &str = "KHR_materials_emissive_strength";
pub const KHR_TEXTURE_TRANSFORM: &str = "KHR_texture_transform";
pub const KHR_LIGHTS_PUNCTUAL: &str = "KHR_lights_punctual";

/// Extension names with a known payload and hook.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = [
    KHR_MATERIALS_UNLIT,
    KHR_MATERIALS_EMISSIVE_STRENGTH,
    KHR_TEXTURE_TRANSFORM,
    KHR_LIGHTS_PUNCTUAL,
];

/// Application-specific data. Never interpreted by the core.
pub type Extras = Value;

/// Extension name → payload.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "BTreeMap<String, Value>")]
pub struct ExtensionBag {
    entries: BTreeMap<String, Extension>,
}

impl ExtensionBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `value` for `name` and store it, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let extension = Extension::decode(&name, value);
        self.entries.insert(name, extension);
    }

    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Extension)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for ExtensionBag {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        let mut bag = ExtensionBag::new();
        for (name, value) in raw {
            bag.insert(name, value);
        }
        bag
    }
}

/// A decoded extension payload.
#[derive(Clone, Debug)]
pub enum Extension {
    MaterialsUnlit(MaterialsUnlit),
    EmissiveStrength(EmissiveStrength),
    TextureTransform(TextureTransform),
    LightsPunctual(LightsPunctual),
    /// Known name, undecodable payload
    Malformed(MalformedExtension),
    /// Unknown name; kept verbatim
    Unrecognized(Value),
}

impl Extension {
    /// Decode the payload of extension `name`.
    pub fn decode(name: &str, value: Value) -> Self {
        match name {
            KHR_MATERIALS_UNLIT => decode_as(name, value, Extension::MaterialsUnlit),
            KHR_MATERIALS_EMISSIVE_STRENGTH => decode_as(name, value, Extension::EmissiveStrength),
            KHR_TEXTURE_TRANSFORM => decode_as(name, value, Extension::TextureTransform),
            KHR_LIGHTS_PUNCTUAL => decode_as(name, value, Extension::LightsPunctual),
            _ => Extension::Unrecognized(value),
        }
    }

    /// The payload as a property, or `None` when it has no hook.
    pub fn as_property(&self) -> Option<&dyn Property> {
        let property: &dyn Property = match self {
            Extension::MaterialsUnlit(ext) => ext,
            Extension::EmissiveStrength(ext) => ext,
            Extension::TextureTransform(ext) => ext,
            Extension::LightsPunctual(ext) => ext,
            Extension::Malformed(ext) => ext,
            Extension::Unrecognized(_) => return None,
        };
        Some(property)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Extension::Unrecognized(_))
    }
}

fn decode_as<T: DeserializeOwned>(name: &str, value: Value, wrap: fn(T) -> Extension) -> Extension {
    match serde_json::from_value(value) {
        Ok(payload) => wrap(payload),
        Err(e) => {
            log::warn!("Malformed {} extension: {}", name, e);
            Extension::Malformed(MalformedExtension {
                name: name.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

/// A known extension whose payload failed to decode.
#[derive(Clone, Debug)]
pub struct MalformedExtension {
    pub name: String,
    pub reason: String,
}

impl Property for MalformedExtension {
    fn extensions(&self) -> Option<&ExtensionBag> {
        None
    }

    fn extras(&self) -> Option<&Extras> {
        None
    }

    fn on_post_link(&self, _target: NodeRef, _ctx: &mut LinkContext<'_>) -> HookResult<()> {
        Err(HookError::MalformedExtension {
            name: self.name.clone(),
            reason: self.reason.clone(),
        })
    }
}

// ============================================================================
// KHR_materials_unlit / KHR_materials_emissive_strength
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MaterialsUnlit {
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

impl Property for MaterialsUnlit {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        let NodeRef::Material(index) = target else {
            return Err(HookError::Misplaced {
                extension: KHR_MATERIALS_UNLIT,
                target,
            });
        };

        let Some(material) = ctx.scene_mut().material_mut(index) else {
            // Rejected while linking; already reported
            return Ok(());
        };
        material.unlit = true;

        dispatch_extensions(self.extensions(), target, ctx);
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissiveStrength {
    #[serde(default = "default_one")]
    pub emissive_strength: f32,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

fn default_one() -> f32 {
    1.0
}

impl Property for EmissiveStrength {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        let NodeRef::Material(index) = target else {
            return Err(HookError::Misplaced {
                extension: KHR_MATERIALS_EMISSIVE_STRENGTH,
                target,
            });
        };

        let Some(material) = ctx.scene_mut().material_mut(index) else {
            // Rejected while linking; already reported
            return Ok(());
        };
        material.emissive_strength = self.emissive_strength;

        dispatch_extensions(self.extensions(), target, ctx);
        Ok(())
    }
}

// ============================================================================
// KHR_texture_transform
// ============================================================================

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureTransform {
    #[serde(default)]
    pub offset: [f32; 2],
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_scale")]
    pub scale: [f32; 2],
    /// Overrides the texture info's `texCoord`
    pub tex_coord: Option<u32>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

fn default_scale() -> [f32; 2] {
    [1.0, 1.0]
}

impl Property for TextureTransform {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        let NodeRef::MaterialTexture { material, slot } = target else {
            return Err(HookError::Misplaced {
                extension: KHR_TEXTURE_TRANSFORM,
                target,
            });
        };

        let Some(scene_material) = ctx.scene_mut().material_mut(material) else {
            // Rejected while linking; already reported
            return Ok(());
        };
        let binding = scene_material
            .textures
            .get_mut(&slot)
            .ok_or(HookError::MissingObject(target))?;
        binding.transform = Some(UvTransform {
            offset: Vec2::from(self.offset),
            rotation: self.rotation,
            scale: Vec2::from(self.scale),
        });
        if let Some(set) = self.tex_coord {
            binding.set = set;
            if set > 0 && !ctx.options().multiple_texcoord_sets {
                ctx.push_diagnostic(Diagnostic::TexcoordCollapse { node: target, set });
            }
        }

        dispatch_extensions(self.extensions(), target, ctx);
        Ok(())
    }
}

// ============================================================================
// KHR_lights_punctual
// ============================================================================

/// Either the document-level light list or a node's light reference.
#[derive(Clone, Debug, Deserialize)]
pub struct LightsPunctual {
    pub lights: Option<Vec<PunctualLight>>,
    pub light: Option<usize>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PunctualLight {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    #[serde(default = "default_one")]
    pub intensity: f32,
    pub range: Option<f32>,
    pub spot: Option<SpotCone>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotCone {
    #[serde(default)]
    pub inner_cone_angle: f32,
    #[serde(default = "default_outer_cone")]
    pub outer_cone_angle: f32,
}

fn default_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_outer_cone() -> f32 {
    std::f32::consts::FRAC_PI_4
}

impl PunctualLight {
    /// Resolve the declared light type.
    pub fn resolve(&self) -> Result<SceneLight, FormatError> {
        let kind = match self.kind.as_str() {
            "directional" => LightKind::Directional,
            "point" => LightKind::Point,
            "spot" => {
                let cone = self.spot.clone().unwrap_or(SpotCone {
                    inner_cone_angle: 0.0,
                    outer_cone_angle: default_outer_cone(),
                });
                LightKind::Spot {
                    inner_cone_angle: cone.inner_cone_angle,
                    outer_cone_angle: cone.outer_cone_angle,
                }
            }
            other => {
                return Err(FormatError::UnknownCode {
                    domain: "light type",
                    code: other.to_string(),
                })
            }
        };

        Ok(SceneLight {
            name: self.name.clone(),
            kind,
            color: Vec3::from(self.color),
            intensity: self.intensity,
            range: self.range,
        })
    }
}

/// Number of lights declared at document level, if any.
fn declared_light_count(ctx: &LinkContext<'_>) -> usize {
    match ctx.document().extensions.as_ref().and_then(|bag| bag.get(KHR_LIGHTS_PUNCTUAL)) {
        Some(Extension::LightsPunctual(root)) => root.lights.as_ref().map_or(0, Vec::len),
        _ => 0,
    }
}

impl Property for LightsPunctual {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        match (target, &self.lights, self.light) {
            (NodeRef::Document, Some(lights), _) => {
                let resolved = lights
                    .iter()
                    .map(PunctualLight::resolve)
                    .collect::<Result<Vec<_>, _>>()?;
                log::debug!("Materialized {} punctual lights", resolved.len());
                ctx.scene_mut().lights = resolved;
            }
            (NodeRef::Node(index), _, Some(light)) => {
                if light >= declared_light_count(ctx) {
                    return Err(HookError::DanglingReference {
                        target,
                        field: "light",
                        index: light,
                    });
                }
                let node = ctx
                    .scene_mut()
                    .nodes
                    .get_mut(index)
                    .ok_or(HookError::MissingObject(target))?;
                node.light = Some(light);
            }
            _ => {
                return Err(HookError::Misplaced {
                    extension: KHR_LIGHTS_PUNCTUAL,
                    target,
                })
            }
        }

        dispatch_extensions(self.extensions(), target, ctx);
        Ok(())
    }
}
