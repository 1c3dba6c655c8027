use serde::Deserialize;

use crate::buffer::ReadError;
use crate::dispatch::LinkContext;
use crate::extension::{ExtensionBag, Extras};
use crate::media::{classify, MediaKind, MediaSource};
use crate::property::{dispatch_extensions, impl_property, HookError, HookResult, NodeRef, Property};

/// Texture reference slots on a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    BaseColor,
    MetallicRoughness,
    Normal,
    Occlusion,
    Emissive,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        TextureSlot::BaseColor,
        TextureSlot::MetallicRoughness,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
        TextureSlot::Emissive,
    ];

    /// JSON path of the slot relative to its material.
    pub fn field_name(self) -> &'static str {
        match self {
            TextureSlot::BaseColor => "pbrMetallicRoughness.baseColorTexture",
            TextureSlot::MetallicRoughness => "pbrMetallicRoughness.metallicRoughnessTexture",
            TextureSlot::Normal => "normalTexture",
            TextureSlot::Occlusion => "occlusionTexture",
            TextureSlot::Emissive => "emissiveTexture",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: Option<String>,
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    pub normal_texture: Option<TextureInfo>,
    pub occlusion_texture: Option<TextureInfo>,
    pub emissive_texture: Option<TextureInfo>,
    #[serde(default)]
    pub emissive_factor: [f32; 3],
    #[serde(default = "default_alpha_mode")]
    pub alpha_mode: String,
    #[serde(default = "default_alpha_cutoff")]
    pub alpha_cutoff: f32,
    #[serde(default)]
    pub double_sided: bool,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

fn default_alpha_mode() -> String {
    "OPAQUE".to_string()
}

fn default_alpha_cutoff() -> f32 {
    0.5
}

impl Material {
    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureInfo> {
        match slot {
            TextureSlot::BaseColor => self.pbr_metallic_roughness.as_ref()?.base_color_texture.as_ref(),
            TextureSlot::MetallicRoughness => self
                .pbr_metallic_roughness
                .as_ref()?
                .metallic_roughness_texture
                .as_ref(),
            TextureSlot::Normal => self.normal_texture.as_ref(),
            TextureSlot::Occlusion => self.occlusion_texture.as_ref(),
            TextureSlot::Emissive => self.emissive_texture.as_ref(),
        }
    }

    /// Every occupied texture slot.
    pub fn textures(&self) -> impl Iterator<Item = (TextureSlot, &TextureInfo)> {
        TextureSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.texture(slot).map(|info| (slot, info)))
    }
}

impl Property for Material {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        dispatch_extensions(self.extensions(), target, ctx);
        // PBR block extensions apply to the owning material
        if let Some(pbr) = &self.pbr_metallic_roughness {
            dispatch_extensions(pbr.extensions.as_ref(), target, ctx);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbrMetallicRoughness {
    #[serde(default = "default_base_color")]
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureInfo>,
    #[serde(default = "default_factor")]
    pub metallic_factor: f32,
    #[serde(default = "default_factor")]
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureInfo>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

impl Default for PbrMetallicRoughness {
    fn default() -> Self {
        Self {
            base_color_factor: default_base_color(),
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            extensions: None,
            extras: None,
        }
    }
}

fn default_base_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn default_factor() -> f32 {
    1.0
}

/// Reference from a material slot to a texture.
///
/// `scale` is only meaningful for normal textures and `strength` for
/// occlusion textures.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInfo {
    pub index: usize,
    #[serde(default)]
    pub tex_coord: u32,
    pub scale: Option<f32>,
    pub strength: Option<f32>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Texture {
    pub name: Option<String>,
    pub sampler: Option<usize>,
    pub source: Option<usize>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

impl Property for Texture {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    /// Bind the decoded handle of the source image. Images are children of
    /// textures, so the handle is already resolved when this runs.
    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        dispatch_extensions(self.extensions(), target, ctx);

        let NodeRef::Texture(index) = target else {
            return Err(HookError::WrongTarget {
                hook: "texture",
                target,
            });
        };
        if ctx.scene().texture(index).is_none() {
            // Rejected while linking; already reported
            return Ok(());
        }
        let handle = self
            .source
            .and_then(|source| ctx.scene().images.get(source).cloned().flatten())
            .ok_or(HookError::MissingSource(target))?;

        let texture = ctx
            .scene_mut()
            .textures
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(HookError::MissingObject(target))?;
        texture.handle = Some(handle);
        Ok(())
    }
}

/// An image or video, referenced by URI or embedded in a buffer view.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub buffer_view: Option<usize>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

impl Image {
    /// Build the media source for this image. Videos are never read here.
    pub fn media_source<'a>(&'a self, ctx: &LinkContext<'a>, target: NodeRef) -> HookResult<MediaSource<'a>> {
        let mime_type = self.mime_type.as_deref();

        if let Some(view) = self.buffer_view {
            let data = ctx.blobs().view_bytes(ctx.document(), view)?;
            return Ok(MediaSource::Image { data, mime_type });
        }

        let uri = self.uri.as_deref().ok_or(HookError::MissingSource(target))?;
        match classify(mime_type, Some(uri)) {
            MediaKind::Video => Ok(MediaSource::Video { locator: uri }),
            MediaKind::Image => {
                let data = ctx
                    .blobs()
                    .resource(uri)
                    .ok_or_else(|| ReadError::MissingResource(uri.to_string()))?;
                Ok(MediaSource::Image { data, mime_type })
            }
        }
    }
}

impl Property for Image {
    fn extensions(&self) -> Option<&ExtensionBag> {
        self.extensions.as_ref()
    }

    fn extras(&self) -> Option<&Extras> {
        self.extras.as_ref()
    }

    fn on_post_link(&self, target: NodeRef, ctx: &mut LinkContext<'_>) -> HookResult<()> {
        dispatch_extensions(self.extensions(), target, ctx);

        let NodeRef::Image(index) = target else {
            return Err(HookError::WrongTarget {
                hook: "image",
                target,
            });
        };
        let source = self.media_source(ctx, target)?;
        let handle = ctx.media_mut().resolve_cached(index, source)?;

        let slot = ctx
            .scene_mut()
            .images
            .get_mut(index)
            .ok_or(HookError::MissingObject(target))?;
        *slot = Some(handle);
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampler {
    pub name: Option<String>,
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    #[serde(default = "default_wrap")]
    pub wrap_s: u32,
    #[serde(default = "default_wrap")]
    pub wrap_t: u32,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

fn default_wrap() -> u32 {
    10497
}

impl_property!(TextureInfo, Sampler);
