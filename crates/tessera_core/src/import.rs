//! The import entry point: link, then dispatch.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::buffer::Blobs;
use crate::dispatch::{HookFailure, LinkContext, PostLinkDispatcher};
use crate::document::Document;
use crate::link::{Diagnostic, LinkError, Linker};
use crate::media::MediaOptions;
use crate::property::NodeRef;
use crate::scene::Scene;

/// Errors that abort an import.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

/// Result type for imports.
pub type ImportResult<T> = Result<T, ImportError>;

/// Import settings. Every field has a default, so a partial JSON object works.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Fail on the first format error instead of skipping the object
    pub strict: bool,
    /// Whether the consumer stores more than one texcoord set per vertex
    pub multiple_texcoord_sets: bool,
    pub media: MediaOptions,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            strict: false,
            multiple_texcoord_sets: true,
            media: MediaOptions::default(),
        }
    }
}

/// Everything non-fatal that happened during an import.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub diagnostics: Vec<Diagnostic>,
    pub failures: Vec<HookFailure>,
    /// Nodes in the order their hooks ran
    pub dispatched: Vec<NodeRef>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty() && self.failures.is_empty()
    }

    pub fn failures_for(&self, node: NodeRef) -> impl Iterator<Item = &HookFailure> {
        self.failures.iter().filter(move |failure| failure.node == node)
    }
}

/// A fully dispatched scene and its report.
#[derive(Debug)]
pub struct Import {
    pub scene: Scene,
    pub report: ImportReport,
}

/// Link `document` against `blobs` and run every post-link hook.
///
/// Nothing is returned unless linking succeeds; hook failures are collected
/// in the report.
pub fn import(document: &Document, blobs: &Blobs, options: &ImportOptions) -> ImportResult<Import> {
    let (scene, mut diagnostics) = Linker::new(document, blobs, options).link()?;

    let mut ctx = LinkContext::new(document, blobs, options, scene);
    let dispatched = PostLinkDispatcher::new(document).run(&mut ctx);
    let (scene, hook_diagnostics, failures) = ctx.into_parts();
    diagnostics.extend(hook_diagnostics);

    log::info!(
        "Imported {} nodes, {} geometries, {} materials ({} diagnostics, {} hook failures)",
        scene.nodes.len(),
        scene.geometries.len(),
        scene.materials.len(),
        diagnostics.len(),
        failures.len()
    );

    Ok(Import {
        scene,
        report: ImportReport {
            diagnostics,
            failures,
            dispatched,
        },
    })
}

/// Deserialize a parsed JSON tree and import it.
pub fn import_value(value: Value, blobs: &Blobs, options: &ImportOptions) -> ImportResult<Import> {
    let document = Document::from_value(value)?;
    import(&document, blobs, options)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::buffer::ReadError;
    use crate::document::TextureSlot;
    use crate::extension::{KHR_MATERIALS_EMISSIVE_STRENGTH, KHR_MATERIALS_UNLIT};
    use crate::media::MediaKind;
    use crate::property::{HookError, Property};
    use crate::scene::LightKind;
    use glam::Vec2;
    use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
    use serde_json::json;

    fn run(value: Value) -> Import {
        import_value(value, &Blobs::new(), &ImportOptions::default()).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let image = RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: ImportOptions = serde_json::from_value(json!({ "strict": true })).unwrap();
        assert!(options.strict);
        assert!(options.multiple_texcoord_sets);
        assert!(options.media.png_direct_decode);

        let options: ImportOptions =
            serde_json::from_value(json!({ "media": { "png_direct_decode": false } })).unwrap();
        assert!(!options.media.png_direct_decode);
    }

    #[test]
    fn test_shared_child_dispatched_once() {
        let import = run(json!({
            "scenes": [{ "nodes": [0, 1] }],
            "nodes": [{ "children": [2] }, { "children": [2] }, {}]
        }));

        let dispatched = &import.report.dispatched;
        assert_eq!(dispatched.iter().filter(|n| **n == NodeRef::Node(2)).count(), 1);
        // Three nodes, one scene, the root
        assert_eq!(dispatched.len(), 5);
        assert!(import.report.is_clean());
    }

    #[test]
    fn test_malformed_extension_does_not_stop_sibling() {
        let import = run(json!({
            "materials": [{
                "extensions": {
                    "KHR_materials_unlit": {},
                    "KHR_materials_emissive_strength": { "emissiveStrength": "very" }
                }
            }]
        }));

        assert!(import.scene.material(0).unwrap().unlit);

        let failures: Vec<_> = import.report.failures_for(NodeRef::Material(0)).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].extension.as_deref(), Some(KHR_MATERIALS_EMISSIVE_STRENGTH));
        assert!(matches!(failures[0].error, HookError::MalformedExtension { .. }));
    }

    #[test]
    fn test_misplaced_extension_fails_alone() {
        let import = run(json!({
            "nodes": [
                { "extensions": { "KHR_materials_unlit": {} } },
                { "extensions": { "VENDOR_unknown": { "x": 1 } } }
            ]
        }));

        assert_eq!(import.report.failures.len(), 1);
        let failure = &import.report.failures[0];
        assert_eq!(failure.node, NodeRef::Node(0));
        assert_eq!(failure.extension.as_deref(), Some(KHR_MATERIALS_UNLIT));
        assert!(matches!(failure.error, HookError::Misplaced { .. }));
        assert!(import.report.dispatched.contains(&NodeRef::Node(1)));
    }

    #[test]
    fn test_dangling_reference_aborts_import() {
        let result = import_value(
            json!({
                "images": [{ "uri": "clip.mp4" }],
                "textures": [{ "source": 3 }]
            }),
            &Blobs::new(),
            &ImportOptions::default(),
        );
        assert!(matches!(
            result,
            Err(ImportError::Link(LinkError::DanglingReference {
                from: NodeRef::Texture(0),
                field: "source",
                index: 3
            }))
        ));
    }

    #[test]
    fn test_video_is_bound_without_reading() {
        // No bytes are supplied for the video URI
        let import = run(json!({
            "images": [{ "uri": "media/clip.mp4" }],
            "textures": [{ "source": 0 }]
        }));

        assert!(import.report.failures.is_empty());
        let handle = import.scene.texture(0).unwrap().handle.as_ref().unwrap();
        assert_eq!(handle.kind(), MediaKind::Video);
        assert_eq!(handle.as_video().unwrap().locator, "media/clip.mp4");
    }

    #[test]
    fn test_embedded_png_is_decoded_and_bound() {
        let png = png_bytes();
        let blobs = Blobs::new().with_buffer(png.clone());
        let value = json!({
            "buffers": [{ "byteLength": png.len() }],
            "bufferViews": [{ "buffer": 0, "byteLength": png.len() }],
            "images": [{ "bufferView": 0, "mimeType": "image/png" }],
            "textures": [{ "source": 0 }, { "source": 0 }]
        });
        let import = import_value(value, &blobs, &ImportOptions::default()).unwrap();

        assert!(import.report.failures.is_empty());
        for texture in 0..2 {
            let handle = import.scene.texture(texture).unwrap().handle.as_ref().unwrap();
            let bitmap = handle.as_bitmap().unwrap();
            assert_eq!((bitmap.width(), bitmap.height()), (2, 2));
        }
        assert!(import.scene.images[0].is_some());
    }

    #[test]
    fn test_missing_image_resource_is_reported() {
        let import = run(json!({
            "images": [{ "uri": "albedo.png" }],
            "textures": [{ "source": 0 }]
        }));

        let image_failures: Vec<_> = import.report.failures_for(NodeRef::Image(0)).collect();
        assert_eq!(image_failures.len(), 1);
        assert!(matches!(
            &image_failures[0].error,
            HookError::Read(ReadError::MissingResource(uri)) if uri == "albedo.png"
        ));

        let texture_failures: Vec<_> = import.report.failures_for(NodeRef::Texture(0)).collect();
        assert!(matches!(texture_failures[0].error, HookError::MissingSource(_)));
        assert!(import.scene.texture(0).unwrap().handle.is_none());
    }

    #[test]
    fn test_punctual_lights() {
        let import = run(json!({
            "extensionsUsed": ["KHR_lights_punctual"],
            "extensions": {
                "KHR_lights_punctual": {
                    "lights": [{ "type": "point", "color": [1.0, 0.5, 0.0], "intensity": 20.0 }]
                }
            },
            "nodes": [
                { "extensions": { "KHR_lights_punctual": { "light": 0 } } },
                { "extensions": { "KHR_lights_punctual": { "light": 4 } } }
            ]
        }));

        assert_eq!(import.scene.lights.len(), 1);
        assert_eq!(import.scene.lights[0].kind, LightKind::Point);
        assert_eq!(import.scene.nodes[0].light, Some(0));
        assert_eq!(import.scene.nodes[1].light, None);

        let failures: Vec<_> = import.report.failures_for(NodeRef::Node(1)).collect();
        assert!(matches!(
            failures[0].error,
            HookError::DanglingReference { field: "light", index: 4, .. }
        ));
    }

    #[test]
    fn test_texture_transform() {
        let import = run(json!({
            "materials": [{
                "pbrMetallicRoughness": {
                    "baseColorTexture": {
                        "index": 0,
                        "extensions": {
                            "KHR_texture_transform": { "offset": [0.5, 0.0], "texCoord": 1 }
                        }
                    }
                },
                "extensions": { "KHR_texture_transform": {} }
            }],
            "textures": [{}]
        }));

        let binding = import.scene.material(0).unwrap().texture(TextureSlot::BaseColor).unwrap();
        assert_eq!(binding.set, 1);
        assert_eq!(binding.transform.unwrap().offset, Vec2::new(0.5, 0.0));

        // On the material itself the transform is misplaced
        let failures: Vec<_> = import.report.failures_for(NodeRef::Material(0)).collect();
        assert!(matches!(failures[0].error, HookError::Misplaced { .. }));
    }

    #[test]
    fn test_texture_transform_reports_collapse() {
        let options = ImportOptions {
            multiple_texcoord_sets: false,
            ..Default::default()
        };
        let value = json!({
            "materials": [{
                "pbrMetallicRoughness": {
                    "baseColorTexture": {
                        "index": 0,
                        "extensions": { "KHR_texture_transform": { "texCoord": 1 } }
                    }
                }
            }],
            "textures": [{}]
        });
        let import = import_value(value, &Blobs::new(), &options).unwrap();

        let slot = NodeRef::MaterialTexture {
            material: 0,
            slot: TextureSlot::BaseColor,
        };
        assert_eq!(
            import.report.diagnostics,
            vec![Diagnostic::TexcoordCollapse { node: slot, set: 1 }]
        );
    }

    #[test]
    fn test_extensions_on_rejected_material_are_quiet() {
        let import = run(json!({
            "materials": [{
                "alphaMode": "GLASS",
                "extensions": {
                    "KHR_materials_unlit": {},
                    "KHR_materials_emissive_strength": { "emissiveStrength": 2.0 }
                }
            }]
        }));

        assert!(import.scene.material(0).is_none());
        assert_eq!(import.report.diagnostics.len(), 1);
        assert!(import.report.failures.is_empty());
    }

    #[test]
    fn test_overflowing_image_view_fails_alone() {
        let value = json!({
            "buffers": [{ "byteLength": 4 }],
            "bufferViews": [{ "buffer": 0, "byteOffset": u64::MAX, "byteLength": 4 }],
            "images": [{ "bufferView": 0, "mimeType": "image/png" }],
            "materials": [{ "extensions": { "KHR_materials_unlit": {} } }]
        });
        let blobs = Blobs::new().with_buffer(vec![0; 4]);
        let import = import_value(value, &blobs, &ImportOptions::default()).unwrap();

        assert!(import.scene.material(0).unwrap().unlit);
        assert!(import.scene.images[0].is_none());

        let failures: Vec<_> = import.report.failures_for(NodeRef::Image(0)).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0].error,
            HookError::Read(ReadError::OutOfBounds { len: 4, .. })
        ));
    }

    #[test]
    fn test_hook_rejects_wrong_target() {
        let document = Document::from_value(json!({ "textures": [{}], "images": [{ "uri": "a.png" }] })).unwrap();
        let blobs = Blobs::new();
        let options = ImportOptions::default();
        let mut ctx = LinkContext::new(&document, &blobs, &options, Scene::default());

        let texture = document.textures[0].on_post_link(NodeRef::Node(0), &mut ctx);
        assert!(matches!(
            texture,
            Err(HookError::WrongTarget {
                hook: "texture",
                target: NodeRef::Node(0)
            })
        ));
        let image = document.images[0].on_post_link(NodeRef::Texture(0), &mut ctx);
        assert!(matches!(image, Err(HookError::WrongTarget { hook: "image", .. })));
    }

    #[test]
    fn test_emissive_strength() {
        let import = run(json!({
            "materials": [{
                "emissiveFactor": [1.0, 1.0, 1.0],
                "extensions": { "KHR_materials_emissive_strength": { "emissiveStrength": 5.0 } }
            }]
        }));
        let material = import.scene.material(0).unwrap();
        assert_eq!(material.emissive_strength, 5.0);
        assert!(material.is_emissive());
    }

    #[test]
    fn test_strict_mode_aborts_on_format_error() {
        let value = json!({ "materials": [{ "alphaMode": "GLASS" }] });

        let lenient = import_value(value.clone(), &Blobs::new(), &ImportOptions::default()).unwrap();
        assert!(lenient.scene.material(0).is_none());
        assert_eq!(lenient.report.diagnostics.len(), 1);

        let strict = ImportOptions {
            strict: true,
            ..Default::default()
        };
        assert!(matches!(
            import_value(value, &Blobs::new(), &strict),
            Err(ImportError::Link(LinkError::Format { .. }))
        ));
    }

    #[test]
    fn test_invalid_json_shape() {
        let result = import_value(json!({ "nodes": 3 }), &Blobs::new(), &ImportOptions::default());
        assert!(matches!(result, Err(ImportError::Json(_))));
    }
}
