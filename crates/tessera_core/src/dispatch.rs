//! Post-link dispatch.
//!
//! Once the [`Linker`](crate::link::Linker) has validated every reference and
//! materialized the scene, the dispatcher walks the document graph from the
//! root and runs each node's [`Property::on_post_link`](crate::property::Property::on_post_link) hook exactly once,
//! children before parents. A failing hook is recorded and the walk goes on.

use std::collections::HashSet;
use std::fmt;

use crate::buffer::Blobs;
use crate::document::Document;
use crate::import::ImportOptions;
use crate::link::Diagnostic;
use crate::media::MediaResolver;
use crate::property::{HookError, NodeRef};
use crate::scene::Scene;

/// A hook failure, attributed to the node it ran for.
#[derive(Debug)]
pub struct HookFailure {
    pub node: NodeRef,
    /// Set when the failing hook belonged to an extension
    pub extension: Option<String>,
    pub error: HookError,
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extension {
            Some(name) => write!(f, "{} ({}): {}", self.node, name, self.error),
            None => write!(f, "{}: {}", self.node, self.error),
        }
    }
}

/// Shared state handed to every hook.
///
/// The document, blobs and options are read-only for the whole dispatch; the
/// scene is owned here until dispatch completes.
pub struct LinkContext<'a> {
    document: &'a Document,
    blobs: &'a Blobs,
    options: &'a ImportOptions,
    media: MediaResolver,
    scene: Scene,
    diagnostics: Vec<Diagnostic>,
    failures: Vec<HookFailure>,
}

impl<'a> LinkContext<'a> {
    pub fn new(document: &'a Document, blobs: &'a Blobs, options: &'a ImportOptions, scene: Scene) -> Self {
        Self {
            document,
            blobs,
            options,
            media: MediaResolver::new(options.media.clone()),
            scene,
            diagnostics: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn blobs(&self) -> &'a Blobs {
        self.blobs
    }

    pub fn options(&self) -> &'a ImportOptions {
        self.options
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn media_mut(&mut self) -> &mut MediaResolver {
        &mut self.media
    }

    /// Record a hook failure. `extension` names the extension whose hook failed.
    pub fn record_failure(&mut self, node: NodeRef, extension: Option<&str>, error: HookError) {
        let failure = HookFailure {
            node,
            extension: extension.map(str::to_string),
            error,
        };
        log::warn!("Post-link hook failed: {}", failure);
        self.failures.push(failure);
    }

    /// Report a non-fatal condition found by a hook.
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        log::debug!("Post-link diagnostic: {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn into_parts(self) -> (Scene, Vec<Diagnostic>, Vec<HookFailure>) {
        (self.scene, self.diagnostics, self.failures)
    }
}

/// Walks the document graph in post-order and runs hooks.
pub struct PostLinkDispatcher<'a> {
    document: &'a Document,
}

impl<'a> PostLinkDispatcher<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Nodes owned by `node`.
    ///
    /// The root owns every top-level object. Skin joints and animation
    /// targets are references, not ownership, and are not followed.
    pub fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        let doc = self.document;
        match node {
            NodeRef::Document => {
                let mut children = Vec::new();
                children.extend((0..doc.buffers.len()).map(NodeRef::Buffer));
                children.extend((0..doc.buffer_views.len()).map(NodeRef::BufferView));
                children.extend((0..doc.accessors.len()).map(NodeRef::Accessor));
                children.extend((0..doc.samplers.len()).map(NodeRef::Sampler));
                children.extend((0..doc.images.len()).map(NodeRef::Image));
                children.extend((0..doc.textures.len()).map(NodeRef::Texture));
                children.extend((0..doc.materials.len()).map(NodeRef::Material));
                children.extend((0..doc.meshes.len()).map(NodeRef::Mesh));
                children.extend((0..doc.skins.len()).map(NodeRef::Skin));
                children.extend((0..doc.cameras.len()).map(NodeRef::Camera));
                children.extend((0..doc.nodes.len()).map(NodeRef::Node));
                children.extend((0..doc.animations.len()).map(NodeRef::Animation));
                children.extend((0..doc.scenes.len()).map(NodeRef::Scene));
                children
            }
            NodeRef::Scene(i) => doc.scenes[i].nodes.iter().copied().map(NodeRef::Node).collect(),
            NodeRef::Node(i) => {
                let n = &doc.nodes[i];
                let mut children: Vec<NodeRef> = n.children.iter().copied().map(NodeRef::Node).collect();
                children.extend(n.mesh.map(NodeRef::Mesh));
                children.extend(n.skin.map(NodeRef::Skin));
                children.extend(n.camera.map(NodeRef::Camera));
                children
            }
            NodeRef::Mesh(i) => (0..doc.meshes[i].primitives.len())
                .map(|primitive| NodeRef::Primitive { mesh: i, primitive })
                .collect(),
            NodeRef::Primitive { mesh, primitive } => {
                let p = &doc.meshes[mesh].primitives[primitive];
                let mut children: Vec<NodeRef> = p.attributes.values().copied().map(NodeRef::Accessor).collect();
                for target in &p.targets {
                    children.extend(target.values().copied().map(NodeRef::Accessor));
                }
                children.extend(p.indices.map(NodeRef::Accessor));
                children.extend(p.material.map(NodeRef::Material));
                children
            }
            NodeRef::Accessor(i) => doc.accessors[i].buffer_view.map(NodeRef::BufferView).into_iter().collect(),
            NodeRef::BufferView(i) => vec![NodeRef::Buffer(doc.buffer_views[i].buffer)],
            NodeRef::Buffer(_) | NodeRef::Sampler(_) | NodeRef::Camera(_) => Vec::new(),
            NodeRef::Material(i) => doc.materials[i]
                .textures()
                .map(|(slot, _)| NodeRef::MaterialTexture { material: i, slot })
                .collect(),
            NodeRef::MaterialTexture { material, slot } => doc.materials[material]
                .texture(slot)
                .map(|info| NodeRef::Texture(info.index))
                .into_iter()
                .collect(),
            NodeRef::Texture(i) => {
                let t = &doc.textures[i];
                let mut children: Vec<NodeRef> = t.source.map(NodeRef::Image).into_iter().collect();
                children.extend(t.sampler.map(NodeRef::Sampler));
                children
            }
            NodeRef::Image(i) => doc.images[i].buffer_view.map(NodeRef::BufferView).into_iter().collect(),
            NodeRef::Animation(i) => {
                let a = &doc.animations[i];
                let mut children: Vec<NodeRef> = (0..a.samplers.len())
                    .map(|sampler| NodeRef::AnimationSampler { animation: i, sampler })
                    .collect();
                children.extend((0..a.channels.len()).map(|channel| NodeRef::Channel { animation: i, channel }));
                children
            }
            NodeRef::Channel { animation, channel } => {
                let sampler = doc.animations[animation].channels[channel].sampler;
                vec![NodeRef::AnimationSampler { animation, sampler }]
            }
            NodeRef::AnimationSampler { animation, sampler } => {
                let s = &doc.animations[animation].samplers[sampler];
                vec![NodeRef::Accessor(s.input), NodeRef::Accessor(s.output)]
            }
            NodeRef::Skin(i) => doc.skins[i]
                .inverse_bind_matrices
                .map(NodeRef::Accessor)
                .into_iter()
                .collect(),
        }
    }

    /// Post-order walk from the root, each node identity once.
    ///
    /// The document must be linked: every index is assumed valid.
    pub fn order(&self) -> Vec<NodeRef> {
        let mut order = Vec::new();
        let mut entered = HashSet::new();
        let mut stack = vec![(NodeRef::Document, false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !entered.insert(node) {
                continue;
            }

            stack.push((node, true));
            for child in self.children(node).into_iter().rev() {
                if !entered.contains(&child) {
                    stack.push((child, false));
                }
            }
        }

        order
    }

    /// Run every hook and return the dispatch order.
    pub fn run(&self, ctx: &mut LinkContext<'_>) -> Vec<NodeRef> {
        let order = self.order();
        log::debug!("Dispatching post-link hooks for {} nodes", order.len());

        for &node in &order {
            let Some(property) = self.document.property(node) else {
                ctx.record_failure(node, None, HookError::MissingObject(node));
                continue;
            };
            if let Err(error) = property.on_post_link(node, ctx) {
                ctx.record_failure(node, None, error);
            }
        }

        order
    }
}
