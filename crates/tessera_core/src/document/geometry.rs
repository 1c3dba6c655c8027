use std::collections::BTreeMap;

use serde::Deserialize;

use crate::extension::{ExtensionBag, Extras};
use crate::property::impl_property;

/// Typed view over a buffer view.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub name: Option<String>,
    /// Absent means all elements are zero
    pub buffer_view: Option<usize>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: u32,
    #[serde(default)]
    pub normalized: bool,
    pub count: usize,
    #[serde(rename = "type")]
    pub shape: String,
    pub min: Option<Vec<f32>>,
    pub max: Option<Vec<f32>>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub name: Option<String>,
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
    pub target: Option<u32>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

/// A binary blob. Its bytes are supplied separately through [`Blobs`](crate::buffer::Blobs).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub byte_length: usize,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
    #[serde(default)]
    pub weights: Vec<f32>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Primitive {
    /// Attribute name → accessor index
    pub attributes: BTreeMap<String, usize>,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    #[serde(default = "default_mode")]
    pub mode: u32,
    /// Morph targets, attribute name → accessor index
    #[serde(default)]
    pub targets: Vec<BTreeMap<String, usize>>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

fn default_mode() -> u32 {
    4
}

impl_property!(Accessor, BufferView, Buffer, Mesh, Primitive);
