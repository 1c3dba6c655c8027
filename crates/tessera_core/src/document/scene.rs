use serde::Deserialize;

use crate::extension::{ExtensionBag, Extras};
use crate::property::impl_property;

#[derive(Clone, Debug, Deserialize)]
pub struct Scene {
    pub name: Option<String>,
    /// Root node indices
    #[serde(default)]
    pub nodes: Vec<usize>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

/// A node in the hierarchy. Carries either a `matrix` or TRS components.
#[derive(Clone, Debug, Deserialize)]
pub struct Node {
    pub name: Option<String>,
    #[serde(default)]
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub camera: Option<usize>,
    /// Column-major 4x4 matrix
    pub matrix: Option<[f32; 16]>,
    pub translation: Option<[f32; 3]>,
    /// Unit quaternion, XYZW
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
    #[serde(default)]
    pub weights: Vec<f32>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skin {
    pub name: Option<String>,
    pub inverse_bind_matrices: Option<usize>,
    pub skeleton: Option<usize>,
    pub joints: Vec<usize>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Camera {
    pub name: Option<String>,
    /// "perspective" or "orthographic"
    #[serde(rename = "type")]
    pub kind: String,
    pub perspective: Option<Perspective>,
    pub orthographic: Option<Orthographic>,
    pub extensions: Option<ExtensionBag>,
    pub extras: Option<Extras>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Perspective {
    pub aspect_ratio: Option<f32>,
    pub yfov: f32,
    pub zfar: Option<f32>,
    pub znear: f32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Orthographic {
    pub xmag: f32,
    pub ymag: f32,
    pub zfar: f32,
    pub znear: f32,
}

impl_property!(Scene, Node, Skin, Camera);
