//! Element layout resolution for accessors.
//!
//! Combines a [`ComponentType`] and a [`VectorShape`] into an
//! [`ElementLayout`], checking the pair against the validity table for the
//! place the accessor is used. The same accessor may be legal as a vertex
//! color and illegal as an index buffer, so the usage is part of the input.

use crate::registry::{ComponentType, FormatError, FormatResult, Semantic, TransformProperty, VectorShape};

/// Where an accessor is consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessorUsage {
    /// Primitive `indices`
    Index,
    /// Primitive vertex attribute
    Vertex(Semantic),
    /// Animation sampler keyframe times
    AnimationInput,
    /// Animation sampler values for a transform property
    AnimationOutput(TransformProperty),
    /// Skin inverse bind matrices
    InverseBindMatrices,
    /// No usage-specific rules beyond the format's global ones
    Generic,
}

use ComponentType::{F32, I16, I8, U16, U32, U8};
use VectorShape::{Mat2, Mat3, Mat4, Scalar, Vec2, Vec3, Vec4};

const ANY_SHAPE: &[VectorShape] = &[Scalar, Vec2, Vec3, Vec4, Mat2, Mat3, Mat4];
// UNSIGNED_INT is reserved for indices
const NON_INDEX_TYPES: &[ComponentType] = &[I8, U8, I16, U16, F32];

/// Allowed shapes and component types for each usage.
fn allowed(usage: AccessorUsage) -> (&'static [VectorShape], &'static [ComponentType]) {
    match usage {
        AccessorUsage::Index => (&[Scalar], &[U8, U16, U32]),
        AccessorUsage::Vertex(semantic) => match semantic {
            Semantic::Position | Semantic::Normal => (&[Vec3], &[F32]),
            Semantic::Tangent => (&[Vec4], &[F32]),
            Semantic::Texcoord => (&[Vec2], &[F32, U8, U16]),
            Semantic::Color => (&[Vec3, Vec4], &[F32, U8, U16]),
            Semantic::JointIndices => (&[Vec4], &[U8, U16]),
            Semantic::JointWeights => (&[Vec4], &[F32, U8, U16]),
        },
        AccessorUsage::AnimationInput => (&[Scalar], &[F32]),
        AccessorUsage::AnimationOutput(property) => match property {
            TransformProperty::Position | TransformProperty::Scale => (&[Vec3], &[F32]),
            TransformProperty::Orientation => (&[Vec4], &[F32, I8, U8, I16, U16]),
        },
        AccessorUsage::InverseBindMatrices => (&[Mat4], &[F32]),
        AccessorUsage::Generic => (ANY_SHAPE, NON_INDEX_TYPES),
    }
}

/// Size and numeric domain of one accessor element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementLayout {
    pub component_type: ComponentType,
    pub shape: VectorShape,
    pub usage: AccessorUsage,
    /// Bytes per element: component count × component width
    pub byte_size: usize,
    /// True for integer component types
    pub integral: bool,
}

impl ElementLayout {
    pub fn component_count(&self) -> usize {
        self.shape.component_count()
    }

    /// Whether integer values must be mapped to the unit range before use.
    ///
    /// Texcoords, colors, weights and quantized rotations are always
    /// normalized when stored as integers; other usages honour the
    /// accessor's `normalized` flag. Indices and joint indices never are.
    pub fn needs_normalization(&self, normalized: bool) -> bool {
        if !self.integral {
            return false;
        }
        match self.usage {
            AccessorUsage::Index | AccessorUsage::Vertex(Semantic::JointIndices) => false,
            AccessorUsage::Vertex(Semantic::Texcoord | Semantic::Color | Semantic::JointWeights)
            | AccessorUsage::AnimationOutput(TransformProperty::Orientation) => true,
            _ => normalized,
        }
    }
}

/// Bytes per element for any (type, shape) pair, without validity checks.
pub fn element_size(component_type: ComponentType, shape: VectorShape) -> usize {
    shape.component_count() * component_type.byte_width()
}

/// Resolve the layout of an accessor element for a given usage.
///
/// Fails with [`FormatError::InvalidCombination`] when the usage does not
/// allow the pair, e.g. a float index buffer.
pub fn resolve_element(
    component_type: ComponentType,
    shape: VectorShape,
    usage: AccessorUsage,
) -> FormatResult<ElementLayout> {
    let (shapes, types) = allowed(usage);
    if !shapes.contains(&shape) || !types.contains(&component_type) {
        return Err(FormatError::InvalidCombination {
            component_type,
            shape,
            usage,
        });
    }

    Ok(ElementLayout {
        component_type,
        shape,
        usage,
        byte_size: element_size(component_type, shape),
        integral: component_type.is_integral(),
    })
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    bytemuck::pod_read_unaligned(&bytes[..N])
}

/// Decode one little-endian component as `f32`.
///
/// `bytes` must hold at least `component_type.byte_width()` bytes. Integer
/// values are mapped to [0, 1] (unsigned) or [-1, 1] (signed) when
/// `normalize` is set.
pub fn read_component_f32(component_type: ComponentType, bytes: &[u8], normalize: bool) -> f32 {
    match component_type {
        ComponentType::F32 => f32::from_le_bytes(le(bytes)),
        ComponentType::I8 => {
            let value = i8::from_le_bytes(le(bytes)) as f32;
            if normalize { (value / 127.0).max(-1.0) } else { value }
        }
        ComponentType::U8 => {
            let value = u8::from_le_bytes(le(bytes)) as f32;
            if normalize { value / 255.0 } else { value }
        }
        ComponentType::I16 => {
            let value = i16::from_le_bytes(le(bytes)) as f32;
            if normalize { (value / 32767.0).max(-1.0) } else { value }
        }
        ComponentType::U16 => {
            let value = u16::from_le_bytes(le(bytes)) as f32;
            if normalize { value / 65535.0 } else { value }
        }
        ComponentType::U32 => {
            let value = u32::from_le_bytes(le(bytes)) as f32;
            if normalize { value / u32::MAX as f32 } else { value }
        }
    }
}

/// Decode one unsigned integer component. Returns `None` for signed or
/// floating types.
pub fn read_component_u32(component_type: ComponentType, bytes: &[u8]) -> Option<u32> {
    match component_type {
        ComponentType::U8 => Some(u8::from_le_bytes(le(bytes)) as u32),
        ComponentType::U16 => Some(u16::from_le_bytes(le(bytes)) as u32),
        ComponentType::U32 => Some(u32::from_le_bytes(le(bytes))),
        _ => None,
    }
}
