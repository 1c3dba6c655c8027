//! Format registry: glTF codes and names resolved to engine enumerations.
//!
//! Every table here is `const` data, so lookups need no initialization or
//! locking and can run from any number of threads. Each enumeration carries
//! its inverse (`code()` / `name()`), and the forward lookup is a search over
//! the enumeration's `ALL` table for the matching inverse. That keeps a single
//! source of truth per mapping and makes round-trips exact.
//!
//! A code outside a table's domain resolves to [`FormatError::UnknownCode`].
//! Nothing here falls back to a default value; callers decide whether an
//! unknown code is fatal or skippable.

use std::fmt;

use thiserror::Error;

use crate::layout::AccessorUsage;

/// Errors produced when a format code or pairing cannot be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unknown {domain}: {code}")]
    UnknownCode { domain: &'static str, code: String },

    #[error("Invalid combination: {component_type:?} {shape:?} is not allowed for {usage:?}")]
    InvalidCombination {
        component_type: ComponentType,
        shape: VectorShape,
        usage: AccessorUsage,
    },

    #[error("Primitive mode {0:?} requires index expansion before use")]
    UnsupportedTopologyWithoutExpansion(PrimitiveMode),

    #[error("Unsupported animation path: {0}")]
    UnsupportedAnimationPath(String),
}

/// Result type for registry lookups.
pub type FormatResult<T> = Result<T, FormatError>;

fn lookup<T: Copy>(
    all: &[T],
    domain: &'static str,
    code: impl fmt::Display,
    matches: impl Fn(&T) -> bool,
) -> FormatResult<T> {
    all.iter()
        .copied()
        .find(|candidate| matches(candidate))
        .ok_or_else(|| FormatError::UnknownCode {
            domain,
            code: code.to_string(),
        })
}

// ============================================================================
// Vertex attributes
// ============================================================================

/// Logical role of a vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semantic {
    Position,
    Normal,
    Tangent,
    Texcoord,
    Color,
    JointIndices,
    JointWeights,
}

/// A semantic plus the set index that distinguishes repeated semantics.
///
/// `TEXCOORD_0` and `TEXCOORD_1` share [`Semantic::Texcoord`] and differ only
/// by `set`. Whether a consumer can hold both is its own capability; the
/// linker reports a collapse when it cannot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexAttribute {
    pub semantic: Semantic,
    pub set: u32,
}

impl VertexAttribute {
    /// Every attribute the registry declares.
    pub const ALL: [VertexAttribute; 8] = [
        VertexAttribute::new(Semantic::Position, 0),
        VertexAttribute::new(Semantic::Normal, 0),
        VertexAttribute::new(Semantic::Tangent, 0),
        VertexAttribute::new(Semantic::Texcoord, 0),
        VertexAttribute::new(Semantic::Texcoord, 1),
        VertexAttribute::new(Semantic::Color, 0),
        VertexAttribute::new(Semantic::JointIndices, 0),
        VertexAttribute::new(Semantic::JointWeights, 0),
    ];

    pub const fn new(semantic: Semantic, set: u32) -> Self {
        Self { semantic, set }
    }

    /// The glTF attribute name, or `None` for a pair outside the registry.
    pub fn format_name(&self) -> Option<&'static str> {
        let name = match (self.semantic, self.set) {
            (Semantic::Position, 0) => "POSITION",
            (Semantic::Normal, 0) => "NORMAL",
            (Semantic::Tangent, 0) => "TANGENT",
            (Semantic::Texcoord, 0) => "TEXCOORD_0",
            (Semantic::Texcoord, 1) => "TEXCOORD_1",
            (Semantic::Color, 0) => "COLOR_0",
            (Semantic::JointIndices, 0) => "JOINTS_0",
            (Semantic::JointWeights, 0) => "WEIGHTS_0",
            _ => return None,
        };
        Some(name)
    }
}

/// Resolve a glTF attribute name (`POSITION`, `TEXCOORD_1`, ...).
pub fn semantic_for(name: &str) -> FormatResult<VertexAttribute> {
    lookup(&VertexAttribute::ALL, "vertex attribute", name, |attr| {
        attr.format_name() == Some(name)
    })
}

// ============================================================================
// Component types and vector shapes
// ============================================================================

/// Storage type of a single accessor component. Discriminants are the glTF codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ComponentType {
    I8 = 5120,
    U8 = 5121,
    I16 = 5122,
    U16 = 5123,
    U32 = 5125,
    F32 = 5126,
}

impl ComponentType {
    pub const ALL: [ComponentType; 6] = [
        ComponentType::I8,
        ComponentType::U8,
        ComponentType::I16,
        ComponentType::U16,
        ComponentType::U32,
        ComponentType::F32,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Width of one component in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::U32 | ComponentType::F32 => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ComponentType::F32)
    }

    pub fn is_integral(self) -> bool {
        !self.is_float()
    }
}

/// Resolve an accessor `componentType` code.
pub fn component_type(code: u32) -> FormatResult<ComponentType> {
    lookup(&ComponentType::ALL, "component type", code, |ty| ty.code() == code)
}

/// Element shape of an accessor (`type` in glTF).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VectorShape {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl VectorShape {
    pub const ALL: [VectorShape; 7] = [
        VectorShape::Scalar,
        VectorShape::Vec2,
        VectorShape::Vec3,
        VectorShape::Vec4,
        VectorShape::Mat2,
        VectorShape::Mat3,
        VectorShape::Mat4,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VectorShape::Scalar => "SCALAR",
            VectorShape::Vec2 => "VEC2",
            VectorShape::Vec3 => "VEC3",
            VectorShape::Vec4 => "VEC4",
            VectorShape::Mat2 => "MAT2",
            VectorShape::Mat3 => "MAT3",
            VectorShape::Mat4 => "MAT4",
        }
    }

    /// Number of components in one element.
    pub fn component_count(self) -> usize {
        match self {
            VectorShape::Scalar => 1,
            VectorShape::Vec2 => 2,
            VectorShape::Vec3 => 3,
            VectorShape::Vec4 | VectorShape::Mat2 => 4,
            VectorShape::Mat3 => 9,
            VectorShape::Mat4 => 16,
        }
    }
}

/// Resolve an accessor `type` string.
pub fn vector_shape(name: &str) -> FormatResult<VectorShape> {
    lookup(&VectorShape::ALL, "accessor type", name, |shape| {
        shape.name() == name
    })
}

// ============================================================================
// Topology
// ============================================================================

/// Primitive `mode` as declared by the format. Discriminants are the glTF codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrimitiveMode {
    Points = 0,
    Lines = 1,
    LineLoop = 2,
    LineStrip = 3,
    Triangles = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

impl PrimitiveMode {
    pub const ALL: [PrimitiveMode; 7] = [
        PrimitiveMode::Points,
        PrimitiveMode::Lines,
        PrimitiveMode::LineLoop,
        PrimitiveMode::LineStrip,
        PrimitiveMode::Triangles,
        PrimitiveMode::TriangleStrip,
        PrimitiveMode::TriangleFan,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    /// The engine topology this mode maps to without rewriting indices.
    pub fn direct_topology(self) -> Option<Topology> {
        match self {
            PrimitiveMode::Points => Some(Topology::Points),
            PrimitiveMode::Lines => Some(Topology::Lines),
            PrimitiveMode::Triangles => Some(Topology::Triangles),
            PrimitiveMode::TriangleStrip => Some(Topology::TriangleStrip),
            PrimitiveMode::LineLoop | PrimitiveMode::LineStrip | PrimitiveMode::TriangleFan => None,
        }
    }

    /// The topology produced once indices have been expanded.
    pub fn expanded_topology(self) -> Topology {
        match self {
            PrimitiveMode::LineLoop | PrimitiveMode::LineStrip => Topology::Lines,
            PrimitiveMode::TriangleFan => Topology::Triangles,
            other => other.direct_topology().unwrap_or(Topology::Triangles),
        }
    }
}

/// Topologies the engine represents natively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Points,
    Lines,
    Triangles,
    TriangleStrip,
}

impl Topology {
    /// Inverse of [`PrimitiveMode::direct_topology`].
    pub fn mode(self) -> PrimitiveMode {
        match self {
            Topology::Points => PrimitiveMode::Points,
            Topology::Lines => PrimitiveMode::Lines,
            Topology::Triangles => PrimitiveMode::Triangles,
            Topology::TriangleStrip => PrimitiveMode::TriangleStrip,
        }
    }
}

/// Resolve a primitive `mode` code to its declared mode.
pub fn primitive_mode(code: u32) -> FormatResult<PrimitiveMode> {
    lookup(&PrimitiveMode::ALL, "primitive mode", code, |mode| mode.code() == code)
}

/// Resolve a primitive `mode` code directly to an engine topology.
///
/// Line loops, line strips and triangle fans are known modes, but they have
/// no 1:1 engine equivalent and yield
/// [`FormatError::UnsupportedTopologyWithoutExpansion`].
pub fn topology(code: u32) -> FormatResult<Topology> {
    let mode = primitive_mode(code)?;
    mode.direct_topology()
        .ok_or(FormatError::UnsupportedTopologyWithoutExpansion(mode))
}

// ============================================================================
// Sampler settings
// ============================================================================

/// Texel filter used by the engine sampler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// A filter plus an optional mipmap filter.
///
/// Magnification filters never carry a mipmap filter; minification filters
/// may.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerFilter {
    pub filter: FilterMode,
    pub mipmap: Option<FilterMode>,
}

impl SamplerFilter {
    pub const ALL: [SamplerFilter; 6] = [
        SamplerFilter::new(FilterMode::Nearest, None),
        SamplerFilter::new(FilterMode::Linear, None),
        SamplerFilter::new(FilterMode::Nearest, Some(FilterMode::Nearest)),
        SamplerFilter::new(FilterMode::Linear, Some(FilterMode::Nearest)),
        SamplerFilter::new(FilterMode::Nearest, Some(FilterMode::Linear)),
        SamplerFilter::new(FilterMode::Linear, Some(FilterMode::Linear)),
    ];

    pub const fn new(filter: FilterMode, mipmap: Option<FilterMode>) -> Self {
        Self { filter, mipmap }
    }

    pub fn code(self) -> u32 {
        match (self.filter, self.mipmap) {
            (FilterMode::Nearest, None) => 9728,
            (FilterMode::Linear, None) => 9729,
            (FilterMode::Nearest, Some(FilterMode::Nearest)) => 9984,
            (FilterMode::Linear, Some(FilterMode::Nearest)) => 9985,
            (FilterMode::Nearest, Some(FilterMode::Linear)) => 9986,
            (FilterMode::Linear, Some(FilterMode::Linear)) => 9987,
        }
    }
}

/// Resolve a sampler `magFilter` / `minFilter` code.
pub fn filter_mode(code: u32) -> FormatResult<SamplerFilter> {
    lookup(&SamplerFilter::ALL, "filter mode", code, |filter| filter.code() == code)
}

/// Texture coordinate wrapping. Discriminants are the glTF codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum WrapMode {
    Clamp = 33071,
    Mirror = 33648,
    #[default]
    Repeat = 10497,
}

impl WrapMode {
    pub const ALL: [WrapMode; 3] = [WrapMode::Clamp, WrapMode::Mirror, WrapMode::Repeat];

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Resolve a sampler `wrapS` / `wrapT` code.
pub fn wrap_mode(code: u32) -> FormatResult<WrapMode> {
    lookup(&WrapMode::ALL, "wrap mode", code, |mode| mode.code() == code)
}

// ============================================================================
// Animation
// ============================================================================

/// Transform property an animation channel drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformProperty {
    Position,
    Orientation,
    Scale,
}

impl TransformProperty {
    pub const ALL: [TransformProperty; 3] = [
        TransformProperty::Position,
        TransformProperty::Orientation,
        TransformProperty::Scale,
    ];

    /// Channel `path` in the document.
    pub fn path(self) -> &'static str {
        match self {
            TransformProperty::Position => "translation",
            TransformProperty::Orientation => "rotation",
            TransformProperty::Scale => "scale",
        }
    }

    /// Property name on the target object.
    pub fn property_name(self) -> &'static str {
        match self {
            TransformProperty::Position => "position",
            TransformProperty::Orientation => "orientation",
            TransformProperty::Scale => "scale",
        }
    }
}

/// Resolve a channel target `path`. Anything other than the three transform
/// paths, `weights` included, is rejected.
pub fn animation_target(path: &str) -> FormatResult<TransformProperty> {
    TransformProperty::ALL
        .iter()
        .copied()
        .find(|property| property.path() == path)
        .ok_or_else(|| FormatError::UnsupportedAnimationPath(path.to_string()))
}

/// Keyframe interpolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Linear,
    Step,
    CubicSpline,
}

impl Interpolation {
    pub const ALL: [Interpolation; 3] = [
        Interpolation::Linear,
        Interpolation::Step,
        Interpolation::CubicSpline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Interpolation::Linear => "LINEAR",
            Interpolation::Step => "STEP",
            Interpolation::CubicSpline => "CUBICSPLINE",
        }
    }
}

pub fn interpolation(name: &str) -> FormatResult<Interpolation> {
    lookup(&Interpolation::ALL, "interpolation", name, |mode| mode.name() == name)
}

// ============================================================================
// Materials and buffers
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl AlphaMode {
    pub const ALL: [AlphaMode; 3] = [AlphaMode::Opaque, AlphaMode::Mask, AlphaMode::Blend];

    pub fn name(self) -> &'static str {
        match self {
            AlphaMode::Opaque => "OPAQUE",
            AlphaMode::Mask => "MASK",
            AlphaMode::Blend => "BLEND",
        }
    }
}

pub fn alpha_mode(name: &str) -> FormatResult<AlphaMode> {
    lookup(&AlphaMode::ALL, "alpha mode", name, |mode| mode.name() == name)
}

/// Intended GPU binding of a buffer view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BufferTarget {
    ArrayBuffer = 34962,
    ElementArrayBuffer = 34963,
}

impl BufferTarget {
    pub const ALL: [BufferTarget; 2] = [BufferTarget::ArrayBuffer, BufferTarget::ElementArrayBuffer];

    pub fn code(self) -> u32 {
        self as u32
    }
}

pub fn buffer_target(code: u32) -> FormatResult<BufferTarget> {
    lookup(&BufferTarget::ALL, "buffer target", code, |target| target.code() == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_lookup_is_total_over_domain() {
        for attribute in VertexAttribute::ALL {
            let name = attribute.format_name().unwrap();
            assert_eq!(semantic_for(name).unwrap(), attribute);
            // Same input, same answer
            assert_eq!(semantic_for(name), semantic_for(name));
        }
    }

    #[test]
    fn test_unknown_attribute_is_explicit() {
        for name in ["TEXCOORD_2", "COLOR_1", "_CUSTOM", "position", ""] {
            assert!(matches!(
                semantic_for(name),
                Err(FormatError::UnknownCode { domain: "vertex attribute", .. })
            ));
        }
    }

    #[test]
    fn test_texcoord_sets_share_semantic() {
        let set0 = semantic_for("TEXCOORD_0").unwrap();
        let set1 = semantic_for("TEXCOORD_1").unwrap();
        assert_eq!(set0.semantic, set1.semantic);
        assert_ne!(set0, set1);
    }

    #[test]
    fn test_component_type_widths() {
        let expected = [
            (5120, 1, false),
            (5121, 1, false),
            (5122, 2, false),
            (5123, 2, false),
            (5125, 4, false),
            (5126, 4, true),
        ];
        for (code, width, float) in expected {
            let ty = component_type(code).unwrap();
            assert_eq!(ty.byte_width(), width);
            assert_eq!(ty.is_float(), float);
            assert_eq!(ty.code(), code);
        }
        // 5124 (signed int) is not a glTF component type
        assert!(component_type(5124).is_err());
    }

    #[test]
    fn test_vector_shape_counts() {
        let expected = [
            ("SCALAR", 1),
            ("VEC2", 2),
            ("VEC3", 3),
            ("VEC4", 4),
            ("MAT2", 4),
            ("MAT3", 9),
            ("MAT4", 16),
        ];
        for (name, count) in expected {
            let shape = vector_shape(name).unwrap();
            assert_eq!(shape.component_count(), count);
            assert_eq!(shape.name(), name);
        }
        assert!(vector_shape("vec3").is_err());
    }

    #[test]
    fn test_topology_resolution() {
        assert_eq!(topology(4).unwrap(), Topology::Triangles);
        assert_eq!(topology(5).unwrap(), Topology::TriangleStrip);
        assert_eq!(topology(0).unwrap(), Topology::Points);
        assert_eq!(topology(1).unwrap(), Topology::Lines);

        assert_eq!(
            topology(6),
            Err(FormatError::UnsupportedTopologyWithoutExpansion(PrimitiveMode::TriangleFan))
        );
        assert_eq!(
            topology(2),
            Err(FormatError::UnsupportedTopologyWithoutExpansion(PrimitiveMode::LineLoop))
        );
        assert!(matches!(topology(7), Err(FormatError::UnknownCode { .. })));
    }

    #[test]
    fn test_filter_mapping_is_injective() {
        let codes: Vec<u32> = SamplerFilter::ALL.iter().map(|f| f.code()).collect();
        let mut unique = codes.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());

        let filter = filter_mode(9987).unwrap();
        assert_eq!(filter.filter, FilterMode::Linear);
        assert_eq!(filter.mipmap, Some(FilterMode::Linear));
        assert!(filter_mode(9730).is_err());
    }

    #[test]
    fn test_wrap_modes() {
        assert_eq!(wrap_mode(33071).unwrap(), WrapMode::Clamp);
        assert_eq!(wrap_mode(33648).unwrap(), WrapMode::Mirror);
        assert_eq!(wrap_mode(10497).unwrap(), WrapMode::Repeat);
        assert!(wrap_mode(0).is_err());
    }

    #[test]
    fn test_animation_paths() {
        assert_eq!(animation_target("translation").unwrap().property_name(), "position");
        assert_eq!(animation_target("rotation").unwrap().property_name(), "orientation");
        assert_eq!(animation_target("scale").unwrap().property_name(), "scale");
        assert_eq!(
            animation_target("weights"),
            Err(FormatError::UnsupportedAnimationPath("weights".to_string()))
        );
    }

    #[test]
    fn test_codes_round_trip() {
        for ty in ComponentType::ALL {
            assert_eq!(component_type(ty.code()).unwrap(), ty);
        }
        for shape in VectorShape::ALL {
            assert_eq!(vector_shape(shape.name()).unwrap(), shape);
        }
        for mode in PrimitiveMode::ALL {
            assert_eq!(primitive_mode(mode.code()).unwrap(), mode);
            if let Some(topo) = mode.direct_topology() {
                assert_eq!(topo.mode(), mode);
            }
        }
        for filter in SamplerFilter::ALL {
            assert_eq!(filter_mode(filter.code()).unwrap(), filter);
        }
        for wrap in WrapMode::ALL {
            assert_eq!(wrap_mode(wrap.code()).unwrap(), wrap);
        }
        for property in TransformProperty::ALL {
            assert_eq!(animation_target(property.path()).unwrap(), property);
        }
        for mode in AlphaMode::ALL {
            assert_eq!(alpha_mode(mode.name()).unwrap(), mode);
        }
        for mode in Interpolation::ALL {
            assert_eq!(interpolation(mode.name()).unwrap(), mode);
        }
        for target in BufferTarget::ALL {
            assert_eq!(buffer_target(target.code()).unwrap(), target);
        }
    }
}
