//! CPU-side mesh data read from a linked primitive.
//!
//! [`MeshData::read`] pulls the typed vertex streams and indices out of the
//! blobs for one [`GeometryPrimitive`], expanding line loops, line strips and
//! triangle fans so consumers only see direct topologies.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3, Vec4};

use crate::buffer::{AccessorBinding, Blobs, ReadError, ReadResult};
use crate::registry::{PrimitiveMode, Semantic, Topology, VertexAttribute};
use crate::scene::{GeometryPrimitive, TopologyResolution};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Diagonal length.
    pub fn size(&self) -> f32 {
        (self.max - self.min).length()
    }
}

/// Expand a primitive mode's indices into a directly supported topology.
///
/// Line strips and loops become line lists, triangle fans become triangle
/// lists; direct modes are returned unchanged.
pub fn expand_indices(mode: PrimitiveMode, indices: &[u32]) -> (Topology, Vec<u32>) {
    let mut expanded = Vec::new();
    match mode {
        PrimitiveMode::LineStrip | PrimitiveMode::LineLoop => {
            for pair in indices.windows(2) {
                expanded.extend_from_slice(pair);
            }
            if mode == PrimitiveMode::LineLoop && indices.len() > 1 {
                expanded.push(indices[indices.len() - 1]);
                expanded.push(indices[0]);
            }
        }
        PrimitiveMode::TriangleFan => {
            // (0,1,2), (0,2,3), ... (0,n-2,n-1)
            for i in 1..indices.len().saturating_sub(1) {
                expanded.push(indices[0]);
                expanded.push(indices[i]);
                expanded.push(indices[i + 1]);
            }
        }
        direct => return (direct.expanded_topology(), indices.to_vec()),
    }
    (mode.expanded_topology(), expanded)
}

/// Vertex streams and indices of one primitive.
#[derive(Clone, Debug)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    /// UVs by texcoord set
    pub texcoords: BTreeMap<u32, Vec<Vec2>>,
    pub colors: Option<Vec<Vec4>>,
    pub indices: Vec<u32>,
    pub topology: Topology,
    pub bounds: Option<Bounds>,
}

impl MeshData {
    /// Read a primitive's streams from `blobs`.
    pub fn read(primitive: &GeometryPrimitive, blobs: &Blobs) -> ReadResult<Self> {
        let positions = primitive
            .source(VertexAttribute::new(Semantic::Position, 0))
            .ok_or(ReadError::MissingAttribute("POSITION"))?;
        let positions: Vec<Vec3> = read_vec3(positions, blobs)?;

        let normals = primitive
            .source(VertexAttribute::new(Semantic::Normal, 0))
            .map(|binding| read_vec3(binding, blobs))
            .transpose()?;

        let mut texcoords = BTreeMap::new();
        for (attribute, binding) in &primitive.sources {
            if attribute.semantic == Semantic::Texcoord {
                let uvs = binding
                    .read_f32(blobs)?
                    .chunks_exact(2)
                    .map(|c| Vec2::new(c[0], c[1]))
                    .collect();
                texcoords.insert(attribute.set, uvs);
            }
        }

        let colors = primitive
            .source(VertexAttribute::new(Semantic::Color, 0))
            .map(|binding| read_colors(binding, blobs))
            .transpose()?;

        let indices = match &primitive.elements {
            Some(elements) => elements.read_u32(blobs)?,
            None => sequential_indices(positions.len())?,
        };
        let (topology, indices) = match primitive.topology {
            TopologyResolution::Direct(topology) => (topology, indices),
            TopologyResolution::RequiresExpansion(mode) => expand_indices(mode, &indices),
        };

        let bounds = Bounds::from_points(&positions);
        Ok(Self {
            positions,
            normals,
            texcoords,
            colors,
            indices,
            topology,
            bounds,
        })
    }

    /// Triangles as index triplets. Empty for point and line topologies.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        match self.topology {
            Topology::Triangles => self
                .indices
                .chunks_exact(3)
                .map(|t| [t[0], t[1], t[2]])
                .collect(),
            // Odd strip triangles swap their last two vertices to keep winding
            Topology::TriangleStrip => self
                .indices
                .windows(3)
                .enumerate()
                .map(|(i, t)| if i % 2 == 0 { [t[0], t[1], t[2]] } else { [t[0], t[2], t[1]] })
                .collect(),
            Topology::Points | Topology::Lines => Vec::new(),
        }
    }

    /// Compute smooth vertex normals by averaging face normals.
    ///
    /// Faces are counter-clockwise when viewed from the front.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for [i0, i1, i2] in self.triangles() {
            let (i0, i1, i2) = (i0 as usize, i1 as usize, i2 as usize);
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }

            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            // Degenerate or unreferenced vertices point up
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = Some(normals);
    }

    /// Ensure the mesh has one normal per vertex, computing them if necessary.
    pub fn ensure_normals(&mut self) {
        match &self.normals {
            Some(normals) if normals.len() == self.positions.len() => {}
            Some(normals) => {
                log::debug!(
                    "Normals array length ({}) doesn't match vertex count ({}), computing smooth normals",
                    normals.len(),
                    self.positions.len()
                );
                self.compute_normals();
            }
            None => self.compute_normals(),
        }
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles().len()
    }
}

/// `0..count` as indices, for primitives drawn without an index accessor.
fn sequential_indices(count: usize) -> ReadResult<Vec<u32>> {
    let count = u32::try_from(count).map_err(|_| ReadError::TooManyVertices(count))?;
    Ok((0..count).collect())
}

fn read_vec3(binding: &AccessorBinding, blobs: &Blobs) -> ReadResult<Vec<Vec3>> {
    Ok(binding
        .read_f32(blobs)?
        .chunks_exact(3)
        .map(Vec3::from_slice)
        .collect())
}

/// RGB colors get an opaque alpha.
fn read_colors(binding: &AccessorBinding, blobs: &Blobs) -> ReadResult<Vec<Vec4>> {
    let values = binding.read_f32(blobs)?;
    let colors = match binding.layout.component_count() {
        3 => values.chunks_exact(3).map(|c| Vec3::from_slice(c).extend(1.0)).collect(),
        _ => values.chunks_exact(4).map(Vec4::from_slice).collect(),
    };
    Ok(colors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferWindow;
    use crate::layout::{resolve_element, AccessorUsage};
    use crate::registry::{ComponentType, VectorShape};

    fn binding(component_type: ComponentType, shape: VectorShape, usage: AccessorUsage, offset: usize, count: usize) -> AccessorBinding {
        let layout = resolve_element(component_type, shape, usage).unwrap();
        AccessorBinding {
            accessor: 0,
            layout,
            count,
            normalize: layout.needs_normalization(false),
            window: Some(BufferWindow {
                buffer: 0,
                offset,
                stride: layout.byte_size,
                count,
                element_size: layout.byte_size,
            }),
        }
    }

    /// A unit quad as a 4-vertex fan with u16 indices after the positions.
    fn quad_fan() -> (GeometryPrimitive, Blobs) {
        let positions = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let mut data: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
        data.extend([0u16, 1, 2, 3].iter().flat_map(|v| v.to_le_bytes()));

        let primitive = GeometryPrimitive {
            index: 0,
            sources: vec![(
                VertexAttribute::new(Semantic::Position, 0),
                binding(
                    ComponentType::F32,
                    VectorShape::Vec3,
                    AccessorUsage::Vertex(Semantic::Position),
                    0,
                    4,
                ),
            )],
            elements: Some(binding(ComponentType::U16, VectorShape::Scalar, AccessorUsage::Index, 48, 4)),
            topology: TopologyResolution::RequiresExpansion(PrimitiveMode::TriangleFan),
            material: None,
        };
        (primitive, Blobs::new().with_buffer(data))
    }

    #[test]
    fn test_expand_fan() {
        let (topology, indices) = expand_indices(PrimitiveMode::TriangleFan, &[0, 1, 2, 3, 4]);
        assert_eq!(topology, Topology::Triangles);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);

        let (_, degenerate) = expand_indices(PrimitiveMode::TriangleFan, &[0, 1]);
        assert!(degenerate.is_empty());
    }

    #[test]
    fn test_expand_lines() {
        let (topology, strip) = expand_indices(PrimitiveMode::LineStrip, &[0, 1, 2]);
        assert_eq!(topology, Topology::Lines);
        assert_eq!(strip, vec![0, 1, 1, 2]);

        let (_, looped) = expand_indices(PrimitiveMode::LineLoop, &[0, 1, 2]);
        assert_eq!(looped, vec![0, 1, 1, 2, 2, 0]);
    }

    #[test]
    fn test_direct_modes_pass_through() {
        let (topology, indices) = expand_indices(PrimitiveMode::Triangles, &[2, 1, 0]);
        assert_eq!(topology, Topology::Triangles);
        assert_eq!(indices, vec![2, 1, 0]);
    }

    #[test]
    fn test_read_fan_primitive() {
        let (primitive, blobs) = quad_fan();
        let mut mesh = MeshData::read(&primitive, &blobs).unwrap();

        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.topology, Topology::Triangles);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.triangle_count(), 2);

        let bounds = mesh.bounds.unwrap();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
        assert!((bounds.center() - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-6);

        assert!(!mesh.has_normals());
        mesh.ensure_normals();
        for normal in mesh.normals.as_ref().unwrap() {
            // Counter-clockwise in the XY plane faces +Z
            assert!((normal.z - 1.0).abs() < 0.001);
        }
    }

    #[test]
    fn test_missing_position_is_an_error() {
        let (mut primitive, blobs) = quad_fan();
        primitive.sources.clear();
        assert!(matches!(
            MeshData::read(&primitive, &blobs),
            Err(ReadError::MissingAttribute("POSITION"))
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_sequential_indices_fit_u32() {
        assert_eq!(sequential_indices(3).unwrap(), vec![0, 1, 2]);
        let too_many = u32::MAX as usize + 1;
        assert_eq!(sequential_indices(too_many), Err(ReadError::TooManyVertices(too_many)));
    }

    #[test]
    fn test_strip_winding() {
        let mesh = MeshData {
            positions: vec![Vec3::ZERO; 4],
            normals: None,
            texcoords: BTreeMap::new(),
            colors: None,
            indices: vec![0, 1, 2, 3],
            topology: Topology::TriangleStrip,
            bounds: None,
        };
        assert_eq!(mesh.triangles(), vec![[0, 1, 2], [1, 3, 2]]);
    }
}
