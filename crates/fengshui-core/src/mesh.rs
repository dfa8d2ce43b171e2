//! Mesh and material preparation
//!
//! A loaded model goes through exactly one preparation pass before anything
//! raycasts against it: shadows are enabled on every mesh, legacy shading
//! models are upgraded to a standard PBR material, and textures without pixel
//! data are replaced by a flat fallback color. The pass is a pure function
//! from [`RawModel`] to [`PreparedModel`]; projection only accepts the latter.

use bevy_math::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Roughness applied to every prepared material
pub const PREPARED_ROUGHNESS: f32 = 0.5;
/// Metalness applied to every prepared material
pub const PREPARED_METALNESS: f32 = 0.0;
/// Flat color (#cccccc) used when a texture has no pixel data
pub const FALLBACK_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

/// Shading model of a material as it came out of the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialKind {
    /// Legacy specular model (FBX default)
    Phong,
    Lambert,
    /// Unlit
    Basic,
    /// Metallic-roughness PBR
    Standard,
}

impl MaterialKind {
    pub fn is_legacy(&self) -> bool {
        !matches!(self, MaterialKind::Standard)
    }
}

/// Reference to a texture and the size of its decoded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureRef {
    pub path: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl TextureRef {
    pub fn has_pixels(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDesc {
    pub kind: MaterialKind,
    /// Linear RGBA
    pub base_color: [f32; 4],
    pub base_color_texture: Option<TextureRef>,
    pub normal_map: Option<TextureRef>,
    pub roughness: f32,
    pub metalness: f32,
}

impl MaterialDesc {
    pub fn standard(base_color: [f32; 4]) -> Self {
        Self {
            kind: MaterialKind::Standard,
            base_color,
            base_color_texture: None,
            normal_map: None,
            roughness: 1.0,
            metalness: 0.0,
        }
    }
}

/// One node of a model hierarchy with its own triangles and materials
#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    pub name: String,
    /// Transform relative to the parent node
    pub transform: Mat4,
    /// Triangles in node-local space
    pub triangles: Vec<[Vec3; 3]>,
    pub materials: Vec<MaterialDesc>,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub children: Vec<MeshNode>,
}

impl MeshNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            triangles: Vec::new(),
            materials: Vec::new(),
            cast_shadows: false,
            receive_shadows: false,
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_triangles(mut self, triangles: Vec<[Vec3; 3]>) -> Self {
        self.triangles = triangles;
        self
    }

    pub fn with_material(mut self, material: MaterialDesc) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_child(mut self, child: MeshNode) -> Self {
        self.children.push(child);
        self
    }

    /// Visit every node depth-first with its world transform
    pub fn visit<F>(&self, parent: Mat4, f: &mut F)
    where
        F: FnMut(&MeshNode, Mat4),
    {
        let world = parent * self.transform;
        f(self, world);
        for child in &self.children {
            child.visit(world, f);
        }
    }

    fn prepare(mut self) -> Self {
        self.cast_shadows = true;
        self.receive_shadows = true;
        self.materials = self.materials.into_iter().map(prepare_material).collect();
        self.children = self.children.into_iter().map(MeshNode::prepare).collect();
        self
    }
}

/// Model hierarchy exactly as loaded
#[derive(Debug, Clone, PartialEq)]
pub struct RawModel {
    pub root: MeshNode,
}

impl RawModel {
    pub fn new(root: MeshNode) -> Self {
        Self { root }
    }
}

/// Model hierarchy after the one-time preparation pass
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedModel {
    root: MeshNode,
}

impl PreparedModel {
    pub fn root(&self) -> &MeshNode {
        &self.root
    }

    pub fn triangle_count(&self) -> usize {
        let mut count = 0;
        self.root.visit(Mat4::IDENTITY, &mut |node, _| count += node.triangles.len());
        count
    }

    /// World-space axis-aligned bounds, `None` for an empty model
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut bounds: Option<(Vec3, Vec3)> = None;
        self.root.visit(Mat4::IDENTITY, &mut |node, world| {
            for tri in &node.triangles {
                for v in tri {
                    let p = world.transform_point3(*v);
                    bounds = Some(match bounds {
                        Some((min, max)) => (min.min(p), max.max(p)),
                        None => (p, p),
                    });
                }
            }
        });
        bounds
    }
}

/// Run the preparation pass over a freshly loaded model
pub fn prepare_model(raw: RawModel) -> PreparedModel {
    PreparedModel {
        root: raw.root.prepare(),
    }
}

/// Normalize a single material
pub fn prepare_material(material: MaterialDesc) -> MaterialDesc {
    let mut prepared = MaterialDesc {
        kind: MaterialKind::Standard,
        roughness: PREPARED_ROUGHNESS,
        metalness: PREPARED_METALNESS,
        ..material
    };

    if prepared
        .base_color_texture
        .as_ref()
        .is_some_and(|t| !t.has_pixels())
    {
        prepared.base_color_texture = None;
        prepared.base_color = FALLBACK_COLOR;
    }
    if prepared.normal_map.as_ref().is_some_and(|t| !t.has_pixels()) {
        prepared.normal_map = None;
    }
    prepared
}

/// Drop texture paths that point outside the model bundle
///
/// Exported models often embed absolute paths from the authoring machine
/// (`/Users/...`, `C:\textures\...`). Those can never resolve and are treated
/// as "no texture".
pub fn sanitize_texture_path(path: &str) -> Option<&str> {
    if path.is_empty() || path.starts_with('/') || path.contains(":\\") {
        None
    } else {
        Some(path)
    }
}
