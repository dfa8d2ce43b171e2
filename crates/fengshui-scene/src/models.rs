//! Room model loading and preparation
//!
//! A model request goes through three steps: the glTF asset loads, its
//! scene is instantiated hidden, then the instantiated hierarchy is read
//! back into a [`RawModel`], prepared, centered and shown. Each request
//! takes a [`LoadTicket`]; a load that finishes after a newer request was
//! made is discarded.

use bevy::asset::{LoadState as AssetLoadState, RecursiveDependencyLoadState};
use bevy::mesh::{PrimitiveTopology, VertexAttributeValues};
use bevy::light::{NotShadowCaster, NotShadowReceiver};
use bevy::prelude::*;
use bevy::scene::{SceneInstance, SceneSpawner};
use fengshui_core::mesh::{prepare_material, sanitize_texture_path, TextureRef};
use fengshui_core::{
    prepare_model, LoadPhase, LoadState, LoadTicket, MaterialDesc, MaterialKind, MeshNode,
    PreparedModel, RawModel,
};

/// Uniform scale applied to every room model
pub const MODEL_SCALE: f32 = 0.5;

/// Marker component for the root entity of the loaded room
#[derive(Component)]
pub struct RoomModelRoot;

/// A room model that finished loading and preparation
pub struct LoadedModel {
    pub root: Entity,
    pub ticket: LoadTicket,
    pub prepared: PreparedModel,
}

struct PendingLoad {
    ticket: LoadTicket,
    handle: Handle<Scene>,
    /// Set once the scene has been instantiated
    root: Option<Entity>,
}

/// The room model shown in the viewer
#[derive(Resource, Default)]
pub struct RoomModel {
    requested: Option<String>,
    source: Option<String>,
    state: LoadState<LoadedModel>,
    pending: Option<PendingLoad>,
}

impl RoomModel {
    /// Ask for a model by asset path
    ///
    /// Requesting the source that is already loaded or loading is a no-op;
    /// a failed source may be requested again.
    pub fn request(&mut self, source: impl Into<String>) {
        let source = source.into();
        if self.source.as_deref() == Some(source.as_str()) && self.state.failure().is_none() {
            return;
        }
        self.requested = Some(source);
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn phase(&self) -> &LoadPhase<LoadedModel> {
        self.state.phase()
    }

    pub fn loaded(&self) -> Option<&LoadedModel> {
        self.state.ready()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn failure(&self) -> Option<&str> {
        self.state.failure()
    }
}

/// Plugin for loading room models
pub struct ModelsPlugin;

impl Plugin for ModelsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RoomModel>().add_systems(
            Update,
            (start_model_load, poll_model_load, prepare_loaded_model).chain(),
        );
    }
}

fn start_model_load(
    mut commands: Commands,
    mut room: ResMut<RoomModel>,
    asset_server: Res<AssetServer>,
) {
    let Some(source) = room.requested.take() else {
        return;
    };

    if let Some(root) = room.pending.take().and_then(|p| p.root) {
        commands.entity(root).despawn();
    }
    if let Some(model) = room.state.ready() {
        commands.entity(model.root).despawn();
    }

    let ticket = room.state.begin();
    let handle = asset_server.load(GltfAssetLabel::Scene(0).from_asset(source.clone()));
    info!(%ticket, source = %source, "Loading room model");

    room.source = Some(source);
    room.pending = Some(PendingLoad {
        ticket,
        handle,
        root: None,
    });
}

fn poll_model_load(
    mut commands: Commands,
    mut room: ResMut<RoomModel>,
    asset_server: Res<AssetServer>,
) {
    let Some(pending) = room.pending.as_mut() else {
        return;
    };
    if pending.root.is_some() {
        return;
    }

    match asset_server.get_load_states(pending.handle.id()) {
        Some((AssetLoadState::Failed(err), _, _)) => {
            let ticket = pending.ticket;
            room.pending = None;
            warn!(%ticket, error = %err, "Room model failed to load");
            room.state.fail(ticket, err.to_string());
        }
        // Missing textures fail the dependency state but the model is usable
        Some((
            AssetLoadState::Loaded,
            _,
            RecursiveDependencyLoadState::Loaded | RecursiveDependencyLoadState::Failed(_),
        )) => {
            let root = commands
                .spawn((
                    SceneRoot(pending.handle.clone()),
                    Transform::from_scale(Vec3::splat(MODEL_SCALE)),
                    Visibility::Hidden,
                    RoomModelRoot,
                ))
                .id();
            debug!(ticket = %pending.ticket, "Room scene spawned");
            pending.root = Some(root);
        }
        _ => {}
    }
}

type NodeData = (
    Option<&'static Name>,
    Option<&'static Transform>,
    Option<&'static Children>,
    Option<&'static Mesh3d>,
    Option<&'static MeshMaterial3d<StandardMaterial>>,
);

/// Assets the hierarchy is read back from
struct SceneAssets<'a> {
    meshes: &'a Assets<Mesh>,
    materials: &'a Assets<StandardMaterial>,
    images: &'a Assets<Image>,
}

/// Mesh entity found while reading back the hierarchy
struct ShadedMesh {
    entity: Entity,
    material: Option<AssetId<StandardMaterial>>,
}

#[allow(clippy::too_many_arguments)]
fn prepare_loaded_model(
    mut commands: Commands,
    mut room: ResMut<RoomModel>,
    scene_spawner: Res<SceneSpawner>,
    instances: Query<&SceneInstance>,
    nodes: Query<NodeData>,
    meshes: Res<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    images: Res<Assets<Image>>,
) {
    let Some((ticket, root)) = room
        .pending
        .as_ref()
        .and_then(|p| Some((p.ticket, p.root?)))
    else {
        return;
    };
    let Ok(instance) = instances.get(root) else {
        return;
    };
    if !scene_spawner.instance_is_ready(**instance) {
        return;
    }
    room.pending = None;

    let assets = SceneAssets {
        meshes: &meshes,
        materials: &materials,
        images: &images,
    };
    let mut shaded = Vec::new();
    let tree = read_node(root, &nodes, &assets, &mut shaded);
    let (tree, placement) = center_model(tree, MODEL_SCALE);
    let prepared = prepare_model(RawModel::new(tree));

    let mut material_ids: Vec<AssetId<StandardMaterial>> = Vec::new();
    for mesh in &shaded {
        commands
            .entity(mesh.entity)
            .remove::<(NotShadowCaster, NotShadowReceiver)>();
        if let Some(id) = mesh.material {
            if !material_ids.contains(&id) {
                material_ids.push(id);
            }
        }
    }
    let mut upgraded = 0;
    for id in material_ids {
        let Some(material) = materials.get_mut(id) else {
            continue;
        };
        let loaded = material_desc(material, &images);
        if loaded.kind.is_legacy() {
            upgraded += 1;
        }
        apply_prepared(material, &prepare_material(loaded));
    }

    commands
        .entity(root)
        .insert((placement, Visibility::Inherited));

    info!(
        %ticket,
        meshes = shaded.len(),
        upgraded_materials = upgraded,
        triangles = prepared.triangle_count(),
        "Room model ready"
    );
    let accepted = room.state.resolve(
        ticket,
        LoadedModel {
            root,
            ticket,
            prepared,
        },
    );
    if !accepted {
        commands.entity(root).despawn();
    }
}

fn local_matrix(transform: &Transform) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        transform.scale,
        transform.rotation,
        transform.translation,
    )
}

/// Read an instantiated hierarchy back into mesh nodes
fn read_node(
    entity: Entity,
    nodes: &Query<NodeData>,
    assets: &SceneAssets,
    shaded: &mut Vec<ShadedMesh>,
) -> MeshNode {
    let Ok((name, transform, children, mesh, material)) = nodes.get(entity) else {
        return MeshNode::new("missing");
    };

    let mut node = MeshNode::new(name.map(|n| n.as_str()).unwrap_or("node"))
        .with_transform(transform.map(local_matrix).unwrap_or(Mat4::IDENTITY));

    if let Some(mesh) = mesh {
        if let Some(data) = assets.meshes.get(&mesh.0) {
            node.triangles = mesh_triangles(data);
        }
        let material_id = material.map(|m| m.0.id());
        if let Some(desc) = material_id.and_then(|id| assets.materials.get(id)) {
            node.materials.push(material_desc(desc, assets.images));
        }
        shaded.push(ShadedMesh {
            entity,
            material: material_id,
        });
    }

    if let Some(children) = children {
        let kids: &[Entity] = children;
        for &child in kids {
            node.children.push(read_node(child, nodes, assets, shaded));
        }
    }
    node
}

/// Scale the model and move its bounding box center to the origin
///
/// Returns the tree with the root placement applied and that placement as
/// a transform for the root entity.
fn center_model(mut root: MeshNode, scale: f32) -> (MeshNode, Transform) {
    root.transform = Mat4::IDENTITY;
    let mut bounds: Option<(Vec3, Vec3)> = None;
    root.visit(Mat4::from_scale(Vec3::splat(scale)), &mut |node, world| {
        for p in node.triangles.iter().flatten() {
            let p = world.transform_point3(*p);
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(p), max.max(p)),
                None => (p, p),
            });
        }
    });

    let center = bounds.map(|(min, max)| (min + max) / 2.0).unwrap_or(Vec3::ZERO);
    let placement = Transform::from_translation(-center).with_scale(Vec3::splat(scale));
    root.transform = local_matrix(&placement);
    (root, placement)
}

/// Triangles of a triangle-list mesh in mesh space
pub fn mesh_triangles(mesh: &Mesh) -> Vec<[Vec3; 3]> {
    if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
        return Vec::new();
    }
    let Some(VertexAttributeValues::Float32x3(positions)) = mesh.attribute(Mesh::ATTRIBUTE_POSITION)
    else {
        return Vec::new();
    };

    let corners: Vec<usize> = match mesh.indices() {
        Some(indices) => indices.iter().collect(),
        None => (0..positions.len()).collect(),
    };
    let vertex = |i: usize| positions.get(i).map(|p| Vec3::from_array(*p));
    corners
        .chunks_exact(3)
        .filter_map(|c| Some([vertex(c[0])?, vertex(c[1])?, vertex(c[2])?]))
        .collect()
}

fn texture_ref(handle: &Handle<Image>, images: &Assets<Image>) -> TextureRef {
    let (width, height) = images
        .get(handle)
        .map(|image| (image.width(), image.height()))
        .unwrap_or((0, 0));
    TextureRef {
        path: handle
            .path()
            .map(|p| p.path().to_string_lossy().into_owned())
            .filter(|p| sanitize_texture_path(p).is_some()),
        width,
        height,
    }
}

/// Describe a loaded material for preparation
pub fn material_desc(material: &StandardMaterial, images: &Assets<Image>) -> MaterialDesc {
    let color = material.base_color.to_linear();
    MaterialDesc {
        kind: if material.unlit {
            MaterialKind::Basic
        } else {
            MaterialKind::Standard
        },
        base_color: [color.red, color.green, color.blue, color.alpha],
        base_color_texture: material
            .base_color_texture
            .as_ref()
            .map(|h| texture_ref(h, images)),
        normal_map: material
            .normal_map_texture
            .as_ref()
            .map(|h| texture_ref(h, images)),
        roughness: material.perceptual_roughness,
        metalness: material.metallic,
    }
}

/// Write a prepared description back onto the material
pub fn apply_prepared(material: &mut StandardMaterial, prepared: &MaterialDesc) {
    let [red, green, blue, alpha] = prepared.base_color;
    material.base_color = Color::LinearRgba(LinearRgba::new(red, green, blue, alpha));
    material.perceptual_roughness = prepared.roughness;
    material.metallic = prepared.metalness;
    material.unlit = prepared.kind == MaterialKind::Basic;
    if prepared.base_color_texture.is_none() {
        material.base_color_texture = None;
    }
    if prepared.normal_map.is_none() {
        material.normal_map_texture = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bevy::asset::RenderAssetUsages;
    use bevy::mesh::Indices;
    use fengshui_core::mesh::{FALLBACK_COLOR, PREPARED_METALNESS, PREPARED_ROUGHNESS};

    fn quad() -> Mesh {
        let usage = RenderAssetUsages::default();
        Mesh::new(PrimitiveTopology::TriangleList, usage)
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            )
            .with_inserted_indices(Indices::U32(vec![0, 1, 2, 2, 1, 3]))
    }

    #[test]
    fn test_mesh_triangles_indexed() {
        let triangles = mesh_triangles(&quad());
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[1], [Vec3::Y, Vec3::X, Vec3::new(1.0, 1.0, 0.0)]);
    }

    #[test]
    fn test_mesh_triangles_ignores_lines() {
        let mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            );
        assert!(mesh_triangles(&mesh).is_empty());
    }

    #[test]
    fn test_center_model() {
        let cube_corner = MeshNode::new("box")
            .with_transform(Mat4::from_translation(Vec3::splat(2.0)))
            .with_triangles(vec![[
                Vec3::ZERO,
                Vec3::splat(2.0),
                Vec3::new(2.0, 0.0, 0.0),
            ]]);
        let root = MeshNode::new("root")
            .with_transform(Mat4::from_scale(Vec3::splat(7.0)))
            .with_child(cube_corner);

        let (tree, placement) = center_model(root, 0.5);
        assert_relative_eq!(placement.scale.x, 0.5);
        assert_relative_eq!(placement.translation.x, -1.5);

        let (min, max) = prepare_model(RawModel::new(tree)).bounds().unwrap();
        assert_relative_eq!((min + max).length(), 0.0, epsilon = 1e-5);
        assert_relative_eq!(max.x - min.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_texture_without_pixels_falls_back_to_flat_color() {
        let images = Assets::<Image>::default();
        let material = StandardMaterial {
            base_color: Color::WHITE,
            base_color_texture: Some(Handle::default()),
            metallic: 1.0,
            perceptual_roughness: 0.1,
            ..default()
        };

        let desc = material_desc(&material, &images);
        assert!(!desc.base_color_texture.as_ref().unwrap().has_pixels());

        let prepared = prepare_material(desc);
        let mut applied = material.clone();
        apply_prepared(&mut applied, &prepared);
        assert!(applied.base_color_texture.is_none());
        assert_relative_eq!(applied.perceptual_roughness, PREPARED_ROUGHNESS);
        assert_relative_eq!(applied.metallic, PREPARED_METALNESS);
        let color = applied.base_color.to_linear();
        assert_relative_eq!(color.red, FALLBACK_COLOR[0]);
    }
}
