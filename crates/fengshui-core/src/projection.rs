//! Annotation projection onto a prepared 3D model
//!
//! Each annotation's image-space center is mapped into normalized device
//! coordinates, a ray is cast from the camera through that point, and the
//! nearest surface hit (pulled slightly toward the camera) becomes the marker
//! position. Annotations whose ray misses the model are dropped.

use bevy_math::{Dir3, Mat4, Ray3d, Vec2, Vec3};

use crate::annotation::{Annotation, PixelPoint};
use crate::mesh::PreparedModel;
use crate::overlay::ImageSize;

/// Distance a marker is pulled from the surface toward the camera
pub const SURFACE_OFFSET: f32 = 0.1;

const EPSILON: f32 = 1e-6;

/// Camera pose and projection used for a projection pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    position: Vec3,
    world_from_clip: Mat4,
}

impl CameraView {
    /// Build from the camera's world transform and its projection matrix
    pub fn new(world_from_view: Mat4, clip_from_view: Mat4) -> Self {
        Self {
            position: world_from_view.w_axis.truncate(),
            world_from_clip: world_from_view * clip_from_view.inverse(),
        }
    }

    /// Perspective camera at `eye` looking at `target`
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_radians: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let world_from_view = Mat4::look_at_rh(eye, target, up).inverse();
        let clip_from_view = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
        Self::new(world_from_view, clip_from_view)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Ray from the camera through a point in normalized device coordinates
    ///
    /// Unprojects at mid depth so the result is finite for both standard and
    /// reverse-Z infinite projections.
    pub fn ray_through_ndc(&self, ndc: Vec2) -> Option<Ray3d> {
        let on_ray = self.world_from_clip.project_point3(ndc.extend(0.5));
        let direction = Dir3::new(on_ray - self.position).ok()?;
        Some(Ray3d::new(self.position, direction))
    }
}

/// Map an image pixel into NDC (`[-1, 1]` on both axes, Y up)
///
/// Returns `None` for a degenerate image size.
pub fn image_to_ndc(point: PixelPoint, image: ImageSize) -> Option<Vec2> {
    if image.width <= 0.0 || image.height <= 0.0 {
        return None;
    }
    Some(Vec2::new(
        (point.x / image.width) * 2.0 - 1.0,
        -(point.y / image.height) * 2.0 + 1.0,
    ))
}

/// Nearest intersection of a ray with a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
}

/// Two-sided Möller–Trumbore ray/triangle test, returning the ray distance
pub fn ray_triangle(ray: &Ray3d, tri: &[Vec3; 3]) -> Option<f32> {
    let dir = *ray.direction;
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - tri[0];
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}

/// Cast a ray against every triangle of the model, children included
pub fn raycast(model: &PreparedModel, ray: &Ray3d) -> Option<RayHit> {
    let mut nearest: Option<f32> = None;
    model.root().visit(Mat4::IDENTITY, &mut |node, world| {
        for tri in &node.triangles {
            let world_tri = [
                world.transform_point3(tri[0]),
                world.transform_point3(tri[1]),
                world.transform_point3(tri[2]),
            ];
            if let Some(t) = ray_triangle(ray, &world_tri) {
                if nearest.is_none_or(|n| t < n) {
                    nearest = Some(t);
                }
            }
        }
    });
    nearest.map(|distance| RayHit {
        distance,
        point: ray.get_point(distance),
    })
}

/// A marker placed on the model surface for one annotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedMarker {
    /// Index of the source annotation, also the interaction key
    pub index: usize,
    pub position: Vec3,
}

impl ProjectedMarker {
    /// Resolve the source annotation from the list the marker was built from
    pub fn annotation<'a>(&self, source: &'a [Annotation]) -> Option<&'a Annotation> {
        source.get(self.index)
    }
}

/// Result of one full projection pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSet {
    pub markers: Vec<ProjectedMarker>,
    /// Indices of annotations whose ray missed the model
    pub dropped: Vec<usize>,
}

impl MarkerSet {
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProjectedMarker> {
        self.markers.iter().find(|m| m.index == index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }
}

/// Project a single annotation, `None` when the ray misses
pub fn project_annotation(
    annotation: &Annotation,
    image: ImageSize,
    camera: &CameraView,
    model: &PreparedModel,
) -> Option<Vec3> {
    let ndc = image_to_ndc(annotation.center(), image)?;
    let ray = camera.ray_through_ndc(ndc)?;
    let hit = raycast(model, &ray)?;
    let toward_camera = (camera.position() - hit.point).normalize_or_zero();
    Some(hit.point + toward_camera * SURFACE_OFFSET)
}

/// Project every annotation; misses are recorded, never fatal
pub fn project_annotations(
    annotations: &[Annotation],
    image: ImageSize,
    camera: &CameraView,
    model: &PreparedModel,
) -> MarkerSet {
    let mut set = MarkerSet::default();
    for (index, annotation) in annotations.iter().enumerate() {
        match project_annotation(annotation, image, camera, model) {
            Some(position) => set.markers.push(ProjectedMarker { index, position }),
            None => {
                tracing::debug!(
                    index,
                    object_class = %annotation.object_class,
                    "Annotation ray missed the model"
                );
                set.dropped.push(index);
            }
        }
    }
    set
}

/// Identity of the inputs a marker set was computed from
///
/// Callers bump the matching counter whenever the model, the annotation list
/// or the camera is replaced (not when the camera merely moves).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProjectionKey {
    pub model: u64,
    pub annotations: u64,
    pub camera: u64,
}

/// Marker set memoized on its [`ProjectionKey`]
#[derive(Debug, Clone, Default)]
pub struct MarkerCache {
    key: Option<ProjectionKey>,
    set: MarkerSet,
}

impl MarkerCache {
    pub fn markers(&self) -> &MarkerSet {
        &self.set
    }

    pub fn key(&self) -> Option<ProjectionKey> {
        self.key
    }

    /// Recompute the whole set if the key changed; returns whether it did
    pub fn refresh(
        &mut self,
        key: ProjectionKey,
        annotations: &[Annotation],
        image: ImageSize,
        camera: &CameraView,
        model: &PreparedModel,
    ) -> bool {
        if self.key == Some(key) {
            return false;
        }
        self.set = project_annotations(annotations, image, camera, model);
        self.key = Some(key);
        tracing::debug!(
            markers = self.set.len(),
            dropped = self.set.dropped.len(),
            "Recomputed marker set"
        );
        true
    }

    /// Forget the current set, e.g. when the model is unloaded
    pub fn clear(&mut self) {
        self.key = None;
        self.set = MarkerSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationKind, BoundingBox, Coordinates};
    use crate::mesh::{prepare_model, MeshNode, RawModel};
    use approx::assert_relative_eq;

    const IMAGE: ImageSize = ImageSize {
        width: 1920.0,
        height: 1080.0,
    };

    fn annotation_at(x: f32, y: f32) -> Annotation {
        Annotation {
            object_class: "chair".to_string(),
            object_index: 0,
            kind: AnnotationKind::Neutral,
            message: "test".to_string(),
            coordinates: Coordinates {
                bbox: BoundingBox::from_corners(x - 10.0, y - 10.0, x + 10.0, y + 10.0),
                center: PixelPoint { x, y },
            },
            confidence: 0.5,
        }
    }

    /// Square of half-size `half` on the z = 0 plane
    fn quad(half: f32) -> Vec<[Vec3; 3]> {
        let a = Vec3::new(-half, -half, 0.0);
        let b = Vec3::new(half, -half, 0.0);
        let c = Vec3::new(half, half, 0.0);
        let d = Vec3::new(-half, half, 0.0);
        vec![[a, b, c], [a, c, d]]
    }

    fn wall(half: f32) -> PreparedModel {
        let wall = MeshNode::new("wall").with_triangles(quad(half));
        prepare_model(RawModel::new(wall))
    }

    fn front_camera() -> CameraView {
        CameraView::look_at(
            Vec3::new(0.0, 0.0, 25.0),
            Vec3::ZERO,
            Vec3::Y,
            50f32.to_radians(),
            16.0 / 9.0,
            0.1,
            1000.0,
        )
    }

    fn project_single(x: f32, y: f32, model: &PreparedModel) -> MarkerSet {
        project_annotations(&[annotation_at(x, y)], IMAGE, &front_camera(), model)
    }

    #[test]
    fn test_ndc_corners_and_y_flip() {
        let top_left = image_to_ndc(PixelPoint { x: 0.0, y: 0.0 }, IMAGE).unwrap();
        assert_eq!(top_left, Vec2::new(-1.0, 1.0));
        let bottom_right = image_to_ndc(
            PixelPoint {
                x: 1920.0,
                y: 1080.0,
            },
            IMAGE,
        )
        .unwrap();
        assert_eq!(bottom_right, Vec2::new(1.0, -1.0));
        let center = image_to_ndc(PixelPoint { x: 960.0, y: 540.0 }, IMAGE).unwrap();
        assert_eq!(center, Vec2::ZERO);
    }

    #[test]
    fn test_ndc_inside_bbox_stays_in_range() {
        for (x, y) in [(1.0, 1.0), (1919.0, 5.0), (333.3, 1079.0), (960.0, 540.0)] {
            let ndc = image_to_ndc(PixelPoint { x, y }, IMAGE).unwrap();
            assert!((-1.0..=1.0).contains(&ndc.x));
            assert!((-1.0..=1.0).contains(&ndc.y));
        }
    }

    #[test]
    fn test_degenerate_image_size() {
        let empty = ImageSize {
            width: 0.0,
            height: 1080.0,
        };
        assert!(image_to_ndc(PixelPoint { x: 1.0, y: 1.0 }, empty).is_none());
    }

    #[test]
    fn test_center_ray_hits_wall_with_offset() {
        let markers = project_single(960.0, 540.0, &wall(50.0));
        assert_eq!(markers.len(), 1);
        let p = markers.markers[0].position;
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(p.z, SURFACE_OFFSET, epsilon = 1e-4);
    }

    #[test]
    fn test_top_of_image_lands_above_center() {
        let markers = project_single(960.0, 100.0, &wall(50.0));
        assert_eq!(markers.len(), 1);
        assert!(markers.markers[0].position.y > 0.0);
    }

    #[test]
    fn test_miss_is_dropped_without_error() {
        let annotations = vec![annotation_at(960.0, 540.0), annotation_at(5.0, 5.0)];
        let markers = project_annotations(&annotations, IMAGE, &front_camera(), &wall(1.0));
        assert_eq!(markers.len(), 1);
        assert_eq!(markers.markers[0].index, 0);
        assert_eq!(markers.dropped, vec![1]);
        let source = markers.markers[0].annotation(&annotations);
        assert_eq!(source.map(|a| a.center().x), Some(960.0));
    }

    #[test]
    fn test_all_miss_yields_empty_set() {
        let markers = project_single(2.0, 2.0, &wall(0.5));
        assert!(markers.is_empty());
        assert_eq!(markers.dropped, vec![0]);
    }

    #[test]
    fn test_nearest_hit_wins_across_children() {
        let near = MeshNode::new("near")
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)))
            .with_triangles(quad(5.0));
        let far = MeshNode::new("far").with_triangles(quad(50.0));
        let room = MeshNode::new("room").with_child(far).with_child(near);
        let markers = project_single(960.0, 540.0, &prepare_model(RawModel::new(room)));
        assert_relative_eq!(
            markers.markers[0].position.z,
            3.0 + SURFACE_OFFSET,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_projection_is_idempotent() {
        let annotations = vec![
            annotation_at(200.0, 300.0),
            annotation_at(960.0, 540.0),
            annotation_at(1.0, 1.0),
        ];
        let camera = front_camera();
        let model = wall(12.0);
        let first = project_annotations(&annotations, IMAGE, &camera, &model);
        let second = project_annotations(&annotations, IMAGE, &camera, &model);
        assert_eq!(first.dropped, second.dropped);
        for (a, b) in first.markers.iter().zip(&second.markers) {
            assert_eq!(a.index, b.index);
            assert!(a.position.distance(b.position) < 1e-5);
        }
    }

    #[test]
    fn test_cache_recomputes_only_on_key_change() {
        let annotations = vec![annotation_at(960.0, 540.0)];
        let camera = front_camera();
        let model = wall(50.0);
        let mut cache = MarkerCache::default();
        let key = ProjectionKey {
            model: 1,
            annotations: 1,
            camera: 1,
        };
        assert!(cache.refresh(key, &annotations, IMAGE, &camera, &model));
        assert!(!cache.refresh(key, &annotations, IMAGE, &camera, &model));
        let new_key = ProjectionKey { annotations: 2, ..key };
        assert!(cache.refresh(new_key, &[], IMAGE, &camera, &model));
        assert!(cache.markers().is_empty());
        cache.clear();
        assert!(cache.key().is_none());
    }

    #[test]
    fn test_ray_parallel_to_triangle() {
        let ray = Ray3d::new(Vec3::new(0.0, 0.0, 1.0), Dir3::X);
        assert!(ray_triangle(&ray, &quad(1.0)[0]).is_none());
    }
}
