//! Flat 2D overlay of annotations on the source image
//!
//! Annotation coordinates are in the image's native pixel space. The overlay
//! scales them into whatever size the image is displayed at, using the
//! natural size observed when the image actually loaded. Caller-supplied
//! dimensions are only a fallback until then.

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, AnnotationKind, PixelPoint};
use crate::card::ScreenRect;

/// Default image width assumed before the real image is known
pub const DEFAULT_IMAGE_WIDTH: f32 = 1920.0;
/// Default image height assumed before the real image is known
pub const DEFAULT_IMAGE_HEIGHT: f32 = 1080.0;
/// Radius of the center-point marker in native pixels
pub const CENTER_MARKER_RADIUS: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: f32,
    pub height: f32,
}

impl ImageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
        }
    }
}

/// Image dimensions with a fallback until the natural size is observed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageMetrics {
    fallback: ImageSize,
    natural: Option<ImageSize>,
}

impl ImageMetrics {
    pub fn with_fallback(fallback: ImageSize) -> Self {
        Self {
            fallback,
            natural: None,
        }
    }

    /// Record the natural size of the image once it has loaded
    pub fn on_image_loaded(&mut self, natural: ImageSize) {
        if natural.width > 0.0 && natural.height > 0.0 {
            self.natural = Some(natural);
        } else {
            tracing::warn!(
                width = natural.width,
                height = natural.height,
                "Ignoring degenerate image size"
            );
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.natural.is_some()
    }

    /// Size to normalize annotation coordinates against
    pub fn effective(&self) -> ImageSize {
        self.natural.unwrap_or(self.fallback)
    }
}

/// Scale factors from native image pixels to displayed pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    pub native: ImageSize,
    pub displayed: ImageSize,
}

impl OverlayLayout {
    pub fn new(metrics: &ImageMetrics, displayed: ImageSize) -> Self {
        Self {
            native: metrics.effective(),
            displayed,
        }
    }

    pub fn scale(&self) -> (f32, f32) {
        if self.native.width <= 0.0 || self.native.height <= 0.0 {
            return (1.0, 1.0);
        }
        (
            self.displayed.width / self.native.width,
            self.displayed.height / self.native.height,
        )
    }

    pub fn map_point(&self, p: PixelPoint) -> PixelPoint {
        let (sx, sy) = self.scale();
        PixelPoint {
            x: p.x * sx,
            y: p.y * sy,
        }
    }

    /// Map an annotation's bounding box into displayed pixels
    pub fn map_bbox(&self, annotation: &Annotation) -> ScreenRect {
        let (sx, sy) = self.scale();
        let b = annotation.bounding_box();
        ScreenRect {
            left: b.x1 * sx,
            top: b.y1 * sy,
            width: b.width * sx,
            height: b.height * sy,
        }
    }

    /// Lay out every annotation for drawing
    pub fn shapes(&self, annotations: &[Annotation]) -> Vec<OverlayShape> {
        let (sx, sy) = self.scale();
        annotations
            .iter()
            .enumerate()
            .map(|(index, a)| OverlayShape {
                index,
                kind: a.kind,
                rect: self.map_bbox(a),
                center: self.map_point(a.center()),
                radius: CENTER_MARKER_RADIUS * sx.min(sy),
            })
            .collect()
    }
}

/// One annotation as drawn on the overlay, in displayed pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayShape {
    pub index: usize,
    pub kind: AnnotationKind,
    pub rect: ScreenRect,
    pub center: PixelPoint,
    pub radius: f32,
}

impl OverlayShape {
    /// Whether a displayed-space point hits the center marker
    pub fn hit(&self, p: PixelPoint) -> bool {
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{BoundingBox, Coordinates};

    fn annotation() -> Annotation {
        Annotation {
            object_class: "sofa".to_string(),
            object_index: 1,
            kind: AnnotationKind::Bad,
            message: "Back to the door".to_string(),
            coordinates: Coordinates {
                bbox: BoundingBox::from_corners(400.0, 300.0, 800.0, 500.0),
                center: PixelPoint { x: 600.0, y: 400.0 },
            },
            confidence: 0.8,
        }
    }

    #[test]
    fn test_fallback_until_loaded() {
        let mut metrics = ImageMetrics::with_fallback(ImageSize::default());
        assert_eq!(metrics.effective(), ImageSize::new(1920.0, 1080.0));
        metrics.on_image_loaded(ImageSize::new(1200.0, 800.0));
        assert!(metrics.is_loaded());
        assert_eq!(metrics.effective(), ImageSize::new(1200.0, 800.0));
    }

    #[test]
    fn test_degenerate_natural_size_ignored() {
        let mut metrics = ImageMetrics::with_fallback(ImageSize::new(640.0, 480.0));
        metrics.on_image_loaded(ImageSize::new(0.0, 0.0));
        assert_eq!(metrics.effective(), ImageSize::new(640.0, 480.0));
    }

    #[test]
    fn test_scaling_uses_natural_size() {
        let mut metrics = ImageMetrics::with_fallback(ImageSize::default());
        metrics.on_image_loaded(ImageSize::new(1200.0, 800.0));
        let layout = OverlayLayout::new(&metrics, ImageSize::new(600.0, 400.0));
        let shapes = layout.shapes(&[annotation()]);
        assert_eq!(shapes[0].center, PixelPoint { x: 300.0, y: 200.0 });
        assert_eq!(
            shapes[0].rect,
            ScreenRect {
                left: 200.0,
                top: 150.0,
                width: 200.0,
                height: 100.0
            }
        );
        assert_eq!(shapes[0].radius, 4.0);
        assert!(shapes[0].hit(PixelPoint { x: 302.0, y: 201.0 }));
        assert!(!shapes[0].hit(PixelPoint { x: 320.0, y: 200.0 }));
    }
}
