//! Detected-object annotations in source image pixel space
//!
//! Annotations arrive from the analysis API as the `tooltips` array. All
//! coordinates are expressed in the original image's native resolution,
//! not the size it happens to be displayed at.

use serde::{Deserialize, Serialize};

/// Feng shui verdict for a detected object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Good,
    Bad,
    #[default]
    #[serde(other)]
    Neutral,
}

impl AnnotationKind {
    /// Accent color as RGB bytes
    pub fn accent_rgb(&self) -> (u8, u8, u8) {
        match self {
            AnnotationKind::Good => (0x22, 0xc5, 0x5e),
            AnnotationKind::Bad => (0xef, 0x44, 0x44),
            AnnotationKind::Neutral => (0xea, 0xb3, 0x08),
        }
    }

    /// Accent color as a `#rrggbb` string
    pub fn accent_hex(&self) -> String {
        let (r, g, b) = self.accent_rgb();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    /// Short glyph shown inside markers and cards
    pub fn icon(&self) -> &'static str {
        match self {
            AnnotationKind::Good => "✓",
            AnnotationKind::Bad => "✗",
            AnnotationKind::Neutral => "!",
        }
    }
}

/// A point in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned bounding box in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Build a box from two corners, deriving width and height
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint {
            x: (self.x1 + self.x2) * 0.5,
            y: (self.y1 + self.y2) * 0.5,
        }
    }

    /// Whether a point lies inside the box (edges inclusive)
    pub fn contains(&self, p: PixelPoint) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }
}

/// Coordinate block of an annotation as served by the API
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub bbox: BoundingBox,
    pub center: PixelPoint,
}

/// A single detected-object verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Detected object label (e.g. "bed", "potted plant")
    pub object_class: String,
    /// Index among detected objects of the same class
    #[serde(default)]
    pub object_index: u32,
    #[serde(rename = "type", default)]
    pub kind: AnnotationKind,
    pub message: String,
    pub coordinates: Coordinates,
    /// Detector confidence, passed through untouched
    #[serde(default)]
    pub confidence: f32,
}

impl Annotation {
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.coordinates.bbox
    }

    pub fn center(&self) -> PixelPoint {
        self.coordinates.center
    }

    /// Check the anchor invariant (center inside the bounding box)
    pub fn center_within_bbox(&self) -> bool {
        self.coordinates.bbox.contains(self.coordinates.center)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_annotation() {
        let json = r#"{
            "object_class": "bed",
            "object_index": 0,
            "type": "good",
            "message": "Commanding position",
            "coordinates": {
                "bbox": {"x1": 100, "y1": 200, "x2": 500, "y2": 600, "width": 400, "height": 400},
                "center": {"x": 300, "y": 400}
            },
            "confidence": 0.91
        }"#;
        let a: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(a.object_class, "bed");
        assert_eq!(a.kind, AnnotationKind::Good);
        assert_eq!(a.center(), PixelPoint { x: 300.0, y: 400.0 });
        assert!(a.center_within_bbox());
    }

    #[test]
    fn test_unknown_kind_is_neutral() {
        let kind: AnnotationKind = serde_json::from_str("\"mixed\"").unwrap();
        assert_eq!(kind, AnnotationKind::Neutral);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&AnnotationKind::Bad).unwrap();
        assert_eq!(json, "\"bad\"");
        assert_eq!(AnnotationKind::Bad.accent_hex(), "#ef4444");
    }

    #[test]
    fn test_bbox_from_corners() {
        let b = BoundingBox::from_corners(10.0, 20.0, 110.0, 70.0);
        assert_eq!(b.width, 100.0);
        assert_eq!(b.height, 50.0);
        assert_eq!(b.center(), PixelPoint { x: 60.0, y: 45.0 });
        assert!(!b.contains(PixelPoint { x: 5.0, y: 45.0 }));
    }
}
