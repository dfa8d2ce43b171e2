//! SVG export of the 2D annotation overlay
//!
//! Draws each annotation's box and center marker over the room photo, and
//! optionally the detail card of one active annotation placed the same way
//! the viewer places it.

use fengshui_core::{
    place_card, Annotation, CardLayout, ImageMetrics, ImageSize, OverlayLayout, OverlayShape,
    PixelPoint, ScreenRect,
};
use quick_xml::se::to_string;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Failed to read image size: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to serialize SVG: {0}")]
    Serialize(String),
    #[error("Annotation {index} out of range ({count} annotations)")]
    NoSuchAnnotation { index: usize, count: usize },
}

/// Characters per card text line
const CARD_LINE_CHARS: usize = 38;
const CARD_LINE_HEIGHT: f32 = 18.0;

#[derive(Serialize)]
#[serde(rename = "svg")]
struct SvgDoc {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "@width")]
    width: f32,
    #[serde(rename = "@height")]
    height: f32,
    #[serde(rename = "@viewBox")]
    view_box: String,
    image: SvgImage,
    #[serde(rename = "g")]
    groups: Vec<SvgGroup>,
}

#[derive(Serialize)]
struct SvgImage {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@width")]
    width: f32,
    #[serde(rename = "@height")]
    height: f32,
}

#[derive(Serialize)]
struct SvgGroup {
    #[serde(rename = "@class")]
    class: String,
    #[serde(rename = "rect")]
    rects: Vec<SvgRect>,
    #[serde(rename = "circle")]
    circles: Vec<SvgCircle>,
    #[serde(rename = "text")]
    texts: Vec<SvgText>,
}

#[derive(Serialize)]
struct SvgRect {
    #[serde(rename = "@x")]
    x: f32,
    #[serde(rename = "@y")]
    y: f32,
    #[serde(rename = "@width")]
    width: f32,
    #[serde(rename = "@height")]
    height: f32,
    #[serde(rename = "@rx")]
    rx: f32,
    #[serde(rename = "@fill")]
    fill: String,
    #[serde(rename = "@stroke")]
    stroke: String,
    #[serde(rename = "@stroke-width")]
    stroke_width: f32,
}

#[derive(Serialize)]
struct SvgCircle {
    #[serde(rename = "@cx")]
    cx: f32,
    #[serde(rename = "@cy")]
    cy: f32,
    #[serde(rename = "@r")]
    r: f32,
    #[serde(rename = "@fill")]
    fill: String,
}

#[derive(Serialize)]
struct SvgText {
    #[serde(rename = "@x")]
    x: f32,
    #[serde(rename = "@y")]
    y: f32,
    #[serde(rename = "@fill")]
    fill: String,
    #[serde(rename = "@font-size")]
    font_size: f32,
    #[serde(rename = "$text")]
    text: String,
}

/// Natural pixel size of an image file
pub fn image_natural_size(path: &Path) -> Result<ImageSize, OverlayError> {
    let (width, height) = image::image_dimensions(path)?;
    Ok(ImageSize::new(width as f32, height as f32))
}

/// Greedy word wrap
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn marker_group(shape: &OverlayShape, active: bool) -> SvgGroup {
    let accent = shape.kind.accent_hex();
    let active_suffix = if active { " active" } else { "" };
    SvgGroup {
        class: format!("annotation {:?}{}", shape.kind, active_suffix)
            .to_lowercase(),
        rects: vec![SvgRect {
            x: shape.rect.left,
            y: shape.rect.top,
            width: shape.rect.width,
            height: shape.rect.height,
            rx: 4.0,
            fill: "none".to_string(),
            stroke: accent.clone(),
            stroke_width: if active { 3.0 } else { 2.0 },
        }],
        circles: vec![SvgCircle {
            cx: shape.center.x,
            cy: shape.center.y,
            r: shape.radius,
            fill: accent,
        }],
        texts: Vec::new(),
    }
}

fn card_group(
    annotation: &Annotation,
    anchor: ScreenRect,
    marker: PixelPoint,
    canvas: (f32, f32),
) -> SvgGroup {
    let layout = CardLayout::default();
    let pos = place_card(anchor, marker, canvas, &layout);
    let rect = pos.rect(&layout);
    let accent = annotation.kind.accent_hex();

    let x = rect.left + 12.0;
    let mut y = rect.top + 24.0;
    let mut texts = vec![SvgText {
        x,
        y,
        fill: accent.clone(),
        font_size: 15.0,
        text: format!("{} {}", annotation.kind.icon(), annotation.object_class),
    }];
    let max_lines = ((rect.height - 48.0) / CARD_LINE_HEIGHT).max(1.0) as usize;
    for line in wrap(&annotation.message, CARD_LINE_CHARS).into_iter().take(max_lines) {
        y += CARD_LINE_HEIGHT;
        texts.push(SvgText {
            x,
            y,
            fill: "#1f2937".to_string(),
            font_size: 13.0,
            text: line,
        });
    }
    texts.push(SvgText {
        x,
        y: rect.bottom() - 12.0,
        fill: "#6b7280".to_string(),
        font_size: 11.0,
        text: format!("Confidence {:.0}%", annotation.confidence * 100.0),
    });

    SvgGroup {
        class: "card".to_string(),
        rects: vec![SvgRect {
            x: rect.left,
            y: rect.top,
            width: rect.width,
            height: rect.height,
            rx: 10.0,
            fill: "#ffffff".to_string(),
            stroke: accent,
            stroke_width: 2.0,
        }],
        circles: Vec::new(),
        texts,
    }
}

/// Render the overlay as an SVG document
///
/// Coordinates are scaled from the image's effective size (natural when
/// known, otherwise the fallback) into `displayed`.
pub fn render_overlay(
    annotations: &[Annotation],
    metrics: &ImageMetrics,
    displayed: ImageSize,
    image_href: &str,
    active: Option<usize>,
) -> Result<String, OverlayError> {
    if let Some(index) = active {
        if index >= annotations.len() {
            return Err(OverlayError::NoSuchAnnotation {
                index,
                count: annotations.len(),
            });
        }
    }

    let layout = OverlayLayout::new(metrics, displayed);
    let shapes = layout.shapes(annotations);
    let mut groups: Vec<SvgGroup> = shapes
        .iter()
        .map(|s| marker_group(s, active == Some(s.index)))
        .collect();

    if let Some(shape) = active.and_then(|i| shapes.get(i)) {
        tracing::debug!(index = shape.index, "Placing detail card");
        groups.push(card_group(
            &annotations[shape.index],
            shape.rect,
            shape.center,
            (displayed.width, displayed.height),
        ));
    }

    let doc = SvgDoc {
        xmlns: "http://www.w3.org/2000/svg",
        width: displayed.width,
        height: displayed.height,
        view_box: format!("0 0 {} {}", displayed.width, displayed.height),
        image: SvgImage {
            href: image_href.to_string(),
            width: displayed.width,
            height: displayed.height,
        },
        groups,
    };

    let svg = to_string(&doc).map_err(|e| OverlayError::Serialize(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", svg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fengshui_core::{AnnotationKind, BoundingBox, Coordinates};

    fn annotation(kind: AnnotationKind, x1: f32, y1: f32, x2: f32, y2: f32) -> Annotation {
        let bbox = BoundingBox::from_corners(x1, y1, x2, y2);
        Annotation {
            object_class: "plant".to_string(),
            object_index: 0,
            kind,
            message: "Living plants bring fresh wood energy into the corner".to_string(),
            coordinates: Coordinates {
                center: bbox.center(),
                bbox,
            },
            confidence: 0.87,
        }
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("a bb ccc", 4), vec!["a bb", "ccc"]);
        assert!(wrap("", 10).is_empty());
    }

    #[test]
    fn test_render_markers_and_card() {
        let mut metrics = ImageMetrics::with_fallback(ImageSize::default());
        metrics.on_image_loaded(ImageSize::new(1000.0, 800.0));
        let annotations = vec![
            annotation(AnnotationKind::Good, 100.0, 100.0, 300.0, 300.0),
            annotation(AnnotationKind::Bad, 500.0, 400.0, 700.0, 600.0),
        ];

        let displayed = ImageSize::new(500.0, 400.0);
        let svg = render_overlay(&annotations, &metrics, displayed, "room.jpg", Some(1)).unwrap();
        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("<svg"));
        assert!(svg.contains("href=\"room.jpg\""));
        assert!(svg.contains("class=\"annotation good\""));
        assert!(svg.contains("class=\"annotation bad active\""));
        assert!(svg.contains("class=\"card\""));
        assert!(svg.contains("Confidence 87%"));
        assert!(svg.contains("#ef4444"));
    }

    #[test]
    fn test_active_out_of_range() {
        let metrics = ImageMetrics::default();
        let displayed = ImageSize::default();
        let err = render_overlay(&[], &metrics, displayed, "room.jpg", Some(0)).unwrap_err();
        assert!(matches!(
            err,
            OverlayError::NoSuchAnnotation { index: 0, count: 0 }
        ));
    }
}
