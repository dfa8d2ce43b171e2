//! Detail card placement
//!
//! The card for the active marker is centered horizontally on the marker and
//! kept inside the canvas. Vertically it goes below the annotation's box when
//! there is room, above when there is not, and otherwise sits beside the
//! marker clamped to the canvas.

use serde::{Deserialize, Serialize};

use crate::annotation::PixelPoint;

/// Rectangle in screen (or displayed image) pixels, Y down
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Square of side `2 * half` around a point
    pub fn around(p: PixelPoint, half: f32) -> Self {
        Self {
            left: p.x - half,
            top: p.y - half,
            width: half * 2.0,
            height: half * 2.0,
        }
    }

    pub fn contains(&self, p: PixelPoint) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }
}

/// Card dimensions and spacing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardLayout {
    pub card_width: f32,
    /// Tallest the card may grow
    pub max_height: f32,
    /// Minimum distance from the canvas edges
    pub padding: f32,
    /// Distance between the annotation box and the card
    pub gap: f32,
}

impl Default for CardLayout {
    fn default() -> Self {
        Self {
            card_width: 288.0,
            max_height: 200.0,
            padding: 16.0,
            gap: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardSide {
    Below,
    Above,
    Beside,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardPosition {
    pub left: f32,
    pub top: f32,
    pub side: CardSide,
}

impl CardPosition {
    pub fn rect(&self, layout: &CardLayout) -> ScreenRect {
        ScreenRect {
            left: self.left,
            top: self.top,
            width: layout.card_width,
            height: layout.max_height,
        }
    }
}

fn clamp_span(value: f32, min: f32, max: f32) -> f32 {
    if max < min {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Place the card for a marker
///
/// * `anchor` - the annotation's bounding box in canvas pixels
/// * `marker` - the marker point in canvas pixels
/// * `canvas` - canvas width and height
pub fn place_card(
    anchor: ScreenRect,
    marker: PixelPoint,
    canvas: (f32, f32),
    layout: &CardLayout,
) -> CardPosition {
    let (canvas_w, canvas_h) = canvas;

    let left = clamp_span(
        marker.x - layout.card_width / 2.0,
        layout.padding,
        canvas_w - layout.card_width - layout.padding,
    );

    let below_top = anchor.bottom() + layout.gap;
    if below_top + layout.max_height + layout.padding <= canvas_h {
        return CardPosition {
            left,
            top: below_top,
            side: CardSide::Below,
        };
    }

    let above_top = anchor.top - layout.gap - layout.max_height;
    if above_top >= layout.padding {
        return CardPosition {
            left,
            top: above_top,
            side: CardSide::Above,
        };
    }

    CardPosition {
        left,
        top: clamp_span(
            marker.y - layout.max_height / 2.0,
            layout.padding,
            canvas_h - layout.max_height - layout.padding,
        ),
        side: CardSide::Beside,
    }
}

/// Place the card inside a viewport that does not start at the origin
///
/// `anchor` and `marker` are in window pixels; the card is kept inside
/// `viewport` and returned in window pixels.
pub fn place_card_in(
    viewport: ScreenRect,
    anchor: ScreenRect,
    marker: PixelPoint,
    layout: &CardLayout,
) -> CardPosition {
    let local_anchor = ScreenRect {
        left: anchor.left - viewport.left,
        top: anchor.top - viewport.top,
        ..anchor
    };
    let local_marker = PixelPoint {
        x: marker.x - viewport.left,
        y: marker.y - viewport.top,
    };
    let canvas = (viewport.width, viewport.height);
    let local = place_card(local_anchor, local_marker, canvas, layout);
    CardPosition {
        left: local.left + viewport.left,
        top: local.top + viewport.top,
        side: local.side,
    }
}
