// Region geometry: header-skipping top-left / top-right boxes
use crate::config::RegionRatios;
use crate::types::{Rect, RegionKind};

fn clamp(value: f32, max: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.max(0.0).min(max)
}

/// Resolve one of the two canonical regions for a surface of `width` x `height`.
///
/// Works for page points and for rasterized pixels alike; the OCR fallback
/// calls it with image dimensions so both paths crop the same area.
pub fn region_rect(kind: RegionKind, width: f32, height: f32, ratios: &RegionRatios) -> Rect {
    let width = width.max(0.0);
    let height = height.max(0.0);
    let header = height * ratios.header_skip;

    let (left, right, box_height) = match kind {
        RegionKind::TopLeft => (0.0, width * ratios.left_width, ratios.left_height),
        RegionKind::TopRight => (
            width * (1.0 - ratios.right_width),
            width,
            ratios.right_height(),
        ),
    };

    Rect {
        left: clamp(left, width),
        top: clamp(header, height),
        right: clamp(right, width),
        bottom: clamp(header + height * box_height, height),
    }
}

/// Both regions for a page, left first.
pub fn page_regions(width: f32, height: f32, ratios: &RegionRatios) -> [Rect; 2] {
    [
        region_rect(RegionKind::TopLeft, width, height, ratios),
        region_rect(RegionKind::TopRight, width, height, ratios),
    ]
}

/// Whole-pixel crop box `(x, y, w, h)` for an image of the given size.
pub fn pixel_crop(kind: RegionKind, image_width: u32, image_height: u32, ratios: &RegionRatios) -> (u32, u32, u32, u32) {
    let rect = region_rect(kind, image_width as f32, image_height as f32, ratios);
    let x = rect.left.round() as u32;
    let y = rect.top.round() as u32;
    let right = (rect.right.round() as u32).min(image_width);
    let bottom = (rect.bottom.round() as u32).min(image_height);
    (x, y, right.saturating_sub(x), bottom.saturating_sub(y))
}
