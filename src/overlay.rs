//! Debug overlay showing where every build frame sits on its material.

use std::collections::BTreeSet;

use tracing::debug;

use crate::format::{Animation, BuildFrame};

pub const OVERLAY_COLORS: [[u8; 3]; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
];

pub const OVERLAY_ALPHA: u8 = 50;

/// Pixel rect `(x1, y1, x2, y2)` covered by `frame` on a `width`×`height`
/// material. Halves round to even.
pub fn frame_rect(frame: &BuildFrame, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let scale = |extent: u32, uv: f64| (f64::from(extent) * uv).round_ties_even().max(0.0) as u32;
    (
        scale(width, frame.uv0.x),
        scale(height, frame.uv0.y),
        scale(width, frame.uv1.x),
        scale(height, frame.uv1.y),
    )
}

/// Tints each distinct frame rect of every loaded material, cycling through
/// [`OVERLAY_COLORS`]. Returns the number of rects drawn.
pub fn overlay_atlas(animation: &mut Animation) -> usize {
    let Some(build) = animation.build.as_mut() else {
        return 0;
    };

    let mut seen = BTreeSet::new();
    for symbol in &build.symbols {
        for frame in &symbol.frames {
            let Some(image) = build
                .materials
                .get_mut(frame.image_index as usize)
                .and_then(|m| m.image.as_mut())
            else {
                continue;
            };
            let rect = frame_rect(frame, image.width(), image.height());
            if seen.contains(&(frame.image_index, rect)) {
                continue;
            }
            let color = OVERLAY_COLORS[seen.len() % OVERLAY_COLORS.len()];
            image.tint_rect(rect, color, OVERLAY_ALPHA);
            seen.insert((frame.image_index, rect));
        }
    }

    debug!(rects = seen.len(), "drew atlas overlay");
    seen.len()
}
