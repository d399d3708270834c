//! Box overlays on outgoing frames.

use crate::detect::{Detection, PersonFilter};
use crate::frame::{Frame, RGB_CHANNELS};

/// Overlay colour for person boxes (RGB).
pub const BOX_COLOR: [u8; 3] = [0, 0, 255];
pub const BOX_THICKNESS: u32 = 2;

/// Draw the outline of a normalized detection box onto `frame`.
///
/// The box is scaled to frame pixels and clamped to the frame. Boxes that
/// fall entirely outside or are empty after clamping are skipped.
pub fn draw_box(frame: &mut Frame, detection: &Detection, color: [u8; 3], thickness: u32) {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 || thickness == 0 {
        return;
    }
    let to_px = |v: f32, extent: u32| -> u32 {
        let scaled = (v * extent as f32).round();
        if scaled.is_nan() || scaled <= 0.0 {
            0
        } else {
            (scaled as u32).min(extent - 1)
        }
    };
    let (x1, x2) = ordered(to_px(detection.x1, width), to_px(detection.x2, width));
    let (y1, y2) = ordered(to_px(detection.y1, height), to_px(detection.y2, height));
    if x1 == x2 || y1 == y2 {
        return;
    }

    let stride = width as usize * RGB_CHANNELS;
    let pixels = frame.pixels_mut();
    let mut paint = |x: u32, y: u32| {
        let offset = y as usize * stride + x as usize * RGB_CHANNELS;
        pixels[offset..offset + RGB_CHANNELS].copy_from_slice(&color);
    };

    for t in 0..thickness {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        for x in x1..=x2 {
            paint(x, top);
            paint(x, bottom);
        }
        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for y in y1..=y2 {
            paint(left, y);
            paint(right, y);
        }
    }
}

fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Draw every detection the filter accepts. Returns how many were drawn.
pub fn annotate(frame: &mut Frame, detections: &[Detection], filter: PersonFilter) -> usize {
    let mut drawn = 0;
    for detection in detections.iter().filter(|d| filter.accepts(d)) {
        draw_box(frame, detection, BOX_COLOR, BOX_THICKNESS);
        drawn += 1;
    }
    drawn
}
