//! Frame to network input conversion.

use crate::detect::{InputShape, Tensor};
use crate::frame::{Frame, RGB_CHANNELS};

/// Resize `frame` to `shape` (nearest neighbour) and lay it out as NCHW.
///
/// Pixel values are not normalized; the network sees `0.0..=255.0`.
pub fn preprocess(frame: &Frame, shape: InputShape) -> Tensor {
    let src_w = frame.width as usize;
    let src_h = frame.height as usize;
    let plane = shape.height * shape.width;
    let mut data = vec![0.0f32; shape.element_count()];
    if src_w == 0 || src_h == 0 {
        return Tensor { shape, data };
    }

    let pixels = frame.pixels();
    let channels = shape.channels.min(RGB_CHANNELS);
    for y in 0..shape.height {
        let sy = y * src_h / shape.height;
        for x in 0..shape.width {
            let sx = x * src_w / shape.width;
            let src = (sy * src_w + sx) * RGB_CHANNELS;
            let dst = y * shape.width + x;
            for c in 0..channels {
                data[c * plane + dst] = f32::from(pixels[src + c]);
            }
        }
    }
    Tensor { shape, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn output_is_planar_at_network_size() -> Result<()> {
        let frame = Frame::filled(64, 48, 0, [10, 20, 30])?;
        let tensor = preprocess(&frame, InputShape::rgb(16, 12));
        assert_eq!(tensor.data.len(), 3 * 12 * 16);
        assert_eq!(tensor.value(0, 5, 5), 10.0);
        assert_eq!(tensor.value(1, 11, 15), 20.0);
        assert_eq!(tensor.value(2, 0, 0), 30.0);
        Ok(())
    }

    #[test]
    fn downscale_samples_nearest_source_pixel() -> Result<()> {
        // Left half black, right half white.
        let (w, h) = (8u32, 2u32);
        let mut data = Vec::new();
        for _ in 0..h {
            for x in 0..w {
                let v = if x < w / 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let frame = Frame::new(data, w, h, 0)?;
        let tensor = preprocess(&frame, InputShape::rgb(4, 1));
        let row: Vec<f32> = (0..4).map(|x| tensor.value(0, 0, x)).collect();
        assert_eq!(row, vec![0.0, 0.0, 255.0, 255.0]);
        Ok(())
    }
}
