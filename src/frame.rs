//! Decoded video frames.
//!
//! Frames are packed RGB24, row-major, no padding between rows. Sources are
//! responsible for stripping decoder stride before building a `Frame`.

use anyhow::{anyhow, Result};

pub const RGB_CHANNELS: usize = 3;

pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Zero-based position in the stream.
    pub index: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    /// Solid-colour frame, mostly useful for tests.
    pub fn filled(width: u32, height: u32, index: u64, rgb: [u8; 3]) -> Result<Self> {
        let len = rgb_len(width, height)?;
        let data = rgb.iter().copied().cycle().take(len).collect();
        Self::new(data, width, height, index)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("index", &self.index)
            .field("bytes", &self.data.len())
            .finish()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        let err = Frame::new(vec![0u8; 5], 2, 1, 0).unwrap_err();
        assert!(format!("{err}").contains("length mismatch"));
    }

    #[test]
    fn filled_frame_reads_back_pixels() -> Result<()> {
        let frame = Frame::filled(4, 3, 7, [10, 20, 30])?;
        assert_eq!(frame.pixels().len(), 4 * 3 * 3);
        assert_eq!(frame.pixel(3, 2), Some([10, 20, 30]));
        assert_eq!(frame.pixel(4, 0), None);
        assert_eq!(frame.index, 7);
        Ok(())
    }
}
