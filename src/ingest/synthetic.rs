//! Synthetic walking-people scene (`stub://`).
//!
//! Bright rectangular figures cross a dark background from left to right on
//! a fixed schedule. Groups enter every `GROUP_INTERVAL` frames and alternate
//! between one and two members walking in single file. With `dropout > 0` a
//! seeded RNG occasionally hides one visible figure for a frame, which gives
//! the tracker realistic flicker to smooth over.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub const DEFAULT_SYNTHETIC_FRAMES: u64 = 600;

pub const BACKGROUND: [u8; 3] = [16, 16, 16];
pub const FIGURE: [u8; 3] = [230, 230, 230];
pub const FIGURE_WIDTH: i64 = 40;
pub const FIGURE_HEIGHT: i64 = 120;
/// Horizontal speed in pixels per frame.
pub const WALK_SPEED: i64 = 8;
/// Distance between members of one group, front edge to front edge.
pub const MEMBER_SPACING: i64 = 120;
pub const FIRST_GROUP_AT: u64 = 20;
pub const GROUP_INTERVAL: u64 = 120;

#[derive(Clone, Debug)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub max_frames: u64,
    pub dropout: f64,
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            max_frames: DEFAULT_SYNTHETIC_FRAMES,
            dropout: 0.0,
            seed: 0,
        }
    }
}

impl SceneConfig {
    pub fn from_source_config(config: &SourceConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            max_frames: config.max_frames.unwrap_or(DEFAULT_SYNTHETIC_FRAMES),
            dropout: config.dropout,
            seed: config.seed,
        }
    }
}

/// Axis-aligned figure rectangle in frame pixels. `x` may be negative while
/// the figure is entering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Figure {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Figures at least partly inside a `width x height` frame at `index`.
pub fn figures_at(index: u64, width: u32, height: u32) -> Vec<Figure> {
    let width = i64::from(width);
    let y = (i64::from(height) - FIGURE_HEIGHT - 40).max(0);
    let mut figures = Vec::new();
    if index < FIRST_GROUP_AT {
        return figures;
    }
    let last_group = (index - FIRST_GROUP_AT) / GROUP_INTERVAL;
    for group in 0..=last_group {
        let start = FIRST_GROUP_AT + group * GROUP_INTERVAL;
        let walked = (index - start) as i64 * WALK_SPEED;
        let members = 1 + (group % 2) as i64;
        for member in 0..members {
            let x = walked - FIGURE_WIDTH - member * MEMBER_SPACING;
            if x + FIGURE_WIDTH > 0 && x < width {
                figures.push(Figure {
                    x,
                    y,
                    width: FIGURE_WIDTH,
                    height: FIGURE_HEIGHT,
                });
            }
        }
    }
    figures
}

pub struct SyntheticSource {
    name: String,
    config: SceneConfig,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(name: &str, config: SceneConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic scene needs a non-zero frame size"));
        }
        if !(0.0..=1.0).contains(&config.dropout) {
            return Err(anyhow!(
                "synthetic dropout must be within 0..=1 (got {})",
                config.dropout
            ));
        }
        Ok(Self {
            name: name.to_string(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            frame_count: 0,
            connected: false,
        })
    }

    fn render(&mut self, index: u64) -> Result<Frame> {
        let (width, height) = (self.config.width, self.config.height);
        let mut figures = figures_at(index, width, height);
        if !figures.is_empty() && self.rng.gen_bool(self.config.dropout) {
            let hidden = self.rng.gen_range(0..figures.len());
            figures.remove(hidden);
        }

        let mut frame = Frame::filled(width, height, index, BACKGROUND)?;
        let stride = width as usize * 3;
        let pixels = frame.pixels_mut();
        for figure in figures {
            let x0 = figure.x.max(0) as usize;
            let x1 = (figure.x + figure.width).min(i64::from(width)) as usize;
            let y0 = figure.y.max(0) as usize;
            let y1 = (figure.y + figure.height).min(i64::from(height)) as usize;
            for y in y0..y1 {
                for x in x0..x1 {
                    let offset = y * stride + x * 3;
                    pixels[offset..offset + 3].copy_from_slice(&FIGURE);
                }
            }
        }
        Ok(frame)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to stub://{} ({}x{}, {} frames)",
            self.name,
            self.config.width,
            self.config.height,
            self.config.max_frames
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.max_frames {
            return Ok(None);
        }
        let frame = self.render(self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: format!("stub://{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_alternates_single_and_paired_groups() {
        assert!(figures_at(20, 640, 480).is_empty());
        assert_eq!(figures_at(21, 640, 480).len(), 1);
        assert_eq!(figures_at(104, 640, 480).len(), 1);
        assert!(figures_at(105, 640, 480).is_empty());

        assert_eq!(figures_at(141, 640, 480).len(), 1);
        assert_eq!(figures_at(156, 640, 480).len(), 2);
        assert_eq!(figures_at(224, 640, 480).len(), 2);
        assert_eq!(figures_at(225, 640, 480).len(), 1);
        assert!(figures_at(240, 640, 480).is_empty());
    }

    #[test]
    fn figures_are_drawn_on_background() -> Result<()> {
        let mut source = SyntheticSource::new("walkers", SceneConfig::default())?;
        source.connect()?;
        let frame = source.render(30)?;
        let figure = figures_at(30, 640, 480)[0];
        let inside_x = (figure.x.max(0) + 1) as u32;
        let inside_y = (figure.y + 10) as u32;
        assert_eq!(frame.pixel(inside_x, inside_y), Some(FIGURE));
        assert_eq!(frame.pixel(600, 10), Some(BACKGROUND));
        Ok(())
    }

    #[test]
    fn same_seed_gives_same_stream() -> Result<()> {
        let config = SceneConfig {
            max_frames: 200,
            dropout: 0.3,
            seed: 42,
            ..SceneConfig::default()
        };
        let mut a = SyntheticSource::new("a", config.clone())?;
        let mut b = SyntheticSource::new("b", config)?;
        while let Some(frame_a) = a.next_frame()? {
            let frame_b = b.next_frame()?.expect("same length");
            assert_eq!(frame_a.index, frame_b.index);
            assert_eq!(frame_a.pixels(), frame_b.pixels());
        }
        assert!(b.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_invalid_dropout() {
        let config = SceneConfig {
            dropout: 1.5,
            ..SceneConfig::default()
        };
        assert!(SyntheticSource::new("bad", config).is_err());
    }
}
