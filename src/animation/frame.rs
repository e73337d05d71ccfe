use crate::utils::error::{PlayerError, PlayerResult};
use serde::Serialize;

/// Delay denominator used when a frame declares zero.
pub const DEFAULT_DELAY_DEN: u16 = 100;

/// What happens to a frame's region before the next frame is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisposeOp {
    None,
    Background,
    Previous,
}

/// How a frame's pixels are combined with the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlendOp {
    Source,
    Over,
}

impl From<png::DisposeOp> for DisposeOp {
    fn from(op: png::DisposeOp) -> Self {
        match op {
            png::DisposeOp::None => DisposeOp::None,
            png::DisposeOp::Background => DisposeOp::Background,
            png::DisposeOp::Previous => DisposeOp::Previous,
        }
    }
}

impl From<png::BlendOp> for BlendOp {
    fn from(op: png::BlendOp) -> Self {
        match op {
            png::BlendOp::Source => BlendOp::Source,
            png::BlendOp::Over => BlendOp::Over,
        }
    }
}

/// Converts an fcTL delay fraction into seconds.
pub fn delay_to_seconds(delay_num: u16, delay_den: u16) -> f64 {
    let den = if delay_den == 0 { DEFAULT_DELAY_DEN } else { delay_den };

    delay_num as f64 / den as f64
}

/// A decoded animation frame: its rectangle on the canvas, its timing and
/// its RGBA8 pixels (row-major, top-left origin).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    index: usize,
    width: u32,
    height: u32,
    x_offset: u32,
    y_offset: u32,
    duration: f64,
    dispose_op: DisposeOp,
    blend_op: BlendOp,
    pixels: Vec<u8>,
}

impl FrameRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        width: u32,
        height: u32,
        x_offset: u32,
        y_offset: u32,
        duration: f64,
        dispose_op: DisposeOp,
        blend_op: BlendOp,
        pixels: Vec<u8>,
    ) -> PlayerResult<FrameRecord> {
        if width == 0 || height == 0 {
            return Err(PlayerError::invalid_frame(
                index,
                format!("empty frame region {}x{}", width, height),
            ));
        }

        if !duration.is_finite() || duration < 0.0 {
            return Err(PlayerError::invalid_frame(index, format!("invalid duration {}", duration)));
        }

        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(PlayerError::decode(format!(
                "frame {} has {} bytes of pixel data, expected {} for {}x{} RGBA",
                index,
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        Ok(FrameRecord {
            index,
            width,
            height,
            x_offset,
            y_offset,
            duration,
            dispose_op,
            blend_op,
            pixels,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn x_offset(&self) -> u32 {
        self.x_offset
    }

    pub fn y_offset(&self) -> u32 {
        self.y_offset
    }

    /// Display time in seconds at normal speed.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn dispose_op(&self) -> DisposeOp {
        self.dispose_op
    }

    pub fn blend_op(&self) -> BlendOp {
        self.blend_op
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// True when the frame rectangle lies within a canvas of the given size.
    pub fn fits_within(&self, canvas_width: u32, canvas_height: u32) -> bool {
        let right = self.x_offset.checked_add(self.width);
        let bottom = self.y_offset.checked_add(self.height);

        matches!((right, bottom), (Some(r), Some(b)) if r <= canvas_width && b <= canvas_height)
    }

    /// Converts the frame to bottom-up row order for a canvas of
    /// `canvas_height` rows: pixel rows are reversed and the y offset is
    /// measured from the bottom edge.
    pub fn flipped_vertically(mut self, canvas_height: u32) -> FrameRecord {
        let row_len = self.width as usize * 4;
        let flipped: Vec<u8> = self.pixels.chunks_exact(row_len).rev().flatten().copied().collect();

        self.pixels = flipped;
        self.y_offset = canvas_height.saturating_sub(self.y_offset + self.height);

        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub duration: f64,
    pub dispose_op: DisposeOp,
    pub blend_op: BlendOp,
}

impl From<&FrameRecord> for FrameInfo {
    fn from(frame: &FrameRecord) -> Self {
        FrameInfo {
            index: frame.index,
            width: frame.width,
            height: frame.height,
            x_offset: frame.x_offset,
            y_offset: frame.y_offset,
            duration: frame.duration,
            dispose_op: frame.dispose_op,
            blend_op: frame.blend_op,
        }
    }
}

/// A fully decoded animation: canvas size plus frames in decode order.
#[derive(Debug, Clone)]
pub struct Animation {
    width: u32,
    height: u32,
    num_plays: u32,
    frames: Vec<FrameRecord>,
}

impl Animation {
    pub fn new(width: u32, height: u32, num_plays: u32, frames: Vec<FrameRecord>) -> PlayerResult<Animation> {
        if width == 0 || height == 0 {
            return Err(PlayerError::decode(format!("Invalid canvas dimensions: {}x{}", width, height)));
        }

        if frames.is_empty() {
            return Err(PlayerError::invalid_frame(0, "animation has no frames"));
        }

        for (position, frame) in frames.iter().enumerate() {
            if frame.index != position {
                return Err(PlayerError::invalid_frame(
                    frame.index,
                    format!("out of order, found at position {}", position),
                ));
            }

            if !frame.fits_within(width, height) {
                return Err(PlayerError::invalid_frame(
                    frame.index,
                    format!(
                        "region {}x{}+{}+{} exceeds canvas {}x{}",
                        frame.width, frame.height, frame.x_offset, frame.y_offset, width, height
                    ),
                ));
            }
        }

        Ok(Animation {
            width,
            height,
            num_plays,
            frames,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Play count declared by acTL (0 means infinite). Playback loops
    /// regardless; this is informational.
    pub fn num_plays(&self) -> u32 {
        self.num_plays
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.frames.iter().map(FrameRecord::duration).collect()
    }

    pub fn total_duration(&self) -> f64 {
        self.frames.iter().map(FrameRecord::duration).sum()
    }

    pub fn info(&self) -> AnimationInfo {
        AnimationInfo {
            width: self.width,
            height: self.height,
            num_plays: self.num_plays,
            total_duration: self.total_duration(),
            frames: self.frames.iter().map(FrameInfo::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnimationInfo {
    pub width: u32,
    pub height: u32,
    pub num_plays: u32,
    pub total_duration: f64,
    pub frames: Vec<FrameInfo>,
}
