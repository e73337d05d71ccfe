use crate::animation::frame::{delay_to_seconds, Animation, BlendOp, DisposeOp, FrameRecord};
use crate::utils::error::{PlayerError, PlayerResult};
use log::{debug, warn};
use png::{ColorType, Transformations};
use std::collections::VecDeque;
use std::io::Cursor;

/// Display time given to a still PNG, which has no fcTL chunk.
pub const STILL_IMAGE_DURATION: f64 = 0.1;

/// Frames decoded per [`LoadTask::step`] unless configured otherwise.
pub const DEFAULT_FRAMES_PER_STEP: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Produce bottom-up frames (rows reversed, y offsets measured from the
    /// bottom edge) for consumers whose textures are stored that way.
    pub flip_vertical: bool,
}

/// Supplies decoded frames in order. Implemented by [`PngFrameSource`] for
/// real files and by [`PreparedFrames`] for frames decoded elsewhere.
pub trait FrameSource {
    /// Canvas width and height.
    fn dimensions(&self) -> (u32, u32);

    fn num_plays(&self) -> u32;

    /// Number of frames the source expects to produce.
    fn frame_count(&self) -> usize;

    /// Decodes the next frame, or returns `None` once every frame was produced.
    fn next_frame(&mut self) -> PlayerResult<Option<FrameRecord>>;
}

/// Frame source backed by the `png` crate.
pub struct PngFrameSource {
    reader: png::Reader<Cursor<Vec<u8>>>,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    num_plays: u32,
    frame_count: usize,
    produced: usize,
    animated: bool,
    options: LoadOptions,
}

impl PngFrameSource {
    pub fn new(bytes: Vec<u8>, options: LoadOptions) -> PlayerResult<PngFrameSource> {
        let mut decoder = png::Decoder::new(Cursor::new(bytes));
        decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);

        let reader = decoder.read_info()?;
        let info = reader.info();
        let (width, height) = (info.width, info.height);

        if width == 0 || height == 0 {
            return Err(PlayerError::decode(format!("Invalid image dimensions: {}x{}", width, height)));
        }

        let (animated, frame_count, num_plays) = match info.animation_control() {
            Some(control) if control.num_frames > 0 => (true, control.num_frames as usize, control.num_plays),
            Some(_) => {
                warn!("acTL chunk with zero frames, decoding as a still image");
                (false, 1, 0)
            }
            None => (false, 1, 0),
        };

        debug!(
            "PNG header: {}x{}, {} frame(s), {} play(s), color {:?}",
            width, height, frame_count, num_plays, info.color_type
        );

        let buffer = vec![0; reader.output_buffer_size()];

        Ok(PngFrameSource {
            reader,
            buffer,
            width,
            height,
            num_plays,
            frame_count,
            produced: 0,
            animated,
            options,
        })
    }

    fn decode_one(&mut self) -> PlayerResult<FrameRecord> {
        loop {
            let output = self.reader.next_frame(&mut self.buffer)?;
            let data = &self.buffer[..output.buffer_size()];
            let pixels = to_rgba8(output.color_type, data)?;

            let index = self.produced;
            let record = match self.reader.info().frame_control() {
                Some(control) if self.animated => FrameRecord::new(
                    index,
                    control.width,
                    control.height,
                    control.x_offset,
                    control.y_offset,
                    delay_to_seconds(control.delay_num, control.delay_den),
                    DisposeOp::from(control.dispose_op),
                    BlendOp::from(control.blend_op),
                    pixels,
                )?,
                // A default image without its own fcTL is not part of the animation
                None if self.animated => {
                    debug!("Skipping default image that is not part of the animation");
                    continue;
                }
                _ => FrameRecord::new(
                    index,
                    self.width,
                    self.height,
                    0,
                    0,
                    STILL_IMAGE_DURATION,
                    DisposeOp::None,
                    BlendOp::Source,
                    pixels,
                )?,
            };

            if record.width() != output.width || record.height() != output.height {
                return Err(PlayerError::decode(format!(
                    "frame {} decoded as {}x{} but fcTL declares {}x{}",
                    index,
                    output.width,
                    output.height,
                    record.width(),
                    record.height()
                )));
            }

            return Ok(record);
        }
    }
}

impl FrameSource for PngFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn num_plays(&self) -> u32 {
        self.num_plays
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn next_frame(&mut self) -> PlayerResult<Option<FrameRecord>> {
        if self.produced >= self.frame_count {
            return Ok(None);
        }

        match self.decode_one() {
            Ok(record) => {
                self.produced += 1;

                let record = if self.options.flip_vertical {
                    record.flipped_vertically(self.height)
                } else {
                    record
                };

                Ok(Some(record))
            }
            // Files that declare more frames than they contain still play
            // the frames that are present
            Err(PlayerError::DecodeFailure(msg)) if self.produced > 0 => {
                warn!(
                    "Animation truncated after {} of {} frames: {}",
                    self.produced, self.frame_count, msg
                );
                self.frame_count = self.produced;

                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Frames decoded outside this crate, fed in as-is.
#[derive(Debug, Clone)]
pub struct PreparedFrames {
    width: u32,
    height: u32,
    num_plays: u32,
    frame_count: usize,
    frames: VecDeque<FrameRecord>,
}

impl PreparedFrames {
    pub fn new(width: u32, height: u32, frames: Vec<FrameRecord>) -> PreparedFrames {
        PreparedFrames {
            width,
            height,
            num_plays: 0,
            frame_count: frames.len(),
            frames: frames.into(),
        }
    }
}

impl FrameSource for PreparedFrames {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn num_plays(&self) -> u32 {
        self.num_plays
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn next_frame(&mut self) -> PlayerResult<Option<FrameRecord>> {
        Ok(self.frames.pop_front())
    }
}

pub enum LoadStep {
    Pending(LoadTask),
    Complete(Animation),
}

/// Incremental decode of a [`FrameSource`]. Each step decodes a bounded
/// number of frames so a single-threaded host loop is never blocked for the
/// whole file. Dropping the task abandons the load.
pub struct LoadTask {
    source: Box<dyn FrameSource>,
    frames: Vec<FrameRecord>,
    frames_per_step: usize,
}

impl LoadTask {
    pub fn new(source: Box<dyn FrameSource>, frames_per_step: usize) -> LoadTask {
        let capacity = source.frame_count();

        LoadTask {
            source,
            frames: Vec::with_capacity(capacity),
            frames_per_step: frames_per_step.max(1),
        }
    }

    pub fn decoded(&self) -> usize {
        self.frames.len()
    }

    pub fn total(&self) -> usize {
        self.source.frame_count()
    }

    pub fn step(mut self) -> PlayerResult<LoadStep> {
        for _ in 0..self.frames_per_step {
            match self.source.next_frame()? {
                Some(frame) => self.frames.push(frame),
                None => return self.finish().map(LoadStep::Complete),
            }
        }

        if self.frames.len() >= self.source.frame_count() {
            return self.finish().map(LoadStep::Complete);
        }

        debug!("Decoded {}/{} frames", self.decoded(), self.total());

        Ok(LoadStep::Pending(self))
    }

    /// Drives the task to completion.
    pub fn run(self) -> PlayerResult<Animation> {
        let mut task = self;

        loop {
            match task.step()? {
                LoadStep::Pending(next) => task = next,
                LoadStep::Complete(animation) => return Ok(animation),
            }
        }
    }

    fn finish(self) -> PlayerResult<Animation> {
        let (width, height) = self.source.dimensions();

        Animation::new(width, height, self.source.num_plays(), self.frames)
    }
}

/// Decodes a whole APNG (or still PNG) in one call.
pub fn decode_animation(bytes: Vec<u8>, options: LoadOptions) -> PlayerResult<Animation> {
    let source = PngFrameSource::new(bytes, options)?;

    LoadTask::new(Box::new(source), DEFAULT_FRAMES_PER_STEP).run()
}

fn add_transparency_channel(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(3)
        .flat_map(|chunk| [chunk[0], chunk[1], chunk[2], 255])
        .collect()
}

fn l8_to_u8_rgba(pixels: &[u8]) -> Vec<u8> {
    pixels.iter().flat_map(|&v| [v, v, v, 255]).collect()
}

fn la8_to_u8_rgba(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(2)
        .flat_map(|chunk| [chunk[0], chunk[0], chunk[0], chunk[1]])
        .collect()
}

// Input is 8 bits per sample after the EXPAND | STRIP_16 transformations
fn to_rgba8(color_type: ColorType, data: &[u8]) -> PlayerResult<Vec<u8>> {
    match color_type {
        ColorType::Rgba => Ok(data.to_vec()),
        ColorType::Rgb => Ok(add_transparency_channel(data)),
        ColorType::Grayscale => Ok(l8_to_u8_rgba(data)),
        ColorType::GrayscaleAlpha => Ok(la8_to_u8_rgba(data)),
        ColorType::Indexed => Err(PlayerError::decode("Indexed output after palette expansion")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize) -> FrameRecord {
        FrameRecord::new(index, 1, 1, 0, 0, 0.1, DisposeOp::None, BlendOp::Source, vec![0; 4]).unwrap()
    }

    #[test]
    fn converts_color_types_to_rgba() {
        assert_eq!(to_rgba8(ColorType::Rgb, &[1, 2, 3]).unwrap(), vec![1, 2, 3, 255]);
        assert_eq!(to_rgba8(ColorType::Grayscale, &[7, 9]).unwrap(), vec![7, 7, 7, 255, 9, 9, 9, 255]);
        assert_eq!(to_rgba8(ColorType::GrayscaleAlpha, &[7, 9]).unwrap(), vec![7, 7, 7, 9]);
        assert_eq!(to_rgba8(ColorType::Rgba, &[1, 2, 3, 4]).unwrap(), vec![1, 2, 3, 4]);
        assert!(to_rgba8(ColorType::Indexed, &[0]).is_err());
    }

    #[test]
    fn load_task_yields_every_ten_frames() {
        let frames = (0..25).map(record).collect();
        let mut task = LoadTask::new(Box::new(PreparedFrames::new(1, 1, frames)), DEFAULT_FRAMES_PER_STEP);
        let mut steps = 0;

        let animation = loop {
            steps += 1;
            match task.step().unwrap() {
                LoadStep::Pending(next) => {
                    assert_eq!(next.decoded(), steps * 10);
                    assert_eq!(next.total(), 25);
                    task = next;
                }
                LoadStep::Complete(animation) => break animation,
            }
        };

        assert_eq!(steps, 3);
        assert_eq!(animation.frame_count(), 25);
        assert_eq!(animation.frames()[24].index(), 24);
    }

    #[test]
    fn load_task_completes_on_exact_multiple() {
        let frames = (0..10).map(record).collect();
        let task = LoadTask::new(Box::new(PreparedFrames::new(1, 1, frames)), 10);

        assert!(matches!(task.step().unwrap(), LoadStep::Complete(_)));
    }

    #[test]
    fn empty_source_fails() {
        let task = LoadTask::new(Box::new(PreparedFrames::new(1, 1, Vec::new())), 10);

        assert!(task.run().is_err());
    }

    #[test]
    fn garbage_bytes_are_decode_failure() {
        let result = PngFrameSource::new(b"definitely not a png".to_vec(), LoadOptions::default());

        assert!(matches!(result, Err(PlayerError::DecodeFailure(_))));
    }
}
