use crate::animation::buffer::PixelBuffer;
use crate::animation::frame::{Animation, BlendOp, DisposeOp, FrameRecord};
use log::debug;

/// How `BlendOp::Over` frames are drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverBlend {
    /// Draw over existing content without clearing, replacing covered pixels.
    /// Translucent pixels are not mixed with what is underneath.
    #[default]
    Overwrite,
    /// Straight-alpha source-over compositing.
    AlphaComposite,
}

/// Bookkeeping for the last drawn frame, consumed before the next draw.
#[derive(Debug, Clone)]
struct PreviousFrame {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    dispose_op: DisposeOp,
    // Canvas contents of the rectangle before the frame was drawn,
    // only kept for DisposeOp::Previous
    restore: Option<Vec<u8>>,
}

/// Owns the canvas and derives frame N from the canvas state left by
/// frame N-1.
#[derive(Debug)]
pub struct Compositor {
    animation: Animation,
    canvas: PixelBuffer,
    current_index: Option<usize>,
    previous: Option<PreviousFrame>,
    over_blend: OverBlend,
}

impl Compositor {
    pub fn new(animation: Animation) -> Compositor {
        Compositor::with_over_blend(animation, OverBlend::default())
    }

    pub fn with_over_blend(animation: Animation, over_blend: OverBlend) -> Compositor {
        let canvas = PixelBuffer::new(animation.width(), animation.height());

        Compositor {
            animation,
            canvas,
            current_index: None,
            previous: None,
            over_blend,
        }
    }

    pub fn canvas(&self) -> &PixelBuffer {
        &self.canvas
    }

    /// Owned copy of the canvas that stays valid across later composites.
    pub fn snapshot(&self) -> PixelBuffer {
        self.canvas.clone()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn frame_count(&self) -> usize {
        self.animation.frame_count()
    }

    pub fn frames(&self) -> &[FrameRecord] {
        self.animation.frames()
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    /// Clears the canvas and forgets everything drawn so far.
    pub fn reset(&mut self) {
        self.canvas.clear();
        self.current_index = None;
        self.previous = None;
    }

    /// Renders frame `index` on top of the current canvas state and returns
    /// the canvas. Rendering the frame that is already showing does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid frame index.
    pub fn composite(&mut self, index: usize) -> &PixelBuffer {
        assert!(
            index < self.animation.frame_count(),
            "Frame index {} out of range (frame count {})",
            index,
            self.animation.frame_count()
        );

        if self.current_index == Some(index) {
            return &self.canvas;
        }

        // Frame 0 has no predecessor, so every loop starts from a blank canvas
        if index == 0 {
            self.canvas.clear();
            self.previous = None;
        }

        if let Some(previous) = self.previous.take() {
            Self::dispose(&mut self.canvas, previous);
        }

        let frame = &self.animation.frames()[index];
        let (x, y, width, height) = (frame.x_offset(), frame.y_offset(), frame.width(), frame.height());

        let restore = match frame.dispose_op() {
            DisposeOp::Previous => Some(self.canvas.get_pixels(x, y, width, height)),
            _ => None,
        };

        match (frame.blend_op(), self.over_blend) {
            (BlendOp::Source, _) => {
                self.canvas.clear_rect(x, y, width, height);
                self.canvas.set_pixels(frame.pixels(), x, y, width, height);
            }
            (BlendOp::Over, OverBlend::Overwrite) => {
                self.canvas.set_pixels(frame.pixels(), x, y, width, height);
            }
            (BlendOp::Over, OverBlend::AlphaComposite) => {
                self.canvas.blend_pixels(frame.pixels(), x, y, width, height);
            }
        }

        debug!(
            "Composited frame {} ({}x{}+{}+{}, {:?}/{:?})",
            index,
            width,
            height,
            x,
            y,
            frame.dispose_op(),
            frame.blend_op()
        );

        self.previous = Some(PreviousFrame {
            x,
            y,
            width,
            height,
            dispose_op: frame.dispose_op(),
            restore,
        });
        self.current_index = Some(index);

        &self.canvas
    }

    fn dispose(canvas: &mut PixelBuffer, previous: PreviousFrame) {
        match previous.dispose_op {
            DisposeOp::None => {}
            DisposeOp::Background => {
                canvas.clear_rect(previous.x, previous.y, previous.width, previous.height);
            }
            DisposeOp::Previous => {
                if let Some(pixels) = previous.restore {
                    canvas.set_pixels(&pixels, previous.x, previous.y, previous.width, previous.height);
                }
            }
        }
    }
}
