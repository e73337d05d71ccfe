pub mod animation;
pub mod decoders;
mod player;
mod source;
mod utils;

pub use animation::buffer::PixelBuffer;
pub use animation::clock::{PlayState, PlaybackClock, MIN_SPEED};
pub use animation::compositor::{Compositor, OverBlend};
pub use animation::frame::{delay_to_seconds, Animation, AnimationInfo, BlendOp, DisposeOp, FrameInfo, FrameRecord};
pub use decoders::apng::{
    decode_animation, FrameSource, LoadOptions, LoadStep, LoadTask, PngFrameSource, PreparedFrames,
    DEFAULT_FRAMES_PER_STEP, STILL_IMAGE_DURATION,
};
pub use player::{ApngPlayer, FrameSink, LoadState, PlayerOptions};
pub use source::ImageSource;
pub use utils::error::{PlayerError, PlayerResult};
pub use utils::logger::Logger;
pub use utils::writer::{FrameFormat, Writer};
