use crate::animation::buffer::PixelBuffer;
use crate::animation::clock::{PlayState, PlaybackClock, MIN_SPEED};
use crate::animation::compositor::{Compositor, OverBlend};
use crate::animation::frame::{Animation, AnimationInfo};
use crate::decoders::apng::{FrameSource, LoadOptions, LoadStep, LoadTask, PngFrameSource, DEFAULT_FRAMES_PER_STEP};
use crate::source::ImageSource;
use crate::utils::error::{PlayerError, PlayerResult};
use log::{debug, error, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    Unloaded,
    Loading,
    Processing,
    Ready,
    Error,
}

/// Receives every rendered canvas. The borrow ends when `present` returns;
/// sinks that need the pixels later must copy them.
///
/// A sink is called on every render request, including ones that leave the
/// canvas unchanged, such as `stop()` while frame 0 is showing or a
/// single-frame animation wrapping around.
pub trait FrameSink {
    fn present(&mut self, index: usize, canvas: &PixelBuffer);
}

impl<F> FrameSink for F
where
    F: FnMut(usize, &PixelBuffer),
{
    fn present(&mut self, index: usize, canvas: &PixelBuffer) {
        self(index, canvas)
    }
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Start playing as soon as loading finishes. Otherwise frame 0 is
    /// rendered and the player waits for `play`.
    pub auto_play: bool,
    /// Playback rate multiplier, at least [`MIN_SPEED`].
    pub speed: f32,
    /// Frames decoded per `update` call while loading.
    pub frames_per_step: usize,
    pub over_blend: OverBlend,
    pub flip_vertical: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        PlayerOptions {
            auto_play: true,
            speed: 1.0,
            frames_per_step: DEFAULT_FRAMES_PER_STEP,
            over_blend: OverBlend::Overwrite,
            flip_vertical: false,
        }
    }
}

type ReadyListener = Box<dyn FnMut(&ApngPlayer)>;
type ErrorListener = Box<dyn FnMut(&ApngPlayer, &str)>;

/// Host-facing APNG player.
///
/// The host calls [`update`](ApngPlayer::update) once per tick of its render
/// loop with a monotonic time in seconds. Loading progresses a few frames per
/// update; once ready, the playback clock decides when the next frame is due
/// and the compositor renders it.
pub struct ApngPlayer {
    options: PlayerOptions,
    load_state: LoadState,
    pending: Option<LoadTask>,
    compositor: Option<Compositor>,
    clock: Option<PlaybackClock>,
    last_error: Option<String>,
    sinks: Vec<Box<dyn FrameSink>>,
    ready_listeners: Vec<ReadyListener>,
    error_listeners: Vec<ErrorListener>,
}

impl Default for ApngPlayer {
    fn default() -> Self {
        ApngPlayer::new(PlayerOptions::default())
    }
}

impl ApngPlayer {
    pub fn new(mut options: PlayerOptions) -> ApngPlayer {
        options.speed = if options.speed.is_finite() { options.speed.max(MIN_SPEED) } else { 1.0 };

        ApngPlayer {
            options,
            load_state: LoadState::Unloaded,
            pending: None,
            compositor: None,
            clock: None,
            last_error: None,
            sinks: Vec::new(),
            ready_listeners: Vec::new(),
            error_listeners: Vec::new(),
        }
    }

    pub fn on_ready(&mut self, listener: impl FnMut(&ApngPlayer) + 'static) {
        self.ready_listeners.push(Box::new(listener));
    }

    pub fn on_error(&mut self, listener: impl FnMut(&ApngPlayer, &str) + 'static) {
        self.error_listeners.push(Box::new(listener));
    }

    pub fn add_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sinks.push(sink);
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn is_ready(&self) -> bool {
        self.load_state == LoadState::Ready
    }

    pub fn play_state(&self) -> PlayState {
        self.clock.as_ref().map_or(PlayState::Stopped, PlaybackClock::state)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn current_frame_index(&self) -> Option<usize> {
        self.compositor.as_ref().and_then(Compositor::current_index)
    }

    pub fn frame_count(&self) -> usize {
        self.compositor.as_ref().map_or(0, Compositor::frame_count)
    }

    pub fn width(&self) -> u32 {
        self.animation().map_or(0, Animation::width)
    }

    pub fn height(&self) -> u32 {
        self.animation().map_or(0, Animation::height)
    }

    pub fn animation(&self) -> Option<&Animation> {
        self.compositor.as_ref().map(Compositor::animation)
    }

    pub fn info(&self) -> Option<AnimationInfo> {
        self.animation().map(Animation::info)
    }

    /// The canvas as of the last render. Valid until the next mutating call.
    pub fn canvas(&self) -> Option<&PixelBuffer> {
        self.compositor.as_ref().map(Compositor::canvas)
    }

    /// Owned copy of the canvas.
    pub fn snapshot(&self) -> Option<PixelBuffer> {
        self.compositor.as_ref().map(Compositor::snapshot)
    }

    pub fn speed(&self) -> f32 {
        self.options.speed
    }

    pub fn set_speed(&mut self, multiplier: f32) {
        if let Some(clock) = self.clock.as_mut() {
            clock.set_speed(multiplier);
            self.options.speed = clock.speed();
        } else if multiplier.is_finite() {
            self.options.speed = multiplier.max(MIN_SPEED);
        } else {
            warn!("Ignoring non-finite playback speed {}", multiplier);
        }
    }

    /// Starts loading `source`. Decoding then continues in
    /// [`update`](ApngPlayer::update). Failures are reported through
    /// `on_error` and [`LoadState::Error`].
    pub fn load(&mut self, source: ImageSource) {
        if !self.accepts_load() {
            return;
        }

        if let Err(e) = self.begin_load(source) {
            self.fail(&e);
        }
    }

    /// Loads frames produced by an external decoder.
    pub fn load_frames(&mut self, source: Box<dyn FrameSource>) {
        if !self.accepts_load() {
            return;
        }

        self.last_error = None;
        self.load_state = LoadState::Processing;
        self.pending = Some(LoadTask::new(source, self.options.frames_per_step));
    }

    /// Loads and decodes `source` to completion before returning. The error,
    /// if any, is also reported through `on_error`.
    pub fn load_blocking(&mut self, source: ImageSource, now: f64) -> PlayerResult<()> {
        if !self.accepts_load() {
            return Ok(());
        }

        let result = self.begin_load(source).and_then(|_| self.drive_load(now));
        if let Err(e) = &result {
            self.fail(e);
        }

        result
    }

    /// Abandons an in-progress load. Nothing decoded so far is kept.
    pub fn cancel_load(&mut self) {
        if matches!(self.load_state, LoadState::Loading | LoadState::Processing) {
            info!("Load cancelled");
            self.pending = None;
            self.load_state = LoadState::Unloaded;
        }
    }

    /// Per-tick host callback.
    pub fn update(&mut self, now: f64) {
        match self.load_state {
            LoadState::Processing => {
                if let Err(e) = self.step_load(now) {
                    self.fail(&e);
                }
            }
            LoadState::Ready => {
                let due = self.clock.as_mut().and_then(|clock| clock.tick(now));
                if let Some(index) = due {
                    self.render(index);
                }
            }
            _ => {}
        }
    }

    pub fn play(&mut self, now: f64) {
        if !self.require_ready("play") {
            return;
        }

        let due = self.clock.as_mut().and_then(|clock| clock.play(now));
        if let Some(index) = due {
            self.render(index);
        }
    }

    pub fn pause(&mut self, now: f64) {
        if !self.require_ready("pause") {
            return;
        }

        if let Some(clock) = self.clock.as_mut() {
            clock.pause(now);
        }
    }

    /// Stops playback and shows frame 0 again.
    pub fn stop(&mut self) {
        if !self.require_ready("stop") {
            return;
        }

        let due = self.clock.as_mut().and_then(PlaybackClock::stop);
        if let Some(index) = due {
            self.render(index);
        }
    }

    /// Drops the loaded animation and returns to [`LoadState::Unloaded`].
    pub fn clear(&mut self) {
        if !self.require_ready("clear") {
            return;
        }

        self.compositor = None;
        self.clock = None;
        self.pending = None;
        self.load_state = LoadState::Unloaded;
        info!("Player cleared");
    }

    fn accepts_load(&self) -> bool {
        match self.load_state {
            LoadState::Unloaded | LoadState::Error => true,
            state => {
                warn!("Player load state is {:?}, can't load", state);
                false
            }
        }
    }

    fn require_ready(&self, action: &str) -> bool {
        if self.load_state != LoadState::Ready {
            warn!("Player is not ready, can't {}", action);
            return false;
        }

        true
    }

    fn begin_load(&mut self, source: ImageSource) -> PlayerResult<()> {
        self.last_error = None;
        self.load_state = LoadState::Loading;
        info!("Loading {}", source);

        let bytes = source.fetch()?;

        self.load_state = LoadState::Processing;
        let options = LoadOptions {
            flip_vertical: self.options.flip_vertical,
        };
        let frames = PngFrameSource::new(bytes, options)?;
        self.pending = Some(LoadTask::new(Box::new(frames), self.options.frames_per_step));

        Ok(())
    }

    fn step_load(&mut self, now: f64) -> PlayerResult<()> {
        let Some(task) = self.pending.take() else {
            return Ok(());
        };

        match task.step()? {
            LoadStep::Pending(task) => self.pending = Some(task),
            LoadStep::Complete(animation) => self.finish_load(animation, now),
        }

        Ok(())
    }

    fn drive_load(&mut self, now: f64) -> PlayerResult<()> {
        while self.pending.is_some() {
            self.step_load(now)?;
        }

        Ok(())
    }

    fn finish_load(&mut self, animation: Animation, now: f64) {
        info!(
            "Loaded {}x{} animation with {} frame(s)",
            animation.width(),
            animation.height(),
            animation.frame_count()
        );

        let mut clock = PlaybackClock::new(animation.durations());
        clock.set_speed(self.options.speed);

        self.compositor = Some(Compositor::with_over_blend(animation, self.options.over_blend));
        self.clock = Some(clock);
        self.load_state = LoadState::Ready;

        let mut listeners = std::mem::take(&mut self.ready_listeners);
        for listener in listeners.iter_mut() {
            listener(&*self);
        }
        self.ready_listeners = listeners;

        if self.options.auto_play {
            self.play(now);
        } else {
            // Show the first frame without starting the clock
            let due = self.clock.as_mut().and_then(PlaybackClock::stop);
            if let Some(index) = due {
                self.render(index);
            }
        }
    }

    fn fail(&mut self, error: &PlayerError) {
        let message = error.to_string();
        error!("{}", message);

        self.pending = None;
        self.compositor = None;
        self.clock = None;
        self.load_state = LoadState::Error;
        self.last_error = Some(message.clone());

        let mut listeners = std::mem::take(&mut self.error_listeners);
        for listener in listeners.iter_mut() {
            listener(&*self, &message);
        }
        self.error_listeners = listeners;
    }

    fn render(&mut self, index: usize) {
        let Some(compositor) = self.compositor.as_mut() else {
            return;
        };

        let canvas = compositor.composite(index);
        debug!("Presenting frame {} to {} sink(s)", index, self.sinks.len());

        for sink in self.sinks.iter_mut() {
            sink.present(index, canvas);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::frame::{BlendOp, DisposeOp, FrameRecord};
    use crate::decoders::apng::PreparedFrames;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn frames(count: usize, duration: f64) -> Box<PreparedFrames> {
        let records = (0..count)
            .map(|index| {
                let shade = (index * 10) as u8;
                FrameRecord::new(
                    index,
                    2,
                    2,
                    0,
                    0,
                    duration,
                    DisposeOp::None,
                    BlendOp::Source,
                    [shade, shade, shade, 255].repeat(4),
                )
                .unwrap()
            })
            .collect();

        Box::new(PreparedFrames::new(2, 2, records))
    }

    fn ready_player(options: PlayerOptions, count: usize, duration: f64) -> ApngPlayer {
        let mut player = ApngPlayer::new(options);
        player.load_frames(frames(count, duration));
        while player.load_state() == LoadState::Processing {
            player.update(0.0);
        }

        player
    }

    #[test]
    fn becomes_ready_and_autoplays() {
        let ready_calls = Rc::new(RefCell::new(0));
        let presented = Rc::new(RefCell::new(Vec::new()));

        let mut player = ApngPlayer::default();
        let calls = ready_calls.clone();
        player.on_ready(move |player| {
            assert!(player.is_ready());
            *calls.borrow_mut() += 1;
        });
        let seen = presented.clone();
        player.add_sink(Box::new(move |index: usize, _canvas: &PixelBuffer| seen.borrow_mut().push(index)));

        player.load_frames(frames(3, 0.5));
        assert_eq!(player.load_state(), LoadState::Processing);

        player.update(0.0);

        assert_eq!(player.load_state(), LoadState::Ready);
        assert_eq!(player.play_state(), PlayState::Playing);
        assert_eq!(*ready_calls.borrow(), 1);
        assert_eq!(*presented.borrow(), vec![0]);
        assert_eq!(player.frame_count(), 3);
        assert_eq!((player.width(), player.height()), (2, 2));

        player.update(0.5);
        player.update(0.7);
        player.update(1.0);
        player.update(1.5);

        assert_eq!(*presented.borrow(), vec![0, 1, 2, 0]);
        assert_eq!(player.current_frame_index(), Some(0));
    }

    #[test]
    fn loading_spreads_over_updates() {
        let mut player = ApngPlayer::default();
        player.load_frames(frames(25, 0.1));

        player.update(0.0);
        assert_eq!(player.load_state(), LoadState::Processing);
        player.update(0.0);
        assert_eq!(player.load_state(), LoadState::Processing);
        player.update(0.0);
        assert_eq!(player.load_state(), LoadState::Ready);
    }

    #[test]
    fn without_autoplay_first_frame_is_shown() {
        let options = PlayerOptions {
            auto_play: false,
            ..PlayerOptions::default()
        };
        let mut player = ready_player(options, 2, 0.1);

        assert_eq!(player.play_state(), PlayState::Stopped);
        assert_eq!(player.current_frame_index(), Some(0));

        player.update(10.0);
        assert_eq!(player.current_frame_index(), Some(0));

        player.play(10.0);
        player.update(10.5);
        assert_eq!(player.current_frame_index(), Some(1));
    }

    #[test]
    fn stop_on_first_frame_presents_again() {
        let presented = Rc::new(RefCell::new(Vec::new()));
        let seen = presented.clone();

        let mut player = ApngPlayer::default();
        player.add_sink(Box::new(move |index: usize, _canvas: &PixelBuffer| seen.borrow_mut().push(index)));
        player.load_frames(frames(2, 0.5));
        player.update(0.0);

        player.stop();

        assert_eq!(player.current_frame_index(), Some(0));
        assert_eq!(*presented.borrow(), vec![0, 0]);
    }

    #[test]
    fn stop_restores_first_frame() {
        let mut player = ready_player(PlayerOptions::default(), 3, 0.5);
        let first = player.snapshot().unwrap();

        player.update(0.5);
        player.update(1.0);
        assert_eq!(player.current_frame_index(), Some(2));
        assert_ne!(player.canvas(), Some(&first));

        player.stop();

        assert_eq!(player.play_state(), PlayState::Stopped);
        assert_eq!(player.current_frame_index(), Some(0));
        assert_eq!(player.canvas(), Some(&first));
    }

    #[test]
    fn pause_holds_the_current_frame() {
        let mut player = ready_player(PlayerOptions::default(), 2, 1.0);

        player.pause(0.5);
        player.update(5.0);
        assert_eq!(player.current_frame_index(), Some(0));
        assert_eq!(player.play_state(), PlayState::Paused);

        player.play(6.0);
        player.update(6.5);
        assert_eq!(player.current_frame_index(), Some(1));
    }

    #[test]
    fn speed_is_clamped_and_applied() {
        let mut player = ready_player(PlayerOptions::default(), 2, 1.0);

        player.set_speed(0.0);
        assert_eq!(player.speed(), MIN_SPEED);

        player.set_speed(4.0);
        player.update(0.25);
        assert_eq!(player.current_frame_index(), Some(1));
    }

    #[test]
    fn clear_returns_to_unloaded() {
        let mut player = ready_player(PlayerOptions::default(), 2, 0.1);

        player.clear();

        assert_eq!(player.load_state(), LoadState::Unloaded);
        assert_eq!(player.current_frame_index(), None);
        assert_eq!(player.frame_count(), 0);
        assert!(player.canvas().is_none());

        player.load_frames(frames(1, 0.1));
        player.update(0.0);
        assert!(player.is_ready());
    }

    #[test]
    fn cancel_load_exposes_nothing() {
        let mut player = ApngPlayer::default();
        player.load_frames(frames(30, 0.1));
        player.update(0.0);

        player.cancel_load();

        assert_eq!(player.load_state(), LoadState::Unloaded);
        assert!(player.canvas().is_none());
        player.update(0.0);
        assert_eq!(player.load_state(), LoadState::Unloaded);
    }

    #[test]
    fn controls_before_ready_are_ignored() {
        let mut player = ApngPlayer::default();

        player.play(0.0);
        player.stop();
        player.pause(0.0);
        player.clear();

        assert_eq!(player.load_state(), LoadState::Unloaded);
        assert_eq!(player.play_state(), PlayState::Stopped);
        assert_eq!(player.current_frame_index(), None);
    }

    #[test]
    fn missing_source_reports_error() {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let mut player = ApngPlayer::default();
        let sink = messages.clone();
        player.on_error(move |player, message| {
            assert_eq!(player.load_state(), LoadState::Error);
            sink.borrow_mut().push(message.to_string());
        });

        player.load(ImageSource::File(PathBuf::from("/nonexistent/animation.png")));

        assert_eq!(player.load_state(), LoadState::Error);
        assert_eq!(messages.borrow().len(), 1);
        assert!(messages.borrow()[0].contains("animation.png"));
        assert!(player.last_error().is_some());

        // The player can be reused after an error
        player.load_frames(frames(1, 0.1));
        assert_eq!(player.load_state(), LoadState::Processing);
        assert!(player.last_error().is_none());
    }

    #[test]
    fn load_blocking_returns_decode_failure() {
        let mut player = ApngPlayer::default();

        let result = player.load_blocking(ImageSource::Memory(b"not a png at all".to_vec()), 0.0);

        assert!(matches!(result, Err(PlayerError::DecodeFailure(_))));
        assert_eq!(player.load_state(), LoadState::Error);
    }

    #[test]
    fn second_load_while_ready_is_ignored() {
        let mut player = ready_player(PlayerOptions::default(), 2, 0.1);

        player.load_frames(frames(5, 0.1));

        assert!(player.is_ready());
        assert_eq!(player.frame_count(), 2);
    }
}
