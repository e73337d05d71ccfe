use apng_player::{ApngPlayer, FrameFormat, ImageSource, Logger, PixelBuffer, PlayerOptions, Writer};
use clap::{Parser, ValueEnum};
use glob::glob;
use log::{debug, error, info, LevelFilter};
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Parser, Debug)]
#[clap(name = "apng-player")]
struct Cli {
    #[arg(required = true)]
    path: String,

    #[arg(short, long, value_enum, default_value_t = Format::Png, help = "Output format")]
    format: Format,

    #[arg(short = 'o', long = "output-dir", help = "Output directory for rendered frames")]
    output_dir: Option<String>,

    #[arg(long, default_value_t = 60.0, help = "Simulated host tick rate")]
    fps: f64,

    #[arg(long, default_value_t = 1.0, help = "Playback speed multiplier")]
    speed: f32,

    #[arg(long, default_value_t = 1, help = "Passes through the animation to render")]
    loops: u32,

    #[arg(long, help = "Render bottom-up frames")]
    flip: bool,

    #[arg(long, help = "Print animation info as JSON")]
    info: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Format {
    Ppm,
    Pam,
    Png,
}

impl From<Format> for FrameFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Ppm => FrameFormat::Ppm,
            Format::Pam => FrameFormat::Pam,
            Format::Png => FrameFormat::Png,
        }
    }
}

/// Writes every canvas the player presents, numbered in render order.
struct FrameDump {
    output_dir: PathBuf,
    stem: String,
    format: FrameFormat,
    written: usize,
    error: Option<io::Error>,
}

impl FrameDump {
    fn present(&mut self, canvas: &PixelBuffer) {
        if self.error.is_some() {
            return;
        }

        let path = Writer::frame_path(&self.output_dir, &self.stem, self.written, self.format);
        match Writer::write(&path, self.format, canvas) {
            Ok(()) => {
                debug!("Frame written to {}", path.display());
                self.written += 1;
            }
            Err(e) => self.error = Some(e),
        }
    }
}

fn get_files(path: &str) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let absolute_pattern = if Path::new(path).is_relative() {
        base_dir.join(path).to_string_lossy().into_owned()
    } else {
        path.to_string()
    };

    for entry in glob(&absolute_pattern)? {
        match entry {
            Ok(path) => {
                if !path.is_file() {
                    continue;
                }

                files.push(path);
            }
            Err(e) => error!("{:?}", e),
        }
    }

    Ok(files)
}

fn get_output_dir(file: &Path, output_dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let output_dir = match output_dir {
        Some(dir) => {
            let dir = Path::new(dir);

            if dir.is_relative() {
                std::env::current_dir()?.join(dir)
            } else {
                dir.to_path_buf()
            }
        }
        // Next to the input file
        None => file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    };

    if !output_dir.exists() {
        fs::create_dir_all(&output_dir)?;
    }

    Ok(output_dir)
}

fn process_file(file: &Path, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("File: {}", file.display());

    let options = PlayerOptions {
        speed: cli.speed,
        flip_vertical: cli.flip,
        ..PlayerOptions::default()
    };
    let mut player = ApngPlayer::new(options);

    if cli.info {
        player.load_blocking(ImageSource::File(file.to_path_buf()), 0.0)?;

        if let Some(info) = player.info() {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        return Ok(());
    }

    let stem = file
        .file_stem()
        .ok_or("Invalid file name")?
        .to_str()
        .ok_or("Invalid file stem")?
        .to_string();

    let dump = Rc::new(RefCell::new(FrameDump {
        output_dir: get_output_dir(file, cli.output_dir.as_deref())?,
        stem,
        format: cli.format.into(),
        written: 0,
        error: None,
    }));

    let sink = dump.clone();
    player.add_sink(Box::new(move |_index: usize, canvas: &PixelBuffer| {
        sink.borrow_mut().present(canvas)
    }));

    player.load_blocking(ImageSource::File(file.to_path_buf()), 0.0)?;

    let target = player.frame_count() * cli.loops.max(1) as usize;
    let tick_length = 1.0 / cli.fps;
    let mut tick: u64 = 0;

    while dump.borrow().written < target {
        if let Some(e) = dump.borrow_mut().error.take() {
            return Err(e.into());
        }

        tick += 1;
        player.update(tick as f64 * tick_length);
    }

    if let Some(e) = dump.borrow_mut().error.take() {
        return Err(e.into());
    }

    info!(
        "Wrote {} frame(s) to {}",
        dump.borrow().written,
        dump.borrow().output_dir.display()
    );

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    Logger::init(level)?;

    if !(cli.fps.is_finite() && cli.fps > 0.0) {
        error!("--fps must be a positive number, got {}", cli.fps);
        std::process::exit(2);
    }

    let files = get_files(&cli.path)?;

    if files.is_empty() {
        error!("No files found matching pattern: {}", cli.path);
        return Ok(());
    }

    for file in files {
        if let Err(err) = process_file(&file, &cli) {
            error!("Error processing file: {}", err);
            continue;
        }
    }

    Ok(())
}
