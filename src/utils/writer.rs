use crate::animation::buffer::PixelBuffer;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Ppm,
    Pam,
    Png,
}

impl FrameFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Ppm => "ppm",
            FrameFormat::Pam => "pam",
            FrameFormat::Png => "png",
        }
    }
}

pub struct Writer {}

impl Writer {
    pub fn write(output_path: &Path, format: FrameFormat, canvas: &PixelBuffer) -> Result<(), io::Error> {
        match format {
            FrameFormat::Ppm => Writer::write_ppm(output_path, canvas),
            FrameFormat::Pam => Writer::write_pam(output_path, canvas),
            FrameFormat::Png => Writer::write_png(output_path, canvas),
        }
    }

    /// Builds `<dir>/<stem>_frame_<index>.<ext>`.
    pub fn frame_path(output_dir: &Path, stem: &str, index: usize, format: FrameFormat) -> PathBuf {
        output_dir.join(format!("{}_frame_{}.{}", stem, index, format.extension()))
    }

    /// Binary PPM. Alpha is dropped.
    pub fn write_ppm(output_path: &Path, canvas: &PixelBuffer) -> Result<(), io::Error> {
        Writer::validate_pixel_count(canvas)?;

        let mut file = BufWriter::new(File::create(output_path)?);

        file.write_all(b"P6\n")?;
        file.write_all(format!("{} {}\n", canvas.width(), canvas.height()).as_bytes())?;
        file.write_all(b"255\n")?;

        for pixel in canvas.as_bytes().chunks_exact(4) {
            file.write_all(&pixel[..3])?;
        }

        file.flush()
    }

    pub fn write_pam(output_path: &Path, canvas: &PixelBuffer) -> Result<(), io::Error> {
        Writer::validate_pixel_count(canvas)?;

        let mut file = BufWriter::new(File::create(output_path)?);

        file.write_all(b"P7\n")?;
        file.write_all(format!("WIDTH {}\n", canvas.width()).as_bytes())?;
        file.write_all(format!("HEIGHT {}\n", canvas.height()).as_bytes())?;
        file.write_all(b"DEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n")?;
        file.write_all(canvas.as_bytes())?;

        file.flush()
    }

    pub fn write_png(output_path: &Path, canvas: &PixelBuffer) -> Result<(), io::Error> {
        Writer::validate_pixel_count(canvas)?;

        image::save_buffer(
            output_path,
            canvas.as_bytes(),
            canvas.width(),
            canvas.height(),
            image::ColorType::Rgba8,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn validate_pixel_count(canvas: &PixelBuffer) -> Result<(), io::Error> {
        let expected_size = canvas.width() as usize * canvas.height() as usize * 4;
        let actual_size = canvas.as_bytes().len();

        if expected_size != actual_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Invalid pixel data size for {}x{} RGBA canvas: expected {} bytes, got {}",
                    canvas.width(),
                    canvas.height(),
                    expected_size,
                    actual_size
                ),
            ));
        }

        Ok(())
    }
}
