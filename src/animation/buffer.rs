const CHANNELS: usize = 4;

/// Fixed-size RGBA8 canvas, row-major with a top-left origin.
///
/// Region operations expect the rectangle to lie inside the buffer. Frame
/// rectangles are validated when an [`Animation`](crate::Animation) is built,
/// so a rectangle out of bounds here is a bug in the caller and panics.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> PixelBuffer {
        assert!(width > 0 && height > 0, "Invalid buffer dimensions: {}x{}", width, height);

        PixelBuffer {
            width,
            height,
            samples: vec![0; width as usize * height as usize * CHANNELS],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.samples
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.samples
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.check_rect(x, y, 1, 1);

        let start = self.offset(x, y);
        let mut pixel = [0u8; 4];
        pixel.copy_from_slice(&self.samples[start..start + CHANNELS]);

        pixel
    }

    pub fn clear(&mut self) {
        self.samples.fill(0);
    }

    pub fn clear_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.check_rect(x, y, width, height);

        let row_len = width as usize * CHANNELS;
        for row in 0..height {
            let start = self.offset(x, y + row);
            self.samples[start..start + row_len].fill(0);
        }
    }

    /// Copies `width * height` RGBA samples into the rectangle, replacing
    /// whatever was there.
    pub fn set_pixels(&mut self, pixels: &[u8], x: u32, y: u32, width: u32, height: u32) {
        self.check_rect(x, y, width, height);
        Self::check_payload(pixels, width, height);

        let row_len = width as usize * CHANNELS;
        for (row, src) in pixels.chunks_exact(row_len).enumerate() {
            let start = self.offset(x, y + row as u32);
            self.samples[start..start + row_len].copy_from_slice(src);
        }
    }

    /// Composites straight-alpha RGBA samples over the rectangle (Porter-Duff
    /// source-over).
    pub fn blend_pixels(&mut self, pixels: &[u8], x: u32, y: u32, width: u32, height: u32) {
        self.check_rect(x, y, width, height);
        Self::check_payload(pixels, width, height);

        let row_len = width as usize * CHANNELS;
        for (row, src_row) in pixels.chunks_exact(row_len).enumerate() {
            let start = self.offset(x, y + row as u32);
            let dst_row = &mut self.samples[start..start + row_len];

            for (src, dst) in src_row.chunks_exact(CHANNELS).zip(dst_row.chunks_exact_mut(CHANNELS)) {
                blend_over(src, dst);
            }
        }
    }

    /// Returns a copy of the rectangle's samples, row-major.
    pub fn get_pixels(&self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
        self.check_rect(x, y, width, height);

        let row_len = width as usize * CHANNELS;
        let mut output = Vec::with_capacity(row_len * height as usize);
        for row in 0..height {
            let start = self.offset(x, y + row);
            output.extend_from_slice(&self.samples[start..start + row_len]);
        }

        output
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    fn check_rect(&self, x: u32, y: u32, width: u32, height: u32) {
        let fits = x.checked_add(width).is_some_and(|right| right <= self.width)
            && y.checked_add(height).is_some_and(|bottom| bottom <= self.height);

        assert!(
            fits,
            "Region {}x{}+{}+{} out of bounds for {}x{} buffer",
            width, height, x, y, self.width, self.height
        );
    }

    fn check_payload(pixels: &[u8], width: u32, height: u32) {
        let expected = width as usize * height as usize * CHANNELS;

        assert_eq!(
            pixels.len(),
            expected,
            "Pixel payload length mismatch for {}x{} region",
            width,
            height
        );
    }
}

fn blend_over(src: &[u8], dst: &mut [u8]) {
    let src_a = src[3] as f32 / 255.0;
    if src_a <= 0.0 {
        return;
    }

    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    for i in 0..3 {
        let s = src[i] as f32;
        let d = dst[i] as f32;
        dst[i] = ((s * src_a + d * dst_a * (1.0 - src_a)) / out_a).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.repeat((width * height) as usize)
    }

    #[test]
    fn new_buffer_is_transparent() {
        let buffer = PixelBuffer::new(3, 2);

        assert_eq!(buffer.as_bytes().len(), 3 * 2 * 4);
        assert!(buffer.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn set_pixels_writes_only_the_rectangle() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.set_pixels(&solid(2, 2, [255, 0, 0, 255]), 1, 2, 2, 2);

        assert_eq!(buffer.pixel(1, 2), [255, 0, 0, 255]);
        assert_eq!(buffer.pixel(2, 3), [255, 0, 0, 255]);
        assert_eq!(buffer.pixel(0, 2), [0, 0, 0, 0]);
        assert_eq!(buffer.pixel(3, 3), [0, 0, 0, 0]);
        assert_eq!(buffer.pixel(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn set_pixels_is_row_major() {
        let mut buffer = PixelBuffer::new(3, 3);
        let pixels = [
            1, 1, 1, 1, 2, 2, 2, 2, //
            3, 3, 3, 3, 4, 4, 4, 4,
        ];
        buffer.set_pixels(&pixels, 1, 1, 2, 2);

        assert_eq!(buffer.pixel(1, 1), [1, 1, 1, 1]);
        assert_eq!(buffer.pixel(2, 1), [2, 2, 2, 2]);
        assert_eq!(buffer.pixel(1, 2), [3, 3, 3, 3]);
        assert_eq!(buffer.pixel(2, 2), [4, 4, 4, 4]);
        assert_eq!(buffer.get_pixels(1, 1, 2, 2), pixels.to_vec());
    }

    #[test]
    fn clear_rect_leaves_surroundings() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.set_pixels(&solid(4, 4, [9, 9, 9, 9]), 0, 0, 4, 4);
        buffer.clear_rect(1, 1, 2, 2);

        assert_eq!(buffer.pixel(1, 1), [0, 0, 0, 0]);
        assert_eq!(buffer.pixel(2, 2), [0, 0, 0, 0]);
        assert_eq!(buffer.pixel(0, 0), [9, 9, 9, 9]);
        assert_eq!(buffer.pixel(3, 2), [9, 9, 9, 9]);

        buffer.clear();
        assert!(buffer.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn get_pixels_returns_a_copy() {
        let mut buffer = PixelBuffer::new(2, 2);
        buffer.set_pixels(&solid(2, 2, [5, 6, 7, 8]), 0, 0, 2, 2);

        let copy = buffer.get_pixels(0, 0, 2, 2);
        buffer.clear();

        assert_eq!(copy, solid(2, 2, [5, 6, 7, 8]));
    }

    #[test]
    fn blend_pixels_composites_translucent_source() {
        let mut buffer = PixelBuffer::new(1, 1);
        buffer.set_pixels(&[0, 0, 255, 255], 0, 0, 1, 1);
        buffer.blend_pixels(&[255, 0, 0, 128], 0, 0, 1, 1);

        let [r, g, b, a] = buffer.pixel(0, 0);
        assert_eq!(a, 255);
        assert_eq!(g, 0);
        assert!((127..=129).contains(&r));
        assert!((126..=128).contains(&b));
    }

    #[test]
    fn blend_pixels_skips_fully_transparent_source() {
        let mut buffer = PixelBuffer::new(1, 1);
        buffer.set_pixels(&[10, 20, 30, 40], 0, 0, 1, 1);
        buffer.blend_pixels(&[255, 255, 255, 0], 0, 0, 1, 1);

        assert_eq!(buffer.pixel(0, 0), [10, 20, 30, 40]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn region_outside_buffer_panics() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.clear_rect(3, 0, 2, 1);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn short_payload_panics() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.set_pixels(&[0; 4], 0, 0, 2, 2);
    }
}
