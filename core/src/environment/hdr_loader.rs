//! Radiance `.hdr` (RGBE) decoding.
//!
//! Handles flat scanlines and the per-channel run-length scheme. Other header
//! variants (old-style RLE, XYZE) are rejected.

use anyhow::{bail, Context, Result};

/// Linear RGB image, row-major from the top scanline.
#[derive(Debug, Clone)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 3]>,
}

impl HdrImage {
    /// Pixels of one scanline.
    pub fn row(&self, y: u32) -> &[[f32; 3]] {
        let start = (y * self.width) as usize;
        &self.pixels[start..start + self.width as usize]
    }
}

/// True when `bytes` start with a Radiance signature.
pub fn is_hdr(bytes: &[u8]) -> bool {
    bytes.starts_with(b"#?RADIANCE") || bytes.starts_with(b"#?RGBE")
}

/// Decodes a whole `.hdr` file held in memory.
pub fn decode_hdr(bytes: &[u8]) -> Result<HdrImage> {
    let mut input = ByteCursor::new(bytes);
    let (width, height) = read_header(&mut input)?;

    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    let mut row = vec![[0u8; 4]; width as usize];
    for y in 0..height {
        read_scanline(&mut input, &mut row).with_context(|| format!("Bad HDR scanline {y}"))?;
        pixels.extend(row.iter().map(|&rgbe| rgbe_to_linear(rgbe)));
    }

    Ok(HdrImage { width, height, pixels })
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Next line without its terminator.
    fn line(&mut self) -> Result<&'a str> {
        let bytes = self.bytes;
        let rest = &bytes[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .context("Unexpected end of HDR header")?;
        self.pos += end + 1;
        Ok(std::str::from_utf8(&rest[..end])?.trim_end_matches('\r'))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.bytes;
        let Some(chunk) = bytes.get(self.pos..self.pos + n) else {
            bail!("Unexpected end of HDR pixel data");
        };
        self.pos += n;
        Ok(chunk)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }
}

/// Parses the signature, variables and resolution line, returning (width, height).
fn read_header(input: &mut ByteCursor) -> Result<(u32, u32)> {
    if !is_hdr(input.line()?.as_bytes()) {
        bail!("Invalid HDR format: missing RADIANCE or RGBE signature");
    }

    loop {
        let line = input.line()?;
        if line.trim().is_empty() {
            break;
        }
        if let Some(format) = line.strip_prefix("FORMAT=") {
            if format.trim() != "32-bit_rle_rgbe" {
                bail!("Unsupported HDR pixel format {format}");
            }
        }
    }

    let resolution = input.line()?;
    match resolution.split_whitespace().collect::<Vec<_>>()[..] {
        ["-Y", h, "+X", w] => Ok((parse_dim(w)?, parse_dim(h)?)),
        _ => bail!("Unsupported HDR resolution line: {resolution}"),
    }
}

fn parse_dim(s: &str) -> Result<u32> {
    let v: u32 = s.parse().with_context(|| format!("Invalid HDR dimension {s}"))?;
    if v == 0 {
        bail!("HDR image has zero size");
    }
    Ok(v)
}

fn read_scanline(input: &mut ByteCursor, row: &mut [[u8; 4]]) -> Result<()> {
    let width = row.len();
    let first = input.take(4)?;
    let encoded_width = u16::from_be_bytes([first[2], first[3]]) as usize;
    let run_length = first[0] == 2 && first[1] == 2 && first[2] & 0x80 == 0;

    if run_length && (8..0x8000).contains(&width) {
        if encoded_width != width {
            bail!("RLE scanline width {encoded_width} does not match image width {width}");
        }
        for channel in 0..4 {
            read_rle_channel(input, row, channel)?;
        }
    } else {
        row[0].copy_from_slice(first);
        for pixel in row.iter_mut().skip(1) {
            pixel.copy_from_slice(input.take(4)?);
        }
    }
    Ok(())
}

/// One channel of a run-length scanline: counts above 128 are runs, others literals.
fn read_rle_channel(input: &mut ByteCursor, row: &mut [[u8; 4]], channel: usize) -> Result<()> {
    let mut x = 0;
    while x < row.len() {
        let code = input.byte()? as usize;
        let (count, run) = if code > 128 { (code - 128, true) } else { (code, false) };
        if count == 0 || x + count > row.len() {
            bail!("HDR run of {count} overflows scanline at {x}");
        }
        if run {
            let value = input.byte()?;
            row[x..x + count].iter_mut().for_each(|p| p[channel] = value);
        } else {
            for (pixel, &value) in row[x..x + count].iter_mut().zip(input.take(count)?) {
                pixel[channel] = value;
            }
        }
        x += count;
    }
    Ok(())
}

/// `mantissa * 2^(exponent - 136)`; a zero exponent is black.
fn rgbe_to_linear([r, g, b, e]: [u8; 4]) -> [f32; 3] {
    if e == 0 {
        return [0.0; 3];
    }
    let scale = 2f32.powi(e as i32 - 136);
    [r as f32 * scale, g as f32 * scale, b as f32 * scale]
}

/// Encodes small `.hdr` files for tests.
#[cfg(test)]
pub(crate) mod test_support {
    /// Flat RGBE file where every pixel is `rgbe`.
    pub(crate) fn flat_hdr(width: u32, height: u32, rows: impl Fn(u32) -> [u8; 4]) -> Vec<u8> {
        let mut bytes = format!("#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y {height} +X {width}\n").into_bytes();
        for y in 0..height {
            for _ in 0..width {
                bytes.extend_from_slice(&rows(y));
            }
        }
        bytes
    }
}
