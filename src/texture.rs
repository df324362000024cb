//! Decoded RGBA8 images and the texture file formats they are stored in.
//!
//! Materials and atlas sources are stored as PNG, DDS or KTEX (a small header
//! wrapped around a DDS payload). Only uncompressed 32-bit DDS surfaces are
//! handled; block-compressed textures are reported as unsupported.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::error::FormatError;
use crate::primitive::{expect_magic, ByteReader, ByteWriter};

pub const KTEX_MAGIC: &str = "KTEX";
pub const KTEX_VERSION: u8 = 2;

const DDS_MAGIC: &str = "DDS ";
const DDS_HEADER_SIZE: u32 = 124;
const DDS_PIXELFORMAT_SIZE: u32 = 32;
// DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PITCH | DDSD_PIXELFORMAT
const DDSD_FLAGS: u32 = 0x100f;
const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;
const DDSCAPS_TEXTURE: u32 = 0x1000;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("unsupported image extension {0:?}")]
    UnsupportedExtension(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("pixel buffer holds {found} bytes, expected {expected}")]
    BufferSize { expected: usize, found: usize },

    #[error("image {width}x{height} does not fit in a texture header")]
    TooLarge { width: u32, height: u32 },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("png decoding failed: {0}")]
    PngDecode(#[from] png::DecodingError),

    #[error("png encoding failed: {0}")]
    PngEncode(#[from] png::EncodingError),

    #[error("asset name {0:?} must be a relative path inside its folder")]
    UnsafePath(String),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// A decoded, non-premultiplied RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Image {
    /// Fully transparent image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(ImageError::BufferSize {
                expected,
                found: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.rgba[at..at + 4]);
        Some(px)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        if x < self.width && y < self.height {
            let at = (y as usize * self.width as usize + x as usize) * 4;
            self.rgba[at..at + 4].copy_from_slice(&px);
        }
    }

    /// Blends `color` over the rect `[x1, x2) × [y1, y2)` with the given
    /// coverage. The rect is clipped to the image.
    pub fn tint_rect(&mut self, (x1, y1, x2, y2): (u32, u32, u32, u32), color: [u8; 3], alpha: u8) {
        let a = u32::from(alpha);
        for y in y1..y2.min(self.height) {
            for x in x1..x2.min(self.width) {
                if let Some(mut px) = self.pixel(x, y) {
                    for (channel, tint) in px.iter_mut().zip(color) {
                        *channel = ((u32::from(*channel) * (255 - a) + u32::from(tint) * a + 127)
                            / 255) as u8;
                    }
                    self.set_pixel(x, y, px);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Ktex,
    Dds,
    Png,
}

impl ImageFormat {
    /// Picks the format from a `.tex`, `.dds` or `.png` extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let ext = path
            .as_ref()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tex" => Ok(ImageFormat::Ktex),
            "dds" => Ok(ImageFormat::Dds),
            "png" => Ok(ImageFormat::Png),
            _ => Err(ImageError::UnsupportedExtension(ext)),
        }
    }
}

pub fn decode(data: &[u8], format: ImageFormat) -> Result<Image, ImageError> {
    match format {
        ImageFormat::Ktex => decode_ktex(data),
        ImageFormat::Dds => decode_dds(data),
        ImageFormat::Png => decode_png(data),
    }
}

pub fn encode(image: &Image, format: ImageFormat) -> Result<Vec<u8>, ImageError> {
    match format {
        ImageFormat::Ktex => encode_ktex(image),
        ImageFormat::Dds => Ok(encode_dds(image)),
        ImageFormat::Png => encode_png(image),
    }
}

/// Checks that an asset name read from a project or build file cannot leave
/// the folder it is resolved against.
pub fn check_asset_name(name: &str) -> Result<(), ImageError> {
    let unsafe_path = || ImageError::UnsafePath(name.to_string());
    // `..` behind a backslash is a plain file name on unix but not on windows.
    if name.split(|c: char| c == '/' || c == '\\').any(|part| part == "..") {
        return Err(unsafe_path());
    }
    let mut has_name = false;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            _ => return Err(unsafe_path()),
        }
    }
    if !has_name {
        return Err(unsafe_path());
    }
    Ok(())
}

/// `base` joined with a checked asset name.
pub fn asset_path(base: &Path, name: &str) -> Result<PathBuf, ImageError> {
    check_asset_name(name)?;
    Ok(base.join(name))
}

pub fn read_image(path: impl AsRef<Path>) -> Result<Image, ImageError> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)?;
    let data = fs::read(path).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&data, format)
}

pub fn write_image(path: impl AsRef<Path>, image: &Image) -> Result<(), ImageError> {
    let path = path.as_ref();
    let data = encode(image, ImageFormat::from_path(path)?)?;
    fs::write(path, data).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_ktex(data: &[u8]) -> Result<Image, ImageError> {
    // Some tools ship bare DDS files under a .tex name.
    if data.starts_with(DDS_MAGIC.as_bytes()) {
        return decode_dds(data);
    }
    let mut reader = ByteReader::new(data);
    expect_magic(&mut reader, KTEX_MAGIC)?;
    let _version = reader.read_u8()?;
    let _width = reader.read_u16()?;
    let _height = reader.read_u16()?;
    decode_dds(reader.read_bytes(reader.remaining())?)
}

fn encode_ktex(image: &Image) -> Result<Vec<u8>, ImageError> {
    let too_large = || ImageError::TooLarge {
        width: image.width,
        height: image.height,
    };
    let width = u16::try_from(image.width).map_err(|_| too_large())?;
    let height = u16::try_from(image.height).map_err(|_| too_large())?;

    let mut writer = ByteWriter::new();
    writer.write_string(KTEX_MAGIC, false);
    writer.write_u8(KTEX_VERSION);
    writer.write_u16(width);
    writer.write_u16(height);
    writer.write_bytes(&encode_dds(image));
    Ok(writer.into_bytes())
}

fn decode_dds(data: &[u8]) -> Result<Image, ImageError> {
    let mut reader = ByteReader::new(data);
    expect_magic(&mut reader, DDS_MAGIC)?;

    let header_size = reader.read_u32()?;
    if header_size != DDS_HEADER_SIZE {
        return Err(ImageError::UnsupportedPixelFormat(format!(
            "DDS header size {header_size}"
        )));
    }
    let _flags = reader.read_u32()?;
    let height = reader.read_u32()?;
    let width = reader.read_u32()?;
    let _pitch = reader.read_u32()?;
    let _depth = reader.read_u32()?;
    let _mipmaps = reader.read_u32()?;
    reader.read_bytes(11 * 4)?;

    let _pf_size = reader.read_u32()?;
    let pf_flags = reader.read_u32()?;
    let fourcc = reader.read_bytes(4)?;
    let bit_count = reader.read_u32()?;
    let masks = [
        reader.read_u32()?,
        reader.read_u32()?,
        reader.read_u32()?,
        reader.read_u32()?,
    ];
    // caps, caps2, caps3, caps4, reserved
    reader.read_bytes(5 * 4)?;

    if pf_flags & DDPF_FOURCC != 0 {
        return Err(ImageError::UnsupportedPixelFormat(format!(
            "compressed DDS ({})",
            String::from_utf8_lossy(fourcc)
        )));
    }
    if pf_flags & DDPF_RGB == 0 || bit_count != 32 {
        return Err(ImageError::UnsupportedPixelFormat(format!(
            "DDS with {bit_count} bits per pixel"
        )));
    }
    if masks.iter().any(|m| *m != 0 && m.count_ones() != 8) {
        return Err(ImageError::UnsupportedPixelFormat(
            "DDS channel masks are not 8 bits wide".to_string(),
        ));
    }
    let has_alpha = pf_flags & DDPF_ALPHAPIXELS != 0 && masks[3] != 0;

    let pixels = reader.read_bytes(width as usize * height as usize * 4)?;
    let mut rgba = Vec::with_capacity(pixels.len());
    for chunk in pixels.chunks_exact(4) {
        let px = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        for (i, mask) in masks.iter().enumerate() {
            let value = if *mask == 0 {
                0
            } else {
                ((px & mask) >> mask.trailing_zeros()) as u8
            };
            rgba.push(if i == 3 && !has_alpha { 255 } else { value });
        }
    }
    // Mip levels after the top surface are ignored.
    Image::from_rgba(width, height, rgba)
}

fn encode_dds(image: &Image) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.write_string(DDS_MAGIC, false);
    writer.write_u32(DDS_HEADER_SIZE);
    writer.write_u32(DDSD_FLAGS);
    writer.write_u32(image.height);
    writer.write_u32(image.width);
    writer.write_u32(image.width * 4);
    writer.write_u32(0); // depth
    writer.write_u32(0); // mipmaps
    for _ in 0..11 {
        writer.write_u32(0);
    }

    writer.write_u32(DDS_PIXELFORMAT_SIZE);
    writer.write_u32(DDPF_RGB | DDPF_ALPHAPIXELS);
    writer.write_u32(0); // fourcc
    writer.write_u32(32);
    writer.write_u32(0x00ff_0000);
    writer.write_u32(0x0000_ff00);
    writer.write_u32(0x0000_00ff);
    writer.write_u32(0xff00_0000);

    writer.write_u32(DDSCAPS_TEXTURE);
    for _ in 0..4 {
        writer.write_u32(0);
    }

    for px in image.rgba.chunks_exact(4) {
        writer.write_bytes(&[px[2], px[1], px[0], px[3]]);
    }
    writer.into_bytes()
}

fn decode_png(data: &[u8]) -> Result<Image, ImageError> {
    let mut decoder = png::Decoder::new(data);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let (info, mut reader) = decoder.read_info()?;
    let mut buf = vec![0; info.buffer_size()];
    reader.next_frame(&mut buf)?;

    let pixel_count = info.width as usize * info.height as usize;
    let rgba = match info.color_type {
        png::ColorType::RGBA => buf,
        png::ColorType::RGB => buf
            .chunks_exact(3)
            .take(pixel_count)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .take(pixel_count)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => buf
            .iter()
            .take(pixel_count)
            .flat_map(|g| [*g, *g, *g, 255])
            .collect(),
        png::ColorType::Indexed => {
            return Err(ImageError::UnsupportedPixelFormat(
                "indexed PNG was not expanded".to_string(),
            ))
        }
    };
    Image::from_rgba(info.width, info.height, rgba)
}

fn encode_png(image: &Image) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width, image.height);
        encoder.set_color(png::ColorType::RGBA);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.rgba)?;
    }
    Ok(out)
}
