//! Reader/writer for `BILD` build files.

use tracing::{debug, warn};

use crate::error::FormatError;
use crate::format::{
    BoundingBox, BuildFile, BuildFrame, BuildMaterial, BuildSymbol, Coord, BUILD_MAGIC,
    BUILD_VERSION,
};
use crate::hash::{HashRef, HashStringTable};
use crate::primitive::{expect_magic, ByteReader, ByteWriter};
use crate::texture::Image;

// Serialized BuildFrame: 3 u32 + 8 f32.
const FRAME_SIZE: usize = 44;
// Smallest serialized BuildSymbol (no frames).
const SYMBOL_SIZE: usize = 16;

/// Decodes a build file. `load_image` is called once per material path and may
/// return `None` when the texture is missing.
pub fn decode<F>(data: &[u8], mut load_image: F) -> Result<BuildFile, FormatError>
where
    F: FnMut(&str) -> Option<Image>,
{
    let mut reader = ByteReader::new(data);

    expect_magic(&mut reader, BUILD_MAGIC)?;
    let version = reader.read_u32()?;
    if version != BUILD_VERSION {
        return Err(FormatError::UnsupportedVersion {
            expected: BUILD_VERSION,
            found: version,
        });
    }

    let symbol_count = reader.read_u32()?;
    let total_frames = reader.read_u32()?;
    let name = reader.read_string()?;

    let material_count = reader.read_u32()?;
    let mut materials = Vec::with_capacity(reader.capacity_hint(material_count, 4));
    for _ in 0..material_count {
        let path = reader.read_string()?;
        let image = load_image(&path);
        if image.is_none() {
            warn!(material = %path, "material image not loaded");
        }
        materials.push(BuildMaterial { path, image });
    }

    let sdf_count = reader.read_u32()?;
    let mut sdf_materials = Vec::with_capacity(reader.capacity_hint(sdf_count, 4));
    for _ in 0..sdf_count {
        sdf_materials.push(reader.read_string()?);
    }

    let mut symbols = Vec::with_capacity(reader.capacity_hint(symbol_count, SYMBOL_SIZE));
    for _ in 0..symbol_count {
        symbols.push(read_symbol(&mut reader)?);
    }

    let hashed_strings = HashStringTable::read(&mut reader)?;
    reader.finish()?;

    let build = BuildFile {
        version,
        total_frames,
        name,
        materials,
        sdf_materials,
        symbols,
        hashed_strings,
    };
    report_bad_frames(&build);
    debug!(
        name = %build.name,
        symbols = build.symbols.len(),
        materials = build.materials.len(),
        "decoded build file"
    );
    Ok(build)
}

fn read_symbol(reader: &mut ByteReader) -> Result<BuildSymbol, FormatError> {
    let symbol_hash = HashRef(reader.read_u32()?);
    let color_channel_hash = HashRef(reader.read_u32()?);
    let looping = reader.read_bool()?;
    let frame_count = reader.read_u32()?;

    let mut frames = Vec::with_capacity(reader.capacity_hint(frame_count, FRAME_SIZE));
    for _ in 0..frame_count {
        frames.push(read_frame(reader)?);
    }

    Ok(BuildSymbol {
        symbol_hash,
        color_channel_hash,
        looping,
        frames,
    })
}

fn read_frame(reader: &mut ByteReader) -> Result<BuildFrame, FormatError> {
    Ok(BuildFrame {
        frame_num: reader.read_u32()?,
        duration: reader.read_u32()?,
        image_index: reader.read_u32()?,
        bbox: BoundingBox {
            pos: read_coord(reader)?,
            size: read_coord(reader)?,
        },
        uv0: read_coord(reader)?,
        uv1: read_coord(reader)?,
    })
}

pub(crate) fn read_coord(reader: &mut ByteReader) -> Result<Coord, FormatError> {
    let x = reader.read_f32()?;
    let y = reader.read_f32()?;
    Ok(Coord::new(f64::from(x), f64::from(y)))
}

pub(crate) fn write_coord(writer: &mut ByteWriter, coord: Coord) {
    writer.write_f32(coord.x as f32);
    writer.write_f32(coord.y as f32);
}

fn report_bad_frames(build: &BuildFile) {
    for symbol in &build.symbols {
        for frame in &symbol.frames {
            if build.material_for(frame).is_none() {
                warn!(
                    symbol = %symbol.symbol_hash.display(build),
                    frame = frame.frame_num,
                    image_index = frame.image_index,
                    materials = build.materials.len(),
                    "frame references a missing material"
                );
            }
        }
    }
}

/// Encodes a build file. The version written is always [`BUILD_VERSION`].
pub fn encode(build: &BuildFile) -> Vec<u8> {
    let mut writer = ByteWriter::new();

    writer.write_string(BUILD_MAGIC, false);
    writer.write_u32(BUILD_VERSION);
    writer.write_len(build.symbols.len());
    writer.write_u32(build.total_frames);
    writer.write_string(&build.name, true);

    writer.write_len(build.materials.len());
    for material in &build.materials {
        writer.write_string(&material.path, true);
    }

    writer.write_len(build.sdf_materials.len());
    for path in &build.sdf_materials {
        writer.write_string(path, true);
    }

    for symbol in &build.symbols {
        writer.write_u32(symbol.symbol_hash.hash());
        writer.write_u32(symbol.color_channel_hash.hash());
        writer.write_bool(symbol.looping);
        writer.write_len(symbol.frames.len());
        for frame in &symbol.frames {
            writer.write_u32(frame.frame_num);
            writer.write_u32(frame.duration);
            writer.write_u32(frame.image_index);
            write_coord(&mut writer, frame.bbox.pos);
            write_coord(&mut writer, frame.bbox.size);
            write_coord(&mut writer, frame.uv0);
            write_coord(&mut writer, frame.uv1);
        }
    }

    build.hashed_strings.write(&mut writer);
    writer.into_bytes()
}
