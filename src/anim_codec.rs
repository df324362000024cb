//! Reader/writer for `ANIM` anim files.

use tracing::debug;

use crate::build_codec::{read_coord, write_coord};
use crate::error::FormatError;
use crate::format::{AnimData, AnimElement, AnimFile, AnimFrame, ANIM_MAGIC, ANIM_VERSION};
use crate::hash::{HashRef, HashStringTable};
use crate::primitive::{expect_magic, ByteReader, ByteWriter};

// Serialized AnimElement: 3 u32 + 15 f32.
const ELEMENT_SIZE: usize = 72;
// Smallest serialized AnimFrame (no elements).
const FRAME_SIZE: usize = 20;
// Smallest serialized AnimData (empty strings, no frames).
const ANIM_SIZE: usize = 20;

pub fn decode(data: &[u8]) -> Result<AnimFile, FormatError> {
    let mut reader = ByteReader::new(data);

    expect_magic(&mut reader, ANIM_MAGIC)?;
    let version = reader.read_u32()?;
    if version != ANIM_VERSION {
        return Err(FormatError::UnsupportedVersion {
            expected: ANIM_VERSION,
            found: version,
        });
    }

    let num_element_refs = reader.read_u32()?;
    let num_frames = reader.read_u32()?;

    let anim_count = reader.read_u32()?;
    let mut anims = Vec::with_capacity(reader.capacity_hint(anim_count, ANIM_SIZE));
    for _ in 0..anim_count {
        anims.push(read_anim(&mut reader)?);
    }

    let hashed_strings = HashStringTable::read(&mut reader)?;
    reader.finish()?;

    debug!(anims = anims.len(), num_frames, "decoded anim file");
    Ok(AnimFile {
        version,
        num_element_refs,
        num_frames,
        anims,
        hashed_strings,
    })
}

fn read_anim(reader: &mut ByteReader) -> Result<AnimData, FormatError> {
    let name = reader.read_string()?;
    let root_symbol = reader.read_string()?;
    let frame_rate = reader.read_f32()?;
    let looping = reader.read_bool()?;

    let frame_count = reader.read_u32()?;
    let mut frames = Vec::with_capacity(reader.capacity_hint(frame_count, FRAME_SIZE));
    for _ in 0..frame_count {
        frames.push(read_frame(reader)?);
    }

    Ok(AnimData {
        name,
        root_symbol,
        frame_rate,
        looping,
        frames,
    })
}

fn read_frame(reader: &mut ByteReader) -> Result<AnimFrame, FormatError> {
    let pos = read_coord(reader)?;
    let size = read_coord(reader)?;

    let element_count = reader.read_u32()?;
    let mut elements = Vec::with_capacity(reader.capacity_hint(element_count, ELEMENT_SIZE));
    for _ in 0..element_count {
        elements.push(read_element(reader)?);
    }

    Ok(AnimFrame {
        pos,
        size,
        elements,
    })
}

fn read_element(reader: &mut ByteReader) -> Result<AnimElement, FormatError> {
    Ok(AnimElement {
        symbol_hash: HashRef(reader.read_u32()?),
        frame: reader.read_u32()?,
        folder_hash: HashRef(reader.read_u32()?),

        c_ap: reader.read_f32()?,
        c_bp: reader.read_f32()?,
        c_gp: reader.read_f32()?,
        c_rp: reader.read_f32()?,

        c_aa: reader.read_f32()?,
        c_ba: reader.read_f32()?,
        c_ga: reader.read_f32()?,
        c_ra: reader.read_f32()?,

        mat_a: reader.read_f32()?,
        mat_b: reader.read_f32()?,
        mat_c: reader.read_f32()?,
        mat_d: reader.read_f32()?,
        tx: reader.read_f32()?,
        ty: reader.read_f32()?,
        tz: reader.read_f32()?,
    })
}

/// Encodes an anim file. The version written is always [`ANIM_VERSION`].
pub fn encode(anim: &AnimFile) -> Vec<u8> {
    let mut writer = ByteWriter::new();

    writer.write_string(ANIM_MAGIC, false);
    writer.write_u32(ANIM_VERSION);
    writer.write_u32(anim.num_element_refs);
    writer.write_u32(anim.num_frames);

    writer.write_len(anim.anims.len());
    for data in &anim.anims {
        writer.write_string(&data.name, true);
        writer.write_string(&data.root_symbol, true);
        writer.write_f32(data.frame_rate);
        writer.write_bool(data.looping);
        writer.write_len(data.frames.len());
        for frame in &data.frames {
            write_coord(&mut writer, frame.pos);
            write_coord(&mut writer, frame.size);
            writer.write_len(frame.elements.len());
            for element in &frame.elements {
                write_element(&mut writer, element);
            }
        }
    }

    anim.hashed_strings.write(&mut writer);
    writer.into_bytes()
}

fn write_element(writer: &mut ByteWriter, element: &AnimElement) {
    writer.write_u32(element.symbol_hash.hash());
    writer.write_u32(element.frame);
    writer.write_u32(element.folder_hash.hash());

    for value in [
        element.c_ap,
        element.c_bp,
        element.c_gp,
        element.c_rp,
        element.c_aa,
        element.c_ba,
        element.c_ga,
        element.c_ra,
        element.mat_a,
        element.mat_b,
        element.mat_c,
        element.mat_d,
        element.tx,
        element.ty,
        element.tz,
    ] {
        writer.write_f32(value);
    }
}
