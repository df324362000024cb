//! Loading and storing a build/anim pair.
//!
//! An animation lives either in a folder or in a zip archive with the same
//! entries: `build.bin`, `anim.bin` and the material textures named by the
//! build file. Either of the two binaries may be missing, not both.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::FormatError;
use crate::format::{Animation, BuildFile};
use crate::texture::{self, Image, ImageError, ImageFormat};
use crate::{anim_codec, build_codec};

pub const BUILD_FILE_NAME: &str = "build.bin";
pub const ANIM_FILE_NAME: &str = "anim.bin";

#[derive(Error, Debug)]
pub enum AnimationIoError {
    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("zip archive {}: {source}", .path.display())]
    Zip { path: PathBuf, source: ZipError },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("{file}: {source}")]
    Format { file: String, source: FormatError },

    #[error("{} has neither build.bin nor anim.bin", .0.display())]
    Empty(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> AnimationIoError + '_ {
    move |source| AnimationIoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn zip_error(path: &Path) -> impl FnOnce(ZipError) -> AnimationIoError + '_ {
    move |source| AnimationIoError::Zip {
        path: path.to_path_buf(),
        source,
    }
}

fn format_error(file: &str) -> impl FnOnce(FormatError) -> AnimationIoError + '_ {
    move |source| AnimationIoError::Format {
        file: file.to_string(),
        source,
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("zip"))
}

/// Reads an animation from a `.zip` archive or from a folder.
pub fn open_animation(path: impl AsRef<Path>) -> Result<Animation, AnimationIoError> {
    let path = path.as_ref();
    if is_zip(path) {
        read_animation_zip(path)
    } else {
        read_animation(path)
    }
}

/// Writes an animation to a `.zip` archive or to a folder.
pub fn save_animation(path: impl AsRef<Path>, animation: &Animation) -> Result<(), AnimationIoError> {
    let path = path.as_ref();
    if is_zip(path) {
        write_animation_zip(path, animation)
    } else {
        write_animation(path, animation)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, AnimationIoError> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(path)(err)),
    }
}

fn load_material(name: &str, result: Result<Image, ImageError>) -> Option<Image> {
    match result {
        Ok(image) => Some(image),
        Err(err) => {
            warn!(material = name, %err, "could not read material");
            None
        }
    }
}

pub fn read_animation(folder: impl AsRef<Path>) -> Result<Animation, AnimationIoError> {
    let folder = folder.as_ref();

    let build = read_optional(&folder.join(BUILD_FILE_NAME))?
        .map(|data| {
            build_codec::decode(&data, |name| {
                load_material(
                    name,
                    texture::asset_path(folder, name).and_then(texture::read_image),
                )
            })
        })
        .transpose()
        .map_err(format_error(BUILD_FILE_NAME))?;
    let anim = read_optional(&folder.join(ANIM_FILE_NAME))?
        .map(|data| anim_codec::decode(&data))
        .transpose()
        .map_err(format_error(ANIM_FILE_NAME))?;

    if build.is_none() && anim.is_none() {
        return Err(AnimationIoError::Empty(folder.to_path_buf()));
    }
    debug!(folder = %folder.display(), "read animation");
    Ok(Animation { build, anim })
}

/// Writes `build.bin`, `anim.bin` and every loaded material into `folder`,
/// creating it if needed.
pub fn write_animation(folder: impl AsRef<Path>, animation: &Animation) -> Result<(), AnimationIoError> {
    let folder = folder.as_ref();
    let materials = match &animation.build {
        Some(build) => loaded_materials(build)
            .map(|(name, image)| Ok((texture::asset_path(folder, name)?, image)))
            .collect::<Result<Vec<_>, ImageError>>()?,
        None => Vec::new(),
    };
    fs::create_dir_all(folder).map_err(io_error(folder))?;

    if let Some(build) = &animation.build {
        let path = folder.join(BUILD_FILE_NAME);
        fs::write(&path, build_codec::encode(build)).map_err(io_error(&path))?;
        for (path, image) in materials {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            texture::write_image(&path, image)?;
        }
    }
    if let Some(anim) = &animation.anim {
        let path = folder.join(ANIM_FILE_NAME);
        fs::write(&path, anim_codec::encode(anim)).map_err(io_error(&path))?;
    }

    info!(folder = %folder.display(), "wrote animation");
    Ok(())
}

fn loaded_materials(build: &BuildFile) -> impl Iterator<Item = (&str, &Image)> {
    build
        .materials
        .iter()
        .filter_map(|m| m.image.as_ref().map(|image| (m.path.as_str(), image)))
}

/// Archive headers are untrusted; never preallocate more than this.
const MAX_PREALLOC: usize = 64 << 20;

fn capacity_hint(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(MAX_PREALLOC).min(MAX_PREALLOC)
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ZipError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut data = Vec::with_capacity(capacity_hint(entry.size()));
    entry.read_to_end(&mut data)?;
    Ok(Some(data))
}

fn read_material<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Image, ImageError> {
    texture::check_asset_name(name)?;
    let format = ImageFormat::from_path(name)?;
    let data = match read_entry(archive, name) {
        Ok(Some(data)) => data,
        Ok(None) => {
            return Err(ImageError::Io {
                path: PathBuf::from(name),
                source: io::Error::new(io::ErrorKind::NotFound, "no such archive entry"),
            })
        }
        Err(err) => {
            return Err(ImageError::Io {
                path: PathBuf::from(name),
                source: err.into(),
            })
        }
    };
    texture::decode(&data, format)
}

pub fn read_animation_zip(path: impl AsRef<Path>) -> Result<Animation, AnimationIoError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;
    let mut archive = ZipArchive::new(file).map_err(zip_error(path))?;

    let build_data = read_entry(&mut archive, BUILD_FILE_NAME).map_err(zip_error(path))?;
    let anim_data = read_entry(&mut archive, ANIM_FILE_NAME).map_err(zip_error(path))?;

    let build = build_data
        .map(|data| {
            build_codec::decode(&data, |name| {
                load_material(name, read_material(&mut archive, name))
            })
        })
        .transpose()
        .map_err(format_error(BUILD_FILE_NAME))?;
    let anim = anim_data
        .map(|data| anim_codec::decode(&data))
        .transpose()
        .map_err(format_error(ANIM_FILE_NAME))?;

    if build.is_none() && anim.is_none() {
        return Err(AnimationIoError::Empty(path.to_path_buf()));
    }
    debug!(archive = %path.display(), "read animation");
    Ok(Animation { build, anim })
}

fn add_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    archive: &Path,
    name: &str,
    data: &[u8],
) -> Result<(), AnimationIoError> {
    zip.start_file(name, FileOptions::default())
        .map_err(zip_error(archive))?;
    zip.write_all(data).map_err(io_error(archive))
}

pub fn write_animation_zip(path: impl AsRef<Path>, animation: &Animation) -> Result<(), AnimationIoError> {
    let path = path.as_ref();
    if let Some(build) = &animation.build {
        for (name, _) in loaded_materials(build) {
            texture::check_asset_name(name)?;
        }
    }
    let file = File::create(path).map_err(io_error(path))?;
    let mut zip = ZipWriter::new(file);

    if let Some(build) = &animation.build {
        add_entry(&mut zip, path, BUILD_FILE_NAME, &build_codec::encode(build))?;
        for (name, image) in loaded_materials(build) {
            let data = texture::encode(image, ImageFormat::from_path(name)?)?;
            add_entry(&mut zip, path, name, &data)?;
        }
    }
    if let Some(anim) = &animation.anim {
        add_entry(&mut zip, path, ANIM_FILE_NAME, &anim_codec::encode(anim))?;
    }

    zip.finish().map_err(zip_error(path))?;
    info!(archive = %path.display(), "wrote animation");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::BuildMaterial;

    #[test]
    fn zip_is_detected_by_extension() {
        assert!(is_zip(Path::new("out/anim.ZIP")));
        assert!(is_zip(Path::new("anim.zip")));
        assert!(!is_zip(Path::new("anim")));
        assert!(!is_zip(Path::new("anim.zip/build.bin")));
    }

    #[test]
    fn declared_entry_size_is_capped() {
        assert_eq!(capacity_hint(12), 12);
        assert_eq!(capacity_hint(u64::MAX), MAX_PREALLOC);
    }

    fn build_with_material(path: &str) -> Animation {
        let mut material = BuildMaterial::new(path);
        material.image = Some(Image::new(2, 2));
        Animation {
            build: Some(BuildFile {
                materials: vec![material],
                ..BuildFile::default()
            }),
            anim: None,
        }
    }

    #[test]
    fn material_paths_cannot_escape_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("out");
        let animation = build_with_material("../m.tex");

        assert!(matches!(
            write_animation(&folder, &animation),
            Err(AnimationIoError::Image(ImageError::UnsafePath(name))) if name == "../m.tex"
        ));
        assert!(!folder.exists());
        assert!(!dir.path().join("m.tex").exists());

        let archive = dir.path().join("out.zip");
        assert!(matches!(
            write_animation_zip(&archive, &animation),
            Err(AnimationIoError::Image(ImageError::UnsafePath(_)))
        ));
        assert!(!archive.exists());
    }

    #[test]
    fn folder_without_binaries_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_animation(dir.path()),
            Err(AnimationIoError::Empty(_))
        ));
    }

    #[test]
    fn corrupt_build_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BUILD_FILE_NAME), b"BILD").unwrap();
        match read_animation(dir.path()) {
            Err(AnimationIoError::Format { file, source }) => {
                assert_eq!(file, BUILD_FILE_NAME);
                assert!(matches!(source, FormatError::TruncatedInput { .. }));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
