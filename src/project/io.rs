//! On-disk layout of a project: `<name>.json` plus a `<name>_assets/` folder
//! holding one image per named atlas source.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::json::{self, ProjectDocument, ProjectError};
use super::AnimProject;
use crate::texture;

/// Folder next to `project_file` where atlas sources are stored.
pub fn asset_dir(project_file: &Path) -> PathBuf {
    let stem = project_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    project_file.with_file_name(format!("{stem}_assets"))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProjectError + '_ {
    move |source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes the project and its atlas sources, then marks it clean.
pub fn save_project(path: impl AsRef<Path>, project: &AnimProject) -> Result<(), ProjectError> {
    let path = path.as_ref();
    let saved = json::save(project)?;

    let assets = asset_dir(path);
    let targets = saved
        .assets
        .iter()
        .map(|(name, image)| Ok((texture::asset_path(&assets, name)?, image)))
        .collect::<Result<Vec<_>, ProjectError>>()?;

    fs::write(path, saved.document.to_json_pretty()?).map_err(io_error(path))?;
    fs::create_dir_all(&assets).map_err(io_error(&assets))?;
    for (target, image) in targets {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        texture::write_image(&target, image)?;
    }

    project.clear_dirty();
    info!(
        path = %path.display(),
        objects = saved.document.objects.len(),
        assets = saved.assets.len(),
        "saved project"
    );
    Ok(())
}

/// Reads a project. Atlas sources that cannot be read are reported and left
/// empty.
pub fn load_project(path: impl AsRef<Path>) -> Result<AnimProject, ProjectError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(io_error(path))?;
    let document = ProjectDocument::from_json(&text)?;

    let assets = asset_dir(path);
    let project = json::load(&document, |name| {
        match texture::asset_path(&assets, name).and_then(texture::read_image) {
            Ok(image) => Some(image),
            Err(err) => {
                warn!(asset = name, %err, "atlas source not loaded");
                None
            }
        }
    })?;

    info!(path = %path.display(), uid = project.current_uid(), "loaded project");
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{Image, ImageError};

    #[test]
    fn asset_dir_sits_next_to_the_project() {
        assert_eq!(
            asset_dir(Path::new("work/hero.json")),
            PathBuf::from("work/hero_assets")
        );
        assert_eq!(asset_dir(Path::new("hero")), PathBuf::from("hero_assets"));
    }

    #[test]
    fn asset_names_cannot_escape_the_asset_dir() {
        let dir = tempfile::tempdir().unwrap();
        let project = AnimProject::new();
        project.atlas().set_name("../escaped.png");
        project.atlas().set_source(Some(Image::new(1, 1)));

        let file = dir.path().join("hero.json");
        assert!(matches!(
            save_project(&file, &project),
            Err(ProjectError::Image(ImageError::UnsafePath(name))) if name == "../escaped.png"
        ));
        assert!(!dir.path().join("escaped.png").exists());
        assert!(!file.exists());
        assert!(project.is_dirty());
    }

    #[test]
    fn escaping_asset_names_are_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let project = AnimProject::new();
        project.atlas().set_name("hero.png");
        project.atlas().set_source(Some(Image::new(1, 1)));
        let file = dir.path().join("hero.json");
        save_project(&file, &project).unwrap();

        crate::texture::write_image(dir.path().join("outside.png"), &Image::new(1, 1)).unwrap();
        let text = fs::read_to_string(&file).unwrap().replace("\"hero.png\"", "\"../outside.png\"");
        fs::write(&file, text).unwrap();

        let loaded = load_project(&file).unwrap();
        assert_eq!(loaded.atlas().borrow().name(), "../outside.png");
        assert!(loaded.atlas().borrow().source().is_none());
    }
}
