//! YAML index describing an atlas tree, used by `packer pack`.
//!
//! ```yaml
//! name: hero.png
//! image_file: hero.png
//! images:
//!   - { name: head, pos: [0, 0], size: [16, 16] }
//! children:
//!   - name: weapons
//!     pos: { x: 128, y: 0 }
//!     size: [64, 64]
//! ```
//!
//! A bare list of entries is also accepted; they become children of an
//! unnamed root atlas.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::project::{AnimProject, Atlas, AtlasImage, AtlasRef, ImageRef, IntCoord};
use crate::texture;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Point {
    Pair([i32; 2]),
    Named { x: i32, y: i32 },
}

impl From<Point> for IntCoord {
    fn from(point: Point) -> Self {
        match point {
            Point::Pair([x, y]) => IntCoord::new(x, y),
            Point::Named { x, y } => IntCoord::new(x, y),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageEntry {
    #[serde(default)]
    pub name: String,
    pub pos: Point,
    pub size: Point,
}

#[derive(Debug, Deserialize)]
pub struct AtlasEntry {
    #[serde(default)]
    pub name: String,
    /// Defaults to the size of `image_file`, if any.
    pub size: Option<Point>,
    /// Position inside the parent atlas.
    pub pos: Option<Point>,
    /// Relative to the index file.
    pub image_file: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub children: Vec<AtlasEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IndexFile {
    Atlas(AtlasEntry),
    List(Vec<AtlasEntry>),
}

pub fn read_index(path: impl AsRef<Path>) -> Result<IndexFile> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open index file at {}", path.display()))?;
    serde_yaml::from_reader(file)
        .with_context(|| format!("failed to parse index file at {}", path.display()))
}

/// Builds a project from an index. Image files are resolved against `base_dir`.
pub fn build_project(index: IndexFile, base_dir: &Path) -> Result<AnimProject> {
    let project = AnimProject::new();
    match index {
        IndexFile::Atlas(entry) => fill_atlas(project.atlas(), entry, base_dir)?,
        IndexFile::List(entries) => {
            for entry in entries {
                add_child_entry(project.atlas(), entry, base_dir)?;
            }
        }
    }
    debug!(uid = project.current_uid(), "built project from index");
    Ok(project)
}

fn add_child_entry(parent: &AtlasRef, entry: AtlasEntry, base_dir: &Path) -> Result<()> {
    let child = AtlasRef::new(Atlas::default());
    parent
        .add_child(&child)
        .with_context(|| format!("failed to add atlas {:?}", entry.name))?;
    if let Some(pos) = entry.pos {
        child.set_parent_pos(pos.into());
    }
    fill_atlas(&child, entry, base_dir)
}

fn fill_atlas(atlas: &AtlasRef, entry: AtlasEntry, base_dir: &Path) -> Result<()> {
    let source = entry
        .image_file
        .as_ref()
        .map(|file| {
            let path: PathBuf = base_dir.join(file);
            texture::read_image(&path)
                .with_context(|| format!("failed to read image file at {}", path.display()))
        })
        .transpose()?;

    let size = match (entry.size, &source) {
        (Some(size), _) => size.into(),
        (None, Some(image)) => IntCoord::new(image.width() as i32, image.height() as i32),
        (None, None) => IntCoord::default(),
    };
    atlas.set_name(entry.name);
    atlas.set_size(size);
    atlas.set_source(source);

    for image in entry.images {
        let node = ImageRef::new(AtlasImage::new(image.name, image.pos.into(), image.size.into()));
        atlas
            .add_image(&node)
            .context("failed to add atlas image")?;
    }
    for child in entry.children {
        add_child_entry(atlas, child, base_dir)?;
    }
    Ok(())
}

/// Reads an index file and builds the project it describes.
pub fn load_index_project(path: impl AsRef<Path>) -> Result<AnimProject> {
    let path = path.as_ref();
    let index = read_index(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    build_project(index, base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::TreeNode;

    fn parse(yaml: &str) -> IndexFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn nested_index_builds_the_tree() {
        let index = parse(
            r#"
name: root
size: [256, 128]
images:
  - { name: head, pos: [1, 2], size: [16, 16] }
children:
  - name: weapons
    pos: { x: 128, y: 0 }
    size: [64, 64]
    images:
      - { name: sword, pos: [0, 0], size: [8, 32] }
"#,
        );
        let project = build_project(index, Path::new(".")).unwrap();
        let root = project.atlas();
        assert_eq!(root.borrow().name(), "root");
        assert_eq!(root.borrow().size(), IntCoord::new(256, 128));

        let names: Vec<String> = TreeNode::children(root).iter().map(TreeNode::node_name).collect();
        assert_eq!(names, vec!["head", "weapons"]);

        let weapons = root.borrow().children().next().cloned().unwrap();
        assert_eq!(weapons.borrow().parent_info().pos(), IntCoord::new(128, 0));
        let sword = weapons.borrow().images().next().cloned().unwrap();
        assert_eq!(sword.borrow().size(), IntCoord::new(8, 32));
    }

    #[test]
    fn list_index_hangs_under_unnamed_root() {
        let index = parse("- name: a\n- name: b\n  pos: [3, 4]\n");
        let project = build_project(index, Path::new(".")).unwrap();
        assert_eq!(project.atlas().node_name(), "Atlas 1");
        assert_eq!(TreeNode::children(project.atlas()).len(), 2);
    }

    #[test]
    fn missing_image_file_reports_its_path() {
        let index = parse("name: root\nimage_file: nowhere.png\n");
        let err = build_project(index, Path::new("assets")).unwrap_err();
        assert!(format!("{err:#}").contains("nowhere.png"));
    }
}
