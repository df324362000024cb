//! In-memory model of the build/anim file pair.

use crate::hash::{HashRef, HashStringTable, HashStrings, UnknownHash};
use crate::texture::Image;

pub const BUILD_VERSION: u32 = 10;
pub const ANIM_VERSION: u32 = 7;

pub const BUILD_MAGIC: &str = "BILD";
pub const ANIM_MAGIC: &str = "ANIM";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub pos: Coord,
    pub size: Coord,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildFrame {
    pub frame_num: u32,
    pub duration: u32,
    /// Index into [`BuildFile::materials`].
    pub image_index: u32,
    pub bbox: BoundingBox,
    /// Top left corner of the frame in its material, in `[0, 1]`.
    pub uv0: Coord,
    /// Bottom right corner of the frame in its material, in `[0, 1]`.
    pub uv1: Coord,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSymbol {
    pub symbol_hash: HashRef,
    pub color_channel_hash: HashRef,
    pub looping: bool,
    /// File order. Not guaranteed to be sorted by `frame_num`.
    pub frames: Vec<BuildFrame>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildMaterial {
    /// Relative to the folder holding the build file.
    pub path: String,
    pub image: Option<Image>,
}

impl BuildMaterial {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildFile {
    pub version: u32,
    pub total_frames: u32,
    pub name: String,
    pub materials: Vec<BuildMaterial>,
    pub sdf_materials: Vec<String>,
    pub symbols: Vec<BuildSymbol>,
    pub hashed_strings: HashStringTable,
}

impl Default for BuildFile {
    fn default() -> Self {
        Self {
            version: BUILD_VERSION,
            total_frames: 0,
            name: String::new(),
            materials: Vec::new(),
            sdf_materials: Vec::new(),
            symbols: Vec::new(),
            hashed_strings: HashStringTable::new(),
        }
    }
}

impl BuildFile {
    pub fn material_for(&self, frame: &BuildFrame) -> Option<&BuildMaterial> {
        self.materials.get(frame.image_index as usize)
    }
}

impl HashStrings for BuildFile {
    fn get_hash_string(&self, hash: u32) -> Result<&str, UnknownHash> {
        self.hashed_strings.resolve(hash)
    }
}

/// One symbol instance placed in an anim frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimElement {
    pub symbol_hash: HashRef,
    pub frame: u32,
    pub folder_hash: HashRef,

    // Multiplicative color, [0, 1]. Stored on disk as A, B, G, R.
    pub c_ap: f32,
    pub c_bp: f32,
    pub c_gp: f32,
    pub c_rp: f32,

    // Additive color, [0, 1]. Stored on disk as A, B, G, R.
    pub c_aa: f32,
    pub c_ba: f32,
    pub c_ga: f32,
    pub c_ra: f32,

    // Affine transform.
    pub mat_a: f32,
    pub mat_b: f32,
    pub mat_c: f32,
    pub mat_d: f32,
    pub tx: f32,
    pub ty: f32,

    /// Draw order key. Elements are kept in file order; sorting is up to the renderer.
    pub tz: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimFrame {
    pub pos: Coord,
    pub size: Coord,
    pub elements: Vec<AnimElement>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimData {
    pub name: String,
    pub root_symbol: String,
    pub frame_rate: f32,
    pub looping: bool,
    pub frames: Vec<AnimFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimFile {
    pub version: u32,
    pub num_element_refs: u32,
    pub num_frames: u32,
    pub anims: Vec<AnimData>,
    pub hashed_strings: HashStringTable,
}

impl Default for AnimFile {
    fn default() -> Self {
        Self {
            version: ANIM_VERSION,
            num_element_refs: 0,
            num_frames: 0,
            anims: Vec::new(),
            hashed_strings: HashStringTable::new(),
        }
    }
}

impl HashStrings for AnimFile {
    fn get_hash_string(&self, hash: u32) -> Result<&str, UnknownHash> {
        self.hashed_strings.resolve(hash)
    }
}

/// A build/anim pair. They are paired by living in the same folder or archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animation {
    pub build: Option<BuildFile>,
    pub anim: Option<AnimFile>,
}
