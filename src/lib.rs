//! Tools for build/anim animation files and the atlas projects they are
//! packed from.

pub mod anim_codec;
pub mod animation_io;
pub mod build_codec;
pub mod error;
pub mod format;
pub mod hash;
pub mod index;
pub mod overlay;
pub mod primitive;
pub mod project;
pub mod texture;

pub use error::FormatError;
pub use format::{
    AnimData, AnimElement, AnimFile, AnimFrame, Animation, BoundingBox, BuildFile, BuildFrame,
    BuildMaterial, BuildSymbol, Coord,
};
pub use hash::{HashRef, HashStringTable, HashStrings, UnknownHash};
pub use project::io::{load_project, save_project};
pub use project::json::{ProjectDocument, ProjectError};
pub use project::{
    AnimProject, Atlas, AtlasImage, AtlasRef, GraphError, ImageRef, IntCoord, NodeRef, TreeNode,
    Uid,
};
pub use texture::{Image, ImageError, ImageFormat};
