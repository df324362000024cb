//! JSON form of an [`AnimProject`].
//!
//! The document lists every reachable object once, keyed by uid. Object links
//! are written as `{"_type": "_Reference", "uid_ref": n}` so shared and
//! back-pointing links survive the round trip. Atlas source images are not
//! embedded; they come back from [`save`] as named blobs and are looked up by
//! name on [`load`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    AnimProject, Atlas, AtlasImage, AtlasRef, GraphError, ImageRef, IntCoord,
    NodeRef, SharedRegistry, TreeNode, Uid,
};
use crate::texture::{Image, ImageError};

pub const PROJECT_VERSION: i64 = 1;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("object {0} is not indexed by the project and cannot be saved")]
    NotSavable(Uid),

    #[error("object indexed as {expected} reports uid {found}")]
    MismatchedId { expected: Uid, found: Uid },

    #[error("more than one atlas exports an asset named {0:?}")]
    DuplicateAssetName(String),

    #[error("unsupported project version {0}")]
    BadVersion(i64),

    #[error("object {uid} has unknown type {type_name:?}")]
    UnknownType { uid: Uid, type_name: String },

    #[error("reference to uid {0}, which is not in the document")]
    DanglingReference(Uid),

    #[error("uid {uid} is a {found}, expected {expected}")]
    TypeMismatch {
        uid: Uid,
        expected: &'static str,
        found: &'static str,
    },

    #[error("uid 0 is reserved for unregistered objects")]
    ReservedUid,

    #[error("object {0} has more than one owner")]
    MultipleOwners(Uid),

    #[error("object {uid} points back to {declared:?} but is owned by {owner:?}")]
    MismatchedBackReference {
        uid: Uid,
        declared: Option<Uid>,
        owner: Option<Uid>,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid project json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ReferenceTag {
    #[serde(rename = "_Reference")]
    Reference,
}

/// Link to another object of the same document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "_type")]
    tag: ReferenceTag,
    pub uid_ref: Uid,
}

impl Reference {
    pub fn new(uid_ref: Uid) -> Self {
        Self {
            tag: ReferenceTag::Reference,
            uid_ref,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(rename = "_version")]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_uid: Option<Uid>,
    pub atlas: Reference,
    /// One serialized object per uid, in uid order.
    pub objects: Vec<Value>,
}

impl ProjectDocument {
    pub fn to_json_pretty(&self) -> Result<String, ProjectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProjectError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_type")]
enum NodeRecord {
    Atlas(AtlasRecord),
    AtlasImage(ImageRecord),
}

impl NodeRecord {
    fn uid(&self) -> Uid {
        match self {
            NodeRecord::Atlas(atlas) => atlas.uid,
            NodeRecord::AtlasImage(image) => image.uid,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AtlasRecord {
    #[serde(rename = "_uid")]
    uid: Uid,
    name: String,
    size: IntCoord,
    parent_info: ParentInfoRecord,
    images: Vec<Reference>,
    children: Vec<Reference>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParentInfoRecord {
    parent: Option<Reference>,
    pos: IntCoord,
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageRecord {
    #[serde(rename = "_uid")]
    uid: Uid,
    name: String,
    pos: IntCoord,
    size: IntCoord,
    atlas: Option<Reference>,
}

/// The part of an object needed to allocate it before its fields are read.
#[derive(Debug, Deserialize)]
struct NodeHeader {
    #[serde(rename = "_uid")]
    uid: Uid,
    #[serde(rename = "_type")]
    type_name: String,
}

type NodeFactory = fn(Uid) -> NodeRef;

const NODE_TYPES: &[(&str, NodeFactory)] = &[
    (Atlas::TYPE_NAME, new_atlas_node),
    (AtlasImage::TYPE_NAME, new_image_node),
];

fn new_atlas_node(uid: Uid) -> NodeRef {
    NodeRef::Atlas(AtlasRef::new(Atlas::with_uid(uid)))
}

fn new_image_node(uid: Uid) -> NodeRef {
    NodeRef::Image(ImageRef::new(AtlasImage::with_uid(uid)))
}

/// Output of [`save`]: the document and the atlas sources it names.
#[derive(Debug)]
pub struct SavedProject {
    pub document: ProjectDocument,
    pub assets: BTreeMap<String, Rc<Image>>,
}

struct Saver<'a> {
    project: &'a AnimProject,
    // Null while an object is being serialized.
    visited: BTreeMap<Uid, Value>,
    assets: BTreeMap<String, Rc<Image>>,
}

impl Saver<'_> {
    fn track_reference(&mut self, uid: Uid) -> Result<Reference, ProjectError> {
        if !self.visited.contains_key(&uid) {
            let node = self
                .project
                .lookup(uid)
                .ok_or(ProjectError::NotSavable(uid))?;
            let found = node.uid();
            if found != uid {
                return Err(ProjectError::MismatchedId {
                    expected: uid,
                    found,
                });
            }

            self.visited.insert(uid, Value::Null);
            let record = match &node {
                NodeRef::Atlas(atlas) => NodeRecord::Atlas(self.atlas_record(atlas)?),
                NodeRef::Image(image) => NodeRecord::AtlasImage(self.image_record(image)?),
            };
            debug_assert_eq!(record.uid(), uid);
            self.visited.insert(uid, serde_json::to_value(&record)?);
        }
        Ok(Reference::new(uid))
    }

    fn atlas_record(&mut self, atlas: &AtlasRef) -> Result<AtlasRecord, ProjectError> {
        let (record_base, parent, image_uids, child_uids, source) = {
            let a = atlas.borrow();
            (
                (a.ident.uid, a.name.clone(), a.size, a.parent_info.pos),
                a.parent_info.parent(),
                a.images.keys().copied().collect::<Vec<_>>(),
                a.children.keys().copied().collect::<Vec<_>>(),
                a.source.clone(),
            )
        };
        let (uid, name, size, pos) = record_base;

        if let Some(source) = source {
            if !name.is_empty() {
                if self.assets.contains_key(&name) {
                    return Err(ProjectError::DuplicateAssetName(name));
                }
                self.assets.insert(name.clone(), source);
            }
        }

        let parent = parent
            .map(|p| self.track_reference(AtlasRef::uid(&p)))
            .transpose()?;
        let images = image_uids
            .into_iter()
            .map(|uid| self.track_reference(uid))
            .collect::<Result<Vec<_>, _>>()?;
        let children = child_uids
            .into_iter()
            .map(|uid| self.track_reference(uid))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AtlasRecord {
            uid,
            name,
            size,
            parent_info: ParentInfoRecord { parent, pos },
            images,
            children,
        })
    }

    fn image_record(&mut self, image: &ImageRef) -> Result<ImageRecord, ProjectError> {
        let (uid, name, pos, size) = {
            let i = image.borrow();
            (i.ident.uid, i.name.clone(), i.pos, i.size)
        };
        let atlas = image
            .atlas()
            .map(|a| self.track_reference(AtlasRef::uid(&a)))
            .transpose()?;

        Ok(ImageRecord {
            uid,
            name,
            pos,
            size,
            atlas,
        })
    }
}

/// Serializes every object reachable from the root atlas.
///
/// Output is deterministic: saving an unchanged project twice yields the same
/// document.
pub fn save(project: &AnimProject) -> Result<SavedProject, ProjectError> {
    let mut saver = Saver {
        project,
        visited: BTreeMap::new(),
        assets: BTreeMap::new(),
    };
    let atlas = saver.track_reference(project.atlas().uid())?;

    let document = ProjectDocument {
        version: PROJECT_VERSION,
        current_uid: Some(project.current_uid()),
        atlas,
        objects: saver.visited.into_values().collect(),
    };
    debug!(
        objects = document.objects.len(),
        assets = saver.assets.len(),
        "serialized project"
    );
    Ok(SavedProject {
        document,
        assets: saver.assets,
    })
}

fn resolve(registry: &SharedRegistry, reference: &Reference) -> Result<NodeRef, ProjectError> {
    registry
        .borrow()
        .lookup(reference.uid_ref)
        .ok_or(ProjectError::DanglingReference(reference.uid_ref))
}

fn resolve_atlas(
    registry: &SharedRegistry,
    reference: &Reference,
) -> Result<AtlasRef, ProjectError> {
    match resolve(registry, reference)? {
        NodeRef::Atlas(atlas) => Ok(atlas),
        other => Err(ProjectError::TypeMismatch {
            uid: reference.uid_ref,
            expected: Atlas::TYPE_NAME,
            found: other.type_name(),
        }),
    }
}

fn resolve_image(
    registry: &SharedRegistry,
    reference: &Reference,
) -> Result<ImageRef, ProjectError> {
    match resolve(registry, reference)? {
        NodeRef::Image(image) => Ok(image),
        other => Err(ProjectError::TypeMismatch {
            uid: reference.uid_ref,
            expected: AtlasImage::TYPE_NAME,
            found: other.type_name(),
        }),
    }
}

/// Claims `uid` for `owner`. Every object has at most one owner and the root
/// has none.
fn claim(
    owners: &mut BTreeMap<Uid, Uid>,
    root: Uid,
    owner: Uid,
    uid: Uid,
) -> Result<(), ProjectError> {
    if uid == root || owners.insert(uid, owner).is_some() {
        return Err(ProjectError::MultipleOwners(uid));
    }
    Ok(())
}

/// Rebuilds a project. `resolve_asset` is asked for the source image of every
/// named atlas and may return `None` when it is missing.
///
/// Ownership comes from the `images` and `children` lists. The `parent` and
/// `atlas` back-references in the document must agree with them.
///
/// The loaded project is clean.
pub fn load<F>(document: &ProjectDocument, mut resolve_asset: F) -> Result<AnimProject, ProjectError>
where
    F: FnMut(&str) -> Option<Image>,
{
    if document.version < PROJECT_VERSION {
        return Err(ProjectError::BadVersion(document.version));
    }

    let registry: SharedRegistry = Default::default();

    // Allocate every object first so references can point anywhere.
    let mut stubs = Vec::with_capacity(document.objects.len());
    for object in &document.objects {
        let header = NodeHeader::deserialize(object)?;
        if header.uid == 0 {
            return Err(ProjectError::ReservedUid);
        }
        let factory = NODE_TYPES
            .iter()
            .find(|(name, _)| *name == header.type_name)
            .map(|(_, factory)| *factory)
            .ok_or_else(|| ProjectError::UnknownType {
                uid: header.uid,
                type_name: header.type_name.clone(),
            })?;
        let node = factory(header.uid);
        super::register(&registry, &node)?;
        stubs.push(node);
    }

    // Never hand out a uid that is already in the document.
    let max_uid = stubs.iter().map(TreeNode::uid).max().unwrap_or(0);
    registry.borrow_mut().current_uid = document.current_uid.unwrap_or(0).max(max_uid);

    let populated = populate(&registry, document, &mut resolve_asset);
    let root = match populated {
        Ok(root) => root,
        Err(err) => {
            release(&stubs);
            return Err(err);
        }
    };

    let reachable = reachable_uids(&root);
    let orphans: Vec<&NodeRef> = stubs
        .iter()
        .filter(|node| !reachable.contains(&node.uid()))
        .collect();
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "dropping objects not reachable from the root atlas");
        release(orphans.into_iter());
    }

    debug!(objects = reachable.len(), "loaded project");
    Ok(AnimProject::from_parts(registry, root))
}

fn populate<F>(
    registry: &SharedRegistry,
    document: &ProjectDocument,
    resolve_asset: &mut F,
) -> Result<AtlasRef, ProjectError>
where
    F: FnMut(&str) -> Option<Image>,
{
    let root = resolve_atlas(registry, &document.atlas)?;
    let root_uid = root.uid();
    let mut owners = BTreeMap::new();
    let mut declared = Vec::with_capacity(document.objects.len());

    for object in &document.objects {
        match NodeRecord::deserialize(object)? {
            NodeRecord::Atlas(record) => {
                let atlas = resolve_atlas(registry, &Reference::new(record.uid))?;

                let mut images = BTreeMap::new();
                for reference in &record.images {
                    claim(&mut owners, root_uid, record.uid, reference.uid_ref)?;
                    let image = resolve_image(registry, reference)?;
                    image.0.borrow_mut().atlas = Some(atlas.downgrade());
                    images.insert(reference.uid_ref, image);
                }
                let mut children = BTreeMap::new();
                for reference in &record.children {
                    claim(&mut owners, root_uid, record.uid, reference.uid_ref)?;
                    let child = resolve_atlas(registry, reference)?;
                    child.0.borrow_mut().parent_info.parent = Some(atlas.downgrade());
                    children.insert(reference.uid_ref, child);
                }
                let parent = record
                    .parent_info
                    .parent
                    .as_ref()
                    .map(|r| resolve_atlas(registry, r))
                    .transpose()?;
                declared.push((record.uid, parent.map(|p| p.uid())));

                let source = if record.name.is_empty() {
                    None
                } else {
                    resolve_asset(&record.name).map(Rc::new)
                };

                let mut a = atlas.0.borrow_mut();
                a.name = record.name;
                a.size = record.size;
                a.parent_info.pos = record.parent_info.pos;
                a.images = images;
                a.children = children;
                a.source = source;
            }
            NodeRecord::AtlasImage(record) => {
                let image = resolve_image(registry, &Reference::new(record.uid))?;
                let atlas = record
                    .atlas
                    .as_ref()
                    .map(|r| resolve_atlas(registry, r))
                    .transpose()?;
                declared.push((record.uid, atlas.map(|a| a.uid())));

                let mut i = image.0.borrow_mut();
                i.name = record.name;
                i.pos = record.pos;
                i.size = record.size;
            }
        }
    }

    for (uid, declared) in declared {
        let owner = owners.get(&uid).copied();
        if declared != owner {
            return Err(ProjectError::MismatchedBackReference {
                uid,
                declared,
                owner,
            });
        }
    }

    Ok(root)
}

fn reachable_uids(root: &AtlasRef) -> BTreeSet<Uid> {
    let mut seen = BTreeSet::new();
    let mut pending = vec![NodeRef::Atlas(root.clone())];
    while let Some(node) = pending.pop() {
        if seen.insert(node.uid()) {
            pending.extend(TreeNode::children(&node));
        }
    }
    seen
}

/// Drops the ownership links of `nodes` so stray cycles are freed.
fn release<'a>(nodes: impl IntoIterator<Item = &'a NodeRef>) {
    for node in nodes {
        if let NodeRef::Atlas(atlas) = node {
            let mut a = atlas.0.borrow_mut();
            a.images.clear();
            a.children.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_project() -> AnimProject {
        let project = AnimProject::new();
        project.atlas().set_name("root");
        project.atlas().set_size(IntCoord::new(256, 256));

        let child = AtlasRef::new(Atlas::new("child", IntCoord::new(64, 32)));
        project.atlas().add_child(&child).unwrap();
        child.set_parent_pos(IntCoord::new(16, 8));

        let image = ImageRef::new(AtlasImage::new(
            "head",
            IntCoord::new(4, 4),
            IntCoord::new(12, 10),
        ));
        child.add_image(&image).unwrap();
        project
    }

    fn no_assets(_: &str) -> Option<Image> {
        None
    }

    #[test]
    fn saves_every_object_once() {
        let saved = save(&sample_project()).unwrap();
        let doc = &saved.document;

        assert_eq!(doc.version, 1);
        assert_eq!(doc.current_uid, Some(3));
        assert_eq!(doc.atlas, Reference::new(1));
        assert_eq!(doc.objects.len(), 3);
        assert_eq!(
            doc.objects[2],
            json!({
                "_type": "AtlasImage",
                "_uid": 3,
                "name": "head",
                "pos": {"x": 4, "y": 4},
                "size": {"x": 12, "y": 10},
                "atlas": {"_type": "_Reference", "uid_ref": 2},
            })
        );
        assert_eq!(
            doc.objects[1]["parent_info"],
            json!({"parent": {"_type": "_Reference", "uid_ref": 1}, "pos": {"x": 16, "y": 8}})
        );
        assert_eq!(doc.objects[0]["parent_info"]["parent"], Value::Null);
    }

    #[test]
    fn shared_objects_are_referenced_not_repeated() {
        let doc = save(&sample_project()).unwrap().document;
        let text = doc.to_json_pretty().unwrap();
        let child_refs = text.matches("\"uid_ref\": 2").count();
        let child_defs = doc.objects.iter().filter(|o| o["_uid"] == json!(2)).count();
        // Listed by the root, pointed back to by the image.
        assert_eq!((child_refs, child_defs), (2, 1));
    }

    #[test]
    fn saving_twice_is_identical() {
        let project = sample_project();
        let first = save(&project).unwrap().document.to_json_pretty().unwrap();
        let second = save(&project).unwrap().document.to_json_pretty().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn roundtrip_restores_graph() {
        let saved = save(&sample_project()).unwrap();
        let text = saved.document.to_json_pretty().unwrap();
        let loaded = load(&ProjectDocument::from_json(&text).unwrap(), no_assets).unwrap();

        assert!(!loaded.is_dirty());
        assert_eq!(loaded.current_uid(), 3);
        let root = loaded.atlas();
        assert_eq!(root.borrow().name(), "root");

        let child = root.borrow().child(2).cloned().unwrap();
        assert!(child.parent().unwrap().ptr_eq(root));
        assert_eq!(child.borrow().parent_info().pos(), IntCoord::new(16, 8));

        let image = child.borrow().image(3).cloned().unwrap();
        assert!(image.atlas().unwrap().ptr_eq(&child));
        assert_eq!(image.borrow().size(), IntCoord::new(12, 10));

        // Saving the loaded project reproduces the same document.
        assert_eq!(save(&loaded).unwrap().document, saved.document);
    }

    #[test]
    fn new_objects_after_load_get_fresh_uids() {
        let saved = save(&sample_project()).unwrap();
        let loaded = load(&saved.document, no_assets).unwrap();
        let extra = ImageRef::new(AtlasImage::default());
        assert_eq!(loaded.atlas().add_image(&extra).unwrap(), 4);
        assert!(loaded.is_dirty());
    }

    #[test]
    fn missing_current_uid_uses_highest_uid() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.current_uid = None;
        let loaded = load(&doc, no_assets).unwrap();
        assert_eq!(loaded.current_uid(), 3);
    }

    #[test]
    fn sources_are_exported_and_resolved_by_name() {
        let project = sample_project();
        project.atlas().set_source(Some(Image::new(2, 2)));
        let saved = save(&project).unwrap();
        assert_eq!(saved.assets.len(), 1);
        assert!(saved.assets.contains_key("root"));

        let mut asked = Vec::new();
        let loaded = load(&saved.document, |name| {
            asked.push(name.to_string());
            (name == "root").then(|| Image::new(2, 2))
        })
        .unwrap();
        assert_eq!(asked, vec!["root".to_string(), "child".to_string()]);
        assert!(loaded.atlas().borrow().source().is_some());
    }

    #[test]
    fn duplicate_asset_names_fail() {
        let project = sample_project();
        let child = project.atlas().borrow().child(2).cloned().unwrap();
        child.set_name("root");
        child.set_source(Some(Image::new(1, 1)));
        project.atlas().set_source(Some(Image::new(1, 1)));
        assert!(matches!(
            save(&project),
            Err(ProjectError::DuplicateAssetName(name)) if name == "root"
        ));
    }

    #[test]
    fn version_zero_is_rejected() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.version = 0;
        assert!(matches!(load(&doc, no_assets), Err(ProjectError::BadVersion(0))));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[2]["_type"] = json!("Sprite");
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::UnknownType { uid: 3, .. })
        ));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[1]["images"] = json!([{"_type": "_Reference", "uid_ref": 99}]);
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::DanglingReference(99))
        ));
    }

    #[test]
    fn reference_to_wrong_type_is_rejected() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[0]["children"] = json!([{"_type": "_Reference", "uid_ref": 3}]);
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::TypeMismatch {
                uid: 3,
                expected: "Atlas",
                found: "AtlasImage"
            })
        ));
    }

    #[test]
    fn duplicate_uid_is_rejected() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[2]["_uid"] = json!(2);
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::Graph(GraphError::UidCollision(2)))
        ));
    }

    #[test]
    fn second_owner_is_rejected() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[0]["images"] = json!([{"_type": "_Reference", "uid_ref": 3}]);
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::MultipleOwners(3))
        ));
    }

    #[test]
    fn unreachable_objects_are_dropped() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[0]["children"] = json!([]);
        doc.objects[1]["parent_info"]["parent"] = Value::Null;
        let loaded = load(&doc, no_assets).unwrap();
        assert!(loaded.lookup(2).is_none());
        assert!(loaded.lookup(3).is_none());
        assert!(loaded.lookup(1).is_some());
    }

    #[test]
    fn parent_must_match_owner() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[1]["parent_info"]["parent"] = Value::Null;
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::MismatchedBackReference {
                uid: 2,
                declared: None,
                owner: Some(1)
            })
        ));
    }

    #[test]
    fn image_atlas_must_match_owner() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[2]["atlas"] = json!({"_type": "_Reference", "uid_ref": 1});
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::MismatchedBackReference {
                uid: 3,
                declared: Some(1),
                owner: Some(2)
            })
        ));
    }

    #[test]
    fn root_cannot_have_a_parent() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.objects[0]["parent_info"]["parent"] = json!({"_type": "_Reference", "uid_ref": 2});
        assert!(matches!(
            load(&doc, no_assets),
            Err(ProjectError::MismatchedBackReference {
                uid: 1,
                declared: Some(2),
                owner: None
            })
        ));
    }

    #[test]
    fn loaded_back_references_follow_owners() {
        let doc = save(&sample_project()).unwrap().document;
        let loaded = load(&doc, no_assets).unwrap();
        assert!(loaded.atlas().parent().is_none());
        let child = loaded.atlas().borrow().child(2).cloned().unwrap();
        let grandchild = AtlasRef::new(Atlas::new("late", IntCoord::new(1, 1)));
        child.add_child(&grandchild).unwrap();
        assert_eq!(
            grandchild.add_child(loaded.atlas()),
            Err(GraphError::Cycle(1))
        );
    }

    #[test]
    fn stale_current_uid_is_raised_to_highest_uid() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.current_uid = Some(1);
        let loaded = load(&doc, no_assets).unwrap();
        assert_eq!(loaded.current_uid(), 3);
        let extra = ImageRef::new(AtlasImage::default());
        assert_eq!(loaded.atlas().add_image(&extra), Ok(4));
    }

    #[test]
    fn exhausted_current_uid_fails_on_next_allocation() {
        let mut doc = save(&sample_project()).unwrap().document;
        doc.current_uid = Some(Uid::MAX);
        let loaded = load(&doc, no_assets).unwrap();
        assert_eq!(loaded.current_uid(), Uid::MAX);
        let extra = ImageRef::new(AtlasImage::default());
        assert_eq!(
            loaded.atlas().add_image(&extra),
            Err(GraphError::UidsExhausted)
        );
    }
}
