//! Editable atlas project.
//!
//! An [`AnimProject`] owns a tree of [`Atlas`] nodes. Each atlas owns its child
//! atlases and its [`AtlasImage`]s; upward links (`parent`, `atlas`) and the
//! project's uid index are weak, so dropping a subtree from its parent frees it
//! and its index entries simply stop resolving.
//!
//! Nodes are created detached with uid 0. They get a uid the first time they
//! are added to an atlas that belongs to a project.
//!
//! The graph is single-threaded (`Rc`/`RefCell`); callers must not hold a
//! borrow of a node across a mutating call on the same node.

pub mod io;
pub mod json;

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::texture::Image;

pub type Uid = u32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("object {0} belongs to another project")]
    ForeignObject(Uid),

    #[error("uid {0} is already used by another object")]
    UidCollision(Uid),

    #[error("image {0} already belongs to another atlas")]
    AlreadyAssigned(Uid),

    #[error("atlas is not part of a project")]
    Unregistered,

    #[error("atlas {0} would become its own ancestor")]
    Cycle(Uid),

    #[error("no free uid left in the project")]
    UidsExhausted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntCoord {
    pub x: i32,
    pub y: i32,
}

impl IntCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

type SharedRegistry = Rc<RefCell<Registry>>;

/// Uid and owning project of a node.
#[derive(Debug, Clone, Default)]
struct Identity {
    uid: Uid,
    project: Option<Weak<RefCell<Registry>>>,
}

#[derive(Debug, Default)]
struct Registry {
    objects_by_uid: BTreeMap<Uid, WeakNode>,
    current_uid: Uid,
    dirty: bool,
}

impl Registry {
    fn lookup(&self, uid: Uid) -> Option<NodeRef> {
        self.objects_by_uid.get(&uid).and_then(WeakNode::upgrade)
    }

    fn next_free_uid(&mut self) -> Result<Uid, GraphError> {
        loop {
            self.current_uid = self
                .current_uid
                .checked_add(1)
                .ok_or(GraphError::UidsExhausted)?;
            if self.lookup(self.current_uid).is_none() {
                return Ok(self.current_uid);
            }
        }
    }

    fn prune(&mut self) {
        self.objects_by_uid.retain(|_, node| node.is_alive());
    }
}

/// Adds `node` to the project's index, assigning a uid if it has none.
fn register(registry: &SharedRegistry, node: &NodeRef) -> Result<Uid, GraphError> {
    let ident = node.identity();
    if let Some(project) = &ident.project {
        if !Weak::ptr_eq(project, &Rc::downgrade(registry)) {
            return Err(GraphError::ForeignObject(ident.uid));
        }
    }

    let mut reg = registry.borrow_mut();
    let uid = if ident.uid != 0 {
        match reg.lookup(ident.uid) {
            Some(existing) if existing.ptr_eq(node) => return Ok(ident.uid),
            Some(_) => return Err(GraphError::UidCollision(ident.uid)),
            None => ident.uid,
        }
    } else {
        reg.prune();
        reg.next_free_uid()?
    };
    reg.objects_by_uid.insert(uid, node.downgrade());
    reg.dirty = true;
    drop(reg);

    node.bind(uid, Rc::downgrade(registry));
    Ok(uid)
}

/// Strong handle to any node of the project.
#[derive(Debug, Clone)]
pub enum NodeRef {
    Atlas(AtlasRef),
    Image(ImageRef),
}

impl NodeRef {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeRef::Atlas(_) => Atlas::TYPE_NAME,
            NodeRef::Image(_) => AtlasImage::TYPE_NAME,
        }
    }

    pub fn as_atlas(&self) -> Option<&AtlasRef> {
        match self {
            NodeRef::Atlas(atlas) => Some(atlas),
            NodeRef::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            NodeRef::Image(image) => Some(image),
            NodeRef::Atlas(_) => None,
        }
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        match (self, other) {
            (NodeRef::Atlas(a), NodeRef::Atlas(b)) => a.ptr_eq(b),
            (NodeRef::Image(a), NodeRef::Image(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn identity(&self) -> Identity {
        match self {
            NodeRef::Atlas(atlas) => atlas.0.borrow().ident.clone(),
            NodeRef::Image(image) => image.0.borrow().ident.clone(),
        }
    }

    fn bind(&self, uid: Uid, project: Weak<RefCell<Registry>>) {
        let ident = Identity {
            uid,
            project: Some(project),
        };
        match self {
            NodeRef::Atlas(atlas) => atlas.0.borrow_mut().ident = ident,
            NodeRef::Image(image) => image.0.borrow_mut().ident = ident,
        }
    }

    fn downgrade(&self) -> WeakNode {
        match self {
            NodeRef::Atlas(atlas) => WeakNode::Atlas(Rc::downgrade(&atlas.0)),
            NodeRef::Image(image) => WeakNode::Image(Rc::downgrade(&image.0)),
        }
    }
}

impl From<AtlasRef> for NodeRef {
    fn from(atlas: AtlasRef) -> Self {
        NodeRef::Atlas(atlas)
    }
}

impl From<ImageRef> for NodeRef {
    fn from(image: ImageRef) -> Self {
        NodeRef::Image(image)
    }
}

#[derive(Debug, Clone)]
enum WeakNode {
    Atlas(Weak<RefCell<Atlas>>),
    Image(Weak<RefCell<AtlasImage>>),
}

impl WeakNode {
    fn upgrade(&self) -> Option<NodeRef> {
        match self {
            WeakNode::Atlas(w) => w.upgrade().map(|rc| NodeRef::Atlas(AtlasRef(rc))),
            WeakNode::Image(w) => w.upgrade().map(|rc| NodeRef::Image(ImageRef(rc))),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            WeakNode::Atlas(w) => w.strong_count() > 0,
            WeakNode::Image(w) => w.strong_count() > 0,
        }
    }
}

/// Where an atlas sits inside its parent.
#[derive(Debug, Clone, Default)]
pub struct AtlasParentInfo {
    parent: Option<WeakAtlasRef>,
    pos: IntCoord,
}

impl AtlasParentInfo {
    /// The parent atlas, if there is one and it is still alive.
    pub fn parent(&self) -> Option<AtlasRef> {
        self.parent.as_ref().and_then(WeakAtlasRef::upgrade)
    }

    pub fn pos(&self) -> IntCoord {
        self.pos
    }
}

#[derive(Debug, Default)]
pub struct Atlas {
    ident: Identity,
    parent_info: AtlasParentInfo,
    source: Option<Rc<Image>>,
    images: BTreeMap<Uid, ImageRef>,
    children: BTreeMap<Uid, AtlasRef>,
    size: IntCoord,
    name: String,
}

impl Atlas {
    pub const TYPE_NAME: &'static str = "Atlas";

    pub fn new(name: impl Into<String>, size: IntCoord) -> Self {
        Self {
            name: name.into(),
            size,
            ..Self::default()
        }
    }

    fn with_uid(uid: Uid) -> Self {
        Self {
            ident: Identity { uid, project: None },
            ..Self::default()
        }
    }

    pub fn uid(&self) -> Uid {
        self.ident.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> IntCoord {
        self.size
    }

    pub fn source(&self) -> Option<&Rc<Image>> {
        self.source.as_ref()
    }

    pub fn parent_info(&self) -> &AtlasParentInfo {
        &self.parent_info
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.images.values()
    }

    pub fn children(&self) -> impl Iterator<Item = &AtlasRef> {
        self.children.values()
    }

    pub fn image(&self, uid: Uid) -> Option<&ImageRef> {
        self.images.get(&uid)
    }

    pub fn child(&self, uid: Uid) -> Option<&AtlasRef> {
        self.children.get(&uid)
    }
}

#[derive(Debug, Default)]
pub struct AtlasImage {
    ident: Identity,
    atlas: Option<WeakAtlasRef>,
    pos: IntCoord,
    size: IntCoord,
    name: String,
}

impl AtlasImage {
    pub const TYPE_NAME: &'static str = "AtlasImage";

    pub fn new(name: impl Into<String>, pos: IntCoord, size: IntCoord) -> Self {
        Self {
            name: name.into(),
            pos,
            size,
            ..Self::default()
        }
    }

    fn with_uid(uid: Uid) -> Self {
        Self {
            ident: Identity { uid, project: None },
            ..Self::default()
        }
    }

    pub fn uid(&self) -> Uid {
        self.ident.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top left corner inside the owning atlas.
    pub fn pos(&self) -> IntCoord {
        self.pos
    }

    pub fn size(&self) -> IntCoord {
        self.size
    }
}

#[derive(Debug, Clone)]
pub struct AtlasRef(Rc<RefCell<Atlas>>);

#[derive(Debug, Clone, Default)]
pub struct WeakAtlasRef(Weak<RefCell<Atlas>>);

impl WeakAtlasRef {
    pub fn upgrade(&self) -> Option<AtlasRef> {
        self.0.upgrade().map(AtlasRef)
    }
}

impl From<Atlas> for AtlasRef {
    fn from(atlas: Atlas) -> Self {
        AtlasRef::new(atlas)
    }
}

impl AtlasRef {
    pub fn new(atlas: Atlas) -> Self {
        Self(Rc::new(RefCell::new(atlas)))
    }

    pub fn borrow(&self) -> Ref<'_, Atlas> {
        self.0.borrow()
    }

    pub fn downgrade(&self) -> WeakAtlasRef {
        WeakAtlasRef(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &AtlasRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn uid(&self) -> Uid {
        self.0.borrow().ident.uid
    }

    pub fn parent(&self) -> Option<AtlasRef> {
        self.0.borrow().parent_info.parent()
    }

    fn registry(&self) -> Option<SharedRegistry> {
        self.0.borrow().ident.project.as_ref().and_then(Weak::upgrade)
    }

    fn mark_dirty(&self) {
        if let Some(registry) = self.registry() {
            registry.borrow_mut().dirty = true;
        }
    }

    /// Registers `image` with this atlas's project and takes ownership of it.
    pub fn add_image(&self, image: &ImageRef) -> Result<Uid, GraphError> {
        let registry = self.registry().ok_or(GraphError::Unregistered)?;
        if let Some(owner) = image.atlas() {
            if owner.ptr_eq(self) {
                return Ok(image.uid());
            }
            return Err(GraphError::AlreadyAssigned(image.uid()));
        }

        let uid = register(&registry, &NodeRef::Image(image.clone()))?;
        self.0.borrow_mut().images.insert(uid, image.clone());
        image.0.borrow_mut().atlas = Some(self.downgrade());
        registry.borrow_mut().dirty = true;
        Ok(uid)
    }

    /// Releases ownership of an image. The caller's handle keeps it alive.
    pub fn remove_image(&self, uid: Uid) -> Option<ImageRef> {
        let image = self.0.borrow_mut().images.remove(&uid)?;
        image.0.borrow_mut().atlas = None;
        self.mark_dirty();
        Some(image)
    }

    /// Moves `child` under this atlas, detaching it from its previous parent.
    /// Its position is reset to the origin.
    pub fn add_child(&self, child: &AtlasRef) -> Result<Uid, GraphError> {
        let registry = self.registry().ok_or(GraphError::Unregistered)?;

        // A corrupt parent chain may already loop; stop on the first repeat.
        let mut seen = BTreeSet::new();
        let mut ancestor = Some(self.clone());
        while let Some(atlas) = ancestor {
            if atlas.ptr_eq(child) || !seen.insert(Rc::as_ptr(&atlas.0)) {
                return Err(GraphError::Cycle(child.uid()));
            }
            ancestor = atlas.parent();
        }

        let uid = register(&registry, &NodeRef::Atlas(child.clone()))?;
        child.remove_parent();
        self.0.borrow_mut().children.insert(uid, child.clone());
        child.0.borrow_mut().parent_info = AtlasParentInfo {
            parent: Some(self.downgrade()),
            pos: IntCoord::default(),
        };
        registry.borrow_mut().dirty = true;
        Ok(uid)
    }

    /// Detaches this atlas from its parent. No-op when it has no live parent.
    pub fn remove_parent(&self) {
        let parent = self.0.borrow_mut().parent_info.parent.take();
        if let Some(parent) = parent.as_ref().and_then(WeakAtlasRef::upgrade) {
            let uid = self.uid();
            parent.0.borrow_mut().children.remove(&uid);
            self.mark_dirty();
        }
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.0.borrow_mut().name = name.into();
        self.mark_dirty();
    }

    pub fn set_size(&self, size: IntCoord) {
        self.0.borrow_mut().size = size;
        self.mark_dirty();
    }

    pub fn set_source(&self, source: Option<Image>) {
        self.0.borrow_mut().source = source.map(Rc::new);
        self.mark_dirty();
    }

    pub fn set_parent_pos(&self, pos: IntCoord) {
        self.0.borrow_mut().parent_info.pos = pos;
        self.mark_dirty();
    }
}

#[derive(Debug, Clone)]
pub struct ImageRef(Rc<RefCell<AtlasImage>>);

impl From<AtlasImage> for ImageRef {
    fn from(image: AtlasImage) -> Self {
        ImageRef::new(image)
    }
}

impl ImageRef {
    pub fn new(image: AtlasImage) -> Self {
        Self(Rc::new(RefCell::new(image)))
    }

    pub fn borrow(&self) -> Ref<'_, AtlasImage> {
        self.0.borrow()
    }

    pub fn ptr_eq(&self, other: &ImageRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn uid(&self) -> Uid {
        self.0.borrow().ident.uid
    }

    /// The owning atlas, if any and still alive.
    pub fn atlas(&self) -> Option<AtlasRef> {
        self.0
            .borrow()
            .atlas
            .as_ref()
            .and_then(WeakAtlasRef::upgrade)
    }

    fn mark_dirty(&self) {
        let registry = self.0.borrow().ident.project.as_ref().and_then(Weak::upgrade);
        if let Some(registry) = registry {
            registry.borrow_mut().dirty = true;
        }
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.0.borrow_mut().name = name.into();
        self.mark_dirty();
    }

    pub fn set_pos(&self, pos: IntCoord) {
        self.0.borrow_mut().pos = pos;
        self.mark_dirty();
    }

    pub fn set_size(&self, size: IntCoord) {
        self.0.borrow_mut().size = size;
        self.mark_dirty();
    }
}

/// Navigation used by tree views: atlases list their images, then their
/// child atlases.
pub trait TreeNode {
    fn uid(&self) -> Uid;
    fn node_name(&self) -> String;
    fn children(&self) -> Vec<NodeRef>;
}

impl TreeNode for AtlasRef {
    fn uid(&self) -> Uid {
        AtlasRef::uid(self)
    }

    fn node_name(&self) -> String {
        let atlas = self.borrow();
        if atlas.name.is_empty() {
            format!("Atlas {}", atlas.ident.uid)
        } else {
            atlas.name.clone()
        }
    }

    fn children(&self) -> Vec<NodeRef> {
        let atlas = self.borrow();
        atlas
            .images
            .values()
            .cloned()
            .map(NodeRef::Image)
            .chain(atlas.children.values().cloned().map(NodeRef::Atlas))
            .collect()
    }
}

impl TreeNode for ImageRef {
    fn uid(&self) -> Uid {
        ImageRef::uid(self)
    }

    fn node_name(&self) -> String {
        let image = self.borrow();
        if image.name.is_empty() {
            format!("Image {}", image.ident.uid)
        } else {
            image.name.clone()
        }
    }

    fn children(&self) -> Vec<NodeRef> {
        Vec::new()
    }
}

impl TreeNode for NodeRef {
    fn uid(&self) -> Uid {
        match self {
            NodeRef::Atlas(atlas) => AtlasRef::uid(atlas),
            NodeRef::Image(image) => ImageRef::uid(image),
        }
    }

    fn node_name(&self) -> String {
        match self {
            NodeRef::Atlas(atlas) => atlas.node_name(),
            NodeRef::Image(image) => image.node_name(),
        }
    }

    fn children(&self) -> Vec<NodeRef> {
        match self {
            NodeRef::Atlas(atlas) => TreeNode::children(atlas),
            NodeRef::Image(image) => TreeNode::children(image),
        }
    }
}

/// A project document: the root atlas plus the uid index of every node in it.
#[derive(Debug)]
pub struct AnimProject {
    registry: SharedRegistry,
    atlas: AtlasRef,
}

impl Default for AnimProject {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimProject {
    /// Creates a clean project with an empty, unnamed root atlas.
    pub fn new() -> Self {
        let registry = Rc::new(RefCell::new(Registry::default()));
        let atlas = AtlasRef::new(Atlas::default());
        let root = NodeRef::Atlas(atlas.clone());
        let uid = 1;
        {
            let mut reg = registry.borrow_mut();
            reg.current_uid = uid;
            reg.objects_by_uid.insert(uid, root.downgrade());
        }
        root.bind(uid, Rc::downgrade(&registry));
        Self { registry, atlas }
    }

    fn from_parts(registry: SharedRegistry, atlas: AtlasRef) -> Self {
        registry.borrow_mut().dirty = false;
        Self { registry, atlas }
    }

    pub fn atlas(&self) -> &AtlasRef {
        &self.atlas
    }

    /// Assigns a uid to `node` and indexes it without attaching it to the tree.
    /// The index does not keep the node alive.
    pub fn register(&self, node: &NodeRef) -> Result<Uid, GraphError> {
        register(&self.registry, node)
    }

    pub fn lookup(&self, uid: Uid) -> Option<NodeRef> {
        self.registry.borrow().lookup(uid)
    }

    pub fn owns(&self, node: &NodeRef) -> bool {
        node.identity()
            .project
            .map_or(false, |p| Weak::ptr_eq(&p, &Rc::downgrade(&self.registry)))
    }

    /// Every indexed node that is still alive, in uid order.
    pub fn live_objects(&self) -> Vec<NodeRef> {
        self.registry
            .borrow()
            .objects_by_uid
            .values()
            .filter_map(WeakNode::upgrade)
            .collect()
    }

    /// The last uid handed out.
    pub fn current_uid(&self) -> Uid {
        self.registry.borrow().current_uid
    }

    pub fn is_dirty(&self) -> bool {
        self.registry.borrow().dirty
    }

    pub fn mark_dirty(&self) {
        self.registry.borrow_mut().dirty = true;
    }

    pub fn clear_dirty(&self) {
        self.registry.borrow_mut().dirty = false;
    }
}
