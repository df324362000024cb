use ganimutils::project::io::asset_dir;
use ganimutils::{
    load_project, save_project, AnimProject, Atlas, AtlasImage, AtlasRef, Image, ImageRef,
    IntCoord, TreeNode,
};
use pretty_assertions::assert_eq;

fn tree_lines(project: &AnimProject) -> Vec<String> {
    fn walk(node: &ganimutils::NodeRef, depth: usize, out: &mut Vec<String>) {
        out.push(format!("{}{}#{}", "  ".repeat(depth), node.node_name(), node.uid()));
        for child in node.children() {
            walk(&child, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    walk(&project.atlas().clone().into(), 0, &mut out);
    out
}

fn sample_project() -> AnimProject {
    let project = AnimProject::new();
    project.atlas().set_name("root.png");
    project.atlas().set_size(IntCoord::new(4, 4));

    let mut source = Image::new(4, 4);
    source.set_pixel(1, 2, [10, 20, 30, 255]);
    project.atlas().set_source(Some(source));

    let child = AtlasRef::new(Atlas::new("", IntCoord::new(2, 2)));
    project.atlas().add_child(&child).unwrap();
    child.set_parent_pos(IntCoord::new(2, 0));
    child
        .add_image(&ImageRef::new(AtlasImage::new(
            "eye",
            IntCoord::new(0, 0),
            IntCoord::new(1, 1),
        )))
        .unwrap();
    project
}

#[test]
fn project_survives_disk_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hero.json");

    let project = sample_project();
    assert!(project.is_dirty());
    save_project(&path, &project).unwrap();
    assert!(!project.is_dirty());
    assert!(asset_dir(&path).join("root.png").is_file());

    let loaded = load_project(&path).unwrap();
    assert!(!loaded.is_dirty());
    assert_eq!(tree_lines(&loaded), tree_lines(&project));
    assert_eq!(
        tree_lines(&loaded),
        vec!["root.png#1", "  Atlas 2#2", "    eye#3"]
    );

    let source = loaded.atlas().borrow().source().cloned().unwrap();
    assert_eq!(source.pixel(1, 2), Some([10, 20, 30, 255]));
}

#[test]
fn saving_unchanged_project_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.json");
    let second = dir.path().join("b.json");

    let project = sample_project();
    save_project(&first, &project).unwrap();
    save_project(&second, &project).unwrap();
    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        std::fs::read_to_string(&second).unwrap()
    );
}

#[test]
fn missing_asset_loads_without_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hero.json");
    save_project(&path, &sample_project()).unwrap();
    std::fs::remove_file(asset_dir(&path).join("root.png")).unwrap();

    let loaded = load_project(&path).unwrap();
    assert!(loaded.atlas().borrow().source().is_none());
    assert_eq!(loaded.atlas().borrow().name(), "root.png");
}

#[test]
fn garbage_file_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        load_project(&path),
        Err(ganimutils::ProjectError::Json(_))
    ));
}
