use ganimutils::animation_io::{
    open_animation, read_animation, read_animation_zip, save_animation, write_animation,
    write_animation_zip, AnimationIoError, BUILD_FILE_NAME,
};
use ganimutils::{
    AnimData, AnimElement, AnimFile, AnimFrame, Animation, BuildFile, BuildFrame, BuildMaterial,
    BuildSymbol, Coord, HashRef, Image,
};
use pretty_assertions::assert_eq;

fn material_image() -> Image {
    let mut image = Image::new(4, 2);
    image.set_pixel(3, 1, [200, 100, 50, 255]);
    image
}

fn sample_animation() -> Animation {
    let mut material = BuildMaterial::new("atlas-0.tex");
    material.image = Some(material_image());

    let mut build = BuildFile {
        name: "hero".to_string(),
        total_frames: 1,
        materials: vec![material],
        ..BuildFile::default()
    };
    build.symbols.push(BuildSymbol {
        symbol_hash: HashRef(0x10),
        frames: vec![BuildFrame {
            uv1: Coord::new(1.0, 1.0),
            ..BuildFrame::default()
        }],
        ..BuildSymbol::default()
    });
    build.hashed_strings.insert(0x10, "torso");

    let mut anim = AnimFile {
        num_element_refs: 1,
        num_frames: 1,
        ..AnimFile::default()
    };
    anim.anims.push(AnimData {
        name: "idle".to_string(),
        root_symbol: "hero".to_string(),
        frame_rate: 24.0,
        looping: true,
        frames: vec![AnimFrame {
            elements: vec![AnimElement {
                symbol_hash: HashRef(0x10),
                mat_a: 1.0,
                mat_d: 1.0,
                ..AnimElement::default()
            }],
            ..AnimFrame::default()
        }],
    });
    anim.hashed_strings.insert(0x10, "torso");

    Animation {
        build: Some(build),
        anim: Some(anim),
    }
}

#[test]
fn folder_roundtrip_keeps_materials() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("hero");
    let animation = sample_animation();

    write_animation(&folder, &animation).unwrap();
    assert!(folder.join("atlas-0.tex").is_file());

    let loaded = read_animation(&folder).unwrap();
    assert_eq!(loaded, animation);
}

#[test]
fn zip_roundtrip_keeps_materials() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("hero.zip");
    let animation = sample_animation();

    write_animation_zip(&archive, &animation).unwrap();
    let loaded = read_animation_zip(&archive).unwrap();
    assert_eq!(loaded, animation);
}

#[test]
fn folder_and_zip_are_interchangeable() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("hero");
    let archive = dir.path().join("hero.ZIP");

    save_animation(&folder, &sample_animation()).unwrap();
    let from_folder = open_animation(&folder).unwrap();
    save_animation(&archive, &from_folder).unwrap();
    assert_eq!(open_animation(&archive).unwrap(), from_folder);
}

#[test]
fn anim_only_folder_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let animation = Animation {
        build: None,
        ..sample_animation()
    };
    write_animation(dir.path(), &animation).unwrap();
    assert!(!dir.path().join(BUILD_FILE_NAME).exists());
    assert_eq!(read_animation(dir.path()).unwrap(), animation);
}

#[test]
fn missing_material_still_loads() {
    let dir = tempfile::tempdir().unwrap();
    write_animation(dir.path(), &sample_animation()).unwrap();
    std::fs::remove_file(dir.path().join("atlas-0.tex")).unwrap();

    let loaded = read_animation(dir.path()).unwrap();
    let build = loaded.build.unwrap();
    assert_eq!(build.materials[0].path, "atlas-0.tex");
    assert!(build.materials[0].image.is_none());
}

#[test]
fn empty_zip_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("empty.zip");
    write_animation_zip(&archive, &Animation::default()).unwrap();
    assert!(matches!(
        read_animation_zip(&archive),
        Err(AnimationIoError::Empty(_))
    ));
}
