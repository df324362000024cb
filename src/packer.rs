use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ganimutils::animation_io::{open_animation, save_animation};
use ganimutils::format::Animation;
use ganimutils::hash::HashStrings;
use ganimutils::overlay::overlay_atlas;
use ganimutils::{index, load_project, save_project, NodeRef, TreeNode};

#[derive(Parser, Debug)]
#[command(name = "packer", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a project from a YAML index and save it as JSON.
    Pack {
        /// Index describing the atlas tree.
        index: PathBuf,
        /// Output project JSON. Atlas sources go to `<stem>_assets/`.
        output: PathBuf,
    },
    /// Print the atlas tree of a project.
    Tree {
        project: PathBuf,
    },
    /// Summarize a build/anim pair (folder or .zip).
    Inspect {
        animation: PathBuf,
    },
    /// Re-encode a build/anim pair, e.g. folder to .zip.
    Repack {
        input: PathBuf,
        output: PathBuf,
    },
    /// Tint the frame rects of every material and write the result.
    Overlay {
        input: PathBuf,
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().cmd {
        Command::Pack { index, output } => pack(index, output),
        Command::Tree { project } => tree(project),
        Command::Inspect { animation } => inspect(animation),
        Command::Repack { input, output } => repack(input, output, false),
        Command::Overlay { input, output } => repack(input, output, true),
    }
}

fn pack(index_path: PathBuf, output: PathBuf) -> Result<()> {
    let project = index::load_index_project(&index_path)?;
    save_project(&output, &project)
        .with_context(|| format!("failed to write project to {}", output.display()))?;
    info!(objects = project.live_objects().len(), "packed {}", output.display());
    Ok(())
}

fn print_node(node: &NodeRef, depth: usize) {
    println!("{:indent$}{} [{}]", "", node.node_name(), node.uid(), indent = depth * 2);
    for child in node.children() {
        print_node(&child, depth + 1);
    }
}

fn tree(path: PathBuf) -> Result<()> {
    let project = load_project(&path)
        .with_context(|| format!("failed to load project at {}", path.display()))?;
    print_node(&NodeRef::Atlas(project.atlas().clone()), 0);
    Ok(())
}

fn inspect(path: PathBuf) -> Result<()> {
    let animation = open_animation(&path)
        .with_context(|| format!("failed to read animation at {}", path.display()))?;

    if let Some(build) = &animation.build {
        println!("build {:?}: {} symbols, {} frames", build.name, build.symbols.len(), build.total_frames);
        for material in &build.materials {
            let status = match &material.image {
                Some(image) => format!("{}x{}", image.width(), image.height()),
                None => "not loaded".to_string(),
            };
            println!("  material {} ({status})", material.path);
        }
        for symbol in &build.symbols {
            println!("  symbol {} ({} frames)", symbol.symbol_hash.display(build), symbol.frames.len());
        }
    }
    if let Some(anim) = &animation.anim {
        println!("anim: {} animations, {} frames", anim.anims.len(), anim.num_frames);
        for data in &anim.anims {
            println!(
                "  {} on {} @ {} fps, {} frames{}",
                data.name,
                data.root_symbol,
                data.frame_rate,
                data.frames.len(),
                if data.looping { ", looping" } else { "" }
            );
        }
        let unresolved = anim
            .anims
            .iter()
            .flat_map(|d| &d.frames)
            .flat_map(|f| &f.elements)
            .filter(|e| anim.get_hash_string(e.symbol_hash.hash()).is_err())
            .count();
        if unresolved > 0 {
            println!("  {unresolved} elements reference unknown symbol hashes");
        }
    }
    Ok(())
}

fn repack(input: PathBuf, output: PathBuf, overlay: bool) -> Result<()> {
    let mut animation: Animation = open_animation(&input)
        .with_context(|| format!("failed to read animation at {}", input.display()))?;
    if overlay {
        let rects = overlay_atlas(&mut animation);
        info!(rects, "applied overlay");
    }
    save_animation(&output, &animation)
        .with_context(|| format!("failed to write animation to {}", output.display()))?;
    info!("wrote {}", output.display());
    Ok(())
}
