//! Load a .gltf file and print what the importer made of it.
//!
//! Run with: cargo run -- assets/box.gltf [--strict] [--options options.json]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use tessera_core::media::classify;
use tessera_core::{import, Blobs, Document, ImportOptions, MediaKind, MeshData};

struct Args {
    path: PathBuf,
    options: ImportOptions,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = env::args().skip(1);
    let mut path = None;
    let mut options_path = None;
    let mut strict = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--strict" => strict = true,
            "--options" => options_path = Some(args.next().context("--options needs a file path")?),
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            _ => path = Some(PathBuf::from(arg)),
        }
    }

    let Some(path) = path else {
        return Ok(None);
    };

    let mut options: ImportOptions = match options_path {
        Some(file) => {
            let text = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid import options in {}", file))?
        }
        None => ImportOptions::default(),
    };
    options.strict |= strict;

    Ok(Some(Args { path, options }))
}

/// Bytes behind a buffer or image URI: a base64 data URI or a file next to the document.
fn read_uri(base: &Path, uri: &str) -> Result<Vec<u8>> {
    if let Some(data) = uri.strip_prefix("data:") {
        let (header, payload) = data.split_once(',').context("Data URI without payload")?;
        if !header.ends_with(";base64") {
            bail!("Only base64 data URIs are supported");
        }
        return STANDARD.decode(payload).context("Invalid base64 in data URI");
    }

    let path = base.join(uri);
    fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_blobs(document: &Document, base: &Path) -> Result<Blobs> {
    let mut blobs = Blobs::new();

    for (i, buffer) in document.buffers.iter().enumerate() {
        let bytes = match &buffer.uri {
            Some(uri) => read_uri(base, uri).with_context(|| format!("Loading buffers[{}]", i))?,
            None => {
                log::warn!("buffers[{}] has no URI (GLB is not supported), leaving it empty", i);
                Vec::new()
            }
        };
        log::debug!("Loaded buffers[{}]: {} bytes", i, bytes.len());
        blobs.push_buffer(bytes);
    }

    for image in &document.images {
        let Some(uri) = &image.uri else { continue };
        // Videos are streamed by the consumer
        if classify(image.mime_type.as_deref(), Some(uri)) == MediaKind::Video {
            continue;
        }
        match read_uri(base, uri) {
            Ok(bytes) => blobs.insert_resource(uri.clone(), bytes),
            Err(e) => log::warn!("Skipping image {}: {:#}", uri, e),
        }
    }

    Ok(blobs)
}

fn main() -> Result<()> {
    env_logger::init();

    let Some(args) = parse_args()? else {
        println!("Usage: tessera_inspect <path-to-gltf-file> [--strict] [--options <options.json>]");
        println!("\nExamples:");
        println!("  cargo run -- assets/box.gltf");
        println!("  cargo run -- assets/box.gltf --strict");
        return Ok(());
    };

    println!("Loading glTF file: {}", args.path.display());

    let bytes = fs::read(&args.path).with_context(|| format!("Failed to read {}", args.path.display()))?;
    let document = Document::from_slice(&bytes)?;
    let base = args.path.parent().unwrap_or_else(|| Path::new("."));
    let blobs = load_blobs(&document, base)?;

    let imported = import(&document, &blobs, &args.options)?;
    let scene = &imported.scene;
    let report = &imported.report;

    println!("\n=== Scene: glTF {} ===", document.asset.version);
    println!("Nodes: {}", scene.nodes.len());
    println!("Geometries: {}", scene.geometries.len());
    println!("Instances: {}", scene.instance_count());
    println!("Total triangles: {}", scene.total_triangle_count());
    println!("Materials: {}", scene.materials.iter().flatten().count());
    println!("Textures: {}", scene.textures.iter().flatten().count());
    println!("Animations: {}", scene.animations.len());
    println!("Lights: {}", scene.lights.len());

    println!("\n--- Geometries ---");
    for (i, geometry) in scene.geometries.iter().enumerate() {
        println!(
            "  [{}] {} - {} primitives, used by {} nodes",
            i,
            geometry.name.as_deref().unwrap_or("<unnamed>"),
            geometry.primitives.len(),
            geometry.users.len()
        );
        for primitive in &geometry.primitives {
            match MeshData::read(primitive, &blobs) {
                Ok(mesh) => {
                    println!(
                        "       #{}: {} vertices, {} triangles, {:?}",
                        primitive.index,
                        mesh.vertex_count(),
                        mesh.triangle_count(),
                        mesh.topology
                    );
                    if let Some(bounds) = mesh.bounds {
                        println!(
                            "       Bounds: ({:.2}, {:.2}, {:.2}) to ({:.2}, {:.2}, {:.2})",
                            bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
                        );
                    }
                }
                Err(e) => println!("       #{}: unreadable ({})", primitive.index, e),
            }
        }
    }

    println!("\n--- Materials ---");
    for (i, material) in scene.materials.iter().enumerate() {
        match material {
            Some(material) => println!(
                "  [{}] {} - {:?}, {} textures{}",
                i,
                material.name.as_deref().unwrap_or("<unnamed>"),
                material.alpha_mode,
                material.textures.len(),
                if material.unlit { ", unlit" } else { "" }
            ),
            None => println!("  [{}] rejected", i),
        }
    }

    println!("\n--- Textures ---");
    for (i, texture) in scene.textures.iter().enumerate() {
        let Some(texture) = texture else {
            println!("  [{}] rejected", i);
            continue;
        };
        let handle = match &texture.handle {
            Some(handle) => match handle.as_bitmap() {
                Some(bitmap) => format!("{}x{} bitmap", bitmap.width(), bitmap.height()),
                None => format!("{:?}", handle.kind()),
            },
            None => "unbound".to_string(),
        };
        println!("  [{}] {} - {}", i, texture.name.as_deref().unwrap_or("<unnamed>"), handle);
    }

    println!("\n--- Instances ---");
    for (i, node) in scene.nodes.iter().enumerate() {
        let Some(mesh) = node.mesh else { continue };
        if let Some(matrix) = scene.world_matrix(i) {
            let pos = matrix.w_axis;
            println!("  [{}] Geometry {} at ({:.2}, {:.2}, {:.2})", i, mesh, pos.x, pos.y, pos.z);
        }
    }

    if !report.diagnostics.is_empty() {
        println!("\n--- Diagnostics ---");
        for diagnostic in &report.diagnostics {
            println!("  {}", diagnostic);
        }
    }

    if !report.failures.is_empty() {
        println!("\n--- Hook failures ---");
        for failure in &report.failures {
            println!("  {}", failure);
        }
    }

    Ok(())
}
