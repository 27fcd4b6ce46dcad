//! Build script for nity-loader
//!
//! Embeds the compiled connect4 object. The object is produced by a separate
//! clang build; this script only locates it and copies it into OUT_DIR.

use std::env;
use std::path::PathBuf;

fn main() {
    // Tell cargo about our custom cfg flags
    println!("cargo::rustc-check-cfg=cfg(embedded_bpf_object)");

    println!("cargo:rerun-if-env-changed=NITY_BPF_OBJECT");

    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=OUT_DIR not set: {}", e);
            return;
        }
    };
    let out_path = out_dir.join("nity.o");

    match embed_object(&out_path) {
        Ok(size) => {
            println!("cargo:rustc-cfg=embedded_bpf_object");
            println!("cargo:warning=Embedded eBPF object ({} bytes)", size);
        }
        Err(e) => {
            println!(
                "cargo:warning=Failed to embed eBPF object: {}. \
                 Loading will fail until the crate is rebuilt with one.",
                e
            );
        }
    }
}

fn embed_object(out_path: &PathBuf) -> Result<u64, String> {
    // Check for explicit path via environment variable
    if let Ok(path) = env::var("NITY_BPF_OBJECT") {
        let src = PathBuf::from(&path);
        if src.exists() {
            println!("cargo:rerun-if-changed={}", src.display());
            return std::fs::copy(&src, out_path)
                .map_err(|e| format!("Failed to copy object from {}: {}", path, e));
        }
        println!("cargo:warning=NITY_BPF_OBJECT does not exist: {}", path);
    }

    let manifest_dir = env::var("CARGO_MANIFEST_DIR")
        .map_err(|e| format!("CARGO_MANIFEST_DIR not set: {}", e))?;
    let workspace_root = PathBuf::from(&manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace
        .map(PathBuf::from)
        .ok_or("Failed to find workspace root")?;

    // Output location of the clang build
    let generated = workspace_root.join("bpf").join("gen").join("nity.o");
    println!("cargo:rerun-if-changed={}", generated.display());
    if generated.exists() {
        return std::fs::copy(&generated, out_path)
            .map_err(|e| format!("Failed to copy object from {}: {}", generated.display(), e));
    }

    Err(format!(
        "eBPF object not found. Looked in:\n  \
         - NITY_BPF_OBJECT env var\n  \
         - {:?}",
        generated
    ))
}
