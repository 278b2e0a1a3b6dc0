use std::path::{Path, PathBuf};

const FFMPEG_BIN_DIR: &str = "third_party/ffmpeg/bin";

/// FFmpeg libraries `ac-ffmpeg` links against.
const REQUIRED_DLL_PREFIXES: &[&str] = &[
    "avcodec-",
    "avformat-",
    "avutil-",
    "swresample-",
    "swscale-",
];

fn main() {
    println!("cargo:rerun-if-changed={}", FFMPEG_BIN_DIR);

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let ffmpeg_bin = PathBuf::from(FFMPEG_BIN_DIR);
    if !ffmpeg_bin.exists() {
        println!(
            "cargo:warning=FFmpeg DLLs not found at {}, relying on the system search path",
            ffmpeg_bin.display()
        );
        return;
    }

    // OUT_DIR is target/<profile>/build/<crate>/out, the binaries live three levels up
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let Some(target_dir) = out_dir.ancestors().nth(3) else {
        println!("cargo:warning=Cannot resolve target dir from {}", out_dir.display());
        return;
    };

    copy_runtime_dlls(&ffmpeg_bin, target_dir);
    println!("cargo:rustc-link-search=native={}", ffmpeg_bin.display());
}

fn copy_runtime_dlls(from: &Path, to: &Path) {
    let Ok(entries) = std::fs::read_dir(from) else {
        println!("cargo:warning=Cannot read {}", from.display());
        return;
    };

    for path in entries.flatten().map(|e| e.path()) {
        if !is_required_ffmpeg_dll(&path) {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        let dest = to.join(name);
        if dest.exists() && file_modified(&path) <= file_modified(&dest) {
            continue;
        }
        match std::fs::copy(&path, &dest) {
            Ok(_) => println!("cargo:warning=Copied {} to output dir", path.display()),
            Err(e) => panic!("Failed to copy {:?} to {:?}: {}", path, dest, e),
        }
    }
}

fn file_modified(path: &Path) -> std::time::SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
}

fn is_required_ffmpeg_dll(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".dll") && REQUIRED_DLL_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}
