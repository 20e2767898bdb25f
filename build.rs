use std::env;
use std::path::PathBuf;

// Windows builds link FFmpeg through vcpkg; point at a likely install when
// FFMPEG_DIR is missing. Nothing to do without the `ffmpeg` feature.
fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=vidgif: FFMPEG_DIR is not set; install FFmpeg with vcpkg and set FFMPEG_DIR, or build with --no-default-features"
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if candidate.join("include").join("libavformat").exists() {
        println!(
            "cargo:warning=vidgif: found FFmpeg headers under {}; set FFMPEG_DIR to that path",
            candidate.display()
        );
    } else {
        println!(
            "cargo:warning=vidgif: no FFmpeg install under {}",
            candidate.display()
        );
    }
}
