fn main() {
    set_build_version();
}

/// Expose `<version> (rev <hash>)` to the build as
/// `NET_SCANNER_BUILD_VERSION` so `--version` can report which revision
/// produced the binary.
fn set_build_version() {
    use std::process::Command;

    let args = &["rev-parse", "--short=10", "HEAD"];
    let Ok(output) = Command::new("git").args(args).output() else { return };
    let rev = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if rev.is_empty() {
        return;
    }
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    println!("cargo:rustc-env=NET_SCANNER_BUILD_VERSION={} (rev {})", version, rev);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
