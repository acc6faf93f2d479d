fn main() {
    set_version();
}

/// Make the package version, suffixed with the current git hash when one is
/// available, visible to the build as `EDGE_PROBE_VERSION`.
fn set_version() {
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = match git_revision_hash() {
        Some(rev) => format!("{} ({})", version, rev),
        None => version,
    };
    println!("cargo:rustc-env=EDGE_PROBE_VERSION={}", version);
}

fn git_revision_hash() -> Option<String> {
    use std::process::Command;

    let args = &["rev-parse", "--short=10", "HEAD"];
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let rev = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if rev.is_empty() {
        return None;
    }
    Some(rev)
}
