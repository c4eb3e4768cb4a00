//! Stamps the binary with the commit and build time reported by `--version`
//! and the admin `/version` route

use std::process::Command;

use chrono::Utc;

fn git_hash() -> String {
    if let Ok(hash) = std::env::var("BLACKTREE_GIT_HASH") {
        return hash;
    }
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rustc-env=GIT_HASH={}", git_hash());
    println!(
        "cargo:rustc-env=BUILD_TIME={}",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );

    // the workspace root owns the repository
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-env-changed=BLACKTREE_GIT_HASH");
}
