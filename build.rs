use std::process::Command;

fn main() {
    // Deploy platforms expose the commit through the environment; local builds ask git.
    let commit = std::env::var("SOURCE_COMMIT")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(git_head);

    let short = if commit != "unknown" && commit.len() >= 7 {
        &commit[..7]
    } else {
        commit.as_str()
    };

    println!("cargo:rustc-env=GIT_COMMIT_HASH={commit}");
    println!("cargo:rustc-env=GIT_COMMIT_SHORT={short}");
    println!("cargo:rerun-if-env-changed=SOURCE_COMMIT");

    if std::path::Path::new(".git/HEAD").exists() {
        println!("cargo:rerun-if-changed=.git/HEAD");
        println!("cargo:rerun-if-changed=.git/refs/heads");
    }
}

fn git_head() -> String {
    match Command::new("git").args(["rev-parse", "HEAD"]).output() {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => "unknown".to_string(),
    }
}
