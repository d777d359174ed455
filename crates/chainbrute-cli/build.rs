use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_PKG_VERSION");
    println!("cargo:rerun-if-env-changed=GITHUB_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/packed-refs");

    let pkg_version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let sha = env::var("GITHUB_SHA")
        .ok()
        .or_else(head_sha)
        .map(|s| s.trim().chars().take(8).collect::<String>())
        .filter(|s| !s.is_empty());

    let version = match sha {
        Some(sha) => format!("{pkg_version}+{sha}"),
        None => pkg_version,
    };
    println!("cargo:rustc-env=CHAINBRUTE_VERSION={version}");
}

/// Commit of HEAD read straight from the git directory, without the `git`
/// binary. Worktrees (`.git` file with a `gitdir:` pointer) are followed.
fn head_sha() -> Option<String> {
    let git_dir = find_git_dir()?;
    let head = fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let Some(reference) = head.trim().strip_prefix("ref: ") else {
        return Some(head.trim().to_string());
    };

    if let Ok(sha) = fs::read_to_string(git_dir.join(reference)) {
        return Some(sha.trim().to_string());
    }
    let packed = fs::read_to_string(git_dir.join("packed-refs")).ok()?;
    packed
        .lines()
        .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
        .filter_map(|line| line.split_once(' '))
        .find(|(_, name)| name.trim() == reference)
        .map(|(sha, _)| sha.to_string())
}

fn find_git_dir() -> Option<PathBuf> {
    let mut dir = env::current_dir().ok()?;
    loop {
        let dot_git = dir.join(".git");
        if dot_git.is_dir() {
            return Some(dot_git);
        }
        if dot_git.is_file() {
            let pointer = fs::read_to_string(&dot_git).ok()?;
            let target = dir.join(pointer.strip_prefix("gitdir:")?.trim());
            return target.is_dir().then_some(target);
        }
        if !dir.pop() {
            return None;
        }
    }
}
