//! Integration tests for the remote-helper session.
//!
//! Each test drives [`RemoteHelperSession`] with scripted protocol input
//! against real git repositories and a [`LocalBackend`] directory, the way
//! git itself would during `push`, `fetch` and `clone`.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use tempfile::TempDir;

use git_remote_rclone::core::paths::RemoteLayout;
use git_remote_rclone::git::Git;
use git_remote_rclone::protocol::{HelperConfig, RemoteHelperSession};
use git_remote_rclone::remote::LockConfig;
use git_remote_rclone::storage::{LocalBackend, StorageBackend};

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A storage directory standing in for an rclone remote.
struct Remote {
    dir: TempDir,
}

impl Remote {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Run one helper session for `repo` and return its stdout.
    fn drive(&self, repo: &Path, input: &str) -> String {
        let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(self.root()));
        let config = HelperConfig {
            lock: LockConfig {
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(50),
                max_attempts: 200,
                ..LockConfig::default()
            },
            jobs: 4,
            verbosity: 0,
        };
        let mut session = RemoteHelperSession::new(
            Git::open(repo).unwrap(),
            backend,
            RemoteLayout::new("repo"),
            &config,
        )
        .unwrap();

        let mut out = Vec::new();
        session.run(Cursor::new(input), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    /// Remote value of `name`, read straight from storage.
    fn ref_value(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.root().join("repo").join(name))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Number of loose objects stored.
    fn object_count(&self) -> usize {
        let objects = self.root().join("repo/objects");
        let Ok(dirs) = std::fs::read_dir(objects) else {
            return 0;
        };
        dirs.map(|d| std::fs::read_dir(d.unwrap().path()).unwrap().count())
            .sum()
    }
}

/// A working repository.
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "-q", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    fn write(&self, name: &str, content: impl AsRef<[u8]>) {
        let path = self.file(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn commit_all(&self, message: &str) -> String {
        run_git(self.path(), &["add", "-A"]);
        run_git(self.path(), &["commit", "-q", "-m", message]);
        self.rev_parse("HEAD")
    }

    fn rev_parse(&self, rev: &str) -> String {
        git_output(self.path(), &["rev-parse", rev]).trim().to_string()
    }

    /// `git push` equivalent: list for-push, then a push batch.
    fn push(&self, remote: &Remote, specs: &[&str]) -> String {
        let mut input = String::from("list for-push\n");
        for spec in specs {
            input.push_str(&format!("push {spec}\n"));
        }
        input.push('\n');
        let out = remote.drive(self.path(), &input);
        // Drop the listing, keep the push report
        match out.strip_prefix('\n') {
            Some(report) => report.to_string(),
            None => out
                .split_once("\n\n")
                .map(|(_, report)| report.to_string())
                .unwrap_or_default(),
        }
    }

    /// `git clone` equivalent: list, fetch every ref, check out HEAD.
    fn clone_from(remote: &Remote) -> Self {
        let repo = Self::new();
        let listing = remote.drive(repo.path(), "list\n\n");

        let mut refs = Vec::new();
        let mut head = None;
        for line in listing.lines().filter(|l| !l.is_empty()) {
            let (left, right) = line.split_once(' ').unwrap();
            if let Some(target) = left.strip_prefix('@') {
                head = Some(target.to_string());
            } else {
                refs.push((left.to_string(), right.to_string()));
            }
        }

        if !refs.is_empty() {
            let mut fetch: String = refs
                .iter()
                .map(|(oid, name)| format!("fetch {oid} {name}\n"))
                .collect();
            fetch.push('\n');
            assert_eq!(remote.drive(repo.path(), &fetch), "\n");
        }

        for (oid, name) in &refs {
            run_git(repo.path(), &["update-ref", name, oid]);
        }
        if let Some(head) = head {
            run_git(repo.path(), &["symbolic-ref", "HEAD", &head]);
            run_git(repo.path(), &["reset", "-q", "--hard"]);
        }
        repo
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    git_output(dir, args);
}

fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend((0u16..4096).map(|i| (i.wrapping_mul(31) % 251) as u8));
    bytes.extend_from_slice(b"\r\n\0\x1a\n");
    bytes
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn binary_content_survives_push_and_clone() {
    let remote = Remote::new();
    let origin = TestRepo::new();
    origin.write("image.png", png_bytes());
    origin.write("docs/readme.md", "hello\r\nworld\n");
    let head = origin.commit_all("add image");

    assert_eq!(
        origin.push(&remote, &["refs/heads/main:refs/heads/main"]),
        "ok refs/heads/main\n\n"
    );

    let clone = TestRepo::clone_from(&remote);
    assert_eq!(clone.rev_parse("HEAD"), head);
    let image = std::fs::read(clone.file("image.png")).unwrap();
    assert_eq!(&image[..8], &PNG_MAGIC);
    assert_eq!(image, png_bytes());
    assert_eq!(
        std::fs::read(clone.file("docs/readme.md")).unwrap(),
        b"hello\r\nworld\n"
    );
}

#[test]
fn empty_remote_lists_nothing() {
    let remote = Remote::new();
    let repo = TestRepo::new();
    assert_eq!(remote.drive(repo.path(), "list\n\n"), "\n");
}

// =============================================================================
// Incrementality
// =============================================================================

#[test]
fn follow_up_push_uploads_only_new_objects() {
    let remote = Remote::new();
    let origin = TestRepo::new();
    for i in 0..10 {
        origin.write(&format!("file{i}.txt"), format!("content {i}\n"));
    }
    origin.commit_all("many files");
    origin.push(&remote, &["refs/heads/main:refs/heads/main"]);
    // Ten blobs, one tree, one commit
    assert_eq!(remote.object_count(), 12);

    origin.write("file3.txt", "changed\n");
    origin.commit_all("change one file");
    assert_eq!(
        origin.push(&remote, &["refs/heads/main:refs/heads/main"]),
        "ok refs/heads/main\n\n"
    );
    // New blob, new tree, new commit
    assert_eq!(remote.object_count(), 15);
}

// =============================================================================
// Fast-Forward Enforcement
// =============================================================================

#[test]
fn divergent_push_is_rejected_unless_forced() {
    let remote = Remote::new();
    let origin = TestRepo::new();
    origin.write("a.txt", "a\n");
    origin.commit_all("one");
    origin.write("a.txt", "b\n");
    let published = origin.commit_all("two");
    origin.push(&remote, &["refs/heads/main:refs/heads/main"]);

    run_git(origin.path(), &["reset", "-q", "--hard", "HEAD~1"]);
    origin.write("a.txt", "rewritten\n");
    let rewritten = origin.commit_all("rewrite");

    assert_eq!(
        origin.push(&remote, &["refs/heads/main:refs/heads/main"]),
        "error refs/heads/main non-fast-forward\n\n"
    );
    assert_eq!(remote.ref_value("refs/heads/main"), Some(published));

    assert_eq!(
        origin.push(&remote, &["+refs/heads/main:refs/heads/main"]),
        "ok refs/heads/main\n\n"
    );
    assert_eq!(remote.ref_value("refs/heads/main"), Some(rewritten.clone()));

    let clone = TestRepo::clone_from(&remote);
    assert_eq!(clone.rev_parse("HEAD"), rewritten);
}

#[test]
fn push_over_unknown_history_asks_for_fetch() {
    let remote = Remote::new();
    let alice = TestRepo::new();
    alice.write("a.txt", "a\n");
    alice.commit_all("alice");
    alice.push(&remote, &["refs/heads/main:refs/heads/main"]);

    let bob = TestRepo::new();
    bob.write("b.txt", "b\n");
    bob.commit_all("bob");
    assert_eq!(
        bob.push(&remote, &["refs/heads/main:refs/heads/main"]),
        "error refs/heads/main fetch first\n\n"
    );
}

// =============================================================================
// Deletion Fidelity
// =============================================================================

#[test]
fn file_deletion_and_modification_round_trip() {
    let remote = Remote::new();
    let origin = TestRepo::new();
    origin.write("keep.txt", "untouched\n");
    origin.write("drop.txt", "to be removed\n");
    origin.write("edit.txt", "before\n");
    origin.commit_all("initial");
    origin.push(&remote, &["refs/heads/main:refs/heads/main"]);

    std::fs::remove_file(origin.file("drop.txt")).unwrap();
    origin.write("edit.txt", "after\n");
    origin.commit_all("delete and edit");
    origin.push(&remote, &["refs/heads/main:refs/heads/main"]);

    let clone = TestRepo::clone_from(&remote);
    assert!(!clone.file("drop.txt").exists());
    assert_eq!(std::fs::read_to_string(clone.file("edit.txt")).unwrap(), "after\n");
    assert_eq!(
        std::fs::read_to_string(clone.file("keep.txt")).unwrap(),
        "untouched\n"
    );
}

// =============================================================================
// Branch Isolation
// =============================================================================

#[test]
fn branches_are_independent() {
    let remote = Remote::new();
    let origin = TestRepo::new();
    origin.write("a.txt", "a\n");
    let main = origin.commit_all("main");
    origin.push(&remote, &["refs/heads/main:refs/heads/main"]);

    run_git(origin.path(), &["checkout", "-q", "-b", "feature/x"]);
    origin.write("x.txt", "x\n");
    let feature = origin.commit_all("feature");
    assert_eq!(
        origin.push(&remote, &["refs/heads/feature/x:refs/heads/feature/x"]),
        "ok refs/heads/feature/x\n\n"
    );
    assert_eq!(remote.ref_value("refs/heads/main"), Some(main.clone()));
    assert_eq!(remote.ref_value("refs/heads/feature/x"), Some(feature));

    assert_eq!(
        origin.push(&remote, &[":refs/heads/feature/x"]),
        "ok refs/heads/feature/x\n\n"
    );
    assert_eq!(remote.ref_value("refs/heads/feature/x"), None);
    assert_eq!(remote.ref_value("refs/heads/main"), Some(main));
}

#[test]
fn default_branch_cannot_be_deleted() {
    let remote = Remote::new();
    let origin = TestRepo::new();
    origin.write("a.txt", "a\n");
    origin.commit_all("main");
    origin.push(&remote, &["refs/heads/main:refs/heads/main"]);

    assert_eq!(
        std::fs::read_to_string(remote.root().join("repo/HEAD")).unwrap(),
        "ref: refs/heads/main\n"
    );
    assert_eq!(
        origin.push(&remote, &[":refs/heads/main"]),
        "error refs/heads/main refusing to delete the current branch\n\n"
    );
}

#[test]
fn tags_round_trip() {
    let remote = Remote::new();
    let origin = TestRepo::new();
    origin.write("a.txt", "a\n");
    origin.commit_all("main");
    run_git(origin.path(), &["tag", "-a", "v1.0", "-m", "release"]);
    let tag = origin.rev_parse("refs/tags/v1.0");

    assert_eq!(
        origin.push(
            &remote,
            &["refs/heads/main:refs/heads/main", "refs/tags/v1.0:refs/tags/v1.0"]
        ),
        "ok refs/heads/main\nok refs/tags/v1.0\n\n"
    );

    let clone = TestRepo::clone_from(&remote);
    assert_eq!(clone.rev_parse("refs/tags/v1.0"), tag);
    let kind = git_output(clone.path(), &["cat-file", "-t", &tag]);
    assert_eq!(kind.trim(), "tag");
}

// =============================================================================
// Lock Mutual Exclusion
// =============================================================================

#[test]
fn concurrent_pushers_serialize() {
    let remote = Arc::new(Remote::new());
    let origin = TestRepo::new();
    origin.write("base.txt", "base\n");
    origin.commit_all("base");
    origin.push(&remote, &["refs/heads/main:refs/heads/main"]);

    let alice = TestRepo::clone_from(&remote);
    let bob = TestRepo::clone_from(&remote);
    for (repo, name) in [(&alice, "alice"), (&bob, "bob")] {
        repo.write(&format!("{name}.txt"), name);
        repo.commit_all(name);
    }

    let barrier = Arc::new(Barrier::new(2));
    let outcomes: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = [alice.path().to_path_buf(), bob.path().to_path_buf()]
            .into_iter()
            .map(|path| {
                let barrier = barrier.clone();
                let remote = remote.clone();
                scope.spawn(move || {
                    barrier.wait();
                    remote.drive(&path, "push refs/heads/main:refs/heads/main\n\n")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ok = outcomes
        .iter()
        .filter(|o| o.as_str() == "ok refs/heads/main\n\n")
        .count();
    assert_eq!(ok, 1, "outcomes: {outcomes:?}");
    assert!(outcomes
        .iter()
        .any(|o| o.starts_with("error refs/heads/main ")));

    let winner = remote.ref_value("refs/heads/main").unwrap();
    assert!(winner == alice.rev_parse("HEAD") || winner == bob.rev_parse("HEAD"));
    assert!(!remote.root().join("repo/refs/heads/main.lock").exists());
}
