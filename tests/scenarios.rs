use simfs::config::{Config, UserSpec};
use simfs::fs::storage::AllocationStrategy;
use simfs::{execute, FileSystem, FsError, Session};

fn small_disk() -> FileSystem {
    FileSystem::with_geometry(10, 5).unwrap()
}

#[test]
fn contiguous_allocation_is_first_fit() {
    let fs = small_disk();
    let root = fs.root();
    let fs = fs.create_file(root, "a.txt", "12345", "text/plain").unwrap();
    let fs = fs
        .create_file(root, "b.txt", "abcdefghij1", "text/plain")
        .unwrap();

    let a = fs.resolve_path("/a.txt").unwrap();
    let b = fs.resolve_path("/b.txt").unwrap();
    assert_eq!(a.allocation().unwrap().blocks, vec![0]);
    assert_eq!(b.allocation().unwrap().blocks, vec![1, 2]);
    assert_eq!(a.allocation().unwrap().strategy, AllocationStrategy::Contiguous);
    assert_eq!(fs.block(0).unwrap().content, b"12345");
    assert_eq!(fs.block(3).unwrap().file_id, None);
}

#[test]
fn non_recursive_rm_refuses_populated_directory() {
    let mut session = Session::new(small_disk());
    assert_eq!(session.submit("mkdir x"), "");
    assert_eq!(session.submit("write x/f some text"), "");
    assert_eq!(session.fs().usage().used, 1);

    assert_eq!(session.submit("rm x"), "rm: x: Directory not empty");
    assert!(session.fs().resolve_path("/x/f").is_ok());

    assert_eq!(session.submit("rm -r x"), "");
    assert_eq!(
        session.fs().resolve_path("/x").unwrap_err(),
        FsError::NotFound
    );
    assert_eq!(session.fs().usage().used, 0);
}

#[test]
fn cd_needs_execute_permission() {
    let fs = FileSystem::new(&Config {
        users: vec![UserSpec {
            username: "guest".into(),
            admin: false,
        }],
        ..Config::default()
    })
    .unwrap();
    let mut session = Session::new(fs);
    session.submit("mkdir a");
    session.submit("su guest");
    assert_eq!(session.submit("cd a"), "cd: Permission denied");
    assert_eq!(session.submit("pwd"), "/");
}

#[test]
fn mkdir_targets_current_directory() {
    let mut session = Session::new(small_disk());
    session.submit("mkdir sub");
    session.submit("cd sub");
    session.submit("mkdir inner");
    assert!(session.fs().resolve_path("/sub/inner").is_ok());
    assert_eq!(
        session.fs().resolve_path("/inner").unwrap_err(),
        FsError::NotFound
    );

    // A path operand lands in the named directory, as `touch x/f` does.
    session.submit("cd /");
    assert_eq!(session.submit("mkdir sub/deeper"), "");
    assert!(session.fs().resolve_path("/sub/deeper").is_ok());
    assert_eq!(session.submit("ls sub"), session.submit("ls /sub"));
    assert!(session.submit("ls sub").contains("deeper/"));
    assert_eq!(
        session.fs().resolve_path("/deeper").unwrap_err(),
        FsError::NotFound
    );
}

#[test]
fn directory_cannot_move_below_itself() {
    let fs = small_disk();
    let fs = fs.create_directory(fs.root(), "dir_a").unwrap();
    let dir_a = fs.resolve_path("/dir_a").unwrap().id;
    let fs = fs.create_directory(dir_a, "child").unwrap();
    let child = fs.resolve_path("/dir_a/child").unwrap().id;

    assert_eq!(fs.move_node(dir_a, child).unwrap_err(), FsError::InvalidMove);
}

#[test]
fn freed_blocks_are_reused() {
    let fs = small_disk();
    let root = fs.root();
    let fs = fs.create_file(root, "a", "0123456789", "text/plain").unwrap();
    let fs = fs.create_file(root, "b", "0123456789xyz", "text/plain").unwrap();
    let before = fs.resolve_path("/b").unwrap().allocation().unwrap().clone();

    let fs = fs.remove_node("/b", false).unwrap();
    let fs = fs.create_file(root, "b", "0123456789xyz", "text/plain").unwrap();
    let after = fs.resolve_path("/b").unwrap().allocation().unwrap().clone();
    assert_eq!(before.blocks, after.blocks);
}

#[test]
fn failed_command_returns_the_same_snapshot() {
    let fs = small_disk();
    for line in ["cat nothing", "cd nowhere", "rm", "bogus", "mv a b"] {
        let outcome = execute(&fs, line);
        assert!(!outcome.output.is_empty(), "{line}");
        assert!(outcome.fs.shares_state_with(&fs), "{line}");
    }
}

#[test]
fn old_snapshots_are_never_mutated() {
    let v0 = small_disk();
    let v1 = execute(&v0, "mkdir a").fs;
    let v2 = execute(&v1, "write a/f hello").fs;
    let v3 = execute(&v2, "rm -r a").fs;

    assert_eq!(v0.node_count(), 1);
    assert_eq!(v1.node_count(), 2);
    assert_eq!(v2.node_count(), 3);
    assert_eq!(v3.node_count(), 1);
    assert_eq!(v2.usage().used, 1);
    assert_eq!(v2.resolve_path("/a/f").unwrap().content(), Some("hello"));
}

#[test]
fn linked_strategy_end_to_end() {
    let fs = FileSystem::new(&Config {
        block_size: 4,
        total_blocks: 4,
        allocation_strategy: AllocationStrategy::Linked,
        ..Config::default()
    })
    .unwrap();
    let mut session = Session::new(fs);
    session.submit("write a 1234");
    session.submit("write b 5678");
    session.submit("rm a");
    assert_eq!(session.submit("write c 12345678"), "");
    assert_eq!(session.submit("cat c"), "12345678");
    let c = session.fs().resolve_path("/c").unwrap();
    assert_eq!(c.allocation().unwrap().blocks, vec![0, 2]);
    assert_eq!(session.submit("write d 123456789"), "write: Not enough disk space");
}

#[test]
fn snapshot_serializes_to_json() {
    let fs = small_disk();
    let fs = execute(&fs, "write note hi").fs;
    let json = serde_json::to_value(&fs).unwrap();
    assert_eq!(json["block_size"], 10);
    assert_eq!(json["allocation_strategy"], "contiguous");
    assert_eq!(json["blocks"].as_array().unwrap().len(), 5);
}
