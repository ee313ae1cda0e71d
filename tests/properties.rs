use std::collections::{BTreeMap, BTreeSet, HashSet};

use proptest::prelude::*;
use simfs::config::Config;
use simfs::fs::node::NodeId;
use simfs::fs::storage::AllocationStrategy;
use simfs::{execute, FileSystem};

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

fn path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(NAMES.to_vec()), 1..3)
        .prop_map(|parts| parts.join("/"))
}

fn command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        path_strategy().prop_map(|p| format!("mkdir {p}")),
        path_strategy().prop_map(|p| format!("touch {p}")),
        (path_strategy(), 1_usize..40)
            .prop_map(|(p, len)| format!("write {p} {}", "x".repeat(len))),
        (path_strategy(), any::<bool>()).prop_map(|(p, r)| {
            if r {
                format!("rm -r {p}")
            } else {
                format!("rm {p}")
            }
        }),
        (path_strategy(), path_strategy()).prop_map(|(a, b)| format!("mv {a} {b}")),
        path_strategy().prop_map(|p| format!("cd {p}")),
        Just("cd ..".to_owned()),
        Just("cd".to_owned()),
    ]
}

fn strategy_strategy() -> impl Strategy<Value = AllocationStrategy> {
    prop_oneof![
        Just(AllocationStrategy::Contiguous),
        Just(AllocationStrategy::Linked),
        Just(AllocationStrategy::Indexed),
    ]
}

fn check_invariants(fs: &FileSystem) -> Result<(), TestCaseError> {
    // Exactly one root, and it is a directory.
    let roots: Vec<_> = fs.nodes().filter(|n| n.parent.is_none()).collect();
    prop_assert_eq!(roots.len(), 1);
    prop_assert!(roots[0].is_directory());
    prop_assert_eq!(roots[0].id, fs.root());

    // Children exist, belong to one parent, and have unique names.
    let mut seen = HashSet::new();
    for node in fs.nodes() {
        if let Some(children) = node.children() {
            let mut names = HashSet::new();
            for child in children {
                let child_node = fs.node(*child);
                prop_assert!(child_node.is_some());
                let child_node = child_node.unwrap();
                prop_assert_eq!(child_node.parent, Some(node.id));
                prop_assert!(seen.insert(*child), "{} listed twice", child);
                prop_assert!(names.insert(child_node.name.clone()));
            }
        }
    }
    prop_assert_eq!(seen.len() + 1, fs.node_count());

    // Paths round-trip, which also proves every node reaches the root.
    for node in fs.nodes() {
        let path = fs.absolute_path(node.id).unwrap();
        prop_assert_eq!(fs.resolve_path(&path).unwrap().id, node.id);
    }

    // Every claimed block belongs to exactly the file that lists it.
    let mut claimed: BTreeMap<usize, NodeId> = BTreeMap::new();
    for node in fs.nodes() {
        if let Some(allocation) = node.allocation() {
            let size = node.content().unwrap().len();
            prop_assert_eq!(allocation.blocks.len(), fs.blocks_needed(size));
            for block in allocation.owned_blocks() {
                prop_assert!(
                    claimed.insert(block, node.id).is_none(),
                    "block {} shared",
                    block
                );
            }
        }
    }
    let owned: BTreeSet<usize> = fs
        .blocks()
        .filter(|b| !b.is_free())
        .map(|b| b.id)
        .collect();
    prop_assert_eq!(owned, claimed.keys().copied().collect::<BTreeSet<_>>());
    for (block, file) in &claimed {
        prop_assert_eq!(fs.block(*block).unwrap().file_id, Some(*file));
    }

    // The current directory is always a live directory.
    prop_assert!(fs.node(fs.current_directory()).is_some_and(|n| n.is_directory()));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn command_sequences_preserve_invariants(
        strategy in strategy_strategy(),
        commands in proptest::collection::vec(command_strategy(), 1..40),
    ) {
        let mut fs = FileSystem::new(&Config {
            block_size: 8,
            total_blocks: 24,
            allocation_strategy: strategy,
            ..Config::default()
        })
        .unwrap();
        for line in &commands {
            let before = fs.clone();
            let outcome = execute(&fs, line);
            check_invariants(&outcome.fs)?;
            // Earlier snapshots stay as they were.
            check_invariants(&before)?;
            fs = outcome.fs;
        }
    }

    #[test]
    fn contiguous_runs_never_overlap(sizes in proptest::collection::vec(1_usize..30, 1..12)) {
        let mut fs = FileSystem::with_geometry(8, 16).unwrap();
        let mut taken = BTreeSet::new();
        for (i, size) in sizes.iter().enumerate() {
            let name = format!("f{i}");
            match fs.create_file(fs.root(), &name, &"y".repeat(*size), "text/plain") {
                Ok(next) => {
                    let file = next.resolve_path(&name).unwrap();
                    let blocks = &file.allocation().unwrap().blocks;
                    prop_assert!(blocks.windows(2).all(|w| w[1] == w[0] + 1));
                    for block in blocks {
                        prop_assert!(taken.insert(*block));
                    }
                    fs = next;
                }
                Err(_) => {
                    let needed = fs.blocks_needed(*size);
                    prop_assert!(fs.allocate_contiguous(*size).is_none());
                    prop_assert!(needed > 0);
                }
            }
        }
    }
}
