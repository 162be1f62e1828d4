//! Property-based testing for snapvault
//!
//! Uses proptest to check hashing and diff invariants over generated file
//! lists, plus a storage round trip over generated project trees.

use ::snapvault::diff::compute_diff;
use ::snapvault::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

/// Generate relative paths like `dir3/file12.txt`
fn path_strategy() -> impl Strategy<Value = String> {
    let dirs = prop::collection::vec("[a-z]{1,6}", 0..=3);
    let filename = prop_oneof![
        "file[0-9]{1,3}\\.txt",
        "[a-z]{1,8}\\.(txt|rs|md)",
    ];
    (dirs, filename).prop_map(|(dirs, filename)| {
        let mut parts = dirs;
        parts.push(filename);
        parts.join("/")
    })
}

/// Map of unique paths to fake content hashes
fn file_map_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(path_strategy(), "[0-9a-f]{8}", 0..20)
}

fn entries(map: &BTreeMap<String, String>) -> Vec<FileEntry> {
    map.iter()
        .map(|(path, hash)| FileEntry::new(path.clone(), hash.clone(), 1, 0o644))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_content_hash_ignores_order(map in file_map_strategy(), seed in any::<u64>()) {
        let forward = entries(&map);
        let mut shuffled = forward.clone();
        if !shuffled.is_empty() {
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
        }
        prop_assert_eq!(
            utils::snapshot_content_hash(&forward),
            utils::snapshot_content_hash(&shuffled)
        );
    }

    #[test]
    fn prop_content_hash_sees_changed_hash(map in file_map_strategy()) {
        prop_assume!(!map.is_empty());
        let original = entries(&map);
        let mut changed = original.clone();
        changed[0].hash.push('0');
        prop_assert_ne!(
            utils::snapshot_content_hash(&original),
            utils::snapshot_content_hash(&changed)
        );
    }

    #[test]
    fn prop_diff_with_self_is_empty(map in file_map_strategy()) {
        let files = entries(&map);
        let diff = compute_diff(1, &files, 1, &files);
        prop_assert!(diff.is_empty());
        prop_assert_eq!(diff.significance_score, 0.0);
    }

    #[test]
    fn prop_diff_is_symmetric(left in file_map_strategy(), right in file_map_strategy()) {
        let a = entries(&left);
        let b = entries(&right);
        let forward = compute_diff(1, &a, 2, &b);
        let backward = compute_diff(2, &b, 1, &a);

        prop_assert_eq!(&forward.files_added, &backward.files_removed);
        prop_assert_eq!(&forward.files_removed, &backward.files_added);
        prop_assert_eq!(forward.files_modified.len(), backward.files_modified.len());
        prop_assert_eq!(forward.total_changes, backward.total_changes);
    }

    #[test]
    fn prop_filtered_diff_never_grows(
        left in file_map_strategy(),
        right in file_map_strategy(),
        prefix in "[a-z]{1,2}",
    ) {
        let diff = compute_diff(1, &entries(&left), 2, &entries(&right));
        let filtered = diff.filter_by_paths(&PathFilter::new([prefix]));
        prop_assert!(filtered.total_changes <= diff.total_changes);
        prop_assert!(filtered.significance_score <= 1.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_snapshot_restore_round_trip(
        files in prop::collection::btree_map(
            path_strategy(),
            prop::collection::vec(any::<u8>(), 0..512),
            1..10,
        ),
        compression in any::<bool>(),
    ) {
        // Generated paths may collide with a directory of another path
        let names: Vec<&String> = files.keys().collect();
        prop_assume!(!names.iter().any(|a| names.iter().any(|b| b.starts_with(&format!("{}/", a)))));

        let root = TempDir::new().unwrap();
        let storage = TempDir::new().unwrap();
        let vault = VaultBuilder::new()
            .compression_enabled(compression)
            .build(root.path().to_path_buf(), storage.path().to_path_buf())
            .unwrap();

        for (path, content) in &files {
            let full = root.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        vault.snapshot_working_tree(&SnapshotOptions::default()).unwrap();

        let target = TempDir::new().unwrap();
        let result = vault.restore_snapshot(1, Some(target.path()), false, None).unwrap();
        prop_assert_eq!(result.restored, files.len());

        for (path, content) in &files {
            prop_assert_eq!(&fs::read(target.path().join(path)).unwrap(), content);
        }
    }
}
