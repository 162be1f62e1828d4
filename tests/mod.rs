//! Main test module for snapvault
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::snapvault::*;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn create_vault() -> (Vault, TempDir, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();
        let vault = VaultBuilder::new()
            .build(
                temp_dir.path().to_path_buf(),
                storage_dir.path().to_path_buf(),
            )
            .unwrap();
        (vault, temp_dir, storage_dir)
    }

    #[test]
    fn test_empty_directory() {
        let (vault, temp_dir, _storage_dir) = create_vault();

        let empty = vault
            .snapshot_working_tree(&SnapshotOptions {
                message: Some("Empty".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(empty.metadata.files_count, 0);
        assert_eq!(empty.metadata.total_size, 0);

        fs::write(temp_dir.path().join("file.txt"), "content").unwrap();
        let diff = vault
            .diff_snapshots(empty.metadata.id, "current", None)
            .unwrap();
        assert_eq!(diff.files_added, vec!["file.txt"]);
        assert_eq!(diff.significance_score, 1.0);

        // Restoring an empty snapshot leaves existing files alone
        let result = vault
            .restore_snapshot(empty.metadata.id, None, true, None)
            .unwrap();
        assert_eq!(result.total, 0);
        assert!(temp_dir.path().join("file.txt").exists());
    }

    #[test]
    fn test_unicode_and_space_paths() {
        let (vault, temp_dir, _storage_dir) = create_vault();
        let names = ["héllo wörld.txt", "文件/数据.md", "with space/a b.txt"];
        for name in names {
            let path = temp_dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, name).unwrap();
        }

        vault.snapshot_working_tree(&SnapshotOptions::default()).unwrap();
        for name in names {
            assert_eq!(
                vault.get_file_content_at_version(1, name).unwrap().as_deref(),
                Some(name)
            );
        }
    }

    #[test]
    fn test_numeric_reference_is_an_id() {
        let (vault, temp_dir, _storage_dir) = create_vault();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        vault
            .snapshot_working_tree(&SnapshotOptions {
                tag: Some("2".to_string()),
                ..Default::default()
            })
            .unwrap();

        // "2" parses as an id, and no snapshot 2 exists
        assert!(vault.get_snapshot("2").unwrap().is_none());
        assert!(vault.get_snapshot("1").unwrap().is_some());
        assert!(vault
            .get_snapshot(Reference::ByTag("2".to_string()))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_missing_snapshot_errors() {
        let (vault, _temp_dir, _storage_dir) = create_vault();

        let err = vault.restore_snapshot("nope", None, false, None).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            vault.export_snapshot(42, std::path::Path::new("out"), false, None),
            Err(VaultError::SnapshotNotFound(_))
        ));
        assert!(matches!(
            vault.diff_snapshots("nope", "current", None),
            Err(VaultError::SnapshotNotFound(_))
        ));
        assert!(!vault.delete_snapshot("nope").unwrap());
    }

    #[test]
    fn test_gitignore_and_builder_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();
        let vault = VaultBuilder::new()
            .ignore_patterns(vec!["*.tmp".to_string()])
            .build(
                temp_dir.path().to_path_buf(),
                storage_dir.path().to_path_buf(),
            )
            .unwrap();

        fs::write(temp_dir.path().join(".gitignore"), "build/\n").unwrap();
        fs::create_dir_all(temp_dir.path().join("build")).unwrap();
        fs::write(temp_dir.path().join("build/out.o"), "obj").unwrap();
        fs::write(temp_dir.path().join("scratch.tmp"), "tmp").unwrap();
        fs::write(temp_dir.path().join("main.c"), "int main;").unwrap();

        let snapshot = vault.snapshot_working_tree(&SnapshotOptions::default()).unwrap();
        let paths: Vec<&str> = snapshot.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![".gitignore", "main.c"]);
    }

    #[test]
    fn test_gitignore_is_versioned_like_any_file() {
        let (vault, temp_dir, _storage_dir) = create_vault();
        let ignore_file = temp_dir.path().join(".gitignore");
        fs::write(&ignore_file, "*.log\n").unwrap();
        fs::write(temp_dir.path().join("app.py"), "print()").unwrap();
        let base = vault.snapshot_working_tree(&SnapshotOptions::default()).unwrap();

        fs::write(&ignore_file, "*.log\n*.tmp\n").unwrap();
        let diff = vault
            .diff_snapshots(base.metadata.id, "current", None)
            .unwrap();
        assert_eq!(diff.files_modified.len(), 1);
        assert_eq!(diff.files_modified[0].path, ".gitignore");

        fs::remove_file(&ignore_file).unwrap();
        let result = vault
            .restore_snapshot(base.metadata.id, None, false, None)
            .unwrap();
        assert_eq!(result.restored, 1);
        assert_eq!(fs::read_to_string(&ignore_file).unwrap(), "*.log\n");
    }

    #[test]
    fn test_max_file_size_skips_large_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();
        let vault = VaultBuilder::new()
            .max_file_size(10)
            .build(
                temp_dir.path().to_path_buf(),
                storage_dir.path().to_path_buf(),
            )
            .unwrap();

        fs::write(temp_dir.path().join("small.txt"), "tiny").unwrap();
        fs::write(temp_dir.path().join("large.txt"), "x".repeat(100)).unwrap();

        let snapshot = vault.snapshot_working_tree(&SnapshotOptions::default()).unwrap();
        assert!(snapshot.get_file("small.txt").is_some());
        assert!(snapshot.get_file("large.txt").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_restore_refuses_unsafe_paths() {
        let (vault, temp_dir, _storage_dir) = create_vault();
        fs::write(temp_dir.path().join("ok.txt"), "fine").unwrap();
        let ok = FileEntry::new("ok.txt", utils::hash_data(b"fine"), 4, 0o644);
        // Shares content with ok.txt, so the escaping path is never read
        let sneaky = FileEntry::new("sub/../../escape.txt", utils::hash_data(b"fine"), 4, 0o644);

        vault
            .create_snapshot(&[ok, sneaky], &SnapshotOptions::default())
            .unwrap();

        let target = TempDir::new().unwrap();
        let inner = target.path().join("inner");
        let result = vault.restore_snapshot(1, Some(&inner), false, None).unwrap();
        assert_eq!(result.restored, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].path, "sub/../../escape.txt");
        assert!(!target.path().join("escape.txt").exists());
    }

    #[traced_test]
    #[test]
    fn test_missing_blob_reads_as_none() {
        let (vault, temp_dir, _storage_dir) = create_vault();
        fs::write(temp_dir.path().join("a.txt"), "alpha").unwrap();
        let snapshot = vault.snapshot_working_tree(&SnapshotOptions::default()).unwrap();
        vault
            .blob_store()
            .delete(&snapshot.files[0].hash)
            .unwrap();

        assert_eq!(vault.get_file_content_at_version(1, "a.txt").unwrap(), None);
        assert_eq!(vault.get_file_bytes_at_version(1, "a.txt").unwrap(), None);
    }
}
