//! Integration tests for snapvault
//!
//! End-to-end scenarios through the public API: snapshot, read, restore,
//! export, diff, history, search and cleanup against real temp directories.

use ::snapvault::*;
use flate2::read::GzDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

/// Project + storage pair driven through the public API
pub struct VaultTestHarness {
    pub temp_dir: TempDir,
    pub storage_dir: TempDir,
    pub vault: Vault,
}

impl VaultTestHarness {
    /// Harness with default settings
    pub fn new() -> Self {
        Self::with_builder(VaultBuilder::new())
    }

    /// Harness with custom builder settings
    pub fn with_builder(builder: VaultBuilder) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();

        let vault = builder
            .build(
                temp_dir.path().to_path_buf(),
                storage_dir.path().to_path_buf(),
            )
            .unwrap();

        Self {
            temp_dir,
            storage_dir,
            vault,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file into the project
    pub fn write(&self, path: &str, content: impl AsRef<[u8]>) -> anyhow::Result<()> {
        let full = self.root().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)?;
        Ok(())
    }

    pub fn read(&self, path: &str) -> anyhow::Result<String> {
        Ok(fs::read_to_string(self.root().join(path))?)
    }

    /// Snapshot the working tree with a tag
    pub fn snapshot(&self, tag: &str) -> anyhow::Result<Snapshot> {
        Ok(self.vault.snapshot_working_tree(&SnapshotOptions {
            tag: Some(tag.to_string()),
            ..Default::default()
        })?)
    }

    /// Entry for a project file, hashed the way the scanner does it
    pub fn entry(&self, path: &str) -> anyhow::Result<FileEntry> {
        let full = self.root().join(path);
        let meta = utils::get_file_metadata(&full)?;
        Ok(FileEntry::new(
            path,
            utils::hash_file_content(&full)?,
            meta.size,
            meta.mode,
        ))
    }
}

/// Deterministic content generator
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn text(&mut self, lines: usize) -> String {
        (0..lines)
            .map(|i| format!("line {} value {}\n", i, self.rng.random_range(0..10_000)))
            .collect()
    }

    pub fn bytes(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.rng.random()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_files_scenario() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("README.md", "# Test Project")?;
        h.write("src/main.py", "print('hello')")?;
        h.snapshot("v1")?;

        let files = h.vault.list_files_at_version("v1", None)?;
        let listed: Vec<(&str, u64)> = files.iter().map(|f| (f.path.as_str(), f.size)).collect();
        assert_eq!(listed, vec![("README.md", 14), ("src/main.py", 14)]);

        let python = h.vault.list_files_at_version("v1", Some("*.py"))?;
        assert_eq!(python.len(), 1);
        assert_eq!(python[0].path, "src/main.py");
        Ok(())
    }

    #[test]
    fn test_modified_file_scenario() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("file1.txt", "v1")?;
        let a = h.snapshot("a")?;
        h.write("file1.txt", "v2")?;
        let b = h.snapshot("b")?;

        let diff = h.vault.diff_snapshots(a.metadata.id, b.metadata.id, None)?;
        assert_eq!(
            diff.files_modified,
            vec![ModifiedFile {
                path: "file1.txt".to_string(),
                old_hash: utils::hash_data(b"v1"),
                new_hash: utils::hash_data(b"v2"),
            }]
        );
        assert!(diff.files_added.is_empty());
        assert!(diff.files_removed.is_empty());
        assert_eq!(diff.total_changes, 1);
        assert_eq!(diff.from_snapshot, a.metadata.id);
        assert_eq!(diff.to_snapshot, b.metadata.id);
        Ok(())
    }

    #[test]
    fn test_partial_restore_scenario() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("file1.txt", "v1")?;
        h.write("file2.txt", "first")?;
        h.snapshot("a")?;

        h.write("file1.txt", "v2")?;
        h.write("file2.txt", "second")?;
        h.snapshot("b")?;

        let filters = vec!["file1.txt".to_string()];
        let result = h
            .vault
            .restore_snapshot("a", None, true, Some(filters.as_slice()))?;
        assert_eq!(result.total, 1);
        assert_eq!(result.restored, 1);
        assert_eq!(result.files_restored, vec!["file1.txt"]);

        assert_eq!(h.read("file1.txt")?, "v1");
        assert_eq!(h.read("file2.txt")?, "second");
        Ok(())
    }

    #[test]
    fn test_orphan_sweep_scenario() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("only.txt", "unique to a")?;
        let a = h.snapshot("a")?;

        fs::remove_file(h.root().join("only.txt"))?;
        h.write("other.txt", "in b")?;
        h.snapshot("b")?;

        let before = h.vault.stats()?.blob_count;
        assert!(h.vault.delete_snapshot(a.metadata.id)?);
        assert_eq!(h.vault.stats()?.blob_count, before);

        assert_eq!(h.vault.cleanup_orphaned_contents()?, 1);
        assert_eq!(h.vault.stats()?.blob_count, before - 1);
        assert!(h.vault.get_snapshot(a.metadata.id)?.is_none());
        assert_eq!(h.vault.get_file_content_at_version("b", "other.txt")?.as_deref(), Some("in b"));
        Ok(())
    }

    #[test]
    fn test_deduplication_across_snapshots() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("shared.txt", "same content")?;
        h.write("copy.txt", "same content")?;
        let first = h.snapshot("one")?;
        assert_eq!(h.vault.stats()?.blob_count, 1);
        assert!(first.metadata.compressed_size > 0);

        h.write("new.txt", "different")?;
        let second = h.snapshot("two")?;
        assert_eq!(h.vault.stats()?.blob_count, 2);

        let shared_hash = utils::hash_data(b"same content");
        assert_eq!(first.get_file("shared.txt").unwrap().hash, shared_hash);
        assert_eq!(second.get_file("copy.txt").unwrap().hash, shared_hash);
        Ok(())
    }

    #[test]
    fn test_idempotent_creation() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("a.txt", "alpha")?;
        h.write("b/c.txt", "charlie")?;
        let entries = vec![h.entry("b/c.txt")?, h.entry("a.txt")?];

        let first = h.vault.create_snapshot(&entries, &SnapshotOptions::default())?;
        let blobs = h.vault.stats()?.blob_count;
        let second = h.vault.create_snapshot(&entries, &SnapshotOptions::default())?;

        assert_ne!(first.metadata.id, second.metadata.id);
        assert_eq!(first.metadata.content_hash, second.metadata.content_hash);
        assert_eq!(first.files, second.files);
        assert_eq!(h.vault.stats()?.blob_count, blobs);
        assert_eq!(second.metadata.compressed_size, 0);
        Ok(())
    }

    #[test]
    fn test_duplicate_tags_resolve_to_newest() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("a.txt", "first")?;
        let older = h.snapshot("release")?;
        h.write("a.txt", "second")?;
        let newer = h.snapshot("release")?;

        let resolved = h.vault.get_snapshot("release")?.unwrap();
        assert_eq!(resolved.metadata.id, newer.metadata.id);
        assert_eq!(
            h.vault.get_file_content_at_version("release", "a.txt")?.as_deref(),
            Some("second")
        );

        // Older snapshot stays reachable by id
        assert_eq!(
            h.vault
                .get_file_content_at_version(older.metadata.id, "a.txt")?
                .as_deref(),
            Some("first")
        );
        Ok(())
    }

    #[cfg(unix)]
    fn round_trip(compression: bool) -> anyhow::Result<()> {
        let h = VaultTestHarness::with_builder(VaultBuilder::new().compression_enabled(compression));
        let mut generator = FileGenerator::new(42);

        let mut originals = BTreeMap::new();
        for i in 0..8 {
            let path = format!("dir{}/file{}.txt", i % 3, i);
            let content = generator.text(50 + i * 10).into_bytes();
            h.write(&path, &content)?;
            originals.insert(path, content);
        }
        let binary = generator.bytes(4096);
        h.write("data.bin", &binary)?;
        originals.insert("data.bin".to_string(), binary);

        h.write("run.sh", "#!/bin/sh\necho hi\n")?;
        utils::set_permissions(&h.root().join("run.sh"), 0o755)?;
        originals.insert("run.sh".to_string(), b"#!/bin/sh\necho hi\n".to_vec());

        let snapshot = h.snapshot("rt")?;
        assert_eq!(snapshot.files.len(), originals.len());

        let target = TempDir::new()?;
        let result = h.vault.restore_snapshot("rt", Some(target.path()), false, None)?;
        assert!(result.is_complete());
        assert_eq!(result.restored, originals.len());

        for (path, content) in &originals {
            assert_eq!(&fs::read(target.path().join(path))?, content, "{}", path);
        }
        let mode = utils::get_file_metadata(&target.path().join("run.sh"))?.mode;
        assert_eq!(mode, 0o755);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_round_trip_compressed() -> anyhow::Result<()> {
        round_trip(true)
    }

    #[cfg(unix)]
    #[test]
    fn test_round_trip_uncompressed() -> anyhow::Result<()> {
        round_trip(false)
    }

    #[test]
    fn test_uncompressed_zst_file_restores_byte_for_byte() -> anyhow::Result<()> {
        let h = VaultTestHarness::with_builder(VaultBuilder::new().compression_enabled(false));
        let zst = zstd::encode_all(&b"inner payload"[..], 3)?;
        h.write("data.zst", &zst)?;
        h.write("plain.txt", "kept raw")?;
        let snapshot = h.snapshot("zst")?;

        let plain = &snapshot.get_file("plain.txt").unwrap().hash;
        assert_eq!(h.vault.blob_store().get(plain)?.unwrap(), b"kept raw");

        let target = TempDir::new()?;
        let result = h
            .vault
            .restore_snapshot("zst", Some(target.path()), false, None)?;
        assert_eq!(result.restored, 2);
        assert_eq!(fs::read(target.path().join("data.zst"))?, zst);
        assert_eq!(
            h.vault.get_file_bytes_at_version("zst", "data.zst")?,
            Some(zst)
        );
        Ok(())
    }

    #[test]
    fn test_uncompressed_blobs_are_raw() -> anyhow::Result<()> {
        let h = VaultTestHarness::with_builder(VaultBuilder::new().compression_enabled(false));
        let content = "repetitive ".repeat(200);
        h.write("big.txt", &content)?;
        let snapshot = h.snapshot("raw")?;

        let hash = &snapshot.get_file("big.txt").unwrap().hash;
        let stored = h.vault.blob_store().get(hash)?.unwrap();
        assert_eq!(stored, content.as_bytes());
        assert_eq!(snapshot.metadata.compressed_size, content.len() as u64);
        Ok(())
    }

    #[test]
    fn test_export_folder() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("src/lib.rs", "pub fn f() {}")?;
        h.write("docs/guide.md", "# Guide")?;
        h.snapshot("v1")?;

        let out = TempDir::new()?;
        let dest = out.path().join("export");
        let filters = vec!["src/".to_string()];
        let result = h
            .vault
            .export_snapshot("v1", &dest, false, Some(filters.as_slice()))?;

        assert_eq!(result.format, ExportFormat::Folder);
        assert_eq!(result.snapshot, "v1");
        assert_eq!(result.files_exported, vec!["src/lib.rs"]);
        assert_eq!(fs::read_to_string(dest.join("src/lib.rs"))?, "pub fn f() {}");
        assert!(!dest.join("docs").exists());
        assert_eq!(result.archive_size, None);
        Ok(())
    }

    #[test]
    fn test_export_archive() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("README.md", "# Test Project")?;
        h.write("src/main.py", "print('hello')")?;
        let snapshot = h.snapshot("v1")?;

        let out = TempDir::new()?;
        let result = h.vault.export_snapshot("v1", &out.path().join("bundle"), true, None)?;

        assert_eq!(result.format, ExportFormat::TarGz);
        assert_eq!(result.output_path, out.path().join("bundle.tar.gz"));
        assert_eq!(result.exported_count(), 2);
        assert_eq!(result.archive_size, Some(fs::metadata(&result.output_path)?.len()));

        let mut archive = tar::Archive::new(GzDecoder::new(fs::File::open(&result.output_path)?));
        let mut contents = BTreeMap::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let mode = entry.header().mode()?;
            let mtime = entry.header().mtime()?;
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            contents.insert(path, (text, mode, mtime));
        }

        let expected_mtime = snapshot.metadata.created_at.timestamp() as u64;
        let readme = &contents["README.md"];
        assert_eq!(readme.0, "# Test Project");
        assert_eq!(readme.1, snapshot.get_file("README.md").unwrap().mode);
        assert_eq!(readme.2, expected_mtime);
        assert_eq!(contents["src/main.py"].0, "print('hello')");
        Ok(())
    }

    #[test]
    fn test_export_reports_missing_blob() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("a.txt", "alpha")?;
        h.write("b.txt", "bravo")?;
        let snapshot = h.snapshot("v1")?;
        h.vault
            .blob_store()
            .delete(&snapshot.get_file("b.txt").unwrap().hash)?;

        let out = TempDir::new()?;
        let result = h.vault.export_snapshot("v1", &out.path().join("x.tar.gz"), true, None)?;
        assert_eq!(result.files_exported, vec!["a.txt"]);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.failures[0].path, "b.txt");
        Ok(())
    }

    #[test]
    fn test_diff_filters_and_working_tree() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("src/a.rs", "a")?;
        h.write("docs/readme.md", "docs")?;
        h.snapshot("base")?;

        h.write("src/a.rs", "a2")?;
        h.write("src/b.rs", "b")?;
        fs::remove_file(h.root().join("docs/readme.md"))?;

        let full = h.vault.diff_snapshots("base", DiffTarget::WorkingTree, None)?;
        assert_eq!(full.total_changes, 3);
        assert_eq!(full.to_snapshot, 0);
        assert_eq!(full.files_removed, vec!["docs/readme.md"]);

        let filters = vec!["*.rs".to_string()];
        let filtered = h
            .vault
            .diff_snapshots("base", "current", Some(filters.as_slice()))?;
        assert_eq!(filtered.total_changes, 2);
        assert!(filtered.files_removed.is_empty());
        assert!((filtered.significance_score - 2.0 / 3.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_changelog_between_snapshots() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("keep.txt", "k")?;
        h.write("old.txt", "o")?;
        h.snapshot("v1")?;
        fs::remove_file(h.root().join("old.txt"))?;
        h.write("new.txt", "n")?;
        h.snapshot("v2")?;

        let log = h.vault.generate_changelog("v1", Reference::from("v2"))?;
        assert!(log.starts_with("# Changelog: v1 -> v2"));
        assert!(log.contains("## Added\n\n- `new.txt`"));
        assert!(log.contains("## Removed\n\n- `old.txt`"));
        assert!(!log.contains("## Changed"));
        Ok(())
    }

    #[test]
    fn test_file_history_tracks_changes_and_removal() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("anchor.txt", "x")?;
        h.write("notes.txt", "one")?;
        h.snapshot("s1")?;
        h.write("notes.txt", "two")?;
        h.snapshot("s2")?;
        fs::remove_file(h.root().join("notes.txt"))?;
        h.snapshot("s3")?;
        h.write("notes.txt", "three")?;
        h.snapshot("s4")?;

        let history = h.vault.get_file_history("notes.txt")?;
        let flags: Vec<(bool, bool, bool)> = history
            .iter()
            .map(|r| (r.first_seen, r.changed, r.removed))
            .collect();
        assert_eq!(
            flags,
            vec![
                (true, false, false),
                (false, true, false),
                (false, false, true),
                (false, true, false),
            ]
        );
        assert_eq!(history[2].hash, None);
        assert_eq!(history[3].tag.as_deref(), Some("s4"));
        Ok(())
    }

    #[test]
    fn test_search_scoped_to_snapshot_and_filter() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("src/app.py", "TODO: fix\n")?;
        h.write("notes.md", "todo list\n")?;
        h.snapshot("v1")?;
        h.write("src/app.py", "done\n")?;
        h.snapshot("v2")?;

        let all = h.vault.search_in_snapshots("todo", &SearchOptions::default())?;
        assert_eq!(all.len(), 2);

        let scoped = h.vault.search_in_snapshots(
            "todo",
            &SearchOptions {
                snapshot: Some(Reference::from("v2")),
                ..Default::default()
            },
        )?;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].path, "notes.md");

        let python = h.vault.search_in_snapshots(
            "todo",
            &SearchOptions {
                file_filter: Some("*.py".to_string()),
                ..Default::default()
            },
        )?;
        assert_eq!(python.len(), 1);
        assert_eq!(python[0].snapshot_tag.as_deref(), Some("v1"));
        assert_eq!(python[0].matches[0].line, "TODO: fix");

        assert!(matches!(
            h.vault.search_in_snapshots(
                "todo",
                &SearchOptions {
                    snapshot: Some(Reference::from("missing")),
                    ..Default::default()
                },
            ),
            Err(VaultError::SnapshotNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_search_result_cap() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        for i in 0..60 {
            h.write(&format!("f{:02}.txt", i), format!("needle {}\n", i))?;
        }
        h.snapshot("many")?;

        let results = h.vault.search_in_snapshots("needle", &SearchOptions::default())?;
        assert_eq!(results.len(), vault::MAX_SEARCH_RESULTS);
        Ok(())
    }

    #[test]
    fn test_autosave_cleanup_keeps_manual() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("a.txt", "a")?;
        let manual = h.snapshot("manual")?;
        for i in 0..5 {
            h.write("a.txt", format!("auto {}", i))?;
            h.vault
                .snapshot_working_tree(&SnapshotOptions::autosave(TRIGGER_AUTOSAVE))?;
        }

        assert_eq!(h.vault.cleanup_old_autosaves(2)?, 3);
        let remaining = h.vault.list_snapshots(None, true)?;
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().any(|s| s.metadata.id == manual.metadata.id));
        assert_eq!(
            remaining.iter().filter(|s| s.metadata.is_autosave).count(),
            2
        );

        // Nothing is old enough to expire
        assert_eq!(h.vault.cleanup_expired_autosaves(1)?, 0);

        let orphans = h.vault.cleanup_orphaned_contents()?;
        assert_eq!(orphans, 3);
        Ok(())
    }

    #[test]
    fn test_reopen_preserves_history() -> anyhow::Result<()> {
        let h = VaultTestHarness::new();
        h.write("a.txt", "persist me")?;
        h.snapshot("v1")?;

        let reopened = Vault::open(
            h.temp_dir.path().to_path_buf(),
            h.storage_dir.path().to_path_buf(),
        )?;
        assert_eq!(
            reopened.get_file_content_at_version("v1", "a.txt")?.as_deref(),
            Some("persist me")
        );
        assert_eq!(reopened.list_snapshots(None, true)?.len(), 1);
        Ok(())
    }
}
