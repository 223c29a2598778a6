//! Migration of flat store rank entries into the record sink
//!
//! The flat store holds experience and level as separate keys per user
//! (`<id>.xp`, `<id>.level`). A run:
//!
//! 1. makes sure the sink schema exists
//! 2. reassembles one [`UserRecord`] per id, skipping incomplete ids
//! 3. optionally clears existing users
//! 4. writes each user in its own transaction
//! 5. deletes the source file unless a write failed

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::flat::{FILE_EXTENSION, FlatStore, Scalar};
use crate::record::{Attribute, CompoundKey, UserRecord};
use crate::storage::{RecordSink, SinkTransaction};
use crate::{Error, Result};

/// Validate a source file argument and strip its extension.
///
/// The result is the store name accepted by [`FlatStore::open`].
pub fn source_store_name(source: &Path) -> Result<PathBuf> {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext == FILE_EXTENSION => Ok(source.with_extension("")),
        _ => Err(Error::InvalidArgument(format!(
            "source file must end in .{} (got {})",
            FILE_EXTENSION,
            source.display()
        ))),
    }
}

/// Why an id produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingLevel,
    MissingExperience,
    NotAnInteger(Attribute),
    LevelOutOfRange,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingLevel => write!(f, "no level entry"),
            SkipReason::MissingExperience => write!(f, "no xp entry"),
            SkipReason::NotAnInteger(attribute) => write!(f, "{} is not an integer", attribute),
            SkipReason::LevelOutOfRange => write!(f, "level does not fit in 32 bits"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedUser {
    pub id: i64,
    pub reason: SkipReason,
}

/// Result of scanning a flat store
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectedRecords {
    /// Complete users, ordered by id
    pub records: Vec<UserRecord>,
    pub skipped: Vec<SkippedUser>,
}

/// Group compound keys by id and assemble complete users.
pub fn collect_records(entries: &BTreeMap<String, Scalar>) -> CollectedRecords {
    let mut attributes: BTreeMap<i64, BTreeMap<Attribute, &Scalar>> = BTreeMap::new();

    for (key, value) in entries {
        match CompoundKey::parse(key) {
            Some(ck) => {
                attributes.entry(ck.id).or_default().insert(ck.attribute, value);
            }
            None => tracing::debug!("Ignoring key {}", key),
        }
    }

    let mut collected = CollectedRecords::default();
    for (id, attrs) in attributes {
        match assemble(id, &attrs) {
            Ok(record) => collected.records.push(record),
            Err(reason) => {
                tracing::warn!("User {} could not be loaded: {}", id, reason);
                collected.skipped.push(SkippedUser { id, reason });
            }
        }
    }
    collected
}

fn assemble(
    id: i64,
    attrs: &BTreeMap<Attribute, &Scalar>,
) -> std::result::Result<UserRecord, SkipReason> {
    let experience =
        integer_attribute(attrs, Attribute::Xp)?.ok_or(SkipReason::MissingExperience)?;
    let level =
        integer_attribute(attrs, Attribute::Level)?.ok_or(SkipReason::MissingLevel)?;
    let level = i32::try_from(level).map_err(|_| SkipReason::LevelOutOfRange)?;
    Ok(UserRecord::new(id, experience, level))
}

fn integer_attribute(
    attrs: &BTreeMap<Attribute, &Scalar>,
    attribute: Attribute,
) -> std::result::Result<Option<i64>, SkipReason> {
    match attrs.get(&attribute) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .map(Some)
            .ok_or(SkipReason::NotAnInteger(attribute)),
    }
}

/// Options for a migration run
#[derive(Debug, Clone, Copy)]
pub struct MigrateOptions {
    /// Delete all users in the sink before writing
    pub clear_existing: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self { clear_existing: true }
    }
}

/// Summary of a migration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub source: PathBuf,
    pub migrated: usize,
    pub skipped: Vec<SkippedUser>,
    pub failed: Vec<i64>,
    pub cleared: usize,
    pub source_deleted: bool,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Migration Report:")?;
        writeln!(f, "  Source: {}", self.source.display())?;
        writeln!(f, "  Migrated: {}", self.migrated)?;
        writeln!(f, "  Skipped: {}", self.skipped.len())?;
        writeln!(f, "  Failed: {}", self.failed.len())?;
        writeln!(f, "  Cleared: {}", self.cleared)?;
        writeln!(f, "  Source deleted: {}", self.source_deleted)
    }
}

/// Moves users from a flat store into a [`RecordSink`]
pub struct Migrator<S: RecordSink> {
    sink: S,
    options: MigrateOptions,
}

impl<S: RecordSink> Migrator<S> {
    pub fn new(sink: S, options: MigrateOptions) -> Self {
        Self { sink, options }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Migrate the flat store at `source` (a `.toml` path).
    pub fn run(&mut self, source: &Path) -> Result<MigrationReport> {
        let name = source_store_name(source)?;

        self.sink.ensure_schema()?;

        // An unreadable source must fail before any user is cleared
        let store = FlatStore::load(&name)?;
        let collected = collect_records(&store.entries());
        tracing::info!(
            "Loaded {} users from {} ({} skipped)",
            collected.records.len(),
            store.path().display(),
            collected.skipped.len()
        );

        let mut report = MigrationReport {
            source: store.path().to_path_buf(),
            skipped: collected.skipped,
            ..Default::default()
        };

        if self.options.clear_existing {
            report.cleared = self.sink.clear_users()?;
            tracing::info!("Removed {} existing users", report.cleared);
        }

        for user in &collected.records {
            match self.write_user(user) {
                Ok(()) => {
                    tracing::info!("Created {}", user);
                    report.migrated += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to create user {}: {}", user.id, e);
                    report.failed.push(user.id);
                }
            }
        }

        if report.failed.is_empty() {
            // Users are committed at this point, keep the report
            report.source_deleted = store.delete().is_ok();
        } else {
            tracing::warn!(
                "{} users failed, keeping {} for another run",
                report.failed.len(),
                store.path().display()
            );
        }

        Ok(report)
    }

    fn write_user(&mut self, user: &UserRecord) -> Result<()> {
        let mut tx = self.sink.begin()?;
        tx.create_user(user)?;
        tx.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteSink;
    use std::fs;
    use tempfile::TempDir;

    fn entries(lines: &[(&str, Scalar)]) -> BTreeMap<String, Scalar> {
        lines.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn migrator() -> Migrator<SqliteSink> {
        Migrator::new(SqliteSink::open_in_memory().unwrap(), MigrateOptions::default())
    }

    fn write_source(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("ranks.toml");
        fs::write(&path, content).unwrap();
        path
    }

    /// In-memory sink that counts calls and can be told to fail
    #[derive(Default)]
    struct RecordingSink {
        users: Vec<UserRecord>,
        ensure_schema_calls: usize,
        clear_calls: usize,
        begin_calls: usize,
        rejected_ids: Vec<i64>,
        after_commit: Option<Box<dyn FnMut()>>,
    }

    impl RecordingSink {
        fn calls(&self) -> (usize, usize, usize) {
            (self.ensure_schema_calls, self.clear_calls, self.begin_calls)
        }
    }

    struct RecordingTransaction<'a> {
        sink: &'a mut RecordingSink,
        pending: Vec<UserRecord>,
    }

    impl RecordSink for RecordingSink {
        type Transaction<'a>
            = RecordingTransaction<'a>
        where
            Self: 'a;

        fn ensure_schema(&mut self) -> Result<()> {
            self.ensure_schema_calls += 1;
            Ok(())
        }

        fn clear_users(&mut self) -> Result<usize> {
            self.clear_calls += 1;
            Ok(std::mem::take(&mut self.users).len())
        }

        fn begin(&mut self) -> Result<RecordingTransaction<'_>> {
            self.begin_calls += 1;
            Ok(RecordingTransaction {
                sink: self,
                pending: Vec::new(),
            })
        }
    }

    impl SinkTransaction for RecordingTransaction<'_> {
        fn create_user(&mut self, user: &UserRecord) -> Result<()> {
            if self.sink.rejected_ids.contains(&user.id) {
                return Err(Error::InvalidEntry(format!("user {} rejected", user.id)));
            }
            self.pending.push(*user);
            Ok(())
        }

        fn commit(self) -> Result<()> {
            self.sink.users.extend(self.pending);
            if let Some(hook) = self.sink.after_commit.as_mut() {
                hook();
            }
            Ok(())
        }
    }

    #[test]
    fn test_source_store_name() {
        assert_eq!(
            source_store_name(Path::new("data/ranks.toml")).unwrap(),
            PathBuf::from("data/ranks")
        );
        assert_eq!(
            source_store_name(Path::new("a.b.toml")).unwrap(),
            PathBuf::from("a.b")
        );
        for bad in ["ranks.json", "ranks", ".toml"] {
            assert!(matches!(
                source_store_name(Path::new(bad)),
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_collect_pairs_attributes() {
        let collected = collect_records(&entries(&[
            ("5.xp", Scalar::Integer(100)),
            ("5.level", Scalar::Integer(3)),
            ("motd", Scalar::Text("hi".into())),
        ]));

        assert_eq!(collected.records, vec![UserRecord::new(5, 100, 3)]);
        assert!(collected.skipped.is_empty());
    }

    #[test]
    fn test_collect_skips_incomplete() {
        let collected = collect_records(&entries(&[
            ("9.xp", Scalar::Integer(50)),
            ("4.level", Scalar::Integer(2)),
        ]));

        assert!(collected.records.is_empty());
        assert_eq!(
            collected.skipped,
            vec![
                SkippedUser { id: 4, reason: SkipReason::MissingExperience },
                SkippedUser { id: 9, reason: SkipReason::MissingLevel },
            ]
        );
    }

    #[test]
    fn test_collect_rejects_bad_values() {
        let collected = collect_records(&entries(&[
            ("1.xp", Scalar::Text("lots".into())),
            ("1.level", Scalar::Integer(2)),
            ("2.xp", Scalar::Integer(10)),
            ("2.level", Scalar::Integer(i64::from(i32::MAX) + 1)),
        ]));

        assert!(collected.records.is_empty());
        assert_eq!(collected.skipped[0].reason, SkipReason::NotAnInteger(Attribute::Xp));
        assert_eq!(collected.skipped[1].reason, SkipReason::LevelOutOfRange);
    }

    #[test]
    fn test_run_migrates_and_deletes_source() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "5.xp = 100\n5.level = 3\n9.xp = 50\nmotd = hello\n");

        let mut migrator = migrator();
        let report = migrator.run(&source).unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(report.skipped, vec![SkippedUser { id: 9, reason: SkipReason::MissingLevel }]);
        assert!(report.failed.is_empty());
        assert!(report.source_deleted);
        assert!(!source.exists());

        let sink = migrator.into_sink();
        assert_eq!(sink.count_users().unwrap(), 1);
        assert_eq!(sink.get_user(5).unwrap(), Some(UserRecord::new(5, 100, 3)));
        assert_eq!(sink.get_user(9).unwrap(), None);
    }

    #[test]
    fn test_run_clears_existing_users() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "1.xp = 10\n1.level = 1\n");

        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.ensure_schema().unwrap();
        let mut tx = sink.begin().unwrap();
        tx.create_user(&UserRecord::new(42, 1, 1)).unwrap();
        tx.commit().unwrap();

        let mut migrator = Migrator::new(sink, MigrateOptions::default());
        let report = migrator.run(&source).unwrap();

        assert_eq!(report.cleared, 1);
        assert_eq!(migrator.sink().get_user(42).unwrap(), None);
        assert_eq!(migrator.sink().count_users().unwrap(), 1);
    }

    #[test]
    fn test_failed_write_keeps_source() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "1.xp = 10\n1.level = 1\n2.xp = 20\n2.level = 2\n");

        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.ensure_schema().unwrap();
        let mut tx = sink.begin().unwrap();
        tx.create_user(&UserRecord::new(1, 999, 9)).unwrap();
        tx.commit().unwrap();

        let mut migrator = Migrator::new(sink, MigrateOptions { clear_existing: false });
        let report = migrator.run(&source).unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(report.failed, vec![1]);
        assert!(!report.source_deleted);
        assert!(source.exists());
        assert_eq!(migrator.sink().get_user(1).unwrap(), Some(UserRecord::new(1, 999, 9)));
        assert_eq!(migrator.sink().get_user(2).unwrap(), Some(UserRecord::new(2, 20, 2)));
    }

    #[test]
    fn test_run_rejects_wrong_extension_before_touching_sink() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("ranks.txt");
        fs::write(&source, "1.xp = 10\n1.level = 1\n").unwrap();

        let mut migrator = Migrator::new(RecordingSink::default(), MigrateOptions::default());
        assert!(matches!(migrator.run(&source), Err(Error::InvalidArgument(_))));

        assert_eq!(migrator.sink().calls(), (0, 0, 0));
        assert!(source.exists());
        assert!(!dir.path().join("ranks.toml").exists());
    }

    #[test]
    fn test_rejected_write_continues_and_keeps_source() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "1.xp = 10\n1.level = 1\n2.xp = 20\n2.level = 2\n");

        let sink = RecordingSink {
            rejected_ids: vec![1],
            ..Default::default()
        };
        let mut migrator = Migrator::new(sink, MigrateOptions::default());
        let report = migrator.run(&source).unwrap();

        assert_eq!(report.migrated, 1);
        assert_eq!(report.failed, vec![1]);
        assert!(!report.source_deleted);
        assert!(source.exists());

        let sink = migrator.into_sink();
        assert_eq!(sink.users, vec![UserRecord::new(2, 20, 2)]);
        assert_eq!(sink.calls(), (1, 1, 2));
    }

    #[test]
    fn test_invalid_utf8_line_does_not_block_migration() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("ranks.toml");
        fs::write(&source, b"5.xp = 100\n5.level = 3\nmotd = caf\xff\n").unwrap();

        let sink = RecordingSink {
            users: vec![UserRecord::new(42, 1, 1)],
            ..Default::default()
        };
        let mut migrator = Migrator::new(sink, MigrateOptions { clear_existing: false });
        let report = migrator.run(&source).unwrap();

        assert_eq!(report.migrated, 1);
        assert!(report.skipped.is_empty());
        assert!(report.source_deleted);
        assert_eq!(
            migrator.sink().users,
            vec![UserRecord::new(42, 1, 1), UserRecord::new(5, 100, 3)]
        );
    }

    #[test]
    fn test_unreadable_source_clears_nothing() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("ranks.toml");
        fs::create_dir(&source).unwrap();

        let sink = RecordingSink {
            users: vec![UserRecord::new(42, 1, 1)],
            ..Default::default()
        };
        let mut migrator = Migrator::new(sink, MigrateOptions::default());
        assert!(matches!(migrator.run(&source), Err(Error::Io(_))));

        assert!(source.exists());
        assert_eq!(migrator.sink().clear_calls, 0);
        assert_eq!(migrator.sink().begin_calls, 0);
        assert_eq!(migrator.sink().users, vec![UserRecord::new(42, 1, 1)]);
    }

    #[test]
    fn test_failed_source_delete_keeps_report() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "5.xp = 100\n5.level = 3\n");

        // Swap the source for a directory once the user is committed
        let swapped = source.clone();
        let sink = RecordingSink {
            after_commit: Some(Box::new(move || {
                fs::remove_file(&swapped).unwrap();
                fs::create_dir(&swapped).unwrap();
            })),
            ..Default::default()
        };
        let mut migrator = Migrator::new(sink, MigrateOptions::default());
        let report = migrator.run(&source).unwrap();

        assert_eq!(report.migrated, 1);
        assert!(report.failed.is_empty());
        assert!(!report.source_deleted);
        assert_eq!(migrator.sink().users, vec![UserRecord::new(5, 100, 3)]);
    }
}
