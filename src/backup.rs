//! Daily compressed dumps with age-based retention.

use chrono::{Days, NaiveDate};
use flate2::write::GzEncoder;
use flate2::Compression;
use snafu::{ensure, ResultExt, Snafu};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, info};

const DUMP_SUFFIX: &str = ".sql.gz";
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Snafu)]
pub enum BackupError {
    #[snafu(display("Failed to create backup directory {}: {}", path.display(), source))]
    CreateDir { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to start dump command: {}", source))]
    Spawn { source: io::Error },

    #[snafu(display("Failed to write {}: {}", path.display(), source))]
    Write { path: PathBuf, source: io::Error },

    #[snafu(display("Dump command exited with {}", status))]
    DumpFailed { status: ExitStatus },

    #[snafu(display("Failed to move {} into place: {}", path.display(), source))]
    Rename { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to list {}: {}", path.display(), source))]
    ReadDir { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to remove {}: {}", path.display(), source))]
    Remove { path: PathBuf, source: io::Error },
}

type Result<T, E = BackupError> = std::result::Result<T, E>;

/// `<database>_<YYYY-MM-DD>.sql.gz`
pub fn dump_file_name(database: &str, date: NaiveDate) -> String {
    format!("{}_{}{}", database, date.format("%Y-%m-%d"), DUMP_SUFFIX)
}

/// Date embedded in a dump file name for `database`, if the name is one of ours
pub fn dump_date(database: &str, file_name: &str) -> Option<NaiveDate> {
    let date = file_name
        .strip_prefix(database)?
        .strip_prefix('_')?
        .strip_suffix(DUMP_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Runs `dump` and gzips its stdout into `dir/<database>_<date>.sql.gz`.
///
/// Output is written under a `.partial` name and only renamed once the
/// command succeeded and the file is synced; on any failure the partial file
/// is removed and no dump for that date appears.
pub fn write_dump(
    mut dump: Command,
    dir: &Path,
    database: &str,
    date: NaiveDate,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).context(CreateDirSnafu { path: dir })?;

    let target = dir.join(dump_file_name(database, date));
    let partial = dir.join(format!("{}{}", dump_file_name(database, date), PARTIAL_SUFFIX));

    let result = stream_to_gzip(&mut dump, &partial).and_then(|()| {
        fs::rename(&partial, &target).context(RenameSnafu { path: &partial })
    });
    if let Err(err) = result {
        if let Err(cleanup) = fs::remove_file(&partial) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", partial.display(), cleanup);
            }
        }
        return Err(err);
    }

    info!("Wrote {}", target.display());
    Ok(target)
}

fn stream_to_gzip(dump: &mut Command, partial: &Path) -> Result<()> {
    let file = File::create(partial).context(WriteSnafu { path: partial })?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

    let mut child = dump
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .context(SpawnSnafu)?;

    let copied = match child.stdout.take() {
        Some(mut stdout) => io::copy(&mut stdout, &mut encoder),
        None => Ok(0),
    };
    let status = child.wait().context(SpawnSnafu)?;
    let copied = copied.context(WriteSnafu { path: partial })?;
    ensure!(status.success(), DumpFailedSnafu { status });

    let file = encoder
        .finish()
        .and_then(|mut writer| {
            writer.flush()?;
            writer.into_inner().map_err(|e| e.into_error())
        })
        .context(WriteSnafu { path: partial })?;
    file.sync_all().context(WriteSnafu { path: partial })?;

    debug!("Compressed {} bytes of dump output", copied);
    Ok(())
}

/// Deletes dumps of `database` in `dir` dated more than `retention_days`
/// before `today`. Files that don't follow the dump naming scheme are left alone.
pub fn prune_old_dumps(
    dir: &Path,
    database: &str,
    today: NaiveDate,
    retention_days: u32,
) -> Result<Vec<PathBuf>> {
    let cutoff = today
        .checked_sub_days(Days::new(u64::from(retention_days)))
        .unwrap_or(NaiveDate::MIN);

    let mut removed = Vec::new();
    for entry in fs::read_dir(dir).context(ReadDirSnafu { path: dir })? {
        let entry = entry.context(ReadDirSnafu { path: dir })?;
        let file_name = entry.file_name();
        let Some(date) = file_name.to_str().and_then(|name| dump_date(database, name)) else {
            continue;
        };

        if date < cutoff {
            let path = entry.path();
            fs::remove_file(&path).context(RemoveSnafu { path: &path })?;
            info!("Removed expired dump {}", path.display());
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn names_round_trip_through_the_date() {
        let name = dump_file_name("paperless", date("2026-10-19"));
        assert_eq!(name, "paperless_2026-10-19.sql.gz");
        assert_eq!(dump_date("paperless", &name), Some(date("2026-10-19")));
        assert_eq!(dump_date("other", &name), None);
        assert_eq!(dump_date("paperless", "paperless_2026-10-19.sql.gz.partial"), None);
        assert_eq!(dump_date("paperless", "paperless_latest.sql.gz"), None);
    }

    #[test]
    fn successful_dump_is_compressed_and_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path().join("backups");

        let path = write_dump(
            shell("printf 'CREATE TABLE t ();\\n'"),
            &backups,
            "paperless",
            date("2026-10-19"),
        )
        .unwrap();

        assert_eq!(path, backups.join("paperless_2026-10-19.sql.gz"));
        let mut content = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "CREATE TABLE t ();\n");
        assert_eq!(fs::read_dir(&backups).unwrap().count(), 1);
    }

    #[test]
    fn failed_dump_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();

        let err = write_dump(
            shell("printf 'partial'; exit 3"),
            dir.path(),
            "paperless",
            date("2026-10-19"),
        )
        .unwrap_err();

        assert!(matches!(err, BackupError::DumpFailed { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_dump_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = write_dump(
            Command::new("/nonexistent/pg_dump"),
            dir.path(),
            "paperless",
            date("2026-10-19"),
        )
        .unwrap_err();

        assert!(matches!(err, BackupError::Spawn { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_rename_removes_the_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let occupied = dir.path().join("paperless_2026-10-19.sql.gz");
        fs::create_dir(&occupied).unwrap();
        File::create(occupied.join("keep")).unwrap();

        let err = write_dump(
            shell("echo hi"),
            dir.path(),
            "paperless",
            date("2026-10-19"),
        )
        .unwrap_err();

        assert!(matches!(err, BackupError::Rename { .. }));
        assert!(!dir
            .path()
            .join("paperless_2026-10-19.sql.gz.partial")
            .exists());
        assert!(occupied.join("keep").exists());
    }

    #[test]
    fn prunes_only_expired_dumps_of_this_database() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "paperless_2026-09-18.sql.gz",
            "paperless_2026-09-19.sql.gz",
            "paperless_2026-10-18.sql.gz",
            "other_2026-01-01.sql.gz",
            "notes.txt",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let removed = prune_old_dumps(dir.path(), "paperless", date("2026-10-19"), 30).unwrap();

        assert_eq!(removed, vec![dir.path().join("paperless_2026-09-18.sql.gz")]);
        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "notes.txt",
                "other_2026-01-01.sql.gz",
                "paperless_2026-09-19.sql.gz",
                "paperless_2026-10-18.sql.gz",
            ]
        );
    }
}
