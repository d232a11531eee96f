use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::dialect::Backend;
use crate::error::DbError;
use crate::Result;

/// Overrides the script repository location, mainly for test isolation.
pub const SCRIPTS_PATH_ENV: &str = "MIGRATION_SCRIPTS_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

/// A single migration script, immutable once loaded.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub version: i64,
    pub name: String,
    pub direction: Direction,
    /// Hex sha256 of the script body, computed at load time.
    pub checksum: String,
    pub sql: String,
}

/// A validated, ordered script set: up scripts ascending, down scripts
/// descending. Loaded fresh on every migration run; repositories change
/// between deployments, so nothing is cached.
#[derive(Debug)]
pub struct MigrationSource {
    ups: Vec<MigrationScript>,
    downs: Vec<MigrationScript>,
}

impl MigrationSource {
    /// The repository location for `backend`, honoring the
    /// [`SCRIPTS_PATH_ENV`] override.
    pub fn resolve_path(backend: Backend) -> PathBuf {
        match std::env::var(SCRIPTS_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_path(backend),
        }
    }

    pub fn default_path(backend: Backend) -> PathBuf {
        let dir = match backend {
            Backend::Postgres => "postgresql",
            Backend::MySql => "mysql",
        };
        Path::new("migrations").join(dir)
    }

    /// Scans `path` for `*.sql` scripts, validates the naming convention and
    /// version uniqueness, and returns the ordered set.
    ///
    /// Fails with [`DbError::EmptySource`] when no scripts are found; callers
    /// that consider an empty repository legitimate match on that variant.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DbError::EmptySource(path.to_path_buf()));
        }

        let mut entries: Vec<_> = fs::read_dir(path)?.filter_map(std::result::Result::ok).collect();
        entries.sort_by_key(fs::DirEntry::file_name);

        let mut seen: HashSet<(i64, Direction)> = HashSet::new();
        let mut ups = Vec::new();
        let mut downs = Vec::new();

        for entry in entries {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !file_name.ends_with(".sql") || !entry.path().is_file() {
                continue;
            }

            let (version, name, direction) = parse_script_filename(&file_name)?;
            if !seen.insert((version, direction)) {
                return Err(DbError::DuplicateVersion { version, direction });
            }

            let sql = fs::read_to_string(entry.path())?;
            let script = MigrationScript {
                version,
                name,
                direction,
                checksum: checksum(&sql),
                sql,
            };
            match direction {
                Direction::Up => ups.push(script),
                Direction::Down => downs.push(script),
            }
        }

        if ups.is_empty() && downs.is_empty() {
            return Err(DbError::EmptySource(path.to_path_buf()));
        }

        ups.sort_by_key(|s| s.version);
        downs.sort_by_key(|s| std::cmp::Reverse(s.version));

        Ok(Self { ups, downs })
    }

    /// Up scripts, version ascending.
    pub fn up(&self) -> &[MigrationScript] {
        &self.ups
    }

    /// Down scripts, version descending.
    pub fn down(&self) -> &[MigrationScript] {
        &self.downs
    }

    pub fn down_for(&self, version: i64) -> Option<&MigrationScript> {
        self.downs.iter().find(|s| s.version == version)
    }
}

/// Parses `{version}_{name}.{up|down}.sql`.
fn parse_script_filename(filename: &str) -> Result<(i64, String, Direction)> {
    let invalid = || DbError::InvalidFilename(filename.to_string());

    let stem = filename.strip_suffix(".sql").ok_or_else(invalid)?;
    let (stem, direction) = if let Some(stem) = stem.strip_suffix(".up") {
        (stem, Direction::Up)
    } else if let Some(stem) = stem.strip_suffix(".down") {
        (stem, Direction::Down)
    } else {
        return Err(invalid());
    };

    let (version, name) = stem.split_once('_').ok_or_else(invalid)?;
    let version: i64 = version.parse().map_err(|_| invalid())?;

    Ok((version, name.to_string(), direction))
}

fn checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    format!("{:x}", hasher.finalize())
}
