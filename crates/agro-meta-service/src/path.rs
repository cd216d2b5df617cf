//! Encoding of `(volume, unix path)` pairs into sortable flat keys.
//!
//! A directory record lives at `"{volume}:{depth:04x}:{dir}"`, where `dir` is
//! everything up to and including the last `/` of the path and `depth` is the
//! number of separators in `dir` (without its trailing `/`), with the volume
//! root normalized to 0.
//!
//! For a directory path (trailing `/`) the key addresses the directory's own
//! record. For a file path it addresses the record of the directory that
//! contains the file. The immediate sub-directories of `D` are exactly the
//! records whose key starts with `D.children_prefix()`, because depth is
//! embedded numerically and is one greater for every child.

use std::fmt;
use std::str::FromStr;

use agro_types::{make_error_msg, MetaCode, Result, Status, StatusCode};

/// Separator between the fields of a flat key. Forbidden in volume names and
/// path components.
pub const KEY_DELIMITER: char = ':';

/// Location of a file or directory: a volume plus a unix-style absolute path.
/// A trailing `/` marks a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    pub volume: String,
    pub path: String,
}

impl Path {
    pub fn new(volume: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            path: path.into(),
        }
    }

    /// Root directory of `volume`.
    pub fn root(volume: impl Into<String>) -> Self {
        Self::new(volume, "/")
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Split into `(dir, file)` at the last separator; `dir` keeps the
    /// separator. A path with no separator has an empty `dir`.
    fn split(&self) -> (&str, &str) {
        match self.path.rfind('/') {
            Some(i) => self.path.split_at(i + 1),
            None => ("", self.path.as_str()),
        }
    }

    /// Everything up to and including the last separator.
    pub fn parent_dir(&self) -> &str {
        self.split().0
    }

    /// Final path component; empty for any directory path.
    pub fn filename(&self) -> &str {
        self.split().1
    }

    pub fn depth(&self) -> usize {
        depth_of(self.parent_dir())
    }

    /// Flat key of the directory record this path addresses.
    pub fn key(&self) -> String {
        format!(
            "{}{KEY_DELIMITER}{:04x}{KEY_DELIMITER}{}",
            self.volume,
            self.depth(),
            self.parent_dir()
        )
    }

    /// Key prefix shared by the records of every immediate sub-directory.
    /// Only meaningful for directory paths.
    pub fn children_prefix(&self) -> String {
        format!(
            "{}{KEY_DELIMITER}{:04x}{KEY_DELIMITER}{}",
            self.volume,
            self.depth() + 1,
            self.parent_dir()
        )
    }

    /// The directory containing this path. The root is its own parent.
    pub fn parent(&self) -> Path {
        if self.is_root() {
            return self.clone();
        }
        let trimmed = self.path.strip_suffix('/').unwrap_or(&self.path);
        let dir = match trimmed.rfind('/') {
            Some(i) => &trimmed[..=i],
            None => "/",
        };
        Path::new(self.volume.clone(), dir)
    }

    /// Name under which this path is recorded in its parent directory:
    /// the filename for files, the last component for directories.
    pub fn name(&self) -> &str {
        let trimmed = self.path.strip_suffix('/').unwrap_or(&self.path);
        match trimmed.rfind('/') {
            Some(i) => &trimmed[i + 1..],
            None => trimmed,
        }
    }

    /// Child path of this directory.
    pub fn join(&self, name: &str, is_dir: bool) -> Path {
        let mut path = self.path.clone();
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(name);
        if is_dir {
            path.push('/');
        }
        Path::new(self.volume.clone(), path)
    }

    /// Reject inputs that could alias another key: bad volume names, relative
    /// paths, empty or dot components and the key delimiter. Paths nested
    /// deeper than `max_depth` fail with `NAME_TOO_LONG`.
    pub fn validate(&self, max_depth: usize) -> Result<()> {
        validate_volume_name(&self.volume)?;

        if !self.path.starts_with('/') {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("path {:?} is not absolute", self.path),
            );
        }
        if self.path.contains(KEY_DELIMITER) {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("path {:?} contains '{KEY_DELIMITER}'", self.path),
            );
        }
        if self.path.contains('\0') {
            return make_error_msg(StatusCode::INVALID_ARG, "path contains NUL");
        }

        let trimmed = self.path.strip_suffix('/').unwrap_or(&self.path);
        for component in trimmed.split('/').skip(1) {
            match component {
                "" => {
                    return make_error_msg(
                        StatusCode::INVALID_ARG,
                        format!("path {:?} has an empty component", self.path),
                    )
                }
                "." | ".." => {
                    return make_error_msg(
                        StatusCode::INVALID_ARG,
                        format!("path {:?} has a relative component", self.path),
                    )
                }
                _ => {}
            }
        }

        if self.depth() > max_depth {
            return make_error_msg(
                MetaCode::NAME_TOO_LONG,
                format!("path {:?} nests deeper than {}", self.path, max_depth),
            );
        }
        Ok(())
    }

    /// Decode a directory record key back into the directory's path.
    pub fn from_key(key: &[u8]) -> Result<Path> {
        let corrupt = || {
            Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("malformed directory key {:?}", String::from_utf8_lossy(key)),
            )
        };

        let key = std::str::from_utf8(key).map_err(|_| corrupt())?;
        let mut fields = key.splitn(3, KEY_DELIMITER);
        let (Some(volume), Some(depth), Some(dir)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(corrupt());
        };
        let depth = usize::from_str_radix(depth, 16).map_err(|_| corrupt())?;

        let path = Path::new(volume, dir);
        if !path.is_dir() || path.depth() != depth {
            return Err(corrupt());
        }
        Ok(path)
    }
}

fn depth_of(dir: &str) -> usize {
    if dir == "/" {
        return 0;
    }
    dir.strip_suffix('/').unwrap_or(dir).matches('/').count()
}

pub fn validate_volume_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return make_error_msg(StatusCode::INVALID_ARG, "empty volume name");
    }
    if name.contains(|c: char| c == KEY_DELIMITER || c == '/' || c == '\0') {
        return make_error_msg(
            StatusCode::INVALID_ARG,
            format!("volume name {:?} contains a reserved character", name),
        );
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_DELIMITER}{}", self.volume, self.path)
    }
}

/// Parses the `volume:/path` form produced by `Display`.
impl FromStr for Path {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(KEY_DELIMITER) {
            Some((volume, path)) => Ok(Path::new(volume, path)),
            None => Err(Status::with_message(
                StatusCode::INVALID_ARG,
                format!("expected volume:/path, got {:?}", s),
            )),
        }
    }
}
