use std::fmt;
use std::path::Path;

use ssh2::FileStat;

use crate::byte_format::human_readable_byte_count;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub permissions: String,
    pub size: u64,
    pub is_dir: bool,
}

impl DirectoryEntry {
    /// Builds an entry from a raw directory read; `.` and `..` keep their names.
    pub fn from_stat(path: &Path, stat: &FileStat) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        DirectoryEntry {
            name,
            permissions: permissions_string(stat.perm.unwrap_or(0)),
            size: stat.size.unwrap_or(0),
            is_dir: stat.is_dir(),
        }
    }

    /// `PRE` for directories, otherwise the human-readable size.
    pub fn size_label(&self) -> String {
        if self.is_dir {
            "PRE".to_string()
        } else {
            human_readable_byte_count(i64::try_from(self.size).unwrap_or(i64::MAX))
        }
    }
}

/// Renders as a listing line: `[<permissions>] <name>(<size>)`.
impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}({})", self.permissions, self.name, self.size_label())
    }
}

/// `ls -l` style rendering of SFTP mode bits, e.g. `drwxr-xr-x`.
pub fn permissions_string(mode: u32) -> String {
    let kind = match mode & 0o170_000 {
        0o040_000 => 'd',
        0o120_000 => 'l',
        0o010_000 => 'p',
        0o140_000 => 's',
        0o060_000 => 'b',
        0o020_000 => 'c',
        _ => '-',
    };

    let mut s = String::with_capacity(10);
    s.push(kind);
    for (shift, special, special_char) in [(6, 0o4000, 's'), (3, 0o2000, 's'), (0, 0o1000, 't')] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(match (mode & special != 0, bits & 0o1 != 0) {
            (true, true) => special_char,
            (true, false) => special_char.to_ascii_uppercase(),
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    s
}
