//! Path helpers shared by configuration and persistence.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If `HOME` is not set the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use capacity_hunter::paths::expand_tilde;
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Reads a whole file through cap-std, opening its parent directory with
/// ambient authority. Relative paths resolve against the working directory.
///
/// # Errors
///
/// Returns the I/O error message when the directory or file cannot be read.
pub fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
