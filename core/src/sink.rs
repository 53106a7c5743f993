//! Line-oriented output files.

use crate::Error;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// How an output file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncate and rewrite; re-running over the same input gives the same file.
    #[default]
    Overwrite,
    /// Append to whatever is already there.
    Append,
}

/// Write `lines` to `path`, one per line, creating parent directories.
///
/// `header` is written first when the file is being rewritten, or when appending
/// to a file that does not exist yet or is empty. Returns the number of body lines.
pub fn write_lines<I, S>(path: &Path, header: Option<&str>, lines: I, mode: WriteMode) -> Result<usize, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let werr = |source: std::io::Error| Error::Write { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(werr)?;
    }
    let was_empty = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = match mode {
        WriteMode::Overwrite => OpenOptions::new().create(true).truncate(true).write(true).open(path),
        WriteMode::Append => OpenOptions::new().create(true).append(true).open(path),
    }
    .map_err(werr)?;
    let mut w = BufWriter::new(file);
    if let Some(h) = header {
        if mode == WriteMode::Overwrite || was_empty {
            writeln!(w, "{}", h).map_err(werr)?;
        }
    }
    let mut count = 0usize;
    for line in lines {
        writeln!(w, "{}", line.as_ref()).map_err(werr)?;
        count += 1;
    }
    w.flush().map_err(werr)?;
    tracing::debug!(path = %path.display(), lines = count, ?mode, "wrote output file");
    Ok(count)
}
