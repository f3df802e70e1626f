//! Job output files: target resolution, tails and clearing

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Result, ShellError};
use crate::transport::dialect::sanitize_name;
use crate::types::job::{OutputTarget, StreamSink};

/// Resolve the declared targets into sinks
///
/// stdout `Default` becomes `<output_dir>/<name>-<id>.log`. stderr `Default`
/// and `MergeWithStdout` share the stdout destination, or are discarded with
/// it. A stderr file equal to the stdout file is treated as merged.
pub(super) fn resolve_sinks(
    name: &str,
    stdout: &OutputTarget,
    stderr: &OutputTarget,
    output_dir: &Path,
) -> Result<(StreamSink, StreamSink)> {
    let stdout = match stdout {
        OutputTarget::Default => StreamSink::File(default_output_path(name, output_dir)),
        OutputTarget::Discard => StreamSink::Discarded,
        OutputTarget::File(path) => StreamSink::File(path.clone()),
        OutputTarget::MergeWithStdout => {
            return Err(ShellError::invalid_request(
                "stdout cannot be merged with itself",
            ));
        }
    };

    let merged = || match stdout {
        StreamSink::Discarded => StreamSink::Discarded,
        StreamSink::File(_) | StreamSink::MergedWithStdout => StreamSink::MergedWithStdout,
    };
    let stderr = match stderr {
        OutputTarget::Default | OutputTarget::MergeWithStdout => merged(),
        OutputTarget::Discard => StreamSink::Discarded,
        OutputTarget::File(path) if stdout.path() == Some(path.as_path()) => merged(),
        OutputTarget::File(path) => StreamSink::File(path.clone()),
    };

    Ok((stdout, stderr))
}

fn default_output_path(name: &str, output_dir: &Path) -> PathBuf {
    let id = uuid::Uuid::new_v4().simple().to_string();
    output_dir.join(format!("{}-{}.log", sanitize_name(name), &id[..8]))
}

/// Create (truncating) the sink files and open them for the child
///
/// Files are opened in append mode so they can be cleared while the child
/// keeps writing.
pub(super) fn open_sinks(stdout: &StreamSink, stderr: &StreamSink) -> std::io::Result<(Stdio, Stdio)> {
    let stdout_file = stdout.path().map(open_append).transpose()?;

    let stderr_stdio = match stderr {
        StreamSink::File(path) => Stdio::from(open_append(path)?),
        StreamSink::MergedWithStdout => match stdout_file {
            Some(ref file) => Stdio::from(file.try_clone()?),
            None => Stdio::null(),
        },
        StreamSink::Discarded => Stdio::null(),
    };
    let stdout_stdio = stdout_file.map_or_else(Stdio::null, Stdio::from);

    Ok((stdout_stdio, stderr_stdio))
}

fn open_append(path: &Path) -> std::io::Result<File> {
    File::create(path)?;
    OpenOptions::new().append(true).open(path)
}

const TAIL_BLOCK_SIZE: u64 = 8192;

/// Last `lines` lines of a file; a missing file reads as empty
///
/// The file is read backwards in blocks until enough line breaks were seen,
/// so the cost follows the tail, not the file size.
pub(super) async fn read_tail(path: &Path, lines: usize) -> Result<String> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("Output file {} is gone", path.display());
            return Ok(String::new());
        }
        Err(e) => return Err(e.into()),
    };
    if lines == 0 {
        return Ok(String::new());
    }

    let mut pos = file.metadata().await?.len();
    let mut tail: Vec<u8> = Vec::new();
    let mut breaks = 0usize;
    let mut trailing_break = None;

    while pos > 0 {
        let step = pos.min(TAIL_BLOCK_SIZE);
        pos -= step;
        let mut block = read_block(&mut file, pos, step).await?;

        let ends_with_break = *trailing_break.get_or_insert(block.last() == Some(&b'\n'));
        breaks += block.iter().filter(|&&b| b == b'\n').count();
        block.extend_from_slice(&tail);
        tail = block;

        // A final line break terminates the last line instead of starting one
        if breaks.saturating_sub(usize::from(ends_with_break)) >= lines {
            break;
        }
    }

    let text = String::from_utf8_lossy(&tail);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}

/// Read up to `len` bytes at `offset`; a file truncated meanwhile reads short
async fn read_block(file: &mut tokio::fs::File, offset: u64, len: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).await?;
    let mut block = vec![0u8; usize::try_from(len).unwrap_or(usize::MAX)];
    let mut filled = 0;
    while filled < block.len() {
        let n = file.read(&mut block[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    block.truncate(filled);
    Ok(block)
}

/// Empty a file the job may still be appending to
pub(super) async fn clear(path: &Path) -> Result<()> {
    match tokio::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Delete output files; returns the ones actually deleted
pub(super) async fn delete_files<'a>(paths: impl Iterator<Item = &'a Path>) -> Vec<PathBuf> {
    let mut deleted = Vec::new();
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => deleted.push(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to delete job output {}: {e}", path.display()),
        }
    }
    deleted
}
