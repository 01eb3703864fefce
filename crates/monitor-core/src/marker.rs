//! Working-directory marker convention.
//!
//! Every command written to the shared shell is followed by a probe that
//! prints the shell's current directory behind [`PATH_MARKER`]. The shell's
//! stdout is otherwise an opaque byte stream, so the marker is the only
//! framing there is: a chunk is split at the first occurrence of the marker,
//! text before it is ordinary output and text after it, up to any further
//! marker, is the new path.
//!
//! Output that happens to contain the marker text itself is misclassified.
//! There is no escaping.

/// Tag printed in front of the shell's working directory.
pub const PATH_MARKER: &str = "PWD_UPDATE:";

/// Appended to every submitted command. Valid for sh, bash and zsh.
pub const PATH_PROBE_SUFFIX: &str = " ; echo \"PWD_UPDATE:$(pwd)\"";

/// Build the exact line written to the shell's stdin for `command`.
pub fn probe_line(command: &str) -> String {
    format!("{command}{PATH_PROBE_SUFFIX}\n")
}

/// Result of classifying one stdout chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedChunk {
    /// Trimmed ordinary output, if any remained.
    pub output: Option<String>,
    /// Trimmed path following the marker, when the marker was present.
    pub path: Option<String>,
}

impl ClassifiedChunk {
    pub fn is_empty(&self) -> bool {
        self.output.is_none() && self.path.is_none()
    }
}

/// Split a raw stdout chunk into ordinary output and a path update.
///
/// Blank chunks classify to nothing. A chunk containing the marker yields a
/// path (possibly empty) and, when non-blank text precedes the marker, an
/// output line.
pub fn classify_output(chunk: &str) -> ClassifiedChunk {
    let trimmed = chunk.trim();
    if trimmed.is_empty() {
        return ClassifiedChunk::default();
    }

    match trimmed.split_once(PATH_MARKER) {
        Some((before, after)) => {
            let before = before.trim();
            let path = after.split(PATH_MARKER).next().unwrap_or(after);
            ClassifiedChunk {
                output: (!before.is_empty()).then(|| before.to_string()),
                path: Some(path.trim().to_string()),
            }
        }
        None => ClassifiedChunk {
            output: Some(trimmed.to_string()),
            path: None,
        },
    }
}
