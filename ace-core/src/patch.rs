//! Textual edit application — turns a list of non-overlapping line
//! edits into new file content.

use crate::error::PatchError;
use crate::types::{Edit, EditOp, find_overlap};

/// Apply a set of non-overlapping edits to `source`.
///
/// Edits are applied bottom-up so earlier line numbers stay valid.
/// Inserts place their payload before `start_line`; an insert at
/// `len + 1` appends. A trailing newline in the input is preserved.
pub fn apply_edits(source: &str, edits: &[Edit]) -> Result<String, PatchError> {
    if let Some((i, j)) = find_overlap(edits) {
        return Err(PatchError::Overlap(i, j));
    }

    let had_trailing_newline = source.ends_with('\n') || source.is_empty();
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();

    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.start_line.cmp(&a.start_line));

    for edit in ordered {
        let len = lines.len();
        let start = edit.start_line as usize;
        let end = edit.end_line as usize;

        match edit.op {
            EditOp::Replace | EditOp::Delete => {
                if end > len {
                    return Err(PatchError::OutOfBounds {
                        start: edit.start_line,
                        end: edit.end_line,
                        len,
                    });
                }
                let replacement = if edit.op == EditOp::Delete {
                    Vec::new()
                } else {
                    payload_lines(&edit.payload)
                };
                lines.splice(start - 1..end, replacement);
            }
            EditOp::Insert => {
                // Inserting before line len+1 appends to the file.
                if start > len + 1 {
                    return Err(PatchError::OutOfBounds {
                        start: edit.start_line,
                        end: edit.end_line,
                        len,
                    });
                }
                lines.splice(start - 1..start - 1, payload_lines(&edit.payload));
            }
        }
    }

    let mut out = lines.join("\n");
    if had_trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

/// Apply only the edits at the given indices, preserving input order.
pub fn apply_edit_subset(
    source: &str,
    edits: &[Edit],
    indices: &[usize],
) -> Result<String, PatchError> {
    let subset: Vec<Edit> = indices.iter().map(|&i| edits[i].clone()).collect();
    apply_edits(source, &subset)
}

fn payload_lines(payload: &str) -> Vec<String> {
    let trimmed = payload.strip_suffix('\n').unwrap_or(payload);
    trimmed.split('\n').map(str::to_string).collect()
}
