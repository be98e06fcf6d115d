//! Lifecycle Controller (spec §4.6): the progress-log append rule shared by
//! every caller-supplied log write. The legal state-transition table itself
//! lives in each store's `WHERE` clauses (e.g. `broker-postgres`'s atomic
//! `UPDATE ... WHERE state = ...` statements), since the guarantee that
//! matters — no two callers observe or act on the same transition — only
//! holds if the check and the write happen in the same statement; a
//! separate Rust-side legality check here would just be a second,
//! unsynchronized copy of that table.

/// Appends `entry` to `existing`, inserting a separating newline only when
/// `existing` doesn't already end in one (spec §4.5, mirrors the original's
/// log-append behavior so repeated progress updates don't double up blank
/// lines).
pub fn append_log(existing: Option<&str>, entry: &str) -> String {
    match existing {
        Some(text) if !text.is_empty() => {
            if text.ends_with('\n') {
                format!("{text}{entry}")
            } else {
                format!("{text}\n{entry}")
            }
        }
        _ => entry.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_log_inserts_newline_only_when_missing() {
        assert_eq!(append_log(None, "first"), "first");
        assert_eq!(append_log(Some("first"), "second"), "first\nsecond");
        assert_eq!(append_log(Some("first\n"), "second"), "first\nsecond");
    }
}
