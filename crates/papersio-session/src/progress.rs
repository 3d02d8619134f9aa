//! Maps free-text stage labels from the research workflow to a progress
//! percentage.
//!
//! The catalog order is the tie-break: a label such as "Re-Critiquing" contains
//! both `critiquing` and `re-critiquing`, and the earlier catalog entry wins.
//! Monotonicity is not enforced here; the controller keeps the running maximum.

pub const STAGE_CATALOG: [&str; 11] = [
    "checking-memory",
    "planning",
    "searching",
    "analyzing",
    "writing",
    "critiquing",
    "revising",
    "re-critiquing",
    "saving",
    "finalizing",
    "finished",
];

/// Reported for labels that match nothing in the catalog.
pub const UNKNOWN_STAGE_PROGRESS: u8 = 8;

pub fn compute_progress(label: &str) -> u8 {
    match stage_ordinal(label) {
        Some(ordinal) => {
            let fraction = (ordinal + 1) as f64 / STAGE_CATALOG.len() as f64;
            (fraction * 100.0).round() as u8
        }
        None => UNKNOWN_STAGE_PROGRESS,
    }
}

/// Zero-based catalog position of the first entry contained in `label`.
pub fn stage_ordinal(label: &str) -> Option<usize> {
    let normalized = normalize_label(label);
    if normalized.is_empty() {
        return None;
    }
    STAGE_CATALOG
        .iter()
        .position(|keyword| normalized.contains(keyword))
}

// Whitespace and underscore runs fold to one hyphen so "Checking Memory" and
// "checking_memory" line up with `checking-memory`. Folding happens before the
// catalog scan, so a label naming several stages resolves to the earliest one:
// "checking memory and planning" is `checking-memory`, not `planning`.
fn normalize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_sep = false;
    for ch in label.trim().chars() {
        if ch.is_whitespace() || ch == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.extend(ch.to_lowercase());
    }
    out
}
