//! # Proximity Postings
//!
//! Derives window postings from positional term postings:
//! - `#odN(t1 .. tk)`: terms in order, each within N positions of the previous
//! - `#uwN(t1 .. tk)`: all terms inside a span of at most N positions
//!
//! Matches inside a document never overlap: after a match, scanning resumes
//! past the match's last position. The posting positions of a window list are
//! the start positions of its matches.

use super::postings::{Posting, PostingsCursor, PostingsList};
use crate::{DocId, MrfError};
use std::sync::Arc;

/// Build ordered-window postings over `lists` (one per query term, in order).
pub fn ordered_window(lists: &[Arc<PostingsList>], gap: u32) -> Result<PostingsList, MrfError> {
    intersect_with(lists, |positions| count_ordered(positions, gap))
}

/// Build unordered-window postings over `lists`.
pub fn unordered_window(
    lists: &[Arc<PostingsList>],
    width: u32,
) -> Result<PostingsList, MrfError> {
    intersect_with(lists, |positions| count_unordered(positions, width))
}

/// Conjunctive merge across all lists, calling `matcher` on the positions of
/// every document present in all of them.
fn intersect_with<F>(lists: &[Arc<PostingsList>], matcher: F) -> Result<PostingsList, MrfError>
where
    F: Fn(&[&[u32]]) -> Vec<u32>,
{
    let mut out = PostingsList::new();
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return Ok(out);
    }

    let mut cursors: Vec<PostingsCursor> =
        lists.iter().map(|l| PostingsCursor::new(Arc::clone(l))).collect();

    loop {
        let target = cursors.iter().map(PostingsCursor::doc).max().unwrap_or(DocId::END);
        if target.is_end() {
            break;
        }
        for cursor in &mut cursors {
            cursor.skip_to(target);
        }
        if cursors.iter().any(|c| c.doc() != target) {
            continue;
        }

        let positions: Vec<&[u32]> = cursors
            .iter()
            .map(|c| c.current().map_or(&[][..], |p| p.positions.as_slice()))
            .collect();
        let starts = matcher(&positions);
        if !starts.is_empty() {
            out.push(Posting::with_positions(target, starts))?;
        }

        for cursor in &mut cursors {
            cursor.advance();
        }
    }

    Ok(out)
}

/// Ordered matches: greedy from each start position of the first term,
/// taking the nearest following occurrence of each next term.
fn count_ordered(positions: &[&[u32]], gap: u32) -> Vec<u32> {
    let mut starts = Vec::new();
    let Some((first, rest)) = positions.split_first() else {
        return starts;
    };

    let mut last_end: Option<u32> = None;
    for &start in first.iter() {
        if last_end.is_some_and(|end| start <= end) {
            continue;
        }
        let mut prev = start;
        let mut matched = true;
        for term_positions in rest {
            let idx = term_positions.partition_point(|&p| p <= prev);
            match term_positions.get(idx) {
                Some(&p) if p - prev <= gap => prev = p,
                _ => {
                    matched = false;
                    break;
                }
            }
        }
        if matched {
            starts.push(start);
            last_end = Some(prev);
        }
    }
    starts
}

/// Unordered matches: leftmost-first windows of at most `width` positions
/// containing every term at least once.
fn count_unordered(positions: &[&[u32]], width: u32) -> Vec<u32> {
    let slots = positions.len();
    let mut entries: Vec<(u32, usize)> = positions
        .iter()
        .enumerate()
        .flat_map(|(slot, ps)| ps.iter().map(move |&p| (p, slot)))
        .collect();
    entries.sort_unstable();

    let mut starts = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let start = entries[i].0;
        let limit = start.saturating_add(width);
        let mut seen = vec![false; slots];
        let mut remaining = slots;
        let mut end = None;

        for &(pos, slot) in &entries[i..] {
            if pos >= limit {
                break;
            }
            if !seen[slot] {
                seen[slot] = true;
                remaining -= 1;
                if remaining == 0 {
                    end = Some(pos);
                    break;
                }
            }
        }

        match end {
            Some(end) => {
                starts.push(start);
                i += entries[i..].partition_point(|&(p, _)| p <= end);
            }
            None => i += 1,
        }
    }
    starts
}

// =============================================================================
// TESTS
// =============================================================================
