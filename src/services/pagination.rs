//! Load-more controller over a `DiscoverySession` buffer.
//!
//! The session's buffer holds every candidate fetched for the current
//! mood/filters; `visible_count` marks how much of it the UI shows.

use std::collections::HashSet;

use crate::models::{CatalogItem, DiscoverySession, ItemIdentity, PageCursors};

/// Reveals the next window from the buffer without touching the network
///
/// Returns `false` when the buffer has nothing hidden left.
pub fn reveal_buffered(session: &mut DiscoverySession, window: usize) -> bool {
    if session.buffer.len() <= session.visible_count {
        return false;
    }
    session.visible_count = (session.visible_count + window).min(session.buffer.len());
    true
}

/// Identities already in the buffer
pub fn seen_identities(session: &DiscoverySession) -> HashSet<ItemIdentity> {
    session.buffer.iter().map(CatalogItem::identity).collect()
}

/// Appends newly fetched items, moves cursors forward and reveals one window
pub fn append_and_reveal(
    session: &mut DiscoverySession,
    fresh: Vec<CatalogItem>,
    cursors: PageCursors,
    window: usize,
) {
    let seen = seen_identities(session);
    session
        .buffer
        .extend(fresh.into_iter().filter(|item| !seen.contains(&item.identity())));

    for (content_type, cursor) in cursors {
        session.cursors.insert(content_type, cursor);
    }

    session.visible_count = (session.visible_count + window).min(session.buffer.len());
}
