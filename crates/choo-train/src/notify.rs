//! Detached movement announcements.

use std::sync::Arc;
use std::time::Duration;

use choo_client::{Announcement, Announcer};
use choo_state::TokenRecord;

/// The announcement for a freshly promoted movement.
pub(crate) fn announcement_for(record: &TokenRecord) -> Announcement {
    Announcement {
        token_id: record.token_id,
        operation_kind: record.operation_kind,
        new_holder: record.new_holder.clone(),
        departing_passenger: record.departing_passenger.clone(),
        tx_hash: record.tx_hash.clone(),
    }
}

/// Post `announcement` on a background task. Failures are logged and
/// never retried.
pub(crate) fn dispatch(
    announcer: Arc<dyn Announcer>,
    announcement: Announcement,
    limit: Duration,
) {
    tokio::spawn(async move {
        let token_id = announcement.token_id;
        match tokio::time::timeout(limit, announcer.announce(&announcement)).await {
            Ok(Ok(())) => tracing::info!(token_id = %token_id, "movement announced"),
            Ok(Err(e)) => tracing::warn!(token_id = %token_id, error = %e, "announcement failed"),
            Err(_) => tracing::warn!(token_id = %token_id, ?limit, "announcement timed out"),
        }
    });
}
