//! Failure collector loop.
//!
//! A single long-lived task that drains the failure queue into the ledger.
//! It has no natural end-of-stream signal (any worker may be the last to
//! fail), so it never stops on its own: the dispatcher aborts it once both
//! queues have joined, at which point every enqueued failure has already
//! been persisted.

use std::sync::Arc;
use tracing::{error, warn};

use crate::emit;
use crate::ledger::FailureLedger;
use crate::metrics::events::FailureRecorded;
use crate::queue::JoinableQueue;

/// Run the collector until the dispatcher aborts it.
pub(super) async fn run_collector(failures: Arc<JoinableQueue<String>>, ledger: FailureLedger) {
    loop {
        let key = failures.dequeue().await;
        warn!(key = %key, "Recording failed job");
        if let Err(e) = ledger.append(&key).await {
            // An unrecorded failure is lost for retry, but the item must
            // still be acknowledged or the failure queue never drains.
            error!("Failed to persist failure record: {e}");
        }
        emit!(FailureRecorded);
        failures.acknowledge();
    }
}
