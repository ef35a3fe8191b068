//! Store event fan-out to subsystem workers

use crate::worker::WorkerHandle;
use halyard_apply::TriggerCause;
use halyard_control::TriggerRouter;
use halyard_store::StoreEvent;
use halyard_types::SubsystemId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Forward store events to the workers watching the changed key.
///
/// If the receiver falls behind, every worker gets a resync since the
/// dropped events can no longer be routed.
pub async fn route_events(
    mut events: broadcast::Receiver<StoreEvent>,
    router: TriggerRouter,
    handles: HashMap<SubsystemId, Arc<WorkerHandle>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = shutdown.changed() => break,
        };

        match event {
            Ok(event) => {
                for (subsystem, cause) in router.route(&event) {
                    if let Some(handle) = handles.get(&subsystem) {
                        debug!(subsystem = %subsystem, key = %event.key, "Triggering pass");
                        handle.trigger(cause);
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event router lagged; resyncing all workers");
                for handle in handles.values() {
                    handle.trigger(TriggerCause::Resync);
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
