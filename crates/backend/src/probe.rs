//! Backend reachability probe.

use crate::client::BackendClient;
use proto::{BackendError, Connectivity, ConnectivityState};
use std::time::Duration;
use tracing::{debug, info};

/// Collection the probe counts rows of.
pub const PROBE_COLLECTION: &str = "scans";
/// Row limit for the count probe.
const PROBE_ROW_LIMIT: u32 = 1;

/// Classifies `client`'s backend as reachable or not. Never fails.
///
/// An authorization rejection counts as reachable: the endpoint exists and
/// understood the key format, even if this key may not read the collection.
pub async fn probe_backend(client: &BackendClient, timeout: Duration) -> bool {
    probe_backend_state(client, timeout).await.status == Connectivity::Reachable
}

/// Same as [`probe_backend`] but keeps a diagnostic for display.
pub async fn probe_backend_state(client: &BackendClient, timeout: Duration) -> ConnectivityState {
    if !client.is_configured() {
        debug!("Backend probe skipped: not configured");
        return ConnectivityState {
            status: Connectivity::Unreachable,
            diagnostic: Some("Backend is not configured".to_string()),
            should_reset_credential: false,
        };
    }

    let outcome = match tokio::time::timeout(
        timeout,
        client.count_rows(PROBE_COLLECTION, PROBE_ROW_LIMIT),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(timeout)),
    };

    let state = match outcome {
        Ok(total) => ConnectivityState {
            status: Connectivity::Reachable,
            diagnostic: Some(match total {
                Some(n) => format!("Connected ({n} rows in '{PROBE_COLLECTION}')"),
                None => "Connected".to_string(),
            }),
            should_reset_credential: false,
        },
        Err(err @ BackendError::Unauthorized { .. }) => ConnectivityState {
            status: Connectivity::Reachable,
            diagnostic: Some(format!("Endpoint reachable, access denied: {err}")),
            should_reset_credential: false,
        },
        Err(err) => ConnectivityState {
            status: Connectivity::Unreachable,
            diagnostic: Some(err.to_string()),
            should_reset_credential: false,
        },
    };
    info!(
        endpoint = %client.endpoint(),
        status = state.status.as_str(),
        "Backend probe finished"
    );
    state
}
