use futures::future::join_all;
use tracing::{debug, warn};

use super::{ImagingToolkit, ViewerState};

/// Slices on each side of the current one to prefetch
pub const DEFAULT_PREFETCH_RADIUS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub loaded: usize,
    pub failed: Vec<String>,
}

/// Load the slices around the current one so stepping through the series
/// hits the toolkit's cache. Loads run concurrently; a failure is recorded
/// and does not affect the others.
pub async fn prefetch_adjacent<T: ImagingToolkit>(
    toolkit: &T,
    state: &ViewerState,
    radius: usize,
    bearer: Option<&str>,
) -> PrefetchReport {
    let ids = state.prefetch_ids(radius);
    if ids.is_empty() {
        return PrefetchReport::default();
    }

    let loads = ids.iter().map(|&id| async move {
        let result = toolkit.load_image(id, bearer).await;
        (id, result)
    });

    let mut report = PrefetchReport::default();
    for (id, result) in join_all(loads).await {
        match result {
            Ok(_) => report.loaded += 1,
            Err(e) => {
                warn!(image_id = id, error = %e, "Prefetch failed");
                report.failed.push(id.to_string());
            }
        }
    }

    debug!(loaded = report.loaded, failed = report.failed.len(), "Prefetch complete");
    report
}
