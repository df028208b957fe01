//! Viewer state and the imaging toolkit seam.
//!
//! - `ViewerState`: selected series, current slice, zoom/invert settings
//! - `ImagingToolkit` / `EnabledSurface`: capability interface to the
//!   external renderer
//! - `prefetch_adjacent`: warm the toolkit cache with neighbouring slices

pub mod prefetch;
pub mod state;
pub mod toolkit;

use thiserror::Error;

pub use prefetch::{prefetch_adjacent, PrefetchReport, DEFAULT_PREFETCH_RADIUS};
pub use state::{NavDirection, ViewerSettings, ViewerState, ZoomDirection};
pub use toolkit::{EnabledSurface, ImagingToolkit, ToolkitError, Viewport, Voi};

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Series {index} does not exist (study has {count})")]
    SeriesOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Toolkit(#[from] ToolkitError),
}

/// Draw the current slice of `state`. `Ok(None)` when no slice is selected.
pub async fn show_current<T: ImagingToolkit>(
    surface: &EnabledSurface<'_, T>,
    state: &ViewerState,
    bearer: Option<&str>,
) -> Result<Option<Viewport>, ViewerError> {
    let Some(image_id) = state.current_image_id() else {
        return Ok(None);
    };
    let viewport = surface.show(image_id, state.settings(), bearer).await?;
    Ok(Some(viewport))
}
