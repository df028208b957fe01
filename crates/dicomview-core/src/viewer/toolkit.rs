//! Narrow capability interface over an external imaging toolkit.
//!
//! Decoding and drawing stay inside the toolkit. The viewer only enables a
//! surface, loads images by id, and adjusts the viewport. Image operations
//! require an `EnabledSurface`, which can only be obtained by enabling the
//! surface first, and which disables it again on drop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::ViewerSettings;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Failed to enable surface: {0}")]
    Enable(String),

    #[error("Failed to load image {image_id}: {message}")]
    ImageLoad { image_id: String, message: String },

    #[error("Failed to display image: {0}")]
    Display(String),

    #[error("No image is displayed on the surface")]
    NoImage,
}

/// Value-of-interest window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voi {
    pub window_center: f64,
    pub window_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub scale: f64,
    pub translation: (f64, f64),
    pub voi: Voi,
    pub invert: bool,
}

impl Viewport {
    /// Apply zoom and inversion; the image's own window is kept.
    pub fn apply(&mut self, settings: &ViewerSettings) {
        self.scale = settings.zoom;
        self.invert = settings.invert;
    }
}

#[async_trait]
pub trait ImagingToolkit: Send + Sync {
    /// Drawing target, e.g. a canvas element handle.
    type Surface: Send + Sync;
    type Image: Send + Sync;

    fn enable(&self, surface: &Self::Surface) -> Result<(), ToolkitError>;

    /// Load (and cache) an image; `bearer` is sent as the Authorization token.
    async fn load_image(&self, image_id: &str, bearer: Option<&str>) -> Result<Self::Image, ToolkitError>;

    fn default_viewport(&self, surface: &Self::Surface, image: &Self::Image) -> Viewport;

    fn display_image(&self, surface: &Self::Surface, image: &Self::Image, viewport: &Viewport) -> Result<(), ToolkitError>;

    fn get_viewport(&self, surface: &Self::Surface) -> Option<Viewport>;

    fn set_viewport(&self, surface: &Self::Surface, viewport: &Viewport) -> Result<(), ToolkitError>;

    fn resize(&self, surface: &Self::Surface) -> Result<(), ToolkitError>;

    fn disable(&self, surface: &Self::Surface);
}

/// A surface that has been enabled on a toolkit. Disabled on drop.
pub struct EnabledSurface<'t, T: ImagingToolkit> {
    toolkit: &'t T,
    surface: T::Surface,
}

impl<'t, T: ImagingToolkit> EnabledSurface<'t, T> {
    pub fn enable(toolkit: &'t T, surface: T::Surface) -> Result<Self, ToolkitError> {
        toolkit.enable(&surface)?;
        debug!("Imaging surface enabled");
        Ok(Self { toolkit, surface })
    }

    pub fn surface(&self) -> &T::Surface {
        &self.surface
    }

    /// Load `image_id`, apply `settings` to its default viewport and draw it.
    pub async fn show(&self, image_id: &str, settings: &ViewerSettings, bearer: Option<&str>) -> Result<Viewport, ToolkitError> {
        let image = self.toolkit.load_image(image_id, bearer).await?;
        let mut viewport = self.toolkit.default_viewport(&self.surface, &image);
        viewport.apply(settings);
        self.toolkit.display_image(&self.surface, &image, &viewport)?;
        Ok(viewport)
    }

    /// Re-apply settings to whatever is on screen, e.g. after a zoom change.
    pub fn apply_settings(&self, settings: &ViewerSettings) -> Result<(), ToolkitError> {
        let mut viewport = self
            .toolkit
            .get_viewport(&self.surface)
            .ok_or(ToolkitError::NoImage)?;
        viewport.apply(settings);
        self.toolkit.set_viewport(&self.surface, &viewport)
    }

    pub fn resize(&self) -> Result<(), ToolkitError> {
        self.toolkit.resize(&self.surface)
    }
}

impl<T: ImagingToolkit> Drop for EnabledSurface<'_, T> {
    fn drop(&mut self) {
        self.toolkit.disable(&self.surface);
        debug!("Imaging surface disabled");
    }
}

