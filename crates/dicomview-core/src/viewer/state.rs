use serde::{Deserialize, Serialize};

use crate::models::{Series, StudyManifest};

use super::ViewerError;

const ZOOM_STEP: f64 = 1.2;
const MAX_ZOOM: f64 = 5.0;
const MIN_ZOOM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Prev,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Display settings applied on top of the toolkit's default viewport. The
/// window/level always comes from the image itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ViewerSettings {
    pub zoom: f64,
    pub invert: bool,
    pub annotations: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            invert: false,
            annotations: true,
        }
    }
}

/// Series and slice selection over one study manifest.
#[derive(Debug, Clone)]
pub struct ViewerState {
    manifest: StudyManifest,
    selected_series: Option<usize>,
    /// Cached `image_ids()` of the selected series
    image_ids: Vec<String>,
    current_image: usize,
    settings: ViewerSettings,
}

impl ViewerState {
    /// Start on the first series, first image, when the study has any series.
    pub fn new(manifest: StudyManifest) -> Self {
        let mut state = Self {
            manifest,
            selected_series: None,
            image_ids: Vec::new(),
            current_image: 0,
            settings: ViewerSettings::default(),
        };
        if !state.manifest.series.is_empty() {
            state.set_series(0);
        }
        state
    }

    fn set_series(&mut self, index: usize) {
        self.image_ids = self.manifest.series[index].image_ids();
        self.selected_series = Some(index);
        self.current_image = 0;
    }

    pub fn manifest(&self) -> &StudyManifest {
        &self.manifest
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn selected_series_index(&self) -> Option<usize> {
        self.selected_series
    }

    pub fn selected_series(&self) -> Option<&Series> {
        self.selected_series
            .and_then(|idx| self.manifest.series.get(idx))
    }

    pub fn select_series(&mut self, index: usize) -> Result<(), ViewerError> {
        let count = self.manifest.series.len();
        if index >= count {
            return Err(ViewerError::SeriesOutOfRange { index, count });
        }
        self.set_series(index);
        Ok(())
    }

    pub fn image_ids(&self) -> &[String] {
        &self.image_ids
    }

    pub fn current_index(&self) -> usize {
        self.current_image
    }

    pub fn current_image_id(&self) -> Option<&str> {
        self.image_ids.get(self.current_image).map(String::as_str)
    }

    pub fn can_navigate(&self, direction: NavDirection) -> bool {
        match direction {
            NavDirection::Prev => self.current_image > 0,
            NavDirection::Next => self.current_image + 1 < self.image_ids.len(),
        }
    }

    /// Step one slice, clamped to the ends of the series.
    pub fn navigate(&mut self, direction: NavDirection) {
        if self.image_ids.is_empty() {
            return;
        }
        self.current_image = match direction {
            NavDirection::Prev => self.current_image.saturating_sub(1),
            NavDirection::Next => (self.current_image + 1).min(self.image_ids.len() - 1),
        };
    }

    /// "3 / 10" for the current slice, or `None` with nothing to show.
    pub fn position_label(&self) -> Option<String> {
        self.current_image_id()
            .map(|_| format!("{} / {}", self.current_image + 1, self.image_ids.len()))
    }

    pub fn zoom(&mut self, direction: ZoomDirection) {
        let zoom = self.settings.zoom;
        self.settings.zoom = match direction {
            ZoomDirection::In => (zoom * ZOOM_STEP).min(MAX_ZOOM),
            ZoomDirection::Out => (zoom / ZOOM_STEP).max(MIN_ZOOM),
        };
    }

    pub fn zoom_percent(&self) -> String {
        format!("{:.0}%", self.settings.zoom * 100.0)
    }

    pub fn toggle_invert(&mut self) {
        self.settings.invert = !self.settings.invert;
    }

    pub fn toggle_annotations(&mut self) {
        self.settings.annotations = !self.settings.annotations;
    }

    /// Ids within `radius` slices of the current one, nearest first,
    /// the following slice before the preceding one.
    pub fn prefetch_ids(&self, radius: usize) -> Vec<&str> {
        let mut ids = Vec::new();
        for distance in 1..=radius {
            if let Some(id) = self.image_ids.get(self.current_image + distance) {
                ids.push(id.as_str());
            }
            if let Some(idx) = self.current_image.checked_sub(distance) {
                ids.push(self.image_ids[idx].as_str());
            }
        }
        ids
    }
}
