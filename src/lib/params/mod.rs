//! Job parameters and the head catalog they refer to.
//!
//! A [`JobParameters`] is a resolved, read-only snapshot of everything the
//! operator chose for one run. Quantities derived from it (head size, step
//! counts, pattern shape) live in [`Layout`], computed once per run.

use std::collections::BTreeMap;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{GenError, GenResult};
use crate::geometry::{choose_auto_pattern_shape, head_dimensions, steps_from_frame};
use crate::validation;

/// Default axis acceleration, mm/s²
pub const ACCEL_LINEAR_DEFAULT: f64 = 300.0;

/// Jobs above this many hits are worth a second look before running
pub const LARGE_JOB_HITS: u64 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Xy<T> {
    pub x: T,
    pub y: T,
}

impl Xy<f64> {
    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Shape of the elementary-cell punch pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternParams {
    /// Pick `nx`, `ny` from the punch count instead of using the given values
    pub auto_shape: bool,
    pub nx: u32,
    pub ny: u32,
    /// Hits per elementary cell in one layer
    pub punches_per_cell: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Punching {
    /// Start shallow and deepen by one layer thickness per layer
    pub progressive: bool,
    /// mm
    pub initial_depth: f64,
    /// mm
    pub max_depth: f64,
}

/// Where the head parks while the operator lays the next layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub pause_seconds: f64,
    #[serde(default)]
    pub buzzer_seconds: f64,
    /// Raise the rest height by one layer thickness per layer
    pub grow_z: bool,
}

/// mm/min
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRates {
    pub xy: f64,
    pub z_insert: f64,
    pub z_extract: f64,
}

/// How the punched area is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    /// Head step counts are given directly
    #[default]
    Steps,
    /// Frame dimensions are given and step counts derived from them
    Frame,
}

fn default_acceleration() -> f64 {
    ACCEL_LINEAR_DEFAULT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParameters {
    /// Real material layers
    pub layers: u32,
    /// Idle layers run after the real ones
    pub virtual_layers: u32,
    /// mm
    pub layer_thickness: f64,
    /// Height above the material the needles retract to between hits, mm
    pub standoff: f64,
    /// Distance between neighbouring needles, mm
    pub needle_spacing: Xy<f64>,
    pub selected_head: String,
    pub pattern: PatternParams,
    #[serde(default)]
    pub sizing_mode: SizingMode,
    pub head_steps: Xy<u32>,
    /// mm, read only when sizing by frame
    #[serde(default)]
    pub frame: Xy<f64>,
    pub punching: Punching,
    pub rest_position: RestPosition,
    pub feed_rates: FeedRates,
    /// mm/s²
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,
    /// Name of a [`RowOrder`](crate::ordering::RowOrder)
    pub row_order: String,
    pub random_order: bool,
    pub random_offsets: bool,
    /// mm
    pub random_offset_coefficient: f64,
    pub alternate_direction: bool,
    #[serde(default)]
    pub swap_axes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Head {
    /// Needle count along X
    pub x: u32,
    /// Needle count along Y
    pub y: u32,
    /// Picture shown by the UI
    #[serde(default)]
    pub image: Option<String>,
}

/// Needle heads the shop owns, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadCatalog {
    pub heads: BTreeMap<String, Head>,
}

impl HeadCatalog {
    pub fn get(&self, name: &str) -> GenResult<&Head> {
        self.heads
            .get(name)
            .ok_or_else(|| GenError::MissingParameter(format!("heads.{name}")))
    }
}

impl JobParameters {
    /// Validate a raw record and catalog, then read them.
    pub fn from_json(record: Value, catalog: Value) -> GenResult<(JobParameters, HeadCatalog)> {
        validation::check(&record, &catalog)?;
        let params: JobParameters = serde_json::from_value(record)?;
        let catalog: HeadCatalog = serde_json::from_value(catalog)?;
        Ok((params, catalog))
    }

    pub fn total_layers(&self) -> u32 {
        self.layers + self.virtual_layers
    }

    /// Height of the finished part, whole mm.
    pub fn frame_height(&self) -> u32 {
        (self.layers as f64 * self.layer_thickness) as u32
    }

    pub fn layout(&self, catalog: &HeadCatalog) -> GenResult<Layout> {
        let head = catalog.get(&self.selected_head)?;
        let head_width = head_dimensions(self.needle_spacing.to_vector(), head.x, head.y);

        let (steps_x, rows_y) = match self.sizing_mode {
            SizingMode::Steps => (self.head_steps.x, self.head_steps.y),
            SizingMode::Frame => steps_from_frame(self.frame.to_vector(), head_width),
        };

        let (nx, ny) = if self.pattern.auto_shape {
            let shape = choose_auto_pattern_shape(self.pattern.punches_per_cell);
            info!(nx = shape.0, ny = shape.1, "Chose pattern shape automatically");
            shape
        } else {
            (self.pattern.nx, self.pattern.ny)
        };

        Ok(Layout {
            head_name: self.selected_head.clone(),
            needles_x: head.x,
            needles_y: head.y,
            head_width,
            steps_x,
            rows_y,
            nx,
            ny,
        })
    }
}

/// Per-run quantities derived from the parameters and the selected head.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub head_name: String,
    pub needles_x: u32,
    pub needles_y: u32,
    /// Area the head covers in one position, mm
    pub head_width: Vector2<f64>,
    pub steps_x: u32,
    pub rows_y: u32,
    pub nx: u32,
    pub ny: u32,
}

impl Layout {
    pub fn hits_per_layer(&self, params: &JobParameters) -> u64 {
        params.pattern.punches_per_cell as u64 * self.steps_x as u64 * self.rows_y as u64
    }

    /// Hits over every layer, idle ones included.
    pub fn total_hits(&self, params: &JobParameters) -> u64 {
        self.hits_per_layer(params) * params.total_layers() as u64
    }

    /// Punched area, mm. In frame mode this is at least the frame.
    pub fn punched_area(&self) -> Vector2<f64> {
        Vector2::new(
            self.steps_x as f64 * self.head_width.x,
            self.rows_y as f64 * self.head_width.y,
        )
    }

    /// How far the punched area sticks out past the frame on each side, mm.
    pub fn overhangs(&self, params: &JobParameters) -> Vector2<f64> {
        (self.punched_area() - params.frame.to_vector()) / 2.0
    }

    /// `<x>x<y>x<height> <hits> hits <head>.tap`
    pub fn suggested_file_name(&self, params: &JobParameters) -> String {
        let size = match params.sizing_mode {
            SizingMode::Frame => params.frame.to_vector(),
            SizingMode::Steps => self.punched_area(),
        };
        format!(
            "{}x{}x{} {} hits {}.tap",
            size.x,
            size.y,
            params.frame_height(),
            params.pattern.punches_per_cell,
            self.head_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::tests::{minimal_catalog, minimal_record};
    use serde_json::json;

    fn load(record: Value) -> (JobParameters, HeadCatalog) {
        JobParameters::from_json(record, minimal_catalog()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let (params, catalog) = load(minimal_record());
        assert_eq!(params.sizing_mode, SizingMode::Steps);
        assert!(!params.swap_axes);
        assert_eq!(params.rest_position.buzzer_seconds, 0.0);
        assert_eq!(params.acceleration, ACCEL_LINEAR_DEFAULT);
        assert_eq!(catalog.get("test").unwrap().x, 4);
        assert_eq!(params.total_layers(), 1);
    }

    #[test]
    fn test_layout_by_steps() {
        let (params, catalog) = load(minimal_record());
        let layout = params.layout(&catalog).unwrap();
        assert_eq!((layout.steps_x, layout.rows_y), (2, 2));
        assert_eq!((layout.nx, layout.ny), (12, 10));
        assert_eq!(layout.head_width, Vector2::new(32.0, 32.0));
        assert_eq!(layout.hits_per_layer(&params), 40);
        assert_eq!(layout.suggested_file_name(&params), "64x64x0 10 hits test.tap");
    }

    #[test]
    fn test_layout_by_frame() {
        let mut record = minimal_record();
        record["sizing_mode"] = json!("frame");
        record["pattern"]["auto_shape"] = json!(false);
        record["layers"] = json!(25);
        let (params, catalog) = load(record);
        let layout = params.layout(&catalog).unwrap();
        // 100 / 32 rounds up to 4 steps
        assert_eq!((layout.steps_x, layout.rows_y), (4, 4));
        assert_eq!((layout.nx, layout.ny), (12, 10));
        assert_eq!(layout.overhangs(&params), Vector2::new(14.0, 14.0));
        assert_eq!(params.frame_height(), 20);
        assert_eq!(layout.total_hits(&params), 25 * 16 * 10);
        assert_eq!(layout.suggested_file_name(&params), "100x100x20 10 hits test.tap");
    }

    #[test]
    fn test_unknown_head() {
        let (mut params, catalog) = load(minimal_record());
        params.selected_head = "missing".to_string();
        let err = params.layout(&catalog).unwrap_err();
        assert!(matches!(err, GenError::MissingParameter(key) if key == "heads.missing"));
    }

    #[test]
    fn test_from_json_rejects_bad_records() {
        let mut record = minimal_record();
        record["layers"] = json!("10");
        let err = JobParameters::from_json(record, minimal_catalog()).unwrap_err();
        assert!(matches!(err, GenError::NonNumericInput { .. }));

        let mut record = minimal_record();
        record["layers"] = json!(1.5);
        let err = JobParameters::from_json(record, minimal_catalog()).unwrap_err();
        assert!(matches!(err, GenError::InvalidParameters(_)));

        let mut record = minimal_record();
        record["sizing_mode"] = json!("area");
        let err = JobParameters::from_json(record, minimal_catalog()).unwrap_err();
        assert!(matches!(err, GenError::InvalidParameters(_)));
    }
}
