//! Text layout of the punch program.
//!
//! The controller reads this format line by line, so column widths and the
//! layer marker shape stay fixed.

use std::fmt::Display;
use std::io::{Result, Write};

use crate::estimator::{seconds_to_dhms, TimeEstimate};
use crate::instruction::{Instruction, Layer};
use crate::params::{JobParameters, Layout, SizingMode};

const FIELD_WIDTH_NORMAL: usize = 20;
const FIELD_WIDTH_EXTENDED: usize = 35;
/// Instruction text is padded to this width before the layer comment
const COMMAND_WIDTH: usize = 16;
const MARKER_ARROWS: usize = 10;
const HITS_MILESTONE: u64 = 50_000;

/// Statistics printed at the top of the program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramHeader {
    pub head_name: String,
    pub needles_x: u32,
    pub needles_y: u32,
    pub sizing_mode: SizingMode,
    pub frame_length_x: f64,
    pub frame_length_y: f64,
    pub steps_x: u32,
    pub rows_y: u32,
    pub frame_height: u32,
    pub real_layers: u32,
    pub virtual_layers: u32,
    pub punches_per_cell: u32,
    pub cell_size_x: f64,
    pub cell_size_y: f64,
    pub nx: u32,
    pub ny: u32,
    pub random_offsets: bool,
    pub random_offset_coefficient: f64,
    pub estimate: Option<TimeEstimate>,
}

impl ProgramHeader {
    pub fn new(params: &JobParameters, layout: &Layout, estimate: Option<TimeEstimate>) -> Self {
        ProgramHeader {
            head_name: layout.head_name.clone(),
            needles_x: layout.needles_x,
            needles_y: layout.needles_y,
            sizing_mode: params.sizing_mode,
            frame_length_x: params.frame.x,
            frame_length_y: params.frame.y,
            steps_x: layout.steps_x,
            rows_y: layout.rows_y,
            frame_height: params.frame_height(),
            real_layers: params.layers,
            virtual_layers: params.virtual_layers,
            punches_per_cell: params.pattern.punches_per_cell,
            cell_size_x: params.needle_spacing.x,
            cell_size_y: params.needle_spacing.y,
            nx: layout.nx,
            ny: layout.ny,
            random_offsets: params.random_offsets,
            random_offset_coefficient: params.random_offset_coefficient,
            estimate,
        }
    }

    pub fn hits_per_layer(&self) -> u64 {
        self.punches_per_cell as u64 * self.steps_x as u64 * self.rows_y as u64
    }

    pub fn layers_for_milestone(&self) -> u64 {
        match self.hits_per_layer() {
            0 => 0,
            hits => HITS_MILESTONE / hits,
        }
    }

    /// Hits per cm², with the needle spacing in mm.
    pub fn density(&self) -> f64 {
        self.punches_per_cell as f64 / self.cell_size_x / self.cell_size_y * 100.0
    }

    /// Layers after which the needles come back to the same points.
    pub fn repeat_period(&self) -> u32 {
        match self.punches_per_cell {
            0 => 0,
            ppc => self.nx * self.ny / ppc,
        }
    }
}

pub struct Formatter<W: Write> {
    out: W,
    real_layers: u32,
    total_layers: u32,
    layers_written: u32,
}

impl<W: Write> Formatter<W> {
    pub fn new(out: W, real_layers: u32, total_layers: u32) -> Self {
        Formatter {
            out,
            real_layers,
            total_layers,
            layers_written: 0,
        }
    }

    fn empty_line(&mut self) -> Result<()> {
        writeln!(self.out, ";")
    }

    fn info(&mut self, name: &str, value: impl Display, width: usize) -> Result<()> {
        writeln!(self.out, "; {name:<width$}: {value}")
    }

    pub fn write_header(&mut self, h: &ProgramHeader) -> Result<()> {
        let w = FIELD_WIDTH_NORMAL;

        self.empty_line()?;
        self.info("Needle head", &h.head_name, w)?;
        self.empty_line()?;
        if let Some(estimate) = &h.estimate {
            self.info("Work time", estimate, w)?;
            self.info("Layer time", seconds_to_dhms(estimate.layer_seconds), w)?;
            self.empty_line()?;
        }
        self.info("Needles X", h.needles_x, w)?;
        self.info("Needles Y", h.needles_y, w)?;
        self.empty_line()?;

        match h.sizing_mode {
            SizingMode::Frame => {
                self.info("Frame length X", h.frame_length_x, w)?;
                self.info("Frame length Y", h.frame_length_y, w)?;
            }
            SizingMode::Steps => {
                self.info("Steps X", h.steps_x, w)?;
                self.info("Steps Y", h.rows_y, w)?;
            }
        }
        self.info("Frame height Z", h.frame_height, w)?;
        self.empty_line()?;
        self.info("Layers", h.real_layers, w)?;
        self.empty_line()?;

        let w = FIELD_WIDTH_EXTENDED;
        self.info("Hits per layer", h.hits_per_layer(), w)?;
        self.info("Layers for 50'000 hits", h.layers_for_milestone(), w)?;
        self.empty_line()?;
        self.info("Punch density (hits/sq.cm)", h.density(), w)?;
        self.info("Hits per elementary cell", h.punches_per_cell, w)?;
        self.empty_line()?;
        self.info("Pattern nx, ny", format!("{}, {}", h.nx, h.ny), w)?;

        if h.random_offsets {
            writeln!(
                self.out,
                "; Every hit is shifted by a random amount from 0 to {} mm along X and Y in any direction",
                h.random_offset_coefficient
            )?;
        }

        self.empty_line()?;
        let clarification = if h.random_offsets {
            " (up to the random offsets)"
        } else {
            ""
        };
        writeln!(
            self.out,
            "; Every {} layers the needles hit the same points{}",
            h.repeat_period(),
            clarification
        )?;
        self.empty_line()
    }

    /// Global feed directive
    pub fn write_speed(&mut self, speed: f64) -> Result<()> {
        writeln!(self.out, "F {speed:.1}")
    }

    pub fn write_layer_marker(&mut self, layer: &Layer) -> Result<()> {
        let open = "<".repeat(MARKER_ARROWS);
        let close = ">".repeat(MARKER_ARROWS);
        writeln!(self.out, ";")?;
        writeln!(self.out, "; {open} [{}] {} {close}", layer.number, layer.kind())?;
        writeln!(self.out, ";")
    }

    pub fn write_instruction(&mut self, instruction: &Instruction, layer_number: usize) -> Result<()> {
        let text = instruction.to_string();
        writeln!(
            self.out,
            "{text:<COMMAND_WIDTH$};{layer_number}/{}",
            self.real_layers
        )
    }

    /// Write a layer and return overall progress in percent.
    pub fn write_layer(&mut self, layer: &Layer) -> Result<f64> {
        self.write_layer_marker(layer)?;
        for instruction in layer.instructions.iter() {
            self.write_instruction(instruction, layer.number)?;
        }
        self.layers_written += 1;
        Ok(self.progress())
    }

    pub fn progress(&self) -> f64 {
        if self.total_layers == 0 {
            return 100.0;
        }
        self.layers_written as f64 / self.total_layers as f64 * 100.0
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
