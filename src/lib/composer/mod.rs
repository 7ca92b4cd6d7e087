//! Builds the motion of each layer from the job parameters.
//!
//! Layers come out one at a time through [`Composer`]'s `Iterator` impl, so
//! the caller can write each layer before the next is built. The only state
//! carried between layers is the [`HitWindow`].

use rand::Rng;
use tracing::{debug, warn};

use crate::error::GenResult;
use crate::geometry::{is_pattern_period_misaligned, jitter, result_offset_list, Offset};
use crate::instruction::{xyf, zf, Instruction, Layer, PosAndFeed};
use crate::ordering::ordered_rows;
use crate::params::{JobParameters, Layout};

/// `M` codes that switch the buzzer on and off
const SIGNAL_ON: &str = "M3";
const SIGNAL_OFF: &str = "M5";

/// The slice `[start, end)` of the offset list punched in the current layer.
///
/// It moves forward one punch count per layer and returns to the beginning
/// once its end has reached the end of the list. When the list length is not a
/// multiple of the punch count, the last window before the wrap is short.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HitWindow {
    pub start: usize,
    pub end: usize,
    size: usize,
}

impl HitWindow {
    pub fn new(size: usize) -> HitWindow {
        HitWindow {
            start: 0,
            end: size,
            size,
        }
    }

    pub fn slice<'o>(&self, offsets: &'o [Offset]) -> &'o [Offset] {
        let len = offsets.len();
        &offsets[self.start.min(len)..self.end.min(len)]
    }

    pub fn advance(&mut self, len: usize) {
        if self.end < len {
            self.start += self.size;
            self.end += self.size;
        } else {
            *self = HitWindow::new(self.size);
        }
    }
}

/// Punch depth for a layer: deepening by one layer thickness per layer up to
/// the maximum when progressive, otherwise always the maximum.
pub fn punch_depth(params: &JobParameters, layer_index: u32) -> f64 {
    let p = &params.punching;
    if p.progressive {
        (p.initial_depth + params.layer_thickness * layer_index as f64).min(p.max_depth)
    } else {
        p.max_depth
    }
}

/// Height of the rest position for a layer.
pub fn rest_z(params: &JobParameters, layer_index: u32) -> f64 {
    let rest = &params.rest_position;
    if rest.grow_z {
        rest.z + params.layer_thickness * layer_index as f64
    } else {
        rest.z
    }
}

/// End-of-layer dwell, with the buzzer sounding at its start when configured.
pub fn end_of_layer_signal(pause_seconds: f64, buzzer_seconds: f64) -> Vec<Instruction> {
    if buzzer_seconds <= 0.0 {
        return vec![Instruction::pause_seconds(pause_seconds)];
    }

    let mut pause = pause_seconds;
    if buzzer_seconds > pause {
        warn!(
            buzzer_seconds,
            pause_seconds, "Buzzer outlasts the end-of-layer pause, extending the pause to match"
        );
        pause = buzzer_seconds;
    }

    let mut out = vec![
        Instruction::Raw(SIGNAL_ON.to_string()),
        Instruction::pause_seconds(buzzer_seconds),
        Instruction::Raw(SIGNAL_OFF.to_string()),
    ];
    let remaining = pause - buzzer_seconds;
    if remaining > 0.0 {
        out.push(Instruction::pause_seconds(remaining));
    }
    out
}

pub struct Composer<'a, R: Rng + ?Sized> {
    params: &'a JobParameters,
    layout: &'a Layout,
    rows: Vec<usize>,
    offsets: Vec<Offset>,
    window: HitWindow,
    rng: &'a mut R,
    next_index: u32,
}

impl<'a, R: Rng + ?Sized> Composer<'a, R> {
    /// Fails only when the row order policy is unknown.
    pub fn new(params: &'a JobParameters, layout: &'a Layout, rng: &'a mut R) -> GenResult<Self> {
        let rows = ordered_rows(layout.rows_y as usize, &params.row_order)?;
        let ppc = params.pattern.punches_per_cell;

        // Jitter is drawn per hit while composing, so the list itself stays unperturbed
        let offsets = result_offset_list(
            layout.nx,
            layout.ny,
            params.needle_spacing.x,
            params.needle_spacing.y,
            false,
            params.random_offset_coefficient,
            params.random_order,
            &mut *rng,
        );

        if is_pattern_period_misaligned(layout.nx, layout.ny, ppc) {
            warn!(
                nx = layout.nx,
                ny = layout.ny,
                punches_per_cell = ppc,
                "Pattern size is not a multiple of the punch count, some layers will get fewer hits"
            );
        }

        Ok(Composer {
            params,
            layout,
            rows,
            offsets,
            window: HitWindow::new(ppc as usize),
            rng,
            next_index: 0,
        })
    }

    pub fn window(&self) -> HitWindow {
        self.window
    }

    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    fn push_move(&self, out: &mut Vec<Instruction>, p: PosAndFeed) {
        let p = if self.params.swap_axes { p.swapped() } else { p };
        out.push(p.into());
    }

    fn go_to_rest(&self, out: &mut Vec<Instruction>, z: f64) {
        let params = self.params;
        self.push_move(out, zf(z, params.feed_rates.z_extract));
        self.push_move(
            out,
            xyf(params.rest_position.x, params.rest_position.y, params.feed_rates.xy),
        );
    }

    fn compose_layer(&mut self, index: u32) -> Layer {
        let params = self.params;
        let feeds = &params.feed_rates;
        let z_offset = params.layer_thickness * index as f64;
        let depth = punch_depth(params, index);
        let park_z = rest_z(params, index);
        let reversed = params.alternate_direction && (index + 1) % 2 == 1;

        debug!(layer = index + 1, depth, window = ?self.window, "Composing layer");

        let mut out = Vec::new();
        self.go_to_rest(&mut out, park_z);

        let mut steps: Vec<u32> = (0..self.layout.steps_x).collect();
        let mut hits: Vec<Offset> = self.window.slice(&self.offsets).to_vec();
        if reversed {
            steps.reverse();
            hits.reverse();
        }

        let head = self.layout.head_width;
        for &row in self.rows.iter() {
            let y = head.y * row as f64;
            for &step in steps.iter() {
                let x = head.x * step as f64;
                for hit in hits.iter() {
                    let mut p = Offset::new(x, y) + hit;
                    if params.random_offsets {
                        p += jitter(params.random_offset_coefficient, &mut *self.rng);
                    }
                    self.push_move(&mut out, xyf(p.x, p.y, feeds.xy));
                    self.push_move(&mut out, zf(z_offset - depth, feeds.z_insert));
                    self.push_move(&mut out, zf(params.standoff + z_offset, feeds.z_extract));
                }
            }
        }

        self.window.advance(self.offsets.len());

        self.go_to_rest(&mut out, park_z);
        out.extend(end_of_layer_signal(
            params.rest_position.pause_seconds,
            params.rest_position.buzzer_seconds,
        ));

        Layer {
            number: index as usize + 1,
            is_virtual: index >= params.layers,
            instructions: out,
        }
    }
}

impl<'a, R: Rng + ?Sized> Iterator for Composer<'a, R> {
    type Item = Layer;

    fn next(&mut self) -> Option<Layer> {
        if self.next_index >= self.params.total_layers() {
            return None;
        }
        let layer = self.compose_layer(self.next_index);
        self.next_index += 1;
        Some(layer)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.params.total_layers() - self.next_index) as usize;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{HeadCatalog, JobParameters};
    use crate::validation::tests::{minimal_catalog, minimal_record};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};

    fn setup(record: Value) -> (JobParameters, Layout) {
        let (params, catalog): (JobParameters, HeadCatalog) =
            JobParameters::from_json(record, minimal_catalog()).unwrap();
        let layout = params.layout(&catalog).unwrap();
        (params, layout)
    }

    fn compose(params: &JobParameters, layout: &Layout, seed: u64) -> Vec<Layer> {
        let mut rng = StdRng::seed_from_u64(seed);
        Composer::new(params, layout, &mut rng).unwrap().collect()
    }

    fn moves(layer: &Layer) -> Vec<PosAndFeed> {
        layer
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Move(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_hit_window_wraps() {
        let mut w = HitWindow::new(10);
        let mut seen = vec![];
        for _ in 0..5 {
            seen.push((w.start, w.end));
            w.advance(25);
        }
        assert_eq!(seen, vec![(0, 10), (10, 20), (20, 30), (0, 10), (10, 20)]);

        let offsets = vec![Offset::zeros(); 25];
        let short = HitWindow {
            start: 20,
            end: 30,
            size: 10,
        };
        assert_eq!(short.slice(&offsets).len(), 5);
    }

    #[test]
    fn test_layer_structure() {
        let (params, layout) = setup(minimal_record());
        let layers = compose(&params, &layout, 0);
        assert_eq!(layers.len(), 1);
        let layer = &layers[0];
        assert_eq!(layer.number, 1);
        assert!(!layer.is_virtual);

        // rest (2) + 2 rows * 2 steps * 10 hits * 3 moves + rest (2) + pause
        assert_eq!(layer.instructions.len(), 2 + 2 * 2 * 10 * 3 + 2 + 1);
        assert_eq!(layer.instructions[0], Instruction::Move(zf(100.0, 1000.0)));
        assert_eq!(layer.instructions[1], Instruction::Move(xyf(0.0, -400.0, 3000.0)));
        assert_eq!(layer.instructions[2], Instruction::Move(xyf(0.0, 0.0, 3000.0)));
        assert_eq!(layer.instructions[3], Instruction::Move(zf(-18.0, 1000.0)));
        assert_eq!(layer.instructions[4], Instruction::Move(zf(30.0, 1000.0)));
        assert_eq!(layer.instructions.last(), Some(&Instruction::Pause(0.0)));
    }

    #[test]
    fn test_window_moves_between_layers() {
        let mut record = minimal_record();
        record["layers"] = json!(13);
        let (params, layout) = setup(record);
        let layers = compose(&params, &layout, 0);
        let offsets = crate::geometry::generate_offset_list(12, 10, 8.0, 8.0);

        // 120 offsets, 10 per layer: layer 12 uses the last window, layer 13 wraps
        let first_hit = |layer: &Layer| moves(layer)[2];
        assert_eq!(first_hit(&layers[1]).x, Some(offsets[10].x));
        assert_eq!(first_hit(&layers[1]).y, Some(offsets[10].y));
        assert_eq!(first_hit(&layers[11]).x, Some(offsets[110].x));
        assert_eq!(first_hit(&layers[12]).x, Some(offsets[0].x));
        assert_eq!(first_hit(&layers[12]).y, Some(offsets[0].y));
    }

    #[test]
    fn test_progressive_depth_and_virtual_layers() {
        let mut record = minimal_record();
        record["layers"] = json!(3);
        record["virtual_layers"] = json!(2);
        record["layer_thickness"] = json!(5.0);
        record["punching"] = json!({ "progressive": true, "initial_depth": 5, "max_depth": 20 });
        let (params, layout) = setup(record);
        let layers = compose(&params, &layout, 0);

        let kinds: Vec<bool> = layers.iter().map(|l| l.is_virtual).collect();
        assert_eq!(kinds, vec![false, false, false, true, true]);

        let depths: Vec<f64> = (0..5).map(|i| punch_depth(&params, i)).collect();
        assert_eq!(depths, vec![5.0, 10.0, 15.0, 20.0, 20.0]);

        for (i, layer) in layers.iter().enumerate() {
            let z_offset = 5.0 * i as f64;
            assert_eq!(moves(layer)[3].z, Some(z_offset - depths[i]));
            assert_eq!(moves(layer)[4].z, Some(30.0 + z_offset));
            // rest height grows with the layer
            assert_eq!(moves(layer)[0].z, Some(100.0 + z_offset));
        }
    }

    #[test]
    fn test_fixed_rest_height() {
        let mut record = minimal_record();
        record["layers"] = json!(3);
        record["rest_position"]["grow_z"] = json!(false);
        let (params, _) = setup(record);
        assert_eq!(rest_z(&params, 0), 100.0);
        assert_eq!(rest_z(&params, 2), 100.0);
    }

    #[test]
    fn test_alternating_direction() {
        let mut record = minimal_record();
        record["layers"] = json!(2);
        record["alternate_direction"] = json!(true);
        record["head_steps"] = json!({ "x": 3, "y": 1 });
        record["pattern"]["auto_shape"] = json!(false);
        record["pattern"]["nx"] = json!(2);
        record["pattern"]["ny"] = json!(1);
        record["pattern"]["punches_per_cell"] = json!(2);
        let (params, layout) = setup(record);
        let layers = compose(&params, &layout, 0);

        let xs = |layer: &Layer| -> Vec<f64> {
            moves(layer).iter().skip(2).step_by(3).take(6).filter_map(|m| m.x).collect()
        };
        // Layer 1 is odd, so steps and hits run backwards
        assert_eq!(xs(&layers[0]), vec![68.0, 64.0, 36.0, 32.0, 4.0, 0.0]);
        assert_eq!(xs(&layers[1]), vec![0.0, 4.0, 32.0, 36.0, 64.0, 68.0]);
    }

    #[test]
    fn test_swap_axes() {
        let mut record = minimal_record();
        record["swap_axes"] = json!(true);
        let (params, layout) = setup(record);
        let layers = compose(&params, &layout, 0);
        assert_eq!(layers[0].instructions[1], Instruction::Move(xyf(-400.0, 0.0, 3000.0)));
        assert_eq!(layers[0].instructions[0], Instruction::Move(zf(100.0, 1000.0)));
    }

    #[test]
    fn test_random_offsets_are_bounded_and_seeded() {
        let mut record = minimal_record();
        record["random_offsets"] = json!(true);
        record["random_offset_coefficient"] = json!(0.5);
        let (params, layout) = setup(record.clone());
        let jittered = compose(&params, &layout, 42);
        let again = compose(&params, &layout, 42);
        assert_eq!(jittered[0].instructions, again[0].instructions);

        record["random_offsets"] = json!(false);
        let (plain_params, plain_layout) = setup(record);
        let plain = compose(&plain_params, &plain_layout, 42);
        for (a, b) in moves(&jittered[0]).iter().zip(moves(&plain[0]).iter()) {
            if let (Some(ax), Some(bx)) = (a.x, b.x) {
                assert!((ax - bx).abs() <= 0.5);
                assert!((a.y.unwrap() - b.y.unwrap()).abs() <= 0.5);
            }
        }
    }

    #[test]
    fn test_unknown_row_order() {
        let mut record = minimal_record();
        record["row_order"] = json!("spiral");
        let (params, layout) = setup(record);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Composer::new(&params, &layout, &mut rng).is_err());
    }

    #[test]
    fn test_buzzer_signal() {
        assert_eq!(
            end_of_layer_signal(5.0, 2.0),
            vec![
                Instruction::Raw("M3".to_string()),
                Instruction::Pause(2000.0),
                Instruction::Raw("M5".to_string()),
                Instruction::Pause(3000.0),
            ]
        );
        // Buzzer longer than the pause: the pause grows, nothing is cut short
        assert_eq!(
            end_of_layer_signal(1.0, 2.0),
            vec![
                Instruction::Raw("M3".to_string()),
                Instruction::Pause(2000.0),
                Instruction::Raw("M5".to_string()),
            ]
        );
        assert_eq!(end_of_layer_signal(4.0, 0.0), vec![Instruction::Pause(4000.0)]);
    }
}
