use nalgebra::Vector2;
use rand::seq::SliceRandom;
use rand::Rng;

/// Displacement of one hit inside the elementary cell, in mm.
pub type Offset = Vector2<f64>;

/// Multipliers of the punch count tried when picking a pattern shape automatically.
/// Found by practice on the machine; changing them changes every auto-shaped job.
const AUTO_SHAPE_MULTIPLIERS: [u32; 5] = [5, 6, 8, 10, 12];

/// Shift applied to every odd column, in units of the row pitch
const SNAKE_FACTOR: f64 = 1.5;

/// Lay out `nx * ny` hits over a `cell_size_x` by `cell_size_y` cell.
/// Rows are the outer loop, so the returned order is the hit order. Odd columns
/// are pushed up by one and a half row pitches, giving a brick pattern.
pub fn generate_offset_list(nx: u32, ny: u32, cell_size_x: f64, cell_size_y: f64) -> Vec<Offset> {
    let offset_x = cell_size_x / nx as f64;
    let offset_y = cell_size_y / ny as f64;
    let snake_step = SNAKE_FACTOR * offset_y;

    let mut offsets = Vec::with_capacity((nx * ny) as usize);
    for row in 0..ny {
        for col in 0..nx {
            let x = offset_x * col as f64;
            let mut y = offset_y * row as f64;
            if col % 2 != 0 {
                y += snake_step;
            }
            offsets.push(Offset::new(x, y));
        }
    }
    offsets
}

/// The offset list with the job's randomization applied: shuffled hit order
/// and/or an independent uniform jitter of up to `offset_coefficient` per axis.
pub fn result_offset_list<R: Rng + ?Sized>(
    nx: u32,
    ny: u32,
    cell_size_x: f64,
    cell_size_y: f64,
    random_offsets: bool,
    offset_coefficient: f64,
    random_order: bool,
    rng: &mut R,
) -> Vec<Offset> {
    let mut offsets = generate_offset_list(nx, ny, cell_size_x, cell_size_y);

    if random_order {
        offsets.shuffle(rng);
    }

    if random_offsets {
        for p in offsets.iter_mut() {
            *p += jitter(offset_coefficient, rng);
        }
    }

    offsets
}

/// Uniform displacement in `[-coefficient, coefficient]` along each axis
pub fn jitter<R: Rng + ?Sized>(coefficient: f64, rng: &mut R) -> Offset {
    let dx = coefficient * (rng.gen::<f64>() - 0.5) * 2.0;
    let dy = coefficient * (rng.gen::<f64>() - 0.5) * 2.0;
    Offset::new(dx, dy)
}

/// All `(a, n / a)` with `a` in `1..n` dividing `n`.
fn factor_pairs(n: u32) -> impl Iterator<Item = (u32, u32)> {
    (1..n).filter(move |a| n % a == 0).map(move |a| (a, n / a))
}

/// Pick `(nx, ny)` for `punches_per_cell` hits per layer.
///
/// `nx * ny` is always a multiple of the punch count, so every layer gets a
/// full window, and `nx / ny` is as close as possible to `2 / sqrt(3)`, the
/// ratio of an equilateral triangle tiling. On ties the first candidate wins.
pub fn choose_auto_pattern_shape(punches_per_cell: u32) -> (u32, u32) {
    let target = 2.0 / 3.0_f64.sqrt();
    let score = |(a, b): (u32, u32)| (a as f64 / b as f64 - target).abs();

    let mut best: Option<((u32, u32), f64)> = None;
    for k in AUTO_SHAPE_MULTIPLIERS.iter() {
        for pair in factor_pairs(punches_per_cell * k) {
            let s = score(pair);
            match best {
                Some((_, best_score)) if best_score <= s => {}
                _ => best = Some((pair, s)),
            }
        }
    }
    // Only a zero punch count leaves no candidates
    best.map(|(pair, _)| pair).unwrap_or((1, 1))
}

/// True when the pattern does not split into whole windows, so some layers
/// will punch fewer hits than `punches_per_cell`.
pub fn is_pattern_period_misaligned(nx: u32, ny: u32, punches_per_cell: u32) -> bool {
    punches_per_cell == 0 || (nx * ny) % punches_per_cell != 0
}

/// Working area covered by the head, in mm.
pub fn head_dimensions(spacing: Vector2<f64>, needles_x: u32, needles_y: u32) -> Vector2<f64> {
    Vector2::new(spacing.x * needles_x as f64, spacing.y * needles_y as f64)
}

/// Head steps needed to cover a frame, rounding up so the frame is fully punched.
pub fn steps_from_frame(frame: Vector2<f64>, head: Vector2<f64>) -> (u32, u32) {
    (
        (frame.x / head.x).ceil() as u32,
        (frame.y / head.y).ceil() as u32,
    )
}
