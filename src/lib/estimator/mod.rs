//! Run time estimate for a program.
//!
//! Assumes a 3-axis gantry where every axis shares one acceleration and each
//! move runs at its own feed. Moves that cannot reach full speed use a
//! triangular velocity profile, longer ones a trapezoidal one.

use std::fmt;
use std::ops::Mul;

use nalgebra::Point3;

use crate::instruction::{Instruction, Layer};

/// Time for a single move of `distance` mm at up to `velocity` mm/s.
pub fn time_for_move(distance: f64, velocity: f64, acceleration: f64) -> f64 {
    if distance <= 0.0 || velocity <= 0.0 || acceleration <= 0.0 {
        return 0.0;
    }

    // Distance spent speeding up plus slowing down
    let d_acc = velocity * velocity / acceleration;

    if distance >= d_acc {
        2.0 * (velocity / acceleration) + (distance - d_acc) / velocity
    } else {
        2.0 * (distance / acceleration).sqrt()
    }
}

/// `HH:MM:SS`, or `N d HH:MM:SS` past a day.
pub fn seconds_to_dhms(seconds: f64) -> String {
    let s = seconds.round().max(0.0) as u64;
    let (days, s) = (s / 86_400, s % 86_400);
    let (h, s) = (s / 3600, s % 3600);
    let (m, s) = (s / 60, s % 60);
    if days > 0 {
        format!("{days} d {h:02}:{m:02}:{s:02}")
    } else {
        format!("{h:02}:{m:02}:{s:02}")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeEstimate {
    pub total_seconds: f64,
    /// Time of one layer (the mean when several were measured)
    pub layer_seconds: f64,
    pub movement_seconds: f64,
    pub pause_seconds: f64,
    pub total_distance_mm: f64,
}

impl TimeEstimate {
    pub fn total_minutes(&self) -> f64 {
        self.total_seconds / 60.0
    }

    pub fn total_hours(&self) -> f64 {
        self.total_seconds / 3600.0
    }
}

/// Scale a one-layer estimate up to `n` layers. Layer time is left as is.
impl Mul<u32> for TimeEstimate {
    type Output = TimeEstimate;

    fn mul(self, n: u32) -> TimeEstimate {
        let n = n as f64;
        TimeEstimate {
            total_seconds: self.total_seconds * n,
            layer_seconds: self.layer_seconds,
            movement_seconds: self.movement_seconds * n,
            pause_seconds: self.pause_seconds * n,
            total_distance_mm: self.total_distance_mm * n,
        }
    }
}

impl fmt::Display for TimeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&seconds_to_dhms(self.total_seconds))
    }
}

pub struct TimeEstimator {
    /// mm/s, used for moves that carry no feed
    default_speed: f64,
    /// mm/s²
    acceleration: f64,
}

impl TimeEstimator {
    pub fn new(speed_mm_per_min: f64, acceleration: f64) -> TimeEstimator {
        TimeEstimator {
            default_speed: speed_mm_per_min / 60.0,
            acceleration,
        }
    }

    /// Estimate a run of instructions starting with the head at the origin.
    pub fn estimate_layer(&self, instructions: &[Instruction]) -> TimeEstimate {
        let mut pos: Point3<f64> = Point3::origin();
        let mut movement = 0.0;
        let mut pause_ms = 0.0;
        let mut distance_total = 0.0;

        for instruction in instructions {
            match instruction {
                Instruction::Move(m) => {
                    let next = Point3::new(
                        m.x.unwrap_or(pos.x),
                        m.y.unwrap_or(pos.y),
                        m.z.unwrap_or(pos.z),
                    );
                    let distance = nalgebra::distance(&pos, &next);
                    if distance > 0.0 {
                        distance_total += distance;
                        let speed = m.feed.map(|f| f / 60.0).unwrap_or(self.default_speed);
                        movement += time_for_move(distance, speed, self.acceleration);
                    }
                    pos = next;
                }
                Instruction::Pause(millis) => pause_ms += *millis,
                Instruction::Raw(_) => {}
            }
        }

        let pause_seconds = pause_ms / 1000.0;
        let total = movement + pause_seconds;
        TimeEstimate {
            total_seconds: total,
            layer_seconds: total,
            movement_seconds: movement,
            pause_seconds,
            total_distance_mm: distance_total,
        }
    }

    /// One representative layer times the layer count. Every layer has the
    /// same moves apart from Z depth, so this is close to exact.
    pub fn estimate_total(&self, layer: &[Instruction], total_layers: u32) -> TimeEstimate {
        self.estimate_layer(layer) * total_layers
    }

    /// Exact estimate summing every layer. Each layer starts from the origin.
    pub fn estimate_layers<'l, I>(&self, layers: I) -> TimeEstimate
    where
        I: IntoIterator<Item = &'l Layer>,
    {
        let mut sum = TimeEstimate::default();
        let mut count = 0;
        for layer in layers {
            let e = self.estimate_layer(&layer.instructions);
            sum.total_seconds += e.total_seconds;
            sum.movement_seconds += e.movement_seconds;
            sum.pause_seconds += e.pause_seconds;
            sum.total_distance_mm += e.total_distance_mm;
            count += 1;
        }
        if count > 0 {
            sum.layer_seconds = sum.total_seconds / count as f64;
        }
        sum
    }
}
