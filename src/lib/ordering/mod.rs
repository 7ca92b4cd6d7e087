use std::fmt;
use std::str::FromStr;

use crate::error::GenError;

/// Order in which the head walks the rows of a layer.
///
/// `EvenFirst` and `OddFirst` group rows by index parity as operators name
/// them on the machine: "even" rows are the ones at indices 1, 3, 5, ...
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowOrder {
    Sequential,
    EvenFirst,
    OddFirst,
    OutwardFromCenter,
    InwardToCenter,
}

impl RowOrder {
    pub const ALL: [RowOrder; 5] = [
        RowOrder::Sequential,
        RowOrder::EvenFirst,
        RowOrder::OddFirst,
        RowOrder::OutwardFromCenter,
        RowOrder::InwardToCenter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RowOrder::Sequential => "sequential",
            RowOrder::EvenFirst => "even-first",
            RowOrder::OddFirst => "odd-first",
            RowOrder::OutwardFromCenter => "outward-from-center",
            RowOrder::InwardToCenter => "inward-to-center",
        }
    }

    /// Row indices `0..num_rows` in traversal order.
    pub fn rows(self, num_rows: usize) -> Vec<usize> {
        let rows = 0..num_rows;
        if num_rows == 0 {
            return Vec::new();
        }
        let center = (num_rows - 1) / 2;
        match self {
            RowOrder::Sequential => rows.collect(),
            RowOrder::EvenFirst => rows.clone().skip(1).step_by(2).chain(rows.step_by(2)).collect(),
            RowOrder::OddFirst => rows.clone().step_by(2).chain(rows.skip(1).step_by(2)).collect(),
            RowOrder::OutwardFromCenter => (0..=center).rev().chain(center + 1..num_rows).collect(),
            RowOrder::InwardToCenter => (0..center).chain((center..num_rows).rev()).collect(),
        }
    }
}

impl fmt::Display for RowOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RowOrder {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RowOrder::ALL
            .iter()
            .copied()
            .find(|order| order.name() == s)
            .ok_or_else(|| GenError::UnknownOrderPolicy(s.to_string()))
    }
}

/// Rows in the order named by `policy`. Unknown names are an error, never a default.
pub fn ordered_rows(num_rows: usize, policy: &str) -> Result<Vec<usize>, GenError> {
    Ok(policy.parse::<RowOrder>()?.rows(num_rows))
}
