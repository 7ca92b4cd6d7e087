use std::fmt;

/// A linear move. Axes left as `None` keep whatever position the machine is at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PosAndFeed {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub feed: Option<f64>,
}

pub fn xyf(x: f64, y: f64, feed: f64) -> PosAndFeed {
    PosAndFeed {
        x: Some(x),
        y: Some(y),
        z: None,
        feed: Some(feed),
    }
}

pub fn zf(z: f64, feed: f64) -> PosAndFeed {
    PosAndFeed {
        x: None,
        y: None,
        z: Some(z),
        feed: Some(feed),
    }
}

impl PosAndFeed {
    /// The same move with the X and Y axes exchanged.
    pub fn swapped(self) -> PosAndFeed {
        PosAndFeed {
            x: self.y,
            y: self.x,
            ..self
        }
    }

    pub fn has_axis(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.z.is_some()
    }
}

/// One line of the machine program.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// `G1` linear move
    Move(PosAndFeed),
    /// `G4` dwell, in milliseconds
    Pause(f64),
    /// A directive emitted verbatim, e.g. `M3`
    Raw(String),
}

impl Instruction {
    pub fn pause_seconds(seconds: f64) -> Instruction {
        Instruction::Pause(seconds * 1000.0)
    }
}

impl From<PosAndFeed> for Instruction {
    fn from(p: PosAndFeed) -> Self {
        Instruction::Move(p)
    }
}

/// Format a value the way the controller reads it: one decimal place.
/// Only the text is rounded; the instruction keeps full precision.
pub fn round1(v: f64) -> String {
    format!("{v:.1}")
}

/// Emit a gcode parameter value, if `ov` is `Some`.
fn g_val(f: &mut fmt::Formatter<'_>, name: &str, ov: Option<f64>) -> fmt::Result {
    if let Some(v) = ov {
        write!(f, " {}{}", name, round1(v))
    } else {
        Ok(())
    }
}

impl fmt::Display for PosAndFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G1")?;
        g_val(f, "X", self.x)?;
        g_val(f, "Y", self.y)?;
        g_val(f, "Z", self.z)?;
        g_val(f, "F", self.feed)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Move(p) => fmt::Display::fmt(p, f),
            Instruction::Pause(millis) => write!(f, "G4 P{}", round1(*millis)),
            Instruction::Raw(code) => f.write_str(code),
        }
    }
}

/// The instructions of one pass over the frame.
#[derive(Clone, Debug)]
pub struct Layer {
    /// 1-based
    pub number: usize,
    /// Idle layers repeat the motion without adding material
    pub is_virtual: bool,
    pub instructions: Vec<Instruction>,
}

impl Layer {
    pub fn kind(&self) -> &'static str {
        if self.is_virtual {
            "layer (holostoy)"
        } else {
            "layer"
        }
    }
}
