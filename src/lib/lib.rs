//! Punch program generation for needle-punching machines.
//!
//! A job is read into [`JobParameters`], combined with a [`HeadCatalog`] into
//! a [`Layout`], and then streamed layer by layer into a text program.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tempfile::NamedTempFile;
use tracing::{info, warn};

pub mod composer;
pub mod error;
pub mod estimator;
pub mod formatter;
pub mod geometry;
pub mod instruction;
pub mod ordering;
pub mod params;
pub mod validation;

pub use composer::Composer;
pub use error::{GenError, GenResult};
pub use estimator::{TimeEstimate, TimeEstimator};
pub use formatter::{Formatter, ProgramHeader};
pub use instruction::{Instruction, Layer};
pub use ordering::RowOrder;
pub use params::{HeadCatalog, JobParameters, Layout, LARGE_JOB_HITS};

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Put a run time estimate in the header
    pub estimate_time: bool,
    /// Checked between layers; set it to stop the run
    pub cancel: Option<Arc<AtomicBool>>,
}

impl GenerateOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub header: ProgramHeader,
    pub estimate: Option<TimeEstimate>,
    pub layers_written: u32,
    pub total_hits: u64,
}

/// Write the whole program for `params` to `sink`.
///
/// `progress` gets the percentage done after every layer, ending at 100.
pub fn generate<R, W>(
    params: &JobParameters,
    catalog: &HeadCatalog,
    rng: &mut R,
    options: &GenerateOptions,
    progress: &mut dyn FnMut(f64),
    sink: W,
) -> GenResult<GenerationSummary>
where
    R: Rng + ?Sized,
    W: Write,
{
    let layout = params.layout(catalog)?;
    let total_layers = params.total_layers();
    let total_hits = layout.total_hits(params);

    info!(
        head = %layout.head_name,
        layers = params.layers,
        virtual_layers = params.virtual_layers,
        total_hits,
        "Generating punch program"
    );
    if total_hits > LARGE_JOB_HITS {
        warn!(total_hits, "Large job, the program file will be big");
    }

    let mut layers = Composer::new(params, &layout, rng)?;

    // The first layer is needed up front for the estimate in the header
    let first = layers.next();
    let estimate = match (&first, options.estimate_time) {
        (Some(layer), true) => {
            let estimator = TimeEstimator::new(params.feed_rates.xy, params.acceleration);
            Some(estimator.estimate_total(&layer.instructions, total_layers))
        }
        _ => None,
    };
    let header = ProgramHeader::new(params, &layout, estimate);

    let mut formatter = Formatter::new(BufWriter::new(sink), params.layers, total_layers);
    formatter.write_header(&header)?;
    formatter.write_speed(params.feed_rates.xy)?;

    let mut layers_written = 0;
    for layer in first.into_iter().chain(layers) {
        progress(formatter.write_layer(&layer)?);
        layers_written += 1;
        if layers_written < total_layers && options.cancelled() {
            formatter.flush()?;
            info!(layers_written, "Generation cancelled");
            return Err(GenError::Cancelled);
        }
    }
    if total_layers == 0 {
        progress(formatter.progress());
    }
    formatter.flush()?;

    info!(layers_written, estimate = ?estimate.map(|e| e.to_string()), "Punch program done");

    Ok(GenerationSummary {
        header,
        estimate,
        layers_written,
        total_hits,
    })
}

/// [`generate`] into `path`. The program goes to a temporary file next to
/// `path` first, so a failed or cancelled run leaves nothing behind.
pub fn write_program_file<R: Rng + ?Sized>(
    path: &Path,
    params: &JobParameters,
    catalog: &HeadCatalog,
    rng: &mut R,
    options: &GenerateOptions,
    progress: &mut dyn FnMut(f64),
) -> GenResult<GenerationSummary> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let unavailable = |source| GenError::SinkUnavailable {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(unavailable)?;
    let summary = generate(params, catalog, rng, options, progress, tmp.as_file_mut())?;
    let file: File = tmp.persist(path).map_err(|e| unavailable(e.error))?;
    file.sync_all()?;

    info!(path = %path.display(), "Wrote punch program");
    Ok(summary)
}
