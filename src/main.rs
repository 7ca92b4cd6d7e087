use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use punch::params::SizingMode;
use punch::{write_program_file, GenerateOptions, JobParameters, LARGE_JOB_HITS};

#[derive(Debug, StructOpt)]
#[structopt(name = "punch_gen", about = "Needle-punching program generator")]
struct Opt {
    /// Job parameters, JSON
    #[structopt(short, long, parse(from_os_str))]
    job: PathBuf,

    /// Head catalog, JSON
    #[structopt(long, parse(from_os_str))]
    heads: PathBuf,

    /// Output file for the program. Defaults to a name built from the job,
    /// inside a directory named after the head
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Seed for the random order and offsets, for reproducible programs
    #[structopt(long)]
    seed: Option<u64>,

    /// Generate jobs with more than 500000 hits
    #[structopt(long)]
    allow_large: bool,

    /// Leave the run time estimate out of the header
    #[structopt(long)]
    no_estimate: bool,
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::from_args();
    let (params, catalog) = JobParameters::from_json(read_json(&opt.job)?, read_json(&opt.heads)?)
        .context("invalid job")?;
    let layout = params.layout(&catalog)?;

    let total_hits = layout.total_hits(&params);
    if total_hits > LARGE_JOB_HITS && !opt.allow_large {
        bail!("job has {total_hits} hits, more than {LARGE_JOB_HITS}; pass --allow-large to generate it anyway");
    }

    if params.sizing_mode == SizingMode::Frame {
        let overhang = layout.overhangs(&params);
        println!(
            "Punched area overhangs the frame by {:.1} mm in X and {:.1} mm in Y on each side",
            overhang.x, overhang.y
        );
    }

    let output = match opt.output {
        Some(path) => path,
        None => {
            let dir = PathBuf::from(&layout.head_name);
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
            dir.join(layout.suggested_file_name(&params))
        }
    };

    let mut rng = match opt.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let options = GenerateOptions {
        estimate_time: !opt.no_estimate,
        cancel: None,
    };

    // Report every tenth of the way
    let mut last_decile = 0;
    let mut progress = |percent: f64| {
        let decile = (percent / 10.0) as u32;
        if decile > last_decile {
            last_decile = decile;
            eprintln!("{percent:5.1}%");
        }
    };

    let summary = write_program_file(&output, &params, &catalog, &mut rng, &options, &mut progress)
        .with_context(|| format!("generating {}", output.display()))?;

    println!("Wrote {} layers to {}", summary.layers_written, output.display());
    if let Some(estimate) = summary.estimate {
        println!("Estimated run time {estimate}");
    }

    Ok(())
}
