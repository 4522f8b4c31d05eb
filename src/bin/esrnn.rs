//! Command-line entry point.
//!
//! Two invocation forms:
//!
//! ```text
//! esrnn <instance_id> <train.csv> <info.csv> <output_dir> <holdback> <max_length> <max_count>
//! esrnn <offset>
//! ```
//!
//! The single-argument form uses the default data paths and offsets the
//! repetition index in output file names, so several processes launched
//! together contribute distinct ensemble members.

use std::path::Path;
use std::process::ExitCode;

use esrnn::prelude::*;

const DEFAULT_INPUT: &str = "data/Daily-train.csv";
const DEFAULT_INFO: &str = "data/M4-info.csv";
const DEFAULT_OUTPUT: &str = "output";

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = Invocation::parse(&args)?;

    let mut settings = Settings::default();
    invocation.apply(&mut settings);
    settings.validate()?;

    let (input, info, output) = match &invocation {
        Invocation::Configured {
            input_path,
            category_path,
            output_dir,
            ..
        } => (input_path.clone(), category_path.clone(), output_dir.clone()),
        Invocation::OffsetOnly(_) => (
            DEFAULT_INPUT.to_string(),
            DEFAULT_INFO.to_string(),
            DEFAULT_OUTPUT.to_string(),
        ),
    };

    let categories = io::read_categories(Path::new(&info))?;
    let store = io::load_series(Path::new(&input), &categories, &settings)?;
    driver::run(&settings, &store, &output)
}
