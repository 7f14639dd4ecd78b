use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::warn;

use pcb_mill::{bits, JobBits, JobConfig, MillError, Operation};

#[derive(Parser)]
#[command(
    name = "pcb-mill",
    about = "Convert Gerber/Excellon fabrication files to GRBL G-code for PCB milling"
)]
struct Cli {
    /// Layer file prefix (files are <prefix>-TopLayer.gbr, <prefix>-PTH.drl, ...)
    prefix: String,

    /// Directory containing the layer files
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Output directory for .nc files (defaults to the input directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Job settings JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bit library JSON file
    #[arg(long, default_value = "bits.json")]
    bits: PathBuf,

    /// Operations to run: copper,mask,drill,outline,silk (default: all with a usable bit)
    #[arg(long, value_delimiter = ',')]
    ops: Vec<String>,

    /// Append everything to one combined program instead of one file per operation
    #[arg(long)]
    combined: bool,

    /// Upgrade parser warnings to errors
    #[arg(long)]
    strict: bool,

    /// Bit to use for copper isolation (default: first suitable)
    #[arg(long)]
    copper_bit: Option<String>,

    /// Bit to use for soldermask clearing
    #[arg(long)]
    mask_bit: Option<String>,

    /// Bit to use for the outline / through cuts
    #[arg(long)]
    outline_bit: Option<String>,

    /// Bit to use for silkscreen engraving
    #[arg(long)]
    silk_bit: Option<String>,
}

fn run(cli: Cli) -> Result<(), MillError> {
    let cfg = match &cli.config {
        Some(path) => JobConfig::load(path)?,
        None => JobConfig::default(),
    };
    let library = bits::load_bits(&cli.bits)?;

    let job_bits = JobBits {
        copper: bits::pick_bit(&library, cli.copper_bit.as_deref(), Operation::CopperIsolation)
            .cloned(),
        mask: bits::pick_bit(&library, cli.mask_bit.as_deref(), Operation::SoldermaskClear)
            .cloned(),
        outline: bits::pick_bit(&library, cli.outline_bit.as_deref(), Operation::BoardOutline)
            .cloned(),
        silk: bits::pick_bit(&library, cli.silk_bit.as_deref(), Operation::Silkscreen).cloned(),
        drills: library
            .iter()
            .filter(|b| b.kind() == pcb_mill::BitKind::Drill)
            .cloned()
            .collect(),
    };

    let ops: Vec<Operation> = if cli.ops.is_empty() {
        // Default to every operation the bit library can actually serve.
        Operation::ORDER
            .into_iter()
            .filter(|&op| {
                let available = match op {
                    Operation::CopperIsolation => job_bits.copper.is_some(),
                    Operation::SoldermaskClear => job_bits.mask.is_some(),
                    Operation::Drilling => !job_bits.drills.is_empty(),
                    Operation::BoardOutline => job_bits.outline.is_some(),
                    Operation::Silkscreen => job_bits.silk.is_some(),
                };
                if !available {
                    warn!("no usable bit for {}; skipping", op.label());
                }
                available
            })
            .collect()
    } else {
        cli.ops
            .iter()
            .map(|name| {
                Operation::from_name(name)
                    .ok_or_else(|| MillError::Config(format!("unknown operation '{name}'")))
            })
            .collect::<Result<_, _>>()?
    };

    let sources = pcb_mill::read_sources(&cli.dir, &cli.prefix)?;
    let board = pcb_mill::build_board(&sources, &cfg, cli.strict)?;

    let out_dir = cli.output.clone().unwrap_or_else(|| cli.dir.clone());
    pcb_mill::run_job(&board, &cfg, &job_bits, &ops, &out_dir, cli.combined)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
