// Commandline argument parsers using clap for the ranging harness binaries

use crate::report::Firmware;
use crate::safety::LengthUnit;
use clap::Parser;
use std::path::PathBuf;

/// Arguments for the live harness binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Live UWB vehicle ranging harness")]
pub struct HarnessArgs {
    /// Path to a RON config file; flags below override its fields
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Serial baud rate
    #[arg(short = 'b', long = "baud")]
    pub baud: Option<u32>,

    /// Firmware flavor the deployed modules run
    #[arg(short = 'f', long = "firmware", value_enum)]
    pub firmware: Option<Firmware>,

    /// Display units
    #[arg(short = 'u', long = "units", value_enum)]
    pub units: Option<LengthUnit>,

    /// Directory for record files; omit to disable recording
    #[arg(short = 'r', long = "record-dir")]
    pub record_dir: Option<PathBuf>,

    /// Run against the synthetic source instead of hardware
    #[arg(long = "dummy")]
    pub dummy: bool,
}

/// Arguments for the offline replay binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Replay a raw UART capture through the ranging pipeline")]
pub struct ReplayArgs {
    /// The raw capture file, one UART line per line
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Firmware flavor that produced the capture
    #[arg(short = 'f', long = "firmware", value_enum, default_value = "accel-enabled")]
    pub firmware: Firmware,

    /// Display units
    #[arg(short = 'u', long = "units", value_enum, default_value = "metric")]
    pub units: LengthUnit,

    /// Master mounting position label (base64), as deployed on the
    /// capturing vehicle; zero offsets are assumed when omitted
    #[arg(short = 'l', long = "label")]
    pub master_label: Option<String>,

    /// Short addresses of the capturing vehicle's own slaves, to filter
    #[arg(short = 'o', long = "own")]
    #[clap(num_args = 0..)]
    pub own_devices: Vec<String>,

    /// Write the replayed snapshots as a record file
    #[arg(short = 'w', long = "write-records")]
    pub record_out: Option<PathBuf>,
}
