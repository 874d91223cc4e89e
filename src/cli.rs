//! Command line interface.

use airwatch::Dataset;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(version, about = "Hourly air-quality and weather ETL pipeline", long_about = None)]
pub struct Cli {
    // ---
    /// Which feed to work on
    #[arg(long, global = true, value_enum, default_value_t = DatasetArg::AirQuality)]
    pub dataset: DatasetArg,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetArg {
    AirQuality,
    Weather,
}

impl From<DatasetArg> for Dataset {
    fn from(arg: DatasetArg) -> Self {
        match arg {
            DatasetArg::AirQuality => Dataset::AirQuality,
            DatasetArg::Weather => Dataset::Weather,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run extract, transform, load and analyze in order (default)
    Run,
    /// Fetch every configured city and save raw artifacts
    Extract,
    /// Flatten the saved raw artifacts into the staged CSV
    Transform,
    /// Insert the staged CSV into the remote table
    Load,
    /// Compute KPI reports over the remote table
    Analyze {
        /// Only analyze rows for this city
        #[arg(long)]
        city: Option<String>,
    },
}

impl Cli {
    /// The requested command, `run` when none is given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
