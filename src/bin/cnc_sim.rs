use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use cnc_collector::error_handling::types::SimulatorError;
use cnc_collector::simulator::{TrafficGenerator, DEFAULT_REVISION};
use log::error;

const EXAMPLES: &str = "\
Examples:
  Send data from a file:
    cnc-sim --host 192.168.1.100 --file test_data.txt

  Generate and send test data:
    cnc-sim --host 192.168.1.100 --part 265-4183 --rev X2

  Send to localhost for testing:
    cnc-sim --host localhost --part TEST-001

  Keep the connection open longer:
    cnc-sim -H localhost -p 265-4183 --delay 2";

#[derive(Parser, Debug)]
#[command(name = "cnc-sim")]
#[command(version)]
#[command(about = "CNC machine simulator: sends test data to the collector")]
#[command(after_help = EXAMPLES)]
struct Args {
    /// IP address or hostname of the collector
    #[arg(short = 'H', long)]
    host: String,

    /// TCP port of the collector
    #[arg(long, default_value_t = 5062)]
    port: u16,

    /// File containing CNC data to send
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Part number for generated test data (used if --file is not given)
    #[arg(short, long)]
    part: Option<String>,

    /// Revision for generated test data
    #[arg(short, long, default_value = DEFAULT_REVISION)]
    rev: String,

    /// Seconds to wait after sending before closing
    #[arg(long, default_value_t = 1.0)]
    delay: f64,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let delay = match Duration::try_from_secs_f64(args.delay) {
        Ok(delay) => delay,
        Err(e) => {
            error!("Invalid delay {}: {}", args.delay, e);
            std::process::exit(1);
        }
    };
    let generator = TrafficGenerator::new(&args.host, args.port).with_delay(delay);

    let result = match (args.file, args.part) {
        (Some(file), _) => generator.send_file(&file).await,
        (None, Some(part)) => generator.send_test_cycle(&part, &args.rev).await.map(|_| ()),
        (None, None) => Err(SimulatorError::NothingToSend),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}
