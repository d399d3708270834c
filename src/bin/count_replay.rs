//! count_replay - replay recorded raw person counts through the tracker
//!
//! Reads one raw count per line (blank lines and `#` comments are skipped)
//! from a file or stdin and prints one JSON object per count with the
//! smoothed occupancy. Handy for tuning `--window-size` and `--tie-break`
//! against counts captured from a real deployment.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use people_counter::tracker::{OccupancyTracker, TieBreak, TrackerConfig, DEFAULT_WINDOW_SIZE};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay raw person counts through the occupancy tracker")]
struct Args {
    /// File with one raw count per line; '-' or absent reads stdin.
    input: Option<PathBuf>,

    /// Number of recent frames the current count is smoothed over.
    #[arg(long, env = "COUNTER_WINDOW_SIZE", default_value_t = DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Rule for equally frequent counts in the window (first-seen|lowest).
    #[arg(long, env = "COUNTER_TIE_BREAK", default_value_t = TieBreak::FirstSeen)]
    tie_break: TieBreak,

    /// Only print frames where the current count changed.
    #[arg(long)]
    changes_only: bool,
}

#[derive(Serialize)]
struct ReplayLine {
    frame: u64,
    raw: u32,
    current: u32,
    total: u64,
    delta: i64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let reader: Box<dyn BufRead> = match args.input.as_deref() {
        None => Box::new(BufReader::new(io::stdin())),
        Some(path) if path.as_os_str() == "-" => Box::new(BufReader::new(io::stdin())),
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open {}", path.display()))?,
        )),
    };

    let mut tracker = OccupancyTracker::new(TrackerConfig {
        window_size: args.window_size,
        tie_break: args.tie_break,
    })?;
    let mut out = BufWriter::new(io::stdout().lock());

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("read counts")?;
        let value = line.split('#').next().unwrap_or_default().trim();
        if value.is_empty() {
            continue;
        }
        let raw: u32 = value
            .parse()
            .map_err(|_| anyhow!("line {}: '{}' is not a person count", line_no + 1, value))?;
        let occupancy = tracker.observe(raw);
        if args.changes_only && occupancy.delta == 0 {
            continue;
        }
        let record = ReplayLine {
            frame: tracker.frames_observed() - 1,
            raw,
            current: occupancy.current,
            total: occupancy.total,
            delta: occupancy.delta,
        };
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    log::info!(
        "replayed {} counts: {} in view, {} total",
        tracker.frames_observed(),
        tracker.current(),
        tracker.total()
    );
    Ok(())
}
