use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use miru_core::{CycleReport, FrameInput, IdentityTracker, RuleCategory, TrackerConfig};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "miru", about = "Miru turnstile gate tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recorded JSON-lines detection log through a fresh tracker
    Replay {
        /// Log file, one frame object per line
        log: PathBuf,
        /// Tracker config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print totals instead of per-cycle reports
        #[arg(short, long)]
        summary: bool,
    },
    /// Show the effective hysteresis thresholds per rule
    Thresholds {
        /// Tracker config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load and validate a tracker config
    CheckConfig {
        /// Config file to check
        path: PathBuf,
    },
}

/// Totals over one replayed log.
#[derive(Debug, Default, PartialEq)]
struct ReplaySummary {
    cycles: u64,
    open_cycles: u64,
    rejected: u64,
    peak_identities: usize,
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    match path {
        Some(p) => TrackerConfig::load(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(TrackerConfig::default()),
    }
}

/// Feed every frame in `input` to `tracker`, handing each report to `on_report`.
///
/// Blank lines are ignored and malformed lines are skipped with a warning.
fn replay<R, F>(input: R, tracker: &mut IdentityTracker, mut on_report: F) -> Result<ReplaySummary>
where
    R: BufRead,
    F: FnMut(u64, &CycleReport) -> Result<()>,
{
    let mut summary = ReplaySummary::default();

    for (lineno, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: FrameInput = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(line = lineno + 1, error = %err, "skipping malformed frame");
                continue;
            }
        };

        let report = tracker.run_cycle(&frame);
        summary.cycles += 1;
        if report.should_open {
            summary.open_cycles += 1;
        }
        summary.rejected += report.rejected as u64;
        summary.peak_identities = summary.peak_identities.max(report.active_identities);

        on_report(summary.cycles, &report)?;
    }

    Ok(summary)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            log,
            config,
            summary,
        } => {
            let config = load_config(config.as_deref())?;
            let file = File::open(&log).with_context(|| format!("opening {}", log.display()))?;
            let mut tracker = IdentityTracker::new(config);

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let totals = replay(BufReader::new(file), &mut tracker, |_, report| {
                if !summary {
                    serde_json::to_writer(&mut out, report)?;
                    writeln!(out)?;
                }
                Ok(())
            })?;

            if summary {
                println!("cycles:          {}", totals.cycles);
                println!("open decisions:  {}", totals.open_cycles);
                println!("rejected inputs: {}", totals.rejected);
                println!("peak identities: {}", totals.peak_identities);
            }
        }
        Commands::Thresholds { config } => {
            let config = load_config(config.as_deref())?;
            println!("{:<20} {:>6} {:>6}", "RULE", "LOW", "HIGH");
            for category in RuleCategory::ALL {
                let h = config.thresholds.get(category);
                println!("{:<20} {:>6.2} {:>6.2}", category.as_str(), h.low, h.high);
            }
        }
        Commands::CheckConfig { path } => {
            let config = load_config(Some(&path))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            eprintln!("{}: ok", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const COMPLIANT: &str = r#"{"width":640,"height":360,"faces":[[200,80,300,200]],"detections":[{"label":"white_net","confidence":0.9,"bbox":[205,80,295,110]},{"label":"safety_goggles","confidence":0.9,"bbox":[210,120,290,140]}]}"#;

    fn run(log: &str) -> (ReplaySummary, Vec<bool>) {
        let mut tracker = IdentityTracker::new(TrackerConfig::default());
        let mut decisions = Vec::new();
        let summary = replay(Cursor::new(log), &mut tracker, |_, report| {
            decisions.push(report.should_open);
            Ok(())
        })
        .unwrap();
        (summary, decisions)
    }

    #[test]
    fn test_replay_compliant_person() {
        let log = [COMPLIANT; 4].join("\n");
        let (summary, decisions) = run(&log);
        assert_eq!(decisions, vec![false, false, true, true]);
        assert_eq!(
            summary,
            ReplaySummary {
                cycles: 4,
                open_cycles: 2,
                rejected: 0,
                peak_identities: 1,
            }
        );
    }

    #[test]
    fn test_replay_skips_blank_and_malformed_lines() {
        let log = format!("{COMPLIANT}\n\nnot json\n{{\"width\":1}}\n{COMPLIANT}\n");
        let (summary, decisions) = run(&log);
        assert_eq!(summary.cycles, 2);
        assert_eq!(decisions.len(), 2);
    }

    #[test]
    fn test_replay_counts_rejected_entries() {
        let log = r#"{"width":640,"height":360,"faces":[[10,10,5,5],[0,0,50,50]],"detections":[{"label":"hat","confidence":0.9,"bbox":[0,0,10,10]}]}"#;
        let (summary, _) = run(log);
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.peak_identities, 1);
    }

    #[test]
    fn test_replay_empty_frames_never_open() {
        let log = [r#"{"width":640,"height":360,"detections":[]}"#; 5].join("\n");
        let (summary, decisions) = run(&log);
        assert_eq!(summary.cycles, 5);
        assert!(decisions.iter().all(|open| !open));
        assert_eq!(summary.peak_identities, 0);
    }

    #[test]
    fn test_load_config_default_without_path() {
        assert_eq!(load_config(None).unwrap(), TrackerConfig::default());
    }

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from(["miru", "replay", "run.jsonl", "--summary"]).unwrap();
        match cli.command {
            Commands::Replay {
                log,
                config,
                summary,
            } => {
                assert_eq!(log, PathBuf::from("run.jsonl"));
                assert!(config.is_none());
                assert!(summary);
            }
            _ => panic!("expected replay"),
        }
    }
}
