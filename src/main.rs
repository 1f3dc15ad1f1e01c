use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use rust_decimal::prelude::ToPrimitive;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use plancheck::batch::{AnalysisJob, BatchAnalyzer, BatchConfig, BatchSummary};
use plancheck::logging::init_logging;
use plancheck::{
    ActivityStreams, AnalysisConfig, Channel, ComplianceAnalyzer, ComplianceError, ComplianceReport,
    EffortBlock, Grade, PlannedWorkout, ThresholdProfile,
};

/// plancheck - Workout Compliance Analysis CLI
///
/// Compares a planned structured workout against a recorded activity and
/// scores how closely each planned segment was executed.
#[derive(Parser)]
#[command(name = "plancheck")]
#[command(version)]
#[command(about = "Workout compliance analysis CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one activity against a planned workout
    Analyze {
        /// Planned workout (JSON)
        #[arg(short, long, value_name = "FILE")]
        plan: PathBuf,

        /// Activity streams (JSON with time_s, watts, heartrate)
        #[arg(short, long, value_name = "FILE")]
        activity: PathBuf,

        /// Functional threshold power in watts
        #[arg(long)]
        ftp: f64,

        /// Threshold heart rate in bpm
        #[arg(long)]
        lthr: Option<f64>,

        /// Channel to analyze (power, heart-rate)
        #[arg(long, default_value = "power")]
        channel: Channel,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Also list the detected effort blocks
        #[arg(long)]
        blocks: bool,

        /// Write the JSON report to a file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Score many activities against the same planned workout in parallel
    Batch {
        /// Planned workout (JSON)
        #[arg(short, long, value_name = "FILE")]
        plan: PathBuf,

        /// Functional threshold power in watts
        #[arg(long)]
        ftp: f64,

        /// Threshold heart rate in bpm
        #[arg(long)]
        lthr: Option<f64>,

        /// Channel to analyze (power, heart-rate)
        #[arg(long, default_value = "power")]
        channel: Channel,

        /// Number of worker threads
        #[arg(short, long)]
        threads: Option<usize>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Activity stream files (JSON)
        #[arg(required = true, value_name = "ACTIVITY")]
        activities: Vec<PathBuf>,
    },

    /// Show or create the configuration file
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Tabled)]
struct SegmentRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Segment")]
    segment: String,
    #[tabled(rename = "Match")]
    quality: String,
    #[tabled(rename = "Planned")]
    planned: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Avg %")]
    intensity: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Total")]
    total: String,
}

#[derive(Tabled)]
struct BlockRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Avg %")]
    intensity: String,
}

#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "Activity")]
    activity: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Grade")]
    grade: String,
    #[tabled(rename = "Matched")]
    matched: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AnalysisConfig::load_from_file(path)?,
        None => AnalysisConfig::load_or_default()?,
    };

    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    init_logging(&log_config).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Analyze {
            plan,
            activity,
            ftp,
            lthr,
            channel,
            format,
            blocks,
            output,
        } => {
            let workout: PlannedWorkout = read_json(&plan)?;
            let streams: ActivityStreams = read_json(&activity)?;
            let profile = threshold_profile(ftp, lthr);

            let analyzer = ComplianceAnalyzer::new(config);
            let outcome = analyzer
                .analyze_detailed(&profile, &workout, &streams, channel)
                .map_err(explain)?;

            if let Some(path) = output {
                fs::write(&path, outcome.report.to_json_pretty()?)
                    .with_context(|| format!("Failed to write report: {}", path.display()))?;
            }

            match format {
                OutputFormat::Json => println!("{}", outcome.report.to_json_pretty()?),
                OutputFormat::Table => {
                    if blocks {
                        print_blocks(&outcome.blocks, channel);
                    }
                    print_report(&outcome.report);
                }
            }
        }

        Commands::Batch {
            plan,
            ftp,
            lthr,
            channel,
            threads,
            format,
            activities,
        } => {
            let workout: PlannedWorkout = read_json(&plan)?;
            let profile = threshold_profile(ftp, lthr);

            let jobs = activities
                .iter()
                .map(|path| {
                    Ok(AnalysisJob {
                        id: path.display().to_string(),
                        profile: profile.clone(),
                        workout: workout.clone(),
                        streams: read_json(path)?,
                        channel,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let batch = BatchAnalyzer::new(
                ComplianceAnalyzer::new(config),
                BatchConfig {
                    num_threads: threads,
                    show_progress: format == OutputFormat::Table,
                },
            );
            let summary = batch.run(&jobs)?;

            match format {
                OutputFormat::Json => {
                    let reports: Vec<serde_json::Value> = summary
                        .outcomes
                        .iter()
                        .map(|o| match &o.result {
                            Ok(report) => serde_json::json!({ "activity": o.id, "report": report }),
                            Err(e) => serde_json::json!({ "activity": o.id, "error": e.user_message() }),
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&reports)?);
                }
                OutputFormat::Table => print_batch(&summary),
            }
        }

        Commands::Config { init, show } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(AnalysisConfig::default_config_path);

            if init {
                if path.exists() {
                    anyhow::bail!("Config file already exists: {}", path.display());
                }
                AnalysisConfig::default().save_to_file(&path)?;
                println!("{} {}", "✓ Wrote default configuration to".green(), path.display());
            }

            if show || !init {
                println!("{} {}", "Config file:".bold(), path.display());
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON: {}", path.display()))
}

fn threshold_profile(ftp: f64, lthr: Option<f64>) -> ThresholdProfile {
    let profile = ThresholdProfile::new(ftp);
    match lthr {
        Some(lthr) => profile.with_threshold_hr(lthr),
        None => profile,
    }
}

/// Attach the caller-facing message to engine errors
fn explain(err: ComplianceError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn colored_grade(grade: Grade) -> ColoredString {
    let letter = grade.to_string();
    match grade {
        Grade::A => letter.green().bold(),
        Grade::B => letter.cyan().bold(),
        Grade::C => letter.yellow().bold(),
        Grade::D | Grade::F => letter.red().bold(),
    }
}

fn print_report(report: &ComplianceReport) {
    let rows: Vec<SegmentRow> = report
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let label = match (&s.name, s.repetition) {
                (Some(name), _) => format!("{} ({})", s.segment_type, name),
                (None, Some(rep)) => format!("{} {}/{}", s.segment_type, rep.index + 1, rep.count),
                (None, None) => s.segment_type.to_string(),
            };
            SegmentRow {
                index: i + 1,
                segment: label,
                quality: s.match_quality.as_str().to_string(),
                planned: format_duration(s.planned_duration_s.to_f64().unwrap_or(0.0)),
                actual: s
                    .actual_duration_s
                    .and_then(|d| d.to_f64())
                    .map(format_duration)
                    .unwrap_or_else(|| "-".to_string()),
                intensity: s
                    .avg_intensity_pct
                    .map(|p| format!("{}%", p))
                    .unwrap_or_else(|| "-".to_string()),
                power: s.power_score.to_string(),
                zone: s.zone_score.to_string(),
                duration: s.duration_score.to_string(),
                total: s.weighted_total.to_string(),
            }
        })
        .collect();

    if let Some(name) = &report.workout_name {
        println!("{}", name.bold());
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!(
        "{} {}  {} {}  ({}/{} segments matched, {} channel)",
        "Overall:".bold(),
        report.overall_score,
        "Grade:".bold(),
        colored_grade(report.grade),
        report.matched_segments,
        report.segments.len(),
        report.channel
    );
    println!("{}", report.grade.description().dimmed());
}

fn print_blocks(blocks: &[EffortBlock], channel: Channel) {
    let origin = blocks.first().map(|b| b.start_s()).unwrap_or(0.0);
    let rows: Vec<BlockRow> = blocks
        .iter()
        .map(|b| BlockRow {
            index: b.index + 1,
            zone: format!("{} {}", b.zone, b.zone.name()),
            start: format_duration(b.start_s() - origin),
            duration: format_duration(b.duration_s()),
            intensity: format!("{:.1}% ({:.0} {})", b.avg_pct(), b.window.avg_value, channel.unit()),
        })
        .collect();

    println!("{}", "Detected effort blocks".bold());
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_batch(summary: &BatchSummary) {
    let rows: Vec<BatchRow> = summary
        .outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(report) => BatchRow {
                activity: o.id.clone(),
                score: report.overall_score.to_string(),
                grade: colored_grade(report.grade).to_string(),
                matched: format!("{}/{}", report.matched_segments, report.segments.len()),
            },
            Err(e) => BatchRow {
                activity: o.id.clone(),
                score: "-".to_string(),
                grade: "-".to_string(),
                matched: e.user_message().red().to_string(),
            },
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("{}", summary.to_string_pretty());
}
