use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn, LevelFilter};
use serde::Serialize;
use simple_logger::SimpleLogger;
use time::macros::format_description;

use iclr_points::{
    engine::IndexSummary, memory_usage, util::format_elapsed, AreaStatsRow, IclrEngine, MatchPolicy,
    Settings, YearAreaStatsRow, YearRange,
};

#[derive(Parser)]
#[command(name = "ICLR Points")]
#[command(about = "Computes per-area ICLR points from a DBLP dump, a faculty roster and an area taxonomy.")]
#[command(version = "1.0.0")]
struct Cli {
    #[arg(short, long, help = "JSON settings file; flags below override its values")]
    config: Option<PathBuf>,

    #[arg(long, help = "Faculty roster CSV (first column is the name)")]
    faculty: Option<PathBuf>,

    #[arg(long, help = "Area taxonomy CSV (parent_area,area,abbreviation,conference)")]
    taxonomy: Option<PathBuf>,

    #[arg(long, help = "DBLP XML dump (.xml.gz is decompressed on the fly)")]
    dblp: Option<PathBuf>,

    #[arg(long, help = "Baseline area every other area is normalized against")]
    baseline: Option<String>,

    #[arg(long, help = "Venue matching: case-sensitive or case-insensitive")]
    match_policy: Option<MatchPolicy>,

    #[arg(short, long, help = "Number of threads to use (0 for auto)")]
    threads: Option<usize>,

    #[arg(long, help = "Disable the progress bar while reading the dump")]
    no_progress: bool,

    #[arg(short, long, value_enum, default_value = "json", help = "Output format")]
    format: OutputFormat,

    #[arg(short, long, help = "Write results here instead of stdout")]
    output: Option<PathBuf>,

    #[arg(short, long, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Area stats for one or more year ranges (START-END, START:END or YEAR)
    Range {
        #[arg(required = true)]
        ranges: Vec<YearRange>,
    },
    /// Area stats for every indexed year, one block per year
    Yearly {
        #[arg(long, help = "First year to include")]
        from: Option<i32>,
        #[arg(long, help = "Last year to include")]
        to: Option<i32>,
    },
    /// Years, areas and publication totals held in the index
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Serialize)]
struct RangeReport {
    from_year: i32,
    to_year: i32,
    rows: Vec<AreaStatsRow>,
}

#[derive(Serialize)]
struct RangeCsvRow<'a> {
    from_year: i32,
    to_year: i32,
    area: &'a str,
    parent: Option<&'a str>,
    publication_count: u64,
    faculty_count: f64,
    faculty_per_pub: f64,
    iclr_points: f64,
}

fn settings_from_cli(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_json_file(path)?,
        None => Settings::default(),
    };
    if let Some(path) = &cli.faculty {
        settings.faculty_path = path.clone();
    }
    if let Some(path) = &cli.taxonomy {
        settings.taxonomy_path = path.clone();
    }
    if let Some(path) = &cli.dblp {
        settings.dblp_path = path.clone();
    }
    if let Some(baseline) = &cli.baseline {
        settings.baseline_area = baseline.clone();
    }
    if let Some(policy) = cli.match_policy {
        settings.match_policy = policy;
    }
    if let Some(threads) = cli.threads {
        settings.threads = threads;
    }
    if cli.no_progress {
        settings.show_progress = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn open_output(output: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("Failed to write JSON output")?;
    writeln!(out)?;
    Ok(())
}

fn write_csv<T: Serialize>(out: &mut dyn Write, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row).context("Failed to write CSV row")?;
    }
    writer.flush()?;
    Ok(())
}

fn run_ranges(engine: &IclrEngine, ranges: &[YearRange], format: OutputFormat, out: &mut dyn Write) -> Result<usize> {
    let mut reports = Vec::with_capacity(ranges.len());
    let mut failures = 0;

    for requested in ranges {
        let (range, swapped) = requested.normalized();
        if swapped {
            warn!("Range {} is reversed; using {}", requested, range);
        }
        match engine.area_stats(range.start, range.end) {
            Ok(rows) => {
                info!("Range {}: {} areas", range, rows.len());
                reports.push(RangeReport {
                    from_year: range.start,
                    to_year: range.end,
                    rows,
                });
            }
            Err(e) if e.is_client_error() => {
                warn!("Skipping range {}: {}", range, e);
                failures += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to compute range {}", range)),
        }
    }

    match format {
        OutputFormat::Json => write_json(out, &reports)?,
        OutputFormat::Csv => write_csv(
            out,
            reports.iter().flat_map(|report| {
                report.rows.iter().map(move |row| RangeCsvRow {
                    from_year: report.from_year,
                    to_year: report.to_year,
                    area: &row.area,
                    parent: row.parent.as_deref(),
                    publication_count: row.publication_count,
                    faculty_count: row.faculty_count,
                    faculty_per_pub: row.faculty_per_pub,
                    iclr_points: row.iclr_points,
                })
            }),
        )?,
    }
    Ok(failures)
}

fn run_yearly(
    engine: &IclrEngine,
    from: Option<i32>,
    to: Option<i32>,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    let range = match (from, to) {
        (None, None) => None,
        (from, to) => {
            let requested = YearRange::new(from.unwrap_or(i32::MIN), to.unwrap_or(i32::MAX));
            let (range, swapped) = requested.normalized();
            if swapped {
                warn!("--from {} is after --to {}; swapping", requested.start, requested.end);
            }
            Some((range.start, range.end))
        }
    };

    let rows: Vec<YearAreaStatsRow> = engine.yearly_area_stats(range)?;
    info!("Yearly series: {} rows", rows.len());
    match format {
        OutputFormat::Json => write_json(out, &rows),
        OutputFormat::Csv => write_csv(out, &rows),
    }
}

fn run_summary(engine: &IclrEngine, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    let summary: IndexSummary = engine.summary()?;
    info!(
        "Index holds {} publications across {} years and {} areas",
        summary.total_publications,
        summary.years.len(),
        summary.areas.len()
    );
    match format {
        OutputFormat::Json => write_json(out, &summary),
        OutputFormat::Csv => write_csv(out, &summary.years),
    }
}

fn main() -> Result<()> {
    let main_start_time = Instant::now();

    let cli = Cli::parse();

    let log_level = match cli.log_level.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", cli.log_level);
            LevelFilter::Info
        }
    };

    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    info!("Starting ICLR Points v1.0.0");
    memory_usage::log_memory_usage("initial");

    let settings = settings_from_cli(&cli)?;

    let num_threads = settings.effective_threads();
    if settings.threads == 0 {
        info!("Auto-detected {} CPU cores. Using {} threads.", num_threads, num_threads);
    } else {
        info!("Using specified {} threads.", num_threads);
    }
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        error!("Failed to build global thread pool: {}. Proceeding with default.", e);
    }

    info!("Faculty roster: {}", settings.faculty_path.display());
    info!("Area taxonomy: {}", settings.taxonomy_path.display());
    info!("DBLP dump: {}", settings.dblp_path.display());

    let engine = IclrEngine::from_settings(&settings).context("Failed to load input data")?;
    let options = engine.options();
    if options.show_progress {
        info!("Logging progress every {} conference papers", options.progress_interval);
    }
    engine.warm().context("Failed to build aggregation index")?;

    let mut out = open_output(cli.output.as_ref())?;
    let failures = match &cli.command {
        Command::Range { ranges } => run_ranges(&engine, ranges, cli.format, &mut *out)?,
        Command::Yearly { from, to } => {
            run_yearly(&engine, *from, *to, cli.format, &mut *out)?;
            0
        }
        Command::Summary => {
            run_summary(&engine, cli.format, &mut *out)?;
            0
        }
    };
    out.flush().context("Failed to flush output")?;

    info!("Total execution time: {}", format_elapsed(main_start_time.elapsed()));
    memory_usage::log_memory_usage("final");

    if failures > 0 {
        error!("{} range(s) could not be computed.", failures);
        Err(anyhow::anyhow!("{} range(s) could not be computed", failures))
    } else {
        info!("Finished successfully.");
        Ok(())
    }
}
