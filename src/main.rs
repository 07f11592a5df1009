mod cases;
mod constants;
mod data;
mod model;
mod report;
mod score;

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::cases::load_cases;
use crate::data::{format_value, read_submission_csv, write_submission_csv};
use crate::model::{Forecast, PipelineConfig, predict};
use crate::report::ReportContext;
use crate::score::Evaluation;
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

const APP_ABOUT: &str = "paxcast - baseline passenger show-up forecast from recent analog flights";
const DEFAULT_DATA_DIR: &str = ".";
const DEFAULT_TRAIN_CSV: &str = "train.csv";
const DEFAULT_TEST_CSV: &str = "test.csv";
const DEFAULT_SUBMISSION_CSV: &str = "model_submission.csv";
const DEFAULT_PIPELINE_CONFIG: &str = "config/pipeline.toml";
const CSV_ARCHIVE_EXTENSION: &str = "gz";

#[derive(Parser, Debug)]
#[command(name = "paxcast", about = APP_ABOUT)]
struct Args {
    /// Архивировать CSV с прогнозом в .csv.gz.
    /// Исходный CSV удаляется после успешной архивации.
    #[arg(long = "archive-csv", global = true)]
    archive_csv: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Полный режим: оценить модель на train, построить прогноз для test.
    Run {
        /// Директория, относительно которой ищутся входные и выходные файлы.
        #[arg(
            short = 'd',
            long = "data-dir",
            value_name = "DIR",
            default_value = DEFAULT_DATA_DIR
        )]
        data_dir: PathBuf,
        /// Размеченный CSV для оценки.
        #[arg(long = "train", value_name = "PATH", default_value = DEFAULT_TRAIN_CSV)]
        train: PathBuf,
        /// CSV, для которого строится прогноз.
        #[arg(long = "test", value_name = "PATH", default_value = DEFAULT_TEST_CSV)]
        test: PathBuf,
        /// Куда сохранить CSV с прогнозом.
        #[arg(
            short = 'o',
            long = "output-csv",
            value_name = "PATH",
            default_value = DEFAULT_SUBMISSION_CSV
        )]
        output_csv: PathBuf,
        /// HTML-отчёт по оценке на train (не создаётся, если не указан).
        #[arg(long = "report-html", value_name = "PATH")]
        report_html: Option<PathBuf>,
        /// Не минифицировать HTML (по умолчанию минифицируется).
        #[arg(
            long = "no-minify-html",
            default_value_t = true,
            action = ArgAction::SetFalse
        )]
        minify_html: bool,
        /// TOML-файл с параметрами пайплайна.
        #[arg(
            long = "config",
            value_name = "PATH",
            default_value = DEFAULT_PIPELINE_CONFIG
        )]
        config: PathBuf,
    },
    /// Оценить прогноз на размеченном CSV и вывести RMSE.
    Evaluate {
        /// Размеченный CSV.
        #[arg(short = 'c', long = "csv", value_name = "PATH", default_value = DEFAULT_TRAIN_CSV)]
        csv: PathBuf,
        /// HTML-отчёт (не создаётся, если не указан).
        #[arg(long = "report-html", value_name = "PATH")]
        report_html: Option<PathBuf>,
        /// Не минифицировать HTML (по умолчанию минифицируется).
        #[arg(
            long = "no-minify-html",
            default_value_t = true,
            action = ArgAction::SetFalse
        )]
        minify_html: bool,
        /// TOML-файл с параметрами пайплайна.
        #[arg(
            long = "config",
            value_name = "PATH",
            default_value = DEFAULT_PIPELINE_CONFIG
        )]
        config: PathBuf,
    },
    /// Построить прогноз и сохранить CSV для сабмита.
    Predict {
        /// CSV с целевыми и объясняющими кейсами.
        #[arg(short = 'c', long = "csv", value_name = "PATH", default_value = DEFAULT_TEST_CSV)]
        csv: PathBuf,
        /// Куда сохранить CSV с прогнозом.
        #[arg(
            short = 'o',
            long = "output-csv",
            value_name = "PATH",
            default_value = DEFAULT_SUBMISSION_CSV
        )]
        output_csv: PathBuf,
        /// TOML-файл с параметрами пайплайна.
        #[arg(
            long = "config",
            value_name = "PATH",
            default_value = DEFAULT_PIPELINE_CONFIG
        )]
        config: PathBuf,
    },
    /// Посчитать RMSE готового CSV с прогнозом относительно размеченного CSV.
    Score {
        /// Размеченный CSV с целевыми кейсами.
        #[arg(long = "truth", value_name = "PATH")]
        truth: PathBuf,
        /// CSV с прогнозом в формате сабмита.
        #[arg(long = "predictions", value_name = "PATH")]
        predictions: PathBuf,
    },
    /// Сгенерировать файлы автодополнения для shell.
    Completions {
        /// Целевой shell.
        #[arg(value_enum)]
        shell: Shell,
        /// Куда сохранить файл (если не указано — stdout).
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct PipelineConfigFile {
    pipeline: Option<PipelineFile>,
}

#[derive(Debug, Deserialize)]
struct PipelineFile {
    #[serde(alias = "analogs")]
    analog_count: Option<usize>,
    clip_negatives: Option<bool>,
}

fn resolve_pipeline_config(overrides: Option<PipelineFile>) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    if let Some(overrides) = overrides {
        if let Some(analog_count) = overrides.analog_count {
            cfg.analog_count = analog_count;
        }
        if let Some(clip_negatives) = overrides.clip_negatives {
            cfg.clip_negatives = clip_negatives;
        }
    }
    cfg
}

fn validate_pipeline_config(cfg: &PipelineConfig) -> Result<(), String> {
    if cfg.analog_count == 0 {
        return Err("pipeline.analog_count must be >= 1".to_string());
    }
    Ok(())
}

fn parse_pipeline_config(raw: &str) -> Result<PipelineConfig, String> {
    let config: PipelineConfigFile = toml::from_str(raw).map_err(|err| err.to_string())?;
    let pipeline = resolve_pipeline_config(config.pipeline);
    validate_pipeline_config(&pipeline)?;
    Ok(pipeline)
}

fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, String> {
    if !path.exists() {
        if path == Path::new(DEFAULT_PIPELINE_CONFIG) {
            tracing::info!(
                "Pipeline config {} not found, using built-in defaults",
                path.display()
            );
            return Ok(PipelineConfig::default());
        }
        return Err(format!("Pipeline config {} does not exist", path.display()));
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read pipeline config {}: {err}", path.display()))?;
    parse_pipeline_config(&raw)
        .map_err(|err| format!("Invalid pipeline config {}: {err}", path.display()))
}

fn generate_completions(shell: Shell, output: Option<PathBuf>) -> Result<(), String> {
    let mut cmd = Args::command();
    let bin_name = cmd.get_name().to_string();
    if let Some(path) = output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
        }
        let mut file = File::create(&path)
            .map_err(|err| format!("Failed to create {}: {err}", path.display()))?;
        generate(shell, &mut cmd, bin_name, &mut file);
    } else {
        let mut stdout = std::io::stdout();
        generate(shell, &mut cmd, bin_name, &mut stdout);
    }
    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paxcast=info"));
    let ansi = std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(ansi)
        .compact()
        .init();
}

fn headline(message: &str) {
    tracing::info!(status = "start", "{message}");
}

fn info(message: &str) {
    tracing::info!(status = "info", "{message}");
}

fn success(message: &str) {
    tracing::info!(status = "ok", "{message}");
}

fn error(message: &str) {
    tracing::error!(status = "err", "{message}");
}

fn file_name_for(path: &Path) -> Result<String, String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| format!("Path {} has no file name", path.display()))
}

fn archive_path_for(csv_path: &Path) -> Result<PathBuf, String> {
    let file_name = file_name_for(csv_path)?;
    let archive_name = format!("{file_name}.{CSV_ARCHIVE_EXTENSION}");
    let mut archive_path = csv_path.to_path_buf();
    archive_path.set_file_name(archive_name);
    Ok(archive_path)
}

fn archive_csv_file(csv_path: &Path) -> Result<PathBuf, String> {
    let archive_path = archive_path_for(csv_path)?;
    let mut input = File::open(csv_path)
        .map_err(|err| format!("Failed to open CSV {}: {err}", csv_path.display()))?;
    let output = File::create(&archive_path)
        .map_err(|err| format!("Failed to create archive {}: {err}", archive_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)
        .map_err(|err| format!("Failed to write archive {}: {err}", archive_path.display()))?;
    encoder.finish().map_err(|err| {
        format!(
            "Failed to finalize archive {}: {err}",
            archive_path.display()
        )
    })?;
    Ok(archive_path)
}

fn remove_csv_file(csv_path: &Path) -> Result<(), String> {
    fs::remove_file(csv_path)
        .map_err(|err| format!("Failed to remove CSV {}: {err}", csv_path.display()))
}

fn rmse_line(rmse: f64) -> String {
    format!("The root-mean-squared error is {}", format_value(rmse))
}

fn print_rmse(rmse: f64) {
    println!("{}", rmse_line(rmse));
}

/// Загружает размеченный CSV, строит прогноз и сравнивает его с фактом.
fn evaluate_csv(csv_path: &Path, config: &PipelineConfig) -> Result<Evaluation, String> {
    info(&format!("Evaluating baseline on {}", csv_path.display()));
    let table = load_cases(csv_path).map_err(|err| err.to_string())?;
    let forecast = predict(&table, config);
    log_forecast(&forecast);
    score::evaluate(&table, &forecast)
        .map_err(|err| format!("Failed to score {}: {err}", csv_path.display()))
}

/// Строит прогноз по CSV и сохраняет сабмит (при необходимости в архив).
fn predict_csv(
    csv_path: &Path,
    output_csv: &Path,
    config: &PipelineConfig,
    archive_csv: bool,
) -> Result<(), String> {
    info(&format!("Forecasting targets from {}", csv_path.display()));
    let table = load_cases(csv_path).map_err(|err| err.to_string())?;
    let forecast = predict(&table, config);
    log_forecast(&forecast);

    write_submission_csv(&forecast.predictions, output_csv).map_err(|err| err.to_string())?;
    if archive_csv {
        let path = archive_csv_file(output_csv)?;
        remove_csv_file(output_csv)?;
        success(&format!("Saved archive to {}", path.display()));
    } else {
        success(&format!("Saved forecast to {}", output_csv.display()));
    }
    Ok(())
}

fn log_forecast(forecast: &Forecast) {
    let stats = forecast.stats;
    tracing::info!(
        targets = stats.targets,
        with_history = stats.with_history,
        backfilled = stats.backfilled,
        analogs_used = stats.analogs_used,
        clipped = stats.clipped_values,
        "Built baseline forecast"
    );
}

fn write_report(
    evaluation: &Evaluation,
    source: &Path,
    config: &PipelineConfig,
    output_html: &Path,
    minify_html: bool,
) -> Result<(), String> {
    let context = ReportContext {
        source_name: file_name_for(source)?,
        analog_count: config.analog_count,
    };
    report::write_evaluation_report(evaluation, &context, output_html, minify_html)
        .map_err(|err| format!("Failed to render report {}: {err}", output_html.display()))?;
    success(&format!("Saved report to {}", output_html.display()));
    Ok(())
}

fn run_command(command: Command, archive_csv: bool) -> Result<(), String> {
    match command {
        Command::Run {
            data_dir,
            train,
            test,
            output_csv,
            report_html,
            minify_html,
            config,
        } => {
            let pipeline = load_pipeline_config(&config)?;
            let train = data_dir.join(train);
            let test = data_dir.join(test);
            let output_csv = data_dir.join(output_csv);
            tracing::info!(
                mode = "run",
                analog_count = pipeline.analog_count,
                clip_negatives = pipeline.clip_negatives,
                archive_csv,
                train = %train.display(),
                test = %test.display(),
                output_csv = %output_csv.display(),
                "Starting full pipeline"
            );

            let evaluation = evaluate_csv(&train, &pipeline)?;
            print_rmse(evaluation.rmse);
            if let Some(output_html) = report_html {
                write_report(&evaluation, &train, &pipeline, &output_html, minify_html)?;
            }
            predict_csv(&test, &output_csv, &pipeline, archive_csv)
        }
        Command::Evaluate {
            csv,
            report_html,
            minify_html,
            config,
        } => {
            let pipeline = load_pipeline_config(&config)?;
            tracing::info!(
                mode = "evaluate",
                analog_count = pipeline.analog_count,
                input_csv = %csv.display(),
                "Evaluating baseline"
            );
            let evaluation = evaluate_csv(&csv, &pipeline)?;
            print_rmse(evaluation.rmse);
            if let Some(output_html) = report_html {
                write_report(&evaluation, &csv, &pipeline, &output_html, minify_html)?;
            }
            Ok(())
        }
        Command::Predict {
            csv,
            output_csv,
            config,
        } => {
            let pipeline = load_pipeline_config(&config)?;
            tracing::info!(
                mode = "predict",
                analog_count = pipeline.analog_count,
                archive_csv,
                input_csv = %csv.display(),
                output_csv = %output_csv.display(),
                "Writing submission"
            );
            predict_csv(&csv, &output_csv, &pipeline, archive_csv)
        }
        Command::Score { truth, predictions } => {
            tracing::info!(
                mode = "score",
                truth = %truth.display(),
                predictions = %predictions.display(),
                "Scoring submission"
            );
            let table = load_cases(&truth).map_err(|err| err.to_string())?;
            let expected = score::target_truth(&table).map_err(|err| err.to_string())?;
            let submitted = read_submission_csv(&predictions).map_err(|err| err.to_string())?;
            let rmse = score::rmse(&expected, &submitted)
                .map_err(|err| format!("Failed to score {}: {err}", predictions.display()))?;
            print_rmse(rmse);
            Ok(())
        }
        Command::Completions { shell, output } => generate_completions(shell, output),
    }
}

fn main() -> ExitCode {
    let Args {
        archive_csv,
        command,
    } = Args::parse();
    // Автодополнение печатается в stdout, логирование ему не нужно.
    let logging = !matches!(command, Command::Completions { .. });
    if logging {
        init_logging();
        headline(APP_ABOUT);
    }

    match run_command(command, archive_csv) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if logging {
                error(&err);
            } else {
                eprintln!("{err}");
            }
            ExitCode::FAILURE
        }
    }
}
