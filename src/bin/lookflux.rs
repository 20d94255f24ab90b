//! lookflux CLI - Command-line interface for lookflux
//!
//! Commands:
//! - summarize: Run the pipeline and write the summary payload or rows
//! - validate: Check joins and condition codes without aggregating
//! - schema: Print the input and output schemas
//! - doctor: Diagnose configuration and environment

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use lookflux::config::AnalysisConfig;
use lookflux::encoder::{SummaryEncoder, OUTPUT_SCHEMA_VERSION};
use lookflux::pipeline::{validate_tables, LookingTimeProcessor};
use lookflux::schema::{DirectoryTableSource, TableAdapter, TableSource, Tables, TABLES_SCHEMA_VERSION};
use lookflux::types::{SubjectUnit, TimeWindow, WindowMethod};
use lookflux::{ComputeError, LOOKFLUX_VERSION, PRODUCER_NAME};

/// lookflux - Looking-while-listening accuracy curves
#[derive(Parser)]
#[command(name = "lookflux")]
#[command(author = "Lookflux Developers")]
#[command(version = LOOKFLUX_VERSION)]
#[command(about = "Summarize eye-tracking accuracy by condition and time", long_about = None)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and write the summary
    Summarize {
        #[command(flatten)]
        input: InputArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Window start in ms (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        window_start: Option<i64>,

        /// Window end in ms (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        window_end: Option<i64>,

        /// How the window is reduced
        #[arg(long)]
        window_method: Option<WindowMethodArg>,

        /// Pass-1 unit of replication
        #[arg(long)]
        subject_unit: Option<SubjectUnitArg>,
    },

    /// Check joins and condition codes without aggregating
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a snapshot directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Table bundle JSON file (use - for stdin)
    #[arg(short, long, conflicts_with = "data_dir")]
    tables: Option<PathBuf>,

    /// Snapshot directory holding one directory or bundle per dataset
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Dataset name (overrides the config file)
    #[arg(long)]
    dataset: Option<String>,

    /// Analysis configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the t_norm grid check
    #[arg(long)]
    no_grid_check: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact payload JSON
    Json,
    /// Pretty-printed payload JSON
    JsonPretty,
    /// One summary row per line
    Ndjson,
}

#[derive(Clone, Copy, ValueEnum)]
enum WindowMethodArg {
    /// Mean of the summary curve inside the window
    SummaryMean,
    /// Pool each unit over the window, then average
    SubjectReaggregate,
}

impl From<WindowMethodArg> for WindowMethod {
    fn from(arg: WindowMethodArg) -> Self {
        match arg {
            WindowMethodArg::SummaryMean => WindowMethod::SummaryMean,
            WindowMethodArg::SubjectReaggregate => WindowMethod::SubjectReaggregate,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SubjectUnitArg {
    Administration,
    Subject,
}

impl From<SubjectUnitArg> for SubjectUnit {
    fn from(arg: SubjectUnitArg) -> Self {
        match arg {
            SubjectUnitArg::Administration => SubjectUnit::Administration,
            SubjectUnitArg::Subject => SubjectUnit::Subject,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input tables (lookflux.tables.v1)
    Input,
    /// Output payload (lookflux.summary.v1)
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for data
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LookfluxCliError> {
    match cli.command {
        Commands::Summarize {
            input,
            output,
            output_format,
            window_start,
            window_end,
            window_method,
            subject_unit,
        } => {
            let mut config = load_config(&input)?;
            if let Some(unit) = subject_unit {
                config.subject_unit = unit.into();
            }
            apply_window(&mut config, window_start, window_end, window_method)?;
            cmd_summarize(&input, config, &output, output_format)
        }

        Commands::Validate { input, json } => {
            let config = load_config(&input)?;
            cmd_validate(&input, &config, json)
        }

        Commands::Schema { schema_type, json_schema } => cmd_schema(schema_type, json_schema),

        Commands::Doctor { config, data_dir, json } => {
            cmd_doctor(config.as_deref(), data_dir.as_deref(), json)
        }
    }
}

fn load_config(input: &InputArgs) -> Result<AnalysisConfig, LookfluxCliError> {
    let mut config = match &input.config {
        Some(path) => AnalysisConfig::from_json(&fs::read_to_string(path)?)?,
        None => AnalysisConfig::default(),
    };
    if let Some(dataset) = &input.dataset {
        config.dataset_name = dataset.clone();
    }
    if input.no_grid_check {
        config.grid_step_ms = None;
    }
    config.validate()?;
    Ok(config)
}

fn apply_window(
    config: &mut AnalysisConfig,
    start: Option<i64>,
    end: Option<i64>,
    method: Option<WindowMethodArg>,
) -> Result<(), LookfluxCliError> {
    match (start, end) {
        (Some(start), Some(end)) => {
            config.window = Some(TimeWindow::new(start, end)?);
        }
        (None, None) => {}
        _ => return Err(LookfluxCliError::IncompleteWindow),
    }
    if let Some(method) = method {
        config.window_method = method.into();
    }
    Ok(())
}

fn load_tables(input: &InputArgs, config: &AnalysisConfig) -> Result<Tables, LookfluxCliError> {
    if let Some(path) = &input.tables {
        let content = if path.to_string_lossy() == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        } else {
            fs::read_to_string(path)?
        };
        return Ok(TableAdapter::parse_bundle(&content)?);
    }

    if let Some(dir) = &input.data_dir {
        let source = DirectoryTableSource::new(dir);
        return Ok(source.load_tables(&config.dataset_name)?);
    }

    Err(LookfluxCliError::NoInput)
}

fn cmd_summarize(
    input: &InputArgs,
    config: AnalysisConfig,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), LookfluxCliError> {
    let tables = load_tables(input, &config)?;
    if tables.is_empty() {
        return Err(LookfluxCliError::NoSamples);
    }

    let processor = LookingTimeProcessor::new(config)?;
    let result = processor.process_tables(&tables)?;

    let output_data = match output_format {
        OutputFormat::Ndjson => SummaryEncoder::encode_rows_ndjson(&result.summary)?,
        OutputFormat::Json => serde_json::to_string(&processor.payload(&result)?)? + "\n",
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&processor.payload(&result)?)? + "\n",
    };

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
        tracing::info!(path = %output.display(), "wrote summary");
    }

    Ok(())
}

fn cmd_validate(input: &InputArgs, config: &AnalysisConfig, json: bool) -> Result<(), LookfluxCliError> {
    let tables = load_tables(input, config)?;
    let report = validate_tables(&tables, config);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Dataset:          {}", report.dataset_name);
        println!("Samples:          {}", report.counts.samples);
        println!("Administrations:  {}", report.counts.administrations);
        println!("Trials:           {}", report.counts.trials);
        println!("Trial types:      {}", report.counts.trial_types);
        println!("Time points:      {}", report.time_points);
        println!("Joined samples:   {}", report.joined);
        println!("Labeled samples:  {}", report.labeled);
        println!("Filler excluded:  {}", report.filler_excluded);

        if report.n_grid_issues > 0 {
            println!("\nOff-grid samples: {}", report.n_grid_issues);
            for issue in &report.grid_issues {
                println!("  - row {}: t_norm {}", issue.index, issue.t_norm);
            }
        }

        if let Some(error) = &report.error {
            println!("\nError: {}", error);
        }
    }

    if report.is_valid() {
        Ok(())
    } else {
        let reason = report
            .error
            .clone()
            .unwrap_or_else(|| format!("{} samples off the time grid", report.n_grid_issues));
        Err(LookfluxCliError::ValidationFailed(reason))
    }
}

fn cmd_doctor(config: Option<&Path>, data_dir: Option<&Path>, json: bool) -> Result<(), LookfluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "lookflux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("lookflux version {}", LOOKFLUX_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input: {}, output: {}", TABLES_SCHEMA_VERSION, OUTPUT_SCHEMA_VERSION),
    });

    if let Some(path) = config {
        let check = match fs::read_to_string(path) {
            Ok(content) => match AnalysisConfig::from_json(&content) {
                Ok(loaded) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (dataset {}, unit {})",
                        loaded.dataset_name,
                        loaded.subject_unit.as_str()
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid config: {}", e),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        };
        checks.push(check);
    }

    if let Some(dir) = data_dir {
        let check = match DirectoryTableSource::new(dir).list_datasets() {
            Ok(names) if names.is_empty() => DoctorCheck {
                name: "data_dir".to_string(),
                status: CheckStatus::Warning,
                message: "Snapshot directory holds no datasets".to_string(),
            },
            Ok(names) => DoctorCheck {
                name: "data_dir".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} datasets: {}", names.len(), names.join(", ")),
            },
            Err(e) => DoctorCheck {
                name: "data_dir".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read snapshot directory: {}", e),
            },
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--tables - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: LOOKFLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("lookflux Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(LookfluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), LookfluxCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", TABLES_SCHEMA_VERSION);
                println!();
                println!("A bundle object (or one file per table) with four tables:");
                println!();
                println!("1. aoi_timepoints (alias gaze_samples)");
                println!("   - administration_id, trial_id, t_norm (ms), aoi");
                println!("   - aoi: target, distractor, other (or away), missing");
                println!("   - trial_type_id optional; checked against the trial");
                println!();
                println!("2. administrations");
                println!("   - administration_id, subject_id, age (months, optional)");
                println!();
                println!("3. trials");
                println!("   - trial_id, trial_type_id, administration_id");
                println!();
                println!("4. trial_types");
                println!("   - trial_type_id, condition (cp, mp, filler by default), layout");
                println!();
                println!("Per-table files: <data-dir>/<dataset>/<table>.json or .ndjson");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output Schema: {}", OUTPUT_SCHEMA_VERSION);
                println!();
                println!("- schema_version");
                println!("- producer: {{ name, version, instance_id }}");
                println!("- provenance: {{ dataset_name, subject_unit, computed_at_utc }}");
                println!("- quality: {{ n_points, n_low_support, n_undefined_means }}");
                println!("- summary: Array of points containing:");
                println!("  - condition (Correct, Mispronounced), t_norm");
                println!("  - mean_accuracy, ci_half_width (null when undefined)");
                println!("  - n_subjects, n_undefined, flags");
                println!("- windows: {{ condition, window, method, mean_accuracy, n_contributing }}");
            }
        }
    }
    Ok(())
}

fn get_input_json_schema() -> String {
    let id = |name: &str| serde_json::json!({ "type": "integer", "minimum": 0, "description": name });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": TABLES_SCHEMA_VERSION,
        "description": "lookflux input table bundle",
        "type": "object",
        "required": ["aoi_timepoints", "administrations", "trials", "trial_types"],
        "properties": {
            "aoi_timepoints": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["administration_id", "trial_id", "t_norm", "aoi"],
                    "properties": {
                        "administration_id": id("administration"),
                        "trial_id": id("trial"),
                        "trial_type_id": id("trial type"),
                        "t_norm": { "type": "integer" },
                        "aoi": { "enum": ["target", "distractor", "other", "away", "missing"] }
                    }
                }
            },
            "administrations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["administration_id", "subject_id"],
                    "properties": {
                        "administration_id": id("administration"),
                        "subject_id": id("subject"),
                        "age": { "type": ["number", "null"] }
                    }
                }
            },
            "trials": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["trial_id", "trial_type_id", "administration_id"],
                    "properties": {
                        "trial_id": id("trial"),
                        "trial_type_id": id("trial type"),
                        "administration_id": id("administration")
                    }
                }
            },
            "trial_types": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["trial_type_id", "condition"],
                    "properties": {
                        "trial_type_id": id("trial type"),
                        "condition": { "type": "string" },
                        "layout": { "type": "string" }
                    }
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let nullable_number = serde_json::json!({ "type": ["number", "null"] });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": OUTPUT_SCHEMA_VERSION,
        "description": "lookflux summary payload",
        "type": "object",
        "required": ["schema_version", "producer", "provenance", "quality", "summary"],
        "properties": {
            "schema_version": { "type": "string", "const": OUTPUT_SCHEMA_VERSION },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "provenance": {
                "type": "object",
                "properties": {
                    "dataset_name": { "type": "string" },
                    "subject_unit": { "enum": ["administration", "subject"] },
                    "computed_at_utc": { "type": "string", "format": "date-time" }
                }
            },
            "quality": {
                "type": "object",
                "properties": {
                    "n_points": { "type": "integer" },
                    "n_low_support": { "type": "integer" },
                    "n_undefined_means": { "type": "integer" }
                }
            },
            "summary": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "condition": { "enum": ["Correct", "Mispronounced"] },
                        "t_norm": { "type": "integer" },
                        "mean_accuracy": nullable_number,
                        "ci_half_width": nullable_number,
                        "n_subjects": { "type": "integer" },
                        "n_undefined": { "type": "integer" },
                        "flags": {
                            "type": "array",
                            "items": { "enum": ["low_support", "undefined_subjects_excluded", "no_valid_subjects"] }
                        }
                    }
                }
            },
            "windows": {
                "type": "array",
                "items": { "type": "object" }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum LookfluxCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoInput,
    NoSamples,
    IncompleteWindow,
    ValidationFailed(String),
    DoctorFailed,
}

impl From<io::Error> for LookfluxCliError {
    fn from(e: io::Error) -> Self {
        LookfluxCliError::Io(e)
    }
}

impl From<ComputeError> for LookfluxCliError {
    fn from(e: ComputeError) -> Self {
        LookfluxCliError::Compute(e)
    }
}

impl From<serde_json::Error> for LookfluxCliError {
    fn from(e: serde_json::Error) -> Self {
        LookfluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<LookfluxCliError> for CliError {
    fn from(e: LookfluxCliError) -> Self {
        match e {
            LookfluxCliError::Io(e) => {
                CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions")
            }
            LookfluxCliError::Compute(e) => compute_error(e),
            LookfluxCliError::Json(e) => {
                CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax")
            }
            LookfluxCliError::NoInput => CliError::new(
                "NO_INPUT",
                "No table input given".to_string(),
                "Pass --tables <file> or --data-dir <dir>",
            ),
            LookfluxCliError::NoSamples => CliError::new(
                "NO_SAMPLES",
                "The aoi_timepoints table is empty".to_string(),
                "Check that the dataset snapshot is complete",
            ),
            LookfluxCliError::IncompleteWindow => CliError::new(
                "INCOMPLETE_WINDOW",
                "--window-start and --window-end must be given together".to_string(),
                "Pass both bounds in milliseconds",
            ),
            LookfluxCliError::ValidationFailed(reason) => CliError::new(
                "VALIDATION_FAILED",
                reason,
                "Fix the reported rows and retry",
            ),
            LookfluxCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
        }
    }
}

fn compute_error(e: ComputeError) -> CliError {
    let message = e.to_string();
    match e {
        ComputeError::JoinIntegrity(_) => CliError::new(
            "JOIN_INTEGRITY",
            message,
            "Run 'lookflux validate' to inspect the tables",
        ),
        ComputeError::UnknownCondition { .. } => CliError::new(
            "UNKNOWN_CONDITION",
            message,
            "Set condition_codes in the config to match the dataset",
        ),
        ComputeError::IrregularTimeGrid { .. } => CliError::new(
            "IRREGULAR_TIME_GRID",
            message,
            "Resample t_norm upstream or pass --no-grid-check",
        ),
        ComputeError::InvalidConfig(_) | ComputeError::InvalidWindow { .. } => {
            CliError::new("CONFIG_ERROR", message, "Run 'lookflux doctor --config <file>'")
        }
        ComputeError::DatasetNotFound(_) => CliError::new(
            "DATASET_NOT_FOUND",
            message,
            "Run 'lookflux doctor --data-dir <dir>' to list datasets",
        ),
        ComputeError::Io(_) => {
            CliError::new("IO_ERROR", message, "Check file paths and permissions")
        }
        ComputeError::ParseError(_) | ComputeError::JsonError(_) => CliError::new(
            "PARSE_ERROR",
            message,
            "Ensure input matches lookflux.tables.v1 ('lookflux schema input')",
        ),
        ComputeError::EncodingError(_) => {
            CliError::new("ENCODING_ERROR", message, "Report this as a bug")
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
