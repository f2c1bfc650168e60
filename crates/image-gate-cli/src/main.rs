// crates/image-gate-cli/src/main.rs
// ============================================================================
// Module: Image Gate CLI Entry Point
// Description: Command dispatcher for image gate evaluation and bundle tools.
// Purpose: Provide a localized CLI that maps verdicts onto exit codes.
// Dependencies: clap, image-gate-config, image-gate-core, serde_jcs, thiserror.
// ============================================================================

//! ## Overview
//! The Image Gate CLI evaluates analyzed images against a policy bundle (or a
//! flat policy file), validates and hashes bundles, and validates runtime
//! configuration. All user-facing strings are routed through the i18n catalog.
//!
//! Exit codes: `GO` = 0, `STOP` = 1, `WARN` = 2, any error = 3. A run over
//! several tags exits with its most severe verdict unless a tag failed.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod render;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use image_gate_cli::i18n::Locale;
use image_gate_cli::i18n::set_locale;
use image_gate_cli::t;
use image_gate_config::FileImageMetadataSource;
use image_gate_config::ImageGateConfig;
use image_gate_config::LogConfig;
use image_gate_config::LogSinkKind;
use image_gate_config::load_bundle;
use image_gate_config::load_global_whitelist;
use image_gate_config::load_legacy_policy;
use image_gate_core::Bundle;
use image_gate_core::CancellationToken;
use image_gate_core::EvaluationContext;
use image_gate_core::EvaluationLogSink;
use image_gate_core::EvaluationWarning;
use image_gate_core::GateSource;
use image_gate_core::GlobalWhitelist;
use image_gate_core::ImageId;
use image_gate_core::ImageMetadataSource;
use image_gate_core::ImageRecord;
use image_gate_core::MetadataError;
use image_gate_core::Verdict;
use image_gate_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use image_gate_core::runtime::FileGateOutputStore;
use image_gate_core::runtime::FileLedgerStore;
use image_gate_core::runtime::FileLogSink;
use image_gate_core::runtime::NoopLogSink;
use image_gate_core::runtime::ProcessGateRunner;
use image_gate_core::runtime::StderrLogSink;
use image_gate_core::runtime::evaluate_image_policy;
use image_gate_core::runtime::run_bundle;
use serde::Serialize;
use thiserror::Error;

use crate::render::DisplayOptions;
use crate::render::GateReport;
use crate::render::render_tables;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable for CLI locale selection.
const LANG_ENV: &str = "IMAGE_GATE_LANG";
/// Exit code for a `GO` verdict.
const EXIT_GO: u8 = 0;
/// Exit code for a `STOP` verdict.
const EXIT_STOP: u8 = 1;
/// Exit code for a `WARN` verdict.
const EXIT_WARN: u8 = 2;
/// Exit code for any error.
const EXIT_ERROR: u8 = 3;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "image-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Preferred output language (overrides `IMAGE_GATE_LANG`).
    #[arg(long, value_enum, value_name = "LANG", global = true)]
    lang: Option<LangArg>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate an analyzed image and print its verdict.
    Gate(GateCommand),
    /// Policy bundle utilities.
    Bundle {
        /// Selected bundle subcommand.
        #[command(subcommand)]
        command: BundleCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for the `gate` command.
#[derive(Args, Debug)]
struct GateCommand {
    /// Analyzed image id.
    #[arg(long, value_name = "IMAGE_ID")]
    image: String,
    /// Flat policy file evaluated without mapping.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with = "run_bundle",
        required_unless_present = "run_bundle"
    )]
    policy: Option<PathBuf>,
    /// Evaluate through the policy bundle given by `--bundlefile`.
    #[arg(long, action = ArgAction::SetTrue, requires = "bundlefile")]
    run_bundle: bool,
    /// Policy bundle file.
    #[arg(long, value_name = "FILE", requires = "run_bundle")]
    bundlefile: Option<PathBuf>,
    /// Tag reference to evaluate (repeatable; defaults to the image's recorded tags).
    #[arg(long = "usetag", value_name = "TAG", requires = "run_bundle")]
    usetags: Vec<String>,
    /// Known digest for the image (repeatable).
    #[arg(long = "digest", value_name = "DIGEST", requires = "run_bundle")]
    digests: Vec<String>,
    /// Add the trigger id column.
    #[arg(long = "show-triggerids", action = ArgAction::SetTrue)]
    show_trigger_ids: bool,
    /// Add the whitelisted column and list suppressed occurrences.
    #[arg(long, action = ArgAction::SetTrue)]
    show_whitelisted: bool,
    /// Print a JSON report instead of tables.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Replay stored gate output instead of running gates.
    #[arg(long, action = ArgAction::SetTrue)]
    from_stored_output: bool,
    /// Optional config file path (defaults to image-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Bundle subcommands.
#[derive(Subcommand, Debug)]
enum BundleCommand {
    /// Validate a bundle against the schema and its cross references.
    Validate(BundleFileCommand),
    /// Print the canonical hash of a valid bundle.
    Hash(BundleFileCommand),
}

/// Arguments naming a bundle file.
#[derive(Args, Debug)]
struct BundleFileCommand {
    /// Policy bundle file.
    #[arg(long, value_name = "FILE")]
    bundlefile: PathBuf,
    /// Optional config file path supplying the bundle size limit.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate an Image Gate configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to image-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Supported CLI language selections.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum LangArg {
    /// English.
    En,
    /// Catalan.
    Ca,
}

impl From<LangArg> for Locale {
    fn from(value: LangArg) -> Self {
        match value {
            LangArg::En => Self::En,
            LangArg::Ca => Self::Ca,
        }
    }
}

/// CLI error wrapper for localized error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a localized message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() { EXIT_ERROR } else { EXIT_GO };
            return Ok(ExitCode::from(code));
        }
    };
    let env_lang = std::env::var(LANG_ENV).ok();
    let locale = resolve_locale(cli.lang, env_lang.as_deref())?;
    set_locale(locale);
    if locale != Locale::En {
        write_stderr_line(&t!("i18n.disclaimer.machine_translated"))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Gate(command) => command_gate(&command),
        Commands::Bundle {
            command,
        } => command_bundle(command),
        Commands::Config {
            command,
        } => command_config(command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Gate Command
// ============================================================================

/// Executes the `gate` command.
fn command_gate(command: &GateCommand) -> CliResult<ExitCode> {
    let config = ImageGateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let log = build_log_sink(&config.log)?;
    let global_whitelist = match &config.paths.global_whitelist {
        Some(path) => load_global_whitelist(path).map_err(|err| {
            CliError::new(t!("gate.whitelist.load_failed", path = path.display(), error = err))
        })?,
        None => GlobalWhitelist::new(),
    };
    let source =
        if command.from_stored_output { GateSource::Stored } else { GateSource::Execute };
    let options = config.evaluation_options(source);
    let runner = ProcessGateRunner::new(config.gate_executables(), config.gates.max_output_bytes);
    let ledger = FileLedgerStore::new(config.paths.ledger_dir());
    let outputs = FileGateOutputStore::new(config.paths.gate_output_dir());
    let cancel = CancellationToken::new();
    let ctx = EvaluationContext {
        options: &options,
        runner: &runner,
        ledger: &ledger,
        outputs: &outputs,
        log: log.as_ref(),
        global_whitelist: &global_whitelist,
        cancel: &cancel,
    };
    let image_id = ImageId::new(command.image.trim());

    let report = if command.run_bundle {
        let path =
            command.bundlefile.as_deref().ok_or_else(|| CliError::new(t!("gate.policy_required")))?;
        let bundle = read_bundle(path, config.limits.max_bundle_bytes)?;
        let metadata = FileImageMetadataSource::new(config.paths.images_dir());
        let record = resolve_image_record(&metadata, &image_id, &command.usetags)?;
        let run = run_bundle(&ctx, &bundle, &record, &command.usetags, &command.digests).map_err(
            |err| CliError::new(t!("gate.evaluation_failed", image = image_id, error = err)),
        )?;
        GateReport::from_bundle_run(run)
    } else {
        let path =
            command.policy.as_deref().ok_or_else(|| CliError::new(t!("gate.policy_required")))?;
        let policy = load_legacy_policy(path).map_err(|err| {
            CliError::new(t!("gate.policy.load_failed", path = path.display(), error = err))
        })?;
        let evaluation = evaluate_image_policy(&ctx, &policy, &image_id).map_err(|err| {
            CliError::new(t!("gate.evaluation_failed", image = image_id, error = err))
        })?;
        GateReport::from_policy_evaluation(evaluation)
    };

    for warning in report.warnings() {
        write_stderr_line(&warning_message(warning))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    if command.json {
        write_json(&report)?;
    } else {
        for (tag, error) in report.failures() {
            write_stderr_line(&t!("gate.tag_failed", tag = tag, error = error))
                .map_err(|err| CliError::new(output_error("stderr", &err)))?;
        }
        let display = DisplayOptions {
            show_trigger_ids: command.show_trigger_ids,
            show_whitelisted: command.show_whitelisted,
        };
        write_stdout_bytes(render_tables(&report, display).as_bytes())
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::from(exit_code_for(&report)))
}

/// Builds the configured evaluation log sink.
fn build_log_sink(config: &LogConfig) -> CliResult<Box<dyn EvaluationLogSink>> {
    match config.sink {
        LogSinkKind::Stderr => Ok(Box::new(StderrLogSink)),
        LogSinkKind::None => Ok(Box::new(NoopLogSink)),
        LogSinkKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| CliError::new(t!("config.log.path_missing")))?;
            let sink = FileLogSink::new(path).map_err(|err| {
                CliError::new(t!("config.log.open_failed", path = path.display(), error = err))
            })?;
            Ok(Box::new(sink))
        }
    }
}

/// Looks up analyzer metadata for an image.
///
/// An image without metadata can still be evaluated when tags are given
/// explicitly; it then has no aliases and no recorded digests.
fn resolve_image_record(
    source: &dyn ImageMetadataSource,
    image_id: &ImageId,
    usetags: &[String],
) -> CliResult<ImageRecord> {
    match source.image(image_id) {
        Ok(record) => Ok(record),
        Err(MetadataError::NotFound(_)) if !usetags.is_empty() => {
            Ok(ImageRecord::new(image_id.clone()))
        }
        Err(err) => Err(CliError::new(t!("gate.metadata.failed", image = image_id, error = err))),
    }
}

/// Formats a non-fatal evaluation warning.
fn warning_message(warning: &EvaluationWarning) -> String {
    match warning {
        EvaluationWarning::MalformedGateOutput {
            gate,
            line,
            reason,
        } => t!("gate.warning.malformed", gate = gate, line = line, reason = reason),
        EvaluationWarning::WhitelistLoadFailed {
            error,
        } => t!("gate.warning.ledger", error = error),
    }
}

/// Maps a report onto the process exit code.
fn exit_code_for(report: &GateReport) -> u8 {
    if report.has_errors() {
        return EXIT_ERROR;
    }
    match report.worst_verdict() {
        Some(Verdict::Go) => EXIT_GO,
        Some(Verdict::Warn) => EXIT_WARN,
        Some(Verdict::Stop) => EXIT_STOP,
        None => EXIT_ERROR,
    }
}

// ============================================================================
// SECTION: Bundle Commands
// ============================================================================

/// Dispatches bundle subcommands.
fn command_bundle(command: BundleCommand) -> CliResult<ExitCode> {
    match command {
        BundleCommand::Validate(command) => {
            let bundle = load_bundle_with_config(&command)?;
            write_stdout_line(&t!(
                "bundle.validate.ok",
                id = bundle.id,
                policies = bundle.policies.len(),
                whitelists = bundle.whitelists.len(),
                mappings = bundle.mappings.len()
            ))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        BundleCommand::Hash(command) => {
            let bundle = load_bundle_with_config(&command)?;
            let digest = bundle
                .canonical_hash_with(DEFAULT_HASH_ALGORITHM)
                .map_err(|err| CliError::new(t!("bundle.hash.failed", error = err)))?;
            write_stdout_line(&t!("bundle.hash.ok", algorithm = "sha256", value = digest.value))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads the config for its bundle size limit, then the bundle.
fn load_bundle_with_config(command: &BundleFileCommand) -> CliResult<Bundle> {
    let config = ImageGateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    read_bundle(&command.bundlefile, config.limits.max_bundle_bytes)
}

/// Loads and validates a bundle file.
fn read_bundle(path: &Path, max_bytes: usize) -> CliResult<Bundle> {
    load_bundle(path, max_bytes).map_err(|err| {
        CliError::new(t!("bundle.load_failed", path = path.display(), error = err))
    })
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => {
            ImageGateConfig::load(command.config.as_deref())
                .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
            write_stdout_line(&t!("config.validate.ok"))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Locale
// ============================================================================

/// Resolves the output locale from `--lang`, then the environment.
fn resolve_locale(lang: Option<LangArg>, env_lang: Option<&str>) -> CliResult<Locale> {
    if let Some(lang) = lang {
        return Ok(lang.into());
    }
    if let Some(value) = env_lang {
        return Locale::parse(value).ok_or_else(|| {
            CliError::new(t!("i18n.lang.invalid_env", env = LANG_ENV, value = value))
        });
    }
    Ok(Locale::En)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes canonical JSON followed by a newline to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(t!("output.json.serialize_failed", error = err)))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats a localized output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns the error exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::from(EXIT_ERROR)
}
