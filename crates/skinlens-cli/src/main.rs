mod picker;
mod report;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use skinlens_contracts::analysis::{analysis_prompt, parse_analysis_response, AnalysisResult};
use skinlens_contracts::events::EventWriter;
use skinlens_contracts::models::{ModelSelector, DEFAULT_VISION_MODEL, VISION_CAPABILITY};
use skinlens_engine::capture::sniff_image_mime;
use skinlens_engine::credentials::env_api_key;
use skinlens_engine::{
    AnalysisError, AnalysisPipeline, CameraDevice, CredentialContext, CredentialPicker,
    GeminiClient, NoCamera, NullPicker, ScanSession, SessionError,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::picker::LinePicker;

const EXIT_ERROR: i32 = 1;
const EXIT_VALIDATION: i32 = 2;
const EXIT_CREDENTIAL: i32 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "skinlens",
    version,
    about = "Facial skin analysis from a photo or camera snapshot"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze an existing photo
    Analyze(AnalyzeArgs),
    /// Take a camera snapshot (or use --image when no camera works) and analyze it
    Scan(ScanArgs),
    /// Validate a saved model response offline
    Validate(ValidateArgs),
    /// List models that can read photos
    Models,
    /// Print the analysis prompt
    Prompt,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    /// Model name; defaults to $SKINLENS_MODEL, then the registry default
    #[arg(long)]
    model: Option<String>,
    /// Write the validated result as JSON
    #[arg(long)]
    out: Option<PathBuf>,
    /// Append session events as JSONL
    #[arg(long)]
    events: Option<PathBuf>,
    /// Print JSON instead of the text report
    #[arg(long)]
    json: bool,
    /// Never prompt for an API key
    #[arg(long)]
    no_prompt: bool,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct ScanArgs {
    /// Camera device, e.g. /dev/video0
    #[arg(long)]
    device: Option<PathBuf>,
    /// Photo to upload instead of a camera snapshot
    #[arg(long)]
    image: Option<PathBuf>,
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct ValidateArgs {
    #[arg(long)]
    response: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Upload {
    bytes: Vec<u8>,
    mime_type: Option<&'static str>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("skinlens error: {err:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => {
            let upload = read_upload(&args.image)?;
            run_session(Box::new(NoCamera), Some(upload), &args.session)
        }
        Command::Scan(args) => {
            let upload = args.image.as_deref().map(read_upload).transpose()?;
            run_session(camera_for(args.device), upload, &args.session)
        }
        Command::Validate(args) => run_validate(&args),
        Command::Models => {
            print_models();
            Ok(0)
        }
        Command::Prompt => {
            println!("{}", analysis_prompt());
            Ok(0)
        }
    }
}

fn run_session(
    camera: Box<dyn CameraDevice>,
    upload: Option<Upload>,
    args: &SessionArgs,
) -> Result<i32> {
    let requested = args
        .model
        .clone()
        .or_else(|| env::var("SKINLENS_MODEL").ok());
    let selection = ModelSelector::new(None)
        .select_vision(requested.as_deref())
        .map_err(anyhow::Error::msg)?;
    if let (Some(requested), Some(reason)) = (&selection.requested, &selection.fallback_reason) {
        tracing::warn!(requested = %requested, model = %selection.model.name, "{reason}");
    }

    let session_id = Uuid::new_v4().to_string();
    let events = match args.events.as_ref() {
        Some(path) => EventWriter::new(path, session_id),
        None => EventWriter::disabled(session_id),
    };
    let env_key = env_api_key();
    let credentials = CredentialContext::new(build_picker(args.no_prompt, env_key.clone()), env_key);
    let pipeline = AnalysisPipeline::new(
        Box::new(GeminiClient::from_env()),
        selection.model.name.clone(),
    );

    let mut session = ScanSession::new(credentials, camera, events);
    let outcome = drive_session(&mut session, &pipeline, upload);
    session.close();

    match outcome {
        Ok(result) => {
            emit_result(&result, args.out.as_deref(), args.json)?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("skinlens error: {err}");
            Ok(exit_code_for(&err))
        }
    }
}

fn build_picker(no_prompt: bool, env_key: Option<String>) -> Box<dyn CredentialPicker> {
    if no_prompt {
        return Box::new(NullPicker);
    }
    match LinePicker::stdin(env_key) {
        Some(picker) => Box::new(picker),
        None => Box::new(NullPicker),
    }
}

#[cfg(feature = "v4l")]
fn camera_for(device: Option<PathBuf>) -> Box<dyn CameraDevice> {
    Box::new(
        device
            .map(skinlens_engine::v4l_camera::V4lCamera::new)
            .unwrap_or_default(),
    )
}

#[cfg(not(feature = "v4l"))]
fn camera_for(device: Option<PathBuf>) -> Box<dyn CameraDevice> {
    if let Some(device) = device {
        tracing::warn!(
            device = %device.display(),
            "built without camera support; use --image"
        );
    }
    Box::new(NoCamera)
}

/// Initialize, capture, analyze. A cancelled key prompt is offered once more,
/// and a rejected key that was replaced through the picker gets exactly one
/// retry.
fn drive_session(
    session: &mut ScanSession,
    pipeline: &AnalysisPipeline,
    upload: Option<Upload>,
) -> Result<AnalysisResult, SessionError> {
    if let Err(err) = session.initialize() {
        let can_reprompt = session.credentials().has_picker()
            && matches!(&err, SessionError::Analysis(analysis) if analysis.is_credential_error());
        if !can_reprompt {
            return Err(err);
        }
        eprintln!("skinlens: {err}");
        session.select_credential()?;
    }
    match upload {
        Some(upload) => {
            session.capture_from_upload(&upload.bytes, upload.mime_type)?;
        }
        None => {
            if let Some(err) = session.camera_error() {
                return Err(err.clone().into());
            }
            session.capture_from_camera()?;
        }
    }

    match session.analyze(pipeline) {
        Err(SessionError::Analysis(err)) if err.is_retryable_after_reselection() => {
            tracing::info!("retrying analysis with the newly selected API key");
            session.analyze(pipeline)
        }
        other => other,
    }
}

fn exit_code_for(err: &SessionError) -> i32 {
    match err {
        SessionError::Analysis(AnalysisError::Validation(_)) => EXIT_VALIDATION,
        SessionError::Analysis(err) if err.is_credential_error() => EXIT_CREDENTIAL,
        _ => EXIT_ERROR,
    }
}

fn run_validate(args: &ValidateArgs) -> Result<i32> {
    let raw = fs::read_to_string(&args.response)
        .with_context(|| format!("failed to read {}", args.response.display()))?;
    match parse_analysis_response(&raw) {
        Ok(result) => {
            emit_result(&result, args.out.as_deref(), true)?;
            Ok(0)
        }
        Err(err) => {
            eprintln!("skinlens validation failed ({}): {err}", err.kind());
            Ok(EXIT_VALIDATION)
        }
    }
}

fn emit_result(result: &AnalysisResult, out: Option<&Path>, json: bool) -> Result<()> {
    let value = serde_json::to_value(result)?;
    if let Some(out) = out {
        write_json(out, &value)?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", report::render_report(result));
    }
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn print_models() {
    let selector = ModelSelector::new(None);
    for model in selector.registry.by_capability(VISION_CAPABILITY) {
        let marker = if model.name == DEFAULT_VISION_MODEL { "*" } else { " " };
        let context = model
            .context_window
            .map(|tokens| tokens.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{marker} {:<24} {:>9}  {}", model.name, context, model.description);
    }
}

fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mime_type = sniff_image_mime(&bytes).or_else(|| guess_image_mime(path));
    Ok(Upload { bytes, mime_type })
}

/// Extension fallback for formats the content sniffer does not know.
fn guess_image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => return None,
    };
    Some(mime)
}
