use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use screen_guide::error::ErrorContext;
use screen_guide::models::{
    ActionRequest, CompletionCheckRequest, ContextFile, Coordinate, CoordinateRequest,
    HelpRequest, NO_COORDINATE,
};
use screen_guide::similarity::{DEFAULT_THRESHOLD, similarity};
use screen_guide::snapshot::decode_image_data;
use screen_guide::types::MimeType;
use screen_guide::{AppState, CancellationToken, Generation, app_init, serialize_context};

#[derive(Debug, Parser)]
#[command(name = "screen-guide", version, about = "Step-by-step on-screen guidance client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask for the next instruction toward a goal.
    Step(StepArgs),
    /// Ask a question about the current screen.
    Help(HelpArgs),
    /// Check whether an instruction was carried out.
    Check(CheckArgs),
    /// Locate an instruction's target on the screen.
    Point(PointArgs),
    /// Analyze context files and print the prompt context.
    Files(FilesArgs),
    /// Compare two instructions.
    Similar(SimilarArgs),
}

#[derive(Debug, Parser)]
struct StepArgs {
    #[arg(long)]
    goal: String,
    #[arg(long)]
    screenshot: PathBuf,
    #[arg(long)]
    os: Option<String>,
    /// Already completed step; repeatable.
    #[arg(long = "done")]
    completed: Vec<String>,
}

#[derive(Debug, Parser)]
struct HelpArgs {
    #[arg(long)]
    goal: String,
    #[arg(long)]
    screenshot: PathBuf,
    #[arg(long)]
    question: String,
    #[arg(long)]
    previous: Option<String>,
}

#[derive(Debug, Parser)]
struct CheckArgs {
    #[arg(long)]
    instruction: String,
    #[arg(long)]
    before: PathBuf,
    #[arg(long)]
    after: PathBuf,
}

#[derive(Debug, Parser)]
struct PointArgs {
    #[arg(long)]
    instruction: String,
    #[arg(long)]
    screenshot: PathBuf,
    /// Write a cropped, annotated PNG around the point.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct FilesArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct SimilarArgs {
    a: String,
    b: String,
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,
}

/// Screenshot file as a self-contained data URL.
async fn screenshot_data_url(path: &Path) -> screen_guide::Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .context(format!("reading {}", path.display()))?;
    let mime = MimeType::guess_from_name(&path.to_string_lossy())
        .unwrap_or_else(|| MimeType::new("image/png"));
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

fn report<T>(outcome: Generation<T>) -> Option<T> {
    match outcome {
        Generation::Ready(value) => Some(value),
        Generation::Unavailable { reason } => {
            log::error!("❌ Backend unavailable: {}", reason);
            None
        }
        Generation::Cancelled => {
            log::warn!("Cancelled");
            None
        }
    }
}

async fn run(state: &AppState, command: Command, cancel: &CancellationToken) -> screen_guide::Result<()> {
    match command {
        Command::Step(args) => {
            let mut request = ActionRequest::new(args.goal, screenshot_data_url(&args.screenshot).await?);
            if let Some(os) = args.os {
                request = request.with_os_name(os);
            }
            if !args.completed.is_empty() {
                request = request.with_completed_steps(args.completed);
            }

            let instruction = report(state.generation.generate_action(&request, cancel).await)
                .unwrap_or_default();
            if instruction.is_empty() {
                println!("(no instruction available)");
            } else {
                println!("{}", instruction);
            }
        }
        Command::Help(args) => {
            let mut request = HelpRequest::new(
                args.goal,
                screenshot_data_url(&args.screenshot).await?,
                args.question,
            );
            if let Some(previous) = args.previous {
                request = request.with_previous_message(previous);
            }

            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            let printer = tokio::spawn(async move {
                let mut shown = 0;
                while let Some(so_far) = rx.recv().await {
                    print!("{}", &so_far[shown..]);
                    let _ = std::io::stdout().flush();
                    shown = so_far.len();
                }
                println!();
            });

            let outcome = state.generation.generate_help(&request, Some(&tx), cancel).await;
            drop(tx);
            printer.await?;
            report(outcome);
        }
        Command::Check(args) => {
            let request = CompletionCheckRequest {
                instruction: args.instruction,
                before_image: screenshot_data_url(&args.before).await?,
                after_image: screenshot_data_url(&args.after).await?,
            };
            let complete = report(state.generation.check_step_completion(&request, cancel).await)
                .unwrap_or_default();
            println!("{}", if complete { "complete" } else { "not complete" });
        }
        Command::Point(args) => {
            let image = screenshot_data_url(&args.screenshot).await?;
            let request = CoordinateRequest {
                instruction: args.instruction,
                image: image.clone(),
            };
            let text = report(state.generation.generate_coordinate(&request, cancel).await)
                .unwrap_or_else(|| NO_COORDINATE.to_string());

            let coordinate = match text.parse::<Coordinate>() {
                Ok(coordinate) => coordinate,
                Err(e) => {
                    println!("{}", NO_COORDINATE);
                    log::warn!("No usable coordinate: {}", e);
                    return Ok(());
                }
            };
            println!("{},{}", coordinate.x, coordinate.y);

            if let Some(out) = args.snapshot {
                match state.snapshots.build(&image, coordinate).await? {
                    Some(data_url) => {
                        tokio::fs::write(&out, decode_image_data(&data_url)?).await?;
                        log::info!("🖼️  Snapshot written to {}", out.display());
                    }
                    None => log::warn!("Coordinate outside the screen, no snapshot"),
                }
            }
        }
        Command::Files(args) => {
            let mut files = Vec::with_capacity(args.paths.len());
            for path in &args.paths {
                files.push(
                    ContextFile::from_path(path)
                        .await
                        .context(format!("reading {}", path.display()))?,
                );
            }
            let analyzed = state.analyzer.analyze(&files).await?;
            println!("{}", serialize_context(&analyzed));
        }
        Command::Similar(args) => {
            let score = similarity(&args.a, &args.b);
            println!("{:.3} ({})", score, if score >= args.threshold { "similar" } else { "different" });
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let state = app_init()?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel().await;
            }
        });
    }

    if let Err(e) = run(&state, cli.command, &cancel).await {
        screen_guide::error::log_error(&e);
        return Err(e.into());
    }
    Ok(())
}
