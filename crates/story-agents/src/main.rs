mod config;
mod render;

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use conversation::{
    AgentPool, Intensity, OpenAiGenerator, Role, SessionRegistry, Settings, StoryRequest,
    StyleOptions,
};
use tracing::{info, warn};

use config::EndpointConfig;
use render::{render, Format};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a Writer/Reader/Expert story session", long_about = None)]
struct Args {
    /// Story theme or premise
    theme: String,

    /// Target length in pages (1-10)
    #[arg(short, long, default_value_t = 3)]
    length: u32,

    /// Protagonist name
    #[arg(short, long)]
    protagonist: Option<String>,

    /// Tone intensity: subtle, moderate, or intense
    #[arg(long, default_value = "moderate")]
    intensity: Intensity,

    /// Style classified details with redaction bars
    #[arg(long, default_value_t = false)]
    redact: bool,

    /// Extra style knob as key=value (repeatable)
    #[arg(long = "style", value_name = "KEY=VALUE")]
    style: Vec<String>,

    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for story.md and transcript.jsonl (overrides settings)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Emit events as JSON lines instead of a readable transcript
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Request full replies instead of streamed fragments
    #[arg(long, default_value_t = false)]
    no_stream: bool,
}

fn style_options(args: &Args) -> Result<StyleOptions> {
    let mut style = StyleOptions {
        intensity: args.intensity,
        redaction: args.redact,
        ..StyleOptions::default()
    };
    for knob in &args.style {
        let (key, value) = knob
            .split_once('=')
            .with_context(|| format!("style knob '{knob}' is not KEY=VALUE"))?;
        style
            .extra
            .insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(style)
}

fn agent_pool(endpoints: &EndpointConfig, stream: bool) -> Result<AgentPool> {
    let build = |role: Role| -> Result<Arc<OpenAiGenerator>> {
        let generator = OpenAiGenerator::new(endpoints.openai_config(role, stream))
            .with_context(|| format!("Failed to build {role} client"))?;
        Ok(Arc::new(generator))
    };
    Ok(AgentPool::new(
        build(Role::Writer)?,
        build(Role::Reader)?,
        build(Role::Expert)?,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(dir) = &args.output_dir {
        settings.output_dir = dir.clone();
    }

    let mut request = StoryRequest::new(args.theme.clone(), args.length)?
        .with_style(style_options(&args)?);
    if let Some(name) = &args.protagonist {
        request = request.with_protagonist(name.clone());
    }

    let endpoints = EndpointConfig::default();
    info!(
        url = %endpoints.url,
        writer = %endpoints.writer_model,
        reader = %endpoints.reader_model,
        expert = %endpoints.expert_model,
        "Story agents starting"
    );

    let registry = SessionRegistry::from_settings(agent_pool(&endpoints, !args.no_stream)?, &settings);
    let id = registry.start(request).await?;
    let mut events = registry.take_observer(id).await?;
    let format = if args.json { Format::Json } else { Format::Text };

    let mut stdout = std::io::stdout();
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                stdout.write_all(render(&event, format)?.as_bytes())?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!(session_id = %id, "interrupt received, cancelling session");
                interrupted = true;
                registry.cancel(id).await?;
            }
        }
    }

    let outcome = registry.wait(id).await?;
    eprintln!("\n{}", outcome.summary.render());
    if outcome.is_finalized() {
        info!(
            session_id = %id,
            dir = %settings.output_dir.join(id.to_string()).display(),
            "story written"
        );
        Ok(())
    } else {
        let reason = outcome
            .failure
            .map(|f| format!("{} in {}: {}", f.kind, f.phase, f.message))
            .unwrap_or_else(|| outcome.session.phase().to_string());
        anyhow::bail!("session {id} did not finish: {reason}")
    }
}
