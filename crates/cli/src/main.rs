use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voice_translator_core::catalog::{DEFAULT_VOICE, VOICES};
use voice_translator_core::config::{
    resolve_api_key, resolve_string_with_default, resolve_throttle_config, Env, ProviderConfig,
    ServerConfig, StdEnv, TargetLang, DEFAULT_BIND_ADDR, DEFAULT_OPENAI_BASE_URL, ENV_BIND_ADDR,
    ENV_OPENAI_API_KEY, ENV_OPENAI_BASE_URL,
};
use voice_translator_core::emotion::{EmotionId, PROFILES};
use voice_translator_core::pipeline::{SpeakPipeline, SpeakRequest};
use voice_translator_core::render::{OfflineBackend, RodioBackend};
use voice_translator_core::translate::{OpenAiTranslator, Translator};
use voice_translator_core::tts::{OpenAiTtsClient, ToneTtsClient, TtsClient, VoiceId};
use voice_translator_server::{create_router, spawn_reaper, AppState};

#[derive(Parser, Debug)]
#[command(name = "voice-translator")]
#[command(about = "Translate text, synthesize it and play it back with an emotional inflection")]
struct Cli {
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Speak one piece of text on this machine.
    Speak(SpeakArgs),
    /// List the available voices and emotions.
    Voices,
}

#[derive(Args, Debug)]
struct ProviderArgs {
    #[arg(long)]
    openai_api_key: Option<String>,

    #[arg(long)]
    openai_base_url: Option<String>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    bind: Option<String>,

    #[command(flatten)]
    provider: ProviderArgs,

    #[arg(long)]
    rate_limit_window_ms: Option<u64>,

    #[arg(long)]
    rate_limit_max: Option<u32>,

    #[arg(long)]
    rate_limit_capacity: Option<usize>,

    /// How often elapsed throttle buckets are dropped.
    #[arg(long, default_value_t = 60)]
    reap_interval_secs: u64,
}

#[derive(Args, Debug)]
struct SpeakArgs {
    #[arg(long)]
    text: String,

    /// Translate into this language before speaking.
    #[arg(long)]
    target_lang: Option<String>,

    #[arg(long, default_value = DEFAULT_VOICE)]
    voice: String,

    #[arg(long, default_value = "neutral")]
    emotion: String,

    #[arg(long)]
    output_device: Option<String>,

    /// Skip independent pitch shifting.
    #[arg(long)]
    tempo_only: bool,

    /// Write the rendered audio to a WAV file instead of playing it.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Synthesize a local test tone instead of calling the provider.
    #[arg(long)]
    tone: bool,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let env = StdEnv;
    match cli.command {
        Command::Serve(args) => serve(args, &env).await,
        Command::Speak(args) => speak(args, &env).await,
        Command::Voices => {
            print_catalog();
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs, env: &impl Env) -> anyhow::Result<()> {
    let reap_every = Duration::from_secs(args.reap_interval_secs.max(1));
    let cfg = build_server_config(args, env)?;

    tracing::info!(
        bind = %cfg.bind,
        base_url = %cfg.provider.base_url,
        has_key = cfg.provider.api_key.is_some(),
        window_ms = cfg.throttle.window_ms,
        max_requests = cfg.throttle.max_requests,
        "config loaded"
    );

    let state = AppState::from_config(&cfg);
    let reaper = spawn_reaper(state.throttle.clone(), reap_every);
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind))?;
    tracing::info!(bind = %cfg.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    reaper.abort();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn speak(args: SpeakArgs, env: &impl Env) -> anyhow::Result<()> {
    if args.emotion.parse::<EmotionId>().is_err() {
        tracing::warn!(emotion = %args.emotion, "unknown emotion; speaking neutrally");
    }
    let provider = build_provider_config(args.provider, env)?;

    let tts: Arc<dyn TtsClient> = if args.tone {
        Arc::new(ToneTtsClient::new())
    } else {
        Arc::new(
            OpenAiTtsClient::new(provider.clone())
                .context("speech synthesis needs OPENAI_API_KEY (or pass --tone)")?,
        )
    };

    let target_lang = args.target_lang.map(TargetLang::new).transpose()?;
    let translator: Option<Arc<dyn Translator>> = match &target_lang {
        Some(_) => match OpenAiTranslator::new(provider) {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                tracing::warn!(error = %e, "translation unavailable; speaking original text");
                None
            }
        },
        None => None,
    };

    let request = SpeakRequest {
        text: args.text,
        target_lang,
        voice: Some(VoiceId(args.voice)),
        emotion: args.emotion,
    };

    match args.out {
        Some(path) => {
            let backend = if args.tempo_only {
                OfflineBackend::tempo_only()
            } else {
                OfflineBackend::new()
            };
            let mut pipeline = SpeakPipeline::new(tts, backend);
            if let Some(t) = translator {
                pipeline = pipeline.with_translator(t);
            }
            let outcome = pipeline.speak(request).await?;
            tracing::info!(text = %outcome.spoken_text, translated = outcome.translated, "spoken");
            if let Some(rendered) = outcome.handle {
                rendered
                    .write_wav(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
        None => {
            let mut backend = if args.tempo_only {
                RodioBackend::tempo_only()
            } else {
                RodioBackend::new()
            };
            if let Some(name) = args.output_device {
                backend = backend.with_output_device_name(name);
            }
            let mut pipeline = SpeakPipeline::new(tts, backend);
            if let Some(t) = translator {
                pipeline = pipeline.with_translator(t);
            }
            let outcome = pipeline.speak(request).await?;
            tracing::info!(text = %outcome.spoken_text, translated = outcome.translated, "speaking");
            if let Some(playback) = outcome.handle {
                playback.finished().await;
            }
        }
    }
    Ok(())
}

fn print_catalog() {
    println!("voices:");
    for v in VOICES.iter() {
        println!("  {:<8} {:<8} {}", v.id, v.label, v.note);
    }
    println!("emotions:");
    for p in PROFILES.iter() {
        println!(
            "  {:<10} rate {:.2}  pitch {:+} cents  gain {:+.1} dB  tilt {:+.0} dB",
            p.id, p.playback_rate, p.pitch_shift_cents, p.gain_db, p.spectral_tilt_db
        );
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_provider_config(args: ProviderArgs, env: &impl Env) -> anyhow::Result<ProviderConfig> {
    let api_key = resolve_api_key(args.openai_api_key, ENV_OPENAI_API_KEY, env)?;
    let base_url = resolve_string_with_default(
        args.openai_base_url,
        ENV_OPENAI_BASE_URL,
        env,
        DEFAULT_OPENAI_BASE_URL,
    );
    Ok(ProviderConfig::new(api_key, &base_url)?)
}

fn build_server_config(args: ServeArgs, env: &impl Env) -> anyhow::Result<ServerConfig> {
    let bind_raw = resolve_string_with_default(args.bind, ENV_BIND_ADDR, env, DEFAULT_BIND_ADDR);
    let bind: SocketAddr = bind_raw
        .parse()
        .with_context(|| format!("invalid bind address: {bind_raw}"))?;

    let throttle = resolve_throttle_config(
        args.rate_limit_window_ms,
        args.rate_limit_max,
        args.rate_limit_capacity,
        env,
    )?;

    Ok(ServerConfig {
        bind,
        provider: build_provider_config(args.provider, env)?,
        throttle,
    })
}
