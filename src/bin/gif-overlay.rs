use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use sha2::Digest as _;
use tracing_subscriber::EnvFilter;

use gif_overlay::server::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "gif-overlay", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (`POST /overlay`, `GET /outputs/<file>`).
    Serve(ServeArgs),
    /// Draw text onto a local GIF and write the result.
    Overlay(OverlayArgs),
}

#[derive(Args, Debug)]
struct FontArgs {
    /// Preferred font family; falls back to any sans-serif face.
    #[arg(long, env = "OVERLAY_FONT_FAMILY", default_value = gif_overlay::DEFAULT_FONT_FAMILY)]
    font_family: String,

    /// Extra directory with .ttf/.otf/.ttc files (repeatable).
    #[arg(long = "font-dir")]
    font_dirs: Vec<PathBuf>,

    /// Do not scan system font directories.
    #[arg(long)]
    no_system_fonts: bool,

    /// Print the resolved font family and SHA-256 of its bytes.
    #[arg(long)]
    dump_fonts: bool,
}

impl FontArgs {
    fn settings(&self) -> gif_overlay::FontSettings {
        gif_overlay::FontSettings {
            family: self.font_family.clone(),
            font_dirs: self.font_dirs.clone(),
            load_system_fonts: !self.no_system_fonts,
        }
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Externally reachable origin for returned links (also read from RENDER_EXTERNAL_URL).
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    #[arg(long, default_value = "uploads")]
    uploads_dir: PathBuf,

    #[arg(long, default_value = "outputs")]
    outputs_dir: PathBuf,

    /// Maximum accepted request body size in bytes.
    #[arg(long, default_value_t = gif_overlay::server::ServerConfig::default().max_upload_bytes)]
    max_upload_bytes: usize,

    #[command(flatten)]
    fonts: FontArgs,
}

#[derive(Args, Debug)]
struct OverlayArgs {
    /// Input GIF.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output GIF path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long)]
    text: String,

    #[arg(long)]
    font_size: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    x: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    y: Option<String>,

    /// Rotation in degrees, positive is clockwise.
    #[arg(long, allow_hyphen_values = true)]
    angle: Option<String>,

    /// CSS color, e.g. "#ff0000" or "rgba(0,0,0,0.5)".
    #[arg(long)]
    color: Option<String>,

    #[command(flatten)]
    fonts: FontArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Serve(args) => cmd_serve(args),
        Command::Overlay(args) => cmd_overlay(args),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let base_url = args
        .base_url
        .or_else(|| std::env::var("RENDER_EXTERNAL_URL").ok());

    let mut config = ServerConfig::new(args.port, base_url.as_deref());
    config.uploads_dir = args.uploads_dir;
    config.outputs_dir = args.outputs_dir;
    config.max_upload_bytes = args.max_upload_bytes;
    config.fonts = args.fonts.settings();

    if args.fonts.dump_fonts {
        dump_font_diagnostics(&config.fonts)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(gif_overlay::server::serve(config))
}

fn cmd_overlay(args: OverlayArgs) -> anyhow::Result<()> {
    let spec = gif_overlay::OverlaySpec::from_params(&gif_overlay::OverlayParams {
        text: Some(&args.text),
        font_size: args.font_size.as_deref(),
        x: args.x.as_deref(),
        y: args.y.as_deref(),
        angle: args.angle.as_deref(),
        color: args.color.as_deref(),
    })?;

    let settings = args.fonts.settings();
    if args.fonts.dump_fonts {
        dump_font_diagnostics(&settings)?;
    }

    let font = std::sync::Arc::new(gif_overlay::ResolvedFont::resolve(&settings)?);
    let mut backend = gif_overlay::create_backend(gif_overlay::BackendKind::Cpu, font)?;
    let out = gif_overlay::overlay_gif_file(&args.in_path, &args.out, &spec, backend.as_mut())?;

    let summary = serde_json::json!({
        "output": args.out.display().to_string(),
        "frames": out.frame_count,
        "width": out.width,
        "height": out.height,
        "bytes": out.bytes.len(),
    });
    println!("{summary}");
    Ok(())
}

fn dump_font_diagnostics(settings: &gif_overlay::FontSettings) -> anyhow::Result<()> {
    let font = gif_overlay::ResolvedFont::resolve(settings)?;
    eprintln!("font diagnostics:");
    eprintln!("  requested:  {}", settings.family);
    eprintln!("  family:     {}", font.family);
    eprintln!("  face index: {}", font.index);
    eprintln!("  sha256:     {}", sha256_hex(&font.bytes));
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
