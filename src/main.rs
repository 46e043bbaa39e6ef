//! Flutter Preview - hot reload coordinator for an editor-embedded device preview
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use flutter_preview::RunOptions;

/// Flutter Preview - drive `flutter run -d web-server` for an embedded device frame
#[derive(Parser, Debug)]
#[command(name = "fpreview")]
#[command(about = "Hot reload coordinator for an editor-embedded Flutter web preview", long_about = None)]
struct Args {
    /// Path to the Flutter workspace (defaults to the current directory)
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Extra argument for `flutter run` (repeatable)
    #[arg(long = "flag", value_name = "FLAG", allow_hyphen_values = true)]
    flags: Vec<String>,

    /// Announce file changes without hot reloading
    #[arg(long)]
    no_auto_reload: bool,

    /// Start the dev server right away instead of waiting for the frame
    #[arg(long)]
    start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if let Err(e) = fpreview_core::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let root = args
        .path
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if !root.is_dir() {
        return Err(eyre!("Workspace is not a directory: {}", root.display()));
    }

    let options = RunOptions {
        extra_flags: args.flags,
        no_auto_reload: args.no_auto_reload,
        start: args.start,
    };

    flutter_preview::run(&root, options).await?;
    Ok(())
}
