// ABOUTME: Main entry point for the slidev-pipeline program.
// ABOUTME: Provides CLI interface for full builds, single virtual modules and the dev server.

use clap::{Args, Parser, Subcommand};
use slidev::{Config, DevServerConfig, Pipeline, PluginOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform the whole deck and write every output
    Build(BuildArgs),

    /// Print one virtual module
    Module(ModuleArgs),

    /// Watch the deck and serve it
    Dev(DevArgs),
}

#[derive(Args)]
struct DeckArgs {
    /// Path to the deck markdown file
    #[arg(short, long)]
    entry: Option<PathBuf>,

    /// Theme name or path, overriding the deck headmatter
    #[arg(long)]
    theme: Option<String>,

    /// Options file (.json, .yaml or .yml) with per-stage overrides
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    deck: DeckArgs,

    /// Output directory
    #[arg(short, long, default_value = "dist")]
    out: PathBuf,
}

#[derive(Args)]
struct ModuleArgs {
    #[command(flatten)]
    deck: DeckArgs,

    /// Virtual module id, e.g. /@slidev/slides
    id: String,
}

#[derive(Args)]
struct DevArgs {
    #[command(flatten)]
    deck: DeckArgs,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Synchronize shared state between server and clients
    #[arg(long)]
    sync: bool,
}

struct Resolved {
    entry: PathBuf,
    theme: Option<String>,
    options: PluginOptions,
}

fn resolve_deck(args: &DeckArgs, env: &Config) -> slidev::Result<Resolved> {
    let mut options = match &args.options {
        Some(path) => PluginOptions::from_file(path)?,
        None => PluginOptions::default(),
    };
    if options.client_root.is_none() {
        options.client_root = env.client_root.clone();
    }
    Ok(Resolved {
        entry: args.entry.clone().unwrap_or_else(|| env.entry.clone()),
        theme: args.theme.clone().or_else(|| env.theme.clone()),
        options,
    })
}

fn build_pipeline(deck: Resolved) -> slidev::Result<Pipeline> {
    let mut builder = Pipeline::builder(deck.entry).options(deck.options);
    if let Some(theme) = deck.theme {
        builder = builder.theme(theme);
    }
    builder.build()
}

fn run(command: Commands, env: &Config) -> slidev::Result<()> {
    match command {
        Commands::Build(args) => {
            println!("Executing build command...");
            let pipeline = build_pipeline(resolve_deck(&args.deck, env)?)?;
            let output = pipeline.full_build()?;
            let written = output.write_to(&args.out, &pipeline.layout().deck_root)?;

            for failure in &output.failures {
                eprintln!("Failed: {}: {}", failure.file_id, failure.message);
            }
            for (file, degradation) in output.degradations() {
                eprintln!("Warning: {}: {}", file, degradation);
            }
            println!(
                "Build finished: {} files written to {:?} ({} failed)",
                written.len(),
                args.out,
                output.failures.len()
            );
            Ok(())
        }
        Commands::Module(args) => {
            let pipeline = build_pipeline(resolve_deck(&args.deck, env)?)?;
            match pipeline.load(&args.id)? {
                Some(code) => {
                    print!("{}", code);
                    Ok(())
                }
                None => Err(slidev::SlidevError::resolution(
                    args.id.as_str(),
                    "not a virtual module",
                )),
            }
        }
        Commands::Dev(args) => {
            let deck = resolve_deck(&args.deck, env)?;
            slidev::serve(DevServerConfig {
                entry: deck.entry,
                theme: deck.theme,
                client_root: deck.options.client_root.clone(),
                options: deck.options,
                debounce_ms: args.debounce_ms.unwrap_or(env.debounce_ms),
                port: args.port.unwrap_or(env.port),
                sync: args.sync,
            })
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let env = Config::from_env();

    let result = match cli.command {
        Some(command) => run(command, &env),
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
