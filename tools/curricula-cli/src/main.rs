use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use curricula_core::{init_logging, load_dotenv, CurriculaConfig};

mod commands;

#[derive(Parser)]
#[command(name = "curricula")]
#[command(about = "Train and query the Curricula course recommender", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        env = "CURRICULA_CONFIG",
        help = "Configuration file (without extension)"
    )]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Train all models and save the artifacts")]
    Train {
        #[arg(long, help = "Seed for a reproducible run")]
        seed: Option<u64>,
    },

    #[command(about = "Recommend courses for a student")]
    Recommend {
        #[arg(help = "Student id")]
        student: String,

        #[arg(short = 'k', long, default_value = "10", help = "Number of courses")]
        top_k: usize,

        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },

    #[command(about = "Check the catalog and history for consistency")]
    Validate,

    #[command(about = "Show performance and curriculum progress for a student")]
    Analyze {
        #[arg(help = "Student id")]
        student: String,

        #[arg(long, help = "Compare against another student")]
        compare: Option<String>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    load_dotenv();

    let cli = Cli::parse();

    let mut config = CurriculaConfig::load(cli.config.as_deref())?;
    config.validate()?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Train { seed } => {
            if seed.is_some() {
                config.training.seed = seed;
            }
            commands::train(config)?;
        }
        Commands::Recommend {
            student,
            top_k,
            json,
        } => {
            commands::recommend(&config, &student, top_k, json)?;
        }
        Commands::Validate => {
            commands::validate(&config)?;
        }
        Commands::Analyze { student, compare } => {
            commands::analyze(&config, &student, compare.as_deref())?;
        }
    }

    Ok(())
}
