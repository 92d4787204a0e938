//! mailroute CLI: forward unseen mail to the recipient an LLM finds in it.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use mailroute::config::PipelineConfig;
use mailroute::error::MailrouteResult;
use mailroute::extract::{ContentExtractor, TesseractOcr};
use mailroute::llm::{GroqExtractor, InformationExtractor};
use mailroute::pipeline::run_batch;

#[derive(Parser)]
#[command(
    name = "mailroute",
    version,
    about = "Extract recipients from inbound mail and forward it"
)]
struct Cli {
    /// TOML config file. Without it, configuration is read from the environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every unseen message once and print the batch report.
    Run {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the text that would be sent for inference for one message file.
    Extract {
        /// Path to a raw RFC 5322 message (.eml).
        #[arg(long)]
        file: PathBuf,

        /// Also run the inference call and print its result.
        #[arg(long)]
        classify: bool,
    },

    /// Load and validate the configuration, then print it with secrets redacted.
    CheckConfig,
}

fn load_config(path: Option<&Path>) -> MailrouteResult<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run { json } => {
            let config = load_config(cli.config.as_deref())?;
            let report = run_batch(&config);
            if json {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            } else {
                print!("{report}");
            }
        }

        Commands::Extract { file, classify } => {
            let raw = std::fs::read(&file).into_diagnostic()?;

            // OCR settings come from the config when one is available.
            let config = if classify {
                Some(load_config(cli.config.as_deref())?)
            } else {
                cli.config.as_deref().map(PipelineConfig::load).transpose()?
            };
            let ocr = config.as_ref().map(|c| c.ocr.clone()).unwrap_or_default();

            let extractor = ContentExtractor::new(Box::new(TesseractOcr::new(ocr)));
            let parsed = extractor.parse(&raw)?;
            let content = extractor.extract(&parsed)?;

            println!("From: {}", parsed.sender);
            if let Some(pdf) = &parsed.pdf_attachment {
                println!("PDF: {} ({} bytes)", pdf.filename, pdf.data.len());
            }
            println!();
            println!("{content}");

            if let Some(config) = config.filter(|_| classify) {
                let result = GroqExtractor::new(config.inference).classify(&content.text)?;
                println!("recipient_email: {}", result.recipient_email);
                println!("physical_address: {}", result.physical_address);
            }
        }

        Commands::CheckConfig => {
            let config = load_config(cli.config.as_deref())?;
            println!("{config:#?}");
        }
    }

    Ok(())
}
