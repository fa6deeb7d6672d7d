use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::warn;

use llm_html_translator::{
    HtmlTranslator, OutcomeStatus, TranslateRequest, build_gateway_chain, logging, server,
    settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "llm-html-translator",
    version,
    about = "Translate the visible text of HTML documents without touching their markup"
)]
struct Cli {
    /// Target language (e.g. fr, German)
    #[arg(short = 'l', long = "lang", default_value = "en")]
    lang: String,

    /// Source language. Use "auto" to let the model detect it.
    #[arg(short = 'L', long = "source-lang", default_value = "auto")]
    source_lang: String,

    /// provider:model to use; repeat to build a fallback chain (replaces settings)
    #[arg(short = 'm', long = "model")]
    model: Vec<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Maximum number of units per gateway request
    #[arg(short = 'b', long = "batch-size")]
    batch_size: Option<usize>,

    /// HTML file to translate (reads stdin when omitted)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Run the HTTP server on ADDR instead of translating stdin
    #[arg(long = "server", value_name = "ADDR", num_args = 0..=1, default_missing_value = "")]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;
    if let Some(size) = cli.batch_size
        && size > 0
    {
        settings.batch_size = size;
    }

    if let Some(addr) = cli.server {
        logging::init_server(cli.verbose)?;
        let addr = if addr.trim().is_empty() {
            settings.server_addr.clone()
        } else {
            addr
        };
        let port = std::env::var("PORT").ok();
        let addr = server::listen_addr(&addr, port.as_deref());
        return server::run_server(settings, addr, cli.model, cli.key).await;
    }

    logging::init(cli.verbose)?;
    let html = read_input(cli.data.as_deref())?;
    let client = reqwest::Client::new();
    let chain = build_gateway_chain(&settings, &client, &cli.model, cli.key.as_deref())?;
    let translator = HtmlTranslator::new(chain, settings.pipeline_options());
    let request = TranslateRequest::new(html, cli.lang).with_source_lang(Some(cli.source_lang));

    let outcome = translator.translate(&request).await?;
    match &outcome.status {
        OutcomeStatus::FellBack(reason) => {
            warn!("translation failed, printing the original document: {}", reason);
        }
        OutcomeStatus::Partial { failed_batches, .. } => {
            warn!(
                "{} of {} batches kept their original text",
                failed_batches.len(),
                outcome.batches
            );
        }
        OutcomeStatus::Translated | OutcomeStatus::Unchanged => {}
    }
    print!("{}", outcome.html);
    if !outcome.html.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn read_input(data: Option<&str>) -> Result<String> {
    let html = match data {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file: {}", path))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .with_context(|| "stdin must be UTF-8 text")?;
            buffer
        }
    };
    if html.trim().is_empty() {
        return Err(anyhow!("input is empty"));
    }
    Ok(html)
}
