//! Main module for the Cosmere chat CLI application (`cosmere`).
//!
//! It parses the command line, loads configuration, wires the service clients and
//! runs the selected command.
//!
//! # Examples
//!
//! ```sh
//! cosmere init
//! cosmere index ./books --output index.json
//! cosmere chat --index index.json
//! cosmere ask "Who are Kaladin's companions on Bridge Four?"
//! ```

use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use std::{
    fs,
    io::{Write, stdin, stdout},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

use cosmere_chat::{
    BoxError,
    chatbot::ChatBot,
    chunker::Chunker,
    commands::{Cli, Commands},
    config::{CosmereConfig, default_config_path, load_config},
    embedding::{Embedder, OpenAiEmbeddings},
    indexer::{BookIndexer, IndexProgress, write_records},
    llm::Message,
    search::{AzureSearch, InMemoryIndex, VectorSearch},
    template::{PromptTemplate, load_template},
};

static TRACING: OnceCell<()> = OnceCell::new();

const DEFAULT_TEMPLATE: &str = "default";

fn main() -> Result<(), BoxError> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Commands::Init => init(&config_path),
        Commands::Index { corpus_dir, output } => {
            let config = load_config(&config_path)?;
            index(&config, &corpus_dir, &output).await
        }
        Commands::Chat { index, template } => {
            let config = load_config(&config_path)?;
            let bot = build_bot(&config, index, template).await?;
            interactive(&bot).await
        }
        Commands::Ask {
            question,
            index,
            template,
        } => {
            debug!("Asking question: {:?}", question);
            let config = load_config(&config_path)?;
            let bot = build_bot(&config, index, template).await?;
            let generated = bot.chat(&[Message::user(question)]).await;
            print_reply(&generated)
        }
    }
}

/// Writes the default configuration and prompt template, leaving existing files alone.
fn init(config_path: &Path) -> Result<(), BoxError> {
    let templates_dir = cosmere_chat::config_dir()?.join("templates");
    info!("Creating template directory: {}", templates_dir.display());
    fs::create_dir_all(&templates_dir)?;

    let template_path = templates_dir.join(format!("{DEFAULT_TEMPLATE}.yaml"));
    write_if_missing(&template_path, &serde_yaml::to_string(&PromptTemplate::default())?)?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_if_missing(config_path, &serde_yaml::to_string(&CosmereConfig::default())?)?;

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<(), BoxError> {
    if path.exists() {
        warn!("{} already exists, leaving it untouched", path.display());
        return Ok(());
    }
    info!("Creating {}", path.display());
    fs::write(path, content)?;
    Ok(())
}

async fn index(config: &CosmereConfig, corpus_dir: &Path, output: &Path) -> Result<(), BoxError> {
    let chunker = Chunker::from_config(&config.chunking)?;
    let backend = OpenAiEmbeddings::new(&config.embedding, config.request_timeout_secs)?;
    let embedder = Embedder::from_config(Arc::new(backend), &config.embedding);
    let indexer = BookIndexer::new(chunker, embedder, config.chunking.extension.clone());

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let outcome = indexer
        .index_corpus(corpus_dir, |event| match event {
            IndexProgress::Found(total) => progress.set_length(total as u64),
            IndexProgress::Done(source) => {
                progress.set_message(source.file.clone());
                progress.inc(1);
            }
        })
        .await?;
    progress.finish_with_message("done");

    write_records(output, &outcome.records)?;
    println!(
        "Indexed {} chunks from {} documents into {}",
        outcome.records.len(),
        outcome.documents - outcome.failed.len(),
        output.display()
    );
    for failed in &outcome.failed {
        println!("  failed: {} ({})", failed.document, failed.error);
    }

    Ok(())
}

async fn build_bot(
    config: &CosmereConfig,
    index: Option<PathBuf>,
    template: Option<String>,
) -> Result<ChatBot, BoxError> {
    let template = match template {
        Some(name) => load_template(&name).await?,
        None => PromptTemplate::default(),
    };

    let search: Arc<dyn VectorSearch> = match index {
        Some(path) => Arc::new(InMemoryIndex::load(path)?),
        None => Arc::new(AzureSearch::new(&config.search, config.request_timeout_secs)?),
    };

    ChatBot::from_config(config, template, search)
}

async fn interactive(bot: &ChatBot) -> Result<(), BoxError> {
    let mut history: Vec<Message> = Vec::new();
    let mut stdout = stdout();

    loop {
        stdout.execute(Print("\nYou: "))?;
        stdout.execute(SetForegroundColor(Color::Green))?;
        stdout.flush()?;

        let mut input = String::new();
        let read = stdin().read_line(&mut input)?;

        stdout.execute(SetForegroundColor(Color::Reset))?;

        let input = input.trim();
        if read == 0 || input.eq_ignore_ascii_case("exit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        history.push(Message::user(input));
        let generated = bot.chat(&history).await;
        print_reply(&generated)?;
        history.extend(generated);
    }

    Ok(())
}

fn print_reply(generated: &[Message]) -> Result<(), BoxError> {
    let reply = generated.last().map(|m| m.content.as_str()).unwrap_or_default();

    let mut stdout = stdout();
    stdout.execute(SetForegroundColor(Color::Blue))?;
    stdout.execute(SetAttribute(Attribute::Bold))?;
    writeln!(stdout, "{reply}")?;
    stdout.execute(SetAttribute(Attribute::Reset))?;
    stdout.execute(SetForegroundColor(Color::Reset))?;
    stdout.flush()?;

    Ok(())
}
