//! folio command-line front end.
//!
//! Usage:
//!   # Materialize generation output into a new document
//!   folio materialize summary.json --doc new --file lecture_03.pdf=https://files/l3.pdf
//!
//!   # Print a stored document
//!   folio show --doc 0192f0c4-...
//!
//!   # List stored documents
//!   folio list

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use folio_client::{BlockPersistence, OptimisticStore, StoredBlock};
use folio_kernel::{
    CandidateFile, FolioConfig, Materializer, ResolutionPolicy, SqlitePersistence, ingest,
};
use folio_types::{Block, BlockContent, DocumentId};

/// Build block documents from generation output.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Materialize generated summaries into ordered block documents")]
struct Cli {
    /// Config file (default: <config dir>/folio/folio.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (default: <data dir>/folio/folio.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append the blocks of a generation output file to a document
    Materialize {
        /// Generation output (JSON, optionally in a code fence)
        input: PathBuf,

        /// Target document id, or "new"
        #[arg(long, default_value = "new")]
        doc: String,

        /// Input file as name=url (repeatable)
        #[arg(long = "file", value_parser = parse_file)]
        files: Vec<CandidateFile>,

        /// Placeholder resolution policy (overrides config)
        #[arg(long, value_parser = parse_policy)]
        policy: Option<ResolutionPolicy>,

        /// Title when the output carries none
        #[arg(long)]
        title: Option<String>,
    },

    /// Print a document's blocks in order
    Show {
        #[arg(long)]
        doc: String,
    },

    /// List stored documents
    List,
}

fn parse_policy(s: &str) -> Result<ResolutionPolicy, String> {
    ResolutionPolicy::from_str(s)
        .ok_or_else(|| format!("unknown policy {s:?} (auto-resolve, manual, suppress)"))
}

/// `name=url`, or a bare URL/path whose last segment is the name.
fn parse_file(s: &str) -> Result<CandidateFile, String> {
    match s.split_once('=') {
        Some((name, url)) if !name.is_empty() && !url.is_empty() => {
            Ok(CandidateFile::new(name, url))
        }
        Some(_) => Err(format!("expected name=url, got {s:?}")),
        None => {
            let name = s.rsplit(['/', '\\']).next().unwrap_or(s);
            if name.is_empty() {
                return Err(format!("no file name in {s:?}"));
            }
            Ok(CandidateFile::new(name, s))
        }
    }
}

fn parse_document_id(s: &str) -> Result<DocumentId> {
    if s.eq_ignore_ascii_case("new") {
        return Ok(DocumentId::new());
    }
    DocumentId::parse(s).with_context(|| format!("invalid document id {s:?}"))
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("folio"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio.db")
}

fn open_db(path: &Path) -> Result<Arc<SqlitePersistence>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = SqlitePersistence::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Arc::new(db))
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    match cli.command {
        Command::Materialize {
            input,
            doc,
            files,
            policy,
            title,
        } => {
            let mut config =
                FolioConfig::load_or_default(cli.config.as_deref()).context("loading config")?;
            if let Some(policy) = policy {
                config.ingest.policy = policy;
            }
            if title.is_some() {
                config.ingest.default_title = title;
            }
            cmd_materialize(&input, &doc, files, &config, &db_path).await
        }
        Command::Show { doc } => cmd_show(&doc, &db_path).await,
        Command::List => cmd_list(&db_path),
    }
}

async fn cmd_materialize(
    input: &Path,
    doc: &str,
    files: Vec<CandidateFile>,
    config: &FolioConfig,
    db_path: &Path,
) -> Result<()> {
    let document_id = parse_document_id(doc)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;

    let db = open_db(db_path)?;
    let mut store = OptimisticStore::open(document_id, db.clone(), config.store.clone())
        .await
        .context("loading document")?;
    let materializer = Materializer::from_config(config, files);

    let report = ingest(
        &text,
        &mut store,
        &materializer,
        config.ingest.default_title.as_deref(),
    )
    .await
    .with_context(|| format!("ingesting {}", input.display()))?;

    store.settle().await.context("persisting blocks")?;
    if store.needs_reload() {
        warn!(document = %document_id, "local order diverged from storage, reloading");
        store.reload().await.context("reloading document")?;
    }
    db.upsert_document(document_id, &report.title)
        .context("saving document title")?;

    info!(
        document = %document_id,
        blocks = report.block_ids.len(),
        rejected = report.rejected.len(),
        placeholders = report.stats.placeholders,
        "done"
    );
    println!("{document_id}  {}", report.title);
    print_blocks(store.blocks());
    Ok(())
}

async fn cmd_show(doc: &str, db_path: &Path) -> Result<()> {
    let document_id = DocumentId::parse(doc).with_context(|| format!("invalid document id {doc:?}"))?;
    let db = open_db(db_path)?;
    let Some(title) = db.document_title(document_id)? else {
        bail!("no document {document_id} in {}", db_path.display());
    };
    let blocks: Vec<Block> = db
        .load_blocks(document_id)
        .await
        .context("loading blocks")?
        .into_iter()
        .map(StoredBlock::into_block)
        .collect();
    println!("{document_id}  {title}");
    print_blocks(&blocks);
    Ok(())
}

fn cmd_list(db_path: &Path) -> Result<()> {
    let db = open_db(db_path)?;
    for doc in db.list_documents()? {
        println!("{}  {}", doc.id, doc.title);
    }
    Ok(())
}

fn print_blocks(blocks: &[Block]) {
    for block in blocks {
        let page = block
            .provenance
            .and_then(|p| p.source_page)
            .map(|p| format!("p.{p}"))
            .unwrap_or_default();
        println!(
            "{:>4}  {:<13}  {:<6} {}",
            block.order,
            block.kind().as_str(),
            page,
            summarize(&block.content)
        );
    }
}

fn summarize(content: &BlockContent) -> String {
    const WIDTH: usize = 72;
    let line = match content {
        BlockContent::Text(t) => t.markup().to_string(),
        BlockContent::Formula(f) => f.clone(),
        BlockContent::Image(img) => img.url.clone(),
        BlockContent::PendingImage(p) => match &p.candidate_file_url {
            Some(url) => format!("{} [{url}]", p.description),
            None => p.description.clone(),
        },
    };
    let line = line.replace('\n', " ");
    if line.chars().count() > WIDTH {
        let cut: String = line.chars().take(WIDTH - 1).collect();
        format!("{cut}…")
    } else {
        line
    }
}
