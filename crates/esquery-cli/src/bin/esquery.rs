//! esquery CLI
//!
//! Compiles a query written in the call notation and runs it against an
//! Elasticsearch server or a JSON file of documents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use esquery::{Document, InMemoryBackend, SearchBackend, SearchError, SearchIndex, SearchSettings, optimize};
use serde_json::Value as Json;

#[derive(Parser)]
#[command(name = "esquery")]
#[command(about = "Compile and run query trees against Elasticsearch")]
#[command(after_help = "\
EXAMPLES:
    # Show the optimized tree, compiled plan and request body
    esquery --compile-only 'count(where(queryable(\"items\"), eq(field(\"status\"), \"published\")))'

    # Run against a local file of documents (a JSON array of objects)
    esquery --data products.json 'get_results(take(queryable(\"items\"), 10))'

    # Run against a server, reading the query from a file
    esquery --url http://localhost:9200 --index sitecore_web_index @query.txt
")]
struct Args {
    /// Query in call notation, or @path to read it from a file
    query: String,

    /// Settings file (JSON)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the maximum number of hits requested
    #[arg(long)]
    max_results: Option<usize>,

    /// Culture to search in. Defaults to the configured default language.
    #[arg(long)]
    culture: Option<String>,

    /// Skip the per-item security check
    #[arg(long)]
    no_security: bool,

    /// Print the compiled query without running it
    #[arg(long)]
    compile_only: bool,

    /// Elasticsearch base URL
    #[arg(long, conflicts_with = "data")]
    url: Option<String>,

    /// JSON array of documents to search in memory
    #[arg(long)]
    data: Option<PathBuf>,

    /// Index name
    #[arg(long, default_value = "sitecore_web_index")]
    index: String,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let text = match args.query.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading query from {path}"))?,
        None => args.query.clone(),
    };
    let node = esquery::notation::parse(&text)?;

    let mut settings = match &args.settings {
        Some(path) => SearchSettings::from_path(path)?,
        None => SearchSettings::default(),
    };
    if let Some(max) = args.max_results {
        settings.max_results = max;
    }
    if args.no_security {
        settings.security_checks = false;
    }

    let backend = open_backend(&args)?;
    let mut index = SearchIndex::new(args.index.clone(), settings, backend);
    if let Some(culture) = &args.culture {
        index = index.with_culture(culture.clone());
    }

    let compiled = index.compile(&node)?;
    if args.compile_only {
        println!("optimized: {}", optimize(&node));
        print!("{compiled}");
        print_json(&index.request_for(&compiled).to_body(), args.pretty)?;
        return Ok(());
    }

    let output = match index.execute_compiled::<Json>(&compiled) {
        Ok(output) => serde_json::to_value(output)?,
        Err(SearchError::NoScalarMethod(_)) => {
            log::info!("no output directive, listing matching documents");
            serde_json::to_value(index.find_elements::<Json>(&node)?)?
        }
        Err(e) => return Err(e.into()),
    };
    print_json(&output, args.pretty)
}

fn open_backend(args: &Args) -> anyhow::Result<Arc<dyn SearchBackend>> {
    if let Some(url) = &args.url {
        return open_http(url);
    }
    let mut backend = InMemoryBackend::new();
    match &args.data {
        Some(path) => {
            let documents = load_documents(path)?;
            log::info!("Loaded {} documents from {}", documents.len(), path.display());
            backend = backend.with_documents(&args.index, documents);
        }
        None if !args.compile_only => bail!("one of --url or --data is required to run a query"),
        None => {}
    }
    Ok(Arc::new(backend))
}

#[cfg(feature = "http")]
fn open_http(url: &str) -> anyhow::Result<Arc<dyn SearchBackend>> {
    log::info!("Searching {url}");
    Ok(Arc::new(esquery::HttpBackend::new(url)?))
}

#[cfg(not(feature = "http"))]
fn open_http(_url: &str) -> anyhow::Result<Arc<dyn SearchBackend>> {
    bail!("--url requires the http feature");
}

fn load_documents(path: &Path) -> anyhow::Result<Vec<Document>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a JSON array of objects", path.display()))
}

fn print_json(value: &Json, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}
