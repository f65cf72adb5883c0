use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docrag_core::config::{resolve_with_base, Settings};
use docrag_core::types::AnswerStyle;
use docrag_core::{Embedder, Error, MetadataExtractor};
use docrag_embed::default_embedder;
use docrag_pipeline::{configured_generator, evaluate, load_cases, IngestOptions, Ingestor, QueryOptions, Retriever};
use docrag_vector::{Filter, LanceStore, VectorIndex};

#[derive(Parser)]
#[command(name = "docrag", version, about = "Grounded retrieval over product documentation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, chunk, embed and index every supported file under DIR
    Ingest {
        dir: PathBuf,
        /// Drop and rebuild the collection first
        #[arg(long)]
        recreate: bool,
    },
    /// Retrieve an attributed context for a question
    Query(QueryArgs),
    /// Report backend reachability and collections
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Run evaluation cases from a JSON file of {query, expected_answer}
    Eval {
        file: PathBuf,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    text: String,
    #[arg(long)]
    top_k: Option<usize>,
    /// Minimum cosine score; overrides query.score_threshold
    #[arg(long)]
    threshold: Option<f32>,
    #[arg(long)]
    product: Option<String>,
    #[arg(long = "type")]
    doc_type: Option<String>,
    /// Ask the generator for a technical answer; needs generation.command
    #[arg(long)]
    technical: bool,
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn open_index(settings: &Settings) -> Result<VectorIndex> {
    let cwd = std::env::current_dir()?;
    let uri = resolve_with_base(&cwd, &settings.store.uri);
    let store = LanceStore::open(&uri.to_string_lossy())
        .with_context(|| format!("cannot open vector store at {}", uri.display()))?;
    Ok(VectorIndex::new(Arc::new(store)))
}

fn embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::from(default_embedder(&settings.embedding)?))
}

fn attach_generator(retriever: Retriever, settings: &Settings) -> Retriever {
    match configured_generator(&settings.generation) {
        Some(generator) => {
            info!(command = ?settings.generation.command, "answer generation enabled");
            retriever.with_generator(generator)
        }
        None => retriever,
    }
}

fn retriever(settings: &Settings) -> Result<Retriever> {
    let retriever = Retriever::new(open_index(settings)?, embedder(settings)?, settings.store.collection.clone());
    Ok(attach_generator(retriever, settings))
}

fn ingest(settings: &Settings, dir: &Path, recreate: bool) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let extractor = MetadataExtractor::new(&settings.vocabulary)?;
    let ingestor = Ingestor::new(
        open_index(settings)?,
        embedder(settings)?,
        extractor,
        settings.store.collection.clone(),
        IngestOptions::from_settings(settings, recreate),
    )?;
    let report = ingestor.ingest_dir(dir)?;
    println!(
        "Ingested {} documents into {} chunks ({} points) in {:.2}s",
        report.documents,
        report.chunks,
        report.points,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}

fn query_options(settings: &Settings, args: &QueryArgs) -> Result<QueryOptions> {
    if args.technical && !settings.generation.is_enabled() {
        return Err(Error::config("--technical needs an answer generator; set generation.command").into());
    }
    let pairs: Vec<(&str, &str)> = [("product", args.product.as_deref()), ("type", args.doc_type.as_deref())]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect();
    let mut opts = QueryOptions::from_settings(&settings.query).with_filter(Filter::from_pairs(pairs)?);
    if let Some(k) = args.top_k {
        opts = opts.with_top_k(k);
    }
    if args.threshold.is_some() {
        opts = opts.with_threshold(args.threshold);
    }
    if args.technical {
        opts = opts.with_style(AnswerStyle::Technical);
    }
    Ok(opts)
}

fn query(settings: &Settings, args: &QueryArgs) -> Result<()> {
    let opts = query_options(settings, args)?;
    let bundle = retriever(settings)?.retrieve(&args.text, &opts)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }
    if bundle.sources.is_empty() {
        println!("{}", bundle.answer.unwrap_or_default());
        return Ok(());
    }
    print!("{}", bundle.context);
    println!("Sources:");
    for source in &bundle.sources {
        println!("  - {source}");
    }
    if let Some(answer) = bundle.answer {
        println!("\nAnswer:\n{answer}");
    }
    Ok(())
}

fn status(settings: &Settings, json: bool) -> Result<()> {
    let status = open_index(settings)?.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("backend: {} ({})", status.backend, if status.reachable { "reachable" } else { "unreachable" });
        for c in &status.collections {
            println!("  {}: {} points, dim {}", c.name, c.points, c.dimension);
        }
    }
    if !status.reachable {
        bail!("vector store unreachable: {}", status.error.unwrap_or_default());
    }
    Ok(())
}

fn eval(settings: &Settings, file: &Path, top_k: Option<usize>, output: Option<&Path>) -> Result<()> {
    let cases = load_cases(file).with_context(|| format!("loading eval cases from {}", file.display()))?;
    info!(cases = cases.len(), "running evaluation");
    let mut opts = QueryOptions::from_settings(&settings.query);
    if let Some(k) = top_k {
        opts = opts.with_top_k(k);
    }
    let summary = evaluate(&retriever(settings)?, &cases, &opts)?;
    println!("Queries:                 {}", summary.num_queries);
    println!("Average retrieval score: {:.2}", summary.avg_retrieval_score);
    match summary.avg_answer_quality {
        Some(q) => println!("Average answer quality:  {q:.2}"),
        None => println!("Average answer quality:  n/a (no generator configured)"),
    }
    println!("Average elapsed time:    {:.2}s", summary.avg_elapsed_secs);
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        info!(path = %path.display(), "evaluation results saved");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;

    match cli.command {
        Command::Ingest { dir, recreate } => ingest(&settings, &dir, recreate),
        Command::Query(args) => query(&settings, &args),
        Command::Status { json } => status(&settings, json),
        Command::Eval { file, top_k, output } => eval(&settings, &file, top_k, output.as_deref()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use docrag_core::config::GenerationSettings;
    use docrag_core::types::Document;
    use docrag_embed::HashEmbedder;

    fn parse_query(argv: &[&str]) -> QueryArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Query(args) => args,
            _ => panic!("expected the query command"),
        }
    }

    fn echo_settings() -> Settings {
        Settings {
            generation: GenerationSettings { command: vec!["sh".into(), "-c".into(), "cat".into()] },
            ..Settings::default()
        }
    }

    #[test]
    fn technical_flag_reaches_the_generator() {
        let settings = echo_settings();
        let args = parse_query(&["docrag", "query", "RIO connects over IP.", "--technical", "--product", "RIO"]);
        let opts = query_options(&settings, &args).unwrap();
        assert_eq!(opts.style, AnswerStyle::Technical);

        let index = VectorIndex::in_memory();
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let extractor = MetadataExtractor::new(&settings.vocabulary).unwrap();
        let collection = settings.store.collection.clone();
        Ingestor::new(index.clone(), embedder.clone(), extractor, collection.clone(), IngestOptions::from_settings(&settings, false))
            .unwrap()
            .ingest_documents(vec![Document::new("RIO connects over IP.")])
            .unwrap();

        let retriever = attach_generator(Retriever::new(index, embedder, collection), &settings);
        let bundle = retriever.retrieve(&args.text, &opts).unwrap();
        let request: serde_json::Value = serde_json::from_str(bundle.answer.as_deref().unwrap()).unwrap();
        assert_eq!(request["style"], "technical");
        assert_eq!(request["query"], "RIO connects over IP.");
    }

    #[test]
    fn technical_without_generator_is_rejected() {
        let args = parse_query(&["docrag", "query", "anything", "--technical"]);
        let err = query_options(&Settings::default(), &args).unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some_and(Error::is_configuration));

        let plain = parse_query(&["docrag", "query", "anything"]);
        assert_eq!(query_options(&Settings::default(), &plain).unwrap().style, AnswerStyle::General);
    }

    #[test]
    fn filter_and_top_k_flags_shape_options() {
        let args = parse_query(&["docrag", "query", "q", "--type", "qa", "--top-k", "2"]);
        let opts = query_options(&Settings::default(), &args).unwrap();
        assert_eq!(opts.top_k, 2);
        assert_eq!(opts.filter, Filter::new().and(docrag_vector::IndexedField::Type, "qa"));
    }
}
