use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_reference_ingest::config::{Config, ConfigLoader, SourceRequest};
use kira_reference_ingest::domain::{PagePolicy, Source};
use kira_reference_ingest::download::HttpDownloader;
use kira_reference_ingest::error::KiraError;
use kira_reference_ingest::extract::AccessionRule;
use kira_reference_ingest::flatfile;
use kira_reference_ingest::ncbi::EntrezHttpClient;
use kira_reference_ingest::normalize::{NormalizeSummary, Normalizer, OutputPaths};
use kira_reference_ingest::output::{JsonOutput, OutputMode, StderrProgress};
use kira_reference_ingest::pipeline::{IngestResult, Pipeline, ProgressSink};

#[derive(Parser)]
#[command(name = "kira-ri")]
#[command(about = "Download and normalize nucleotide reference records (NCBI, MitoFish, EMBL, BOLD)")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download a source and write clean, discarded and accession-table outputs")]
    Ingest(IngestArgs),
    #[command(about = "Normalize a local FASTA file with a source's accession rule")]
    Normalize(NormalizeArgs),
    #[command(about = "Convert a local EMBL flat file (.dat or .dat.gz) to FASTA")]
    EmblToFasta(EmblToFastaArgs),
}

#[derive(Args, Clone)]
struct IngestArgs {
    source: Option<Source>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, short)]
    output: Option<String>,

    #[arg(long)]
    work_dir: Option<String>,

    #[arg(long)]
    query: Option<String>,

    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    page_policy: Option<PagePolicy>,

    #[arg(long)]
    mitofish_url: Option<String>,

    #[arg(long)]
    embl_division: Option<String>,

    #[arg(long)]
    embl_release_url: Option<String>,

    #[arg(long)]
    bold_taxon: Option<String>,

    #[arg(long)]
    bold_url: Option<String>,
}

impl IngestArgs {
    fn overrides(&self) -> Config {
        Config {
            schema_version: None,
            source: self.source,
            output_path: self.output.clone(),
            work_dir: self.work_dir.clone(),
            query: self.query.clone(),
            database: self.database.clone(),
            email: self.email.clone(),
            api_key: self.api_key.clone(),
            batch_size: self.batch_size,
            page_policy: self.page_policy,
            mitofish_url: self.mitofish_url.clone(),
            embl_division: self.embl_division.clone(),
            embl_release_url: self.embl_release_url.clone(),
            bold_taxon: self.bold_taxon.clone(),
            bold_url: self.bold_url.clone(),
        }
    }
}

#[derive(Args)]
struct NormalizeArgs {
    #[arg(long)]
    source: Source,

    #[arg(long, short)]
    input: Utf8PathBuf,

    #[arg(long, short)]
    output: Utf8PathBuf,
}

#[derive(Args)]
struct EmblToFastaArgs {
    input: Utf8PathBuf,
    output: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::MissingConfig
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InvalidConfig(_)
        | KiraError::InvalidSource(_) => 2,
        KiraError::NcbiHttp(_)
        | KiraError::NcbiStatus { .. }
        | KiraError::SessionCountMismatch { .. }
        | KiraError::PageExhausted { .. }
        | KiraError::DownloadHttp(_)
        | KiraError::DownloadStatus { .. }
        | KiraError::NoReleaseFiles(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, output_mode),
        Commands::Normalize(args) => run_normalize(args, output_mode),
        Commands::EmblToFasta(args) => {
            let stats =
                flatfile::reformat_file(args.input.as_std_path(), args.output.as_std_path())?;
            if matches!(output_mode, OutputMode::Interactive) {
                println!("{} records -> {}", stats.records, args.output);
            }
            Ok(())
        }
    }
}

fn run_ingest(args: IngestArgs, output_mode: OutputMode) -> miette::Result<()> {
    let file_config = ConfigLoader::load(args.config.as_deref())?;
    let resolved = ConfigLoader::resolve_config(file_config.overlay(args.overrides()))?;

    let (email, api_key) = match &resolved.request {
        SourceRequest::Ncbi(req) => (Some(req.email.clone()), req.api_key.clone()),
        _ => (None, None),
    };
    let entrez = EntrezHttpClient::new(email, api_key)?;
    let downloader = HttpDownloader::new()?;
    let pipeline = Pipeline::new(entrez, downloader).with_work_root(resolved.work_dir.clone());

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &StderrProgress,
        OutputMode::NonInteractive => &JsonOutput,
    };
    let result = pipeline.ingest(&resolved.request, &resolved.output, sink)?;

    match output_mode {
        OutputMode::Interactive => print_ingest_summary(&result),
        OutputMode::NonInteractive => JsonOutput::print_ingest(&result).into_diagnostic()?,
    }
    Ok(())
}

fn run_normalize(args: NormalizeArgs, output_mode: OutputMode) -> miette::Result<()> {
    if let Some(parent) = args.output.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent.as_std_path()).into_diagnostic()?;
    }
    let normalizer = Normalizer::new(AccessionRule::for_source(args.source));
    let outputs = OutputPaths::from_base(&args.output);
    let summary = normalizer.normalize_file(args.input.as_std_path(), &outputs)?;
    match output_mode {
        OutputMode::Interactive => print_normalize_summary(&summary, &outputs),
        OutputMode::NonInteractive => JsonOutput::print_normalize(&summary).into_diagnostic()?,
    }
    Ok(())
}

fn print_ingest_summary(result: &IngestResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-RI summary ({}){reset}", result.source);
    println!(
        "{green}accepted: {} -> {}{reset}",
        result.accepted, result.output
    );
    println!(
        "{yellow}discarded: {} ({} suppressed) -> {}{reset}",
        result.discarded, result.suppressed, result.discarded_output
    );
    println!(
        "{green}accession table: {} entries -> {}{reset}",
        result.lookup_entries, result.table_output
    );
    if let (Some(expected), Some(fetched)) = (result.expected, result.fetched) {
        let color = if fetched < expected { yellow } else { green };
        println!("{color}fetched {fetched} of {expected} search hits{reset}");
    }
    if !result.failed_pages.is_empty() {
        println!(
            "{red}pages skipped after retries (offsets): {:?}{reset}",
            result.failed_pages
        );
    }
}

fn print_normalize_summary(summary: &NormalizeSummary, outputs: &OutputPaths) {
    println!("accepted: {} -> {}", summary.accepted, outputs.clean);
    println!("discarded: {} -> {}", summary.discarded, outputs.discarded);
    println!(
        "accession table: {} entries -> {}",
        summary.lookup_entries, outputs.table
    );
}
