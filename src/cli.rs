use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "causal-review",
    version,
    about = "Causal relation extraction and human review tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt to the model and store the extracted relations.
    Generate(GenerateArgs),
    /// Ask the model to cluster the named entities of an output file.
    Cluster(ClusterArgs),
    /// List stored output files.
    Files(FilesArgs),
    /// Print the review table of one output file.
    Table(TableArgs),
    /// Print one record with its provenance in the reference corpus.
    Show(ShowArgs),
    /// Record rubric scores for one record.
    Score(ScoreArgs),
    /// Interactive review loop on stdin.
    Review(ReviewArgs),
    /// Recent generation requests.
    History(HistoryArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResponseFormat {
    /// Generator stdout is the model text.
    Raw,
    /// Generator stdout is a JSON envelope with `text`, `metadata` and `error`.
    Envelope,
}

#[derive(Args, Debug, Clone)]
pub struct GeneratorArgs {
    /// Program that forwards the request to a model.
    #[arg(long, conflicts_with = "replay")]
    pub generator_command: Option<String>,

    #[arg(long = "generator-arg", allow_hyphen_values = true)]
    pub generator_args: Vec<String>,

    #[arg(long, value_enum, default_value_t = ResponseFormat::Raw)]
    pub response_format: ResponseFormat,

    /// Use a previously captured response instead of calling a model.
    #[arg(long)]
    pub replay: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub enable_search: bool,

    #[arg(long = "attachment")]
    pub attachments: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    #[arg(long, conflicts_with = "template_file")]
    pub template: Option<String>,

    #[arg(long)]
    pub template_file: Option<PathBuf>,

    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,

    #[arg(long)]
    pub input_file: Option<PathBuf>,

    #[arg(long, default_value = "gemini-2.5-flash")]
    pub model: String,

    /// Store the output even when it does not normalize to a known schema.
    #[arg(long, default_value_t = false)]
    pub keep_unsupported: bool,

    #[command(flatten)]
    pub generator: GeneratorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    /// Output file whose entities are clustered.
    #[arg(long)]
    pub file: String,

    #[arg(long, default_value_t = false)]
    pub with_context: bool,

    #[arg(long, conflicts_with = "template_file")]
    pub template: Option<String>,

    #[arg(long)]
    pub template_file: Option<PathBuf>,

    #[arg(long, default_value = "gemini-2.5-pro")]
    pub model: String,

    #[command(flatten)]
    pub generator: GeneratorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FilesArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub file: String,

    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    #[arg(long = "sentence-type")]
    pub sentence_types: Vec<String>,

    /// Mark rows whose source text is exactly this reference input.
    #[arg(long)]
    pub reference_input: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub file: String,

    #[arg(long)]
    pub id: usize,

    /// CSV files with an `input` column; defaults to logged generation inputs.
    #[arg(long = "reference")]
    pub references: Vec<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub file: String,

    #[arg(long)]
    pub id: usize,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub sf: Option<u8>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub sa: Option<u8>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub ea: Option<u8>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub si: Option<u8>,

    #[arg(long, default_value = "")]
    pub notes: String,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    /// Output file opened at start.
    #[arg(long)]
    pub file: Option<String>,

    #[arg(long = "reference")]
    pub references: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/causal-extractor")]
    pub data_root: PathBuf,
}
