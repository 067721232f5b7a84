use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use keyrank::{
    DEFAULT_BATCH_SIZE,
    config::FieldSpec,
    distance::DistanceKind,
    store::{Condition, SortKey},
    tokenizer::StemmerKind,
};
use serde::de::DeserializeOwned;

#[derive(Debug, Parser)]
#[command(
    name = "keyrank",
    about = "Weighted keyword indexing and relevance search for JSON records"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the index configuration in the data directory
    Init(InitArgs),
    /// Add or replace records from a JSON array or JSON lines file
    Add(AddArgs),
    /// Print a stored record
    Get(GetArgs),
    /// Rank records against a free-text query
    Search(SearchArgs),
    /// Recompute the keywords of every stored record
    Reindex(ReindexArgs),
    /// Show configuration and record count
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Init --

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Field to index as name:weight (repeatable)
    #[arg(short, long = "field", value_parser = parse_field, required = true)]
    pub fields: Vec<FieldSpec>,

    /// Snowball stemmer language
    #[arg(
        long,
        default_value = "english",
        value_parser = parse_named::<StemmerKind>
    )]
    pub stemmer: StemmerKind,

    /// Distance function: jaro-winkler, dice or levenshtein
    #[arg(
        long,
        default_value = "jaro-winkler",
        value_parser = parse_named::<DistanceKind>
    )]
    pub distance: DistanceKind,

    /// Attribute name for stored keywords
    #[arg(long, default_value = keyrank::keyword::DEFAULT_KEYWORDS_FIELD)]
    pub keywords_field: String,

    /// Attribute name for the relevance score in search output
    #[arg(long, default_value = keyrank::keyword::DEFAULT_RELEVANCE_FIELD)]
    pub relevance_field: String,

    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,
}

// -- Add --

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Input file, or - for stdin
    pub file: PathBuf,
}

// -- Get --

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Record id (#hex or decimal) or the string key it was added with
    pub id: String,

    /// Include the stored keywords
    #[arg(long)]
    pub keywords: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Number of ranked results to skip
    #[arg(long, default_value = "0")]
    pub skip: usize,

    /// Return every matching record
    #[arg(long, conflicts_with = "limit")]
    pub all: bool,

    /// Only records where field=value or field!=value (repeatable)
    #[arg(short = 'w', long = "where", value_parser = parse_condition)]
    pub conditions: Vec<Condition>,

    /// Order by field[:asc|:desc] instead of relevance (repeatable)
    #[arg(short, long, value_parser = parse_sort)]
    pub sort: Vec<SortKey>,

    /// Comma-separated fields to return
    #[arg(short, long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Reindex --

#[derive(Debug, Parser)]
pub struct ReindexArgs {
    /// Records fetched per store round-trip
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "keyrank",
            &mut std::io::stdout(),
        );
    }
}

fn parse_field(s: &str) -> Result<FieldSpec, String> {
    FieldSpec::parse(s).map_err(|e| e.to_string())
}

fn parse_condition(s: &str) -> Result<Condition, String> {
    Condition::parse(s).map_err(|e| e.to_string())
}

fn parse_sort(s: &str) -> Result<SortKey, String> {
    SortKey::parse(s).map_err(|e| e.to_string())
}

/// Parse a selector by its configuration-file name.
fn parse_named<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value '{s}'"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["keyrank", "search", "red car"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "red car");
                assert_eq!(args.limit, 10);
                assert_eq!(args.skip, 0);
                assert!(!args.all);
                assert!(args.conditions.is_empty());
                assert!(args.sort.is_empty());
                assert!(args.fields.is_empty());
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_search_filters() {
        let cli = Cli::parse_from([
            "keyrank",
            "search",
            "car",
            "--where",
            "year=2020",
            "--sort",
            "year:desc",
            "--fields",
            "title,year",
        ]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.conditions, vec![Condition::eq("year", json!(2020))]);
                assert_eq!(args.sort, vec![SortKey::desc("year")]);
                assert_eq!(args.fields, vec!["title", "year"]);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_init_fields() {
        let cli = Cli::parse_from([
            "keyrank",
            "init",
            "--field",
            "title:100",
            "-f",
            "tags:1",
            "--distance",
            "dice",
            "--stemmer",
            "porter",
        ]);
        match cli.command {
            Command::Init(args) => {
                assert_eq!(
                    args.fields,
                    vec![FieldSpec::new("title", 100.0), FieldSpec::new("tags", 1.0)]
                );
                assert_eq!(args.distance, DistanceKind::Dice);
                assert_eq!(args.stemmer, StemmerKind::English);
            }
            _ => panic!("expected init command"),
        }
    }

    #[test]
    fn init_requires_a_field() {
        assert!(Cli::try_parse_from(["keyrank", "init"]).is_err());
        assert!(
            Cli::try_parse_from(["keyrank", "init", "-f", "title"]).is_err()
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
