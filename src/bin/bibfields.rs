//! bibfields CLI - validate, describe and run an indexing schema
//!
//! Without `--schema` (or `BIBFIELDS_SCHEMA`) the Evidence Library rules compiled
//! into the crate are used.

use bibfields::serialization::{read_library, read_records, NdjsonWriter};
use bibfields::{customize, ExtractionContext, Library, PrerenderedFormats, Schema, SchemaConfig, Settings};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bibfields")]
#[command(version, about = "Schema composition and field extraction for bibliographic records", long_about = None)]
struct Cli {
    /// Schema rules YAML (overrides BIBFIELDS_SCHEMA)
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble and validate the schema without processing records
    Validate,

    /// Print the resolved fields, facets, badges and sorts
    Describe,

    /// Extract documents from NDJSON records
    Extract {
        /// NDJSON records, one item per line ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// NDJSON output ("-" for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Order output with a named sort
        #[arg(long)]
        sort: Option<String>,

        /// Collections JSON for collection facets (overrides BIBFIELDS_COLLECTIONS)
        #[arg(short, long)]
        collections: Option<PathBuf>,
    },
}

fn main() {
    dotenv::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli, settings);

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli, settings: Settings) -> Result<(), String> {
    if let Some(threads) = settings.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| format!("Failed to configure worker threads: {}", e))?;
    }

    let schema_path = cli.schema.or_else(|| settings.schema_path.clone());
    let schema = load_schema(schema_path.as_deref())?;

    match cli.command {
        Commands::Validate => validate(&schema),
        Commands::Describe => describe(&schema),
        Commands::Extract {
            input,
            output,
            sort,
            collections,
        } => {
            let collections = collections.or_else(|| settings.collections_path.clone());
            extract(&schema, &input, &output, sort.as_deref(), collections.as_deref())
        }
    }
}

fn load_schema(path: Option<&Path>) -> Result<Schema, String> {
    let composer = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading schema rules");
            SchemaConfig::load_from_file(path)?
                .build()
                .map_err(|e| format!("Invalid schema rules in {}: {}", path.display(), e))?
        }
        None => customize::composer().map_err(|e| format!("Invalid built-in schema rules: {}", e))?,
    };
    composer.resolve_schema().map_err(|e| format!("Schema does not resolve: {}", e))
}

fn validate(schema: &Schema) -> Result<(), String> {
    println!(
        "✓ Schema is valid: {} fields, {} facets, {} badges, {} sorts",
        schema.fields().len(),
        schema.facets().len(),
        schema.badges().len(),
        schema.sorts().len()
    );
    Ok(())
}

fn describe(schema: &Schema) -> Result<(), String> {
    println!("Fields:");
    for field in schema.fields() {
        let codec = field.codec.as_ref().map(|c| format!(" codec={}", c.name())).unwrap_or_default();
        println!(
            "  {:<16} {:<8} stored={:<5} extractor={}{}",
            field.key,
            field.storage.name(),
            field.storage.is_stored(),
            field.extractor.kind(),
            codec
        );
    }

    println!("\nFacets:");
    for facet in schema.facets() {
        println!("  {:<16} filter={:<10} weight={:<4} {}", facet.key, facet.filter_key, facet.weight(), facet.title);
    }

    println!("\nBadges:");
    for badge in schema.badges() {
        println!(
            "  {:<16} field={:<12} weight={:<4} {}",
            badge.key,
            badge.field,
            badge.weight(),
            badge.renderer.template
        );
    }

    println!("\nSorts:");
    for sort in schema.sorts() {
        let keys: Vec<String> = sort
            .fields()
            .iter()
            .zip(sort.reverse())
            .map(|(field, reverse)| if *reverse { format!("-{}", field) } else { field.clone() })
            .collect();
        println!("  {:<16} weight={:<4} [{}] {}", sort.key(), sort.weight(), keys.join(", "), sort.label());
    }

    let children = schema.child_filter();
    println!(
        "\nChildren: whitelist={} blacklist={}",
        children.whitelist().unwrap_or("-"),
        children.blacklist().unwrap_or("-")
    );
    Ok(())
}

fn extract(
    schema: &Schema,
    input: &Path,
    output: &Path,
    sort: Option<&str>,
    collections: Option<&Path>,
) -> Result<(), String> {
    let library = match collections {
        Some(path) => {
            let file = File::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
            read_library(BufReader::new(file)).map_err(|e| format!("{}: {}", path.display(), e))?
        }
        None => Library::new(),
    };

    let records = if is_stdio(input) {
        read_records(io::stdin().lock())
    } else {
        let file = File::open(input).map_err(|e| format!("Failed to open {}: {}", input.display(), e))?;
        read_records(BufReader::new(file))
    }
    .map_err(|e| format!("{}: {}", input.display(), e))?;

    let ctx = ExtractionContext::new(&PrerenderedFormats, &library);
    let mut docs = schema.extract_batch(&records, &ctx);

    if let Some(sort) = sort {
        schema.sort_documents(sort, &mut docs).map_err(|e| e.to_string())?;
    }

    let failed = docs.iter().filter(|d| d.has_failures()).count();
    let written = if is_stdio(output) {
        write_documents(io::stdout().lock(), &docs)?
    } else {
        let file = File::create(output).map_err(|e| format!("Failed to create {}: {}", output.display(), e))?;
        write_documents(BufWriter::new(file), &docs)?
    };

    eprintln!("✓ Extracted {} documents ({} with failed fields)", written, failed);
    Ok(())
}

fn write_documents<W: Write>(writer: W, docs: &[bibfields::Document]) -> Result<usize, String> {
    let mut writer = NdjsonWriter::new(writer);
    writer.write_all(docs).map_err(|e| e.to_string())?;
    writer.finish().map_err(|e| e.to_string())
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}
