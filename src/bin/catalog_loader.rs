use anyhow::Result;
use catalog_loader::cli::{load, shard};
use catalog_loader::util::{env, logging};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "catalog-loader", version, about = "Load product metadata and reviews into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Upsert products and reviews for one run partition in a single transaction
    Load {
        /// Path to the product metadata file (.json or .json.gz)
        #[arg(long, default_value = "Data/meta_Electronics.json.gz")]
        products: PathBuf,
        /// Path to the review file (.json or .json.gz)
        #[arg(long, default_value = "Data/Electronics.json.gz")]
        reviews: PathBuf,
        /// Run date partition (YYYY-MM-DD)
        #[arg(long)]
        run_date: String,
        /// Delete the partition's existing rows before loading
        #[arg(long, default_value_t = false)]
        overwrite: bool,
        /// Rows per bulk upsert (defaults to env LOADER_BATCH_SIZE or 5000)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Optional override for the database URL
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Split the review stream into bounded gzip NDJSON shards
    Shard {
        /// Raw review file
        #[arg(long, default_value = "Data/raw_data/Electronics.json.gz")]
        input: PathBuf,
        /// Output prefix; files are named <prefix>_NNN.jsonl.gz
        #[arg(long, default_value = "Data/shards")]
        output_prefix: String,
        /// Records per shard (defaults to env SHARD_SIZE or 100000)
        #[arg(long)]
        shard_size: Option<usize>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env::init_env();
    logging::init_tracing("info")?;

    let cli = Cli::parse();
    let report = match cli.command {
        Commands::Load {
            products,
            reviews,
            run_date,
            overwrite,
            batch_size,
            database_url,
        } => {
            let stats = load::run(load::LoadCommandConfig {
                products,
                reviews,
                run_date,
                overwrite,
                batch_size,
                database_url,
            })
            .await?;
            serde_json::to_string_pretty(&stats)?
        }
        Commands::Shard {
            input,
            output_prefix,
            shard_size,
        } => {
            let summary = shard::run(shard::ShardCommandConfig {
                input,
                output_prefix,
                shard_size,
            })?;
            serde_json::to_string_pretty(&summary)?
        }
    };
    println!("{report}");
    Ok(())
}
