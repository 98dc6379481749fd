// src/bin/cli.rs
//
//! CLI supporting `run`, `parse` and `transform`.
//!
//! Examples:
//! ```bash
//! parsed-names run --table '"crm"."people"' --id-column id --name-column full_name --bucket etl-bucket
//! parsed-names parse "Dr. John Q. Public Jr."
//! parsed-names transform --bucket etl-bucket --source-prefix dump/input --destination-prefix dump/output
//! parsed-names transform --local --bucket /data --source-prefix dump/input --destination-prefix dump/output
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use parsed_names::constants::{
    max_in_flight_from_env, DEFAULT_API_BASE_URL, ENV_API_BASE_URL, ENV_API_KEY,
};
use parsed_names::{
    decompose, scoped_client, transform, CivisClient, CivisConfig, CoordinatorOptions,
    DecodePolicy, FileSystemObjectStore, ObjectStore, PipelineOptions, RunConfig, RunDescriptor,
    RunSummary, Runner, S3ClientSettings, S3ObjectStore, S3StoreFactory,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

/// Knobs shared by `run` and `transform`.
#[derive(Args)]
struct TransformArgs {
    /// Objects transformed at once (default: all of them, or PARSED_NAMES_MAX_IN_FLIGHT).
    #[arg(long = "max-in-flight")]
    max_in_flight: Option<usize>,

    /// Field delimiter of the dump and the output.
    #[arg(long, default_value_t = '|')]
    delimiter: char,

    /// Log and drop malformed rows instead of failing the object.
    #[arg(long = "skip-malformed")]
    skip_malformed: bool,
}

impl TransformArgs {
    fn delimiter(&self) -> Result<u8> {
        if !self.delimiter.is_ascii() {
            bail!("delimiter must be an ASCII character, got {:?}", self.delimiter);
        }
        Ok(self.delimiter as u8)
    }

    fn decode_policy(&self) -> DecodePolicy {
        if self.skip_malformed {
            DecodePolicy::SkipAndLog
        } else {
            DecodePolicy::Reject
        }
    }

    fn max_in_flight(&self) -> Option<usize> {
        self.max_in_flight.or_else(max_in_flight_from_env)
    }
}

#[derive(Subcommand)]
enum Command {
    /// UNLOAD the names, transform them, COPY the result into the destination table.
    Run {
        /// Source table, e.g. "crm"."people" or crm.people
        #[arg(long)]
        table: String,

        /// Primary key column of the source table.
        #[arg(long = "id-column")]
        id_column: String,

        /// Column holding the full names.
        #[arg(long = "name-column")]
        name_column: String,

        /// Bucket the dump and the output are staged in.
        #[arg(long)]
        bucket: String,

        /// Destination table (default: parsed_names in the source schema).
        #[arg(long)]
        destination: Option<String>,

        /// Run folder inside the bucket (default: parsed-names/<timestamp>).
        #[arg(long = "run-folder")]
        run_folder: Option<String>,

        /// Delay between query-state polls, e.g. 5s or 500ms.
        #[arg(long = "poll-interval", default_value = "5s", value_parser = humantime::parse_duration)]
        poll_interval: Duration,

        #[command(flatten)]
        transform: TransformArgs,
    },

    /// Print the decomposition of one name.
    Parse {
        /// Full name, e.g. "Dr. John Q. Public Jr."
        name: String,
    },

    /// Transform an existing dump without touching the warehouse.
    Transform {
        /// S3 bucket, or base directory with --local.
        #[arg(long)]
        bucket: String,

        #[arg(long = "source-prefix")]
        source_prefix: String,

        #[arg(long = "destination-prefix")]
        destination_prefix: String,

        /// Treat --bucket as a local directory.
        #[arg(long)]
        local: bool,

        /// Query job id written into every output row.
        #[arg(long = "job-id")]
        job_id: Option<u64>,

        #[command(flatten)]
        transform: TransformArgs,
    },
}

fn print_summary(summary: &RunSummary, elapsed: Duration) {
    let d = &summary.descriptor;
    println!("bucket:             {}", d.bucket);
    println!("source prefix:      {}", d.source_prefix);
    println!("destination prefix: {}", d.destination_prefix);
    if let Some(job) = d.query_job_id {
        println!("unload job:         {job}");
    }
    if let Some(job) = summary.copy_job_id {
        println!("copy job:           {job}");
    }
    println!("objects:            {}", summary.objects.len());
    println!("rows:               {}", summary.rows());
    println!("elapsed:            {}", humantime::format_duration(round_to_millis(elapsed)));
}

fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

async fn run_cmd(config: RunConfig) -> Result<()> {
    let api_key = std::env::var(ENV_API_KEY).with_context(|| format!("{ENV_API_KEY} is not set"))?;
    let base_url = std::env::var(ENV_API_BASE_URL).unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
    let jobs = CivisClient::new(CivisConfig::new(api_key).with_base_url(base_url))?;
    let runner = Runner::new(
        Arc::new(jobs),
        Arc::new(S3StoreFactory::new(S3ClientSettings::from_env())),
    );

    let started = Instant::now();
    let summary = runner.run(&config).await?;
    print_summary(&summary, started.elapsed());
    Ok(())
}

async fn transform_cmd(
    bucket: String,
    source_prefix: String,
    destination_prefix: String,
    local: bool,
    job_id: Option<u64>,
    args: TransformArgs,
) -> Result<()> {
    let store: Arc<dyn ObjectStore> = if local {
        Arc::new(FileSystemObjectStore::new())
    } else {
        let client = scoped_client(None, &S3ClientSettings::from_env()).await;
        Arc::new(S3ObjectStore::new(client))
    };

    let mut descriptor = RunDescriptor::for_prefixes(&bucket, source_prefix, destination_prefix)
        .with_delimiter(args.delimiter()?);
    descriptor.query_job_id = job_id;

    let options = CoordinatorOptions {
        max_in_flight: args.max_in_flight(),
        pipeline: PipelineOptions {
            delimiter: args.delimiter()?,
            decode_policy: args.decode_policy(),
            ..PipelineOptions::default()
        },
    };

    let started = Instant::now();
    let summary = transform(descriptor, store, &options).await?;
    for object in &summary.objects {
        info!(source = %object.source_uri, rows = object.rows, skipped = object.skipped, "done");
    }
    print_summary(&summary, started.elapsed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.cmd {
        Command::Run {
            table,
            id_column,
            name_column,
            bucket,
            destination,
            run_folder,
            poll_interval,
            transform: args,
        } => {
            let mut config = RunConfig::new(table, id_column, name_column, bucket);
            config.destination = destination;
            config.run_folder = run_folder;
            config.poll_interval = poll_interval;
            config.delimiter = args.delimiter()?;
            config.max_in_flight = args.max_in_flight();
            config.decode_policy = args.decode_policy();
            run_cmd(config).await?;
        }

        Command::Parse { name } => {
            let parts = decompose(&name);
            println!("{}", serde_json::to_string_pretty(&parts)?);
        }

        Command::Transform {
            bucket,
            source_prefix,
            destination_prefix,
            local,
            job_id,
            transform: args,
        } => {
            if source_prefix.trim_matches('/') == destination_prefix.trim_matches('/') {
                bail!("source and destination prefixes must differ");
            }
            transform_cmd(bucket, source_prefix, destination_prefix, local, job_id, args).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(delimiter: char) -> TransformArgs {
        TransformArgs {
            max_in_flight: None,
            delimiter,
            skip_malformed: false,
        }
    }

    #[test]
    fn ascii_delimiters_are_accepted() {
        assert_eq!(args('|').delimiter().unwrap(), b'|');
        assert_eq!(args('\t').delimiter().unwrap(), b'\t');
    }

    #[test]
    fn non_ascii_delimiters_are_rejected() {
        assert!(args('é').delimiter().is_err());
        assert!(args('¦').delimiter().is_err());
        assert!(args('→').delimiter().is_err());
    }

    #[test]
    fn transform_subcommand_parses_delimiter() {
        let cli = Cli::try_parse_from([
            "parsed-names",
            "transform",
            "--bucket",
            "b",
            "--source-prefix",
            "in",
            "--destination-prefix",
            "out",
            "--delimiter",
            "é",
        ])
        .unwrap();
        let Command::Transform { transform: args, .. } = cli.cmd else {
            panic!("expected transform subcommand");
        };
        assert!(args.delimiter().is_err());
    }
}
