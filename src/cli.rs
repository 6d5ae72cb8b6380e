//! Command-line surface: `init`, `run`, `finalize`, and the opt-in
//! `gen-sample` benchmarking helper.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{default_config_path, LoaderDriver, Settings};
use crate::loader::{ChunkedDriver, CopyDriver, ReaderDriver};
use crate::metrics::SharedMetrics;
use crate::pg;
use crate::pipeline::{run_pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "xml2pg")]
#[command(about = "Streaming XML group-event ingestion into PostgreSQL")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (schema and pipeline knobs).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the final and staging tables if they do not exist yet.
    Init,

    /// Stream an XML file into the staging tables via COPY.
    Run {
        /// Path to the XML source file.
        xml_path: PathBuf,

        /// Override the configured loader driver shape for this run.
        #[arg(long)]
        loader_driver: Option<CliLoaderDriver>,
    },

    /// Promote staged rows into the final tables and rebuild constraints.
    Finalize,

    /// Generate a synthetic XML file for local testing or benchmarking.
    GenSample {
        /// Where to write the generated file.
        #[arg(long)]
        out: PathBuf,

        /// Number of `<group_event>` elements to generate.
        #[arg(long, default_value_t = 1000)]
        groups: u64,

        /// Number of `<event>` children per group.
        #[arg(long, default_value_t = 2)]
        events_per_group: u64,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliLoaderDriver {
    Chunked,
    Reader,
}

impl From<CliLoaderDriver> for LoaderDriver {
    fn from(value: CliLoaderDriver) -> Self {
        match value {
            CliLoaderDriver::Chunked => LoaderDriver::Chunked,
            CliLoaderDriver::Reader => LoaderDriver::Reader,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let settings = Settings::load(Some(&config_path))?;

    info!(db = %settings.db.redacted(), "loaded configuration");

    match cli.command {
        Commands::Init => run_init(&settings).await,
        Commands::Run { xml_path, loader_driver } => {
            run_ingest(&settings, xml_path, loader_driver.map(Into::into)).await
        }
        Commands::Finalize => run_finalize(&settings).await,
        Commands::GenSample { out, groups, events_per_group } => {
            crate::sample::generate_sample_xml(
                &out,
                &settings.schema.xml_group_tag_name,
                &settings.schema.xml_tag_name,
                groups,
                events_per_group,
            )?;
            info!(path = %out.display(), groups, events_per_group, "wrote sample xml");
            Ok(())
        }
    }
}

async fn run_init(settings: &Settings) -> anyhow::Result<()> {
    let client = pg::connect_for_admin(&settings.db).await?;
    crate::ddl::init_db(
        &client,
        &settings.schema.groups_table_name,
        &settings.schema.events_table_name,
    )
    .await?;
    info!("schema ready");
    Ok(())
}

async fn run_finalize(settings: &Settings) -> anyhow::Result<()> {
    let mut client = pg::connect_for_admin(&settings.db).await?;
    crate::finalize::finalize(
        &mut client,
        &settings.schema.groups_table_name,
        &settings.schema.events_table_name,
    )
    .await?;
    info!("finalize complete");
    Ok(())
}

async fn run_ingest(
    settings: &Settings,
    xml_path: PathBuf,
    driver_override: Option<LoaderDriver>,
) -> anyhow::Result<()> {
    let client = pg::connect_for_admin(&settings.db).await?;
    crate::ddl::truncate_staging(
        &client,
        &settings.schema.groups_table_name,
        &settings.schema.events_table_name,
    )
    .await?;
    drop(client);

    let driver: Arc<dyn CopyDriver> = match driver_override.unwrap_or(settings.pipeline.loader_driver) {
        LoaderDriver::Chunked => Arc::new(ChunkedDriver::new(
            pg::async_connector(&settings.db),
            settings.pipeline.max_chunk_bytes,
        )),
        LoaderDriver::Reader => Arc::new(ReaderDriver::new(pg::sync_connector(&settings.db))),
    };

    let metrics = Arc::new(SharedMetrics::new());
    let pipeline_cfg = PipelineConfig {
        xml_path,
        group_tag: settings.schema.xml_group_tag_name.clone(),
        event_tag: settings.schema.xml_tag_name.clone(),
        groups_table: settings.schema.groups_table_name.clone(),
        events_table: settings.schema.events_table_name.clone(),
        workers: settings.pipeline.workers,
        queue_maxsize: settings.pipeline.queue_maxsize,
        batch_max_rows: settings.pipeline.batch_max_rows,
        batch_max_bytes: settings.pipeline.batch_max_bytes,
        recover: settings.pipeline.recover,
        huge_tree: settings.pipeline.huge_tree,
        log_interval: settings.pipeline.log_interval(),
        copy_retries: settings.pipeline.copy_retries,
        retry_base_sleep: settings.pipeline.retry_base_sleep(),
        queue_get_timeout: settings.pipeline.queue_get_timeout(),
    };

    let snapshot = run_pipeline(pipeline_cfg, metrics, driver).await;
    info!(
        groups_copied = snapshot.groups_copied,
        events_copied = snapshot.events_copied,
        skipped_records = snapshot.skipped_records,
        copy_errors = snapshot.copy_errors,
        "ingestion run complete"
    );
    Ok(())
}
