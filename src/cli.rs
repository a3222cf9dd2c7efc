use crate::cleanup::{cleanup_extracts, cleanup_tmp};
use crate::config::{ResolvedConfig, SyncConfigFile};
use crate::downloader::download_export;
use crate::errors::{AppError, AppResult};
use crate::report::{generate_report, rebuild_stats};
use crate::splitter::split_export;
use crate::utils::{format_duration, mb_from_bytes, round_two_decimals};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

// CLI metadata constants
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
const APP_ABOUT: &str = env!("CARGO_PKG_DESCRIPTION");

/// Parses command-line arguments and executes the selected command.
///
/// Four subcommands are available:
/// - `sync`: download the export, split it into per-country shards,
///   and generate the report (the full pipeline)
/// - `download`: fetch the export into the tmp directory and stop
/// - `report`: rebuild `report.md` from the shards already on disk
/// - `toml`: run `sync` using a TOML configuration file
pub async fn cli() -> AppResult<()> {
    let cmd = Command::new("peppol-cli")
        .version(APP_VERSION)
        .author(APP_AUTHOR)
        .about(APP_ABOUT)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug output")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print warnings and errors")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("sync")
                .about("Download the export, split it by country, and generate a report")
                .after_help(
                    "Example:\n  peppol-cli sync --max-bytes 2000000 --keep-tmp",
                )
                .arg(
                    Arg::new("force")
                        .short('F')
                        .long("force")
                        .help("Re-download the export even if a cached copy exists")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no_cleanup")
                        .short('C')
                        .long("no-cleanup")
                        .help("Do not delete existing extracts before starting (default: delete)")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("keep_tmp")
                        .short('K')
                        .long("keep-tmp")
                        .help("Keep the downloaded export after processing (default: delete)")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("tmp")
                        .short('T')
                        .long("tmp")
                        .help("Temporary directory for the downloaded export")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("max_bytes")
                        .short('M')
                        .long("max-bytes")
                        .help("Maximum number of bytes per output shard")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("record_tag")
                        .long("record-tag")
                        .help("Element name of one record in the export")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("Download the export without processing it")
                .arg(
                    Arg::new("force")
                        .short('F')
                        .long("force")
                        .help("Re-download the export even if a cached copy exists")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("tmp")
                        .short('T')
                        .long("tmp")
                        .help("Temporary directory for the downloaded export")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Rebuild report.md from the shards already on disk")
                .arg(
                    Arg::new("record_tag")
                        .long("record-tag")
                        .help("Element name of one record in the shards")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("toml")
                .about("Run a sync using a TOML configuration file")
                .arg(
                    Arg::new("config")
                        .help("Path to the TOML config file")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        );

    let mut cmd_for_help = cmd.clone();
    let matches = cmd.get_matches();

    crate::ui::init_tracing(matches.get_flag("verbose"), matches.get_flag("quiet"));

    match matches.subcommand() {
        Some(("sync", sub)) => {
            let config = resolved_config_from_args(sub);
            run_sync(
                &config,
                sub.get_flag("force"),
                !sub.get_flag("no_cleanup"),
                sub.get_flag("keep_tmp"),
            )
            .await?;
        }
        Some(("download", sub)) => {
            let config = resolved_config_from_args(sub);
            run_download(&config, sub.get_flag("force")).await?;
        }
        Some(("report", sub)) => {
            let config = resolved_config_from_args(sub);
            run_report(&config)?;
        }
        Some(("toml", sub)) => {
            let config_path = sub
                .get_one::<PathBuf>("config")
                .ok_or_else(|| AppError::InvalidInput("Missing config path".to_string()))?;

            let file_config = SyncConfigFile::from_toml_file(config_path)?;
            run_sync(
                &file_config.resolved,
                file_config.force_download,
                file_config.cleanup_extracts,
                file_config.keep_tmp,
            )
            .await?;
        }
        _ => {
            cmd_for_help
                .print_help()
                .map_err(|e| AppError::IoError(format!("Failed to print help: {e}")))?;
        }
    }

    Ok(())
}

/// Builds the resolved configuration from subcommand arguments.
fn resolved_config_from_args(sub: &ArgMatches) -> ResolvedConfig {
    let mut config = ResolvedConfig::default();
    if let Some(tmp) = sub.try_get_one::<PathBuf>("tmp").ok().flatten() {
        config.tmp_dir = tmp.clone();
    }
    if let Some(&max_bytes) = sub.try_get_one::<u64>("max_bytes").ok().flatten() {
        config.max_shard_bytes = max_bytes;
    }
    if let Some(tag) = sub.try_get_one::<String>("record_tag").ok().flatten() {
        config.record_tag = tag.clone();
    }
    config
}

/// Full pipeline: cleanup, download, split, report, tmp cleanup.
async fn run_sync(
    config: &ResolvedConfig,
    force: bool,
    should_cleanup: bool,
    keep_tmp: bool,
) -> AppResult<()> {
    let started = Instant::now();

    if should_cleanup {
        cleanup_extracts(&config.extracts_dir).await?;
    }

    info!(
        max_shard_bytes = config.max_shard_bytes,
        record_tag = config.record_tag.as_str(),
        "Starting sync"
    );

    let client = reqwest::Client::new();
    let export_path = download_export(&client, config, force).await?;

    let export_size = std::fs::metadata(&export_path)?.len();
    info!(
        file = %export_path.display(),
        size_mb = round_two_decimals(mb_from_bytes(export_size)),
        "Processing export"
    );

    let summary = split_export(
        &export_path,
        &config.extracts_dir,
        &config.record_tag,
        config.max_shard_bytes,
    )?;

    generate_report(&summary.stats, &config.extracts_dir)?;

    cleanup_tmp(&config.tmp_dir, keep_tmp).await?;

    info!(
        records = summary.records,
        countries = summary.stats.country_count(),
        files = summary.files_created,
        duration = %format_duration(started.elapsed()),
        "Sync complete"
    );

    Ok(())
}

/// Fetches the export without processing it.
async fn run_download(config: &ResolvedConfig, force: bool) -> AppResult<()> {
    let client = reqwest::Client::new();
    let export_path = download_export(&client, config, force).await?;

    let size = std::fs::metadata(&export_path)?.len();
    info!(
        file = %export_path.display(),
        size_mb = round_two_decimals(mb_from_bytes(size)),
        "Export ready"
    );
    Ok(())
}

/// Rebuilds the report from whatever shards are on disk.
fn run_report(config: &ResolvedConfig) -> AppResult<()> {
    let stats = rebuild_stats(&config.extracts_dir, &config.record_tag)?;
    generate_report(&stats, &config.extracts_dir)?;
    Ok(())
}
