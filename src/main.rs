use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use inat_pusher::config::Config;
use inat_pusher::geo::{CoordinateResolver, SpatialReference};
use inat_pusher::records::{read_rows, RowExtractor};
use inat_pusher::remote::client::InatClient;
use inat_pusher::scanner::PhotoLocator;
use inat_pusher::state::StateStore;
use inat_pusher::upload::{check_credential, resolve_token, UploadSettings, Uploader};
use inat_pusher::logging;

/// Upload specimen observations and their photos to iNaturalist.
///
/// Runs are dry by default; pass --no-dry-run to write to the remote.
#[derive(Parser, Debug)]
#[command(name = "inat-pusher", version, about, long_about = None)]
struct Args {
    /// Input CSV with one sample per row
    #[arg(long, default_value = "data/inat_pictures/jbc_formatted_csv/subset.csv")]
    csv: PathBuf,

    /// Directory holding one photo folder per sample id
    #[arg(long, default_value = "data/inat_pictures")]
    images_root: PathBuf,

    /// JSON file tracking upload progress per sample
    #[arg(long, default_value = "data/inat_pictures/upload_state.json")]
    state_file: PathBuf,

    /// Config file (TOML)
    #[arg(short, long, env = "INAT_PUSHER_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of records flagged for upload to process
    #[arg(long)]
    limit: Option<usize>,

    /// Only log what would be uploaded (default)
    #[arg(long, overrides_with = "no_dry_run")]
    dry_run: bool,

    /// Create observations and upload photos
    #[arg(long, overrides_with = "dry_run")]
    no_dry_run: bool,

    /// Restrict remote tag searches to this iNaturalist user
    #[arg(long)]
    user: Option<String>,

    /// Skip the tag search before creating observations
    #[arg(long)]
    no_dedupe_remote: bool,

    /// Re-fetch completed observations and log their captive flag
    #[arg(long)]
    verify: bool,

    /// Spatial reference of the x/y columns, e.g. EPSG:2056
    #[arg(long)]
    srs: Option<String>,

    #[arg(long)]
    create_attempts: Option<u32>,

    #[arg(long)]
    photo_attempts: Option<u32>,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// How long to poll the search index after a failed create
    #[arg(long)]
    poll_ceiling_secs: Option<u64>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    /// iNaturalist API token (INATURALIST_ACCESS_TOKEN_TODAY is also read)
    #[arg(long, env = "INATURALIST_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

impl Args {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref srs) = self.srs {
            config.upload.srs = srs.clone();
        }
        if let Some(attempts) = self.create_attempts {
            config.retry.create_attempts = attempts;
        }
        if let Some(attempts) = self.photo_attempts {
            config.retry.photo_attempts = attempts;
        }
        if let Some(secs) = self.timeout_secs {
            config.api.timeout_secs = secs;
        }
        if let Some(secs) = self.poll_ceiling_secs {
            config.retry.poll_ceiling_secs = secs;
        }
    }
}

fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(args.verbose, args.log_dir.clone())?;

    let mut config = match args.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply_overrides(&mut config);

    let settings = UploadSettings {
        dry_run: args.dry_run || !args.no_dry_run,
        dedupe_remote: !args.no_dedupe_remote,
        verify: args.verify,
        owner: args.user.clone(),
        source_tag: config.upload.source_tag.clone(),
        create_policy: config.retry.create_policy(),
        poll_policy: config.retry.poll_policy(),
        photo_policy: config.retry.photo_policy(),
    };

    let token = resolve_token(
        args.token.clone(),
        std::env::var(inat_pusher::LEGACY_TOKEN_ENV).ok(),
    );
    check_credential(&settings, token.as_deref())?;

    let rows = read_rows(&args.csv)
        .with_context(|| format!("read input CSV {}", args.csv.display()))?;

    let srs: SpatialReference = config.upload.srs.parse().unwrap_or_else(|e| match e {});

    tracing::info!(
        csv = %args.csv.display(),
        rows = rows.len(),
        dry_run = settings.dry_run,
        %srs,
        "Starting upload run"
    );

    let client = InatClient::new(&config.api, token)?;
    let extractor = RowExtractor::new(config.columns.clone());
    let resolver = CoordinateResolver::new(srs, config.upload.axis_swap_heuristic);
    let locator = PhotoLocator::new(args.images_root, config.upload.photo_extensions.clone());
    let store = StateStore::load(args.state_file);

    let mut uploader = Uploader::new(settings, &client, store, resolver, locator);
    let summary = uploader.run(&rows, &extractor, args.limit);

    tracing::info!(
        completed = summary.completed,
        already_complete = summary.already_complete,
        dry_run = summary.dry_run,
        skipped = summary.skipped,
        incomplete = summary.incomplete,
        failed = summary.failed,
        photos = summary.photos_attached,
        "Run finished"
    );

    Ok(())
}
