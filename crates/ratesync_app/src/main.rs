mod platform;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use platform::logging::LogDestination;
use platform::persistence::DEFAULT_CONFIG_FILENAME;
use ratesync_core::SyncTarget;

#[derive(Parser)]
#[command(name = "ratesync", version, about = "Douban to IMDb rating and watchlist sync")]
struct Cli {
    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogDestination::Terminal, global = true)]
    log: LogDestination,
    /// Log every tab and poll at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Settings file (RON); missing means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_FILENAME, global = true)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the titles and pagination found in a saved listing page
    Scan(ListingArgs),
    /// Run a whole sync against the in-process simulated browser
    Simulate(SimulateArgs),
    /// Decode a listing, detail, remote or return-trip URL
    Decode {
        url: String,
    },
    /// Print the effective settings as RON
    Config {
        /// Write them to the settings file instead
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Clone)]
struct ListingArgs {
    /// Saved HTML of the listing page
    listing: PathBuf,
    /// URL the page was saved from; links are resolved against it
    #[arg(long)]
    url: String,
}

#[derive(Args, Clone)]
struct SimulateArgs {
    #[command(flatten)]
    listing: ListingArgs,
    /// Sync target; asked interactively when omitted
    #[arg(long, value_enum)]
    target: Option<TargetArg>,
    /// Sync every page from this one to the last
    #[arg(long, conflicts_with = "entry")]
    all_pages: bool,
    /// Sync only this entry (1-based, as printed by `scan`)
    #[arg(long)]
    entry: Option<usize>,
    /// Answer yes to every confirmation
    #[arg(short, long)]
    yes: bool,
    /// Entries whose remote page never shows its controls
    #[arg(long, num_args = 1.., value_name = "N")]
    fail: Vec<usize>,
    /// Entries whose tab the browser refuses to open
    #[arg(long, num_args = 1.., value_name = "N")]
    block: Vec<usize>,
    /// Entries whose detail page links no remote title
    #[arg(long = "no-id", num_args = 1.., value_name = "N")]
    no_id: Vec<usize>,
    /// Entries already on the remote watchlist
    #[arg(long, num_args = 1.., value_name = "N")]
    already_added: Vec<usize>,
    /// Directory holding `page-<n>.html` for the later listing pages
    #[arg(long)]
    pages_dir: Option<PathBuf>,
    /// Keep result records in this JSON file instead of memory
    #[arg(long)]
    store: Option<PathBuf>,
    /// Press pause on the progress panel this many milliseconds into the sync
    #[arg(long, value_name = "MS")]
    pause_at: Option<u64>,
    /// Press resume this many milliseconds into the sync
    #[arg(long, value_name = "MS", requires = "pause_at")]
    resume_at: Option<u64>,
    /// Close the progress panel this many milliseconds into the sync
    #[arg(long, value_name = "MS")]
    close_panel_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetArg {
    Rating,
    Watchlist,
}

impl From<TargetArg> for SyncTarget {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Rating => SyncTarget::Rating,
            TargetArg::Watchlist => SyncTarget::Watchlist,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    platform::logging::initialize(cli.log, cli.verbose);
    let settings = platform::persistence::load_settings(&cli.config);

    match cli.command {
        Commands::Scan(args) => platform::app::scan(&args.listing, &args.url),
        Commands::Simulate(args) => platform::app::simulate(settings, args.into()).await,
        Commands::Decode { url } => platform::app::decode(&url),
        Commands::Config { write } => platform::app::config(&cli.config, &settings, write),
    }
}

impl From<SimulateArgs> for platform::app::SimulateRequest {
    fn from(args: SimulateArgs) -> Self {
        Self {
            listing: args.listing.listing,
            url: args.listing.url,
            target: args.target.map(SyncTarget::from),
            all_pages: args.all_pages,
            entry: args.entry,
            assume_yes: args.yes,
            fail: args.fail,
            block: args.block,
            no_id: args.no_id,
            already_added: args.already_added,
            pages_dir: args.pages_dir,
            store: args.store,
            pause_at: args.pause_at,
            resume_at: args.resume_at,
            close_panel_at: args.close_panel_at,
        }
    }
}
