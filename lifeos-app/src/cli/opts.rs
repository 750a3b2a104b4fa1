use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, ValueEnum)]
pub enum StoreKind {
    Json,
    Sqlite,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "lifeos", version, about = "LifeOS Recall: spaced-repetition flashcards (CLI/API)")]
pub struct Cli {
    /// Storage backend
    #[arg(long, value_enum, env = "LIFEOS_STORE", default_value_t = StoreKind::Json)]
    pub store: StoreKind,

    /// Data directory for the JSON store and the default SQLite DB
    #[arg(long, env = "LIFEOS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// SQLite DB path when --store sqlite (defaults to the data dir)
    #[arg(long, env = "LIFEOS_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Acting learner
    #[arg(long, env = "LIFEOS_USER")]
    pub user: Option<Uuid>,

    /// Retries after a concurrent write to the same learning state
    #[arg(long, env = "LIFEOS_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Project operations
    #[command(subcommand)]
    Project(ProjectCmd),
    /// Card operations
    #[command(subcommand)]
    Card(CardCmd),
    /// Interactive review loop
    Review(ReviewCmd),
    /// Card counts by stage, due count, and forecast
    Stats(StatsCmd),
    /// Export learning states
    #[command(subcommand)]
    Export(ExportCmd),
    /// Launch Axum HTTP API
    Api(ApiCmd),
}

#[derive(Debug, Subcommand, Clone)]
pub enum ProjectCmd {
    /// Create a project owned by --user
    New,
    /// Give another learner access to a project
    Grant { project: Uuid, member: Uuid },
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    Add(CardAdd),
    List {
        #[arg(long)]
        project: Uuid,
    },
    Rm {
        card_id: Uuid,
    },
}

#[derive(Debug, Args, Clone)]
pub struct CardAdd {
    #[arg(long)]
    pub project: Uuid,
    #[arg(long)]
    pub front: String,
    #[arg(long)]
    pub back: String,
    #[arg(long)]
    pub hint: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ReviewCmd {
    #[arg(long)]
    pub project: Uuid,
    #[arg(long)]
    pub include_new: bool,
    #[arg(long, default_value_t = 50)]
    pub max: usize,
}

#[derive(Debug, Args, Clone)]
pub struct StatsCmd {
    #[arg(long)]
    pub project: Uuid,
    /// Days to forecast
    #[arg(long, default_value_t = 7)]
    pub days: u32,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ExportCmd {
    Csv {
        path: PathBuf,
        #[arg(long)]
        project: Uuid,
    },
}

#[derive(Debug, Args, Clone)]
pub struct ApiCmd {
    /// Bind address (host:port)
    #[arg(long, env = "LIFEOS_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: String,
}
