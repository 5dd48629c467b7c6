use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Crawl the comments of one video")]
    Crawl {
        #[arg(help = "Video URL or bare BV/av identifier")]
        url: String,
        #[arg(long, help = "Page budget; defaults to HARVEST_MAX_PAGES")]
        max_pages: Option<u32>,
    },
    #[command(about = "Manage the stored session cookie")]
    Cookie {
        #[command(subcommand)]
        action: CookieAction,
    },
    #[command(about = "List stored comments")]
    Query(QueryArgs),
    #[command(about = "Print store statistics")]
    Stats,
    #[command(about = "Delete every stored comment")]
    Clear {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    #[command(about = "Write every comment to stdout as JSON lines")]
    Dump,
    #[command(about = "Run the HTTP API")]
    Serve,
}

#[derive(Debug, Subcommand)]
pub enum CookieAction {
    #[command(about = "Save a cookie string; reads stdin when omitted")]
    Set {
        token: Option<String>,
        #[arg(long)]
        ttl_days: Option<u32>,
    },
    Status,
    #[command(about = "Ask the remote API whether the session is still logged in")]
    Check,
    Clear,
    Purge,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(long, default_value = "all")]
    pub filter: String,
    #[arg(long, short = 'q', default_value = "")]
    pub search: String,
    #[arg(long, default_value = "publish_time")]
    pub sort: String,
    #[arg(long, default_value = "desc")]
    pub order: String,
    #[arg(long, default_value_t = 20)]
    pub limit: i64,
    #[arg(long, default_value_t = 0)]
    pub offset: i64,
}
