use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI snapdump: выгрузка/загрузка KV-стора по категориям
#[derive(Parser, Debug)]
#[command(name = "snapdump", version, about = "Snapshot dump/import of the block storage")]
pub struct Cli {
    /// Append logs to FILE instead of stderr (env SNAPDUMP_LOG)
    #[arg(long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
    /// crit|error|warn|info|debug|trace (env SNAPDUMP_LOG_LEVEL, default info)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    /// terminal|json (env SNAPDUMP_LOG_FORMAT)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Dump categories from a snapshot of <source> into <destination>
    Dump(DumpArgs),
    /// Print the category catalog
    List,
    /// Import *.json.gz / *.json archives into a native store
    Import(ImportArgs),
    /// Point lookup of one key in a snapshot of <source>
    Get {
        source: String,
        /// literal, hex:<hex> or b64:<base64>
        key: String,
    },
    /// Serve a native store over JSON-RPC (DB.* methods)
    Serve {
        path: PathBuf,
        #[arg(long, default_value = "127.0.0.1:54321")]
        addr: String,
        /// Upper bound for DB.GetIterator limit
        #[arg(long, default_value_t = snapdump::rpc::server::DEFAULT_MAX_LIMIT)]
        max_limit: usize,
    },
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Store directory, file://<path> or http(s)://host:port/jsonrpc
    #[arg(required_unless_present = "list_categories")]
    pub source: Option<String>,
    /// Output directory (optional with --dry-run)
    pub destination: Option<PathBuf>,
    /// Category to dump; repeatable; "all" or none means every category
    #[arg(long = "category", alias = "prefix", value_name = "NAME")]
    pub categories: Vec<String>,
    /// store|json (legacy: leveldb|gzip-json)
    #[arg(long, default_value = "store")]
    pub format: String,
    /// Remove a non-empty destination first
    #[arg(long, conflicts_with = "merge")]
    pub force: bool,
    /// Keep existing destination data
    #[arg(long)]
    pub merge: bool,
    /// Read everything, write nothing
    #[arg(long)]
    pub dry_run: bool,
    /// Page size (env SNAPDUMP_PAGE_LIMIT, default 1000)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print the category catalog and exit
    #[arg(long)]
    pub list_categories: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub archive_dir: PathBuf,
    pub destination: PathBuf,
    /// Import only <NAME>.json[.gz]; repeatable
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,
    #[arg(long, conflicts_with = "merge")]
    pub force: bool,
    #[arg(long)]
    pub merge: bool,
}
