#![allow(warnings)]
use std::{
    path::PathBuf,
    str::FromStr,
};

use crate::deps::{
    log::{
        debug,
        error,
        info,
        warn,
    },
    relcache::{
        aggregate::{
            self,
            AggregateOptions,
        },
        catalog::{
            Catalog,
            PgCatalog,
        },
        error::Error,
        memory,
        output::{
            self,
            Aggregation,
            Format,
            OutputOptions,
            SortKey,
            Unit,
        },
        paths,
        probe::PageCacheProbe,
    },
    structopt::StructOpt,
};

pub mod deps {
    pub(crate) use env_logger;
    pub(crate) use log;
    pub(crate) use structopt;

    pub(crate) use relcache;
}


#[derive(Copy, Clone, Debug, PartialEq)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn filter(&self) -> crate::deps::log::LevelFilter {
        match self {
            LogLevel::Error => crate::deps::log::LevelFilter::Error,
            LogLevel::Warn => crate::deps::log::LevelFilter::Warn,
            LogLevel::Info => crate::deps::log::LevelFilter::Info,
            LogLevel::Debug => crate::deps::log::LevelFilter::Debug,
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            bad_value => {
                Err(Error::Parse {
                    value:    bad_value.to_string(),
                    typename: std::any::type_name::<LogLevel>(),
                    reason:   "value was not one of: error, warning, info, debug".to_string(),
                })
            }
        }
    }
}


#[derive(Debug, StructOpt)]
#[structopt(name = "relcache", about = "per-relation page cache residency")]
struct Args {
    /// Database data directory. Falls back to the PGDATA environment
    /// variable; mandatory one way or the other.
    #[structopt(long)]
    pg_data: Option<PathBuf>,

    /// Connection string handed to the catalog layer
    #[structopt(long, default_value = "")]
    connect_str: String,

    /// Restrict the run to these relations (comma separated)
    #[structopt(long)]
    relations: Option<String>,

    /// Exclude relations whose catalog page count is at or below this
    /// threshold. -1 keeps everything.
    #[structopt(long, default_value = "10")]
    page_threshold: i64,

    /// Hide relations, tables and partitions with this many cached pages or
    /// fewer. -1 keeps everything.
    #[structopt(long, default_value = "0")]
    cached_page_threshold: i64,

    /// Include residency of the write-ahead log directory
    #[structopt(long, default_value = "true", parse(try_from_str))]
    scan_wal: bool,

    /// Render raw flag words with the kernel's overloaded bits expanded
    /// instead of the well-known reduction
    #[structopt(long)]
    raw_flags: bool,

    #[structopt(long, default_value = "none")]
    aggregation: Aggregation,

    #[structopt(long, default_value = "page_cached")]
    sort: SortKey,

    #[structopt(long, default_value = "page")]
    unit: Unit,

    #[structopt(long, default_value = "column")]
    format: Format,

    /// Maximum number of parent rows to display. -1 displays everything.
    #[structopt(long, default_value = "-1")]
    limit: i64,

    #[structopt(long)]
    no_header: bool,

    #[structopt(long, default_value = "warning")]
    log: LogLevel,

    /// Accepted for compatibility; profiling is not compiled in
    #[structopt(long)]
    cpuprofile: Option<PathBuf>,
}


fn pg_data_dir(args: &Args) -> Result<PathBuf, Error> {
    match args.pg_data.as_ref() {
        Some(dir) => Ok(dir.clone()),
        None => {
            std::env::var_os("PGDATA").map(PathBuf::from).ok_or_else(|| {
                Error::Parse {
                    value:    String::new(),
                    typename: std::any::type_name::<PathBuf>(),
                    reason:   "--pg-data is mandatory when the PGDATA environment variable is unset".to_string(),
                }
            })
        }
    }
}


fn relation_filter(args: &Args) -> Vec<String> {
    args.relations
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}


fn run(args: &Args) -> Result<(), Error> {
    let pg_data = pg_data_dir(args)?;
    let relations = relation_filter(args);

    let mut catalog = PgCatalog::connect(&args.connect_str)?;
    let (dbid, database) = catalog.current_database()?;
    info!("connected to database {} (oid {})", database, dbid);

    let rows = catalog.relation_hierarchy(&relations, args.page_threshold)?;
    info!("catalog returned {} relation(s)", rows.len());

    let probe = PageCacheProbe::new(args.raw_flags);
    let options = AggregateOptions {
        database_dir:          paths::database_dir(&pg_data, dbid),
        wal_dir:               if args.scan_wal { Some(paths::wal_dir(&pg_data)) } else { None },
        cached_page_threshold: args.cached_page_threshold,
    };
    let hierarchy = aggregate::aggregate(&probe, rows, &options)?;

    let total_cached_pages = match memory::cached_memory_pages(probe.page_size()) {
        Ok(pages) => pages,
        Err(err) => {
            warn!("{}; %Total column will read 0", err);
            0
        }
    };

    let output_options = OutputOptions {
        aggregation: args.aggregation,
        sort:        args.sort,
        unit:        args.unit,
        format:      args.format,
        limit:       args.limit,
        no_header:   args.no_header,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    output::render(&mut out, &hierarchy, &output_options, probe.page_size(), total_cached_pages)
}


fn main() {
    let args = Args::from_args();
    crate::deps::env_logger::builder().filter_level(args.log.filter()).init();

    debug!("program arguments: {:#?}", args);

    if args.cpuprofile.is_some() {
        warn!("--cpuprofile is accepted but profiling is not compiled in");
    }

    if let Err(err) = run(&args) {
        error!("{}", err);
        std::process::exit(1);
    }
}
