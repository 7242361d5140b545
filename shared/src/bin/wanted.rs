//! wanted - browse the wanted-persons catalog from a terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use wanted_core::capabilities::{FileKvStore, ReqwestTransport};
use wanted_core::config::Config;
use wanted_core::event::RecordUid;
use wanted_core::record::NOT_AVAILABLE;
use wanted_core::runtime::Runtime;
use wanted_core::{Event, ViewModel};

#[derive(Parser, Debug)]
#[command(name = "wanted")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List one page of the catalog
    #[command(alias = "ls")]
    List {
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Case-insensitive title filter over the page
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Show one record in detail
    Show {
        /// Record uid
        uid: String,
    },

    /// Local sighting reports
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Subcommand, Debug)]
enum ReportCommands {
    /// Record a sighting against a catalog record
    Add {
        /// Record uid
        uid: String,

        /// What was seen, where and when
        #[arg(short, long)]
        note: String,
    },

    /// List stored reports
    List,

    /// Delete the report at a position shown by `report list`
    Delete {
        position: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let kv = FileKvStore::open(&config.storage.path).with_context(|| {
        format!("failed to open report store at {}", config.storage.path.display())
    })?;
    tracing::debug!(path = %kv.path().display(), "report store opened");
    let transport = ReqwestTransport::new(&config.catalog.user_agent, config.catalog.timeout_ms)?;

    let mut runtime = Runtime::new(Arc::new(transport), Arc::new(kv));
    runtime.dispatch(Event::Configure(Box::new(config)));
    check_error(&runtime.view())?;

    match cli.command {
        Commands::List { page, filter } => {
            runtime.dispatch(Event::GoToPage { page });
            if let Some(query) = filter {
                runtime.dispatch(Event::FilterChanged { query });
            }
            runtime.settle().await;
            print_page(&runtime.view())?;
        }

        Commands::Show { uid } => {
            runtime.dispatch(Event::LoadReports);
            runtime.dispatch(Event::OpenRecord { uid: RecordUid::new(uid) });
            runtime.settle().await;
            print_detail(&runtime.view())?;
        }

        Commands::Report(ReportCommands::Add { uid, note }) => {
            let uid = RecordUid::new(uid);
            runtime.dispatch(Event::LoadReports);
            runtime.dispatch(Event::OpenRecord { uid: uid.clone() });
            runtime.settle().await;
            if let Some(err) = runtime.view().detail.and_then(|d| d.error) {
                bail!("cannot report against {uid}: {}", err.message);
            }
            runtime.dispatch(Event::ReportSighting { uid, note });
            check_error(&runtime.view())?;
            println!("report saved");
        }

        Commands::Report(ReportCommands::List) => {
            runtime.dispatch(Event::LoadReports);
            let vm = runtime.view();
            if vm.reports.is_empty() {
                println!("no reports");
            }
            for r in &vm.reports {
                println!("[{}] {} ({})\n    {}", r.position, r.title, r.record_uid, r.note);
            }
        }

        Commands::Report(ReportCommands::Delete { position }) => {
            runtime.dispatch(Event::LoadReports);
            runtime.dispatch(Event::DeleteReport { position });
            check_error(&runtime.view())?;
            println!("report {position} deleted");
        }
    }

    Ok(())
}

fn check_error(vm: &ViewModel) -> Result<()> {
    if let Some(err) = &vm.error {
        bail!("{} ({})", err.message, err.code);
    }
    Ok(())
}

fn print_page(vm: &ViewModel) -> Result<()> {
    if let Some(err) = &vm.page.error {
        bail!("page {}: {} ({})", vm.page.current_page, err.message, err.code);
    }
    for card in &vm.items {
        println!("{:<40} {}", card.uid, card.title);
    }
    if vm.items.is_empty() {
        println!("(no matching records)");
    }

    let window: Vec<String> = vm
        .page
        .window
        .iter()
        .map(|p| {
            if *p == vm.page.current_page {
                format!("[{p}]")
            } else {
                p.to_string()
            }
        })
        .collect();
    println!(
        "\n{} {} {}   page {} of {}",
        if vm.page.has_previous { "<" } else { " " },
        window.join(" "),
        if vm.page.has_next { ">" } else { " " },
        vm.page.current_page,
        vm.page.total_pages,
    );
    Ok(())
}

fn print_detail(vm: &ViewModel) -> Result<()> {
    let Some(detail) = &vm.detail else {
        bail!("no record selected");
    };
    if let Some(err) = &detail.error {
        bail!("{}: {} ({})", detail.uid, err.message, err.code);
    }
    let Some(record) = &detail.record else {
        bail!("{}: record not loaded", detail.uid);
    };

    println!("{}\n", record.title);
    if !record.description.is_empty() {
        println!("{}\n", record.description);
    }
    for (label, value) in [
        ("Reward", &record.reward),
        ("Age", &record.age),
        ("Race", &record.race),
        ("Hair", &record.hair),
        ("Eyes", &record.eyes),
        ("Height", &record.height),
        ("Weight", &record.weight),
        ("Subjects", &record.subjects),
        ("Published", &record.publication_date),
        ("Details", &record.details),
        ("Remarks", &record.remarks),
        ("Caution", &record.warning_message),
    ] {
        println!("{label:>10}: {value}");
    }
    println!(
        "{:>10}: {}",
        "Image",
        record.image_url.as_deref().unwrap_or(NOT_AVAILABLE)
    );
    if let Some(url) = &record.download_url {
        println!("{:>10}: {url}", "Poster");
    }
    if !detail.reports.is_empty() {
        println!("\n{} local report(s)", detail.reports.len());
    }
    Ok(())
}
