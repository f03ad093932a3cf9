use std::process;

use analysis_purge::cli::{Cli, Commands};
use analysis_purge::config::CONFIG_HELP;
use analysis_purge::storage::RelationalStore;
use analysis_purge::{
    logging, Archiver, Database, DiskProbe, Error, MongoStore, Purger, Scheduler, Settings,
    StorageProbe, WorkingDir,
};
use clap::Parser;
use colored::*;
use dotenv::dotenv;
use tracing::error;

fn main() {
    dotenv().ok();

    let args = Cli::parse();

    if let Err(err) = run(args) {
        error!("{}", err);
        eprintln!("{}", err);
        if matches!(err, Error::MissingThreshold | Error::InvalidThreshold(_)) {
            eprintln!("{}", CONFIG_HELP);
        }
        process::exit(1);
    }
}

fn run(args: Cli) -> Result<(), Error> {
    let cwd = WorkingDir::open(&args.cwd)?;
    let settings = Settings::load(&cwd)?;

    let command = args.command.unwrap_or(Commands::Run);
    if command == Commands::PrintConfig {
        println!("Configuration: {:#?}", settings);
        return Ok(());
    }

    let _guard = logging::init_logger(&cwd)?;

    match command {
        Commands::Status => print_status(&cwd, &settings),
        _ => run_purge(&cwd, &settings),
    }
}

fn run_purge(cwd: &WorkingDir, settings: &Settings) -> Result<(), Error> {
    let database = Database::connect(&settings.database)?;
    let documents = MongoStore::connect(&settings.mongodb)?;

    let mut purger = Purger::new(database, documents, cwd.clone());
    if settings.archive {
        purger = purger.with_archiver(Archiver::new(settings, cwd)?);
    }

    let mut scheduler = Scheduler::new(purger, DiskProbe::new(cwd.root()), settings);
    let summary = scheduler.run(settings.mode)?;

    println!(
        "{} tasks purged from {} days",
        summary.tasks.to_string().red(),
        summary.cohorts.to_string().cyan(),
    );
    Ok(())
}

fn print_status(cwd: &WorkingDir, settings: &Settings) -> Result<(), Error> {
    let available = DiskProbe::new(cwd.root()).available_bytes()?;
    let reserve = settings.reserve_bytes();
    let gib = |bytes: u64| format!("{:.2}GB", bytes as f64 / (1u64 << 30) as f64);

    println!("Available space: {}", gib(available).green());
    println!("Reserve:         {}", gib(reserve).cyan());
    if available < reserve {
        println!("{}", "Storage is below the reserve".red());
    }

    let mut database = Database::connect(&settings.database)?;
    match database.oldest_task()? {
        Some(task) => println!(
            "Oldest task:     #{} added {}",
            task.id,
            task.added_on.to_string().yellow()
        ),
        None => println!("Oldest task:     {}", "none".yellow()),
    }
    Ok(())
}
