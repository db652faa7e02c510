//! `geofeed` - CLI for the geotagged report feed
//!
//! This binary plays the part of the presentation layer: it lists the feed,
//! applies likes and ratings for the configured user, and shares image
//! references on the console.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::debug;

use geofeed::cli::{output, Cli, Command, ConfigCommand, OutputFormat};
use geofeed::{
    init_logging, Config, EngagementEvent, EngagementMutator, EventBus, FeedReconciler,
    FeedSession, MutationOutcome, Report, ReportId, ReportStore, ReportSummary, ShareOutcome,
    ShareTarget, SqliteReportStore, StarRating, StaticIdentity,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Share target that prints the message for the user to copy.
#[derive(Debug)]
struct ConsoleShare;

#[async_trait]
impl ShareTarget for ConsoleShare {
    async fn share(&self, message: &str) -> geofeed::Result<ShareOutcome> {
        println!("{message}");
        Ok(ShareOutcome::Shared {
            activity: Some("console".to_string()),
        })
    }
}

/// Everything a feed command needs.
struct App {
    config: Config,
    store: Arc<SqliteReportStore>,
    session: FeedSession,
    events: broadcast::Receiver<EngagementEvent>,
}

impl App {
    fn open(config: Config, user: Option<String>) -> geofeed::Result<Self> {
        let store = Arc::new(SqliteReportStore::open(config.database_path())?);
        let dyn_store: Arc<dyn ReportStore> = store.clone();

        let reconciler = FeedReconciler::new(dyn_store.clone());
        let mutator = EngagementMutator::new(
            dyn_store,
            reconciler,
            EventBus::new(config.engagement.event_capacity),
            config.mutator_options(),
        );
        let identity = StaticIdentity::from_option(user.or_else(|| config.identity.user.clone()));
        let session = FeedSession::new(Arc::new(identity), mutator, Arc::new(ConsoleShare));
        let events = session.events();

        Ok(Self {
            config,
            store,
            session,
            events,
        })
    }

    async fn report(&self, id: &str) -> geofeed::Result<Report> {
        let id = ReportId::new(id);
        self.store
            .fetch_report(&id)
            .await?
            .map(|stored| stored.report)
            .ok_or_else(|| geofeed::Error::report_not_found(id.as_str()))
    }

    /// Log whatever the core announced during the last operation.
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            debug!("event: {}", event);
        }
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        command => {
            let mut app = App::open(config, cli.user)?;
            let result = run(&mut app, command).await;
            app.drain_events();
            result
        }
    }
}

async fn run(app: &mut App, command: Command) -> CliResult {
    match command {
        Command::List(cmd) => handle_list(app, cmd.format).await,
        Command::Show(cmd) => handle_show(app, &cmd.id, cmd.json).await,
        Command::Add(cmd) => {
            let timestamp = match cmd.timestamp {
                Some(secs) => DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                    geofeed::Error::precondition(format!("timestamp {secs} is out of range"))
                })?,
                None => DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default(),
            };
            let id = cmd
                .id
                .map_or_else(|| ReportId::derive(&cmd.address, &cmd.image, timestamp), ReportId::new);
            let report = Report::new(id, cmd.address, timestamp, cmd.image);
            report.validate()?;
            app.store.insert_report(&report).await?;
            println!("Added report {}", report.id);
            Ok(())
        }
        Command::Like(arg) => handle_like(app, &arg.id, true).await,
        Command::Unlike(arg) => handle_like(app, &arg.id, false).await,
        Command::Rate(cmd) => {
            let stars = StarRating::new(cmd.stars)?;
            let report = app.report(&cmd.id).await?;
            match app.session.rate(&report, stars).await? {
                MutationOutcome::Applied { report, .. } => {
                    let summary = app.session.summary(&report);
                    println!(
                        "Rated {} with {}; rating is now {:.2} from {} ratings",
                        report.id,
                        stars.value(),
                        summary.rating,
                        summary.rating_count
                    );
                }
                MutationOutcome::AlreadyRated => {
                    println!("You have already rated {}", report.id);
                }
            }
            Ok(())
        }
        Command::Share(arg) => {
            let report = app.report(&arg.id).await?;
            match app.session.share(&report).await? {
                ShareOutcome::Shared { .. } => debug!("Shared report {}", report.id),
                ShareOutcome::Dismissed => println!("Share dismissed"),
            }
            Ok(())
        }
        Command::Status(cmd) => handle_status(app, cmd.json).await,
        Command::Config(config_cmd) => handle_config(&app.config, config_cmd),
    }
}

async fn handle_list(app: &App, format: OutputFormat) -> CliResult {
    let snapshot = app.session.refresh().await?;
    let summaries: Vec<ReportSummary> = snapshot
        .reports
        .iter()
        .map(|report| app.session.summary(report))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Table => print!("{}", output::table(&summaries)),
        OutputFormat::Plain => {
            if summaries.is_empty() {
                println!("No reports yet.");
            }
            for summary in &summaries {
                println!("{}", output::plain_line(summary));
            }
        }
    }
    Ok(())
}

async fn handle_show(app: &App, id: &str, json: bool) -> CliResult {
    let report = app.report(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", output::detail(&app.session.summary(&report)));
    }
    Ok(())
}

async fn handle_like(app: &App, id: &str, like: bool) -> CliResult {
    let report = app.report(id).await?;
    let outcome = app.session.set_like(&report, like).await?;
    if let Some(report) = outcome.report() {
        println!(
            "{} {}; {} likes",
            if like { "Liked" } else { "Unliked" },
            report.id,
            report.like_count()
        );
    }
    Ok(())
}

async fn handle_status(app: &App, json: bool) -> CliResult {
    let stats = app.store.stats().await?;
    let user = app.session.user().ok();

    if json {
        let status = serde_json::json!({
            "database_path": app.store.path(),
            "user": user,
            "write_mode": app.config.engagement.write_mode,
            "total_reports": stats.total_reports,
            "total_likes": stats.total_likes,
            "total_ratings": stats.total_ratings,
            "oldest_report": stats.oldest_report,
            "newest_report": stats.newest_report,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("geofeed status");
        println!("--------------");
        println!("Database:      {}", app.store.path().display());
        println!(
            "User:          {}",
            user.map_or_else(|| "(not signed in)".to_string(), |u| u.to_string())
        );
        println!("Write mode:    {}", app.config.engagement.write_mode);
        println!("Reports:       {}", stats.total_reports);
        println!("Likes:         {}", stats.total_likes);
        println!("Ratings:       {}", stats.total_ratings);
        if let (Some(oldest), Some(newest)) = (stats.oldest_report, stats.newest_report) {
            println!("Oldest:        {oldest}");
            println!("Newest:        {newest}");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> CliResult {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Store]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Engagement]");
                println!("  Write mode:         {}", config.engagement.write_mode);
                println!("  Max retries:        {}", config.engagement.max_retries);
                println!(
                    "  Refetch after write: {}",
                    config.engagement.refetch_after_mutation
                );
                println!("  Event capacity:     {}", config.engagement.event_capacity);
                println!();
                println!("[Identity]");
                println!(
                    "  User:               {}",
                    config.identity.user.as_deref().unwrap_or("(none)")
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
