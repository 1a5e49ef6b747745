//! PortalWatch - availability monitor for a public document portal
//!
//! Periodically checks that the institution's site answers over HTTP and that
//! a headless browser can still walk the portal down to a rendered document.

mod clock;
mod config;
mod notify;
mod probe;
mod report;
mod scheduler;
mod store;

use clock::{Clock, SystemClock};
use config::MonitorConfig;
use notify::{Notifier, WebhookNotifier};
use probe::{BrowserProbe, BrowserProbeConfig, Orchestrator, ProbeTargets, RetryPolicy, WebDriverBrowser, HTTP_TIMEOUT};
use report::{HtmlReportRenderer, ReportGenerator};
use scheduler::{Schedule, Scheduler};
use store::LogStore;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "portalwatch")]
#[command(about = "Portal availability monitor with daily and monthly reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted (default)
    Serve,

    /// Run one check cycle and print the result as JSON
    Check,

    /// Write the daily report and print its path
    DailyReport {
        /// Day to report on (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Write the 30-day report and print its path
    MonthlyReport {
        /// Last day of the window (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

struct App {
    orchestrator: Arc<Orchestrator>,
    reports: Arc<ReportGenerator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
}

impl App {
    fn build(cfg: MonitorConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        cfg.ensure_dirs()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.timezone));
        let store = LogStore::new(cfg.log_file(), clock.clone());
        let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(cfg.alert_webhook.clone())?);
        let driver = Arc::new(WebDriverBrowser::new(&cfg.webdriver_url)?);

        let browser = BrowserProbe::new(
            BrowserProbeConfig {
                portal_url: cfg.portal_url.clone(),
                org_label: cfg.org_label.clone(),
                fail_dir: cfg.fail_dir(),
            },
            clock.clone(),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            ProbeTargets {
                site_url: cfg.site_url.clone(),
                portal_url: cfg.portal_url.clone(),
                http_timeout: HTTP_TIMEOUT,
            },
            browser,
            driver,
            Arc::new(store.clone()),
            notifier.clone(),
            RetryPolicy::default(),
            clock.clone(),
        ));
        let reports = Arc::new(ReportGenerator::new(
            store,
            Box::new(HtmlReportRenderer),
            cfg.daily_dir(),
            cfg.monthly_dir(),
            clock.clone(),
        ));

        Ok(Self {
            orchestrator,
            reports,
            notifier,
            clock,
            schedule: Schedule::from_config(&cfg),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_file = config::load_dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("portalwatch=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(path) = &env_file {
        tracing::info!("Loaded environment from {}", path.display());
    }
    let cfg = MonitorConfig::load()?;
    tracing::info!("Monitoring {} and portal {}", cfg.site_url, cfg.portal_url);
    tracing::info!("Writing logs and reports under {}", cfg.report_dir.display());

    let app = App::build(cfg)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let scheduler = Scheduler::new(
                app.orchestrator,
                app.reports,
                app.notifier,
                app.clock,
                app.schedule,
            );
            scheduler.start().await;

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown requested");
            scheduler.stop().await;
        }
        Commands::Check => {
            let result = app.orchestrator.run_once().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::DailyReport { date } => {
            let path = app.reports.generate_daily_report(date).await?;
            println!("{}", path.display());
        }
        Commands::MonthlyReport { date } => {
            let path = app.reports.generate_monthly_report(date).await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
