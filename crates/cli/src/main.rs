use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    AccountArgs, ConidScrapeArgs, ModelExportArgs, ModelReadArgs, NewsTraderArgs, SnapshotArgs,
    UploadSnapshotArgs,
};
use tws_core::{AppConfig, ConfigLoader};

#[derive(Parser)]
#[command(name = "tws-tools")]
#[command(about = "Option-chain scrapers, account listings and a news trader for IB TWS", long_about = None)]
struct Cli {
    /// Produce verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Minimal logging, only output errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Overlay `<config>.<profile>.toml` on top of the config file
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve contract ids of an option chain into the instruments table
    ConidScrape(ConidScrapeArgs),
    /// Capture a market data snapshot of an option chain
    Snapshot(SnapshotArgs),
    /// Print the account summary
    AccountSummary(AccountArgs),
    /// Print account values and portfolio positions
    AccountDetails(AccountArgs),
    /// Run the interactive news trader
    NewsTrader(NewsTraderArgs),
    /// Upload a snapshot CSV to the market data table
    UploadSnapshot(UploadSnapshotArgs),
    /// Export a snapshot CSV as a modeling database
    ModelExport(ModelExportArgs),
    /// Print a parameter or variable from a modeling database
    ModelRead(ModelReadArgs),
}

fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match (verbose, quiet) {
            (true, _) => "debug",
            (_, true) => "error",
            _ => "info",
        })
    })
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    match &cli.profile {
        Some(profile) => ConfigLoader::load_with_profile(&cli.config, profile),
        None => ConfigLoader::load_from(&cli.config),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, cli.quiet))
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::ConidScrape(args) => commands::run_conid_scrape(args, &config).await?,
        Commands::Snapshot(args) => commands::run_snapshot(args, &config).await?,
        Commands::AccountSummary(args) => commands::run_account_summary(args, &config).await?,
        Commands::AccountDetails(args) => commands::run_account_details(args, &config).await?,
        Commands::NewsTrader(args) => commands::run_news_trader(args, &config).await?,
        Commands::UploadSnapshot(args) => commands::run_upload_snapshot(args, &config).await?,
        Commands::ModelExport(args) => commands::run_model_export(args)?,
        Commands::ModelRead(args) => commands::run_model_read(args)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tws-tools", "snapshot", "--db", "-v", "--csv", "out.csv"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Snapshot(args) => {
                assert!(args.db);
                assert_eq!(args.csv, Some(Some("out.csv".into())));
            }
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn csv_path_is_optional() {
        let cli = Cli::try_parse_from(["tws-tools", "snapshot", "--csv"]).unwrap();
        match cli.command {
            Commands::Snapshot(args) => assert_eq!(args.csv, Some(None)),
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["tws-tools", "-v", "-q", "account-summary"]).is_err());
    }
}
