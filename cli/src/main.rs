//! ConvertPal CLI
//!
//! Lists currencies, shows exchange rates and converts amounts using rates
//! cached on disk between runs.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use convertpal_common::CurrencyCode;
use convertpal_fx::{
    CurrencyService, FileSnapshotStore, FxError, FxResult, Notifier, OpenExchangeRatesProvider,
    RateCache, RateProvider, RateTable,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod format;

use config::AppConfig;
use format::{format_amount, format_rate, format_remaining, format_time};

/// ConvertPal CLI
#[derive(Parser, Debug)]
#[command(name = "convertpal")]
#[command(about = "Currency converter backed by cached exchange rates")]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported currencies
    Currencies,

    /// Show exchange rates
    Rates {
        /// Currency the rates are expressed in
        #[arg(short, long, value_parser = CurrencyCode::parse)]
        base: Option<CurrencyCode>,

        /// Fetch new rates if the cached ones are stale enough
        #[arg(long)]
        refresh: bool,
    },

    /// Convert an amount, to one currency or to all of them
    #[command(allow_negative_numbers = true)]
    Convert {
        amount: f64,
        #[arg(value_parser = CurrencyCode::parse)]
        from: CurrencyCode,
        #[arg(value_parser = CurrencyCode::parse)]
        to: Option<CurrencyCode>,

        /// Fetch new rates if the cached ones are stale enough
        #[arg(long)]
        refresh: bool,
    },

    /// Show when the cached rates were fetched
    Status,
}

impl Command {
    /// Whether the command may fetch from the app-id protected rates endpoint.
    fn needs_rates(&self) -> bool {
        matches!(self, Command::Rates { .. } | Command::Convert { .. })
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = AppConfig::from_env();
    init_tracing(&config.log_level, args.json_logs);

    let validation = config.validate().and_then(|()| {
        if args.command.needs_rates() {
            config.feed.validate_credentials()
        } else {
            Ok(())
        }
    });
    if let Err(e) = validation {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!(cache_path = %config.cache_path.display(), "Starting ConvertPal");

    let provider: Arc<dyn RateProvider> =
        Arc::new(OpenExchangeRatesProvider::new(config.feed.clone())?);
    let store = Arc::new(FileSnapshotStore::new(&config.cache_path));
    let cache = RateCache::new(provider.clone(), store, config.cache.clone());

    if let Err(e) = cache.restore().await {
        warn!(error = %e, "Ignoring unreadable rate snapshot");
    }

    // Print notices as they arrive
    let (notifier, mut notices) = Notifier::channel();
    let printer = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            eprintln!("{}: {}", notice.title, notice.message);
        }
    });

    let service = CurrencyService::new(provider, cache.clone(), notifier);
    let outcome = run(&service, args.command).await;

    // Closing the channel lets the printer drain and exit.
    drop(service);
    if let Err(e) = printer.await {
        warn!(error = %e, "Notice printer failed");
    }

    debug!(stats = ?cache.stats(), "Cache statistics");

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            debug!(code = e.error_code(), "Command failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(service: &CurrencyService, command: Command) -> FxResult<()> {
    match command {
        Command::Currencies => {
            let catalog = service.get_currency_catalog().await?;
            for currency in &catalog {
                println!("{:<6} {}", currency.code.code(), currency.name);
            }
        }

        Command::Rates { base, refresh } => {
            let table = load_rates(service, base.as_ref(), refresh).await?;
            print_updated(service);
            println!("1 {} =", table.base());
            for (code, rate) in table.iter() {
                println!("  {:<6} {:>18}", code.code(), format_rate(rate));
            }
        }

        Command::Convert {
            amount,
            from,
            to,
            refresh,
        } => {
            if refresh {
                load_rates(service, None, true).await?;
            }

            match to {
                Some(to) => {
                    let value = service.convert(amount, &from, &to).await?;
                    println!(
                        "{} {} = {} {}",
                        format_amount(amount),
                        from,
                        format_amount(value),
                        to
                    );
                }
                None => {
                    let values = service.convert_to_all(amount, &from).await?;
                    println!("{} {} =", format_amount(amount), from);
                    for (code, value) in values {
                        println!("  {:<6} {:>18}", code.code(), format_amount(value));
                    }
                }
            }
            print_updated(service);
        }

        Command::Status => {
            let cache = service.cache();
            match (cache.last_updated(), cache.time_until_stale()) {
                (Some(at), Some(remaining)) => {
                    println!("Last updated: {}", format_time(&at.with_timezone(&chrono::Local)));
                    if remaining > chrono::Duration::zero() {
                        println!("Fresh for:    {}", format_remaining(remaining));
                    } else {
                        println!("Rates are stale and will be refetched on next use");
                    }
                }
                _ => println!("No cached rates"),
            }
        }
    }

    Ok(())
}

/// Fetch rates, optionally forcing a refresh.
///
/// A suppressed refresh has already been reported, so the cached table is
/// shown instead.
async fn load_rates(
    service: &CurrencyService,
    base: Option<&CurrencyCode>,
    force_refresh: bool,
) -> FxResult<RateTable> {
    match fetch_rates(service, base, force_refresh).await {
        Err(FxError::RefreshSuppressed { .. }) if force_refresh => {
            fetch_rates(service, base, false).await
        }
        result => result,
    }
}

async fn fetch_rates(
    service: &CurrencyService,
    base: Option<&CurrencyCode>,
    force_refresh: bool,
) -> FxResult<RateTable> {
    match base {
        Some(base) => service.rates_in(base, force_refresh).await,
        None => service.get_rates(force_refresh).await,
    }
}

fn print_updated(service: &CurrencyService) {
    if let Some(at) = service.cache().last_updated() {
        println!(
            "Last updated: {}",
            format_time(&at.with_timezone(&chrono::Local))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert_to_one() {
        let args = Args::try_parse_from(["convertpal", "convert", "100", "usd", "EUR"]).unwrap();
        match args.command {
            Command::Convert {
                amount, from, to, refresh,
            } => {
                assert_eq!(amount, 100.0);
                assert_eq!(from, CurrencyCode::usd());
                assert_eq!(to, Some(CurrencyCode::eur()));
                assert!(!refresh);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_convert_to_all() {
        let args =
            Args::try_parse_from(["convertpal", "convert", "-5", "GBP", "--refresh"]).unwrap();
        match args.command {
            Command::Convert {
                amount, to, refresh, ..
            } => {
                assert_eq!(amount, -5.0);
                assert_eq!(to, None);
                assert!(refresh);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rates_with_base() {
        let args = Args::try_parse_from(["convertpal", "--json-logs", "rates", "-b", "jpy"]).unwrap();
        assert!(args.json_logs);
        match args.command {
            Command::Rates { base, refresh } => {
                assert_eq!(base, Some(CurrencyCode::jpy()));
                assert!(!refresh);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_invalid_currency() {
        assert!(Args::try_parse_from(["convertpal", "convert", "1", "U$D", "EUR"]).is_err());
        assert!(Args::try_parse_from(["convertpal", "convert", "1", "USD", "E"]).is_err());
        assert!(Args::try_parse_from(["convertpal", "rates", "--base", "€"]).is_err());
    }

    #[test]
    fn test_only_rate_commands_need_app_id() {
        let parse = |argv: &[&str]| Args::try_parse_from(argv).unwrap().command;

        assert!(parse(&["convertpal", "rates"]).needs_rates());
        assert!(parse(&["convertpal", "convert", "1", "USD"]).needs_rates());
        assert!(!parse(&["convertpal", "currencies"]).needs_rates());
        assert!(!parse(&["convertpal", "status"]).needs_rates());
    }
}
