//! ChartFeed CLI: drive a chart session from the terminal.
//!
//! Commands:
//! - `bars`: load a bar window (initial load plus optional backward pages)
//! - `markers`: load bars and snap a backtest's or strategy's fills onto them
//! - `symbols`: list tradable symbols from the backend

use anyhow::{bail, Context, Result};
use chartfeed_core::config::FeedConfig;
use chartfeed_core::data::{
    BarSource, DataError, FillScope, InMemoryBarSource, SymbolCache, TimeBounds,
};
use chartfeed_core::domain::Timeframe;
use chartfeed_core::markers::MarkerPosition;
use chartfeed_core::session::{ChartSession, SessionSnapshot};
use chartfeed_core::window::{ApplyOutcome, WindowKey};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "chartfeed",
    about = "ChartFeed CLI: incremental chart bar loading"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve bars from a generated in-memory series instead of the backend.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WindowArgs {
    /// Symbol to chart (e.g., AAPL).
    #[arg(long)]
    symbol: String,

    /// Timeframe: 1Min, 5Min, 15Min, 30Min, 1Hour, 4Hour, 1Day, 1Week.
    #[arg(long, default_value = "1Day")]
    timeframe: Timeframe,

    /// Lower bound (YYYY-MM-DD or RFC 3339). Unbounded when omitted.
    #[arg(long)]
    start: Option<String>,

    /// Upper bound and initial load end (YYYY-MM-DD or RFC 3339). Defaults to now.
    #[arg(long)]
    end: Option<String>,

    /// Number of backward "load more" pages after the initial load.
    #[arg(long, default_value_t = 0)]
    more: u32,

    /// Print the session snapshot as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a bar window and print it.
    Bars {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Load a bar window and align a backtest's or strategy's fills onto it.
    Markers {
        #[command(flatten)]
        window: WindowArgs,

        /// Backtest whose trades to mark.
        #[arg(long, conflicts_with = "strategy")]
        backtest: Option<String>,

        /// Strategy whose orders to mark.
        #[arg(long)]
        strategy: Option<String>,
    },
    /// List tradable symbols.
    Symbols {
        /// Drop the cached list and fetch it again.
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chartfeed=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => FeedConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FeedConfig::default(),
    };

    match cli.command {
        Commands::Bars { window } => run_bars(&config, cli.synthetic, &window),
        Commands::Markers {
            window,
            backtest,
            strategy,
        } => run_markers(&config, cli.synthetic, &window, backtest, strategy),
        Commands::Symbols { refresh } => run_symbols(&config, refresh),
    }
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or RFC 3339.
fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD or RFC 3339"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .with_context(|| format!("invalid date '{s}'"))
}

fn bounds_of(args: &WindowArgs) -> Result<TimeBounds> {
    let bounds = TimeBounds {
        min: args.start.as_deref().map(parse_instant).transpose()?,
        max: args.end.as_deref().map(parse_instant).transpose()?,
    };
    if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
        if min > max {
            bail!("--start must not be after --end");
        }
    }
    Ok(bounds)
}

fn bar_source(
    config: &FeedConfig,
    synthetic: bool,
    key: &WindowKey,
    bounds: &TimeBounds,
) -> Result<Arc<dyn BarSource>> {
    if !synthetic {
        return Ok(Arc::new(config.rest_client()?));
    }
    let end = bounds.max.unwrap_or_else(Utc::now);
    let start = bounds.min.unwrap_or(end - key.timeframe.chunk() * 4);
    let bars = InMemoryBarSource::synthetic_series(key.timeframe, start, end, 100.0);
    info!(%key, bars = bars.len(), "serving synthetic bars");
    Ok(Arc::new(
        InMemoryBarSource::new().with_bars(&key.symbol, key.timeframe, bars),
    ))
}

fn open_session(config: &FeedConfig, synthetic: bool, args: &WindowArgs) -> Result<ChartSession> {
    let bounds = bounds_of(args)?;
    let key = WindowKey::new(args.symbol.to_uppercase(), args.timeframe);
    let source = bar_source(config, synthetic, &key, &bounds)?;
    let mut session = ChartSession::new(
        source,
        key,
        bounds,
        config.gap_skip_policy(),
        config.debounce(),
    );

    if let Some(ApplyOutcome::Failed) = session.load_initial(bounds.max) {
        let err = session.window().last_error().unwrap_or("unknown error");
        bail!("initial load failed: {err}");
    }

    for page in 1..=args.more {
        match session.load_more() {
            Some(ApplyOutcome::Loaded { added }) => {
                info!(page, added, "loaded older page");
            }
            Some(ApplyOutcome::Failed) => {
                let err = session.window().last_error().unwrap_or("unknown error");
                eprintln!("Loading page {page} failed: {err}");
                break;
            }
            _ => {
                info!(page, "no more history");
                break;
            }
        }
    }
    Ok(session)
}

fn run_bars(config: &FeedConfig, synthetic: bool, args: &WindowArgs) -> Result<()> {
    let session = open_session(config, synthetic, args)?;
    let snapshot = session.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    print_window_summary(&snapshot);
    if snapshot.window.bars.is_empty() {
        return Ok(());
    }
    println!();
    println!(
        "{:<22} {:>10} {:>10} {:>10} {:>10} {:>12}",
        "Time", "Open", "High", "Low", "Close", "Volume"
    );
    println!("{}", "-".repeat(79));
    for bar in &snapshot.window.bars {
        println!(
            "{:<22} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12}",
            bar.timestamp.format("%Y-%m-%d %H:%M"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        );
    }
    Ok(())
}

fn run_markers(
    config: &FeedConfig,
    synthetic: bool,
    args: &WindowArgs,
    backtest: Option<String>,
    strategy: Option<String>,
) -> Result<()> {
    let scope = match (backtest, strategy) {
        (Some(id), None) => FillScope::Backtest(id),
        (None, Some(id)) => FillScope::Strategy(id),
        _ => bail!("one of --backtest or --strategy is required"),
    };

    let mut session = open_session(config, synthetic, args)?;
    let client = config.rest_client()?;
    let fills = session.load_fills(&client, &scope)?;
    let snapshot = session.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    print_window_summary(&snapshot);
    println!("Fills: {fills}");
    println!("Markers: {}", snapshot.markers.len());
    if snapshot.markers.is_empty() {
        return Ok(());
    }
    println!();
    println!("{:<22} {:<6} {:>10} {:<10}", "Bar", "Side", "Quantity", "Position");
    println!("{}", "-".repeat(51));
    for marker in &snapshot.markers {
        let time = DateTime::<Utc>::from_timestamp(marker.time, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| marker.time.to_string());
        let position = match marker.position {
            MarkerPosition::AboveBar => "above",
            MarkerPosition::BelowBar => "below",
        };
        println!(
            "{:<22} {:<6} {:>10} {:<10}",
            time,
            marker.side,
            marker.text,
            position
        );
    }
    Ok(())
}

/// Serve the symbol list from `cache`, dropping any cached copy first when
/// `refresh` is set.
fn load_symbols(cache: &SymbolCache, refresh: bool) -> Result<Arc<Vec<String>>, DataError> {
    if refresh {
        cache.invalidate();
    }
    cache.get()
}

fn run_symbols(config: &FeedConfig, refresh: bool) -> Result<()> {
    let cache = SymbolCache::new(Arc::new(config.rest_client()?));
    let symbols = load_symbols(&cache, refresh)?;

    println!("Tradable symbols: {}", symbols.len());
    for chunk in symbols.chunks(8) {
        let row: Vec<String> = chunk.iter().map(|s| format!("{s:<8}")).collect();
        println!("{}", row.join(" ").trim_end());
    }
    Ok(())
}

fn print_window_summary(snapshot: &SessionSnapshot) {
    let window = &snapshot.window;
    println!("Window: {}", window.key);
    println!("Status: {}", window.status);
    println!("Bars: {}", window.bars.len());
    if let (Some(first), Some(last)) = (window.earliest, window.latest) {
        println!(
            "Range: {} to {}",
            first.format("%Y-%m-%d %H:%M"),
            last.format("%Y-%m-%d %H:%M")
        );
    }
    println!("More history: {}", if window.has_more { "yes" } else { "no" });
    if let Some(err) = &window.error {
        println!("Error: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartfeed_core::data::AssetSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAssets(Arc<AtomicUsize>);

    impl AssetSource for CountingAssets {
        fn fetch_symbols(&self) -> Result<Vec<String>, DataError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["AAPL".into(), "MSFT".into()])
        }
    }

    #[test]
    fn parses_dates_and_rfc3339() {
        assert_eq!(
            parse_instant("2024-01-31").unwrap(),
            "2024-01-31T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            parse_instant("2024-01-31T15:30:00-05:00").unwrap(),
            "2024-01-31T20:30:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(parse_instant("31/01/2024").is_err());
    }

    #[test]
    fn synthetic_bars_command_loads_a_window() {
        let cli = Cli::parse_from([
            "chartfeed",
            "--synthetic",
            "bars",
            "--symbol",
            "spy",
            "--timeframe",
            "1Day",
            "--start",
            "2023-01-02",
            "--end",
            "2024-06-28",
            "--more",
            "2",
        ]);
        let Commands::Bars { window } = cli.command else {
            panic!("expected bars command");
        };
        let session = open_session(&FeedConfig::default(), cli.synthetic, &window).unwrap();
        let snap = session.snapshot();
        assert_eq!(snap.window.key.symbol, "SPY");
        assert_eq!(
            snap.window.earliest.unwrap(),
            parse_instant("2023-01-02").unwrap()
        );
        assert!(!snap.window.has_more);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let cli = Cli::parse_from([
            "chartfeed", "bars", "--symbol", "SPY", "--start", "2024-02-01", "--end", "2024-01-01",
        ]);
        let Commands::Bars { window } = cli.command else {
            panic!("expected bars command");
        };
        assert!(bounds_of(&window).is_err());
    }

    #[test]
    fn symbols_refresh_fetches_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = SymbolCache::new(Arc::new(CountingAssets(Arc::clone(&calls))));

        let symbols = load_symbols(&cache, true).unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        load_symbols(&cache, false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        load_symbols(&cache, true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
