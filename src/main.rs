use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use phish_guard::batch::{checkpoint, BatchRunner};
use phish_guard::fetcher::HttpFetcher;
use phish_guard::{AppContext, Config, FeatureEngine};
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("phish-guard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing URL classifier combining curated lists, page heuristics and a model")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phish-guard.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Load the configuration, list store and model, then exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .value_name("URL")
                .help("Classify an address and print the verdict as JSON")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("features")
                .long("features")
                .value_name("URL")
                .help("Fetch an address and print its feature vector")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .help("Run offline feature extraction over the labelled dataset")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .value_name("N")
                .help("Resume the batch from checkpoint_features_<N>.csv")
                .value_parser(clap::value_parser!(usize))
                .requires("batch")
                .conflicts_with("resume"),
        )
        .arg(
            Arg::new("resume")
                .long("resume")
                .help("Resume the batch from the latest checkpoint")
                .requires("batch")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("last-index")
                .long("last-index")
                .help("Print the index the batch would resume from")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("recover")
                .long("recover")
                .help("Write the latest checkpoint to recovered_features_final.csv")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/phish-guard.yaml");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        test_config(config);
        return;
    }

    if matches.get_flag("last-index") {
        match checkpoint::last_processed_index(&config.batch.output_dir()) {
            Ok(index) => println!("Last processed index: {index}"),
            Err(e) => fail("Cannot inspect checkpoints", e),
        }
        return;
    }

    if matches.get_flag("recover") {
        match checkpoint::recover(&config.batch.output_dir()) {
            Ok(Some(report)) => print_recovery(&report),
            Ok(None) => println!("No checkpoint files found"),
            Err(e) => fail("Recovery failed", e),
        }
        return;
    }

    if let Some(url) = matches.get_one::<String>("features") {
        show_features(&config, url).await;
        return;
    }

    if let Some(url) = matches.get_one::<String>("check") {
        check_url(config, url).await;
        return;
    }

    if matches.get_flag("batch") {
        let start = if matches.get_flag("resume") {
            match checkpoint::last_processed_index(&config.batch.output_dir()) {
                Ok(index) => index,
                Err(e) => fail("Cannot inspect checkpoints", e),
            }
        } else {
            matches.get_one::<usize>("start").copied().unwrap_or(0)
        };
        run_batch(&config, start).await;
        return;
    }

    eprintln!("Nothing to do; see --help");
    process::exit(2);
}

fn fail(what: &str, error: anyhow::Error) -> ! {
    eprintln!("❌ {what}: {error:#}");
    process::exit(1);
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    match Config::default().to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: Config) {
    println!("🔍 Testing configuration...");
    println!("List store: {}", config.store_path);
    println!(
        "Model: {}",
        config.model_path.as_deref().unwrap_or("(none, model stage disabled)")
    );
    println!("Dataset key shape: {:?}", config.dataset_key_shape);

    match AppContext::from_config(config) {
        Ok(_) => println!("✅ Configuration is valid"),
        Err(e) => fail("Configuration validation failed", e),
    }
}

async fn check_url(config: Config, url: &str) {
    let ctx = match AppContext::from_config(config) {
        Ok(ctx) => ctx,
        Err(e) => fail("Startup failed", e),
    };

    match ctx.decision_engine().evaluate(url).await {
        Ok(verdict) => match verdict.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => fail("Cannot serialize verdict", e.into()),
        },
        Err(e) => fail("Store unavailable", e.into()),
    }
}

async fn show_features(config: &Config, url: &str) {
    let fetcher = match HttpFetcher::new(&config.fetch) {
        Ok(fetcher) => fetcher,
        Err(e) => fail("Failed to build HTTP client", e.into()),
    };

    let extraction = FeatureEngine::new()
        .extract_live(&fetcher, url, config.fetch.timeout())
        .await;

    println!("Features for {url}");
    println!(
        "Document: {}",
        if extraction.document_available {
            "fetched"
        } else {
            "unavailable"
        }
    );
    for (name, value) in extraction.vector.named() {
        println!("  {name:<20} {value:>2}");
    }
    if !extraction.fallbacks.is_empty() {
        let names: Vec<&str> = extraction.fallbacks.iter().map(|h| h.name()).collect();
        println!("Defaults used: {}", names.join(", "));
    }
}

async fn run_batch(config: &Config, start: usize) {
    let fetcher = match HttpFetcher::new(&config.fetch) {
        Ok(fetcher) => fetcher,
        Err(e) => fail("Failed to build HTTP client", e.into()),
    };
    let engine = FeatureEngine::new();
    let runner = BatchRunner::new(&config.batch, &engine, &fetcher);

    let items = match runner.load_sample() {
        Ok(items) => items,
        Err(e) => fail("Cannot load dataset", e),
    };

    match runner.run(&items, start).await {
        Ok(summary) => {
            println!("✅ Extracted {} rows into {}", summary.processed, summary.output.display());
            println!(
                "Labels: {} legitimate, {} phishing ({} failed items)",
                summary.labels.legitimate, summary.labels.phishing, summary.failed
            );
        }
        Err(e) => fail("Batch extraction failed", e),
    }
}

fn print_recovery(report: &checkpoint::RecoveryReport) {
    println!("Using checkpoint: {}", report.source.path.display());
    println!("Rows: {}", report.rows);
    println!(
        "Labels: {} legitimate, {} phishing",
        report.labels.legitimate, report.labels.phishing
    );
    println!("Written to {}", report.output.display());
}
