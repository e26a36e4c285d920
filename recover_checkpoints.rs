use clap::{Arg, ArgAction, Command};
use phish_guard::batch::checkpoint;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let matches = Command::new("recover-checkpoints")
        .about("Inspect batch extraction checkpoints and recover the latest one")
        .arg(
            Arg::new("dir")
                .value_name("DIR")
                .help("Directory holding checkpoint_features_<N>.csv files")
                .default_value("."),
        )
        .arg(
            Arg::new("last-index")
                .long("last-index")
                .help("Only print the index to resume from")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let dir = PathBuf::from(
        matches
            .get_one::<String>("dir")
            .map(String::as_str)
            .unwrap_or("."),
    );

    if matches.get_flag("last-index") {
        println!("{}", checkpoint::last_processed_index(&dir)?);
        return Ok(());
    }

    let files = checkpoint::discover(&dir)?;
    if files.is_empty() {
        println!("No checkpoint files found in {}", dir.display());
        return Ok(());
    }

    println!("Found {} checkpoint files:", files.len());
    for file in &files {
        let validation = checkpoint::validate(file);
        let size = std::fs::metadata(&file.path).map(|m| m.len()).unwrap_or(0);
        if validation.is_valid() {
            println!(
                "  {}: {} rows, {:.1}MB",
                file.path.display(),
                validation.rows,
                size as f64 / 1024.0 / 1024.0
            );
        } else {
            println!("  {}: INVALID", file.path.display());
            for problem in &validation.problems {
                println!("    - {problem}");
            }
        }
    }

    if let Some(report) = checkpoint::recover(&dir)? {
        println!();
        println!("Using latest checkpoint: {}", report.source.path.display());
        println!(
            "Recovered {} rows ({} legitimate, {} phishing) into {}",
            report.rows,
            report.labels.legitimate,
            report.labels.phishing,
            report.output.display()
        );
        println!("Resume from index: {}", report.source.count);
    }

    Ok(())
}
