use std::env;
use std::path::PathBuf;

use library::config::{config_path_from_env, load_or_create_config};
use library::{Library, LibrarySettings};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut erase = false;
    let mut clean = false;
    let mut root = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--erase" => erase = true,
            "--clean" => clean = true,
            _ => root = Some(PathBuf::from(arg)),
        }
    }

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let settings = LibrarySettings::from_config(&config_path, &config);
    let library = Library::open(settings)?;

    if erase {
        library.erase_library()?;
    }

    let report = match root {
        Some(root) => library.scan_media_files(&root)?,
        None => library.update_library(),
    };
    for issue in &report.issues {
        info!("{}", issue);
    }

    if clean {
        let swept = library.clean_dead_files()?;
        println!(
            "Removed: {} tracks, {} albums, {} artists, {} covers",
            swept.tracks, swept.albums, swept.artists, swept.covers
        );
    }

    let stats = library.stats()?;
    println!(
        "Scanned {} files ({} added): {} artists, {} albums, {} tracks, {} covers",
        report.processed, report.added, stats.artists, stats.albums, stats.tracks, stats.covers
    );

    Ok(())
}
