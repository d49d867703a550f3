//! Fixture Generator Binary
//!
//! Writes the fixture corpus to `TUF_FIXTURES_OUTPUT_DIR`.

use std::process;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use tuf_fixtures::{Corpus, GeneratorConfig};

fn main() {
    let config = match GeneratorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tuf-fixtures: {e}");
            process::exit(2);
        }
    };

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!(
        output_dir = %config.output_dir.display(),
        epoch = config.epoch,
        seed = %config.key_seed,
        only = ?config.only,
        "Generating fixtures"
    );

    let started = Instant::now();
    let result = config.clock().and_then(|clock| {
        Corpus::new(&config.output_dir, config.key_seed.clone(), clock).build_all(config.only.as_deref())
    });

    match result {
        Ok(built) => info!(
            fixtures = built.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fixture generation complete"
        ),
        Err(e) => {
            error!(error = %e, "Fixture generation failed");
            process::exit(1);
        }
    }
}
