use std::path::Path;

use crate::commands::{block_on_runtime, CommandResult};
use parley_core::config::{AppConfig, LoadOptions};
use parley_db::{
    connect_with_config, load_ruleset_seed, migrations, seed_rulesets, SeedResult,
    SqlRulesetStore,
};

pub fn run(file: &Path) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    // Reject a bad file before touching the database.
    let rulesets = match load_ruleset_seed(file) {
        Ok(rulesets) => rulesets,
        Err(error) => return CommandResult::failure("seed", "seed_file", error.to_string(), 7),
    };

    let runtime = match block_on_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = seed_rulesets(&SqlRulesetStore::new(pool.clone()), rulesets)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8));

        pool.close().await;
        seeded
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(file, &seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(file: &Path, seeded: &SeedResult) -> String {
    format!(
        "seeded {} ruleset(s) from {}: {}",
        seeded.rulesets_saved,
        file.display(),
        seeded.names.join(", ")
    )
}
