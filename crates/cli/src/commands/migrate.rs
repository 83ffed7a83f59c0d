use crate::commands::{block_on, load_config, CommandResult};
use shopchat_core::config::LoadOptions;
use shopchat_db::{connection::connect_from_config, migrations};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("migrate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    if config.store.url.trim() == "memory" {
        return CommandResult::success("migrate", "in-memory store has no schema to migrate");
    }

    let result = block_on("migrate", async {
        let pool = connect_from_config(&config.store)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(Ok(())) => CommandResult::success("migrate", "applied pending migrations"),
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
        Err(failure) => failure,
    }
}
