use crate::commands::CommandResult;
use gingga_core::config::{AppConfig, LoadOptions};
use gingga_db::{connect_with_settings, migrations};

/// Outcome of one `migrate` run against the configured database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub newly_applied: Vec<(i64, String)>,
    pub already_present: usize,
}

impl MigrationReport {
    pub fn summary(&self) -> String {
        if self.newly_applied.is_empty() {
            return format!(
                "schema already up to date; {} gingga migrations present",
                self.already_present
            );
        }
        let applied = self
            .newly_applied
            .iter()
            .map(|(version, description)| format!("{version:04} {description}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "applied {} new migration(s) ({applied}); {} already present",
            self.newly_applied.len(),
            self.already_present
        )
    }
}

enum MigrateFailure {
    Connect(String),
    ReadState(String),
    Apply(String),
}

impl MigrateFailure {
    fn into_result(self) -> CommandResult {
        let (error_class, message, exit_code) = match self {
            Self::Connect(error) => {
                ("db_connectivity", format!("failed to connect to database: {error}"), 4)
            }
            Self::ReadState(error) => {
                ("migration", format!("failed to read migration state: {error}"), 5)
            }
            Self::Apply(error) => ("migration", format!("migration failed: {error}"), 5),
        };
        CommandResult::failure("migrate", error_class, message, exit_code)
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| MigrateFailure::Connect(error.to_string()))?;

        let pending = migrations::pending(&pool)
            .await
            .map_err(|error| MigrateFailure::ReadState(error.to_string()))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| MigrateFailure::Apply(error.to_string()))?;
        let applied = migrations::count_applied(&pool)
            .await
            .map_err(|error| MigrateFailure::ReadState(error.to_string()))?;
        pool.close().await;

        let already_present = (applied as usize).saturating_sub(pending.len());
        Ok::<MigrationReport, MigrateFailure>(MigrationReport {
            newly_applied: pending,
            already_present,
        })
    });

    match result {
        Ok(report) => CommandResult::success("migrate", report.summary()),
        Err(failure) => failure.into_result(),
    }
}
