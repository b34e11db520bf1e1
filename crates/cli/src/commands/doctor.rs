use gingga_core::config::{AppConfig, LlmProvider, LoadOptions};
use gingga_db::{connect_with_settings, migrations};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug)]
struct DoctorReport {
    passed: bool,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(LoadOptions::default());

    if json_output {
        let checks = serde_json::to_value(&report.checks).unwrap_or_default();
        let error_class = (!report.passed).then_some("readiness");
        return CommandResult::with_checks("doctor", error_class, report.summary, checks);
    }

    CommandResult { exit_code: if report.passed { 0 } else { 1 }, output: render_human(&report) }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_provider(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_provider", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let passed = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let summary = if passed {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { passed, summary, checks }
}

/// Settings were validated on load; this reports where turns will be sent.
fn check_llm_provider(config: &AppConfig) -> DoctorCheck {
    let endpoint = match (&config.llm.base_url, config.llm.provider) {
        (Some(url), _) => url.clone(),
        (None, LlmProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
        (None, LlmProvider::Anthropic) => "https://api.anthropic.com".to_string(),
        (None, LlmProvider::Ollama) => "<unset>".to_string(),
    };
    DoctorCheck {
        name: "llm_provider",
        status: CheckStatus::Pass,
        details: format!(
            "{:?} model `{}` via {endpoint} (timeout {}s, {} retries)",
            config.llm.provider, config.llm.model, config.llm.timeout_secs, config.llm.max_retries
        ),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let known = migrations::known_count() as i64;
        let applied = migrations::count_applied(&pool)
            .await
            .map_err(|error| format!("failed to read migration state: {error}"))?;

        pool.close().await;
        Ok::<(i64, i64), String>((applied, known))
    });

    match result {
        Ok((applied, known)) if applied >= known => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!(
                "connected using `{}`; {applied}/{known} migrations applied",
                config.database.url
            ),
        },
        Ok((applied, known)) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Fail,
            details: format!("{applied}/{known} migrations applied; run `gingga migrate`"),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
