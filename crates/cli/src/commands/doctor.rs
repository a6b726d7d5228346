use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::CommandResult;
use deskbot_core::config::{AppConfig, HistoryBackend, LoadOptions};
use deskbot_db::{connect_with_settings, migrations};

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

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 6 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_credentials", "database_connectivity", "migration_state"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    // Non-emptiness is already enforced by config validation; this check
    // surfaces what the completion client will actually use.
    let key = config.llm.api_key.expose_secret();
    if key.trim().len() < 8 {
        return DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Fail,
            details: "llm.api_key looks truncated (fewer than 8 characters)".to_string(),
        };
    }

    DoctorCheck {
        name: "llm_credentials",
        status: CheckStatus::Pass,
        details: format!(
            "api key present for model `{}` at `{}`",
            config.llm.model, config.llm.base_url
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    if config.history.backend == HistoryBackend::Memory {
        return vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "history backend is in-memory; database unused".to_string(),
            },
            DoctorCheck {
                name: "migration_state",
                status: CheckStatus::Skipped,
                details: "history backend is in-memory; database unused".to_string(),
            },
        ];
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: details.clone(),
                },
                DoctorCheck { name: "migration_state", status: CheckStatus::Skipped, details },
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "migration_state",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };

        let migration_state = match migrations::is_schema_current(&pool).await {
            Ok(true) => DoctorCheck {
                name: "migration_state",
                status: CheckStatus::Pass,
                details: "all bundled migrations are applied".to_string(),
            },
            Ok(false) => DoctorCheck {
                name: "migration_state",
                status: CheckStatus::Fail,
                details: "schema is behind the bundled migrations; run `deskbot migrate`"
                    .to_string(),
            },
            Err(error) => DoctorCheck {
                name: "migration_state",
                status: CheckStatus::Fail,
                details: format!("failed to inspect migration state: {error}"),
            },
        };

        pool.close().await;
        vec![connectivity, migration_state]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
