use dokan_core::config::{AppConfig, LlmProvider, LoadOptions};
use dokan_db::{connect, migrations};
use serde::Serialize;

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

const DEPENDENT_CHECKS: [&str; 4] =
    ["llm_readiness", "conversation_timing", "database_connectivity", "schema_migrations"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
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
            checks.push(check_llm_readiness(&config));
            checks.push(check_conversation_timing(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let details = match config.llm.provider {
        LlmProvider::OpenAi => format!(
            "openai model `{}` with {} api key(s); later keys are fallbacks",
            config.llm.model,
            config.llm.api_keys.len()
        ),
        LlmProvider::Ollama => format!(
            "ollama model `{}` at {}",
            config.llm.model,
            config.llm.base_url.as_deref().unwrap_or("<unset>")
        ),
    };
    DoctorCheck { name: "llm_readiness", status: CheckStatus::Pass, details }
}

/// A sweep interval longer than the idle threshold makes follow-ups arrive late by up to
/// one interval; a quiet window longer than the dedup TTL lets redelivered events through.
fn check_conversation_timing(config: &AppConfig) -> DoctorCheck {
    let conversation = &config.conversation;
    let idle_secs = conversation.followup_after_mins.saturating_mul(60);
    let mut problems = Vec::new();
    if conversation.followup_sweep_secs > idle_secs {
        problems.push(format!(
            "follow-up sweep every {}s is coarser than the {}min idle threshold",
            conversation.followup_sweep_secs, conversation.followup_after_mins
        ));
    }
    if conversation.quiet_window() >= conversation.dedup_ttl() {
        problems.push(format!(
            "quiet window {}ms is not shorter than the {}s dedup ttl",
            conversation.quiet_window_ms, conversation.dedup_ttl_secs
        ));
    }

    if problems.is_empty() {
        DoctorCheck {
            name: "conversation_timing",
            status: CheckStatus::Pass,
            details: format!(
                "turns close after {}ms of quiet; idle orders nudged after {}min",
                conversation.quiet_window_ms, conversation.followup_after_mins
            ),
        }
    } else {
        DoctorCheck {
            name: "conversation_timing",
            status: CheckStatus::Fail,
            details: problems.join("; "),
        }
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "schema_migrations",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let expected = migrations::embedded_count();
        let applied = migrations::applied_count(&pool).await.unwrap_or(0);
        pool.close().await;

        let schema = if applied >= expected {
            DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Pass,
                details: format!("{applied} of {expected} migration(s) applied"),
            }
        } else {
            DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Fail,
                details: format!(
                    "{applied} of {expected} migration(s) applied; run `dokan migrate`"
                ),
            }
        };

        vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            schema,
        ]
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

#[cfg(test)]
mod tests {
    use dokan_core::config::AppConfig;

    use super::{check_conversation_timing, CheckStatus};

    #[test]
    fn default_timings_pass() {
        let check = check_conversation_timing(&AppConfig::default());
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn coarse_sweep_and_long_quiet_window_are_both_reported() {
        let mut config = AppConfig::default();
        config.conversation.followup_after_mins = 5;
        config.conversation.followup_sweep_secs = 900;
        config.conversation.quiet_window_ms = 60_000;
        config.conversation.dedup_ttl_secs = 30;

        let check = check_conversation_timing(&config);

        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.details.contains("coarser than the 5min idle threshold"));
        assert!(check.details.contains("not shorter than the 30s dedup ttl"));
    }
}
