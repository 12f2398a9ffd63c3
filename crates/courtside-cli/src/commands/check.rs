use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use courtside::config::{Config, ProviderKind, StorageBackend};
use courtside::history::SqliteHistoryStore;
use courtside::provider::build_provider;
use serde::Serialize;

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

/// Value shipped in the sample environment file; never a real key
pub const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

#[derive(Parser)]
pub struct CheckCommand {
    #[clap(long, help = "Treat warnings as failures")]
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl CheckStatus {
    fn symbol(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

impl CheckCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let results = run_checks(config);

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Check", "Status", "Detail"]);

                for result in &results {
                    table.add_row([result.name, result.status.symbol(), result.detail.as_str()]);
                }

                println!("{table}");
            }
        }

        let failed = results.iter().any(|r| match r.status {
            CheckStatus::Fail => true,
            CheckStatus::Warn => self.strict,
            CheckStatus::Ok => false,
        });

        if failed {
            Err(CliError::from("Launch checks failed"))
        } else {
            Ok(())
        }
    }
}

/// Everything that must hold before the server can answer questions
pub fn run_checks(config: &Config) -> Vec<CheckResult> {
    vec![
        check_provider(config),
        check_credential(config),
        check_storage(config),
        check_moderation(config),
    ]
}

fn check_provider(config: &Config) -> CheckResult {
    match build_provider(&config.provider) {
        Ok(provider) => CheckResult::new(
            "provider",
            CheckStatus::Ok,
            format!("{} ({})", provider.name(), config.provider.kind.as_str()),
        ),
        Err(e) => CheckResult::new("provider", CheckStatus::Fail, e.to_string()),
    }
}

fn check_credential(config: &Config) -> CheckResult {
    let endpoint = config.provider.active_endpoint();
    let env_name = endpoint.api_key_env.clone().unwrap_or_default();

    match endpoint.api_key() {
        Some(key) if key.trim() == PLACEHOLDER_API_KEY => CheckResult::new(
            "credential",
            CheckStatus::Fail,
            format!("{env_name} still holds the placeholder value"),
        ),
        Some(_) => CheckResult::new("credential", CheckStatus::Ok, format!("{env_name} is set")),
        None if config.provider.kind == ProviderKind::Local => CheckResult::new(
            "credential",
            CheckStatus::Ok,
            "not required for local endpoints",
        ),
        None => CheckResult::new(
            "credential",
            CheckStatus::Fail,
            format!("{env_name} is not set"),
        ),
    }
}

fn check_storage(config: &Config) -> CheckResult {
    match config.storage.backend {
        StorageBackend::Memory => CheckResult::new(
            "storage",
            CheckStatus::Warn,
            "in-memory history is lost on restart",
        ),
        StorageBackend::Sqlite => {
            let path = &config.storage.database_path;
            match SqliteHistoryStore::open(path) {
                Ok(_) => CheckResult::new("storage", CheckStatus::Ok, path.display().to_string()),
                Err(e) => CheckResult::new("storage", CheckStatus::Fail, e.to_string()),
            }
        }
    }
}

fn check_moderation(config: &Config) -> CheckResult {
    let moderation = &config.moderation;
    if !moderation.enabled {
        return CheckResult::new("moderation", CheckStatus::Ok, "disabled");
    }

    match std::env::var(&moderation.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            CheckResult::new("moderation", CheckStatus::Ok, moderation.api_url.clone())
        }
        _ => CheckResult::new(
            "moderation",
            CheckStatus::Warn,
            format!(
                "{} is not set; questions will not be moderated",
                moderation.api_key_env
            ),
        ),
    }
}
