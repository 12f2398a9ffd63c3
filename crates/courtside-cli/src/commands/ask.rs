use clap::Parser;
use courtside::config::Config;
use courtside::history::open_store;
use courtside::identity::Identity;
use courtside::{Caller, ResponseOrchestrator};

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct AskCommand {
    #[clap(help = "Question to ask")]
    pub question: String,

    #[clap(long, short, help = "Session id to continue (a new one is created if omitted)")]
    pub session: Option<String>,
}

impl AskCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let identity = match &self.session {
            Some(session) => Identity::try_from(session.as_str())?,
            None => Identity::generate(),
        };

        let store = open_store(&config.storage)?;
        let orchestrator = ResponseOrchestrator::from_config(config)?;
        let caller = Caller::new(identity.clone()).with_source("cli");

        let (answer, exchange) = orchestrator
            .handle_and_record(&caller, &self.question, store.as_ref())
            .await
            .map_err(|rejection| CliError(rejection.user_message().to_string()))?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "session": identity.as_str(),
                    "answer": answer.text,
                    "failure": answer.failure_kind().map(|k| k.as_str()),
                    "chat_id": exchange.as_ref().map(|e| e.chat_id.to_string()),
                    "timestamp": exchange.as_ref().map(|e| e.created_at.to_rfc3339()),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("{}\n", answer.text);
                match &exchange {
                    Some(exchange) => println!(
                        "Session: {}  ({})",
                        identity,
                        format_timestamp(&exchange.created_at)
                    ),
                    None => println!("Session: {identity}  (not saved)"),
                }
            }
        }

        Ok(())
    }
}
