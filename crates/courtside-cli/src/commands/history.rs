use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use courtside::history::{HistoryStore, SqliteHistoryStore};
use courtside::identity::Identity;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct HistoryCommand {
    #[clap(long, short, help = "Show exchanges of this session (lists sessions if omitted)")]
    pub session: Option<String>,

    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of exchanges to display"
    )]
    pub limit: usize,
}

impl HistoryCommand {
    pub async fn execute(&self, store: &SqliteHistoryStore, format: OutputFormat) -> CliResult<()> {
        match &self.session {
            Some(session) => {
                let identity = Identity::try_from(session.as_str())?;
                self.show_session(store, &identity, format).await
            }
            None => self.list_sessions(store, format).await,
        }
    }

    async fn show_session(
        &self,
        store: &SqliteHistoryStore,
        identity: &Identity,
        format: OutputFormat,
    ) -> CliResult<()> {
        // Newest first, like the HTTP history endpoint
        let mut exchanges = store.list_recent(identity, self.limit).await?;
        exchanges.reverse();

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&exchanges)?);
            }
            OutputFormat::Table => {
                if exchanges.is_empty() {
                    println!("No exchanges for session {identity}.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Time", "Question", "Answer"]);

                for exchange in &exchanges {
                    table.add_row([
                        format_timestamp(&exchange.created_at),
                        truncate_string(&exchange.question, 60),
                        truncate_string(&exchange.answer, 80),
                    ]);
                }

                println!("{table}");
                println!("\nShowing {} exchanges", exchanges.len());
            }
        }

        Ok(())
    }

    async fn list_sessions(&self, store: &SqliteHistoryStore, format: OutputFormat) -> CliResult<()> {
        let sessions = store.session_summaries().await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = sessions
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "session": s.identity,
                            "language": s.language,
                            "exchanges": s.exchange_count,
                            "last_activity": s.last_activity.map(|t| t.to_rfc3339()),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if sessions.is_empty() {
                    println!("No sessions found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Session", "Language", "Exchanges", "Last Activity"]);

                for session in sessions.iter().take(self.limit) {
                    table.add_row([
                        session.identity.clone(),
                        session.language.clone(),
                        session.exchange_count.to_string(),
                        session
                            .last_activity
                            .as_ref()
                            .map(format_timestamp)
                            .unwrap_or_else(|| "-".to_string()),
                    ]);
                }

                println!("{table}");
                println!("\n{} sessions", sessions.len());
            }
        }

        Ok(())
    }
}
