//! Interactive expense entry

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use keihi_core::{extract_interactive, Classifier, ExpenseRecord, LedgerStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::core::{build_classifier, load_config, outage_error, persist_records};
use crate::cli::OutputArgs;

/// Records classified during one interactive session
#[derive(Debug, Default)]
pub struct InteractiveSession {
    pub records: Vec<ExpenseRecord>,
    /// Reading stopped because the backend kept failing
    pub outage: bool,
}

/// Read entries from stdin, classify them and save the ledger
pub async fn cmd_interactive(config_path: Option<&Path>, output: &OutputArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let mut classifier = build_classifier(&config)?;

    println!("経費データを入力してください（終了するには 'q' を入力）");
    println!("形式: 項目名 日付 金額 詳細説明\n");

    let stdin = BufReader::new(tokio::io::stdin());
    let session = run_interactive(stdin, &mut classifier).await?;

    let store = LedgerStore::from_config(&config.ledger);
    persist_records(&store, &session.records, output, Local::now().naive_local())?;

    if session.outage {
        return Err(outage_error(&classifier));
    }
    Ok(())
}

/// Classify one entry per line until `q` or end of input
pub async fn run_interactive<R>(reader: R, classifier: &mut Classifier) -> Result<InteractiveSession>
where
    R: AsyncBufRead + Unpin,
{
    let mut session = InteractiveSession::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("q") {
            break;
        }

        let candidate = extract_interactive(line);
        debug!(?candidate, "Extracted entry");
        let record = classifier.classify(&candidate).await;

        if record.is_valid {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            println!("⚠️  {}: {}", record.description, record.notes);
        }
        session.records.push(record);

        if classifier.outage_detected() {
            warn!(
                consecutive = classifier.consecutive_failures(),
                "Classification backend unavailable, stopping input"
            );
            session.outage = true;
            break;
        }
    }

    Ok(session)
}
