//! CLI command tests

use std::fs;

use chrono::NaiveDate;
use clap::Parser;
use keihi_core::ledger::load;
use keihi_core::{
    AIClient, Category, Classifier, ExpenseRecord, ImageIngestor, LedgerStore, MockBackend,
    MockOcr, OcrClient, PromptLibrary, Purpose, ReceiptDirs, StopSignal,
};
use tempfile::TempDir;

use crate::cli::{Cli, Commands, LedgerCommands, OutputArgs, PromptsCommands};
use crate::commands::{self, format_yen, persist_records, run_interactive, select_records};

fn now() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 20)
        .unwrap()
        .and_hms_opt(18, 30, 5)
        .unwrap()
}

fn record(amount: u64, description: &str) -> ExpenseRecord {
    ExpenseRecord {
        category: Category::Transport,
        sub_category: None,
        amount,
        date: NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
        description: description.to_string(),
        purpose: Purpose::Business,
        is_valid: true,
        notes: String::new(),
        source_image: None,
    }
}

fn failed_record() -> ExpenseRecord {
    ExpenseRecord::service_error(NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(), "timeout")
}

fn mock_classifier() -> Classifier {
    Classifier::new(AIClient::mock(), PromptLibrary::embedded_only())
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_interactive_defaults() {
    let cli = Cli::try_parse_from(["keihi", "interactive"]).unwrap();
    assert!(!cli.debug);
    assert!(cli.config.is_none());
    match cli.command {
        Commands::Interactive { output } => {
            assert!(output.output.is_none());
            assert!(!output.append);
            assert!(!output.include_errors);
        }
        _ => panic!("expected interactive"),
    }
}

#[test]
fn test_parse_receipts_with_flags() {
    let cli = Cli::try_parse_from([
        "keihi",
        "receipts",
        "--pending",
        "in",
        "--processed",
        "done",
        "-o",
        "march.csv",
        "--append",
        "--debug",
    ])
    .unwrap();
    assert!(cli.debug);
    match cli.command {
        Commands::Receipts {
            pending,
            processed,
            output,
        } => {
            assert_eq!(pending.unwrap().to_str(), Some("in"));
            assert_eq!(processed.unwrap().to_str(), Some("done"));
            assert_eq!(output.output.unwrap().to_str(), Some("march.csv"));
            assert!(output.append);
        }
        _ => panic!("expected receipts"),
    }
}

#[test]
fn test_parse_global_config_before_subcommand() {
    let cli = Cli::try_parse_from(["keihi", "--config", "my.toml", "check"]).unwrap();
    assert_eq!(cli.config.unwrap().to_str(), Some("my.toml"));
    assert!(matches!(cli.command, Commands::Check));
}

#[test]
fn test_parse_nested_subcommands() {
    let cli = Cli::try_parse_from(["keihi", "ledger", "show", "out.csv"]).unwrap();
    match cli.command {
        Commands::Ledger(LedgerCommands::Show { path }) => {
            assert_eq!(path.to_str(), Some("out.csv"))
        }
        _ => panic!("expected ledger show"),
    }

    let cli = Cli::try_parse_from(["keihi", "prompts", "list"]).unwrap();
    assert!(matches!(cli.command, Commands::Prompts(PromptsCommands::List)));
}

#[test]
fn test_parse_rejects_unknown_mode() {
    assert!(Cli::try_parse_from(["keihi", "spreadsheet"]).is_err());
    assert!(Cli::try_parse_from(["keihi", "ledger", "show"]).is_err());
}

// ========== Shared Utility Tests ==========

#[test]
fn test_format_yen() {
    assert_eq!(format_yen(0), "0");
    assert_eq!(format_yen(999), "999");
    assert_eq!(format_yen(1500), "1,500");
    assert_eq!(format_yen(19800), "19,800");
    assert_eq!(format_yen(1234567), "1,234,567");
}

#[test]
fn test_select_records_skips_failures_by_default() {
    let records = vec![record(1500, "タクシー"), failed_record()];
    assert_eq!(select_records(&records, false).len(), 1);
    assert_eq!(select_records(&records, true).len(), 2);
}

#[test]
fn test_persist_records_write_then_append() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path(), "expense_report");
    let path = dir.path().join("march.csv");

    let mut output = OutputArgs {
        output: Some(path.clone()),
        ..OutputArgs::default()
    };
    let written = persist_records(
        &store,
        &[record(1500, "タクシー"), failed_record()],
        &output,
        now(),
    )
    .unwrap();
    assert_eq!(written.as_deref(), Some(path.as_path()));

    output.append = true;
    persist_records(&store, &[record(800, "バス")], &output, now()).unwrap();

    let table = load(&path).unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1].sequence, 2);
    assert_eq!(table.total, Some(2300));
}

#[test]
fn test_persist_records_default_location() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path().join("reports"), "expense_report");

    let written = persist_records(&store, &[record(1500, "タクシー")], &OutputArgs::default(), now())
        .unwrap()
        .unwrap();
    assert_eq!(
        written,
        dir.path()
            .join("reports")
            .join("expense_report_20240320_183005.xlsx")
    );
    assert_eq!(load(&written).unwrap().total, Some(1500));
}

#[test]
fn test_persist_records_nothing_to_write() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path(), "expense_report");
    let path = dir.path().join("empty.csv");
    let output = OutputArgs {
        output: Some(path.clone()),
        ..OutputArgs::default()
    };

    let written = persist_records(&store, &[failed_record()], &output, now()).unwrap();
    assert!(written.is_none());
    assert!(!path.exists());
}

#[test]
fn test_include_errors_writes_sentinels() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path(), "expense_report");
    let path = dir.path().join("all.csv");
    let output = OutputArgs {
        output: Some(path.clone()),
        include_errors: true,
        ..OutputArgs::default()
    };

    persist_records(&store, &[failed_record()], &output, now()).unwrap();
    let table = load(&path).unwrap();
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].entry.category, "エラー");
    assert_eq!(table.total, Some(0));
}

// ========== Interactive Tests ==========

#[tokio::test]
async fn test_interactive_stops_at_q() {
    let input = "タクシー代 2024-03-13 ¥1,500 東京駅から会社まで\n\nq\nランチ 800\n";
    let mut classifier = mock_classifier();

    let session = run_interactive(input.as_bytes(), &mut classifier)
        .await
        .unwrap();

    assert!(!session.outage);
    assert_eq!(session.records.len(), 1);
    let taxi = &session.records[0];
    assert_eq!(taxi.category, Category::Transport);
    assert_eq!(taxi.amount, 1500);
    assert_eq!(taxi.date, NaiveDate::from_ymd_opt(2024, 3, 13).unwrap());
}

#[tokio::test]
async fn test_interactive_reads_until_eof() {
    let input = "タクシー代 2024-03-13 1500\nホテル 2024-03-14 9800 出張";
    let mut classifier = mock_classifier();

    let session = run_interactive(input.as_bytes(), &mut classifier)
        .await
        .unwrap();

    assert_eq!(session.records.len(), 2);
    assert_eq!(session.records[1].category, Category::Lodging);
    assert_eq!(session.records[1].amount, 9800);
}

#[tokio::test]
async fn test_interactive_stops_on_outage() {
    let input = "a 100\nb 200\nc 300\nd 400\ne 500\n";
    let mut classifier = Classifier::new(
        AIClient::Mock(MockBackend::failing("connection refused")),
        PromptLibrary::embedded_only(),
    );

    let session = run_interactive(input.as_bytes(), &mut classifier)
        .await
        .unwrap();

    assert!(session.outage);
    assert_eq!(session.records.len(), 3);
    assert!(session.records.iter().all(|r| !r.is_valid));
}

// ========== Receipts Tests ==========

#[tokio::test]
async fn test_process_receipts_keeps_unreadable_files_pending() {
    let tmp = TempDir::new().unwrap();
    let dirs = ReceiptDirs::new(tmp.path().join("pending"), tmp.path().join("processed"));
    dirs.ensure().unwrap();
    fs::write(dirs.pending.join("001.jpg"), b"not an image").unwrap();
    fs::write(dirs.pending.join("notes.txt"), b"ignored").unwrap();

    let ingestor = ImageIngestor::new(dirs.clone(), OcrClient::Mock(MockOcr::new("合計 ¥500")));
    let store = LedgerStore::new(tmp.path(), "expense_report");
    let output = OutputArgs {
        output: Some(tmp.path().join("receipts.csv")),
        ..OutputArgs::default()
    };
    let mut classifier = mock_classifier();

    let report = commands::process_receipts(
        &ingestor,
        &mut classifier,
        &store,
        &output,
        &StopSignal::new(),
        now(),
    )
    .await
    .unwrap();

    assert!(report.records.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(dirs.pending.join("001.jpg").exists());
    assert!(!tmp.path().join("receipts.csv").exists());
}

fn receipt_png() -> Vec<u8> {
    let img = image::RgbImage::from_fn(8, 8, |x, _| {
        if x % 2 == 0 {
            image::Rgb([20, 20, 20])
        } else {
            image::Rgb([230, 230, 230])
        }
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

const TAXI_RECEIPT: &str = "タクシー 日本交通\n2024年3月13日\n合計 ¥1,500\n";

#[tokio::test]
async fn test_process_receipts_archives_after_save() {
    let tmp = TempDir::new().unwrap();
    let dirs = ReceiptDirs::new(tmp.path().join("pending"), tmp.path().join("processed"));
    dirs.ensure().unwrap();
    fs::write(dirs.pending.join("001.png"), receipt_png()).unwrap();

    let ingestor = ImageIngestor::new(dirs.clone(), OcrClient::Mock(MockOcr::new(TAXI_RECEIPT)));
    let store = LedgerStore::new(tmp.path(), "expense_report");
    let ledger = tmp.path().join("receipts.csv");
    let output = OutputArgs {
        output: Some(ledger.clone()),
        ..OutputArgs::default()
    };

    let report = commands::process_receipts(
        &ingestor,
        &mut mock_classifier(),
        &store,
        &output,
        &StopSignal::new(),
        now(),
    )
    .await
    .unwrap();

    assert_eq!(report.archived, 1);
    assert!(!dirs.pending.join("001.png").exists());
    assert!(dirs.processed.join("001.png").exists());
    let table = load(&ledger).unwrap();
    assert_eq!(table.total, Some(1500));
    assert!(table.rows[0].entry.source_image.ends_with("001.png"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_receipts_unwritable_ledger_keeps_receipts_pending() {
    let tmp = TempDir::new().unwrap();
    let dirs = ReceiptDirs::new(tmp.path().join("pending"), tmp.path().join("processed"));
    dirs.ensure().unwrap();
    fs::write(dirs.pending.join("001.png"), receipt_png()).unwrap();
    let blocker = tmp.path().join("blocker_file");
    fs::write(&blocker, b"").unwrap();

    let ingestor = ImageIngestor::new(dirs.clone(), OcrClient::Mock(MockOcr::new(TAXI_RECEIPT)));
    let store = LedgerStore::new(tmp.path(), "expense_report");
    let output = OutputArgs {
        output: Some(blocker.join("ledger.csv")),
        ..OutputArgs::default()
    };

    let result = commands::process_receipts(
        &ingestor,
        &mut mock_classifier(),
        &store,
        &output,
        &StopSignal::new(),
        now(),
    )
    .await;

    assert!(result.is_err());
    assert!(dirs.pending.join("001.png").exists());
    assert!(!dirs.processed.join("001.png").exists());
}

#[tokio::test]
async fn test_process_receipts_fails_without_ocr() {
    let tmp = TempDir::new().unwrap();
    let dirs = ReceiptDirs::new(tmp.path().join("pending"), tmp.path().join("processed"));
    let ingestor = ImageIngestor::new(dirs, OcrClient::Mock(MockOcr::unavailable()));
    let store = LedgerStore::new(tmp.path(), "expense_report");
    let mut classifier = mock_classifier();

    let result = commands::process_receipts(
        &ingestor,
        &mut classifier,
        &store,
        &OutputArgs::default(),
        &StopSignal::new(),
        now(),
    )
    .await;
    assert!(result.is_err());
}

// ========== Ledger / Prompts Tests ==========

#[test]
fn test_cmd_ledger_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("show.csv");
    LedgerStore::new(dir.path(), "expense_report")
        .write(&[record(1500, "タクシー"), record(15000, "新幹線")], &path)
        .unwrap();

    assert!(commands::cmd_ledger_show(&path).is_ok());
}

#[test]
fn test_cmd_ledger_show_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(commands::cmd_ledger_show(&dir.path().join("missing.csv")).is_err());
}

#[test]
fn test_cmd_prompts_list() {
    assert!(commands::cmd_prompts_list().is_ok());
}
