#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use meterline_core::kinds;
use meterline_gateway::config::{BillingSection, ChannelSection};
use meterline_gateway::metering::{BalancePolicy, JournalRecord, UsageJournal, UsageMeteringService};
use meterline_gateway::obs::MeterMetrics;

fn billing(path: &std::path::Path) -> BillingSection {
    BillingSection {
        journal_path: Some(path.to_string_lossy().into_owned()),
        ..BillingSection::default()
    }
}

async fn open(b: &BillingSection) -> UsageMeteringService {
    UsageMeteringService::from_config(b, &ChannelSection::default(), Arc::new(MeterMetrics::default()))
        .await
        .expect("service must start")
}

#[tokio::test]
async fn restart_restores_balances_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let b = billing(&dir.path().join("journal.jsonl"));

    let before = {
        let svc = open(&b).await;
        svc.track_usage("alice", kinds::QUESTION, "q1").await.unwrap();
        svc.track_usage("alice", kinds::REPORT, "r1").await.unwrap();
        svc.track_usage("bob", kinds::FILE_UPLOAD, "f1").await.unwrap();
        // opened but never debited
        svc.usage_stats("carol").await.unwrap();
        svc.history("alice").await.unwrap()
    };

    let svc = open(&b).await;
    assert_eq!(svc.ledger().account_count(), 3);
    assert_eq!(svc.ledger().policy(), BalancePolicy::EnforceFloor);
    assert_eq!(svc.history("alice").await.unwrap(), before);

    let alice = svc.usage_stats("alice").await.unwrap();
    assert_eq!(alice.credits_remaining, 6);
    assert_eq!(alice.total_questions, 1);
    assert_eq!(alice.total_reports, 1);
    assert_eq!(svc.usage_stats("bob").await.unwrap().credits_remaining, 9);
    assert_eq!(svc.usage_stats("carol").await.unwrap().credits_remaining, 10);

    // keeps appending after restore
    svc.track_usage("alice", kinds::QUESTION, "q2").await.unwrap();
    drop(svc);
    let svc = open(&b).await;
    assert_eq!(svc.usage_stats("alice").await.unwrap().credits_remaining, 5);
}

#[tokio::test]
async fn refused_debits_are_not_journaled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let b = BillingSection {
        starting_balance: 1,
        ..billing(&path)
    };

    let svc = open(&b).await;
    assert!(svc.track_usage("alice", kinds::REPORT, "r").await.is_err());
    drop(svc);

    let records = UsageJournal::replay(&path).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0], JournalRecord::Account(_)));
}

#[tokio::test]
async fn torn_tail_is_dropped_and_later_debits_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let b = billing(&path);

    {
        let svc = open(&b).await;
        svc.track_usage("alice", kinds::QUESTION, "q").await.unwrap();
    }
    let mut f = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
    f.write_all(br#"{"rec":"usage","id":"trunc"#).await.unwrap();
    f.flush().await.unwrap();
    drop(f);

    {
        let svc = open(&b).await;
        assert_eq!(svc.usage_stats("alice").await.unwrap().credits_remaining, 9);
        svc.track_usage("alice", kinds::QUESTION, "q2").await.unwrap();
    }

    let svc = open(&b).await;
    let stats = svc.usage_stats("alice").await.unwrap();
    assert_eq!(stats.credits_remaining, 8);
    assert_eq!(stats.total_questions, 2);
    let last = svc.history("alice").await.unwrap().pop().unwrap();
    assert_eq!(last.description, "q2");
}

#[tokio::test]
async fn corrupt_middle_line_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    tokio::fs::write(&path, "not json\n{\"rec\":\"account\"}\n").await.unwrap();

    let res = UsageMeteringService::from_config(
        &billing(&path),
        &ChannelSection::default(),
        Arc::new(MeterMetrics::default()),
    )
    .await;
    let err = res.err().expect("replay must fail");
    assert_eq!(err.client_code().as_str(), "INTERNAL");
}

#[tokio::test]
async fn missing_file_is_an_empty_journal() {
    let dir = tempfile::tempdir().unwrap();
    let records = UsageJournal::replay(dir.path().join("absent.jsonl")).await.unwrap();
    assert!(records.is_empty());
}
