//! End-to-end tests for the Gmail triage loop against mocked Gmail and
//! Perplexity endpoints, with a throwaway SQLite database.

mod test_support;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use mockito::{Matcher, Server};
use serial_test::serial;
use tempfile::TempDir;

use providers_module::perplexity::PerplexityClient;
use test_support::EnvGuard;
use triage_module::account_store::{AccountStore, GmailAccount};
use triage_module::classifier::Classifier;
use triage_module::email_log_store::{EmailLogStore, NewEmailLog, Priority};
use triage_module::pipeline::gmail::{SUMMARY_EMAIL_SKIP, LABEL_NEEDS_RESPONSE, LABEL_PROCESSED};
use triage_module::pipeline::TriagePipeline;
use triage_module::rule_store::{RuleStore, RuleType};
use triage_module::run_store::RunStore;

struct Fixture {
    _temp: TempDir,
    runs: RunStore,
    accounts: AccountStore,
    rules: RuleStore,
    email_logs: EmailLogStore,
    classifier: Classifier,
}

fn fixture(server: &Server) -> (Fixture, Vec<EnvGuard>) {
    let guards = vec![
        EnvGuard::set("GOOGLE_ACCESS_TOKEN", "ya29.test"),
        EnvGuard::set("GMAIL_API_BASE_URL", &server.url()),
        EnvGuard::set("PERPLEXITY_API_KEY", "pplx-test"),
        EnvGuard::set("PERPLEXITY_API_BASE_URL", &server.url()),
    ];
    let temp = TempDir::new().expect("tempdir");
    let db = temp.path().join("triage.db");
    let fixture = Fixture {
        runs: RunStore::new(&db).expect("runs"),
        accounts: AccountStore::new(&db).expect("accounts"),
        rules: RuleStore::new(&db).expect("rules"),
        email_logs: EmailLogStore::new(&db).expect("email logs"),
        classifier: Classifier::new(
            PerplexityClient::from_env().expect("perplexity"),
            "sonar",
        ),
        _temp: temp,
    };
    fixture
        .accounts
        .upsert_account(&GmailAccount {
            id: "acct-1".to_string(),
            email_address: "ops@example.test".to_string(),
            display_name: Some("Ops".to_string()),
            signature: Some("-- Ops".to_string()),
            lookback_days: None,
            is_enabled: true,
        })
        .expect("account");
    (fixture, guards)
}

fn pipeline(f: &Fixture) -> TriagePipeline<'_> {
    TriagePipeline {
        classifier: &f.classifier,
        runs: &f.runs,
        accounts: &f.accounts,
        rules: &f.rules,
        email_logs: &f.email_logs,
        lookback_days: 3,
    }
}

/// Mocks for the list and labels calls every triage pass makes.
fn mock_inbox(server: &mut Server, message_ids: &[&str]) -> (mockito::Mock, mockito::Mock) {
    let messages: Vec<_> = message_ids
        .iter()
        .map(|id| serde_json::json!({"id": id, "threadId": format!("t-{id}")}))
        .collect();
    let list = server
        .mock("GET", "/users/me/messages")
        .match_query(Matcher::UrlEncoded(
            "q".into(),
            "in:inbox newer_than:3d".into(),
        ))
        .with_status(200)
        .with_body(serde_json::json!({ "messages": messages }).to_string())
        .create();
    let labels = server
        .mock("GET", "/users/me/labels")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "labels": [
                    {"id": "L1", "name": LABEL_PROCESSED},
                    {"id": "L2", "name": LABEL_NEEDS_RESPONSE},
                ]
            })
            .to_string(),
        )
        .create();
    (list, labels)
}

fn mock_message(server: &mut Server, id: &str, from: &str, subject: &str, body: &str) -> mockito::Mock {
    let payload = serde_json::json!({
        "id": id,
        "threadId": format!("t-{id}"),
        "labelIds": ["INBOX"],
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                {"name": "Subject", "value": subject},
                {"name": "From", "value": from},
                {"name": "To", "value": "ops@example.test"},
                {"name": "Message-ID", "value": format!("<{id}@mail.test>")},
            ],
            "body": {"data": URL_SAFE_NO_PAD.encode(body.as_bytes())},
        }
    });
    server
        .mock("GET", format!("/users/me/messages/{id}").as_str())
        .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
        .with_status(200)
        .with_body(payload.to_string())
        .create()
}

fn completion_body(verdict: serde_json::Value) -> String {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": verdict.to_string()}}]
    })
    .to_string()
}

#[test]
#[serial]
fn triage_labels_logs_and_creates_threaded_draft() {
    let mut server = Server::new();
    let (f, _guards) = fixture(&server);
    mock_inbox(&mut server, &["m1"]);
    mock_message(
        &mut server,
        "m1",
        "Billing <billing@acme.test>",
        "Invoice overdue",
        "Please pay invoice 42 soon.",
    );
    let _completion = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("Invoice overdue".to_string()))
        .with_status(200)
        .with_body(completion_body(serde_json::json!({
            "summary": "Vendor asking for payment of invoice 42.",
            "labels": ["billing"],
            "needs_response": true,
            "priority": "high",
            "draft_reply": "Payment went out yesterday.",
        })))
        .expect(1)
        .create();
    let draft = server
        .mock("POST", "/users/me/drafts")
        .match_body(Matcher::Regex("\"threadId\":\"t-m1\"".to_string()))
        .with_status(200)
        .with_body(r#"{"id":"d1"}"#)
        .expect(1)
        .create();
    let modify = server
        .mock("POST", "/users/me/messages/m1/modify")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("\"L1\"".to_string()),
            Matcher::Regex("\"L2\"".to_string()),
        ]))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();

    let report = pipeline(&f).execute().expect("triage");
    assert_eq!(report.processed, 1);
    assert_eq!(report.drafts_created, 1);
    assert_eq!(report.skipped_by_rule, 0);
    assert_eq!(report.errors_count, 0);
    draft.assert();
    modify.assert();

    let logs = f.email_logs.list_for_account("acct-1", 10).expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].gmail_message_id, "m1");
    assert!(logs[0].needs_response);
    assert!(logs[0].draft_created);
    assert_eq!(logs[0].priority, Priority::High);
    assert_eq!(logs[0].summary, "Vendor asking for payment of invoice 42.");
}

#[test]
#[serial]
fn own_summary_emails_never_reach_the_classifier() {
    let mut server = Server::new();
    let (f, _guards) = fixture(&server);
    mock_inbox(&mut server, &["m1"]);
    mock_message(
        &mut server,
        "m1",
        "ops@example.test",
        "Your AI Email Summary for today",
        "Digest body.",
    );
    let completion = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create();

    let report = pipeline(&f).execute().expect("triage");
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped_by_rule, 1);
    assert_eq!(report.drafts_created, 0);
    completion.assert();

    let logs = f.email_logs.list_for_account("acct-1", 10).expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].summary, SUMMARY_EMAIL_SKIP);
    assert!(!logs[0].needs_response);
}

#[test]
#[serial]
fn sender_rule_skips_classification_and_logs_the_reason() {
    let mut server = Server::new();
    let (f, _guards) = fixture(&server);
    f.rules
        .add_rule("acct-1", RuleType::SkipSender, "noreply@acme.test", true)
        .expect("rule");
    mock_inbox(&mut server, &["m1"]);
    mock_message(
        &mut server,
        "m1",
        "Acme Notifications <noreply@acme.test>",
        "Your receipt",
        "Thank you for your order.",
    );
    let completion = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create();

    let report = pipeline(&f).execute().expect("triage");
    assert_eq!(report.skipped_by_rule, 1);
    completion.assert();

    let logs = f.email_logs.list_for_account("acct-1", 10).expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].summary, "Skipped (rule): sender \"noreply@acme.test\"");
}

#[test]
#[serial]
fn already_logged_messages_are_not_fetched_again() {
    let mut server = Server::new();
    let (f, _guards) = fixture(&server);
    f.email_logs
        .insert_if_absent(&NewEmailLog {
            gmail_account_id: "acct-1".to_string(),
            gmail_message_id: "m1".to_string(),
            subject: "Invoice overdue".to_string(),
            from_address: "billing@acme.test".to_string(),
            summary: "Already handled.".to_string(),
            needs_response: false,
            priority: Priority::Normal,
            draft_created: false,
        })
        .expect("seed log");
    mock_inbox(&mut server, &["m1"]);
    let fetch = server
        .mock("GET", "/users/me/messages/m1")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create();

    let report = pipeline(&f).execute().expect("triage");
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped_duplicate, 1);
    assert_eq!(report.errors_count, 0);
    fetch.assert();
}

#[test]
#[serial]
fn no_response_needed_labels_without_drafting() {
    let mut server = Server::new();
    let (f, _guards) = fixture(&server);
    mock_inbox(&mut server, &["m1"]);
    mock_message(
        &mut server,
        "m1",
        "news@weekly.test",
        "Industry roundup",
        "This week in the industry.",
    );
    let _completion = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(completion_body(serde_json::json!({
            "summary": "Newsletter, no action needed.",
            "labels": ["newsletter"],
            "needs_response": false,
            "priority": "low",
        })))
        .expect(1)
        .create();
    let draft = server
        .mock("POST", "/users/me/drafts")
        .with_status(200)
        .with_body(r#"{"id":"d1"}"#)
        .expect(0)
        .create();
    let modify = server
        .mock("POST", "/users/me/messages/m1/modify")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("\"L1\"".to_string()),
            Matcher::Regex(r#""addLabelIds":\["L1"\]"#.to_string()),
        ]))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create();

    let report = pipeline(&f).execute().expect("triage");
    assert_eq!(report.processed, 1);
    assert_eq!(report.drafts_created, 0);
    draft.assert();
    modify.assert();

    let logs = f.email_logs.list_for_account("acct-1", 10).expect("logs");
    assert_eq!(logs[0].priority, Priority::Low);
    assert!(!logs[0].draft_created);
}
