#![cfg(test)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use keyword_relay::{
    base::{
        config::{Config, ConfigInner},
        error::RelayError,
        types::{ChatKind, InboundMessage, JoinOutcome, LeaveOutcome, Res, Sender, Severity, Void},
    },
    interaction::{
        dispatch::Dispatcher,
        keywords::KeywordRegistry,
        router::{MessageRouter, Routed},
    },
    service::{
        chat::{ChatClient, GenericChatClient},
        db::{DbClient, GenericDbClient, Keyword, User},
        report::{GenericReporter, Reporter},
    },
};
use mockall::mock;
use tokio::sync::mpsc;

// Mocks.

// Mock chat client for testing.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        fn bot_user_id(&self) -> &str;
        async fn start(&self) -> Void;
        async fn send_message(&self, chat_id: &str, text: &str) -> Void;
        async fn forward_message(&self, recipient: &str, message: &InboundMessage) -> Void;
    }
}

// Mock reporting sink for testing.

mock! {
    pub Sink {}

    impl GenericReporter for Sink {
        fn report(&self, severity: Severity, message: &str);
        fn crash(&self, message: &str);
        fn flush(&self);
    }
}

// Mock store for failure injection.

mock! {
    pub Db {}

    #[async_trait]
    impl GenericDbClient for Db {
        async fn migrate(&self) -> Void;
        async fn find_active_user(&self, identity: &str) -> Res<Option<User>>;
        async fn find_any_user(&self, identity: &str) -> Res<Option<User>>;
        async fn create_or_restore_user(&self, identity: &str, display_name: &str) -> Res<User>;
        async fn delete_user(&self, identity: &str) -> Void;
        async fn insert_keyword_if_absent(&self, name: &str) -> Res<bool>;
        async fn list_keywords(&self) -> Res<Vec<Keyword>>;
        async fn replace_user_keywords(&self, user: &User, keywords: &[Keyword]) -> Void;
        async fn list_subscribers(&self, keyword: &Keyword) -> Res<Vec<User>>;
    }
}

type Log<T> = Arc<Mutex<Vec<T>>>;

/// Everything the mocks observed.
#[derive(Clone, Default)]
struct Observed {
    replies: Log<(String, String)>,
    forwards: Log<String>,
    reports: Log<(Severity, String)>,
}

impl Observed {
    fn forwards(&self) -> Vec<String> {
        self.forwards.lock().unwrap().clone()
    }

    fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    fn reports_with(&self, severity: Severity) -> usize {
        self.reports.lock().unwrap().iter().filter(|(s, _)| *s == severity).count()
    }

    fn clear(&self) {
        self.replies.lock().unwrap().clear();
        self.forwards.lock().unwrap().clear();
        self.reports.lock().unwrap().clear();
    }
}

/// Chat mock that records replies and forwards; forwards to anyone in `failing` fail.
fn get_mock_chat(observed: &Observed, failing: &[&str], reply_fails: bool) -> MockChat {
    let mut mock = MockChat::new();

    let replies = observed.replies.clone();
    let forwards = observed.forwards.clone();
    let failing: Vec<String> = failing.iter().map(|f| f.to_string()).collect();

    mock.expect_bot_user_id().return_const("UBOT".to_string());
    mock.expect_start().returning(|| Ok(()));
    mock.expect_send_message().returning(move |chat_id, text| {
        if reply_fails {
            return Err(anyhow::anyhow!("socket closed"));
        }
        replies.lock().unwrap().push((chat_id.to_string(), text.to_string()));
        Ok(())
    });
    mock.expect_forward_message().returning(move |recipient, _| {
        if failing.iter().any(|f| f == recipient) {
            return Err(anyhow::anyhow!("user has blocked the bot"));
        }
        forwards.lock().unwrap().push(recipient.to_string());
        Ok(())
    });

    mock
}

fn get_mock_sink(observed: &Observed) -> MockSink {
    let mut mock = MockSink::new();

    let reports = observed.reports.clone();

    mock.expect_report().returning(move |severity, message| {
        reports.lock().unwrap().push((severity, message.to_string()));
    });
    mock.expect_crash().returning(|_| ());
    mock.expect_flush().returning(|| ());

    mock
}

fn test_config() -> Config {
    Config {
        inner: Arc::new(ConfigInner {
            slack_app_token: "xapp-test".to_string(),
            slack_bot_token: "xoxb-test".to_string(),
            db_endpoint: "mem://".to_string(),
            keywords: vec!["#a".to_string(), "#b".to_string()],
            ..Default::default()
        }),
    }
}

/// Helper function to setup the test environment.
struct TestEnv {
    db: DbClient,
    router: MessageRouter,
    reporter: Reporter,
    observed: Observed,
}

async fn setup_test_environment(keywords: &[&str], failing: &[&str]) -> TestEnv {
    setup_with(keywords, failing, false).await
}

async fn setup_with(keywords: &[&str], failing: &[&str], reply_fails: bool) -> TestEnv {
    let config = test_config();
    let observed = Observed::default();

    // Initialize the database (using in-memory for tests).
    let db = DbClient::surreal_memory().await.expect("Failed to create DB client");
    KeywordRegistry::new(db.clone()).ensure_seeded(keywords).await.expect("Failed to seed keywords");

    // We create mocked versions of the chat client and reporter that record every call.
    let chat = ChatClient::new(Arc::new(get_mock_chat(&observed, failing, reply_fails)));
    let reporter = Reporter::new(Arc::new(get_mock_sink(&observed)));

    let router = MessageRouter::new(config, db.clone(), chat, reporter.clone());

    TestEnv { db, router, reporter, observed }
}

fn message(chat_kind: ChatKind, identity: &str, text: &str) -> InboundMessage {
    let chat_id = match chat_kind {
        ChatKind::Private => format!("D{identity}"),
        ChatKind::Group => "C0GENERAL".to_string(),
    };

    InboundMessage {
        chat_id,
        chat_kind,
        message_id: "1700000000.000100".to_string(),
        sender: Sender {
            identity: identity.to_string(),
            display_name: format!("name-{identity}"),
        },
        text: text.to_string(),
    }
}

fn private(identity: &str, text: &str) -> InboundMessage {
    message(ChatKind::Private, identity, text)
}

fn group(identity: &str, text: &str) -> InboundMessage {
    message(ChatKind::Group, identity, text)
}

async fn join(env: &TestEnv, identity: &str) {
    env.router.route(&private(identity, "!join")).await.expect("join failed");
}

fn relayed(routed: Routed) -> keyword_relay::base::types::RelaySummary {
    match routed {
        Routed::Relayed(summary) => summary,
        other => panic!("expected a relay, got {other:?}"),
    }
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

// Commands.

#[tokio::test]
async fn test_greet_replies_in_any_chat() {
    let env = setup_test_environment(&["#a"], &[]).await;

    assert_eq!(env.router.route(&private("U1", "!greet")).await.unwrap(), Routed::Greeted);
    assert_eq!(env.router.route(&group("U1", "!hello")).await.unwrap(), Routed::Greeted);

    let replies = env.observed.replies();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], ("DU1".to_string(), "Hello".to_string()));
    assert_eq!(replies[1].0, "C0GENERAL");

    // No store interaction.
    assert!(env.db.find_any_user("U1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_join_is_idempotent() {
    let env = setup_test_environment(&["#a", "#b"], &[]).await;

    let first = env.router.route(&private("U1", "!join")).await.unwrap();
    let second = env.router.route(&private("U1", "!join")).await.unwrap();

    assert_eq!(first, Routed::Joined(JoinOutcome::Joined { restored: false }));
    assert_eq!(second, Routed::Joined(JoinOutcome::AlreadyJoined));

    let replies = env.observed.replies();
    assert_eq!(replies[0].1, test_config().joined_reply);
    assert_eq!(replies[1].1, test_config().already_joined_reply);

    let user = env.db.find_active_user("U1").await.unwrap().unwrap();
    assert_eq!(user.display_name, "name-U1");

    // Only the first join is reported.
    assert_eq!(env.observed.reports_with(Severity::Info), 1);
}

#[tokio::test]
async fn test_join_and_leave_are_ignored_in_groups() {
    let env = setup_test_environment(&["#a"], &[]).await;

    assert_eq!(env.router.route(&group("U1", "!join")).await.unwrap(), Routed::Ignored);
    assert_eq!(env.router.route(&group("U1", "!leave")).await.unwrap(), Routed::Ignored);

    assert!(env.observed.replies().is_empty());
    assert!(env.db.find_any_user("U1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_leave_replies_even_when_never_joined() {
    let env = setup_test_environment(&["#a"], &[]).await;

    let routed = env.router.route(&private("U1", "!leave")).await.unwrap();

    assert_eq!(routed, Routed::Left(LeaveOutcome::Left));
    assert_eq!(env.observed.replies()[0].1, test_config().left_reply);
}

#[tokio::test]
async fn test_restore_reuses_row_and_resubscribes() {
    let env = setup_test_environment(&["#a", "#b"], &[]).await;

    join(&env, "U1").await;
    let original = env.db.find_active_user("U1").await.unwrap().unwrap();

    env.router.route(&private("U1", "!stop")).await.unwrap();
    let routed = env.router.route(&private("U1", "!start")).await.unwrap();

    assert_eq!(routed, Routed::Joined(JoinOutcome::Joined { restored: true }));

    let restored = env.db.find_active_user("U1").await.unwrap().unwrap();
    assert_eq!(restored.id, original.id);

    for keyword in env.db.list_keywords().await.unwrap() {
        let subscribers = env.db.list_subscribers(&keyword).await.unwrap();
        assert_eq!(subscribers.len(), 1, "keyword {}", keyword.name);
    }
}

#[tokio::test]
async fn test_join_with_taken_display_name_gets_a_reply() {
    let env = setup_test_environment(&["#a"], &[]).await;

    let mut first = private("U1", "!join");
    first.sender.display_name = "bob".to_string();
    let mut second = private("U2", "!join");
    second.sender.display_name = "bob".to_string();

    env.router.route(&first).await.unwrap();
    let routed = env.router.route(&second).await.unwrap();

    assert_eq!(routed, Routed::Joined(JoinOutcome::NameTaken));
    assert_eq!(env.observed.replies()[1], ("DU2".to_string(), test_config().name_taken_reply.clone()));
    assert!(env.db.find_any_user("U2").await.unwrap().is_none());
    assert_eq!(env.observed.reports_with(Severity::Warning), 1);
}

#[tokio::test]
async fn test_duplicate_active_user_is_a_conflict() {
    let env = setup_test_environment(&["#a"], &[]).await;

    env.db.create_or_restore_user("U1", "alice").await.unwrap();
    let err = env.db.create_or_restore_user("U1", "alice").await.unwrap_err();

    assert!(RelayError::is_conflict(&err));
}

#[tokio::test]
async fn test_reply_failure_is_the_handlers_failure() {
    let env = setup_with(&["#a"], &[], true).await;

    let err = env.router.route(&private("U1", "!greet")).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<RelayError>(), Some(RelayError::ReplyDelivery { .. })));
}

// Relay.

#[tokio::test]
async fn test_relay_reaches_only_subscribers_of_the_keyword() {
    let env = setup_test_environment(&["#go", "#other"], &[]).await;

    join(&env, "U1").await;
    join(&env, "U2").await;

    // U3 only follows `#other`.
    let u3 = env.db.create_or_restore_user("U3", "carol").await.unwrap();
    let other = env.db.list_keywords().await.unwrap().into_iter().filter(|k| k.name == "#other").collect::<Vec<_>>();
    env.db.replace_user_keywords(&u3, &other).await.unwrap();

    let summary = relayed(env.router.route(&group("U9", "let's #go tonight")).await.unwrap());

    assert_eq!(summary.matched, vec!["#go".to_string()]);
    assert_eq!(sorted(env.observed.forwards()), vec!["U1".to_string(), "U2".to_string()]);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_private_free_text_never_relays() {
    let env = setup_test_environment(&["#go"], &[]).await;

    join(&env, "U1").await;
    env.observed.clear();

    let routed = env.router.route(&private("U9", "let's #go tonight")).await.unwrap();

    assert_eq!(routed, Routed::Ignored);
    assert!(env.observed.forwards().is_empty());
}

#[tokio::test]
async fn test_matching_is_case_sensitive_substring() {
    let env = setup_test_environment(&["#go"], &[]).await;

    join(&env, "U1").await;

    let summary = relayed(env.router.route(&group("U9", "#GO or #Go")).await.unwrap());
    assert!(summary.matched.is_empty());

    // Plain containment: no word boundary required.
    let summary = relayed(env.router.route(&group("U9", "#golang")).await.unwrap());
    assert_eq!(summary.matched, vec!["#go".to_string()]);
    assert_eq!(env.observed.forwards(), vec!["U1".to_string()]);
}

#[tokio::test]
async fn test_one_forward_per_recipient_when_several_keywords_match() {
    let env = setup_test_environment(&["#a", "#b"], &[]).await;

    join(&env, "U1").await;

    let summary = relayed(env.router.route(&group("U9", "both #a and #b")).await.unwrap());

    assert_eq!(summary.matched.len(), 2);
    assert_eq!(env.observed.forwards(), vec!["U1".to_string()]);
}

#[tokio::test]
async fn test_subscribed_sender_receives_one_copy() {
    let env = setup_test_environment(&["#go", "#news"], &[]).await;

    join(&env, "U1").await;
    join(&env, "U2").await;

    let summary = relayed(env.router.route(&group("U1", "news #go #news")).await.unwrap());

    assert_eq!(summary.forwarded, vec!["U1".to_string(), "U2".to_string()]);
    assert_eq!(sorted(env.observed.forwards()), vec!["U1".to_string(), "U2".to_string()]);
}

#[tokio::test]
async fn test_bot_messages_are_ignored() {
    let env = setup_test_environment(&["#a"], &[]).await;

    join(&env, "U1").await;
    env.observed.clear();

    assert_eq!(env.router.route(&group("UBOT", "relayed #a")).await.unwrap(), Routed::Ignored);
    assert_eq!(env.router.route(&private("UBOT", "!greet")).await.unwrap(), Routed::Ignored);

    assert!(env.observed.forwards().is_empty());
    assert!(env.observed.replies().is_empty());
}

#[tokio::test]
async fn test_forward_failure_is_isolated() {
    let env = setup_test_environment(&["#a"], &["U1"]).await;

    join(&env, "U1").await;
    join(&env, "U2").await;

    let summary = relayed(env.router.route(&group("U9", "hello #a")).await.unwrap());

    assert_eq!(summary.failed, vec!["U1".to_string()]);
    assert_eq!(summary.forwarded, vec!["U2".to_string()]);
    assert_eq!(env.observed.forwards(), vec!["U2".to_string()]);
    assert_eq!(env.observed.reports_with(Severity::Warning), 1);
}

#[tokio::test]
async fn test_end_to_end_join_relay_leave() {
    let env = setup_test_environment(&["#a", "#b"], &[]).await;

    join(&env, "U1").await;

    relayed(env.router.route(&group("U9", "hello #a world")).await.unwrap());
    assert_eq!(env.observed.forwards(), vec!["U1".to_string()]);

    env.router.route(&private("U1", "!leave")).await.unwrap();
    env.observed.clear();

    let summary = relayed(env.router.route(&group("U9", "hello #a world")).await.unwrap());
    assert_eq!(summary.matched, vec!["#a".to_string()]);
    assert!(env.observed.forwards().is_empty());
}

// Store failures.

fn keyword(id: &str, name: &str) -> Keyword {
    Keyword {
        id: id.to_string(),
        name: name.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn user(identity: &str) -> User {
    User {
        id: format!("row-{identity}"),
        identity: identity.to_string(),
        display_name: format!("name-{identity}"),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

fn router_over(db: MockDb, observed: &Observed) -> MessageRouter {
    let chat = ChatClient::new(Arc::new(get_mock_chat(observed, &[], false)));
    let reporter = Reporter::new(Arc::new(get_mock_sink(observed)));

    MessageRouter::new(test_config(), DbClient::new(Arc::new(db)), chat, reporter)
}

#[tokio::test]
async fn test_keyword_read_failure_yields_no_forwards() {
    let observed = Observed::default();

    let mut db = MockDb::new();
    db.expect_list_keywords().returning(|| Err(anyhow::anyhow!("connection reset")));

    let router = router_over(db, &observed);
    let summary = relayed(router.route(&group("U9", "hello #a")).await.unwrap());

    assert_eq!(summary, Default::default());
    assert!(observed.forwards().is_empty());
    assert_eq!(observed.reports_with(Severity::Error), 1);
}

#[tokio::test]
async fn test_subscriber_read_failure_skips_only_that_keyword() {
    let observed = Observed::default();

    let mut db = MockDb::new();
    db.expect_list_keywords().returning(|| Ok(vec![keyword("k1", "#a"), keyword("k2", "#b")]));
    db.expect_list_subscribers().returning(|keyword| match keyword.name.as_str() {
        "#a" => Err(anyhow::anyhow!("timeout")),
        _ => Ok(vec![user("U2")]),
    });

    let router = router_over(db, &observed);
    let summary = relayed(router.route(&group("U9", "#a #b")).await.unwrap());

    assert_eq!(summary.matched.len(), 2);
    assert_eq!(observed.forwards(), vec!["U2".to_string()]);
    assert_eq!(observed.reports_with(Severity::Error), 1);
}

#[tokio::test]
async fn test_racing_join_is_already_joined() {
    let observed = Observed::default();

    // The first lookup misses, the create loses the race, and the re-read sees the winner.
    let lookups = Arc::new(Mutex::new(0));
    let mut db = MockDb::new();
    db.expect_find_active_user().returning(move |identity| {
        let mut count = lookups.lock().unwrap();
        *count += 1;
        Ok((*count > 1).then(|| user(identity)))
    });
    db.expect_find_any_user().returning(|_| Ok(None));
    db.expect_create_or_restore_user().returning(|identity, _| Err(RelayError::Conflict(identity.to_string()).into()));

    let router = router_over(db, &observed);
    let routed = router.route(&private("U1", "!join")).await.unwrap();

    assert_eq!(routed, Routed::Joined(JoinOutcome::AlreadyJoined));
    assert_eq!(observed.replies()[0].1, test_config().already_joined_reply);
}

// Dispatch.

#[tokio::test]
async fn test_dispatcher_drains_the_channel() {
    let env = setup_test_environment(&["#a"], &[]).await;

    join(&env, "U1").await;
    join(&env, "U2").await;

    let (sender, events) = mpsc::channel(16);
    for i in 0..5 {
        sender.send(group("U9", &format!("message {i} #a"))).await.unwrap();
    }
    sender.send(private("U9", "not relayed #a")).await.unwrap();
    drop(sender);

    Dispatcher::new(env.router.clone(), env.reporter.clone(), 4).run(events).await;

    let forwards = env.observed.forwards();
    assert_eq!(forwards.len(), 10);
    assert_eq!(forwards.iter().filter(|f| *f == "U1").count(), 5);
}

#[tokio::test]
async fn test_dispatcher_reports_handler_failures() {
    let env = setup_with(&["#a"], &[], true).await;

    let (sender, events) = mpsc::channel(4);
    sender.send(private("U1", "!greet")).await.unwrap();
    drop(sender);

    Dispatcher::new(env.router.clone(), env.reporter.clone(), 1).run(events).await;

    assert_eq!(env.observed.reports_with(Severity::Error), 1);
}
