//! End-to-end engine tests against in-memory storage and mock collaborators.

use rosp_core::{AccountId, EmailAddress, SubscriptionId, Timestamp};
use rosp_gateway::mock::MockSet;
use rosp_gateway::{PaymentEvent, PaymentEventKind};
use rosp_lifecycle::model::{Actor, NotificationKind};
use rosp_lifecycle::registration::Password;
use rosp_lifecycle::{
    Engine, EngineConfig, Ledger, LifecycleError, RegistrationPayload, RegistrationRequest, Table,
    UploadedDocument,
};
use rosp_state::{AdminAction, PaymentStatus, SubscriptionStatus, RETRY_THRESHOLD};

// ─── Fixtures ───────────────────────────────────────────────────────

fn engine() -> (Engine, MockSet) {
    let mocks = MockSet::new();
    let engine = Engine::new(Ledger::in_memory(), mocks.collaborators(), EngineConfig::default());
    (engine, mocks)
}

fn upload(media_type: &str) -> Option<UploadedDocument> {
    Some(UploadedDocument {
        filename: "scan".into(),
        media_type: media_type.into(),
        bytes: b"%PDF-1.7 scan".to_vec(),
    })
}

fn request(email: &str, company_number: &str) -> RegistrationRequest {
    let payload: RegistrationPayload = serde_json::from_value(serde_json::json!({
        "email": email,
        "password": "correct-horse-9",
        "contactName": "Grace Hopper",
        "company": {
            "name": "Compilers Ltd",
            "number": company_number,
            "companyType": "ltd",
            "registeredAddress": {"line1": "1 Harbour Way", "city": "London", "postcode": "E14 5AB"}
        },
        "director": {"fullName": "Grace Hopper", "nationality": "US"},
        "agreement": {"signatureKind": "typed", "signaturePayload": "Grace Hopper"}
    }))
    .expect("payload");
    RegistrationRequest {
        payload,
        identity_document: upload("application/pdf"),
        address_proof: upload("image/jpeg"),
        origin_address: Some("203.0.113.7".into()),
    }
}

fn event(kind: PaymentEventKind, txn: &str, subscription_id: SubscriptionId) -> PaymentEvent {
    PaymentEvent {
        kind,
        transaction_id: txn.into(),
        subscription_id,
        amount_minor: 30_000,
        currency: Some("GBP".into()),
        method: Some("card".into()),
        failure_reason: (kind == PaymentEventKind::Failed).then(|| "card_declined".into()),
    }
}

async fn status_of(engine: &Engine, id: SubscriptionId) -> (SubscriptionStatus, u8) {
    let overview = engine.subscription_overview(id).await.expect("overview");
    (overview.subscription.status, overview.subscription.retry_count)
}

async fn registered(engine: &Engine, email: &str, number: &str) -> SubscriptionId {
    engine
        .register(request(email, number))
        .await
        .expect("registration")
        .subscription_id
}

async fn active(engine: &Engine, email: &str, number: &str) -> SubscriptionId {
    let id = registered(engine, email, number).await;
    engine
        .apply_event(&event(PaymentEventKind::Succeeded, &format!("txn_{number}"), id))
        .await
        .expect("payment");
    engine
        .perform_action(AccountId::new(), id, AdminAction::Approve, None, None)
        .await
        .expect("approve");
    id
}

// ─── Registration ───────────────────────────────────────────────────

#[tokio::test]
async fn registration_commits_bundle_and_runs_side_effects() {
    let (engine, mocks) = engine();
    engine.publish_template("Registered Office Agreement").await.unwrap();

    let receipt = engine.register(request("Grace@Example.com", "gh 000001")).await.unwrap();

    assert!(receipt.core_committed);
    assert!(receipt.agreement_id.is_some());
    assert!(receipt.checkout_url.as_deref().unwrap().starts_with("https://checkout.mock/"));
    let ok: Vec<_> = receipt.side_effects.iter().filter(|e| e.ok).map(|e| e.name).collect();
    assert_eq!(ok, ["agreement_document", "checkout_session", "welcome_email"]);

    let (status, retry) = status_of(&engine, receipt.subscription_id).await;
    assert_eq!(status, SubscriptionStatus::Draft);
    assert_eq!(retry, 0);

    let stored = mocks.documents.objects();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].1, "application/pdf");
    let agreement_id = receipt.agreement_id.unwrap();
    let key = engine
        .ledger()
        .read(|t| t.agreement(agreement_id).and_then(|a| a.document_key.clone()))
        .await
        .unwrap();
    assert_eq!(key.as_deref(), Some(stored[0].0.as_str()));

    let customers = mocks.payments.customers();
    assert_eq!(customers[0].email.as_str(), "grace@example.com");
    assert_eq!(mocks.payments.sessions()[0].amount_minor, 30_000);

    let audit = engine.audit_for_subscription(receipt.subscription_id).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "REGISTERED");
    assert_eq!(audit[0].actor, Actor::Client(receipt.account_id));

    let notes = engine.notifications_for(receipt.account_id).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Welcome);
}

#[tokio::test]
async fn registration_without_active_template_skips_agreement() {
    let (engine, mocks) = engine();
    let receipt = engine.register(request("a@example.com", "A1")).await.unwrap();
    assert!(receipt.agreement_id.is_none());
    let effect = receipt
        .side_effects
        .iter()
        .find(|e| e.name == "agreement_document")
        .unwrap();
    assert!(!effect.ok);
    assert!(mocks.documents.objects().is_empty());
}

#[tokio::test]
async fn duplicate_identity_is_refused_with_both_flags() {
    let (engine, _mocks) = engine();
    registered(&engine, "dup@example.com", "DUP1").await;

    let err = engine.register(request(" DUP@example.com ", "dup 1")).await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::DuplicateIdentity {
            email_taken: true,
            company_taken: true
        }
    ));

    let err = engine.register(request("other@example.com", "DUP1")).await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::DuplicateIdentity {
            email_taken: false,
            company_taken: true
        }
    ));

    let availability = engine.check_availability("dup@EXAMPLE.com", "new1").await.unwrap();
    assert!(availability.email_taken);
    assert!(!availability.company_taken);
}

#[tokio::test]
async fn director_failure_leaves_no_account() {
    let (engine, mocks) = engine();
    engine.ledger().fail_next_write(Table::Directors);

    let err = engine.register(request("kyc@example.com", "KYC1")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Persistence(_)));

    let email = EmailAddress::parse("kyc@example.com").unwrap();
    let (accounts, taken) = engine
        .ledger()
        .read(|t| (t.accounts().count(), t.email_taken(&email)))
        .await
        .unwrap();
    assert_eq!(accounts, 0);
    assert!(!taken);
    assert!(mocks.mailer.sent().is_empty());

    engine.register(request("kyc@example.com", "KYC1")).await.unwrap();
}

#[tokio::test]
async fn collaborator_outage_does_not_undo_registration() {
    let (engine, mocks) = engine();
    engine.publish_template("Registered Office Agreement").await.unwrap();
    mocks.fail_all();

    let receipt = engine.register(request("down@example.com", "DOWN1")).await.unwrap();
    assert!(receipt.core_committed);
    assert!(receipt.checkout_url.is_none());
    assert!(receipt.side_effects.iter().all(|e| !e.ok));

    mocks.payments.set_failing(false);
    let checkout = engine.begin_checkout(receipt.subscription_id).await.unwrap();
    assert!(checkout.url.starts_with("https://checkout.mock/"));
}

#[tokio::test]
async fn weak_password_is_a_validation_error() {
    let (engine, _mocks) = engine();
    let mut req = request("weak@example.com", "W1");
    req.payload.password = Password::new("password");
    assert!(matches!(
        engine.register(req).await,
        Err(LifecycleError::Validation(_))
    ));
}

// ─── Payments ───────────────────────────────────────────────────────

#[tokio::test]
async fn payment_then_approval_activates_for_a_year() {
    let (engine, _mocks) = engine();
    let id = registered(&engine, "pay@example.com", "PAY1").await;

    let report = engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_pay", id))
        .await
        .unwrap();
    assert_eq!(report.status, SubscriptionStatus::PendingApproval);
    assert!(report.transition.is_some());

    let before = Timestamp::now();
    let outcome = engine
        .perform_action(AccountId::new(), id, AdminAction::Approve, None, None)
        .await
        .unwrap();
    assert_eq!(outcome.to, SubscriptionStatus::Active);

    let overview = engine.subscription_overview(id).await.unwrap();
    let end = overview.subscription.end_date.unwrap();
    let days = before.days_until(&end);
    assert!((364..=365).contains(&days), "term was {days} days");
    assert_eq!(overview.payments.len(), 1);
    assert_eq!(overview.payments[0].status(), PaymentStatus::Succeeded);
}

#[tokio::test]
async fn duplicate_event_changes_nothing() {
    let (engine, _mocks) = engine();
    let id = registered(&engine, "twice@example.com", "TWICE1").await;
    let failed = event(PaymentEventKind::Failed, "txn_twice", id);

    engine.apply_event(&failed).await.unwrap();
    let before = status_of(&engine, id).await;
    let err = engine.apply_event(&failed).await.unwrap_err();
    assert!(matches!(err, LifecycleError::DuplicateEvent { .. }));
    assert_eq!(status_of(&engine, id).await, before);
    assert_eq!(before.1, 1);
}

#[tokio::test]
async fn three_failures_suspend_an_active_subscription() {
    let (engine, _mocks) = engine();
    let id = active(&engine, "late@example.com", "LATE1").await;

    for n in 1..=3u8 {
        let report = engine
            .apply_event(&event(PaymentEventKind::Failed, &format!("txn_fail_{n}"), id))
            .await
            .unwrap();
        assert_eq!(report.retry_count, n);
    }
    let (status, retry) = status_of(&engine, id).await;
    assert_eq!(status, SubscriptionStatus::Suspended);
    assert_eq!(retry, RETRY_THRESHOLD);

    let overview = engine.subscription_overview(id).await.unwrap();
    let failed = overview
        .payments
        .iter()
        .filter(|p| p.status() == PaymentStatus::Failed)
        .count();
    assert_eq!(failed, 3);

    // A fourth failure keeps the counter at the threshold.
    engine
        .apply_event(&event(PaymentEventKind::Failed, "txn_fail_4", id))
        .await
        .unwrap();
    assert_eq!(status_of(&engine, id).await.1, RETRY_THRESHOLD);

    // Paying reactivates and resets the counter.
    engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_recover", id))
        .await
        .unwrap();
    assert_eq!(status_of(&engine, id).await, (SubscriptionStatus::Active, 0));
}

#[tokio::test]
async fn success_without_table_row_still_resets_retries() {
    let (engine, _mocks) = engine();
    let id = active(&engine, "early@example.com", "EARLY1").await;
    for n in 0..2 {
        engine
            .apply_event(&event(PaymentEventKind::Failed, &format!("txn_e{n}"), id))
            .await
            .unwrap();
    }
    let report = engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_early", id))
        .await
        .unwrap();
    assert!(report.transition.is_none());
    assert_eq!(report.status, SubscriptionStatus::Active);
    assert_eq!(report.retry_count, 0);
}

#[tokio::test]
async fn refund_event_marks_payment_and_keeps_status() {
    let (engine, _mocks) = engine();
    let id = registered(&engine, "refund@example.com", "REF1").await;
    engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_r", id))
        .await
        .unwrap();
    let report = engine
        .apply_event(&event(PaymentEventKind::Refunded, "txn_r", id))
        .await
        .unwrap();
    assert_eq!(report.status, SubscriptionStatus::PendingApproval);
    let overview = engine.subscription_overview(id).await.unwrap();
    assert_eq!(overview.payments[0].status(), PaymentStatus::Refunded);
}

#[tokio::test]
async fn event_for_unknown_subscription_is_not_found() {
    let (engine, _mocks) = engine();
    let err = engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_x", SubscriptionId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { .. }));
}

#[tokio::test]
async fn event_without_positive_amount_or_in_another_currency_is_refused() {
    let (engine, _mocks) = engine();
    let id = registered(&engine, "amount@example.com", "AMT1").await;

    let mut negative = event(PaymentEventKind::Succeeded, "txn_neg", id);
    negative.amount_minor = -30_000;
    let mut zero = event(PaymentEventKind::Succeeded, "txn_zero", id);
    zero.amount_minor = 0;
    let mut dollars = event(PaymentEventKind::Succeeded, "txn_usd", id);
    dollars.currency = Some("USD".into());

    for bad in [negative, zero, dollars] {
        let err = engine.apply_event(&bad).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)), "{}: {err}", bad.transaction_id);
    }
    let overview = engine.subscription_overview(id).await.unwrap();
    assert_eq!(overview.subscription.status, SubscriptionStatus::Draft);
    assert!(overview.payments.is_empty());

    let mut lower_case = event(PaymentEventKind::Succeeded, "txn_gbp", id);
    lower_case.currency = Some("gbp".into());
    engine.apply_event(&lower_case).await.unwrap();
    assert_eq!(status_of(&engine, id).await.0, SubscriptionStatus::PendingApproval);
}

// ─── Admin actions ──────────────────────────────────────────────────

#[tokio::test]
async fn actions_outside_the_table_are_refused() {
    let (engine, _mocks) = engine();
    let id = registered(&engine, "draft@example.com", "DRAFT1").await;

    for action in [
        AdminAction::Approve,
        AdminAction::Reject,
        AdminAction::Suspend,
        AdminAction::Reactivate,
    ] {
        let err = engine
            .perform_action(AccountId::new(), id, action, Some("because".into()), None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, LifecycleError::InvalidTransition(ref msg) if msg.contains("DRAFT")),
            "{action}: {err}"
        );
        assert_eq!(status_of(&engine, id).await.0, SubscriptionStatus::Draft);
    }

    let outcome = engine
        .perform_action(AccountId::new(), id, AdminAction::Cancel, None, None)
        .await
        .unwrap();
    assert_eq!(outcome.to, SubscriptionStatus::Withdrawn);

    let err = engine
        .perform_action(AccountId::new(), id, AdminAction::Cancel, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition(_)));
}

#[tokio::test]
async fn reject_requires_a_reason() {
    let (engine, _mocks) = engine();
    let id = registered(&engine, "why@example.com", "WHY1").await;
    engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_why", id))
        .await
        .unwrap();

    for reason in [None, Some("   ".to_string())] {
        let err = engine
            .perform_action(AccountId::new(), id, AdminAction::Reject, reason, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }
    assert_eq!(status_of(&engine, id).await.0, SubscriptionStatus::PendingApproval);
}

#[tokio::test]
async fn reject_requests_refund_even_when_gateway_fails() {
    let (engine, mocks) = engine();
    let id = registered(&engine, "reject@example.com", "REJ1").await;
    let report = engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_rej", id))
        .await
        .unwrap();
    mocks.payments.set_failing(true);

    let admin = AccountId::new();
    let outcome = engine
        .perform_action(admin, id, AdminAction::Reject, Some("documents unreadable".into()), Some("ticket 42".into()))
        .await
        .unwrap();

    assert_eq!(outcome.to, SubscriptionStatus::Rejected);
    assert!(outcome.refund_initiated);
    let refunds = mocks.payments.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].transaction_id, "txn_rej");
    assert_eq!(refunds[0].idempotency_key, format!("refund-{}", report.payment_id));
    assert!(outcome.side_effects.iter().any(|e| e.name == "refund" && !e.ok));

    let audit = engine.audit_for_subscription(id).await.unwrap();
    let actions: Vec<_> = audit.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, ["REGISTERED", "PAYMENT_SUCCEEDED", "REJECT", "REFUND_FAILED"]);
    let reject = &audit[2];
    assert_eq!(reject.actor, Actor::Admin(admin));
    assert_eq!(reject.reason.as_deref(), Some("documents unreadable"));
    assert_eq!(reject.notes.as_deref(), Some("ticket 42"));
}

#[tokio::test]
async fn suspend_and_reactivate_round_trip() {
    let (engine, mocks) = engine();
    let id = active(&engine, "pause@example.com", "PAUSE1").await;
    engine
        .perform_action(AccountId::new(), id, AdminAction::Suspend, Some("unpaid".into()), None)
        .await
        .unwrap();
    let outcome = engine
        .perform_action(AccountId::new(), id, AdminAction::Reactivate, None, None)
        .await
        .unwrap();
    assert_eq!(outcome.from, SubscriptionStatus::Suspended);
    assert_eq!(outcome.to, SubscriptionStatus::Active);
    assert!(!outcome.refund_initiated);
    assert!(mocks.payments.refunds().is_empty());
}

#[tokio::test]
async fn checkout_is_refused_once_active() {
    let (engine, _mocks) = engine();
    let id = active(&engine, "paid@example.com", "PAID1").await;
    assert!(matches!(
        engine.begin_checkout(id).await,
        Err(LifecycleError::InvalidTransition(_))
    ));
}

// ─── Renewal ────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_moves_through_renewal_to_expiry_and_payment_restores() {
    let (engine, mocks) = engine();
    let id = active(&engine, "renew@example.com", "RENEW1").await;
    let now = Timestamp::now();

    let report = engine.run_renewal_sweep(now.plus_days(100)).await.unwrap();
    assert!(report.renewal_due.is_empty() && report.expired.is_empty());

    let report = engine.run_renewal_sweep(now.plus_days(340)).await.unwrap();
    assert_eq!(report.renewal_due, vec![id]);
    assert_eq!(status_of(&engine, id).await.0, SubscriptionStatus::RenewalPending);

    let report = engine.run_renewal_sweep(now.plus_days(367)).await.unwrap();
    assert_eq!(report.expired, vec![id]);
    assert!(report.errors.is_empty());
    assert_eq!(status_of(&engine, id).await.0, SubscriptionStatus::Expired);
    assert!(mocks
        .mailer
        .subjects()
        .iter()
        .any(|s| s.contains("expired")));

    engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_renew", id))
        .await
        .unwrap();
    assert_eq!(status_of(&engine, id).await.0, SubscriptionStatus::Active);

    let audit = engine.audit_for_subscription(id).await.unwrap();
    let scheduler = audit.iter().filter(|e| e.actor == Actor::Scheduler).count();
    assert_eq!(scheduler, 2);
}

// ─── Notifications & audit ──────────────────────────────────────────

#[tokio::test]
async fn notifications_are_private_to_their_owner() {
    let (engine, _mocks) = engine();
    let receipt = engine.register(request("inbox@example.com", "INBOX1")).await.unwrap();
    let owner = receipt.account_id;
    let notification = engine.notifications_for(owner).await.unwrap().remove(0);
    assert_eq!(engine.unread_count(owner).await.unwrap(), 1);

    let err = engine.mark_read(AccountId::new(), notification.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { .. }));
    assert_eq!(engine.unread_count(owner).await.unwrap(), 1);

    let read = engine.mark_read(owner, notification.id).await.unwrap();
    assert!(read.read);
    assert_eq!(engine.unread_count(owner).await.unwrap(), 0);
}

#[tokio::test]
async fn audit_chain_verifies_after_a_full_lifecycle() {
    let (engine, _mocks) = engine();
    let id = active(&engine, "chain@example.com", "CHAIN1").await;
    engine
        .apply_event(&event(PaymentEventKind::Failed, "txn_chain_f", id))
        .await
        .unwrap();
    engine
        .perform_action(AccountId::new(), id, AdminAction::Cancel, None, None)
        .await
        .unwrap();

    let verification = engine.verify_audit_chain().await.unwrap();
    assert!(verification.chain_valid);
    assert_eq!(verification.total_entries, 5);
    assert!(verification.broken_links.is_empty());
}

// ─── Concurrency ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_with_one_email_admit_one() {
    let (engine, _mocks) = engine();
    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.register(request("race@example.com", "RACE1")).await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.register(request("RACE@example.com", "RACE2")).await }
    });

    let (won, lost) = match (first.await.unwrap(), second.await.unwrap()) {
        (Ok(receipt), Err(e)) | (Err(e), Ok(receipt)) => (receipt, e),
        (a, b) => panic!("expected one success, got {} and {}", a.is_ok(), b.is_ok()),
    };
    assert!(matches!(
        lost,
        LifecycleError::DuplicateIdentity { email_taken: true, company_taken: false }
    ));
    let accounts = engine.ledger().read(|t| t.accounts().count()).await.unwrap();
    assert_eq!(accounts, 1);
    assert_eq!(status_of(&engine, won.subscription_id).await.0, SubscriptionStatus::Draft);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admin_decisions_apply_once() {
    let (engine, _mocks) = engine();
    let id = registered(&engine, "both@example.com", "BOTH1").await;
    engine
        .apply_event(&event(PaymentEventKind::Succeeded, "txn_both", id))
        .await
        .unwrap();

    let approve = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .perform_action(AccountId::new(), id, AdminAction::Approve, None, None)
                .await
        }
    });
    let reject = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .perform_action(AccountId::new(), id, AdminAction::Reject, Some("duplicate".into()), None)
                .await
        }
    });
    let results = [approve.await.unwrap(), reject.await.unwrap()];

    let applied: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(applied.len(), 1);
    let refused = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(refused, LifecycleError::InvalidTransition(_)), "{refused}");

    assert_eq!(applied[0].from, SubscriptionStatus::PendingApproval);
    assert_eq!(status_of(&engine, id).await.0, applied[0].to);
    let audit = engine.audit_for_subscription(id).await.unwrap();
    let decisions = audit
        .iter()
        .filter(|e| e.action == "APPROVE" || e.action == "REJECT")
        .count();
    assert_eq!(decisions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn payment_failure_racing_cancel_sees_fresh_status() {
    let (engine, _mocks) = engine();
    let id = active(&engine, "close@example.com", "CLOSE1").await;
    for n in 1..RETRY_THRESHOLD {
        engine
            .apply_event(&event(PaymentEventKind::Failed, &format!("txn_close_{n}"), id))
            .await
            .unwrap();
    }
    let settled = engine.audit_for_subscription(id).await.unwrap().len();

    let failure = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .apply_event(&event(PaymentEventKind::Failed, "txn_close_last", id))
                .await
                .map(|_| ())
        }
    });
    let cancel = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .perform_action(AccountId::new(), id, AdminAction::Cancel, None, None)
                .await
                .map(|_| ())
        }
    });
    failure.await.unwrap().unwrap();
    cancel.await.unwrap().unwrap();

    let (status, retry) = status_of(&engine, id).await;
    assert_eq!(status, SubscriptionStatus::Withdrawn);
    assert_eq!(retry, RETRY_THRESHOLD);

    let audit = engine.audit_for_subscription(id).await.unwrap();
    let raced: Vec<_> = audit[settled..]
        .iter()
        .filter(|e| e.action == "CANCEL" || e.action == "PAYMENT_FAILED")
        .collect();
    assert_eq!(raced.len(), 2);
    assert_eq!(raced[1].from_status, raced[0].to_status);
    assert_eq!(raced[1].to_status, Some(SubscriptionStatus::Withdrawn));
}
