//! End-to-end deploy runs against in-memory adapters.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use kdeploy::orchestrator::{
    CleanupDecision, CleanupOutcome, CleanupPolicy, DeployOptions, DeployOutcome, DeployPhase,
    Orchestrator,
};
use kdeploy::state::{
    ApplicationInfo, DeploymentState, DeploymentStatus, Operation, StateStore,
};
use kdeploy::tools::RecordKind;

use common::{Fakes, LB_IP, ScriptedOperator, Workspace, config, fast_options};

#[tokio::test]
async fn test_existing_mode_never_touches_infrastructure() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "existing", "route53", true);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert_eq!(report.outcome, DeployOutcome::Complete { tls_enabled: true });
    assert!(fakes.infra.calls().is_empty());
    assert!(!report.phases.iter().any(|p| p.is_infra()));
}

#[tokio::test]
async fn test_external_dns_installs_with_tls_and_skips_dns_wait() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "provision", "cloudflare", true);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert!(report.succeeded());
    assert_eq!(
        fakes.infra.calls(),
        ["has_workspace", "setup", "init", "plan", "apply"]
    );
    assert_eq!(
        report.phases,
        [
            DeployPhase::Loading,
            DeployPhase::Preflight,
            DeployPhase::InfraSetup,
            DeployPhase::InfraInit,
            DeployPhase::InfraPlan,
            DeployPhase::InfraApply,
            DeployPhase::Kubeconfig,
            DeployPhase::HelmInstall,
            DeployPhase::Complete,
        ]
    );

    let releases = fakes.release.calls();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].action, "install");
    assert!(releases[0].tls_enabled);

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::Running);
    assert!(state.tls_enabled());
    assert!(state.config_hash.is_some());
}

#[tokio::test]
async fn test_existing_workspace_skips_template_setup() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.infra.add_workspace("prod");
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "provision", "route53", true);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert!(report.succeeded());
    assert_eq!(fakes.infra.calls(), ["has_workspace", "init", "plan", "apply"]);
    assert!(!report.phases.contains(&DeployPhase::InfraSetup));
}

#[tokio::test]
async fn test_manual_dns_waits_for_a_record_then_enables_tls() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.dns.answer("shop.example.com", RecordKind::A, &[LB_IP]);
    let operator = ScriptedOperator {
        dns_ready_after: Some((2, Arc::clone(&fakes.dns.ready))),
        ..ScriptedOperator::default()
    };
    let cfg = config("prod", "existing", "manual", false);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert_eq!(report.outcome, DeployOutcome::Complete { tls_enabled: true });
    assert_eq!(
        report.phases.iter().filter(|p| **p == DeployPhase::DnsWait).count(),
        1
    );
    assert!(operator.dns_updates.load(Ordering::SeqCst) >= 2);
    assert!(report.dns_records.iter().all(|r| r.verified));

    let releases = fakes.release.calls();
    assert_eq!(releases.len(), 2);
    assert_eq!((releases[0].action, releases[0].tls_enabled), ("install", false));
    assert_eq!((releases[1].action, releases[1].tls_enabled), ("upgrade", true));

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::Running);
    assert_eq!(state.phase, Some(DeployPhase::Complete));
    assert!(state.tls_enabled());
}

#[tokio::test]
async fn test_skip_dns_completes_without_tls() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "existing", "manual", false);
    let mut opts = fast_options();
    opts.skip_dns = true;

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&opts)
        .await
        .expect("run");

    assert_eq!(report.outcome, DeployOutcome::DeployedWithoutTls);
    assert!(report.phases.contains(&DeployPhase::DnsWait));
    assert!(!report.phases.contains(&DeployPhase::HelmUpgradeTls));
    assert_eq!(fakes.dns.query_count(), 0);

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::Running);
    assert!(!state.tls_enabled());
    assert_eq!(
        state.application.and_then(|a| a.url).as_deref(),
        Some("http://shop.example.com")
    );
}

#[tokio::test]
async fn test_cancelled_wait_counts_as_skip() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "existing", "manual", false);
    let opts = fast_options();
    opts.cancel.cancel();

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&opts)
        .await
        .expect("run");

    assert_eq!(report.outcome, DeployOutcome::DeployedWithoutTls);
    assert_eq!(fakes.release.calls().len(), 1);
}

#[tokio::test]
async fn test_waiting_dns_run_resumes_without_reinstalling() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.dns.ready.store(true, Ordering::SeqCst);
    fakes.dns.answer("shop.example.com", RecordKind::A, &[LB_IP]);
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "provision", "manual", false);

    let mut state = DeploymentState::new("prod");
    state.set_status(DeploymentStatus::WaitingDns);
    state.set_application(ApplicationInfo {
        namespace: Some(String::from("prod")),
        release_name: Some(String::from("prod")),
        url: Some(String::from("http://shop.example.com")),
        ..ApplicationInfo::default()
    });
    ws.store.save(&state).await.expect("save");

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert_eq!(report.outcome, DeployOutcome::Complete { tls_enabled: true });
    assert!(fakes.infra.calls().is_empty());
    assert_eq!(
        report.phases,
        [
            DeployPhase::Loading,
            DeployPhase::Preflight,
            DeployPhase::DnsWait,
            DeployPhase::HelmUpgradeTls,
            DeployPhase::Complete,
        ]
    );

    let releases = fakes.release.calls();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].action, "upgrade");
}

#[tokio::test]
async fn test_apply_failure_prompts_and_destroys_partial_infrastructure() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.infra.fail_on("apply");
    let operator = ScriptedOperator {
        cleanup: CleanupDecision::Destroy,
        ..ScriptedOperator::default()
    };
    let cfg = config("prod", "provision", "manual", false);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("failure is reported, not returned");

    match &report.outcome {
        DeployOutcome::Failed { error, cleanup } => {
            assert!(error.contains("apply"), "unexpected error: {error}");
            assert_eq!(*cleanup, CleanupOutcome::Destroyed);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(operator.cleanup_asked.load(Ordering::SeqCst), 1);
    assert!(report.phases.ends_with(&[
        DeployPhase::InfraApply,
        DeployPhase::CleanupPrompt,
        DeployPhase::CleanupRunning,
        DeployPhase::CleanupComplete,
    ]));
    assert!(fakes.infra.calls().ends_with(&[
        String::from("apply"),
        String::from("init"),
        String::from("destroy"),
    ]));
    assert!(fakes.release.calls().is_empty());

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::Destroyed);
    let ops: Vec<(Operation, bool)> = state
        .history
        .iter()
        .map(|h| (h.operation, h.success))
        .collect();
    assert_eq!(ops, [(Operation::Deploy, false), (Operation::Cleanup, true)]);
}

#[tokio::test]
async fn test_keep_policy_leaves_infrastructure_and_fails() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.infra.fail_on("plan");
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "provision", "manual", false);
    let mut opts = fast_options();
    opts.cleanup = CleanupPolicy::Keep;

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&opts)
        .await
        .expect("run");

    assert!(matches!(
        report.outcome,
        DeployOutcome::Failed {
            cleanup: CleanupOutcome::Kept,
            ..
        }
    ));
    assert_eq!(operator.cleanup_asked.load(Ordering::SeqCst), 0);
    assert!(!fakes.infra.calls().contains(&String::from("destroy")));
    assert_eq!(report.phases.last(), Some(&DeployPhase::Error));

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn test_install_failure_without_infra_goes_straight_to_error() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.release.fail_install.store(true, Ordering::SeqCst);
    let operator = ScriptedOperator {
        cleanup: CleanupDecision::Destroy,
        ..ScriptedOperator::default()
    };
    let cfg = config("prod", "existing", "manual", false);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert!(matches!(
        report.outcome,
        DeployOutcome::Failed {
            cleanup: CleanupOutcome::NotNeeded,
            ..
        }
    ));
    assert!(!report.phases.contains(&DeployPhase::CleanupPrompt));
    assert_eq!(operator.cleanup_asked.load(Ordering::SeqCst), 0);

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::Failed);
    assert_eq!(state.phase, Some(DeployPhase::Error));
}

#[tokio::test]
async fn test_unreachable_cluster_is_repaired_once() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.cluster.accessible.store(false, Ordering::SeqCst);
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "existing", "route53", true);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert!(report.succeeded());
    assert_eq!(
        fakes.cluster.calls(),
        ["update_credentials aws prod-eks us-east-1"]
    );
}

#[tokio::test]
async fn test_missing_load_balancer_fails_run() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.cluster.set_load_balancer(None);
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "existing", "manual", false);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    match report.outcome {
        DeployOutcome::Failed { error, .. } => assert!(error.contains("load balancer")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        report.phases.iter().filter(|p| **p == DeployPhase::DnsWait).count(),
        1,
        "the load balancer is looked up inside dns-wait"
    );
    assert!(report.dns_records.is_empty());

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn test_interrupted_load_balancer_wait_resumes_into_dns_wait() {
    let ws = Workspace::new();
    let fakes = Fakes::new();
    fakes.cluster.set_load_balancer(None);
    let operator = ScriptedOperator::default();
    let cfg = config("prod", "existing", "manual", false);
    let opts = DeployOptions {
        lb_attempts: 100_000,
        lb_poll_interval: Duration::from_millis(5),
        ..fast_options()
    };

    let interrupted = tokio::time::timeout(
        Duration::from_millis(200),
        Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator).run(&opts),
    )
    .await;
    assert!(interrupted.is_err(), "run should still be waiting for the load balancer");

    let state = ws.store.load("prod").await.expect("load").expect("state");
    assert_eq!(state.status, DeploymentStatus::WaitingDns);
    assert_eq!(state.phase, Some(DeployPhase::DnsWait));
    assert_eq!(fakes.release.calls().len(), 1);

    fakes.cluster.set_load_balancer(Some(LB_IP));
    fakes.dns.ready.store(true, Ordering::SeqCst);
    fakes.dns.answer("shop.example.com", RecordKind::A, &[LB_IP]);

    let report = Orchestrator::new(&cfg, &ws.layout, &ws.store, fakes.toolchain(), &operator)
        .run(&fast_options())
        .await
        .expect("run");

    assert_eq!(report.outcome, DeployOutcome::Complete { tls_enabled: true });
    let actions: Vec<_> = fakes.release.calls().iter().map(|c| c.action).collect();
    assert_eq!(actions, ["install", "upgrade"]);
}
