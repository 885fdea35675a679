//! Active-standby composite state machine scenarios.

mod common;

use common::{assert_composite, Fixture};

use sonic_linkmgrd::config::{DefaultRoute, Mode, MuxConfig, PortCableType};
use sonic_linkmgrd::link_manager::{HealthLabel, LinkProberMetrics, Metrics, SwitchCause};
use sonic_linkmgrd::link_prober::LinkProberVerdict;
use sonic_linkmgrd::state::{LinkProberState, LinkState, MuxState};

fn fixture() -> Fixture {
    Fixture::new(PortCableType::ActiveStandby)
}

fn fixture_with_default_route_feature() -> Fixture {
    let mut config = MuxConfig::default();
    config.enable_default_route_feature = true;
    Fixture::with_config(PortCableType::ActiveStandby, config)
}

#[tokio::test]
async fn test_happy_boot() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 1);
    assert_eq!(db.last_mux_linkmgr_state, Some(HealthLabel::Healthy));

    // Link up started the prober.
    assert_eq!(fx.prober.snapshot().restart_tx_call_count, 1);
}

#[tokio::test]
async fn test_happy_boot_gated_by_default_route() {
    let mut fx = fixture_with_default_route_feature();
    fx.set_mux_active().await;

    // (Active, Active, Up) but no healthy default route yet.
    assert_eq!(
        fx.db.snapshot().last_mux_linkmgr_state,
        Some(HealthLabel::Unhealthy)
    );

    fx.post_default_route_event(DefaultRoute::Ok).await;
    assert_eq!(
        fx.db.snapshot().last_mux_linkmgr_state,
        Some(HealthLabel::Healthy)
    );
}

#[tokio::test]
async fn test_prober_unknown_yields_to_standby() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.post_link_prober_event(LinkProberState::Unknown).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 2);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Standby));
    assert_composite(
        &fx,
        LinkProberState::Unknown,
        MuxState::Standby,
        LinkState::Up,
    );

    // Transmission pauses while the hardware switches over.
    assert_eq!(fx.prober.snapshot().suspend_tx_call_count, 1);
    assert!(db
        .link_prober_metrics
        .contains(&LinkProberMetrics::UnknownStart));
    assert_eq!(db.last_mux_linkmgr_state, Some(HealthLabel::Unhealthy));

    fx.handle_mux_state(MuxState::Standby).await;
    assert_composite(
        &fx,
        LinkProberState::Unknown,
        MuxState::Standby,
        LinkState::Up,
    );

    // Suspension window elapses; transmission resumes.
    fx.sm.handle_suspend_timer_expiry().await;
    assert_eq!(fx.prober.snapshot().restart_tx_call_count, 2);

    // Heartbeats return.
    fx.post_link_prober_event(LinkProberState::Active).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 3);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Active));
    assert!(db
        .link_prober_metrics
        .contains(&LinkProberMetrics::UnknownEnd));
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Active,
        LinkState::Up,
    );
}

#[tokio::test]
async fn test_link_down_fail_safe() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.post_link_event(LinkState::Down).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 2);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Standby));
    // The prober window is untouched by the link flap.
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Standby,
        LinkState::Down,
    );

    // Driver confirms the fail-safe yield.
    fx.handle_mux_state(MuxState::Standby).await;

    // Link restored: the still-active prober wins the port back with
    // exactly one more toggle.
    fx.post_link_event(LinkState::Up).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 3);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Active));
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Active,
        LinkState::Up,
    );

    // Further identical verdicts change nothing.
    fx.post_link_prober_event(LinkProberState::Active).await;
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 3);

    fx.handle_mux_state(MuxState::Active).await;
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Active,
        LinkState::Up,
    );
}

#[tokio::test]
async fn test_config_override_standby_then_auto() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.handle_mux_config(Mode::Standby).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 2);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Standby));
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Standby,
        LinkState::Up,
    );

    fx.handle_mux_state(MuxState::Standby).await;

    // The standby pin outweighs the prober.
    fx.post_link_prober_event(LinkProberState::Active).await;
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 2);
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Standby,
        LinkState::Up,
    );

    fx.handle_mux_config(Mode::Auto).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 3);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Active));
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Active,
        LinkState::Up,
    );
}

#[tokio::test]
async fn test_mux_unknown_probe_loop() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.handle_mux_state(MuxState::Unknown).await;
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Unknown,
        LinkState::Up,
    );
    assert_eq!(fx.db.snapshot().probe_mux_state_invoke_count, 1);

    // Driver still cannot read the mux.
    fx.handle_probe_mux_state(MuxState::Unknown).await;
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Unknown,
        LinkState::Up,
    );

    // Probe finally resolves to active: adopt it without a new toggle.
    fx.handle_probe_mux_state(MuxState::Active).await;
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Active,
        LinkState::Up,
    );
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 1);
}

#[tokio::test]
async fn test_probe_retries_back_off_into_unhealthy() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.handle_mux_state(MuxState::Unknown).await;
    assert_eq!(fx.db.snapshot().probe_mux_state_invoke_count, 1);

    // Retry budget: MuxStateChangeRetryCount re-probes, then degrade.
    fx.fire_probe_retry_timeout().await;
    fx.fire_probe_retry_timeout().await;
    fx.fire_probe_retry_timeout().await;
    assert_eq!(fx.db.snapshot().probe_mux_state_invoke_count, 4);

    fx.fire_probe_retry_timeout().await;
    let db = fx.db.snapshot();
    assert_eq!(db.probe_mux_state_invoke_count, 4);
    assert_eq!(db.last_mux_linkmgr_state, Some(HealthLabel::Unhealthy));

    // A definite report recovers health evaluation.
    fx.handle_mux_state(MuxState::Active).await;
    assert_eq!(
        fx.db.snapshot().last_mux_linkmgr_state,
        Some(HealthLabel::Healthy)
    );
}

#[tokio::test]
async fn test_toggle_deadline_reprobes_not_retoggles() {
    let mut fx = fixture();
    fx.activate().await;
    fx.post_link_event(LinkState::Up).await;
    fx.post_link_prober_event(LinkProberState::Active).await;
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 1);

    // No confirmation arrives; the deadline probes instead of writing again.
    fx.fire_mux_wait_timeout().await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 1);
    assert_eq!(db.probe_mux_state_invoke_count, 1);

    // The probe reveals the hardware stayed standby; policy re-toggles.
    fx.handle_probe_mux_state(MuxState::Standby).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 2);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Active));

    fx.handle_mux_state(MuxState::Active).await;
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Active,
        LinkState::Up,
    );
}

#[tokio::test]
async fn test_exactly_one_toggle_from_standby_boot() {
    let mut fx = fixture();
    fx.set_mux_standby().await;

    // Positive window fills: exactly one toggle to active.
    fx.post_link_prober_event(LinkProberState::Active).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 2);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Active));
}

#[tokio::test]
async fn test_hysteresis_window_resets_on_mismatch() {
    let mut fx = fixture();
    fx.activate().await;
    fx.post_link_event(LinkState::Up).await;

    // Two unknowns, then an active verdict: the negative window restarts.
    fx.sm
        .handle_link_prober_verdict(LinkProberVerdict::SelfUnknown)
        .await;
    fx.sm
        .handle_link_prober_verdict(LinkProberVerdict::SelfUnknown)
        .await;
    fx.sm
        .handle_link_prober_verdict(LinkProberVerdict::SelfActive)
        .await;
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 0);

    fx.sm
        .handle_link_prober_verdict(LinkProberVerdict::SelfUnknown)
        .await;
    fx.sm
        .handle_link_prober_verdict(LinkProberVerdict::SelfUnknown)
        .await;
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 0);

    fx.sm
        .handle_link_prober_verdict(LinkProberVerdict::SelfUnknown)
        .await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 1);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Standby));
}

#[tokio::test]
async fn test_redelivered_report_is_idempotent() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    let before = fx.db.snapshot();
    fx.handle_mux_state(MuxState::Active).await;
    fx.handle_mux_state(MuxState::Active).await;
    let after = fx.db.snapshot();

    assert_eq!(
        before.set_mux_state_invoke_count,
        after.set_mux_state_invoke_count
    );
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Active,
        LinkState::Up,
    );
}

#[tokio::test]
async fn test_reset_loss_count_is_idempotent() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.sm.handle_reset_loss_count().await;
    fx.sm.handle_reset_loss_count().await;
    assert_eq!(fx.prober.snapshot().reset_counts_call_count, 2);
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 1);
}

#[tokio::test]
async fn test_manual_mode_freezes_decisions() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.handle_mux_config(Mode::Manual).await;
    fx.post_link_prober_event(LinkProberState::Unknown).await;

    // Observation continues, remediation does not.
    assert_composite(
        &fx,
        LinkProberState::Unknown,
        MuxState::Active,
        LinkState::Up,
    );
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 1);

    fx.handle_mux_config(Mode::Auto).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 2);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Standby));
}

#[tokio::test]
async fn test_switchover_measurement_records_start_and_end() {
    let mut config = MuxConfig::default();
    config.enable_switchover_measurement = true;
    let mut fx = Fixture::with_config(PortCableType::ActiveStandby, config);
    fx.set_mux_active().await;

    let db = fx.db.snapshot();
    assert_eq!(
        db.metrics_events,
        vec![
            (Metrics::SwitchingStart, MuxState::Active),
            (Metrics::SwitchingEnd, MuxState::Active),
        ]
    );
    assert_eq!(db.switch_causes, vec![SwitchCause::LinkProberActive]);
}

#[tokio::test]
async fn test_driver_error_goes_unhealthy_and_probes() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.handle_mux_state(MuxState::Error).await;
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Error,
        LinkState::Up,
    );
    let db = fx.db.snapshot();
    assert_eq!(db.last_mux_linkmgr_state, Some(HealthLabel::Unhealthy));
    assert_eq!(db.probe_mux_state_invoke_count, 1);
    // The hardware is never auto-recovered.
    assert_eq!(db.set_mux_state_invoke_count, 1);
}

#[tokio::test]
async fn test_pck_loss_ratio_published() {
    let mut fx = fixture();
    fx.set_mux_active().await;

    fx.sm.handle_pck_loss_ratio(5, 100).await;
    assert_eq!(fx.db.snapshot().pck_loss_posts, vec![(5, 100)]);
}

#[tokio::test]
async fn test_default_route_gates_prober_transmission() {
    let mut fx = fixture_with_default_route_feature();
    fx.activate().await;

    // No healthy route known yet: link up leaves transmission down.
    fx.post_link_event(LinkState::Up).await;
    assert_eq!(fx.prober.snapshot().shutdown_tx_call_count, 1);
    assert_eq!(fx.prober.snapshot().restart_tx_call_count, 0);

    fx.post_default_route_event(DefaultRoute::Ok).await;
    assert_eq!(fx.prober.snapshot().restart_tx_call_count, 1);

    // Route lost again while yielding: suspension expiry must not resume.
    fx.post_link_prober_event(LinkProberState::Unknown).await;
    assert_eq!(fx.prober.snapshot().suspend_tx_call_count, 1);
    fx.post_default_route_event(DefaultRoute::Na).await;
    assert_eq!(fx.prober.snapshot().shutdown_tx_call_count, 2);

    fx.sm.handle_suspend_timer_expiry().await;
    assert_eq!(fx.prober.snapshot().restart_tx_call_count, 1);
}

#[tokio::test]
async fn test_warm_restart_publishes_without_toggling() {
    let mut fx = fixture();
    fx.activate().await;
    fx.sm.start_reconciliation().await;
    assert_eq!(fx.db.snapshot().get_mux_state_invoke_count, 1);

    // Observations flow during the window, remediation is held back.
    fx.post_link_event(LinkState::Up).await;
    fx.post_link_prober_event(LinkProberState::Active).await;
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 0);
    assert_composite(&fx, LinkProberState::Active, MuxState::Wait, LinkState::Up);

    // Adopt whatever the hardware is doing.
    let reconciled = fx.sm.handle_get_mux_state_response(MuxState::Standby).await;
    assert!(reconciled);
    assert_composite(
        &fx,
        LinkProberState::Active,
        MuxState::Standby,
        LinkState::Up,
    );
    assert_eq!(fx.db.snapshot().set_mux_state_invoke_count, 0);

    // Normal policy resumes after the window.
    fx.post_link_prober_event(LinkProberState::Unknown).await;
    fx.post_link_prober_event(LinkProberState::Active).await;
    let db = fx.db.snapshot();
    assert_eq!(db.set_mux_state_invoke_count, 1);
    assert_eq!(db.last_set_mux_state, Some(MuxState::Active));
}
