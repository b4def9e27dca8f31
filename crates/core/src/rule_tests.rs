// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn rule(trigger: Trigger) -> Rule {
    Rule {
        id: 1,
        check: "./check.sh".to_string(),
        action: "./action.sh".to_string(),
        trigger,
        once: false,
        poll_interval: None,
        rate_limit: None,
        timeout: None,
        original_spec: String::new(),
    }
}

#[test]
fn valid_rule_passes_validation() {
    assert_eq!(rule(Trigger::OnNonzero).validate(), Ok(()));
}

#[test]
fn rejects_zero_id() {
    let mut r = rule(Trigger::OnZero);
    r.id = 0;
    assert_eq!(r.validate(), Err(RuleError::InvalidId));
}

#[test]
fn rejects_blank_commands() {
    let mut r = rule(Trigger::OnZero);
    r.check = "   ".to_string();
    assert_eq!(r.validate(), Err(RuleError::EmptyCheck));

    let mut r = rule(Trigger::OnZero);
    r.action = String::new();
    assert_eq!(r.validate(), Err(RuleError::EmptyAction));
}

#[test]
fn rejects_non_positive_interval_and_timeout() {
    let mut r = rule(Trigger::OnZero);
    r.poll_interval = Some(0.0);
    assert_eq!(r.validate(), Err(RuleError::InvalidPollInterval));

    let mut r = rule(Trigger::OnZero);
    r.timeout = Some(-1.0);
    assert_eq!(r.validate(), Err(RuleError::InvalidTimeout));
}

#[test]
fn rejects_degenerate_rate_limit() {
    let mut r = rule(Trigger::OnZero);
    r.rate_limit = Some(RateLimit {
        count: 0,
        window_seconds: 5.0,
    });
    assert_eq!(r.validate(), Err(RuleError::InvalidRateLimit));
}

#[test]
fn effective_poll_interval_prefers_rule_value() {
    let mut r = rule(Trigger::OnZero);
    assert_eq!(r.effective_poll_interval(60.0), 60.0);
    r.poll_interval = Some(5.0);
    assert_eq!(r.effective_poll_interval(60.0), 5.0);
}

#[test]
fn effective_timeout_defaults_to_ninety_percent() {
    let mut r = rule(Trigger::OnZero);
    assert!((r.effective_timeout(60.0) - 54.0).abs() < 1e-9);
    r.poll_interval = Some(10.0);
    assert!((r.effective_timeout(60.0) - 9.0).abs() < 1e-9);
    r.timeout = Some(2.5);
    assert_eq!(r.effective_timeout(60.0), 2.5);
}

#[test]
fn effective_rate_limit_defaults_to_one_per_interval() {
    let mut r = rule(Trigger::OnZero);
    r.poll_interval = Some(15.0);
    let limit = r.effective_rate_limit(60.0);
    assert_eq!(limit.count, 1);
    assert_eq!(limit.window_seconds, 15.0);

    r.rate_limit = Some(RateLimit {
        count: 3,
        window_seconds: 90.0,
    });
    let limit = r.effective_rate_limit(60.0);
    assert_eq!(limit.count, 3);
    assert_eq!(limit.window_seconds, 90.0);
}

#[test]
fn parse_rate_limit_accepts_count_slash_seconds() {
    let limit = parse_rate_limit("2/60").unwrap();
    assert_eq!(limit.count, 2);
    assert_eq!(limit.window_seconds, 60.0);

    let limit = parse_rate_limit(" 1/0.5 ").unwrap();
    assert_eq!(limit.count, 1);
    assert_eq!(limit.window_seconds, 0.5);
}

#[test]
fn parse_rate_limit_rejects_malformed_input() {
    for text in ["", "2", "2/", "/5", "0/5", "2/0", "-1/5", "a/b"] {
        assert!(parse_rate_limit(text).is_err(), "accepted {text:?}");
    }
}

#[test]
fn trigger_display_names() {
    assert_eq!(Trigger::OnZero.to_string(), "on_zero");
    assert_eq!(Trigger::OnNonzero.to_string(), "on_nonzero");
    assert_eq!(
        Trigger::OnFailToPass.to_string(),
        "on_transition_fail_to_pass"
    );
    assert_eq!(
        Trigger::OnPassToFail.to_string(),
        "on_transition_pass_to_fail"
    );
    assert_eq!(Trigger::OnCode { n: 7 }.to_string(), "on_code_n(7)");
}

#[test]
fn trigger_serde_uses_mode_tag() {
    let json = serde_json::to_string(&Trigger::OnCode { n: 3 }).unwrap();
    assert_eq!(json, r#"{"mode":"on_code_n","n":3}"#);

    let trigger: Trigger = serde_json::from_str(r#"{"mode":"on_zero"}"#).unwrap();
    assert_eq!(trigger, Trigger::OnZero);

    let trigger: Trigger =
        serde_json::from_str(r#"{"mode":"on_transition_pass_to_fail"}"#).unwrap();
    assert_eq!(trigger, Trigger::OnPassToFail);
}

#[test]
fn rule_serde_round_trip() {
    let mut r = rule(Trigger::OnCode { n: 2 });
    r.once = true;
    r.rate_limit = Some(RateLimit {
        count: 2,
        window_seconds: 5.0,
    });
    r.original_spec = "--if-code 2 --check ./check.sh".to_string();

    let json = serde_json::to_string(&r).unwrap();
    assert!(json.contains("\"check_script\""));
    assert!(json.contains("\"action_script\""));

    let restored: Rule = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, r);
}
