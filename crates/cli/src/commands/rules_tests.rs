// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn args(action: &str) -> AddArgs {
    AddArgs {
        action: action.to_string(),
        if_nonzero: None,
        if_zero: None,
        if_fail_to_pass: None,
        if_pass_to_fail: None,
        if_code: None,
        check: None,
        once: false,
        interval: None,
        rate_limit: None,
        timeout: None,
    }
}

#[test]
fn resolves_each_single_trigger_flag() {
    let mut a = args("./a.sh");
    a.if_nonzero = Some("./c.sh".to_string());
    let (trigger, check, spec) = resolve_trigger(&a).unwrap();
    assert_eq!(trigger, Trigger::OnNonzero);
    assert_eq!(check, "./c.sh");
    assert_eq!(spec, "--if ./c.sh");

    let mut a = args("./a.sh");
    a.if_fail_to_pass = Some("./c.sh".to_string());
    let (trigger, _, spec) = resolve_trigger(&a).unwrap();
    assert_eq!(trigger, Trigger::OnFailToPass);
    assert_eq!(spec, "--if-fail-to-pass ./c.sh");

    let mut a = args("./a.sh");
    a.if_code = Some(3);
    a.check = Some("./c.sh".to_string());
    let (trigger, check, spec) = resolve_trigger(&a).unwrap();
    assert_eq!(trigger, Trigger::OnCode { n: 3 });
    assert_eq!(check, "./c.sh");
    assert_eq!(spec, "--if-code 3 --check ./c.sh");
}

#[test]
fn rejects_zero_or_many_triggers() {
    // No trigger at all.
    let a = args("./a.sh");
    let err = resolve_trigger(&a).unwrap_err();
    assert_eq!(err.downcast_ref::<ExitError>().unwrap().code, 2);

    // Two triggers.
    let mut a = args("./a.sh");
    a.if_zero = Some("./c.sh".to_string());
    a.if_nonzero = Some("./c.sh".to_string());
    assert!(resolve_trigger(&a).is_err());
}

#[test]
fn if_code_requires_check() {
    let mut a = args("./a.sh");
    a.if_code = Some(2);
    let err = resolve_trigger(&a).unwrap_err();
    assert_eq!(err.downcast_ref::<ExitError>().unwrap().code, 2);
}

#[test]
fn rule_line_shows_effective_values() {
    let rule = Rule {
        id: 2,
        check: "./c.sh".to_string(),
        action: "./a.sh".to_string(),
        trigger: Trigger::OnCode { n: 3 },
        once: false,
        poll_interval: Some(10.0),
        rate_limit: None,
        timeout: None,
        original_spec: "--if-code 3 --check ./c.sh".to_string(),
    };
    let line = format_rule_line(&rule, 60.0);
    assert!(line.starts_with("#2 "));
    assert!(line.contains("trigger=on_code_n(3)"));
    assert!(line.contains("interval=10s"));
    // Defaults derived from the rule's own interval.
    assert!(line.contains("rate=1/10"));
    assert!(line.contains("timeout=9s"));
    assert!(line.contains("check=\"./c.sh\""));
}

#[test]
fn rule_line_uses_global_default_when_unset() {
    let rule = Rule {
        id: 1,
        check: "./c.sh".to_string(),
        action: "./a.sh".to_string(),
        trigger: Trigger::OnNonzero,
        once: false,
        poll_interval: None,
        rate_limit: None,
        timeout: None,
        original_spec: String::new(),
    };
    let line = format_rule_line(&rule, 60.0);
    assert!(line.contains("interval=60s"));
    assert!(line.contains("rate=1/60"));
    assert!(line.contains("timeout=54s"));
}
