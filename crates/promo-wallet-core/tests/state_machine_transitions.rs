use promo_wallet_core::{submission_transition, SubmissionStep, WalletError};

use SubmissionStep::*;

fn walk(path: &[SubmissionStep]) {
    for pair in path.windows(2) {
        let t = submission_transition(pair[0], pair[1])
            .unwrap_or_else(|e| panic!("{:?} -> {:?}: {e}", pair[0], pair[1]));
        assert_eq!((t.from, t.to), (pair[0], pair[1]));
        assert!(!t.reason.is_empty());
    }
}

#[test]
fn approval_path_transitions() {
    walk(&[
        Idle,
        CheckingAllowance,
        AwaitingApprovalSignature,
        ApprovalSubmitted,
        AwaitingSubmitSignature,
        SubmitSubmitted,
        VerifyingOnChain,
        Completed,
    ]);
}

#[test]
fn sufficient_allowance_skips_approval_states() {
    walk(&[
        Idle,
        CheckingAllowance,
        AwaitingSubmitSignature,
        SubmitSubmitted,
        VerifyingOnChain,
        Completed,
    ]);
}

#[test]
fn recheck_may_skip_approval_broadcast() {
    walk(&[
        CheckingAllowance,
        AwaitingApprovalSignature,
        AwaitingSubmitSignature,
    ]);
}

#[test]
fn every_live_step_may_fail() {
    for step in [
        Idle,
        CheckingAllowance,
        AwaitingApprovalSignature,
        ApprovalSubmitted,
        AwaitingSubmitSignature,
        SubmitSubmitted,
        VerifyingOnChain,
    ] {
        submission_transition(step, Failed).expect("non-terminal -> failed");
    }
}

#[test]
fn illegal_transitions_are_rejected() {
    let err = submission_transition(Idle, SubmitSubmitted).expect_err("must fail");
    assert!(err.to_string().contains("illegal submission transition"));
    assert!(matches!(err, WalletError::IllegalTransition { .. }));

    submission_transition(ApprovalSubmitted, VerifyingOnChain).expect_err("skips submit");
    submission_transition(Completed, Failed).expect_err("terminal");
    submission_transition(Failed, Idle).expect_err("terminal");
    submission_transition(SubmitSubmitted, AwaitingApprovalSignature).expect_err("backwards");
}

#[test]
fn terminal_steps() {
    assert!(Completed.is_terminal());
    assert!(Failed.is_terminal());
    assert!(!VerifyingOnChain.is_terminal());
}

#[test]
fn steps_serialize_snake_case() {
    let json = serde_json::to_string(&AwaitingApprovalSignature).expect("serialize step");
    assert_eq!(json, "\"awaiting_approval_signature\"");
}
