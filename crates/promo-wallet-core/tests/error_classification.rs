use alloy::primitives::B256;
use promo_wallet_core::{classify_port_error, ActionId, PortError, WalletError};

fn rpc(code: i64, message: &str) -> PortError {
    PortError::Rpc {
        code,
        message: message.to_owned(),
    }
}

#[test]
fn provider_errors_map_onto_taxonomy() {
    assert_eq!(
        classify_port_error(rpc(4001, "User rejected the request.")),
        WalletError::UserRejected
    );
    assert_eq!(
        classify_port_error(rpc(-32000, "MetaMask Tx Signature: User denied transaction signature.")),
        WalletError::UserRejected
    );
    assert_eq!(
        classify_port_error(PortError::UserRejected("declined".to_owned())),
        WalletError::UserRejected
    );
    assert_eq!(
        classify_port_error(rpc(-32000, "insufficient funds for gas * price + value")),
        WalletError::InsufficientFunds
    );
    assert_eq!(
        classify_port_error(rpc(3, "execution reverted: ERC20: transfer amount exceeds balance")),
        WalletError::InsufficientFunds
    );
    assert_eq!(
        classify_port_error(rpc(3, "execution reverted: ERC20: insufficient allowance")),
        WalletError::InsufficientAllowance
    );
    assert!(matches!(
        classify_port_error(rpc(-32602, "invalid address")),
        WalletError::InvalidParams(_)
    ));
    assert!(matches!(
        classify_port_error(rpc(4900, "Disconnected from chain")),
        WalletError::ProviderUnavailable(_)
    ));
    assert!(matches!(
        classify_port_error(PortError::Transport("connection refused".to_owned())),
        WalletError::ProviderUnavailable(_)
    ));
    assert_eq!(
        classify_port_error(rpc(-32000, "nonce too low")),
        WalletError::Submission("nonce too low".to_owned())
    );
}

#[test]
fn queue_errors_are_distinguished() {
    assert!(WalletError::NotActive(ActionId(1)).is_queue_error());
    assert!(WalletError::NotFound("action-9".to_owned()).is_queue_error());
    assert!(!WalletError::UserRejected.is_queue_error());
}

#[test]
fn verification_timeout_is_reported_only() {
    let err = WalletError::VerificationTimeout {
        tx_hash: B256::repeat_byte(0xab),
    };
    assert!(err.is_reported_only());
    assert!(err.to_string().contains("could not be verified"));
    assert!(!WalletError::Reverted {
        tx_hash: B256::ZERO
    }
    .is_reported_only());
}

#[test]
fn errors_serialize_with_kind_tag() {
    let json = serde_json::to_value(WalletError::Cancelled("closed".to_owned()))
        .expect("serialize error");
    assert_eq!(json, serde_json::json!({"kind": "cancelled", "detail": "closed"}));
    let back: WalletError = serde_json::from_value(json).expect("deserialize error");
    assert_eq!(back, WalletError::Cancelled("closed".to_owned()));
}
