//! ABI bindings for the reward token and the promotion vault.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};

use crate::domain::{ChainLog, LogFilter, PlanCall, TransactionPlan};
use crate::ports::PortError;

sol! {
    #[derive(Debug)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }

    #[derive(Debug)]
    interface IPromotionVault {
        event VaultCreated(
            uint256 indexed vaultId,
            address indexed promoter,
            address token,
            uint256 totalFunding,
            bytes32 postRef
        );
        event TipSent(
            address indexed from,
            address indexed to,
            address token,
            uint256 amount,
            bytes32 postRef
        );

        function createVault(
            address token,
            uint256 rewardPerSlot,
            uint32 slots,
            uint64 expiry,
            uint32 minFollowers,
            bytes32 postRef
        ) external returns (uint256);

        function tip(address token, address to, uint256 amount, bytes32 postRef) external;
    }
}

pub fn allowance_calldata(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn balance_calldata(owner: Address) -> Bytes {
    IERC20::balanceOfCall { owner }.abi_encode().into()
}

pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn decode_uint_return(data: &[u8]) -> Result<U256, PortError> {
    IERC20::allowanceCall::abi_decode_returns(data, true)
        .map(|ret| ret._0)
        .map_err(|e| PortError::Validation(format!("invalid uint256 return data: {e}")))
}

pub fn primary_calldata(plan: &TransactionPlan) -> Bytes {
    match &plan.call {
        PlanCall::CreatePromotion {
            reward_per_slot,
            slots,
            expiry,
            min_followers,
            post_ref,
        } => IPromotionVault::createVaultCall {
            token: plan.token,
            rewardPerSlot: *reward_per_slot,
            slots: *slots,
            expiry: *expiry,
            minFollowers: *min_followers,
            postRef: *post_ref,
        }
        .abi_encode()
        .into(),
        PlanCall::SendTip {
            recipient,
            post_ref,
        } => IPromotionVault::tipCall {
            token: plan.token,
            to: *recipient,
            amount: plan.amount,
            postRef: *post_ref,
        }
        .abi_encode()
        .into(),
    }
}

/// Log filter for the event that proves `plan`'s primary call was mined.
pub fn confirmation_filter(plan: &TransactionPlan) -> LogFilter {
    let owner = Some(plan.owner.into_word());
    let topics = match &plan.call {
        PlanCall::CreatePromotion { .. } => {
            vec![Some(IPromotionVault::VaultCreated::SIGNATURE_HASH), None, owner]
        }
        PlanCall::SendTip { recipient, .. } => vec![
            Some(IPromotionVault::TipSent::SIGNATURE_HASH),
            owner,
            Some(recipient.into_word()),
        ],
    };
    LogFilter {
        address: plan.contract,
        topics,
        from_block: 0,
        to_block: None,
    }
}

/// Checks a candidate log against the plan's business key.
///
/// Returns `Some(parsed_id)` on a match; the vault id is only present for promotions.
pub fn match_confirmation(plan: &TransactionPlan, log: &ChainLog) -> Option<Option<U256>> {
    if log.address != plan.contract {
        return None;
    }
    match &plan.call {
        PlanCall::CreatePromotion { post_ref, .. } => {
            let event = decode_log::<IPromotionVault::VaultCreated>(log)?;
            (event.promoter == plan.owner
                && event.token == plan.token
                && event.postRef == *post_ref)
                .then_some(Some(event.vaultId))
        }
        PlanCall::SendTip {
            recipient,
            post_ref,
        } => {
            let event = decode_log::<IPromotionVault::TipSent>(log)?;
            (event.from == plan.owner
                && event.to == *recipient
                && event.amount == plan.amount
                && event.postRef == *post_ref)
                .then_some(None)
        }
    }
}

fn decode_log<E: SolEvent>(log: &ChainLog) -> Option<E> {
    if log.topics.first() != Some(&E::SIGNATURE_HASH) {
        return None;
    }
    E::decode_raw_log(log.topics.iter().copied(), &log.data, true).ok()
}

pub fn vault_created_log(
    contract: Address,
    vault_id: U256,
    promoter: Address,
    token: Address,
    total_funding: U256,
    post_ref: B256,
) -> ChainLog {
    let event = IPromotionVault::VaultCreated {
        vaultId: vault_id,
        promoter,
        token,
        totalFunding: total_funding,
        postRef: post_ref,
    };
    ChainLog {
        address: contract,
        topics: vec![
            IPromotionVault::VaultCreated::SIGNATURE_HASH,
            B256::from(vault_id.to_be_bytes::<32>()),
            promoter.into_word(),
        ],
        data: event.encode_data().into(),
        block_number: None,
        transaction_hash: None,
    }
}

pub fn tip_sent_log(
    contract: Address,
    from: Address,
    to: Address,
    token: Address,
    amount: U256,
    post_ref: B256,
) -> ChainLog {
    let event = IPromotionVault::TipSent {
        from,
        to,
        token,
        amount,
        postRef: post_ref,
    };
    ChainLog {
        address: contract,
        topics: vec![
            IPromotionVault::TipSent::SIGNATURE_HASH,
            from.into_word(),
            to.into_word(),
        ],
        data: event.encode_data().into(),
        block_number: None,
        transaction_hash: None,
    }
}
