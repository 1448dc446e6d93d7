//! End-to-end orchestration scenarios against scripted capabilities.

use std::sync::Arc;
use std::time::Duration;

use eerc_common::{
    ExternalError, MemoryPreferenceStore, OperationKind, OperationStatus, PreconditionError,
    RawBalance, SessionEvent, WalletConnector,
};
use eerc_test_fixtures::{tokens, tx_hash, Call, Harness, ALICE, BOB, MALLORY};
use eerc_wallet_state::{ConnectionSession, Executor, OrchestratorError};
use ethers_core::types::U256;

async fn connected(h: &Harness) -> Arc<Executor> {
    let session = Arc::new(ConnectionSession::new(
        vec![h.wallet.clone() as Arc<dyn WalletConnector>],
        Arc::new(MemoryPreferenceStore::default()),
        h.config.chain.chain_id,
    ));
    session.connect("injected").await.unwrap();
    let executor = Executor::new(h.config.clone(), session, h.chain.clone(), h.sdk.clone());
    executor.sync().await.unwrap();
    h.log.clear();
    Arc::new(executor)
}

/// Let virtual time run until `kind` reaches `status`.
async fn wait_until(executor: &Executor, kind: OperationKind, status: OperationStatus) {
    while executor.status(kind) != status {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

fn invalid_amount() -> OrchestratorError {
    OrchestratorError::Precondition(PreconditionError::InvalidAmount)
}

#[tokio::test(start_paused = true)]
async fn deposit_sequence_with_zero_allowance() {
    let h = Harness::new();
    let executor = connected(&h).await;
    h.sdk.push_balance(RawBalance {
        decrypted: Some(U256::from(500u64)),
        decimals: Some(2),
    });
    let five = tokens(5, 18);
    let deposit_hash = h.sdk.next_tx_hash();

    let receipt = executor.deposit("5").await.unwrap();

    assert_eq!(receipt.tx_hash, Some(deposit_hash));
    assert_eq!(
        h.log.calls(),
        vec![
            Call::ReadAllowance {
                owner: *ALICE,
                spender: h.config.converter,
            },
            Call::Approve {
                spender: h.config.converter,
                amount: five,
            },
            Call::WaitReceipt(tx_hash(1)),
            Call::Deposit(five),
            Call::WaitReceipt(deposit_hash),
            Call::RefetchBalance,
            Call::ReadBalance,
        ]
    );

    let entries = h.log.entries();
    let refetch = entries[5].0;
    let read = entries[6].0;
    assert!(read - refetch >= h.config.settle.post_operation());
    assert_eq!(executor.view().display_balance.as_deref(), Some("5.00"));
}

#[tokio::test(start_paused = true)]
async fn non_positive_amounts_never_reach_the_chain() {
    let h = Harness::new();
    let executor = connected(&h).await;
    let bob = format!("{:?}", *BOB);

    for amount in ["0", "", "  ", "0.00", "-1", "abc"] {
        assert_eq!(executor.deposit(amount).await.unwrap_err(), invalid_amount());
        assert_eq!(executor.withdraw(amount).await.unwrap_err(), invalid_amount());
        assert_eq!(
            executor.private_transfer(&bob, amount).await.unwrap_err(),
            invalid_amount()
        );
        assert_eq!(executor.approve(amount).await.unwrap_err(), invalid_amount());
    }

    assert_eq!(h.log.count(Call::touches_chain), 0);
    for kind in OperationKind::ALL {
        assert!(!executor.operation(kind).is_busy);
    }
}

#[tokio::test(start_paused = true)]
async fn deposit_converts_with_token_decimals() {
    let h = Harness::new();
    h.chain.set_decimals(Ok(6));
    h.chain.set_allowance(U256::MAX);
    let executor = connected(&h).await;

    executor.deposit("10").await.unwrap();
    assert!(h.log.calls().contains(&Call::Deposit(U256::from(10_000_000u64))));
}

#[tokio::test(start_paused = true)]
async fn deposit_defaults_to_18_decimals_when_read_fails() {
    let h = Harness::new();
    h.chain
        .set_decimals(Err(ExternalError::new("execution reverted")));
    h.chain.set_allowance(U256::MAX);
    let executor = connected(&h).await;

    executor.deposit("10").await.unwrap();
    let expected = U256::from_dec_str("10000000000000000000").unwrap();
    assert!(h.log.calls().contains(&Call::Deposit(expected)));
    assert_eq!(executor.view().erc20_decimals, Some(18));
}

#[tokio::test(start_paused = true)]
async fn unregistered_recipient_blocks_transfer() {
    let h = Harness::new();
    let executor = connected(&h).await;

    let err = executor
        .private_transfer(&format!("{:?}", *MALLORY), "1")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        OrchestratorError::Precondition(PreconditionError::RecipientNotRegistered)
    );
    assert!(h.log.calls().contains(&Call::IsRegistered(*MALLORY)));
    assert_eq!(
        h.log.count(|c| matches!(c, Call::PrivateTransfer(..))),
        0
    );
    assert_eq!(
        executor
            .operation(OperationKind::PrivateTransfer)
            .last_error
            .as_deref(),
        Some("Recipient is not registered in eERC")
    );
}

#[tokio::test(start_paused = true)]
async fn second_deposit_while_confirming_is_rejected() {
    let h = Harness::new();
    h.chain.set_allowance(U256::MAX);
    let executor = connected(&h).await;
    let gate = h.chain.hold_receipts();

    let first = tokio::spawn({
        let executor = Arc::clone(&executor);
        async move { executor.deposit("1").await }
    });
    wait_until(&executor, OperationKind::Deposit, OperationStatus::AwaitingConfirmation).await;
    assert!(executor.operation(OperationKind::Deposit).is_busy);

    let err = executor.deposit("1").await.unwrap_err();
    assert_eq!(err, OrchestratorError::Busy(OperationKind::Deposit));
    assert_eq!(h.log.count(|c| matches!(c, Call::Deposit(_))), 1);

    gate.notify_one();
    let receipt = first.await.unwrap().unwrap();
    assert!(receipt.tx_hash.is_some());
    assert_eq!(h.log.count(|c| matches!(c, Call::Deposit(_))), 1);
    assert_eq!(
        executor.status(OperationKind::Deposit),
        OperationStatus::Succeeded
    );
}

#[tokio::test(start_paused = true)]
async fn different_kinds_run_side_by_side() {
    let h = Harness::new();
    h.chain.set_allowance(U256::MAX);
    let executor = connected(&h).await;
    let gate = h.chain.hold_receipts();

    let deposit = tokio::spawn({
        let executor = Arc::clone(&executor);
        async move { executor.deposit("1").await }
    });
    wait_until(&executor, OperationKind::Deposit, OperationStatus::AwaitingConfirmation).await;

    let withdraw = tokio::spawn({
        let executor = Arc::clone(&executor);
        async move { executor.withdraw("1").await }
    });
    wait_until(&executor, OperationKind::Withdraw, OperationStatus::AwaitingConfirmation).await;

    gate.notify_one();
    gate.notify_one();
    assert!(deposit.await.unwrap().is_ok());
    assert!(withdraw.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn abandoned_deposit_keeps_its_slot_until_confirmed() {
    let h = Harness::new();
    h.chain.set_allowance(U256::MAX);
    let executor = connected(&h).await;
    let gate = h.chain.hold_receipts();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), executor.deposit("1")).await;
    assert!(abandoned.is_err());
    assert_eq!(
        executor.status(OperationKind::Deposit),
        OperationStatus::AwaitingConfirmation
    );

    // the broadcast deposit is still pending; a second one must not go out
    assert_eq!(
        executor.deposit("1").await.unwrap_err(),
        OrchestratorError::Busy(OperationKind::Deposit)
    );
    assert_eq!(h.log.count(|c| matches!(c, Call::Deposit(_))), 1);

    gate.notify_one();
    wait_until(&executor, OperationKind::Deposit, OperationStatus::Succeeded).await;
    assert!(h.log.count(|c| *c == Call::RefetchBalance) >= 1);
    assert!(executor.operation(OperationKind::Deposit).last_tx_hash.is_some());

    gate.notify_one();
    assert!(executor.deposit("1").await.is_ok());
    assert_eq!(h.log.count(|c| matches!(c, Call::Deposit(_))), 2);
}

#[tokio::test(start_paused = true)]
async fn deposit_abandoned_before_broadcast_releases_its_slot() {
    let h = Harness::new();
    let executor = connected(&h).await;
    let gate = h.chain.hold_receipts();

    // parked on the approve receipt, before the deposit is submitted
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), executor.deposit("1")).await;
    assert!(abandoned.is_err());
    assert_eq!(h.log.count(|c| matches!(c, Call::Deposit(_))), 0);
    assert_eq!(
        executor.status(OperationKind::Deposit),
        OperationStatus::Idle
    );
    assert_eq!(
        executor.status(OperationKind::Approve),
        OperationStatus::Idle
    );

    h.chain.set_allowance(U256::MAX);
    gate.notify_one();
    assert!(executor.deposit("1").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn failed_reset_fails_deposit_with_original_reason() {
    let h = Harness::new();
    let executor = connected(&h).await;
    h.wallet.script_send(Err(ExternalError::with_short(
        "ERC20: approve from non-zero to non-zero allowance",
        "execution reverted",
    )));
    h.wallet
        .script_send(Err(ExternalError::with_short("User rejected the request.", "4001")));

    let err = executor.deposit("1").await.unwrap_err();

    assert_eq!(
        err,
        OrchestratorError::Approval("ERC20: approve from non-zero to non-zero allowance".into())
    );
    assert_eq!(h.log.count(|c| matches!(c, Call::Deposit(_))), 0);
    assert_eq!(
        executor.status(OperationKind::Approve),
        OperationStatus::Failed
    );
    assert_eq!(
        executor.status(OperationKind::Deposit),
        OperationStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn wrong_network_aborts_before_any_chain_call() {
    let h = Harness::new();
    h.wallet.set_chain_id(1);
    h.wallet
        .reject_switch(ExternalError::with_short("User rejected the request.", "4001"));
    let executor = connected(&h).await;
    assert!(executor.view().is_wrong_network);

    let err = executor.deposit("1").await.unwrap_err();

    assert_eq!(
        err,
        OrchestratorError::Precondition(PreconditionError::WrongNetwork(
            "Avalanche C-Chain".to_string()
        ))
    );
    assert_eq!(h.log.calls(), vec![Call::SwitchChain(43114)]);
}

#[tokio::test(start_paused = true)]
async fn resync_failure_does_not_fail_the_operation() {
    let h = Harness::new();
    h.chain.set_allowance(U256::MAX);
    let executor = connected(&h).await;
    h.sdk.fail_refetch(ExternalError::new("indexer unavailable"));

    let receipt = executor.deposit("1").await.unwrap();

    assert!(receipt.tx_hash.is_some());
    assert_eq!(
        executor.status(OperationKind::Deposit),
        OperationStatus::Succeeded
    );
    assert_eq!(executor.operation(OperationKind::Deposit).last_error, None);
}

#[tokio::test(start_paused = true)]
async fn reverted_deposit_is_reported() {
    let h = Harness::new();
    h.chain.set_allowance(U256::MAX);
    let executor = connected(&h).await;
    let hash = h.sdk.next_tx_hash();
    h.chain.revert(hash);

    let err = executor.deposit("1").await.unwrap_err();

    assert_eq!(
        err,
        OrchestratorError::Reverted {
            kind: OperationKind::Deposit,
            tx_hash: hash
        }
    );
    assert_eq!(executor.operation(OperationKind::Deposit).last_tx_hash, Some(hash));
    assert_eq!(h.log.count(|c| *c == Call::RefetchBalance), 0);
}

#[tokio::test(start_paused = true)]
async fn account_switch_invalidates_identity_until_resync() {
    let h = Harness::new();
    let executor = connected(&h).await;
    assert!(executor.view().has_decryption_key);

    executor
        .session()
        .apply_event(SessionEvent::AccountsChanged(vec![*BOB]));
    assert!(!executor.view().has_decryption_key);
    assert_eq!(
        executor.deposit("1").await.unwrap_err(),
        OrchestratorError::Precondition(PreconditionError::MissingDecryptionKey)
    );

    executor.sync().await.unwrap();
    assert!(executor.view().has_decryption_key);
}

#[tokio::test(start_paused = true)]
async fn transfer_logs_delta_against_fresh_baseline() {
    let h = Harness::new();
    let executor = connected(&h).await;
    h.sdk.push_balance(RawBalance {
        decrypted: Some(U256::from(1_000u64)),
        decimals: Some(2),
    });
    h.sdk.push_balance(RawBalance {
        decrypted: Some(U256::from(700u64)),
        decimals: Some(2),
    });

    let receipt = executor
        .private_transfer(&format!("{:?}", *BOB), "3")
        .await
        .unwrap();

    assert_eq!(
        receipt.balance.map(|b| b.atomic_value),
        Some(U256::from(700u64))
    );
    let calls = h.log.calls();
    let transfer_at = calls
        .iter()
        .position(|c| matches!(c, Call::PrivateTransfer(..)))
        .unwrap();
    // baseline refresh happens before the transfer is submitted
    assert_eq!(calls[transfer_at - 2], Call::RefetchBalance);
    assert_eq!(calls[transfer_at - 1], Call::ReadBalance);
}
