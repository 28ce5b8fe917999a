//! Sweeps from hot addresses into cold storage.

mod common;

use alloy::primitives::{Address, U256};
use common::*;
use custodial_wallet::blockchain::{ChainTransaction, ChainType};
use custodial_wallet::collection::{CollectionError, SweepOutcome, SweepReceipt};
use custodial_wallet::config::schema::{DebitMode, ScannerConfig};
use custodial_wallet::custody::{AddressRole, AddressStatus, CustodyError, ManagedAddress};
use custodial_wallet::error::ErrorKind;
use custodial_wallet::events::WalletEvent;
use custodial_wallet::ledger::{AdjustmentKind, BillStatus, BillType};

/// Hot address holding 1 ETH on chain and in the ledger, gas at 100 gwei × 100k.
fn funded_hot(h: &Harness) -> Address {
    let hot = h.add_hot_address();
    h.chain.set_balance(hot, eth("1"));
    h.chain.set_gas(100 * GWEI, 100_000);
    h.ledger
        .adjust_balance(&eth_key(hot), eth("1"), AdjustmentKind::Credit)
        .unwrap();
    hot
}

fn submitted(outcome: &SweepOutcome) -> &SweepReceipt {
    match outcome {
        SweepOutcome::Submitted(receipt) => receipt,
        other => panic!("expected a submitted sweep, got {:?}", other),
    }
}

/// Mine the sweep at the next block and let the scanner see it.
async fn mine_sweep(h: &Harness, receipt: &SweepReceipt, success: bool) {
    h.ledger.set_scan_cursor("ETH", h.chain.head()).unwrap();
    h.chain.push_block(vec![(
        ChainTransaction {
            hash: receipt.txid,
            from: receipt.from,
            to: Some(receipt.to),
            value: receipt.amount,
        },
        success,
    )]);
    h.scanner(ScannerConfig::default())
        .scan_currency("ETH")
        .await
        .unwrap();
}

#[tokio::test]
async fn balance_above_threshold_is_swept_to_cold() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let mut events = h.notifier.subscribe();
    let engine = h.collector(collection_config(cold_address())).await;

    let attempts = engine.trigger_once().await;

    assert_eq!(attempts.len(), 1);
    let receipt = submitted(attempts[0].result.as_ref().unwrap()).clone();
    assert_eq!(receipt.from, hot);
    assert_eq!(receipt.to, cold_address());
    assert_eq!(receipt.amount, eth("0.99"));
    assert_eq!(receipt.fee, eth("0.01"));

    let sent = h.chain.submitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].hash, receipt.txid);
    assert_eq!(sent[0].to, Some(cold_address()));
    assert_eq!(sent[0].value, eth("0.99"));
    assert_eq!(sent[0].nonce, 0);
    assert_eq!(sent[0].gas_price, Some(100 * GWEI));
    assert_eq!(sent[0].gas_limit, 100_000);
    assert_eq!(sent[0].chain_id, Some(CHAIN_ID));

    let bill = h.ledger.bill(&receipt.txid).unwrap();
    assert_eq!(bill.bill_type, BillType::Collection);
    assert_eq!(bill.status, BillStatus::Pending);
    assert_eq!(h.ledger.pending_collection(hot, "eth"), Some(receipt.txid));
    // Optimistic debit of amount plus gas.
    assert_eq!(h.balance(hot), U256::ZERO);

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, WalletEvent::CollectionSubmitted { txid, .. } if *txid == receipt.txid)));
}

#[tokio::test]
async fn balance_at_threshold_is_left_alone() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = h.add_hot_address();
    h.chain.set_balance(hot, eth("0.5"));
    let engine = h.collector(collection_config(cold_address())).await;

    let attempts = engine.trigger_once().await;

    assert!(matches!(
        attempts[0].result,
        Ok(SweepOutcome::BelowThreshold { .. })
    ));
    assert!(h.chain.submitted().is_empty());
}

#[tokio::test]
async fn second_pass_skips_an_unconfirmed_sweep() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let engine = h.collector(collection_config(cold_address())).await;

    engine.trigger_once().await;
    let attempts = engine.trigger_once().await;

    assert!(matches!(
        &attempts[0].result,
        Err(CollectionError::SweepInFlight { address, .. }) if *address == hot
    ));
    assert_eq!(h.chain.submitted().len(), 1);
}

#[tokio::test]
async fn concurrent_forced_sweeps_submit_once() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let engine = h.collector(collection_config(cold_address())).await;
    let target = format!("{:#x}", hot);

    let (a, b) = tokio::join!(
        engine.collect_from_address("ETH", &target),
        engine.collect_from_address("ETH", &target),
    );

    let results = [a, b];
    let sent = results
        .iter()
        .filter(|r| matches!(r, Ok(SweepOutcome::Submitted(_))))
        .count();
    let in_flight = results
        .iter()
        .filter(|r| matches!(r, Err(CollectionError::SweepInFlight { .. })))
        .count();
    assert_eq!((sent, in_flight), (1, 1));
    assert_eq!(h.chain.submitted().len(), 1);
}

#[tokio::test]
async fn forced_sweep_ignores_threshold_but_not_zero_balance() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = h.add_hot_address();
    h.chain.set_gas(GWEI, 21_000);
    let engine = h.collector(collection_config(cold_address())).await;
    let target = format!("{:#x}", hot);

    let err = engine.collect_from_address("ETH", &target).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    h.chain.set_balance(hot, eth("0.1"));
    let outcome = engine.collect_from_address("ETH", &target).await.unwrap();
    let receipt = submitted(&outcome);
    assert_eq!(receipt.amount, eth("0.1") - U256::from(21_000u128 * GWEI));

    let err = engine.collect_from_address("DOGE", &target).await.unwrap_err();
    assert!(matches!(err, CollectionError::UnknownCurrency(_)));
    let err = engine.collect_from_address("ETH", "nope").await.unwrap_err();
    assert!(matches!(err, CollectionError::InvalidAddress(_)));
}

#[tokio::test]
async fn balance_that_cannot_cover_gas_is_not_signed() {
    let mut currency = eth_currency(0);
    currency.collection_threshold = "0.001".to_string();
    let h = Harness::new(vec![currency]);
    let hot = h.add_hot_address();
    h.chain.set_balance(hot, eth("0.005"));
    h.chain.set_gas(100 * GWEI, 100_000);
    let engine = h.collector(collection_config(cold_address())).await;

    let attempts = engine.trigger_once().await;

    match &attempts[0].result {
        Err(CollectionError::InsufficientForGas { balance, gas_cost }) => {
            assert_eq!(*balance, eth("0.005"));
            assert_eq!(*gas_cost, eth("0.01"));
        }
        other => panic!("expected InsufficientForGas, got {:?}", other),
    }
    assert!(h.chain.submitted().is_empty());
    assert_eq!(h.ledger.bill_count(), 0);
}

#[tokio::test]
async fn missing_key_only_skips_its_own_address() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let keyless = Address::with_last_byte(0x22);
    h.book
        .insert(ManagedAddress::new(keyless, ChainType::Ethereum, AddressRole::Hot));
    h.chain.set_balance(keyless, eth("1"));
    let engine = h.collector(collection_config(cold_address())).await;

    let attempts = engine.trigger_once().await;

    assert_eq!(attempts.len(), 2);
    let keyless_attempt = attempts.iter().find(|a| a.address == keyless).unwrap();
    assert!(matches!(
        keyless_attempt.result,
        Err(CollectionError::Key(CustodyError::KeyUnavailable { .. }))
    ));
    let hot_attempt = attempts.iter().find(|a| a.address == hot).unwrap();
    assert!(matches!(hot_attempt.result, Ok(SweepOutcome::Submitted(_))));
    assert_eq!(h.chain.submitted().len(), 1);
}

#[tokio::test]
async fn frozen_and_deposit_addresses_are_not_swept() {
    let h = Harness::new(vec![eth_currency(0)]);
    let frozen = Address::with_last_byte(0x33);
    h.book.insert(
        ManagedAddress::new(frozen, ChainType::Ethereum, AddressRole::Hot)
            .with_status(AddressStatus::Frozen),
    );
    h.chain.set_balance(frozen, eth("5"));
    h.chain.set_balance(deposit_address(), eth("5"));
    let engine = h.collector(collection_config(cold_address())).await;

    assert!(engine.trigger_once().await.is_empty());
    assert!(h.chain.submitted().is_empty());
}

#[tokio::test]
async fn unusable_cold_address_refuses_to_sign() {
    let h = Harness::new(vec![eth_currency(0)]);
    funded_hot(&h);
    let engine = h.collector(collection_config(Address::ZERO)).await;

    let attempts = engine.trigger_once().await;

    assert!(matches!(
        attempts[0].result,
        Err(CollectionError::ColdAddressInvalid(_))
    ));
    assert!(h.chain.submitted().is_empty());
    assert!(engine.status().cold_address.is_none());
}

#[tokio::test]
async fn gas_price_ceiling_blocks_the_sweep() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    h.chain.set_gas(900 * GWEI, 21_000);
    let engine = h.collector(collection_config(cold_address())).await;

    let err = engine
        .collect_from_address("ETH", &format!("{:#x}", hot))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::GasPriceTooHigh);
    assert!(h.chain.submitted().is_empty());
}

#[tokio::test]
async fn confirmation_does_not_debit_twice() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let engine = h.collector(collection_config(cold_address())).await;

    let attempts = engine.trigger_once().await;
    let receipt = submitted(attempts[0].result.as_ref().unwrap()).clone();
    assert_eq!(h.balance(hot), U256::ZERO);

    h.chain.set_balance(hot, U256::ZERO);
    mine_sweep(&h, &receipt, true).await;

    let bill = h.ledger.bill(&receipt.txid).unwrap();
    assert_eq!(bill.status, BillStatus::Confirmed);
    assert_eq!(bill.bill_type, BillType::Collection);
    assert_eq!(h.balance(hot), U256::ZERO);
    assert_eq!(h.ledger.pending_collection(hot, "ETH"), None);

    let attempts = engine.trigger_once().await;
    assert!(matches!(
        attempts[0].result,
        Ok(SweepOutcome::BelowThreshold { .. })
    ));
}

#[tokio::test]
async fn reverted_sweep_refunds_all_but_the_fee() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let engine = h.collector(collection_config(cold_address())).await;

    let attempts = engine.trigger_once().await;
    let receipt = submitted(attempts[0].result.as_ref().unwrap()).clone();
    mine_sweep(&h, &receipt, false).await;

    assert_eq!(h.ledger.bill(&receipt.txid).unwrap().status, BillStatus::Failed);
    assert_eq!(h.balance(hot), eth("0.99"));
    assert_eq!(h.ledger.pending_collection(hot, "ETH"), None);
}

#[tokio::test]
async fn sweep_replaced_at_its_nonce_is_failed_and_retried() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let engine = h.collector(collection_config(cold_address())).await;
    let scanner = h.scanner(ScannerConfig::default());

    let attempts = engine.trigger_once().await;
    let first = submitted(attempts[0].result.as_ref().unwrap()).clone();
    assert_eq!(h.balance(hot), U256::ZERO);

    // Blocks go by without the sweep while it is still queued.
    for _ in 0..3 {
        h.chain.push_block(Vec::new());
        scanner.refresh_confirmations().await.unwrap();
    }
    assert!(matches!(
        engine.trigger_once().await[0].result,
        Err(CollectionError::SweepInFlight { .. })
    ));

    // Another transaction from the hot address is mined at nonce 0.
    h.chain.set_nonce(hot, 1);
    let mut events = h.notifier.subscribe();
    let attempts = engine.trigger_once().await;

    let expired = h.ledger.bill(&first.txid).unwrap();
    assert_eq!(expired.status, BillStatus::Failed);
    assert_eq!(expired.fee, U256::ZERO);
    let retry = submitted(attempts[0].result.as_ref().unwrap()).clone();
    assert_ne!(retry.txid, first.txid);
    assert_eq!(retry.nonce, 1);
    assert_eq!(h.ledger.pending_collection(hot, "ETH"), Some(retry.txid));
    // Refunded in full, then debited again for the new sweep.
    assert_eq!(h.balance(hot), U256::ZERO);

    let refunds = drain(&mut events)
        .into_iter()
        .filter(|e| {
            matches!(e, WalletEvent::BalanceChanged { kind: AdjustmentKind::Credit, amount, .. } if *amount == eth("1"))
        })
        .count();
    assert_eq!(refunds, 1);
}

#[tokio::test]
async fn dropped_sweep_expires_after_the_timeout() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let mut config = collection_config(cold_address());
    config.pending_sweep_timeout_secs = 1;
    let engine = h.collector(config).await;

    let attempts = engine.trigger_once().await;
    let first = submitted(attempts[0].result.as_ref().unwrap()).clone();
    assert!(matches!(
        engine.trigger_once().await[0].result,
        Err(CollectionError::SweepInFlight { .. })
    ));

    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
    h.chain.set_balance(hot, eth("0.8"));
    let attempts = engine.trigger_once().await;

    assert_eq!(h.ledger.bill(&first.txid).unwrap().status, BillStatus::Failed);
    let retry = submitted(attempts[0].result.as_ref().unwrap()).clone();
    assert_eq!(retry.nonce, 0);
    assert_eq!(retry.amount, eth("0.79"));
    assert_eq!(h.ledger.pending_collection(hot, "ETH"), Some(retry.txid));
    // 1 ETH refunded, 0.8 ETH debited for the smaller resend.
    assert_eq!(h.balance(hot), eth("0.2"));
}

#[tokio::test]
async fn disabled_timeout_keeps_a_dropped_sweep_in_flight() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let mut config = collection_config(cold_address());
    config.pending_sweep_timeout_secs = 0;
    let engine = h.collector(config).await;

    let first = submitted(engine.trigger_once().await[0].result.as_ref().unwrap()).clone();
    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

    assert!(matches!(
        &engine.trigger_once().await[0].result,
        Err(CollectionError::SweepInFlight { txid, .. }) if *txid == first.txid
    ));
    assert_eq!(h.balance(hot), U256::ZERO);
}

#[tokio::test]
async fn identical_resend_of_a_dropped_sweep_reopens_its_bill() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let mut config = collection_config(cold_address());
    config.pending_sweep_timeout_secs = 1;
    let engine = h.collector(config).await;

    let first = submitted(engine.trigger_once().await[0].result.as_ref().unwrap()).clone();
    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
    let retry = submitted(engine.trigger_once().await[0].result.as_ref().unwrap()).clone();

    assert_eq!(retry.txid, first.txid);
    assert_eq!(h.chain.submitted().len(), 2);
    assert_eq!(h.ledger.bill(&first.txid).unwrap().status, BillStatus::Pending);
    assert_eq!(h.ledger.pending_collection(hot, "ETH"), Some(first.txid));
    assert_eq!(h.balance(hot), U256::ZERO);

    // Mined after all: settles like any other sweep.
    mine_sweep(&h, &retry, true).await;
    assert_eq!(h.ledger.bill(&first.txid).unwrap().status, BillStatus::Confirmed);
    assert_eq!(h.balance(hot), U256::ZERO);
}

#[tokio::test]
async fn on_confirmation_mode_debits_only_when_mined() {
    let h = Harness::new(vec![eth_currency(0)]);
    let hot = funded_hot(&h);
    let mut config = collection_config(cold_address());
    config.debit_mode = DebitMode::OnConfirmation;
    let engine = h.collector(config).await;

    let attempts = engine.trigger_once().await;
    let receipt = submitted(attempts[0].result.as_ref().unwrap()).clone();
    assert_eq!(h.balance(hot), eth("1"));

    mine_sweep(&h, &receipt, true).await;
    assert_eq!(h.balance(hot), U256::ZERO);
}

#[tokio::test]
async fn collection_loop_starts_once_and_stops() {
    let h = Harness::new(vec![eth_currency(0)]);
    funded_hot(&h);
    let engine = h.collector(collection_config(cold_address())).await;

    engine
        .start_loop(std::time::Duration::from_millis(20))
        .unwrap();
    let err = engine
        .start_loop(std::time::Duration::from_millis(20))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRunning);

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    engine.stop_and_wait().await;

    assert!(!engine.is_running());
    // Later passes find the sweep in flight.
    assert_eq!(h.chain.submitted().len(), 1);
}
