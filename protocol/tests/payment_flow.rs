//! Integration tests for the payment, earn and top-up flows.
//!
//! The chain and the wallet are in-memory fakes; profiles and the ledger
//! live in a temporary sled database. Each test builds its own world.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use alloy_primitives::{address, Address, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use yieldpay_protocol::chain::{
    BatchReceipt, BatchStatus, BatchSubmitter, ChainReader, SubmissionHandle,
};
use yieldpay_protocol::config::{Addresses, TOP_UP_AMOUNT_MINOR, WITHDRAW_ALL};
use yieldpay_protocol::evm::{erc20, pool};
use yieldpay_protocol::payment::{
    ApySource, PaymentError, PaymentRequest, PaymentService, ServiceConfig,
};
use yieldpay_protocol::routing::{CallBatch, CallKind, RoutingError};
use yieldpay_protocol::storage::{
    AppDb, LedgerSink, NewTransaction, StoreError, StoreResult, TransactionRecord,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

const ALICE: Address = address!("a11ce00000000000000000000000000000000001");
const BOB: Address = address!("b0b0000000000000000000000000000000000002");

const ALICE_ID: &str = "alice@example.com";
const BOB_ID: &str = "bob@example.com";

fn usdc(whole: u64) -> U256 {
    U256::from(whole * 1_000_000)
}

#[derive(Default)]
struct FakeChain {
    balances: Mutex<HashMap<(Address, Address), U256>>,
    allowance: Mutex<U256>,
    rate: Mutex<Option<U256>>,
    fail_reads: AtomicBool,
    rate_reads: AtomicUsize,
}

impl FakeChain {
    fn set_balance(&self, token: Address, owner: Address, amount: U256) {
        self.balances.lock().insert((token, owner), amount);
    }

    fn check(&self) -> Result<(), RoutingError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RoutingError::UpstreamUnavailable("rpc timeout".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, RoutingError> {
        self.check()?;
        Ok(self
            .balances
            .lock()
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(&self, _: Address, _: Address, _: Address) -> Result<U256, RoutingError> {
        self.check()?;
        Ok(*self.allowance.lock())
    }

    async fn liquidity_rate(&self, _: Address, _: Address) -> Result<U256, RoutingError> {
        self.rate_reads.fetch_add(1, Ordering::SeqCst);
        self.rate
            .lock()
            .ok_or_else(|| RoutingError::UpstreamUnavailable("no reserve".into()))
    }
}

struct FakeWallet {
    submitted: Mutex<Vec<(Address, CallBatch)>>,
    status: Mutex<BatchStatus>,
}

impl Default for FakeWallet {
    fn default() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            status: Mutex::new(BatchStatus::Confirmed),
        }
    }
}

impl FakeWallet {
    fn batches(&self) -> Vec<(Address, CallBatch)> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl BatchSubmitter for FakeWallet {
    async fn submit_atomic_batch(
        &self,
        from: Address,
        batch: &CallBatch,
    ) -> Result<SubmissionHandle, RoutingError> {
        let mut submitted = self.submitted.lock();
        submitted.push((from, batch.clone()));
        Ok(SubmissionHandle {
            id: format!("calls-{}", submitted.len()),
        })
    }

    async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<BatchReceipt, RoutingError> {
        let n: u64 = handle.id.trim_start_matches("calls-").parse().unwrap();
        Ok(BatchReceipt {
            tx_hash: format!("0x{:064x}", n),
            status: *self.status.lock(),
        })
    }
}

struct BrokenLedger;

impl LedgerSink for BrokenLedger {
    fn append(&self, _: NewTransaction) -> StoreResult<TransactionRecord> {
        Err(StoreError::Serialization("disk full".into()))
    }
}

type Service = PaymentService<Arc<FakeChain>, Arc<FakeWallet>>;

struct World {
    service: Service,
    chain: Arc<FakeChain>,
    wallet: Arc<FakeWallet>,
    db: AppDb,
    addrs: Addresses,
}

fn world_with_ledger(ledger: Option<Arc<dyn LedgerSink>>) -> World {
    let db = AppDb::open_temporary().unwrap();
    db.profiles()
        .get_or_create(ALICE_ID, Some(&ALICE.to_string()))
        .unwrap();
    db.profiles()
        .get_or_create(BOB_ID, Some(&BOB.to_string()))
        .unwrap();

    let chain = Arc::new(FakeChain::default());
    let wallet = Arc::new(FakeWallet::default());
    let addrs = Addresses::default();
    let ledger = ledger.unwrap_or_else(|| Arc::new(db.ledger().clone()) as Arc<dyn LedgerSink>);

    let service = PaymentService::new(
        Arc::clone(&chain),
        Arc::clone(&wallet),
        db.profiles().clone(),
        ledger,
        ServiceConfig::default(),
    );
    World {
        service,
        chain,
        wallet,
        db,
        addrs,
    }
}

fn world() -> World {
    world_with_ledger(None)
}

fn pay(amount: &str) -> PaymentRequest {
    PaymentRequest {
        from_user_id: ALICE_ID.into(),
        to_user_id: BOB_ID.into(),
        amount: amount.into(),
        message: Some("rent".into()),
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn liquid_to_liquid_is_a_single_transfer() {
    let w = world();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(100));

    let outcome = w.service.send_payment(pay("50")).await.unwrap();
    assert_eq!(outcome.batch.kinds, vec![CallKind::Transfer]);
    assert_eq!(outcome.amount, "50");
    assert!(outcome.recorded);
    assert!(outcome.batch.explorer_url.ends_with(&outcome.batch.tx_hash));

    let batches = w.wallet.batches();
    assert_eq!(batches.len(), 1);
    let (from, batch) = &batches[0];
    assert_eq!(*from, ALICE);
    assert_eq!(batch.calls()[0].target(), w.addrs.liquid_token);
    assert_eq!(*batch.calls()[0].data(), erc20::transfer(BOB, usdc(50)));

    let feed = w.db.ledger().recent_for_user_default(BOB_ID).unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].amount, "50.000000");
    assert_eq!(feed[0].message.as_deref(), Some("rent"));
    assert_eq!(feed[0].is_sent, Some(false));
}

#[tokio::test]
async fn earning_recipient_gets_supplied_shortfall() {
    let w = world();
    w.db.profiles().set_earning_yield(BOB_ID, true).unwrap();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(5));
    w.chain.set_balance(w.addrs.yield_token, ALICE, usdc(10));

    let outcome = w.service.send_payment(pay("12")).await.unwrap();
    assert_eq!(
        outcome.batch.kinds,
        vec![CallKind::Approve, CallKind::Supply, CallKind::Transfer]
    );

    let batches = w.wallet.batches();
    let (_, batch) = &batches[0];
    assert_eq!(*batch.calls()[0].data(), erc20::approve(w.addrs.pool, usdc(2)));
    assert_eq!(
        *batch.calls()[1].data(),
        pool::supply(w.addrs.liquid_token, usdc(2), ALICE, 0)
    );
    assert_eq!(batch.calls()[2].target(), w.addrs.yield_token);
    assert_eq!(*batch.calls()[2].data(), erc20::transfer(BOB, usdc(12)));
}

#[tokio::test]
async fn existing_allowance_skips_approve() {
    let w = world();
    w.db.profiles().set_earning_yield(BOB_ID, true).unwrap();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(5));
    w.chain.set_balance(w.addrs.yield_token, ALICE, usdc(10));
    *w.chain.allowance.lock() = usdc(1_000);

    let outcome = w.service.send_payment(pay("12")).await.unwrap();
    assert_eq!(outcome.batch.kinds, vec![CallKind::Supply, CallKind::Transfer]);
}

#[tokio::test]
async fn liquid_recipient_gets_withdrawn_shortfall() {
    let w = world();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(3));
    w.chain.set_balance(w.addrs.yield_token, ALICE, usdc(20));

    let outcome = w.service.send_payment(pay("10.5")).await.unwrap();
    assert_eq!(outcome.batch.kinds, vec![CallKind::Withdraw, CallKind::Transfer]);

    let batches = w.wallet.batches();
    let (_, batch) = &batches[0];
    assert_eq!(
        *batch.calls()[0].data(),
        pool::withdraw(w.addrs.liquid_token, U256::from(7_500_000u64), ALICE)
    );
}

#[tokio::test]
async fn insufficient_balance_submits_nothing() {
    let w = world();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(5));
    w.chain.set_balance(w.addrs.yield_token, ALICE, usdc(5));

    let err = w.service.send_payment(pay("10.01")).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::Routing(RoutingError::InsufficientBalance { .. })
    ));
    assert!(w.wallet.batches().is_empty());
    assert!(w.db.ledger().is_empty());
}

#[tokio::test]
async fn invalid_amount_rejected_before_reads() {
    let w = world();
    w.chain.fail_reads.store(true, Ordering::SeqCst);
    for bad in ["0", "-1", "abc", "1.0000001"] {
        let err = w.service.send_payment(pay(bad)).await.unwrap_err();
        assert!(
            matches!(err, PaymentError::Routing(RoutingError::InvalidAmount(_))),
            "{bad:?} gave {err}"
        );
    }
}

#[tokio::test]
async fn reverted_batch_records_nothing() {
    let w = world();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(100));
    *w.wallet.status.lock() = BatchStatus::Reverted;

    let err = w.service.send_payment(pay("1")).await.unwrap_err();
    match err {
        PaymentError::Routing(RoutingError::BatchReverted { tx_hash, .. }) => {
            assert!(tx_hash.is_some());
        }
        other => panic!("expected revert, got {other}"),
    }
    assert!(w.db.ledger().is_empty());
}

#[tokio::test]
async fn read_failure_is_retryable_and_submits_nothing() {
    let w = world();
    w.chain.fail_reads.store(true, Ordering::SeqCst);

    let err = w.service.send_payment(pay("1")).await.unwrap_err();
    match err {
        PaymentError::Routing(e) => assert!(e.is_retryable()),
        other => panic!("unexpected {other}"),
    }
    assert!(w.wallet.batches().is_empty());
}

#[tokio::test]
async fn ledger_failure_does_not_fail_payment() {
    let w = world_with_ledger(Some(Arc::new(BrokenLedger)));
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(100));

    let outcome = w.service.send_payment(pay("1")).await.unwrap();
    assert!(!outcome.recorded);
    assert_eq!(w.wallet.batches().len(), 1);
}

#[tokio::test]
async fn overlong_message_rejected_before_submission() {
    let w = world();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(100));
    let mut req = pay("1");
    req.message = Some("x".repeat(501));

    let err = w.service.send_payment(req).await.unwrap_err();
    assert!(matches!(err, PaymentError::MessageTooLong(501)));
    assert!(w.wallet.batches().is_empty());
}

#[tokio::test]
async fn unknown_or_addressless_users_are_rejected() {
    let w = world();
    w.db.profiles().get_or_create("carol@example.com", None).unwrap();

    let mut req = pay("1");
    req.to_user_id = "nobody@example.com".into();
    assert!(matches!(
        w.service.send_payment(req).await,
        Err(PaymentError::UnknownUser(_))
    ));

    let mut req = pay("1");
    req.to_user_id = "carol@example.com".into();
    assert!(matches!(
        w.service.send_payment(req).await,
        Err(PaymentError::NoPaymentAddress(_))
    ));
}

#[tokio::test]
async fn quote_routes_without_submitting() {
    let w = world();
    w.db.profiles().set_earning_yield(BOB_ID, true).unwrap();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(5));
    w.chain.set_balance(w.addrs.yield_token, ALICE, usdc(10));

    let quote = w.service.quote_payment(&pay("12")).await.unwrap();
    assert_eq!(quote.conversions, 1);
    assert_eq!(quote.calls.len(), 3);
    assert_eq!(quote.liquid_balance, "5");
    assert_eq!(quote.yielding_balance, "10");
    assert!(w.wallet.batches().is_empty());
}

// ---------------------------------------------------------------------------
// Earning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enabling_earning_supplies_full_liquid_balance() {
    let w = world();
    w.chain
        .set_balance(w.addrs.liquid_token, ALICE, U256::from(42_123_456u64));

    let outcome = w.service.set_earning(ALICE_ID, true).await.unwrap();
    assert!(outcome.profile.is_earning_yield);
    let batch = outcome.batch.unwrap();
    assert_eq!(batch.kinds, vec![CallKind::Approve, CallKind::Supply]);

    let batches = w.wallet.batches();
    let (_, submitted) = &batches[0];
    assert_eq!(
        *submitted.calls()[1].data(),
        pool::supply(w.addrs.liquid_token, U256::from(42_123_456u64), ALICE, 0)
    );
}

#[tokio::test]
async fn enabling_with_empty_balance_fails_and_keeps_flag() {
    let w = world();
    let err = w.service.set_earning(ALICE_ID, true).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::Routing(RoutingError::NothingToSupply)
    ));
    assert!(!w.db.profiles().get(ALICE_ID).unwrap().unwrap().is_earning_yield);
}

#[tokio::test]
async fn disabling_earning_withdraws_everything() {
    let w = world();
    w.db.profiles().set_earning_yield(ALICE_ID, true).unwrap();
    w.chain.set_balance(w.addrs.yield_token, ALICE, usdc(7));

    let outcome = w.service.set_earning(ALICE_ID, false).await.unwrap();
    assert!(!outcome.profile.is_earning_yield);

    let batches = w.wallet.batches();
    let (_, submitted) = &batches[0];
    assert_eq!(submitted.kinds(), vec![CallKind::Withdraw]);
    assert_eq!(
        *submitted.calls()[0].data(),
        pool::withdraw(w.addrs.liquid_token, WITHDRAW_ALL, ALICE)
    );
}

#[tokio::test]
async fn disabling_with_nothing_deposited_only_flips_flag() {
    let w = world();
    w.db.profiles().set_earning_yield(ALICE_ID, true).unwrap();

    let outcome = w.service.set_earning(ALICE_ID, false).await.unwrap();
    assert!(outcome.batch.is_none());
    assert!(!outcome.profile.is_earning_yield);
    assert!(w.wallet.batches().is_empty());
}

#[tokio::test]
async fn reverted_earn_toggle_leaves_flag() {
    let w = world();
    w.chain.set_balance(w.addrs.liquid_token, ALICE, usdc(10));
    *w.wallet.status.lock() = BatchStatus::Reverted;

    assert!(w.service.set_earning(ALICE_ID, true).await.is_err());
    assert!(!w.db.profiles().get(ALICE_ID).unwrap().unwrap().is_earning_yield);
}

#[tokio::test]
async fn sync_follows_yielding_balance() {
    let w = world();
    w.chain
        .set_balance(w.addrs.yield_token, ALICE, U256::from(10_001u64));
    let p = w.service.sync_earning_status(ALICE_ID).await.unwrap();
    assert!(p.is_earning_yield);

    // At the threshold counts as not earning.
    w.chain
        .set_balance(w.addrs.yield_token, ALICE, U256::from(10_000u64));
    let p = w.service.sync_earning_status(ALICE_ID).await.unwrap();
    assert!(!p.is_earning_yield);
}

// ---------------------------------------------------------------------------
// Top-up, balances, APY
// ---------------------------------------------------------------------------

#[tokio::test]
async fn top_up_mints_to_self() {
    let w = world();
    let outcome = w.service.top_up(ALICE_ID).await.unwrap();
    assert_eq!(outcome.kinds, vec![CallKind::Mint]);

    let batches = w.wallet.batches();
    let (from, batch) = &batches[0];
    assert_eq!(*from, ALICE);
    assert_eq!(
        *batch.calls()[0].data(),
        erc20::mint(ALICE, U256::from(TOP_UP_AMOUNT_MINOR))
    );
}

#[tokio::test]
async fn wallet_balance_breakdown() {
    let w = world();
    w.chain
        .set_balance(w.addrs.liquid_token, ALICE, U256::from(12_345_678u64));
    w.chain
        .set_balance(w.addrs.yield_token, ALICE, U256::from(1_000_000u64));

    let b = w.service.wallet_balance(ALICE).await.unwrap();
    assert_eq!(b.liquid, "12.345678");
    assert_eq!(b.liquid_display, "12.34");
    assert_eq!(b.yielding_display, "1.00");
    assert_eq!(b.total_display, "13.34");
    assert!(b.is_earning);
}

#[tokio::test]
async fn apy_is_cached_and_falls_back() {
    let w = world();
    let ray = U256::from(10u64).pow(U256::from(27u64));
    *w.chain.rate.lock() = Some(ray * U256::from(35u64) / U256::from(1_000u64));

    let first = w.service.current_apy().await;
    assert_eq!(first.basis_points, 350);
    assert_eq!(first.source, ApySource::Pool);
    let _ = w.service.current_apy().await;
    assert_eq!(w.chain.rate_reads.load(Ordering::SeqCst), 1);

    let fresh = world();
    let fallback = fresh.service.current_apy().await;
    assert_eq!(fallback.source, ApySource::Fallback);
    assert_eq!(fallback.apy, "3.50");
}
