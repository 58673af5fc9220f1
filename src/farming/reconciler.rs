// src/farming/reconciler.rs
//! Local mirror of the user's farming positions, patched optimistically as
//! claim and withdraw transactions are confirmed.
//!
//! The snapshot has two write paths: `initialize` replaces it wholesale on every
//! data refresh, `apply_patch` folds a single confirmed action into it. In-flight
//! requests survive a refresh because refreshed data has not yet observed them.
//!
//! All entry points are expected to run on one event thread, each to completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::WalletContext;
use crate::farming::submitter::{submit_action, ActionSubmitter};
use crate::farming::types::{
    ActionKind, ActionPhase, ActionRequest, FarmingError, Position, PositionId, PositionPatch,
    SubmissionOutcome,
};
use crate::ledger::TransactionLedger;

/// A submission handed out by `request_claim`/`request_withdraw`. It owns
/// everything it needs, so the reconciler is not borrowed while it runs.
pub type PendingSubmission = Pin<Box<dyn Future<Output = SubmissionOutcome> + Send>>;

#[derive(Debug, Clone)]
pub struct PositionReconciler {
    snapshot: Option<Vec<Position>>,
    claim: ActionRequest,
    withdraw: ActionRequest,
    refresh_requested: bool,
}

impl Default for PositionReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionReconciler {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            claim: ActionRequest::idle(ActionKind::ClaimReward),
            withdraw: ActionRequest::idle(ActionKind::Withdraw),
            refresh_requested: false,
        }
    }

    /// Replace the snapshot with freshly fetched positions
    pub fn initialize(&mut self, positions: Vec<Position>) {
        log::debug!("Snapshot replaced with {} positions", positions.len());
        self.snapshot = Some(positions);
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> &[Position] {
        self.snapshot.as_deref().unwrap_or(&[])
    }

    pub fn request(&self, kind: ActionKind) -> &ActionRequest {
        match kind {
            ActionKind::ClaimReward => &self.claim,
            ActionKind::Withdraw => &self.withdraw,
        }
    }

    fn request_mut(&mut self, kind: ActionKind) -> &mut ActionRequest {
        match kind {
            ActionKind::ClaimReward => &mut self.claim,
            ActionKind::Withdraw => &mut self.withdraw,
        }
    }

    pub fn phase(&self, kind: ActionKind) -> ActionPhase {
        self.request(kind).phase
    }

    /// Mark an action on `position_id` as in flight.
    /// Returns false, changing nothing, while another action of the same kind is pending.
    fn begin_action(&mut self, kind: ActionKind, position_id: &PositionId) -> bool {
        let request = self.request_mut(kind);
        if request.is_pending() {
            log::warn!(
                "{} on {} ignored: {:?} still pending",
                kind,
                position_id,
                request.position_id
            );
            return false;
        }

        *request = ActionRequest {
            kind,
            position_id: Some(position_id.clone()),
            phase: ActionPhase::Pending,
            submission: None,
        };
        log::info!("{} started for position {}", kind, position_id);
        true
    }

    /// Record what the submitter produced for the pending request of `kind`.
    /// The failure sentinel resets the request straight away.
    pub fn record_submission(&mut self, kind: ActionKind, outcome: SubmissionOutcome) {
        let request = self.request_mut(kind);
        if !request.is_pending() {
            return;
        }

        match outcome {
            SubmissionOutcome::Failed => {
                log::warn!("{} submission failed for {:?}", kind, request.position_id);
                *request = ActionRequest::idle(kind);
            }
            SubmissionOutcome::Sent { hash } => {
                log::info!("{} sent as {}, waiting for confirmation", kind, hash);
                request.submission = Some(SubmissionOutcome::Sent { hash });
            }
        }
    }

    /// Start a reward claim on `position_id`.
    ///
    /// `None` while another claim is pending. Otherwise the request is pending and
    /// the returned submission must be awaited and passed to `register_submission`.
    pub fn request_claim(
        &mut self,
        submitter: Arc<dyn ActionSubmitter>,
        ctx: &WalletContext,
        position_id: &PositionId,
    ) -> Option<PendingSubmission> {
        self.request_action(submitter, ctx, ActionKind::ClaimReward, position_id)
    }

    /// Start a withdrawal of `position_id`; see `request_claim`
    pub fn request_withdraw(
        &mut self,
        submitter: Arc<dyn ActionSubmitter>,
        ctx: &WalletContext,
        position_id: &PositionId,
    ) -> Option<PendingSubmission> {
        self.request_action(submitter, ctx, ActionKind::Withdraw, position_id)
    }

    fn request_action(
        &mut self,
        submitter: Arc<dyn ActionSubmitter>,
        ctx: &WalletContext,
        kind: ActionKind,
        position_id: &PositionId,
    ) -> Option<PendingSubmission> {
        if !self.begin_action(kind, position_id) {
            return None;
        }
        let ctx = ctx.clone();
        let position_id = position_id.clone();
        Some(Box::pin(async move {
            submit_action(submitter.as_ref(), &ctx, kind, &position_id).await
        }))
    }

    /// Store a submission outcome: a sent hash is tracked in `ledger`, the
    /// outcome is recorded and confirmations are folded in right away.
    /// Returns true when the ledger changed.
    pub fn register_submission(
        &mut self,
        ledger: &mut TransactionLedger,
        ctx: &WalletContext,
        kind: ActionKind,
        outcome: SubmissionOutcome,
        now_ms: i64,
    ) -> bool {
        let summary = self
            .request(kind)
            .position_id
            .as_ref()
            .map(|id| format!("{} #{}", kind, id));
        let added = match outcome.hash() {
            Some(hash) => ledger.add_transaction(ctx, hash, summary, now_ms),
            None => false,
        };

        self.record_submission(kind, outcome);
        // The receipt may already be in the ledger
        self.reconcile(ledger, ctx, now_ms);
        added
    }

    /// Fold ledger confirmations into the snapshot. Run after every ledger change.
    ///
    /// Only recently added records carrying a receipt count. Requests without a
    /// matching confirmation stay pending; there is no timeout.
    pub fn reconcile(
        &mut self,
        ledger: &TransactionLedger,
        ctx: &WalletContext,
        now_ms: i64,
    ) -> Vec<PositionPatch> {
        let mut applied = Vec::new();

        for kind in [ActionKind::ClaimReward, ActionKind::Withdraw] {
            let request = self.request(kind);
            if !request.is_pending() {
                continue;
            }

            let failed = matches!(request.submission, Some(SubmissionOutcome::Failed));
            let confirmed = request
                .tracked_hash()
                .map(|hash| ledger.is_recently_confirmed(ctx.chain_id, hash, now_ms))
                .unwrap_or(false);
            let position_id = request.position_id.clone();

            if failed {
                self.reset(kind);
                continue;
            }
            if !confirmed {
                continue;
            }

            self.request_mut(kind).phase = ActionPhase::Done;
            if let Some(id) = position_id {
                let patch = PositionPatch::for_action(kind, id);
                self.apply_patch(&patch);
                applied.push(patch);
            }
        }

        applied
    }

    /// Apply one confirmed effect. Returns false if the position is not in the snapshot.
    pub fn apply_patch(&mut self, patch: &PositionPatch) -> bool {
        let target = patch.position_id();
        let Some(position) = self
            .snapshot
            .as_mut()
            .and_then(|positions| positions.iter_mut().find(|p| &p.id == target))
        else {
            log::warn!("Confirmed action for {} but the position is not in the snapshot", target);
            return false;
        };

        match patch {
            // No further claim is possible until the next refresh
            PositionPatch::RewardClaimed(_) => {
                position.is_actively_staked = false;
            }
            PositionPatch::Withdrawn(_) => {
                position.is_held_by_contract = false;
                position.is_actively_staked = false;
            }
        }
        log::info!("Applied {:?}", patch);
        true
    }

    /// Return a request of `kind` to idle
    pub fn reset(&mut self, kind: ActionKind) {
        *self.request_mut(kind) = ActionRequest::idle(kind);
    }

    fn held_positions(&self, staked: bool) -> Option<Vec<&Position>> {
        let positions: Vec<&Position> = self
            .snapshot
            .as_ref()?
            .iter()
            .filter(|p| p.is_held_by_contract && p.is_actively_staked == staked)
            .collect();
        if positions.is_empty() {
            None
        } else {
            Some(positions)
        }
    }

    /// Positions held by the contract and staked in an incentive; `None` if there are none
    pub fn active_positions(&self) -> Option<Vec<&Position>> {
        self.held_positions(true)
    }

    /// Positions held by the contract but no longer staked; `None` if there are none
    pub fn inactive_positions(&self) -> Option<Vec<&Position>> {
        self.held_positions(false)
    }

    /// The action button for `position_id` should show a loader
    pub fn is_busy(&self, kind: ActionKind, position_id: &PositionId) -> bool {
        let request = self.request(kind);
        request.is_pending() && request.position_id.as_ref() == Some(position_id)
    }

    /// All action buttons of `kind` should be disabled
    pub fn is_locked(&self, kind: ActionKind) -> bool {
        let request = self.request(kind);
        request.position_id.is_some() && request.phase != ActionPhase::Done
    }

    /// True exactly once, on mount: the caller should then fetch positions
    /// and hand the result to `apply_refresh`
    pub fn trigger_refresh(&mut self) -> bool {
        if self.refresh_requested {
            return false;
        }
        self.refresh_requested = true;
        true
    }

    /// Replace the snapshot with a fetch result. A failed fetch keeps the
    /// previous snapshot and hands the error back.
    pub fn apply_refresh(
        &mut self,
        fetched: Result<Vec<Position>, FarmingError>,
    ) -> Result<usize, FarmingError> {
        let positions = fetched?;
        let count = positions.len();
        self.initialize(positions);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farming::subgraph::PositionSource;
    use crate::farming::types::PoolTokens;
    use crate::ledger::TransactionReceipt;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const NOW: i64 = 1_700_000_000_000;

    fn ctx() -> WalletContext {
        WalletContext::new("0x9a1b1d6a17b2c4a9e3e4d1dcc6d0e8f7f2b3c4d5", 100).unwrap()
    }

    fn position(id: u64, staked: bool, held: bool) -> Position {
        Position {
            id: PositionId::from(id),
            is_actively_staked: staked,
            is_held_by_contract: held,
            earned_primary: 1.5,
            earned_bonus: 0.1,
            incentive_end_time: NOW / 1000 - 60,
            has_ended: false,
            pool: PoolTokens { token0: "WXDAI".into(), token1: "ALGB".into() },
            reward_token: "ALGB".into(),
            bonus_reward_token: "USDC".into(),
        }
    }

    fn receipt(hash: &str) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: hash.to_string(),
            block_hash: "0xblock".to_string(),
            block_number: 1,
            status: Some(1),
        }
    }

    fn confirmed_ledger(hash: &str, added_time: i64) -> TransactionLedger {
        let mut ledger = TransactionLedger::new();
        ledger.add_transaction(&ctx(), hash, None, added_time);
        ledger.finalize_transaction(100, hash, receipt(hash), NOW);
        ledger
    }

    struct MockSubmitter {
        outcome: SubmissionOutcome,
        calls: AtomicUsize,
    }

    impl MockSubmitter {
        fn sending(hash: &str) -> Arc<Self> {
            Arc::new(Self { outcome: SubmissionOutcome::Sent { hash: hash.to_string() }, calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { outcome: SubmissionOutcome::Failed, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl ActionSubmitter for MockSubmitter {
        async fn submit_claim(&self, _ctx: &WalletContext, _id: &PositionId) -> SubmissionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }

        async fn submit_withdraw(&self, _ctx: &WalletContext, _id: &PositionId) -> SubmissionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct MockSource {
        batches: Mutex<Vec<Vec<Position>>>,
    }

    #[async_trait]
    impl PositionSource for MockSource {
        async fn fetch_positions(&self, _ctx: &WalletContext) -> Result<Vec<Position>, FarmingError> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                return Err(FarmingError::SubgraphError("no data".into()));
            }
            Ok(batches.remove(0))
        }
    }

    /// Request, submit and register an action the way the dashboard does.
    /// `None` means the request was ignored.
    async fn run_action(
        reconciler: &mut PositionReconciler,
        ledger: &mut TransactionLedger,
        submitter: Arc<dyn ActionSubmitter>,
        kind: ActionKind,
        id: u64,
        at: i64,
    ) -> Option<SubmissionOutcome> {
        let id = PositionId::from(id);
        let submission = match kind {
            ActionKind::ClaimReward => reconciler.request_claim(submitter, &ctx(), &id),
            ActionKind::Withdraw => reconciler.request_withdraw(submitter, &ctx(), &id),
        }?;
        let outcome = submission.await;
        reconciler.register_submission(ledger, &ctx(), kind, outcome.clone(), at);
        Some(outcome)
    }

    #[test]
    fn test_derived_views_partition_held_positions() {
        let mut reconciler = PositionReconciler::new();
        reconciler.initialize(vec![
            position(1, true, true),
            position(2, false, true),
            position(3, false, false),
            position(4, true, true),
        ]);

        let active: Vec<&str> = reconciler.active_positions().unwrap().iter().map(|p| p.id.as_str()).collect();
        let inactive: Vec<&str> = reconciler.inactive_positions().unwrap().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(active, vec!["1", "4"]);
        assert_eq!(inactive, vec!["2"]);

        for p in reconciler.snapshot().iter().filter(|p| p.is_held_by_contract) {
            let in_active = active.contains(&p.id.as_str());
            let in_inactive = inactive.contains(&p.id.as_str());
            assert!(in_active ^ in_inactive);
        }

        reconciler.initialize(vec![position(5, false, true)]);
        assert!(reconciler.active_positions().is_none());
        assert_eq!(reconciler.inactive_positions().unwrap().len(), 1);
    }

    #[test]
    fn test_not_loaded_differs_from_empty() {
        let mut reconciler = PositionReconciler::new();
        assert!(!reconciler.is_loaded());
        assert!(reconciler.active_positions().is_none());

        reconciler.initialize(Vec::new());
        assert!(reconciler.is_loaded());
        assert!(reconciler.active_positions().is_none());
        assert!(reconciler.inactive_positions().is_none());
    }

    #[tokio::test]
    async fn test_claim_while_pending_is_ignored() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(7, true, true), position(8, true, true)]);
        let submitter = MockSubmitter::sending("0xabc");

        let first = run_action(&mut reconciler, &mut ledger, submitter.clone(), ActionKind::ClaimReward, 7, NOW).await;
        assert!(first.is_some());
        let before = reconciler.request(ActionKind::ClaimReward).clone();

        assert!(reconciler.request_claim(submitter.clone(), &ctx(), &PositionId::from(8)).is_none());
        assert_eq!(reconciler.request(ActionKind::ClaimReward), &before);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sent_hash_is_tracked_until_confirmed() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(7, true, true)]);
        let submitter = MockSubmitter::sending("0xabc");

        run_action(&mut reconciler, &mut ledger, submitter, ActionKind::ClaimReward, 7, NOW - 1_000).await;
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);
        assert_eq!(reconciler.request(ActionKind::ClaimReward).tracked_hash(), Some("0xabc"));

        // The receipt poller only looks at hashes the ledger knows about
        assert_eq!(ledger.pending_hashes(100, NOW), vec!["0xabc".to_string()]);
        let record = ledger.get(100, "0xabc").unwrap();
        assert_eq!(record.summary.as_deref(), Some("Claim reward #7"));
        assert_eq!(record.from, ctx().account);

        assert!(ledger.finalize_transaction(100, "0xabc", receipt("0xabc"), NOW));
        let patches = reconciler.reconcile(&ledger, &ctx(), NOW);
        assert_eq!(patches, vec![PositionPatch::RewardClaimed(PositionId::from(7))]);
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Done);
    }

    #[test]
    fn test_register_already_confirmed_submission_completes_at_once() {
        let mut reconciler = PositionReconciler::new();
        reconciler.initialize(vec![position(9, false, true)]);
        let mut ledger = confirmed_ledger("0xw", NOW - 1_000);
        assert!(reconciler.begin_action(ActionKind::Withdraw, &PositionId::from(9)));

        let added = reconciler.register_submission(
            &mut ledger,
            &ctx(),
            ActionKind::Withdraw,
            SubmissionOutcome::Sent { hash: "0xw".into() },
            NOW,
        );
        assert!(!added);
        assert_eq!(reconciler.phase(ActionKind::Withdraw), ActionPhase::Done);
        assert!(!reconciler.snapshot()[0].is_held_by_contract);
    }

    #[tokio::test]
    async fn test_confirmed_claim_marks_done_and_unstakes() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(7, true, true)]);
        let submitter = MockSubmitter::sending("0xabc");
        run_action(&mut reconciler, &mut ledger, submitter, ActionKind::ClaimReward, 7, NOW - 1_000).await;
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);

        ledger.finalize_transaction(100, "0xabc", receipt("0xabc"), NOW);
        let patches = reconciler.reconcile(&ledger, &ctx(), NOW);

        assert_eq!(patches, vec![PositionPatch::RewardClaimed(PositionId::from(7))]);
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Done);
        let p = &reconciler.snapshot()[0];
        assert!(!p.is_actively_staked);
        assert!(p.is_held_by_contract);
        assert!(reconciler.active_positions().is_none());
        assert_eq!(reconciler.inactive_positions().unwrap()[0].id, PositionId::from(7));
    }

    #[tokio::test]
    async fn test_stale_confirmation_leaves_request_pending() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(7, true, true)]);
        let submitter = MockSubmitter::sending("0xabc");
        run_action(&mut reconciler, &mut ledger, submitter, ActionKind::ClaimReward, 7, NOW - 90_000_000).await;
        ledger.finalize_transaction(100, "0xabc", receipt("0xabc"), NOW);

        for later in [NOW, NOW + 60_000, NOW + 86_400_000] {
            assert!(reconciler.reconcile(&ledger, &ctx(), later).is_empty());
            assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);
        }
        assert!(reconciler.snapshot()[0].is_actively_staked);
    }

    #[tokio::test]
    async fn test_unconfirmed_hash_stays_pending() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(7, true, true)]);
        let submitter = MockSubmitter::sending("0xabc");
        run_action(&mut reconciler, &mut ledger, submitter, ActionKind::ClaimReward, 7, NOW - 1_000).await;

        assert!(reconciler.reconcile(&ledger, &ctx(), NOW).is_empty());
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);

        let other = confirmed_ledger("0xdef", NOW - 1_000);
        assert!(reconciler.reconcile(&other, &ctx(), NOW).is_empty());
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);
    }

    #[tokio::test]
    async fn test_claim_and_withdraw_are_independent() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(7, true, true), position(9, false, true)]);
        let claims = MockSubmitter::sending("0xclaim");
        let withdrawals = MockSubmitter::sending("0xwithdraw");

        assert!(run_action(&mut reconciler, &mut ledger, claims, ActionKind::ClaimReward, 7, NOW).await.is_some());
        assert!(run_action(&mut reconciler, &mut ledger, withdrawals, ActionKind::Withdraw, 9, NOW).await.is_some());
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);
        assert_eq!(reconciler.phase(ActionKind::Withdraw), ActionPhase::Pending);
        assert!(reconciler.is_busy(ActionKind::ClaimReward, &PositionId::from(7)));
        assert!(!reconciler.is_busy(ActionKind::ClaimReward, &PositionId::from(9)));
        assert!(reconciler.is_busy(ActionKind::Withdraw, &PositionId::from(9)));
        assert_eq!(ledger.pending_hashes(100, NOW).len(), 2);
    }

    #[tokio::test]
    async fn test_confirmed_withdraw_releases_custody() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(9, false, true)]);
        let submitter = MockSubmitter::sending("0xw");
        run_action(&mut reconciler, &mut ledger, submitter, ActionKind::Withdraw, 9, NOW - 1_000).await;

        ledger.finalize_transaction(100, "0xw", receipt("0xw"), NOW);
        let patches = reconciler.reconcile(&ledger, &ctx(), NOW);
        assert_eq!(patches, vec![PositionPatch::Withdrawn(PositionId::from(9))]);
        assert_eq!(reconciler.phase(ActionKind::Withdraw), ActionPhase::Done);
        assert!(!reconciler.snapshot()[0].is_held_by_contract);
        assert!(reconciler.inactive_positions().is_none());
        assert_eq!(reconciler.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_submission_resets_request() {
        let mut reconciler = PositionReconciler::new();
        let mut ledger = TransactionLedger::new();
        reconciler.initialize(vec![position(7, true, true)]);
        let submitter = MockSubmitter::failing();

        let outcome = run_action(&mut reconciler, &mut ledger, submitter, ActionKind::ClaimReward, 7, NOW).await;
        assert_eq!(outcome, Some(SubmissionOutcome::Failed));
        assert_eq!(reconciler.request(ActionKind::ClaimReward), &ActionRequest::idle(ActionKind::ClaimReward));
        assert!(!reconciler.is_locked(ActionKind::ClaimReward));
        assert!(reconciler.snapshot()[0].is_actively_staked);
        assert!(ledger.transactions(100).is_empty());

        // A new claim can start right away
        let retry = MockSubmitter::sending("0xabc");
        assert!(run_action(&mut reconciler, &mut ledger, retry, ActionKind::ClaimReward, 7, NOW).await.is_some());
    }

    #[test]
    fn test_reconcile_resets_stored_failure() {
        let mut reconciler = PositionReconciler::new();
        reconciler.initialize(vec![position(7, true, true)]);
        assert!(reconciler.begin_action(ActionKind::ClaimReward, &PositionId::from(7)));
        reconciler.claim.submission = Some(SubmissionOutcome::Failed);

        assert!(reconciler.reconcile(&TransactionLedger::new(), &ctx(), NOW).is_empty());
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::None);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut reconciler = PositionReconciler::new();
        reconciler.initialize(vec![position(7, true, true)]);
        reconciler.begin_action(ActionKind::ClaimReward, &PositionId::from(7));
        reconciler.record_submission(ActionKind::ClaimReward, SubmissionOutcome::Sent { hash: "0xabc".into() });

        let ledger = confirmed_ledger("0xabc", NOW - 1_000);
        assert_eq!(reconciler.reconcile(&ledger, &ctx(), NOW).len(), 1);

        // A later refresh brings the position back as staked; replaying the
        // same confirmation must not patch it again.
        reconciler.initialize(vec![position(7, true, true)]);
        assert!(reconciler.reconcile(&ledger, &ctx(), NOW).is_empty());
        reconciler.record_submission(ActionKind::ClaimReward, SubmissionOutcome::Sent { hash: "0xabc".into() });
        assert!(reconciler.reconcile(&ledger, &ctx(), NOW).is_empty());
        assert!(reconciler.snapshot()[0].is_actively_staked);
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Done);
    }

    #[test]
    fn test_refresh_preserves_in_flight_requests() {
        let mut reconciler = PositionReconciler::new();
        reconciler.initialize(vec![position(7, true, true)]);
        reconciler.begin_action(ActionKind::ClaimReward, &PositionId::from(7));
        reconciler.record_submission(ActionKind::ClaimReward, SubmissionOutcome::Sent { hash: "0xabc".into() });

        reconciler.initialize(vec![position(7, true, true), position(8, true, true)]);
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);
        assert_eq!(reconciler.request(ActionKind::ClaimReward).tracked_hash(), Some("0xabc"));

        let ledger = confirmed_ledger("0xabc", NOW - 1_000);
        reconciler.reconcile(&ledger, &ctx(), NOW);
        let active: Vec<&str> = reconciler.active_positions().unwrap().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(active, vec!["8"]);
    }

    #[test]
    fn test_done_request_resets_explicitly_or_on_next_action() {
        let mut reconciler = PositionReconciler::new();
        reconciler.initialize(vec![position(7, true, true), position(8, true, true)]);
        reconciler.begin_action(ActionKind::ClaimReward, &PositionId::from(7));
        reconciler.record_submission(ActionKind::ClaimReward, SubmissionOutcome::Sent { hash: "0xabc".into() });
        reconciler.reconcile(&confirmed_ledger("0xabc", NOW - 1_000), &ctx(), NOW);
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Done);
        assert!(!reconciler.is_locked(ActionKind::ClaimReward));

        assert!(reconciler.begin_action(ActionKind::ClaimReward, &PositionId::from(8)));
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::Pending);
        assert!(reconciler.request(ActionKind::ClaimReward).tracked_hash().is_none());

        reconciler.reset(ActionKind::ClaimReward);
        assert_eq!(reconciler.phase(ActionKind::ClaimReward), ActionPhase::None);
    }

    #[test]
    fn test_patch_for_missing_position_is_reported() {
        let mut reconciler = PositionReconciler::new();
        assert!(!reconciler.apply_patch(&PositionPatch::Withdrawn(PositionId::from(1))));
        reconciler.initialize(vec![position(2, false, true)]);
        assert!(!reconciler.apply_patch(&PositionPatch::Withdrawn(PositionId::from(1))));
        assert!(reconciler.snapshot()[0].is_held_by_contract);
    }

    #[test]
    fn test_record_submission_without_pending_request_is_ignored() {
        let mut reconciler = PositionReconciler::new();
        reconciler.record_submission(ActionKind::Withdraw, SubmissionOutcome::Sent { hash: "0x1".into() });
        assert_eq!(reconciler.request(ActionKind::Withdraw), &ActionRequest::idle(ActionKind::Withdraw));
    }

    #[tokio::test]
    async fn test_trigger_refresh_once_then_refresh_replaces_snapshot() {
        let mut reconciler = PositionReconciler::new();
        assert!(reconciler.trigger_refresh());
        assert!(!reconciler.trigger_refresh());

        let source = MockSource {
            batches: Mutex::new(vec![
                vec![position(1, true, true), position(2, false, true)],
                vec![position(3, true, true)],
            ]),
        };
        let first = source.fetch_positions(&ctx()).await;
        assert_eq!(reconciler.apply_refresh(first).unwrap(), 2);
        assert_eq!(reconciler.snapshot().len(), 2);
        let second = source.fetch_positions(&ctx()).await;
        assert_eq!(reconciler.apply_refresh(second).unwrap(), 1);
        assert_eq!(reconciler.snapshot()[0].id, PositionId::from(3));

        // A failed fetch keeps the previous snapshot
        let failed = source.fetch_positions(&ctx()).await;
        assert!(reconciler.apply_refresh(failed).is_err());
        assert_eq!(reconciler.snapshot().len(), 1);
    }
}
