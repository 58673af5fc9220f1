use dioxus::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::context::WalletContext;
use crate::farming::format::{format_end_time, format_reward};
use crate::farming::{ActionKind, ActionPhase, Position, PositionId, PositionReconciler};
use crate::ledger::TransactionLedger;
use crate::rpc::apply_receipts;
use crate::storage::{load_ledger, save_ledger};
use crate::FarmingServices;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn persist(ledger: &TransactionLedger) {
    if let Err(e) = save_ledger(ledger) {
        log::error!("Failed to persist transactions: {}", e);
    }
}

fn start_refresh(
    ctx: WalletContext,
    services: Arc<FarmingServices>,
    mut reconciler: Signal<PositionReconciler>,
    mut refreshing: Signal<bool>,
    mut error_message: Signal<Option<String>>,
) {
    refreshing.set(true);
    spawn(async move {
        let fetched = services.source.fetch_positions(&ctx).await;
        let result = reconciler.write().apply_refresh(fetched);
        match result {
            Ok(_) => error_message.set(None),
            Err(e) => {
                log::error!("Failed to load farming positions: {}", e);
                error_message.set(Some(format!("Failed to load positions: {}", e)));
            }
        }
        refreshing.set(false);
    });
}

fn start_action(
    kind: ActionKind,
    position_id: PositionId,
    ctx: WalletContext,
    services: Arc<FarmingServices>,
    mut reconciler: Signal<PositionReconciler>,
    mut ledger: Signal<TransactionLedger>,
) {
    let submitter = services.submitter.clone();
    let submission = match kind {
        ActionKind::ClaimReward => reconciler.write().request_claim(submitter, &ctx, &position_id),
        ActionKind::Withdraw => reconciler.write().request_withdraw(submitter, &ctx, &position_id),
    };
    let Some(submission) = submission else {
        return;
    };

    spawn(async move {
        let outcome = submission.await;
        let mut ledger_guard = ledger.write();
        let added = reconciler
            .write()
            .register_submission(&mut ledger_guard, &ctx, kind, outcome, now_ms());
        if added {
            persist(&ledger_guard);
        }
    });
}

#[component]
fn SkeletonRows() -> Element {
    rsx! {
        div {
            class: "stakes",
            for i in 0..3 {
                div {
                    key: "{i}",
                    class: "stake",
                    div { class: "stake-pool", div { class: "token-icon skeleton" } div { class: "token-icon skeleton" } }
                    div { class: "stake-reward", div { class: "token-icon skeleton" } }
                    div { class: "stake-countdown skeleton", div {} }
                    div { class: "stake-actions", button { class: "stake-button skeleton" } }
                }
            }
        }
    }
}

#[component]
fn TokenIcon(symbol: String) -> Element {
    let short: String = symbol.chars().take(2).collect();
    rsx! {
        div { class: "token-icon", title: "{symbol}", "{short}" }
    }
}

#[component]
fn PositionRow(
    position: Position,
    staked: bool,
    now: i64,
    busy: bool,
    locked: bool,
    onaction: EventHandler<()>,
) -> Element {
    let claimable = position.is_claimable(now);
    let end_time = format_end_time(&position, now);
    let earned = format_reward(position.earned_primary);
    let bonus_earned = format_reward(position.earned_bonus);

    rsx! {
        div {
            class: "stake",
            div { class: "stake-id", "{position.id}" }
            div {
                class: "stake-pool",
                TokenIcon { symbol: position.pool.token0.clone() }
                TokenIcon { symbol: position.pool.token1.clone() }
                div {
                    class: "tokens-names",
                    div { "{position.pool.token0}" }
                    div { "{position.pool.token1}" }
                }
            }
            if staked {
                div {
                    class: "stake-reward",
                    TokenIcon { symbol: position.reward_token.clone() }
                    div { class: "tokens-names", div { "{earned}" } div { "{position.reward_token}" } }
                }
                div {
                    class: "stake-reward",
                    TokenIcon { symbol: position.bonus_reward_token.clone() }
                    div { class: "tokens-names", div { "{bonus_earned}" } div { "{position.bonus_reward_token}" } }
                }
                div { class: "stake-countdown", "{end_time}" }
            }
            div {
                class: "stake-actions",
                if staked && !claimable {
                    div { style: "line-height: 39px;", "Can't get rewards till end" }
                } else {
                    button {
                        class: "stake-button",
                        disabled: locked,
                        onclick: move |_| onaction.call(()),
                        if busy {
                            span { div { class: "loading-spinner" } }
                        } else if staked {
                            span { "Collect reward" }
                        } else {
                            span { "Withdraw NFT" }
                        }
                    }
                }
            }
        }
    }
}

#[component]
pub fn StakerMyStakes(ctx: WalletContext) -> Element {
    let services = use_context::<Arc<FarmingServices>>();

    let mut reconciler = use_signal(PositionReconciler::new);
    let mut ledger = use_signal(|| {
        load_ledger().unwrap_or_else(|e| {
            log::error!("Failed to load stored transactions: {}", e);
            TransactionLedger::new()
        })
    });
    let refreshing = use_signal(|| false);
    let error_message = use_signal(|| None::<String>);
    let mut now = use_signal(now_ms);

    // Fetch positions once on mount
    let ctx_for_mount = ctx.clone();
    let services_for_mount = services.clone();
    use_effect(move || {
        if reconciler.write().trigger_refresh() {
            start_refresh(
                ctx_for_mount.clone(),
                services_for_mount.clone(),
                reconciler,
                refreshing,
                error_message,
            );
        }
    });

    // Countdown clock
    use_future(move || async move {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            now.set(now_ms());
        }
    });

    // Ledger updater: every confirmation re-runs reconciliation
    let ctx_for_receipts = ctx.clone();
    let services_for_receipts = services.clone();
    use_future(move || {
        let ctx = ctx_for_receipts.clone();
        let services = services_for_receipts.clone();
        async move {
            loop {
                tokio::time::sleep(Duration::from_millis(services.receipt_poll_ms)).await;
                let pending = ledger.peek().pending_hashes(ctx.chain_id, now_ms());
                if pending.is_empty() {
                    continue;
                }

                let receipts = services.receipts.fetch_receipts(&pending).await;
                let changed = {
                    let mut ledger_guard = ledger.write();
                    let changed = apply_receipts(&mut ledger_guard, ctx.chain_id, receipts, now_ms());
                    if changed {
                        persist(&ledger_guard);
                    }
                    changed
                };
                if changed {
                    let patches = reconciler.write().reconcile(&ledger.peek(), &ctx, now_ms());
                    for patch in patches {
                        log::info!("Snapshot updated: {:?}", patch);
                    }
                }
            }
        }
    });

    let now_value = now();
    let view = reconciler.read();
    let loaded = view.is_loaded();
    let is_empty = view.snapshot().is_empty();
    let active: Option<Vec<Position>> = view
        .active_positions()
        .map(|positions| positions.into_iter().cloned().collect());
    let inactive: Option<Vec<Position>> = view
        .inactive_positions()
        .map(|positions| positions.into_iter().cloned().collect());
    let claim_locked = view.is_locked(ActionKind::ClaimReward);
    let withdraw_locked = view.is_locked(ActionKind::Withdraw);
    let claim_request = view.request(ActionKind::ClaimReward).clone();
    let withdraw_request = view.request(ActionKind::Withdraw).clone();
    drop(view);

    let explorer_link = [claim_request, withdraw_request]
        .into_iter()
        .filter(|request| request.phase == ActionPhase::Done)
        .filter_map(|request| {
            let hash = request.tracked_hash()?.to_string();
            let info = ctx.chain_info()?;
            Some((request.kind, info.label, info.explorer_tx_url(&hash)))
        })
        .collect::<Vec<_>>();

    rsx! {
        if let Some(error) = error_message() {
            div { class: "error-message", "{error}" }
        }

        for (kind, label, url) in explorer_link {
            div {
                key: "{url}",
                class: "success-message",
                "{kind} confirmed on {label}. "
                a { href: "{url}", target: "_blank", "View on explorer" }
            }
        }

        if refreshing() || !loaded {
            SkeletonRows {}
        } else if is_empty {
            div {
                class: "empty-mock",
                div { "No farms" }
            }
        } else {
            if let Some(positions) = active {
                div {
                    class: "stake-list-header",
                    div { style: "min-width: 96px;", "ID" }
                    div { "Pool" }
                    div { "Earned" }
                    div { "Bonus" }
                    div { "End time" }
                    div {}
                }
                div {
                    class: "stakes",
                    for position in positions {
                        PositionRow {
                            key: "{position.id}",
                            busy: reconciler.read().is_busy(ActionKind::ClaimReward, &position.id),
                            locked: claim_locked,
                            staked: true,
                            now: now_value,
                            onaction: {
                                let id = position.id.clone();
                                let ctx = ctx.clone();
                                let services = services.clone();
                                move |_| start_action(ActionKind::ClaimReward, id.clone(), ctx.clone(), services.clone(), reconciler, ledger)
                            },
                            position: position.clone(),
                        }
                    }
                }
            }
            if let Some(positions) = inactive {
                h2 { class: "page-title", "Inactive NFT-s" }
                div {
                    class: "stake-list-header",
                    div { style: "min-width: 96px;", "ID" }
                    div { "Pool" }
                    div {}
                    div {}
                    div {}
                }
                div {
                    class: "stakes",
                    for position in positions {
                        PositionRow {
                            key: "{position.id}",
                            busy: reconciler.read().is_busy(ActionKind::Withdraw, &position.id),
                            locked: withdraw_locked,
                            staked: false,
                            now: now_value,
                            onaction: {
                                let id = position.id.clone();
                                let ctx = ctx.clone();
                                let services = services.clone();
                                move |_| start_action(ActionKind::Withdraw, id.clone(), ctx.clone(), services.clone(), reconciler, ledger)
                            },
                            position: position.clone(),
                        }
                    }
                }
            }
        }
    }
}
