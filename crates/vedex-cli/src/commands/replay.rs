//! Trace replay.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use vedex_core::rail::{
    first_invariant_counterexample, minimize_counterexample, ActionOutcome, Ledgers, Trace,
};
use vedex_core::LedgerConfig;

#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub block: u64,
    pub timestamp: u64,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub supply: u128,
    pub permanent_total_supply: u128,
    pub voting_power: u128,
    pub reward_total_supply: u128,
    pub rewards_notified: u128,
    pub rewards_harvested: u128,
    pub state_hash: String,
    pub metrics: serde_json::Value,
    /// Minimized counterexample summary, if the trace violates an invariant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<String>,
}

pub fn run(config: &LedgerConfig, trace_path: PathBuf, format: String) -> Result<()> {
    let content = std::fs::read_to_string(&trace_path)
        .with_context(|| format!("Failed to read trace: {}", trace_path.display()))?;
    let trace: Trace = serde_json::from_str(&content).context("Failed to parse trace")?;
    info!(actions = trace.actions.len(), "replaying trace");

    let report = replay(config, &trace)?;

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "human" => print_human(&report),
        _ => anyhow::bail!("unknown format: {format} (expected 'human' or 'json')"),
    }

    Ok(())
}

pub fn replay(config: &LedgerConfig, trace: &Trace) -> Result<ReplayReport> {
    let mut ledgers =
        Ledgers::new(config.clone(), trace.roles.clone()).context("Failed to build ledgers")?;

    let mut steps = Vec::with_capacity(trace.actions.len());
    for (index, timed) in trace.actions.iter().enumerate() {
        let r = ledgers.apply(timed);
        steps.push(StepReport {
            index,
            block: timed.ctx.block.number,
            timestamp: timed.ctx.block.timestamp,
            action: format!("{:?}", timed.action),
            outcome: r.as_ref().ok().copied(),
            error: r.err().map(|e| e.to_string()),
        });
    }

    let counterexample = match first_invariant_counterexample(config, &trace.roles, &trace.actions)
        .context("Failed to run invariant check")?
    {
        Some(ce) => {
            let min = minimize_counterexample(config, &trace.roles, &ce)
                .context("Failed to minimize invariant counterexample")?;
            Some(format!("{} [{} actions]", min.short(), min.actions.len()))
        }
        None => None,
    };

    let now = ledgers
        .escrow
        .last_block()
        .map_or(0, |b| b.timestamp);
    let state_hash = ledgers.state_hash().context("Failed to hash state")?;

    Ok(ReplayReport {
        steps,
        supply: ledgers.escrow.supply(),
        permanent_total_supply: ledgers.escrow.permanent_total_supply(),
        voting_power: ledgers.escrow.total_supply_at(now),
        reward_total_supply: ledgers.rewarder.total_supply(),
        rewards_notified: ledgers.rewarder.total_notified(),
        rewards_harvested: ledgers.rewarder.total_harvested(),
        state_hash: hex::encode(state_hash.0),
        metrics: ledgers.metrics.to_json(),
        counterexample,
    })
}

fn print_human(report: &ReplayReport) {
    println!("Replay ({} actions)", report.steps.len());
    println!();
    for s in &report.steps {
        match (&s.outcome, &s.error) {
            (Some(o), _) => println!(
                "  {:03}: [{} @ {}] {} -> {:?}",
                s.index, s.block, s.timestamp, s.action, o
            ),
            (None, Some(e)) => println!(
                "  {:03}: [{} @ {}] {} -> rejected: {}",
                s.index, s.block, s.timestamp, s.action, e
            ),
            (None, None) => {}
        }
    }
    println!();
    println!("  supply                 = {}", report.supply);
    println!("  permanent_total_supply = {}", report.permanent_total_supply);
    println!("  voting_power           = {}", report.voting_power);
    println!("  reward_total_supply    = {}", report.reward_total_supply);
    println!("  rewards_notified       = {}", report.rewards_notified);
    println!("  rewards_harvested      = {}", report.rewards_harvested);
    println!("  state_hash             = {}", report.state_hash);
    println!();
    match &report.counterexample {
        Some(ce) => println!("{ce}"),
        None => println!("No invariant violations found."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedex_core::rail::{LedgerAction, TimedAction};
    use vedex_core::{AccountId, Role, RoleAuthorizer, TokenId, TxContext};

    const WAD: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn replay_reports_outcomes_and_rejections() {
        let alice = AccountId(1);
        let t0 = 100 * 604_800;
        let trace = Trace {
            roles: RoleAuthorizer::new().with_role(Role::Strategy, AccountId(9)),
            actions: vec![
                TimedAction::new(
                    TxContext::new(alice, 1, t0),
                    LedgerAction::MintUnderlying { to: alice, amount: 2 * WAD },
                ),
                TimedAction::new(
                    TxContext::new(alice, 2, t0),
                    LedgerAction::CreatePermanentLock { amount: 2 * WAD, recipient: alice },
                ),
                TimedAction::new(
                    TxContext::new(alice, 3, t0 + 1),
                    LedgerAction::Withdraw { token: TokenId(1) },
                ),
            ],
        };

        let report = replay(&LedgerConfig::default(), &trace).unwrap();
        assert_eq!(report.steps[1].outcome, Some(ActionOutcome::Minted(TokenId(1))));
        assert!(report.steps[2].error.is_some());
        assert_eq!(report.supply, 2 * WAD);
        assert_eq!(report.permanent_total_supply, 2 * WAD);
        assert_eq!(report.voting_power, 2 * WAD);
        assert!(report.counterexample.is_none());
        assert_eq!(report.state_hash.len(), 64);
    }
}
