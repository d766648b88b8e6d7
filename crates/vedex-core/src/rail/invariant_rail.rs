use tracing::warn;

use crate::auth::RoleAuthorizer;
use crate::config::LedgerConfig;
use crate::{LedgerError, Result};

use super::actions::{Ledgers, TimedAction};
use super::invariants::{
    check_transition, InvariantCounterexample, InvariantId, InvariantViolation,
    TransitionSnapshot,
};

/// Run an action trace against fresh ledgers and return the first invariant counterexample (if
/// any).
///
/// Invariants checked:
/// - "no mutation on error" (combined state hash must not change if `apply` returns `Err`)
/// - transition-level checks for specific outcomes (attach, harvest, supply-neutral moves)
/// - `Ledgers::check_invariants` after every successful action
pub fn first_invariant_counterexample(
    config: &LedgerConfig,
    roles: &RoleAuthorizer,
    actions: &[TimedAction],
) -> Result<Option<InvariantCounterexample>> {
    let mut ledgers = Ledgers::new(config.clone(), roles.clone())?;

    for (i, timed) in actions.iter().enumerate() {
        let before_hash = ledgers.state_hash()?;
        let snapshot = TransitionSnapshot::capture(&ledgers, timed);

        let violation = match ledgers.apply(timed) {
            Err(e) => {
                let after_hash = ledgers.state_hash()?;
                if after_hash == before_hash {
                    continue;
                }
                InvariantViolation::new(
                    InvariantId::NoMutationOnError,
                    format!("action returned Err but state hash changed: {e}"),
                )
            }
            Ok(outcome) => {
                let checked = check_transition(&snapshot, &ledgers, timed, &outcome)
                    .and_then(|()| ledgers.check_invariants());
                match checked {
                    Ok(()) => continue,
                    Err(v) => v,
                }
            }
        };

        let ce = InvariantCounterexample {
            violation,
            at_step: i,
            state_hash: ledgers.state_hash()?,
            actions: actions[..=i].to_vec(),
        };
        warn!(counterexample = %ce.short(), details = %ce.violation.details, "invariant violated");
        return Ok(Some(ce));
    }

    Ok(None)
}

/// Minimize a counterexample by removing actions while preserving the same invariant id.
///
/// Deterministic delta-debugging (ddmin) over the action list. Removing an action can make later
/// actions fail (they are then rejected without mutation), so every candidate is replayed in full.
pub fn minimize_counterexample(
    config: &LedgerConfig,
    roles: &RoleAuthorizer,
    ce: &InvariantCounterexample,
) -> Result<InvariantCounterexample> {
    let want = ce.violation.id;

    // Always start from the smallest prefix that actually triggers the violation.
    let Some(first) = first_invariant_counterexample(config, roles, &ce.actions)? else {
        return Err(LedgerError::Replay(
            "minimize_counterexample: provided trace does not reproduce".into(),
        ));
    };
    if first.violation.id != want {
        return Err(LedgerError::Replay(
            "minimize_counterexample: provided trace reproduces a different invariant".into(),
        ));
    }
    let mut cur = first.actions;

    // ddmin: remove chunks while preserving failure.
    let mut n = 2usize;
    while cur.len() >= 2 {
        let len = cur.len();
        let chunk = len.div_ceil(n);
        let mut reduced = false;

        for start in (0..len).step_by(chunk) {
            let end = (start + chunk).min(len);
            if start == 0 && end == len {
                continue;
            }
            let mut cand = Vec::with_capacity(len - (end - start));
            cand.extend_from_slice(&cur[..start]);
            cand.extend_from_slice(&cur[end..]);

            let Some(r) = first_invariant_counterexample(config, roles, &cand)? else {
                continue;
            };
            if r.violation.id != want {
                continue;
            }

            cur = r.actions;
            n = n.saturating_sub(1).max(2);
            reduced = true;
            break;
        }

        if reduced {
            continue;
        }
        if n >= len {
            break;
        }
        n = (n * 2).min(len);
    }

    first_invariant_counterexample(config, roles, &cur)?.ok_or_else(|| {
        LedgerError::Replay(
            "minimize_counterexample: lost counterexample during minimization".into(),
        )
    })
}
