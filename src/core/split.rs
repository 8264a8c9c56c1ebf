//! Split engine - turns an expense amount into per-participant shares.
//!
//! Splitting is a pure function of its inputs. The returned shares always sum to
//! the requested amount exactly (in cents). When a division leaves leftover cents,
//! they are handed out with the largest-remainder method: participants are ordered
//! by the fractional cent they were shorted (largest first, ties by user id) and
//! the front of that order receives one extra cent each.

use crate::{
    core::money::Money,
    errors::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One participant of a split request.
///
/// Leave both `weight` and `share` empty for an equal split, give every
/// participant a `weight` for a proportional split, or give every participant a
/// literal `share` for an exact split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitParticipant {
    pub user_id: String,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub share: Option<Money>,
}

impl SplitParticipant {
    /// Participant of an equal split.
    #[must_use]
    pub fn equal(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            weight: None,
            share: None,
        }
    }

    #[must_use]
    pub fn weighted(user_id: impl Into<String>, weight: u32) -> Self {
        Self {
            user_id: user_id.into(),
            weight: Some(weight),
            share: None,
        }
    }

    #[must_use]
    pub fn exact(user_id: impl Into<String>, share: Money) -> Self {
        Self {
            user_id: user_id.into(),
            weight: None,
            share: Some(share),
        }
    }
}

/// How an amount is divided, inferred from the shape of the participant list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitMode {
    Equal,
    Proportional,
    Exact,
}

impl SplitMode {
    /// Infers the mode from the participants; mixing weights and literal shares,
    /// or giving them to only some participants, is rejected.
    pub fn infer(participants: &[SplitParticipant]) -> Result<Self> {
        let weighted = participants.iter().filter(|p| p.weight.is_some()).count();
        let exact = participants.iter().filter(|p| p.share.is_some()).count();

        match (weighted, exact) {
            (0, 0) => Ok(Self::Equal),
            (w, 0) if w == participants.len() => Ok(Self::Proportional),
            (0, e) if e == participants.len() => Ok(Self::Exact),
            _ => Err(Error::invalid_split(
                "participants must all use weights, all use exact shares, or use neither",
            )),
        }
    }
}

/// The amount attributed to one participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAllocation {
    pub user_id: String,
    pub amount: Money,
}

/// Splits `amount` across `participants`.
///
/// Shares are returned in the same order as the participants.
///
/// # Errors
/// `InvalidSplit` when the amount is not positive, the participant list is
/// empty or has duplicates, weights add up to zero, or exact shares are negative
/// or do not add up to `amount`.
pub fn split(amount: Money, participants: &[SplitParticipant]) -> Result<Vec<ShareAllocation>> {
    if !amount.is_positive() {
        return Err(Error::invalid_split(format!(
            "amount must be greater than zero, got {amount}"
        )));
    }
    if participants.is_empty() {
        return Err(Error::invalid_split("participant list is empty"));
    }

    let mut seen = HashSet::with_capacity(participants.len());
    for participant in participants {
        if participant.user_id.trim().is_empty() {
            return Err(Error::invalid_split("participant user id is empty"));
        }
        if !seen.insert(participant.user_id.as_str()) {
            return Err(Error::invalid_split(format!(
                "participant {} appears more than once",
                participant.user_id
            )));
        }
    }

    match SplitMode::infer(participants)? {
        SplitMode::Equal => {
            let weights = vec![1_u64; participants.len()];
            Ok(allocate_by_weight(amount, participants, &weights))
        }
        SplitMode::Proportional => {
            let weights: Vec<u64> = participants
                .iter()
                .map(|p| u64::from(p.weight.unwrap_or_default()))
                .collect();
            if weights.iter().all(|w| *w == 0) {
                return Err(Error::invalid_split("weights add up to zero"));
            }
            Ok(allocate_by_weight(amount, participants, &weights))
        }
        SplitMode::Exact => split_exact(amount, participants),
    }
}

/// Re-splits `amount` across the participants of an existing split, keeping the
/// ratio between the previous shares. Falls back to an equal split when every
/// previous share is zero.
pub fn resplit(amount: Money, previous: &[ShareAllocation]) -> Result<Vec<ShareAllocation>> {
    let participants: Vec<SplitParticipant> = previous
        .iter()
        .map(|share| SplitParticipant::equal(share.user_id.clone()))
        .collect();
    if previous.iter().all(|share| share.amount.is_zero()) {
        return split(amount, &participants);
    }
    if !amount.is_positive() {
        return Err(Error::invalid_split(format!(
            "amount must be greater than zero, got {amount}"
        )));
    }

    let weights = previous
        .iter()
        .map(|share| {
            u64::try_from(share.amount.cents())
                .map_err(|_| Error::invalid_split("previous share is negative"))
        })
        .collect::<Result<Vec<u64>>>()?;
    Ok(allocate_by_weight(amount, &participants, &weights))
}

fn split_exact(amount: Money, participants: &[SplitParticipant]) -> Result<Vec<ShareAllocation>> {
    let mut total = Money::ZERO;
    let mut shares = Vec::with_capacity(participants.len());

    for participant in participants {
        let share = participant.share.unwrap_or_default();
        if share.is_negative() {
            return Err(Error::invalid_split(format!(
                "share for {} is negative ({share})",
                participant.user_id
            )));
        }
        total = total
            .checked_add(share)
            .ok_or_else(|| Error::invalid_split("exact shares overflow"))?;
        shares.push(ShareAllocation {
            user_id: participant.user_id.clone(),
            amount: share,
        });
    }

    if total != amount {
        return Err(Error::invalid_split(format!(
            "exact shares add up to {total}, expected {amount}"
        )));
    }
    Ok(shares)
}

/// Largest-remainder allocation. `weights` is parallel to `participants` and has
/// a non-zero sum.
fn allocate_by_weight(
    amount: Money,
    participants: &[SplitParticipant],
    weights: &[u64],
) -> Vec<ShareAllocation> {
    let total = i128::from(amount.cents());
    let weight_sum: i128 = weights.iter().map(|w| i128::from(*w)).sum();

    let mut base = Vec::with_capacity(participants.len());
    let mut remainders = Vec::with_capacity(participants.len());
    for (idx, weight) in weights.iter().enumerate() {
        let scaled = total * i128::from(*weight);
        base.push(scaled / weight_sum);
        remainders.push((idx, scaled % weight_sum));
    }

    // Leftover cents are always fewer than the number of participants.
    let allocated: i128 = base.iter().sum();
    let leftover = usize::try_from(total - allocated).unwrap_or_default();

    remainders.sort_by(|(a_idx, a_rem), (b_idx, b_rem)| {
        b_rem
            .cmp(a_rem)
            .then_with(|| participants[*a_idx].user_id.cmp(&participants[*b_idx].user_id))
    });
    for (idx, _) in remainders.into_iter().take(leftover) {
        base[idx] += 1;
    }

    participants
        .iter()
        .zip(base)
        .map(|(participant, cents)| ShareAllocation {
            user_id: participant.user_id.clone(),
            // Each share is bounded by `amount`, so it fits back into i64.
            amount: Money::from_cents(i64::try_from(cents).unwrap_or(i64::MAX)),
        })
        .collect()
}
