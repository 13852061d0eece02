//! Settlement
//!
//! Each non-bank player is settled against the bank alone: the player's bet
//! moves to whichever side rolled the higher category. Settlement is
//! zero-sum by construction since every amount is a transfer between a
//! player and the bank.

use crate::games::ledger::Transfer;
use crate::games::types::{OutcomeCategory, PlayerId, RoundId, TieRule};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    PlayerWins,
    BankWins,
    Push,
}

/// Compare a player's category to the bank's.
///
/// Returns `None` for meta-relational categories, which never settle.
pub fn judge(player: OutcomeCategory, bank: OutcomeCategory, tie_rule: TieRule) -> Option<Verdict> {
    let player_rank = player.precedence()?;
    let bank_rank = bank.precedence()?;

    let verdict = if player_rank > bank_rank {
        Verdict::PlayerWins
    } else if player_rank < bank_rank {
        Verdict::BankWins
    } else {
        match tie_rule {
            TieRule::BankWins => Verdict::BankWins,
            TieRule::Push => Verdict::Push,
        }
    };
    Some(verdict)
}

/// One player's result against the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettlement {
    pub player: PlayerId,
    pub bet: u64,
    pub category: OutcomeCategory,
    pub verdict: Verdict,
    /// Signed balance change for the player
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub round_id: RoundId,
    pub bank: PlayerId,
    pub bank_category: OutcomeCategory,
    pub players: Vec<PlayerSettlement>,
    pub bank_delta: i64,
    pub transfers: Vec<Transfer>,
}

impl SettlementSummary {
    pub fn net(&self) -> i64 {
        self.bank_delta + self.players.iter().map(|p| p.delta).sum::<i64>()
    }

    pub fn winners(&self) -> impl Iterator<Item = &PlayerSettlement> {
        self.players
            .iter()
            .filter(|p| p.verdict == Verdict::PlayerWins)
    }
}

/// A resolved player entering settlement
#[derive(Debug, Clone)]
pub struct SettlementEntry {
    pub player: PlayerId,
    pub bet: u64,
    pub category: OutcomeCategory,
}

/// Compute verdicts and the transfers realizing them.
///
/// Returns `None` if any category cannot be ranked or an amount does not fit
/// a signed delta.
pub fn settle(
    round_id: RoundId,
    bank: &PlayerId,
    bank_category: OutcomeCategory,
    entries: &[SettlementEntry],
    tie_rule: TieRule,
) -> Option<SettlementSummary> {
    let mut players = Vec::with_capacity(entries.len());
    let mut transfers = Vec::new();
    let mut bank_delta: i64 = 0;

    for entry in entries {
        let verdict = judge(entry.category, bank_category, tie_rule)?;
        let amount = i64::try_from(entry.bet).ok()?;
        let delta = match verdict {
            Verdict::PlayerWins => {
                transfers.push(Transfer {
                    from: bank.clone(),
                    to: entry.player.clone(),
                    amount: entry.bet,
                });
                amount
            }
            Verdict::BankWins => {
                transfers.push(Transfer {
                    from: entry.player.clone(),
                    to: bank.clone(),
                    amount: entry.bet,
                });
                -amount
            }
            Verdict::Push => 0,
        };
        bank_delta = bank_delta.checked_sub(delta)?;
        players.push(PlayerSettlement {
            player: entry.player.clone(),
            bet: entry.bet,
            category: entry.category,
            verdict,
            delta,
        });
    }

    Some(SettlementSummary {
        round_id,
        bank: bank.clone(),
        bank_category,
        players,
        bank_delta,
        transfers,
    })
}

/// Account holding a round's bets and the bank's cover until settlement
pub fn escrow_account(round_id: RoundId) -> PlayerId {
    PlayerId::new(format!("escrow:round:{}", round_id))
}

/// Bank cover for a set of bets: the most the bank can lose
pub fn bank_cover(bets: impl IntoIterator<Item = u64>) -> Option<u64> {
    bets.into_iter().try_fold(0u64, |total, bet| total.checked_add(bet))
}

/// Transfers draining a round's escrow to the winners.
///
/// The escrow holds each bet twice, once from the player and once from the
/// bank's cover. A winner takes both, a loser's pair goes to the bank and a
/// push returns each half to its owner.
pub fn escrow_payouts(summary: &SettlementSummary, escrow: &PlayerId) -> Vec<Transfer> {
    let mut payouts = Vec::with_capacity(summary.players.len() * 2);
    let mut pay = |to: &PlayerId, amount: u64| {
        if amount > 0 {
            payouts.push(Transfer {
                from: escrow.clone(),
                to: to.clone(),
                amount,
            });
        }
    };

    for player in &summary.players {
        match player.verdict {
            Verdict::PlayerWins => {
                pay(&player.player, player.bet);
                pay(&player.player, player.bet);
            }
            Verdict::BankWins => {
                pay(&summary.bank, player.bet);
                pay(&summary.bank, player.bet);
            }
            Verdict::Push => {
                pay(&player.player, player.bet);
                pay(&summary.bank, player.bet);
            }
        }
    }
    payouts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::OutcomeCategory::*;

    #[test]
    fn test_judge_precedence() {
        assert_eq!(judge(Zorome, Shigoro, TieRule::BankWins), Some(Verdict::PlayerWins));
        assert_eq!(judge(PointFive, PointThree, TieRule::BankWins), Some(Verdict::PlayerWins));
        assert_eq!(judge(Menashi, PointOne, TieRule::BankWins), Some(Verdict::BankWins));
        assert_eq!(judge(Hifumi, Menashi, TieRule::BankWins), Some(Verdict::BankWins));
        assert_eq!(judge(MatchesNext, Menashi, TieRule::BankWins), None);
    }

    #[test]
    fn test_ties_follow_variant_rule() {
        assert_eq!(judge(PointTwo, PointTwo, TieRule::BankWins), Some(Verdict::BankWins));
        assert_eq!(judge(PointTwo, PointTwo, TieRule::Push), Some(Verdict::Push));
    }

    #[test]
    fn test_settle_is_zero_sum() {
        let entries = vec![
            SettlementEntry { player: "p1".into(), bet: 100, category: PointFive },
            SettlementEntry { player: "p2".into(), bet: 250, category: Shigoro },
            SettlementEntry { player: "p3".into(), bet: 100, category: PointTwo },
            SettlementEntry { player: "p4".into(), bet: 300, category: PointThree },
        ];
        let summary = settle(RoundId(1), &"bank".into(), PointThree, &entries, TieRule::Push)
            .expect("rankable");

        let deltas: Vec<i64> = summary.players.iter().map(|p| p.delta).collect();
        assert_eq!(deltas, vec![100, 250, -100, 0]);
        assert_eq!(summary.bank_delta, -250);
        assert_eq!(summary.net(), 0);
        assert_eq!(summary.transfers.len(), 3);
        assert_eq!(summary.winners().count(), 2);
    }

    #[test]
    fn test_bets_beyond_signed_range_do_not_settle() {
        let entries = vec![SettlementEntry {
            player: "p1".into(),
            bet: 1 << 63,
            category: Shigoro,
        }];
        assert!(settle(RoundId(1), &"bank".into(), PointTwo, &entries, TieRule::BankWins).is_none());

        let fits = vec![SettlementEntry {
            player: "p1".into(),
            bet: i64::MAX as u64,
            category: Shigoro,
        }];
        let summary = settle(RoundId(1), &"bank".into(), PointTwo, &fits, TieRule::BankWins).unwrap();
        assert_eq!(summary.bank_delta, -i64::MAX);
    }

    #[test]
    fn test_escrow_payouts_drain_exactly_the_escrow() {
        let entries = vec![
            SettlementEntry { player: "p1".into(), bet: 100, category: Shigoro },
            SettlementEntry { player: "p2".into(), bet: 200, category: Hifumi },
            SettlementEntry { player: "p3".into(), bet: 50, category: PointThree },
        ];
        let summary = settle(RoundId(7), &"bank".into(), PointThree, &entries, TieRule::Push).unwrap();
        let escrow = escrow_account(RoundId(7));
        let payouts = escrow_payouts(&summary, &escrow);

        let paid_to = |who: &str| -> u64 {
            payouts
                .iter()
                .filter(|t| t.to == PlayerId::from(who))
                .map(|t| t.amount)
                .sum()
        };
        assert!(payouts.iter().all(|t| t.from == escrow));
        assert_eq!(paid_to("p1"), 200);
        assert_eq!(paid_to("p2"), 0);
        assert_eq!(paid_to("p3"), 50);
        assert_eq!(paid_to("bank"), 450);
        let cover = bank_cover(entries.iter().map(|e| e.bet)).unwrap();
        assert_eq!(payouts.iter().map(|t| t.amount).sum::<u64>(), 2 * cover);
        assert_eq!(bank_cover([u64::MAX, 1]), None);
    }
}
