use serde::{Deserialize, Serialize};
use wavebound_engine::{BattleState, BattlerIndex, Command, PhaseName, ResumeSignal, Side};

use super::collaborators::{Prompt, Transcript};

/// How the simulated player answers prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// First enabled option, first reward, never rerolls.
    Steady,
    /// Last enabled option, and one reroll per offer whenever it is affordable.
    Spender,
}

impl Strategy {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Steady => "steady",
            Self::Spender => "spender",
        }
    }

    /// Pick a signal for the suspended phase.
    pub fn answer(
        self,
        battle: &BattleState,
        phase: PhaseName,
        transcript: &Transcript,
        money: u64,
        rerolled: bool,
    ) -> ResumeSignal {
        match (&transcript.prompt, phase) {
            (Prompt::Command(_), _) | (_, PhaseName::Command) => ResumeSignal::CommandChosen {
                command: Command::Fight {
                    move_id: "strike".into(),
                    target: first_enemy(battle),
                },
            },
            (Prompt::Options(options), _) => {
                let mut enabled = options.iter().filter(|option| option.enabled);
                let pick = match self {
                    Self::Steady => enabled.next(),
                    Self::Spender => enabled.last(),
                };
                ResumeSignal::OptionChosen {
                    index: pick.map_or(0, |option| option.index),
                }
            }
            (Prompt::Offer(offer), _) => {
                let affordable = offer.reroll_cost.is_some_and(|cost| cost <= money);
                if self == Self::Spender && affordable && !rerolled {
                    ResumeSignal::Reroll
                } else {
                    ResumeSignal::RewardChosen { index: 0 }
                }
            }
            _ => ResumeSignal::Completed,
        }
    }
}

/// Signal to send after the engine refused `rejected`.
pub fn fallback(rejected: &ResumeSignal) -> ResumeSignal {
    match rejected {
        ResumeSignal::Reroll => ResumeSignal::RewardChosen { index: 0 },
        ResumeSignal::RewardChosen { .. } => ResumeSignal::SkipRewards,
        _ => ResumeSignal::Completed,
    }
}

fn first_enemy(battle: &BattleState) -> BattlerIndex {
    battle
        .active_battlers()
        .into_iter()
        .find(|idx| idx.side() == Side::Enemy)
        .unwrap_or(BattlerIndex::Enemy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavebound_engine::{Combatant, OptionView};

    fn options() -> Transcript {
        Transcript {
            prompt: Prompt::Options(vec![
                OptionView {
                    index: 0,
                    label: "Buy".into(),
                    enabled: false,
                },
                OptionView {
                    index: 1,
                    label: "Haggle".into(),
                    enabled: true,
                },
                OptionView {
                    index: 3,
                    label: "Leave".into(),
                    enabled: true,
                },
            ]),
            ..Transcript::default()
        }
    }

    #[test]
    fn strategies_skip_disabled_options() {
        let battle = BattleState::new(vec![Combatant::new("Ember", 10, 10)]);
        let transcript = options();
        assert_eq!(
            Strategy::Steady.answer(&battle, PhaseName::EncounterStart, &transcript, 0, false),
            ResumeSignal::OptionChosen { index: 1 }
        );
        assert_eq!(
            Strategy::Spender.answer(&battle, PhaseName::EncounterStart, &transcript, 0, false),
            ResumeSignal::OptionChosen { index: 3 }
        );
    }

    #[test]
    fn refused_rerolls_fall_back_to_the_first_reward() {
        assert_eq!(
            fallback(&ResumeSignal::Reroll),
            ResumeSignal::RewardChosen { index: 0 }
        );
        assert_eq!(fallback(&ResumeSignal::Completed), ResumeSignal::Completed);
    }
}
