//! In-memory collaborators for unit tests.

use crate::battle::{BattleState, BattlerIndex, Command, UnlockSnapshot};
use crate::encounter::OptionView;
use crate::error::StoreError;
use crate::phase::ResumeToken;
use crate::rewards::{RewardId, RewardOffer};
use crate::rules::{EffectResolution, EndOfTurnEffect, HpDelta, MoveResolution, NextWave};
use crate::{CombatRules, Presenter, ProgressStore};
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub(crate) money: u64,
    pub(crate) vouchers: u32,
    pub(crate) flags: BTreeSet<String>,
    pub(crate) granted: Vec<RewardId>,
}

impl MemoryStore {
    pub(crate) fn with_money(money: u64) -> Self {
        Self {
            money,
            ..Self::default()
        }
    }

    pub(crate) fn with_flag(mut self, flag: &str) -> Self {
        self.flags.insert(flag.to_string());
        self
    }
}

impl ProgressStore for MemoryStore {
    fn money(&self) -> u64 {
        self.money
    }

    fn spend_money(&mut self, amount: u64) -> Result<(), StoreError> {
        if amount > self.money {
            return Err(StoreError::InsufficientFunds {
                needed: amount,
                available: self.money,
            });
        }
        self.money -= amount;
        Ok(())
    }

    fn add_money(&mut self, amount: u64) -> Result<(), StoreError> {
        self.money = self.money.saturating_add(amount);
        Ok(())
    }

    fn vouchers(&self) -> u32 {
        self.vouchers
    }

    fn add_vouchers(&mut self, count: u32) -> Result<(), StoreError> {
        self.vouchers = self.vouchers.saturating_add(count);
        Ok(())
    }

    fn is_unlocked(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    fn unlock(&mut self, flag: &str) -> Result<(), StoreError> {
        self.flags.insert(flag.to_string());
        Ok(())
    }

    fn unlock_snapshot(&self) -> UnlockSnapshot {
        UnlockSnapshot::new(self.flags.iter().cloned())
    }

    fn grant_reward(&mut self, id: &RewardId) -> Result<(), StoreError> {
        self.granted.push(id.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Shown {
    Text(String),
    Cue(String),
    Command(BattlerIndex),
    Options(Vec<OptionView>),
    Rewards(RewardOffer),
}

/// Records every presenter call along with the token it was given.
#[derive(Debug, Default)]
pub(crate) struct RecordingPresenter {
    pub(crate) shown: Vec<(ResumeToken, Shown)>,
}

impl RecordingPresenter {
    pub(crate) fn texts(&self) -> Vec<&str> {
        self.shown
            .iter()
            .filter_map(|(_, shown)| match shown {
                Shown::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn show_text(&mut self, token: ResumeToken, text: &str) {
        self.shown.push((token, Shown::Text(text.to_string())));
    }

    fn show_dialogue(&mut self, token: ResumeToken, text: &str, speaker: &str) {
        self.shown.push((token, Shown::Text(format!("{speaker}: {text}"))));
    }

    fn play_cue(&mut self, token: ResumeToken, cue: &str) {
        self.shown.push((token, Shown::Cue(cue.to_string())));
    }

    fn prompt_command(&mut self, token: ResumeToken, battler: BattlerIndex, _battle: &BattleState) {
        self.shown.push((token, Shown::Command(battler)));
    }

    fn prompt_options(&mut self, token: ResumeToken, _title: &str, options: &[OptionView]) {
        self.shown.push((token, Shown::Options(options.to_vec())));
    }

    fn offer_rewards(&mut self, token: ResumeToken, offer: &RewardOffer) {
        self.shown.push((token, Shown::Rewards(offer.clone())));
    }
}

/// Every fight hit deals `damage`; enemies always attack the player lead.
#[derive(Debug)]
pub(crate) struct FlatRules {
    pub(crate) damage: u32,
    pub(crate) waves: RefCell<VecDeque<NextWave>>,
}

impl FlatRules {
    pub(crate) fn new(damage: u32) -> Self {
        Self {
            damage,
            waves: RefCell::new(VecDeque::new()),
        }
    }
}

impl CombatRules for FlatRules {
    fn command_priority(
        &self,
        _battle: &BattleState,
        _battler: BattlerIndex,
        command: &Command,
    ) -> i8 {
        match command {
            Command::Switch { .. } => 6,
            _ => 0,
        }
    }

    fn effective_speed(&self, battle: &BattleState, battler: BattlerIndex) -> u32 {
        battle.battler(battler).map_or(0, |c| c.speed)
    }

    fn enemy_command(&self, _battle: &BattleState, _battler: BattlerIndex) -> Command {
        Command::Fight {
            move_id: "tackle".into(),
            target: BattlerIndex::Player,
        }
    }

    fn resolve_move(
        &self,
        battle: &BattleState,
        battler: BattlerIndex,
        command: &Command,
    ) -> MoveResolution {
        let Command::Fight { move_id, target } = command else {
            return MoveResolution::default();
        };
        let name = battle.battler(battler).map_or("?", |c| c.name.as_str());
        MoveResolution {
            hp_changes: vec![HpDelta::damage(*target, self.damage)],
            messages: vec![format!("{name} used {move_id}!")],
            cue: None,
        }
    }

    fn end_of_turn(&self, _battle: &BattleState, _effect: EndOfTurnEffect) -> EffectResolution {
        EffectResolution::default()
    }

    fn next_wave(&self, _battle: &BattleState) -> NextWave {
        self.waves.borrow_mut().pop_front().unwrap_or(NextWave::Cleared)
    }
}
