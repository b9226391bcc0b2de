#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use wavebound_engine::{
    BattleSetup, BattleState, BattlerIndex, CombatRules, Combatant, Command, EffectResolution,
    EndOfTurnEffect, HpDelta, MoveResolution, NextWave, OptionView, PhaseName, Presenter,
    ProgressStore, ResumeSignal, ResumeToken, RewardId, RewardOffer, Side, StoreError,
    UnlockSnapshot,
};

/// Everything the collaborators observed, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Text(String),
    Cue(String),
    CommandPrompt(BattlerIndex),
    Options(Vec<OptionView>),
    Offer(RewardOffer),
    Granted(RewardId),
    Spent(u64),
    Earned(u64),
}

pub type Journal = Rc<RefCell<Vec<Seen>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn texts(journal: &Journal) -> Vec<String> {
    journal
        .borrow()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Text(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

pub fn grants(journal: &Journal) -> Vec<RewardId> {
    journal
        .borrow()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Granted(id) => Some(id.clone()),
            _ => None,
        })
        .collect()
}

pub struct ScriptedPresenter {
    journal: Journal,
}

impl ScriptedPresenter {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: Rc::clone(journal),
        }
    }

    fn push(&self, seen: Seen) {
        self.journal.borrow_mut().push(seen);
    }
}

impl Presenter for ScriptedPresenter {
    fn show_text(&mut self, _token: ResumeToken, text: &str) {
        self.push(Seen::Text(text.to_string()));
    }

    fn show_dialogue(&mut self, _token: ResumeToken, text: &str, speaker: &str) {
        self.push(Seen::Text(format!("{speaker}: {text}")));
    }

    fn play_cue(&mut self, _token: ResumeToken, cue: &str) {
        self.push(Seen::Cue(cue.to_string()));
    }

    fn prompt_command(&mut self, _token: ResumeToken, battler: BattlerIndex, _battle: &BattleState) {
        self.push(Seen::CommandPrompt(battler));
    }

    fn prompt_options(&mut self, _token: ResumeToken, _title: &str, options: &[OptionView]) {
        self.push(Seen::Options(options.to_vec()));
    }

    fn offer_rewards(&mut self, _token: ResumeToken, offer: &RewardOffer) {
        self.push(Seen::Offer(offer.clone()));
    }
}

pub struct ScriptedStore {
    journal: Journal,
    pub money: u64,
    pub vouchers: u32,
    pub flags: BTreeSet<String>,
}

impl ScriptedStore {
    pub fn new(journal: &Journal, money: u64) -> Self {
        Self {
            journal: Rc::clone(journal),
            money,
            vouchers: 0,
            flags: BTreeSet::new(),
        }
    }
}

impl ProgressStore for ScriptedStore {
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
        self.journal.borrow_mut().push(Seen::Spent(amount));
        Ok(())
    }

    fn add_money(&mut self, amount: u64) -> Result<(), StoreError> {
        self.money += amount;
        self.journal.borrow_mut().push(Seen::Earned(amount));
        Ok(())
    }

    fn vouchers(&self) -> u32 {
        self.vouchers
    }

    fn add_vouchers(&mut self, count: u32) -> Result<(), StoreError> {
        self.vouchers += count;
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
        self.journal.borrow_mut().push(Seen::Granted(id.clone()));
        Ok(())
    }
}

/// Fixed-damage combat: every hit deals `damage`, enemies aim at the player
/// lead, and waves come from a script.
pub struct ScriptedRules {
    pub damage: u32,
    pub cue: Option<String>,
    pub waves: RefCell<VecDeque<NextWave>>,
}

impl ScriptedRules {
    pub fn new(damage: u32) -> Self {
        Self {
            damage,
            cue: None,
            waves: RefCell::new(VecDeque::new()),
        }
    }

    pub fn then(self, wave: NextWave) -> Self {
        self.waves.borrow_mut().push_back(wave);
        self
    }
}

impl CombatRules for ScriptedRules {
    fn command_priority(&self, _battle: &BattleState, _battler: BattlerIndex, command: &Command) -> i8 {
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

    fn resolve_move(&self, battle: &BattleState, battler: BattlerIndex, command: &Command) -> MoveResolution {
        let Command::Fight { move_id, target } = command else {
            return MoveResolution::default();
        };
        let name = battle.battler(battler).map_or("?", |c| c.name.as_str());
        MoveResolution {
            hp_changes: vec![HpDelta::damage(*target, self.damage)],
            messages: vec![format!("{name} used {move_id}!")],
            cue: self.cue.clone(),
        }
    }

    fn end_of_turn(&self, _battle: &BattleState, _effect: EndOfTurnEffect) -> EffectResolution {
        EffectResolution::default()
    }

    fn next_wave(&self, _battle: &BattleState) -> NextWave {
        self.waves.borrow_mut().pop_front().unwrap_or(NextWave::Cleared)
    }
}

/// Answers every suspension the way a straightforward player would: attack
/// the first enemy, pick the first enabled option, take the first reward.
pub fn autopilot(
    journal: &Journal,
) -> impl FnMut(&BattleState, PhaseName, ResumeToken) -> ResumeSignal + use<> {
    let journal = Rc::clone(journal);
    move |battle, phase, _token| {
        let last = journal.borrow().last().cloned();
        match (phase, last) {
            (PhaseName::Command, _) => {
                let target = battle
                    .active_battlers()
                    .into_iter()
                    .find(|battler| battler.side() == Side::Enemy)
                    .unwrap_or(BattlerIndex::Enemy);
                ResumeSignal::CommandChosen {
                    command: Command::Fight {
                        move_id: "strike".into(),
                        target,
                    },
                }
            }
            (_, Some(Seen::Options(options))) => ResumeSignal::OptionChosen {
                index: options
                    .iter()
                    .find(|option| option.enabled)
                    .map_or(0, |option| option.index),
            },
            (PhaseName::SelectReward, _) => ResumeSignal::RewardChosen { index: 0 },
            _ => ResumeSignal::Completed,
        }
    }
}

pub fn trainer(name: &str) -> BattleSetup {
    BattleSetup::trainer(name, vec![Combatant::new(format!("{name}'s Gnat"), 10, 10)])
}

pub fn wild(name: &str, hp: u32, speed: u32) -> BattleSetup {
    BattleSetup {
        trainer: None,
        enemies: vec![Combatant::new(name, hp, speed)],
        double: false,
        intro: None,
    }
}
