//! Seeded stand-ins for the presenter, combat rules, and progress store.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use wavebound_engine::{
    BattleSetup, BattleState, BattlerIndex, CombatRules, Combatant, Command, DialogueLine,
    EffectResolution, Encounter, EncounterOption, EncounterRewardSpec, EndOfTurnEffect, HpDelta,
    MoveResolution, NextWave, OptionMode, OptionView, Presenter, ProgressStore, Requirement,
    ResumeToken, RewardId, RewardOffer, RewardRequest, Side, StoreError, UnlockSnapshot,
};

/// What the presenter is currently showing.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Prompt {
    #[default]
    Nothing,
    Line,
    Cue,
    Command(BattlerIndex),
    Options(Vec<OptionView>),
    Offer(RewardOffer),
}

/// Everything shown during a run, shared between presenter and policy.
#[derive(Debug, Default)]
pub struct Transcript {
    pub lines: Vec<String>,
    pub prompt: Prompt,
    pub offers: usize,
    pub cues: usize,
}

pub type SharedTranscript = Rc<RefCell<Transcript>>;

pub struct SimPresenter {
    transcript: SharedTranscript,
}

impl SimPresenter {
    pub fn new(transcript: &SharedTranscript) -> Self {
        Self {
            transcript: Rc::clone(transcript),
        }
    }
}

impl Presenter for SimPresenter {
    fn show_text(&mut self, _token: ResumeToken, text: &str) {
        let mut transcript = self.transcript.borrow_mut();
        transcript.lines.push(text.to_string());
        transcript.prompt = Prompt::Line;
    }

    fn show_dialogue(&mut self, _token: ResumeToken, text: &str, speaker: &str) {
        let mut transcript = self.transcript.borrow_mut();
        transcript.lines.push(format!("{speaker}: {text}"));
        transcript.prompt = Prompt::Line;
    }

    fn play_cue(&mut self, _token: ResumeToken, _cue: &str) {
        let mut transcript = self.transcript.borrow_mut();
        transcript.cues += 1;
        transcript.prompt = Prompt::Cue;
    }

    fn prompt_command(&mut self, _token: ResumeToken, battler: BattlerIndex, _battle: &BattleState) {
        self.transcript.borrow_mut().prompt = Prompt::Command(battler);
    }

    fn prompt_options(&mut self, _token: ResumeToken, title: &str, options: &[OptionView]) {
        log::trace!("{title}: {} options shown", options.len());
        self.transcript.borrow_mut().prompt = Prompt::Options(options.to_vec());
    }

    fn offer_rewards(&mut self, _token: ResumeToken, offer: &RewardOffer) {
        let mut transcript = self.transcript.borrow_mut();
        transcript.offers += 1;
        transcript.prompt = Prompt::Offer(offer.clone());
    }
}

/// In-memory progress store.
#[derive(Debug, Default)]
pub struct SimStore {
    pub money: u64,
    pub vouchers: u32,
    pub flags: BTreeSet<String>,
    pub granted: Vec<RewardId>,
    pub spent: u64,
}

impl SimStore {
    pub fn with_money(money: u64) -> Self {
        Self {
            money,
            ..Self::default()
        }
    }
}

impl ProgressStore for SimStore {
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
        self.spent += amount;
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

/// How the simulated world generates waves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldPlan {
    /// Last wave that still has something to fight.
    pub final_wave: u32,
    /// Every n-th wave is an encounter; zero disables encounters.
    pub encounter_every: u32,
    pub double_battles: bool,
    /// Play an animation cue for every move.
    pub cues: bool,
}

/// Seeded combat rules. Damage rolls and wave contents come from one
/// `ChaCha20Rng`, so a seed reproduces the whole run.
pub struct SimRules {
    rng: RefCell<ChaCha20Rng>,
    plan: WorldPlan,
}

impl SimRules {
    pub fn new(seed: u64, plan: WorldPlan) -> Self {
        Self {
            rng: RefCell::new(ChaCha20Rng::seed_from_u64(seed)),
            plan,
        }
    }

    fn roster(&self, wave: u32) -> BattleSetup {
        let mut rng = self.rng.borrow_mut();
        let count = if self.plan.double_battles { 2 } else { 1 };
        let enemies = (0..count)
            .map(|idx| {
                let hp = 18 + wave * 4 + rng.gen_range(0..10);
                Combatant::new(format!("Wild Mite {}", idx + 1), hp, rng.gen_range(10..60))
            })
            .collect();
        if rng.gen_bool(0.3) {
            let mut setup = BattleSetup::trainer(format!("Ranger {wave}"), enemies);
            setup.double = self.plan.double_battles;
            setup
        } else {
            BattleSetup {
                trainer: None,
                enemies,
                double: self.plan.double_battles,
                intro: None,
            }
        }
    }
}

impl CombatRules for SimRules {
    fn command_priority(&self, _battle: &BattleState, _battler: BattlerIndex, command: &Command) -> i8 {
        match command {
            Command::Switch { .. } => 6,
            Command::Fight { .. } | Command::Pass => 0,
        }
    }

    fn effective_speed(&self, battle: &BattleState, battler: BattlerIndex) -> u32 {
        battle.battler(battler).map_or(0, |c| c.speed)
    }

    fn enemy_command(&self, battle: &BattleState, _battler: BattlerIndex) -> Command {
        let target = battle
            .active_battlers()
            .into_iter()
            .find(|idx| idx.side() == Side::Player)
            .unwrap_or(BattlerIndex::Player);
        Command::Fight {
            move_id: "bite".into(),
            target,
        }
    }

    fn resolve_move(&self, battle: &BattleState, battler: BattlerIndex, command: &Command) -> MoveResolution {
        let Command::Fight { move_id, target } = command else {
            return MoveResolution::default();
        };
        let name = battle.battler(battler).map_or("Someone", |c| c.name.as_str());
        let damage = match battler.side() {
            Side::Player => self.rng.borrow_mut().gen_range(12..24),
            Side::Enemy => self.rng.borrow_mut().gen_range(4..10),
        };
        MoveResolution {
            hp_changes: vec![HpDelta::damage(*target, damage)],
            messages: vec![format!("{name} used {move_id}!")],
            cue: self.plan.cues.then(|| move_id.clone()),
        }
    }

    fn end_of_turn(&self, _battle: &BattleState, _effect: EndOfTurnEffect) -> EffectResolution {
        EffectResolution::default()
    }

    fn next_wave(&self, battle: &BattleState) -> NextWave {
        let wave = battle.wave;
        if wave > self.plan.final_wave {
            return NextWave::Cleared;
        }
        if self.plan.encounter_every > 0 && wave % self.plan.encounter_every == 0 {
            return NextWave::Encounter(merchant(wave));
        }
        NextWave::Battle(self.roster(wave))
    }
}

/// A trader who sells a reward pick for money, or can be ignored.
pub fn merchant(wave: u32) -> Encounter {
    let price = 100 * u64::from(wave);
    Encounter::new(format!("merchant-{wave}"), "Wandering Merchant")
        .with_intro(DialogueLine::spoken("Rare goods, fair prices!", "Merchant"))
        .with_option(
            EncounterOption::new(format!("Buy a crate ({price})"))
                .with_mode(OptionMode::DisabledUnlessMet)
                .with_requirement(Requirement::MoneyAtLeast(price))
                .on_main(move |ctx| {
                    ctx.store.spend_money(price)?;
                    ctx.set_rewards(EncounterRewardSpec::offer(
                        RewardRequest::standard().with_count(2),
                    ));
                    ctx.leave_without_battle();
                    Ok(())
                }),
        )
        .with_option(EncounterOption::new("Move along").on_main(|ctx| {
            ctx.set_rewards(EncounterRewardSpec::default().with_money(50));
            ctx.leave_without_battle();
            Ok(())
        }))
}

/// Starting party for a seed.
pub fn seeded_party(seed: u64, size: usize) -> Vec<Combatant> {
    const NAMES: [&str; 4] = ["Ember", "Drift", "Moss", "Flint"];
    let mut rng = ChaCha20Rng::seed_from_u64(seed ^ 0x5EED_0F_BA77);
    NAMES
        .iter()
        .take(size)
        .map(|name| Combatant::new(*name, rng.gen_range(90..130), rng.gen_range(30..70)))
        .collect()
}
