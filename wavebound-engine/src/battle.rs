//! Shared battle-state aggregate handed to every phase.

use crate::constants::{HURT_MAX_RATIO_PERMILLE, HURT_MIN_MISSING_HP};
use crate::turn_order::{TurnOrderError, validate_override};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Field position of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattlerIndex {
    Player,
    PlayerTwo,
    Enemy,
    EnemyTwo,
}

impl BattlerIndex {
    pub const ALL: [Self; 4] = [Self::Player, Self::PlayerTwo, Self::Enemy, Self::EnemyTwo];

    #[must_use]
    pub const fn side(self) -> Side {
        match self {
            Self::Player | Self::PlayerTwo => Side::Player,
            Self::Enemy | Self::EnemyTwo => Side::Enemy,
        }
    }

    /// Field slot on this battler's own side (0 or 1).
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            Self::Player | Self::Enemy => 0,
            Self::PlayerTwo | Self::EnemyTwo => 1,
        }
    }

    #[must_use]
    pub const fn from_side_slot(side: Side, slot: usize) -> Self {
        match (side, slot) {
            (Side::Player, 0) => Self::Player,
            (Side::Player, _) => Self::PlayerTwo,
            (Side::Enemy, 0) => Self::Enemy,
            (Side::Enemy, _) => Self::EnemyTwo,
        }
    }
}

impl fmt::Display for BattlerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Player => "player",
            Self::PlayerTwo => "player-2",
            Self::Enemy => "enemy",
            Self::EnemyTwo => "enemy-2",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Player,
    Enemy,
}

/// One party member as far as scheduling and reward weighting are concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub name: String,
    pub hp: u32,
    pub max_hp: u32,
    pub speed: u32,
    #[serde(default)]
    pub luck: u32,
}

impl Combatant {
    #[must_use]
    pub fn new(name: impl Into<String>, max_hp: u32, speed: u32) -> Self {
        Self {
            name: name.into(),
            hp: max_hp,
            max_hp,
            speed,
            luck: 0,
        }
    }

    #[must_use]
    pub const fn with_hp(mut self, hp: u32) -> Self {
        self.hp = if hp > self.max_hp { self.max_hp } else { hp };
        self
    }

    #[must_use]
    pub const fn with_luck(mut self, luck: u32) -> Self {
        self.luck = luck;
        self
    }

    #[must_use]
    pub const fn is_fainted(&self) -> bool {
        self.hp == 0
    }

    /// Missing a meaningful chunk of HP while still standing.
    #[must_use]
    pub const fn is_hurt(&self) -> bool {
        is_hurt(self.hp, self.max_hp)
    }
}

/// A command chosen for a battler during the command step of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Fight {
        move_id: String,
        target: BattlerIndex,
    },
    Switch {
        party_slot: usize,
    },
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    Victory,
    Defeat,
}

/// Why a run stopped scheduling phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    /// The player party was wiped out.
    Defeat,
    /// The combat collaborator had no further battle to offer.
    Cleared,
}

/// Enemy roster for a battle started mid-encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSetup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer: Option<String>,
    pub enemies: Vec<Combatant>,
    #[serde(default)]
    pub double: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
}

impl BattleSetup {
    #[must_use]
    pub fn trainer(name: impl Into<String>, enemies: Vec<Combatant>) -> Self {
        let name = name.into();
        Self {
            intro: Some(format!("{name} would like to battle!")),
            trainer: Some(name),
            enemies,
            double: false,
        }
    }
}

/// Record of an encounter the player has met this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenEncounter {
    pub encounter_id: String,
    pub wave: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<usize>,
}

/// Mutable battle aggregate. Only the current phase writes to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub wave: u32,
    pub turn: u32,
    #[serde(default)]
    pub double: bool,
    pub player_party: Vec<Combatant>,
    #[serde(default)]
    pub enemy_party: Vec<Combatant>,
    /// Party indices occupying each player field slot.
    #[serde(default)]
    pub player_field: [Option<usize>; 2],
    #[serde(default)]
    pub enemy_field: [Option<usize>; 2],
    #[serde(default)]
    pub trainer: Option<String>,
    #[serde(default)]
    pub commands: BTreeMap<BattlerIndex, Command>,
    /// Forced action order for the upcoming turn, consumed by `TurnStart`.
    /// Only set through [`BattleState::set_turn_order_override`].
    #[serde(default)]
    pub(crate) turn_order_override: Option<Vec<BattlerIndex>>,
    #[serde(default)]
    pub last_turn_order: Vec<BattlerIndex>,
    #[serde(default)]
    pub outcome: Option<BattleOutcome>,
    #[serde(default)]
    pub run_end: Option<RunEnd>,
    #[serde(default)]
    pub seen_encounters: Vec<SeenEncounter>,
    /// Move/status events reported back by the combat collaborator.
    #[serde(default)]
    pub log: Vec<String>,
}

impl BattleState {
    /// Start a run at wave 1 with the given player party on the field.
    #[must_use]
    pub fn new(player_party: Vec<Combatant>) -> Self {
        let mut state = Self {
            wave: 1,
            turn: 0,
            player_party,
            ..Self::default()
        };
        state.fill_field(Side::Player);
        state
    }

    #[must_use]
    pub fn party(&self, side: Side) -> &[Combatant] {
        match side {
            Side::Player => &self.player_party,
            Side::Enemy => &self.enemy_party,
        }
    }

    fn field(&self, side: Side) -> &[Option<usize>; 2] {
        match side {
            Side::Player => &self.player_field,
            Side::Enemy => &self.enemy_field,
        }
    }

    fn field_mut(&mut self, side: Side) -> &mut [Option<usize>; 2] {
        match side {
            Side::Player => &mut self.player_field,
            Side::Enemy => &mut self.enemy_field,
        }
    }

    /// Party index occupying a field position.
    #[must_use]
    pub fn party_index(&self, battler: BattlerIndex) -> Option<usize> {
        self.field(battler.side())[battler.slot()]
    }

    #[must_use]
    pub fn battler(&self, battler: BattlerIndex) -> Option<&Combatant> {
        let idx = self.party_index(battler)?;
        self.party(battler.side()).get(idx)
    }

    pub fn battler_mut(&mut self, battler: BattlerIndex) -> Option<&mut Combatant> {
        let idx = self.party_index(battler)?;
        match battler.side() {
            Side::Player => self.player_party.get_mut(idx),
            Side::Enemy => self.enemy_party.get_mut(idx),
        }
    }

    /// Battlers on the field that can still act, in index order.
    #[must_use]
    pub fn active_battlers(&self) -> SmallVec<[BattlerIndex; 4]> {
        BattlerIndex::ALL
            .into_iter()
            .filter(|idx| self.battler(*idx).is_some_and(|c| !c.is_fainted()))
            .collect()
    }

    /// Members of a side that are still able to fight.
    #[must_use]
    pub fn able_count(&self, side: Side) -> usize {
        self.party(side).iter().filter(|c| !c.is_fainted()).count()
    }

    #[must_use]
    pub fn side_defeated(&self, side: Side) -> bool {
        self.able_count(side) == 0
    }

    /// First healthy party member not already on the field.
    #[must_use]
    pub fn next_replacement(&self, side: Side) -> Option<usize> {
        let field = self.field(side);
        self.party(side)
            .iter()
            .enumerate()
            .find(|(idx, c)| !c.is_fainted() && !field.contains(&Some(*idx)))
            .map(|(idx, _)| idx)
    }

    /// Put `party_slot` into the battler's field position.
    pub fn place(&mut self, battler: BattlerIndex, party_slot: usize) {
        self.field_mut(battler.side())[battler.slot()] = Some(party_slot);
    }

    pub fn vacate(&mut self, battler: BattlerIndex) {
        self.field_mut(battler.side())[battler.slot()] = None;
    }

    fn fill_field(&mut self, side: Side) {
        let slots = if self.double { 2 } else { 1 };
        *self.field_mut(side) = [None, None];
        for slot in 0..slots {
            if let Some(idx) = self.next_replacement(side) {
                self.place(BattlerIndex::from_side_slot(side, slot), idx);
            }
        }
    }

    /// Force the action order of the upcoming turn.
    ///
    /// # Errors
    ///
    /// Returns `TurnOrderError` unless `order` is a permutation of the
    /// battlers currently able to act; the previous override is kept.
    pub fn set_turn_order_override(
        &mut self,
        order: Vec<BattlerIndex>,
    ) -> Result<(), TurnOrderError> {
        validate_override(&self.active_battlers(), &order)?;
        self.turn_order_override = Some(order);
        Ok(())
    }

    #[must_use]
    pub fn turn_order_override(&self) -> Option<&[BattlerIndex]> {
        self.turn_order_override.as_deref()
    }

    pub fn clear_turn_order_override(&mut self) {
        self.turn_order_override = None;
    }

    /// Swap in a fresh enemy roster and reset per-battle bookkeeping.
    pub fn load_battle(&mut self, setup: &BattleSetup) {
        self.enemy_party.clone_from(&setup.enemies);
        self.trainer.clone_from(&setup.trainer);
        self.double = setup.double;
        self.turn = 0;
        self.outcome = None;
        self.commands.clear();
        self.turn_order_override = None;
        self.fill_field(Side::Enemy);
        self.fill_field(Side::Player);
    }

    /// An enemy roster is loaded and no victor has been decided yet.
    #[must_use]
    pub fn battle_in_progress(&self) -> bool {
        self.run_end.is_none() && self.outcome.is_none() && !self.side_defeated(Side::Enemy)
    }

    /// Capture the facts reward weights are allowed to see.
    #[must_use]
    pub fn party_snapshot(&self, unlocks: UnlockSnapshot) -> PartySnapshot {
        PartySnapshot {
            members: self
                .player_party
                .iter()
                .map(|c| MemberSnapshot {
                    hp: c.hp,
                    max_hp: c.max_hp,
                    luck: c.luck,
                })
                .collect(),
            unlocks,
        }
    }
}

/// Read-only view of one party member for weight functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub hp: u32,
    pub max_hp: u32,
    pub luck: u32,
}

impl MemberSnapshot {
    #[must_use]
    pub const fn is_fainted(&self) -> bool {
        self.hp == 0
    }

    #[must_use]
    pub const fn is_hurt(&self) -> bool {
        is_hurt(self.hp, self.max_hp)
    }
}

/// Unlock flags visible to reward weights, captured once per draw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockSnapshot {
    flags: BTreeSet<String>,
}

impl UnlockSnapshot {
    #[must_use]
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_unlocked(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}

/// Explicit inputs to reward weight functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub members: Vec<MemberSnapshot>,
    #[serde(default)]
    pub unlocks: UnlockSnapshot,
}

impl PartySnapshot {
    #[must_use]
    pub fn hurt_members(&self) -> u32 {
        count_u32(self.members.iter().filter(|m| m.is_hurt()))
    }

    #[must_use]
    pub fn fainted_members(&self) -> u32 {
        count_u32(self.members.iter().filter(|m| m.is_fainted()))
    }

    /// Summed luck of members still standing, capped at `cap`.
    #[must_use]
    pub fn luck(&self, cap: u32) -> u32 {
        self.members
            .iter()
            .filter(|m| !m.is_fainted())
            .map(|m| m.luck)
            .fold(0_u32, u32::saturating_add)
            .min(cap)
    }
}

const fn is_hurt(hp: u32, max_hp: u32) -> bool {
    if hp == 0 {
        return false;
    }
    let missing = max_hp.saturating_sub(hp);
    missing >= HURT_MIN_MISSING_HP
        && (hp as u64) * 1_000 <= (max_hp as u64) * (HURT_MAX_RATIO_PERMILLE as u64)
}

fn count_u32<I: Iterator>(iter: I) -> u32 {
    u32::try_from(iter.count()).unwrap_or(u32::MAX)
}
