use anyhow::{Result, ensure};
use wavebound_engine::{EngineConfig, RunEnd};

use super::collaborators::WorldPlan;
use super::policy::Strategy;
use super::simulation::{Opening, SimulationPlan, SimulationSummary};

pub type Expectation = fn(&SimulationSummary) -> Result<()>;

pub struct TestScenario {
    pub name: String,
    pub description: &'static str,
    pub plan: SimulationPlan,
    pub expectations: Vec<Expectation>,
    /// Re-run every iteration and require an identical transcript.
    pub check_replay: bool,
}

const CATALOG: [(&str, &str); 6] = [
    ("smoke", "Three wild battles with a steady player"),
    ("encounters", "Battles interleaved with merchant encounters"),
    ("gauntlet", "A five-trainer challenge that pays out once"),
    ("rerolls", "A spender rerolling every offer it can afford"),
    ("double-battles", "Two-on-two battles with animation cues"),
    ("replay", "Identical seeds replay identical transcripts"),
];

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    CATALOG.to_vec()
}

pub fn all_scenario_names() -> Vec<String> {
    CATALOG.iter().map(|(key, _)| (*key).to_string()).collect()
}

const fn world(final_wave: u32, encounter_every: u32) -> WorldPlan {
    WorldPlan {
        final_wave,
        encounter_every,
        double_battles: false,
        cues: false,
    }
}

fn plan(world: WorldPlan, opening: Opening, strategy: Strategy) -> SimulationPlan {
    SimulationPlan {
        world,
        opening,
        party_size: 3,
        starting_money: 0,
        strategy,
        config: EngineConfig::default(),
    }
}

pub fn get_scenario(name: &str) -> Option<TestScenario> {
    let description = CATALOG
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, description)| *description)?;
    let (plan, expectations, check_replay): (SimulationPlan, Vec<Expectation>, bool) = match name
    {
        "smoke" => (
            plan(world(3, 0), Opening::Battle, Strategy::Steady),
            vec![run_finished, one_pick_per_won_battle],
            false,
        ),
        "encounters" => (
            plan(world(6, 2), Opening::Battle, Strategy::Steady),
            vec![run_finished, merchants_met],
            false,
        ),
        "gauntlet" => (
            plan(
                world(1, 0),
                Opening::Gauntlet {
                    trainers: 5,
                    payout: 1_000,
                },
                Strategy::Steady,
            ),
            vec![run_finished, gauntlet_paid_once],
            false,
        ),
        "rerolls" => {
            let mut rerolls = plan(world(4, 0), Opening::Battle, Strategy::Spender);
            rerolls.starting_money = 2_000;
            (rerolls, vec![run_finished, rerolls_were_paid_for], false)
        }
        "double-battles" => {
            let mut doubles = world(3, 0);
            doubles.double_battles = true;
            doubles.cues = true;
            (
                plan(doubles, Opening::Battle, Strategy::Steady),
                vec![run_finished, cues_played],
                false,
            )
        }
        "replay" => (
            plan(world(5, 3), Opening::Merchant, Strategy::Spender),
            vec![run_finished],
            true,
        ),
        _ => return None,
    };
    Some(TestScenario {
        name: name.to_string(),
        description,
        plan,
        expectations,
        check_replay,
    })
}

fn run_finished(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.end.is_some(),
        "run went idle at wave {} without an ending",
        summary.wave
    );
    ensure!(summary.rejected == 0, "{} signals were refused", summary.rejected);
    Ok(())
}

fn one_pick_per_won_battle(summary: &SimulationSummary) -> Result<()> {
    if summary.end != Some(RunEnd::Cleared) {
        return Ok(());
    }
    let won = usize::try_from(summary.wave.saturating_sub(1)).unwrap_or(usize::MAX);
    ensure!(
        summary.rewards == won,
        "expected {won} reward picks, got {}",
        summary.rewards
    );
    Ok(())
}

fn merchants_met(summary: &SimulationSummary) -> Result<()> {
    if summary.end != Some(RunEnd::Cleared) {
        return Ok(());
    }
    ensure!(
        summary.encounters.len() == 3,
        "expected 3 merchant visits, saw {:?}",
        summary.encounters
    );
    Ok(())
}

fn gauntlet_paid_once(summary: &SimulationSummary) -> Result<()> {
    if summary.end != Some(RunEnd::Cleared) {
        return Ok(());
    }
    ensure!(summary.money == 1_000, "gauntlet paid {}", summary.money);
    let wins = summary
        .lines
        .iter()
        .filter(|line| line.starts_with("You defeated Challenger"))
        .count();
    ensure!(wins == 5, "only {wins} challengers were defeated");
    Ok(())
}

fn rerolls_were_paid_for(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.offers >= summary.rewards,
        "{} rewards granted from {} offers",
        summary.rewards,
        summary.offers
    );
    if summary.offers > summary.rewards {
        ensure!(summary.spent > 0, "rerolled without paying");
    }
    Ok(())
}

fn cues_played(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.turns == 0 || summary.cues > 0,
        "moves resolved without cues"
    );
    Ok(())
}
