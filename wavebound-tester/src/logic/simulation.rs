//! One seeded run of the engine against simulated collaborators.

use anyhow::{Context, Result, bail};
use wavebound_engine::{
    BattleSession, BattleSetup, Collaborators, CombatRules, Combatant, EncounterRewardSpec,
    EngineConfig, NextWave, ProgressStore, ResumeEvent, ResumeSignal, RunEnd, RunStatus,
    chained_trainer_challenge,
};

use super::collaborators::{
    SharedTranscript, SimPresenter, SimRules, SimStore, WorldPlan, merchant, seeded_party,
};
use super::policy::{Strategy, fallback};

/// Resume budget for a single run; a run that needs more is reported as hung.
const MAX_RESUMES: usize = 5_000;

/// What a run starts with before the first `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opening {
    Battle,
    Gauntlet { trainers: usize, payout: u64 },
    Merchant,
}

/// Everything needed to reproduce a run except the seed.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub world: WorldPlan,
    pub opening: Opening,
    pub party_size: usize,
    pub starting_money: u64,
    pub strategy: Strategy,
    pub config: EngineConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationSummary {
    pub seed: u64,
    pub end: Option<RunEnd>,
    pub wave: u32,
    pub turns: u32,
    pub resumes: usize,
    pub rejected: usize,
    pub rewards: usize,
    pub offers: usize,
    pub cues: usize,
    pub money: u64,
    pub spent: u64,
    pub encounters: Vec<String>,
    pub lines: Vec<String>,
}

impl SimulationSummary {
    pub fn ending_label(&self) -> &'static str {
        match self.end {
            Some(RunEnd::Cleared) => "cleared",
            Some(RunEnd::Defeat) => "defeat",
            None => "idle",
        }
    }
}

pub fn run_plan(plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
    let transcript = SharedTranscript::default();
    let mut presenter = SimPresenter::new(&transcript);
    let rules = SimRules::new(seed, plan.world);
    let mut store = SimStore::with_money(plan.starting_money);

    let mut session = BattleSession::new(
        plan.config.clone(),
        seed,
        seeded_party(seed, plan.party_size),
    )
    .context("building session")?;
    match &plan.opening {
        Opening::Battle => match rules.next_wave(session.state()) {
            NextWave::Battle(setup) => session.start_battle(&setup),
            NextWave::Encounter(encounter) => session.begin_encounter(encounter)?,
            NextWave::Cleared => {}
        },
        Opening::Gauntlet { trainers, payout } => {
            let rosters = (0..*trainers)
                .map(|idx| {
                    BattleSetup::trainer(
                        format!("Challenger {}", idx + 1),
                        vec![Combatant::new(
                            format!("Challenger {}'s Mite", idx + 1),
                            20,
                            15,
                        )],
                    )
                })
                .collect();
            session.begin_encounter(chained_trainer_challenge(
                "gauntlet",
                "Challenger Row",
                rosters,
                EncounterRewardSpec::default().with_money(*payout),
            ))?;
        }
        Opening::Merchant => session.begin_encounter(merchant(session.state().wave))?,
    }

    let mut resumes = 0;
    let mut rejected = 0;
    let mut rerolled = false;
    {
        let mut collab = Collaborators::new(&mut presenter, &rules, &mut store);
        let mut status = session.run(&mut collab).context("starting the scheduler")?;
        while let RunStatus::Suspended { phase, token } = status {
            if resumes >= MAX_RESUMES {
                bail!("{phase} still suspended on {token} after {MAX_RESUMES} resumes");
            }
            resumes += 1;
            let signal = plan.strategy.answer(
                session.state(),
                phase,
                &transcript.borrow(),
                collab.store.money(),
                rerolled,
            );
            rerolled = matches!(signal, ResumeSignal::Reroll);
            status = match session.resume(ResumeEvent::new(token, signal.clone()), &mut collab) {
                Ok(next) => next,
                Err(err) if err.is_precondition() => {
                    log::debug!("{phase} refused {}: {err}", signal.label());
                    rejected += 1;
                    session
                        .resume(ResumeEvent::new(token, fallback(&signal)), &mut collab)
                        .with_context(|| format!("{phase} refused the fallback signal"))?
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("resuming {phase} on {token} with {}", signal.label())
                    });
                }
            };
        }
    }

    let state = session.state();
    let transcript = transcript.take();
    Ok(SimulationSummary {
        seed,
        end: state.run_end,
        wave: state.wave,
        turns: state.turn,
        resumes,
        rejected,
        rewards: store.granted.len(),
        offers: transcript.offers,
        cues: transcript.cues,
        money: store.money,
        spent: store.spent,
        encounters: state
            .seen_encounters
            .iter()
            .map(|seen| seen.encounter_id.clone())
            .collect(),
        lines: transcript.lines,
    })
}
