use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::scenarios::TestScenario;
use super::simulation::{SimulationPlan, SimulationSummary, run_plan};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    /// Highest wave any iteration reached.
    pub furthest_wave: u32,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

pub struct LogicTester {
    verbose: bool,
}

impl LogicTester {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing scenario: {} (strategy: {} seed: {})",
                    scenario.name.bright_white(),
                    scenario.plan.strategy.label(),
                    seed
                );
            }
            results.push(self.run_single_scenario(scenario, seed, iterations));
        }

        results
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();
        let mut furthest_wave = 0;

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            match self.run_iteration(scenario, iteration_seed) {
                Ok(summary) => {
                    successes += 1;
                    furthest_wave = furthest_wave.max(summary.wave);
                    let duration = start_time.elapsed();
                    performance_data.push(duration);
                    if self.verbose {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?}) wave:{} ending:{} rewards:{}",
                            i + 1,
                            iterations,
                            summary.wave,
                            summary.ending_label(),
                            summary.rewards
                        );
                    }
                }
                Err(err) => {
                    let message = format!("Iteration {} (seed {iteration_seed}): {err:#}", i + 1);
                    if self.verbose {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            message.clone().red()
                        );
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            furthest_wave,
            average_duration,
            performance_data,
        }
    }

    fn run_iteration(
        &self,
        scenario: &TestScenario,
        seed: u64,
    ) -> anyhow::Result<SimulationSummary> {
        let summary = run_plan(&scenario.plan, seed)?;
        log::debug!(
            "{} seed {seed}: {} at wave {} after {} resumes",
            scenario.name,
            summary.ending_label(),
            summary.wave,
            summary.resumes
        );
        for expectation in &scenario.expectations {
            expectation(&summary)?;
        }
        if scenario.check_replay {
            check_replay(&scenario.plan, &summary)?;
        }
        Ok(summary)
    }
}

fn check_replay(plan: &SimulationPlan, first: &SimulationSummary) -> anyhow::Result<()> {
    let second = run_plan(plan, first.seed)?;
    if let Some(at) = first
        .lines
        .iter()
        .zip(&second.lines)
        .position(|(a, b)| a != b)
    {
        anyhow::bail!(
            "replay diverged at line {at}: '{}' vs '{}'",
            first.lines[at],
            second.lines[at]
        );
    }
    anyhow::ensure!(
        first == &second,
        "replay ended differently: {} at wave {} vs {} at wave {}",
        first.ending_label(),
        first.wave,
        second.ending_label(),
        second.wave
    );
    Ok(())
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::scenarios::get_scenario;

    #[test]
    fn smoke_passes_on_the_default_seed() {
        let scenario = get_scenario("smoke").expect("smoke scenario");
        let results = LogicTester::new(false).run_scenario(&scenario, &[1337], 2);
        assert_eq!(results.len(), 1);
        assert!(results[0].passed, "{:?}", results[0].failures);
        assert_eq!(results[0].successful_iterations, 2);
        assert!(results[0].furthest_wave >= 2);
    }

    #[test]
    fn replays_match_for_the_same_seed() {
        let scenario = get_scenario("replay").expect("replay scenario");
        let first = run_plan(&scenario.plan, 99).expect("first run");
        let second = run_plan(&scenario.plan, 99).expect("second run");
        assert_eq!(first, second);
        assert!(!first.lines.is_empty());
    }

    #[test]
    fn results_serialize_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "smoke".into(),
            seed: 1,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            furthest_wave: 3,
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["average_duration"], 12);
        assert_eq!(json["performance_data"][0], 12);
    }
}
