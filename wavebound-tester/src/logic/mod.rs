pub mod collaborators;
pub mod policy;
pub mod reports;
pub mod scenarios;
pub mod simulation;
pub mod tester;

pub use scenarios::{all_scenario_names, get_scenario, list_scenarios};
pub use tester::{LogicTester, ScenarioResult};
