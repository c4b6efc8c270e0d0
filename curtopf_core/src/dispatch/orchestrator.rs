//! The per-period, three-stage solve pipeline
//!
//! Every component is materialized once up front and all constraints are
//! deactivated; each stage then activates the families it needs, swaps the
//! objective and solves. Stage results are snapshotted into the reference
//! parameters the next stage's split constraints read. Between periods the
//! time-varying parameters are refreshed and the active-network sets and
//! their dependent constraint blocks are rebuilt, since line availability
//! can change with the rating time series.
use log::info;
use thiserror::Error;

use crate::case::{Case, CaseError};
use crate::configuration::CONFIGURATION;
use crate::dispatch::objectives::{market_objective, redispatch_objective};
use crate::dispatch::report::{
    InstanceSnapshot, IterationRecord, RunReport, StageName, StageRecord,
};
use crate::model::expr::Key;
use crate::model::instance::{ModelError, ModelInstance};
use crate::model::name::ComponentName;
use crate::model::registry::{Registry, SetData};
use crate::optimize::{solve_instance, SolveError, SolveResult};

/// Errors fatal to a dispatch run; a failed stage aborts the whole run
/// since the next stage depends on its committed reference values
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error(transparent)]
    Case(#[from] CaseError),
}

/// Time series tables and the mutable parameters they refresh; the flag
/// marks MW quantities needing per-unit scaling
const TS_UPDATES: &[(&str, ComponentName, bool)] = &[
    ("ts_PD", ComponentName::DemandReal, true),
    ("ts_VOLL", ComponentName::Voll, false),
    ("ts_Lmax", ComponentName::LineRating, true),
    ("ts_TLmax", ComponentName::TransformerRating, true),
    ("ts_PGLB", ComponentName::PgMin, true),
    ("ts_PGUB", ComponentName::PgMax, true),
    ("ts_bid", ComponentName::BidPrice, false),
];

const MARKET_STAGE: &[ComponentName] = &[
    ComponentName::PowerBalanceCopper,
    ComponentName::DemandServed,
    ComponentName::DemandAlphaFixNegative,
    ComponentName::GenSimpleUpper,
    ComponentName::GenSimpleLower,
];

const NETWORK_STAGE: &[ComponentName] = &[
    ComponentName::PowerBalanceNodal,
    ComponentName::KvlLine,
    ComponentName::KvlTransformer,
    ComponentName::AngleDiffLineDef,
    ComponentName::AngleDiffTransformerDef,
    ComponentName::LineRatingUpper,
    ComponentName::LineRatingLower,
    ComponentName::TransformerRatingUpper,
    ComponentName::TransformerRatingLower,
    ComponentName::ReferenceAngle,
    ComponentName::GenSecureRedispatch,
];

/// Constraint blocks indexed by the active-network sets; rebuilt per period
const NETWORK_REBUILD: &[ComponentName] = &[
    ComponentName::AngleDiffLineDef,
    ComponentName::AngleDiffTransformerDef,
    ComponentName::KvlLine,
    ComponentName::KvlTransformer,
];

/// Drives the market -> secure -> network pipeline over all periods
pub struct Orchestrator {
    registry: Registry,
    instance: ModelInstance,
}

impl Orchestrator {
    pub fn new(case: Case) -> Self {
        Orchestrator {
            registry: Registry::standard(),
            instance: ModelInstance::new(case),
        }
    }

    pub fn instance(&self) -> &ModelInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut ModelInstance {
        &mut self.instance
    }

    /// Build the full model once, then run the three-stage pipeline for
    /// every period of the case
    pub fn run(&mut self) -> Result<RunReport, DispatchError> {
        self.instance.build_all(&self.registry)?;
        self.instance.deactivate_all();
        let labels = self.instance.case().iteration_labels();
        let mut report = RunReport::default();
        for label in labels {
            info!("dispatching period {}", label);
            report.iterations.push(self.run_iteration(&label)?);
        }
        Ok(report)
    }

    fn run_iteration(&mut self, label: &str) -> Result<IterationRecord, DispatchError> {
        self.refresh_time_series(label)?;
        self.rebuild_active_network()?;
        self.instance.deactivate_all();
        let mut stages = Vec::new();

        // market stage: copper plate, simple bounds, no policy machinery
        self.instance.activate(MARKET_STAGE)?;
        self.instance.set_objective(market_objective(&self.instance)?);
        let result = self.solve()?;
        self.snapshot(ComponentName::PgMarket)?;
        stages.push(self.record(StageName::Market, result));

        // secure stage: policy families replace the simple bounds
        self.instance
            .deactivate(&[ComponentName::GenSimpleUpper, ComponentName::GenSimpleLower])?;
        self.instance.activate(&[
            ComponentName::GenMinimumGeneration,
            ComponentName::GenMarketRedispatch,
        ])?;
        self.activate_policy_families()?;
        if self.instance.case().snsp_limit().is_some() {
            self.instance.activate(&[ComponentName::Snsp])?;
        }
        self.instance
            .set_objective(redispatch_objective(&self.instance)?);
        let result = self.solve()?;
        self.snapshot(ComponentName::PgSecure)?;
        stages.push(self.record(StageName::Secure, result));

        // network stage: nodal balance and line physics replace copper plate
        self.instance.deactivate(&[
            ComponentName::PowerBalanceCopper,
            ComponentName::GenMarketRedispatch,
        ])?;
        self.instance.activate(NETWORK_STAGE)?;
        self.instance
            .set_objective(redispatch_objective(&self.instance)?);
        let result = self.solve()?;
        stages.push(self.record(StageName::Network, result));

        // leave everything inactive so next period's activations are
        // idempotent
        self.instance.deactivate_all();
        Ok(IterationRecord {
            label: label.to_string(),
            stages,
        })
    }

    fn solve(&mut self) -> Result<SolveResult, DispatchError> {
        let solver = CONFIGURATION.read().unwrap().solver;
        Ok(solve_instance(&mut self.instance, solver)?)
    }

    fn snapshot(&mut self, param: ComponentName) -> Result<(), DispatchError> {
        let decimals = CONFIGURATION.read().unwrap().snapshot_decimals;
        self.instance
            .snapshot_variable(param, ComponentName::Pg, decimals)?;
        Ok(())
    }

    fn record(&self, stage: StageName, result: SolveResult) -> StageRecord {
        StageRecord {
            stage,
            objective_value: result.objective_value,
            values: InstanceSnapshot::capture(&self.instance),
        }
    }

    fn refresh_time_series(&mut self, label: &str) -> Result<(), DispatchError> {
        for (table, param, scaled) in TS_UPDATES {
            if !self.instance.case().has_table(table) {
                continue;
            }
            let values = if *scaled {
                self.instance.case().ts_map_scaled(table, label)?
            } else {
                self.instance.case().ts_map(table, label)?
            };
            self.instance.update_param_map(*param, &values)?;
        }
        Ok(())
    }

    /// Recompute which lines and transformers carry this period's network
    /// (non-zero rating) and rebuild the constraint blocks indexed by them
    fn rebuild_active_network(&mut self) -> Result<(), DispatchError> {
        let lines = self.rated_members(ComponentName::Lines, ComponentName::LineRating)?;
        self.instance
            .redefine_set(ComponentName::ActiveLines, SetData::Flat(lines))?;
        let transformers =
            self.rated_members(ComponentName::Transformers, ComponentName::TransformerRating)?;
        self.instance
            .redefine_set(ComponentName::ActiveTransformers, SetData::Flat(transformers))?;
        for name in NETWORK_REBUILD {
            self.instance.build_component(&self.registry, *name)?;
        }
        Ok(())
    }

    fn rated_members(
        &self,
        set: ComponentName,
        rating: ComponentName,
    ) -> Result<Vec<Key>, DispatchError> {
        let mut active = Vec::new();
        for key in self.instance.members(set)?.to_vec() {
            if self.instance.param(rating, &key)? > 0.0 {
                active.push(key);
            }
        }
        Ok(active)
    }

    fn activate_policy_families(&mut self) -> Result<(), DispatchError> {
        let uncontrollable = !self
            .instance
            .members(ComponentName::UncontrollableGenerators)?
            .is_empty();
        let individual = !self
            .instance
            .members(ComponentName::IndividualGenerators)?
            .is_empty();
        let prorata = !self
            .instance
            .members(ComponentName::ProRataGenerators)?
            .is_empty();
        let lifo = !self.instance.members(ComponentName::LifoGenerators)?.is_empty();
        if uncontrollable {
            self.instance
                .activate(&[ComponentName::GenUncontrollableSetpoint])?;
        }
        if individual {
            self.instance.activate(&[
                ComponentName::GenIndividualUpper,
                ComponentName::GenIndividualLower,
            ])?;
        }
        if prorata {
            self.instance.activate(&[
                ComponentName::GenProRataUpper,
                ComponentName::GenProRataTrack,
                ComponentName::GenProRataFloor,
                ComponentName::GenProRataGroupCap,
                ComponentName::GenProRataGroupBind,
                ComponentName::GenProRataPickOne,
            ])?;
        }
        if lifo {
            self.instance.activate(&[
                ComponentName::GenLifoUpper,
                ComponentName::GenLifoLower,
                ComponentName::GenLifoOrder,
                ComponentName::GenLifoBlock,
            ])?;
        }
        Ok(())
    }
}

#[cfg(all(test, any(feature = "highs", feature = "microlp")))]
mod tests {
    use super::*;
    use crate::case::{Table, Value};
    use crate::model::expr::VarRef;
    use crate::optimize::objective::Objective;
    use crate::optimize::problem::Problem;
    use crate::optimize::solvers::Solver;
    use crate::optimize::{solve_instance, SolveError};

    fn empty_branches(name: &str) -> Table {
        Table::new(name)
            .with_str_column("name", &[])
            .with_str_column("from_busname", &[])
            .with_str_column("to_busname", &[])
            .with_num_column("x", &[])
            .with_num_column("ContinousRating", &[])
    }

    fn generator_table(rows: Vec<(
        &str, // name
        &str, // busname
        f64,  // PGUB
        &str, // export_policy
        Value, // prorata_groups
        Value, // lifo_group
        Value, // lifo_position
    )>) -> Table {
        let n = rows.len();
        Table::new("generator")
            .with_str_column("name", &rows.iter().map(|r| r.0).collect::<Vec<_>>())
            .with_str_column("busname", &rows.iter().map(|r| r.1).collect::<Vec<_>>())
            .with_num_column("PGLB", &vec![0.0; n])
            .with_num_column("PGUB", &rows.iter().map(|r| r.2).collect::<Vec<_>>())
            .with_num_column("PGMINGEN", &vec![0.0; n])
            .with_num_column("PG", &rows.iter().map(|r| r.2).collect::<Vec<_>>())
            .with_num_column("costc0", &vec![0.0; n])
            .with_num_column("costc1", &vec![10.0; n])
            .with_num_column("bid", &vec![5.0; n])
            .with_num_column("synchronous", &vec![1.0; n])
            .with_str_column(
                "export_policy",
                &rows.iter().map(|r| r.3).collect::<Vec<_>>(),
            )
            .with_column(
                "prorata_groups",
                rows.iter().map(|r| r.4.clone()).collect(),
            )
            .with_column("lifo_group", rows.iter().map(|r| r.5.clone()).collect())
            .with_column("lifo_position", rows.iter().map(|r| r.6.clone()).collect())
    }

    fn demand_table(rows: &[(&str, &str, f64)]) -> Table {
        Table::new("demand")
            .with_str_column("name", &rows.iter().map(|r| r.0).collect::<Vec<_>>())
            .with_str_column("busname", &rows.iter().map(|r| r.1).collect::<Vec<_>>())
            .with_num_column("real", &rows.iter().map(|r| r.2).collect::<Vec<_>>())
            .with_num_column("VOLL", &vec![1000.0; rows.len()])
    }

    fn two_bus_case() -> Case {
        let mut case = Case::new(100.0);
        case.insert_table(
            Table::new("bus")
                .with_str_column("name", &["B1", "B2"])
                .with_num_column("type", &[3.0, 2.0]),
        );
        case.insert_table(generator_table(vec![(
            "G1",
            "B1",
            100.0,
            "individual",
            Value::Null,
            Value::Null,
            Value::Null,
        )]));
        case.insert_table(
            Table::new("branch")
                .with_str_column("name", &["L1"])
                .with_str_column("from_busname", &["B1"])
                .with_str_column("to_busname", &["B2"])
                .with_num_column("x", &[0.1])
                .with_num_column("ContinousRating", &[120.0]),
        );
        case.insert_table(empty_branches("transformer"));
        case.insert_table(demand_table(&[("D1", "B2", 80.0)]));
        case
    }

    #[cfg(feature = "highs")]
    #[test]
    fn two_bus_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut orchestrator = Orchestrator::new(two_bus_case());
        let report = orchestrator.run().unwrap();
        assert_eq!(report.iterations.len(), 1);
        let iteration = &report.iterations[0];
        assert_eq!(iteration.stages.len(), 3);

        let market = &iteration.stages[0];
        assert_eq!(market.stage, StageName::Market);
        let pg = market.values.variable(ComponentName::Pg, &Key::one("G1")).unwrap();
        assert!((pg - 0.8).abs() < 1e-6, "market dispatch {}", pg);
        let alpha = market
            .values
            .variable(ComponentName::Alpha, &Key::one("D1"))
            .unwrap();
        assert!((alpha - 1.0).abs() < 1e-6, "no unserved demand");
        // c1 * pG + bid * (PGmax - pG) = 10 * 0.8 + 5 * 0.2
        assert!((market.objective_value - 9.0).abs() < 1e-6);
        // the market reference was committed for the next stage
        assert!(
            (market.values.parameter(ComponentName::PgMarket, &Key::one("G1")).unwrap() - 0.8)
                .abs()
                < 1e-9
        );

        let network = iteration.final_stage().unwrap();
        assert_eq!(network.stage, StageName::Network);
        let pg = network.values.variable(ComponentName::Pg, &Key::one("G1")).unwrap();
        assert!((pg - 0.8).abs() < 1e-6);
        let flow = network
            .values
            .variable(ComponentName::FlowLine, &Key::one("L1"))
            .unwrap();
        assert!((flow - 0.8).abs() < 1e-6, "line flow {}", flow);
        let slack = network
            .values
            .variable(ComponentName::Angle, &Key::one("B1"))
            .unwrap();
        assert!(slack.abs() < 1e-9, "reference angle pinned");
    }

    #[cfg(feature = "highs")]
    #[test]
    fn negative_demand_is_fully_served() {
        let mut case = two_bus_case();
        case.insert_table(demand_table(&[("D1", "B2", 80.0), ("D2", "B1", -20.0)]));
        let mut orchestrator = Orchestrator::new(case);
        let report = orchestrator.run().unwrap();
        let market = &report.iterations[0].stages[0];
        let alpha = market
            .values
            .variable(ComponentName::Alpha, &Key::one("D2"))
            .unwrap();
        assert!((alpha - 1.0).abs() < 1e-9);
        // embedded generation reduces the net injection requirement
        let pg = market.values.variable(ComponentName::Pg, &Key::one("G1")).unwrap();
        assert!((pg - 0.6).abs() < 1e-6);
    }

    fn lifo_case(demand_mw: f64) -> Case {
        let mut case = Case::new(100.0);
        case.insert_table(
            Table::new("bus")
                .with_str_column("name", &["B1"])
                .with_num_column("type", &[3.0]),
        );
        case.insert_table(generator_table(vec![
            (
                "G1",
                "B1",
                100.0,
                "lifo",
                Value::Null,
                Value::str("A"),
                Value::Num(1.0),
            ),
            (
                "G2",
                "B1",
                100.0,
                "lifo",
                Value::Null,
                Value::str("A"),
                Value::Num(2.0),
            ),
        ]));
        case.insert_table(empty_branches("branch"));
        case.insert_table(empty_branches("transformer"));
        case.insert_table(demand_table(&[("D1", "B1", demand_mw)]));
        case
    }

    #[cfg(feature = "highs")]
    #[test]
    fn lifo_curtails_later_position_first() {
        let mut orchestrator = Orchestrator::new(lifo_case(50.0));
        let report = orchestrator.run().unwrap();
        let secure = &report.iterations[0].stages[1];
        assert_eq!(secure.stage, StageName::Secure);
        let pg1 = secure.values.variable(ComponentName::Pg, &Key::one("G1")).unwrap();
        let pg2 = secure.values.variable(ComponentName::Pg, &Key::one("G2")).unwrap();
        // G2 joined last, so it is fully curtailed before G1 backs off
        assert!(pg2.abs() < 1e-6, "G2 dispatched {}", pg2);
        assert!((pg1 - 0.5).abs() < 1e-6, "G1 dispatched {}", pg1);
    }

    #[cfg(feature = "highs")]
    #[test]
    fn lifo_precedence_violation_is_infeasible() {
        let mut orchestrator = Orchestrator::new(lifo_case(50.0));
        let registry = Registry::standard();
        let instance = orchestrator.instance_mut();
        instance.build_all(&registry).unwrap();
        instance.deactivate_all();
        instance
            .activate(&[
                ComponentName::GenLifoOrder,
                ComponentName::GenLifoBlock,
            ])
            .unwrap();
        // force the earlier generator off while the later one stays on
        instance
            .update_variable_bounds(ComponentName::Gamma, &Key::one("G1"), 1.0, 1.0)
            .unwrap();
        instance
            .update_variable_bounds(ComponentName::Gamma, &Key::one("G2"), 0.0, 0.0)
            .unwrap();
        let mut objective = Objective::new_minimize();
        objective.add_linear_term(VarRef::one(ComponentName::Gamma, "G1"), 1.0);
        instance.set_objective(objective);
        let solver = CONFIGURATION.read().unwrap().solver;
        match solve_instance(instance, solver) {
            Err(SolveError::Infeasible) => {}
            other => panic!("expected infeasibility, got {:?}", other.map(|r| r.objective_value)),
        }
    }

    #[cfg(feature = "highs")]
    #[test]
    fn prorata_generator_tracks_most_restrictive_group() {
        let mut case = lifo_case(50.0);
        case.insert_table(generator_table(vec![(
            "G1",
            "B1",
            100.0,
            "prorata",
            Value::str("A,B"),
            Value::Null,
            Value::Null,
        )]));
        let mut orchestrator = Orchestrator::new(case);
        let registry = Registry::standard();
        let instance = orchestrator.instance_mut();
        instance.build_all(&registry).unwrap();
        instance.deactivate_all();
        instance
            .activate(&[
                ComponentName::GenProRataGroupCap,
                ComponentName::GenProRataGroupBind,
                ComponentName::GenProRataPickOne,
            ])
            .unwrap();
        instance
            .update_variable_bounds(ComponentName::ZetaGroup, &Key::one("A"), 0.3, 0.3)
            .unwrap();
        instance
            .update_variable_bounds(ComponentName::ZetaGroup, &Key::one("B"), 0.6, 0.6)
            .unwrap();
        // maximize the generator fraction; the binding group must still win
        let mut objective = Objective::new_maximize();
        objective.add_linear_term(VarRef::one(ComponentName::ZetaGen, "G1"), 1.0);
        instance.set_objective(objective);
        let solver = CONFIGURATION.read().unwrap().solver;
        solve_instance(instance, solver).unwrap();
        let zeta = instance
            .value(ComponentName::ZetaGen, &Key::one("G1"))
            .unwrap();
        assert!((zeta - 0.3).abs() < 1e-6, "zeta bound to minimum, got {}", zeta);
    }

    #[cfg(feature = "highs")]
    #[test]
    fn time_series_refresh_between_periods() {
        let mut case = two_bus_case();
        case.set_iterations(vec!["t1".to_string(), "t2".to_string()]);
        case.insert_table(
            Table::new("ts_PD")
                .with_str_column("name", &["D1"])
                .with_num_column("t1", &[80.0])
                .with_num_column("t2", &[40.0]),
        );
        let mut orchestrator = Orchestrator::new(case);
        let report = orchestrator.run().unwrap();
        assert_eq!(report.iterations.len(), 2);
        let pg_t1 = report.iterations[0].stages[0]
            .values
            .variable(ComponentName::Pg, &Key::one("G1"))
            .unwrap();
        let pg_t2 = report.iterations[1].stages[0]
            .values
            .variable(ComponentName::Pg, &Key::one("G1"))
            .unwrap();
        assert!((pg_t1 - 0.8).abs() < 1e-6);
        assert!((pg_t2 - 0.4).abs() < 1e-6);
    }

    #[test]
    fn lowering_skips_unreferenced_columns() {
        let mut instance = ModelInstance::new(two_bus_case());
        let registry = Registry::standard();
        instance.build_all(&registry).unwrap();
        instance.deactivate_all();
        instance.activate(MARKET_STAGE).unwrap();
        instance.set_objective(market_objective(&instance).unwrap());
        instance.refresh_rows().unwrap();
        let problem = Problem::from_instance(&instance).unwrap();
        for column in &problem.columns {
            assert!(
                !column.id.starts_with("Angle[") && !column.id.starts_with("FlowLine["),
                "network column {} lowered in the market stage",
                column.id
            );
        }
    }

    #[cfg(feature = "microlp")]
    #[test]
    fn two_bus_stages_solve_under_lp_backend() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut instance = ModelInstance::new(two_bus_case());
        let registry = Registry::standard();
        instance.build_all(&registry).unwrap();
        instance.deactivate_all();

        instance.activate(MARKET_STAGE).unwrap();
        instance.set_objective(market_objective(&instance).unwrap());
        let result = solve_instance(&mut instance, Solver::Microlp).unwrap();
        assert!((result.objective_value - 9.0).abs() < 1e-6);
        let pg = instance.value(ComponentName::Pg, &Key::one("G1")).unwrap();
        assert!((pg - 0.8).abs() < 1e-6, "market dispatch {}", pg);
        instance
            .snapshot_variable(ComponentName::PgMarket, ComponentName::Pg, 6)
            .unwrap();

        instance
            .deactivate(&[ComponentName::GenSimpleUpper, ComponentName::GenSimpleLower])
            .unwrap();
        instance
            .activate(&[
                ComponentName::GenMinimumGeneration,
                ComponentName::GenMarketRedispatch,
                ComponentName::GenIndividualUpper,
                ComponentName::GenIndividualLower,
            ])
            .unwrap();
        instance.set_objective(redispatch_objective(&instance).unwrap());
        solve_instance(&mut instance, Solver::Microlp).unwrap();
        instance
            .snapshot_variable(ComponentName::PgSecure, ComponentName::Pg, 6)
            .unwrap();

        instance
            .deactivate(&[
                ComponentName::PowerBalanceCopper,
                ComponentName::GenMarketRedispatch,
            ])
            .unwrap();
        instance.activate(NETWORK_STAGE).unwrap();
        instance.set_objective(redispatch_objective(&instance).unwrap());
        solve_instance(&mut instance, Solver::Microlp).unwrap();
        let flow = instance
            .value(ComponentName::FlowLine, &Key::one("L1"))
            .unwrap();
        assert!((flow - 0.8).abs() < 1e-6, "line flow {}", flow);
    }

    #[cfg(feature = "highs")]
    #[test]
    fn unbounded_objective_is_reported() {
        let mut instance = ModelInstance::new(two_bus_case());
        let registry = Registry::standard();
        instance.build_all(&registry).unwrap();
        instance.deactivate_all();
        let mut objective = Objective::new_minimize();
        objective.add_linear_term(VarRef::one(ComponentName::Angle, "B1"), 1.0);
        instance.set_objective(objective);
        match solve_instance(&mut instance, Solver::Highs) {
            Err(SolveError::Unbounded) => {}
            other => panic!(
                "expected unboundedness, got {:?}",
                other.map(|r| r.objective_value)
            ),
        }
    }
}
