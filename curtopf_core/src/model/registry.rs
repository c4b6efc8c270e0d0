//! Declarative registry of every model component
//!
//! Sets, parameters, variables and constraints are declared here as inert
//! data: index references by [`ComponentName`], plain function pointers as
//! initializers and rules. Nothing is resolved at declaration time; the
//! assembly engine in [`crate::model::instance`] follows the references when
//! a component is materialized, so declaration order in
//! [`Registry::standard`] is also the required build order.
use indexmap::IndexMap;

use crate::case::derive::{
    complete_map, flatten_pairs, group_map_of, groups_of, num_map_of, ordered_pairs,
    scaled_map_of, text_list_of, zipped_map,
};
use crate::case::{tables, Case, CaseError, Filter};
use crate::model::expr::{Comparison, Key, LinExpr, VarRef};
use crate::model::instance::{ModelError, ModelInstance};
use crate::model::name::ComponentName;

/// Export-curtailment policy tags as they appear in the generator table
pub mod policy {
    pub const UNCONTROLLABLE: &str = "uncontrollable";
    pub const INDIVIDUAL: &str = "individual";
    pub const PRO_RATA: &str = "prorata";
    pub const LIFO: &str = "lifo";
}

/// Reference to the index domain of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRef {
    /// Unindexed (scalar) component
    None,
    /// Indexed by the members of one named set
    One(ComponentName),
    /// Indexed by the cartesian product of two named sets, in declared order
    Pair(ComponentName, ComponentName),
}

/// Materialized membership of a set
#[derive(Debug, Clone, PartialEq)]
pub enum SetData {
    /// Plain membership; members may themselves be pair keys
    Flat(Vec<Key>),
    /// Family set: one member list per key of the parent index
    Keyed(IndexMap<Key, Vec<Key>>),
}

/// Materialized values of a parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamData {
    Scalar(f64),
    Map(IndexMap<Key, f64>),
}

/// Domain of a decision variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarDomain {
    /// Free continuous
    Continuous,
    /// Continuous, bounded below by zero
    NonNegative,
    /// Continuous in [0, 1]
    UnitInterval,
    /// Binary in {0, 1}
    Binary,
}

pub type SetInit = fn(&Case) -> Result<SetData, CaseError>;
pub type ParamInit = fn(&Case) -> Result<ParamData, CaseError>;
pub type RuleFn = fn(&ModelInstance, &Key) -> Result<Comparison, ModelError>;

/// Declaration of a set
#[derive(Debug, Clone)]
pub struct SetDef {
    /// Parent index for family sets, e.g. bus -> generators-at-bus
    pub keyed_by: Option<ComponentName>,
    /// Domain the members must fall within, validated at materialization
    pub within: IndexRef,
    /// Number of index positions per member
    pub dimen: usize,
    /// Member order is meaningful and must be preserved
    pub ordered: bool,
    pub init: SetInit,
}

/// Declaration of a parameter
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub index: IndexRef,
    /// Mutable parameters may be updated between solves; immutable ones
    /// are fixed for the life of the instance
    pub mutable: bool,
    pub init: ParamInit,
}

/// Declaration of a decision variable block
#[derive(Debug, Clone)]
pub struct VarDef {
    pub index: IndexRef,
    pub domain: VarDomain,
    /// Explicit bounds overriding the domain defaults
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// Declaration of a constraint block
#[derive(Debug, Clone)]
pub struct ConstraintDef {
    pub index: IndexRef,
    /// Symbolic rule producing one row per index key
    pub rule: RuleFn,
}

/// One registry entry
#[derive(Debug, Clone)]
pub enum ComponentDef {
    Set(SetDef),
    Param(ParamDef),
    Var(VarDef),
    Constraint(ConstraintDef),
}

/// Ordered collection of component declarations
#[derive(Debug, Clone, Default)]
pub struct Registry {
    defs: IndexMap<ComponentName, ComponentDef>,
}

impl Registry {
    pub fn get(&self, name: ComponentName) -> Option<&ComponentDef> {
        self.defs.get(&name)
    }

    /// Declared names, in build order
    pub fn names(&self) -> impl Iterator<Item = ComponentName> + '_ {
        self.defs.keys().copied()
    }

    fn set(
        &mut self,
        name: ComponentName,
        keyed_by: Option<ComponentName>,
        within: IndexRef,
        dimen: usize,
        ordered: bool,
        init: SetInit,
    ) {
        self.defs.insert(
            name,
            ComponentDef::Set(SetDef {
                keyed_by,
                within,
                dimen,
                ordered,
                init,
            }),
        );
    }

    fn param(&mut self, name: ComponentName, index: IndexRef, mutable: bool, init: ParamInit) {
        self.defs
            .insert(name, ComponentDef::Param(ParamDef { index, mutable, init }));
    }

    fn var(&mut self, name: ComponentName, index: IndexRef, domain: VarDomain) {
        self.defs.insert(
            name,
            ComponentDef::Var(VarDef {
                index,
                domain,
                lower: None,
                upper: None,
            }),
        );
    }

    fn constraint(&mut self, name: ComponentName, index: IndexRef, rule: RuleFn) {
        self.defs
            .insert(name, ComponentDef::Constraint(ConstraintDef { index, rule }));
    }

    /// The full component catalogue of the dispatch model, in dependency
    /// order: sets, then parameters, then variables, then constraints
    pub fn standard() -> Self {
        use ComponentName::*;
        let mut r = Registry::default();

        // region Sets
        r.set(Buses, None, IndexRef::None, 1, false, init_buses);
        r.set(SlackBuses, None, IndexRef::One(Buses), 1, false, init_slack_buses);
        r.set(Generators, None, IndexRef::None, 1, false, init_generators);
        r.set(
            GeneratorsAtBus,
            Some(Buses),
            IndexRef::One(Generators),
            1,
            false,
            init_generators_at_bus,
        );
        r.set(
            SynchronousGenerators,
            None,
            IndexRef::One(Generators),
            1,
            false,
            init_synchronous_generators,
        );
        r.set(
            NonSynchronousGenerators,
            None,
            IndexRef::One(Generators),
            1,
            false,
            init_non_synchronous_generators,
        );
        r.set(
            UncontrollableGenerators,
            None,
            IndexRef::One(Generators),
            1,
            false,
            init_uncontrollable_generators,
        );
        r.set(
            IndividualGenerators,
            None,
            IndexRef::One(Generators),
            1,
            false,
            init_individual_generators,
        );
        r.set(
            ProRataGenerators,
            None,
            IndexRef::One(Generators),
            1,
            false,
            init_prorata_generators,
        );
        r.set(ProRataGroups, None, IndexRef::None, 1, false, init_prorata_groups);
        r.set(
            ProRataGroupsOf,
            Some(ProRataGenerators),
            IndexRef::One(ProRataGroups),
            1,
            false,
            init_prorata_groups_of,
        );
        r.set(
            ProRataPairs,
            None,
            IndexRef::Pair(ProRataGenerators, ProRataGroups),
            2,
            false,
            init_prorata_pairs,
        );
        r.set(
            LifoGenerators,
            None,
            IndexRef::One(Generators),
            1,
            false,
            init_lifo_generators,
        );
        r.set(
            LifoPairs,
            None,
            IndexRef::Pair(LifoGenerators, LifoGenerators),
            2,
            true,
            init_lifo_pairs,
        );
        r.set(Lines, None, IndexRef::None, 1, false, init_lines);
        r.set(ActiveLines, None, IndexRef::One(Lines), 1, false, init_lines);
        r.set(
            LinesInToBus,
            Some(Buses),
            IndexRef::One(Lines),
            1,
            false,
            init_lines_in_to_bus,
        );
        r.set(
            LinesOutOfBus,
            Some(Buses),
            IndexRef::One(Lines),
            1,
            false,
            init_lines_out_of_bus,
        );
        r.set(LineBuses, Some(Lines), IndexRef::One(Buses), 1, true, init_line_buses);
        r.set(Transformers, None, IndexRef::None, 1, false, init_transformers);
        r.set(
            ActiveTransformers,
            None,
            IndexRef::One(Transformers),
            1,
            false,
            init_transformers,
        );
        r.set(
            TransformersInToBus,
            Some(Buses),
            IndexRef::One(Transformers),
            1,
            false,
            init_transformers_in_to_bus,
        );
        r.set(
            TransformersOutOfBus,
            Some(Buses),
            IndexRef::One(Transformers),
            1,
            false,
            init_transformers_out_of_bus,
        );
        r.set(
            TransformerBuses,
            Some(Transformers),
            IndexRef::One(Buses),
            1,
            true,
            init_transformer_buses,
        );
        r.set(Demands, None, IndexRef::None, 1, false, init_demands);
        r.set(
            NegativeDemands,
            None,
            IndexRef::One(Demands),
            1,
            false,
            init_negative_demands,
        );
        r.set(
            DemandsAtBus,
            Some(Buses),
            IndexRef::One(Demands),
            1,
            false,
            init_demands_at_bus,
        );
        // endregion Sets

        // region Parameters
        r.param(BasePower, IndexRef::None, false, init_base_power);
        r.param(SnspLimit, IndexRef::None, true, init_snsp_limit);
        r.param(LineRating, IndexRef::One(Lines), true, init_line_rating);
        r.param(LineReactance, IndexRef::One(Lines), false, init_line_reactance);
        r.param(LineSusceptance, IndexRef::One(Lines), false, init_line_susceptance);
        r.param(
            TransformerRating,
            IndexRef::One(Transformers),
            true,
            init_transformer_rating,
        );
        r.param(
            TransformerReactance,
            IndexRef::One(Transformers),
            false,
            init_transformer_reactance,
        );
        r.param(
            TransformerSusceptance,
            IndexRef::One(Transformers),
            false,
            init_transformer_susceptance,
        );
        r.param(DemandReal, IndexRef::One(Demands), true, init_demand_real);
        r.param(Voll, IndexRef::One(Demands), true, init_voll);
        r.param(PgMax, IndexRef::One(Generators), true, init_pg_max);
        r.param(PgMin, IndexRef::One(Generators), true, init_pg_min);
        r.param(PgMinGen, IndexRef::One(Generators), false, init_pg_min_gen);
        r.param(PgSetpoint, IndexRef::One(Generators), true, init_pg_setpoint);
        r.param(CostFixed, IndexRef::One(Generators), false, init_cost_fixed);
        r.param(CostLinear, IndexRef::One(Generators), false, init_cost_linear);
        r.param(BidPrice, IndexRef::One(Generators), true, init_bid_price);
        r.param(OfferPrice, IndexRef::One(Generators), false, init_offer_price);
        r.param(PgMarket, IndexRef::One(Generators), true, init_zero_per_generator);
        r.param(PgSecure, IndexRef::One(Generators), true, init_zero_per_generator);
        // endregion Parameters

        // region Variables
        r.var(Pg, IndexRef::One(Generators), VarDomain::Continuous);
        r.var(PgOffer, IndexRef::One(Generators), VarDomain::NonNegative);
        r.var(PgBid, IndexRef::One(Generators), VarDomain::NonNegative);
        r.var(Pd, IndexRef::One(Demands), VarDomain::Continuous);
        r.var(Alpha, IndexRef::One(Demands), VarDomain::UnitInterval);
        r.var(ZetaGroup, IndexRef::One(ProRataGroups), VarDomain::UnitInterval);
        r.var(ZetaGen, IndexRef::One(ProRataGenerators), VarDomain::UnitInterval);
        r.var(ZetaPick, IndexRef::One(ProRataPairs), VarDomain::Binary);
        r.var(Gamma, IndexRef::One(LifoGenerators), VarDomain::Binary);
        r.var(Beta, IndexRef::One(LifoGenerators), VarDomain::UnitInterval);
        r.var(Angle, IndexRef::One(Buses), VarDomain::Continuous);
        r.var(AngleDiffLine, IndexRef::One(Lines), VarDomain::Continuous);
        r.var(AngleDiffTransformer, IndexRef::One(Transformers), VarDomain::Continuous);
        r.var(FlowLine, IndexRef::One(Lines), VarDomain::Continuous);
        r.var(FlowTransformer, IndexRef::One(Transformers), VarDomain::Continuous);
        // endregion Variables

        // region Constraints
        r.constraint(LineRatingUpper, IndexRef::One(Lines), rule_line_rating_upper);
        r.constraint(LineRatingLower, IndexRef::One(Lines), rule_line_rating_lower);
        r.constraint(
            TransformerRatingUpper,
            IndexRef::One(Transformers),
            rule_transformer_rating_upper,
        );
        r.constraint(
            TransformerRatingLower,
            IndexRef::One(Transformers),
            rule_transformer_rating_lower,
        );
        r.constraint(DemandServed, IndexRef::One(Demands), rule_demand_served);
        r.constraint(
            DemandAlphaFixNegative,
            IndexRef::One(NegativeDemands),
            rule_demand_alpha_fix_negative,
        );
        r.constraint(GenSimpleUpper, IndexRef::One(Generators), rule_gen_simple_upper);
        r.constraint(GenSimpleLower, IndexRef::One(Generators), rule_gen_simple_lower);
        r.constraint(
            GenMinimumGeneration,
            IndexRef::One(SynchronousGenerators),
            rule_gen_minimum_generation,
        );
        r.constraint(
            GenUncontrollableSetpoint,
            IndexRef::One(UncontrollableGenerators),
            rule_gen_uncontrollable_setpoint,
        );
        r.constraint(
            GenIndividualUpper,
            IndexRef::One(IndividualGenerators),
            rule_gen_simple_upper,
        );
        r.constraint(
            GenIndividualLower,
            IndexRef::One(IndividualGenerators),
            rule_gen_simple_lower,
        );
        r.constraint(
            GenProRataUpper,
            IndexRef::One(ProRataGenerators),
            rule_gen_prorata_upper,
        );
        r.constraint(
            GenProRataTrack,
            IndexRef::One(ProRataGenerators),
            rule_gen_prorata_track,
        );
        r.constraint(
            GenProRataFloor,
            IndexRef::One(ProRataGenerators),
            rule_gen_simple_lower,
        );
        r.constraint(
            GenProRataGroupCap,
            IndexRef::One(ProRataPairs),
            rule_gen_prorata_group_cap,
        );
        r.constraint(
            GenProRataGroupBind,
            IndexRef::One(ProRataPairs),
            rule_gen_prorata_group_bind,
        );
        r.constraint(
            GenProRataPickOne,
            IndexRef::One(ProRataGenerators),
            rule_gen_prorata_pick_one,
        );
        r.constraint(GenLifoUpper, IndexRef::One(LifoGenerators), rule_gen_lifo_upper);
        r.constraint(GenLifoLower, IndexRef::One(LifoGenerators), rule_gen_lifo_lower);
        r.constraint(GenLifoOrder, IndexRef::One(LifoPairs), rule_gen_lifo_order);
        r.constraint(GenLifoBlock, IndexRef::One(LifoPairs), rule_gen_lifo_block);
        r.constraint(
            GenMarketRedispatch,
            IndexRef::One(Generators),
            rule_gen_market_redispatch,
        );
        r.constraint(
            GenSecureRedispatch,
            IndexRef::One(Generators),
            rule_gen_secure_redispatch,
        );
        r.constraint(Snsp, IndexRef::None, rule_snsp);
        r.constraint(PowerBalanceCopper, IndexRef::None, rule_power_balance_copper);
        r.constraint(PowerBalanceNodal, IndexRef::One(Buses), rule_power_balance_nodal);
        r.constraint(KvlLine, IndexRef::One(ActiveLines), rule_kvl_line);
        r.constraint(
            KvlTransformer,
            IndexRef::One(ActiveTransformers),
            rule_kvl_transformer,
        );
        r.constraint(
            AngleDiffLineDef,
            IndexRef::One(ActiveLines),
            rule_angle_diff_line_def,
        );
        r.constraint(
            AngleDiffTransformerDef,
            IndexRef::One(ActiveTransformers),
            rule_angle_diff_transformer_def,
        );
        r.constraint(ReferenceAngle, IndexRef::One(SlackBuses), rule_reference_angle);
        // endregion Constraints

        r
    }
}

// region Data helpers
fn flat(ids: Vec<String>) -> SetData {
    SetData::Flat(ids.into_iter().map(Key::One).collect())
}

fn flat_pairs(pairs: Vec<(String, String)>) -> SetData {
    SetData::Flat(pairs.into_iter().map(|(a, b)| Key::Pair(a, b)).collect())
}

fn keyed(map: IndexMap<String, Vec<String>>) -> SetData {
    SetData::Keyed(
        map.into_iter()
            .map(|(k, vs)| (Key::One(k), vs.into_iter().map(Key::One).collect()))
            .collect(),
    )
}

fn map_param(map: IndexMap<String, f64>) -> ParamData {
    ParamData::Map(map.into_iter().map(|(k, v)| (Key::One(k), v)).collect())
}

fn policy_filter(tag: &str) -> Filter {
    Filter::eq_str("export_policy", tag)
}
// endregion Data helpers

// region Set initializers
fn init_buses(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(case.table(tables::BUS)?, "name", None)?))
}

fn init_slack_buses(case: &Case) -> Result<SetData, CaseError> {
    let slack = Filter::num("type", "=", 3.0)?;
    Ok(flat(text_list_of(case.table(tables::BUS)?, "name", Some(&slack))?))
}

fn init_generators(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(case.table(tables::GENERATOR)?, "name", None)?))
}

fn init_generators_at_bus(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(complete_map(
        case.table(tables::BUS)?,
        "name",
        case.table(tables::GENERATOR)?,
        "name",
        "busname",
        None,
    )?))
}

fn init_synchronous_generators(case: &Case) -> Result<SetData, CaseError> {
    let sync = Filter::num("synchronous", "=", 1.0)?;
    Ok(flat(text_list_of(
        case.table(tables::GENERATOR)?,
        "name",
        Some(&sync),
    )?))
}

fn init_non_synchronous_generators(case: &Case) -> Result<SetData, CaseError> {
    let non_sync = Filter::num("synchronous", "!=", 1.0)?;
    Ok(flat(text_list_of(
        case.table(tables::GENERATOR)?,
        "name",
        Some(&non_sync),
    )?))
}

fn init_uncontrollable_generators(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(
        case.table(tables::GENERATOR)?,
        "name",
        Some(&policy_filter(policy::UNCONTROLLABLE)),
    )?))
}

fn init_individual_generators(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(
        case.table(tables::GENERATOR)?,
        "name",
        Some(&policy_filter(policy::INDIVIDUAL)),
    )?))
}

fn init_prorata_generators(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(
        case.table(tables::GENERATOR)?,
        "name",
        Some(&policy_filter(policy::PRO_RATA)),
    )?))
}

fn init_prorata_groups(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(groups_of(
        case.table(tables::GENERATOR)?,
        "prorata_groups",
        Some(&policy_filter(policy::PRO_RATA)),
    )?))
}

fn init_prorata_groups_of(case: &Case) -> Result<SetData, CaseError> {
    let table = case.table(tables::GENERATOR)?;
    let filter = policy_filter(policy::PRO_RATA);
    let memberships = group_map_of(table, "name", "prorata_groups", Some(&filter))?;
    // a generator tagged pro-rata must name at least one group, otherwise
    // the group selection constraint has nothing to pick from
    for generator in text_list_of(table, "name", Some(&filter))? {
        if memberships.get(&generator).map_or(true, Vec::is_empty) {
            return Err(CaseError::EmptyCell {
                table: tables::GENERATOR.to_string(),
                column: "prorata_groups".to_string(),
                key: generator,
            });
        }
    }
    Ok(keyed(memberships))
}

fn init_prorata_pairs(case: &Case) -> Result<SetData, CaseError> {
    let memberships = group_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "prorata_groups",
        Some(&policy_filter(policy::PRO_RATA)),
    )?;
    Ok(flat_pairs(flatten_pairs(&memberships)))
}

fn init_lifo_generators(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(
        case.table(tables::GENERATOR)?,
        "name",
        Some(&policy_filter(policy::LIFO)),
    )?))
}

fn init_lifo_pairs(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat_pairs(ordered_pairs(
        case.table(tables::GENERATOR)?,
        "name",
        "lifo_group",
        "lifo_position",
        Some(&policy_filter(policy::LIFO)),
    )?))
}

fn init_lines(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(case.table(tables::BRANCH)?, "name", None)?))
}

fn init_lines_in_to_bus(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(complete_map(
        case.table(tables::BUS)?,
        "name",
        case.table(tables::BRANCH)?,
        "name",
        "to_busname",
        None,
    )?))
}

fn init_lines_out_of_bus(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(complete_map(
        case.table(tables::BUS)?,
        "name",
        case.table(tables::BRANCH)?,
        "name",
        "from_busname",
        None,
    )?))
}

fn init_line_buses(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(zipped_map(
        case.table(tables::BRANCH)?,
        "name",
        &["from_busname", "to_busname"],
        None,
    )?))
}

fn init_transformers(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(case.table(tables::TRANSFORMER)?, "name", None)?))
}

fn init_transformers_in_to_bus(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(complete_map(
        case.table(tables::BUS)?,
        "name",
        case.table(tables::TRANSFORMER)?,
        "name",
        "to_busname",
        None,
    )?))
}

fn init_transformers_out_of_bus(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(complete_map(
        case.table(tables::BUS)?,
        "name",
        case.table(tables::TRANSFORMER)?,
        "name",
        "from_busname",
        None,
    )?))
}

fn init_transformer_buses(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(zipped_map(
        case.table(tables::TRANSFORMER)?,
        "name",
        &["from_busname", "to_busname"],
        None,
    )?))
}

fn init_demands(case: &Case) -> Result<SetData, CaseError> {
    Ok(flat(text_list_of(case.table(tables::DEMAND)?, "name", None)?))
}

fn init_negative_demands(case: &Case) -> Result<SetData, CaseError> {
    let negative = Filter::num("real", "<", 0.0)?;
    Ok(flat(text_list_of(
        case.table(tables::DEMAND)?,
        "name",
        Some(&negative),
    )?))
}

fn init_demands_at_bus(case: &Case) -> Result<SetData, CaseError> {
    Ok(keyed(complete_map(
        case.table(tables::BUS)?,
        "name",
        case.table(tables::DEMAND)?,
        "name",
        "busname",
        None,
    )?))
}
// endregion Set initializers

// region Parameter initializers
fn init_base_power(case: &Case) -> Result<ParamData, CaseError> {
    Ok(ParamData::Scalar(case.base_power()))
}

fn init_snsp_limit(case: &Case) -> Result<ParamData, CaseError> {
    Ok(ParamData::Scalar(case.snsp_limit().unwrap_or(1.0)))
}

fn init_line_rating(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(scaled_map_of(
        case.table(tables::BRANCH)?,
        "name",
        "ContinousRating",
        case.base_power(),
        None,
    )?))
}

fn init_line_reactance(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(num_map_of(case.table(tables::BRANCH)?, "name", "x", None)?))
}

fn init_line_susceptance(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(reciprocal_map(
        num_map_of(case.table(tables::BRANCH)?, "name", "x", None)?,
        tables::BRANCH,
    )?))
}

/// Susceptance is the reciprocal reactance. Zero reactance cannot be
/// inverted, so it is rejected instead of feeding the solver an infinite
/// coefficient.
fn reciprocal_map(
    reactances: IndexMap<String, f64>,
    table: &str,
) -> Result<IndexMap<String, f64>, CaseError> {
    reactances
        .into_iter()
        .map(|(key, x)| {
            if x == 0.0 {
                Err(CaseError::InvalidValue {
                    table: table.to_string(),
                    column: "x".to_string(),
                    key,
                    value: x,
                })
            } else {
                Ok((key, 1.0 / x))
            }
        })
        .collect()
}

fn init_transformer_rating(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(scaled_map_of(
        case.table(tables::TRANSFORMER)?,
        "name",
        "ContinousRating",
        case.base_power(),
        None,
    )?))
}

fn init_transformer_reactance(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(num_map_of(
        case.table(tables::TRANSFORMER)?,
        "name",
        "x",
        None,
    )?))
}

fn init_transformer_susceptance(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(reciprocal_map(
        num_map_of(case.table(tables::TRANSFORMER)?, "name", "x", None)?,
        tables::TRANSFORMER,
    )?))
}

fn init_demand_real(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(scaled_map_of(
        case.table(tables::DEMAND)?,
        "name",
        "real",
        case.base_power(),
        None,
    )?))
}

fn init_voll(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(num_map_of(case.table(tables::DEMAND)?, "name", "VOLL", None)?))
}

fn init_pg_max(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(scaled_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "PGUB",
        case.base_power(),
        None,
    )?))
}

fn init_pg_min(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(scaled_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "PGLB",
        case.base_power(),
        None,
    )?))
}

fn init_pg_min_gen(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(scaled_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "PGMINGEN",
        case.base_power(),
        None,
    )?))
}

fn init_pg_setpoint(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(scaled_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "PG",
        case.base_power(),
        None,
    )?))
}

fn init_cost_fixed(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(num_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "costc0",
        None,
    )?))
}

fn init_cost_linear(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(num_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "costc1",
        None,
    )?))
}

fn init_bid_price(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(num_map_of(
        case.table(tables::GENERATOR)?,
        "name",
        "bid",
        None,
    )?))
}

/// Upward redispatch is paid at the marginal cost
fn init_offer_price(case: &Case) -> Result<ParamData, CaseError> {
    init_cost_linear(case)
}

/// Stage snapshots start at zero and are overwritten after each solve
fn init_zero_per_generator(case: &Case) -> Result<ParamData, CaseError> {
    Ok(map_param(
        text_list_of(case.table(tables::GENERATOR)?, "name", None)?
            .into_iter()
            .map(|g| (g, 0.0))
            .collect(),
    ))
}
// endregion Parameter initializers

// region Rule helpers
fn one_key(component: ComponentName, key: &Key) -> Result<&str, ModelError> {
    key.first().ok_or_else(|| ModelError::KeyMismatch {
        component,
        key: key.clone(),
    })
}

fn pair_keys(component: ComponentName, key: &Key) -> Result<(&str, &str), ModelError> {
    match (key.first(), key.second()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ModelError::KeyMismatch {
            component,
            key: key.clone(),
        }),
    }
}
// endregion Rule helpers

// region Constraint rules
fn rule_line_rating_upper(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let rating = inst.param(ComponentName::LineRating, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::FlowLine, key.clone()))
        .le(LinExpr::constant(rating)))
}

fn rule_line_rating_lower(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let rating = inst.param(ComponentName::LineRating, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::FlowLine, key.clone()))
        .ge(LinExpr::constant(-rating)))
}

fn rule_transformer_rating_upper(
    inst: &ModelInstance,
    key: &Key,
) -> Result<Comparison, ModelError> {
    let rating = inst.param(ComponentName::TransformerRating, key)?;
    Ok(
        LinExpr::var(VarRef::new(ComponentName::FlowTransformer, key.clone()))
            .le(LinExpr::constant(rating)),
    )
}

fn rule_transformer_rating_lower(
    inst: &ModelInstance,
    key: &Key,
) -> Result<Comparison, ModelError> {
    let rating = inst.param(ComponentName::TransformerRating, key)?;
    Ok(
        LinExpr::var(VarRef::new(ComponentName::FlowTransformer, key.clone()))
            .ge(LinExpr::constant(-rating)),
    )
}

/// pD == alpha * PD
fn rule_demand_served(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let requirement = inst.param(ComponentName::DemandReal, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pd, key.clone())).eq(LinExpr::term(
        VarRef::new(ComponentName::Alpha, key.clone()),
        requirement,
    )))
}

/// Negative demands are embedded generation and must be fully served
fn rule_demand_alpha_fix_negative(
    _inst: &ModelInstance,
    key: &Key,
) -> Result<Comparison, ModelError> {
    Ok(LinExpr::var(VarRef::new(ComponentName::Alpha, key.clone()))
        .eq(LinExpr::constant(1.0)))
}

fn rule_gen_simple_upper(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let max = inst.param(ComponentName::PgMax, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone())).le(LinExpr::constant(max)))
}

fn rule_gen_simple_lower(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let min = inst.param(ComponentName::PgMin, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone())).ge(LinExpr::constant(min)))
}

fn rule_gen_minimum_generation(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let floor = inst.param(ComponentName::PgMinGen, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone())).ge(LinExpr::constant(floor)))
}

fn rule_gen_uncontrollable_setpoint(
    inst: &ModelInstance,
    key: &Key,
) -> Result<Comparison, ModelError> {
    let setpoint = inst.param(ComponentName::PgSetpoint, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone()))
        .eq(LinExpr::constant(setpoint)))
}

/// pG <= PGmax * zeta_g
fn rule_gen_prorata_upper(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let max = inst.param(ComponentName::PgMax, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone())).le(LinExpr::term(
        VarRef::new(ComponentName::ZetaGen, key.clone()),
        max,
    )))
}

/// pG >= PGmax * zeta_g, tight against the upper bound so output tracks the
/// generator curtailment fraction exactly
fn rule_gen_prorata_track(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let max = inst.param(ComponentName::PgMax, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone())).ge(LinExpr::term(
        VarRef::new(ComponentName::ZetaGen, key.clone()),
        max,
    )))
}

/// zeta_g <= zeta_cg for every group the generator belongs to
fn rule_gen_prorata_group_cap(_inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let (gen, group) = pair_keys(ComponentName::GenProRataGroupCap, key)?;
    Ok(LinExpr::var(VarRef::one(ComponentName::ZetaGen, gen))
        .le(LinExpr::var(VarRef::one(ComponentName::ZetaGroup, group))))
}

/// zeta_g >= zeta_cg - (1 - y_g_cg); with the pick-one constraint this makes
/// exactly one group fraction the binding lower bound
fn rule_gen_prorata_group_bind(_inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let (gen, group) = pair_keys(ComponentName::GenProRataGroupBind, key)?;
    Ok(LinExpr::var(VarRef::one(ComponentName::ZetaGen, gen)).ge(
        LinExpr::var(VarRef::one(ComponentName::ZetaGroup, group))
            .plus(VarRef::new(ComponentName::ZetaPick, key.clone()), 1.0)
            .plus_constant(-1.0),
    ))
}

/// sum of y_g_cg over the generator's groups == 1
fn rule_gen_prorata_pick_one(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let gen = one_key(ComponentName::GenProRataPickOne, key)?;
    let mut lhs = LinExpr::new();
    for group in inst.keyed_members(ComponentName::ProRataGroupsOf, key)? {
        let group_id = one_key(ComponentName::GenProRataPickOne, group)?;
        lhs.add_term(VarRef::pair(ComponentName::ZetaPick, gen, group_id), 1.0);
    }
    Ok(lhs.eq(LinExpr::constant(1.0)))
}

/// pG <= (1 - beta) * PGmax
fn rule_gen_lifo_upper(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let max = inst.param(ComponentName::PgMax, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone()))
        .plus(VarRef::new(ComponentName::Beta, key.clone()), max)
        .le(LinExpr::constant(max)))
}

/// pG >= (1 - gamma) * PGmax
fn rule_gen_lifo_lower(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let max = inst.param(ComponentName::PgMax, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone()))
        .plus(VarRef::new(ComponentName::Gamma, key.clone()), max)
        .ge(LinExpr::constant(max)))
}

/// gamma_earlier <= gamma_later: a generator is fully curtailed only after
/// every generator connected later in its group
fn rule_gen_lifo_order(_inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let (earlier, later) = pair_keys(ComponentName::GenLifoOrder, key)?;
    Ok(LinExpr::var(VarRef::one(ComponentName::Gamma, earlier))
        .le(LinExpr::var(VarRef::one(ComponentName::Gamma, later))))
}

/// gamma_earlier <= beta_later: later generators must be fully backed off
/// before an earlier one is switched off
fn rule_gen_lifo_block(_inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let (earlier, later) = pair_keys(ComponentName::GenLifoBlock, key)?;
    Ok(LinExpr::var(VarRef::one(ComponentName::Gamma, earlier))
        .le(LinExpr::var(VarRef::one(ComponentName::Beta, later))))
}

/// pG == PG_MARKET + pG_offer - pG_bid
fn rule_gen_market_redispatch(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let reference = inst.param(ComponentName::PgMarket, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone()))
        .plus(VarRef::new(ComponentName::PgOffer, key.clone()), -1.0)
        .plus(VarRef::new(ComponentName::PgBid, key.clone()), 1.0)
        .eq(LinExpr::constant(reference)))
}

/// pG == PG_SECURE + pG_offer - pG_bid
fn rule_gen_secure_redispatch(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let reference = inst.param(ComponentName::PgSecure, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::Pg, key.clone()))
        .plus(VarRef::new(ComponentName::PgOffer, key.clone()), -1.0)
        .plus(VarRef::new(ComponentName::PgBid, key.clone()), 1.0)
        .eq(LinExpr::constant(reference)))
}

/// Non-synchronous output is capped at a fraction of total served demand
fn rule_snsp(inst: &ModelInstance, _key: &Key) -> Result<Comparison, ModelError> {
    let limit = inst.scalar_param(ComponentName::SnspLimit)?;
    let mut lhs = LinExpr::new();
    for gen in inst.members(ComponentName::NonSynchronousGenerators)? {
        lhs.add_term(VarRef::new(ComponentName::Pg, gen.clone()), 1.0);
    }
    let mut rhs = LinExpr::new();
    for demand in inst.members(ComponentName::Demands)? {
        rhs.add_term(VarRef::new(ComponentName::Pd, demand.clone()), limit);
    }
    Ok(lhs.le(rhs))
}

/// Total generation covers total served demand, ignoring the network
fn rule_power_balance_copper(inst: &ModelInstance, _key: &Key) -> Result<Comparison, ModelError> {
    let mut lhs = LinExpr::new();
    for gen in inst.members(ComponentName::Generators)? {
        lhs.add_term(VarRef::new(ComponentName::Pg, gen.clone()), 1.0);
    }
    let mut rhs = LinExpr::new();
    for demand in inst.members(ComponentName::Demands)? {
        rhs.add_term(VarRef::new(ComponentName::Pd, demand.clone()), 1.0);
    }
    Ok(lhs.eq(rhs))
}

/// Kirchhoff current law at one bus: injections plus inbound flows equal
/// served demand plus outbound flows
fn rule_power_balance_nodal(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let mut lhs = LinExpr::new();
    for gen in inst.keyed_members(ComponentName::GeneratorsAtBus, key)? {
        lhs.add_term(VarRef::new(ComponentName::Pg, gen.clone()), 1.0);
    }
    for line in inst.keyed_members(ComponentName::LinesInToBus, key)? {
        lhs.add_term(VarRef::new(ComponentName::FlowLine, line.clone()), 1.0);
    }
    for tr in inst.keyed_members(ComponentName::TransformersInToBus, key)? {
        lhs.add_term(VarRef::new(ComponentName::FlowTransformer, tr.clone()), 1.0);
    }
    let mut rhs = LinExpr::new();
    for demand in inst.keyed_members(ComponentName::DemandsAtBus, key)? {
        rhs.add_term(VarRef::new(ComponentName::Pd, demand.clone()), 1.0);
    }
    for line in inst.keyed_members(ComponentName::LinesOutOfBus, key)? {
        rhs.add_term(VarRef::new(ComponentName::FlowLine, line.clone()), 1.0);
    }
    for tr in inst.keyed_members(ComponentName::TransformersOutOfBus, key)? {
        rhs.add_term(VarRef::new(ComponentName::FlowTransformer, tr.clone()), 1.0);
    }
    Ok(lhs.eq(rhs))
}

/// Kirchhoff voltage law: flow == susceptance * angle difference
fn rule_kvl_line(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let susceptance = inst.param(ComponentName::LineSusceptance, key)?;
    Ok(LinExpr::var(VarRef::new(ComponentName::FlowLine, key.clone())).eq(LinExpr::term(
        VarRef::new(ComponentName::AngleDiffLine, key.clone()),
        susceptance,
    )))
}

fn rule_kvl_transformer(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let susceptance = inst.param(ComponentName::TransformerSusceptance, key)?;
    Ok(
        LinExpr::var(VarRef::new(ComponentName::FlowTransformer, key.clone())).eq(LinExpr::term(
            VarRef::new(ComponentName::AngleDiffTransformer, key.clone()),
            susceptance,
        )),
    )
}

/// delta == theta_from - theta_to, endpoints taken positionally from the
/// ordered line-to-buses set
fn rule_angle_diff_line_def(inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    let endpoints = inst.keyed_members(ComponentName::LineBuses, key)?;
    if endpoints.len() != 2 {
        return Err(ModelError::KeyMismatch {
            component: ComponentName::LineBuses,
            key: key.clone(),
        });
    }
    Ok(
        LinExpr::var(VarRef::new(ComponentName::AngleDiffLine, key.clone())).eq(LinExpr::var(
            VarRef::new(ComponentName::Angle, endpoints[0].clone()),
        )
        .plus(VarRef::new(ComponentName::Angle, endpoints[1].clone()), -1.0)),
    )
}

fn rule_angle_diff_transformer_def(
    inst: &ModelInstance,
    key: &Key,
) -> Result<Comparison, ModelError> {
    let endpoints = inst.keyed_members(ComponentName::TransformerBuses, key)?;
    if endpoints.len() != 2 {
        return Err(ModelError::KeyMismatch {
            component: ComponentName::TransformerBuses,
            key: key.clone(),
        });
    }
    Ok(
        LinExpr::var(VarRef::new(ComponentName::AngleDiffTransformer, key.clone())).eq(
            LinExpr::var(VarRef::new(ComponentName::Angle, endpoints[0].clone())).plus(
                VarRef::new(ComponentName::Angle, endpoints[1].clone()),
                -1.0,
            ),
        ),
    )
}

/// Slack bus angles are pinned to zero
fn rule_reference_angle(_inst: &ModelInstance, key: &Key) -> Result<Comparison, ModelError> {
    Ok(LinExpr::var(VarRef::new(ComponentName::Angle, key.clone()))
        .eq(LinExpr::constant(0.0)))
}
// endregion Constraint rules

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::Table;

    fn small_case() -> Case {
        let mut case = Case::new(100.0);
        case.insert_table(
            Table::new("bus")
                .with_str_column("name", &["B1", "B2"])
                .with_num_column("type", &[3.0, 2.0]),
        );
        case.insert_table(
            Table::new("generator")
                .with_str_column("name", &["G1", "G2"])
                .with_str_column("busname", &["B1", "B1"])
                .with_num_column("PGUB", &[100.0, 50.0])
                .with_num_column("synchronous", &[1.0, 0.0])
                .with_str_column("export_policy", &["individual", "prorata"])
                .with_column(
                    "prorata_groups",
                    vec![crate::case::Value::Null, crate::case::Value::str("A,B")],
                ),
        );
        case
    }

    #[test]
    fn standard_registry_declares_sets_before_constraints() {
        let registry = Registry::standard();
        let names: Vec<ComponentName> = registry.names().collect();
        let buses = names.iter().position(|n| *n == ComponentName::Buses).unwrap();
        let pg_max = names.iter().position(|n| *n == ComponentName::PgMax).unwrap();
        let pg = names.iter().position(|n| *n == ComponentName::Pg).unwrap();
        let kcl = names
            .iter()
            .position(|n| *n == ComponentName::PowerBalanceNodal)
            .unwrap();
        assert!(buses < pg_max && pg_max < pg && pg < kcl);
    }

    #[test]
    fn slack_buses_filtered_by_type() {
        let data = init_slack_buses(&small_case()).unwrap();
        assert_eq!(data, SetData::Flat(vec![Key::one("B1")]));
    }

    #[test]
    fn policy_subsets_partition_by_tag() {
        let case = small_case();
        assert_eq!(
            init_individual_generators(&case).unwrap(),
            SetData::Flat(vec![Key::one("G1")])
        );
        assert_eq!(
            init_prorata_generators(&case).unwrap(),
            SetData::Flat(vec![Key::one("G2")])
        );
        assert_eq!(init_lifo_generators(&case).unwrap(), SetData::Flat(vec![]));
    }

    #[test]
    fn prorata_pairs_flattened_from_memberships() {
        let data = init_prorata_pairs(&small_case()).unwrap();
        assert_eq!(
            data,
            SetData::Flat(vec![Key::pair("G2", "A"), Key::pair("G2", "B")])
        );
    }

    #[test]
    fn pg_max_scaled_to_per_unit() {
        match init_pg_max(&small_case()).unwrap() {
            ParamData::Map(map) => {
                assert!((map[&Key::one("G1")] - 1.0).abs() < 1e-12);
                assert!((map[&Key::one("G2")] - 0.5).abs() < 1e-12);
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn snapshots_initialize_to_zero() {
        match init_zero_per_generator(&small_case()).unwrap() {
            ParamData::Map(map) => {
                assert_eq!(map.len(), 2);
                assert_eq!(map[&Key::one("G1")], 0.0);
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn zero_reactance_rejected() {
        let mut case = Case::new(100.0);
        case.insert_table(
            Table::new("branch")
                .with_str_column("name", &["L1"])
                .with_num_column("x", &[0.0]),
        );
        match init_line_susceptance(&case) {
            Err(CaseError::InvalidValue { table, column, key, .. }) => {
                assert_eq!(table, "branch");
                assert_eq!(column, "x");
                assert_eq!(key, "L1");
            }
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn prorata_generator_without_groups_rejected() {
        let mut case = Case::new(100.0);
        case.insert_table(
            Table::new("generator")
                .with_str_column("name", &["G1"])
                .with_str_column("export_policy", &["prorata"])
                .with_column("prorata_groups", vec![crate::case::Value::Null]),
        );
        match init_prorata_groups_of(&case) {
            Err(CaseError::EmptyCell { table, column, key }) => {
                assert_eq!(table, "generator");
                assert_eq!(column, "prorata_groups");
                assert_eq!(key, "G1");
            }
            other => panic!("expected empty cell, got {:?}", other),
        }
    }
}
