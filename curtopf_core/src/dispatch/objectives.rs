//! Stage objective functions
//!
//! The market stage clears against generation cost, lost load and
//! curtailment compensation; both redispatch stages price only the movement
//! away from the previous stage's reference, which enters through the
//! redispatch split constraints rather than the objective.
use crate::model::expr::VarRef;
use crate::model::instance::{ModelError, ModelInstance};
use crate::model::name::ComponentName;
use crate::optimize::objective::Objective;

/// Unserved demand valued at VOLL: sum of VOLL * PD * (1 - alpha)
fn add_lost_load_terms(
    objective: &mut Objective,
    instance: &ModelInstance,
) -> Result<(), ModelError> {
    for demand in instance.members(ComponentName::Demands)?.to_vec() {
        let requirement = instance.param(ComponentName::DemandReal, &demand)?;
        let voll = instance.param(ComponentName::Voll, &demand)?;
        objective.add_constant(voll * requirement);
        objective.add_linear_term(
            VarRef::new(ComponentName::Alpha, demand),
            -voll * requirement,
        );
    }
    Ok(())
}

/// Copper-plate market clearing cost:
/// generation linear cost + fixed cost + lost load + curtailment bids
pub fn market_objective(instance: &ModelInstance) -> Result<Objective, ModelError> {
    let base = instance.scalar_param(ComponentName::BasePower)?;
    let mut objective = Objective::new_minimize();
    for gen in instance.members(ComponentName::Generators)?.to_vec() {
        let linear = instance.param(ComponentName::CostLinear, &gen)?;
        let fixed = instance.param(ComponentName::CostFixed, &gen)?;
        let bid = instance.param(ComponentName::BidPrice, &gen)?;
        let max = instance.param(ComponentName::PgMax, &gen)?;
        // bid * (PGmax - pG) compensates curtailed output
        objective.add_constant(fixed / base + bid * max);
        objective.add_linear_term(VarRef::new(ComponentName::Pg, gen), linear - bid);
    }
    add_lost_load_terms(&mut objective, instance)?;
    Ok(objective)
}

/// Redispatch cost: offers paid upward, bids paid downward, plus lost load
pub fn redispatch_objective(instance: &ModelInstance) -> Result<Objective, ModelError> {
    let mut objective = Objective::new_minimize();
    for gen in instance.members(ComponentName::Generators)?.to_vec() {
        let offer = instance.param(ComponentName::OfferPrice, &gen)?;
        let bid = instance.param(ComponentName::BidPrice, &gen)?;
        objective.add_linear_term(VarRef::new(ComponentName::PgOffer, gen.clone()), offer);
        objective.add_linear_term(VarRef::new(ComponentName::PgBid, gen), bid);
    }
    add_lost_load_terms(&mut objective, instance)?;
    Ok(objective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{Case, Table, Value};
    use crate::model::registry::Registry;
    use crate::optimize::objective::ObjectiveSense;

    fn built_instance() -> ModelInstance {
        let mut case = Case::new(100.0);
        case.insert_table(
            Table::new("bus")
                .with_str_column("name", &["B1"])
                .with_num_column("type", &[3.0]),
        );
        case.insert_table(
            Table::new("generator")
                .with_str_column("name", &["G1"])
                .with_str_column("busname", &["B1"])
                .with_num_column("PGLB", &[0.0])
                .with_num_column("PGUB", &[100.0])
                .with_num_column("PGMINGEN", &[0.0])
                .with_num_column("PG", &[100.0])
                .with_num_column("costc0", &[200.0])
                .with_num_column("costc1", &[10.0])
                .with_num_column("bid", &[5.0])
                .with_num_column("synchronous", &[1.0])
                .with_str_column("export_policy", &["individual"])
                .with_column("prorata_groups", vec![Value::Null])
                .with_column("lifo_group", vec![Value::Null])
                .with_column("lifo_position", vec![Value::Null]),
        );
        case.insert_table(
            Table::new("branch")
                .with_str_column("name", &[])
                .with_str_column("from_busname", &[])
                .with_str_column("to_busname", &[])
                .with_num_column("x", &[])
                .with_num_column("ContinousRating", &[]),
        );
        case.insert_table(
            Table::new("transformer")
                .with_str_column("name", &[])
                .with_str_column("from_busname", &[])
                .with_str_column("to_busname", &[])
                .with_num_column("x", &[])
                .with_num_column("ContinousRating", &[]),
        );
        case.insert_table(
            Table::new("demand")
                .with_str_column("name", &["D1"])
                .with_str_column("busname", &["B1"])
                .with_num_column("real", &[80.0])
                .with_num_column("VOLL", &[1000.0]),
        );
        let mut instance = ModelInstance::new(case);
        instance.build_all(&Registry::standard()).unwrap();
        instance
    }

    #[test]
    fn market_objective_nets_bid_against_cost() {
        let instance = built_instance();
        let objective = market_objective(&instance).unwrap();
        assert_eq!(objective.sense, ObjectiveSense::Minimize);
        let pg_term = objective
            .expr
            .terms
            .iter()
            .find(|t| t.var == VarRef::one(ComponentName::Pg, "G1"))
            .unwrap();
        // costc1 - bid
        assert!((pg_term.coef - 5.0).abs() < 1e-12);
        // c0/base + bid * PGmax_pu + VOLL * PD_pu
        let expected_constant = 200.0 / 100.0 + 5.0 * 1.0 + 1000.0 * 0.8;
        assert!((objective.expr.constant - expected_constant).abs() < 1e-9);
    }

    #[test]
    fn redispatch_objective_prices_offers_and_bids() {
        let instance = built_instance();
        let objective = redispatch_objective(&instance).unwrap();
        let offer_term = objective
            .expr
            .terms
            .iter()
            .find(|t| t.var == VarRef::one(ComponentName::PgOffer, "G1"))
            .unwrap();
        assert!((offer_term.coef - 10.0).abs() < 1e-12);
        let bid_term = objective
            .expr
            .terms
            .iter()
            .find(|t| t.var == VarRef::one(ComponentName::PgBid, "G1"))
            .unwrap();
        assert!((bid_term.coef - 5.0).abs() < 1e-12);
        let alpha_term = objective
            .expr
            .terms
            .iter()
            .find(|t| t.var == VarRef::one(ComponentName::Alpha, "D1"))
            .unwrap();
        assert!((alpha_term.coef - (-800.0)).abs() < 1e-9);
    }
}
