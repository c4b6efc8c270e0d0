//! Closed namespace of model components
//!
//! Every set, parameter, variable and constraint the registry can declare is
//! named here. A closed enum keeps component references checkable at compile
//! time and makes renames mechanical.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Name of one model component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentName {
    // region Sets
    Buses,
    /// Buses with type 3, whose angle is fixed to zero
    SlackBuses,
    Generators,
    /// Bus -> generators connected to it (complete over buses)
    GeneratorsAtBus,
    SynchronousGenerators,
    NonSynchronousGenerators,
    UncontrollableGenerators,
    IndividualGenerators,
    ProRataGenerators,
    /// Distinct pro-rata group labels
    ProRataGroups,
    /// Generator -> the pro-rata groups it belongs to
    ProRataGroupsOf,
    /// (generator, group) membership pairs
    ProRataPairs,
    LifoGenerators,
    /// (earlier, later) connection-order pairs within each LIFO group
    LifoPairs,
    Lines,
    /// Lines carried by the current period's network
    ActiveLines,
    LinesInToBus,
    LinesOutOfBus,
    /// Line -> its (from-bus, to-bus) endpoints
    LineBuses,
    Transformers,
    ActiveTransformers,
    TransformersInToBus,
    TransformersOutOfBus,
    TransformerBuses,
    Demands,
    /// Demands with a negative setpoint (embedded export)
    NegativeDemands,
    DemandsAtBus,
    // endregion Sets

    // region Parameters
    BasePower,
    SnspLimit,
    LineRating,
    LineReactance,
    LineSusceptance,
    TransformerRating,
    TransformerReactance,
    TransformerSusceptance,
    DemandReal,
    Voll,
    PgMax,
    PgMin,
    PgMinGen,
    /// Exogenous setpoint for uncontrollable generators
    PgSetpoint,
    CostFixed,
    CostLinear,
    BidPrice,
    OfferPrice,
    /// Snapshot of the market-stage dispatch, taken between stages
    PgMarket,
    /// Snapshot of the security-stage dispatch, taken between stages
    PgSecure,
    // endregion Parameters

    // region Variables
    Pg,
    PgOffer,
    PgBid,
    Pd,
    /// Served fraction of each demand, in [0, 1]
    Alpha,
    /// Pro-rata curtailment level per group
    ZetaGroup,
    /// Pro-rata curtailment level per generator
    ZetaGen,
    /// Binary selector of the group binding each generator
    ZetaPick,
    /// LIFO full-curtailment indicator
    Gamma,
    /// LIFO continuous curtailment fraction
    Beta,
    Angle,
    AngleDiffLine,
    AngleDiffTransformer,
    FlowLine,
    FlowTransformer,
    // endregion Variables

    // region Constraints
    LineRatingUpper,
    LineRatingLower,
    TransformerRatingUpper,
    TransformerRatingLower,
    /// pD == alpha * PD
    DemandServed,
    /// Negative demands are always fully served
    DemandAlphaFixNegative,
    GenSimpleUpper,
    GenSimpleLower,
    GenMinimumGeneration,
    GenUncontrollableSetpoint,
    GenIndividualUpper,
    GenIndividualLower,
    GenProRataUpper,
    GenProRataFloor,
    GenProRataTrack,
    GenProRataGroupCap,
    GenProRataGroupBind,
    GenProRataPickOne,
    GenLifoUpper,
    GenLifoLower,
    GenLifoOrder,
    GenLifoBlock,
    /// pG == PG_MARKET + pG_offer - pG_bid
    GenMarketRedispatch,
    /// pG == PG_SECURE + pG_offer - pG_bid
    GenSecureRedispatch,
    Snsp,
    PowerBalanceCopper,
    PowerBalanceNodal,
    KvlLine,
    KvlTransformer,
    AngleDiffLineDef,
    AngleDiffTransformerDef,
    ReferenceAngle,
    // endregion Constraints
}

impl Display for ComponentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
