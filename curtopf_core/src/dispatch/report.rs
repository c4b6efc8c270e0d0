//! Result extraction for solved instances
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;

use crate::model::expr::Key;
use crate::model::instance::ModelInstance;
use crate::model::name::ComponentName;
use crate::model::registry::{ParamData, SetData};

/// The three solve stages of one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageName {
    /// Copper-plate market clearing
    Market,
    /// Security-constrained redispatch
    Secure,
    /// Network-feasible DCOPF
    Network,
}

impl Display for StageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StageName::Market => write!(f, "market"),
            StageName::Secure => write!(f, "secure"),
            StageName::Network => write!(f, "network"),
        }
    }
}

/// Plain-value snapshot of an instance: variables, parameters and set
/// membership keyed by component name and index
#[derive(Debug, Clone, Default)]
pub struct InstanceSnapshot {
    pub variables: IndexMap<ComponentName, IndexMap<Key, f64>>,
    pub parameters: IndexMap<ComponentName, IndexMap<Key, f64>>,
    pub sets: IndexMap<ComponentName, Vec<Key>>,
}

impl InstanceSnapshot {
    /// Extract every component's current values. Variables without a
    /// solution value are skipped rather than defaulted.
    pub fn capture(instance: &ModelInstance) -> Self {
        let mut snapshot = InstanceSnapshot::default();
        for (name, block) in instance.variable_blocks() {
            let mut values = IndexMap::new();
            for (key, var) in &block.members {
                if let Some(value) = var.read().unwrap().value {
                    values.insert(key.clone(), value);
                }
            }
            snapshot.variables.insert(*name, values);
        }
        for (name, param) in instance.param_components() {
            let values = match &param.data {
                ParamData::Scalar(v) => IndexMap::from([(Key::Scalar, *v)]),
                ParamData::Map(map) => map.clone(),
            };
            snapshot.parameters.insert(*name, values);
        }
        for (name, set) in instance.set_components() {
            let members = match &set.data {
                SetData::Flat(keys) => keys.clone(),
                SetData::Keyed(map) => map
                    .iter()
                    .flat_map(|(parent, children)| {
                        children.iter().filter_map(move |child| {
                            match (parent.first(), child.first()) {
                                (Some(p), Some(c)) => Some(Key::pair(p, c)),
                                _ => None,
                            }
                        })
                    })
                    .collect(),
            };
            snapshot.sets.insert(*name, members);
        }
        snapshot
    }

    pub fn variable(&self, name: ComponentName, key: &Key) -> Option<f64> {
        self.variables.get(&name)?.get(key).copied()
    }

    pub fn parameter(&self, name: ComponentName, key: &Key) -> Option<f64> {
        self.parameters.get(&name)?.get(key).copied()
    }
}

/// Result of one solve stage
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: StageName,
    pub objective_value: f64,
    pub values: InstanceSnapshot,
}

/// Results of the full pipeline for one period
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub label: String,
    pub stages: Vec<StageRecord>,
}

impl IterationRecord {
    /// The last stage's record, holding the final dispatch for this period
    pub fn final_stage(&self) -> Option<&StageRecord> {
        self.stages.last()
    }
}

/// Results of a whole run, one record per period
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub iterations: Vec<IterationRecord>,
}
