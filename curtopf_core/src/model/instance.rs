//! Model assembly engine
//!
//! A [`ModelInstance`] is the live, mutable object holding every
//! materialized set, parameter, variable block and constraint block for one
//! run. Materialization follows the registry's declaration order and
//! resolves index references against components already on the instance;
//! redefining an existing name deletes the prior definition first, so a
//! component can be rebuilt after its index set changed between solves.
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use log::info;
use thiserror::Error;

use crate::case::{Case, CaseError};
use crate::model::expr::{Comparison, Key};
use crate::model::name::ComponentName;
use crate::model::registry::{
    ComponentDef, ConstraintDef, IndexRef, ParamData, ParamDef, Registry, RuleFn, SetData,
    SetDef, VarDef, VarDomain,
};
use crate::optimize::objective::Objective;
use crate::optimize::variable::{Variable, VariableBuilder, VariableType};

/// Errors raised by the assembly engine
#[derive(Error, Debug)]
pub enum ModelError {
    /// A named component is absent from the instance
    #[error("component {0} is not defined on the instance")]
    MissingComponent(ComponentName),
    /// A name was requested that the registry does not declare
    #[error("component {0} is not declared in the registry")]
    UndeclaredComponent(ComponentName),
    /// An index or within reference points at a component that has not been
    /// materialized yet; build order must follow declaration order
    #[error("component {component} references {reference}, which is not materialized yet")]
    UnresolvedReference {
        component: ComponentName,
        reference: ComponentName,
    },
    /// A key's shape or membership does not fit the component's index domain
    #[error("key {key} does not fit component {component}")]
    KeyMismatch { component: ComponentName, key: Key },
    /// A lookup on an existing component found no value under the key
    #[error("component {component} has no value for key {key}")]
    MissingValue { component: ComponentName, key: Key },
    /// A family set was used where a flat member list is required
    #[error("component {0} is a family set and has no flat member list")]
    NotFlat(ComponentName),
    /// A per-iteration update targeted a parameter declared immutable
    #[error("parameter {0} is immutable")]
    ImmutableParameter(ComponentName),
    #[error("failed to build variable: {0}")]
    VariableBuild(String),
    #[error(transparent)]
    Case(#[from] CaseError),
}

/// A materialized set
#[derive(Debug, Clone)]
pub struct SetComponent {
    pub data: SetData,
    pub dimen: usize,
    pub ordered: bool,
}

/// A materialized parameter
#[derive(Debug, Clone)]
pub struct ParamComponent {
    pub data: ParamData,
    pub mutable: bool,
}

/// A materialized block of decision variables, one per index key
#[derive(Debug)]
pub struct VariableBlock {
    pub domain: VarDomain,
    pub members: IndexMap<Key, Arc<RwLock<Variable>>>,
}

/// A materialized constraint block.
///
/// The block keeps its rule and resolved index keys; rows are re-derived
/// from current parameter values by [`ModelInstance::refresh_rows`], so a
/// parameter update takes effect without re-declaring the block.
pub struct ConstraintBlock {
    pub index: IndexRef,
    pub keys: Vec<Key>,
    pub rule: RuleFn,
    pub rows: IndexMap<Key, Comparison>,
    pub active: bool,
}

/// The live optimization model for one run
pub struct ModelInstance {
    case: Case,
    sets: IndexMap<ComponentName, SetComponent>,
    params: IndexMap<ComponentName, ParamComponent>,
    variables: IndexMap<ComponentName, VariableBlock>,
    constraints: IndexMap<ComponentName, ConstraintBlock>,
    objective: Option<Objective>,
}

impl ModelInstance {
    pub fn new(case: Case) -> Self {
        ModelInstance {
            case,
            sets: IndexMap::new(),
            params: IndexMap::new(),
            variables: IndexMap::new(),
            constraints: IndexMap::new(),
            objective: None,
        }
    }

    pub fn case(&self) -> &Case {
        &self.case
    }

    // region Materialization
    /// Materialize every registry entry, in declaration order
    pub fn build_all(&mut self, registry: &Registry) -> Result<(), ModelError> {
        let names: Vec<ComponentName> = registry.names().collect();
        for name in names {
            self.build_component(registry, name)?;
        }
        Ok(())
    }

    /// Materialize one registry entry, replacing any prior definition
    pub fn build_component(
        &mut self,
        registry: &Registry,
        name: ComponentName,
    ) -> Result<(), ModelError> {
        let def = registry
            .get(name)
            .ok_or(ModelError::UndeclaredComponent(name))?
            .clone();
        match def {
            ComponentDef::Set(set_def) => self.build_set(name, &set_def),
            ComponentDef::Param(param_def) => self.build_param(name, &param_def),
            ComponentDef::Var(var_def) => self.build_variable(name, &var_def),
            ComponentDef::Constraint(constraint_def) => {
                self.build_constraint(name, &constraint_def)
            }
        }
    }

    fn log_replace(name: ComponentName) {
        info!("component {} already defined, deleting and recreating", name);
    }

    fn build_set(&mut self, name: ComponentName, def: &SetDef) -> Result<(), ModelError> {
        let data = (def.init)(&self.case)?;
        if let Some(parent) = def.keyed_by {
            if !self.sets.contains_key(&parent) {
                return Err(ModelError::UnresolvedReference {
                    component: name,
                    reference: parent,
                });
            }
            if let SetData::Keyed(map) = &data {
                for key in map.keys() {
                    if !self.set_contains(parent, key)? {
                        return Err(ModelError::KeyMismatch {
                            component: name,
                            key: key.clone(),
                        });
                    }
                }
            }
        }
        self.check_within(name, def.within, &data)?;
        if self
            .sets
            .insert(
                name,
                SetComponent {
                    data,
                    dimen: def.dimen,
                    ordered: def.ordered,
                },
            )
            .is_some()
        {
            Self::log_replace(name);
        }
        Ok(())
    }

    fn check_within(
        &self,
        name: ComponentName,
        within: IndexRef,
        data: &SetData,
    ) -> Result<(), ModelError> {
        let members: Vec<&Key> = match data {
            SetData::Flat(keys) => keys.iter().collect(),
            SetData::Keyed(map) => map.values().flatten().collect(),
        };
        match within {
            IndexRef::None => Ok(()),
            IndexRef::One(domain) => {
                if !self.sets.contains_key(&domain) {
                    return Err(ModelError::UnresolvedReference {
                        component: name,
                        reference: domain,
                    });
                }
                for key in members {
                    if !self.set_contains(domain, key)? {
                        return Err(ModelError::KeyMismatch {
                            component: name,
                            key: key.clone(),
                        });
                    }
                }
                Ok(())
            }
            IndexRef::Pair(first, second) => {
                for key in members {
                    let (a, b) = match (key.first(), key.second()) {
                        (Some(a), Some(b)) => (a, b),
                        _ => {
                            return Err(ModelError::KeyMismatch {
                                component: name,
                                key: key.clone(),
                            })
                        }
                    };
                    let in_first = self.set_contains(first, &Key::one(a)).map_err(|_| {
                        ModelError::UnresolvedReference {
                            component: name,
                            reference: first,
                        }
                    })?;
                    let in_second = self.set_contains(second, &Key::one(b)).map_err(|_| {
                        ModelError::UnresolvedReference {
                            component: name,
                            reference: second,
                        }
                    })?;
                    if !in_first || !in_second {
                        return Err(ModelError::KeyMismatch {
                            component: name,
                            key: key.clone(),
                        });
                    }
                }
                Ok(())
            }
        }
    }

    fn build_param(&mut self, name: ComponentName, def: &ParamDef) -> Result<(), ModelError> {
        let data = (def.init)(&self.case)?;
        match (&data, def.index) {
            (ParamData::Scalar(_), IndexRef::None) => {}
            (ParamData::Scalar(_), _) | (ParamData::Map(_), IndexRef::None) => {
                return Err(ModelError::KeyMismatch {
                    component: name,
                    key: Key::Scalar,
                })
            }
            (ParamData::Map(map), _) => {
                let domain = self.resolve_index(name, def.index)?;
                for key in map.keys() {
                    if !domain.contains(key) {
                        return Err(ModelError::KeyMismatch {
                            component: name,
                            key: key.clone(),
                        });
                    }
                }
            }
        }
        if self
            .params
            .insert(
                name,
                ParamComponent {
                    data,
                    mutable: def.mutable,
                },
            )
            .is_some()
        {
            Self::log_replace(name);
        }
        Ok(())
    }

    fn build_variable(&mut self, name: ComponentName, def: &VarDef) -> Result<(), ModelError> {
        let keys = self.resolve_index(name, def.index)?;
        let (default_lower, default_upper, variable_type) = match def.domain {
            VarDomain::Continuous => (f64::NEG_INFINITY, f64::INFINITY, VariableType::Continuous),
            VarDomain::NonNegative => (0.0, f64::INFINITY, VariableType::Continuous),
            VarDomain::UnitInterval => (0.0, 1.0, VariableType::Continuous),
            VarDomain::Binary => (0.0, 1.0, VariableType::Binary),
        };
        let lower = def.lower.unwrap_or(default_lower);
        let upper = def.upper.unwrap_or(default_upper);
        let mut members = IndexMap::new();
        for key in keys {
            let id = match &key {
                Key::Scalar => format!("{}", name),
                other => format!("{}[{}]", name, other),
            };
            let variable = VariableBuilder::default()
                .id(id)
                .variable_type(variable_type)
                .lower_bound(lower)
                .upper_bound(upper)
                .build()
                .map_err(|e| ModelError::VariableBuild(e.to_string()))?;
            members.insert(key, Arc::new(RwLock::new(variable)));
        }
        if self
            .variables
            .insert(
                name,
                VariableBlock {
                    domain: def.domain,
                    members,
                },
            )
            .is_some()
        {
            Self::log_replace(name);
        }
        Ok(())
    }

    fn build_constraint(
        &mut self,
        name: ComponentName,
        def: &ConstraintDef,
    ) -> Result<(), ModelError> {
        let keys = self.resolve_index(name, def.index)?;
        let mut rows = IndexMap::new();
        for key in &keys {
            rows.insert(key.clone(), (def.rule)(self, key)?);
        }
        if self
            .constraints
            .insert(
                name,
                ConstraintBlock {
                    index: def.index,
                    keys,
                    rule: def.rule,
                    rows,
                    active: true,
                },
            )
            .is_some()
        {
            Self::log_replace(name);
        }
        Ok(())
    }

    /// Resolve an index reference to the concrete key domain.
    ///
    /// A pair of references resolves to their cartesian product in declared
    /// order; rules unpack pair keys positionally.
    pub fn resolve_index(
        &self,
        component: ComponentName,
        index: IndexRef,
    ) -> Result<Vec<Key>, ModelError> {
        match index {
            IndexRef::None => Ok(vec![Key::Scalar]),
            IndexRef::One(set) => {
                let members = self.members(set).map_err(|e| match e {
                    ModelError::MissingComponent(_) => ModelError::UnresolvedReference {
                        component,
                        reference: set,
                    },
                    other => other,
                })?;
                Ok(members.to_vec())
            }
            IndexRef::Pair(first, second) => {
                let firsts = self.members(first).map_err(|e| match e {
                    ModelError::MissingComponent(_) => ModelError::UnresolvedReference {
                        component,
                        reference: first,
                    },
                    other => other,
                })?;
                let seconds = self.members(second).map_err(|e| match e {
                    ModelError::MissingComponent(_) => ModelError::UnresolvedReference {
                        component,
                        reference: second,
                    },
                    other => other,
                })?;
                let mut product = Vec::with_capacity(firsts.len() * seconds.len());
                for a in firsts {
                    let a = a.first().ok_or_else(|| ModelError::KeyMismatch {
                        component,
                        key: a.clone(),
                    })?;
                    for b in seconds {
                        let b = b.first().ok_or_else(|| ModelError::KeyMismatch {
                            component,
                            key: b.clone(),
                        })?;
                        product.push(Key::pair(a, b));
                    }
                }
                Ok(product)
            }
        }
    }
    // endregion Materialization

    // region Set access
    /// Flat member list of a set
    pub fn members(&self, name: ComponentName) -> Result<&[Key], ModelError> {
        match &self
            .sets
            .get(&name)
            .ok_or(ModelError::MissingComponent(name))?
            .data
        {
            SetData::Flat(keys) => Ok(keys),
            SetData::Keyed(_) => Err(ModelError::NotFlat(name)),
        }
    }

    /// Member list of a family set under one parent key
    pub fn keyed_members(&self, name: ComponentName, key: &Key) -> Result<&[Key], ModelError> {
        match &self
            .sets
            .get(&name)
            .ok_or(ModelError::MissingComponent(name))?
            .data
        {
            SetData::Keyed(map) => map
                .get(key)
                .map(|v| v.as_slice())
                .ok_or_else(|| ModelError::MissingValue {
                    component: name,
                    key: key.clone(),
                }),
            SetData::Flat(_) => Err(ModelError::MissingValue {
                component: name,
                key: key.clone(),
            }),
        }
    }

    pub fn set_contains(&self, name: ComponentName, key: &Key) -> Result<bool, ModelError> {
        Ok(self.members(name)?.contains(key))
    }

    /// Replace the membership of an existing set in place, logged like any
    /// other redefinition. Dependent constraint blocks keep their previously
    /// resolved keys until they are rebuilt.
    pub fn redefine_set(&mut self, name: ComponentName, data: SetData) -> Result<(), ModelError> {
        let set = self
            .sets
            .get_mut(&name)
            .ok_or(ModelError::MissingComponent(name))?;
        Self::log_replace(name);
        set.data = data;
        Ok(())
    }
    // endregion Set access

    // region Parameter access
    pub fn param(&self, name: ComponentName, key: &Key) -> Result<f64, ModelError> {
        let param = self
            .params
            .get(&name)
            .ok_or(ModelError::MissingComponent(name))?;
        match &param.data {
            ParamData::Scalar(v) => Ok(*v),
            ParamData::Map(map) => map.get(key).copied().ok_or_else(|| ModelError::MissingValue {
                component: name,
                key: key.clone(),
            }),
        }
    }

    pub fn scalar_param(&self, name: ComponentName) -> Result<f64, ModelError> {
        self.param(name, &Key::Scalar)
    }

    fn mutable_param(&mut self, name: ComponentName) -> Result<&mut ParamComponent, ModelError> {
        let param = self
            .params
            .get_mut(&name)
            .ok_or(ModelError::MissingComponent(name))?;
        if !param.mutable {
            return Err(ModelError::ImmutableParameter(name));
        }
        Ok(param)
    }

    pub fn set_scalar_param(&mut self, name: ComponentName, value: f64) -> Result<(), ModelError> {
        let param = self.mutable_param(name)?;
        match &mut param.data {
            ParamData::Scalar(v) => {
                *v = value;
                Ok(())
            }
            ParamData::Map(_) => Err(ModelError::KeyMismatch {
                component: name,
                key: Key::Scalar,
            }),
        }
    }

    pub fn set_param_value(
        &mut self,
        name: ComponentName,
        key: Key,
        value: f64,
    ) -> Result<(), ModelError> {
        let param = self.mutable_param(name)?;
        match &mut param.data {
            ParamData::Map(map) => {
                map.insert(key, value);
                Ok(())
            }
            ParamData::Scalar(_) => Err(ModelError::KeyMismatch {
                component: name,
                key,
            }),
        }
    }

    /// Merge per-component values into a mutable map parameter; keys not
    /// present in `values` keep their current value
    pub fn update_param_map(
        &mut self,
        name: ComponentName,
        values: &IndexMap<String, f64>,
    ) -> Result<(), ModelError> {
        let param = self.mutable_param(name)?;
        match &mut param.data {
            ParamData::Map(map) => {
                for (id, value) in values {
                    map.insert(Key::one(id.clone()), *value);
                }
                Ok(())
            }
            ParamData::Scalar(_) => Err(ModelError::KeyMismatch {
                component: name,
                key: Key::Scalar,
            }),
        }
    }

    /// Copy a variable block's solution values into a mutable parameter,
    /// rounded to the given number of decimals. The parameter holds a value
    /// snapshot; later changes to the variables do not touch it.
    pub fn snapshot_variable(
        &mut self,
        param: ComponentName,
        variable: ComponentName,
        decimals: u32,
    ) -> Result<(), ModelError> {
        let factor = 10f64.powi(decimals as i32);
        let mut values = IndexMap::new();
        {
            let block = self
                .variables
                .get(&variable)
                .ok_or(ModelError::MissingComponent(variable))?;
            for (key, var) in &block.members {
                let value = var.read().unwrap().value.ok_or_else(|| {
                    ModelError::MissingValue {
                        component: variable,
                        key: key.clone(),
                    }
                })?;
                values.insert(key.clone(), (value * factor).round() / factor);
            }
        }
        let param_component = self.mutable_param(param)?;
        match &mut param_component.data {
            ParamData::Map(map) => {
                for (key, value) in values {
                    map.insert(key, value);
                }
                Ok(())
            }
            ParamData::Scalar(_) => Err(ModelError::KeyMismatch {
                component: param,
                key: Key::Scalar,
            }),
        }
    }
    // endregion Parameter access

    // region Variable access
    pub fn variable(
        &self,
        name: ComponentName,
        key: &Key,
    ) -> Result<Arc<RwLock<Variable>>, ModelError> {
        self.variables
            .get(&name)
            .ok_or(ModelError::MissingComponent(name))?
            .members
            .get(key)
            .cloned()
            .ok_or_else(|| ModelError::MissingValue {
                component: name,
                key: key.clone(),
            })
    }

    /// Solution value of one variable; absent until a successful solve
    pub fn value(&self, name: ComponentName, key: &Key) -> Result<f64, ModelError> {
        self.variable(name, key)?
            .read()
            .unwrap()
            .value
            .ok_or_else(|| ModelError::MissingValue {
                component: name,
                key: key.clone(),
            })
    }

    pub fn update_variable_bounds(
        &mut self,
        name: ComponentName,
        key: &Key,
        lower: f64,
        upper: f64,
    ) -> Result<(), ModelError> {
        let variable = self.variable(name, key)?;
        let mut var = variable.write().unwrap();
        var.lower_bound = lower;
        var.upper_bound = upper;
        Ok(())
    }

    pub fn variable_blocks(&self) -> &IndexMap<ComponentName, VariableBlock> {
        &self.variables
    }
    // endregion Variable access

    // region Constraint access
    pub fn constraint_blocks(&self) -> &IndexMap<ComponentName, ConstraintBlock> {
        &self.constraints
    }

    /// Mark constraint blocks active; their rows enter the next lowering
    pub fn activate(&mut self, names: &[ComponentName]) -> Result<(), ModelError> {
        for name in names {
            self.constraints
                .get_mut(name)
                .ok_or(ModelError::MissingComponent(*name))?
                .active = true;
        }
        Ok(())
    }

    /// Mark constraint blocks inactive without deleting them; rules and
    /// resolved keys are kept for later reactivation
    pub fn deactivate(&mut self, names: &[ComponentName]) -> Result<(), ModelError> {
        for name in names {
            self.constraints
                .get_mut(name)
                .ok_or(ModelError::MissingComponent(*name))?
                .active = false;
        }
        Ok(())
    }

    pub fn deactivate_all(&mut self) {
        for block in self.constraints.values_mut() {
            block.active = false;
        }
    }

    /// Re-derive every block's rows from current parameter values.
    ///
    /// Index membership changes are not picked up here; a block whose index
    /// set changed must be rebuilt through [`Self::build_component`].
    pub fn refresh_rows(&mut self) -> Result<(), ModelError> {
        let specs: Vec<(ComponentName, RuleFn, Vec<Key>)> = self
            .constraints
            .iter()
            .map(|(name, block)| (*name, block.rule, block.keys.clone()))
            .collect();
        for (name, rule, keys) in specs {
            let mut rows = IndexMap::new();
            for key in &keys {
                rows.insert(key.clone(), rule(self, key)?);
            }
            if let Some(block) = self.constraints.get_mut(&name) {
                block.rows = rows;
            }
        }
        Ok(())
    }

    /// Delete a component of any kind. Dangling references are tolerated:
    /// dependents hold resolved keys, not live references, and fail on their
    /// next rebuild instead
    pub fn remove_component(&mut self, name: ComponentName) -> bool {
        self.sets.shift_remove(&name).is_some()
            || self.params.shift_remove(&name).is_some()
            || self.variables.shift_remove(&name).is_some()
            || self.constraints.shift_remove(&name).is_some()
    }
    // endregion Constraint access

    // region Objective
    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = Some(objective);
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }
    // endregion Objective

    pub fn set_components(&self) -> &IndexMap<ComponentName, SetComponent> {
        &self.sets
    }

    pub fn param_components(&self) -> &IndexMap<ComponentName, ParamComponent> {
        &self.params
    }
}
