//! Error observer registry with supertype fallback.
//!
//! # Responsibility
//! - Keep the explicit parent-link table of model types.
//! - Store at most one error observer per type and resolve it through ancestors.
//!
//! # Invariants
//! - A parent must be declared before its children, so links never form cycles.
//! - A type's parent never changes after declaration.
//! - Registration replaces any previous observer of the same type.

use crate::model::record::{ModelName, Record};
use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Callback run once per unrecovered lifecycle failure.
pub type ErrorObserver = Box<dyn Fn(&Record) + Send + Sync>;

/// Type hierarchy declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    UnknownType(ModelName),
    UnknownParent { model: ModelName, parent: ModelName },
    SelfParent(ModelName),
    ParentConflict {
        model: ModelName,
        existing: Option<ModelName>,
        requested: Option<ModelName>,
    },
}

impl Display for HierarchyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(model) => write!(f, "model type `{model}` is not declared"),
            Self::UnknownParent { model, parent } => write!(
                f,
                "parent `{parent}` of model type `{model}` must be declared first"
            ),
            Self::SelfParent(model) => write!(f, "model type `{model}` cannot be its own parent"),
            Self::ParentConflict {
                model,
                existing,
                requested,
            } => write!(
                f,
                "model type `{model}` is already declared with parent {}; refusing {}",
                describe_parent(existing.as_ref()),
                describe_parent(requested.as_ref())
            ),
        }
    }
}

impl Error for HierarchyError {}

fn describe_parent(parent: Option<&ModelName>) -> String {
    parent.map_or_else(|| "none".to_string(), |name| format!("`{name}`"))
}

/// Explicit parent-link table.
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    parents: BTreeMap<ModelName, Option<ModelName>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `model` with an optional, already declared `parent`.
    ///
    /// Re-declaring with the same parent is a no-op.
    pub fn declare(
        &mut self,
        model: ModelName,
        parent: Option<ModelName>,
    ) -> Result<(), HierarchyError> {
        self.check(&model, parent.as_ref())?;
        self.parents.entry(model).or_insert(parent);
        Ok(())
    }

    /// Reports whether `declare(model, parent)` would succeed, without changing the table.
    pub fn check(
        &self,
        model: &ModelName,
        parent: Option<&ModelName>,
    ) -> Result<(), HierarchyError> {
        if let Some(existing) = self.parents.get(model) {
            if existing.as_ref() == parent {
                return Ok(());
            }
            return Err(HierarchyError::ParentConflict {
                model: model.clone(),
                existing: existing.clone(),
                requested: parent.cloned(),
            });
        }

        if let Some(parent) = parent {
            if parent == model {
                return Err(HierarchyError::SelfParent(model.clone()));
            }
            if !self.parents.contains_key(parent) {
                return Err(HierarchyError::UnknownParent {
                    model: model.clone(),
                    parent: parent.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn contains(&self, model: &ModelName) -> bool {
        self.parents.contains_key(model)
    }

    pub fn parent_of(&self, model: &ModelName) -> Option<&ModelName> {
        self.parents.get(model).and_then(Option::as_ref)
    }

    /// Iterates `model`, then its parent, grandparent and so on.
    pub fn lineage<'a>(&'a self, model: &'a ModelName) -> impl Iterator<Item = &'a ModelName> {
        std::iter::successors(Some(model), move |current| self.parent_of(current))
    }
}

/// Per-type error observers resolved through a `TypeHierarchy`.
#[derive(Default)]
pub struct ErrorObserverRegistry {
    hierarchy: TypeHierarchy,
    observers: BTreeMap<ModelName, ErrorObserver>,
}

impl ErrorObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// Declares a model type and its parent link.
    pub fn declare_type(
        &mut self,
        model: ModelName,
        parent: Option<ModelName>,
    ) -> Result<(), HierarchyError> {
        self.hierarchy.declare(model, parent)
    }

    /// Validates a declaration without applying it.
    pub fn check_type(
        &self,
        model: &ModelName,
        parent: Option<&ModelName>,
    ) -> Result<(), HierarchyError> {
        self.hierarchy.check(model, parent)
    }

    /// Sets the observer for `model`, replacing any previous one.
    pub fn register(
        &mut self,
        model: &ModelName,
        observer: ErrorObserver,
    ) -> Result<(), HierarchyError> {
        if !self.hierarchy.contains(model) {
            return Err(HierarchyError::UnknownType(model.clone()));
        }
        self.observers.insert(model.clone(), observer);
        Ok(())
    }

    /// Returns the nearest observer for `model` with the type that owns it.
    pub fn resolve<'a>(
        &'a self,
        model: &'a ModelName,
    ) -> Option<(&'a ModelName, &'a ErrorObserver)> {
        self.hierarchy
            .lineage(model)
            .find_map(|candidate| self.observers.get_key_value(candidate))
    }

    /// Runs the resolved observer for `model` with `instance`.
    ///
    /// Returns whether an observer ran. Observer panics are not caught.
    pub fn notify(&self, model: &ModelName, instance: &Record) -> bool {
        let Some((owner, observer)) = self.resolve(model) else {
            debug!("event=observer_notify module=recovery status=skipped model={model}");
            return false;
        };

        debug!(
            "event=observer_notify module=recovery status=ok model={} observer_owner={}",
            model, owner
        );
        observer(instance);
        true
    }
}

impl Debug for ErrorObserverRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorObserverRegistry")
            .field("hierarchy", &self.hierarchy)
            .field("observed_types", &self.observers.keys().collect::<Vec<_>>())
            .finish()
    }
}
