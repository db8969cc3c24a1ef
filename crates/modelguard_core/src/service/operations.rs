//! Underlying lifecycle operations handed to the operation wrapper.
//!
//! Each type performs exactly one attempt per `attempt` call and keeps no
//! state between attempts except the last successful result.

use crate::model::record::{AssignMode, Attributes, Record};
use crate::model::schema::ModelSchema;
use crate::recovery::wrapper::LifecycleOperation;
use crate::repo::record_repo::{RecordRepository, RepoError};

/// Builds a new, unsaved record.
pub(crate) struct ConstructOperation<'s> {
    schema: &'s ModelSchema,
}

impl<'s> ConstructOperation<'s> {
    pub(crate) fn new(schema: &'s ModelSchema) -> Self {
        Self { schema }
    }
}

impl LifecycleOperation for ConstructOperation<'_> {
    type Error = RepoError;

    fn name(&self) -> &'static str {
        "construct"
    }

    fn attempt(&mut self, values: &Attributes) -> Result<Record, RepoError> {
        Ok(Record::build(self.schema, values)?)
    }

    fn failing_instance(&self, values: &Attributes) -> Record {
        Record::build_lenient(self.schema, values)
    }
}

/// Builds and inserts a new record; a retry redoes both steps.
pub(crate) struct CreateOperation<'s, R> {
    schema: &'s ModelSchema,
    repo: &'s R,
}

impl<'s, R: RecordRepository> CreateOperation<'s, R> {
    pub(crate) fn new(schema: &'s ModelSchema, repo: &'s R) -> Self {
        Self { schema, repo }
    }
}

impl<R: RecordRepository> LifecycleOperation for CreateOperation<'_, R> {
    type Error = RepoError;

    fn name(&self) -> &'static str {
        "create"
    }

    fn attempt(&mut self, values: &Attributes) -> Result<Record, RepoError> {
        let mut record = Record::build(self.schema, values)?;
        self.repo.insert(self.schema, &record)?;
        record.persisted = true;
        Ok(record)
    }

    fn failing_instance(&self, values: &Attributes) -> Record {
        Record::build_lenient(self.schema, values)
    }
}

/// Assigns attributes to a copy of the receiver and saves the assigned columns.
pub(crate) struct UpdateOperation<'s, R> {
    name: &'static str,
    schema: &'s ModelSchema,
    repo: &'s R,
    receiver: Record,
    mode: AssignMode<'s>,
    updated: Option<Record>,
}

impl<'s, R: RecordRepository> UpdateOperation<'s, R> {
    pub(crate) fn new(
        name: &'static str,
        schema: &'s ModelSchema,
        repo: &'s R,
        receiver: Record,
        mode: AssignMode<'s>,
    ) -> Self {
        Self {
            name,
            schema,
            repo,
            receiver,
            mode,
            updated: None,
        }
    }

    /// Record as stored by a successful attempt, if one happened.
    pub(crate) fn into_updated(self) -> Option<Record> {
        self.updated
    }
}

impl<R: RecordRepository> LifecycleOperation for UpdateOperation<'_, R> {
    type Error = RepoError;

    fn name(&self) -> &'static str {
        self.name
    }

    fn receiver(&self) -> Option<&Record> {
        Some(&self.receiver)
    }

    fn attempt(&mut self, values: &Attributes) -> Result<Record, RepoError> {
        let mut working = self.receiver.clone();
        let assigned = working.assign(self.schema, values, self.mode)?;

        if working.is_new() {
            self.repo.insert(self.schema, &working)?;
            working.persisted = true;
        } else if !assigned.is_empty() {
            self.repo.update(self.schema, &working, &assigned)?;
        }

        self.updated = Some(working.clone());
        Ok(working)
    }

    fn failing_instance(&self, values: &Attributes) -> Record {
        let mut instance = self.receiver.clone();
        instance.assign_lenient(self.schema, values, self.mode);
        instance
    }
}

/// Saves the receiver's full value map; `columns` limits what an update writes.
pub(crate) struct SaveOperation<'s, R> {
    schema: &'s ModelSchema,
    repo: &'s R,
    receiver: Record,
    columns: Vec<String>,
    saved: Option<Record>,
}

impl<'s, R: RecordRepository> SaveOperation<'s, R> {
    pub(crate) fn new(
        schema: &'s ModelSchema,
        repo: &'s R,
        receiver: Record,
        columns: Vec<String>,
    ) -> Self {
        Self {
            schema,
            repo,
            receiver,
            columns,
            saved: None,
        }
    }

    pub(crate) fn into_saved(self) -> Option<Record> {
        self.saved
    }
}

impl<R: RecordRepository> LifecycleOperation for SaveOperation<'_, R> {
    type Error = RepoError;

    fn name(&self) -> &'static str {
        "save"
    }

    fn receiver(&self) -> Option<&Record> {
        Some(&self.receiver)
    }

    fn attempt(&mut self, values: &Attributes) -> Result<Record, RepoError> {
        let mut working = self.receiver.clone();
        working.values.clear();
        working.assign(self.schema, values, AssignMode::All)?;

        if working.is_new() {
            self.repo.insert(self.schema, &working)?;
            working.persisted = true;
        } else {
            self.repo.update(self.schema, &working, &self.columns)?;
        }

        self.saved = Some(working.clone());
        Ok(working)
    }

    fn failing_instance(&self, values: &Attributes) -> Record {
        let mut instance = self.receiver.clone();
        instance.values.clear();
        instance.assign_lenient(self.schema, values, AssignMode::All);
        instance
    }
}
