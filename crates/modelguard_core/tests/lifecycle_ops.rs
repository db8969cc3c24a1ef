use modelguard_core::db::open_db_in_memory;
use modelguard_core::{
    text_attributes, Attributes, ColumnDef, HandlerArg, HierarchyError, ModelName, ModelSchema,
    ModelService,
    Record, RecordError, RecordHandler, RecordHandlerChain, RecoveryError, RepoError,
    ServiceError, SqliteRecordRepository, Value, Verdict, MESSAGE_NOT_PRESENT,
    MESSAGE_NOT_UNIQUE,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Service<'conn> = ModelService<SqliteRecordRepository<'conn>>;

fn foo_schema() -> ModelSchema {
    ModelSchema::new("Foo", "foos")
        .column(ColumnDef::new("value"))
        .column(ColumnDef::unique("unique"))
        .column(ColumnDef::required("required"))
        .column(ColumnDef::new("secret"))
        .restrict("secret")
}

fn foo_service(conn: &Connection) -> Service<'_> {
    let mut service = ModelService::new(SqliteRecordRepository::new(conn));
    service.define_model(foo_schema()).unwrap();
    service
}

fn count_notifications(service: &mut Service<'_>, model: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    service
        .register_error_observer(model, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    count
}

fn full_attrs(unique: &str) -> Attributes {
    text_attributes([("value", "v"), ("unique", unique), ("required", "r")])
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn repo_error(err: &ServiceError) -> &RepoError {
    err.original().expect("lifecycle failure should carry the repository error")
}

#[test]
fn duplicate_unique_without_handler_raises_original_failure() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    let notified = count_notifications(&mut service, "Foo");

    service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();
    let err = service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap_err();

    let failure = repo_error(&err).validation().unwrap();
    assert_eq!(failure.messages_for("unique"), vec![MESSAGE_NOT_UNIQUE]);
    assert!(matches!(
        err.recovery(),
        Some(RecoveryError::Original(RepoError::Validation(_)))
    ));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(service.list("Foo").unwrap().len(), 1);
}

#[test]
fn unique_handler_returns_existing_instance_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    let notified = count_notifications(&mut service, "Foo");
    let existing = service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();

    let handler = RecordHandler::new(|context| {
        let duplicate = context
            .failure
            .validation()
            .is_some_and(|failure| failure.messages_for("unique").contains(&MESSAGE_NOT_UNIQUE));
        if !duplicate {
            return Verdict::Empty;
        }
        let value = context.attempted.get("unique").cloned().unwrap_or(Value::Null);
        Verdict::from(service.find_by("Foo", "unique", &value).unwrap())
    });
    let recovered = service.create("Foo", full_attrs("u0"), handler).unwrap();

    assert_eq!(recovered, existing);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(service.list("Foo").unwrap().len(), 1);
}

#[test]
fn required_handler_fills_value_and_retries() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let attrs = text_attributes([("value", "v"), ("unique", "u1")]);

    let err = service
        .create("Foo", attrs.clone(), RecordHandlerChain::none())
        .unwrap_err();
    let failure = repo_error(&err).validation().unwrap();
    assert_eq!(failure.messages_for("required"), vec![MESSAGE_NOT_PRESENT]);

    let attempts = AtomicUsize::new(0);
    let handler = RecordHandler::new(|context| {
        attempts.fetch_add(1, Ordering::SeqCst);
        let missing = context
            .failure
            .validation()
            .is_some_and(|failure| failure.messages_for("required").contains(&MESSAGE_NOT_PRESENT));
        if !missing {
            return Verdict::Empty;
        }
        context
            .attempted
            .insert("required".to_string(), text("required"));
        Verdict::Retry
    });
    let created = service.create("Foo", attrs, handler).unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(created.persisted);
    let stored = service.find("Foo", created.uuid).unwrap().unwrap();
    assert_eq!(stored.get("required"), Some(&text("required")));
    assert_eq!(stored.get("value"), Some(&text("v")));
}

#[test]
fn false_payload_from_handler_is_a_contract_violation() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    let notified = count_notifications(&mut service, "Foo");

    let handler = RecordHandler::new(|_| Verdict::Payload(serde_json::Value::Bool(false)));
    let err = service
        .create("Foo", text_attributes([("unique", "u2")]), handler)
        .unwrap_err();

    assert!(err.recovery().is_some_and(RecoveryError::is_contract_violation));
    assert!(err.original().is_none());
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert!(service.list("Foo").unwrap().is_empty());
}

#[test]
fn construct_rejects_restricted_columns_and_adopts_replacement() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let attrs = text_attributes([("value", "v"), ("secret", "s")]);

    let err = service
        .construct("Foo", attrs.clone(), RecordHandlerChain::none())
        .unwrap_err();
    assert!(matches!(
        repo_error(&err),
        RepoError::Record(RecordError::RestrictedColumn { column, .. }) if column == "secret"
    ));

    let mut replacement = Record::new("Foo");
    replacement.set("value", text("replaced"));
    let expected = replacement.clone();
    let handler = RecordHandler::new(move |_| Verdict::Replace(replacement.clone()));
    let constructed = service.construct("Foo", attrs, handler).unwrap();

    assert_eq!(constructed, expected);
    assert!(constructed.is_new());
    assert!(service.list("Foo").unwrap().is_empty());
}

#[test]
fn construct_retry_can_drop_offending_keys() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);

    let handler = RecordHandler::new(|context| {
        if context.attempted.remove("secret").is_some() {
            return Verdict::Retry;
        }
        Verdict::Empty
    });
    let constructed = service
        .construct("Foo", text_attributes([("value", "v"), ("secret", "s")]), handler)
        .unwrap();

    assert_eq!(constructed.get("value"), Some(&text("v")));
    assert!(constructed.get("secret").is_none());
}

#[test]
fn update_writes_assigned_columns_and_refreshes_caller_record() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let mut record = service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();

    let returned = service
        .update(
            &mut record,
            text_attributes([("value", "w")]),
            RecordHandlerChain::none(),
        )
        .unwrap();

    assert_eq!(returned, record);
    assert_eq!(record.get("value"), Some(&text("w")));
    let stored = service.find("Foo", record.uuid).unwrap().unwrap();
    assert_eq!(stored.get("value"), Some(&text("w")));
    assert_eq!(stored.get("unique"), Some(&text("u0")));
}

#[test]
fn update_replacement_leaves_caller_record_untouched() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    let notified = count_notifications(&mut service, "Foo");
    service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();
    let mut record = service
        .create("Foo", full_attrs("u1"), RecordHandlerChain::none())
        .unwrap();
    let before = record.clone();

    let handler = RecordHandler::new(|context| {
        Verdict::from(context.receiver.cloned())
    });
    let returned = service
        .update(&mut record, text_attributes([("unique", "u0")]), handler)
        .unwrap();

    assert_eq!(returned, before);
    assert_eq!(record, before);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    let stored = service.find("Foo", record.uuid).unwrap().unwrap();
    assert_eq!(stored.get("unique"), Some(&text("u1")));
}

#[test]
fn update_of_new_record_inserts_it() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let mut record = service
        .construct("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();
    assert!(record.is_new());

    service
        .update(
            &mut record,
            text_attributes([("value", "first")]),
            RecordHandlerChain::none(),
        )
        .unwrap();

    assert!(record.persisted);
    let stored = service.find("Foo", record.uuid).unwrap().unwrap();
    assert_eq!(stored.get("value"), Some(&text("first")));
}

#[test]
fn update_respects_restrictions_and_update_all_bypasses_them() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let mut record = service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();

    let err = service
        .update(
            &mut record,
            text_attributes([("secret", "s")]),
            RecordHandlerChain::none(),
        )
        .unwrap_err();
    assert!(matches!(
        repo_error(&err),
        RepoError::Record(RecordError::RestrictedColumn { .. })
    ));
    assert!(record.get("secret").is_none());

    service
        .update_all(
            &mut record,
            text_attributes([("secret", "s")]),
            RecordHandlerChain::none(),
        )
        .unwrap();
    let stored = service.find("Foo", record.uuid).unwrap().unwrap();
    assert_eq!(stored.get("secret"), Some(&text("s")));
}

#[test]
fn update_except_and_update_only_filter_keys() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let mut record = service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();

    service
        .update_except(
            &mut record,
            text_attributes([("value", "x"), ("required", "changed")]),
            &["value"],
            RecordHandlerChain::none(),
        )
        .unwrap();
    service
        .update_only(
            &mut record,
            text_attributes([("secret", "s"), ("value", "y")]),
            &["secret"],
            RecordHandlerChain::none(),
        )
        .unwrap();

    let stored = service.find("Foo", record.uuid).unwrap().unwrap();
    assert_eq!(stored.get("required"), Some(&text("changed")));
    assert_eq!(stored.get("secret"), Some(&text("s")));
    assert_eq!(stored.get("value"), Some(&text("v")));
}

#[test]
fn update_except_retry_cannot_reintroduce_excluded_keys() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let mut record = service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();
    service
        .create("Foo", full_attrs("u1"), RecordHandlerChain::none())
        .unwrap();

    let seen = Mutex::new(Vec::new());
    let handler = RecordHandler::new(|context| {
        seen.lock().unwrap().push(context.attempted.clone());
        if context.attempt > 1 {
            return Verdict::Empty;
        }
        context.attempted.insert("unique".to_string(), text("u2"));
        context.attempted.insert("value".to_string(), text("sneaky"));
        Verdict::Retry
    });
    let err = service
        .update_except(
            &mut record,
            text_attributes([("unique", "u1"), ("value", "x")]),
            &["value"],
            handler,
        )
        .unwrap_err();

    let seen = seen.lock().unwrap();
    assert!(!seen[0].contains_key("value"));
    assert!(matches!(
        repo_error(&err),
        RepoError::Record(RecordError::RestrictedColumn { column, .. }) if column == "value"
    ));
    assert_eq!(record.get("unique"), Some(&text("u0")));
}

#[test]
fn malformed_column_filters_fail_before_any_attempt() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    let notified = count_notifications(&mut service, "Foo");
    let mut record = service
        .create("Foo", full_attrs("u0"), RecordHandlerChain::none())
        .unwrap();
    let called = AtomicUsize::new(0);

    for filter in [&["nope"][..], &["  "][..]] {
        let handler = RecordHandler::new(|_| {
            called.fetch_add(1, Ordering::SeqCst);
            Verdict::Raise
        });
        let err = service
            .update_only(&mut record, text_attributes([("value", "x")]), filter, handler)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Recovery(RecoveryError::ArgumentShape(_))
        ));
    }

    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

#[test]
fn save_inserts_new_records_and_limits_updates_to_given_columns() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);

    let mut record = Record::new("Foo");
    record.set("value", text("v"));
    record.set("unique", text("u0"));
    record.set("required", text("r"));
    service
        .save(&mut record, &[], RecordHandlerChain::none())
        .unwrap();
    assert!(record.persisted);

    record.set("value", text("changed"));
    record.set("unique", text("u9"));
    service
        .save(&mut record, &["value"], RecordHandlerChain::none())
        .unwrap();

    let stored = service.find("Foo", record.uuid).unwrap().unwrap();
    assert_eq!(stored.get("value"), Some(&text("changed")));
    assert_eq!(stored.get("unique"), Some(&text("u0")));
}

#[test]
fn save_failure_goes_through_the_handler_chain() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);

    let mut record = Record::new("Foo");
    record.set("unique", text("u0"));
    let seen = Mutex::new(Vec::new());
    let handler = RecordHandler::new(|context| {
        seen.lock().unwrap().push(context.attempted.clone());
        context
            .attempted
            .insert("required".to_string(), text("filled"));
        Verdict::Retry
    });
    service.save(&mut record, &[], handler).unwrap();

    assert_eq!(seen.lock().unwrap()[0].get("unique"), Some(&text("u0")));
    assert_eq!(record.get("required"), Some(&text("filled")));
    assert!(record.persisted);
}

#[test]
fn subtype_failures_notify_the_supertype_observer() {
    let conn = open_db_in_memory().unwrap();
    let mut service = ModelService::new(SqliteRecordRepository::new(&conn));
    service
        .define_model(ModelSchema::new("Base", "bases").column(ColumnDef::required("name")))
        .unwrap();
    service
        .define_model(
            ModelSchema::new("Child", "children")
                .parent("Base")
                .column(ColumnDef::required("name")),
        )
        .unwrap();

    let models = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&models);
    service
        .register_error_observer("Base", move |record| {
            sink.lock().unwrap().push(record.model.to_string());
        })
        .unwrap();

    service
        .create("Child", Attributes::new(), RecordHandlerChain::none())
        .unwrap_err();

    assert_eq!(*models.lock().unwrap(), vec!["Child".to_string()]);
}

#[test]
fn define_model_is_idempotent_and_checks_hierarchy() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    service.define_model(foo_schema()).unwrap();

    let changed = ModelSchema::new("Foo", "foos").column(ColumnDef::new("value"));
    assert!(matches!(
        service.define_model(changed),
        Err(ServiceError::DuplicateModel(_))
    ));

    let orphan = ModelSchema::new("Orphan", "orphans").parent("Missing");
    assert!(matches!(
        service.define_model(orphan),
        Err(ServiceError::Hierarchy(HierarchyError::UnknownParent { .. }))
    ));

    let err = service
        .create("Ghost", Attributes::new(), RecordHandlerChain::none())
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownModel(ref model) if model == "Ghost"));
}

#[test]
fn failed_table_setup_leaves_model_undeclared() {
    let conn = open_db_in_memory().unwrap();
    let mut service = ModelService::new(SqliteRecordRepository::new(&conn));
    service
        .define_model(ModelSchema::new("Base", "bases").column(ColumnDef::new("name")))
        .unwrap();
    let thing = || ModelSchema::new("Thing", "things").column(ColumnDef::unique("slug"));

    conn.execute_batch("CREATE TABLE things_slug_unique (id);").unwrap();
    let err = service.define_model(thing()).unwrap_err();
    assert!(matches!(err, ServiceError::Repo(_)));
    assert!(matches!(
        service.schema("Thing"),
        Err(ServiceError::UnknownModel(_))
    ));
    assert!(!service
        .observers()
        .hierarchy()
        .contains(&ModelName::new("Thing")));

    conn.execute_batch("DROP TABLE things_slug_unique;").unwrap();
    service.define_model(thing().parent("Base")).unwrap();
    assert_eq!(
        service.schema("Thing").unwrap().parent,
        Some(ModelName::new("Base"))
    );
    let notified = count_notifications(&mut service, "Thing");
    service
        .create("Thing", text_attributes([("slug", "s")]), RecordHandlerChain::none())
        .unwrap();
    service
        .create("Thing", text_attributes([("slug", "s")]), RecordHandlerChain::none())
        .unwrap_err();
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

fn capture_notifications(service: &mut Service<'_>, model: &str) -> Arc<Mutex<Vec<Record>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    service
        .register_error_observer(model, move |record| {
            sink.lock().unwrap().push(record.clone());
        })
        .unwrap();
    seen
}

#[test]
fn update_all_conflict_notifies_receiver_with_attempted_values() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    let seen = capture_notifications(&mut service, "Foo");
    service
        .create("Foo", full_attrs("a"), RecordHandlerChain::none())
        .unwrap();
    let mut other = service
        .create("Foo", full_attrs("b"), RecordHandlerChain::none())
        .unwrap();

    let declines = RecordHandlerChain::from(vec![
        RecordHandler::new(|_| Verdict::Empty),
        RecordHandler::new(|_| Verdict::Empty),
    ]);
    let err = service
        .update_all(
            &mut other,
            text_attributes([("unique", "a"), ("value", "x")]),
            declines,
        )
        .unwrap_err();
    assert!(repo_error(&err).validation().is_some());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].uuid, other.uuid);
    assert_eq!(seen[0].get("unique"), Some(&text("a")));
    assert_eq!(seen[0].get("value"), Some(&text("x")));
    assert_eq!(other.get("unique"), Some(&text("b")));
}

#[test]
fn save_conflict_notifies_receiver_with_its_values() {
    let conn = open_db_in_memory().unwrap();
    let mut service = foo_service(&conn);
    let seen = capture_notifications(&mut service, "Foo");
    service
        .create("Foo", full_attrs("a"), RecordHandlerChain::none())
        .unwrap();

    let mut record = Record::new("Foo");
    record.set("value", text("y"));
    record.set("unique", text("a"));
    record.set("required", text("r"));
    service
        .save(&mut record, &[], RecordHandler::new(|_| Verdict::Empty))
        .unwrap_err();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].uuid, record.uuid);
    assert_eq!(seen[0].get("unique"), Some(&text("a")));
    assert_eq!(seen[0].get("value"), Some(&text("y")));
    assert!(!record.persisted);
}

#[test]
fn create_runs_a_resolved_nested_chain_in_order() {
    let conn = open_db_in_memory().unwrap();
    let service = foo_service(&conn);
    let order = Mutex::new(Vec::new());

    let chain = RecordHandlerChain::resolve(vec![
        HandlerArg::One(RecordHandler::new(|_| {
            order.lock().unwrap().push("first");
            Verdict::Empty
        })),
        HandlerArg::Many(vec![
            HandlerArg::from(vec![RecordHandler::new(|_| {
                order.lock().unwrap().push("nested");
                Verdict::Empty
            })]),
            HandlerArg::One(RecordHandler::new(|context| {
                order.lock().unwrap().push("filler");
                context
                    .attempted
                    .insert("required".to_string(), text("filled"));
                Verdict::Retry
            })),
        ]),
    ])
    .unwrap();
    assert_eq!(chain.len(), 3);

    let created = service
        .create("Foo", text_attributes([("unique", "n0")]), chain)
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "nested", "filler"]);
    assert_eq!(created.get("required"), Some(&text("filled")));
    assert!(created.persisted);
}
