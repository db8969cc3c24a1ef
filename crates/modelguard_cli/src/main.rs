//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `modelguard_core` linkage and configuration loading.
//! - Run the two reference recovery scenarios against a demo model.
//! - Keep output deterministic, one line per outcome.

use log::warn;
use modelguard_core::{
    core_version, init_logging, text_attributes, ColumnDef, CoreConfig, Database, ModelSchema,
    ModelService, RecordHandler, RecordHandlerChain, RecordRepository, SqliteRecordRepository,
    Value, Verdict, MESSAGE_NOT_PRESENT, MESSAGE_NOT_UNIQUE,
};
use std::error::Error;
use std::process::ExitCode;

const DEMO_MODEL: &str = "Foo";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("modelguard error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("modelguard_core version={}", core_version());

    let config = load_config(std::env::args().skip(1))?;
    if let Some(logging) = &config.logging {
        init_logging(logging)?;
    }

    let database = Database::connect(&config.database_url)?;
    let repo = SqliteRecordRepository::new(database.connection());
    let mut service = ModelService::with_config(repo, config.recovery);
    service.define_model(demo_schema())?;
    service.register_error_observer(DEMO_MODEL, |record| {
        warn!(
            "event=demo_observer module=cli status=error model={} uuid={}",
            record.model, record.uuid
        );
        println!("observer notified model={}", record.model);
    })?;

    unique_scenario(&service)?;
    required_scenario(&service)?;
    Ok(())
}

fn load_config(mut args: impl Iterator<Item = String>) -> Result<CoreConfig, Box<dyn Error>> {
    match (args.next().as_deref(), args.next()) {
        (None, _) => Ok(CoreConfig::default()),
        (Some("--config"), Some(path)) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("cannot read config `{path}`: {err}"))?;
            Ok(CoreConfig::from_json_str(&raw)?)
        }
        (Some(other), _) => {
            Err(format!("usage: modelguard [--config <path>], got `{other}`").into())
        }
    }
}

fn demo_schema() -> ModelSchema {
    ModelSchema::new(DEMO_MODEL, "foos")
        .column(ColumnDef::new("value"))
        .column(ColumnDef::unique("unique"))
        .column(ColumnDef::required("required"))
}

/// A duplicate `unique` value is recovered by returning the stored record.
fn unique_scenario<R: RecordRepository>(
    service: &ModelService<R>,
) -> Result<(), Box<dyn Error>> {
    let attrs = text_attributes([("value", "v"), ("unique", "u0"), ("required", "r")]);
    let existing = service.create(DEMO_MODEL, attrs.clone(), RecordHandlerChain::none())?;

    match service.create(DEMO_MODEL, attrs.clone(), RecordHandlerChain::none()) {
        Ok(_) => println!("unique scenario without handler: unexpected success"),
        Err(err) => println!("unique scenario without handler: error={err}"),
    }

    let handler = RecordHandler::new(|context| {
        let duplicate = context.failure.validation().is_some_and(|failure| {
            failure.messages_for("unique").contains(&MESSAGE_NOT_UNIQUE)
        });
        let Some(value) = context.attempted.get("unique").filter(|_| duplicate) else {
            return Verdict::Empty;
        };
        match service.find_by(DEMO_MODEL, "unique", value) {
            Ok(found) => Verdict::from(found),
            Err(_) => Verdict::Raise,
        }
    });
    let recovered = service.create(DEMO_MODEL, attrs, handler)?;
    println!(
        "unique scenario with handler: returned_existing={}",
        recovered.uuid == existing.uuid
    );
    Ok(())
}

/// A missing `required` value is filled in and the create is retried.
fn required_scenario<R: RecordRepository>(
    service: &ModelService<R>,
) -> Result<(), Box<dyn Error>> {
    let attrs = text_attributes([("value", "v"), ("unique", "u1")]);

    match service.create(DEMO_MODEL, attrs.clone(), RecordHandlerChain::none()) {
        Ok(_) => println!("required scenario without handler: unexpected success"),
        Err(err) => println!("required scenario without handler: error={err}"),
    }

    let handler = RecordHandler::new(|context| {
        let missing = context.failure.validation().is_some_and(|failure| {
            failure.messages_for("required").contains(&MESSAGE_NOT_PRESENT)
        });
        if !missing {
            return Verdict::Empty;
        }
        context
            .attempted
            .insert("required".to_string(), Value::Text("required".to_string()));
        Verdict::Retry
    });
    let created = service.create(DEMO_MODEL, attrs, handler)?;
    let stored = service.find(DEMO_MODEL, created.uuid)?;
    println!(
        "required scenario with handler: stored_required={:?}",
        stored.and_then(|record| record.get("required").cloned())
    );
    Ok(())
}
