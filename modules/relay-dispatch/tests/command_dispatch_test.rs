//! Command dispatcher pipeline tests: routing, interceptor order, failures.

use std::sync::{Arc, Mutex};

use relay_dispatch::{CommandDispatcher, DispatchContext, DispatchError, Message, Rejection, Stage};

// ---------------------------------------------------------------------------
// Test commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CreateUser {
    name: String,
}

impl Message for CreateUser {
    fn type_key(&self) -> Option<&str> {
        Some("CreateUser")
    }
}

struct DeleteUser;

impl Message for DeleteUser {
    fn type_key(&self) -> Option<&str> {
        Some("DeleteUser")
    }
}

/// No declared key: unresolvable under the default resolver.
struct Anonymous;
impl Message for Anonymous {}

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn push(log: &Log, entry: &str) {
    log.lock().unwrap().push(entry.to_string());
}

// =========================================================================
// Routing
// =========================================================================

#[test]
fn registered_handler_result_is_returned_unchanged() {
    let commands = CommandDispatcher::<String>::new();
    commands.register("CreateUser", |_ctx| Ok("u1".to_string()));

    let result = commands
        .dispatch(CreateUser {
            name: "ada".into(),
        })
        .unwrap();

    assert_eq!(result, "u1");
}

#[test]
fn handler_runs_exactly_once_per_dispatch() {
    let log = new_log();
    let commands = CommandDispatcher::<()>::new();
    let l = log.clone();
    commands.register("CreateUser", move |_ctx| {
        push(&l, "handled");
        Ok(())
    });

    commands.dispatch(CreateUser { name: "a".into() }).unwrap();
    assert_eq!(entries(&log), vec!["handled"]);

    commands.dispatch(CreateUser { name: "b".into() }).unwrap();
    assert_eq!(entries(&log), vec!["handled", "handled"]);
}

#[test]
fn handler_sees_context_with_concrete_command() {
    let commands = CommandDispatcher::<String>::new();
    commands.register("CreateUser", |ctx: &DispatchContext| {
        assert_eq!(ctx.type_key(), "CreateUser");
        let cmd = ctx
            .message::<CreateUser>()
            .ok_or_else(|| anyhow::anyhow!("unexpected message type"))?;
        Ok(format!("user:{}", cmd.name))
    });

    let result = commands.dispatch(CreateUser { name: "ada".into() }).unwrap();
    assert_eq!(result, "user:ada");
}

#[test]
fn re_registration_replaces_previous_handler() {
    let log = new_log();
    let commands = CommandDispatcher::<&'static str>::new();

    let l = log.clone();
    commands.register("CreateUser", move |_ctx| {
        push(&l, "first");
        Ok("first")
    });
    let l = log.clone();
    commands.register("CreateUser", move |_ctx| {
        push(&l, "second");
        Ok("second")
    });

    let result = commands.dispatch(CreateUser { name: "x".into() }).unwrap();

    assert_eq!(result, "second");
    assert_eq!(entries(&log), vec!["second"]);
    assert_eq!(commands.handler_count(), 1);
}

// =========================================================================
// Unhandled and unresolved commands
// =========================================================================

#[test]
fn unregistered_key_is_no_handler_error() {
    let log = new_log();
    let commands = CommandDispatcher::<()>::new();
    let l = log.clone();
    commands.register("CreateUser", move |_ctx| {
        push(&l, "create");
        Ok(())
    });
    let l = log.clone();
    commands.register_post(move |_ctx| {
        push(&l, "post");
        Ok(())
    });

    let failure = commands.dispatch(DeleteUser).unwrap_err();

    assert!(failure.error.is_unhandled());
    assert!(failure.result.is_none());
    assert!(failure.to_string().contains("DeleteUser"));
    assert!(matches!(
        &failure.error,
        DispatchError::NoHandlerRegistered { type_key } if type_key == "DeleteUser"
    ));
    assert!(entries(&log).is_empty());
}

#[test]
fn pre_interceptors_run_before_no_handler_error() {
    let log = new_log();
    let commands = CommandDispatcher::<()>::new();
    let l = log.clone();
    commands.register_pre(move |_ctx| {
        push(&l, "pre");
        Ok(())
    });

    let failure = commands.dispatch(DeleteUser).unwrap_err();

    assert!(failure.error.is_unhandled());
    assert_eq!(entries(&log), vec!["pre"]);
}

#[test]
fn unresolvable_command_runs_nothing() {
    let log = new_log();
    let commands = CommandDispatcher::<()>::new();
    let l = log.clone();
    commands.register_pre(move |_ctx| {
        push(&l, "pre");
        Ok(())
    });

    let failure = commands.dispatch(Anonymous).unwrap_err();

    assert!(matches!(failure.error, DispatchError::UnresolvedType { .. }));
    assert!(failure.error.type_key().is_none());
    assert!(entries(&log).is_empty());
}

// =========================================================================
// Interceptor ordering and short-circuiting
// =========================================================================

#[test]
fn pipeline_runs_pre_then_handler_then_post() {
    let log = new_log();
    let commands = CommandDispatcher::<()>::new();

    let l = log.clone();
    commands.register_pre(move |_ctx| {
        push(&l, "pre-1");
        Ok(())
    });
    let l = log.clone();
    commands.register_pre(move |_ctx| {
        push(&l, "pre-2");
        Ok(())
    });
    let l = log.clone();
    commands.register("CreateUser", move |_ctx| {
        push(&l, "handler");
        Ok(())
    });
    let l = log.clone();
    commands.register_post(move |_ctx| {
        push(&l, "post-1");
        Ok(())
    });
    let l = log.clone();
    commands.register_post(move |_ctx| {
        push(&l, "post-2");
        Ok(())
    });

    commands.dispatch(CreateUser { name: "a".into() }).unwrap();

    assert_eq!(
        entries(&log),
        vec!["pre-1", "pre-2", "handler", "post-1", "post-2"]
    );
}

#[test]
fn failing_pre_interceptor_stops_everything_downstream() {
    let log = new_log();
    let commands = CommandDispatcher::<()>::new();

    commands.register_pre(|_ctx| anyhow::bail!("not authorized"));
    let l = log.clone();
    commands.register_pre(move |_ctx| {
        push(&l, "pre-2");
        Ok(())
    });
    let l = log.clone();
    commands.register("CreateUser", move |_ctx| {
        push(&l, "handler");
        Ok(())
    });
    let l = log.clone();
    commands.register_post(move |_ctx| {
        push(&l, "post");
        Ok(())
    });

    let failure = commands.dispatch(CreateUser { name: "a".into() }).unwrap_err();

    assert_eq!(failure.error.stage(), Some(Stage::Pre));
    assert!(failure.result.is_none());
    let rendered = format!("{:#}", anyhow::Error::from(failure.into_error()));
    assert_eq!(rendered.matches("not authorized").count(), 1);
    assert!(entries(&log).is_empty());
}

#[test]
fn handler_failure_returns_partial_result_and_skips_post() {
    let log = new_log();
    let commands = CommandDispatcher::<String>::new();

    commands.register("CreateUser", |_ctx| {
        Err(Rejection::new(anyhow::anyhow!("mailer down")).with_partial("u1".to_string()))
    });
    let l = log.clone();
    commands.register_post(move |_ctx| {
        push(&l, "post");
        Ok(())
    });

    let failure = commands.dispatch(CreateUser { name: "a".into() }).unwrap_err();

    assert!(matches!(failure.error, DispatchError::HandlerFailure { .. }));
    assert!(!failure.error.is_unhandled());
    assert_eq!(failure.result.as_deref(), Some("u1"));
    assert!(entries(&log).is_empty());
}

#[test]
fn handler_failure_without_partial_result() {
    let commands = CommandDispatcher::<u64>::new();
    commands.register("CreateUser", |_ctx| Err(anyhow::anyhow!("boom").into()));

    let failure = commands.dispatch(CreateUser { name: "a".into() }).unwrap_err();

    assert!(matches!(failure.error, DispatchError::HandlerFailure { .. }));
    assert!(failure.result.is_none());
}

#[test]
fn failing_post_interceptor_keeps_handler_result_and_skips_rest() {
    let log = new_log();
    let commands = CommandDispatcher::<String>::new();

    commands.register("CreateUser", |_ctx| Ok("u1".to_string()));
    let l = log.clone();
    commands.register_post(move |_ctx| {
        push(&l, "post-1");
        Ok(())
    });
    commands.register_post(|_ctx| anyhow::bail!("audit sink full"));
    let l = log.clone();
    commands.register_post(move |_ctx| {
        push(&l, "post-3");
        Ok(())
    });

    let failure = commands.dispatch(CreateUser { name: "a".into() }).unwrap_err();

    assert_eq!(failure.error.stage(), Some(Stage::Post));
    assert_eq!(failure.result.as_deref(), Some("u1"));
    assert_eq!(entries(&log), vec!["post-1"]);
}

#[test]
fn same_interceptor_registered_twice_runs_twice() {
    let log = new_log();
    let commands = CommandDispatcher::<()>::new();
    let audit = {
        let l = log.clone();
        Arc::new(move |_ctx: &DispatchContext| -> anyhow::Result<()> {
            push(&l, "audit");
            Ok(())
        })
    };

    let a = audit.clone();
    commands.register_pre(move |ctx| a(ctx));
    let a = audit.clone();
    commands.register_pre(move |ctx| a(ctx));
    commands.register("CreateUser", |_ctx| Ok(()));

    commands.dispatch(CreateUser { name: "a".into() }).unwrap();

    assert_eq!(entries(&log), vec!["audit", "audit"]);
    assert_eq!(commands.pre_interceptor_count(), 2);
}

#[test]
fn interceptors_share_one_context_per_dispatch() {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let commands = CommandDispatcher::<()>::new();

    let i = ids.clone();
    commands.register_pre(move |ctx| {
        i.lock().unwrap().push(ctx.dispatch_id());
        Ok(())
    });
    let i = ids.clone();
    commands.register("CreateUser", move |ctx| {
        i.lock().unwrap().push(ctx.dispatch_id());
        Ok(())
    });
    let i = ids.clone();
    commands.register_post(move |ctx| {
        i.lock().unwrap().push(ctx.dispatch_id());
        Ok(())
    });

    commands.dispatch(CreateUser { name: "a".into() }).unwrap();
    commands.dispatch(CreateUser { name: "b".into() }).unwrap();

    let ids = ids.lock().unwrap();
    assert_eq!(ids.len(), 6);
    assert!(ids[0..3].iter().all(|id| *id == ids[0]));
    assert!(ids[3..6].iter().all(|id| *id == ids[3]));
    assert_ne!(ids[0], ids[3]);
}

// =========================================================================
// Reuse after errors
// =========================================================================

#[test]
fn dispatcher_stays_usable_after_errors() {
    let commands = CommandDispatcher::<String>::new();
    commands.register("CreateUser", |ctx| {
        let cmd = ctx
            .message::<CreateUser>()
            .ok_or_else(|| anyhow::anyhow!("wrong type"))?;
        if cmd.name.is_empty() {
            return Err(anyhow::anyhow!("name required").into());
        }
        Ok(cmd.name.clone())
    });

    assert!(commands.dispatch(DeleteUser).is_err());
    assert!(commands.dispatch(CreateUser { name: String::new() }).is_err());
    assert_eq!(
        commands.dispatch(CreateUser { name: "ok".into() }).unwrap(),
        "ok"
    );
    assert_eq!(commands.handler_count(), 1);
    assert!(commands.has_handler("CreateUser"));
    assert!(!commands.has_handler("DeleteUser"));
}

#[test]
fn failure_converts_into_dispatch_error_with_question_mark() {
    fn run(commands: &CommandDispatcher<String>) -> Result<String, DispatchError> {
        let id = commands.dispatch(DeleteUser)?;
        Ok(id)
    }

    let commands = CommandDispatcher::<String>::new();
    assert!(run(&commands).unwrap_err().is_unhandled());
}
