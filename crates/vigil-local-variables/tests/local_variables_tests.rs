use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vigil_core::{LocalVariablesConfig, ManualClock};
use vigil_local_variables::{
    stack_frames, CallFrame, CaptureOutcome, Debugger, DebuggerError, Event, Exception,
    ExceptionValues, LocalVariables, Location, PauseReason, PausedEvent, PropertyDescriptor,
    RemoteValue, Scope, ScopeKind, SkipReason, Stacktrace,
};

/// Debugger backed by a fixed object table
#[derive(Default)]
struct ScriptedDebugger {
    objects: HashMap<String, Vec<PropertyDescriptor>>,
    resumes: AtomicUsize,
}

impl ScriptedDebugger {
    fn with(mut self, id: &str, properties: Vec<PropertyDescriptor>) -> Self {
        self.objects.insert(id.to_string(), properties);
        self
    }

    fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Debugger for ScriptedDebugger {
    async fn get_properties(
        &self,
        object_id: &str,
    ) -> Result<Vec<PropertyDescriptor>, DebuggerError> {
        self.objects
            .get(object_id)
            .cloned()
            .ok_or_else(|| DebuggerError::ObjectNotFound(object_id.to_string()))
    }

    async fn resume(&self) -> Result<(), DebuggerError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Objects for:
///
/// ```text
/// class Some { two(name) { throw new Error('Enough!'); } }
/// function one(name) {
///   const arr = [1, '2', null];
///   const obj = { name, num: 5 };
///   const ty = new Some();
///   ty.two(name);
/// }
/// one('some name');
/// ```
fn debugger() -> ScriptedDebugger {
    ScriptedDebugger::default()
        .with(
            "scope-two",
            vec![PropertyDescriptor::new(
                "name",
                RemoteValue::primitive("some name"),
            )],
        )
        .with(
            "scope-one",
            vec![
                PropertyDescriptor::new("name", RemoteValue::primitive("some name")),
                PropertyDescriptor::new("arr", RemoteValue::array("arr")),
                PropertyDescriptor::new("obj", RemoteValue::object("Object", "obj")),
                PropertyDescriptor::new("ty", RemoteValue::object("Some", "ty")),
                PropertyDescriptor::new("callback", RemoteValue::Function),
            ],
        )
        .with(
            "arr",
            vec![
                PropertyDescriptor::new("0", RemoteValue::primitive(1)),
                PropertyDescriptor::new("1", RemoteValue::primitive("2")),
                PropertyDescriptor::new("2", RemoteValue::Null),
                PropertyDescriptor::new("length", RemoteValue::primitive(3)),
            ],
        )
        .with(
            "obj",
            vec![
                PropertyDescriptor::new("name", RemoteValue::primitive("some name")),
                PropertyDescriptor::new("num", RemoteValue::primitive(5)),
            ],
        )
}

fn frame(name: &str, class: Option<&str>, line: u32, scopes: Vec<Scope>) -> CallFrame {
    CallFrame {
        function_name: name.to_string(),
        this_class_name: class.map(str::to_string),
        location: Location {
            line_number: line,
            column_number: 10,
        },
        scope_chain: scopes,
    }
}

fn local(id: &str) -> Scope {
    Scope {
        kind: ScopeKind::Local,
        object_id: id.to_string(),
    }
}

fn global() -> Scope {
    Scope {
        kind: ScopeKind::Global,
        object_id: "global".to_string(),
    }
}

fn paused(uncaught: bool) -> PausedEvent {
    PausedEvent {
        reason: PauseReason::Exception,
        uncaught,
        call_frames: vec![
            frame("two", Some("Some"), 2, vec![local("scope-two"), global()]),
            frame("one", None, 9, vec![local("scope-one"), global()]),
            frame("", None, 12, vec![global()]),
        ],
    }
}

fn error_event(pause: &PausedEvent) -> Event {
    Event {
        event_id: Some("9ec79c33ec9942ab8353589fcb2e04dc".to_string()),
        exception: Some(ExceptionValues {
            values: vec![Exception {
                ty: "Error".to_string(),
                value: Some("Enough!".to_string()),
                stacktrace: Some(Stacktrace {
                    frames: stack_frames(&pause.call_frames),
                }),
            }],
        }),
    }
}

fn frames(event: &Event) -> &[vigil_local_variables::StackFrame] {
    &event.exception.as_ref().unwrap().values[0]
        .stacktrace
        .as_ref()
        .unwrap()
        .frames
}

fn integration(
    config: LocalVariablesConfig,
    debugger: Arc<ScriptedDebugger>,
) -> (LocalVariables, ManualClock) {
    let clock = ManualClock::new(Utc::now());
    (
        LocalVariables::new(config, debugger, Arc::new(clock.clone())),
        clock,
    )
}

#[tokio::test]
async fn test_no_local_variables_by_default() {
    let debugger = Arc::new(debugger());
    let (integration, _) = integration(LocalVariablesConfig::default(), debugger.clone());
    let pause = paused(true);

    let outcome = integration.on_paused(&pause).await.unwrap();
    assert_eq!(outcome, CaptureOutcome::Skipped(SkipReason::Disabled));
    assert_eq!(debugger.resumes(), 1);

    let mut event = error_event(&pause);
    assert_eq!(integration.process_event(&mut event).await, 0);

    let frames = frames(&event);
    let last = &frames[frames.len() - 1];
    let penultimate = &frames[frames.len() - 2];
    assert!(last.vars.is_none());
    assert!(penultimate.vars.is_none());
}

#[tokio::test]
async fn test_local_variables_when_enabled() {
    for uncaught in [true, false] {
        let debugger = Arc::new(debugger());
        let (integration, _) = integration(LocalVariablesConfig::enabled(), debugger.clone());
        let pause = paused(uncaught);

        let outcome = integration.on_paused(&pause).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Captured { frames: 2, .. }));
        assert_eq!(debugger.resumes(), 1);

        let mut event = error_event(&pause);
        assert_eq!(integration.process_event(&mut event).await, 2);

        let frames = frames(&event);
        let last = &frames[frames.len() - 1];
        assert_eq!(last.function.as_deref(), Some("Some.two"));
        assert_eq!(
            serde_json::to_value(&last.vars).unwrap(),
            json!({"name": "some name"})
        );

        let penultimate = &frames[frames.len() - 2];
        assert_eq!(penultimate.function.as_deref(), Some("one"));
        assert_eq!(
            serde_json::to_value(&penultimate.vars).unwrap(),
            json!({
                "name": "some name",
                "arr": [1, "2", null],
                "obj": {"name": "some name", "num": 5},
                "ty": "<Some>",
            })
        );

        // Top-level frame has no local scope
        assert!(frames[0].vars.is_none());
        let serialized = serde_json::to_value(&event).unwrap();
        assert!(serialized["exception"]["values"][0]["stacktrace"]["frames"][0]
            .get("vars")
            .is_none());
    }
}

#[tokio::test]
async fn test_caught_exceptions_skipped_unless_configured() {
    let debugger = Arc::new(debugger());
    let config = LocalVariablesConfig {
        capture_all_exceptions: false,
        ..LocalVariablesConfig::enabled()
    };
    let (integration, _) = integration(config, debugger.clone());

    let outcome = integration.on_paused(&paused(false)).await.unwrap();
    assert_eq!(outcome, CaptureOutcome::Skipped(SkipReason::Caught));
    assert_eq!(debugger.resumes(), 1);

    let outcome = integration.on_paused(&paused(true)).await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Captured { .. }));
}

#[tokio::test]
async fn test_capture_depth_limits_frames() {
    let debugger = Arc::new(debugger());
    let config = LocalVariablesConfig {
        max_frames: 1,
        ..LocalVariablesConfig::enabled()
    };
    let (integration, _) = integration(config, debugger);
    let pause = paused(true);

    integration.on_paused(&pause).await.unwrap();
    let mut event = error_event(&pause);
    assert_eq!(integration.process_event(&mut event).await, 1);

    let frames = frames(&event);
    assert!(frames[frames.len() - 1].vars.is_some());
    assert!(frames[frames.len() - 2].vars.is_none());
}

#[tokio::test]
async fn test_partial_failures_degrade_per_variable_and_frame() {
    // `arr` cannot be expanded and the scope of `two` is gone
    let mut debugger = debugger();
    debugger.objects.remove("arr");
    debugger.objects.remove("scope-two");
    let debugger = Arc::new(debugger);
    let (integration, _) = integration(LocalVariablesConfig::enabled(), debugger.clone());
    let pause = paused(true);

    integration.on_paused(&pause).await.unwrap();
    assert_eq!(debugger.resumes(), 1);

    let mut event = error_event(&pause);
    integration.process_event(&mut event).await;

    let frames = frames(&event);
    assert!(frames[frames.len() - 1].vars.is_none());
    let vars = frames[frames.len() - 2].vars.as_ref().unwrap();
    assert!(!vars.contains_key("arr"));
    assert_eq!(vars["ty"], "<Some>");
}

#[tokio::test]
async fn test_library_frames_keep_vars_absent() {
    let debugger = Arc::new(debugger());
    let (integration, _) = integration(LocalVariablesConfig::enabled(), debugger);
    let pause = paused(true);

    integration.on_paused(&pause).await.unwrap();
    let mut event = error_event(&pause);
    if let Some(exceptions) = event.exception.as_mut() {
        let frames = &mut exceptions.values[0].stacktrace.as_mut().unwrap().frames;
        let last = frames.len() - 1;
        frames[last].in_app = Some(false);
    }

    assert_eq!(integration.process_event(&mut event).await, 1);
    let frames = frames(&event);
    assert!(frames[frames.len() - 1].vars.is_none());
    assert!(frames[frames.len() - 2].vars.is_some());
}

#[tokio::test]
async fn test_unrelated_event_gets_nothing() {
    let debugger = Arc::new(debugger());
    let (integration, _) = integration(LocalVariablesConfig::enabled(), debugger);

    integration.on_paused(&paused(true)).await.unwrap();

    let mut other = paused(true);
    other.call_frames[0].location.line_number = 99;
    let mut event = error_event(&other);
    assert_eq!(integration.process_event(&mut event).await, 0);
}

#[tokio::test]
async fn test_rate_limit_disables_and_recovers() {
    let debugger = Arc::new(debugger());
    let config = LocalVariablesConfig {
        max_exceptions_per_second: 3,
        ..LocalVariablesConfig::enabled()
    };
    let (integration, clock) = integration(config, debugger.clone());
    let pause = paused(true);

    for _ in 0..3 {
        let outcome = integration.on_paused(&pause).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Captured { .. }));
    }
    let outcome = integration.on_paused(&pause).await.unwrap();
    assert_eq!(outcome, CaptureOutcome::Skipped(SkipReason::RateLimited));
    assert_eq!(debugger.resumes(), 4);

    clock.advance(Duration::seconds(4));
    let outcome = integration.on_paused(&pause).await.unwrap();
    assert_eq!(outcome, CaptureOutcome::Skipped(SkipReason::RateLimited));

    clock.advance(Duration::seconds(1));
    let outcome = integration.on_paused(&pause).await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Captured { .. }));
}

#[tokio::test]
async fn test_memory_stays_bounded() {
    use sysinfo::{ProcessesToUpdate, System};

    let debugger = Arc::new(debugger());
    let config = LocalVariablesConfig {
        max_exceptions_per_second: u32::MAX,
        ..LocalVariablesConfig::enabled()
    };
    let (integration, clock) = integration(config, debugger);

    let pid = sysinfo::get_current_pid().unwrap();
    let mut system = System::new();
    let mut samples = 0;

    for cycle in 0..20_000u32 {
        // Every cycle pauses at a different position, so every stack is new
        let mut pause = paused(true);
        pause.call_frames[0].location.line_number = cycle;
        integration.on_paused(&pause).await.unwrap();
        clock.advance(Duration::milliseconds(1));

        if cycle % 1_000 == 0 {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            let rss = system.process(pid).map(|p| p.memory()).unwrap_or(0);
            let rss_mb = rss / 1024 / 1024;
            assert!(rss_mb < 100, "resident memory grew to {}MB", rss_mb);
            samples += 1;
        }
    }

    assert!(samples > 15);
    assert!(integration.cached().await <= integration.config().cache_size);
}
