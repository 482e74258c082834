//! End-to-end bridge behaviour, driven by script source the way an embedder
//! would run it.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use tether_core::{host_struct, shared, CallError, HostFunction, HostType, Rest, ScriptValue, Shared};
use tether_script::{BindError, BindTarget, RuntimeError, ScriptRuntime};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Debug, Clone, Default)]
struct Pair {
    first: i32,
    second: u32,
}

host_struct!(Pair {
    #[script_field = "First"]
    first: i32,
    #[script_field = "Second"]
    second: u32,
});

#[derive(Debug, Clone, Default)]
struct Report {
    title: String,
    lines: Vec<String>,
}

#[allow(non_snake_case)]
impl Report {
    fn Dump(&self) -> String {
        format!("{}: {}", self.title, self.lines.join("; "))
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}

host_struct!(Report {
    title: String,
    lines: Vec<String>,
} methods {
    fn Dump(&self) -> String;
    fn push(&mut self, line: String);
});

#[derive(Debug, Clone, Default)]
struct Shadowed {
    renamed: i32,
    x: i32,
    y: f64,
}

host_struct!(Shadowed {
    #[script_field = "x"]
    renamed: i32,
    x: i32,
    y: f64,
});

#[derive(Debug, Clone, Default)]
struct Node {
    name: String,
    children: Vec<Node>,
}

host_struct!(Node {
    name: String,
    children: Vec<Node>,
});

#[derive(Debug, Clone, Default)]
struct Point {
    x: i32,
    y: i32,
}

host_struct!(Point {
    x: i32,
    y: i32,
});

#[derive(Debug, Clone, Default)]
struct Segment {
    start: Point,
    end: Point,
}

host_struct!(Segment {
    start: Point,
    end: Point,
});

#[test]
fn constructed_instance_round_trips_fields() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("T", BindTarget::of::<Pair>())?;

    let fields = runtime.eval::<Vec<f64>>(
        r#"
        const t = new T();
        const before = t.First;
        t.First = -1;
        t.Second = 1;
        [before, t.First, t.Second]
        "#,
    )?;
    assert_eq!(fields, vec![0.0, -1.0, 1.0]);
    Ok(())
}

#[test]
fn variadic_function_collects_rest_arguments() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    runtime.bind(
        "f",
        HostFunction::new("f", move |a: String, b: String, rest: Rest<String>| {
            assert_eq!((a.as_str(), b.as_str()), ("x", "y"));
            record.lock().push(rest.0.clone());
            rest.len() as i32
        }),
    )?;

    let lengths = runtime.eval::<Vec<i32>>(
        "[f('x', 'y'), f('x', 'y', 'z'), f('x', 'y', 'z', 'w')]",
    )?;
    assert_eq!(lengths, vec![0, 1, 2]);

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].is_empty());
    assert_eq!(seen[1], vec!["z"]);
    assert_eq!(seen[2], vec!["z", "w"]);
    Ok(())
}

#[test]
fn method_results_are_marshaled() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Report", BindTarget::of::<Report>())?;

    let dumped = runtime.eval::<String>(
        r#"
        const report = new Report();
        report.title = 'build';
        report.push('compiled');
        report.push('linked');
        report.Dump()
        "#,
    )?;
    assert_eq!(dumped, "build: compiled; linked");
    Ok(())
}

#[test]
fn missing_property_names_class_and_member() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Report", BindTarget::of::<Report>())?;

    let caught = runtime.eval::<String>(
        r#"
        const report = new Report();
        let caught = '';
        try {
            report.missing;
        } catch (e) {
            caught = `${e instanceof ReferenceError} ${e.message}`;
        }
        // still usable after the exception
        caught + ' / ' + JSON.stringify(report.title)
        "#,
    )?;
    assert_eq!(
        caught,
        "true property 'Report.missing' not found / \"\""
    );

    // uncaught, the exception reaches the host with its position
    let error = runtime
        .execute("const other = new Report();\nother.missing;")
        .unwrap_err();
    let RuntimeError::Script(exception) = error else {
        panic!("expected a script exception, got {:?}", error);
    };
    assert_eq!(exception.name, "ReferenceError");
    assert!(exception.message.contains("Report"));
    assert!(exception.message.contains("missing"));
    assert_eq!(exception.line, Some(2));
    Ok(())
}

#[test]
fn tagged_field_wins_over_native_name() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Shadowed", BindTarget::of::<Shadowed>())?;
    let host = shared(Shadowed {
        renamed: 1,
        x: 2,
        y: 0.5,
    });
    runtime.set_global("shadowed", &host)?;

    assert_eq!(runtime.eval::<i32>("shadowed.x")?, 1);
    runtime.execute("shadowed.x = 10;")?;

    let host = host.lock();
    assert_eq!(host.renamed, 10);
    assert_eq!(host.x, 2);
    Ok(())
}

#[test]
fn collected_instances_leave_the_ownership_table() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Report", BindTarget::of::<Report>())?;
    let report: Shared<Report> = shared(Report::default());
    let handed_out = Arc::clone(&report);
    runtime.bind(
        "current",
        HostFunction::new("current", move || Arc::clone(&handed_out)),
    )?;

    assert!(runtime.eval::<bool>("globalThis.held = current(); held instanceof Report")?);
    let ids = runtime.bridge().ownership().ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(Arc::strong_count(&report), 3);

    runtime.execute("delete globalThis.held;")?;
    runtime.collect_garbage();
    assert!(!runtime.bridge().ownership().contains(ids[0]));
    assert_eq!(runtime.live_instances(), 0);
    assert_eq!(Arc::strong_count(&report), 2);
    Ok(())
}

#[test]
fn deleting_dynamic_properties_leaves_fields_alone() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Shadowed", BindTarget::of::<Shadowed>())?;

    let outcome = runtime.eval::<Vec<String>>(
        r#"
        const object = new Shadowed();
        const seen = [];
        object.tint = 'red';
        seen.push(String('tint' in object));
        seen.push(String(delete object.tint));
        seen.push(String('tint' in object));
        try { object.tint; seen.push('read'); } catch (e) { seen.push(e.name); }

        object.y = 2.5;
        seen.push(String(delete object.y));
        seen.push(String('y' in object));
        seen.push(String(object.y));
        seen
        "#,
    )?;
    assert_eq!(
        outcome,
        vec!["true", "true", "false", "ReferenceError", "false", "true", "2.5"]
    );
    Ok(())
}

#[test]
fn bind_errors_are_returned_to_the_host() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Pair", BindTarget::of::<Pair>())?;

    let duplicate = runtime.bind("Other", BindTarget::of::<Shared<Pair>>());
    assert!(matches!(duplicate, Err(BindError::DuplicateBinding { .. })));

    let unsupported = runtime.bind("numbers", BindTarget::of::<Vec<i32>>());
    assert!(matches!(unsupported, Err(BindError::UnsupportedTarget { .. })));

    // the failed binds left no globals behind
    assert!(runtime.eval::<bool>("typeof Other === 'undefined' && typeof numbers === 'undefined'")?);
    Ok(())
}

#[test]
fn wrong_argument_counts_and_plain_calls_throw() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("T", BindTarget::of::<Pair>())?;
    runtime.bind("add", HostFunction::new("add", |a: i32, b: i32| a + b))?;

    let messages = runtime.eval::<Vec<String>>(
        r#"
        const messages = [];
        try { add(1); } catch (e) { messages.push(`${e.name}: ${e.message}`); }
        try { T(); } catch (e) { messages.push(`${e.name}: ${e.message}`); }
        messages
        "#,
    )?;
    assert_eq!(messages[0], "TypeError: 'add' expects 2 argument(s), got 1");
    assert!(messages[1].starts_with("TypeError:"));
    assert!(messages[1].contains("'T'"));
    Ok(())
}

#[test]
fn script_callbacks_reach_back_into_script() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind(
        "apply",
        HostFunction::new(
            "apply",
            |callback: HostFunction, value: i32| -> Result<ScriptValue, CallError> {
                let results = callback.call(vec![value.to_host()])?;
                Ok(results
                    .into_iter()
                    .next()
                    .and_then(ScriptValue::from_host)
                    .unwrap_or_default())
            },
        ),
    )?;

    assert_eq!(runtime.eval::<f64>("apply(x => x * 3, 14)")?, 42.0);

    // a script error inside the callback surfaces as a host call failure
    let message = runtime.eval::<String>(
        "try { apply(() => { throw new Error('nope'); }, 1); '' } catch (e) { e.message }",
    )?;
    assert!(message.starts_with("'apply' failed:"));
    assert!(message.contains("nope"));
    Ok(())
}

#[test]
fn instances_render_as_json() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Report", BindTarget::of::<Report>())?;
    let report = shared(Report {
        title: "nightly".into(),
        lines: vec!["ok".into()],
    });
    runtime.set_global("report", &report)?;

    let json = runtime.eval::<String>("report.build = 7; JSON.stringify(report)")?;
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&json)?,
        serde_json::json!({ "title": "nightly", "lines": ["ok"], "build": 7 })
    );
    Ok(())
}

#[test]
fn storing_an_instance_inside_itself_completes() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Node", BindTarget::of::<Node>())?;
    let root = shared(Node {
        name: "root".into(),
        children: Vec::new(),
    });
    runtime.set_global("node", &root)?;

    runtime.execute("node.children = [node];")?;
    let root = root.lock();
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].name, "root");
    assert!(root.children[0].children.is_empty());
    Ok(())
}

#[test]
fn nested_struct_writes_reach_the_parent() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Point", BindTarget::of::<Point>())?;
    runtime.bind("Segment", BindTarget::of::<Segment>())?;
    let segment = shared(Segment::default());
    runtime.set_global("segment", &segment)?;

    runtime.execute(
        r#"
        segment.start.x = 5;
        const end = segment.end;
        end.y = -3;
        "#,
    )?;
    {
        let segment = segment.lock();
        assert_eq!(segment.start.x, 5);
        assert_eq!(segment.end.y, -3);
    }

    // the projection reads the parent's current value
    segment.lock().end.y = 9;
    assert_eq!(runtime.eval::<i32>("end.y")?, 9);
    Ok(())
}

#[test]
fn script_files_run_through_the_runtime() -> Result<()> {
    init_tracing();
    let runtime = ScriptRuntime::new()?;
    runtime.bind("Report", BindTarget::of::<Report>())?;

    let path = std::env::temp_dir().join(format!("tether-{}.js", std::process::id()));
    std::fs::write(
        &path,
        "function main() {\n  globalThis.out = new Report();\n  out.push('from file');\n}\n",
    )?;
    let loaded = runtime.execute_file(&path);
    std::fs::remove_file(&path)?;
    loaded?;

    runtime.call_function("main")?;
    assert_eq!(runtime.eval::<Vec<String>>("out.lines")?, vec!["from file"]);

    let missing = runtime.execute_file(&path);
    assert!(matches!(missing, Err(RuntimeError::Io(_))));
    Ok(())
}

#[test]
fn runtimes_on_separate_threads_share_host_state() -> Result<()> {
    init_tracing();
    let report = shared(Report::default());

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let report = Arc::clone(&report);
            thread::spawn(move || -> Result<i32> {
                let runtime = ScriptRuntime::new()?;
                runtime.bind("T", BindTarget::of::<Pair>())?;
                runtime.bind("Report", BindTarget::of::<Report>())?;
                runtime.set_global("report", &report)?;
                runtime.set_global("worker", &worker)?;

                let total = runtime.eval::<i32>(
                    r#"
                    let total = 0;
                    for (let round = 0; round < 16; round++) {
                        const t = new T();
                        t.First = worker * 100 + round;
                        total += t.First;
                    }
                    report.push(`worker ${worker}`);
                    total
                    "#,
                )?;
                runtime.collect_garbage();
                assert_eq!(runtime.live_instances(), 1);
                Ok(total)
            })
        })
        .collect();

    let mut totals = Vec::new();
    for worker in workers {
        totals.push(
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))??,
        );
    }
    let expected: Vec<i32> = (0..4).map(|worker| worker * 1600 + 120).collect();
    assert_eq!(totals, expected);

    let mut lines = report.lock().lines.clone();
    lines.sort();
    assert_eq!(lines, vec!["worker 0", "worker 1", "worker 2", "worker 3"]);
    Ok(())
}
