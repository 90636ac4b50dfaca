//! End-to-end scenarios: create a context, evaluate, report, tear down.

use bmjs_host::{
    program, stdlib, Binding, BufferSink, Context, ContextError, ContextState, EvalFlags,
    HostConfig, JsResult, NativeCx, StaticArena, Text, TextBuf, Value, ARENA_SIZE,
    MIN_ARENA_SIZE,
};

const NAME: &str = "<test>";

fn context(mem: &mut [u8]) -> Context<'_, BufferSink> {
    Context::new(mem, &stdlib(), BufferSink::new(), HostConfig::default()).unwrap()
}

fn output(ctx: &Context<'_, BufferSink>) -> String {
    String::from_utf8(ctx.sink().as_bytes().to_vec()).unwrap()
}

fn exception_text(ctx: &mut Context<'_, BufferSink>) -> String {
    let exception = ctx.current_exception().expect("pending exception");
    let mut buf = TextBuf::new();
    let text = ctx.to_text(exception, &mut buf).unwrap();
    String::from_utf8(text.as_bytes().to_vec()).unwrap()
}

#[test]
fn empty_source_is_undefined() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    assert_eq!(ctx.evaluate(b"", NAME, EvalFlags::empty()), Ok(Value::Undefined));
    assert_eq!(ctx.evaluate(b"var x = 1;", NAME, EvalFlags::empty()), Ok(Value::Undefined));
    assert!(ctx.current_exception().is_none());
}

#[test]
fn string_conversion_borrows() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    let value = ctx
        .evaluate(b"'a string that does not fit inline'", NAME, EvalFlags::empty())
        .unwrap();
    let before = ctx.arena_stats();
    let mut buf = TextBuf::new();
    let text = ctx.to_text(value, &mut buf).unwrap();
    assert!(matches!(text, Text::Borrowed(b"a string that does not fit inline")));
    assert_eq!(ctx.arena_stats(), before);
}

#[test]
fn long_number_overflows_into_arena() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    let value = ctx.evaluate(b"1 / 3", NAME, EvalFlags::empty()).unwrap();
    let expected = format!("{}", 1.0f64 / 3.0);
    let before = ctx.arena_stats();

    let mut buf = TextBuf::new();
    let text = ctx.to_text(value, &mut buf).unwrap();
    assert!(matches!(text, Text::Overflow(_)));
    assert_eq!(text.as_bytes(), expected.as_bytes());
    assert!(buf.overflowed());

    let after = ctx.arena_stats();
    assert_eq!(after.pinned_bytes, before.pinned_bytes + expected.len());
}

#[test]
fn repeated_overflow_runs_out_and_still_reports() {
    let mut mem = vec![0u8; 16 * 1024];
    let mut ctx = context(&mut mem);
    let result = ctx.evaluate(
        b"for (var i = 0; i < 100000; i++) { print(1 / 3); }",
        NAME,
        EvalFlags::empty(),
    );
    assert!(result.is_err());
    assert_eq!(exception_text(&mut ctx), "InternalError: out of memory");
    assert!(output(&ctx).starts_with("0.3333333333333333\n"));

    // Reporting through the sink works too.
    let exception = ctx.current_exception().unwrap();
    ctx.sink_mut().clear();
    ctx.write_value(exception).unwrap();
    assert_eq!(output(&ctx), "InternalError: out of memory");
}

#[test]
fn print_goes_through_the_sink() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    assert_eq!(ctx.evaluate(b"print(1 + 2)", NAME, EvalFlags::empty()), Ok(Value::Undefined));
    assert_eq!(output(&ctx), "3\n");

    ctx.sink_mut().clear();
    ctx.evaluate(b"print(1, ' ', 3)", NAME, EvalFlags::empty()).unwrap();
    assert_eq!(output(&ctx), "1   3\n");

    ctx.sink_mut().clear();
    ctx.evaluate(b"console.log('a', true, null, undefined, {})", NAME, EvalFlags::empty())
        .unwrap();
    assert_eq!(output(&ctx), "a true null undefined [object Object]\n");

    ctx.sink_mut().clear();
    ctx.evaluate(b"print()", NAME, EvalFlags::empty()).unwrap();
    assert_eq!(output(&ctx), "\n");
}

#[test]
fn load_is_not_implemented() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    assert!(ctx.evaluate(b"load('x')", NAME, EvalFlags::empty()).is_err());
    let text = exception_text(&mut ctx);
    assert_eq!(text, "InternalError: load not implemented");
    assert!(text.contains("not implemented"));
}

#[test]
fn exception_is_cleared_by_next_evaluation() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    assert!(ctx.evaluate(b"throw 1", NAME, EvalFlags::empty()).is_err());
    assert_eq!(ctx.current_exception(), Some(Value::Int(1)));
    assert_eq!(ctx.state(), ContextState::Ready);

    assert_eq!(ctx.evaluate(b"2", NAME, EvalFlags::empty()), Ok(Value::Int(2)));
    assert!(ctx.current_exception().is_none());
}

#[test]
fn script_errors_are_exceptions() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);

    assert!(ctx.evaluate(b"var = 1", NAME, EvalFlags::empty()).is_err());
    let text = exception_text(&mut ctx);
    assert!(text.starts_with("SyntaxError: "), "{}", text);
    assert!(text.contains("<test>:1:"), "{}", text);

    assert!(ctx.evaluate(b"\xff", NAME, EvalFlags::empty()).is_err());
    assert!(exception_text(&mut ctx).starts_with("SyntaxError: invalid UTF-8"));

    assert!(ctx.evaluate(b"missing + 1", NAME, EvalFlags::empty()).is_err());
    assert_eq!(exception_text(&mut ctx), "ReferenceError: missing is not defined");

    assert!(ctx.evaluate(b"1", NAME, EvalFlags::MODULE).is_err());
    assert!(exception_text(&mut ctx).starts_with("TypeError"));
}

#[test]
fn caught_exceptions_do_not_escape() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    let value = ctx
        .evaluate(
            b"var r; try { load('m'); } catch (e) { r = e.message; } r",
            NAME,
            EvalFlags::empty(),
        )
        .unwrap();
    let mut buf = TextBuf::new();
    let text = ctx.to_text(value, &mut buf).unwrap();
    assert_eq!(text.as_bytes(), b"load not implemented");
}

#[test]
fn runaway_recursion_is_a_range_error() {
    let mut mem = vec![0u8; 32 * 1024];
    let config = HostConfig {
        max_call_depth: 32,
        ..HostConfig::default()
    };
    let mut ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), config).unwrap();
    assert!(ctx
        .evaluate(b"function f() { return f(); } f()", NAME, EvalFlags::empty())
        .is_err());
    assert_eq!(
        exception_text(&mut ctx),
        "RangeError: Maximum call stack size exceeded"
    );
}

#[test]
fn duplicate_bindings_fail_creation() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut bindings = stdlib::<BufferSink>().to_vec();
    bindings.push(stdlib::<BufferSink>()[0]);
    let err = Context::new(&mut mem, &bindings, BufferSink::new(), HostConfig::default()).err();
    assert_eq!(err, Some(ContextError::DuplicateBinding("print".into())));
}

#[test]
fn invalid_binding_name_fails_creation() {
    let mut mem = vec![0u8; 32 * 1024];
    let bindings = [Binding::new("not valid", add::<BufferSink>)];
    let err = Context::new(&mut mem, &bindings, BufferSink::new(), HostConfig::default()).err();
    assert_eq!(err, Some(ContextError::InvalidBindingName("not valid".into())));
}

fn add<S>(cx: &mut NativeCx<'_, '_, S>, _this: Value, args: &[Value]) -> JsResult<Value> {
    let sum = args.iter().map(|&v| cx.realm.to_number(v)).sum();
    Ok(Value::number(sum))
}

#[test]
fn custom_bindings_install_on_dotted_paths() {
    let mut mem = vec![0u8; 32 * 1024];
    let bindings = [
        Binding::new("host.math.add", add::<BufferSink>),
        Binding::new("host.version", add::<BufferSink>),
    ];
    let mut ctx = Context::new(&mut mem, &bindings, BufferSink::new(), HostConfig::default()).unwrap();
    let value = ctx
        .evaluate(b"host.math.add(1, 2, '3')", NAME, EvalFlags::empty())
        .unwrap();
    assert_eq!(value, Value::Int(6));

    let value = ctx.evaluate(b"typeof host.version", NAME, EvalFlags::empty()).unwrap();
    let mut buf = TextBuf::new();
    assert_eq!(ctx.to_text(value, &mut buf).unwrap().as_bytes(), b"function");
}

#[test]
fn clock_comes_from_config() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    assert_eq!(ctx.evaluate(b"Date.now()", NAME, EvalFlags::empty()), Ok(Value::Int(0)));

    let mut mem = vec![0u8; 32 * 1024];
    let config = HostConfig {
        clock: || 1234.5,
        ..HostConfig::default()
    };
    let mut ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), config).unwrap();
    assert_eq!(
        ctx.evaluate(b"performance.now()", NAME, EvalFlags::empty()),
        Ok(Value::Float(1234.5))
    );
}

#[test]
fn timers_are_inert() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    let value = ctx
        .evaluate(
            b"var fired = false; var a = setTimeout(function () { fired = true; }, 0); \
              var b = setTimeout(() => 1, 10); clearTimeout(a); a * 10 + b",
            NAME,
            EvalFlags::empty(),
        )
        .unwrap();
    assert_eq!(value, Value::Int(12));
    assert_eq!(ctx.evaluate(b"fired", NAME, EvalFlags::empty()), Ok(Value::Bool(false)));

    assert!(ctx.evaluate(b"setTimeout(5)", NAME, EvalFlags::empty()).is_err());
    assert!(exception_text(&mut ctx).starts_with("TypeError"));
}

#[test]
fn collector_reclaims_garbage() {
    let mut mem = vec![0u8; 16 * 1024];
    let config = HostConfig {
        gc_threshold: 2 * 1024,
        ..HostConfig::default()
    };
    let mut ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), config).unwrap();
    let value = ctx
        .evaluate(
            b"var n = 0; for (var i = 0; i < 3000; i++) { var o = { k: 'item ' + i }; n++; } n",
            NAME,
            EvalFlags::empty(),
        )
        .unwrap();
    assert_eq!(value, Value::Int(3000));

    // Garbage made inside a call is collected while the call runs.
    let value = ctx
        .evaluate(
            b"function churn() { var t; for (var i = 0; i < 3000; i++) { t = { a: 'item ' + i }; } return t.a; } churn()",
            NAME,
            EvalFlags::empty(),
        )
        .unwrap();
    let mut buf = TextBuf::new();
    assert_eq!(ctx.to_text(value, &mut buf).unwrap().as_bytes(), b"item 2999");
    assert!(ctx.collect().freed > 0);
}

#[test]
fn gc_inside_a_function_keeps_its_locals() {
    let mut mem = vec![0u8; ARENA_SIZE];
    let mut ctx = context(&mut mem);
    let value = ctx
        .evaluate(
            b"function f() { var s; for (var i = 0; i < 20000; i++) { s = 'abc' + i; } gc(); \
              var pad = 'p' + 1; return s; } f()",
            NAME,
            EvalFlags::empty(),
        )
        .unwrap();
    let mut buf = TextBuf::new();
    assert_eq!(ctx.to_text(value, &mut buf).unwrap().as_bytes(), b"abc19999");
    assert!(!ctx.realm().gc_requested());
}

#[test]
fn deep_recursion_fits_the_default_arena() {
    let mut mem = vec![0u8; ARENA_SIZE];
    let mut ctx = context(&mut mem);
    let value = ctx
        .evaluate(
            b"function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(20)",
            NAME,
            EvalFlags::empty(),
        )
        .unwrap();
    assert_eq!(value, Value::Int(6765));
}

fn collect_now<S>(cx: &mut NativeCx<'_, '_, S>, _this: Value, _args: &[Value]) -> JsResult<Value> {
    let stats = cx.realm.collect();
    Ok(Value::number(stats.freed as f64))
}

#[test]
fn binding_collect_is_deferred_to_a_safe_point() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut bindings = stdlib::<BufferSink>().to_vec();
    bindings.push(Binding::new("collectNow", collect_now::<BufferSink>));
    let mut ctx = Context::new(&mut mem, &bindings, BufferSink::new(), HostConfig::default()).unwrap();
    let value = ctx
        .evaluate(
            b"function g() { var x = { a: 'hello' + 1 }; var freed = collectNow(); \
              var y = { b: 'zzzzzzzz' + 2 }; return freed + ':' + x.a; } g()",
            NAME,
            EvalFlags::empty(),
        )
        .unwrap();
    let mut buf = TextBuf::new();
    assert_eq!(ctx.to_text(value, &mut buf).unwrap().as_bytes(), b"0:hello1");
    assert!(!ctx.realm().gc_requested());
}

#[test]
fn gc_runs_at_the_next_safe_point() {
    let mut mem = vec![0u8; 32 * 1024];
    let mut ctx = context(&mut mem);
    assert_eq!(ctx.evaluate(b"gc()", NAME, EvalFlags::empty()), Ok(Value::Undefined));
    assert!(ctx.realm().gc_requested());
    ctx.evaluate(b"1", NAME, EvalFlags::empty()).unwrap();
    assert!(!ctx.realm().gc_requested());
}

#[test]
fn static_region_is_claimed_once() {
    static REGION: StaticArena<{ 16 * 1024 }> = StaticArena::new();
    let memory = REGION.claim().unwrap();
    assert!(REGION.claim().is_none());

    let mut ctx = context(memory);
    assert_eq!(ctx.evaluate(b"1 + 1", NAME, EvalFlags::empty()), Ok(Value::Int(2)));
    let memory = ctx.teardown();
    assert_eq!(memory.len(), 16 * 1024);
}

#[test]
fn boot_program_reports() {
    let mut sink = BufferSink::new();
    let mut mem = vec![0u8; MIN_ARENA_SIZE];
    assert_eq!(program::run(&mut mem, &mut sink, "'done'"), 0);
    assert_eq!(sink.take(), b"Result: done\n");

    assert_eq!(program::run(&mut mem, &mut sink, "null.x"), 0);
    assert_eq!(
        String::from_utf8(sink.take()).unwrap(),
        "JS Exception: TypeError: Cannot read properties of null (reading 'x')\n"
    );

    let mut small = vec![0u8; MIN_ARENA_SIZE - 1];
    assert_eq!(program::run(&mut small, &mut sink, "1"), 1);
    assert_eq!(sink.take(), b"Failed to create JS context\n");
}
