//! Standard host globals.
//!
//! `print`/`console.log` write to the sink, the clocks read
//! [`HostConfig::clock`](crate::HostConfig), `gc` asks for a collection at
//! the next safe point. There is no event loop: timers hand out ids and
//! never fire, and `load` always throws.

use bmjs_engine::{ErrorKind, JsResult, Reserve, Value};

use crate::binding::{Binding, NativeCx};
use crate::sink::OutputSink;
use crate::text::{to_text, TextBuf};

/// The globals every boot context gets.
pub fn stdlib<S: OutputSink>() -> [Binding<S>; 8] {
    [
        Binding::new("print", host_print::<S>),
        Binding::new("console.log", host_print::<S>),
        Binding::new("Date.now", host_now::<S>),
        Binding::new("performance.now", host_now::<S>),
        Binding::new("gc", host_gc::<S>),
        Binding::new("load", host_load::<S>),
        Binding::new("setTimeout", host_set_timeout::<S>),
        Binding::new("clearTimeout", host_clear_timeout::<S>),
    ]
}

/// print(...args): arguments separated by one space, then a newline.
fn host_print<S: OutputSink>(
    cx: &mut NativeCx<'_, '_, S>,
    _this: Value,
    args: &[Value],
) -> JsResult<Value> {
    let mut buf = TextBuf::new();
    for (i, &arg) in args.iter().enumerate() {
        if i != 0 {
            cx.sink.put_byte(b' ');
        }
        let text = to_text(cx.realm, arg, &mut buf, Reserve::Normal)?;
        cx.sink.put_str(text.as_bytes());
    }
    cx.sink.put_byte(b'\n');
    Ok(Value::Undefined)
}

/// Date.now() / performance.now()
fn host_now<S: OutputSink>(
    cx: &mut NativeCx<'_, '_, S>,
    _this: Value,
    _args: &[Value],
) -> JsResult<Value> {
    Ok(Value::number((cx.config.clock)()))
}

/// gc()
fn host_gc<S: OutputSink>(
    cx: &mut NativeCx<'_, '_, S>,
    _this: Value,
    _args: &[Value],
) -> JsResult<Value> {
    cx.realm.request_gc();
    Ok(Value::Undefined)
}

/// load(path)
fn host_load<S: OutputSink>(
    cx: &mut NativeCx<'_, '_, S>,
    _this: Value,
    _args: &[Value],
) -> JsResult<Value> {
    Err(cx
        .realm
        .throw_error(ErrorKind::InternalError, "load not implemented"))
}

/// setTimeout(fn, delay)
fn host_set_timeout<S: OutputSink>(
    cx: &mut NativeCx<'_, '_, S>,
    _this: Value,
    args: &[Value],
) -> JsResult<Value> {
    let callback = args.first().copied().unwrap_or_default();
    if !cx.realm.is_callable(callback) {
        return Err(cx
            .realm
            .throw_error(ErrorKind::TypeError, "setTimeout: callback is not a function"));
    }
    let id = cx.next_timer_id();
    log::warn!("[bmjs] setTimeout: no event loop, timer {} will never fire", id);
    Ok(Value::number(f64::from(id)))
}

/// clearTimeout(id)
fn host_clear_timeout<S: OutputSink>(
    _cx: &mut NativeCx<'_, '_, S>,
    _this: Value,
    _args: &[Value],
) -> JsResult<Value> {
    Ok(Value::Undefined)
}
