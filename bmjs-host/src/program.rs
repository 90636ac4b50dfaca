//! Boot program.
//!
//! What the firmware runs after reset: create a context over the given
//! region with the standard globals, evaluate one script, report the outcome
//! on the sink and tear everything down.

use bmjs_engine::EvalFlags;

use crate::config::HostConfig;
use crate::context::Context;
use crate::sink::OutputSink;
use crate::stdlib::stdlib;

/// Script run when the firmware has nothing else to do.
pub const DEMO_SCRIPT: &str = "var msg = \"Hello from JS!\";\n\
for (var i = 0; i < 10; i++) {\n\
    var iteration_message = \"\";\n\
    for (var j = 0; j < i; j++) { iteration_message += msg; }\n\
    iteration_message += \"\\n\";\n\
    print(iteration_message);\
}\n\
var successMessage = \"Successful JavaScript!\\n\";\n\
print(successMessage);";

/// Source name used in diagnostics.
pub const SOURCE_NAME: &str = "<input>";

/// Run `source` in a fresh context over `memory`.
///
/// Returns 1 if no context could be created and 0 otherwise; a script
/// exception is reported on the sink, not in the exit code.
pub fn run<S: OutputSink>(memory: &mut [u8], sink: &mut S, source: &str) -> i32 {
    let mut ctx = match Context::new(memory, &stdlib(), &mut *sink, HostConfig::default()) {
        Ok(ctx) => ctx,
        Err(err) => {
            log::error!("[bmjs] {}", err);
            sink.put_str(b"Failed to create JS context\n");
            return 1;
        }
    };

    match ctx.evaluate(source.as_bytes(), SOURCE_NAME, EvalFlags::empty()) {
        Ok(value) => {
            ctx.sink_mut().put_str(b"Result: ");
            report(&mut ctx, value);
        }
        Err(_) => {
            ctx.sink_mut().put_str(b"JS Exception: ");
            if let Some(exception) = ctx.current_exception() {
                report(&mut ctx, exception);
            }
        }
    }
    ctx.sink_mut().put_byte(b'\n');

    ctx.teardown();
    0
}

fn report<S: OutputSink>(ctx: &mut Context<'_, S>, value: bmjs_engine::Value) {
    if ctx.write_value(value).is_err() {
        ctx.sink_mut().put_str(b"[out of memory]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ARENA_SIZE, MIN_ARENA_SIZE};
    use crate::sink::BufferSink;
    use alloc::string::String;
    use alloc::vec;

    fn run_script(size: usize, source: &str) -> (i32, String) {
        let mut mem = vec![0u8; size];
        let mut sink = BufferSink::new();
        let code = run(&mut mem, &mut sink, source);
        (code, String::from_utf8(sink.take()).unwrap())
    }

    #[test]
    fn test_demo_script() {
        let (code, out) = run_script(ARENA_SIZE, DEMO_SCRIPT);
        assert_eq!(code, 0);
        let lines: vec::Vec<&str> = out.split('\n').collect();
        // Iteration i prints i greetings, its own newline and print's newline.
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Hello from JS!");
        assert_eq!(lines[4], "Hello from JS!Hello from JS!");
        assert!(out.ends_with("Successful JavaScript!\n\nResult: undefined\n"));
    }

    #[test]
    fn test_result_line() {
        let (code, out) = run_script(ARENA_SIZE, "6 * 7");
        assert_eq!(code, 0);
        assert_eq!(out, "Result: 42\n");
    }

    #[test]
    fn test_exception_line() {
        let (code, out) = run_script(ARENA_SIZE, "throw new RangeError('nope')");
        assert_eq!(code, 0);
        assert_eq!(out, "JS Exception: RangeError: nope\n");
    }

    #[test]
    fn test_context_failure() {
        let (code, out) = run_script(MIN_ARENA_SIZE - 1, DEMO_SCRIPT);
        assert_eq!(code, 1);
        assert_eq!(out, "Failed to create JS context\n");
    }
}
