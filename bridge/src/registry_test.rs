#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use moonbridge_core::{State, Status};

    use crate::error::BridgeError;
    use crate::path::DottedPath;
    use crate::registry::{register, registered_count};

    fn state() -> State {
        let state = State::new();
        moonbridge_stdlib::open_libs(&state).unwrap();
        state
    }

    fn run(state: &State, code: &str) -> std::result::Result<(), String> {
        let status = state.do_string(code);
        let outcome = match status {
            Status::Ok => Ok(()),
            _ => Err(state.to_str(-1).unwrap_or_default()),
        };
        state.set_top(0);
        outcome
    }

    fn global_int(state: &State, name: &str) -> Option<i64> {
        state.get_global(name);
        let v = state.to_integer(-1);
        state.pop(1);
        v
    }

    #[test]
    fn test_global_function() -> Result<()> {
        let state = state();
        let before = registered_count();
        register(&state, &DottedPath::parse("add")?, |a: i64, b: i64| a + b)?;
        assert!(registered_count() > before);
        assert_eq!(state.top(), 0);
        run(&state, "result = add(2, 3)").map_err(anyhow::Error::msg)?;
        assert_eq!(global_int(&state, "result"), Some(5));
        Ok(())
    }

    #[test]
    fn test_nested_function_and_strings() -> Result<()> {
        let state = state();
        run(&state, "host = { util = {} }").map_err(anyhow::Error::msg)?;
        register(&state, &DottedPath::parse("host.util.greet")?, |name: String| format!("hi {}", name))?;
        run(&state, "assert(host.util.greet('bob') == 'hi bob')").map_err(anyhow::Error::msg)?;
        Ok(())
    }

    #[test]
    fn test_captured_state_and_unit_return() -> Result<()> {
        let state = state();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        register(&state, &DottedPath::parse("tick")?, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })?;
        run(&state, "tick() tick() r = select('#', tick())").map_err(anyhow::Error::msg)?;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(global_int(&state, "r"), Some(0));
        Ok(())
    }

    #[test]
    fn test_host_error_reaches_script() -> Result<()> {
        let state = state();
        register(&state, &DottedPath::parse("check")?, |x: i64| -> std::result::Result<i64, String> {
            if x < 0 { Err("negative input".into()) } else { Ok(x) }
        })?;
        run(&state, "ok = check(4)").map_err(anyhow::Error::msg)?;
        assert_eq!(global_int(&state, "ok"), Some(4));
        let message = run(&state, "check(-1)").unwrap_err();
        assert!(message.contains("negative input"), "{}", message);
        run(&state, "caught = not pcall(check, -2)").map_err(anyhow::Error::msg)?;
        Ok(())
    }

    #[test]
    fn test_argument_count_mismatch_is_an_error() -> Result<()> {
        let state = state();
        register(&state, &DottedPath::parse("add")?, |a: i64, b: i64| a + b)?;
        let message = run(&state, "add(1)").unwrap_err();
        assert!(
            message.contains("host function 'add' expects 2 argument(s) but was called with 1"),
            "{}",
            message
        );
        let message = run(&state, "add(1, 'x')").unwrap_err();
        assert!(message.contains("expected number, found string"), "{}", message);
        Ok(())
    }

    #[test]
    fn test_missing_parent() -> Result<()> {
        let state = state();
        let err = register(&state, &DottedPath::parse("nope.f")?, |x: i64| x).unwrap_err();
        assert_eq!(err, BridgeError::UnresolvedName { name: "nope".into() });
        assert_eq!(state.top(), 0);
        Ok(())
    }
}
