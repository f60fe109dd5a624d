#[cfg(test)]
mod tests {
    use anyhow::Result;
    use moonbridge_core::{State, Status};

    use crate::error::BridgeError;
    use crate::path::{DottedPath, resolve, resolve_function, resolve_parent};

    fn state_with(code: &str) -> State {
        let state = State::new();
        assert_eq!(state.do_string(code), Status::Ok);
        state.set_top(0);
        state
    }

    const FIXTURE: &str = "t = { a = { b = 5 }, f = function() return 1 end } n = 3";

    #[test]
    fn test_parse_and_display() -> Result<()> {
        let path: DottedPath = "a.b.c".parse()?;
        assert_eq!(path.segments(), ["a", "b", "c"]);
        assert_eq!(path.head(), "a");
        assert_eq!(path.last(), "c");
        assert_eq!(path.depth(), 3);
        assert_eq!(path.to_string(), "a.b.c");
        assert_eq!(path.parent(), Some(DottedPath::parse("a.b")?));
        assert_eq!(DottedPath::parse("a")?.parent(), None);
        assert_eq!(DottedPath::parse("a.b")?.join("c")?, path);
        Ok(())
    }

    #[test]
    fn test_invalid_paths() {
        for bad in ["", "a..b", ".a", "a.", "a b"] {
            assert!(
                matches!(DottedPath::parse(bad), Err(BridgeError::InvalidPath { .. })),
                "{:?}",
                bad
            );
        }
        let base = DottedPath::parse("a").unwrap();
        assert!(base.join("b.c").is_err());
        assert!(base.join("").is_err());
    }

    #[test]
    fn test_resolve_nested() -> Result<()> {
        let state = state_with(FIXTURE);
        resolve(&state, &DottedPath::parse("t.a.b")?)?;
        assert_eq!(state.top(), 3);
        assert_eq!(state.to_integer(-1), Some(5));
        assert!(state.is_table(-2));
        state.set_top(0);

        // the final value may be nil
        resolve(&state, &DottedPath::parse("t.a.missing")?)?;
        assert!(state.is_nil(-1));
        state.set_top(0);
        resolve(&state, &DottedPath::parse("nothing")?)?;
        assert!(state.is_nil(-1));
        Ok(())
    }

    #[test]
    fn test_resolve_failures_restore_depth() -> Result<()> {
        let state = state_with(FIXTURE);
        state.push_integer(99);

        let err = resolve(&state, &DottedPath::parse("t.x.y")?).unwrap_err();
        assert_eq!(err, BridgeError::UnresolvedName { name: "x".into() });
        assert_eq!(state.top(), 1);

        let err = resolve(&state, &DottedPath::parse("nothing.y")?).unwrap_err();
        assert_eq!(err, BridgeError::UnresolvedName { name: "nothing".into() });

        let err = resolve(&state, &DottedPath::parse("t.a.b.c")?).unwrap_err();
        assert_eq!(err, BridgeError::NotATable { name: "b".into() });
        assert_eq!(state.top(), 1);
        assert_eq!(state.to_integer(-1), Some(99));
        Ok(())
    }

    #[test]
    fn test_resolve_parent() -> Result<()> {
        let state = state_with(FIXTURE);
        resolve_parent(&state, &DottedPath::parse("n")?)?;
        assert_eq!(state.top(), 0);

        resolve_parent(&state, &DottedPath::parse("t.a.new")?)?;
        assert_eq!(state.top(), 2);
        assert!(state.is_table(-1));
        state.set_top(0);

        let err = resolve_parent(&state, &DottedPath::parse("n.x")?).unwrap_err();
        assert_eq!(err, BridgeError::NotATable { name: "n".into() });
        let err = resolve_parent(&state, &DottedPath::parse("t.none.x")?).unwrap_err();
        assert_eq!(err, BridgeError::UnresolvedName { name: "none".into() });
        assert_eq!(state.top(), 0);
        Ok(())
    }

    #[test]
    fn test_resolve_function() -> Result<()> {
        let state = state_with(FIXTURE);
        resolve_function(&state, &DottedPath::parse("t.f")?)?;
        assert!(state.is_function(-1));
        state.set_top(0);

        let err = resolve_function(&state, &DottedPath::parse("t.a")?).unwrap_err();
        assert_eq!(err, BridgeError::NotAFunction { name: "t.a".into() });
        let err = resolve_function(&state, &DottedPath::parse("t.g")?).unwrap_err();
        assert_eq!(err, BridgeError::UnresolvedName { name: "g".into() });
        assert_eq!(state.top(), 0);
        Ok(())
    }
}
