#[cfg(test)]
mod tests {
    use anyhow::Result;
    use moonbridge_core::{State, Status, ValueType};

    use crate::error::BridgeError;
    use crate::path::DottedPath;
    use crate::value::ScriptValue;
    use crate::value_ref::ValueRef;

    fn state_with(code: &str) -> State {
        let state = State::new();
        assert_eq!(state.do_string(code), Status::Ok);
        state.set_top(0);
        state
    }

    fn at(state: &State, path: &str) -> ValueRef {
        ValueRef::new(state.clone(), DottedPath::parse(path).unwrap())
    }

    #[test]
    fn test_get_and_set() -> Result<()> {
        let state = state_with("t = { a = { b = 5 } } flag = false");
        let b = at(&state, "t").field("a")?.field("b")?;
        assert_eq!(b.path().to_string(), "t.a.b");
        assert_eq!(b.get::<i32>()?, 5);

        b.set(6)?;
        assert_eq!(b.get::<i64>()?, 6);
        at(&state, "t.a.c").set("new")?;
        assert_eq!(at(&state, "t.a.c").get::<String>()?, "new");
        at(&state, "flag").set(true)?;
        assert!(at(&state, "flag").get::<bool>()?);
        at(&state, "fresh").set(vec![1, 2, 3])?;
        assert_eq!(at(&state, "fresh").get::<Vec<u8>>()?, vec![1, 2, 3]);
        assert_eq!(state.top(), 0);
        Ok(())
    }

    #[test]
    fn test_nil_handling() -> Result<()> {
        let state = state_with("t = { a = {} }");
        let missing = at(&state, "t.a.x");
        assert!(missing.is_nil()?);
        assert_eq!(missing.get::<Option<i32>>()?, None);
        assert_eq!(
            missing.get::<i32>().unwrap_err(),
            BridgeError::UnresolvedName { name: "t.a.x".into() }
        );
        assert!(!at(&state, "t.a").is_nil()?);
        assert_eq!(at(&state, "t.b.c").is_nil().unwrap_err(), BridgeError::UnresolvedName { name: "b".into() });

        missing.set(1)?;
        missing.set(None::<i32>)?;
        assert!(missing.is_nil()?);
        assert_eq!(state.top(), 0);
        Ok(())
    }

    #[test]
    fn test_set_failures_keep_stack() -> Result<()> {
        let state = state_with("n = 1");
        let err = at(&state, "n.x").set(3).unwrap_err();
        assert_eq!(err, BridgeError::NotATable { name: "n".into() });
        let err = at(&state, "big").set(u64::MAX).unwrap_err();
        assert!(matches!(err, BridgeError::TypeRange { .. }));
        assert!(at(&state, "big").is_nil()?);
        assert_eq!(state.top(), 0);
        Ok(())
    }

    #[test]
    fn test_same_context_comparison() -> Result<()> {
        let state = state_with("a = 5 b = 5.0 c = 7 s = 'x' t = {} u = t");
        assert!(at(&state, "a").equals(&at(&state, "b"))?);
        assert!(!at(&state, "a").equals(&at(&state, "c"))?);
        assert!(at(&state, "a").less_than(&at(&state, "c"))?);
        assert!(!at(&state, "c").less_than(&at(&state, "a"))?);
        assert!(at(&state, "t").equals(&at(&state, "u"))?);
        assert!(!at(&state, "a").equals(&at(&state, "s"))?);
        assert!(matches!(
            at(&state, "a").less_than(&at(&state, "s")),
            Err(BridgeError::UnexpectedType { .. })
        ));
        assert_eq!(state.top(), 0);
        Ok(())
    }

    #[test]
    fn test_cross_context_comparison() -> Result<()> {
        let left = state_with("n = 3 s = 'apple' t = {} flag = true");
        let right = state_with("n = 3 m = 4 s = 'banana' t = {} flag = true");

        assert!(at(&left, "n").equals(&at(&right, "n"))?);
        assert!(!at(&left, "n").equals(&at(&right, "m"))?);
        assert!(at(&left, "n").less_than(&at(&right, "m"))?);
        assert!(at(&left, "s").less_than(&at(&right, "s"))?);
        assert!(at(&left, "flag").equals(&at(&right, "flag"))?);
        assert!(at(&left, "missing").equals(&at(&right, "missing"))?);

        let err = at(&left, "t").equals(&at(&right, "t")).unwrap_err();
        assert_eq!(
            err,
            BridgeError::CrossContextComparison {
                lhs: "table",
                rhs: "table"
            }
        );
        assert_eq!(left.top(), 0);
        assert_eq!(right.top(), 0);
        Ok(())
    }

    #[test]
    fn test_fields_and_types() -> Result<()> {
        let state = state_with("cfg = { name = 'x', size = 3, sub = {}, on = true }");
        let fields = at(&state, "cfg").fields()?;
        assert_eq!(
            fields,
            vec![
                ("name".to_string(), ValueType::String),
                ("size".to_string(), ValueType::Number),
                ("sub".to_string(), ValueType::Table),
                ("on".to_string(), ValueType::Boolean),
            ]
        );
        assert_eq!(at(&state, "cfg.size").value_type()?, ValueType::Number);
        assert_eq!(
            at(&state, "cfg.name").fields().unwrap_err(),
            BridgeError::NotATable { name: "cfg.name".into() }
        );
        assert_eq!(state.top(), 0);
        Ok(())
    }

    #[test]
    fn test_snapshot() -> Result<()> {
        let state = state_with("t = { 1, 2, name = 'x' } t.self = t");
        let snapshot = at(&state, "t").get::<ScriptValue>()?;
        assert_eq!(snapshot.get("name"), Some(&ScriptValue::String("x".into())));
        assert_eq!(snapshot.get("self"), Some(&ScriptValue::Table(Vec::new())));
        at(&state, "copy").set(snapshot.clone())?;
        assert_eq!(at(&state, "copy.name").get::<String>()?, "x");
        assert_eq!(at(&state, "copy").get::<ScriptValue>()?.get("name"), snapshot.get("name"));
        Ok(())
    }

    #[test]
    fn test_call_and_register() -> Result<()> {
        let state = state_with("function twice(x) return x * 2 end lib = {}");
        assert_eq!(at(&state, "twice").call::<i64, _>(21)?, 42);
        at(&state, "lib.neg").register(|x: i64| -x)?;
        assert_eq!(at(&state, "lib.neg").call::<i64, _>(5)?, -5);
        assert_eq!(state.top(), 0);
        Ok(())
    }
}
