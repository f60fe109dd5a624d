#[cfg(test)]
mod tests {
    use anyhow::Result;
    use moonbridge_core::{State, Status, Val};

    use crate::open_libs;

    fn eval(src: &str) -> Result<Val> {
        let state = State::new();
        open_libs(&state)?;
        assert_eq!(state.load_string(&format!("return {}", src)), Status::Ok);
        state.call(0, 1)?;
        Ok(state.get(-1))
    }

    #[test]
    fn test_math_abs() -> Result<()> {
        assert_eq!(eval("math.abs(-42)")?, Val::Int(42));
        assert_eq!(eval("math.abs(-1.5)")?, Val::Float(1.5));
        Ok(())
    }

    #[test]
    fn test_math_rounding_keeps_integers() -> Result<()> {
        assert!(matches!(eval("math.floor(3.7)")?, Val::Int(3)));
        assert!(matches!(eval("math.ceil(3.2)")?, Val::Int(4)));
        assert!(matches!(eval("math.floor(-3.5)")?, Val::Int(-4)));
        assert!(matches!(eval("math.floor(7)")?, Val::Int(7)));
        Ok(())
    }

    #[test]
    fn test_math_max_min() -> Result<()> {
        assert_eq!(eval("math.max(1, 9, 3)")?, Val::Int(9));
        assert_eq!(eval("math.min(4, 2.5, 3)")?, Val::Float(2.5));
        let err = eval("math.max()").unwrap_err();
        assert!(err.to_string().contains("bad argument #1 to 'max'"), "{}", err);
        Ok(())
    }

    #[test]
    fn test_math_constants() -> Result<()> {
        assert_eq!(eval("math.maxinteger")?, Val::Int(i64::MAX));
        assert_eq!(eval("math.huge > 1e308")?, Val::Bool(true));
        assert_eq!(eval("math.pi")?, Val::Float(std::f64::consts::PI));
        Ok(())
    }

    #[test]
    fn test_math_misc() -> Result<()> {
        assert_eq!(eval("math.sqrt(16)")?, Val::Float(4.0));
        assert_eq!(eval("math.fmod(7, 3)")?, Val::Int(1));
        assert_eq!(eval("math.log(8, 2)")?, Val::Float(3.0));
        assert_eq!(eval("math.tointeger(3.0)")?, Val::Int(3));
        assert_eq!(eval("math.tointeger(3.5)")?, Val::Nil);
        assert_eq!(eval("math.type(1)")?, Val::from("integer"));
        assert_eq!(eval("math.type(1.0)")?, Val::from("float"));
        assert_eq!(eval("math.type('1')")?, Val::Nil);
        assert_eq!(eval("select(2, math.modf(3.25))")?, Val::Float(0.25));
        Ok(())
    }
}
