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
    fn test_basic_functions() -> Result<()> {
        assert_eq!(eval("string.len('hello')")?, Val::Int(5));
        assert_eq!(eval("string.upper('abc')")?, Val::from("ABC"));
        assert_eq!(eval("string.lower('ABC')")?, Val::from("abc"));
        assert_eq!(eval("string.rep('ab', 3, '-')")?, Val::from("ab-ab-ab"));
        assert_eq!(eval("string.reverse('abc')")?, Val::from("cba"));
        assert_eq!(eval("string.char(104, 105)")?, Val::from("hi"));
        assert_eq!(eval("string.byte('A')")?, Val::Int(65));
        Ok(())
    }

    #[test]
    fn test_sub_positions() -> Result<()> {
        assert_eq!(eval("string.sub('This is some string', 1, 4)")?, Val::from("This"));
        assert_eq!(eval("string.sub('hello', -3)")?, Val::from("llo"));
        assert_eq!(eval("string.sub('hello', 2, -2)")?, Val::from("ell"));
        assert_eq!(eval("string.sub('hello', 10)")?, Val::from(""));
        Ok(())
    }

    #[test]
    fn test_method_syntax() -> Result<()> {
        assert_eq!(eval("('abc'):upper()")?, Val::from("ABC"));
        let state = State::new();
        open_libs(&state)?;
        assert_eq!(state.do_string("local s = 'hello' r = s:len()"), Status::Ok);
        state.get_global("r");
        assert_eq!(state.to_integer(-1), Some(5));
        Ok(())
    }

    #[test]
    fn test_find_plain() -> Result<()> {
        assert_eq!(eval("string.find('This is some string', 'some')")?, Val::Int(9));
        assert_eq!(eval("select(2, string.find('abcabc', 'bc', 3))")?, Val::Int(6));
        assert_eq!(eval("string.find('abc', 'z')")?, Val::Nil);
        Ok(())
    }

    #[test]
    fn test_format() -> Result<()> {
        assert_eq!(eval("string.format('%d-%s', 7, 'x')")?, Val::from("7-x"));
        assert_eq!(eval("string.format('%5.2f|', 3.14159)")?, Val::from(" 3.14|"));
        assert_eq!(eval("string.format('%-4d|', 7)")?, Val::from("7   |"));
        assert_eq!(eval("string.format('%03d', -7)")?, Val::from("-07"));
        assert_eq!(eval("string.format('%x %X', 255, 255)")?, Val::from("ff FF"));
        assert_eq!(eval("string.format('%g', 0.1)")?, Val::from("0.1"));
        assert_eq!(eval("string.format('%e', 1500)")?, Val::from("1.500000e+03"));
        assert_eq!(eval("string.format('%q', 'a\"b')")?, Val::from("\"a\\\"b\""));
        assert_eq!(eval("string.format('100%%')")?, Val::from("100%"));
        assert!(eval("string.format('%d', 'x')").is_err());
        Ok(())
    }
}
