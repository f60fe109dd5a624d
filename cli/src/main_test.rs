#[cfg(test)]
mod tests {
    use crate::repl::{parse_command, should_continue_multiline};
    use crate::*;

    #[test]
    fn test_sanitize_path_allows_simple_relative() {
        let p = sanitize_path("foo/bar.lua").expect("relative path should be allowed");
        assert_eq!(p, PathBuf::from("foo/bar.lua"));
    }

    #[test]
    fn test_sanitize_path_rejects_parent_dir() {
        let err = sanitize_path("foo/../bar.lua").unwrap_err();
        assert!(err.to_string().contains("Parent directory components"));
    }

    #[cfg(unix)]
    #[test]
    fn test_sanitize_path_allows_absolute_unix() {
        let p = sanitize_path("/etc/app.lua").expect("absolute path should be allowed");
        assert_eq!(p, PathBuf::from("/etc/app.lua"));
    }

    #[test]
    fn test_env_toggle() {
        assert!(env_toggle_enabled("1"));
        assert!(env_toggle_enabled("moonbridge=trace"));
        assert!(!env_toggle_enabled(""));
        assert!(!env_toggle_enabled("off"));
        assert!(!env_toggle_enabled("FALSE"));
    }

    #[test]
    fn test_filter_expr() {
        assert_eq!(filter_expr_from("true"), None);
        assert_eq!(filter_expr_from(" on "), None);
        assert_eq!(filter_expr_from("moonbridge=trace"), Some("moonbridge=trace".to_string()));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("nil"), ScriptValue::Nil);
        assert_eq!(parse_value("true"), ScriptValue::Boolean(true));
        assert_eq!(parse_value("-3"), ScriptValue::Integer(-3));
        assert_eq!(parse_value("2.5"), ScriptValue::Number(2.5));
        assert_eq!(parse_value("hello"), ScriptValue::String("hello".to_string()));
    }

    #[test]
    fn test_parse_call_command() {
        let args = CliArgs::try_parse_from(["moon", "call", "f.lua", "add", "2", "-3", "--returns", "1"])
            .expect("call arguments should parse");
        match args.command {
            Commands::Call {
                file,
                function,
                args,
                returns,
                json,
            } => {
                assert_eq!(file, PathBuf::from("f.lua"));
                assert_eq!(function, "add");
                assert_eq!(args, vec!["2".to_string(), "-3".to_string()]);
                assert_eq!(returns, 1);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_load_flags() {
        let args = CliArgs::try_parse_from(["moon", "get", "f.lua", "a.b", "--std", "--dep", "lib.lua"])
            .expect("load flags should parse");
        assert!(args.load.load_std);
        assert_eq!(args.load.dependencies, vec![PathBuf::from("lib.lua")]);
        assert!(matches!(args.command, Commands::Get { .. }));
    }

    #[test]
    fn test_parse_rejects_parent_dir_dependency() {
        let err = CliArgs::try_parse_from(["moon", "run", "f.lua", "--dep", "../lib.lua"]).unwrap_err();
        assert!(err.to_string().contains("Parent directory components"));
    }

    #[test]
    fn test_multiline_detection() {
        assert!(should_continue_multiline("t = {\n"));
        assert!(should_continue_multiline("f(1,\n"));
        assert!(!should_continue_multiline("t = {}\n"));
    }

    #[test]
    fn test_repl_commands() {
        assert!(parse_command("x = 1").is_none());
        assert!(parse_command(":q").is_some());
        assert!(parse_command(":get a.b").is_some());
    }
}
