#[cfg(test)]
mod tests {
    use crate::state::{State, Status};
    use crate::val::Val;

    fn run(src: &str) -> State {
        let state = State::new();
        let status = state.do_string(src);
        assert_eq!(status, Status::Ok, "{:?}", state.to_str(-1));
        state
    }

    fn global(state: &State, name: &str) -> Val {
        state.globals().borrow().get_str(name)
    }

    fn run_err(src: &str) -> String {
        let state = State::new();
        assert_eq!(state.load(src, "test"), Status::Ok);
        assert_eq!(state.pcall(0, 0), Status::Runtime);
        state.to_str(-1).unwrap_or_default()
    }

    #[test]
    fn test_arithmetic_and_strings() {
        let state = run("a = 1 + 2 * 3; b = 7 // 2; c = 2 ^ 10; d = 'x' .. 1 .. 'y'; e = 10 / 4");
        assert_eq!(global(&state, "a"), Val::Int(7));
        assert_eq!(global(&state, "b"), Val::Int(3));
        assert_eq!(global(&state, "c"), Val::Float(1024.0));
        assert_eq!(global(&state, "d"), Val::from("x1y"));
        assert_eq!(global(&state, "e"), Val::Float(2.5));
    }

    #[test]
    fn test_locals_shadow_globals() {
        let state = run("x = 1; local x = 2; y = x; do local x = 3 end; z = x");
        assert_eq!(global(&state, "x"), Val::Int(1));
        assert_eq!(global(&state, "y"), Val::Int(2));
        assert_eq!(global(&state, "z"), Val::Int(2));
    }

    #[test]
    fn test_closures_capture_bindings() {
        let src = r#"
            local function counter()
                local n = 0
                return function() n = n + 1; return n end
            end
            local c1, c2 = counter(), counter()
            c1(); c1()
            a = c1()
            b = c2()
        "#;
        let state = run(src);
        assert_eq!(global(&state, "a"), Val::Int(3));
        assert_eq!(global(&state, "b"), Val::Int(1));
    }

    #[test]
    fn test_loop_iterations_get_fresh_locals() {
        let src = r#"
            fs = {}
            for i = 1, 3 do fs[i] = function() return i end end
            a = fs[1]() + fs[3]()
        "#;
        let state = run(src);
        assert_eq!(global(&state, "a"), Val::Int(4));
    }

    #[test]
    fn test_recursion() {
        let state = run("local function fib(n) if n < 2 then return n end return fib(n-1) + fib(n-2) end r = fib(15)");
        assert_eq!(global(&state, "r"), Val::Int(610));
    }

    #[test]
    fn test_control_flow() {
        let src = r#"
            total = 0
            for i = 10, 1, -2 do total = total + i end
            n = 0
            while true do n = n + 1; if n >= 5 then break end end
            local k = 0
            repeat local done = k > 2; k = k + 1 until done
            rk = k
            if total > 100 then s = 'big' elseif total > 10 then s = 'mid' else s = 'small' end
            fsum = 0
            for x = 0.5, 2 do fsum = fsum + x end
        "#;
        let state = run(src);
        assert_eq!(global(&state, "total"), Val::Int(30));
        assert_eq!(global(&state, "n"), Val::Int(5));
        assert_eq!(global(&state, "rk"), Val::Int(4));
        assert_eq!(global(&state, "s"), Val::from("mid"));
        assert_eq!(global(&state, "fsum"), Val::Float(2.0));
    }

    #[test]
    fn test_varargs_and_multiple_results() {
        let src = r#"
            local function pack(...) return { ... } end
            local function three() return 1, 2, 3 end
            t = pack(three())
            u = pack(three(), 10)
            local a, b, c, d = three()
            last = d
            first = (three())
        "#;
        let state = run(src);
        let t = global(&state, "t");
        assert_eq!(t.as_table().map(|t| t.borrow().len()), Some(3));
        let u = global(&state, "u");
        assert_eq!(u.as_table().map(|t| t.borrow().len()), Some(2));
        assert_eq!(global(&state, "last"), Val::Nil);
        assert_eq!(global(&state, "first"), Val::Int(1));
    }

    #[test]
    fn test_nested_tables_and_methods() {
        let src = r#"
            TableLevelOne = { TableLevelTwo = { x = true } }
            TableLevelOne.TableLevelTwo.x = false
            obj = { n = 2 }
            function obj:scaled(k) return self.n * k end
            r = obj:scaled(21)
        "#;
        let state = run(src);
        assert_eq!(global(&state, "r"), Val::Int(42));
        let one = global(&state, "TableLevelOne");
        let two = one.as_table().map(|t| t.borrow().get_str("TableLevelTwo")).unwrap_or_default();
        let x = two.as_table().map(|t| t.borrow().get_str("x")).unwrap_or_default();
        assert_eq!(x, Val::Bool(false));
    }

    #[test]
    fn test_multiple_assignment_evaluates_first() {
        let state = run("a, b = 1, 2; a, b = b, a");
        assert_eq!(global(&state, "a"), Val::Int(2));
        assert_eq!(global(&state, "b"), Val::Int(1));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let state = run("a = nil and undefined_fn(); b = 1 or undefined_fn(); c = false or 'd'");
        assert_eq!(global(&state, "a"), Val::Nil);
        assert_eq!(global(&state, "b"), Val::Int(1));
        assert_eq!(global(&state, "c"), Val::from("d"));
    }

    #[test]
    fn test_error_messages_name_the_source() {
        assert_eq!(run_err("missing()"), "test:1: attempt to call a nil value (global 'missing')");
        assert_eq!(
            run_err("local t = {}\nt.field.x = 1"),
            "test:2: attempt to index a nil value (field 'field')"
        );
        assert_eq!(run_err("local v\nlocal y = v.k"), "test:2: attempt to index a nil value (local 'v')");
        assert_eq!(run_err("x = 1 < 'a'"), "test:1: attempt to compare number with string");
    }

    #[test]
    fn test_error_located_at_innermost_line() {
        let src = "local function f()\n  return nil .. 'x'\nend\nf()";
        let msg = run_err(src);
        assert!(msg.starts_with("test:2:"), "{}", msg);
    }
}
