#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::{
        ast::{Expr, Field, Parser, StmtKind},
        op::{BinOp, UnOp},
    };

    fn single(src: &str) -> StmtKind {
        let block = Parser::parse_source(src).unwrap();
        assert_eq!(block.len(), 1, "expected one statement in {:?}", src);
        block.into_iter().next().unwrap().kind
    }

    fn name(s: &str) -> Expr {
        Expr::Name(Rc::from(s))
    }

    #[test]
    fn test_local_and_precedence() {
        let stmt = single("local x = 1 + 2 * 3");
        let expected = StmtKind::Local {
            names: vec![Rc::from("x")],
            values: vec![Expr::Bin(
                BinOp::Add,
                Box::new(Expr::Int(1)),
                Box::new(Expr::Bin(BinOp::Mul, Box::new(Expr::Int(2)), Box::new(Expr::Int(3)))),
            )],
        };
        assert_eq!(stmt, expected);
    }

    #[test]
    fn test_right_associative_operators() {
        let StmtKind::Return(values) = single("return 2 ^ 3 ^ 2") else {
            panic!("expected return");
        };
        assert_eq!(
            values[0],
            Expr::Bin(
                BinOp::Pow,
                Box::new(Expr::Int(2)),
                Box::new(Expr::Bin(BinOp::Pow, Box::new(Expr::Int(3)), Box::new(Expr::Int(2)))),
            )
        );

        let StmtKind::Return(values) = single("return 'a' .. 'b' .. 'c'") else {
            panic!("expected return");
        };
        assert!(matches!(&values[0], Expr::Bin(BinOp::Concat, l, _) if **l == Expr::Str(Rc::from("a"))));
    }

    #[test]
    fn test_unary_binds_looser_than_pow() {
        let StmtKind::Return(values) = single("return -x ^ 2") else {
            panic!("expected return");
        };
        assert_eq!(
            values[0],
            Expr::Unary(
                UnOp::Neg,
                Box::new(Expr::Bin(BinOp::Pow, Box::new(name("x")), Box::new(Expr::Int(2))))
            )
        );
    }

    #[test]
    fn test_dotted_assignment() {
        let stmt = single("TableLevelOne.TableLevelTwo.x = true");
        let StmtKind::Assign { targets, values } = stmt else {
            panic!("expected assignment");
        };
        assert_eq!(values, vec![Expr::Bool(true)]);
        assert_eq!(
            targets[0],
            Expr::Index(
                Box::new(Expr::Index(
                    Box::new(name("TableLevelOne")),
                    Box::new(Expr::Str(Rc::from("TableLevelTwo")))
                )),
                Box::new(Expr::Str(Rc::from("x")))
            )
        );
    }

    #[test]
    fn test_function_statement_sugar() {
        let stmt = single("function obj.inner:method(a, ...) return a end");
        let StmtKind::Assign { targets, values } = stmt else {
            panic!("expected assignment");
        };
        assert_eq!(targets.len(), 1);
        let Expr::Function(body) = &values[0] else {
            panic!("expected function");
        };
        assert_eq!(body.name.as_deref(), Some("obj.inner:method"));
        assert_eq!(body.params, vec![Rc::from("self"), Rc::from("a")]);
        assert!(body.is_vararg);
    }

    #[test]
    fn test_table_constructor() {
        let StmtKind::Return(values) = single("return { 1, x = 2, ['y'] = 3; f() }") else {
            panic!("expected return");
        };
        let Expr::Table(fields) = &values[0] else {
            panic!("expected table");
        };
        assert_eq!(fields.len(), 4);
        assert!(matches!(fields[0], Field::Positional(Expr::Int(1))));
        assert!(matches!(&fields[1], Field::Named(n, Expr::Int(2)) if n.as_ref() == "x"));
        assert!(matches!(fields[2], Field::Keyed(Expr::Str(_), Expr::Int(3))));
        assert!(matches!(&fields[3], Field::Positional(e) if e.is_multi()));
    }

    #[test]
    fn test_call_forms() {
        assert!(matches!(single("print 'hi'"), StmtKind::Call(Expr::Call(_, _))));
        assert!(matches!(single("f{1}"), StmtKind::Call(Expr::Call(_, _))));
        assert!(matches!(single("obj:go(1)"), StmtKind::Call(Expr::Method(_, _, _))));
    }

    #[test]
    fn test_control_flow() {
        let src = r#"
            for i = 1, 10, 2 do end
            for k, v in pairs(t) do break end
            while x do x = nil end
            repeat local y = 1 until y
            if a then elseif b then else end
            do local z end
        "#;
        let block = Parser::parse_source(src).unwrap();
        assert_eq!(block.len(), 6);
        assert!(matches!(block[0].kind, StmtKind::NumericFor { step: Some(_), .. }));
        assert!(matches!(block[1].kind, StmtKind::GenericFor { .. }));
        assert!(matches!(block[2].kind, StmtKind::While { .. }));
        assert!(matches!(block[3].kind, StmtKind::Repeat { .. }));
        assert!(matches!(&block[4].kind, StmtKind::If { branches, else_block: Some(_) } if branches.len() == 2));
        assert!(matches!(block[5].kind, StmtKind::Do(_)));
        assert_eq!(block[0].line, 2);
        assert_eq!(block[5].line, 7);
    }

    #[test]
    fn test_syntax_errors() {
        let err = Parser::parse_source("x = ").unwrap_err();
        assert_eq!(err.to_string(), "unexpected symbol near '<eof>'");

        let err = Parser::parse_source("if x then\n\ny = 1").unwrap_err();
        assert_eq!(err.message, "'end' expected (to close 'if' at line 1)");

        let err = Parser::parse_source("x").unwrap_err();
        assert_eq!(err.message, "syntax error");

        let err = Parser::parse_source("break").unwrap_err();
        assert!(err.message.contains("not inside a loop"));

        let err = Parser::parse_source("function f() return ... end").unwrap_err();
        assert!(err.message.contains("'...'"));

        let err = Parser::parse_source("return 1 x = 2").unwrap_err();
        assert_eq!(err.message, "'<eof>' expected");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("y = {}1{}", "(".repeat(1000), ")".repeat(1000));
        let err = Parser::parse_source(&deep).unwrap_err();
        assert_eq!(err.message, "chunk has too many syntax levels");

        let tables = format!("t = {}{}", "{".repeat(1000), "}".repeat(1000));
        assert!(Parser::parse_source(&tables).is_err());

        let blocks = format!("{}{}", "do ".repeat(1000), "end ".repeat(1000));
        assert!(Parser::parse_source(&blocks).is_err());

        let shallow = format!("y = {}1{}", "(".repeat(50), ")".repeat(50));
        assert!(Parser::parse_source(&shallow).is_ok());
    }
}
