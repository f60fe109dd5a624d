#[cfg(test)]
mod tests {
    use crate::token::{Token, Tokenizer};

    #[test]
    fn basic() {
        let t1 = Tokenizer::tokenize(r#"1.5 + * / // % ^ # == ~= "str1" 'str2' true false nil"#);
        let e1 = vec![
            Token::Float(1.5),
            Token::Add,
            Token::Mul,
            Token::Div,
            Token::IDiv,
            Token::Mod,
            Token::Pow,
            Token::Len,
            Token::Eq,
            Token::Ne,
            Token::Str("str1".to_string()),
            Token::Str("str2".to_string()),
            Token::Bool(true),
            Token::Bool(false),
            Token::Nil,
        ];
        assert_eq!(t1.unwrap(), e1);
    }

    #[test]
    fn test_dots() {
        let tokens = Tokenizer::tokenize("a.b .. c ...").unwrap();
        let expected = vec![
            Token::Id("a".to_string()),
            Token::Dot,
            Token::Id("b".to_string()),
            Token::Concat,
            Token::Id("c".to_string()),
            Token::Ellipsis,
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = Tokenizer::tokenize("local function ends endx _x1").unwrap();
        let expected = vec![
            Token::Local,
            Token::Function,
            Token::Id("ends".to_string()),
            Token::Id("endx".to_string()),
            Token::Id("_x1".to_string()),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_numbers() {
        let tokens = Tokenizer::tokenize("100 102.0351 0x10 1e3 .5 3.").unwrap();
        let expected = vec![
            Token::Int(100),
            Token::Float(102.0351),
            Token::Int(16),
            Token::Float(1000.0),
            Token::Float(0.5),
            Token::Float(3.0),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_integer_overflow_becomes_float() {
        let tokens = Tokenizer::tokenize("9223372036854775808").unwrap();
        assert_eq!(tokens, vec![Token::Float(9223372036854775808.0)]);
    }

    #[test]
    fn test_number_followed_by_concat() {
        let tokens = Tokenizer::tokenize("1..2").unwrap();
        assert_eq!(tokens, vec![Token::Int(1), Token::Concat, Token::Int(2)]);
    }

    #[test]
    fn test_comments() {
        let src = "a -- line comment\n--[[ block\ncomment ]] b --[==[ x ]==] c";
        let tokens = Tokenizer::tokenize(src).unwrap();
        let expected = vec![
            Token::Id("a".to_string()),
            Token::Id("b".to_string()),
            Token::Id("c".to_string()),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_long_strings() {
        let tokens = Tokenizer::tokenize("[[\nfirst\nsecond]] [=[a]]b]=]").unwrap();
        let expected = vec![
            Token::Str("first\nsecond".to_string()),
            Token::Str("a]]b".to_string()),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_escape_sequences() {
        let tokens = Tokenizer::tokenize(r#""a\tb\n\65\x42\\ \"q\"""#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\tb\nAB\\ \"q\"".to_string())]);
    }

    #[test]
    fn test_spans_track_lines() {
        let (tokens, spans) = Tokenizer::tokenize_with_spans("x = 1\n\ny = 2").unwrap();
        assert_eq!(tokens.len(), spans.len());
        assert_eq!(spans[0].line(), 1);
        assert_eq!(spans[3].line(), 3);
    }

    #[test]
    fn test_errors() {
        let err = Tokenizer::tokenize_with_spans("x = \"open").unwrap_err();
        assert_eq!(err.message, "unfinished string");

        let err = Tokenizer::tokenize_with_spans("\n\nx = 3x").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.to_string(), "malformed number near '3x'");

        let err = Tokenizer::tokenize_with_spans("x = ~").unwrap_err();
        assert_eq!(err.message, "unexpected symbol");

        assert!(Tokenizer::tokenize("--[[ never closed").is_err());
    }

    #[test]
    fn test_shebang_is_skipped() {
        let tokens = Tokenizer::tokenize("#!/usr/bin/env moon\nreturn").unwrap();
        assert_eq!(tokens, vec![Token::Return]);
    }
}
