//! Script host 单元测试
//!
//! 测试词法、语法、求值、模块表与强制回收

use std::fs;

use crate::args::ArgumentVector;
use crate::host::lexer::{tokenize, LexError, TokenKind};
use crate::host::parser::{parse, MAX_HEIGHT, MAX_NESTING};
use crate::host::{Host, Namespace, Output, ScriptError, TurnOutcome, Value};
use crate::util::config::HostConfig;

fn buffered() -> Host {
    Host::with_output(&HostConfig::default(), Output::buffer(), None)
}

fn printed(host: &Host) -> String {
    host.output().captured().unwrap_or_default()
}

/// Run `source` in a fresh namespace and return the trailing expression
fn eval(source: &str) -> Result<Option<Value>, ScriptError> {
    let host = buffered();
    let ns = Namespace::new("test");
    host.exec(source, "<test>", &ns)
}

fn eval_int(source: &str) -> i64 {
    match eval(source) {
        Ok(Some(Value::Int(i))) => i,
        other => panic!("expected int from {:?}, got {:?}", source, other),
    }
}

#[cfg(test)]
mod lexer_tests {
    use super::*;

    #[test]
    fn test_tokens_and_lines() {
        let tokens = tokenize("let x = 1\nx + 2 # note\n").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Let,
                TokenKind::Ident("x".to_string()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Ident("x".to_string()),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[5].line, 2);
    }

    #[test]
    fn test_newlines_inside_parens_ignored() {
        let tokens = tokenize("f(1,\n2)").unwrap();
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::Newline));
    }

    #[test]
    fn test_newlines_inside_braces_in_parens_kept() {
        let tokens = tokenize("f(fn() {\nprint(1)\n})").unwrap();
        assert_eq!(
            tokens
                .iter()
                .filter(|t| t.kind == TokenKind::Newline)
                .count(),
            2
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#""a\tb\n\"q\"""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("a\tb\n\"q\"".to_string()));
    }

    #[test]
    fn test_lex_errors() {
        assert_eq!(
            tokenize("\"open"),
            Err(LexError::UnterminatedString { line: 1 })
        );
        assert!(matches!(
            tokenize("x\n@"),
            Err(LexError::UnexpectedChar { ch: '@', line: 2 })
        ));
        assert!(matches!(
            tokenize("99999999999999999999"),
            Err(LexError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_unicode_identifiers() {
        let tokens = tokenize("let 名前 = 1").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Ident("名前".to_string()));
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;
    use crate::host::ast::StmtKind;

    #[test]
    fn test_parse_statements() {
        let program = parse("let a = 1; a = 2\nfn f(x) { return x }\nf(a)", "<t>").unwrap();
        assert_eq!(program.len(), 4);
        assert!(matches!(program[0].kind, StmtKind::Let(..)));
        assert!(matches!(program[1].kind, StmtKind::Assign(..)));
        assert!(matches!(program[2].kind, StmtKind::FnDef { .. }));
        assert_eq!(program[3].line, 3);
    }

    #[test]
    fn test_else_on_next_line() {
        let program = parse("if x {\n1\n}\nelse {\n2\n}", "<t>").unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_syntax_error_location() {
        let err = parse("let x = 1\nlet = 2", "demo.tl").unwrap_err();
        match err {
            ScriptError::Syntax { origin, line, .. } => {
                assert_eq!(origin, "demo.tl");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unclosed_block() {
        assert!(matches!(
            parse("fn f() {\n1", "<t>"),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("f() = 1", "<t>").is_err());
    }

    fn syntax_message(source: &str) -> String {
        match parse(source, "<t>") {
            Err(ScriptError::Syntax { message, .. }) => message,
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_nesting_within_limit() {
        let depth = MAX_NESTING - 8;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(eval_int(&source), 1);
        let source = format!("{}1{}", "[".repeat(depth), "]".repeat(depth));
        assert!(parse(&source, "<t>").is_ok());
    }

    #[test]
    fn test_deep_nesting_is_syntax_error() {
        for (open, close) in [("(", ")"), ("[", "]"), ("f(", ")")] {
            let source = format!("{}1{}", open.repeat(5000), close.repeat(5000));
            assert_eq!(syntax_message(&source), "expression nested too deeply");
        }
        assert_eq!(
            syntax_message(&format!("{}1", "-".repeat(5000))),
            "expression nested too deeply"
        );
        let blocks = format!("{}1{}", "if true { ".repeat(500), " }".repeat(500));
        assert_eq!(syntax_message(&blocks), "expression nested too deeply");
    }

    #[test]
    fn test_operator_chain_limit() {
        let terms = vec!["1"; 200].join(" + ");
        assert_eq!(eval_int(&terms), 200);

        let terms = vec!["1"; MAX_HEIGHT * 4].join(" + ");
        assert_eq!(syntax_message(&terms), "expression too long");
        let calls = format!("f{}", "()".repeat(MAX_HEIGHT * 4));
        assert_eq!(syntax_message(&calls), "expression too long");
    }
}

#[cfg(test)]
mod eval_tests {
    use super::*;

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval_int("1 + 2 * 3"), 7);
        assert_eq!(eval_int("(1 + 2) * 3"), 9);
        assert_eq!(eval_int("-7 % 3"), -1);
        assert_eq!(eval_int("10 / 3 - 1"), 2);
    }

    #[test]
    fn test_functions_and_recursion() {
        let source = "
fn fact(n) {
    if n <= 1 { return 1 }
    return n * fact(n - 1)
}
fact(10)
";
        assert_eq!(eval_int(source), 3_628_800);
    }

    #[test]
    fn test_while_and_assignment() {
        assert_eq!(
            eval_int("let i = 0; let total = 0\nwhile i < 5 { total = total + i; i = i + 1 }\ntotal"),
            10
        );
    }

    #[test]
    fn test_locals_do_not_leak() {
        let host = buffered();
        let ns = Namespace::new("test");
        host.exec("fn f() { let hidden = 1 }\nf()", "<t>", &ns)
            .unwrap();
        assert!(!ns.contains("hidden"));
        assert!(ns.contains("f"));
    }

    #[test]
    fn test_function_assigns_global() {
        assert_eq!(
            eval_int("let n = 1\nfn bump() { n = n + 1 }\nbump(); bump()\nn"),
            3
        );
    }

    #[test]
    fn test_strings_lists_and_index() {
        assert_eq!(
            eval("\"ab\" + \"cd\"").unwrap().unwrap().to_string(),
            "abcd"
        );
        assert_eq!(eval_int("len([1, 2, 3] + [4])"), 4);
        assert_eq!(eval_int("[10, 20, 30][-1]"), 30);
        assert_eq!(eval("\"héllo\"[1]").unwrap().unwrap().to_string(), "é");
        assert_eq!(eval("str([1, \"a\"])").unwrap().unwrap().to_string(), "[1, \"a\"]");
    }

    #[test]
    fn test_short_circuit() {
        // the right side would fail if evaluated
        assert!(matches!(
            eval("false and undefined_name"),
            Ok(Some(Value::Bool(false)))
        ));
        assert_eq!(eval_int("0 or 5"), 5);
        assert!(matches!(eval("!nil"), Ok(Some(Value::Bool(true)))));
    }

    #[test]
    fn test_lambda_sees_defining_globals() {
        assert_eq!(
            eval_int("let base = 40\nlet add = fn(x) { return base + x }\nadd(2)"),
            42
        );
    }

    #[test]
    fn test_print_goes_to_output() {
        let host = buffered();
        let ns = Namespace::new("test");
        host.exec("print(\"a\", 1, [true, nil])\nprint()", "<t>", &ns)
            .unwrap();
        assert_eq!(printed(&host), "a 1 [true, nil]\n\n");
    }

    #[test]
    fn test_errors_carry_lines() {
        assert!(matches!(
            eval("let a = 1\nmissing"),
            Err(ScriptError::Name { ref name, line: 2 }) if name == "missing"
        ));
        assert!(matches!(
            eval("1 + \"x\""),
            Err(ScriptError::Type { line: 1, .. })
        ));
        assert!(matches!(
            eval("\n\nraise(\"boom\")"),
            Err(ScriptError::Raised { ref message, line: 3 }) if message == "boom"
        ));
        assert!(matches!(
            eval("1 / 0"),
            Err(ScriptError::Raised { .. })
        ));
        assert!(matches!(
            eval("fn f(a) { return a }\nf()"),
            Err(ScriptError::Type { .. })
        ));
        assert!(matches!(eval("[1][5]"), Err(ScriptError::Raised { .. })));
        assert!(matches!(eval("5()"), Err(ScriptError::Type { .. })));
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(matches!(
            eval("9223372036854775807 + 1"),
            Err(ScriptError::Type { .. })
        ));
    }

    #[test]
    fn test_runaway_recursion_stops() {
        assert!(matches!(
            eval("fn f() { return f() }\nf()"),
            Err(ScriptError::Raised { ref message, .. }) if message.contains("depth")
        ));
    }

    #[test]
    fn test_exit_request() {
        assert!(matches!(eval("exit()"), Err(ScriptError::Exit { code: 0 })));
        assert!(matches!(eval("exit(3)"), Err(ScriptError::Exit { code: 3 })));
    }

    #[test]
    fn test_task_builtins_need_context() {
        assert!(matches!(
            eval("at_cleanup(fn() { })"),
            Err(ScriptError::NoTaskContext)
        ));
        assert!(matches!(eval("task_id()"), Err(ScriptError::NoTaskContext)));
        assert!(matches!(
            eval("at_cleanup(1)"),
            Err(ScriptError::Type { .. })
        ));
    }

    #[test]
    fn test_args_builtin() {
        let host = buffered();
        host.set_program_args(ArgumentVector::new(["run.tl", "x"]));
        let ns = Namespace::new("test");
        let value = host.exec("args()", "<t>", &ns).unwrap().unwrap();
        assert_eq!(value.to_string(), "[\"run.tl\", \"x\"]");
    }

    #[test]
    fn test_builtins_can_be_shadowed() {
        assert_eq!(eval_int("let len = 7\nlen"), 7);
    }
}

#[cfg(test)]
mod module_tests {
    use super::*;

    #[test]
    fn test_initial_main_module() {
        let host = buffered();
        let main = host.module("__main__").unwrap();
        assert_eq!(main.identity().as_deref(), Some("__main__"));
        assert_eq!(host.modules(), vec!["__main__".to_string()]);
    }

    #[test]
    fn test_register_replaces_and_retires() {
        let host = buffered();
        let old = host.module("__main__").unwrap();
        let new = host.new_namespace("__main__");
        host.register_module("__main__", new.clone());

        assert!(host.module("__main__").unwrap().ptr_eq(&new));
        assert!(!host.module("__main__").unwrap().ptr_eq(&old));
        assert_eq!(host.retired(), 1);

        // registering the same namespace again retires nothing
        host.register_module("__main__", new);
        assert_eq!(host.retired(), 1);
    }

    #[test]
    fn test_import_from_search_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("util.tl"),
            "let loads = 1\nfn double(x) { return x * 2 }\n",
        )
        .unwrap();

        let host = buffered();
        host.append_search_path(dir.path());
        let ns = Namespace::new("test");
        let value = host
            .exec("let u = import(\"util\")\nu.double(21)", "<t>", &ns)
            .unwrap();
        assert!(matches!(value, Some(Value::Int(42))));

        let module = host.module("util").unwrap();
        assert_eq!(module.file(), Some(dir.path().join("util.tl")));

        // cached: a second import is the same namespace
        host.exec("let again = import(\"util\")", "<t>", &ns)
            .unwrap();
        match ns.get("again") {
            Some(Value::Module(again)) => assert!(again.ptr_eq(&module)),
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[test]
    fn test_import_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let host = buffered();
        host.append_search_path(dir.path());
        let err = host
            .exec("import(\"nowhere\")", "<t>", &Namespace::new("test"))
            .unwrap_err();
        match err {
            ScriptError::ModuleNotFound { name, searched } => {
                assert_eq!(name, "nowhere");
                assert_eq!(searched, vec![dir.path().join("nowhere.tl")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exec_file_missing() {
        let host = buffered();
        let err = host
            .exec_file(std::path::Path::new("/no/such/script.tl"), &Namespace::new("m"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("can't open file '/no/such/script.tl'"));
    }

    #[test]
    fn test_eval_turn_outcomes() {
        let host = buffered();
        let ns = Namespace::new("__console__");
        assert!(matches!(
            host.eval_turn("1 + 1", &ns),
            TurnOutcome::Value(Some(Value::Int(2)))
        ));
        assert!(matches!(
            host.eval_turn("let x = 1", &ns),
            TurnOutcome::Value(None)
        ));
        assert!(matches!(
            host.eval_turn("nope", &ns),
            TurnOutcome::Failed(ScriptError::Name { .. })
        ));
        assert!(matches!(host.eval_turn("exit(4)", &ns), TurnOutcome::Stop));
    }
}

#[cfg(test)]
mod reclaim_tests {
    use super::*;
    use crate::host::reclaim::ReclaimState;
    use crate::runtime::local::{Journal, JournalEntry};

    #[test]
    fn test_unreachable_resource_finalized_immediately() {
        let host = buffered();
        let ns = Namespace::new("test");
        host.exec("fn use_once() { let r = resource(\"scratch\") }\nuse_once()", "<t>", &ns)
            .unwrap();
        assert_eq!(host.finalized(), vec!["scratch".to_string()]);
    }

    #[test]
    fn test_collect_releases_retired_namespaces() {
        let journal = Journal::new();
        let host = Host::with_output(&HostConfig::default(), Output::buffer(), Some(journal.clone()));
        let console = host.new_namespace("__console__");
        host.exec("let a = resource(\"a\")\nlet b = [resource(\"b\")]", "<t>", &console)
            .unwrap();
        host.retire(console);
        assert!(host.finalized().is_empty());

        let reclaimed = host.collect();
        assert_eq!(reclaimed, 3);
        assert_eq!(host.finalized(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(host.retired(), 0);

        let notes: Vec<JournalEntry> = journal.entries();
        assert_eq!(
            notes,
            vec![
                JournalEntry::Note("finalized a".to_string()),
                JournalEntry::Note("finalized b".to_string()),
                JournalEntry::Note("reclaimed 3".to_string()),
            ]
        );
    }

    #[test]
    fn test_collect_keeps_namespaces_still_referenced() {
        let host = buffered();
        let shared = host.new_namespace("shared");
        shared.set("r", Value::Resource(std::rc::Rc::new(crate::host::Resource::new(
            "kept",
            host.finalizer_log(),
        ))));
        host.retire(shared.clone());

        assert_eq!(host.collect(), 1);
        assert!(host.finalized().is_empty());
        assert!(shared.contains("r"));

        drop(shared);
        assert_eq!(host.finalized(), vec!["kept".to_string()]);
    }

    #[test]
    fn test_reclaimer_statistics() {
        let log = std::rc::Rc::new(crate::host::FinalizerLog::new(None));
        let mut reclaimer = crate::host::Reclaimer::new(Default::default(), log);
        assert_eq!(reclaimer.state(), ReclaimState::Idle);
        reclaimer.retire(Namespace::new("x"));
        assert_eq!(reclaimer.pending(), 1);
        assert_eq!(reclaimer.collect(), 1);
        assert_eq!(reclaimer.collect(), 0);
        assert_eq!(reclaimer.collections(), 2);
        assert!(reclaimer.total_pause() >= reclaimer.last_pause());
        assert_eq!(reclaimer.state(), ReclaimState::Idle);
    }
}
