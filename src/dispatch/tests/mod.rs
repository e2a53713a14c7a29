//! Dispatch 单元测试
//!
//! 测试模式选择、交互式控制台以及内联/文件模式

use std::fs;
use std::path::PathBuf;

use crate::args::ArgumentVector;
use crate::dispatch::{is_complete, select_mode, DispatchMode, Dispatcher, Repl, ScriptedConsole};
use crate::host::{Host, Output, ScriptError, Value};
use crate::task::TaskError;
use crate::util::config::{HostConfig, ReplConfig};

fn buffered() -> Host {
    Host::with_output(&HostConfig::default(), Output::buffer(), None)
}

fn quiet_repl() -> ReplConfig {
    ReplConfig {
        banner: String::new(),
        ..ReplConfig::default()
    }
}

#[cfg(test)]
mod mode_tests {
    use super::*;

    #[test]
    fn test_select_mode() {
        assert_eq!(
            select_mode(&ArgumentVector::new(["prog"])),
            DispatchMode::Interactive
        );
        assert_eq!(
            select_mode(&ArgumentVector::new(["prog", "-"])),
            DispatchMode::Interactive
        );
        assert_eq!(
            select_mode(&ArgumentVector::new(["prog", "-c", "1"])),
            DispatchMode::Inline
        );
        assert_eq!(
            select_mode(&ArgumentVector::new(["prog", "run.tl", "-c"])),
            DispatchMode::File(PathBuf::from("run.tl"))
        );
        assert_eq!(
            select_mode(&ArgumentVector::default()),
            DispatchMode::Interactive
        );
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(DispatchMode::Inline.to_string(), "inline");
        assert_eq!(
            DispatchMode::File(PathBuf::from("a.tl")).to_string(),
            "file a.tl"
        );
    }
}

#[cfg(test)]
mod complete_tests {
    use super::*;

    #[test]
    fn test_is_complete() {
        // Complete expressions
        assert!(is_complete("1 + 2"));
        assert!(is_complete("let x = 42"));
        assert!(is_complete("fn foo() { 1 }"));
        assert!(is_complete("print(\"{\")"));
        assert!(is_complete("let s = 1 # {"));

        // Incomplete expressions (checked by balanced delimiters)
        assert!(!is_complete("fn foo() {"));
        assert!(!is_complete("if true {"));
        assert!(!is_complete("{"));
        assert!(!is_complete("print(1,"));
        assert!(!is_complete("\"open"));
    }

    #[test]
    fn test_stray_closer_is_complete() {
        assert!(is_complete("}"));
        assert!(is_complete("1)"));
    }
}

#[cfg(test)]
mod repl_tests {
    use super::*;

    fn run(lines: &[&str]) -> (Host, crate::dispatch::Transcript, usize) {
        let host = buffered();
        let console = ScriptedConsole::new(lines.iter().copied());
        let config = quiet_repl();
        let mut handle = console.clone();
        let ns = host.new_namespace("__console__");
        let turns = Repl::new(&host, &mut handle, &config, ns).run().unwrap();
        (host, console.transcript(), turns)
    }

    #[test]
    fn test_echo_values() {
        let (_, transcript, turns) = run(&["1 + 1", "let x = \"hi\"", "x", "nil"]);
        assert_eq!(turns, 4);
        assert_eq!(transcript.output, vec!["2".to_string(), "\"hi\"".to_string()]);
        assert!(transcript.errors.is_empty());
        assert!(transcript.closed);
    }

    #[test]
    fn test_errors_do_not_stop_the_loop() {
        let (_, transcript, _) = run(&["missing", "raise(\"bad\")", "40 + 2"]);
        assert_eq!(transcript.errors.len(), 2);
        assert!(transcript.errors[0].contains("'missing' is not defined"));
        assert_eq!(transcript.output, vec!["42".to_string()]);
    }

    #[test]
    fn test_exit_stops_without_error() {
        let (_, transcript, turns) = run(&["exit()", "1"]);
        assert_eq!(turns, 1);
        assert!(transcript.output.is_empty());
        assert!(transcript.errors.is_empty());
    }

    #[test]
    fn test_quit_command() {
        let (_, transcript, turns) = run(&[":q", "1"]);
        assert_eq!(turns, 0);
        assert!(transcript.output.is_empty());
    }

    #[test]
    fn test_multiline_block() {
        let (_, transcript, _) = run(&["fn add(a, b) {", "  return a + b", "}", "add(2, 3)"]);
        assert_eq!(
            transcript.prompts,
            vec![">>> ", "... ", "... ", ">>> ", ">>> "]
        );
        assert_eq!(transcript.output, vec!["5".to_string()]);
    }

    #[test]
    fn test_interrupt_discards_buffer() {
        let host = buffered();
        let console = ScriptedConsole::new(["fn broken() {"])
            .interrupt();
        let config = quiet_repl();
        let mut handle = console.clone();
        let ns = host.new_namespace("__console__");
        Repl::new(&host, &mut handle, &config, ns.clone())
            .run()
            .unwrap();

        let transcript = console.transcript();
        assert_eq!(transcript.errors, vec!["KeyboardInterrupt".to_string()]);
        assert!(!ns.contains("broken"));
    }

    #[test]
    fn test_commands() {
        let (host, transcript, _) = run(&["let a = 1", ":symbols", ":modules", ":bogus", ":clear", ":i"]);
        assert!(transcript.output.contains(&"a = 1".to_string()));
        assert!(transcript.output.contains(&"__main__".to_string()));
        assert_eq!(transcript.errors, vec!["Unknown command: :bogus".to_string()]);
        // after :clear only __name__ is listed
        assert_eq!(
            transcript.output.last(),
            Some(&"__name__ = \"__console__\"".to_string())
        );
        drop(host);
    }

    #[test]
    fn test_banner_printed() {
        let host = buffered();
        let mut console = ScriptedConsole::new(Vec::<String>::new());
        let config = ReplConfig {
            banner: "welcome".to_string(),
            ..ReplConfig::default()
        };
        Repl::new(&host, &mut console, &config, host.new_namespace("c"))
            .run()
            .unwrap();
        assert_eq!(console.transcript().output, vec!["welcome".to_string()]);
    }
}

#[cfg(test)]
mod dispatcher_tests {
    use super::*;

    #[test]
    fn test_inline_registers_main() {
        let host = buffered();
        let old_main = host.module("__main__").unwrap();
        let mut console = ScriptedConsole::default();
        let config = quiet_repl();
        let mut dispatcher = Dispatcher::new(&host, &mut console, &config);

        let mode = dispatcher
            .dispatch(&ArgumentVector::new(["prog", "-c", "let x = 5\nprint(__name__, x)"]))
            .unwrap();
        assert_eq!(mode, DispatchMode::Inline);

        let main = host.module("__main__").unwrap();
        assert!(!main.ptr_eq(&old_main));
        assert!(matches!(main.get("x"), Some(Value::Int(5))));
        assert_eq!(host.output().captured().unwrap(), "__main__ 5\n");
        assert_eq!(host.retired(), 1);
    }

    #[test]
    fn test_inline_without_code_is_usage_error() {
        let host = buffered();
        let mut console = ScriptedConsole::default();
        let config = quiet_repl();
        let err = Dispatcher::new(&host, &mut console, &config)
            .dispatch(&ArgumentVector::new(["prog", "-c"]))
            .unwrap_err();
        assert!(matches!(err, TaskError::Script(ScriptError::Usage(_))));
    }

    #[test]
    fn test_inline_error_is_fatal() {
        let host = buffered();
        let mut console = ScriptedConsole::default();
        let config = quiet_repl();
        let err = Dispatcher::new(&host, &mut console, &config)
            .dispatch(&ArgumentVector::new(["prog", "-c", "nope"]))
            .unwrap_err();
        assert!(matches!(err, TaskError::Script(ScriptError::Name { .. })));
    }

    #[test]
    fn test_file_mode_sets_context() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("main.tl");
        fs::write(&script, "let helper = import(\"helper\")\nprint(helper.greet(), args()[1])\n").unwrap();
        fs::write(dir.path().join("helper.tl"), "fn greet() { return \"hello\" }\n").unwrap();

        let host = buffered();
        let mut console = ScriptedConsole::default();
        let config = quiet_repl();
        let script_arg = script.display().to_string();
        let args = ArgumentVector::new(["prog".to_string(), script_arg.clone(), "extra".to_string()]);
        Dispatcher::new(&host, &mut console, &config)
            .dispatch(&args)
            .unwrap();

        assert_eq!(host.output().captured().unwrap(), format!("hello {}\n", script_arg));
        assert_eq!(host.program_args(), args);
        assert_eq!(host.search_path().last(), Some(&dir.path().to_path_buf()));
        let main = host.module("__main__").unwrap();
        assert_eq!(main.file(), Some(script.clone()));
        assert!(host.module("helper").is_some());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let host = buffered();
        let mut console = ScriptedConsole::default();
        let config = quiet_repl();
        let err = Dispatcher::new(&host, &mut console, &config)
            .dispatch(&ArgumentVector::new(["prog", "/no/such/file.tl"]))
            .unwrap_err();
        match err {
            TaskError::Script(err) => assert!(err.is_not_found()),
            other => panic!("unexpected error: {other}"),
        }
        // the main module was still replaced
        assert_eq!(
            host.module("__main__").unwrap().file(),
            Some(PathBuf::from("/no/such/file.tl"))
        );
    }

    #[test]
    fn test_interactive_retires_console_namespace() {
        let host = buffered();
        let mut console = ScriptedConsole::new(["let r = resource(\"console\")"]);
        let config = quiet_repl();
        let mode = Dispatcher::new(&host, &mut console, &config)
            .dispatch(&ArgumentVector::new(["prog", "-"]))
            .unwrap();
        assert_eq!(mode, DispatchMode::Interactive);
        assert_eq!(host.retired(), 1);
        assert!(host.finalized().is_empty());

        host.collect();
        assert_eq!(host.finalized(), vec!["console".to_string()]);
    }
}
