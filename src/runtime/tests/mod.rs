//! Runtime 单元测试
//!
//! 测试句柄、运行时选项以及本地运行时的前导/收尾协议

use crate::args::ArgumentVector;
use crate::runtime::local::{Journal, JournalEntry, LocalRuntime, RuntimeOptions};
use crate::runtime::{ContextHandle, Runtime, RuntimeError, RuntimeHandle, TaskHandle};

fn runtime(args: &[&str]) -> LocalRuntime {
    LocalRuntime::new(ArgumentVector::new(args.iter().copied()))
}

#[cfg(test)]
mod handle_tests {
    use super::*;

    #[test]
    fn test_handle_raw_roundtrip() {
        assert_eq!(TaskHandle::new(7).raw(), 7);
        assert_eq!(ContextHandle::new(0x701).raw(), 0x701);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(TaskHandle::new(0x2a).to_string(), "Task(0x2a)");
        assert!(RuntimeHandle::new(1).to_string().starts_with("Runtime("));
    }
}

#[cfg(test)]
mod options_tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = RuntimeOptions::parse(&ArgumentVector::new(["prog"]));
        assert_eq!(options, RuntimeOptions::default());
        assert_eq!(options.cpus, 1);
    }

    #[test]
    fn test_options_parsed() {
        let options = RuntimeOptions::parse(&ArgumentVector::new([
            "prog", "-level", "1", "-ll:cpu", "4", "-logfile", "/tmp/rt.log", "run.tl",
        ]));
        assert_eq!(options.log_level, Some(1));
        assert_eq!(options.cpus, 4);
        assert_eq!(options.logfile.as_deref(), Some(std::path::Path::new("/tmp/rt.log")));
    }

    #[test]
    fn test_options_ignore_script_arguments() {
        // `-level` after a script name still belongs to the runtime, but a
        // plain script argument must not be taken as a value
        let options = RuntimeOptions::parse(&ArgumentVector::new(["prog", "run.tl", "3", "-level"]));
        assert_eq!(options.log_level, None);
        assert_eq!(options.cpus, 1);
    }

    #[test]
    fn test_options_dash_value_not_consumed() {
        let options = RuntimeOptions::parse(&ArgumentVector::new(["prog", "-logfile", "-level", "0"]));
        assert_eq!(options.logfile, None);
        assert_eq!(options.log_level, Some(0));
    }
}

#[cfg(test)]
mod protocol_tests {
    use super::*;

    #[test]
    fn test_input_args_verbatim() {
        let rt = runtime(&["prog", "-lg:spy", "x.tl"]);
        assert_eq!(
            rt.input_args(),
            ArgumentVector::new(["prog", "-lg:spy", "x.tl"])
        );
    }

    #[test]
    fn test_preamble_then_postamble() {
        let rt = runtime(&["prog"]);
        let preamble = rt.preamble(b"raw", rt.processor(0)).unwrap();
        assert_eq!(preamble.runtime, rt.handle());
        assert!(preamble.regions.is_empty());
        assert_eq!(rt.live_tasks(), 1);

        rt.postamble(preamble.runtime, preamble.context, None)
            .unwrap();
        assert_eq!(rt.live_tasks(), 0);

        let entries = rt.journal().entries();
        assert_eq!(
            entries,
            vec![
                JournalEntry::Preamble {
                    task: preamble.task,
                    context: preamble.context,
                },
                JournalEntry::Postamble {
                    context: preamble.context,
                    result_len: 0,
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_preamble_rejected() {
        let rt = runtime(&["prog"]);
        let first = rt.preamble(&[], rt.processor(0)).unwrap();
        let err = rt.preamble(&[], rt.processor(0)).unwrap_err();
        assert_eq!(err, RuntimeError::DuplicatePreamble(first.task));
        rt.postamble(first.runtime, first.context, None).unwrap();
    }

    #[test]
    fn test_unknown_context_rejected() {
        let rt = runtime(&["prog"]);
        let bogus = ContextHandle::new(0xdead);
        assert_eq!(
            rt.postamble(rt.handle(), bogus, None),
            Err(RuntimeError::UnknownContext(bogus))
        );
    }

    #[test]
    fn test_postamble_twice_rejected() {
        let rt = runtime(&["prog"]);
        let preamble = rt.preamble(&[], rt.processor(0)).unwrap();
        rt.postamble(preamble.runtime, preamble.context, Some(b"ok"))
            .unwrap();
        assert_eq!(
            rt.postamble(preamble.runtime, preamble.context, None),
            Err(RuntimeError::UnknownContext(preamble.context))
        );
    }

    #[test]
    fn test_foreign_context_rejected() {
        let a = runtime(&["prog"]);
        let b = runtime(&["prog"]);
        let preamble = a.preamble(&[], a.processor(0)).unwrap();
        assert!(matches!(
            b.postamble(preamble.runtime, preamble.context, None),
            Err(RuntimeError::ForeignContext { .. })
        ));
        a.postamble(preamble.runtime, preamble.context, None)
            .unwrap();
    }

    #[test]
    fn test_processor_clamped_to_cpus() {
        let rt = runtime(&["prog", "-ll:cpu", "2"]);
        assert_ne!(rt.processor(0), rt.processor(1));
        assert_eq!(rt.processor(1), rt.processor(9));
    }

    #[test]
    fn test_shared_journal() {
        let journal = Journal::new();
        let rt = LocalRuntime::with_journal(ArgumentVector::new(["prog"]), journal.clone());
        journal.note("before");
        let preamble = rt.preamble(&[], rt.processor(0)).unwrap();
        assert_eq!(
            journal.position(|e| matches!(e, JournalEntry::Preamble { .. })),
            Some(1)
        );
        rt.postamble(preamble.runtime, preamble.context, None)
            .unwrap();
    }
}

#[cfg(test)]
mod worker_tests {
    use super::*;

    #[test]
    fn test_execute_reuses_worker_thread() {
        let rt = runtime(&["prog"]);
        assert_eq!(rt.worker_thread(), None);

        let first = rt.execute(|_| std::thread::current().id()).unwrap();
        let second = rt.execute(|_| std::thread::current().id()).unwrap();
        assert_eq!(first, second);
        assert_eq!(rt.worker_thread(), Some(first));
        assert_ne!(first, std::thread::current().id());
    }

    #[test]
    fn test_execute_runs_protocol_on_worker() {
        let rt = runtime(&["prog"]);
        let task = rt
            .execute(|rt| {
                let preamble = rt.preamble(&[], rt.processor(0))?;
                rt.postamble(preamble.runtime, preamble.context, None)?;
                Ok::<_, RuntimeError>(preamble.task)
            })
            .unwrap()
            .unwrap();
        assert_eq!(rt.live_tasks(), 0);
        assert!(rt.journal().entries().iter().any(
            |e| matches!(e, JournalEntry::Preamble { task: t, .. } if *t == task)
        ));
    }

    #[test]
    fn test_execute_after_panic_reports_shutdown() {
        let rt = runtime(&["prog"]);
        let result = rt.execute(|_| -> u32 { panic!("job failed") });
        assert_eq!(result, Err(RuntimeError::ShutDown));
    }
}
