#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::error::BridgeError;
    use crate::factory::{ContextFactory, ContextOptions};
    use crate::test_util::script_file;

    #[test]
    fn test_same_file_same_context() -> Result<()> {
        let file = script_file("loads = (loads or 0) + 1")?;
        ContextFactory::with(|factory| -> Result<()> {
            let first = factory.get_context(file.path(), false)?;
            let second = factory.get_context(file.path(), false)?;
            assert!(first.state() == second.state());
            assert_eq!(factory.leases(file.path()), 2);
            assert_eq!(factory.loaded_count(), 1);

            first.state().get_global("loads");
            assert_eq!(first.state().to_integer(-1), Some(1));
            first.state().pop(1);
            Ok(())
        })
    }

    #[test]
    fn test_contexts_have_separate_globals() -> Result<()> {
        let a = script_file("name = 'a'")?;
        let b = script_file("other = 1")?;
        ContextFactory::with(|factory| -> Result<()> {
            let ca = factory.get_context(a.path(), false)?;
            let cb = factory.get_context(b.path(), false)?;
            assert!(ca.state() != cb.state());
            cb.state().get_global("name");
            assert!(cb.state().is_nil(-1));
            cb.state().pop(1);
            assert_eq!(factory.loaded_count(), 2);
            Ok(())
        })
    }

    #[test]
    fn test_failed_load_records_nothing() -> Result<()> {
        let broken = script_file("x = = 1")?;
        ContextFactory::with(|factory| {
            let err = factory.get_context(broken.path(), false).unwrap_err();
            match err {
                BridgeError::ScriptLoad { file, message } => {
                    assert_eq!(file, broken.path());
                    assert!(message.contains("unexpected symbol"), "{}", message);
                }
                other => panic!("unexpected error {}", other),
            }
            assert!(!factory.is_loaded(broken.path()));

            let err = factory.get_context("/definitely/not/here.lua", false).unwrap_err();
            assert!(matches!(err, BridgeError::ScriptLoad { ref message, .. } if message.contains("cannot open")));
            assert_eq!(factory.loaded_count(), 0);
        });
        Ok(())
    }

    #[test]
    fn test_runtime_error_while_loading() -> Result<()> {
        let file = script_file("local t = nil\nprint(t.x)")?;
        ContextFactory::with(|factory| {
            let err = factory.get_context(file.path(), true).unwrap_err();
            assert!(matches!(err, BridgeError::ScriptLoad { .. }), "{}", err);
            assert!(!factory.is_loaded(file.path()));
        });
        Ok(())
    }

    #[test]
    fn test_standard_library_and_dependencies() -> Result<()> {
        let dep = script_file("function helper(x) return x + 1 end")?;
        let main = script_file("value = helper(1) upper = string.upper('a')")?;
        ContextFactory::with(|factory| -> Result<()> {
            let options = ContextOptions::new().with_std(true).dependency(dep.path());
            let ctx = factory.open(main.path(), &options)?;
            ctx.state().get_global("value");
            assert_eq!(ctx.state().to_integer(-1), Some(2));
            ctx.state().get_global("upper");
            assert_eq!(ctx.state().to_str(-1).as_deref(), Some("A"));
            ctx.state().set_top(0);
            Ok(())
        })
    }

    #[test]
    fn test_open_standard_library_later() -> Result<()> {
        let file = script_file("n = 1")?;
        ContextFactory::with(|factory| -> Result<()> {
            let ctx = factory.get_context(file.path(), false)?;
            ctx.state().get_global("math");
            assert!(ctx.state().is_nil(-1));
            ctx.state().pop(1);
            factory.open_standard_library(file.path())?;
            ctx.state().get_global("math");
            assert!(ctx.state().is_table(-1));
            ctx.state().pop(1);
            assert!(factory.open_standard_library("unknown.lua").is_err());
            Ok(())
        })
    }

    #[test]
    fn test_leases_release_context() -> Result<()> {
        let file = script_file("loads = (loads or 0) + 1")?;
        ContextFactory::with(|factory| -> Result<()> {
            let first = factory.get_context(file.path(), false)?;
            let copy = first.clone();
            assert_eq!(factory.leases(file.path()), 2);
            drop(first);
            assert!(factory.is_loaded(file.path()));
            drop(copy);
            assert!(!factory.is_loaded(file.path()));

            let again = factory.get_context(file.path(), false)?;
            assert!(factory.release(file.path()));
            assert!(!factory.release(file.path()));
            let fresh = factory.get_context(file.path(), false)?;
            assert!(again.state() != fresh.state());
            drop(again);
            assert_eq!(factory.leases(file.path()), 1);
            Ok(())
        })
    }
}
