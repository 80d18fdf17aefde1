//! Tests for the call-scoped env

use super::*;
use crate::config::BridgeConfig;
use crate::mock::{MockExit, MockHost, MockOp, MockValue};

fn setup() -> (MockHost, Arc<Lifecycle>) {
    (MockHost::new(), Lifecycle::new(BridgeConfig::default()))
}

#[cfg(test)]
mod intern_tests {
    use super::*;

    #[test]
    fn test_intern_same_name_twice_is_eq() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        let a = env.intern("my-symbol").unwrap();
        let b = env.intern("my-symbol").unwrap();
        assert!(a.is_eq(b));
        assert!(env.eq(a, b));
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn test_intern_non_ascii_fails_without_host_call() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);
        host.clear_ops();

        let err = env.intern("naïve").unwrap_err();
        assert_eq!(err, Error::InvalidSymbolName { name: "naïve".to_string() });
        assert!(host.ops().is_empty());
    }

    #[test]
    fn test_intern_interior_nul_fails() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);
        host.clear_ops();

        assert!(matches!(env.intern("a\0b"), Err(Error::InvalidSymbolName { .. })));
        assert!(host.ops().is_empty());
    }

    #[test]
    fn test_nil_and_t() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        assert!(!env.nil().unwrap().is_not_nil());
        assert!(env.t().unwrap().is_not_nil());
    }
}

#[cfg(test)]
mod funcall_tests {
    use super::*;

    #[test]
    fn test_call_passes_converted_arguments() {
        let (host, lifecycle) = setup();
        host.defun("concat-ish", |args| Ok(MockValue::Int(args.len() as i64)));
        let env = Env::new(&host, lifecycle);

        let result = env.call("concat-ish", (1_i64, "two", 3.5_f64)).unwrap();
        assert_eq!(result.into_rust::<i64>().unwrap(), 3);
        assert_eq!(
            host.calls("concat-ish"),
            vec![vec![MockValue::Int(1), MockValue::string("two"), MockValue::Float(3.5)]]
        );
    }

    #[test]
    fn test_signal_becomes_error_and_is_cleared() {
        let (host, lifecycle) = setup();
        host.defun("boom", |_| {
            Err(MockExit::signal("arith-error", MockValue::List(vec![MockValue::Int(1)])))
        });
        let env = Env::new(&host, lifecycle);

        let err = env.call("boom", ()).unwrap_err();
        match &err {
            Error::Signal { symbol, data, origin } => {
                assert_eq!(symbol, "arith-error");
                assert_eq!(data, "(1)");
                assert!(origin.is_some());
            }
            other => panic!("expected a signal, got {:?}", other),
        }
        assert!(err.is_host_exit());
        assert_eq!(host.pending_exit(), None);

        // The env stays usable after a translated exit.
        assert!(env.intern("still-fine").is_ok());
    }

    #[test]
    fn test_throw_becomes_error() {
        let (host, lifecycle) = setup();
        host.defun("escape", |_| Err(MockExit::throw("done", MockValue::Int(42))));
        let env = Env::new(&host, lifecycle);

        let err = env.call("escape", ()).unwrap_err();
        assert!(matches!(
            &err,
            Error::Throw { tag, value, origin: Some(_) } if tag == "done" && value == "42"
        ));
        assert_eq!(err.to_string(), "host threw to tag done: 42");
    }

    #[test]
    fn test_exit_values_released_with_error() {
        let (host, lifecycle) = setup();
        host.defun("boom", |_| Err(MockExit::signal("arith-error", MockValue::nil())));
        let env = Env::new(&host, Arc::clone(&lifecycle));

        let err = env.call("boom", ()).unwrap_err();
        assert_eq!(lifecycle.outstanding_refs(), 2);

        drop(err);
        assert_eq!(lifecycle.outstanding_refs(), 0);
        assert_eq!(host.live_global_refs(), 0);
    }

    #[test]
    fn test_void_function() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        match env.call("no-such-function", ()) {
            Err(Error::Signal { symbol, .. }) => assert_eq!(symbol, "void-function"),
            other => panic!("expected void-function, got {:?}", other),
        }
    }

    #[test]
    fn test_value_call() {
        let (host, lifecycle) = setup();
        host.defun("identity", |args| Ok(args[0].clone()));
        let env = Env::new(&host, lifecycle);

        let function = env.intern("identity").unwrap();
        let result = function.call((7_i64,)).unwrap();
        assert_eq!(result.into_rust::<i64>().unwrap(), 7);
    }
}

#[cfg(test)]
mod convert_tests {
    use super::*;
    use crate::convert::IntoLisp;

    #[test]
    fn test_scalars() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        let n = (-12_i32).into_lisp(&env).unwrap();
        assert_eq!(n.into_rust::<i32>().unwrap(), -12);

        let x = 0.25_f64.into_lisp(&env).unwrap();
        assert_eq!(x.into_rust::<f64>().unwrap(), 0.25);

        let s = "hello".into_lisp(&env).unwrap();
        assert_eq!(s.into_rust::<String>().unwrap(), "hello");

        assert!(true.into_lisp(&env).unwrap().into_rust::<bool>().unwrap());
    }

    #[test]
    fn test_wrong_type_reports_host_type() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        let symbol = env.intern("foo").unwrap();
        let err = symbol.into_rust::<i64>().unwrap_err();
        assert_eq!(
            err,
            Error::WrongType {
                expected: "integer",
                found: "symbol".to_string(),
            }
        );
        assert_eq!(host.pending_exit(), None);
    }

    #[test]
    fn test_narrowing_out_of_range() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        let big = 300_i64.into_lisp(&env).unwrap();
        assert!(matches!(big.into_rust::<u8>(), Err(Error::WrongType { .. })));
    }

    #[test]
    fn test_option_and_vec() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        let none: Option<i64> = None;
        let nil = none.into_lisp(&env).unwrap();
        assert!(!nil.is_not_nil());
        assert_eq!(nil.into_rust::<Option<i64>>().unwrap(), None);

        let list = vec![1_i64, 2, 3].into_lisp(&env).unwrap();
        assert_eq!(
            host.value_of(list.raw()),
            Some(MockValue::List(vec![MockValue::Int(1), MockValue::Int(2), MockValue::Int(3)]))
        );

        let empty = Vec::<i64>::new().into_lisp(&env).unwrap();
        assert!(!empty.is_not_nil());
    }
}

#[cfg(test)]
mod signal_tests {
    use super::*;

    #[test]
    fn test_native_error_uses_error_symbol() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        env.signal(&Error::custom("disk on fire"));

        assert_eq!(host.defined_error("rust-error").as_deref(), Some("Exception from a Rust module"));
        let (symbol, data) = host.exit_values().unwrap();
        assert_eq!(symbol, MockValue::symbol("rust-error"));
        assert_eq!(data, MockValue::List(vec![MockValue::string("disk on fire")]));
    }

    #[test]
    fn test_error_symbol_defined_once_per_env() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        env.signal(&Error::custom("first"));
        host.non_local_exit_clear();
        env.signal(&Error::custom("second"));

        assert_eq!(host.calls("define-error").len(), 1);
    }

    #[test]
    fn test_configured_error_symbol() {
        let host = MockHost::new();
        let mut config = BridgeConfig::default();
        config.errors.symbol = "my-module-error".to_string();
        let env = Env::new(&host, Lifecycle::new(config));

        env.signal(&Error::Detached);

        let (symbol, _) = host.exit_values().unwrap();
        assert_eq!(symbol, MockValue::symbol("my-module-error"));
    }

    #[test]
    fn test_host_signal_reraised_under_original_symbol() {
        let (host, lifecycle) = setup();
        host.defun("boom", |_| Err(MockExit::signal("arith-error", MockValue::nil())));
        let env = Env::new(&host, lifecycle);

        let err = env.call("boom", ()).unwrap_err();
        env.signal(&err);

        let (symbol, _) = host.exit_values().unwrap();
        assert_eq!(symbol, MockValue::symbol("arith-error"));
        assert_eq!(host.calls("define-error").len(), 0);
    }

    #[test]
    fn test_host_throw_reraised_to_original_tag() {
        let (host, lifecycle) = setup();
        host.defun("escape", |_| Err(MockExit::throw("done", MockValue::Int(1))));
        let env = Env::new(&host, lifecycle);

        let err = env.call("escape", ()).unwrap_err();
        env.signal(&err);

        assert_eq!(host.pending_exit(), Some(FuncallExit::Throw));
        assert!(host.ops().iter().any(|op| matches!(op, MockOp::Throw { tag, .. } if tag == "done")));
    }

    #[test]
    fn test_thrown_value_keeps_its_type() {
        let (host, lifecycle) = setup();
        host.defun("escape", |_| Err(MockExit::throw("done", MockValue::Int(42))));
        let env = Env::new(&host, lifecycle);

        let err = env.call("escape", ()).unwrap_err();
        env.signal(&err);

        assert_eq!(host.exit_values(), Some((MockValue::symbol("done"), MockValue::Int(42))));
    }

    #[test]
    fn test_signal_data_reraised_unchanged() {
        let (host, lifecycle) = setup();
        host.defun("boom", |_| {
            Err(MockExit::signal("arith-error", MockValue::List(vec![MockValue::Int(1)])))
        });
        let env = Env::new(&host, lifecycle);

        let err = env.call("boom", ()).unwrap_err();
        env.signal(&err);

        assert_eq!(
            host.exit_values(),
            Some((MockValue::symbol("arith-error"), MockValue::List(vec![MockValue::Int(1)])))
        );
    }

    #[test]
    fn test_escaped_symbol_name_survives_reraise() {
        let (host, lifecycle) = setup();
        host.defun("boom", |_| Err(MockExit::signal("foo bar", MockValue::nil())));
        let env = Env::new(&host, lifecycle);

        let err = env.call("boom", ()).unwrap_err();
        env.signal(&err);

        let (symbol, _) = host.exit_values().unwrap();
        assert_eq!(symbol, MockValue::symbol("foo bar"));
    }

    #[test]
    fn test_handmade_signal_uses_printed_form() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        env.signal(&Error::Signal {
            symbol: "file-missing".to_string(),
            data: "\"/tmp/x\"".to_string(),
            origin: None,
        });

        let (symbol, data) = host.exit_values().unwrap();
        assert_eq!(symbol, MockValue::symbol("file-missing"));
        assert_eq!(data, MockValue::List(vec![MockValue::string("\"/tmp/x\"")]));
    }

    #[test]
    fn test_pending_exit_is_left_alone() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, lifecycle);

        host.raise(MockExit::signal("quit", MockValue::nil()));
        env.signal(&Error::custom("late"));

        let (symbol, _) = host.exit_values().unwrap();
        assert_eq!(symbol, MockValue::symbol("quit"));
    }
}

#[cfg(test)]
mod release_tests {
    use super::*;

    #[test]
    fn test_drop_while_live_releases_immediately() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, Arc::clone(&lifecycle));

        let kept = env.preserve(env.intern("kept").unwrap()).unwrap();
        assert_eq!(host.promotions(), 1);
        assert_eq!(lifecycle.outstanding_refs(), 1);

        drop(kept);
        assert_eq!(host.releases(), 1);
        assert_eq!(lifecycle.pending_releases(), 0);
        assert_eq!(lifecycle.outstanding_refs(), 0);
        assert_eq!(host.live_global_refs(), 0);
    }

    #[test]
    fn test_bind_in_later_env() {
        let (host, lifecycle) = setup();

        let kept = {
            let env = Env::new(&host, Arc::clone(&lifecycle));
            env.preserve(env.intern("kept").unwrap()).unwrap()
        };

        let env = Env::new(&host, Arc::clone(&lifecycle));
        let value = kept.bind(&env);
        assert!(value.is_eq(env.intern("kept").unwrap()));
    }

    #[test]
    fn test_drop_while_exit_pending_is_queued() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, Arc::clone(&lifecycle));
        let kept = env.preserve(env.t().unwrap()).unwrap();

        host.raise(MockExit::signal("quit", MockValue::nil()));
        drop(kept);
        assert_eq!(host.releases(), 0);
        assert_eq!(lifecycle.pending_releases(), 1);

        host.non_local_exit_clear();
        drop(env);
        assert_eq!(host.releases(), 1);
        assert_eq!(lifecycle.pending_releases(), 0);
    }

    #[test]
    fn test_nested_envs_release_through_innermost() {
        let (host, lifecycle) = setup();
        let outer = Env::new(&host, Arc::clone(&lifecycle));
        let first = outer.preserve(outer.intern("first").unwrap()).unwrap();
        let second = outer.preserve(outer.intern("second").unwrap()).unwrap();

        {
            let inner = Env::new(&host, Arc::clone(&lifecycle));
            assert_eq!(live::depth(), 2);
            drop(first);
            assert_eq!(host.releases(), 1);
            drop(inner);
        }

        assert_eq!(live::depth(), 1);
        drop(second);
        assert_eq!(host.releases(), 2);
        assert_eq!(lifecycle.pending_releases(), 0);
    }

    #[test]
    fn test_other_lifecycle_is_not_released_here() {
        let (host, lifecycle) = setup();
        let other = Lifecycle::new(BridgeConfig::default());

        let foreign = {
            let env = Env::new(&host, Arc::clone(&other));
            env.preserve(env.t().unwrap()).unwrap()
        };

        let _env = Env::new(&host, Arc::clone(&lifecycle));
        drop(foreign);
        assert_eq!(other.pending_releases(), 1);
        assert_eq!(lifecycle.pending_releases(), 0);
    }

    #[test]
    fn test_drop_after_scope_returns_is_queued() {
        let (host, lifecycle) = setup();

        let kept = Env::scope(&host, Arc::clone(&lifecycle), |env| env.preserve(env.intern("kept")?)).unwrap();
        assert_eq!(live::depth(), 0);

        drop(kept);
        assert_eq!(host.releases(), 0);
        assert_eq!(lifecycle.pending_releases(), 1);

        Env::scope(&host, Arc::clone(&lifecycle), |_| ());
        assert_eq!(host.releases(), 1);
        assert_eq!(lifecycle.pending_releases(), 0);
    }

    #[test]
    fn test_failed_free_is_cleared_and_counted() {
        let (host, lifecycle) = setup();
        let env = Env::new(&host, Arc::clone(&lifecycle));
        let kept = env.preserve(env.intern("kept").unwrap()).unwrap();

        host.fail_frees(true);
        drop(kept);

        assert_eq!(host.pending_exit(), None);
        assert!(env.intern("unrelated").is_ok());
        let stats = lifecycle.stats();
        assert_eq!(stats.release_failures, 1);
        assert_eq!(stats.releases, 0);
        assert_eq!(lifecycle.outstanding_refs(), 0);
    }

    #[test]
    fn test_live_stack_unwinds_on_drop() {
        let (host, lifecycle) = setup();
        assert_eq!(live::depth(), 0);
        Env::scope(&host, lifecycle, |env| {
            assert_eq!(live::depth(), 1);
            env.nil().map(|_| ())
        })
        .unwrap();
        assert_eq!(live::depth(), 0);
    }
}
