//! Tests for typed callback wrappers

use super::*;
use crate::config::BridgeConfig;
use crate::error::Error;
use crate::lifecycle::Lifecycle;
use crate::mock::{MockExit, MockHost, MockValue};

/// Host with a `record` function that accepts anything
fn recording_host() -> MockHost {
    let host = MockHost::new();
    host.defun("record", |_| Ok(MockValue::nil()));
    host
}

fn record_fn(env: &Env<'_>) -> Arc<GlobalRef> {
    env.preserve(env.intern("record").unwrap()).unwrap()
}

fn deferred<A: CallbackArgs>(function: Arc<GlobalRef>, args: impl Any + Send) -> DeferredCall {
    DeferredCall::new(Arc::new(LispCallback::<A>::new(function)), Box::new(args))
}

#[cfg(test)]
mod arity_tests {
    use super::*;

    #[test]
    fn test_arity_constants() {
        assert_eq!(<() as CallbackArgs>::ARITY, 0);
        assert_eq!(<(i64,) as CallbackArgs>::ARITY, 1);
        assert_eq!(<(i64, String) as CallbackArgs>::ARITY, 2);
        assert_eq!(<(i64, i64, i64) as CallbackArgs>::ARITY, 3);
        assert_eq!(<(i64, i64, i64, i64) as CallbackArgs>::ARITY, 4);
        assert_eq!(<(i64, i64, i64, i64, i64) as CallbackArgs>::ARITY, 5);
    }

    #[test]
    fn test_each_arity_delivers_in_order() {
        let host = recording_host();
        let env = Env::new(&host, Lifecycle::new(BridgeConfig::default()));
        let f = record_fn(&env);

        let calls = vec![
            deferred::<()>(Arc::clone(&f), ()),
            deferred::<(i64,)>(Arc::clone(&f), (1_i64,)),
            deferred::<(i64, String)>(Arc::clone(&f), (1_i64, "two".to_string())),
            deferred::<(i64, i64, bool)>(Arc::clone(&f), (1_i64, 2_i64, true)),
            deferred::<(i64, i64, i64, f64)>(Arc::clone(&f), (1_i64, 2_i64, 3_i64, 0.5_f64)),
            deferred::<(u8, u8, u8, u8, u8)>(Arc::clone(&f), (1_u8, 2_u8, 3_u8, 4_u8, 5_u8)),
        ];

        for (arity, call) in calls.into_iter().enumerate() {
            assert_eq!(call.arity(), arity);
            assert_eq!(call.dispatch(&env).unwrap(), Dispatch::Delivered);
        }

        let seen = host.calls("record");
        assert_eq!(seen.len(), 6);
        assert!(seen[0].is_empty());
        assert_eq!(seen[1], vec![MockValue::Int(1)]);
        assert_eq!(seen[2], vec![MockValue::Int(1), MockValue::string("two")]);
        assert_eq!(
            seen[3],
            vec![MockValue::Int(1), MockValue::Int(2), MockValue::symbol("t")]
        );
        assert_eq!(seen[4][3], MockValue::Float(0.5));
        assert_eq!(seen[5], (1..=5).map(MockValue::Int).collect::<Vec<_>>());
    }
}

#[cfg(test)]
mod mismatch_tests {
    use super::*;

    #[test]
    fn test_wrong_element_type_is_not_called() {
        let host = recording_host();
        let env = Env::new(&host, Lifecycle::new(BridgeConfig::default()));
        let call = deferred::<(i64,)>(record_fn(&env), ("not an integer",));

        match call.dispatch(&env).unwrap() {
            Dispatch::ShapeMismatch { expected, arity } => {
                assert_eq!(arity, 1);
                assert!(expected.contains("i64"));
            }
            Dispatch::Delivered => panic!("mismatched arguments were delivered"),
        }
        assert!(host.calls("record").is_empty());
    }

    #[test]
    fn test_wrong_arity_is_not_called() {
        let host = recording_host();
        let env = Env::new(&host, Lifecycle::new(BridgeConfig::default()));
        let call = deferred::<(i64, i64)>(record_fn(&env), (1_i64,));

        assert!(matches!(
            call.dispatch(&env).unwrap(),
            Dispatch::ShapeMismatch { arity: 2, .. }
        ));
        assert!(host.calls("record").is_empty());
    }

    #[test]
    fn test_nullary_ignores_captured_arguments() {
        let host = recording_host();
        let env = Env::new(&host, Lifecycle::new(BridgeConfig::default()));
        let call = deferred::<()>(record_fn(&env), (1_i64, "ignored"));

        assert_eq!(call.dispatch(&env).unwrap(), Dispatch::Delivered);
        assert_eq!(host.calls("record"), vec![Vec::<MockValue>::new()]);
    }
}

#[cfg(test)]
mod invoke_tests {
    use super::*;

    #[test]
    fn test_host_signal_is_returned() {
        let host = MockHost::new();
        host.defun("fails", |_| Err(MockExit::signal("user-error", MockValue::string("nope"))));
        let env = Env::new(&host, Lifecycle::new(BridgeConfig::default()));

        let f = env.preserve(env.intern("fails").unwrap()).unwrap();
        let err = deferred::<(i64,)>(f, (1_i64,)).dispatch(&env).unwrap_err();
        assert!(matches!(err, Error::Signal { ref symbol, .. } if symbol == "user-error"));
        assert_eq!(host.pending_exit(), None);
    }

    #[test]
    fn test_wrapper_keeps_function_alive() {
        let host = recording_host();
        let lifecycle = Lifecycle::new(BridgeConfig::default());
        let env = Env::new(&host, Arc::clone(&lifecycle));

        let callback = LispCallback::<(i64,)>::new(record_fn(&env));
        assert_eq!(lifecycle.outstanding_refs(), 1);
        assert_eq!(Arc::strong_count(callback.function()), 1);

        drop(callback);
        assert_eq!(lifecycle.outstanding_refs(), 0);
        assert_eq!(host.releases(), 1);
    }

    #[test]
    fn test_debug_names_shape() {
        let host = recording_host();
        let env = Env::new(&host, Lifecycle::new(BridgeConfig::default()));
        let callback = LispCallback::<(i64, String)>::new(record_fn(&env));

        let rendered = format!("{:?}", callback);
        assert!(rendered.contains("LispCallback"));
        assert!(rendered.contains("i64"));
    }
}
