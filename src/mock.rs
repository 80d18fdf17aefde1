//! In-process fake host for tests
//!
//! `MockHost` implements [`Host`] over a small value heap and records every
//! primitive that matters for lifecycle checks (interning, funcalls,
//! promotions, releases, raised exits) in the order they happen. Like the
//! real host, it ignores every operation while an exit is pending.

use std::collections::HashMap;
use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::host::{FuncallExit, Host, RawValue};

/// Datum stored on the fake heap
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    Symbol(String),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<MockValue>),
}

impl MockValue {
    pub fn nil() -> Self {
        Self::Symbol("nil".to_string())
    }

    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.to_string())
    }

    pub fn string(text: &str) -> Self {
        Self::Str(text.to_string())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Symbol(name) if name == "nil")
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Symbol(_) => "symbol",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "cons",
        }
    }
}

impl fmt::Display for MockValue {
    /// `prin1` style
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(name) => {
                for c in name.chars() {
                    if matches!(c, ' ' | '(' | ')' | '"' | '\\' | ';' | '\'') {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                Ok(())
            }
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Str(text) => write!(f, "{:?}", text),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Non-local exit raised by a fake function
#[derive(Debug, Clone, PartialEq)]
pub enum MockExit {
    Signal { symbol: String, data: MockValue },
    Throw { tag: String, value: MockValue },
}

impl MockExit {
    pub fn signal(symbol: &str, data: MockValue) -> Self {
        Self::Signal {
            symbol: symbol.to_string(),
            data,
        }
    }

    pub fn throw(tag: &str, value: MockValue) -> Self {
        Self::Throw {
            tag: tag.to_string(),
            value,
        }
    }
}

/// Recorded primitive operation
#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    Intern(String),
    Funcall { function: String, args: Vec<MockValue> },
    MakeGlobalRef(RawValue),
    FreeGlobalRef(RawValue),
    Signal { symbol: String, data: MockValue },
    Throw { tag: String, value: MockValue },
}

pub type MockFn = Arc<dyn Fn(&[MockValue]) -> Result<MockValue, MockExit> + Send + Sync>;

#[derive(Default)]
struct State {
    heap: Vec<MockValue>,
    symbols: HashMap<String, RawValue>,
    functions: HashMap<String, MockFn>,
    /// Global ref -> times promoted and not yet freed
    globals: HashMap<RawValue, usize>,
    errors: HashMap<String, String>,
    exit: Option<(FuncallExit, RawValue, RawValue)>,
    ops: Vec<MockOp>,
    bad_frees: usize,
    /// Signal `free-failed` instead of freeing
    fail_frees: bool,
}

impl State {
    fn alloc(&mut self, value: MockValue) -> RawValue {
        self.heap.push(value);
        RawValue::from_bits(self.heap.len())
    }

    fn get(&self, raw: RawValue) -> Option<&MockValue> {
        raw.bits().checked_sub(1).and_then(|index| self.heap.get(index))
    }

    fn intern(&mut self, name: &str) -> RawValue {
        if let Some(raw) = self.symbols.get(name) {
            return *raw;
        }
        let raw = self.alloc(MockValue::symbol(name));
        self.symbols.insert(name.to_string(), raw);
        raw
    }

    fn nil(&mut self) -> RawValue {
        self.intern("nil")
    }

    fn pending(&self) -> bool {
        self.exit.is_some()
    }

    fn raise(&mut self, exit: MockExit) {
        if self.pending() {
            return;
        }
        let entry = match exit {
            MockExit::Signal { symbol, data } => (FuncallExit::Signal, self.intern(&symbol), self.alloc(data)),
            MockExit::Throw { tag, value } => (FuncallExit::Throw, self.intern(&tag), self.alloc(value)),
        };
        self.exit = Some(entry);
    }

    fn wrong_type(&mut self, predicate: &str, found: Option<MockValue>) {
        let data = MockValue::List(vec![
            MockValue::symbol(predicate),
            found.unwrap_or_else(|| MockValue::symbol("#<invalid>")),
        ]);
        self.raise(MockExit::signal("wrong-type-argument", data));
    }
}

/// Fake host with an inspectable operation log
///
/// ```ignore
/// let host = MockHost::new();
/// host.defun("message", |_| Ok(MockValue::nil()));
/// let lifecycle = Lifecycle::new(BridgeConfig::default());
/// Env::scope(&host, lifecycle, |env| env.call("message", ("hello",)).map(drop))?;
/// assert_eq!(host.calls("message").len(), 1);
/// ```
pub struct MockHost {
    state: Mutex<State>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        let mut state = State::default();
        state.intern("nil");
        state.intern("t");
        Self {
            state: Mutex::new(state),
        }
    }

    /// Define a host function callable by name
    pub fn defun<F>(&self, name: &str, function: F)
    where
        F: Fn(&[MockValue]) -> Result<MockValue, MockExit> + Send + Sync + 'static,
    {
        self.state.lock().functions.insert(name.to_string(), Arc::new(function));
    }

    /// Set a pending exit directly, as if a host operation had failed
    pub fn raise(&self, exit: MockExit) {
        self.state.lock().raise(exit);
    }

    /// Make every later `free_global_ref` signal `free-failed`
    pub fn fail_frees(&self, enabled: bool) {
        self.state.lock().fail_frees = enabled;
    }

    pub fn ops(&self) -> Vec<MockOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    /// Names of every function called, in order
    pub fn funcalls(&self) -> Vec<String> {
        self.state
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                MockOp::Funcall { function, .. } => Some(function.clone()),
                _ => None,
            })
            .collect()
    }

    /// Argument lists of every call to `name`, in order
    pub fn calls(&self, name: &str) -> Vec<Vec<MockValue>> {
        self.state
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                MockOp::Funcall { function, args } if function == name => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn promotions(&self) -> usize {
        self.count_ops(|op| matches!(op, MockOp::MakeGlobalRef(_)))
    }

    pub fn releases(&self) -> usize {
        self.count_ops(|op| matches!(op, MockOp::FreeGlobalRef(_)))
    }

    fn count_ops(&self, predicate: impl Fn(&MockOp) -> bool) -> usize {
        self.state.lock().ops.iter().filter(|op| predicate(op)).count()
    }

    /// Global references promoted and not yet freed
    pub fn live_global_refs(&self) -> usize {
        self.state.lock().globals.values().sum()
    }

    /// Frees of values that were not live global references
    pub fn bad_frees(&self) -> usize {
        self.state.lock().bad_frees
    }

    pub fn pending_exit(&self) -> Option<FuncallExit> {
        self.state.lock().exit.map(|(status, _, _)| status)
    }

    /// Error symbols defined through `define-error`, with their messages
    pub fn defined_error(&self, symbol: &str) -> Option<String> {
        self.state.lock().errors.get(symbol).cloned()
    }

    pub fn value_of(&self, raw: RawValue) -> Option<MockValue> {
        self.state.lock().get(raw).cloned()
    }

    /// Pending exit rendered as `(symbol, data)`
    pub fn exit_values(&self) -> Option<(MockValue, MockValue)> {
        let state = self.state.lock();
        let (_, symbol, data) = state.exit?;
        Some((state.get(symbol)?.clone(), state.get(data)?.clone()))
    }

    fn builtin(state: &mut State, name: &str, args: &[MockValue]) -> Option<Result<MockValue, MockExit>> {
        let result = match (name, args) {
            ("list", []) => Ok(MockValue::nil()),
            ("list", items) => Ok(MockValue::List(items.to_vec())),
            ("define-error", [MockValue::Symbol(symbol), MockValue::Str(message), ..]) => {
                state.errors.insert(symbol.clone(), message.clone());
                Ok(MockValue::nil())
            }
            ("prin1-to-string", [value]) => Ok(MockValue::Str(value.to_string())),
            ("symbol-name", [MockValue::Symbol(symbol)]) => Ok(MockValue::Str(symbol.clone())),
            ("define-error" | "prin1-to-string" | "symbol-name", _) => Err(MockExit::signal(
                "wrong-type-argument",
                MockValue::List(args.to_vec()),
            )),
            _ => return None,
        };
        Some(result)
    }
}

impl Host for MockHost {
    fn intern(&self, name: &CStr) -> RawValue {
        let mut state = self.state.lock();
        if state.pending() {
            return state.nil();
        }
        let name = name.to_string_lossy().into_owned();
        state.ops.push(MockOp::Intern(name.clone()));
        state.intern(&name)
    }

    fn funcall(&self, function: RawValue, args: &[RawValue]) -> RawValue {
        let (name, args, user_fn) = {
            let mut state = self.state.lock();
            if state.pending() {
                return state.nil();
            }

            let name = match state.get(function) {
                Some(MockValue::Symbol(name)) => name.clone(),
                Some(other) => other.to_string(),
                None => {
                    state.wrong_type("functionp", None);
                    return state.nil();
                }
            };

            let mut values = Vec::with_capacity(args.len());
            for raw in args {
                match state.get(*raw) {
                    Some(value) => values.push(value.clone()),
                    None => {
                        state.wrong_type("valid-handle-p", None);
                        return state.nil();
                    }
                }
            }

            state.ops.push(MockOp::Funcall {
                function: name.clone(),
                args: values.clone(),
            });

            match Self::builtin(&mut state, &name, &values) {
                Some(result) => {
                    return match result {
                        Ok(value) => state.alloc(value),
                        Err(exit) => {
                            state.raise(exit);
                            state.nil()
                        }
                    };
                }
                None => {
                    let user_fn = state.functions.get(&name).cloned();
                    (name, values, user_fn)
                }
            }
        };

        // Run user functions unlocked so they may inspect the host.
        let result = match user_fn {
            Some(function) => function(&args),
            None => Err(MockExit::signal("void-function", MockValue::List(vec![MockValue::Symbol(name)]))),
        };

        let mut state = self.state.lock();
        match result {
            Ok(value) => state.alloc(value),
            Err(exit) => {
                state.raise(exit);
                state.nil()
            }
        }
    }

    fn make_global_ref(&self, value: RawValue) -> RawValue {
        let mut state = self.state.lock();
        if state.pending() {
            return state.nil();
        }
        let Some(datum) = state.get(value).cloned() else {
            state.wrong_type("valid-handle-p", None);
            return state.nil();
        };
        let global = state.alloc(datum);
        *state.globals.entry(global).or_insert(0) += 1;
        state.ops.push(MockOp::MakeGlobalRef(global));
        global
    }

    fn free_global_ref(&self, value: RawValue) {
        let mut state = self.state.lock();
        if state.pending() {
            return;
        }
        state.ops.push(MockOp::FreeGlobalRef(value));
        if state.fail_frees {
            state.raise(MockExit::signal("free-failed", MockValue::List(vec![])));
            return;
        }
        match state.globals.get_mut(&value) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    state.globals.remove(&value);
                }
            }
            _ => state.bad_frees += 1,
        }
    }

    fn non_local_exit_check(&self) -> FuncallExit {
        self.state
            .lock()
            .exit
            .map_or(FuncallExit::Return, |(status, _, _)| status)
    }

    fn non_local_exit_get(&self) -> (FuncallExit, RawValue, RawValue) {
        let mut state = self.state.lock();
        match state.exit {
            Some(exit) => exit,
            None => {
                let nil = state.nil();
                (FuncallExit::Return, nil, nil)
            }
        }
    }

    fn non_local_exit_clear(&self) {
        self.state.lock().exit = None;
    }

    fn non_local_exit_signal(&self, symbol: RawValue, data: RawValue) {
        let mut state = self.state.lock();
        if state.pending() {
            return;
        }
        let symbol_value = state.get(symbol).cloned().unwrap_or_else(MockValue::nil);
        let data_value = state.get(data).cloned().unwrap_or_else(MockValue::nil);
        state.ops.push(MockOp::Signal {
            symbol: symbol_value.to_string(),
            data: data_value,
        });
        state.exit = Some((FuncallExit::Signal, symbol, data));
    }

    fn non_local_exit_throw(&self, tag: RawValue, value: RawValue) {
        let mut state = self.state.lock();
        if state.pending() {
            return;
        }
        let tag_value = state.get(tag).cloned().unwrap_or_else(MockValue::nil);
        let thrown = state.get(value).cloned().unwrap_or_else(MockValue::nil);
        state.ops.push(MockOp::Throw {
            tag: tag_value.to_string(),
            value: thrown,
        });
        state.exit = Some((FuncallExit::Throw, tag, value));
    }

    fn type_of(&self, value: RawValue) -> RawValue {
        let mut state = self.state.lock();
        if state.pending() {
            return state.nil();
        }
        match state.get(value).map(MockValue::type_name) {
            Some(name) => state.intern(name),
            None => {
                state.wrong_type("valid-handle-p", None);
                state.nil()
            }
        }
    }

    fn is_not_nil(&self, value: RawValue) -> bool {
        let state = self.state.lock();
        state.get(value).is_some_and(|datum| !datum.is_nil())
    }

    fn eq(&self, a: RawValue, b: RawValue) -> bool {
        if a == b {
            return true;
        }
        let state = self.state.lock();
        match (state.get(a), state.get(b)) {
            (Some(MockValue::Symbol(x)), Some(MockValue::Symbol(y))) => x == y,
            (Some(MockValue::Int(x)), Some(MockValue::Int(y))) => x == y,
            _ => false,
        }
    }

    fn make_integer(&self, value: i64) -> RawValue {
        let mut state = self.state.lock();
        if state.pending() {
            return state.nil();
        }
        state.alloc(MockValue::Int(value))
    }

    fn extract_integer(&self, value: RawValue) -> i64 {
        let mut state = self.state.lock();
        if state.pending() {
            return 0;
        }
        match state.get(value).cloned() {
            Some(MockValue::Int(n)) => n,
            other => {
                state.wrong_type("integerp", other);
                0
            }
        }
    }

    fn make_float(&self, value: f64) -> RawValue {
        let mut state = self.state.lock();
        if state.pending() {
            return state.nil();
        }
        state.alloc(MockValue::Float(value))
    }

    fn extract_float(&self, value: RawValue) -> f64 {
        let mut state = self.state.lock();
        if state.pending() {
            return 0.0;
        }
        match state.get(value).cloned() {
            Some(MockValue::Float(x)) => x,
            other => {
                state.wrong_type("floatp", other);
                0.0
            }
        }
    }

    fn make_string(&self, contents: &str) -> RawValue {
        let mut state = self.state.lock();
        if state.pending() {
            return state.nil();
        }
        state.alloc(MockValue::string(contents))
    }

    fn copy_string_contents(&self, value: RawValue) -> Option<String> {
        let mut state = self.state.lock();
        if state.pending() {
            return None;
        }
        match state.get(value).cloned() {
            Some(MockValue::Str(text)) => Some(text),
            other => {
                state.wrong_type("stringp", other);
                None
            }
        }
    }
}
