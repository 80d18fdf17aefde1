//! `Host` implementation over a raw `emacs_env` pointer

use core::ffi::{c_char, CStr};
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use super::{
    emacs_env, emacs_funcall_exit, emacs_runtime, emacs_value, EMACS_FUNCALL_EXIT_RETURN,
    EMACS_FUNCALL_EXIT_SIGNAL,
};
use crate::host::{FuncallExit, Host, RawValue};
use crate::logging::{debug, warn};

type MakeGlobalRef = unsafe extern "C" fn(*mut emacs_env, emacs_value) -> emacs_value;
type FreeGlobalRef = unsafe extern "C" fn(*mut emacs_env, emacs_value);
type ExitCheck = unsafe extern "C" fn(*mut emacs_env) -> emacs_funcall_exit;
type ExitClear = unsafe extern "C" fn(*mut emacs_env);
type ExitGet =
    unsafe extern "C" fn(*mut emacs_env, *mut emacs_value, *mut emacs_value) -> emacs_funcall_exit;
type ExitRaise = unsafe extern "C" fn(*mut emacs_env, emacs_value, emacs_value);
type Funcall = unsafe extern "C" fn(*mut emacs_env, emacs_value, isize, *mut emacs_value) -> emacs_value;
type Intern = unsafe extern "C" fn(*mut emacs_env, *const c_char) -> emacs_value;
type TypeOf = unsafe extern "C" fn(*mut emacs_env, emacs_value) -> emacs_value;
type Predicate = unsafe extern "C" fn(*mut emacs_env, emacs_value) -> bool;
type Eq = unsafe extern "C" fn(*mut emacs_env, emacs_value, emacs_value) -> bool;
type ExtractInteger = unsafe extern "C" fn(*mut emacs_env, emacs_value) -> i64;
type MakeInteger = unsafe extern "C" fn(*mut emacs_env, i64) -> emacs_value;
type ExtractFloat = unsafe extern "C" fn(*mut emacs_env, emacs_value) -> f64;
type MakeFloat = unsafe extern "C" fn(*mut emacs_env, f64) -> emacs_value;
type CopyString = unsafe extern "C" fn(*mut emacs_env, emacs_value, *mut c_char, *mut isize) -> bool;
type MakeString = unsafe extern "C" fn(*mut emacs_env, *const c_char, isize) -> emacs_value;

/// Function table resolved once per env
#[derive(Clone, Copy)]
struct Table {
    make_global_ref: MakeGlobalRef,
    free_global_ref: FreeGlobalRef,
    non_local_exit_check: ExitCheck,
    non_local_exit_clear: ExitClear,
    non_local_exit_get: ExitGet,
    non_local_exit_signal: ExitRaise,
    non_local_exit_throw: ExitRaise,
    funcall: Funcall,
    intern: Intern,
    type_of: TypeOf,
    is_not_nil: Predicate,
    eq: Eq,
    extract_integer: ExtractInteger,
    make_integer: MakeInteger,
    extract_float: ExtractFloat,
    make_float: MakeFloat,
    copy_string_contents: CopyString,
    make_string: MakeString,
}

impl Table {
    fn resolve(env: &emacs_env) -> Option<Self> {
        Some(Self {
            make_global_ref: env.make_global_ref?,
            free_global_ref: env.free_global_ref?,
            non_local_exit_check: env.non_local_exit_check?,
            non_local_exit_clear: env.non_local_exit_clear?,
            non_local_exit_get: env.non_local_exit_get?,
            non_local_exit_signal: env.non_local_exit_signal?,
            non_local_exit_throw: env.non_local_exit_throw?,
            funcall: env.funcall?,
            intern: env.intern?,
            type_of: env.type_of?,
            is_not_nil: env.is_not_nil?,
            eq: env.eq?,
            extract_integer: env.extract_integer?,
            make_integer: env.make_integer?,
            extract_float: env.extract_float?,
            make_float: env.make_float?,
            copy_string_contents: env.copy_string_contents?,
            make_string: env.make_string?,
        })
    }
}

/// Borrowed view of the env the host passed to one entry call
pub struct RawEnv<'h> {
    raw: NonNull<emacs_env>,
    table: Table,
    _scope: PhantomData<&'h mut emacs_env>,
}

impl<'h> RawEnv<'h> {
    /// Wrap the env pointer handed to a module function
    ///
    /// # Safety
    /// `raw` must be the env the host passed to the currently running
    /// entry point, and `'h` must not outlive that call.
    pub unsafe fn from_raw(raw: *mut emacs_env) -> Option<Self> {
        let raw = NonNull::new(raw)?;
        let env = raw.as_ref();

        if (env.size as usize) < core::mem::size_of::<emacs_env>() {
            warn!(
                size = env.size,
                expected = core::mem::size_of::<emacs_env>(),
                "emacs_env is smaller than the supported ABI"
            );
            return None;
        }

        let table = Table::resolve(env)?;
        debug!(env = ?raw, "bound raw emacs_env");

        Some(Self {
            raw,
            table,
            _scope: PhantomData,
        })
    }

    /// Fetch the env from the runtime passed to `emacs_module_init`
    ///
    /// # Safety
    /// `runtime` must be the live runtime pointer of the current
    /// initialization call.
    pub unsafe fn from_runtime(runtime: *mut emacs_runtime) -> Option<Self> {
        let runtime = NonNull::new(runtime)?;
        let get_environment = runtime.as_ref().get_environment?;
        Self::from_raw(get_environment(runtime.as_ptr()))
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut emacs_env {
        self.raw.as_ptr()
    }
}

impl Host for RawEnv<'_> {
    fn intern(&self, name: &CStr) -> RawValue {
        unsafe { RawValue::from_ptr((self.table.intern)(self.as_ptr(), name.as_ptr())) }
    }

    fn funcall(&self, function: RawValue, args: &[RawValue]) -> RawValue {
        // The host never writes through `args`; RawValue is repr(transparent).
        let argv = args.as_ptr() as *mut emacs_value;
        unsafe {
            RawValue::from_ptr((self.table.funcall)(
                self.as_ptr(),
                function.as_ptr(),
                args.len() as isize,
                argv,
            ))
        }
    }

    fn make_global_ref(&self, value: RawValue) -> RawValue {
        unsafe { RawValue::from_ptr((self.table.make_global_ref)(self.as_ptr(), value.as_ptr())) }
    }

    fn free_global_ref(&self, value: RawValue) {
        unsafe { (self.table.free_global_ref)(self.as_ptr(), value.as_ptr()) }
    }

    fn non_local_exit_check(&self) -> FuncallExit {
        exit_from_code(unsafe { (self.table.non_local_exit_check)(self.as_ptr()) })
    }

    fn non_local_exit_get(&self) -> (FuncallExit, RawValue, RawValue) {
        let mut symbol: emacs_value = ptr::null_mut();
        let mut data: emacs_value = ptr::null_mut();
        let code = unsafe { (self.table.non_local_exit_get)(self.as_ptr(), &mut symbol, &mut data) };
        (
            exit_from_code(code),
            RawValue::from_ptr(symbol),
            RawValue::from_ptr(data),
        )
    }

    fn non_local_exit_clear(&self) {
        unsafe { (self.table.non_local_exit_clear)(self.as_ptr()) }
    }

    fn non_local_exit_signal(&self, symbol: RawValue, data: RawValue) {
        unsafe { (self.table.non_local_exit_signal)(self.as_ptr(), symbol.as_ptr(), data.as_ptr()) }
    }

    fn non_local_exit_throw(&self, tag: RawValue, value: RawValue) {
        unsafe { (self.table.non_local_exit_throw)(self.as_ptr(), tag.as_ptr(), value.as_ptr()) }
    }

    fn type_of(&self, value: RawValue) -> RawValue {
        unsafe { RawValue::from_ptr((self.table.type_of)(self.as_ptr(), value.as_ptr())) }
    }

    fn is_not_nil(&self, value: RawValue) -> bool {
        unsafe { (self.table.is_not_nil)(self.as_ptr(), value.as_ptr()) }
    }

    fn eq(&self, a: RawValue, b: RawValue) -> bool {
        unsafe { (self.table.eq)(self.as_ptr(), a.as_ptr(), b.as_ptr()) }
    }

    fn make_integer(&self, value: i64) -> RawValue {
        unsafe { RawValue::from_ptr((self.table.make_integer)(self.as_ptr(), value)) }
    }

    fn extract_integer(&self, value: RawValue) -> i64 {
        unsafe { (self.table.extract_integer)(self.as_ptr(), value.as_ptr()) }
    }

    fn make_float(&self, value: f64) -> RawValue {
        unsafe { RawValue::from_ptr((self.table.make_float)(self.as_ptr(), value)) }
    }

    fn extract_float(&self, value: RawValue) -> f64 {
        unsafe { (self.table.extract_float)(self.as_ptr(), value.as_ptr()) }
    }

    fn make_string(&self, contents: &str) -> RawValue {
        unsafe {
            RawValue::from_ptr((self.table.make_string)(
                self.as_ptr(),
                contents.as_ptr() as *const c_char,
                contents.len() as isize,
            ))
        }
    }

    fn copy_string_contents(&self, value: RawValue) -> Option<String> {
        // First call reports the required size including the trailing NUL.
        let mut size: isize = 0;
        let sized = unsafe {
            (self.table.copy_string_contents)(self.as_ptr(), value.as_ptr(), ptr::null_mut(), &mut size)
        };
        if !sized || size <= 0 {
            return None;
        }

        let mut buffer = vec![0u8; size as usize];
        let copied = unsafe {
            (self.table.copy_string_contents)(
                self.as_ptr(),
                value.as_ptr(),
                buffer.as_mut_ptr() as *mut c_char,
                &mut size,
            )
        };
        if !copied {
            return None;
        }

        buffer.truncate((size as usize).saturating_sub(1));
        Some(match String::from_utf8(buffer) {
            Ok(text) => text,
            Err(invalid) => String::from_utf8_lossy(invalid.as_bytes()).into_owned(),
        })
    }
}

#[inline]
fn exit_from_code(code: emacs_funcall_exit) -> FuncallExit {
    match code {
        EMACS_FUNCALL_EXIT_RETURN => FuncallExit::Return,
        EMACS_FUNCALL_EXIT_SIGNAL => FuncallExit::Signal,
        _ => FuncallExit::Throw,
    }
}
