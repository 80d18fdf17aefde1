//! C FFI - the Emacs dynamic module ABI
//!
//! Design: hand-written `#[repr(C)]` mirror of `emacs-module.h`:
//! 1. Layout of `emacs_runtime` and the version 25 prefix of `emacs_env`
//!    (later versions only append fields)
//! 2. `RawEnv`, the [`Host`](crate::Host) adapter over a raw env pointer

#![allow(non_camel_case_types)]

mod raw_env;

pub use raw_env::RawEnv;

use core::ffi::{c_char, c_int, c_void};

/// Opaque host datum
#[repr(C)]
pub struct emacs_value_tag {
    _private: [u8; 0],
}

pub type emacs_value = *mut emacs_value_tag;

pub type emacs_funcall_exit = c_int;
pub const EMACS_FUNCALL_EXIT_RETURN: emacs_funcall_exit = 0;
pub const EMACS_FUNCALL_EXIT_SIGNAL: emacs_funcall_exit = 1;
pub const EMACS_FUNCALL_EXIT_THROW: emacs_funcall_exit = 2;

#[repr(C)]
pub struct emacs_env_private {
    _private: [u8; 0],
}

#[repr(C)]
pub struct emacs_runtime_private {
    _private: [u8; 0],
}

pub type emacs_subr = unsafe extern "C" fn(
    env: *mut emacs_env,
    nargs: isize,
    args: *mut emacs_value,
    data: *mut c_void,
) -> emacs_value;

pub type emacs_finalizer = unsafe extern "C" fn(data: *mut c_void);

#[repr(C)]
pub struct emacs_runtime {
    pub size: isize,
    pub private_members: *mut emacs_runtime_private,
    pub get_environment: Option<unsafe extern "C" fn(runtime: *mut emacs_runtime) -> *mut emacs_env>,
}

#[repr(C)]
pub struct emacs_env {
    pub size: isize,
    pub private_members: *mut emacs_env_private,

    pub make_global_ref: Option<unsafe extern "C" fn(env: *mut emacs_env, value: emacs_value) -> emacs_value>,
    pub free_global_ref: Option<unsafe extern "C" fn(env: *mut emacs_env, global_value: emacs_value)>,

    pub non_local_exit_check: Option<unsafe extern "C" fn(env: *mut emacs_env) -> emacs_funcall_exit>,
    pub non_local_exit_clear: Option<unsafe extern "C" fn(env: *mut emacs_env)>,
    pub non_local_exit_get: Option<
        unsafe extern "C" fn(
            env: *mut emacs_env,
            symbol: *mut emacs_value,
            data: *mut emacs_value,
        ) -> emacs_funcall_exit,
    >,
    pub non_local_exit_signal:
        Option<unsafe extern "C" fn(env: *mut emacs_env, symbol: emacs_value, data: emacs_value)>,
    pub non_local_exit_throw:
        Option<unsafe extern "C" fn(env: *mut emacs_env, tag: emacs_value, value: emacs_value)>,

    pub make_function: Option<
        unsafe extern "C" fn(
            env: *mut emacs_env,
            min_arity: isize,
            max_arity: isize,
            function: Option<emacs_subr>,
            documentation: *const c_char,
            data: *mut c_void,
        ) -> emacs_value,
    >,
    pub funcall: Option<
        unsafe extern "C" fn(
            env: *mut emacs_env,
            function: emacs_value,
            nargs: isize,
            args: *mut emacs_value,
        ) -> emacs_value,
    >,
    pub intern: Option<unsafe extern "C" fn(env: *mut emacs_env, name: *const c_char) -> emacs_value>,

    pub type_of: Option<unsafe extern "C" fn(env: *mut emacs_env, value: emacs_value) -> emacs_value>,
    pub is_not_nil: Option<unsafe extern "C" fn(env: *mut emacs_env, value: emacs_value) -> bool>,
    pub eq: Option<unsafe extern "C" fn(env: *mut emacs_env, a: emacs_value, b: emacs_value) -> bool>,

    pub extract_integer: Option<unsafe extern "C" fn(env: *mut emacs_env, value: emacs_value) -> i64>,
    pub make_integer: Option<unsafe extern "C" fn(env: *mut emacs_env, value: i64) -> emacs_value>,
    pub extract_float: Option<unsafe extern "C" fn(env: *mut emacs_env, value: emacs_value) -> f64>,
    pub make_float: Option<unsafe extern "C" fn(env: *mut emacs_env, value: f64) -> emacs_value>,

    pub copy_string_contents: Option<
        unsafe extern "C" fn(
            env: *mut emacs_env,
            value: emacs_value,
            buffer: *mut c_char,
            size_inout: *mut isize,
        ) -> bool,
    >,
    pub make_string: Option<
        unsafe extern "C" fn(env: *mut emacs_env, contents: *const c_char, length: isize) -> emacs_value,
    >,

    pub make_user_ptr: Option<
        unsafe extern "C" fn(
            env: *mut emacs_env,
            fin: Option<emacs_finalizer>,
            ptr: *mut c_void,
        ) -> emacs_value,
    >,
    pub get_user_ptr: Option<unsafe extern "C" fn(env: *mut emacs_env, uptr: emacs_value) -> *mut c_void>,
    pub set_user_ptr: Option<unsafe extern "C" fn(env: *mut emacs_env, uptr: emacs_value, ptr: *mut c_void)>,
    pub get_user_finalizer:
        Option<unsafe extern "C" fn(env: *mut emacs_env, uptr: emacs_value) -> Option<emacs_finalizer>>,
    pub set_user_finalizer: Option<
        unsafe extern "C" fn(env: *mut emacs_env, uptr: emacs_value, fin: Option<emacs_finalizer>),
    >,

    pub vec_get: Option<unsafe extern "C" fn(env: *mut emacs_env, vec: emacs_value, i: isize) -> emacs_value>,
    pub vec_set:
        Option<unsafe extern "C" fn(env: *mut emacs_env, vec: emacs_value, i: isize, val: emacs_value)>,
    pub vec_size: Option<unsafe extern "C" fn(env: *mut emacs_env, vec: emacs_value) -> isize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_layout_is_pointer_table() {
        // size + private + 27 function pointers
        let word = core::mem::size_of::<usize>();
        assert_eq!(core::mem::size_of::<emacs_env>(), 29 * word);
        assert_eq!(core::mem::size_of::<emacs_runtime>(), 3 * word);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EMACS_FUNCALL_EXIT_RETURN, 0);
        assert_eq!(EMACS_FUNCALL_EXIT_SIGNAL, 1);
        assert_eq!(EMACS_FUNCALL_EXIT_THROW, 2);
    }
}
