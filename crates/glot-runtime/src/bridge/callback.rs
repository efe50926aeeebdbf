//! C-to-foreign trampolines.
//!
//! [`JitCallback`] synthesizes a native function whose signature matches a
//! method descriptor. When invoked, the function packs its arguments into
//! a cell buffer, forwards to the uniform handler, writes the cells back
//! (out-reference support) and materializes the handler's return value.

use crate::bridge::types::{
    default_hidden_param, read_cell, write_cell, HiddenParam, Parameters, RetStorage, ReturnValue,
    Signature, SlotKind,
};
use glot_manifest::Method;
use libffi::{low, raw};
use std::ffi::c_void;
use std::ptr;

/// The uniform handler every generated callback forwards to.
pub type CallbackHandler = unsafe extern "C" fn(
    method: *const Method,
    data: *mut c_void,
    params: *mut Parameters,
    count: u8,
    ret: *mut ReturnValue,
);

struct CallbackCtx {
    method: Method,
    data: *mut c_void,
    handler: CallbackHandler,
    sig: *const Signature,
}

/// Owns one generated callback trampoline; the code is released on drop.
pub struct JitCallback {
    signature: Option<Box<Signature>>,
    ctx: Option<Box<CallbackCtx>>,
    closure: *mut raw::ffi_closure,
    code: *mut c_void,
    error: Option<String>,
}

impl Default for JitCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl JitCallback {
    pub fn new() -> Self {
        JitCallback {
            signature: None,
            ctx: None,
            closure: ptr::null_mut(),
            code: ptr::null_mut(),
            error: None,
        }
    }

    /// Generate (or return the already generated) native function for
    /// `method`, using the platform's hidden-return rule.
    ///
    /// Returns null when generation fails; the reason is in [`Self::error`].
    pub fn get_jit_func(
        &mut self,
        method: &Method,
        handler: CallbackHandler,
        data: *mut c_void,
    ) -> *const c_void {
        self.get_jit_func_with_hidden(method, handler, data, default_hidden_param)
    }

    /// Same as [`Self::get_jit_func`] with a caller-supplied hidden-return
    /// predicate.
    pub fn get_jit_func_with_hidden(
        &mut self,
        method: &Method,
        handler: CallbackHandler,
        data: *mut c_void,
        hidden: HiddenParam,
    ) -> *const c_void {
        if !self.code.is_null() {
            return self.code;
        }

        let is_hidden = hidden(method.ret_type.value_type);
        let mut signature = match Signature::from_method(method, is_hidden) {
            Ok(signature) => signature,
            Err(e) => {
                self.error = Some(e.to_string());
                return ptr::null();
            }
        };

        let ctx = Box::new(CallbackCtx {
            method: method.clone(),
            data,
            handler,
            sig: &*signature as *const Signature,
        });

        let (closure, code) = low::closure_alloc();
        if closure.is_null() {
            self.error = Some("closure allocation failed".to_string());
            return ptr::null();
        }

        let prepared = unsafe {
            low::prep_closure(
                closure,
                signature.cif_ptr(),
                callback_trampoline,
                &*ctx as *const CallbackCtx,
                code,
            )
        };
        if let Err(e) = prepared {
            unsafe { low::closure_free(closure) };
            self.error = Some(format!("ffi_prep_closure failed: {:?}", e));
            return ptr::null();
        }

        self.signature = Some(signature);
        self.ctx = Some(ctx);
        self.closure = closure;
        self.code = code.0 as *mut c_void;
        self.code
    }

    /// The generated function, or null when generation failed or has not
    /// happened yet.
    pub fn function(&self) -> *const c_void {
        self.code
    }

    pub fn user_data(&self) -> *mut c_void {
        self.ctx.as_ref().map_or(ptr::null_mut(), |ctx| ctx.data)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Drop for JitCallback {
    fn drop(&mut self) {
        if !self.closure.is_null() {
            unsafe { low::closure_free(self.closure) };
            self.closure = ptr::null_mut();
        }
    }
}

unsafe extern "C" fn callback_trampoline(
    _cif: &raw::ffi_cif,
    result: &mut RetStorage,
    args: *const *const c_void,
    ctx: &CallbackCtx,
) {
    let sig = &*ctx.sig;
    let count = sig.arg_kinds.len();

    // Pack incoming arguments into word-sized cells.
    let mut cells: Vec<u64> = vec![0; count.max(1)];
    for (i, kind) in sig.arg_kinds.iter().enumerate() {
        cells[i] = read_cell(*args.add(i), *kind);
    }

    let mut ret = RetStorage::default();
    (ctx.handler)(
        &ctx.method,
        ctx.data,
        cells.as_mut_ptr() as *mut Parameters,
        count as u8,
        &mut ret as *mut RetStorage as *mut ReturnValue,
    );

    // Write the cells back so out-references written by the handler reach
    // the native arguments.
    for (i, kind) in sig.arg_kinds.iter().enumerate() {
        write_cell(*args.add(i) as *mut c_void, *kind, cells[i]);
    }

    if sig.hidden {
        // Callee-writes-through-pointer convention: the hidden pointer is
        // also the return value.
        result.0[0] = cells[0];
        return;
    }
    match sig.ret_kind {
        SlotKind::Void => {}
        SlotKind::Agg(size) => {
            ptr::copy_nonoverlapping(
                ret.0.as_ptr() as *const u8,
                result as *mut RetStorage as *mut u8,
                size,
            );
        }
        _ => result.0[0] = ret.0[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::types::JitError;
    use glot_manifest::{Property, ValueType};
    use std::mem;

    fn method_of(params: &[ValueType], ret: ValueType) -> Method {
        Method {
            name: "test".into(),
            param_types: params.iter().map(|&t| Property::new(t)).collect(),
            ret_type: Property::new(ret),
            ..Default::default()
        }
    }

    unsafe extern "C" fn echo_first_handler(
        _method: *const Method,
        _data: *mut c_void,
        params: *mut Parameters,
        count: u8,
        ret: *mut ReturnValue,
    ) {
        assert!(count >= 1);
        let cell: u64 = Parameters::get_arg(params, 0);
        ReturnValue::set(ret, cell);
    }

    unsafe extern "C" fn sum_handler(
        _method: *const Method,
        data: *mut c_void,
        params: *mut Parameters,
        _count: u8,
        ret: *mut ReturnValue,
    ) {
        let a: i32 = Parameters::get_arg(params, 0);
        let b: i32 = Parameters::get_arg(params, 1);
        *(data as *mut i32) = a + b;
        ReturnValue::set(ret, a + b);
    }

    unsafe extern "C" fn out_ref_handler(
        _method: *const Method,
        _data: *mut c_void,
        params: *mut Parameters,
        _count: u8,
        _ret: *mut ReturnValue,
    ) {
        let out: *mut i64 = Parameters::get_arg(params, 0);
        *out = 99;
    }

    #[test]
    fn int_callback_round_trips() {
        let method = method_of(&[ValueType::Int64], ValueType::Int64);
        let mut callback = JitCallback::new();
        let code = callback.get_jit_func(&method, echo_first_handler, ptr::null_mut());
        assert!(!code.is_null(), "error: {:?}", callback.error());

        let f: unsafe extern "C" fn(i64) -> i64 = unsafe { mem::transmute(code) };
        assert_eq!(unsafe { f(-123456789) }, -123456789);
        assert_eq!(unsafe { f(i64::MAX) }, i64::MAX);
    }

    #[test]
    fn float_callback_round_trips() {
        let method = method_of(&[ValueType::Double], ValueType::Double);
        let mut callback = JitCallback::new();
        let code = callback.get_jit_func(&method, echo_first_handler, ptr::null_mut());
        assert!(!code.is_null(), "error: {:?}", callback.error());

        let f: unsafe extern "C" fn(f64) -> f64 = unsafe { mem::transmute(code) };
        assert_eq!(unsafe { f(3.25) }, 3.25);
    }

    #[test]
    fn mixed_arguments_reach_the_handler() {
        let method = method_of(&[ValueType::Int32, ValueType::Int32], ValueType::Int32);
        let mut callback = JitCallback::new();
        let mut seen: i32 = 0;
        let code = callback.get_jit_func(&method, sum_handler, &mut seen as *mut i32 as *mut c_void);
        assert!(!code.is_null());

        let f: unsafe extern "C" fn(i32, i32) -> i32 = unsafe { mem::transmute(code) };
        assert_eq!(unsafe { f(40, 2) }, 42);
        assert_eq!(seen, 42);
    }

    #[test]
    fn by_reference_out_parameter_is_written() {
        let method = Method {
            name: "out".into(),
            param_types: vec![Property {
                value_type: ValueType::Int64,
                by_reference: true,
                prototype: None,
            }],
            ret_type: Property::new(ValueType::Void),
            ..Default::default()
        };
        let mut callback = JitCallback::new();
        let code = callback.get_jit_func(&method, out_ref_handler, ptr::null_mut());
        assert!(!code.is_null());

        let f: unsafe extern "C" fn(*mut i64) = unsafe { mem::transmute(code) };
        let mut value: i64 = 0;
        unsafe { f(&mut value) };
        assert_eq!(value, 99);
    }

    #[test]
    fn generation_is_idempotent() {
        let method = method_of(&[ValueType::Int32], ValueType::Int32);
        let mut callback = JitCallback::new();
        let first = callback.get_jit_func(&method, echo_first_handler, ptr::null_mut());
        let second = callback.get_jit_func(&method, echo_first_handler, ptr::null_mut());
        assert_eq!(first, second);
    }

    #[test]
    fn wide_parameter_fails_with_captured_error() {
        let method = method_of(&[ValueType::Vector4], ValueType::Void);
        let mut callback = JitCallback::new();
        let code = callback.get_jit_func(&method, echo_first_handler, ptr::null_mut());
        assert!(code.is_null());
        assert_eq!(
            callback.error(),
            Some(JitError::UnsupportedWidth.to_string().as_str())
        );
        assert!(callback.function().is_null());
    }
}
