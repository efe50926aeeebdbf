//! Foreign-to-C trampolines.
//!
//! [`JitCall`] synthesizes a uniform `fn(params, ret)` entry that unpacks
//! a cell buffer according to the target method's signature, performs the
//! native call and packs the return value back.

use crate::bridge::types::{
    default_hidden_param, HiddenParam, Parameters, RetStorage, ReturnValue, Signature, SlotKind,
};
use glot_manifest::Method;
use libffi::{low, raw};
use std::ffi::c_void;
use std::ptr;

/// Signature of the generated uniform entry.
pub type CallFunction = unsafe extern "C" fn(params: *mut Parameters, ret: *mut ReturnValue);

struct CallCtx {
    target: *mut c_void,
    sig: *mut Signature,
}

/// Owns one generated call trampoline; the code is released on drop.
pub struct JitCall {
    target_sig: Option<Box<Signature>>,
    uniform_sig: Option<Box<Signature>>,
    ctx: Option<Box<CallCtx>>,
    closure: *mut raw::ffi_closure,
    code: *mut c_void,
    error: Option<String>,
}

impl Default for JitCall {
    fn default() -> Self {
        Self::new()
    }
}

impl JitCall {
    pub fn new() -> Self {
        JitCall {
            target_sig: None,
            uniform_sig: None,
            ctx: None,
            closure: ptr::null_mut(),
            code: ptr::null_mut(),
            error: None,
        }
    }

    /// Generate (or return the already generated) uniform entry invoking
    /// `target` with `method`'s signature.
    ///
    /// For hidden returns the caller places the destination pointer in
    /// cell 0, ahead of the regular arguments.
    pub fn get_jit_func(&mut self, method: &Method, target: *const c_void) -> *const c_void {
        self.get_jit_func_with_hidden(method, target, default_hidden_param)
    }

    /// Same as [`Self::get_jit_func`] with a caller-supplied hidden-return
    /// predicate.
    pub fn get_jit_func_with_hidden(
        &mut self,
        method: &Method,
        target: *const c_void,
        hidden: HiddenParam,
    ) -> *const c_void {
        if !self.code.is_null() {
            return self.code;
        }

        let is_hidden = hidden(method.ret_type.value_type);
        let mut target_sig = match Signature::from_method(method, is_hidden) {
            Ok(signature) => signature,
            Err(e) => {
                self.error = Some(e.to_string());
                return ptr::null();
            }
        };
        let mut uniform_sig = match Signature::uniform() {
            Ok(signature) => signature,
            Err(e) => {
                self.error = Some(e.to_string());
                return ptr::null();
            }
        };

        let ctx = Box::new(CallCtx {
            target: target as *mut c_void,
            sig: &mut *target_sig as *mut Signature,
        });

        let (closure, code) = low::closure_alloc();
        if closure.is_null() {
            self.error = Some("closure allocation failed".to_string());
            return ptr::null();
        }

        let prepared = unsafe {
            low::prep_closure(
                closure,
                uniform_sig.cif_ptr(),
                call_trampoline,
                &*ctx as *const CallCtx,
                code,
            )
        };
        if let Err(e) = prepared {
            unsafe { low::closure_free(closure) };
            self.error = Some(format!("ffi_prep_closure failed: {:?}", e));
            return ptr::null();
        }

        self.target_sig = Some(target_sig);
        self.uniform_sig = Some(uniform_sig);
        self.ctx = Some(ctx);
        self.closure = closure;
        self.code = code.0 as *mut c_void;
        self.code
    }

    /// The generated entry as a typed function pointer, when available.
    pub fn function(&self) -> Option<CallFunction> {
        if self.code.is_null() {
            None
        } else {
            Some(unsafe { std::mem::transmute::<*mut c_void, CallFunction>(self.code) })
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Drop for JitCall {
    fn drop(&mut self) {
        if !self.closure.is_null() {
            unsafe { low::closure_free(self.closure) };
            self.closure = ptr::null_mut();
        }
    }
}

unsafe extern "C" fn call_trampoline(
    _cif: &raw::ffi_cif,
    _result: &mut u64,
    args: *const *const c_void,
    ctx: &CallCtx,
) {
    let params = *(*args.add(0) as *const *mut u64);
    let ret = *(*args.add(1) as *const *mut u64);

    let sig = &mut *ctx.sig;
    let count = sig.arg_kinds.len();

    // Each cell already holds its value in native layout; hand libffi a
    // pointer per slot.
    let mut avalues: Vec<*mut c_void> = (0..count).map(|i| params.add(i) as *mut c_void).collect();

    let mut storage = RetStorage::default();
    raw::ffi_call(
        sig.cif_ptr(),
        Some(std::mem::transmute::<*mut c_void, unsafe extern "C" fn()>(
            ctx.target,
        )),
        &mut storage as *mut RetStorage as *mut c_void,
        avalues.as_mut_ptr(),
    );

    if !ret.is_null() {
        match sig.ret_kind {
            SlotKind::Void => {}
            SlotKind::Agg(size) => {
                ptr::copy_nonoverlapping(storage.0.as_ptr() as *const u8, ret as *mut u8, size);
            }
            _ => *ret = storage.0[0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::types::{CellBuffer, JitError, ReturnBuffer};
    use glot_manifest::{Property, ValueType};

    fn method_of(params: &[ValueType], ret: ValueType) -> Method {
        Method {
            name: "test".into(),
            param_types: params.iter().map(|&t| Property::new(t)).collect(),
            ret_type: Property::new(ret),
            ..Default::default()
        }
    }

    extern "C" fn echo_i8(x: i8) -> i8 {
        x
    }
    extern "C" fn echo_i16(x: i16) -> i16 {
        x
    }
    extern "C" fn echo_i32(x: i32) -> i32 {
        x
    }
    extern "C" fn echo_i64(x: i64) -> i64 {
        x
    }
    extern "C" fn echo_u8(x: u8) -> u8 {
        x
    }
    extern "C" fn echo_u16(x: u16) -> u16 {
        x
    }
    extern "C" fn echo_u32(x: u32) -> u32 {
        x
    }
    extern "C" fn echo_u64(x: u64) -> u64 {
        x
    }
    extern "C" fn echo_f32(x: f32) -> f32 {
        x
    }
    extern "C" fn echo_f64(x: f64) -> f64 {
        x
    }
    extern "C" fn echo_ptr(x: *const c_void) -> *const c_void {
        x
    }
    extern "C" fn add3(a: i32, b: i64, c: f64) -> f64 {
        a as f64 + b as f64 + c
    }

    fn invoke<T: Copy, R: Copy>(method: &Method, target: *const c_void, arg: T) -> R {
        let mut call = JitCall::new();
        let code = call.get_jit_func(method, target);
        assert!(!code.is_null(), "error: {:?}", call.error());
        let f = call.function().unwrap();

        let mut params = CellBuffer::new(method.param_types.len());
        params.set(0, arg);
        let mut ret = ReturnBuffer::new();
        unsafe { f(params.as_params(), ret.as_ret()) };
        ret.get::<R>()
    }

    #[test]
    fn scalar_round_trips_are_bitwise() {
        let m = method_of(&[ValueType::Int8], ValueType::Int8);
        assert_eq!(invoke::<i8, i8>(&m, echo_i8 as *const c_void, -5), -5);

        let m = method_of(&[ValueType::Int16], ValueType::Int16);
        assert_eq!(
            invoke::<i16, i16>(&m, echo_i16 as *const c_void, -3000),
            -3000
        );

        let m = method_of(&[ValueType::Int32], ValueType::Int32);
        assert_eq!(
            invoke::<i32, i32>(&m, echo_i32 as *const c_void, 123456),
            123456
        );

        let m = method_of(&[ValueType::Int64], ValueType::Int64);
        assert_eq!(
            invoke::<i64, i64>(&m, echo_i64 as *const c_void, i64::MIN + 1),
            i64::MIN + 1
        );

        let m = method_of(&[ValueType::UInt8], ValueType::UInt8);
        assert_eq!(invoke::<u8, u8>(&m, echo_u8 as *const c_void, 0xFE), 0xFE);

        let m = method_of(&[ValueType::UInt16], ValueType::UInt16);
        assert_eq!(
            invoke::<u16, u16>(&m, echo_u16 as *const c_void, 0xFFF0),
            0xFFF0
        );

        let m = method_of(&[ValueType::UInt32], ValueType::UInt32);
        assert_eq!(
            invoke::<u32, u32>(&m, echo_u32 as *const c_void, 0xDEAD_BEEF),
            0xDEAD_BEEF
        );

        let m = method_of(&[ValueType::UInt64], ValueType::UInt64);
        assert_eq!(
            invoke::<u64, u64>(&m, echo_u64 as *const c_void, u64::MAX),
            u64::MAX
        );

        let m = method_of(&[ValueType::Float], ValueType::Float);
        let out: f32 = invoke::<f32, f32>(&m, echo_f32 as *const c_void, 1.5e-3);
        assert_eq!(out.to_bits(), (1.5e-3f32).to_bits());

        let m = method_of(&[ValueType::Double], ValueType::Double);
        let out: f64 = invoke::<f64, f64>(&m, echo_f64 as *const c_void, -2.25);
        assert_eq!(out.to_bits(), (-2.25f64).to_bits());

        let m = method_of(&[ValueType::Pointer], ValueType::Pointer);
        let marker = 0xDEAD_BEEFusize as *const c_void;
        assert_eq!(
            invoke::<*const c_void, *const c_void>(&m, echo_ptr as *const c_void, marker),
            marker
        );
    }

    #[test]
    fn mixed_signature_calls_through() {
        let method = method_of(
            &[ValueType::Int32, ValueType::Int64, ValueType::Double],
            ValueType::Double,
        );
        let mut call = JitCall::new();
        let code = call.get_jit_func(&method, add3 as *const c_void);
        assert!(!code.is_null(), "error: {:?}", call.error());
        let f = call.function().unwrap();

        let mut params = CellBuffer::new(3);
        params.set(0, 1i32);
        params.set(1, 2i64);
        params.set(2, 0.5f64);
        let mut ret = ReturnBuffer::new();
        unsafe { f(params.as_params(), ret.as_ret()) };
        assert_eq!(ret.get::<f64>(), 3.5);
    }

    #[test]
    fn wide_parameter_is_rejected() {
        let method = method_of(&[ValueType::Matrix4x4], ValueType::Void);
        let mut call = JitCall::new();
        let code = call.get_jit_func(&method, echo_i32 as *const c_void);
        assert!(code.is_null());
        assert_eq!(
            call.error(),
            Some(JitError::UnsupportedWidth.to_string().as_str())
        );
        assert!(call.function().is_none());
    }

    #[test]
    fn generation_is_idempotent() {
        let method = method_of(&[ValueType::Int32], ValueType::Int32);
        let mut call = JitCall::new();
        let first = call.get_jit_func(&method, echo_i32 as *const c_void);
        let second = call.get_jit_func(&method, echo_i32 as *const c_void);
        assert_eq!(first, second);
    }
}
