//! Value classification and cell buffers shared by both trampoline kinds.

use glot_manifest::{CallingConvention, Method, Property, ValueType};
use libffi::{low, middle, raw};
use std::ffi::c_void;
use std::ptr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JitError {
    #[error("Parameters wider than 64 bits not supported")]
    UnsupportedWidth,

    #[error("Void is not a valid parameter type")]
    VoidParameter,

    #[error("Return type requires a hidden parameter")]
    HiddenReturnRequired,

    #[error("Variadic boundary {0} exceeds parameter count {1}")]
    BadVariadicIndex(u8, usize),

    #[error("Codegen backend error: {0}")]
    Backend(String),
}

/// Storage class of one argument or return cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Void,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    Ptr,
    /// By-value aggregate return of the given byte size (never a parameter).
    Agg(usize),
}

/// Decides whether a return type is delivered through a hidden leading
/// pointer parameter instead of registers.
pub type HiddenParam = fn(ValueType) -> bool;

/// The default ABI rule: objects always, 96/128-bit vectors only where the
/// platform ABI says so.
pub fn default_hidden_param(ty: ValueType) -> bool {
    match ty {
        ValueType::String | ValueType::Matrix4x4 => true,
        ValueType::Vector3 | ValueType::Vector4 => cfg!(windows),
        _ => ty.is_array(),
    }
}

pub(crate) fn classify_param(prop: &Property) -> Result<SlotKind, JitError> {
    if prop.by_reference {
        return Ok(SlotKind::Ptr);
    }
    match prop.value_type {
        ValueType::Void => Err(JitError::VoidParameter),
        ValueType::Bool | ValueType::Char8 | ValueType::Int8 | ValueType::UInt8 => Ok(SlotKind::S8),
        ValueType::Char16 | ValueType::Int16 | ValueType::UInt16 => Ok(SlotKind::S16),
        ValueType::Int32 | ValueType::UInt32 => Ok(SlotKind::S32),
        ValueType::Int64 | ValueType::UInt64 => Ok(SlotKind::S64),
        ValueType::Pointer | ValueType::Function => Ok(SlotKind::Ptr),
        ValueType::Float => Ok(SlotKind::F32),
        ValueType::Double => Ok(SlotKind::F64),
        _ => Err(JitError::UnsupportedWidth),
    }
}

fn classify_return(prop: &Property) -> Result<SlotKind, JitError> {
    if prop.by_reference {
        return Ok(SlotKind::Ptr);
    }
    match prop.value_type {
        ValueType::Void => Ok(SlotKind::Void),
        ValueType::Vector2 => Ok(SlotKind::Agg(8)),
        ValueType::Vector3 => Ok(SlotKind::Agg(12)),
        ValueType::Vector4 => Ok(SlotKind::Agg(16)),
        ValueType::Matrix4x4 | ValueType::String => Err(JitError::HiddenReturnRequired),
        ty if ty.is_array() => Err(JitError::HiddenReturnRequired),
        _ => classify_param(prop),
    }
}

fn middle_type_for(prop: &Property, kind: SlotKind) -> middle::Type {
    if prop.by_reference {
        return middle::Type::pointer();
    }
    match kind {
        SlotKind::Void => middle::Type::void(),
        SlotKind::S8 => match prop.value_type {
            ValueType::Int8 => middle::Type::i8(),
            _ => middle::Type::u8(),
        },
        SlotKind::S16 => match prop.value_type {
            ValueType::Int16 => middle::Type::i16(),
            _ => middle::Type::u16(),
        },
        SlotKind::S32 => match prop.value_type {
            ValueType::Int32 => middle::Type::i32(),
            _ => middle::Type::u32(),
        },
        SlotKind::S64 => match prop.value_type {
            ValueType::Int64 => middle::Type::i64(),
            _ => middle::Type::u64(),
        },
        SlotKind::F32 => middle::Type::f32(),
        SlotKind::F64 => middle::Type::f64(),
        SlotKind::Ptr => middle::Type::pointer(),
        SlotKind::Agg(size) => {
            middle::Type::structure((0..size / 4).map(|_| middle::Type::f32()))
        }
    }
}

fn abi_for(convention: CallingConvention) -> raw::ffi_abi {
    #[cfg(all(windows, target_arch = "x86"))]
    {
        match convention {
            CallingConvention::Stdcall => raw::ffi_abi_FFI_STDCALL,
            CallingConvention::Fastcall => raw::ffi_abi_FFI_FASTCALL,
            CallingConvention::Thiscall => raw::ffi_abi_FFI_THISCALL,
            _ => raw::ffi_abi_FFI_DEFAULT_ABI,
        }
    }
    #[cfg(not(all(windows, target_arch = "x86")))]
    {
        let _ = convention;
        raw::ffi_abi_FFI_DEFAULT_ABI
    }
}

/// A prepared call interface plus the classification both trampolines need.
///
/// Heap-pinned: the `ffi_cif` holds pointers into `arg_raw` and the owned
/// `middle::Type` descriptors, so the struct is only handed out boxed.
pub(crate) struct Signature {
    cif: raw::ffi_cif,
    arg_raw: Box<[*mut raw::ffi_type]>,
    _arg_types: Vec<middle::Type>,
    _ret_type: middle::Type,
    pub(crate) arg_kinds: Box<[SlotKind]>,
    pub(crate) ret_kind: SlotKind,
    pub(crate) hidden: bool,
}

impl Signature {
    /// Build and prepare the interface for `method`.
    pub(crate) fn from_method(method: &Method, hidden: bool) -> Result<Box<Signature>, JitError> {
        let mut arg_kinds: Vec<SlotKind> = Vec::with_capacity(method.param_types.len() + 1);
        let mut arg_types: Vec<middle::Type> = Vec::with_capacity(method.param_types.len() + 1);

        if hidden {
            arg_kinds.push(SlotKind::Ptr);
            arg_types.push(middle::Type::pointer());
        }

        for prop in &method.param_types {
            let kind = classify_param(prop)?;
            arg_types.push(middle_type_for(prop, kind));
            arg_kinds.push(kind);
        }

        let (ret_kind, ret_type) = if hidden {
            (SlotKind::Ptr, middle::Type::pointer())
        } else {
            let kind = classify_return(&method.ret_type)?;
            (kind, middle_type_for(&method.ret_type, kind))
        };

        let arg_raw: Box<[*mut raw::ffi_type]> =
            arg_types.iter().map(|t| t.as_raw_ptr()).collect();

        let mut signature = Box::new(Signature {
            cif: unsafe { std::mem::zeroed() },
            arg_raw,
            _arg_types: arg_types,
            _ret_type: ret_type,
            arg_kinds: arg_kinds.into_boxed_slice(),
            ret_kind,
            hidden,
        });

        let abi = abi_for(method.calling_convention);
        let total = signature.arg_raw.len();
        let ret_ptr = signature._ret_type.as_raw_ptr();
        let args_ptr = signature.arg_raw.as_mut_ptr();
        let cif_ptr = &mut signature.cif as *mut raw::ffi_cif;

        let prepared = unsafe {
            match method.var_index {
                Some(var_index) => {
                    let fixed = var_index as usize + usize::from(hidden);
                    if fixed > total {
                        return Err(JitError::BadVariadicIndex(var_index, method.param_types.len()));
                    }
                    low::prep_cif_var(cif_ptr, abi, fixed, total, ret_ptr, args_ptr)
                }
                None => low::prep_cif(cif_ptr, abi, total, ret_ptr, args_ptr),
            }
        };
        prepared.map_err(|e| JitError::Backend(format!("ffi_prep_cif failed: {:?}", e)))?;

        Ok(signature)
    }

    /// The uniform `(params, ret) -> void` interface used by [`super::JitCall`].
    pub(crate) fn uniform() -> Result<Box<Signature>, JitError> {
        let arg_types = vec![middle::Type::pointer(), middle::Type::pointer()];
        let arg_raw: Box<[*mut raw::ffi_type]> =
            arg_types.iter().map(|t| t.as_raw_ptr()).collect();

        let mut signature = Box::new(Signature {
            cif: unsafe { std::mem::zeroed() },
            arg_raw,
            _arg_types: arg_types,
            _ret_type: middle::Type::void(),
            arg_kinds: vec![SlotKind::Ptr, SlotKind::Ptr].into_boxed_slice(),
            ret_kind: SlotKind::Void,
            hidden: false,
        });

        let ret_ptr = signature._ret_type.as_raw_ptr();
        let args_ptr = signature.arg_raw.as_mut_ptr();
        let cif_ptr = &mut signature.cif as *mut raw::ffi_cif;
        unsafe {
            low::prep_cif(cif_ptr, raw::ffi_abi_FFI_DEFAULT_ABI, 2, ret_ptr, args_ptr)
                .map_err(|e| JitError::Backend(format!("ffi_prep_cif failed: {:?}", e)))?;
        }
        Ok(signature)
    }

    pub(crate) fn cif_ptr(&mut self) -> *mut raw::ffi_cif {
        &mut self.cif
    }
}

/// Aligned return storage large enough for every supported return class.
#[repr(C, align(16))]
#[derive(Clone, Copy, Default)]
pub(crate) struct RetStorage(pub(crate) [u64; 2]);

/// Read one argument slot into a cell, honoring its storage width.
pub(crate) unsafe fn read_cell(src: *const c_void, kind: SlotKind) -> u64 {
    match kind {
        SlotKind::Void => 0,
        SlotKind::S8 => u64::from(ptr::read(src as *const u8)),
        SlotKind::S16 => u64::from(ptr::read(src as *const u16)),
        SlotKind::S32 => u64::from(ptr::read(src as *const u32)),
        SlotKind::S64 => ptr::read(src as *const u64),
        SlotKind::F32 => u64::from(ptr::read(src as *const u32)),
        SlotKind::F64 => ptr::read(src as *const u64),
        SlotKind::Ptr => ptr::read(src as *const usize) as u64,
        SlotKind::Agg(_) => 0,
    }
}

/// Write a cell back into an argument slot.
pub(crate) unsafe fn write_cell(dst: *mut c_void, kind: SlotKind, cell: u64) {
    match kind {
        SlotKind::Void | SlotKind::Agg(_) => {}
        SlotKind::S8 => ptr::write(dst as *mut u8, cell as u8),
        SlotKind::S16 => ptr::write(dst as *mut u16, cell as u16),
        SlotKind::S32 | SlotKind::F32 => ptr::write(dst as *mut u32, cell as u32),
        SlotKind::S64 | SlotKind::F64 => ptr::write(dst as *mut u64, cell),
        SlotKind::Ptr => ptr::write(dst as *mut usize, cell as usize),
    }
}

/// Unsized view over the contiguous argument cells handed to a
/// [`super::CallbackHandler`]. Each argument occupies one 8-byte cell;
/// floats are bit-boxed into their cell.
#[repr(C)]
pub struct Parameters {
    first: u64,
}

impl Parameters {
    /// # Safety
    /// `this` must point at a buffer with more than `idx` cells.
    pub unsafe fn get_arg<T: Copy>(this: *const Parameters, idx: usize) -> T {
        debug_assert!(std::mem::size_of::<T>() <= 8);
        ptr::read((this as *const u64).add(idx) as *const T)
    }

    /// # Safety
    /// Same bounds contract as [`Parameters::get_arg`].
    pub unsafe fn set_arg<T>(this: *mut Parameters, idx: usize, value: T) {
        debug_assert!(std::mem::size_of::<T>() <= 8);
        let cell = (this as *mut u64).add(idx);
        ptr::write(cell, 0);
        ptr::write(cell as *mut T, value);
    }
}

/// View over the return cell pair written by a handler or a call.
#[repr(C)]
pub struct ReturnValue {
    cells: [u64; 2],
}

impl ReturnValue {
    /// # Safety
    /// `this` must point at valid return storage.
    pub unsafe fn set<T>(this: *mut ReturnValue, value: T) {
        debug_assert!(std::mem::size_of::<T>() <= 16);
        ptr::write(this as *mut T, value);
    }

    /// # Safety
    /// `this` must point at valid return storage.
    pub unsafe fn get<T: Copy>(this: *const ReturnValue) -> T {
        debug_assert!(std::mem::size_of::<T>() <= 16);
        ptr::read(this as *const T)
    }
}

/// Owned argument buffer for staging a [`super::JitCall`] invocation.
#[derive(Debug, Clone)]
pub struct CellBuffer {
    cells: Vec<u64>,
}

impl CellBuffer {
    pub fn new(count: usize) -> Self {
        CellBuffer {
            cells: vec![0; count.max(1)],
        }
    }

    pub fn set<T>(&mut self, idx: usize, value: T) {
        assert!(std::mem::size_of::<T>() <= 8);
        self.cells[idx] = 0;
        unsafe {
            ptr::write(&mut self.cells[idx] as *mut u64 as *mut T, value);
        }
    }

    pub fn get<T: Copy>(&self, idx: usize) -> T {
        assert!(std::mem::size_of::<T>() <= 8);
        unsafe { ptr::read(&self.cells[idx] as *const u64 as *const T) }
    }

    pub fn as_params(&mut self) -> *mut Parameters {
        self.cells.as_mut_ptr() as *mut Parameters
    }
}

/// Owned return storage for staging a [`super::JitCall`] invocation.
#[derive(Debug, Clone, Default)]
pub struct ReturnBuffer {
    cells: [u64; 2],
}

impl ReturnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_ret(&mut self) -> *mut ReturnValue {
        self.cells.as_mut_ptr() as *mut ReturnValue
    }

    pub fn get<T: Copy>(&self) -> T {
        assert!(std::mem::size_of::<T>() <= 16);
        unsafe { ptr::read(self.cells.as_ptr() as *const T) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_by_value_parameters_are_rejected() {
        let prop = Property::new(ValueType::Vector4);
        assert_eq!(classify_param(&prop), Err(JitError::UnsupportedWidth));
        assert_eq!(
            JitError::UnsupportedWidth.to_string(),
            "Parameters wider than 64 bits not supported"
        );
    }

    #[test]
    fn by_reference_always_classifies_as_pointer() {
        let prop = Property {
            value_type: ValueType::Matrix4x4,
            by_reference: true,
            prototype: None,
        };
        assert_eq!(classify_param(&prop), Ok(SlotKind::Ptr));
    }

    #[test]
    fn default_hidden_rule_covers_objects() {
        assert!(default_hidden_param(ValueType::String));
        assert!(default_hidden_param(ValueType::ArrayInt32));
        assert!(default_hidden_param(ValueType::Matrix4x4));
        assert!(!default_hidden_param(ValueType::Int64));
        assert!(!default_hidden_param(ValueType::Vector2));
        assert_eq!(default_hidden_param(ValueType::Vector4), cfg!(windows));
    }

    #[test]
    fn cell_buffer_round_trips_values() {
        let mut cells = CellBuffer::new(3);
        cells.set(0, 42i32);
        cells.set(1, 2.5f32);
        cells.set(2, -7i64);
        assert_eq!(cells.get::<i32>(0), 42);
        assert_eq!(cells.get::<f32>(1), 2.5);
        assert_eq!(cells.get::<i64>(2), -7);
    }
}
