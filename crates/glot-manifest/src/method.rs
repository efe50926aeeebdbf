//! Exported method descriptions: names, calling conventions and value types.

use serde::{Deserialize, Serialize};

/// Value types a method can accept or return.
///
/// Every variant has a deterministic native storage class; the call bridge
/// refuses anything wider than 64 bits passed by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValueType {
    #[default]
    #[serde(rename = "void")]
    Void,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "char8")]
    Char8,
    #[serde(rename = "char16")]
    Char16,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    #[serde(rename = "ptr64")]
    Pointer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool[]")]
    ArrayBool,
    #[serde(rename = "char8[]")]
    ArrayChar8,
    #[serde(rename = "char16[]")]
    ArrayChar16,
    #[serde(rename = "int8[]")]
    ArrayInt8,
    #[serde(rename = "int16[]")]
    ArrayInt16,
    #[serde(rename = "int32[]")]
    ArrayInt32,
    #[serde(rename = "int64[]")]
    ArrayInt64,
    #[serde(rename = "uint8[]")]
    ArrayUInt8,
    #[serde(rename = "uint16[]")]
    ArrayUInt16,
    #[serde(rename = "uint32[]")]
    ArrayUInt32,
    #[serde(rename = "uint64[]")]
    ArrayUInt64,
    #[serde(rename = "ptr64[]")]
    ArrayPointer,
    #[serde(rename = "float[]")]
    ArrayFloat,
    #[serde(rename = "double[]")]
    ArrayDouble,
    #[serde(rename = "string[]")]
    ArrayString,
    #[serde(rename = "vec2")]
    Vector2,
    #[serde(rename = "vec3")]
    Vector3,
    #[serde(rename = "vec4")]
    Vector4,
    #[serde(rename = "mat4x4")]
    Matrix4x4,
}

impl ValueType {
    /// Whether this is one of the array object types.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            ValueType::ArrayBool
                | ValueType::ArrayChar8
                | ValueType::ArrayChar16
                | ValueType::ArrayInt8
                | ValueType::ArrayInt16
                | ValueType::ArrayInt32
                | ValueType::ArrayInt64
                | ValueType::ArrayUInt8
                | ValueType::ArrayUInt16
                | ValueType::ArrayUInt32
                | ValueType::ArrayUInt64
                | ValueType::ArrayPointer
                | ValueType::ArrayFloat
                | ValueType::ArrayDouble
                | ValueType::ArrayString
        )
    }
}

/// Calling convention requested by a method descriptor.
///
/// Non-default conventions only exist on 32-bit Windows; everywhere else
/// they collapse into the platform default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallingConvention {
    #[default]
    Default,
    Cdecl,
    Stdcall,
    Fastcall,
    Thiscall,
    Vectorcall,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A single parameter or return slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(rename = "type")]
    pub value_type: ValueType,

    /// Passed as a pointer to the value rather than the value itself.
    #[serde(default, skip_serializing_if = "is_false")]
    pub by_reference: bool,

    /// Signature of the delegate when `value_type` is `function`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prototype: Option<Box<Method>>,
}

impl Property {
    pub fn new(value_type: ValueType) -> Self {
        Property {
            value_type,
            by_reference: false,
            prototype: None,
        }
    }
}

/// A named entry point exported by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Method {
    pub name: String,

    /// Symbol name inside the plugin binary; defaults to `name` when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub func_name: String,

    #[serde(default)]
    pub calling_convention: CallingConvention,

    #[serde(default)]
    pub param_types: Vec<Property>,

    #[serde(default)]
    pub ret_type: Property,

    /// Index of the first variadic parameter, when the tail is variadic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_index: Option<u8>,
}

impl Method {
    /// Symbol to resolve in the plugin binary.
    pub fn symbol_name(&self) -> &str {
        if self.func_name.is_empty() {
            &self.name
        } else {
            &self.func_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_round_trips_through_json() {
        let json = "\"ptr64\"";
        let parsed: ValueType = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, ValueType::Pointer);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);

        let array: ValueType = serde_json::from_str("\"int32[]\"").unwrap();
        assert_eq!(array, ValueType::ArrayInt32);
        assert!(array.is_array());
    }

    #[test]
    fn method_defaults_fill_missing_fields() {
        let json = r#"{ "name": "add", "paramTypes": [ { "type": "int32" }, { "type": "int32" } ], "retType": { "type": "int32" } }"#;
        let method: Method = serde_json::from_str(json).unwrap();
        assert_eq!(method.name, "add");
        assert_eq!(method.symbol_name(), "add");
        assert_eq!(method.calling_convention, CallingConvention::Default);
        assert_eq!(method.param_types.len(), 2);
        assert_eq!(method.var_index, None);
    }

    #[test]
    fn by_reference_parses_from_camel_case() {
        let json = r#"{ "type": "string", "byReference": true }"#;
        let prop: Property = serde_json::from_str(json).unwrap();
        assert!(prop.by_reference);
        assert_eq!(prop.value_type, ValueType::String);
    }
}
