//! Self-describing object encoding for cached values.
//!
//! Each payload is a JSON envelope carrying a type discriminant next to the
//! value, so a reader that does not know the concrete type up front can
//! rebuild it through a [`TypeRegistry`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

pub const DEFAULT_TYPE_PROPERTY: &str = "@type";
const VALUE_PROPERTY: &str = "value";

#[derive(Debug)]
pub enum SerializationError {
    Encode(serde_json::Error),
    Decode(serde_json::Error),
    /// The payload carries a discriminant other than the requested type's.
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    /// No reconstructor is registered for the discriminant.
    UnknownType(String),
    /// The payload is not an envelope with a string discriminant.
    MissingDiscriminant(String),
    /// The discriminant property name is empty or collides with the payload.
    InvalidTypeProperty(String),
}

impl Display for SerializationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "failed to encode cached value: {err}"),
            Self::Decode(err) => write!(f, "failed to decode cached value: {err}"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "cached value has type `{found}`, expected `{expected}`")
            }
            Self::UnknownType(tag) => write!(f, "no type registered for tag `{tag}`"),
            Self::MissingDiscriminant(property) => {
                write!(f, "cached value has no `{property}` discriminant")
            }
            Self::InvalidTypeProperty(property) => write!(
                f,
                "type property `{property}` must be non-empty and differ from `{VALUE_PROPERTY}`"
            ),
        }
    }
}

impl Error for SerializationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode(err) | Self::Decode(err) => Some(err),
            Self::TypeMismatch { .. }
            | Self::UnknownType(_)
            | Self::MissingDiscriminant(_)
            | Self::InvalidTypeProperty(_) => None,
        }
    }
}

pub type SerializationResult<T> = Result<T, SerializationError>;

/// A type that can be written to the cache with its discriminant.
///
/// `TYPE_TAG` must be unique across every type stored in one cache.
pub trait Cacheable: Serialize + DeserializeOwned + Send + 'static {
    const TYPE_TAG: &'static str;
}

impl Cacheable for String {
    const TYPE_TAG: &'static str = "string";
}

impl Cacheable for i64 {
    const TYPE_TAG: &'static str = "i64";
}

impl Cacheable for u64 {
    const TYPE_TAG: &'static str = "u64";
}

impl Cacheable for f64 {
    const TYPE_TAG: &'static str = "f64";
}

impl Cacheable for bool {
    const TYPE_TAG: &'static str = "bool";
}

/// A value rebuilt without a static target type.
pub struct DynValue {
    tag: String,
    value: Box<dyn Any + Send>,
}

impl DynValue {
    pub fn type_tag(&self) -> &str {
        &self.tag
    }

    pub fn is<T: Cacheable>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Cacheable>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Recovers the concrete value, or returns `self` unchanged when the
    /// type does not match.
    pub fn downcast<T: Cacheable>(self) -> Result<T, Self> {
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                tag: self.tag,
                value,
            }),
        }
    }
}

impl Debug for DynValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynValue").field("tag", &self.tag).finish()
    }
}

type Reconstructor = fn(Value) -> Result<Box<dyn Any + Send>, serde_json::Error>;

fn reconstruct<T: Cacheable>(value: Value) -> Result<Box<dyn Any + Send>, serde_json::Error> {
    let typed: T = serde_json::from_value(value)?;
    Ok(Box::new(typed))
}

/// Maps discriminants to the types that produced them.
#[derive(Clone)]
pub struct TypeRegistry {
    types: HashMap<&'static str, Reconstructor>,
}

impl TypeRegistry {
    /// Registry preloaded with the primitive impls.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register::<String>();
        registry.register::<i64>();
        registry.register::<u64>();
        registry.register::<f64>();
        registry.register::<bool>();
        registry
    }

    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registers `T`, replacing any type previously bound to its tag.
    pub fn register<T: Cacheable>(&mut self) -> &mut Self {
        self.types.insert(T::TYPE_TAG, reconstruct::<T>);
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    fn rebuild(&self, tag: &str, value: Value) -> SerializationResult<Box<dyn Any + Send>> {
        let reconstructor = self
            .types
            .get(tag)
            .ok_or_else(|| SerializationError::UnknownType(tag.to_string()))?;
        reconstructor(value).map_err(SerializationError::Decode)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&str> = self.types.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &tags).finish()
    }
}

/// Encodes values into tagged JSON envelopes and back.
#[derive(Debug, Clone)]
pub struct ObjectSerializer {
    type_property: String,
    registry: TypeRegistry,
}

impl ObjectSerializer {
    pub fn new() -> Self {
        Self {
            type_property: DEFAULT_TYPE_PROPERTY.to_string(),
            registry: TypeRegistry::new(),
        }
    }

    /// # Errors
    /// `InvalidTypeProperty` when `property` is blank or equals the payload
    /// field name.
    pub fn with_type_property(
        mut self,
        property: impl Into<String>,
    ) -> SerializationResult<Self> {
        let property = property.into();
        validate_type_property(&property)?;
        self.type_property = property;
        Ok(self)
    }

    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn type_property(&self) -> &str {
        &self.type_property
    }

    /// `None` encodes to an empty byte sequence.
    ///
    /// A value that would not decode back to `T` (such as a non-finite
    /// float, which JSON writes as `null`) is an `Encode` error.
    pub fn serialize<T: Cacheable>(&self, value: Option<&T>) -> SerializationResult<Vec<u8>> {
        let Some(value) = value else {
            return Ok(Vec::new());
        };
        let payload = serde_json::to_value(value).map_err(SerializationError::Encode)?;
        serde_json::from_value::<T>(payload.clone()).map_err(SerializationError::Encode)?;
        let mut envelope = Map::new();
        envelope.insert(
            self.type_property.clone(),
            Value::String(T::TYPE_TAG.to_string()),
        );
        envelope.insert(VALUE_PROPERTY.to_string(), payload);
        serde_json::to_vec(&Value::Object(envelope)).map_err(SerializationError::Encode)
    }

    /// Empty input decodes to `None`.
    pub fn deserialize<T: Cacheable>(&self, bytes: &[u8]) -> SerializationResult<Option<T>> {
        let Some((tag, payload)) = self.open_envelope(bytes)? else {
            return Ok(None);
        };
        if tag != T::TYPE_TAG {
            return Err(SerializationError::TypeMismatch {
                expected: T::TYPE_TAG,
                found: tag,
            });
        }
        serde_json::from_value(payload)
            .map(Some)
            .map_err(SerializationError::Decode)
    }

    /// Rebuilds whatever type the payload names, through the registry.
    pub fn deserialize_any(&self, bytes: &[u8]) -> SerializationResult<Option<DynValue>> {
        let Some((tag, payload)) = self.open_envelope(bytes)? else {
            return Ok(None);
        };
        let value = self.registry.rebuild(&tag, payload)?;
        Ok(Some(DynValue { tag, value }))
    }

    fn open_envelope(&self, bytes: &[u8]) -> SerializationResult<Option<(String, Value)>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let decoded: Value = serde_json::from_slice(bytes).map_err(SerializationError::Decode)?;
        let Value::Object(mut envelope) = decoded else {
            return Err(self.missing_discriminant());
        };
        let tag = match envelope.remove(&self.type_property) {
            Some(Value::String(tag)) => tag,
            _ => return Err(self.missing_discriminant()),
        };
        let payload = envelope.remove(VALUE_PROPERTY).unwrap_or(Value::Null);
        Ok(Some((tag, payload)))
    }

    fn missing_discriminant(&self) -> SerializationError {
        SerializationError::MissingDiscriminant(self.type_property.clone())
    }
}

pub fn validate_type_property(property: &str) -> SerializationResult<()> {
    if property.trim().is_empty() || property == VALUE_PROPERTY {
        return Err(SerializationError::InvalidTypeProperty(property.to_string()));
    }
    Ok(())
}

impl Default for ObjectSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectSerializer, SerializationError};

    #[test]
    fn none_and_empty_bytes_mirror_each_other() {
        let serializer = ObjectSerializer::new();
        let bytes = serializer.serialize::<String>(None).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(serializer.deserialize::<String>(&bytes).unwrap(), None);
        assert!(serializer.deserialize_any(&bytes).unwrap().is_none());
    }

    #[test]
    fn envelope_uses_configured_type_property() {
        let serializer = ObjectSerializer::new().with_type_property("kind").unwrap();
        let bytes = serializer.serialize(Some(&42_i64)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], "i64");
        assert_eq!(json["value"], 42);
    }

    #[test]
    fn typed_read_rejects_other_discriminant() {
        let serializer = ObjectSerializer::new();
        let bytes = serializer.serialize(Some(&true)).unwrap();
        let err = serializer.deserialize::<String>(&bytes).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::TypeMismatch {
                expected: "string",
                ..
            }
        ));
    }

    #[test]
    fn plain_json_without_envelope_is_rejected() {
        let serializer = ObjectSerializer::new();
        let err = serializer.deserialize_any(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, SerializationError::MissingDiscriminant(_)));
        let err = serializer.deserialize::<i64>(b"not json").unwrap_err();
        assert!(matches!(err, SerializationError::Decode(_)));
    }

    #[test]
    fn non_finite_floats_fail_at_encode_time() {
        let serializer = ObjectSerializer::new();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = serializer.serialize(Some(&value)).unwrap_err();
            assert!(matches!(err, SerializationError::Encode(_)), "{value}");
        }
        let bytes = serializer.serialize(Some(&1.5_f64)).unwrap();
        assert_eq!(serializer.deserialize::<f64>(&bytes).unwrap(), Some(1.5));
    }

    #[test]
    fn type_property_cannot_shadow_payload_field() {
        for property in ["value", "", "  "] {
            let err = ObjectSerializer::new()
                .with_type_property(property)
                .unwrap_err();
            assert!(matches!(err, SerializationError::InvalidTypeProperty(_)));
        }
    }

    #[test]
    fn unknown_tag_is_reported() {
        let serializer = ObjectSerializer::new();
        let err = serializer
            .deserialize_any(br#"{"@type":"ghost","value":1}"#)
            .unwrap_err();
        assert!(matches!(err, SerializationError::UnknownType(tag) if tag == "ghost"));
    }
}
